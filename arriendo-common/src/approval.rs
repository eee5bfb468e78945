//! Server requests: drafting with a frozen estimate, approval and rejection.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::BillingError;
use crate::pricing::calcular_costo_diario;
use crate::{
    InstanceType, PaymentMethod, RequestStatus, Server, ServerSizing, ServerStatus,
    SolicitudServidor,
};

/// Build a pendiente request; the estimate uses the same formula as billing.
pub fn draft_request(
    sizing: ServerSizing,
    instance_type: &InstanceType,
    medio_pago: PaymentMethod,
    cliente_id: Option<Uuid>,
    at: DateTime<Utc>,
) -> SolicitudServidor {
    let costo_diario_estimado = calcular_costo_diario(
        instance_type,
        sizing.ram_gb,
        sizing.disco_gb,
        sizing.disco_tipo,
        sizing.conexion,
    );
    SolicitudServidor {
        id: Uuid::new_v4(),
        cliente_id,
        nombre: sizing.nombre,
        region_id: sizing.region_id,
        sistema_operativo_id: sizing.sistema_operativo_id,
        imagen_id: sizing.imagen_id,
        instance_type_id: instance_type.id,
        ram_gb: sizing.ram_gb,
        disco_gb: sizing.disco_gb,
        disco_tipo: sizing.disco_tipo,
        conexion: sizing.conexion,
        clave_privada: sizing.clave_privada,
        medio_pago,
        costo_diario_estimado,
        estado: RequestStatus::Pendiente,
        motivo_rechazo: None,
        revisado_por: None,
        revisado_at: None,
        created_at: at,
    }
}

fn ensure_pendiente(solicitud: &SolicitudServidor) -> Result<(), BillingError> {
    if solicitud.estado != RequestStatus::Pendiente {
        return Err(BillingError::RequestAlreadyReviewed {
            request_id: solicitud.id,
            estado: solicitud.estado,
        });
    }
    Ok(())
}

/// Approve a request and instantiate its server.
///
/// The server is billed at the request's frozen `costo_diario_estimado`, the
/// amount the client was quoted, even if the instance type's price changed
/// since. The server id is a random UUID.
pub fn approve(
    solicitud: &mut SolicitudServidor,
    instance_type: &InstanceType,
    reviewer: Uuid,
    at: DateTime<Utc>,
) -> Result<Server, BillingError> {
    ensure_pendiente(solicitud)?;

    let costo_diario = solicitud.costo_diario_estimado.clone();

    solicitud.estado = RequestStatus::Aprobada;
    solicitud.revisado_por = Some(reviewer);
    solicitud.revisado_at = Some(at);

    Ok(Server {
        id: Uuid::new_v4(),
        nombre: solicitud.nombre.clone(),
        cliente_id: solicitud.cliente_id,
        region_id: solicitud.region_id,
        sistema_operativo_id: solicitud.sistema_operativo_id,
        imagen_id: solicitud.imagen_id,
        instance_type_id: instance_type.id,
        ram_gb: solicitud.ram_gb,
        disco_gb: solicitud.disco_gb,
        disco_tipo: solicitud.disco_tipo,
        conexion: solicitud.conexion,
        clave_privada: solicitud.clave_privada.clone(),
        estado: ServerStatus::Pending,
        costo_diario,
        first_activated_at: None,
        latest_release: None,
        accrual_started_at: None,
        active_seconds: 0,
        active_ms: 0,
        billed_active_ms: 0,
        created_at: at,
    })
}

pub fn reject(
    solicitud: &mut SolicitudServidor,
    reviewer: Uuid,
    motivo: &str,
    at: DateTime<Utc>,
) -> Result<(), BillingError> {
    ensure_pendiente(solicitud)?;
    let motivo = motivo.trim();
    if motivo.is_empty() {
        return Err(BillingError::MissingRejectionReason);
    }
    solicitud.estado = RequestStatus::Rechazada;
    solicitud.motivo_rechazo = Some(motivo.to_string());
    solicitud.revisado_por = Some(reviewer);
    solicitud.revisado_at = Some(at);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Connectivity, DiskType};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn instance_type() -> InstanceType {
        InstanceType {
            id: Uuid::new_v4(),
            nombre: "m5.large".to_string(),
            familia: "m5".to_string(),
            vcpus: 2,
            procesador: "Intel Xeon Platinum".to_string(),
            memoria_gb: BigDecimal::from(8),
            rendimiento_red: "Up to 10 Gigabit".to_string(),
            precio_hora: BigDecimal::from_str("0.096").unwrap(),
        }
    }

    fn sizing() -> ServerSizing {
        ServerSizing {
            nombre: "api-01".to_string(),
            region_id: Uuid::new_v4(),
            sistema_operativo_id: Uuid::new_v4(),
            imagen_id: Uuid::new_v4(),
            instance_type_id: Uuid::new_v4(),
            ram_gb: 16,
            disco_gb: 100,
            disco_tipo: DiskType::Ssd,
            conexion: Connectivity::Privada,
            clave_privada: Some("ssh-ed25519 AAAA".to_string()),
        }
    }

    #[test]
    fn approval_freezes_same_cost_as_estimate() {
        let it = instance_type();
        let mut req = draft_request(sizing(), &it, PaymentMethod::Tarjeta, None, Utc::now());
        let reviewer = Uuid::new_v4();
        let server = approve(&mut req, &it, reviewer, Utc::now()).unwrap();

        assert_eq!(server.costo_diario, req.costo_diario_estimado);
        assert_eq!(server.estado, ServerStatus::Pending);
        assert_eq!(server.instance_type_id, it.id);
        assert_eq!(server.active_ms, 0);
        assert_ne!(server.id, req.id);
        assert_eq!(req.estado, RequestStatus::Aprobada);
        assert_eq!(req.revisado_por, Some(reviewer));
    }

    #[test]
    fn price_change_after_request_keeps_quoted_cost() {
        let mut it = instance_type();
        let mut req = draft_request(sizing(), &it, PaymentMethod::Tarjeta, None, Utc::now());
        let quoted = req.costo_diario_estimado.clone();

        it.precio_hora = BigDecimal::from_str("0.2").unwrap();
        let server = approve(&mut req, &it, Uuid::new_v4(), Utc::now()).unwrap();

        assert_eq!(server.costo_diario, quoted);
        assert_ne!(
            server.costo_diario,
            calcular_costo_diario(&it, req.ram_gb, req.disco_gb, req.disco_tipo, req.conexion)
        );
    }

    #[test]
    fn reviewed_request_cannot_be_reviewed_again() {
        let it = instance_type();
        let mut req = draft_request(sizing(), &it, PaymentMethod::Paypal, None, Utc::now());
        reject(&mut req, Uuid::new_v4(), "capacidad agotada", Utc::now()).unwrap();
        assert_eq!(req.motivo_rechazo.as_deref(), Some("capacidad agotada"));

        let err = approve(&mut req, &it, Uuid::new_v4(), Utc::now()).unwrap_err();
        assert_eq!(err.code(), "request_already_reviewed");
    }

    #[test]
    fn rejection_requires_reason() {
        let it = instance_type();
        let mut req = draft_request(sizing(), &it, PaymentMethod::Transferencia, None, Utc::now());
        assert_eq!(
            reject(&mut req, Uuid::new_v4(), "  ", Utc::now()),
            Err(BillingError::MissingRejectionReason)
        );
        assert_eq!(req.estado, RequestStatus::Pendiente);
    }
}

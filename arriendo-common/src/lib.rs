use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod accrual;
pub mod approval;
pub mod bus;
pub mod error;
pub mod invoice;
pub mod pricing;
pub mod sizing;
pub mod store;

pub use error::BillingError;

// --- Enums ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "server_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Pending,             // Created, waiting for provisioning
    PendienteAprobacion, // Waiting for an operator decision
    Running,             // Billable
    Stopped,             // Accrual frozen
    Terminated,          // Final
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Pending => "pending",
            ServerStatus::PendienteAprobacion => "pendiente_aprobacion",
            ServerStatus::Running => "running",
            ServerStatus::Stopped => "stopped",
            ServerStatus::Terminated => "terminated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(ServerStatus::Pending),
            "pendiente_aprobacion" => Some(ServerStatus::PendienteAprobacion),
            "running" => Some(ServerStatus::Running),
            "stopped" => Some(ServerStatus::Stopped),
            "terminated" => Some(ServerStatus::Terminated),
            _ => None,
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "disk_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DiskType {
    Ssd,
    Hdd,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "connectivity", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Publica,
    Privada, // Dedicated network path, requires key material
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pendiente,
    Pagado,
    Vencido,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pendiente => "pendiente",
            PaymentStatus::Pagado => "pagado",
            PaymentStatus::Vencido => "vencido",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "request_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pendiente,
    Aprobada,
    Rechazada,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pendiente => "pendiente",
            RequestStatus::Aprobada => "aprobada",
            RequestStatus::Rechazada => "rechazada",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Transferencia,
    Tarjeta,
    Paypal,
}

// --- Entities (SQLx Mapped) ---

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, utoipa::ToSchema)]
pub struct InstanceType {
    pub id: Uuid,
    pub nombre: String,
    pub familia: String,
    pub vcpus: i32,
    pub procesador: String,
    /// RAM included in the hourly price.
    #[schema(value_type = String)]
    pub memoria_gb: BigDecimal,
    pub rendimiento_red: String,
    #[schema(value_type = String)]
    pub precio_hora: BigDecimal,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, utoipa::ToSchema)]
pub struct Server {
    pub id: Uuid,
    pub nombre: String,
    pub cliente_id: Option<Uuid>,
    pub region_id: Uuid,
    pub sistema_operativo_id: Uuid,
    pub imagen_id: Uuid,
    pub instance_type_id: Uuid,
    pub ram_gb: i32,
    pub disco_gb: i32,
    pub disco_tipo: DiskType,
    pub conexion: Connectivity,
    #[serde(skip_serializing)]
    pub clave_privada: Option<String>,
    pub estado: ServerStatus,
    #[schema(value_type = String)]
    pub costo_diario: BigDecimal,
    pub first_activated_at: Option<DateTime<Utc>>,
    pub latest_release: Option<DateTime<Utc>>,
    /// Start of the running interval currently accruing (None unless running).
    pub accrual_started_at: Option<DateTime<Utc>>,
    /// Legacy mirror of `active_ms`, never read by billing.
    pub active_seconds: i64,
    pub active_ms: i64,
    pub billed_active_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// A completed running interval of a server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, sqlx::FromRow, utoipa::ToSchema)]
pub struct ActiveInterval {
    pub server_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl ActiveInterval {
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds().max(0)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow, utoipa::ToSchema)]
pub struct PagoMensual {
    pub id: Uuid,
    pub server_id: Uuid,
    pub anio: i32,
    pub mes: i32,
    #[schema(value_type = String)]
    pub monto: BigDecimal,
    /// Active time invoiced on this row; `monto` for a period is derived from
    /// the sum of these.
    pub active_ms: i64,
    pub estado: PaymentStatus,
    pub fecha_pago: Option<DateTime<Utc>>,
    pub observaciones: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, utoipa::ToSchema)]
pub struct SolicitudServidor {
    pub id: Uuid,
    pub cliente_id: Option<Uuid>,
    pub nombre: String,
    pub region_id: Uuid,
    pub sistema_operativo_id: Uuid,
    pub imagen_id: Uuid,
    pub instance_type_id: Uuid,
    pub ram_gb: i32,
    pub disco_gb: i32,
    pub disco_tipo: DiskType,
    pub conexion: Connectivity,
    #[serde(skip_serializing)]
    pub clave_privada: Option<String>,
    pub medio_pago: PaymentMethod,
    #[schema(value_type = String)]
    pub costo_diario_estimado: BigDecimal,
    pub estado: RequestStatus,
    pub motivo_rechazo: Option<String>,
    pub revisado_por: Option<Uuid>,
    pub revisado_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Sizing fields shared by requests and servers, as submitted by a client.
#[derive(Debug, Serialize, Deserialize, Clone, utoipa::ToSchema)]
pub struct ServerSizing {
    pub nombre: String,
    pub region_id: Uuid,
    pub sistema_operativo_id: Uuid,
    pub imagen_id: Uuid,
    pub instance_type_id: Uuid,
    pub ram_gb: i32,
    pub disco_gb: i32,
    pub disco_tipo: DiskType,
    pub conexion: Connectivity,
    pub clave_privada: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_status_parse_roundtrip() {
        for s in [
            ServerStatus::Pending,
            ServerStatus::PendienteAprobacion,
            ServerStatus::Running,
            ServerStatus::Stopped,
            ServerStatus::Terminated,
        ] {
            assert_eq!(ServerStatus::parse(s.as_str()), Some(s));
            assert_eq!(ServerStatus::parse(&s.as_str().to_uppercase()), Some(s));
        }
        assert_eq!(ServerStatus::parse("booting"), None);
    }

    #[test]
    fn enums_serialize_as_persisted_values() {
        assert_eq!(serde_json::to_string(&DiskType::Ssd).unwrap(), "\"SSD\"");
        assert_eq!(serde_json::to_string(&Connectivity::Privada).unwrap(), "\"privada\"");
        assert_eq!(
            serde_json::to_string(&ServerStatus::PendienteAprobacion).unwrap(),
            "\"pendiente_aprobacion\""
        );
        assert_eq!(serde_json::to_string(&PaymentStatus::Vencido).unwrap(), "\"vencido\"");
    }

    #[test]
    fn interval_duration_never_negative() {
        let t = Utc::now();
        let iv = ActiveInterval {
            server_id: Uuid::new_v4(),
            started_at: t,
            ended_at: t - chrono::Duration::seconds(5),
        };
        assert_eq!(iv.duration_ms(), 0);
    }
}

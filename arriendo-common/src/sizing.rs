//! Range checks for client-supplied sizing fields.
//!
//! Errors are returned per field so forms can show them next to the input;
//! the pricing core assumes these checks already passed.

use serde::Serialize;

use crate::{Connectivity, ServerSizing};

pub const RAM_GB_MIN: i32 = 1;
pub const RAM_GB_MAX: i32 = 256;
pub const DISCO_GB_MIN: i32 = 8;
pub const DISCO_GB_MAX: i32 = 16000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Check the priced dimensions only (used by the cost preview).
pub fn validate_dimensions(ram_gb: i32, disco_gb: i32) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if !(RAM_GB_MIN..=RAM_GB_MAX).contains(&ram_gb) {
        errors.push(FieldError::new(
            "ram_gb",
            format!("must be between {} and {}", RAM_GB_MIN, RAM_GB_MAX),
        ));
    }
    if !(DISCO_GB_MIN..=DISCO_GB_MAX).contains(&disco_gb) {
        errors.push(FieldError::new(
            "disco_gb",
            format!("must be between {} and {}", DISCO_GB_MIN, DISCO_GB_MAX),
        ));
    }
    errors
}

pub fn validate_sizing(sizing: &ServerSizing) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if sizing.nombre.trim().is_empty() {
        errors.push(FieldError::new("nombre", "is required"));
    }
    errors.extend(validate_dimensions(sizing.ram_gb, sizing.disco_gb));

    let has_key = sizing
        .clave_privada
        .as_deref()
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false);
    match (sizing.conexion, has_key) {
        (Connectivity::Privada, false) => {
            errors.push(FieldError::new("clave_privada", "is required for private connectivity"))
        }
        (Connectivity::Publica, true) => errors.push(FieldError::new(
            "clave_privada",
            "is only allowed for private connectivity",
        )),
        _ => {}
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DiskType;
    use uuid::Uuid;

    fn sizing(ram_gb: i32, disco_gb: i32, conexion: Connectivity, key: Option<&str>) -> ServerSizing {
        ServerSizing {
            nombre: "db-01".to_string(),
            region_id: Uuid::new_v4(),
            sistema_operativo_id: Uuid::new_v4(),
            imagen_id: Uuid::new_v4(),
            instance_type_id: Uuid::new_v4(),
            ram_gb,
            disco_gb,
            disco_tipo: DiskType::Ssd,
            conexion,
            clave_privada: key.map(str::to_string),
        }
    }

    #[test]
    fn bounds_are_inclusive() {
        assert!(validate_sizing(&sizing(1, 8, Connectivity::Publica, None)).is_empty());
        assert!(validate_sizing(&sizing(256, 16000, Connectivity::Publica, None)).is_empty());
    }

    #[test]
    fn out_of_range_reports_each_field() {
        let errors = validate_sizing(&sizing(0, 16001, Connectivity::Publica, None));
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["ram_gb", "disco_gb"]);
    }

    #[test]
    fn private_key_iff_private_connectivity() {
        let errors = validate_sizing(&sizing(4, 20, Connectivity::Privada, None));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "clave_privada");

        let errors = validate_sizing(&sizing(4, 20, Connectivity::Privada, Some("   ")));
        assert_eq!(errors.len(), 1);

        assert!(validate_sizing(&sizing(4, 20, Connectivity::Privada, Some("ssh-ed25519 AAAA"))).is_empty());
        assert_eq!(
            validate_sizing(&sizing(4, 20, Connectivity::Publica, Some("ssh-ed25519 AAAA"))).len(),
            1
        );
    }
}

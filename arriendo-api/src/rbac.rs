use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Operador,
    Cliente,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Operador => "operador",
            Role::Cliente => "cliente",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "operador" => Some(Role::Operador),
            "cliente" => Some(Role::Cliente),
            _ => None,
        }
    }
}

/// Approve/reject requests, drive server transitions, register or create
/// payments and trigger reconciliation.
pub fn can_operate(role: Role) -> bool {
    matches!(role, Role::Admin | Role::Operador)
}

/// Change instance-type prices.
pub fn can_manage_catalog(role: Role) -> bool {
    role == Role::Admin
}

/// Clients only see their own servers and payments.
pub fn can_view_server(role: Role, user_id: uuid::Uuid, owner: Option<uuid::Uuid>) -> bool {
    can_operate(role) || owner == Some(user_id)
}

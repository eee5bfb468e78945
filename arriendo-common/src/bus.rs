use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -----------------------------------------------------------------------------
// Channels
// -----------------------------------------------------------------------------

pub const CHANNEL_BILLING_COMMANDS: &str = "billing_commands";
pub const CHANNEL_BILLING_EVENTS: &str = "billing_events";

// -----------------------------------------------------------------------------
// Commands (CMD:*)
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum CommandType {
    #[serde(rename = "CMD:RECONCILE")]
    Reconcile,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Reconcile => "CMD:RECONCILE",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BillingCommand {
    #[serde(rename = "type")]
    pub command_type: CommandType,
    /// None reconciles every server.
    pub server_id: Option<Uuid>,
}

impl BillingCommand {
    pub fn reconcile(server_id: Option<Uuid>) -> Self {
        Self {
            command_type: CommandType::Reconcile,
            server_id,
        }
    }
}

// -----------------------------------------------------------------------------
// Billing domain events (EVT:*)
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum BillingEventType {
    #[serde(rename = "EVT:SERVER_ACCRUAL_START")]
    ServerAccrualStart,
    #[serde(rename = "EVT:SERVER_ACCRUAL_STOP")]
    ServerAccrualStop,
    #[serde(rename = "EVT:INVOICE_UPSERTED")]
    InvoiceUpserted,
    #[serde(rename = "EVT:INVOICE_OVERDUE")]
    InvoiceOverdue,
    #[serde(rename = "EVT:INVOICE_PAID")]
    InvoicePaid,
}

impl BillingEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingEventType::ServerAccrualStart => "EVT:SERVER_ACCRUAL_START",
            BillingEventType::ServerAccrualStop => "EVT:SERVER_ACCRUAL_STOP",
            BillingEventType::InvoiceUpserted => "EVT:INVOICE_UPSERTED",
            BillingEventType::InvoiceOverdue => "EVT:INVOICE_OVERDUE",
            BillingEventType::InvoicePaid => "EVT:INVOICE_PAID",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BillingEventEnvelope {
    pub event_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: BillingEventType,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub source: String,
}

impl BillingEventEnvelope {
    pub fn new(
        event_type: BillingEventType,
        occurred_at: DateTime<Utc>,
        payload: serde_json::Value,
        source: &str,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            occurred_at,
            payload,
            source: source.to_string(),
        }
    }

    /// `server_id` carried in the payload, if any.
    pub fn server_id(&self) -> Option<Uuid> {
        self.payload
            .get("server_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wire_format() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(BillingCommand::reconcile(Some(id))).unwrap();
        assert_eq!(json["type"], "CMD:RECONCILE");
        assert_eq!(json["server_id"], id.to_string());

        let all: BillingCommand =
            serde_json::from_str(r#"{"type":"CMD:RECONCILE","server_id":null}"#).unwrap();
        assert_eq!(all.server_id, None);
    }

    #[test]
    fn event_exposes_server_id() {
        let id = Uuid::new_v4();
        let evt = BillingEventEnvelope::new(
            BillingEventType::ServerAccrualStop,
            Utc::now(),
            serde_json::json!({"server_id": id.to_string(), "accrued_ms": 1000}),
            "arriendo-api",
        );
        let raw = serde_json::to_string(&evt).unwrap();
        assert!(raw.contains("EVT:SERVER_ACCRUAL_STOP"));
        let back: BillingEventEnvelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.server_id(), Some(id));
        assert_eq!(back.event_type.as_str(), "EVT:SERVER_ACCRUAL_STOP");
    }
}

use anyhow::Context;
use redis::AsyncCommands;

use arriendo_common::bus::{BillingEventEnvelope, BillingEventType, CHANNEL_BILLING_EVENTS};
use arriendo_common::PagoMensual;

pub const SOURCE: &str = "arriendo-finops";

pub async fn publish_billing_event(
    redis_client: &redis::Client,
    evt: &BillingEventEnvelope,
) -> anyhow::Result<()> {
    let mut conn = redis_client
        .get_multiplexed_async_connection()
        .await
        .context("Failed to connect to Redis (publisher)")?;
    let payload = serde_json::to_string(evt)?;
    let _: () = conn.publish(CHANNEL_BILLING_EVENTS, payload).await?;
    Ok(())
}

pub fn invoice_event(event_type: BillingEventType, payment: &PagoMensual) -> BillingEventEnvelope {
    BillingEventEnvelope::new(
        event_type,
        chrono::Utc::now(),
        serde_json::json!({
            "server_id": payment.server_id.to_string(),
            "payment_id": payment.id.to_string(),
            "anio": payment.anio,
            "mes": payment.mes,
            "monto": payment.monto.to_string(),
            "estado": payment.estado.as_str(),
        }),
        SOURCE,
    )
}

/// Publish without failing the caller; the database is the source of truth.
pub async fn emit(redis_client: Option<&redis::Client>, evt: BillingEventEnvelope) {
    let Some(client) = redis_client else {
        return;
    };
    if let Err(e) = publish_billing_event(client, &evt).await {
        tracing::warn!("failed to publish {}: {:?}", evt.event_type.as_str(), e);
    }
}

//! State rules of a monthly payment (pendiente -> pagado | vencido).

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::BillingError;
use crate::pricing::{round_half_up, ESCALA_MONETARIA};
use crate::{PagoMensual, PaymentStatus};

impl PagoMensual {
    pub fn new_pendiente(
        server_id: Uuid,
        anio: i32,
        mes: i32,
        monto: BigDecimal,
        observaciones: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            server_id,
            anio,
            mes,
            monto: round_half_up(&monto, ESCALA_MONETARIA),
            active_ms: 0,
            estado: PaymentStatus::Pendiente,
            fecha_pago: None,
            observaciones,
            created_at: at,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.estado == PaymentStatus::Pagado
    }

    pub fn period(&self) -> (i32, i32) {
        (self.anio, self.mes)
    }

    /// Add usage to an open invoice. Paid invoices are final.
    pub fn add_amount(&mut self, amount: &BigDecimal) -> Result<(), BillingError> {
        if self.is_paid() {
            return Err(BillingError::PaidInvoiceImmutable { payment_id: self.id });
        }
        self.monto = round_half_up(&(&self.monto + amount), ESCALA_MONETARIA);
        Ok(())
    }

    /// Add `ms` of invoiced active time together with its amount.
    pub fn add_usage(&mut self, ms: i64, amount: &BigDecimal) -> Result<(), BillingError> {
        self.add_amount(amount)?;
        self.active_ms += ms;
        Ok(())
    }

    /// Record the payment of a pendiente or vencido invoice.
    pub fn register_payment(
        &mut self,
        at: DateTime<Utc>,
        observaciones: Option<String>,
    ) -> Result<(), BillingError> {
        if self.is_paid() {
            return Err(BillingError::PaidInvoiceImmutable { payment_id: self.id });
        }
        self.estado = PaymentStatus::Pagado;
        self.fecha_pago = Some(at);
        if observaciones.is_some() {
            self.observaciones = observaciones;
        }
        Ok(())
    }

    /// pendiente -> vencido. Returns whether the state changed.
    pub fn mark_vencido(&mut self) -> bool {
        if self.estado == PaymentStatus::Pendiente {
            self.estado = PaymentStatus::Vencido;
            true
        } else {
            false
        }
    }
}

use thiserror::Error;
use uuid::Uuid;

use crate::{RequestStatus, ServerStatus};

/// Errors raised by the pricing/accrual/invoicing core.
///
/// Input validation (sizing ranges, enum membership) is reported as field
/// errors by [`crate::sizing`], not through this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: ServerStatus, to: ServerStatus },

    #[error("inconsistent accrual state for server {server_id}: {reason}")]
    InconsistentAccrualState { server_id: Uuid, reason: String },

    #[error("reconciliation skipped for server {server_id}: {reason}")]
    ReconciliationSkipped { server_id: Uuid, reason: String },

    #[error("payment {payment_id} is already paid and cannot be modified")]
    PaidInvoiceImmutable { payment_id: Uuid },

    #[error("request {request_id} was already reviewed ({estado})")]
    RequestAlreadyReviewed { request_id: Uuid, estado: RequestStatus },

    #[error("a rejection reason is required")]
    MissingRejectionReason,
}

impl BillingError {
    /// Stable machine-readable code used in API bodies and audit logs.
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::InvalidTransition { .. } => "invalid_transition",
            BillingError::InconsistentAccrualState { .. } => "inconsistent_accrual_state",
            BillingError::ReconciliationSkipped { .. } => "reconciliation_skipped",
            BillingError::PaidInvoiceImmutable { .. } => "paid_invoice_immutable",
            BillingError::RequestAlreadyReviewed { .. } => "request_already_reviewed",
            BillingError::MissingRejectionReason => "missing_rejection_reason",
        }
    }

    pub(crate) fn inconsistent(server_id: Uuid, reason: impl Into<String>) -> Self {
        BillingError::InconsistentAccrualState {
            server_id,
            reason: reason.into(),
        }
    }
}

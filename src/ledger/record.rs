use crate::payments::types::ConfirmationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle states of an internal payment attempt.
///
/// The callback path only ever moves a record out of `Pending`; once
/// terminal it is never transitioned again by this subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    OnHold,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::OnHold => "on_hold",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            "on_hold" => Ok(PaymentStatus::OnHold),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// One internal payment attempt.
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub id: i64,
    pub status: PaymentStatus,
    /// Whole KRW, fixed at creation by the order-placement flow.
    pub expected_amount: i64,
    /// Set exactly once, on creation or lazily on the first matching
    /// callback; unique across records.
    pub order_reference: Option<String>,
    /// Provider transaction metadata, written once on completion.
    pub confirmation: Option<ConfirmationDetails>,
    /// Diagnostic from the last status transition.
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn provider_payment_key(&self) -> Option<&str> {
        self.confirmation.as_ref().map(|c| c.payment_key.as_str())
    }
}

/// Flattened provider metadata persisted on a completed payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationDetails {
    pub payment_key: String,
    pub last_transaction_key: Option<String>,
    pub method: Option<String>,
    pub approved_at: Option<String>,
    pub card_company: Option<String>,
    pub card_number: Option<String>,
    pub card_approve_no: Option<String>,
    pub card_type: Option<String>,
    pub card_installment_months: Option<i32>,
    pub receipt_url: Option<String>,
}

impl From<&ConfirmationResult> for ConfirmationDetails {
    fn from(result: &ConfirmationResult) -> Self {
        let card = result.card.as_ref();
        Self {
            payment_key: result.payment_key.clone(),
            last_transaction_key: result.last_transaction_key.clone(),
            method: result.method.clone(),
            approved_at: result.approved_at.clone(),
            card_company: card.and_then(|c| c.company.clone()),
            card_number: card.and_then(|c| c.number.clone()),
            card_approve_no: card.and_then(|c| c.approve_no.clone()),
            card_type: card.and_then(|c| c.card_type.clone()),
            card_installment_months: card.and_then(|c| c.installment_plan_months),
            receipt_url: result.receipt.as_ref().and_then(|r| r.url.clone()),
        }
    }
}

/// Result of an attempted status transition.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The record was pending and is now in the requested state.
    Applied(PaymentRecord),
    /// The record was already terminal; nothing was changed. Concurrent
    /// duplicate callbacks observe this as the collision signal.
    AlreadyFinalized(PaymentRecord),
}

impl TransitionOutcome {
    pub fn record(&self) -> &PaymentRecord {
        match self {
            TransitionOutcome::Applied(record) => record,
            TransitionOutcome::AlreadyFinalized(record) => record,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

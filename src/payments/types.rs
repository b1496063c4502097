use serde::{Deserialize, Serialize};

/// The provider's canonical "payment finalized" status value.
pub const DONE_STATUS: &str = "DONE";

/// Round a claimed amount to whole currency units. KRW has no fractional
/// component, so everything sent to or compared against the provider goes
/// through this.
pub fn round_whole_units(amount: f64) -> i64 {
    amount.round() as i64
}

/// Response of `POST /v1/payments/confirm`.
///
/// Only the fields this service consumes are modeled; the provider sends
/// considerably more. `card` and `receipt` are absent for some payment
/// methods and must never be assumed present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationResult {
    pub status: String,
    pub payment_key: String,
    #[serde(default)]
    pub last_transaction_key: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub approved_at: Option<String>,
    #[serde(default)]
    pub card: Option<CardSummary>,
    #[serde(default)]
    pub receipt: Option<ReceiptInfo>,
}

impl ConfirmationResult {
    pub fn is_done(&self) -> bool {
        self.status == DONE_STATUS
    }
}

/// Masked card details attached to a confirmed card payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSummary {
    #[serde(default)]
    pub company: Option<String>,
    /// Masked number, e.g. `123456******1234`.
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub approve_no: Option<String>,
    #[serde(default)]
    pub card_type: Option<String>,
    #[serde(default)]
    pub installment_plan_months: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptInfo {
    #[serde(default)]
    pub url: Option<String>,
}

/// Response of `POST /v1/payments/{paymentKey}/cancel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationResult {
    pub status: String,
    pub payment_key: String,
    #[serde(default)]
    pub last_transaction_key: Option<String>,
}

use crate::payments::error::ProviderResult;
use crate::payments::types::{CancellationResult, ConfirmationResult};
use async_trait::async_trait;

/// Server-to-server operations against the payment provider.
///
/// The callback processor depends on this seam rather than the concrete
/// HTTP client so the confirmation flow can be driven in tests without a
/// network.
#[async_trait]
pub trait TossApi: Send + Sync {
    /// Finalize a payment the browser reported as successful. Mandatory:
    /// the browser-side signal alone is not trustworthy.
    async fn confirm(
        &self,
        payment_key: &str,
        order_token: &str,
        amount: i64,
    ) -> ProviderResult<ConfirmationResult>;

    /// Cancel a confirmed payment, fully when `amount` is `None` or ≤ 0,
    /// partially otherwise.
    async fn cancel(
        &self,
        payment_key: &str,
        reason: &str,
        amount: Option<i64>,
    ) -> ProviderResult<CancellationResult>;
}

use crate::ledger::error::LedgerResult;
use crate::ledger::record::{ConfirmationDetails, PaymentRecord, PaymentStatus, TransitionOutcome};
use async_trait::async_trait;

/// Lookup and mutation of the internal payment ledger.
///
/// The ledger is the single point of shared mutable state between callback
/// invocations, so `transition_to` must be atomic relative to concurrent
/// transitions on the same record: of two near-simultaneous duplicate
/// callbacks exactly one observes `Applied`, the other `AlreadyFinalized`.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Direct lookup by order reference token.
    async fn find_by_order_reference(&self, token: &str) -> LedgerResult<Option<PaymentRecord>>;

    /// Fallback lookup for tokens that were generated but not yet durably
    /// attached: the payment id decoded from the token, restricted to
    /// records still pending.
    async fn find_latest_pending_by_internal_id(
        &self,
        internal_id: i64,
    ) -> LedgerResult<Option<PaymentRecord>>;

    /// Attach an order reference so future callbacks resolve via the
    /// direct lookup. Write-once: attaching the same token again is a
    /// no-op, a different token is a conflict.
    async fn attach_order_reference(&self, payment_id: i64, token: &str) -> LedgerResult<()>;

    /// Compare-and-set status transition, guarded on the record still being
    /// pending. An already-terminal record reports `AlreadyFinalized`
    /// without mutation.
    async fn transition_to(
        &self,
        payment_id: i64,
        new_status: PaymentStatus,
        note: &str,
    ) -> LedgerResult<TransitionOutcome>;

    /// Persist provider transaction metadata after a successful
    /// confirmation. Write-once.
    async fn record_confirmation(
        &self,
        payment_id: i64,
        details: &ConfirmationDetails,
    ) -> LedgerResult<()>;
}

//! Callback reconciliation state machine
//!
//! Consumes the browser-delivered callback from the payment provider and
//! drives it to exactly one terminal ledger transition:
//! parse → validate → resolve payment → idempotency gate →
//! branch (confirm or fail) → redirect decision.

use crate::ledger::record::ConfirmationDetails;
use crate::ledger::store::PaymentStore;
use crate::ledger::{PaymentRecord, PaymentStatus, TransitionOutcome};
use crate::payments::order_reference;
use crate::payments::provider::TossApi;
use crate::payments::types::round_whole_units;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    Success,
    Failure,
}

/// Raw inbound callback data, extracted from the query string. Transient;
/// never persisted.
#[derive(Debug, Clone)]
pub struct CallbackEnvelope {
    pub kind: CallbackKind,
    pub order_token: String,
    pub payment_key: Option<String>,
    pub claimed_amount: Option<f64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl CallbackEnvelope {
    /// A failure callback carrying neither code nor message. Processed
    /// anyway: absent provider detail must not keep the payment pending.
    pub fn is_incomplete_failure(&self) -> bool {
        self.kind == CallbackKind::Failure
            && self.error_code.is_none()
            && self.error_message.is_none()
    }
}

#[derive(Debug, Clone, Error)]
pub enum CallbackError {
    #[error("malformed callback: {reason}")]
    Malformed { reason: String },
}

/// Where the customer's browser lands after processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTarget {
    Success { payment_id: i64 },
    Failure,
}

/// Externally observable result of one callback invocation. The terminal
/// record status fully determines the redirect, independent of which
/// internal branch produced it.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub redirect: RedirectTarget,
    pub payment_id: Option<i64>,
    pub final_status: Option<PaymentStatus>,
}

impl CallbackOutcome {
    fn failure(payment_id: Option<i64>, final_status: Option<PaymentStatus>) -> Self {
        Self {
            redirect: RedirectTarget::Failure,
            payment_id,
            final_status,
        }
    }

    fn from_record(record: &PaymentRecord) -> Self {
        let redirect = if record.status == PaymentStatus::Completed {
            RedirectTarget::Success {
                payment_id: record.id,
            }
        } else {
            RedirectTarget::Failure
        };
        Self {
            redirect,
            payment_id: Some(record.id),
            final_status: Some(record.status),
        }
    }
}

pub struct CallbackProcessor {
    store: Arc<dyn PaymentStore>,
    provider: Arc<dyn TossApi>,
    // Serializes steps 4-5 per payment so duplicate callbacks cannot race
    // each other into two confirm calls. The store CAS stays the final
    // arbiter.
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl CallbackProcessor {
    pub fn new(store: Arc<dyn PaymentStore>, provider: Arc<dyn TossApi>) -> Self {
        Self {
            store,
            provider,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Extract the envelope from raw query parameters.
    pub fn parse(params: &HashMap<String, String>) -> Result<CallbackEnvelope, CallbackError> {
        let get = |key: &str| {
            params
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let order_token = get("orderId").ok_or_else(|| CallbackError::Malformed {
            reason: "missing orderId".to_string(),
        })?;

        let kind = match get("callback_type").as_deref() {
            Some("success") => CallbackKind::Success,
            Some("fail") => CallbackKind::Failure,
            Some(other) => {
                return Err(CallbackError::Malformed {
                    reason: format!("unknown callback_type: {}", other),
                })
            }
            None => {
                return Err(CallbackError::Malformed {
                    reason: "missing callback_type".to_string(),
                })
            }
        };

        Ok(match kind {
            CallbackKind::Success => CallbackEnvelope {
                kind,
                order_token,
                payment_key: get("paymentKey"),
                claimed_amount: get("amount").and_then(|v| v.parse::<f64>().ok()),
                error_code: None,
                error_message: None,
            },
            CallbackKind::Failure => CallbackEnvelope {
                kind,
                order_token,
                payment_key: None,
                claimed_amount: None,
                error_code: get("code"),
                error_message: get("message"),
            },
        })
    }

    /// Check kind-specific constraints on a parsed envelope.
    pub fn validate(envelope: &CallbackEnvelope) -> Result<(), CallbackError> {
        if envelope.kind == CallbackKind::Success {
            if envelope.payment_key.is_none() {
                return Err(CallbackError::Malformed {
                    reason: "success callback missing paymentKey".to_string(),
                });
            }
            if !envelope.claimed_amount.is_some_and(|a| a > 0.0) {
                return Err(CallbackError::Malformed {
                    reason: "success callback missing or non-positive amount".to_string(),
                });
            }
        }
        // Failure callbacks are valid even with neither code nor message;
        // the caller flags the incomplete record.
        Ok(())
    }

    /// Run the full state machine for one inbound callback. Never fails
    /// outward: every path resolves to a redirect decision.
    pub async fn handle(&self, params: &HashMap<String, String>) -> CallbackOutcome {
        let envelope = match Self::parse(params) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "callback rejected at parse");
                return CallbackOutcome::failure(None, None);
            }
        };

        if let Err(e) = Self::validate(&envelope) {
            warn!(order_token = %envelope.order_token, error = %e, "callback rejected at validate");
            return CallbackOutcome::failure(None, None);
        }

        if envelope.is_incomplete_failure() {
            warn!(
                order_token = %envelope.order_token,
                "failure callback carries no provider error detail"
            );
        }

        let record = match self.resolve_payment(&envelope.order_token).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                error!(order_token = %envelope.order_token, "no payment record for callback");
                return CallbackOutcome::failure(None, None);
            }
            Err(e) => {
                error!(order_token = %envelope.order_token, error = %e, "ledger lookup failed");
                return CallbackOutcome::failure(None, None);
            }
        };

        let payment_id = record.id;
        let lock = self.lock_for(payment_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.finalize(record, &envelope).await
        };
        self.release_lock(payment_id, &lock).await;
        outcome
    }

    /// Steps run under the per-payment lock: re-read, idempotency gate,
    /// branch to confirmation or failure.
    async fn finalize(
        &self,
        record: PaymentRecord,
        envelope: &CallbackEnvelope,
    ) -> CallbackOutcome {
        // Re-read under the lock; a duplicate may have finalized the
        // record while we waited.
        let record = match self.store.find_by_order_reference(&envelope.order_token).await {
            Ok(Some(current)) => current,
            Ok(None) => record,
            Err(e) => {
                error!(payment_id = record.id, error = %e, "ledger re-read failed");
                return CallbackOutcome::failure(Some(record.id), None);
            }
        };

        // Idempotency gate: a terminal record gets a redirect reflecting
        // its existing state, with no provider call and no mutation.
        if record.status.is_terminal() {
            info!(
                payment_id = record.id,
                status = %record.status,
                order_token = %envelope.order_token,
                "payment already finalized, skipping callback"
            );
            return CallbackOutcome::from_record(&record);
        }

        let final_record = match envelope.kind {
            CallbackKind::Success => self.process_success(&record, envelope).await,
            CallbackKind::Failure => self.process_failure(&record, envelope).await,
        };

        match final_record {
            Some(record) => CallbackOutcome::from_record(&record),
            None => CallbackOutcome::failure(Some(record.id), None),
        }
    }

    /// Locate the payment record for a token: direct lookup first, then
    /// the decoded-id fallback, attaching the reference on the way so the
    /// next identical callback hits the direct path.
    async fn resolve_payment(
        &self,
        order_token: &str,
    ) -> Result<Option<PaymentRecord>, crate::ledger::LedgerError> {
        if let Some(record) = self.store.find_by_order_reference(order_token).await? {
            return Ok(Some(record));
        }

        let Some(internal_id) = order_reference::parse(order_token) else {
            warn!(order_token = %order_token, "order token does not decode");
            return Ok(None);
        };

        let Some(record) = self
            .store
            .find_latest_pending_by_internal_id(internal_id)
            .await?
        else {
            warn!(
                order_token = %order_token,
                internal_id,
                "no pending payment for decoded id"
            );
            return Ok(None);
        };

        self.store
            .attach_order_reference(record.id, order_token)
            .await?;
        info!(
            payment_id = record.id,
            order_token = %order_token,
            "resolved payment via fallback lookup, reference attached"
        );

        Ok(Some(record))
    }

    async fn process_success(
        &self,
        record: &PaymentRecord,
        envelope: &CallbackEnvelope,
    ) -> Option<PaymentRecord> {
        // Validate guarantees these are present on the success branch.
        let payment_key = envelope.payment_key.as_deref()?;
        let claimed = envelope.claimed_amount?;

        let expected = record.expected_amount;
        let received = round_whole_units(claimed);

        // Fail closed: never confirm a mismatched amount.
        if expected != received {
            error!(
                payment_id = record.id,
                expected, received, "callback amount mismatch"
            );
            return self
                .apply_transition(
                    record.id,
                    PaymentStatus::Failed,
                    &format!("amount mismatch: expected {}, received {}", expected, received),
                )
                .await;
        }

        info!(
            payment_id = record.id,
            payment_key = %payment_key,
            amount = received,
            order_token = %envelope.order_token,
            "confirming payment with provider"
        );

        match self
            .provider
            .confirm(payment_key, &envelope.order_token, received)
            .await
        {
            Ok(confirmation) if confirmation.is_done() => {
                let applied = self
                    .apply_transition(
                        record.id,
                        PaymentStatus::Completed,
                        &format!("payment confirmed, paymentKey={}", confirmation.payment_key),
                    )
                    .await?;
                if applied.status == PaymentStatus::Completed {
                    let details = ConfirmationDetails::from(&confirmation);
                    if let Err(e) = self.store.record_confirmation(record.id, &details).await {
                        // The transition already landed; losing metadata is
                        // recoverable from the provider dashboard.
                        error!(payment_id = record.id, error = %e, "failed to persist confirmation metadata");
                    }
                }
                info!(payment_id = record.id, "payment completed");
                Some(applied)
            }
            Ok(confirmation) => {
                error!(
                    payment_id = record.id,
                    status = %confirmation.status,
                    "confirmation returned non-done status"
                );
                self.apply_transition(
                    record.id,
                    PaymentStatus::Failed,
                    &format!("unexpected confirmation status: {}", confirmation.status),
                )
                .await
            }
            Err(e) => {
                // A stuck pending record is worse than a wrong failed one:
                // pending blocks future retries from matching via the
                // fallback lookup.
                error!(
                    payment_id = record.id,
                    order_token = %envelope.order_token,
                    error = %e,
                    "provider confirmation failed"
                );
                self.apply_transition(record.id, PaymentStatus::Failed, &e.audit_note())
                    .await
            }
        }
    }

    async fn process_failure(
        &self,
        record: &PaymentRecord,
        envelope: &CallbackEnvelope,
    ) -> Option<PaymentRecord> {
        let code = envelope.error_code.as_deref().unwrap_or("");
        let message = envelope.error_message.as_deref().unwrap_or("");
        warn!(
            payment_id = record.id,
            code = %code,
            message = %message,
            order_token = %envelope.order_token,
            "payment failed via callback"
        );
        self.apply_transition(
            record.id,
            PaymentStatus::Failed,
            &format!("failed via callback: code={}, message={}", code, message),
        )
        .await
    }

    async fn apply_transition(
        &self,
        payment_id: i64,
        status: PaymentStatus,
        note: &str,
    ) -> Option<PaymentRecord> {
        match self.store.transition_to(payment_id, status, note).await {
            Ok(TransitionOutcome::Applied(record)) => Some(record),
            Ok(TransitionOutcome::AlreadyFinalized(record)) => {
                warn!(
                    payment_id,
                    status = %record.status,
                    "transition lost race, record already finalized"
                );
                Some(record)
            }
            Err(e) => {
                error!(payment_id, error = %e, "ledger transition failed");
                None
            }
        }
    }

    async fn lock_for(&self, payment_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(payment_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the map entry once no other callback holds the lock, so the
    /// table does not grow with every payment ever processed. The count
    /// check and removal happen under the map mutex, which `lock_for`
    /// also holds when cloning, so a waiter cannot slip in between.
    async fn release_lock(&self, payment_id: i64, lock: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference is the map's, one is ours.
        if Arc::strong_count(lock) == 2 {
            locks.remove(&payment_id);
        }
    }
}

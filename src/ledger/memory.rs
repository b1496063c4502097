use crate::ledger::error::{LedgerError, LedgerErrorKind, LedgerResult};
use crate::ledger::record::{ConfirmationDetails, PaymentRecord, PaymentStatus, TransitionOutcome};
use crate::ledger::store::PaymentStore;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    records: HashMap<i64, PaymentRecord>,
    by_reference: HashMap<String, i64>,
    next_id: i64,
}

/// In-memory ledger with the same compare-and-set semantics as the
/// Postgres adapter. Used by the test suite and for running the service
/// without a database.
#[derive(Default)]
pub struct MemoryPaymentStore {
    inner: RwLock<Inner>,
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending record the way the order-placement flow would,
    /// optionally with the order reference already attached.
    pub async fn create_pending(
        &self,
        expected_amount: i64,
        order_reference: Option<&str>,
    ) -> PaymentRecord {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;
        let now = Utc::now();
        let record = PaymentRecord {
            id,
            status: PaymentStatus::Pending,
            expected_amount,
            order_reference: order_reference.map(|t| t.to_string()),
            confirmation: None,
            note: None,
            created_at: now,
            updated_at: now,
        };
        if let Some(token) = order_reference {
            inner.by_reference.insert(token.to_string(), id);
        }
        inner.records.insert(id, record.clone());
        record
    }

    pub async fn get(&self, payment_id: i64) -> Option<PaymentRecord> {
        self.inner.read().await.records.get(&payment_id).cloned()
    }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn find_by_order_reference(&self, token: &str) -> LedgerResult<Option<PaymentRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_reference
            .get(token)
            .and_then(|id| inner.records.get(id))
            .cloned())
    }

    async fn find_latest_pending_by_internal_id(
        &self,
        internal_id: i64,
    ) -> LedgerResult<Option<PaymentRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .get(&internal_id)
            .filter(|r| r.status == PaymentStatus::Pending)
            .cloned())
    }

    async fn attach_order_reference(&self, payment_id: i64, token: &str) -> LedgerResult<()> {
        let mut inner = self.inner.write().await;

        if let Some(existing_id) = inner.by_reference.get(token) {
            if *existing_id != payment_id {
                return Err(LedgerError::new(LedgerErrorKind::UniqueViolation {
                    column: "order_reference".to_string(),
                    value: token.to_string(),
                }));
            }
        }

        let record = inner.records.get_mut(&payment_id).ok_or_else(|| {
            LedgerError::new(LedgerErrorKind::NotFound {
                payment_id: payment_id.to_string(),
            })
        })?;

        match &record.order_reference {
            Some(existing) if existing != token => Err(LedgerError::new(
                LedgerErrorKind::ReferenceConflict { payment_id },
            )),
            Some(_) => Ok(()),
            None => {
                record.order_reference = Some(token.to_string());
                record.updated_at = Utc::now();
                inner.by_reference.insert(token.to_string(), payment_id);
                Ok(())
            }
        }
    }

    async fn transition_to(
        &self,
        payment_id: i64,
        new_status: PaymentStatus,
        note: &str,
    ) -> LedgerResult<TransitionOutcome> {
        let mut inner = self.inner.write().await;
        let record = inner.records.get_mut(&payment_id).ok_or_else(|| {
            LedgerError::new(LedgerErrorKind::NotFound {
                payment_id: payment_id.to_string(),
            })
        })?;

        if record.status.is_terminal() {
            return Ok(TransitionOutcome::AlreadyFinalized(record.clone()));
        }

        record.status = new_status;
        record.note = Some(note.to_string());
        record.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied(record.clone()))
    }

    async fn record_confirmation(
        &self,
        payment_id: i64,
        details: &ConfirmationDetails,
    ) -> LedgerResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner.records.get_mut(&payment_id).ok_or_else(|| {
            LedgerError::new(LedgerErrorKind::NotFound {
                payment_id: payment_id.to_string(),
            })
        })?;

        // Write-once: a second confirmation never overwrites the first.
        if record.confirmation.is_none() {
            record.confirmation = Some(details.clone());
            record.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transition_applies_only_once() {
        let store = MemoryPaymentStore::new();
        let record = store.create_pending(50000, Some("order_1_1")).await;

        let first = store
            .transition_to(record.id, PaymentStatus::Completed, "confirmed")
            .await
            .expect("transition should succeed");
        assert!(first.was_applied());
        assert_eq!(first.record().status, PaymentStatus::Completed);

        let second = store
            .transition_to(record.id, PaymentStatus::Failed, "duplicate")
            .await
            .expect("transition should succeed");
        assert!(!second.was_applied());
        assert_eq!(second.record().status, PaymentStatus::Completed);
        assert_eq!(second.record().note.as_deref(), Some("confirmed"));
    }

    #[tokio::test]
    async fn attach_is_write_once() {
        let store = MemoryPaymentStore::new();
        let record = store.create_pending(1000, None).await;

        store
            .attach_order_reference(record.id, "order_1_7")
            .await
            .expect("first attach should succeed");
        // Same token again is idempotent.
        store
            .attach_order_reference(record.id, "order_1_7")
            .await
            .expect("re-attach of same token should succeed");
        // A different token is refused.
        assert!(store
            .attach_order_reference(record.id, "order_1_8")
            .await
            .is_err());

        let found = store
            .find_by_order_reference("order_1_7")
            .await
            .expect("lookup should succeed")
            .expect("record should resolve");
        assert_eq!(found.id, record.id);
    }

    #[tokio::test]
    async fn pending_lookup_ignores_finalized_records() {
        let store = MemoryPaymentStore::new();
        let record = store.create_pending(1000, None).await;

        assert!(store
            .find_latest_pending_by_internal_id(record.id)
            .await
            .expect("lookup should succeed")
            .is_some());

        store
            .transition_to(record.id, PaymentStatus::Failed, "declined")
            .await
            .expect("transition should succeed");

        assert!(store
            .find_latest_pending_by_internal_id(record.id)
            .await
            .expect("lookup should succeed")
            .is_none());
    }

    #[tokio::test]
    async fn confirmation_metadata_is_write_once() {
        let store = MemoryPaymentStore::new();
        let record = store.create_pending(1000, None).await;

        let first = ConfirmationDetails {
            payment_key: "pk_1".to_string(),
            ..Default::default()
        };
        let second = ConfirmationDetails {
            payment_key: "pk_2".to_string(),
            ..Default::default()
        };

        store
            .record_confirmation(record.id, &first)
            .await
            .expect("first write should succeed");
        store
            .record_confirmation(record.id, &second)
            .await
            .expect("second write should be a no-op");

        let stored = store.get(record.id).await.expect("record should exist");
        assert_eq!(
            stored.confirmation.map(|c| c.payment_key).as_deref(),
            Some("pk_1")
        );
    }
}

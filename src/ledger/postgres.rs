//! Postgres-backed payment ledger.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE payments (
//!     id BIGSERIAL PRIMARY KEY,
//!     status TEXT NOT NULL DEFAULT 'pending',
//!     expected_amount BIGINT NOT NULL,
//!     order_reference TEXT UNIQUE,
//!     provider_payment_key TEXT,
//!     transaction_key TEXT,
//!     method TEXT,
//!     approved_at TEXT,
//!     card_company TEXT,
//!     card_number TEXT,
//!     card_approve_no TEXT,
//!     card_type TEXT,
//!     card_installment_months INT,
//!     receipt_url TEXT,
//!     note TEXT,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use crate::ledger::error::{LedgerError, LedgerErrorKind, LedgerResult};
use crate::ledger::record::{ConfirmationDetails, PaymentRecord, PaymentStatus, TransitionOutcome};
use crate::ledger::store::PaymentStore;
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

const RECORD_COLUMNS: &str = "id, status, expected_amount, order_reference, provider_payment_key, \
     transaction_key, method, approved_at, card_company, card_number, card_approve_no, \
     card_type, card_installment_months, receipt_url, note, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
struct PaymentRow {
    id: i64,
    status: String,
    expected_amount: i64,
    order_reference: Option<String>,
    provider_payment_key: Option<String>,
    transaction_key: Option<String>,
    method: Option<String>,
    approved_at: Option<String>,
    card_company: Option<String>,
    card_number: Option<String>,
    card_approve_no: Option<String>,
    card_type: Option<String>,
    card_installment_months: Option<i32>,
    receipt_url: Option<String>,
    note: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl PaymentRow {
    fn into_record(self) -> LedgerResult<PaymentRecord> {
        let status = PaymentStatus::from_str(&self.status)
            .map_err(|message| LedgerError::new(LedgerErrorKind::Query { message }))?;

        let confirmation = self.provider_payment_key.map(|payment_key| ConfirmationDetails {
            payment_key,
            last_transaction_key: self.transaction_key,
            method: self.method,
            approved_at: self.approved_at,
            card_company: self.card_company,
            card_number: self.card_number,
            card_approve_no: self.card_approve_no,
            card_type: self.card_type,
            card_installment_months: self.card_installment_months,
            receipt_url: self.receipt_url,
        });

        Ok(PaymentRecord {
            id: self.id,
            status,
            expected_amount: self.expected_amount,
            order_reference: self.order_reference,
            confirmation,
            note: self.note,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_by_id(&self, payment_id: i64) -> LedgerResult<Option<PaymentRecord>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(LedgerError::from_sqlx)?;
        row.map(PaymentRow::into_record).transpose()
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn find_by_order_reference(&self, token: &str) -> LedgerResult<Option<PaymentRecord>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE order_reference = $1",
            RECORD_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(LedgerError::from_sqlx)?;
        row.map(PaymentRow::into_record).transpose()
    }

    async fn find_latest_pending_by_internal_id(
        &self,
        internal_id: i64,
    ) -> LedgerResult<Option<PaymentRecord>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = $1 AND status = 'pending' \
             ORDER BY created_at DESC LIMIT 1",
            RECORD_COLUMNS
        ))
        .bind(internal_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(LedgerError::from_sqlx)?;
        row.map(PaymentRow::into_record).transpose()
    }

    async fn attach_order_reference(&self, payment_id: i64, token: &str) -> LedgerResult<()> {
        let result = sqlx::query(
            "UPDATE payments SET order_reference = $2, updated_at = NOW() \
             WHERE id = $1 AND order_reference IS NULL",
        )
        .bind(payment_id)
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(LedgerError::from_sqlx)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Nothing updated: either the record is missing or a reference is
        // already attached. Re-attaching the same token is idempotent.
        match self.fetch_by_id(payment_id).await? {
            Some(record) if record.order_reference.as_deref() == Some(token) => Ok(()),
            Some(_) => Err(LedgerError::new(LedgerErrorKind::ReferenceConflict {
                payment_id,
            })),
            None => Err(LedgerError::new(LedgerErrorKind::NotFound {
                payment_id: payment_id.to_string(),
            })),
        }
    }

    async fn transition_to(
        &self,
        payment_id: i64,
        new_status: PaymentStatus,
        note: &str,
    ) -> LedgerResult<TransitionOutcome> {
        // The status guard makes this the atomic arbiter between
        // concurrent callbacks: at most one UPDATE matches.
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "UPDATE payments SET status = $2, note = $3, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending' RETURNING {}",
            RECORD_COLUMNS
        ))
        .bind(payment_id)
        .bind(new_status.as_str())
        .bind(note)
        .fetch_optional(&self.pool)
        .await
        .map_err(LedgerError::from_sqlx)?;

        if let Some(row) = row {
            return Ok(TransitionOutcome::Applied(row.into_record()?));
        }

        match self.fetch_by_id(payment_id).await? {
            Some(record) => Ok(TransitionOutcome::AlreadyFinalized(record)),
            None => Err(LedgerError::new(LedgerErrorKind::NotFound {
                payment_id: payment_id.to_string(),
            })),
        }
    }

    async fn record_confirmation(
        &self,
        payment_id: i64,
        details: &ConfirmationDetails,
    ) -> LedgerResult<()> {
        sqlx::query(
            "UPDATE payments SET provider_payment_key = $2, transaction_key = $3, method = $4, \
             approved_at = $5, card_company = $6, card_number = $7, card_approve_no = $8, \
             card_type = $9, card_installment_months = $10, receipt_url = $11, updated_at = NOW() \
             WHERE id = $1 AND provider_payment_key IS NULL",
        )
        .bind(payment_id)
        .bind(&details.payment_key)
        .bind(&details.last_transaction_key)
        .bind(&details.method)
        .bind(&details.approved_at)
        .bind(&details.card_company)
        .bind(&details.card_number)
        .bind(&details.card_approve_no)
        .bind(&details.card_type)
        .bind(details.card_installment_months)
        .bind(&details.receipt_url)
        .execute(&self.pool)
        .await
        .map_err(LedgerError::from_sqlx)?;
        Ok(())
    }
}

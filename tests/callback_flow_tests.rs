use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tosspay_reconciler::ledger::{MemoryPaymentStore, PaymentStatus};
use tosspay_reconciler::payments::error::{ProviderError, ProviderResult};
use tosspay_reconciler::payments::order_reference;
use tosspay_reconciler::payments::provider::TossApi;
use tosspay_reconciler::payments::types::{
    CancellationResult, CardSummary, ConfirmationResult, ReceiptInfo,
};
use tosspay_reconciler::services::callback_processor::{CallbackProcessor, RedirectTarget};

enum ConfirmBehavior {
    Done,
    Status(&'static str),
    Rejected {
        code: &'static str,
        message: &'static str,
    },
    Unreachable,
}

struct MockTossApi {
    behavior: ConfirmBehavior,
    confirm_calls: AtomicUsize,
}

impl MockTossApi {
    fn new(behavior: ConfirmBehavior) -> Self {
        Self {
            behavior,
            confirm_calls: AtomicUsize::new(0),
        }
    }

    fn confirm_count(&self) -> usize {
        self.confirm_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TossApi for MockTossApi {
    async fn confirm(
        &self,
        payment_key: &str,
        _order_token: &str,
        _amount: i64,
    ) -> ProviderResult<ConfirmationResult> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            ConfirmBehavior::Done => Ok(ConfirmationResult {
                status: "DONE".to_string(),
                payment_key: payment_key.to_string(),
                last_transaction_key: Some("tk_1".to_string()),
                method: Some("카드".to_string()),
                approved_at: Some("2026-08-26T10:00:00+09:00".to_string()),
                card: Some(CardSummary {
                    company: Some("신한".to_string()),
                    number: Some("123456******1234".to_string()),
                    approve_no: Some("00000000".to_string()),
                    card_type: Some("신용".to_string()),
                    installment_plan_months: Some(0),
                }),
                receipt: Some(ReceiptInfo {
                    url: Some("https://dashboard.tosspayments.com/receipt/1".to_string()),
                }),
            }),
            ConfirmBehavior::Status(status) => Ok(ConfirmationResult {
                status: status.to_string(),
                payment_key: payment_key.to_string(),
                last_transaction_key: None,
                method: None,
                approved_at: None,
                card: None,
                receipt: None,
            }),
            ConfirmBehavior::Rejected { code, message } => Err(ProviderError::Rejected {
                code: code.to_string(),
                message: message.to_string(),
            }),
            ConfirmBehavior::Unreachable => Err(ProviderError::Unreachable {
                message: "connect timeout".to_string(),
            }),
        }
    }

    async fn cancel(
        &self,
        payment_key: &str,
        _reason: &str,
        _amount: Option<i64>,
    ) -> ProviderResult<CancellationResult> {
        Ok(CancellationResult {
            status: "CANCELED".to_string(),
            payment_key: payment_key.to_string(),
            last_transaction_key: None,
        })
    }
}

fn success_params(token: &str, payment_key: &str, amount: &str) -> HashMap<String, String> {
    [
        ("callback_type", "success"),
        ("orderId", token),
        ("paymentKey", payment_key),
        ("amount", amount),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn failure_params(token: &str, code: &str, message: &str) -> HashMap<String, String> {
    let mut params: HashMap<String, String> = [("callback_type", "fail"), ("orderId", token)]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    if !code.is_empty() {
        params.insert("code".to_string(), code.to_string());
    }
    if !message.is_empty() {
        params.insert("message".to_string(), message.to_string());
    }
    params
}

fn setup(behavior: ConfirmBehavior) -> (Arc<MemoryPaymentStore>, Arc<MockTossApi>, CallbackProcessor) {
    let store = Arc::new(MemoryPaymentStore::new());
    let api = Arc::new(MockTossApi::new(behavior));
    let processor = CallbackProcessor::new(store.clone(), api.clone());
    (store, api, processor)
}

#[tokio::test]
async fn success_callback_completes_payment_and_persists_metadata() {
    let (store, api, processor) = setup(ConfirmBehavior::Done);
    let record = store.create_pending(50000, Some("order_1_100")).await;

    let outcome = processor
        .handle(&success_params("order_1_100", "pk_1", "50000"))
        .await;

    assert_eq!(
        outcome.redirect,
        RedirectTarget::Success {
            payment_id: record.id
        }
    );
    assert_eq!(outcome.final_status, Some(PaymentStatus::Completed));
    assert_eq!(api.confirm_count(), 1);

    let stored = store.get(record.id).await.expect("record should exist");
    assert_eq!(stored.status, PaymentStatus::Completed);
    let confirmation = stored.confirmation.expect("metadata should be persisted");
    assert_eq!(confirmation.payment_key, "pk_1");
    assert_eq!(confirmation.last_transaction_key.as_deref(), Some("tk_1"));
    assert_eq!(confirmation.card_company.as_deref(), Some("신한"));
    assert_eq!(
        confirmation.receipt_url.as_deref(),
        Some("https://dashboard.tosspayments.com/receipt/1")
    );
}

#[tokio::test]
async fn duplicate_success_callback_confirms_only_once() {
    let (store, api, processor) = setup(ConfirmBehavior::Done);
    let record = store.create_pending(50000, Some("order_1_100")).await;
    let params = success_params("order_1_100", "pk_1", "50000");

    let first = processor.handle(&params).await;
    assert_eq!(first.final_status, Some(PaymentStatus::Completed));

    let second = processor.handle(&params).await;
    assert_eq!(
        second.redirect,
        RedirectTarget::Success {
            payment_id: record.id
        }
    );
    assert_eq!(second.final_status, Some(PaymentStatus::Completed));

    // The idempotency gate skipped the provider on the replay.
    assert_eq!(api.confirm_count(), 1);
}

#[tokio::test]
async fn amount_mismatch_fails_closed_without_provider_call() {
    let (store, api, processor) = setup(ConfirmBehavior::Done);
    let record = store.create_pending(50000, Some("order_1_100")).await;

    let outcome = processor
        .handle(&success_params("order_1_100", "pk_1", "49999"))
        .await;

    assert_eq!(outcome.redirect, RedirectTarget::Failure);
    assert_eq!(outcome.final_status, Some(PaymentStatus::Failed));
    assert_eq!(api.confirm_count(), 0);

    let stored = store.get(record.id).await.expect("record should exist");
    assert_eq!(stored.status, PaymentStatus::Failed);
    assert!(stored
        .note
        .as_deref()
        .expect("note should be set")
        .contains("amount mismatch"));
}

#[tokio::test]
async fn fractional_claimed_amount_rounds_before_comparison() {
    let (store, _api, processor) = setup(ConfirmBehavior::Done);
    let record = store.create_pending(50000, Some("order_1_100")).await;

    let outcome = processor
        .handle(&success_params("order_1_100", "pk_1", "49999.6"))
        .await;

    assert_eq!(outcome.final_status, Some(PaymentStatus::Completed));
    let stored = store.get(record.id).await.expect("record should exist");
    assert_eq!(stored.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn provider_rejection_fails_payment_with_code_in_note() {
    let (store, api, processor) = setup(ConfirmBehavior::Rejected {
        code: "REJECT_CARD_COMPANY",
        message: "카드사에서 거절되었습니다.",
    });
    let record = store.create_pending(50000, Some("order_1_100")).await;

    let outcome = processor
        .handle(&success_params("order_1_100", "pk_1", "50000"))
        .await;

    assert_eq!(outcome.redirect, RedirectTarget::Failure);
    assert_eq!(api.confirm_count(), 1);

    let stored = store.get(record.id).await.expect("record should exist");
    assert_eq!(stored.status, PaymentStatus::Failed);
    let note = stored.note.expect("note should be set");
    assert!(note.contains("REJECT_CARD_COMPANY"));
    assert!(note.contains("카드사에서 거절되었습니다."));
}

#[tokio::test]
async fn unreachable_provider_fails_payment_instead_of_leaving_it_pending() {
    let (store, _api, processor) = setup(ConfirmBehavior::Unreachable);
    let record = store.create_pending(50000, Some("order_1_100")).await;

    let outcome = processor
        .handle(&success_params("order_1_100", "pk_1", "50000"))
        .await;

    assert_eq!(outcome.redirect, RedirectTarget::Failure);
    let stored = store.get(record.id).await.expect("record should exist");
    assert_eq!(stored.status, PaymentStatus::Failed);
    assert!(stored
        .note
        .expect("note should be set")
        .contains("provider unreachable"));
}

#[tokio::test]
async fn non_done_confirmation_status_fails_payment() {
    let (store, _api, processor) = setup(ConfirmBehavior::Status("IN_PROGRESS"));
    let record = store.create_pending(50000, Some("order_1_100")).await;

    let outcome = processor
        .handle(&success_params("order_1_100", "pk_1", "50000"))
        .await;

    assert_eq!(outcome.final_status, Some(PaymentStatus::Failed));
    let stored = store.get(record.id).await.expect("record should exist");
    assert!(stored
        .note
        .expect("note should be set")
        .contains("IN_PROGRESS"));
}

#[tokio::test]
async fn failure_callback_fails_payment_without_provider_call() {
    let (store, api, processor) = setup(ConfirmBehavior::Done);
    let record = store.create_pending(50000, Some("order_1_100")).await;

    let outcome = processor
        .handle(&failure_params(
            "order_1_100",
            "PAY_PROCESS_CANCELED",
            "사용자에 의해 결제가 취소되었습니다.",
        ))
        .await;

    assert_eq!(outcome.redirect, RedirectTarget::Failure);
    assert_eq!(api.confirm_count(), 0);

    let stored = store.get(record.id).await.expect("record should exist");
    assert_eq!(stored.status, PaymentStatus::Failed);
    assert!(stored
        .note
        .expect("note should be set")
        .contains("PAY_PROCESS_CANCELED"));
}

#[tokio::test]
async fn failure_callback_without_error_detail_still_fails_payment() {
    let (store, _api, processor) = setup(ConfirmBehavior::Done);
    let record = store.create_pending(50000, Some("order_1_100")).await;

    let outcome = processor.handle(&failure_params("order_1_100", "", "")).await;

    assert_eq!(outcome.redirect, RedirectTarget::Failure);
    let stored = store.get(record.id).await.expect("record should exist");
    assert_eq!(stored.status, PaymentStatus::Failed);
}

#[tokio::test]
async fn fallback_lookup_resolves_and_attaches_reference() {
    let (store, api, processor) = setup(ConfirmBehavior::Done);
    // Reference generated but never durably attached.
    let record = store.create_pending(50000, None).await;
    let token = order_reference::generate(record.id);

    let outcome = processor
        .handle(&success_params(&token, "pk_1", "50000"))
        .await;

    assert_eq!(outcome.final_status, Some(PaymentStatus::Completed));
    let stored = store.get(record.id).await.expect("record should exist");
    assert_eq!(stored.order_reference.as_deref(), Some(token.as_str()));

    // The replay now resolves via the direct lookup and hits the
    // idempotency gate.
    let replay = processor
        .handle(&success_params(&token, "pk_1", "50000"))
        .await;
    assert_eq!(replay.final_status, Some(PaymentStatus::Completed));
    assert_eq!(api.confirm_count(), 1);
}

#[tokio::test]
async fn unresolvable_token_redirects_to_failure_without_mutation() {
    let (store, api, processor) = setup(ConfirmBehavior::Done);
    let record = store.create_pending(50000, Some("order_1_100")).await;

    // Decodes to an id with no pending record.
    let outcome = processor
        .handle(&success_params("order_999_100", "pk_1", "50000"))
        .await;
    assert_eq!(outcome.redirect, RedirectTarget::Failure);
    assert!(outcome.payment_id.is_none());

    // Does not decode at all.
    let outcome = processor
        .handle(&success_params("not-a-token", "pk_1", "50000"))
        .await;
    assert_eq!(outcome.redirect, RedirectTarget::Failure);

    assert_eq!(api.confirm_count(), 0);
    let stored = store.get(record.id).await.expect("record should exist");
    assert_eq!(stored.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn malformed_callbacks_redirect_to_failure_without_mutation() {
    let (store, api, processor) = setup(ConfirmBehavior::Done);
    let record = store.create_pending(50000, Some("order_1_100")).await;

    // Missing paymentKey.
    let mut params = success_params("order_1_100", "pk_1", "50000");
    params.remove("paymentKey");
    assert_eq!(processor.handle(&params).await.redirect, RedirectTarget::Failure);

    // Zero amount.
    let outcome = processor
        .handle(&success_params("order_1_100", "pk_1", "0"))
        .await;
    assert_eq!(outcome.redirect, RedirectTarget::Failure);

    // Unknown callback kind.
    let mut params = success_params("order_1_100", "pk_1", "50000");
    params.insert("callback_type".to_string(), "refund".to_string());
    assert_eq!(processor.handle(&params).await.redirect, RedirectTarget::Failure);

    assert_eq!(api.confirm_count(), 0);
    let stored = store.get(record.id).await.expect("record should exist");
    assert_eq!(stored.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn concurrent_duplicate_callbacks_confirm_exactly_once() {
    let (store, api, processor) = setup(ConfirmBehavior::Done);
    let record = store.create_pending(50000, Some("order_1_100")).await;
    let processor = Arc::new(processor);
    let params = success_params("order_1_100", "pk_1", "50000");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let processor = processor.clone();
        let params = params.clone();
        handles.push(tokio::spawn(
            async move { processor.handle(&params).await },
        ));
    }

    for handle in handles {
        let outcome = handle.await.expect("task should not panic");
        assert_eq!(
            outcome.redirect,
            RedirectTarget::Success {
                payment_id: record.id
            }
        );
    }

    assert_eq!(api.confirm_count(), 1);
    let stored = store.get(record.id).await.expect("record should exist");
    assert_eq!(stored.status, PaymentStatus::Completed);
}

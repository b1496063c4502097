use crate::config::ProviderConfig;
use crate::payments::error::{ProviderError, ProviderResult};
use crate::payments::provider::TossApi;
use crate::payments::types::{CancellationResult, ConfirmationResult};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, error};

/// Cancel reasons longer than this are truncated before sending.
const MAX_CANCEL_REASON_CHARS: usize = 200;

/// Stateless client for the provider's confirm/cancel endpoints.
///
/// Owns request signing (Basic auth derived from the secret key), JSON
/// decoding and error classification. Performs no retries: the browser
/// redirect that triggers a confirm is a one-shot event. Construction
/// takes an already-validated [`ProviderConfig`]; environment loading
/// lives in the config layer with the other sections.
pub struct TossClient {
    config: ProviderConfig,
    http: Client,
}

impl TossClient {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Unreachable {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn basic_credential(&self) -> String {
        BASE64.encode(format!("{}:", self.config.secret_key))
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &JsonValue,
    ) -> ProviderResult<T> {
        let url = self.endpoint(path);
        debug!(url = %url, "provider request");

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Basic {}", self.basic_credential()))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(url = %url, error = %e, "provider request failed");
                ProviderError::Unreachable {
                    message: format!("provider request failed: {}", e),
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Unreachable {
                message: format!("failed to read provider response: {}", e),
            })?;
        debug!(status = %status, "provider response");

        decode_body(status, &text)
    }
}

/// Classify a provider response body.
///
/// Non-2xx statuses and 2xx bodies that carry the `{code, message}` error
/// envelope both become `Rejected`; anything undecodable is
/// `InvalidResponse`.
fn decode_body<T: DeserializeOwned>(status: StatusCode, text: &str) -> ProviderResult<T> {
    if !status.is_success() {
        let envelope: TossErrorBody = serde_json::from_str(text).unwrap_or_default();
        return Err(ProviderError::Rejected {
            code: envelope
                .code
                .unwrap_or_else(|| format!("HTTP_{}", status.as_u16())),
            message: envelope
                .message
                .unwrap_or_else(|| "provider returned an error response".to_string()),
        });
    }

    if let Ok(TossErrorBody {
        code: Some(code),
        message,
    }) = serde_json::from_str::<TossErrorBody>(text)
    {
        return Err(ProviderError::Rejected {
            code,
            message: message.unwrap_or_default(),
        });
    }

    serde_json::from_str::<T>(text).map_err(|e| ProviderError::InvalidResponse {
        message: format!("failed to decode provider response: {}", e),
    })
}

fn truncate_reason(reason: &str) -> String {
    reason.chars().take(MAX_CANCEL_REASON_CHARS).collect()
}

/// Request body for a cancellation. `cancelAmount` is only sent for a
/// positive partial amount; omitting it means full cancellation.
fn cancel_body(reason: &str, amount: Option<i64>) -> JsonValue {
    let mut body = serde_json::json!({
        "cancelReason": truncate_reason(reason),
    });
    if let Some(partial) = amount.filter(|a| *a > 0) {
        body["cancelAmount"] = serde_json::json!(partial);
    }
    body
}

#[async_trait]
impl TossApi for TossClient {
    async fn confirm(
        &self,
        payment_key: &str,
        order_token: &str,
        amount: i64,
    ) -> ProviderResult<ConfirmationResult> {
        let body = serde_json::json!({
            "paymentKey": payment_key,
            "orderId": order_token,
            "amount": amount,
        });
        self.post_json("/v1/payments/confirm", &body).await
    }

    async fn cancel(
        &self,
        payment_key: &str,
        reason: &str,
        amount: Option<i64>,
    ) -> ProviderResult<CancellationResult> {
        let body = cancel_body(reason, amount);
        self.post_json(&format!("/v1/payments/{}/cancel", payment_key), &body)
            .await
    }
}

#[derive(Debug, Default, Deserialize)]
struct TossErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

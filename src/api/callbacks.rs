use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect},
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::RedirectConfig;
use crate::services::callback_processor::{CallbackProcessor, RedirectTarget};

pub struct CallbackState {
    pub processor: Arc<CallbackProcessor>,
    pub redirects: RedirectConfig,
}

/// GET /callbacks/toss
///
/// The provider redirects the customer's browser here after an off-site
/// payment attempt. The response is always a redirect; no processing
/// detail ever reaches the customer.
pub async fn handle_toss_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    info!("received payment callback");

    let outcome = state.processor.handle(&params).await;
    let url = redirect_url(&state.redirects, &outcome.redirect);

    info!(
        payment_id = outcome.payment_id,
        status = outcome.final_status.map(|s| s.as_str()),
        "redirecting customer"
    );
    Redirect::to(&url)
}

fn redirect_url(redirects: &RedirectConfig, target: &RedirectTarget) -> String {
    match target {
        RedirectTarget::Success { payment_id } => {
            let separator = if redirects.success_url.contains('?') {
                '&'
            } else {
                '?'
            };
            format!(
                "{}{}payment_id={}",
                redirects.success_url, separator, payment_id
            )
        }
        RedirectTarget::Failure => redirects.failure_url.clone(),
    }
}

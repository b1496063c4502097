//! Order reference tokens
//!
//! A token correlates a provider-side payment attempt with an internal
//! payment record. Format: `order_{payment_id}_{nonce}` where the nonce is
//! the unix timestamp at generation, so retried attempts on the same payment
//! produce distinct tokens that still decode to the same id.

use std::time::{SystemTime, UNIX_EPOCH};

const TOKEN_PREFIX: &str = "order_";

/// Generate a fresh order reference token for a payment record.
pub fn generate(internal_id: i64) -> String {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{}{}_{}", TOKEN_PREFIX, internal_id, nonce)
}

/// Extract the internal payment id from a token.
///
/// Only tokens matching the exact expected shape decode; anything else
/// (wrong prefix, non-numeric segments, truncated input) yields `None`.
pub fn parse(token: &str) -> Option<i64> {
    let rest = token.strip_prefix(TOKEN_PREFIX)?;
    let (id_part, nonce_part) = rest.split_once('_')?;

    if id_part.is_empty()
        || nonce_part.is_empty()
        || !id_part.bytes().all(|b| b.is_ascii_digit())
        || !nonce_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let id: i64 = id_part.parse().ok()?;
    // Nonce must be numeric but its value is irrelevant here.
    let _: u64 = nonce_part.parse().ok()?;

    if id >= 1 {
        Some(id)
    } else {
        None
    }
}

/// Build the browser callback URL the provider redirects back to.
///
/// The provider appends its own parameters (paymentKey/amount on success,
/// code/message on failure); `callback_type` and `orderId` are ours.
pub fn callback_url(base_url: &str, callback_type: &str, token: &str) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}callback_type={}&orderId={}",
        base_url, separator, callback_type, token
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_round_trip() {
        for id in [1_i64, 2, 42, 999_999, i64::MAX] {
            let token = generate(id);
            assert_eq!(parse(&token), Some(id), "token {} failed", token);
        }
    }

    #[test]
    fn tokens_for_repeated_attempts_decode_to_same_id() {
        let first = generate(7);
        let second = generate(7);
        assert_eq!(parse(&first), Some(7));
        assert_eq!(parse(&second), Some(7));
    }

    #[test]
    fn malformed_tokens_parse_to_none() {
        let malformed = [
            "",
            "order_",
            "order_123",
            "order__",
            "order_123_",
            "order__456",
            "order_abc_123",
            "order_123_xyz",
            "order_123_456_789",
            "booking_123_456",
            "ORDER_123_456",
            "order_-1_456",
            "order_ 1_456",
            "order_0_456",
            "order_999999999999999999999_456",
        ];
        for token in malformed {
            assert_eq!(parse(token), None, "token {:?} should not decode", token);
        }
    }

    #[test]
    fn callback_url_appends_query_parameters() {
        let url = callback_url("https://shop.example.com/cb", "success", "order_5_1700000000");
        assert_eq!(
            url,
            "https://shop.example.com/cb?callback_type=success&orderId=order_5_1700000000"
        );

        let url = callback_url("https://shop.example.com/cb?lang=ko", "fail", "order_5_1");
        assert_eq!(
            url,
            "https://shop.example.com/cb?lang=ko&callback_type=fail&orderId=order_5_1"
        );
    }
}

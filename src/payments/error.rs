use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Failure taxonomy for the provider's server-to-server API.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Transport-level failure: connection refused, DNS, timeout. The
    /// original browser redirect is a one-shot event, so these are not
    /// retried; the record resolves to failed and the customer re-attempts.
    #[error("provider unreachable: {message}")]
    Unreachable { message: String },

    /// The provider answered with a non-success status or an error payload.
    /// Code and message are preserved verbatim for the audit note.
    #[error("provider rejected request: code={code}, message={message}")]
    Rejected { code: String, message: String },

    /// 2xx response whose body could not be decoded.
    #[error("invalid provider response: {message}")]
    InvalidResponse { message: String },
}

impl ProviderError {
    pub fn is_transport(&self) -> bool {
        matches!(self, ProviderError::Unreachable { .. })
    }

    /// Short diagnostic used in ledger transition notes.
    pub fn audit_note(&self) -> String {
        match self {
            ProviderError::Unreachable { message } => {
                format!("provider unreachable: {}", message)
            }
            ProviderError::Rejected { code, message } => {
                format!("confirmation rejected: code={}, message={}", code, message)
            }
            ProviderError::InvalidResponse { message } => {
                format!("invalid provider response: {}", message)
            }
        }
    }
}

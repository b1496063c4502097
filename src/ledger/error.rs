use std::fmt;

/// Error kinds for ledger operations.
#[derive(Debug, Clone)]
pub enum LedgerErrorKind {
    /// Record does not exist
    NotFound { payment_id: String },
    /// Unique constraint violation (duplicate order reference)
    UniqueViolation { column: String, value: String },
    /// Order reference already attached with a different value
    ReferenceConflict { payment_id: i64 },
    /// Query execution error
    Query { message: String },
    /// Connection-level failure
    Connection { message: String },
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Clone)]
pub struct LedgerError {
    pub kind: LedgerErrorKind,
    pub context: Option<String>,
}

impl LedgerError {
    pub fn new(kind: LedgerErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, LedgerErrorKind::Connection { .. })
    }

    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::new(LedgerErrorKind::NotFound {
                payment_id: "unknown".to_string(),
            }),
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                Self::new(LedgerErrorKind::UniqueViolation {
                    column: db.constraint().unwrap_or("unknown").to_string(),
                    value: String::new(),
                })
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                Self::new(LedgerErrorKind::Connection {
                    message: err.to_string(),
                })
            }
            _ => Self::new(LedgerErrorKind::Query {
                message: err.to_string(),
            }),
        }
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LedgerErrorKind::NotFound { payment_id } => {
                write!(f, "payment record not found: {}", payment_id)?
            }
            LedgerErrorKind::UniqueViolation { column, value } => {
                write!(f, "unique violation on {}: {}", column, value)?
            }
            LedgerErrorKind::ReferenceConflict { payment_id } => write!(
                f,
                "order reference already attached for payment {}",
                payment_id
            )?,
            LedgerErrorKind::Query { message } => write!(f, "ledger query error: {}", message)?,
            LedgerErrorKind::Connection { message } => {
                write!(f, "ledger connection error: {}", message)?
            }
        }
        if let Some(context) = &self.context {
            write!(f, " ({})", context)?;
        }
        Ok(())
    }
}

impl std::error::Error for LedgerError {}

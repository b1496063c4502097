pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use error::{LedgerError, LedgerErrorKind, LedgerResult};
pub use memory::MemoryPaymentStore;
pub use postgres::PgPaymentStore;
pub use record::{ConfirmationDetails, PaymentRecord, PaymentStatus, TransitionOutcome};
pub use store::PaymentStore;

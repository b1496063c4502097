//! Services module for business logic

pub mod callback_processor;

pub use callback_processor::{
    CallbackEnvelope, CallbackKind, CallbackOutcome, CallbackProcessor, RedirectTarget,
};

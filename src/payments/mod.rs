pub mod error;
pub mod order_reference;
pub mod provider;
pub mod toss;
pub mod types;

//! Reconciles the browser-redirect card payment flow (Toss Payments) with
//! the internal payment ledger: one callback in, at most one terminal
//! status transition out, then a redirect.

pub mod api;
pub mod config;
pub mod health;
pub mod ledger;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;

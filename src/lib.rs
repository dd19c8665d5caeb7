//! Tester reward platform core.
//!
//! Turns untrusted test submissions into settled outcomes: a durable job
//! store drives a fraud-evaluation pipeline, a review state machine gates
//! every payout, and a credit ledger is the only component that moves money.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod models;
pub mod routes;
pub mod services;

//! Outreach job queue
//!
//! A priority job queue service with a lease protocol, and a polling worker
//! that carries out jobs against a third-party website through a resilient
//! navigator (bounded attempts, fallback addresses, jittered backoff).

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod worker;

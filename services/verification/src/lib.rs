//! Anonymous-token verification service library crate.
//!
//! # Purpose
//! Exposes the HTTP API, configuration, storage backends, and the issuance,
//! rate-limiting, and sweep services for use by the binary and tests.
//!
//! # Notes
//! Key material (derivation, rollover, session tokens) lives in
//! `anontoken-keys`; this crate owns persistence and request handling.
pub mod api;
pub mod app;
pub mod config;
pub mod issuance;
pub mod ledger;
pub mod observability;
pub mod rate_limit;
pub mod store;
pub mod sweep;
pub mod verification;

//! Verification service HTTP API.
pub mod error;
pub mod keys;
pub mod system;
pub mod tokens;
pub mod types;

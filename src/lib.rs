//! Query-key invalidation for the artifact repository admin console.

pub mod cache;
pub mod config;
pub mod error;
pub mod infra;

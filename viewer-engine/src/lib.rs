//! Client-side resilience engine for live CCTV viewing: tier-aware stream
//! tuning, automatic playback failure recovery and session heartbeat
//! bookkeeping against the platform backend.

pub mod types;
pub mod errors;
pub mod tuning;
pub mod client;
pub mod recovery;
#[cfg(test)]
mod recovery_test;
pub mod session;
pub mod playback;
pub mod config;
pub mod serde_helpers;
pub mod mock_server;
pub mod app;
#[cfg(test)]
mod error_handling_integration_test;

pub use errors::*;
pub use types::*;

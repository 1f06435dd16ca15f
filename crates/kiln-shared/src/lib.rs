//! # kiln-shared
//!
//! Shared components for the kiln batch-processing platform: the domain data
//! model, the authoritative data store (Postgres and in-memory providers),
//! the command-message queue transport, configuration, and telemetry setup.
//!
//! Both the scheduler core (`kiln-scheduler`) and any future surfaces build
//! on this crate. It intentionally carries no HTTP or RPC machinery.

pub mod config;
pub mod errors;
pub mod messaging;
pub mod models;
pub mod resources;
pub mod store;
pub mod telemetry;

pub use errors::{KilnError, KilnResult, ValidationError};

//! Module Exports
//!
//! - `protocol`: tagged binary frames for controller input and telemetry.
//! - `link`: receive filtering, command dispatch and periodic telemetry.

/// Module for encoding and decoding radio frames.
pub mod protocol;
/// Module for the inbound command path and outbound telemetry.
pub mod link;

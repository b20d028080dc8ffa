//! Module Exports
//!
//! - `motors`: the current motor command, the staleness watchdog and the
//!   H-bridge output stage.
//! - `encoders`: interrupt-fed tick counters and the smoothed speed estimator.

/// Module for driving the wheel motors.
pub mod motors;
/// Module for counting encoder edges and estimating wheel speed.
pub mod encoders;

pub use encoders::{SpeedEstimate, SpeedEstimator, SpeedSlot, TickCounters};
pub use motors::{CommandSlot, HBridge, MotorCommand, MotorController, MotorError};

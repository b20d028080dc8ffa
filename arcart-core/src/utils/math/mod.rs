//! Math utilities for the AR Cart.
//!
//! - `smoothing`: the fixed-weight exponential moving average used for wheel speed
//! - `mixing`: the stick-to-wheel mapping applied to controller input

pub mod mixing;
pub mod smoothing;

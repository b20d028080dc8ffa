//! Control core for the AR Cart, a four-wheel differential drive vehicle steered
//! over a broadcast radio link.
//!
//! The crate is `no_std`; hardware is reached through `embedded-hal` PWM channels
//! and the [`Radio`](utils::connection::link::Radio) trait. See the `mock-cart`
//! application for a host build that runs every task against simulated peripherals.
#![cfg_attr(not(test), no_std)]

pub mod utils;

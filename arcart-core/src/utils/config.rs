//! Vehicle identity and startup configuration.
//!
//! The only value that has to come from outside is the cart's numeric address;
//! everything else defaults to the timing and pin layout of the reference board.

use core::fmt;

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

/// Depth of the inbound controller-input queue. Inputs arriving while it is full
/// are dropped.
pub const COMMAND_QUEUE_DEPTH: usize = 5;

/// Link-layer destination used for every outbound frame.
pub const BROADCAST_PEER: [u8; 6] = [0xFF; 6];

/// Numeric address of a cart. Controller inputs carry the address of the cart
/// they are meant for; telemetry is tagged with the sender's address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleAddress(u32);

impl VehicleAddress {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for VehicleAddress {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for VehicleAddress {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "cart#{}", self.0)
    }
}

/// The four driven wheels, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wheel {
    LeftFront,
    LeftRear,
    RightFront,
    RightRear,
}

impl Wheel {
    pub const ALL: [Wheel; 4] = [
        Wheel::LeftFront,
        Wheel::LeftRear,
        Wheel::RightFront,
        Wheel::RightRear,
    ];

    /// Position of this wheel in per-wheel arrays.
    pub const fn index(self) -> usize {
        match self {
            Wheel::LeftFront => 0,
            Wheel::LeftRear => 1,
            Wheel::RightFront => 2,
            Wheel::RightRear => 3,
        }
    }

    /// Short motor name used in logs and telemetry (`lfm`, `lrm`, `rfm`, `rrm`).
    pub const fn label(self) -> &'static str {
        match self {
            Wheel::LeftFront => "lfm",
            Wheel::LeftRear => "lrm",
            Wheel::RightFront => "rfm",
            Wheel::RightRear => "rrm",
        }
    }
}

impl fmt::Display for Wheel {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// GPIO assignment for one wheel: the two H-bridge inputs and the encoder line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelPins {
    pub forward: u8,
    pub reverse: u8,
    pub encoder: u8,
}

/// Pin map of the reference board, ordered as [`Wheel::ALL`].
pub const DEFAULT_PINS: [WheelPins; 4] = [
    WheelPins { forward: 4, reverse: 16, encoder: 27 },
    WheelPins { forward: 5, reverse: 17, encoder: 26 },
    WheelPins { forward: 12, reverse: 13, encoder: 33 },
    WheelPins { forward: 2, reverse: 15, encoder: 25 },
];

/// Startup configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartConfig {
    pub address: VehicleAddress,
    /// How often the current command is re-applied to the PWM outputs.
    pub drive_period: Duration,
    /// How often encoder ticks are turned into a speed estimate.
    pub estimator_period: Duration,
    /// Silence longer than this forces the motors to stop.
    pub watchdog_period: Duration,
    pub telemetry_period: Duration,
    pub radio_channel: u8,
    pub pwm_frequency_hz: u32,
    pub pins: [WheelPins; 4],
    /// Drives the IR LED the optical encoders read through the wheel slots.
    pub ir_emitter_pin: u8,
    /// Carrier the IR LED is modulated at, 50% duty.
    pub ir_carrier_hz: u32,
}

impl CartConfig {
    pub const fn new(address: VehicleAddress) -> Self {
        Self {
            address,
            drive_period: Duration::from_millis(5),
            estimator_period: Duration::from_millis(10),
            watchdog_period: Duration::from_millis(500),
            telemetry_period: Duration::from_secs(1),
            radio_channel: 1,
            pwm_frequency_hz: 5_000,
            pins: DEFAULT_PINS,
            ir_emitter_pin: 23,
            ir_carrier_hz: 40_000,
        }
    }

    pub const fn with_drive_period(
        mut self,
        period: Duration,
    ) -> Self {
        self.drive_period = period;
        self
    }

    pub const fn with_estimator_period(
        mut self,
        period: Duration,
    ) -> Self {
        self.estimator_period = period;
        self
    }

    pub const fn with_watchdog_period(
        mut self,
        period: Duration,
    ) -> Self {
        self.watchdog_period = period;
        self
    }

    pub const fn with_telemetry_period(
        mut self,
        period: Duration,
    ) -> Self {
        self.telemetry_period = period;
        self
    }

    pub const fn with_radio_channel(
        mut self,
        channel: u8,
    ) -> Self {
        self.radio_channel = channel;
        self
    }
}

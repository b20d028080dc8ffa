//! Utility re-exports and shared state for the AR Cart.
//!
//! - `config`: vehicle address, timing constants and the board pin map
//! - `connection`: wire protocol and the command link (inbound commands, telemetry)
//! - `controllers`: motor outputs with the staleness watchdog, encoder speed estimation
//! - `math`: exponential smoothing and the tank-drive stick mapping
//! - `schedule`: periodic timer helper the tasks are built on
//!
//! [`Cart`] bundles every piece of state that more than one task touches. Create it
//! once at startup (usually through `mk_static!`) and hand references to each task.

pub mod config;
pub mod connection;
pub mod controllers;
pub mod math;
pub mod schedule;

pub use config::{CartConfig, VehicleAddress, Wheel};
pub use connection::link::{CommandLink, CommandQueue, LinkError, Radio};
pub use connection::protocol::{ControllerInput, Message, MessageType, Telemetry};
pub use controllers::encoders::{SpeedEstimate, SpeedEstimator, SpeedSlot, TickCounters};
pub use controllers::motors::{CommandSlot, HBridge, MotorCommand, MotorController, MotorError};
pub use embassy_time::*;

/// State shared between the drive, watchdog, estimator and network tasks.
///
/// The vehicle address is fixed at construction and has no setter.
pub struct Cart {
    address: VehicleAddress,
    /// Controller inputs waiting for the command task.
    pub commands: CommandQueue,
    /// The current motor command and its freshness flag.
    pub motors: CommandSlot,
    /// Encoder edge counters written from interrupt context.
    pub ticks: TickCounters,
    /// Latest published speed estimate.
    pub speed: SpeedSlot,
}

impl Cart {
    pub const fn new(address: VehicleAddress) -> Self {
        Self {
            address,
            commands: CommandQueue::new(),
            motors: CommandSlot::new(),
            ticks: TickCounters::new(),
            speed: SpeedSlot::new(),
        }
    }

    pub fn address(&self) -> VehicleAddress {
        self.address
    }

    /// Command link bound to this cart's address, queue and snapshots.
    pub fn link(&self) -> CommandLink<'_> {
        CommandLink::new(self.address, &self.commands, &self.motors, &self.speed)
    }

    /// Motor controller applying this cart's command slot to the given bridges,
    /// ordered as [`Wheel::ALL`].
    pub fn motor_controller<P>(
        &self,
        wheels: [HBridge<P>; 4],
    ) -> MotorController<'_, P>
    where
        P: embedded_hal::pwm::SetDutyCycle,
    {
        MotorController::new(&self.motors, wheels)
    }

    /// Speed estimator sampling this cart's tick counters.
    pub fn speed_estimator(&self) -> SpeedEstimator<'_> {
        SpeedEstimator::new(&self.ticks, &self.speed)
    }
}

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `static_cell::StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}

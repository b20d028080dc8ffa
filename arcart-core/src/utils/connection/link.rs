//! Command link between the radio and the motor controller.
//!
//! Two independent timelines run here:
//!
//! - inbound: the radio's receive callback hands every broadcast frame to
//!   [`CommandLink::on_packet_received`], which keeps only controller inputs
//!   addressed to this cart and pushes them onto a short queue without waiting.
//!   The command task drains that queue and turns each input into a motor command.
//! - outbound: the telemetry task broadcasts a [`Telemetry`] frame once per period.
//!
//! The channel is unauthenticated and shared with other carts, so anything that
//! does not decode or is meant for someone else is dropped quietly.

use core::fmt;

use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    channel::{Channel, TrySendError},
};
use embassy_time::Duration;

use crate::utils::{
    config::{VehicleAddress, COMMAND_QUEUE_DEPTH},
    connection::protocol::{self, ControllerInput, Message, Telemetry},
    controllers::{encoders::SpeedSlot, motors::{CommandSlot, MotorCommand}},
    math::mixing::tank_drive,
    schedule,
};

/// Queue between the receive callback and the command task.
pub type CommandQueue = Channel<CriticalSectionRawMutex, ControllerInput, COMMAND_QUEUE_DEPTH>;

/// Broadcast transport. Delivery is best effort; no acknowledgement is expected.
pub trait Radio {
    type Error: fmt::Debug;

    /// Send `frame` to every listener on the channel.
    fn broadcast(
        &mut self,
        frame: &[u8],
    ) -> Result<(), Self::Error>;
}

/// Radio bring-up and transmit failures.
///
/// Setup errors are fatal: the cart cannot be controlled without the link.
#[derive(Debug)]
pub enum LinkError<E: fmt::Debug> {
    /// The transceiver refused its configuration, e.g. an unknown channel.
    InvalidArgument,
    Send(E),
}

impl<E: fmt::Debug> fmt::Display for LinkError<E> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            LinkError::InvalidArgument => f.write_str("invalid radio argument"),
            LinkError::Send(e) => write!(f, "broadcast failed: {e:?}"),
        }
    }
}

/// Inbound filtering, command mapping and telemetry for one cart.
pub struct CommandLink<'a> {
    address: VehicleAddress,
    queue: &'a CommandQueue,
    motors: &'a CommandSlot,
    speed: &'a SpeedSlot,
}

impl<'a> CommandLink<'a> {
    pub fn new(
        address: VehicleAddress,
        queue: &'a CommandQueue,
        motors: &'a CommandSlot,
        speed: &'a SpeedSlot,
    ) -> Self {
        Self {
            address,
            queue,
            motors,
            speed,
        }
    }

    pub fn address(&self) -> VehicleAddress {
        self.address
    }

    /// Receive callback. Never blocks.
    ///
    /// Returns `true` if the frame was a controller input for this cart and was
    /// queued. Malformed frames, other carts' traffic and inputs arriving while the
    /// queue is full are dropped.
    pub fn on_packet_received(
        &self,
        raw: &[u8],
    ) -> bool {
        let input = match protocol::decode(raw) {
            Ok(Message::ControllerInput(input)) => input,
            Ok(Message::Telemetry(t)) => {
                tracing::trace!(from = t.cart_number.get(), "ignoring telemetry frame");
                return false;
            }
            Err(error) => {
                tracing::trace!(%error, "dropping frame");
                return false;
            }
        };

        if input.address != self.address {
            tracing::trace!(to = input.address.get(), "input for another cart");
            return false;
        }

        match self.queue.try_send(input) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::trace!("command queue full, dropping input");
                false
            }
        }
    }

    /// Turn a queued controller input into the current motor command.
    pub fn process_queued_command(
        &self,
        input: &ControllerInput,
    ) -> MotorCommand {
        tracing::debug!(
            left_ud = input.left_ud,
            left_lr = input.left_lr,
            "command received"
        );
        let cmd = tank_drive(input);
        // Also marks the slot fresh for the watchdog.
        self.motors.set_command(cmd);
        cmd
    }

    /// Snapshot of this cart's state for the next telemetry frame.
    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            cart_number: self.address,
            motor_command: self.motors.command(),
            speed: self.speed.get(),
        }
    }

    /// Encode and broadcast one telemetry frame.
    pub fn emit_telemetry<R: Radio>(
        &self,
        radio: &mut R,
    ) -> Result<(), LinkError<R::Error>> {
        radio
            .broadcast(&self.telemetry().encode())
            .map_err(LinkError::Send)
    }

    /// Command task body: wait for queued inputs and apply them, forever.
    pub async fn run_commands(&self) -> ! {
        tracing::info!(address = self.address.get(), "command link listening");
        loop {
            let input = self.queue.receive().await;
            self.process_queued_command(&input);
        }
    }

    /// Telemetry task body: broadcast once per `period`, forever.
    pub async fn run_telemetry<R: Radio>(
        &self,
        radio: &mut R,
        period: Duration,
    ) -> ! {
        tracing::info!(period_ms = period.as_millis(), "telemetry started");
        schedule::every(period, || {
            if let Err(error) = self.emit_telemetry(radio) {
                tracing::debug!(%error, "telemetry not sent");
            }
        })
        .await
    }
}

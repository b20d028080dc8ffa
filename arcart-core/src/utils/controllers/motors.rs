//! Motor control for the AR Cart.
//!
//! [`CommandSlot`] holds the one current [`MotorCommand`] together with a
//! freshness flag. The network side replaces the command, the drive task applies
//! it to four [`HBridge`]s on every tick and the watchdog task zeroes it when no
//! new command has arrived for a whole watchdog period.

use core::{cell::Cell, fmt};

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embassy_time::Duration;
use embedded_hal::pwm::SetDutyCycle;
use serde::{Deserialize, Serialize};

use crate::utils::{config::Wheel, schedule};

/// Signed duty cycle per wheel in [-1.0, 1.0]. Positive drives forward,
/// negative drives in reverse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotorCommand {
    pub lfm: f32,
    pub lrm: f32,
    pub rfm: f32,
    pub rrm: f32,
}

impl MotorCommand {
    /// All wheels off.
    pub const STOP: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(
        lfm: f32,
        lrm: f32,
        rfm: f32,
        rrm: f32,
    ) -> Self {
        Self { lfm, lrm, rfm, rrm }
    }

    pub const fn from_array(duty: [f32; 4]) -> Self {
        Self::new(duty[0], duty[1], duty[2], duty[3])
    }

    pub const fn to_array(self) -> [f32; 4] {
        [self.lfm, self.lrm, self.rfm, self.rrm]
    }

    pub fn get(
        &self,
        wheel: Wheel,
    ) -> f32 {
        self.to_array()[wheel.index()]
    }

    /// Copy with every field clamped to [-1.0, 1.0]. NaN becomes 0.0.
    pub fn clamped(self) -> Self {
        let mut duty = self.to_array();
        for d in duty.iter_mut() {
            *d = clamp_duty(*d);
        }
        Self::from_array(duty)
    }

    pub fn is_stopped(&self) -> bool {
        self.to_array().iter().all(|&d| d == 0.0)
    }
}

fn clamp_duty(duty: f32) -> f32 {
    if duty.is_nan() {
        0.0
    } else {
        duty.clamp(-1.0, 1.0)
    }
}

#[derive(Clone, Copy)]
struct SlotState {
    command: MotorCommand,
    fresh: bool,
}

/// The authoritative current motor command.
///
/// Writers always replace the whole command; readers get a copy. Both the
/// command and its freshness flag live behind one critical section so a watchdog
/// tick can never interleave with a `set_command`.
pub struct CommandSlot {
    state: Mutex<CriticalSectionRawMutex, Cell<SlotState>>,
}

impl CommandSlot {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(SlotState {
                command: MotorCommand::STOP,
                fresh: false,
            })),
        }
    }

    /// Replace the current command and mark it fresh. Out-of-range values are
    /// clamped, never rejected.
    pub fn set_command(
        &self,
        cmd: MotorCommand,
    ) {
        let command = cmd.clamped();
        self.state.lock(|s| s.set(SlotState { command, fresh: true }));
    }

    /// Snapshot of the current command.
    pub fn command(&self) -> MotorCommand {
        self.state.lock(|s| s.get().command)
    }

    pub fn is_fresh(&self) -> bool {
        self.state.lock(|s| s.get().fresh)
    }

    /// One watchdog period has elapsed.
    ///
    /// If no command was set since the previous tick, the command is forced to
    /// [`MotorCommand::STOP`] and the replaced command is returned. The flag is
    /// cleared either way.
    pub fn watchdog_tick(&self) -> Option<MotorCommand> {
        self.state.lock(|s| {
            let state = s.get();
            if state.fresh {
                s.set(SlotState {
                    command: state.command,
                    fresh: false,
                });
                None
            } else {
                s.set(SlotState {
                    command: MotorCommand::STOP,
                    fresh: false,
                });
                Some(state.command)
            }
        })
    }
}

impl Default for CommandSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Watchdog task body: tick the slot once per `period`.
pub async fn run_watchdog(
    slot: &CommandSlot,
    period: Duration,
) -> ! {
    tracing::info!(period_ms = period.as_millis(), "motor watchdog armed");
    schedule::every(period, || {
        if let Some(stale) = slot.watchdog_tick() {
            if !stale.is_stopped() {
                tracing::warn!(
                    ?stale,
                    "no control input for a full watchdog period, stopping motors"
                );
            }
        }
    })
    .await
}

/// One brushed motor behind an H-bridge with a PWM channel per direction.
pub struct HBridge<P> {
    forward: P,
    reverse: P,
}

impl<P> HBridge<P>
where
    P: SetDutyCycle,
{
    pub fn new(
        forward: P,
        reverse: P,
    ) -> Self {
        Self { forward, reverse }
    }

    /// Drive at a signed duty cycle.
    ///
    /// The idle direction is forced fully off before duty is asserted on the
    /// active one, so a direction change never has both inputs high.
    pub fn drive(
        &mut self,
        duty: f32,
    ) -> Result<(), P::Error> {
        let duty = clamp_duty(duty);
        let magnitude = libm::fabsf(duty);
        if duty >= 0.0 {
            self.reverse.set_duty_cycle_fully_off()?;
            set_fraction(&mut self.forward, magnitude)
        } else {
            self.forward.set_duty_cycle_fully_off()?;
            set_fraction(&mut self.reverse, magnitude)
        }
    }

    pub fn forward(&self) -> &P {
        &self.forward
    }

    pub fn reverse(&self) -> &P {
        &self.reverse
    }
}

fn set_fraction<P: SetDutyCycle>(
    pwm: &mut P,
    fraction: f32,
) -> Result<(), P::Error> {
    let max = pwm.max_duty_cycle();
    pwm.set_duty_cycle((fraction * max as f32) as u16)
}

/// Errors raised by the output stage.
#[derive(Debug)]
pub enum MotorError<E: fmt::Debug> {
    /// A PWM channel of `wheel` rejected a write.
    Pwm { wheel: Wheel, source: E },
}

impl<E: fmt::Debug> fmt::Display for MotorError<E> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            MotorError::Pwm { wheel, source } => {
                write!(f, "PWM write failed on {wheel}: {source:?}")
            }
        }
    }
}

/// Applies the current command to the four wheel bridges.
pub struct MotorController<'a, P> {
    slot: &'a CommandSlot,
    wheels: [HBridge<P>; 4],
}

impl<'a, P> MotorController<'a, P>
where
    P: SetDutyCycle,
{
    /// `wheels` is ordered as [`Wheel::ALL`].
    pub fn new(
        slot: &'a CommandSlot,
        wheels: [HBridge<P>; 4],
    ) -> Self {
        Self { slot, wheels }
    }

    pub fn set_command(
        &self,
        cmd: MotorCommand,
    ) {
        self.slot.set_command(cmd);
    }

    pub fn command(&self) -> MotorCommand {
        self.slot.command()
    }

    pub fn outputs(&self) -> &[HBridge<P>; 4] {
        &self.wheels
    }

    /// Re-assert the current command on every bridge.
    ///
    /// All four wheels are written even if one fails; the first failure is
    /// returned.
    pub fn apply_to_outputs(&mut self) -> Result<(), MotorError<P::Error>> {
        let command = self.slot.command();
        let mut first_err = None;
        for (wheel, bridge) in Wheel::ALL.into_iter().zip(self.wheels.iter_mut()) {
            if let Err(source) = bridge.drive(command.get(wheel)) {
                if first_err.is_none() {
                    first_err = Some(MotorError::Pwm { wheel, source });
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drive task body: apply the command once per `period`, forever.
    pub async fn run(
        &mut self,
        period: Duration,
    ) -> ! {
        tracing::info!(period_ms = period.as_millis(), "motor drive loop started");
        schedule::every(period, || {
            if let Err(e) = self.apply_to_outputs() {
                tracing::warn!("{}", e);
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use std::{cell::RefCell, rc::Rc, vec::Vec};

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Side {
        Forward,
        Reverse,
    }

    /// Every duty write on one bridge, in the order it happened.
    type Writes = Rc<RefCell<Vec<(Side, u16)>>>;

    struct Channel {
        side: Side,
        writes: Writes,
    }

    impl embedded_hal::pwm::ErrorType for Channel {
        type Error = Infallible;
    }

    impl SetDutyCycle for Channel {
        fn max_duty_cycle(&self) -> u16 {
            255
        }

        fn set_duty_cycle(
            &mut self,
            duty: u16,
        ) -> Result<(), Self::Error> {
            self.writes.borrow_mut().push((self.side, duty));
            Ok(())
        }
    }

    fn bridge() -> (HBridge<Channel>, Writes) {
        let writes = Writes::default();
        let forward = Channel {
            side: Side::Forward,
            writes: writes.clone(),
        };
        let reverse = Channel {
            side: Side::Reverse,
            writes: writes.clone(),
        };
        (HBridge::new(forward, reverse), writes)
    }

    #[test]
    fn set_command_replaces_whole_value() {
        let slot = CommandSlot::new();
        slot.set_command(MotorCommand::new(0.1, 0.2, 0.3, 0.4));
        slot.set_command(MotorCommand::new(-0.5, 0.0, 0.0, 0.5));
        assert_eq!(slot.command(), MotorCommand::new(-0.5, 0.0, 0.0, 0.5));
        assert!(slot.is_fresh());
    }

    #[test]
    fn set_command_clamps() {
        let slot = CommandSlot::new();
        slot.set_command(MotorCommand::new(1.5, -2.0, f32::NAN, 0.25));
        assert_eq!(slot.command(), MotorCommand::new(1.0, -1.0, 0.0, 0.25));
    }

    #[test]
    fn watchdog_stops_after_silent_period() {
        let slot = CommandSlot::new();
        let running = MotorCommand::new(0.8, 0.8, 0.8, 0.8);
        slot.set_command(running);

        // Input arrived during this period: untouched, flag cleared.
        assert_eq!(slot.watchdog_tick(), None);
        assert_eq!(slot.command(), running);
        assert!(!slot.is_fresh());

        // Nothing since the last tick.
        assert_eq!(slot.watchdog_tick(), Some(running));
        assert_eq!(slot.command(), MotorCommand::STOP);

        // Already stopped; still reported so the caller can tell.
        assert_eq!(slot.watchdog_tick(), Some(MotorCommand::STOP));
    }

    #[test]
    fn new_command_defers_watchdog() {
        let slot = CommandSlot::new();
        slot.set_command(MotorCommand::new(0.3, 0.3, 0.3, 0.3));
        assert_eq!(slot.watchdog_tick(), None);
        slot.set_command(MotorCommand::new(0.4, 0.4, 0.4, 0.4));
        assert_eq!(slot.watchdog_tick(), None);
        assert_eq!(slot.command(), MotorCommand::new(0.4, 0.4, 0.4, 0.4));
    }

    #[test]
    fn bridge_forward_forces_reverse_low_first() {
        let (mut bridge, writes) = bridge();
        bridge.drive(0.5).unwrap();
        assert_eq!(*writes.borrow(), [(Side::Reverse, 0), (Side::Forward, 127)]);
    }

    #[test]
    fn bridge_reverse_forces_forward_low_first() {
        let (mut bridge, writes) = bridge();
        bridge.drive(-1.0).unwrap();
        assert_eq!(*writes.borrow(), [(Side::Forward, 0), (Side::Reverse, 255)]);
    }

    #[test]
    fn bridge_direction_change_never_overlaps() {
        let (mut bridge, writes) = bridge();
        bridge.drive(0.5).unwrap();
        bridge.drive(-0.2).unwrap();
        bridge.drive(0.0).unwrap();
        assert_eq!(
            *writes.borrow(),
            [
                (Side::Reverse, 0),
                (Side::Forward, 127),
                (Side::Forward, 0),
                (Side::Reverse, 51),
                (Side::Reverse, 0),
                (Side::Forward, 0),
            ]
        );
    }

    #[test]
    fn apply_reasserts_every_tick() {
        let slot = CommandSlot::new();
        let mut logs = Vec::new();
        let wheels = [(); 4].map(|_| {
            let (bridge, writes) = bridge();
            logs.push(writes);
            bridge
        });
        let mut motors = MotorController::new(&slot, wheels);
        motors.set_command(MotorCommand::new(1.0, 1.0, -0.2, -0.2));
        motors.apply_to_outputs().unwrap();
        motors.apply_to_outputs().unwrap();

        let forward_full = [(Side::Reverse, 0), (Side::Forward, 255)];
        let reverse_slow = [(Side::Forward, 0), (Side::Reverse, 51)];
        assert_eq!(*logs[0].borrow(), [forward_full, forward_full].concat());
        assert_eq!(*logs[2].borrow(), [reverse_slow, reverse_slow].concat());
        assert_eq!(logs[3].borrow().len(), 4);
    }
}

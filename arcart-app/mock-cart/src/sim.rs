//! Simulated peripherals: PWM outputs, wheel encoders and the broadcast radio.

use std::{
    convert::Infallible,
    sync::atomic::{AtomicU16, Ordering},
};

use arcart_core::utils::{
    Cart, LinkError, Radio, Wheel,
    config::BROADCAST_PEER,
    schedule,
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embassy_time::Duration;
use embedded_hal::pwm::{ErrorType, SetDutyCycle};

/// 8-bit PWM resolution, as on the reference board.
pub const PWM_MAX: u16 = 255;

/// Radio channels the simulated transceiver accepts.
const RADIO_CHANNELS: core::ops::RangeInclusive<u8> = 1..=14;

pub type Frame = heapless::Vec<u8, 64>;

/// One transmission on the air.
#[derive(Debug)]
pub struct Packet {
    /// Link-layer destination.
    pub to: [u8; 6],
    pub frame: Frame,
}

/// Packets sent by the cart, as seen by anyone listening.
pub type Air = Channel<CriticalSectionRawMutex, Packet, 8>;

/// Output levels of the eight motor PWM channels (forward, reverse per wheel)
/// and of the encoders' IR emitter.
pub struct Board {
    levels: [AtomicU16; 8],
    ir: AtomicU16,
}

impl Board {
    pub const fn new() -> Self {
        Self {
            levels: [const { AtomicU16::new(0) }; 8],
            ir: AtomicU16::new(0),
        }
    }

    /// PWM channel driving the IR LED shared by all four encoders.
    pub fn ir_emitter(&'static self) -> SimPwm {
        SimPwm { level: &self.ir }
    }

    /// Encoders only see the slots while the IR LED is lit.
    pub fn encoders_lit(&self) -> bool {
        self.ir.load(Ordering::Relaxed) > 0
    }

    /// PWM channel `index`; wheel `w` owns `2 * w` (forward) and `2 * w + 1` (reverse).
    pub fn channel(
        &'static self,
        index: usize,
    ) -> SimPwm {
        SimPwm {
            level: &self.levels[index],
        }
    }

    /// Signed duty currently seen by `wheel`'s motor.
    pub fn wheel_duty(
        &self,
        wheel: Wheel,
    ) -> f32 {
        let i = wheel.index() * 2;
        let fwd = self.levels[i].load(Ordering::Relaxed) as f32;
        let rev = self.levels[i + 1].load(Ordering::Relaxed) as f32;
        (fwd - rev) / PWM_MAX as f32
    }
}

pub struct SimPwm {
    level: &'static AtomicU16,
}

impl ErrorType for SimPwm {
    type Error = Infallible;
}

impl SetDutyCycle for SimPwm {
    fn max_duty_cycle(&self) -> u16 {
        PWM_MAX
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        self.level.store(duty, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Debug)]
pub enum SimRadioError {
    FrameTooLong,
    AirBusy,
}

pub struct SimRadio {
    air: &'static Air,
}

impl SimRadio {
    pub fn init(
        channel: u8,
        air: &'static Air,
    ) -> Result<Self, LinkError<Infallible>> {
        if !RADIO_CHANNELS.contains(&channel) {
            return Err(LinkError::InvalidArgument);
        }
        tracing::info!(channel, "radio up, broadcasting");
        Ok(Self { air })
    }
}

impl Radio for SimRadio {
    type Error = SimRadioError;

    fn broadcast(
        &mut self,
        frame: &[u8],
    ) -> Result<(), Self::Error> {
        let frame = Frame::from_slice(frame).map_err(|_| SimRadioError::FrameTooLong)?;
        self.air
            .try_send(Packet {
                to: BROADCAST_PEER,
                frame,
            })
            .map_err(|_| SimRadioError::AirBusy)
    }
}

/// Feed encoder edges proportional to each wheel's applied duty.
///
/// Direction is not visible to the encoders, only magnitude. Nothing is counted
/// while the IR emitter is dark.
pub async fn spin_wheels(
    board: &Board,
    cart: &Cart,
    edges_per_ms: f32,
) -> ! {
    let mut carry = [0.0f32; 4];
    schedule::every(Duration::from_millis(1), || {
        if !board.encoders_lit() {
            return;
        }
        for wheel in Wheel::ALL {
            let acc = &mut carry[wheel.index()];
            *acc += board.wheel_duty(wheel).abs() * edges_per_ms;
            while *acc >= 1.0 {
                cart.ticks.on_edge(wheel);
                *acc -= 1.0;
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    static BOARD: Board = Board::new();

    #[test]
    fn wheel_duty_is_signed() {
        let mut fwd = BOARD.channel(2);
        let mut rev = BOARD.channel(3);
        fwd.set_duty_cycle_fully_off().unwrap();
        rev.set_duty_cycle_fully_on().unwrap();
        assert_eq!(BOARD.wheel_duty(Wheel::LeftRear), -1.0);
    }

    #[test]
    fn oversized_frames_are_refused() {
        static AIR: Air = Air::new();
        let mut radio = SimRadio::init(1, &AIR).unwrap();
        assert!(matches!(
            radio.broadcast(&[0u8; 80]),
            Err(SimRadioError::FrameTooLong)
        ));
        assert!(radio.broadcast(&[1, 2, 3]).is_ok());
    }

    #[test]
    fn frames_go_to_broadcast_peer() {
        static AIR: Air = Air::new();
        let mut radio = SimRadio::init(6, &AIR).unwrap();
        radio.broadcast(&[9, 8, 7]).unwrap();
        let packet = AIR.try_receive().unwrap();
        assert_eq!(packet.to, [0xFF; 6]);
        assert_eq!(packet.frame.as_slice(), [9, 8, 7]);
    }

    #[test]
    fn encoders_need_the_emitter() {
        static BOARD: Board = Board::new();
        assert!(!BOARD.encoders_lit());
        arcart_core::utils::controllers::encoders::light_ir_emitter(&mut BOARD.ir_emitter())
            .unwrap();
        assert!(BOARD.encoders_lit());
    }

    #[test]
    fn unknown_channel_is_fatal() {
        static AIR: Air = Air::new();
        assert!(matches!(
            SimRadio::init(0, &AIR),
            Err(LinkError::InvalidArgument)
        ));
    }
}

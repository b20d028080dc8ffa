//! Binary wire protocol carried over the broadcast radio.
//!
//! Every frame starts with a one-byte [`MessageType`] tag followed by a fixed-size,
//! tightly packed payload. Multi-byte fields are little-endian.
//!
//! | Tag | Payload                                                         | Frame |
//! |-----|-----------------------------------------------------------------|-------|
//! | 0   | `address:u32 right_lr right_ud left_lr left_ud:f32`             | 21 B  |
//! | 1   | `cart:u32 lfm lrm rfm rrm:f32 speed lfm lrm rfm rrm avg:f32`    | 41 B  |

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::{
    config::VehicleAddress,
    controllers::{encoders::SpeedEstimate, motors::MotorCommand},
};

pub const CONTROLLER_INPUT_PAYLOAD_LEN: usize = 4 + 4 * 4;
pub const CONTROLLER_INPUT_FRAME_LEN: usize = 1 + CONTROLLER_INPUT_PAYLOAD_LEN;
pub const TELEMETRY_PAYLOAD_LEN: usize = 4 + 4 * 4 + 5 * 4;
pub const TELEMETRY_FRAME_LEN: usize = 1 + TELEMETRY_PAYLOAD_LEN;

/// Frame tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    ControllerInput = 0,
    Telemetry = 1,
}

impl MessageType {
    /// Payload size that must follow this tag.
    pub const fn payload_len(self) -> usize {
        match self {
            MessageType::ControllerInput => CONTROLLER_INPUT_PAYLOAD_LEN,
            MessageType::Telemetry => TELEMETRY_PAYLOAD_LEN,
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = DecodeError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(MessageType::ControllerInput),
            1 => Ok(MessageType::Telemetry),
            other => Err(DecodeError::UnknownTag(other)),
        }
    }
}

/// Why a frame could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    Empty,
    UnknownTag(u8),
    Length {
        tag: MessageType,
        expected: usize,
        actual: usize,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            DecodeError::Empty => f.write_str("empty frame"),
            DecodeError::UnknownTag(tag) => write!(f, "unknown message tag {tag}"),
            DecodeError::Length {
                tag,
                expected,
                actual,
            } => write!(
                f,
                "{tag:?} payload is {actual} bytes, expected {expected}"
            ),
        }
    }
}

/// Stick positions sent by a controller, each axis in [-1.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerInput {
    /// Cart this input is meant for.
    pub address: VehicleAddress,
    pub right_lr: f32,
    pub right_ud: f32,
    pub left_lr: f32,
    pub left_ud: f32,
}

impl ControllerInput {
    /// Full frame including the tag byte.
    pub fn encode(&self) -> [u8; CONTROLLER_INPUT_FRAME_LEN] {
        let mut frame = [0u8; CONTROLLER_INPUT_FRAME_LEN];
        let mut w = Writer::new(&mut frame);
        w.u8(MessageType::ControllerInput as u8);
        w.u32(self.address.get());
        w.f32(self.right_lr);
        w.f32(self.right_ud);
        w.f32(self.left_lr);
        w.f32(self.left_ud);
        frame
    }

    /// Decode the payload that follows the tag byte.
    pub fn decode_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        check_len(MessageType::ControllerInput, payload)?;
        let mut r = Reader::new(payload);
        Ok(Self {
            address: VehicleAddress::new(r.u32()),
            right_lr: r.f32(),
            right_ud: r.f32(),
            left_lr: r.f32(),
            left_ud: r.f32(),
        })
    }
}

/// Periodic status report from a cart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub cart_number: VehicleAddress,
    pub motor_command: MotorCommand,
    pub speed: SpeedEstimate,
}

impl Telemetry {
    /// Full frame including the tag byte.
    pub fn encode(&self) -> [u8; TELEMETRY_FRAME_LEN] {
        let mut frame = [0u8; TELEMETRY_FRAME_LEN];
        let mut w = Writer::new(&mut frame);
        w.u8(MessageType::Telemetry as u8);
        w.u32(self.cart_number.get());
        for duty in self.motor_command.to_array() {
            w.f32(duty);
        }
        for speed in self.speed.wheels() {
            w.f32(speed);
        }
        w.f32(self.speed.avg);
        frame
    }

    /// Decode the payload that follows the tag byte.
    pub fn decode_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        check_len(MessageType::Telemetry, payload)?;
        let mut r = Reader::new(payload);
        let cart_number = VehicleAddress::new(r.u32());
        let motor_command = MotorCommand::new(r.f32(), r.f32(), r.f32(), r.f32());
        let speed = SpeedEstimate {
            lfm: r.f32(),
            lrm: r.f32(),
            rfm: r.f32(),
            rrm: r.f32(),
            avg: r.f32(),
        };
        Ok(Self {
            cart_number,
            motor_command,
            speed,
        })
    }
}

/// Any decoded frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    ControllerInput(ControllerInput),
    Telemetry(Telemetry),
}

/// Decode a whole frame. The payload length must match the tag exactly.
pub fn decode(frame: &[u8]) -> Result<Message, DecodeError> {
    let (&tag, payload) = frame.split_first().ok_or(DecodeError::Empty)?;
    match MessageType::try_from(tag)? {
        MessageType::ControllerInput => {
            ControllerInput::decode_payload(payload).map(Message::ControllerInput)
        }
        MessageType::Telemetry => Telemetry::decode_payload(payload).map(Message::Telemetry),
    }
}

fn check_len(
    tag: MessageType,
    payload: &[u8],
) -> Result<(), DecodeError> {
    let expected = tag.payload_len();
    if payload.len() == expected {
        Ok(())
    } else {
        Err(DecodeError::Length {
            tag,
            expected,
            actual: payload.len(),
        })
    }
}

// Callers size buffers from the constants above, so the cursors never run past
// the end.
struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put<const N: usize>(
        &mut self,
        bytes: [u8; N],
    ) {
        self.buf[self.pos..self.pos + N].copy_from_slice(&bytes);
        self.pos += N;
    }

    fn u8(
        &mut self,
        v: u8,
    ) {
        self.put([v]);
    }

    fn u32(
        &mut self,
        v: u32,
    ) {
        self.put(v.to_le_bytes());
    }

    fn f32(
        &mut self,
        v: f32,
    ) {
        self.put(v.to_le_bytes());
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take4(&mut self) -> [u8; 4] {
        let mut out = [0u8; 4];
        out.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        out
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take4())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take4())
    }
}

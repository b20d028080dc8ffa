//! Stick-to-wheel mapping.
//!
//! The cart is driven tank style: each side follows the up/down axis of its own
//! stick. The left/right axes are carried on the wire but not used here.

use crate::utils::{connection::protocol::ControllerInput, controllers::motors::MotorCommand};

/// Map a controller input to a per-wheel command, clamped to [-1.0, 1.0].
pub fn tank_drive(input: &ControllerInput) -> MotorCommand {
    MotorCommand::new(
        input.left_ud,
        input.left_ud,
        input.right_ud,
        input.right_ud,
    )
    .clamped()
}

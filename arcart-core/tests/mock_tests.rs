use std::{cell::RefCell, convert::Infallible, rc::Rc};

use arcart_core::utils::{
    connection::protocol::{self, Message},
    Cart, ControllerInput, HBridge, MotorCommand, Radio, VehicleAddress, Wheel,
};
use embedded_hal::pwm::{ErrorType, SetDutyCycle};

/// Full-scale duty of the recording channels.
pub const MAX_DUTY: u16 = 1000;
pub const CART: VehicleAddress = VehicleAddress::new(17);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pin {
    Forward,
    Reverse,
}

/// Writes to both channels of one bridge, in order.
pub type Trace = Rc<RefCell<Vec<(Pin, u16)>>>;

/// PWM channel that remembers its last duty and logs into its bridge's trace.
#[derive(Debug)]
pub struct RecordingPwm {
    pin: Pin,
    duty: u16,
    trace: Trace,
}

impl RecordingPwm {
    pub fn new(
        pin: Pin,
        trace: Trace,
    ) -> Self {
        Self {
            pin,
            duty: 0,
            trace,
        }
    }
}

impl ErrorType for RecordingPwm {
    type Error = Infallible;
}

impl SetDutyCycle for RecordingPwm {
    fn max_duty_cycle(&self) -> u16 {
        MAX_DUTY
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        self.duty = duty;
        self.trace.borrow_mut().push((self.pin, duty));
        Ok(())
    }
}

#[derive(Default)]
pub struct AirCapture {
    frames: Vec<Vec<u8>>,
}

impl Radio for AirCapture {
    type Error = Infallible;

    fn broadcast(
        &mut self,
        frame: &[u8],
    ) -> Result<(), Self::Error> {
        self.frames.push(frame.to_vec());
        Ok(())
    }
}

fn traced_bridges() -> ([HBridge<RecordingPwm>; 4], [Trace; 4]) {
    let traces: [Trace; 4] = Default::default();
    let bridges = traces.clone().map(|trace| {
        HBridge::new(
            RecordingPwm::new(Pin::Forward, trace.clone()),
            RecordingPwm::new(Pin::Reverse, trace),
        )
    });
    (bridges, traces)
}

fn bridges() -> [HBridge<RecordingPwm>; 4] {
    traced_bridges().0
}

fn sticks(
    address: VehicleAddress,
    left_ud: f32,
    right_ud: f32,
) -> ControllerInput {
    ControllerInput {
        address,
        right_lr: 0.0,
        right_ud,
        left_lr: 0.0,
        left_ud,
    }
}

#[test]
fn full_forward_then_watchdog_stop() {
    let cart = Cart::new(CART);
    let link = cart.link();
    let mut motors = cart.motor_controller(bridges());

    assert!(link.on_packet_received(&sticks(CART, 1.0, 1.0).encode()));
    let input = cart.commands.try_receive().unwrap();
    link.process_queued_command(&input);

    motors.apply_to_outputs().unwrap();
    for bridge in motors.outputs() {
        assert_eq!(bridge.forward().duty, MAX_DUTY);
        assert_eq!(bridge.reverse().duty, 0);
    }

    // The tick closing the period in which the input arrived leaves it alone.
    assert_eq!(cart.motors.watchdog_tick(), None);
    motors.apply_to_outputs().unwrap();
    assert_eq!(motors.outputs()[0].forward().duty, MAX_DUTY);

    // A full period of silence.
    assert_eq!(
        cart.motors.watchdog_tick(),
        Some(MotorCommand::new(1.0, 1.0, 1.0, 1.0))
    );
    assert_eq!(cart.motors.command(), MotorCommand::STOP);
    motors.apply_to_outputs().unwrap();
    for bridge in motors.outputs() {
        assert_eq!(bridge.forward().duty, 0);
        assert_eq!(bridge.reverse().duty, 0);
    }
}

#[test]
fn other_carts_cannot_drive_this_one() {
    let cart = Cart::new(CART);
    let link = cart.link();
    let mut motors = cart.motor_controller(bridges());

    let stranger = VehicleAddress::new(CART.get() + 1);
    assert!(!link.on_packet_received(&sticks(stranger, 1.0, 1.0).encode()));
    assert!(cart.commands.try_receive().is_err());

    motors.apply_to_outputs().unwrap();
    assert!(motors.outputs().iter().all(|b| b.forward().duty == 0));
}

#[test]
fn reversing_switches_channels() {
    let cart = Cart::new(CART);
    let link = cart.link();
    let mut motors = cart.motor_controller(bridges());

    link.process_queued_command(&sticks(CART, 0.5, -0.3));
    motors.apply_to_outputs().unwrap();

    let [lf, lr, rf, rr] = motors.outputs();
    assert_eq!(lf.forward().duty, 500);
    assert_eq!(lr.forward().duty, 500);
    assert_eq!(rf.forward().duty, 0);
    assert_eq!(rf.reverse().duty, 300);
    assert_eq!(rr.reverse().duty, 300);
}

#[test]
fn direction_change_lowers_idle_channel_first() {
    let cart = Cart::new(CART);
    let link = cart.link();
    let (bridges, traces) = traced_bridges();
    let mut motors = cart.motor_controller(bridges);

    link.process_queued_command(&sticks(CART, 0.5, 0.5));
    motors.apply_to_outputs().unwrap();
    link.process_queued_command(&sticks(CART, -0.5, -0.5));
    motors.apply_to_outputs().unwrap();

    for trace in &traces {
        assert_eq!(
            *trace.borrow(),
            [
                (Pin::Reverse, 0),
                (Pin::Forward, 500),
                (Pin::Forward, 0),
                (Pin::Reverse, 500),
            ]
        );
    }
}

#[test]
fn telemetry_reports_command_and_speed() {
    let cart = Cart::new(CART);
    let link = cart.link();
    let mut estimator = cart.speed_estimator();

    link.process_queued_command(&sticks(CART, 0.25, 0.25));
    for _ in 0..10 {
        cart.ticks.on_edge(Wheel::LeftFront);
    }
    estimator.sample();

    let mut air = AirCapture::default();
    link.emit_telemetry(&mut air).unwrap();
    assert_eq!(air.frames.len(), 1);
    assert_eq!(air.frames[0].len(), protocol::TELEMETRY_FRAME_LEN);

    let Message::Telemetry(t) = protocol::decode(&air.frames[0]).unwrap() else {
        panic!("expected a telemetry frame");
    };
    assert_eq!(t.cart_number, CART);
    assert_eq!(t.motor_command, MotorCommand::new(0.25, 0.25, 0.25, 0.25));
    assert!((t.speed.lfm - 3.0).abs() < 1e-6);
    assert_eq!(t.speed.rrm, 0.0);
}

#[test]
fn command_queue_holds_five() {
    let cart = Cart::new(CART);
    let link = cart.link();
    let frame = sticks(CART, 0.1, 0.1).encode();
    let accepted = (0..8).filter(|_| link.on_packet_received(&frame)).count();
    assert_eq!(accepted, 5);
}

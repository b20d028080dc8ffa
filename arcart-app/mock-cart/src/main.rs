//! Host build of the AR Cart control core.
//!
//! Runs the drive, watchdog, estimator, command and telemetry tasks on the embassy
//! std executor against simulated PWM outputs, encoders and radio. A scripted
//! controller drives the cart for a few seconds and then goes quiet, so the
//! watchdog stop is visible in the telemetry printed as JSON lines.

mod sim;

use arcart_core::{
    mk_static,
    utils::{
        Cart, CartConfig, CommandLink, ControllerInput, Duration, HBridge, Instant,
        MotorController, SpeedEstimator, Telemetry, Timer, VehicleAddress, Wheel,
        config::BROADCAST_PEER,
        connection::protocol::{self, Message},
        controllers::{encoders::light_ir_emitter, motors::run_watchdog},
    },
};
use clap::Parser;
use embassy_executor::{Executor, Spawner};
use serde::Serialize;
use static_cell::StaticCell;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sim::{Air, Board, SimPwm, SimRadio};

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts {
    /// Address of this cart; inputs for other addresses are ignored
    #[clap(long, default_value_t = 1)]
    address: u32,
    /// Motor output refresh period in milliseconds
    #[clap(long, default_value_t = 5)]
    drive_ms: u64,
    /// Speed estimator period in milliseconds
    #[clap(long, default_value_t = 10)]
    estimator_ms: u64,
    /// Stop the motors after this many milliseconds without input
    #[clap(long, default_value_t = 500)]
    watchdog_ms: u64,
    /// Telemetry broadcast period in milliseconds
    #[clap(long, default_value_t = 1000)]
    telemetry_ms: u64,
    /// Radio channel (1-14)
    #[clap(long, default_value_t = 1)]
    radio_channel: u8,
    /// Seconds of scripted controller input before the controller goes quiet
    #[clap(long, default_value_t = 3)]
    script_secs: u64,
    /// Encoder edges per millisecond at full duty
    #[clap(long, default_value_t = 2.0)]
    edges_per_ms: f32,
}

impl Opts {
    fn config(&self) -> CartConfig {
        CartConfig::new(VehicleAddress::new(self.address))
            .with_drive_period(Duration::from_millis(self.drive_ms))
            .with_estimator_period(Duration::from_millis(self.estimator_ms))
            .with_watchdog_period(Duration::from_millis(self.watchdog_ms))
            .with_telemetry_period(Duration::from_millis(self.telemetry_ms))
            .with_radio_channel(self.radio_channel)
    }
}

#[derive(Serialize)]
struct TelemetryLine {
    uptime_ms: u64,
    telemetry: Telemetry,
}

#[embassy_executor::task]
async fn drive_task(
    mut motors: MotorController<'static, SimPwm>,
    period: Duration,
) -> ! {
    motors.run(period).await
}

#[embassy_executor::task]
async fn watchdog_task(
    cart: &'static Cart,
    period: Duration,
) -> ! {
    run_watchdog(&cart.motors, period).await
}

#[embassy_executor::task]
async fn estimator_task(
    mut estimator: SpeedEstimator<'static>,
    period: Duration,
) -> ! {
    estimator.run(period).await
}

#[embassy_executor::task]
async fn command_task(link: CommandLink<'static>) -> ! {
    link.run_commands().await
}

#[embassy_executor::task]
async fn telemetry_task(
    link: CommandLink<'static>,
    mut radio: SimRadio,
    period: Duration,
) -> ! {
    link.run_telemetry(&mut radio, period).await
}

#[embassy_executor::task]
async fn encoder_task(
    board: &'static Board,
    cart: &'static Cart,
    edges_per_ms: f32,
) -> ! {
    sim::spin_wheels(board, cart, edges_per_ms).await
}

/// Scripted handheld controller: forward, spin, reverse, then silence.
///
/// Frames go straight into the cart's receive callback, interleaved with traffic
/// for another cart and line noise.
#[embassy_executor::task]
async fn controller_task(
    cart: &'static Cart,
    script: Duration,
) {
    let link = cart.link();
    let me = cart.address();
    let stranger = VehicleAddress::new(me.get().wrapping_add(1));
    let start = Instant::now();
    let mut sent = 0u32;
    let mut accepted = 0u32;

    while start.elapsed() < script {
        let third = start.elapsed().as_millis() * 3 / script.as_millis().max(1);
        let (left_ud, right_ud) = match third {
            0 => (1.0, 1.0),
            1 => (0.6, -0.6),
            _ => (-0.5, -0.5),
        };
        let input = ControllerInput {
            address: me,
            right_lr: 0.0,
            right_ud,
            left_lr: 0.0,
            left_ud,
        };
        sent += 1;
        if link.on_packet_received(&input.encode()) {
            accepted += 1;
        }

        if sent % 10 == 0 {
            let foreign = ControllerInput {
                address: stranger,
                ..input
            };
            link.on_packet_received(&foreign.encode());
            link.on_packet_received(&[0xAB, 0x01, 0x02]);
        }

        Timer::after(Duration::from_millis(50)).await;
    }

    info!(sent, accepted, "controller went quiet");
}

/// Listens on the air and prints every broadcast telemetry frame.
#[embassy_executor::task]
async fn monitor_task(air: &'static Air) -> ! {
    loop {
        let packet = air.receive().await;
        if packet.to != BROADCAST_PEER {
            warn!(to = ?packet.to, "unicast frame on air, ignored");
            continue;
        }
        match protocol::decode(&packet.frame) {
            Ok(Message::Telemetry(telemetry)) => {
                let line = TelemetryLine {
                    uptime_ms: Instant::now().as_millis(),
                    telemetry,
                };
                match serde_json::to_string(&line) {
                    Ok(json) => info!("{json}"),
                    Err(e) => warn!("telemetry not printable: {:?}", e),
                }
            }
            Ok(other) => info!("heard {:?}", other),
            Err(e) => warn!("undecodable frame on air: {}", e),
        }
    }
}

#[embassy_executor::task]
async fn main_task(
    spawner: Spawner,
    opts: Opts,
) {
    let cfg = opts.config();
    info!(address = %cfg.address, pwm_hz = cfg.pwm_frequency_hz, "booting");
    for (wheel, pins) in Wheel::ALL.iter().zip(cfg.pins.iter()) {
        info!(
            "{wheel}: forward gpio{} reverse gpio{} encoder gpio{}",
            pins.forward, pins.reverse, pins.encoder
        );
    }
    info!(
        "encoder IR emitter: gpio{} at {} Hz",
        cfg.ir_emitter_pin, cfg.ir_carrier_hz
    );

    let air: &'static Air = mk_static!(Air, Air::new());
    let radio = match SimRadio::init(cfg.radio_channel, air) {
        Ok(radio) => radio,
        Err(e) => {
            error!("radio setup failed: {}", e);
            std::process::exit(1);
        }
    };

    let cart: &'static Cart = mk_static!(Cart, Cart::new(cfg.address));
    let board: &'static Board = mk_static!(Board, Board::new());
    let Ok(()) = light_ir_emitter(&mut board.ir_emitter());

    let bridges = Wheel::ALL.map(|wheel| {
        let i = wheel.index() * 2;
        HBridge::new(board.channel(i), board.channel(i + 1))
    });

    spawner
        .spawn(drive_task(cart.motor_controller(bridges), cfg.drive_period))
        .unwrap();
    spawner
        .spawn(watchdog_task(cart, cfg.watchdog_period))
        .unwrap();
    spawner
        .spawn(estimator_task(cart.speed_estimator(), cfg.estimator_period))
        .unwrap();
    spawner.spawn(command_task(cart.link())).unwrap();
    spawner
        .spawn(telemetry_task(cart.link(), radio, cfg.telemetry_period))
        .unwrap();
    spawner.spawn(monitor_task(air)).unwrap();
    spawner
        .spawn(encoder_task(board, cart, opts.edges_per_ms))
        .unwrap();
    spawner
        .spawn(controller_task(
            cart,
            Duration::from_secs(opts.script_secs),
        ))
        .unwrap();
}

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let opts = Opts::parse();
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(main_task(spawner, opts)).unwrap();
    });
}

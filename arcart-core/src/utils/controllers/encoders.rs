//! Wheel encoder counting and speed estimation.
//!
//! Each wheel's encoder line raises an edge interrupt whose handler does nothing
//! but [`TickCounters::on_edge`]. The estimator task samples the counters on a
//! fixed period, turns the per-period delta into a smoothed speed and publishes it
//! to a [`SpeedSlot`] for telemetry.
//!
//! Speeds are in ticks per estimation period. The encoders carry no direction,
//! so speeds are never negative.

use core::cell::Cell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embassy_time::Duration;
use embedded_hal::pwm::SetDutyCycle;
use serde::{Deserialize, Serialize};

use crate::utils::{
    config::Wheel,
    math::smoothing::{ema, mean4},
    schedule,
};

/// Turn on the encoders' IR emitter: a square wave at half duty on a channel
/// already configured for the carrier frequency.
pub fn light_ir_emitter<P: SetDutyCycle>(emitter: &mut P) -> Result<(), P::Error> {
    emitter.set_duty_cycle_percent(50)
}

type TickCell = Mutex<CriticalSectionRawMutex, Cell<u32>>;

/// One free-running edge counter per wheel.
///
/// Counters only ever move forward and wrap at `u32::MAX`; consumers work with
/// wrapping deltas. Every access holds that wheel's critical section for a
/// single load or load-add-store.
pub struct TickCounters {
    ticks: [TickCell; 4],
}

impl TickCounters {
    pub const fn new() -> Self {
        Self::starting_at([0; 4])
    }

    /// Counters preloaded with the given values, ordered as [`Wheel::ALL`].
    pub const fn starting_at(initial: [u32; 4]) -> Self {
        Self {
            ticks: [
                Mutex::new(Cell::new(initial[0])),
                Mutex::new(Cell::new(initial[1])),
                Mutex::new(Cell::new(initial[2])),
                Mutex::new(Cell::new(initial[3])),
            ],
        }
    }

    /// Interrupt handler body for a falling edge on `wheel`'s encoder.
    #[inline]
    pub fn on_edge(
        &self,
        wheel: Wheel,
    ) {
        self.ticks[wheel.index()].lock(|t| t.set(t.get().wrapping_add(1)));
    }

    pub fn get(
        &self,
        wheel: Wheel,
    ) -> u32 {
        self.ticks[wheel.index()].lock(Cell::get)
    }

    /// Current value of every counter, ordered as [`Wheel::ALL`].
    pub fn snapshot(&self) -> [u32; 4] {
        Wheel::ALL.map(|wheel| self.get(wheel))
    }
}

impl Default for TickCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Smoothed per-wheel speed plus the mean of the four.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeedEstimate {
    pub lfm: f32,
    pub lrm: f32,
    pub rfm: f32,
    pub rrm: f32,
    pub avg: f32,
}

impl SpeedEstimate {
    pub const fn wheels(&self) -> [f32; 4] {
        [self.lfm, self.lrm, self.rfm, self.rrm]
    }

    pub fn get(
        &self,
        wheel: Wheel,
    ) -> f32 {
        self.wheels()[wheel.index()]
    }
}

/// Latest published [`SpeedEstimate`]. Written by the estimator only.
pub struct SpeedSlot {
    latest: Mutex<CriticalSectionRawMutex, Cell<SpeedEstimate>>,
}

impl SpeedSlot {
    pub const fn new() -> Self {
        Self {
            latest: Mutex::new(Cell::new(SpeedEstimate {
                lfm: 0.0,
                lrm: 0.0,
                rfm: 0.0,
                rrm: 0.0,
                avg: 0.0,
            })),
        }
    }

    pub fn publish(
        &self,
        estimate: SpeedEstimate,
    ) {
        self.latest.lock(|l| l.set(estimate));
    }

    pub fn get(&self) -> SpeedEstimate {
        self.latest.lock(Cell::get)
    }
}

impl Default for SpeedSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns tick deltas into a low-pass filtered speed.
pub struct SpeedEstimator<'a> {
    counters: &'a TickCounters,
    published: &'a SpeedSlot,
    last: [u32; 4],
    estimate: SpeedEstimate,
}

impl<'a> SpeedEstimator<'a> {
    /// The current counter values become the baseline for the first sample.
    pub fn new(
        counters: &'a TickCounters,
        published: &'a SpeedSlot,
    ) -> Self {
        Self {
            counters,
            published,
            last: counters.snapshot(),
            estimate: SpeedEstimate::default(),
        }
    }

    /// Take one sample: compute the tick delta of every wheel since the previous
    /// sample, fold it into the estimate and publish the result.
    ///
    /// Returns the raw deltas, ordered as [`Wheel::ALL`].
    pub fn sample(&mut self) -> [u32; 4] {
        let now = self.counters.snapshot();
        let delta: [u32; 4] = core::array::from_fn(|i| now[i].wrapping_sub(self.last[i]));
        self.last = now;

        let prev = self.estimate.wheels();
        let wheels = [
            ema(prev[0], delta[0]),
            ema(prev[1], delta[1]),
            ema(prev[2], delta[2]),
            ema(prev[3], delta[3]),
        ];
        self.estimate = SpeedEstimate {
            lfm: wheels[0],
            lrm: wheels[1],
            rfm: wheels[2],
            rrm: wheels[3],
            avg: mean4(wheels),
        };
        self.published.publish(self.estimate);
        delta
    }

    pub fn estimate(&self) -> SpeedEstimate {
        self.estimate
    }

    /// Estimator task body: sample once per `period`, forever.
    pub async fn run(
        &mut self,
        period: Duration,
    ) -> ! {
        tracing::info!(period_ms = period.as_millis(), "speed estimator started");
        schedule::every(period, || {
            self.sample();
        })
        .await
    }
}

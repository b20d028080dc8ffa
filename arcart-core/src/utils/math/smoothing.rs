//! Fixed-weight exponential smoothing for encoder tick deltas.

/// Share of the previous estimate kept on every update.
pub const HISTORY_WEIGHT: f64 = 0.7;
/// Share of the new sample mixed in on every update.
pub const SAMPLE_WEIGHT: f64 = 0.3;

/// One smoothing step: `0.7 * previous + 0.3 * sample`.
///
/// Evaluated in `f64` and narrowed to `f32` once per step.
pub fn ema(
    previous: f32,
    sample: u32,
) -> f32 {
    (HISTORY_WEIGHT * previous as f64 + SAMPLE_WEIGHT * sample as f64) as f32
}

/// Arithmetic mean of four per-wheel values.
pub fn mean4(values: [f32; 4]) -> f32 {
    0.25 * (values[0] + values[1] + values[2] + values[3])
}

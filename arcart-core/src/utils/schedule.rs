//! Periodic timer subscriptions.
//!
//! Each periodic job of the cart (drive, watchdog, estimator, telemetry) runs as
//! its own executor task built on [`every`]. The task sleeps on an embassy
//! [`Ticker`] between runs, so nothing busy-waits and missed deadlines do not
//! accumulate drift.

use embassy_time::{Duration, Ticker};

/// Run `job` once per `period`, forever. The first run happens one period after
/// the call.
pub async fn every<F>(
    period: Duration,
    mut job: F,
) -> !
where
    F: FnMut(),
{
    let mut ticker = Ticker::every(period);
    loop {
        ticker.next().await;
        job();
    }
}

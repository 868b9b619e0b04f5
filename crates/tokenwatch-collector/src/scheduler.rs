//! Collection scheduler: runs a job now and then on a fixed interval.
//!
//! Cycles run one after another on a single background task. Ticks stay on
//! a fixed grid; a tick that comes due while a cycle is still running is
//! skipped rather than queued, so a slow database never builds up a backlog
//! of cycles.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Work triggered on every tick.
pub trait Job: Send + Sync + 'static {
    /// Run once. Failures are handled inside the job.
    fn run(&self) -> impl Future<Output = ()> + Send;
}

/// A cadence string that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CadenceError {
    #[error("empty interval")]
    Empty,

    #[error("invalid interval {0:?}: expected e.g. \"120s\", \"2m\", \"1h\" or \"500ms\"")]
    Malformed(String),

    #[error("interval must be greater than zero")]
    Zero,
}

/// Parse an interval such as `120s`, `2m`, `1h`, `500ms` or bare seconds.
pub fn parse_cadence(s: &str) -> Result<Duration, CadenceError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(CadenceError::Empty);
    }

    let malformed = || CadenceError::Malformed(s.to_string());
    let number = |n: &str| n.trim().parse::<u64>().map_err(|_| malformed());

    let interval = if let Some(ms) = s.strip_suffix("ms") {
        Duration::from_millis(number(ms)?)
    } else if let Some(secs) = s.strip_suffix('s') {
        Duration::from_secs(number(secs)?)
    } else if let Some(mins) = s.strip_suffix('m') {
        Duration::from_secs(number(mins)?.checked_mul(60).ok_or_else(malformed)?)
    } else if let Some(hours) = s.strip_suffix('h') {
        Duration::from_secs(number(hours)?.checked_mul(3600).ok_or_else(malformed)?)
    } else {
        Duration::from_secs(number(s)?)
    };

    if interval.is_zero() {
        return Err(CadenceError::Zero);
    }
    Ok(interval)
}

/// Drives a [`Job`] on a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    interval: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Result<Self, CadenceError> {
        if interval.is_zero() {
            return Err(CadenceError::Zero);
        }
        Ok(Self { interval })
    }

    /// Run `job` once, then spawn the recurring loop.
    ///
    /// Returns after the first run completes, so callers can start serving
    /// with a populated snapshot. The loop stops when `shutdown` flips to
    /// `true` or its sender is dropped; a run in progress at that moment is
    /// allowed to finish.
    pub async fn start<J: Job>(
        self,
        job: Arc<J>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        info!(interval = ?self.interval, "collection job created");
        job.run().await;

        tokio::spawn(run_loop(job, self.interval, shutdown))
    }
}

async fn run_loop<J: Job>(job: Arc<J>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut deadline = Instant::now() + interval;

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                job.run().await;
                deadline = next_deadline(deadline, interval, Instant::now());
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("collection scheduler stopped");
}

/// First tick after `now` on the grid `previous + k * interval`.
///
/// Ticks that fell due while the job was running are dropped.
fn next_deadline(previous: Instant, interval: Duration, now: Instant) -> Instant {
    let mut next = previous + interval;
    if next <= now {
        let behind = now.duration_since(next).as_nanos();
        let skipped = behind / interval.as_nanos() + 1;
        debug!(skipped = skipped as u64, "collection ticks skipped");
        next += interval * u32::try_from(skipped).unwrap_or(u32::MAX);
    }
    next
}

//! Model merger stage
//!
//! Final stage of the receive pipeline. Merges decoded updates into the
//! shared state model and watches two clocks while doing it: the robot's
//! own timestamps, whose gaps reveal packages the controller skipped, and
//! wall-clock merge intervals, which are paced to a minimum spacing and
//! flagged when they blow past the upper bound.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::session::SessionState;
use crate::state::{StateHandle, StateUpdate};

use super::QUEUE_POLL;

/// Watches robot-clock timestamps for dropped packages
pub(crate) struct CadenceMonitor {
    /// Control-loop period, seconds
    expected: f64,
    /// Gap threshold as a multiple of the period
    factor: f64,
    last: Option<f64>,
}

impl CadenceMonitor {
    pub(crate) fn new(expected: f64, factor: f64) -> Self {
        Self {
            expected,
            factor,
            last: None,
        }
    }

    /// Feed the next timestamp. Returns the gap when it exceeds the
    /// threshold, meaning at least one package went missing.
    fn observe(&mut self, timestamp: f64) -> Option<f64> {
        let gap = match self.last {
            Some(last) => {
                let delta = timestamp - last;
                (delta > self.expected * self.factor).then_some(delta)
            }
            None => None,
        };
        self.last = Some(timestamp);
        gap
    }

    /// Packages missing from a gap of this length
    fn missed_packages(&self, gap: f64) -> u64 {
        ((gap / self.expected).round() as u64).saturating_sub(1).max(1)
    }
}

/// Wall-clock bounds on the merge loop
pub(crate) struct MergeTiming {
    /// Sleep until this much time has passed since the previous merge
    pub min_interval: Duration,
    /// Log a cadence violation beyond this
    pub max_interval: Duration,
}

pub(crate) fn merger_loop(
    updates: Receiver<StateUpdate>,
    state: Arc<StateHandle>,
    session: Arc<SessionState>,
    mut cadence: CadenceMonitor,
    timing: MergeTiming,
) {
    log::info!("Merger thread started");

    let mut last_merge: Option<Instant> = None;

    loop {
        if session.is_shutdown() {
            break;
        }

        let update = match updates.recv_timeout(QUEUE_POLL) {
            Ok(update) => update,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if let Some(timestamp) = update.timestamp() {
            if let Some(gap) = cadence.observe(timestamp) {
                let missed = cadence.missed_packages(gap);
                session
                    .stats
                    .packets_dropped
                    .fetch_add(missed, Ordering::Relaxed);
                log::warn!(
                    "Telemetry gap of {:.4}s at t={:.3}, {} package(s) missed",
                    gap,
                    timestamp,
                    missed
                );
            }
        }

        match state.apply_update(&update) {
            Ok(changed) => {
                session.stats.packets_merged.fetch_add(1, Ordering::Relaxed);
                if changed > 0 {
                    log::trace!("Merged package, {} field(s) changed", changed);
                }
            }
            Err(e) => {
                session.fail(e);
                break;
            }
        }

        if let Some(last) = last_merge {
            let elapsed = last.elapsed();
            if elapsed < timing.min_interval {
                thread::sleep(timing.min_interval - elapsed);
            } else if elapsed > timing.max_interval {
                session
                    .stats
                    .cadence_violations
                    .fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "Merge interval {} ms exceeded the {} ms bound",
                    elapsed.as_millis(),
                    timing.max_interval.as_millis()
                );
            }
        }
        last_merge = Some(Instant::now());
    }

    log::info!("Merger thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_gap_is_an_anomaly() {
        let mut cadence = CadenceMonitor::new(0.008, 1.6);
        assert_eq!(cadence.observe(0.000), None);
        let gap = cadence.observe(0.016).unwrap();
        assert!((gap - 0.016).abs() < 1e-9);
        assert_eq!(cadence.missed_packages(gap), 1);
    }

    #[test]
    fn test_nominal_cadence_is_clean() {
        let mut cadence = CadenceMonitor::new(0.008, 1.6);
        assert_eq!(cadence.observe(0.000), None);
        assert_eq!(cadence.observe(0.008), None);
        assert_eq!(cadence.observe(0.016), None);
    }

    #[test]
    fn test_first_timestamp_never_flags() {
        let mut cadence = CadenceMonitor::new(0.008, 1.6);
        assert_eq!(cadence.observe(500.0), None);
    }

    #[test]
    fn test_long_gap_counts_all_missing() {
        let mut cadence = CadenceMonitor::new(0.008, 1.6);
        cadence.observe(0.000);
        let gap = cadence.observe(0.080).unwrap();
        assert_eq!(cadence.missed_packages(gap), 9);
    }
}

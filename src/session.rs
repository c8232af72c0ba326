//! Shared session state for the stream worker threads
//!
//! One [`SessionState`] is shared by every thread of a connection. Threads
//! read the connection phase and shutdown flag lock-free; the first fatal
//! error wins the error slot and flips the session into shutdown so the
//! remaining threads wind down on their next check.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};

use crate::error::Error;
use crate::types::ConnectionState;

/// Stream health counters using atomics for lock-free access
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Data packages merged into the state model
    pub packets_merged: AtomicU64,
    /// Packages the controller skipped, inferred from timestamp gaps
    pub packets_dropped: AtomicU64,
    /// Merge intervals outside the accepted wall-clock window
    pub cadence_violations: AtomicU64,
    /// Byte blocks discarded to resynchronize the stream
    pub frames_discarded: AtomicU64,
}

/// Point-in-time copy of the stream health counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub packets_merged: u64,
    pub packets_dropped: u64,
    pub cadence_violations: u64,
    pub frames_discarded: u64,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "merged={} dropped={} cadence_violations={} discarded={}",
            self.packets_merged,
            self.packets_dropped,
            self.cadence_violations,
            self.frames_discarded
        )
    }
}

/// Connection-wide state shared across the worker threads
#[derive(Debug)]
pub struct SessionState {
    /// Current connection phase, stored as the state's discriminant
    connection: AtomicU8,
    /// Fixed frame size in bytes once streaming starts; 0 means
    /// variable-size framing (header-driven reassembly)
    fixed_frame_size: AtomicUsize,
    /// Set once, checked by every worker loop
    shutdown: AtomicBool,
    /// Stream health counters
    pub stats: SessionStats,
    /// First fatal error of the session
    error: Mutex<Option<Error>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            connection: AtomicU8::new(ConnectionState::Disconnected as u8),
            fixed_frame_size: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            stats: SessionStats::default(),
            error: Mutex::new(None),
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(&self) -> ConnectionState {
        ConnectionState::from_u8(self.connection.load(Ordering::Relaxed))
    }

    pub fn set_connection(&self, state: ConnectionState) {
        let previous = self.connection.swap(state as u8, Ordering::Relaxed);
        if previous != state as u8 {
            log::debug!(
                "Connection {:?} -> {:?}",
                ConnectionState::from_u8(previous),
                state
            );
        }
    }

    /// Switch the stream to fixed-size framing. Every subsequent frame
    /// occupies exactly `size` bytes on the wire.
    pub fn lock_frame_size(&self, size: usize) {
        self.fixed_frame_size.store(size, Ordering::Relaxed);
        log::debug!("Frame size locked at {} bytes", size);
    }

    /// Return to header-driven variable-size framing
    pub fn release_frame_size(&self) {
        self.fixed_frame_size.store(0, Ordering::Relaxed);
        log::debug!("Frame size released");
    }

    /// The locked frame size, or None while framing is variable
    pub fn frame_size(&self) -> Option<usize> {
        match self.fixed_frame_size.load(Ordering::Relaxed) {
            0 => None,
            size => Some(size),
        }
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Record a fatal error and begin winding the session down.
    ///
    /// Only the first error is kept; later failures are usually knock-on
    /// effects of the first and are logged at debug level instead.
    pub fn fail(&self, err: Error) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            log::error!("Session failed: {}", err);
            *slot = Some(err);
        } else {
            log::debug!("Follow-up session error: {}", err);
        }
        drop(slot);
        self.connection
            .store(ConnectionState::Error as u8, Ordering::Relaxed);
        self.request_shutdown();
    }

    /// Take ownership of the session's fatal error, if any
    pub fn take_error(&self) -> Option<Error> {
        self.error.lock().take()
    }

    /// Peek at the fatal error without consuming it
    pub fn error_message(&self) -> Option<String> {
        self.error.lock().as_ref().map(|e| e.to_string())
    }

    pub fn has_failed(&self) -> bool {
        self.error.lock().is_some()
    }

    pub fn snapshot_stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_merged: self.stats.packets_merged.load(Ordering::Relaxed),
            packets_dropped: self.stats.packets_dropped.load(Ordering::Relaxed),
            cadence_violations: self.stats.cadence_violations.load(Ordering::Relaxed),
            frames_discarded: self.stats.frames_discarded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_disconnected_and_variable() {
        let session = SessionState::new();
        assert_eq!(session.connection(), ConnectionState::Disconnected);
        assert_eq!(session.frame_size(), None);
        assert!(!session.is_shutdown());
    }

    #[test]
    fn test_frame_size_lock_and_release() {
        let session = SessionState::new();
        session.lock_frame_size(63);
        assert_eq!(session.frame_size(), Some(63));
        session.release_frame_size();
        assert_eq!(session.frame_size(), None);
    }

    #[test]
    fn test_first_error_wins() {
        let session = SessionState::new();
        session.fail(Error::Timeout);
        session.fail(Error::Disconnected);
        assert_eq!(session.connection(), ConnectionState::Error);
        assert!(session.is_shutdown());
        assert!(matches!(session.take_error(), Some(Error::Timeout)));
        assert!(session.take_error().is_none());
    }

    #[test]
    fn test_stats_snapshot() {
        let session = SessionState::new();
        session.stats.packets_merged.fetch_add(5, Ordering::Relaxed);
        session.stats.frames_discarded.fetch_add(2, Ordering::Relaxed);
        let stats = session.snapshot_stats();
        assert_eq!(stats.packets_merged, 5);
        assert_eq!(stats.frames_discarded, 2);
        assert_eq!(stats.packets_dropped, 0);
    }
}

//! Link statistics
//!
//! Thread-safe counters updated from both the drain task and the reader
//! thread. Uses lock-free atomics for all operations.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one controller (survive reconnects)
#[derive(Debug, Default)]
pub struct Stats {
    queued: AtomicU64,
    duplicates: AtomicU64,
    sent: AtomicU64,
    forced: AtomicU64,
    acked: AtomicU64,
    resent: AtomicU64,
    abandoned: AtomicU64,
    write_failures: AtomicU64,
    lines: AtomicU64,
    imu_samples: AtomicU64,
}

/// Point-in-time copy of `Stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Messages appended to the queue
    pub queued: u64,
    /// Enqueues dropped because they repeated the tail
    pub duplicates: u64,
    /// Messages written by a drain tick
    pub sent: u64,
    /// Messages written past the queue
    pub forced: u64,
    /// Matching echoes
    pub acked: u64,
    /// Resends after a mismatched echo
    pub resent: u64,
    /// In-flight messages given up after the retry cap
    pub abandoned: u64,
    pub write_failures: u64,
    /// Raw lines from the device
    pub lines: u64,
    pub imu_samples: u64,
}

macro_rules! counter {
    ($($record:ident => $field:ident),* $(,)?) => {
        $(
            #[inline]
            pub fn $record(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    counter! {
        record_queued => queued,
        record_duplicate => duplicates,
        record_sent => sent,
        record_forced => forced,
        record_acked => acked,
        record_resent => resent,
        record_abandoned => abandoned,
        record_write_failure => write_failures,
        record_line => lines,
        record_imu_sample => imu_samples,
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            forced: self.forced.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            resent: self.resent.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            lines: self.lines.load(Ordering::Relaxed),
            imu_samples: self.imu_samples.load(Ordering::Relaxed),
        }
    }
}

//! Consensus loop counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct LoopMetrics {
    validated_blocks: AtomicU64,
    validate_us: AtomicU64,
    rejected_blocks: AtomicU64,
    witness_retries: AtomicU64,
    rewound_blocks: AtomicU64,
    flushes: AtomicU64,
    flush_us: AtomicU64,
    prefetch_hits: AtomicU64,
    prefetch_stale: AtomicU64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopMetricsSnapshot {
    pub validated_blocks: u64,
    pub validate_us: u64,
    pub rejected_blocks: u64,
    pub witness_retries: u64,
    pub rewound_blocks: u64,
    pub flushes: u64,
    pub flush_us: u64,
    pub prefetch_hits: u64,
    pub prefetch_stale: u64,
}

impl LoopMetrics {
    pub fn record_validated(&self, elapsed: Duration) {
        self.validate_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.validated_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_witness_retry(&self) {
        self.witness_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rewind(&self) {
        self.rewound_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self, elapsed: Duration) {
        self.flush_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prefetch(&self, hit: bool) {
        if hit {
            self.prefetch_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.prefetch_stale.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        LoopMetricsSnapshot {
            validated_blocks: self.validated_blocks.load(Ordering::Relaxed),
            validate_us: self.validate_us.load(Ordering::Relaxed),
            rejected_blocks: self.rejected_blocks.load(Ordering::Relaxed),
            witness_retries: self.witness_retries.load(Ordering::Relaxed),
            rewound_blocks: self.rewound_blocks.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            flush_us: self.flush_us.load(Ordering::Relaxed),
            prefetch_hits: self.prefetch_hits.load(Ordering::Relaxed),
            prefetch_stale: self.prefetch_stale.load(Ordering::Relaxed),
        }
    }
}

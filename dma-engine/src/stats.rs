//! Engine activity counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters updated across interrupt and caller contexts.
#[derive(Default)]
pub struct EngineStats {
    pub(crate) interrupts: AtomicU64,
    pub(crate) spurious_interrupts: AtomicU64,
    pub(crate) command_batches: AtomicU64,
    pub(crate) commands_received: AtomicU64,
    pub(crate) responses_written: AtomicU64,
    pub(crate) response_wait_us: AtomicU64,
    pub(crate) read_completions: AtomicU64,
    pub(crate) write_completions: AtomicU64,
    pub(crate) dma_errors: AtomicU64,
}

impl EngineStats {
    pub(crate) fn add(counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            interrupts: self.interrupts.load(Ordering::Relaxed),
            spurious_interrupts: self.spurious_interrupts.load(Ordering::Relaxed),
            command_batches: self.command_batches.load(Ordering::Relaxed),
            commands_received: self.commands_received.load(Ordering::Relaxed),
            responses_written: self.responses_written.load(Ordering::Relaxed),
            response_wait_us: self.response_wait_us.load(Ordering::Relaxed),
            read_completions: self.read_completions.load(Ordering::Relaxed),
            write_completions: self.write_completions.load(Ordering::Relaxed),
            dma_errors: self.dma_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    pub interrupts: u64,
    pub spurious_interrupts: u64,
    pub command_batches: u64,
    pub commands_received: u64,
    pub responses_written: u64,
    pub response_wait_us: u64,
    pub read_completions: u64,
    pub write_completions: u64,
    pub dma_errors: u64,
}

//! DMA completion and error classification.
//!
//! Turns a per-direction raw interrupt status word into one completion
//! outcome and one recommended recovery action per channel, then reports
//! each upstream. The classifier never retries or resets anything itself.

use std::sync::atomic::Ordering;

use card_regs::{dma, Direction};

use crate::stats::EngineStats;
use crate::{CardEngine, RecoveryAction, TransferOutcome};

impl CardEngine {
    /// Classify and report both directions of accumulated raw status.
    pub(crate) fn handle_dma_status(&self, read_status: u32, write_status: u32) {
        if read_status != 0 {
            for channel in 0..self.read_channel_count {
                self.classify_channel(Direction::Read, channel, read_status);
            }
        }
        if write_status != 0 {
            for channel in 0..self.write_channel_count {
                self.classify_channel(Direction::Write, channel, write_status);
            }
        }
    }

    fn classify_channel(&self, dir: Direction, channel: usize, status: u32) {
        let (outcome, recovery) = if status & dma::done_bit(channel) != 0 {
            (TransferOutcome::Done, RecoveryAction::None)
        } else if status & dma::abort_bit(channel) != 0 {
            (TransferOutcome::Failed, self.recovery_for_abort(dir, channel))
        } else {
            return;
        };

        let elapsed_us = self.elapsed_us(dir, channel);

        match dir {
            Direction::Read => EngineStats::bump(&self.stats.read_completions),
            Direction::Write => EngineStats::bump(&self.stats.write_completions),
        }
        if outcome == TransferOutcome::Failed {
            EngineStats::bump(&self.stats.dma_errors);
        }

        self.callbacks
            .dma_complete(dir, channel, outcome, recovery, elapsed_us);
    }

    fn recovery_for_abort(&self, dir: Direction, channel: usize) -> RecoveryAction {
        match dir {
            Direction::Read => {
                let status_lo = self.regs.read(dma::READ_ERR_STATUS_LOW);
                let status_hi = self.regs.read(dma::READ_ERR_STATUS_HIGH);

                let fatal = status_lo & dma::remote_err_bit(channel) != 0
                    || status_lo & dma::fetch_err_bit(channel) != 0
                    || status_hi & dma::data_poison_bit(channel) != 0;

                let action = if fatal {
                    RecoveryAction::ResetEngine
                } else if !self.no_dma_retries() {
                    RecoveryAction::RetryTransfer
                } else {
                    RecoveryAction::None
                };

                log::error!(
                    "DMA error on read channel {} recovery={:?} status_hi={:#x} status_lo={:#x}",
                    channel,
                    action,
                    status_hi,
                    status_lo
                );
                action
            }
            Direction::Write => {
                let status = self.regs.read(dma::WRITE_ERR_STATUS);

                let fatal = status & dma::remote_err_bit(channel) != 0
                    || status & dma::fetch_err_bit(channel) != 0;

                let action = if fatal {
                    RecoveryAction::ResetEngine
                } else {
                    RecoveryAction::None
                };

                log::error!(
                    "DMA error on write channel {} recovery={:?} status={:#x}",
                    channel,
                    action,
                    status
                );
                action
            }
        }
    }

    fn elapsed_us(&self, dir: Direction, channel: usize) -> u32 {
        let started = self
            .channel_record(dir, channel)
            .started_us
            .load(Ordering::Relaxed);
        if started == 0 {
            return 0;
        }
        self.now_us().saturating_sub(started) as u32
    }
}

//! Interrupt dispatch: the masked stage and the deferred stage.
//!
//! The masked stage runs with all handled causes masked and the interrupt
//! lock held; it captures every simultaneous cause of one interrupt
//! occurrence under a single lock acquisition before anything is processed,
//! so one hardware interrupt can carry doorbell, command, and DMA causes at
//! once without losing any of them. The deferred stage drains the captured
//! work with no lock held.

use std::sync::atomic::Ordering;

use card_regs::link::{self, LinkCause};
use card_regs::{dma, Direction};

use crate::stats::EngineStats;
use crate::{CardEngine, IrqState};

/// What [`CardEngine::isr`] asks of the interrupt shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqDisposition {
    /// No enabled cause was set; the interrupt was not ours.
    None,
    /// Fully handled in the masked stage.
    Handled,
    /// Captured work remains; invoke [`CardEngine::threaded`].
    WakeThread,
}

impl CardEngine {
    /// Masked interrupt stage. Fast and non-blocking; call from the
    /// hardware interrupt context.
    pub fn isr(&self) -> IrqDisposition {
        let handled = LinkCause::handled();
        let mut wake_writers = false;

        let disposition = {
            let mut state = self.irq.lock();

            // Mask everything except the line-reset cause: platform
            // firmware takes over warm-reset handling whenever that cause
            // is masked, so it must stay visible even mid-interrupt.
            self.regs
                .write(link::LINK_MASK, !LinkCause::LINE_RESET.bits());

            let status = self.regs.read(link::LINK_STATUS);

            if status & handled.bits() == 0 {
                EngineStats::bump(&self.stats.spurious_interrupts);
                self.regs.write(link::LINK_MASK, !handled.bits());
                return IrqDisposition::None;
            }
            EngineStats::bump(&self.stats.interrupts);

            let cause = LinkCause::from_bits_truncate(status);

            if cause.contains(LinkCause::DMA) {
                let (read_status, write_status) = self.read_and_clear_dma_status();
                let merged = read_status as u64 | (write_status as u64) << 32;
                self.pending.dma_status.fetch_or(merged, Ordering::AcqRel);
            }

            if cause.contains(LinkCause::NEW_COMMAND) {
                self.pending.new_command.store(true, Ordering::Release);
            }

            // Acknowledge every recognized cause at once.
            self.regs.write(link::LINK_STATUS, status & handled.bits());

            if cause.contains(LinkCause::RESPONSE_READ_UPDATE) {
                self.drain_count.fetch_add(1, Ordering::Release);
                wake_writers = true;
            }

            if cause.contains(LinkCause::BME_CHANGE) {
                self.update_bus_master_state(&mut state);
            }

            if cause.contains(LinkCause::LINE_RESET) {
                log::error!("line reset requested from host");
                self.signal_going_down(&mut state);
            }
            if cause.contains(LinkCause::HOT_RESET) {
                log::error!("hot reset requested from host");
                self.signal_going_down(&mut state);
            }
            if cause.contains(LinkCause::PME_TURN_OFF) {
                log::error!("power-management turn-off requested from host");
                self.signal_going_down(&mut state);
            }

            if cause.contains(LinkCause::DOORBELL) {
                let value = self.regs.read(link::HOST_DOORBELL);
                self.on_host_doorbell(&mut state, value);
            }

            let disposition = if status & LinkCause::threaded_stage().bits() != 0 {
                IrqDisposition::WakeThread
            } else {
                IrqDisposition::Handled
            };

            self.regs.write(link::LINK_MASK, !handled.bits());
            disposition
        };

        if wake_writers {
            let _gate = self.writer_gate.lock();
            self.writer_cond.notify_all();
        }

        disposition
    }

    /// Deferred interrupt stage. May block; call from the threaded
    /// interrupt context whenever [`CardEngine::isr`] returned
    /// [`IrqDisposition::WakeThread`].
    pub fn threaded(&self) {
        if self.pending.doorbell_changed.swap(false, Ordering::AcqRel) {
            let value = self.irq.lock().host_doorbell;
            self.callbacks.doorbell_changed(value);
        }

        if self.pending.new_command.swap(false, Ordering::AcqRel) {
            self.process_commands();
        }

        let dma_status = self.pending.dma_status.swap(0, Ordering::AcqRel);
        if dma_status != 0 {
            self.handle_dma_status(dma_status as u32, (dma_status >> 32) as u32);
        }
    }

    /// Read and clear both directions' raw interrupt status words.
    pub(crate) fn read_and_clear_dma_status(&self) -> (u32, u32) {
        let read_status = self.regs.read(dma::int_status_reg(Direction::Read));
        let write_status = self.regs.read(dma::int_status_reg(Direction::Write));

        if read_status != 0 {
            self.regs
                .write(dma::int_clear_reg(Direction::Read), read_status);
        }
        if write_status != 0 {
            self.regs
                .write(dma::int_clear_reg(Direction::Write), write_status);
        }

        (read_status, write_status)
    }

    /// Tell the host the card is going down, then run the reset policy.
    fn signal_going_down(&self, state: &mut IrqState) {
        state.card_doorbell = 0;
        self.regs.write(link::CARD_DOORBELL, 0);
        self.execute_reset_policy();
    }
}

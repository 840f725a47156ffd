//! Card→host response FIFO writer with hardware flow control.
//!
//! The writer keeps a cached free-slot count so the common case costs no
//! register read. When the cache is short it re-reads the hardware pointers
//! under the interrupt lock (the interrupt path touches them too). A failed
//! attempt reports the drain counter observed at refresh time; the counter
//! only moves when the host genuinely consumed entries, so retrying after it
//! changes is guaranteed to observe more capacity or fresh contention.

use std::sync::atomic::Ordering;
use std::time::Instant;

use card_regs::link;

use crate::stats::EngineStats;
use crate::{CardEngine, Error, Result};

impl CardEngine {
    /// Write a batch of response messages without blocking.
    ///
    /// All but the last message go through the non-interrupting register
    /// pair; the last goes through the interrupting pair, so the host gets
    /// exactly one notification per batch. Caller-submission order is
    /// preserved within the batch.
    pub fn write_response_nowait(&self, messages: &[u64]) -> Result<()> {
        let Some((last, head)) = messages.split_last() else {
            return Ok(());
        };
        if messages.len() > link::FIFO_DEPTH {
            return Err(Error::InvalidArgument);
        }

        let mut queue = self.respq.lock();

        if (queue.free_slots as usize) < messages.len() {
            // Refresh from hardware pointers, nested inside the interrupt
            // lock since the dispatcher reads the same control register.
            let _irq = self.irq.lock();
            let ctrl = self.regs.read(link::RESP_FIFO_CTRL);
            queue.free_slots = link::FIFO_DEPTH as u32 - link::pending_entries(ctrl);

            if (queue.free_slots as usize) < messages.len() {
                let drain_count = self.drain_count.load(Ordering::Acquire);
                return Err(Error::WouldBlock { drain_count });
            }
        }

        for msg in head {
            self.regs.write(link::RESP_WRITE_LOW, *msg as u32);
            self.regs.write(link::RESP_WRITE_HIGH, (*msg >> 32) as u32);
        }
        self.regs.write(link::RESP_WRITE_IRQ_LOW, *last as u32);
        self.regs.write(link::RESP_WRITE_IRQ_HIGH, (*last >> 32) as u32);

        queue.free_slots -= messages.len() as u32;
        EngineStats::add(&self.stats.responses_written, messages.len() as u64);

        Ok(())
    }

    /// Write a batch of response messages, blocking under backpressure
    /// until the host drains the FIFO. Engine shutdown interrupts the wait
    /// with [`Error::Interrupted`].
    pub fn write_response(&self, messages: &[u64]) -> Result<()> {
        let mut wait_start: Option<Instant> = None;

        loop {
            match self.write_response_nowait(messages) {
                Ok(()) => {
                    if let Some(start) = wait_start {
                        EngineStats::add(
                            &self.stats.response_wait_us,
                            start.elapsed().as_micros() as u64,
                        );
                    }
                    return Ok(());
                }
                Err(Error::WouldBlock { drain_count }) => {
                    wait_start.get_or_insert_with(Instant::now);

                    let mut gate = self.writer_gate.lock();
                    while self.drain_count.load(Ordering::Acquire) == drain_count {
                        if self.shutdown.load(Ordering::Acquire) {
                            log::error!(
                                "response write of {} messages interrupted",
                                messages.len()
                            );
                            return Err(Error::Interrupted);
                        }
                        self.writer_cond.wait(&mut gate);
                    }
                }
                Err(err) => {
                    log::error!(
                        "failed to write response batch of {} messages: {}",
                        messages.len(),
                        err
                    );
                    return Err(err);
                }
            }
        }
    }
}

//! Host→card command FIFO drain.

use card_regs::link;

use crate::stats::EngineStats;
use crate::CardEngine;

impl CardEngine {
    /// Drain every pending command FIFO entry and forward the batch to the
    /// upstream message processor, in hardware FIFO order.
    pub(crate) fn process_commands(&self) {
        let mut batch = [0u64; link::FIFO_DEPTH];

        let ctrl = self.regs.read(link::CMD_FIFO_CTRL);
        let read_ptr = link::read_pointer(ctrl);
        let avail = link::pending_entries(ctrl) as usize;
        if avail == 0 {
            return;
        }

        for (i, slot_msg) in batch.iter_mut().enumerate().take(avail) {
            let slot = (read_ptr as usize + i) % link::FIFO_DEPTH;
            let low = self.regs.read(link::cmd_fifo_low(slot)) as u64;
            let high = self.regs.read(link::cmd_fifo_high(slot)) as u64;
            *slot_msg = high << 32 | low;
        }

        let final_ptr = (read_ptr + avail as u32) % link::FIFO_DEPTH as u32;

        // The hardware rejects writing a pointer field with its current
        // value. Draining a completely full FIFO lands the final pointer
        // exactly where it started, so advance by one position first and
        // only then to the final value.
        if avail == link::FIFO_DEPTH {
            let step = (read_ptr + 1) % link::FIFO_DEPTH as u32;
            self.regs
                .write(link::CMD_FIFO_CTRL, link::with_read_pointer(ctrl, step));
        }

        self.regs
            .write(link::CMD_FIFO_CTRL, link::with_read_pointer(ctrl, final_ptr));

        EngineStats::bump(&self.stats.command_batches);
        EngineStats::add(&self.stats.commands_received, avail as u64);

        self.callbacks.process_command_batch(&batch[..avail]);
    }
}

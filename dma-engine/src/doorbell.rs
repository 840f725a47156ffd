//! Doorbell protocol and link-state transitions.
//!
//! The host and card each publish one 32-bit doorbell scalar. Both carry a
//! keep-alive sub-field in the same bit positions; the card echoes the
//! host's keep-alive bits so the host can tell the card saw its last
//! announcement. The host doorbell additionally carries a self-reset
//! request flag.

use std::sync::atomic::Ordering;

use card_regs::link::{self, LinkCause};

use crate::{CardEngine, IrqState, ResetMode};

impl CardEngine {
    /// Host doorbell change, masked interrupt stage.
    pub(crate) fn on_host_doorbell(&self, state: &mut IrqState, value: u32) {
        if value & link::SELF_RESET_REQUEST != 0 {
            log::error!("self reset requested from host");
            self.execute_reset_policy();
            return;
        }

        if (value & link::KEEP_ALIVE_MASK) != (state.host_doorbell & link::KEEP_ALIVE_MASK) {
            state.card_doorbell &= !link::KEEP_ALIVE_MASK;
            state.card_doorbell |= value & link::KEEP_ALIVE_MASK;
            self.regs.write(link::CARD_DOORBELL, state.card_doorbell);
        }

        state.host_doorbell = value;
        self.pending.doorbell_changed.store(true, Ordering::Release);
    }

    /// Last observed host doorbell value.
    pub fn host_doorbell(&self) -> u32 {
        self.irq.lock().host_doorbell
    }

    /// Publish the card doorbell. The keep-alive sub-field of `value` is
    /// ignored and replaced with the host's last announced keep-alive bits,
    /// keeping the liveness echo intact no matter what the caller passes.
    pub fn set_card_doorbell(&self, value: u32) {
        let merged = {
            let mut state = self.irq.lock();
            let mut v = value & !link::KEEP_ALIVE_MASK;
            v |= state.host_doorbell & link::KEEP_ALIVE_MASK;
            state.card_doorbell = v;
            v
        };
        self.regs.write(link::CARD_DOORBELL, merged);
    }

    /// Re-read the bus-master level bit and act on a transition. The DMA
    /// engine must be reinitialized whenever mastering comes back up before
    /// any transfer is started.
    pub(crate) fn update_bus_master_state(&self, state: &mut IrqState) {
        let status = self.regs.read(link::LINK_STATUS);
        let enabled = status & LinkCause::BUS_MASTER_ENABLED.bits() != 0;
        if enabled != state.bus_master_en {
            if enabled {
                self.init_dma_engine();
            }
            state.bus_master_en = enabled;
            log::debug!("bus mastering {}", if enabled { "enabled" } else { "disabled" });
        }
    }

    /// Run the configured reset policy. `Ignore` suppresses the reset;
    /// every other mode is handed to the platform hook.
    pub(crate) fn execute_reset_policy(&self) {
        let mode = self.reset_mode();
        if mode == ResetMode::Ignore {
            log::warn!("reset request ignored by policy");
            return;
        }
        self.callbacks.platform_reset(mode);
    }
}

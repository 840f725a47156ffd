//! Test doubles: a register-accurate mock of the card's host-link and DMA
//! blocks, and a recording callback sink.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use card_regs::{dma, link, ChannelStatus, Direction, RegisterIo};
use dma_engine::{
    CardEngine, EngineConfig, HostCallbacks, RecoveryAction, ResetMode, TransferOutcome,
};

pub type Completion = (Direction, usize, TransferOutcome, RecoveryAction, u32);

#[derive(Default)]
struct MockState {
    regs: HashMap<u32, u32>,
    causes: u32,
    mask: u32,
    bus_master: bool,

    cmd_read_ptr: u32,
    cmd_pending: u32,
    cmd_slots: [u64; link::FIFO_DEPTH],
    cmd_nop_violations: u32,

    resp_read_ptr: u32,
    resp_pending: u32,
    resp_staged_low: u32,
    resp_staged_irq_low: u32,
    responses: Vec<(u64, bool)>,

    dma_read_status: u32,
    dma_write_status: u32,

    doorbell_strikes: Vec<(Direction, u32)>,
    /// Channel state the "hardware" reports on write-channel-0 once its
    /// doorbell is struck: control status field and residual size.
    write_ch0_script: Option<(ChannelStatus, u32)>,
}

/// Mock register window modeling the FIFO pointer contract, cause
/// acknowledge semantics, and DMA doorbell effects.
#[derive(Default)]
pub struct MockDevice {
    state: Mutex<MockState>,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn preset(&self, offset: u32, value: u32) {
        self.state.lock().regs.insert(offset, value);
    }

    pub fn raise(&self, causes: link::LinkCause) {
        self.state.lock().causes |= causes.bits();
    }

    pub fn set_bus_master(&self, enabled: bool) {
        self.state.lock().bus_master = enabled;
    }

    pub fn set_host_doorbell(&self, value: u32) {
        self.preset(link::HOST_DOORBELL, value);
    }

    pub fn card_doorbell(&self) -> u32 {
        self.read(link::CARD_DOORBELL)
    }

    pub fn push_command(&self, message: u64) {
        let mut st = self.state.lock();
        assert!((st.cmd_pending as usize) < link::FIFO_DEPTH, "command FIFO overrun");
        let slot = (st.cmd_read_ptr + st.cmd_pending) as usize % link::FIFO_DEPTH;
        st.cmd_slots[slot] = message;
        st.cmd_pending += 1;
    }

    pub fn cmd_pending(&self) -> u32 {
        self.state.lock().cmd_pending
    }

    pub fn cmd_nop_violations(&self) -> u32 {
        self.state.lock().cmd_nop_violations
    }

    /// Host consumed `count` response entries.
    pub fn host_drain_responses(&self, count: u32) {
        let mut st = self.state.lock();
        assert!(count <= st.resp_pending);
        st.resp_pending -= count;
        st.resp_read_ptr = (st.resp_read_ptr + count) % link::FIFO_DEPTH as u32;
    }

    pub fn responses(&self) -> Vec<(u64, bool)> {
        self.state.lock().responses.clone()
    }

    pub fn set_dma_read_status(&self, status: u32) {
        self.state.lock().dma_read_status = status;
    }

    pub fn set_dma_write_status(&self, status: u32) {
        self.state.lock().dma_write_status = status;
    }

    pub fn set_read_errors(&self, low: u32, high: u32) {
        self.preset(dma::READ_ERR_STATUS_LOW, low);
        self.preset(dma::READ_ERR_STATUS_HIGH, high);
    }

    pub fn set_write_errors(&self, status: u32) {
        self.preset(dma::WRITE_ERR_STATUS, status);
    }

    pub fn doorbell_strikes(&self) -> Vec<(Direction, u32)> {
        self.state.lock().doorbell_strikes.clone()
    }

    /// Once write-channel-0's doorbell is struck, report this channel
    /// status and residual transfer size.
    pub fn script_write_ch0(&self, status: ChannelStatus, residual: u32) {
        self.state.lock().write_ch0_script = Some((status, residual));
    }

    pub fn link_mask(&self) -> u32 {
        self.state.lock().mask
    }
}

impl RegisterIo for MockDevice {
    fn read(&self, offset: u32) -> u32 {
        let st = self.state.lock();
        match offset {
            link::LINK_STATUS => {
                let bme = if st.bus_master {
                    link::LinkCause::BUS_MASTER_ENABLED.bits()
                } else {
                    0
                };
                st.causes | bme
            }
            link::CMD_FIFO_CTRL => {
                let wp = (st.cmd_read_ptr + st.cmd_pending) & link::POINTER_MASK;
                st.cmd_read_ptr | (wp << 8)
            }
            link::RESP_FIFO_CTRL => {
                let wp = (st.resp_read_ptr + st.resp_pending) & link::POINTER_MASK;
                st.resp_read_ptr | (wp << 8)
            }
            dma::READ_INT_STATUS => st.dma_read_status,
            dma::WRITE_INT_STATUS => st.dma_write_status,
            _ => {
                if let Some(slot) = cmd_fifo_slot(offset) {
                    let value = st.cmd_slots[slot.0];
                    if slot.1 {
                        (value >> 32) as u32
                    } else {
                        value as u32
                    }
                } else {
                    st.regs.get(&offset).copied().unwrap_or(0)
                }
            }
        }
    }

    fn write(&self, offset: u32, value: u32) {
        let mut st = self.state.lock();
        match offset {
            link::LINK_STATUS => {
                // Write-1-to-acknowledge; the bus-master level bit is not
                // writable.
                st.causes &= !value;
            }
            link::LINK_MASK => st.mask = value,
            link::CMD_FIFO_CTRL => {
                let new_ptr = value & 0xFF;
                if new_ptr == st.cmd_read_ptr {
                    // Hardware rejects a no-op pointer write.
                    st.cmd_nop_violations += 1;
                    return;
                }
                let consumed =
                    new_ptr.wrapping_sub(st.cmd_read_ptr) % link::FIFO_DEPTH as u32;
                assert!(consumed <= st.cmd_pending, "read pointer ran past write pointer");
                st.cmd_pending -= consumed;
                st.cmd_read_ptr = new_ptr;
            }
            link::RESP_WRITE_LOW => st.resp_staged_low = value,
            link::RESP_WRITE_HIGH => {
                let message = (value as u64) << 32 | st.resp_staged_low as u64;
                st.responses.push((message, false));
                st.resp_pending += 1;
            }
            link::RESP_WRITE_IRQ_LOW => st.resp_staged_irq_low = value,
            link::RESP_WRITE_IRQ_HIGH => {
                let message = (value as u64) << 32 | st.resp_staged_irq_low as u64;
                st.responses.push((message, true));
                st.resp_pending += 1;
            }
            dma::READ_INT_CLEAR => st.dma_read_status &= !value,
            dma::WRITE_INT_CLEAR => st.dma_write_status &= !value,
            dma::READ_DOORBELL => {
                st.doorbell_strikes.push((Direction::Read, value));
            }
            dma::WRITE_DOORBELL => {
                st.doorbell_strikes.push((Direction::Write, value));
                if value == 0 {
                    if let Some((status, residual)) = st.write_ch0_script {
                        st.regs.insert(
                            dma::channel_reg(Direction::Write, 0, dma::CH_CONTROL1),
                            status.to_control(),
                        );
                        st.regs.insert(
                            dma::channel_reg(Direction::Write, 0, dma::CH_TRANSFER_SIZE),
                            residual,
                        );
                    }
                }
            }
            _ => {
                st.regs.insert(offset, value);
            }
        }
    }
}

/// `(slot index, is high half)` when `offset` addresses the command FIFO.
fn cmd_fifo_slot(offset: u32) -> Option<(usize, bool)> {
    let first = link::cmd_fifo_low(0);
    let last = link::cmd_fifo_high(link::FIFO_DEPTH - 1);
    if offset < first || offset > last {
        return None;
    }
    let rel = offset - first;
    Some(((rel / 8) as usize, rel % 8 == 4))
}

/// Callback sink recording every upstream delivery.
#[derive(Default)]
pub struct TestHooks {
    pub batches: Mutex<Vec<Vec<u64>>>,
    pub completions: Mutex<Vec<Completion>>,
    pub doorbells: Mutex<Vec<u32>>,
    pub resets: Mutex<Vec<ResetMode>>,
}

impl TestHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl HostCallbacks for TestHooks {
    fn process_command_batch(&self, messages: &[u64]) {
        self.batches.lock().push(messages.to_vec());
    }

    fn dma_complete(
        &self,
        direction: Direction,
        channel: usize,
        outcome: TransferOutcome,
        recovery: RecoveryAction,
        elapsed_us: u32,
    ) {
        self.completions
            .lock()
            .push((direction, channel, outcome, recovery, elapsed_us));
    }

    fn doorbell_changed(&self, value: u32) {
        self.doorbells.lock().push(value);
    }

    fn platform_reset(&self, mode: ResetMode) {
        self.resets.lock().push(mode);
    }
}

/// A fresh engine over a fresh mock device.
pub fn engine_with(
    config: EngineConfig,
) -> (Arc<MockDevice>, Arc<TestHooks>, Arc<CardEngine>) {
    let device = MockDevice::new();
    let hooks = TestHooks::new();
    let engine = Arc::new(
        CardEngine::new(device.clone(), hooks.clone(), config).expect("engine construction"),
    );
    (device, hooks, engine)
}

pub fn default_engine() -> (Arc<MockDevice>, Arc<TestHooks>, Arc<CardEngine>) {
    engine_with(EngineConfig::default())
}

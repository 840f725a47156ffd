//! DMA transfer engine and host-link control channel for the accelerator
//! card.
//!
//! This crate owns the card side of the PCIe host link: it programs the
//! multi-channel scatter-gather DMA controller through the register contract
//! in [`card_regs`], drains the host→card command FIFO, feeds the card→host
//! response FIFO under hardware flow control, builds and edits the
//! linked-list descriptor chains the DMA hardware walks on its own, and
//! splits interrupt handling into a fast masked stage and a deferred stage
//! without losing or duplicating events.
//!
//! The driver shell that probes the device constructs one [`CardEngine`] per
//! card, hands it the mapped register window and a [`HostCallbacks`]
//! implementation, calls [`CardEngine::attach`], and routes the hardware
//! interrupt to [`CardEngine::isr`] / [`CardEngine::threaded`].
//!
//! # Contexts
//!
//! Three kinds of execution run concurrently: the masked interrupt stage
//! (fast, non-blocking, under the interrupt lock), the deferred stage (may
//! block), and arbitrary caller threads using the public API. Only the
//! blocking response write suspends its caller; the polled single transfer
//! busy-waits under a deadline since the hardware raises no event for it.

pub mod chain;
mod classify;
mod cmdq;
mod doorbell;
pub mod error;
pub mod events;
mod irq;
mod respq;
pub mod stats;
mod xfer;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use card_regs::link;

pub use card_regs::{Direction, MmioRegion, RegisterIo, MAX_CHANNELS};
pub use chain::{ChainPolicy, DmaChain, SgEntry, MAX_SUBLISTS};
pub use error::{Error, Result};
pub use events::{HostCallbacks, RecoveryAction, ResetMode, TransferOutcome};
pub use irq::IrqDisposition;
pub use stats::{EngineStats, EngineStatsSnapshot};
pub use xfer::BlockingOutcome;

/// Construction-time engine configuration. The retry switch, chain split
/// parameters, reset mode, and latency tracking stay tunable at runtime and
/// take effect on the next chain built or transfer started.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Active read (host→card) channels, `1..=MAX_CHANNELS`.
    pub read_channels: usize,
    /// Active write (card→host) channels, `1..=MAX_CHANNELS`.
    pub write_channels: usize,
    /// What a reset request from the host performs.
    pub reset_mode: ResetMode,
    /// Descriptor chain sublist split factor.
    pub lli_split: u32,
    /// Minimum element count before a chain is split.
    pub lli_min_split: u32,
    /// Disable the retry recommendation for recoverable read aborts.
    pub no_dma_retries: bool,
    /// Record per-transfer start timestamps for latency accounting.
    pub track_latency: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            read_channels: MAX_CHANNELS,
            write_channels: MAX_CHANNELS,
            reset_mode: ResetMode::Warm,
            lli_split: 3,
            lli_min_split: 20,
            no_dma_retries: false,
            track_latency: true,
        }
    }
}

/// State shared with the masked interrupt stage, under the interrupt lock.
pub(crate) struct IrqState {
    pub(crate) host_doorbell: u32,
    pub(crate) card_doorbell: u32,
    pub(crate) bus_master_en: bool,
}

/// Work captured by the masked stage for the deferred stage. Status bits
/// merge with an atomic OR so concurrent interrupts never lose a bit; the
/// one-shot flags drain with a swap so each occurrence is delivered once.
pub(crate) struct PendingWork {
    /// Read-direction raw status in the low half, write in the high half.
    pub(crate) dma_status: AtomicU64,
    pub(crate) new_command: AtomicBool,
    pub(crate) doorbell_changed: AtomicBool,
}

pub(crate) struct Tunables {
    pub(crate) no_dma_retries: AtomicBool,
    pub(crate) lli_split: AtomicU32,
    pub(crate) lli_min_split: AtomicU32,
    pub(crate) reset_mode: AtomicU32,
    pub(crate) track_latency: AtomicBool,
}

/// Per-channel record: microsecond start timestamp of the transfer in
/// flight, zero when latency tracking was off for that transfer.
#[derive(Default)]
pub(crate) struct ChannelRecord {
    pub(crate) started_us: AtomicU64,
}

/// Response queue software state: the cached free-slot count, refreshed from
/// hardware pointers only when insufficient for a pending write.
pub(crate) struct RespqState {
    pub(crate) free_slots: u32,
}

/// The engine context object, one per attached card.
pub struct CardEngine {
    pub(crate) regs: Arc<dyn RegisterIo>,
    pub(crate) callbacks: Arc<dyn HostCallbacks>,
    epoch: Instant,

    pub(crate) irq: Mutex<IrqState>,
    pub(crate) pending: PendingWork,

    pub(crate) respq: Mutex<RespqState>,
    pub(crate) drain_count: AtomicU32,
    pub(crate) writer_gate: Mutex<()>,
    pub(crate) writer_cond: Condvar,
    pub(crate) shutdown: AtomicBool,

    pub(crate) weight_lock: spin::Mutex<()>,

    pub(crate) read_channel_count: usize,
    pub(crate) write_channel_count: usize,
    pub(crate) read_channels: [ChannelRecord; MAX_CHANNELS],
    pub(crate) write_channels: [ChannelRecord; MAX_CHANNELS],

    pub(crate) tunables: Tunables,
    pub(crate) stats: EngineStats,
}

impl CardEngine {
    pub fn new(
        regs: Arc<dyn RegisterIo>,
        callbacks: Arc<dyn HostCallbacks>,
        config: EngineConfig,
    ) -> Result<Self> {
        if config.read_channels == 0
            || config.read_channels > MAX_CHANNELS
            || config.write_channels == 0
            || config.write_channels > MAX_CHANNELS
        {
            return Err(Error::InvalidArgument);
        }

        Ok(Self {
            regs,
            callbacks,
            epoch: Instant::now(),
            irq: Mutex::new(IrqState {
                host_doorbell: 0,
                card_doorbell: 0,
                bus_master_en: false,
            }),
            pending: PendingWork {
                dma_status: AtomicU64::new(0),
                new_command: AtomicBool::new(false),
                doorbell_changed: AtomicBool::new(false),
            },
            respq: Mutex::new(RespqState { free_slots: 0 }),
            drain_count: AtomicU32::new(0),
            writer_gate: Mutex::new(()),
            writer_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            weight_lock: spin::Mutex::new(()),
            read_channel_count: config.read_channels,
            write_channel_count: config.write_channels,
            read_channels: Default::default(),
            write_channels: Default::default(),
            tunables: Tunables {
                no_dma_retries: AtomicBool::new(config.no_dma_retries),
                lli_split: AtomicU32::new(config.lli_split),
                lli_min_split: AtomicU32::new(config.lli_min_split),
                reset_mode: AtomicU32::new(config.reset_mode.to_raw()),
                track_latency: AtomicBool::new(config.track_latency),
            },
            stats: EngineStats::default(),
        })
    }

    /// Bring the link up: quiesce stale interrupt state, publish the reset
    /// mode, pick up the current bus-master state and host doorbell, enable
    /// the handled causes, and drain any commands already queued.
    pub fn attach(&self) {
        let handled = link::LinkCause::handled().bits();

        // Everything masked while we clear leftovers from a previous run.
        self.regs.write(link::LINK_MASK, !0);
        let _ = self.read_and_clear_dma_status();
        self.regs.write(link::LINK_STATUS, handled);

        self.pending.dma_status.store(0, Ordering::Relaxed);
        self.pending.new_command.store(false, Ordering::Relaxed);
        self.pending.doorbell_changed.store(false, Ordering::Relaxed);

        self.regs
            .write(link::CPU_STATUS, self.reset_mode().to_raw());

        let doorbell;
        {
            let mut state = self.irq.lock();
            self.update_bus_master_state(&mut state);
            doorbell = self.regs.read(link::HOST_DOORBELL);
            state.host_doorbell = doorbell;
        }
        self.callbacks.doorbell_changed(doorbell);

        // A doorbell cause raised before we were listening is stale now.
        let status = self.regs.read(link::LINK_STATUS);
        if status & link::LinkCause::DOORBELL.bits() != 0 {
            self.regs
                .write(link::LINK_STATUS, link::LinkCause::DOORBELL.bits());
        }

        self.regs.write(link::LINK_MASK, !handled);

        self.process_commands();
        log::debug!("link attach done, host doorbell {:#x}", doorbell);
    }

    /// Mask the link and release any threads blocked in a response write.
    pub fn detach(&self) {
        self.regs.write(link::LINK_MASK, !0);
        self.shutdown.store(true, Ordering::Release);
        let _gate = self.writer_gate.lock();
        self.writer_cond.notify_all();
        log::debug!("link detach done");
    }

    /// Base address and size of the host-visible inbound memory window.
    pub fn inbound_window(&self) -> (u64, u64) {
        let low = self.regs.read(link::ATU_INBOUND_TARGET_LOW) as u64;
        let high = self.regs.read(link::ATU_INBOUND_TARGET_HIGH) as u64;
        (high << 32 | low, link::INBOUND_WINDOW_SIZE)
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    /// Split parameters a chain built now would use.
    pub fn chain_policy(&self) -> ChainPolicy {
        ChainPolicy {
            split: self.tunables.lli_split.load(Ordering::Relaxed),
            min_split: self.tunables.lli_min_split.load(Ordering::Relaxed),
        }
    }

    pub fn set_chain_split(&self, split: u32, min_split: u32) {
        self.tunables.lli_split.store(split, Ordering::Relaxed);
        self.tunables.lli_min_split.store(min_split, Ordering::Relaxed);
    }

    pub fn no_dma_retries(&self) -> bool {
        self.tunables.no_dma_retries.load(Ordering::Relaxed)
    }

    pub fn set_no_dma_retries(&self, disable: bool) {
        self.tunables.no_dma_retries.store(disable, Ordering::Relaxed);
    }

    pub fn set_track_latency(&self, track: bool) {
        self.tunables.track_latency.store(track, Ordering::Relaxed);
    }

    pub fn reset_mode(&self) -> ResetMode {
        ResetMode::from_raw(self.tunables.reset_mode.load(Ordering::Relaxed))
    }

    /// Select the reset policy and publish it to platform firmware.
    pub fn set_reset_mode(&self, mode: ResetMode) {
        self.tunables.reset_mode.store(mode.to_raw(), Ordering::Relaxed);
        self.regs.write(link::CPU_STATUS, mode.to_raw());
    }

    /// Microseconds since engine construction, never zero so that zero can
    /// mean "not recorded" in per-channel timestamps.
    pub(crate) fn now_us(&self) -> u64 {
        (self.epoch.elapsed().as_micros() as u64).max(1)
    }

    pub(crate) fn channel_record(&self, dir: Direction, channel: usize) -> &ChannelRecord {
        match dir {
            Direction::Read => &self.read_channels[channel],
            Direction::Write => &self.write_channels[channel],
        }
    }

    pub(crate) fn channel_count(&self, dir: Direction) -> usize {
        match dir {
            Direction::Read => self.read_channel_count,
            Direction::Write => self.write_channel_count,
        }
    }
}

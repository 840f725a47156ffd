//! DMA engine controller: channel programming, arbitration weights,
//! engine initialization and group reset.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use card_regs::dma::{self, ChanControl, ChannelStatus};
use card_regs::Direction;

use crate::{CardEngine, Error, Result, TransferOutcome};

/// How long a channel group's master enable stays low during a reset.
const GROUP_RESET_SETTLE: Duration = Duration::from_micros(5);

/// Result of a polled out-of-band single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockingOutcome {
    pub outcome: TransferOutcome,
    pub elapsed_us: u32,
}

impl CardEngine {
    /// Start a linked-descriptor-chain transfer on `channel`.
    ///
    /// `chain_addr` is the bus address of the chain's head descriptor. The
    /// caller keeps ownership of the chain but must not mutate it until the
    /// channel reports completion.
    pub fn start_transfer(
        &self,
        dir: Direction,
        channel: usize,
        priority: u32,
        chain_addr: u64,
    ) -> Result<()> {
        self.check_channel(dir, channel)?;
        self.check_bus_master()?;

        self.program_channel(
            dir,
            channel,
            ChanControl::LLE | ChanControl::CCS | ChanControl::TD,
            0,
            0,
            0,
            chain_addr,
        );
        self.set_channel_weight(dir, channel, priority);
        self.stamp_channel(dir, channel);

        self.regs.write(dma::doorbell_reg(dir), channel as u32);
        Ok(())
    }

    /// Start a one-shot single-buffer transfer on `channel`. Completion
    /// still raises an interrupt via the local-interrupt flag.
    pub fn start_transfer_single(
        &self,
        dir: Direction,
        channel: usize,
        priority: u32,
        src: u64,
        dst: u64,
        size: u32,
    ) -> Result<()> {
        self.check_channel(dir, channel)?;
        self.check_bus_master()?;

        self.program_channel(
            dir,
            channel,
            ChanControl::LIE | ChanControl::TD,
            size,
            src,
            dst,
            0,
        );
        self.set_channel_weight(dir, channel, priority);
        self.stamp_channel(dir, channel);

        self.regs.write(dma::doorbell_reg(dir), channel as u32);
        Ok(())
    }

    /// Urgent out-of-band card→host single transfer, polled to completion.
    ///
    /// No interrupt is enabled for this path by design: the transfer is
    /// short and latency-sensitive, so the caller busy-polls the channel
    /// status field under a wall-clock deadline instead of suspending.
    pub fn blocking_transfer(
        &self,
        src: u64,
        dst: u64,
        size: u32,
        timeout: Duration,
    ) -> Result<BlockingOutcome> {
        const CHANNEL: usize = 0;
        let dir = Direction::Write;

        self.check_bus_master()?;

        self.program_channel(dir, CHANNEL, ChanControl::TD, size, src, dst, 0);

        let start = Instant::now();
        let deadline = start + timeout;
        self.regs.write(dma::doorbell_reg(dir), CHANNEL as u32);

        let status = loop {
            let control = self.regs.read(dma::channel_reg(dir, CHANNEL, dma::CH_CONTROL1));
            match ChannelStatus::from_control(control) {
                Some(ChannelStatus::Running) => {
                    if Instant::now() >= deadline {
                        log::error!("polled transfer of {} bytes timed out", size);
                        return Err(Error::Timeout);
                    }
                    std::hint::spin_loop();
                }
                other => break other,
            }
        };

        let outcome = if status == Some(ChannelStatus::Stopped) {
            let residual = self
                .regs
                .read(dma::channel_reg(dir, CHANNEL, dma::CH_TRANSFER_SIZE));
            if residual == 0 {
                TransferOutcome::Done
            } else {
                TransferOutcome::Failed
            }
        } else {
            TransferOutcome::Failed
        };

        Ok(BlockingOutcome {
            outcome,
            elapsed_us: start.elapsed().as_micros() as u32,
        })
    }

    /// Disable then re-enable one direction's channel-group master enable.
    /// Aborts every in-flight channel of that direction; emergency use and
    /// initialization only.
    pub fn reset_channel_group(&self, dir: Direction) {
        self.regs.write(dma::engine_enable_reg(dir), 0);
        std::thread::sleep(GROUP_RESET_SETTLE);
        self.regs.write(dma::engine_enable_reg(dir), 1);
    }

    /// Bring the DMA block to a clean state: clear stale channel status,
    /// zero every active channel's registers, arm local-abort interrupts
    /// for linked-list mode, unmask done/abort for the active channels, and
    /// reset both channel groups.
    pub fn init_dma_engine(&self) {
        for dir in [Direction::Read, Direction::Write] {
            let count = self.channel_count(dir);
            for channel in 0..count {
                self.regs
                    .write(dma::int_clear_reg(dir), dma::clear_bits(channel));

                for reg in [
                    dma::CH_CONTROL1,
                    dma::CH_CONTROL2,
                    dma::CH_TRANSFER_SIZE,
                    dma::CH_SAR_LOW,
                    dma::CH_SAR_HIGH,
                    dma::CH_DAR_LOW,
                    dma::CH_DAR_HIGH,
                    dma::CH_LLP_LOW,
                    dma::CH_LLP_HIGH,
                ] {
                    self.regs.write(dma::channel_reg(dir, channel, reg), 0);
                }

                let enable_reg = dma::ll_err_enable_reg(dir);
                let armed = self.regs.read(enable_reg) | dma::ll_local_abort_bit(channel);
                self.regs.write(enable_reg, armed);

                self.channel_record(dir, channel)
                    .started_us
                    .store(0, Ordering::Relaxed);
            }

            self.regs
                .write(dma::int_mask_reg(dir), dma::unmask_channels(count));
        }

        self.reset_channel_group(Direction::Read);
        self.reset_channel_group(Direction::Write);
        log::debug!(
            "DMA engine initialized, {} read / {} write channels",
            self.read_channel_count,
            self.write_channel_count
        );
    }

    fn program_channel(
        &self,
        dir: Direction,
        channel: usize,
        control: ChanControl,
        size: u32,
        src: u64,
        dst: u64,
        llp: u64,
    ) {
        let reg = |r| dma::channel_reg(dir, channel, r);
        self.regs.write(reg(dma::CH_CONTROL1), control.bits());
        self.regs.write(reg(dma::CH_CONTROL2), 0);
        self.regs.write(reg(dma::CH_TRANSFER_SIZE), size);
        self.regs.write(reg(dma::CH_SAR_LOW), src as u32);
        self.regs.write(reg(dma::CH_SAR_HIGH), (src >> 32) as u32);
        self.regs.write(reg(dma::CH_DAR_LOW), dst as u32);
        self.regs.write(reg(dma::CH_DAR_HIGH), (dst >> 32) as u32);
        self.regs.write(reg(dma::CH_LLP_LOW), llp as u32);
        self.regs.write(reg(dma::CH_LLP_HIGH), (llp >> 32) as u32);
    }

    /// Read-modify-write this channel's 5-bit arbitration weight lane. Two
    /// channels' lanes share one register word, hence the dedicated lock.
    fn set_channel_weight(&self, dir: Direction, channel: usize, priority: u32) {
        let _guard = self.weight_lock.lock();
        let reg = dma::arb_weight_reg(dir);
        let shift = dma::weight_lane_shift(channel);
        let weight = (priority * dma::PRIORITY_WEIGHT_FACTOR) & dma::WEIGHT_LANE_MASK;

        let mut value = self.regs.read(reg);
        value &= !(dma::WEIGHT_LANE_MASK << shift);
        value |= weight << shift;
        self.regs.write(reg, value);
    }

    fn stamp_channel(&self, dir: Direction, channel: usize) {
        let stamp = if self.tunables.track_latency.load(Ordering::Relaxed) {
            self.now_us()
        } else {
            0
        };
        self.channel_record(dir, channel)
            .started_us
            .store(stamp, Ordering::Relaxed);
    }

    fn check_channel(&self, dir: Direction, channel: usize) -> Result<()> {
        if channel >= self.channel_count(dir) {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    fn check_bus_master(&self) -> Result<()> {
        if !self.irq.lock().bus_master_en {
            return Err(Error::AccessDenied);
        }
        Ok(())
    }
}

//! DMA block: per-direction engine control and per-channel register blocks.

use bitflags::bitflags;

/// Channels implemented per direction. The active count in use is
/// engine configuration, at most this.
pub const MAX_CHANNELS: usize = 4;

/// Transfer direction of a channel group.
///
/// `Read` moves host memory onto the card, `Write` moves card memory to the
/// host, both named from the card's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

// Per-direction engine registers.
pub const WRITE_ENGINE_EN: u32 = 0x2000;
pub const WRITE_DOORBELL: u32 = 0x2004;
pub const WRITE_ARB_WEIGHT: u32 = 0x2008;
pub const WRITE_INT_STATUS: u32 = 0x2010;
pub const WRITE_INT_MASK: u32 = 0x2014;
pub const WRITE_INT_CLEAR: u32 = 0x2018;
pub const WRITE_ERR_STATUS: u32 = 0x201C;
pub const WRITE_LL_ERR_EN: u32 = 0x2020;

pub const READ_ENGINE_EN: u32 = 0x2040;
pub const READ_DOORBELL: u32 = 0x2044;
pub const READ_ARB_WEIGHT: u32 = 0x2048;
pub const READ_INT_STATUS: u32 = 0x2050;
pub const READ_INT_MASK: u32 = 0x2054;
pub const READ_INT_CLEAR: u32 = 0x2058;
pub const READ_ERR_STATUS_LOW: u32 = 0x205C;
pub const READ_ERR_STATUS_HIGH: u32 = 0x2060;
pub const READ_LL_ERR_EN: u32 = 0x2064;

pub const fn engine_enable_reg(dir: Direction) -> u32 {
    match dir {
        Direction::Read => READ_ENGINE_EN,
        Direction::Write => WRITE_ENGINE_EN,
    }
}

pub const fn doorbell_reg(dir: Direction) -> u32 {
    match dir {
        Direction::Read => READ_DOORBELL,
        Direction::Write => WRITE_DOORBELL,
    }
}

pub const fn arb_weight_reg(dir: Direction) -> u32 {
    match dir {
        Direction::Read => READ_ARB_WEIGHT,
        Direction::Write => WRITE_ARB_WEIGHT,
    }
}

pub const fn int_status_reg(dir: Direction) -> u32 {
    match dir {
        Direction::Read => READ_INT_STATUS,
        Direction::Write => WRITE_INT_STATUS,
    }
}

pub const fn int_mask_reg(dir: Direction) -> u32 {
    match dir {
        Direction::Read => READ_INT_MASK,
        Direction::Write => WRITE_INT_MASK,
    }
}

pub const fn int_clear_reg(dir: Direction) -> u32 {
    match dir {
        Direction::Read => READ_INT_CLEAR,
        Direction::Write => WRITE_INT_CLEAR,
    }
}

pub const fn ll_err_enable_reg(dir: Direction) -> u32 {
    match dir {
        Direction::Read => READ_LL_ERR_EN,
        Direction::Write => WRITE_LL_ERR_EN,
    }
}

// Per-channel register blocks, fixed stride, write channels first.
const CHANNEL_BLOCK_BASE_WR: u32 = 0x2200;
const CHANNEL_BLOCK_BASE_RD: u32 = 0x2A00;
const CHANNEL_STRIDE: u32 = 0x200;

pub const CH_CONTROL1: u32 = 0x00;
pub const CH_CONTROL2: u32 = 0x04;
pub const CH_TRANSFER_SIZE: u32 = 0x08;
pub const CH_SAR_LOW: u32 = 0x0C;
pub const CH_SAR_HIGH: u32 = 0x10;
pub const CH_DAR_LOW: u32 = 0x14;
pub const CH_DAR_HIGH: u32 = 0x18;
pub const CH_LLP_LOW: u32 = 0x1C;
pub const CH_LLP_HIGH: u32 = 0x20;

/// Register address of `reg` (one of the `CH_*` offsets) for a channel.
pub const fn channel_reg(dir: Direction, channel: usize, reg: u32) -> u32 {
    let base = match dir {
        Direction::Read => CHANNEL_BLOCK_BASE_RD,
        Direction::Write => CHANNEL_BLOCK_BASE_WR,
    };
    base + (channel as u32) * CHANNEL_STRIDE + reg
}

bitflags! {
    /// Bits of a channel's CONTROL1 register and of a descriptor element's
    /// control word (the hardware uses the same encoding for both).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ChanControl: u32 {
        /// Cycle bit, set on every valid descriptor element.
        const CB  = 1 << 0;
        /// Toggle cycle bit.
        const TCB = 1 << 1;
        /// Link element: descriptor is an end-of-list sentinel.
        const LLP = 1 << 2;
        /// Local interrupt enable on completion of this element.
        const LIE = 1 << 3;
        /// Remote interrupt enable.
        const RIE = 1 << 4;
        /// Consecutive-chain select.
        const CCS = 1 << 8;
        /// Linked-list mode enable.
        const LLE = 1 << 9;
        /// Transfer done poll field enable.
        const TD  = 1 << 26;
    }
}

const CHANNEL_STATUS_SHIFT: u32 = 5;
const CHANNEL_STATUS_MASK: u32 = 0x3 << CHANNEL_STATUS_SHIFT;

/// Channel run state reported in CONTROL1 bits [6:5].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Running,
    Halted,
    Stopped,
}

impl ChannelStatus {
    pub const fn from_control(control: u32) -> Option<Self> {
        match (control & CHANNEL_STATUS_MASK) >> CHANNEL_STATUS_SHIFT {
            1 => Some(Self::Running),
            2 => Some(Self::Halted),
            3 => Some(Self::Stopped),
            _ => None,
        }
    }

    pub const fn to_control(self) -> u32 {
        let raw = match self {
            Self::Running => 1,
            Self::Halted => 2,
            Self::Stopped => 3,
        };
        (raw << CHANNEL_STATUS_SHIFT) & CHANNEL_STATUS_MASK
    }
}

/// Stop request flag of the per-direction engine doorbell register; the low
/// bits carry the channel index to start.
pub const DOORBELL_STOP: u32 = 1 << 31;

// Per-direction interrupt status/mask/clear words: one done bit and one
// abort bit per channel.
const DONE_SHIFT: u32 = 0;
const ABORT_SHIFT: u32 = 16;

pub const fn done_bit(channel: usize) -> u32 {
    1 << (DONE_SHIFT + channel as u32)
}

pub const fn abort_bit(channel: usize) -> u32 {
    1 << (ABORT_SHIFT + channel as u32)
}

/// Clear-register value acknowledging both outcomes for one channel.
pub const fn clear_bits(channel: usize) -> u32 {
    done_bit(channel) | abort_bit(channel)
}

/// Mask-register value unmasking done and abort for the first
/// `active_channels` channels and masking everything else.
pub const fn unmask_channels(active_channels: usize) -> u32 {
    let chans = (1u32 << active_channels) - 1;
    !((chans << DONE_SHIFT) | (chans << ABORT_SHIFT))
}

// Error status words. Read direction splits across LOW/HIGH; write direction
// is a single word.
const REMOTE_ERR_SHIFT: u32 = 0;
const FETCH_ERR_SHIFT: u32 = 16;
const DATA_POISON_SHIFT: u32 = 24;

/// Remote access error (write error for read channels, read error for write
/// channels) in the direction's low error word.
pub const fn remote_err_bit(channel: usize) -> u32 {
    1 << (REMOTE_ERR_SHIFT + channel as u32)
}

/// Descriptor-fetch error in the direction's low error word.
pub const fn fetch_err_bit(channel: usize) -> u32 {
    1 << (FETCH_ERR_SHIFT + channel as u32)
}

/// Data poisoning, read direction only, high error word.
pub const fn data_poison_bit(channel: usize) -> u32 {
    1 << (DATA_POISON_SHIFT + channel as u32)
}

// Linked-list abort interrupt enables: local in the high half, remote low.
const LL_LOCAL_ABORT_SHIFT: u32 = 16;

pub const fn ll_local_abort_bit(channel: usize) -> u32 {
    1 << (LL_LOCAL_ABORT_SHIFT + channel as u32)
}

/// Arbitration weight lanes: 5 bits per channel in the direction's weight
/// register, `weight = priority * PRIORITY_WEIGHT_FACTOR`.
pub const WEIGHT_LANE_BITS: u32 = 5;
pub const WEIGHT_LANE_MASK: u32 = 0x1F;
pub const PRIORITY_WEIGHT_FACTOR: u32 = 2;

pub const fn weight_lane_shift(channel: usize) -> u32 {
    channel as u32 * WEIGHT_LANE_BITS
}

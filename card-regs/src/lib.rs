//! Register-level hardware contract for the accelerator card.
//!
//! This crate pins down the parts of the card's memory-mapped register window
//! that the transfer engine programs: the host-link block (interrupt cause
//! status/mask, command and response FIFOs, doorbell scalars) and the DMA
//! block (per-direction engine control, per-channel register blocks,
//! interrupt and error status words, arbitration weights), plus the in-memory
//! layout of the linked-list transfer descriptor the DMA hardware walks.
//!
//! Nothing in here has behavior; it is offsets, bit fields, and the
//! [`RegisterIo`] access seam the engine crate drives.

pub mod descriptor;
pub mod dma;
pub mod io;
pub mod link;

pub use descriptor::{DataElement, ELEMENT_SIZE};
pub use dma::{ChanControl, ChannelStatus, Direction, MAX_CHANNELS};
pub use io::{MmioRegion, RegisterIo};
pub use link::LinkCause;

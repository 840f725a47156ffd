//! Upstream collaborator interface.

pub use card_regs::Direction;

/// Final state of a completed channel transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Done,
    Failed,
}

/// Recommended recovery for a classified transfer outcome. The engine never
/// acts on this itself; the upstream consumer owns retry/reset policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    None,
    RetryTransfer,
    ResetEngine,
}

/// What a warm-reset request from the host actually performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetMode {
    #[default]
    Warm,
    Cold,
    Ignore,
    Capsule,
}

impl ResetMode {
    /// Encoding published to the firmware scratch register.
    pub const fn to_raw(self) -> u32 {
        match self {
            ResetMode::Warm => 0,
            ResetMode::Cold => 1,
            ResetMode::Ignore => 2,
            ResetMode::Capsule => 3,
        }
    }

    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => ResetMode::Cold,
            2 => ResetMode::Ignore,
            3 => ResetMode::Capsule,
            _ => ResetMode::Warm,
        }
    }
}

/// Callbacks the engine's owner registers at construction.
///
/// `process_command_batch`, `dma_complete`, and `doorbell_changed` are
/// invoked from the deferred interrupt stage and may block.
/// `platform_reset` is invoked from the masked interrupt stage with the
/// interrupt lock held and must not call back into the engine.
pub trait HostCallbacks: Send + Sync {
    /// One drained command-queue batch, in hardware FIFO order.
    fn process_command_batch(&self, messages: &[u64]);

    /// Exactly one call per classified channel completion.
    fn dma_complete(
        &self,
        direction: Direction,
        channel: usize,
        outcome: TransferOutcome,
        recovery: RecoveryAction,
        elapsed_us: u32,
    );

    /// The host doorbell value changed.
    fn doorbell_changed(&self, value: u32);

    /// Execute the platform reset the configured policy selected. Never
    /// called with [`ResetMode::Ignore`].
    fn platform_reset(&self, mode: ResetMode);
}

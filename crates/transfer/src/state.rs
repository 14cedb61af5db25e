//! Cycle states.
//!
//! One full cycle visits the states in declaration order. The two await
//! states loop back to their issue state until the phase's chunk count is
//! reached, and `Verify` returns to `PrepareWrite` on success.

use platform::TransferDirection;

/// Step of the write / read / verify cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleState {
    /// Fill and flush the source buffer, start the write timer.
    PrepareWrite,
    /// Wait for ready, then issue one write chunk.
    IssueWrite,
    /// Consume the write completion flag.
    AwaitWrite,
    /// Zero and flush the destination buffer, start the read timer.
    PrepareRead,
    /// Wait for ready, then issue one read chunk.
    IssueRead,
    /// Consume the read completion flag.
    AwaitRead,
    /// Compare source and destination.
    Verify,
}

impl CycleState {
    /// Short name for logs.
    pub const fn label(self) -> &'static str {
        match self {
            Self::PrepareWrite => "prepare-write",
            Self::IssueWrite => "issue-write",
            Self::AwaitWrite => "await-write",
            Self::PrepareRead => "prepare-read",
            Self::IssueRead => "issue-read",
            Self::AwaitRead => "await-read",
            Self::Verify => "verify",
        }
    }

    /// Transfer direction this state belongs to, if any.
    pub const fn direction(self) -> Option<TransferDirection> {
        match self {
            Self::PrepareWrite | Self::IssueWrite | Self::AwaitWrite => {
                Some(TransferDirection::Write)
            }
            Self::PrepareRead | Self::IssueRead | Self::AwaitRead => Some(TransferDirection::Read),
            Self::Verify => None,
        }
    }

    /// `true` for the states that only look at a completion flag.
    pub const fn is_waiting(self) -> bool {
        matches!(self, Self::AwaitWrite | Self::AwaitRead)
    }
}

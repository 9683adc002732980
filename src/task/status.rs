// src/task/status.rs

//! Task and build-set status values.

use std::fmt;

use serde::Serialize;

/// Lifecycle status of a single build task.
///
/// Stored as an atomic `u8` inside [`super::BuildTask`], so the discriminants
/// are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum BuildStatus {
    /// Created, not yet evaluated by the scheduler.
    New = 0,
    /// Waiting for at least one dependency to finish.
    WaitingForDependencies = 1,
    /// All dependencies satisfied; waiting for a build slot.
    Enqueued = 2,
    /// Handed to a build driver.
    Building = 3,
    /// Built successfully.
    Done = 4,
    /// The build ran and failed.
    Failed = 5,
    /// The driver refused the build.
    Rejected = 6,
    /// Never built because a dependency did not build successfully.
    NotBuilt = 7,
    /// The driver or the engine failed while handling the build.
    SystemError = 8,
    /// Cancelled on request.
    Cancelled = 9,
}

impl BuildStatus {
    pub const ALL: [BuildStatus; 10] = [
        BuildStatus::New,
        BuildStatus::WaitingForDependencies,
        BuildStatus::Enqueued,
        BuildStatus::Building,
        BuildStatus::Done,
        BuildStatus::Failed,
        BuildStatus::Rejected,
        BuildStatus::NotBuilt,
        BuildStatus::SystemError,
        BuildStatus::Cancelled,
    ];

    #[inline]
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// No transition is accepted out of a terminal status.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done
                | Self::Failed
                | Self::Rejected
                | Self::NotBuilt
                | Self::SystemError
                | Self::Cancelled
        )
    }

    /// Terminal and not `Done`.
    #[inline]
    pub fn is_failure(&self) -> bool {
        self.is_terminal() && *self != Self::Done
    }

    /// Whether the state machine accepts `self -> to`.
    pub fn can_transition_to(&self, to: BuildStatus) -> bool {
        use BuildStatus::*;

        match self {
            New => matches!(
                to,
                WaitingForDependencies | Enqueued | Rejected | NotBuilt | SystemError | Cancelled
            ),
            WaitingForDependencies => matches!(
                to,
                Enqueued | Rejected | NotBuilt | SystemError | Cancelled
            ),
            Enqueued => matches!(to, Building | SystemError | Cancelled),
            Building => matches!(to, Done | Failed | Rejected | SystemError | Cancelled),
            Done | Failed | Rejected | NotBuilt | SystemError | Cancelled => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::WaitingForDependencies => "WAITING_FOR_DEPENDENCIES",
            Self::Enqueued => "ENQUEUED",
            Self::Building => "BUILDING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
            Self::Rejected => "REJECTED",
            Self::NotBuilt => "NOT_BUILT",
            Self::SystemError => "SYSTEM_ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate status of a build set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum BuildSetStatus {
    /// No member has started.
    New = 0,
    /// Nothing is queued or building and some member waits on a dependency.
    WaitingForDependencies = 1,
    /// At least one member is queued or building.
    Building = 2,
    /// Every member is terminal.
    Done = 3,
}

impl BuildSetStatus {
    #[inline]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::New),
            1 => Some(Self::WaitingForDependencies),
            2 => Some(Self::Building),
            3 => Some(Self::Done),
            _ => None,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        *self == Self::Done
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::WaitingForDependencies => "WAITING_FOR_DEPENDENCIES",
            Self::Building => "BUILDING",
            Self::Done => "DONE",
        }
    }
}

impl fmt::Display for BuildSetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Error Types
//!
//! Every error the engine raises is a programming or configuration error.
//! Nothing here is retried: lifecycle methods fail fast and the error travels
//! straight up to whoever drives the root chip.
//!
//! | Error | Code |
//! |-------|------|
//! | [`InvalidState`](ChipError::InvalidState) | `CHIP_INVALID_STATE` |
//! | [`TerminationPending`](ChipError::TerminationPending) | `CHIP_TERMINATION_PENDING` |
//! | [`DuplicateChildId`](ChipError::DuplicateChildId) | `CHIP_DUPLICATE_CHILD_ID` |
//! | [`AttributeNotChip`](ChipError::AttributeNotChip) | `CHIP_ATTRIBUTE_NOT_CHIP` |
//! | [`UnknownChild`](ChipError::UnknownChild) | `CHIP_UNKNOWN_CHILD` |
//! | [`UnknownState`](ChipError::UnknownState) | `CHIP_UNKNOWN_STATE` |
//! | [`MissingSignal`](ChipError::MissingSignal) | `CHIP_MISSING_SIGNAL` |
//! | [`Memento`](ChipError::Memento) | `CHIP_MEMENTO` |
//! | [`Options`](ChipError::Options) | `CHIP_OPTIONS` |
//! | [`Behavior`](ChipError::Behavior) | `CHIP_BEHAVIOR` |

use thiserror::Error;

use crate::chip::ChipState;

/// Convenience alias used by every lifecycle method.
pub type Result<T> = std::result::Result<T, ChipError>;

/// Errors raised by chips and composites.
#[derive(Debug, Error)]
pub enum ChipError {
    /// A lifecycle method was called from a state that does not permit it.
    #[error("{operation}() called from state {state}")]
    InvalidState {
        operation: &'static str,
        state: ChipState,
    },

    /// `terminate()` was requested twice without an intervening `activate()`.
    #[error("termination already requested")]
    TerminationPending,

    /// A child with this id is already active in the composite.
    #[error("duplicate child chip id: {0}")]
    DuplicateChildId(String),

    /// The attribute slot holds a value that is not a chip and cannot be replaced.
    #[error("attribute '{0}' holds a non-chip value")]
    AttributeNotChip(String),

    /// The id does not belong to a registered child.
    #[error("no child chip registered under id '{0}'")]
    UnknownChild(String),

    /// A state machine was asked to enter a state it does not know.
    #[error("cannot find state '{0}'")]
    UnknownState(String),

    /// A state terminated but neither the signal table nor the signal itself
    /// names the next state.
    #[error("cannot find signal for state '{state}'")]
    MissingSignal { state: String },

    /// A reload memento could not be encoded or decoded.
    #[error(transparent)]
    Memento(#[from] MementoError),

    /// Options could not be read from a configuration value.
    #[error("invalid chip options: {0}")]
    Options(#[source] serde_json::Error),

    /// A user-supplied hook reported a failure.
    #[error("chip behavior failed: {0}")]
    Behavior(String),
}

impl ChipError {
    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidState { .. } => "CHIP_INVALID_STATE",
            Self::TerminationPending => "CHIP_TERMINATION_PENDING",
            Self::DuplicateChildId(_) => "CHIP_DUPLICATE_CHILD_ID",
            Self::AttributeNotChip(_) => "CHIP_ATTRIBUTE_NOT_CHIP",
            Self::UnknownChild(_) => "CHIP_UNKNOWN_CHILD",
            Self::UnknownState(_) => "CHIP_UNKNOWN_STATE",
            Self::MissingSignal { .. } => "CHIP_MISSING_SIGNAL",
            Self::Memento(_) => "CHIP_MEMENTO",
            Self::Options(_) => "CHIP_OPTIONS",
            Self::Behavior(_) => "CHIP_BEHAVIOR",
        }
    }

    pub(crate) fn invalid_state(operation: &'static str, state: ChipState) -> Self {
        Self::InvalidState { operation, state }
    }
}

/// Errors produced while encoding or decoding a reload memento.
#[derive(Debug, Error)]
pub enum MementoError {
    #[error("memento json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("memento encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("memento decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

//! Combinators
//!
//! Composites that arrange other chips in time.
//!
//! # Overview
//!
//! - [`Parallel`]: runs every child at once
//! - [`Sequence`]: runs children one after the other, optionally looping
//! - [`StateMachine`]: runs one named state at a time, moving between states
//!   by the signals they produce
//! - [`Alternative`]: races its children; the first to end decides
//! - [`ContextProvider`]: exposes provider chips to a main chip through the
//!   context
//! - [`Functional`]: a composite assembled from closures
//!
//! Children are given as anything convertible into a
//! [`ChipActivationInfo`](crate::composite::ChipActivationInfo): a chip, a
//! shared [`ChipRef`](crate::chip::ChipRef), or a factory that builds the chip
//! from the context and input signal at activation time.

mod alternative;
mod context_provider;
mod functional;
mod parallel;
mod sequence;
mod state_machine;

pub use alternative::Alternative;
pub use context_provider::{ContextProvider, MAIN_CHIP_ID};
pub use functional::{Functional, FunctionalHook};
pub use parallel::{Parallel, ParallelOptions};
pub use sequence::{CancellingSignal, Sequence, SequenceOptions, SKIP_SIGNAL_NAME};
pub use state_machine::{
    SignalResolvable, SignalResolver, StateDescriptor, StateMachine, StateMachineOptions,
    DEFAULT_ENDING_STATE, DEFAULT_STARTING_STATE,
};

//! Trellis Core
//!
//! This crate provides the runtime for Trellis, a framework for building
//! interactive applications out of small task objects called chips.
//! It implements:
//!
//! - The chip lifecycle (activate, tick, pause, resume, terminate)
//! - Composites that own, drive and observe child chips
//! - Standard combinators (parallel, sequence, state machine, race)
//! - Leaf chips for waiting, blocking and one-shot work
//! - Reload mementos that carry chip state across a hot reload
//!
//! The runtime is single-threaded and cooperative: a host calls `tick()` on
//! the root chip once per frame, and every composite forwards the tick to its
//! children.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `chip`: the [`Chip`] trait, signals, contexts, events and mementos
//! - `composite`: the child registry and [`Composite`] wrapper
//! - `combinators`: Parallel, Sequence, StateMachine, Alternative,
//!   ContextProvider and Functional
//! - `leaf`: Forever, Transitory, Lambda, Wait, Block and WaitForEvent
//! - `options`: filling option structs from JSON
//! - `testing`: mock chips and a harness for driving a root chip
//!
//! # Example
//!
//! ```rust
//! use trellis_core::combinators::{StateDescriptor, StateMachine, StateMachineOptions};
//! use trellis_core::leaf::{Transitory, Wait};
//! use trellis_core::{Chip, ChipContext, ChipState, Composite, Leaf, Signal, TickInfo};
//!
//! // A title screen that waits, then a level that ends with "won"
//! let mut game = Composite::new(StateMachine::new(
//!     [
//!         ("start", StateDescriptor::new(Leaf::new(Wait::millis(100.0)))),
//!         ("level", StateDescriptor::new(Leaf::new(Transitory::new("won")))),
//!     ],
//!     StateMachineOptions::default()
//!         .signal("start", "level")
//!         .signal("level", "end"),
//! ));
//!
//! game.activate(TickInfo::default(), ChipContext::new(), Signal::default(), None)?;
//! while game.state() != ChipState::Inactive {
//!     game.tick(TickInfo::new(50.0))?;
//! }
//! assert_eq!(game.output_signal(), Some(&Signal::new("end")));
//! # Ok::<(), trellis_core::ChipError>(())
//! ```

pub mod chip;
pub mod combinators;
pub mod composite;
pub mod error;
pub mod leaf;
pub mod options;
pub mod testing;

pub use chip::{
    chip_ref, with_chip, with_chip_mut, Behavior, Chip, ChipBase, ChipContext, ChipEvent, ChipRef,
    ChipState, ContextOverlay, ContextValue, EventEmitter, EventSource, Leaf, ReloadMemento, Signal,
    SubscriptionFilter, TickInfo,
};
pub use composite::{
    ActiveChild, ChipActivationInfo, ChipResolvable, Composite, CompositeBehavior, CompositeCore,
};
pub use error::{ChipError, MementoError, Result};

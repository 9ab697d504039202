//! Chip Primitives
//!
//! This module defines the lifecycle contract every chip follows and the
//! values that flow through it.
//!
//! # Concepts
//!
//! ## Lifecycle
//!
//! A chip is activated once, ticked any number of times, and terminated.
//! While active it may be paused and resumed:
//!
//! ```text
//! inactive --activate--> active --pause--> paused
//!    ^                     |  ^              |
//!    |                     |  +---resume-----+
//!    +------terminate------+-----------------+
//! ```
//!
//! Calling a lifecycle method from a state that does not allow it is an error.
//!
//! ## Signals
//!
//! A chip reports how it ended through its output signal. A chip that decides
//! on its own to end calls `request_termination`; the signal becomes visible
//! through [`Chip::output_signal`] immediately.
//!
//! ## Context
//!
//! Every activation receives a [`ChipContext`] from the parent. Composites
//! derive new contexts for their children.
//!
//! # Sharing
//!
//! Chips are shared as [`ChipRef`] (`Rc<RefCell<dyn Chip>>`). The runtime is
//! single-threaded and cooperative; nothing here is `Send`.

mod base;
mod context;
mod events;
mod memento;
mod signal;

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use base::{Behavior, ChipBase, Leaf};
pub use context::{ChipContext, ContextOverlay, ContextTransform, ContextValue};
pub use events::{
    ChipEvent, EventEmitter, EventSource, Listener, ListenerId, SourceId, SubscriptionFilter,
    Subscriptions, ACTIVATED, ACTIVATED_CHILD_CHIP, STATE_CHANGE, TERMINATED,
    TERMINATED_CHILD_CHIP,
};
pub use memento::{MementoData, ReloadMemento};
pub use signal::{Signal, SignalParams, DEFAULT_SIGNAL_NAME};

/// Lifecycle state of a chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChipState {
    #[default]
    Inactive,
    Active,
    Paused,
}

impl fmt::Display for ChipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Timing information handed to every activation and tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickInfo {
    /// Milliseconds since the previous tick.
    pub time_since_last_tick: f64,
}

impl TickInfo {
    pub fn new(time_since_last_tick: f64) -> Self {
        Self {
            time_since_last_tick,
        }
    }

    pub fn from_duration(elapsed: Duration) -> Self {
        Self::new(elapsed.as_secs_f64() * 1000.0)
    }
}

/// Shared handle to a chip.
pub type ChipRef = Rc<RefCell<dyn Chip>>;

/// The lifecycle contract every chip implements.
///
/// Most chips do not implement this trait directly. They implement
/// [`Behavior`] and are wrapped in [`Leaf`], or implement
/// [`CompositeBehavior`](crate::composite::CompositeBehavior) and are wrapped
/// in [`Composite`](crate::composite::Composite).
pub trait Chip: Any {
    /// Type tag, used as the reload memento class name.
    fn chip_type(&self) -> &'static str;

    fn state(&self) -> ChipState;

    /// The signal this chip ended with, or is about to end with.
    ///
    /// `None` until the chip terminates or requests termination; cleared by
    /// the next activation.
    fn output_signal(&self) -> Option<&Signal>;

    /// Context received at the last activation.
    fn context(&self) -> &ChipContext;

    /// Lifecycle events of this chip.
    fn events(&self) -> &EventEmitter<ChipEvent>;

    /// Currently active children, keyed by id. Empty for leaves.
    fn children(&self) -> IndexMap<String, ChipRef> {
        IndexMap::new()
    }

    fn activate(
        &mut self,
        tick_info: TickInfo,
        context: ChipContext,
        input_signal: Signal,
        reload_memento: Option<ReloadMemento>,
    ) -> Result<()>;

    fn tick(&mut self, tick_info: TickInfo) -> Result<()>;

    /// Terminate the chip.
    ///
    /// With `None`, a pending output signal is used if there is one, and the
    /// default signal otherwise.
    fn terminate(&mut self, output_signal: Option<Signal>) -> Result<()>;

    fn pause(&mut self, tick_info: TickInfo) -> Result<()>;

    fn resume(&mut self, tick_info: TickInfo) -> Result<()>;

    /// Snapshot this chip and its children for a hot reload.
    fn make_reload_memento(&self) -> Result<ReloadMemento>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Wrap a chip in a shared handle.
pub fn chip_ref<C: Chip>(chip: C) -> ChipRef {
    Rc::new(RefCell::new(chip))
}

/// Run `f` on the concrete chip behind `chip`, if it has type `C`.
pub fn with_chip<C: Chip, R>(chip: &ChipRef, f: impl FnOnce(&C) -> R) -> Option<R> {
    let chip = chip.borrow();
    chip.as_any().downcast_ref::<C>().map(f)
}

/// Run `f` on the concrete chip behind `chip` mutably, if it has type `C`.
pub fn with_chip_mut<C: Chip, R>(chip: &ChipRef, f: impl FnOnce(&mut C) -> R) -> Option<R> {
    let mut chip = chip.borrow_mut();
    chip.as_any_mut().downcast_mut::<C>().map(f)
}

//! Leaf Chips
//!
//! Small chips without children, used as building blocks inside combinators:
//!
//! | Chip | Ends |
//! |------|------|
//! | [`Forever`] | never |
//! | [`Transitory`] | immediately on activation |
//! | [`Lambda`] | after running its function once |
//! | [`Wait`] | once its duration has elapsed |
//! | [`Block`] | when [`done`](Leaf::done) is called |
//! | [`WaitForEvent`] | when its handler accepts an event |

mod lambda;
mod wait;
mod wait_for_event;

use crate::chip::{Behavior, Chip, ChipBase, Leaf, Signal};
use crate::error::Result;

pub use lambda::{Lambda, LambdaOutput};
pub use wait::Wait;
pub use wait_for_event::{EventOutcome, WaitForEvent};

/// Never terminates on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct Forever;

impl Behavior for Forever {
    fn chip_type(&self) -> &'static str {
        "Forever"
    }
}

/// Terminates as soon as it is activated.
#[derive(Debug, Clone, Default)]
pub struct Transitory {
    signal: Signal,
}

impl Transitory {
    pub fn new(signal: impl Into<Signal>) -> Self {
        Self {
            signal: signal.into(),
        }
    }

    pub fn signal(&self) -> &Signal {
        &self.signal
    }
}

impl Behavior for Transitory {
    fn chip_type(&self) -> &'static str {
        "Transitory"
    }

    fn on_activate(&mut self, chip: &mut ChipBase) -> Result<()> {
        chip.request_termination(self.signal.clone())
    }
}

/// Runs until someone calls [`done`](Leaf::done) on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Block;

impl Behavior for Block {
    fn chip_type(&self) -> &'static str {
        "Block"
    }
}

impl Leaf<Block> {
    /// Terminate with `signal`, or the default signal.
    pub fn done(&mut self, signal: Option<Signal>) -> Result<()> {
        self.terminate(signal)
    }
}

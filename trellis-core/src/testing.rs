//! Testing helpers for chips and composites.
//!
//! Provides a scriptable leaf chip and a harness that drives a root chip the
//! way a host application would, without any frame loop.
//!
//! # Features
//!
//! - [`MockChip`]: a leaf that counts its lifecycle calls and can end itself
//!   after a given number of ticks
//! - [`MockProbe`]: read access to those counters after the chip has been
//!   handed to a composite
//! - [`ChipHarness`]: activates a root chip and ticks it with a fixed step
//!
//! # Example
//!
//! ```
//! use trellis_core::combinators::Sequence;
//! use trellis_core::testing::{ChipHarness, MockChip};
//! use trellis_core::{chip_ref, Composite, Leaf, Signal};
//!
//! let (first, probe) = MockChip::new().terminate_on_tick(2, "next").into_parts();
//! let second = MockChip::new().terminate_on_tick(1, "done");
//! let root = chip_ref(Composite::new(Sequence::new([
//!     Leaf::new(first),
//!     Leaf::new(second),
//! ])));
//!
//! let mut harness = ChipHarness::new(root);
//! let signal = harness.run(10)?;
//! assert_eq!(signal, Some(Signal::new("done")));
//! assert_eq!(probe.ticks(), 2);
//! # Ok::<(), trellis_core::ChipError>(())
//! ```

use std::cell::Cell;
use std::rc::Rc;

use tracing::trace;

use crate::chip::{Behavior, Chip, ChipBase, ChipContext, ChipRef, ChipState, Signal, TickInfo};
use crate::error::Result;

#[derive(Debug, Default)]
struct Counters {
    activations: Cell<u32>,
    ticks: Cell<u32>,
    terminations: Cell<u32>,
    pauses: Cell<u32>,
    resumes: Cell<u32>,
}

fn bump(counter: &Cell<u32>) {
    counter.set(counter.get() + 1);
}

/// Lifecycle counters of a [`MockChip`].
#[derive(Debug, Clone)]
pub struct MockProbe {
    counters: Rc<Counters>,
}

impl MockProbe {
    pub fn activations(&self) -> u32 {
        self.counters.activations.get()
    }

    /// Ticks across all activations.
    pub fn ticks(&self) -> u32 {
        self.counters.ticks.get()
    }

    pub fn terminations(&self) -> u32 {
        self.counters.terminations.get()
    }

    pub fn pauses(&self) -> u32 {
        self.counters.pauses.get()
    }

    pub fn resumes(&self) -> u32 {
        self.counters.resumes.get()
    }
}

/// A leaf behavior that records what happens to it.
#[derive(Debug, Default)]
pub struct MockChip {
    counters: Rc<Counters>,
    terminate_on_tick: Option<(u32, Signal)>,
    /// Ticks since the last activation.
    ticks_this_run: u32,
}

impl MockChip {
    pub fn new() -> Self {
        Self::default()
    }

    /// End with `signal` on the `tick`-th tick after each activation.
    #[must_use]
    pub fn terminate_on_tick(mut self, tick: u32, signal: impl Into<Signal>) -> Self {
        self.terminate_on_tick = Some((tick, signal.into()));
        self
    }

    pub fn probe(&self) -> MockProbe {
        MockProbe {
            counters: Rc::clone(&self.counters),
        }
    }

    pub fn into_parts(self) -> (Self, MockProbe) {
        let probe = self.probe();
        (self, probe)
    }
}

impl Behavior for MockChip {
    fn chip_type(&self) -> &'static str {
        "MockChip"
    }

    fn on_activate(&mut self, _chip: &mut ChipBase) -> Result<()> {
        self.ticks_this_run = 0;
        bump(&self.counters.activations);
        Ok(())
    }

    fn on_tick(&mut self, chip: &mut ChipBase) -> Result<()> {
        self.ticks_this_run += 1;
        bump(&self.counters.ticks);

        match &self.terminate_on_tick {
            Some((tick, signal)) if *tick == self.ticks_this_run => {
                chip.request_termination(signal.clone())
            }
            _ => Ok(()),
        }
    }

    fn on_terminate(&mut self, _chip: &mut ChipBase) -> Result<()> {
        bump(&self.counters.terminations);
        Ok(())
    }

    fn on_pause(&mut self, _chip: &mut ChipBase) -> Result<()> {
        bump(&self.counters.pauses);
        Ok(())
    }

    fn on_resume(&mut self, _chip: &mut ChipBase) -> Result<()> {
        bump(&self.counters.resumes);
        Ok(())
    }
}

/// Drives a root chip: one activation, then ticks of a fixed step.
pub struct ChipHarness {
    root: ChipRef,
    step: TickInfo,
    context: ChipContext,
    input_signal: Signal,
    elapsed_ticks: u32,
}

impl ChipHarness {
    /// Default step is 16 ms.
    pub fn new(root: ChipRef) -> Self {
        Self {
            root,
            step: TickInfo::new(16.0),
            context: ChipContext::new(),
            input_signal: Signal::default(),
            elapsed_ticks: 0,
        }
    }

    #[must_use]
    pub fn with_step(mut self, time_since_last_tick: f64) -> Self {
        self.step = TickInfo::new(time_since_last_tick);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: ChipContext) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_input_signal(mut self, signal: impl Into<Signal>) -> Self {
        self.input_signal = signal.into();
        self
    }

    pub fn root(&self) -> &ChipRef {
        &self.root
    }

    pub fn elapsed_ticks(&self) -> u32 {
        self.elapsed_ticks
    }

    pub fn activate(&mut self) -> Result<()> {
        self.elapsed_ticks = 0;
        self.root.borrow_mut().activate(
            TickInfo::default(),
            self.context.clone(),
            self.input_signal.clone(),
            None,
        )
    }

    pub fn tick(&mut self) -> Result<()> {
        self.elapsed_ticks += 1;
        self.root.borrow_mut().tick(self.step)
    }

    /// Activate the root if needed, then tick until it produces an output
    /// signal or `max_ticks` ticks have passed. A root with an output signal
    /// is terminated and the signal returned.
    pub fn run(&mut self, max_ticks: u32) -> Result<Option<Signal>> {
        if self.root.borrow().state() == ChipState::Inactive {
            self.activate()?;
        }

        let mut remaining = max_ticks;
        loop {
            let (state, output) = {
                let root = self.root.borrow();
                (root.state(), root.output_signal().cloned())
            };
            if let Some(signal) = output {
                if state != ChipState::Inactive {
                    self.root.borrow_mut().terminate(None)?;
                }
                return Ok(Some(signal));
            }
            if remaining == 0 {
                trace!(ticks = self.elapsed_ticks, "root still running");
                return Ok(None);
            }
            remaining -= 1;
            self.tick()?;
        }
    }
}

use std::fmt;

use crate::chip::Signal;
use crate::composite::{CompositeBehavior, CompositeCore};
use crate::error::Result;

/// A hook handed to [`Functional`]. Returning a signal ends the chip with it.
pub type FunctionalHook = Box<dyn FnMut(&mut CompositeCore) -> Result<Option<Signal>>>;

/// A composite assembled from closures.
///
/// Each closure receives the composite core, so it can activate and terminate
/// children like any other composite. The tick closure runs after the
/// children have been ticked.
///
/// ```
/// use trellis_core::combinators::Functional;
/// use trellis_core::{Chip, ChipContext, Composite, Signal, TickInfo};
///
/// let mut ticks = 0;
/// let mut chip = Composite::new(Functional::new().on_tick(move |_| {
///     ticks += 1;
///     Ok((ticks == 2).then(|| Signal::new("done")))
/// }));
/// chip.activate(TickInfo::default(), ChipContext::new(), Signal::default(), None)?;
/// chip.tick(TickInfo::new(16.0))?;
/// assert!(chip.output_signal().is_none());
/// chip.tick(TickInfo::new(16.0))?;
/// assert_eq!(chip.output_signal(), Some(&Signal::new("done")));
/// # Ok::<(), trellis_core::ChipError>(())
/// ```
#[derive(Default)]
pub struct Functional {
    activate: Option<FunctionalHook>,
    tick: Option<FunctionalHook>,
    terminate: Option<FunctionalHook>,
    pause: Option<FunctionalHook>,
    resume: Option<FunctionalHook>,
}

impl Functional {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_activate<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut CompositeCore) -> Result<Option<Signal>> + 'static,
    {
        self.activate = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_tick<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut CompositeCore) -> Result<Option<Signal>> + 'static,
    {
        self.tick = Some(Box::new(hook));
        self
    }

    /// The returned signal is ignored; the chip is already ending.
    #[must_use]
    pub fn on_terminate<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut CompositeCore) -> Result<Option<Signal>> + 'static,
    {
        self.terminate = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_pause<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut CompositeCore) -> Result<Option<Signal>> + 'static,
    {
        self.pause = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_resume<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut CompositeCore) -> Result<Option<Signal>> + 'static,
    {
        self.resume = Some(Box::new(hook));
        self
    }
}

fn run(hook: &mut Option<FunctionalHook>, core: &mut CompositeCore) -> Result<()> {
    let Some(hook) = hook.as_mut() else {
        return Ok(());
    };
    if let Some(signal) = hook(core)? {
        if !core.is_terminating() {
            core.request_termination(signal)?;
        }
    }
    Ok(())
}

impl CompositeBehavior for Functional {
    fn chip_type(&self) -> &'static str {
        "Functional"
    }

    fn on_activate(&mut self, core: &mut CompositeCore) -> Result<()> {
        run(&mut self.activate, core)
    }

    fn on_after_tick(&mut self, core: &mut CompositeCore) -> Result<()> {
        run(&mut self.tick, core)
    }

    fn on_terminate(&mut self, core: &mut CompositeCore) -> Result<()> {
        if let Some(hook) = self.terminate.as_mut() {
            hook(core)?;
        }
        Ok(())
    }

    fn on_pause(&mut self, core: &mut CompositeCore) -> Result<()> {
        run(&mut self.pause, core)
    }

    fn on_resume(&mut self, core: &mut CompositeCore) -> Result<()> {
        run(&mut self.resume, core)
    }
}

impl fmt::Debug for Functional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Functional")
            .field("activate", &self.activate.is_some())
            .field("tick", &self.tick.is_some())
            .field("terminate", &self.terminate.is_some())
            .field("pause", &self.pause.is_some())
            .field("resume", &self.resume.is_some())
            .finish()
    }
}

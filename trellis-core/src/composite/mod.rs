//! Composite Chips
//!
//! A composite is a chip that owns and drives child chips. [`Composite`] runs
//! the shared machinery (child registry, context composition, propagation of
//! ticks and pause/resume, deferred termination) and calls into a
//! [`CompositeBehavior`] at fixed points.
//!
//! # Tick Order
//!
//! One `tick()` of a composite runs, in order:
//!
//! 1. a termination requested during the previous call, if any (and stops)
//! 2. `on_before_tick`
//! 3. `tick()` of every active child, in activation order
//! 4. `on_after_tick`
//!
//! `on_child_terminated` runs after each of these steps for every child that
//! ended during it, unless the composite is already terminating.
//!
//! # Deferred Termination
//!
//! A hook that calls [`CompositeCore::request_termination`] while the composite
//! is activating or ticking does not tear down the children it is iterating.
//! The request is visible at once through `output_signal()` and carried out at
//! the start of the next `tick()`, or by an explicit `terminate(None)`.
//! Requests made through [`Composite::with_behavior`] outside of a lifecycle
//! call are carried out before it returns.

mod activation;
mod attributes;
mod registry;

use std::any::Any;

use indexmap::IndexMap;

use crate::chip::{
    Chip, ChipContext, ChipEvent, ChipRef, ChipState, ContextOverlay, EventEmitter, MementoData,
    ReloadMemento, Signal, TickInfo,
};
use crate::error::Result;

pub use self::activation::{ActiveChild, ChipActivationInfo, ChipFactory, ChipResolvable};
pub use self::attributes::{AttributeSlot, AttributeSlots};
pub use self::registry::CompositeCore;

/// Hooks of a composite chip. Every hook has a no-op default.
pub trait CompositeBehavior: 'static {
    /// Type tag, used as the reload memento class name.
    fn chip_type(&self) -> &'static str;

    /// Applied to every child context after the parent context and the
    /// children exposed through `include_in_child_context`.
    fn default_child_context(&self) -> Option<ContextOverlay> {
        None
    }

    fn on_activate(&mut self, _core: &mut CompositeCore) -> Result<()> {
        Ok(())
    }

    fn on_before_tick(&mut self, _core: &mut CompositeCore) -> Result<()> {
        Ok(())
    }

    fn on_after_tick(&mut self, _core: &mut CompositeCore) -> Result<()> {
        Ok(())
    }

    /// A child ended and has been removed from the registry.
    fn on_child_terminated(
        &mut self,
        _core: &mut CompositeCore,
        _id: &str,
        _signal: &Signal,
    ) -> Result<()> {
        Ok(())
    }

    /// Runs after every child has been terminated.
    fn on_terminate(&mut self, _core: &mut CompositeCore) -> Result<()> {
        Ok(())
    }

    fn on_pause(&mut self, _core: &mut CompositeCore) -> Result<()> {
        Ok(())
    }

    fn on_resume(&mut self, _core: &mut CompositeCore) -> Result<()> {
        Ok(())
    }

    fn reload_memento_data(&self) -> Result<MementoData> {
        Ok(MementoData::new())
    }
}

/// A chip with children, driven by a [`CompositeBehavior`].
#[derive(Debug)]
pub struct Composite<B: CompositeBehavior> {
    core: CompositeCore,
    behavior: B,
}

impl<B: CompositeBehavior> Composite<B> {
    pub fn new(behavior: B) -> Self {
        Self {
            core: CompositeCore::new(behavior.chip_type(), behavior.default_child_context()),
            behavior,
        }
    }

    pub fn core(&self) -> &CompositeCore {
        &self.core
    }

    pub fn behavior(&self) -> &B {
        &self.behavior
    }

    /// Run `f` against the behavior from outside a lifecycle call.
    ///
    /// Children that ended are dispatched to `on_child_terminated`, and a
    /// termination requested by `f` is carried out before returning.
    pub fn with_behavior<R>(
        &mut self,
        f: impl FnOnce(&mut B, &mut CompositeCore) -> Result<R>,
    ) -> Result<R> {
        let value = f(&mut self.behavior, &mut self.core)?;
        self.core.reap();
        self.dispatch_terminated()?;

        if !self.core.method_call_in_progress {
            if let Some(signal) = self.core.base_mut().take_pending_signal() {
                self.terminate_now(Some(signal))?;
            }
        }
        Ok(value)
    }

    fn dispatch_terminated(&mut self) -> Result<()> {
        loop {
            let terminated = std::mem::take(&mut self.core.terminated_log);
            if terminated.is_empty() {
                return Ok(());
            }
            for (id, signal) in terminated {
                if self.core.is_terminating() || self.core.state() == ChipState::Inactive {
                    break;
                }
                self.behavior
                    .on_child_terminated(&mut self.core, &id, &signal)?;
            }
        }
    }

    fn run_activate(&mut self) -> Result<()> {
        self.behavior.on_activate(&mut self.core)?;
        self.core.reap();
        self.dispatch_terminated()
    }

    fn run_tick(&mut self, tick_info: TickInfo) -> Result<()> {
        self.core.reap();
        self.dispatch_terminated()?;

        self.behavior.on_before_tick(&mut self.core)?;
        self.dispatch_terminated()?;

        self.core.tick_children(tick_info)?;
        self.core.reap();
        self.dispatch_terminated()?;

        self.behavior.on_after_tick(&mut self.core)?;
        self.core.reap();
        self.dispatch_terminated()
    }

    fn terminate_now(&mut self, output_signal: Option<Signal>) -> Result<()> {
        self.core.base_mut().begin_termination(output_signal)?;

        let children = self.core.terminate_children();
        self.core.release_subscriptions();
        let hook = self.behavior.on_terminate(&mut self.core);

        self.core.terminated_log.clear();
        self.core.base_mut().finish_termination();
        children.and(hook)
    }
}

impl<B: CompositeBehavior> Chip for Composite<B> {
    fn chip_type(&self) -> &'static str {
        self.core.base().chip_type()
    }

    fn state(&self) -> ChipState {
        self.core.state()
    }

    fn output_signal(&self) -> Option<&Signal> {
        self.core.base().output_signal()
    }

    fn context(&self) -> &ChipContext {
        self.core.context()
    }

    fn events(&self) -> &EventEmitter<ChipEvent> {
        self.core.events()
    }

    fn children(&self) -> IndexMap<String, ChipRef> {
        self.core.children()
    }

    fn activate(
        &mut self,
        tick_info: TickInfo,
        context: ChipContext,
        input_signal: Signal,
        reload_memento: Option<ReloadMemento>,
    ) -> Result<()> {
        self.core
            .base_mut()
            .begin_activation(tick_info, context, input_signal, reload_memento)?;

        self.core.method_call_in_progress = true;
        let result = self.run_activate();
        self.core.method_call_in_progress = false;
        result?;

        self.core.base_mut().finish_activation();
        Ok(())
    }

    fn tick(&mut self, tick_info: TickInfo) -> Result<()> {
        if !self.core.base_mut().begin_tick(tick_info)? {
            return Ok(());
        }
        if let Some(signal) = self.core.base_mut().take_pending_signal() {
            return self.terminate_now(Some(signal));
        }

        self.core.method_call_in_progress = true;
        let result = self.run_tick(tick_info);
        self.core.method_call_in_progress = false;
        result
    }

    fn terminate(&mut self, output_signal: Option<Signal>) -> Result<()> {
        self.terminate_now(output_signal)
    }

    fn pause(&mut self, tick_info: TickInfo) -> Result<()> {
        self.core.base_mut().begin_pause(tick_info)?;
        self.behavior.on_pause(&mut self.core)?;
        self.core.pause_children(tick_info)
    }

    fn resume(&mut self, tick_info: TickInfo) -> Result<()> {
        self.core.base_mut().begin_resume(tick_info)?;
        self.behavior.on_resume(&mut self.core)?;
        self.core.resume_children(tick_info)
    }

    fn make_reload_memento(&self) -> Result<ReloadMemento> {
        let mut memento = self
            .core
            .base()
            .memento(self.behavior.reload_memento_data()?)?;
        memento.children = self.core.children_mementos()?;
        Ok(memento)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

//! Chip Base
//!
//! [`ChipBase`] holds the bookkeeping shared by every chip: lifecycle state,
//! context, timing, signals, the retained reload memento, lifecycle events and
//! the chip's own subscriptions. It enforces the state machine so that hooks
//! can assume their preconditions.
//!
//! [`Leaf`] pairs a base with a [`Behavior`], the hook set of a chip that has
//! no children.
//!
//! # Self-termination
//!
//! A hook ends its chip by calling [`ChipBase::request_termination`]. A leaf
//! applies the request as soon as the lifecycle method that ran the hook
//! returns, so a leaf that asks to stop during `tick()` is inactive when
//! `tick()` returns.

use std::any::Any;

use tracing::debug;

use super::events::{ChipEvent, EventEmitter, EventSource, ListenerId, SubscriptionFilter, Subscriptions};
use super::{Chip, ChipContext, ChipState, MementoData, ReloadMemento, Signal, TickInfo};
use crate::error::{ChipError, Result};

/// Lifecycle bookkeeping shared by every chip.
#[derive(Debug)]
pub struct ChipBase {
    chip_type: &'static str,
    state: ChipState,
    context: ChipContext,
    last_tick_info: TickInfo,
    input_signal: Signal,
    output_signal: Option<Signal>,
    /// Termination requested from inside a hook, not yet carried out.
    pending_signal: Option<Signal>,
    reload_memento: Option<ReloadMemento>,
    events: EventEmitter<ChipEvent>,
    subscriptions: Subscriptions,
}

impl ChipBase {
    pub fn new(chip_type: &'static str) -> Self {
        Self {
            chip_type,
            state: ChipState::Inactive,
            context: ChipContext::new(),
            last_tick_info: TickInfo::default(),
            input_signal: Signal::default(),
            output_signal: None,
            pending_signal: None,
            reload_memento: None,
            events: EventEmitter::new(),
            subscriptions: Subscriptions::new(),
        }
    }

    pub fn chip_type(&self) -> &'static str {
        self.chip_type
    }

    pub fn state(&self) -> ChipState {
        self.state
    }

    pub fn context(&self) -> &ChipContext {
        &self.context
    }

    /// Timing of the most recent activation, tick, pause or resume.
    pub fn tick_info(&self) -> TickInfo {
        self.last_tick_info
    }

    pub fn input_signal(&self) -> &Signal {
        &self.input_signal
    }

    /// The final output signal, or the pending one while termination is
    /// requested but not yet carried out.
    pub fn output_signal(&self) -> Option<&Signal> {
        self.output_signal.as_ref().or(self.pending_signal.as_ref())
    }

    /// Whether termination was requested and not yet carried out.
    pub fn is_terminating(&self) -> bool {
        self.pending_signal.is_some()
    }

    /// The memento retained for this activation, if its class name matched.
    ///
    /// Only available while `activate()` is running.
    pub fn reload_memento(&self) -> Option<&ReloadMemento> {
        self.reload_memento.as_ref()
    }

    pub fn events(&self) -> &EventEmitter<ChipEvent> {
        &self.events
    }

    /// Ask for this chip to terminate with `signal`.
    pub fn request_termination(&mut self, signal: Signal) -> Result<()> {
        if self.state == ChipState::Inactive {
            return Err(ChipError::invalid_state("terminate", self.state));
        }
        if self.pending_signal.is_some() {
            return Err(ChipError::TerminationPending);
        }
        self.pending_signal = Some(signal);
        Ok(())
    }

    /// Listen to `event` on `source` until unsubscribed or terminated.
    pub fn subscribe<S, F>(&mut self, source: &S, event: &str, callback: F) -> ListenerId
    where
        S: EventSource + Clone + 'static,
        F: Fn(&S::Event) + 'static,
    {
        self.subscriptions.subscribe(source, event, false, callback)
    }

    /// Listen to the next `event` on `source` only.
    pub fn subscribe_once<S, F>(&mut self, source: &S, event: &str, callback: F) -> ListenerId
    where
        S: EventSource + Clone + 'static,
        F: Fn(&S::Event) + 'static,
    {
        self.subscriptions.subscribe(source, event, true, callback)
    }

    /// Remove the subscriptions matching `filter`.
    pub fn unsubscribe(&mut self, filter: &SubscriptionFilter) -> usize {
        self.subscriptions.unsubscribe(filter)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    // ------------------------------------------------------------------------
    // Lifecycle transitions, driven by Leaf and Composite
    // ------------------------------------------------------------------------

    pub(crate) fn begin_activation(
        &mut self,
        tick_info: TickInfo,
        context: ChipContext,
        input_signal: Signal,
        reload_memento: Option<ReloadMemento>,
    ) -> Result<()> {
        if self.state != ChipState::Inactive {
            return Err(ChipError::invalid_state("activate", self.state));
        }

        self.context = context;
        self.last_tick_info = tick_info;
        self.input_signal = input_signal;
        self.state = ChipState::Active;
        self.output_signal = None;
        self.pending_signal = None;
        self.reload_memento = match reload_memento {
            Some(memento) if memento.is_for(self.chip_type) => Some(memento),
            Some(memento) => {
                debug!(
                    chip_type = self.chip_type,
                    class_name = %memento.class_name,
                    "ignoring reload memento of another chip type"
                );
                None
            }
            None => None,
        };

        debug!(chip_type = self.chip_type, input = %self.input_signal, "activating chip");
        Ok(())
    }

    pub(crate) fn finish_activation(&mut self) {
        self.reload_memento = None;
        self.events
            .dispatch(ChipEvent::Activated(self.input_signal.clone()));
    }

    /// Returns `false` when the tick must be skipped because the chip is paused.
    pub(crate) fn begin_tick(&mut self, tick_info: TickInfo) -> Result<bool> {
        match self.state {
            ChipState::Paused => Ok(false),
            ChipState::Active => {
                self.last_tick_info = tick_info;
                Ok(true)
            }
            ChipState::Inactive => Err(ChipError::invalid_state("tick", self.state)),
        }
    }

    pub(crate) fn take_pending_signal(&mut self) -> Option<Signal> {
        if self.state == ChipState::Inactive {
            return None;
        }
        self.pending_signal.take()
    }

    /// Record the output signal. Falls back to the pending signal, then to
    /// the default signal.
    pub(crate) fn begin_termination(&mut self, output_signal: Option<Signal>) -> Result<Signal> {
        if self.state == ChipState::Inactive {
            return Err(ChipError::invalid_state("terminate", self.state));
        }
        let pending = self.pending_signal.take();
        let signal = output_signal.or(pending).unwrap_or_default();
        self.output_signal = Some(signal.clone());
        Ok(signal)
    }

    pub(crate) fn release_subscriptions(&mut self) {
        self.subscriptions.unsubscribe_all();
    }

    pub(crate) fn finish_termination(&mut self) {
        self.release_subscriptions();
        self.pending_signal = None;
        self.reload_memento = None;
        self.state = ChipState::Inactive;

        let signal = self.output_signal.clone().unwrap_or_default();
        debug!(chip_type = self.chip_type, output = %signal, "terminated chip");
        self.events.dispatch(ChipEvent::Terminated(signal));
    }

    pub(crate) fn begin_pause(&mut self, tick_info: TickInfo) -> Result<()> {
        if self.state != ChipState::Active {
            return Err(ChipError::invalid_state("pause", self.state));
        }
        self.state = ChipState::Paused;
        self.last_tick_info = tick_info;
        Ok(())
    }

    pub(crate) fn begin_resume(&mut self, tick_info: TickInfo) -> Result<()> {
        if self.state != ChipState::Paused {
            return Err(ChipError::invalid_state("resume", self.state));
        }
        self.state = ChipState::Active;
        self.last_tick_info = tick_info;
        Ok(())
    }

    pub(crate) fn memento(&self, data: MementoData) -> Result<ReloadMemento> {
        if self.state == ChipState::Inactive {
            return Err(ChipError::invalid_state("makeReloadMemento", self.state));
        }
        Ok(ReloadMemento::new(self.chip_type).with_data(data))
    }
}

/// Hooks of a chip without children.
///
/// Every hook has a no-op default.
pub trait Behavior: 'static {
    /// Type tag, used as the reload memento class name.
    fn chip_type(&self) -> &'static str;

    fn on_activate(&mut self, _chip: &mut ChipBase) -> Result<()> {
        Ok(())
    }

    fn on_tick(&mut self, _chip: &mut ChipBase) -> Result<()> {
        Ok(())
    }

    fn on_terminate(&mut self, _chip: &mut ChipBase) -> Result<()> {
        Ok(())
    }

    fn on_pause(&mut self, _chip: &mut ChipBase) -> Result<()> {
        Ok(())
    }

    fn on_resume(&mut self, _chip: &mut ChipBase) -> Result<()> {
        Ok(())
    }

    /// Data to save in a reload memento. Nothing by default, so the chip
    /// restarts fresh after a reload.
    fn reload_memento_data(&self) -> Result<MementoData> {
        Ok(MementoData::new())
    }
}

/// A chip without children, driven by a [`Behavior`].
#[derive(Debug)]
pub struct Leaf<B: Behavior> {
    base: ChipBase,
    behavior: B,
}

impl<B: Behavior> Leaf<B> {
    pub fn new(behavior: B) -> Self {
        Self {
            base: ChipBase::new(behavior.chip_type()),
            behavior,
        }
    }

    pub fn base(&self) -> &ChipBase {
        &self.base
    }

    pub fn behavior(&self) -> &B {
        &self.behavior
    }

    pub fn behavior_mut(&mut self) -> &mut B {
        &mut self.behavior
    }

    fn apply_pending_termination(&mut self) -> Result<()> {
        match self.base.take_pending_signal() {
            Some(signal) => self.terminate(Some(signal)),
            None => Ok(()),
        }
    }
}

impl<B: Behavior> Chip for Leaf<B> {
    fn chip_type(&self) -> &'static str {
        self.base.chip_type()
    }

    fn state(&self) -> ChipState {
        self.base.state()
    }

    fn output_signal(&self) -> Option<&Signal> {
        self.base.output_signal()
    }

    fn context(&self) -> &ChipContext {
        self.base.context()
    }

    fn events(&self) -> &EventEmitter<ChipEvent> {
        self.base.events()
    }

    fn activate(
        &mut self,
        tick_info: TickInfo,
        context: ChipContext,
        input_signal: Signal,
        reload_memento: Option<ReloadMemento>,
    ) -> Result<()> {
        self.base
            .begin_activation(tick_info, context, input_signal, reload_memento)?;
        self.behavior.on_activate(&mut self.base)?;
        self.base.finish_activation();
        self.apply_pending_termination()
    }

    fn tick(&mut self, tick_info: TickInfo) -> Result<()> {
        if !self.base.begin_tick(tick_info)? {
            return Ok(());
        }
        self.behavior.on_tick(&mut self.base)?;
        self.apply_pending_termination()
    }

    fn terminate(&mut self, output_signal: Option<Signal>) -> Result<()> {
        self.base.begin_termination(output_signal)?;
        let hook = self.behavior.on_terminate(&mut self.base);
        // Listener cleanup happens even when the hook fails.
        self.base.finish_termination();
        hook
    }

    fn pause(&mut self, tick_info: TickInfo) -> Result<()> {
        self.base.begin_pause(tick_info)?;
        self.behavior.on_pause(&mut self.base)?;
        self.apply_pending_termination()
    }

    fn resume(&mut self, tick_info: TickInfo) -> Result<()> {
        self.base.begin_resume(tick_info)?;
        self.behavior.on_resume(&mut self.base)?;
        self.apply_pending_termination()
    }

    fn make_reload_memento(&self) -> Result<ReloadMemento> {
        self.base.memento(self.behavior.reload_memento_data()?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Counting {
        ticks: u32,
        stop_after: Option<u32>,
    }

    impl Behavior for Counting {
        fn chip_type(&self) -> &'static str {
            "Counting"
        }

        fn on_tick(&mut self, chip: &mut ChipBase) -> Result<()> {
            self.ticks += 1;
            if Some(self.ticks) == self.stop_after {
                chip.request_termination(Signal::new("enough"))?;
            }
            Ok(())
        }
    }

    fn activate(chip: &mut dyn Chip) {
        chip.activate(TickInfo::default(), ChipContext::new(), Signal::default(), None)
            .unwrap();
    }

    #[test]
    fn lifecycle_follows_legal_transitions() {
        let mut chip = Leaf::new(Counting::default());
        assert_eq!(chip.state(), ChipState::Inactive);

        activate(&mut chip);
        assert_eq!(chip.state(), ChipState::Active);

        chip.pause(TickInfo::default()).unwrap();
        assert_eq!(chip.state(), ChipState::Paused);
        chip.tick(TickInfo::new(10.0)).unwrap();
        assert_eq!(chip.behavior().ticks, 0);

        chip.resume(TickInfo::default()).unwrap();
        chip.tick(TickInfo::new(10.0)).unwrap();
        assert_eq!(chip.behavior().ticks, 1);

        chip.terminate(None).unwrap();
        assert_eq!(chip.state(), ChipState::Inactive);
        assert_eq!(chip.output_signal(), Some(&Signal::default()));
    }

    #[test]
    fn illegal_transitions_fail() {
        let mut chip = Leaf::new(Counting::default());

        assert!(chip.tick(TickInfo::default()).is_err());
        assert!(chip.terminate(None).is_err());
        assert!(chip.resume(TickInfo::default()).is_err());

        activate(&mut chip);
        let err = chip
            .activate(TickInfo::default(), ChipContext::new(), Signal::default(), None)
            .unwrap_err();
        assert_eq!(err.code(), "CHIP_INVALID_STATE");
        assert!(chip.resume(TickInfo::default()).is_err());

        chip.terminate(None).unwrap();
        assert!(chip.terminate(None).is_err());
    }

    #[test]
    fn requested_termination_applies_when_tick_returns() {
        let mut chip = Leaf::new(Counting {
            stop_after: Some(2),
            ..Counting::default()
        });
        activate(&mut chip);

        chip.tick(TickInfo::default()).unwrap();
        assert!(chip.output_signal().is_none());

        chip.tick(TickInfo::default()).unwrap();
        assert_eq!(chip.state(), ChipState::Inactive);
        assert_eq!(chip.output_signal(), Some(&Signal::new("enough")));
    }

    #[test]
    fn reactivation_clears_output_signal() {
        let mut chip = Leaf::new(Counting::default());
        activate(&mut chip);
        chip.terminate(Some(Signal::new("x"))).unwrap();
        assert_eq!(chip.output_signal(), Some(&Signal::new("x")));

        activate(&mut chip);
        assert!(chip.output_signal().is_none());
    }

    #[test]
    fn termination_releases_subscriptions() {
        let source: EventEmitter<u32> = EventEmitter::new();
        let mut chip = Leaf::new(Counting::default());
        activate(&mut chip);

        chip.base.subscribe(&source, "score", |_| {});
        chip.base.subscribe_once(&source, "score", |_| {});
        assert_eq!(source.listener_count("score"), 2);

        chip.terminate(None).unwrap();
        assert_eq!(source.listener_count("score"), 0);
        assert_eq!(chip.base().subscription_count(), 0);
    }

    #[test]
    fn failing_terminate_hook_still_releases_subscriptions() {
        struct Stubborn;
        impl Behavior for Stubborn {
            fn chip_type(&self) -> &'static str {
                "Stubborn"
            }
            fn on_terminate(&mut self, _chip: &mut ChipBase) -> Result<()> {
                Err(ChipError::Behavior("cannot let go".to_string()))
            }
        }

        let source: EventEmitter<u32> = EventEmitter::new();
        let mut chip = Leaf::new(Stubborn);
        activate(&mut chip);
        chip.base.subscribe(&source, "score", |_| {});

        let err = chip.terminate(None).unwrap_err();
        assert_eq!(err.code(), "CHIP_BEHAVIOR");
        assert_eq!(chip.state(), ChipState::Inactive);
        assert_eq!(chip.base().subscription_count(), 0);
        assert_eq!(source.listener_count("score"), 0);
    }

    #[test]
    fn second_termination_request_is_rejected() {
        let mut chip = Leaf::new(Counting::default());
        activate(&mut chip);

        chip.base.request_termination(Signal::new("first")).unwrap();
        let err = chip.base.request_termination(Signal::new("second")).unwrap_err();
        assert_eq!(err.code(), "CHIP_TERMINATION_PENDING");
        assert_eq!(chip.output_signal(), Some(&Signal::new("first")));
    }

    #[test]
    fn lifecycle_events_are_emitted() {
        let mut chip = Leaf::new(Counting::default());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        chip.events().on(super::super::ACTIVATED, {
            let sink = Rc::clone(&sink);
            move |event| sink.borrow_mut().push(event.clone())
        });
        chip.events().on(super::super::TERMINATED, move |event| {
            sink.borrow_mut().push(event.clone())
        });

        activate(&mut chip);
        chip.terminate(Some(Signal::new("bye"))).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                ChipEvent::Activated(Signal::default()),
                ChipEvent::Terminated(Signal::new("bye")),
            ]
        );
    }

    #[test]
    fn memento_requires_active_chip() {
        let mut chip = Leaf::new(Counting::default());
        assert!(chip.make_reload_memento().is_err());

        activate(&mut chip);
        let memento = chip.make_reload_memento().unwrap();
        assert_eq!(memento.class_name, "Counting");
        assert!(memento.data.is_empty());
        assert!(memento.children.is_empty());
    }
}

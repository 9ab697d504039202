//! State Machine
//!
//! A [`StateMachine`] runs one named state at a time. When the chip of the
//! current state produces an output signal, the machine decides which state
//! comes next:
//!
//! 1. If the signal table has an entry for the state that was entered last,
//!    the entry gives the next signal, either as a literal or computed by a
//!    resolver from the context and the output signal.
//! 2. Otherwise the output signal itself must name a state or an ending state.
//!
//! A next signal without params takes over the params of the output signal,
//! so data flows from one state to the next.
//!
//! Ending states have no chip. Entering one terminates the machine with the
//! ending signal.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;
use tracing::trace;

use crate::chip::{
    Behavior, ChipContext, ChipEvent, ChipRef, ChipState, ContextOverlay, Leaf, MementoData, Signal,
};
use crate::composite::{
    ActiveChild, ChipActivationInfo, ChipResolvable, Composite, CompositeBehavior, CompositeCore,
};
use crate::error::{ChipError, MementoError, Result};
use crate::options::fill_in_options;

const VISITED_STATES_KEY: &str = "visitedStates";

pub const DEFAULT_STARTING_STATE: &str = "start";
pub const DEFAULT_ENDING_STATE: &str = "end";

/// Chip and optional context overlay of one state.
#[derive(Debug, Clone)]
pub struct StateDescriptor {
    pub chip: ChipResolvable,
    pub context: Option<ContextOverlay>,
}

impl StateDescriptor {
    pub fn new(chip: impl Into<ChipResolvable>) -> Self {
        Self {
            chip: chip.into(),
            context: None,
        }
    }

    #[must_use]
    pub fn context(mut self, context: ContextOverlay) -> Self {
        self.context = Some(context);
        self
    }
}

impl From<ChipResolvable> for StateDescriptor {
    fn from(chip: ChipResolvable) -> Self {
        Self::new(chip)
    }
}

impl From<ChipRef> for StateDescriptor {
    fn from(chip: ChipRef) -> Self {
        Self::new(chip)
    }
}

impl<B: Behavior> From<Leaf<B>> for StateDescriptor {
    fn from(chip: Leaf<B>) -> Self {
        Self::new(chip)
    }
}

impl<B: CompositeBehavior> From<Composite<B>> for StateDescriptor {
    fn from(chip: Composite<B>) -> Self {
        Self::new(chip)
    }
}

/// Computes a signal from the context and a terminating signal.
pub type SignalResolver = Rc<dyn Fn(&ChipContext, &Signal) -> Signal>;

/// A literal signal, or a resolver computing one.
#[derive(Clone)]
pub enum SignalResolvable {
    Signal(Signal),
    Resolver(SignalResolver),
}

impl SignalResolvable {
    pub fn resolver<F>(resolver: F) -> Self
    where
        F: Fn(&ChipContext, &Signal) -> Signal + 'static,
    {
        Self::Resolver(Rc::new(resolver))
    }

    pub fn resolve(&self, context: &ChipContext, signal: &Signal) -> Signal {
        match self {
            Self::Signal(literal) => literal.clone(),
            Self::Resolver(resolver) => resolver(context, signal),
        }
    }
}

impl fmt::Debug for SignalResolvable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(signal) => f.debug_tuple("Signal").field(signal).finish(),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

impl From<Signal> for SignalResolvable {
    fn from(signal: Signal) -> Self {
        Self::Signal(signal)
    }
}

impl From<&str> for SignalResolvable {
    fn from(name: &str) -> Self {
        Self::Signal(Signal::new(name))
    }
}

impl From<String> for SignalResolvable {
    fn from(name: String) -> Self {
        Self::Signal(Signal::new(name))
    }
}

#[derive(Debug, Clone)]
pub struct StateMachineOptions {
    pub starting_state: SignalResolvable,
    /// Keyed by the name of the state that was entered last.
    pub signals: IndexMap<String, SignalResolvable>,
    pub ending_states: SmallVec<[String; 2]>,
}

impl Default for StateMachineOptions {
    fn default() -> Self {
        Self {
            starting_state: DEFAULT_STARTING_STATE.into(),
            signals: IndexMap::new(),
            ending_states: SmallVec::from_iter([DEFAULT_ENDING_STATE.to_string()]),
        }
    }
}

impl StateMachineOptions {
    #[must_use]
    pub fn starting_state(mut self, state: impl Into<SignalResolvable>) -> Self {
        self.starting_state = state.into();
        self
    }

    /// Route the end of state `from` to `to`.
    #[must_use]
    pub fn signal(mut self, from: impl Into<String>, to: impl Into<SignalResolvable>) -> Self {
        self.signals.insert(from.into(), to.into());
        self
    }

    #[must_use]
    pub fn ending_states<S: Into<String>>(mut self, states: impl IntoIterator<Item = S>) -> Self {
        self.ending_states = states.into_iter().map(Into::into).collect();
        self
    }

    /// Read the literal part of the options from JSON: `startingState`,
    /// `signals` (state name to next state name) and `endingStates`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let settings: StateMachineSettings = fill_in_options(value)?;
        let mut options = Self::default().starting_state(settings.starting_state);
        for (from, to) in settings.signals {
            options = options.signal(from, to);
        }
        Ok(options.ending_states(settings.ending_states))
    }

    fn is_ending(&self, name: &str) -> bool {
        self.ending_states.iter().any(|ending| ending == name)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StateMachineSettings {
    starting_state: String,
    signals: IndexMap<String, String>,
    ending_states: Vec<String>,
}

impl Default for StateMachineSettings {
    fn default() -> Self {
        Self {
            starting_state: DEFAULT_STARTING_STATE.to_string(),
            signals: IndexMap::new(),
            ending_states: vec![DEFAULT_ENDING_STATE.to_string()],
        }
    }
}

/// Named states with table-driven transitions.
#[derive(Debug, Clone)]
pub struct StateMachine {
    states: IndexMap<String, StateDescriptor>,
    options: StateMachineOptions,
    visited_states: Vec<Signal>,
    current: Option<ActiveChild>,
}

impl StateMachine {
    pub fn new<K, D>(states: impl IntoIterator<Item = (K, D)>, options: StateMachineOptions) -> Self
    where
        K: Into<String>,
        D: Into<StateDescriptor>,
    {
        Self {
            states: states
                .into_iter()
                .map(|(name, descriptor)| (name.into(), descriptor.into()))
                .collect(),
            options,
            visited_states: Vec::new(),
            current: None,
        }
    }

    pub fn options(&self) -> &StateMachineOptions {
        &self.options
    }

    /// Every state entered since activation, ending states included.
    pub fn visited_states(&self) -> &[Signal] {
        &self.visited_states
    }

    /// The signal the current state was entered with.
    pub fn current_state(&self) -> Option<&Signal> {
        self.visited_states.last()
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    fn next_signal(&self, core: &CompositeCore, output: &Signal) -> Result<Signal> {
        let last_state = self
            .current_state()
            .map(|signal| signal.name().to_string())
            .unwrap_or_default();

        match self.options.signals.get(&last_state) {
            Some(resolvable) => {
                let next = resolvable.resolve(core.context(), output);
                if next.params().is_empty() {
                    Ok(next.with_params_of(output))
                } else {
                    Ok(next)
                }
            }
            None if self.has_state(output.name()) || self.options.is_ending(output.name()) => {
                Ok(output.clone())
            }
            None => Err(ChipError::MissingSignal { state: last_state }),
        }
    }

    fn change_state(&mut self, core: &mut CompositeCore, next: Signal) -> Result<()> {
        let ending = self.options.is_ending(next.name());
        if !ending && !self.has_state(next.name()) {
            return Err(ChipError::UnknownState(next.name().to_string()));
        }

        if let Some(current) = self.current.take() {
            if core.has_child(&current.id) {
                core.terminate_child_chip(&current.id, None)?;
            }
        }

        let previous = self.visited_states.last().cloned();
        self.visited_states.push(next.clone());
        trace!(
            from = previous.as_ref().map(Signal::name),
            to = next.name(),
            "state machine transition"
        );

        if ending {
            core.request_termination(next.clone())?;
        } else if let Some(descriptor) = self.states.get(next.name()) {
            let mut info = ChipActivationInfo::new(descriptor.chip.clone())
                .id(next.name())
                .input_signal(next.clone());
            if let Some(context) = &descriptor.context {
                info = info.context(context.clone());
            }
            self.current = core.activate_child_chip(info)?;
        }

        core.events()
            .dispatch(ChipEvent::StateChange { previous, next });
        Ok(())
    }
}

impl CompositeBehavior for StateMachine {
    fn chip_type(&self) -> &'static str {
        "StateMachine"
    }

    fn on_activate(&mut self, core: &mut CompositeCore) -> Result<()> {
        self.current = None;
        self.visited_states.clear();

        let mut resumed: Vec<Signal> = match core.reload_memento() {
            Some(memento) => memento.field(VISITED_STATES_KEY)?.unwrap_or_default(),
            None => Vec::new(),
        };

        let start = match resumed.pop() {
            Some(last) => {
                self.visited_states = resumed;
                last
            }
            None => self
                .options
                .starting_state
                .resolve(core.context(), &Signal::default()),
        };
        self.change_state(core, start)
    }

    fn on_after_tick(&mut self, core: &mut CompositeCore) -> Result<()> {
        if core.is_terminating() {
            return Ok(());
        }
        let Some(current) = &self.current else {
            return Ok(());
        };
        let Some(output) = current.chip.borrow().output_signal().cloned() else {
            return Ok(());
        };

        let next = self.next_signal(core, &output)?;
        self.change_state(core, next)
    }

    fn on_terminate(&mut self, _core: &mut CompositeCore) -> Result<()> {
        self.current = None;
        Ok(())
    }

    fn reload_memento_data(&self) -> Result<MementoData> {
        let visited = serde_json::to_value(&self.visited_states).map_err(MementoError::from)?;
        let mut data = MementoData::new();
        data.insert(VISITED_STATES_KEY.to_string(), visited);
        Ok(data)
    }
}

impl Composite<StateMachine> {
    /// Move to `next` right away, bypassing the signal table.
    pub fn change_state(&mut self, next: impl Into<Signal>) -> Result<()> {
        let next = next.into();
        self.with_behavior(|machine, core| {
            if core.state() == ChipState::Inactive {
                return Err(ChipError::invalid_state("changeState", core.state()));
            }
            machine.change_state(core, next)
        })
    }
}

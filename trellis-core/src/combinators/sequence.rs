use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::trace;

use crate::chip::{ChipState, MementoData, Signal};
use crate::composite::{
    ActiveChild, ChipActivationInfo, Composite, CompositeBehavior, CompositeCore,
};
use crate::error::{ChipError, Result};

const CURRENT_INDEX_KEY: &str = "currentChipIndex";

/// Signal name used by [`Composite::<Sequence>::skip`].
pub const SKIP_SIGNAL_NAME: &str = "skip";

/// A child output that stops the whole Sequence instead of advancing it.
#[derive(Clone)]
pub enum CancellingSignal {
    Name(String),
    Predicate(Rc<dyn Fn(&Signal) -> bool>),
}

impl CancellingSignal {
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Signal) -> bool + 'static,
    {
        Self::Predicate(Rc::new(predicate))
    }

    pub fn matches(&self, signal: &Signal) -> bool {
        match self {
            Self::Name(name) => signal.name() == name,
            Self::Predicate(predicate) => predicate(signal),
        }
    }
}

impl fmt::Debug for CancellingSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.debug_tuple("Name").field(name).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for CancellingSignal {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SequenceOptions {
    /// Start over after the last child.
    #[serde(rename = "loop")]
    pub looping: bool,
    /// Terminate with the last child's signal once the list is exhausted.
    /// Without it the Sequence idles until more children are added.
    pub terminate_on_completion: bool,
    #[serde(skip)]
    pub cancelling_signal: Option<CancellingSignal>,
}

impl Default for SequenceOptions {
    fn default() -> Self {
        Self {
            looping: false,
            terminate_on_completion: true,
            cancelling_signal: None,
        }
    }
}

/// Runs its children one at a time, in order.
///
/// The Sequence advances whenever the current child produces an output signal.
/// The child at index `i` is registered under id `i` unless it carries an id of
/// its own. Its position survives a hot reload.
#[derive(Debug, Clone)]
pub struct Sequence {
    entries: Vec<ChipActivationInfo>,
    options: SequenceOptions,
    current_index: usize,
    current: Option<ActiveChild>,
}

impl Sequence {
    pub fn new<I>(children: impl IntoIterator<Item = I>) -> Self
    where
        I: Into<ChipActivationInfo>,
    {
        Self::with_options(children, SequenceOptions::default())
    }

    pub fn with_options<I>(children: impl IntoIterator<Item = I>, options: SequenceOptions) -> Self
    where
        I: Into<ChipActivationInfo>,
    {
        Self {
            entries: children.into_iter().map(Into::into).collect(),
            options,
            current_index: 0,
            current: None,
        }
    }

    pub fn options(&self) -> &SequenceOptions {
        &self.options
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Id of the child currently running, if any.
    pub fn current_id(&self) -> Option<&str> {
        self.current.as_ref().map(|child| child.id.as_str())
    }

    fn switch_chip(&mut self, core: &mut CompositeCore) -> Result<()> {
        if let Some(current) = self.current.take() {
            if core.has_child(&current.id) {
                core.terminate_child_chip(&current.id, None)?;
            }
        }

        let Some(entry) = self.entries.get(self.current_index) else {
            return Ok(());
        };
        let mut info = entry.clone();
        if info.id.is_none() {
            info.id = Some(self.current_index.to_string());
        }
        trace!(index = self.current_index, "sequence switching chip");
        self.current = core.activate_child_chip(info)?;
        Ok(())
    }

    fn advance(&mut self, core: &mut CompositeCore, signal: Signal) -> Result<()> {
        self.current_index += 1;
        if self.current_index < self.entries.len() {
            return self.switch_chip(core);
        }

        if self.options.looping {
            self.current_index = 0;
            return self.switch_chip(core);
        }

        if self.options.terminate_on_completion {
            core.request_termination(signal)
        } else {
            // Idle until add_child_chip supplies more work.
            if let Some(current) = self.current.take() {
                if core.has_child(&current.id) {
                    core.terminate_child_chip(&current.id, None)?;
                }
            }
            Ok(())
        }
    }

    fn check_active(core: &CompositeCore, operation: &'static str) -> Result<()> {
        match core.state() {
            ChipState::Inactive => Err(ChipError::invalid_state(operation, core.state())),
            _ => Ok(()),
        }
    }
}

impl CompositeBehavior for Sequence {
    fn chip_type(&self) -> &'static str {
        "Sequence"
    }

    fn on_activate(&mut self, core: &mut CompositeCore) -> Result<()> {
        self.current = None;
        self.current_index = match core.reload_memento() {
            Some(memento) => memento.field(CURRENT_INDEX_KEY)?.unwrap_or(0),
            None => 0,
        };

        if self.current_index < self.entries.len() {
            return self.switch_chip(core);
        }

        // The list is exhausted, possibly because it shrank across a reload.
        if self.options.looping && !self.entries.is_empty() {
            self.current_index = 0;
            self.switch_chip(core)
        } else if self.options.terminate_on_completion {
            core.request_termination(Signal::default())
        } else {
            self.current_index = self.entries.len();
            Ok(())
        }
    }

    fn on_after_tick(&mut self, core: &mut CompositeCore) -> Result<()> {
        if core.is_terminating() {
            return Ok(());
        }

        let Some(current) = &self.current else {
            // A factory declined to produce this entry.
            if self.current_index < self.entries.len() {
                return self.advance(core, Signal::default());
            }
            return Ok(());
        };

        let Some(signal) = current.chip.borrow().output_signal().cloned() else {
            return Ok(());
        };

        let cancelled = self
            .options
            .cancelling_signal
            .as_ref()
            .is_some_and(|cancelling| cancelling.matches(&signal));
        if cancelled {
            trace!(signal = %signal, "sequence cancelled");
            return core.request_termination(signal);
        }
        self.advance(core, signal)
    }

    fn on_terminate(&mut self, _core: &mut CompositeCore) -> Result<()> {
        self.current = None;
        Ok(())
    }

    fn reload_memento_data(&self) -> Result<MementoData> {
        let mut data = MementoData::new();
        data.insert(CURRENT_INDEX_KEY.to_string(), json!(self.current_index));
        Ok(data)
    }
}

impl Composite<Sequence> {
    /// Advance past the current child as if it had ended with `skip`.
    pub fn skip(&mut self) -> Result<()> {
        self.with_behavior(|sequence, core| {
            Sequence::check_active(core, "skip")?;
            sequence.advance(core, Signal::new(SKIP_SIGNAL_NAME))
        })
    }

    /// Go back to the first child.
    pub fn restart(&mut self) -> Result<()> {
        self.with_behavior(|sequence, core| {
            Sequence::check_active(core, "restart")?;
            sequence.current_index = 0;
            sequence.switch_chip(core)
        })
    }

    /// Append a child. An idle Sequence starts it right away.
    pub fn add_child_chip(&mut self, info: impl Into<ChipActivationInfo>) -> Result<()> {
        let info = info.into();
        self.with_behavior(|sequence, core| {
            sequence.entries.push(info);
            let idle = sequence.current.is_none()
                && sequence.current_index + 1 == sequence.entries.len();
            if idle && core.state() != ChipState::Inactive {
                if let Err(err) = sequence.switch_chip(core) {
                    sequence.entries.pop();
                    return Err(err);
                }
            }
            Ok(())
        })
    }
}

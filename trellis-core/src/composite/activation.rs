//! Child Activation Descriptors
//!
//! Combinators take their children as [`ChipActivationInfo`] values: the chip
//! (or a factory that builds it) plus optional id, attribute, context overlay
//! and input signal.

use std::fmt;
use std::rc::Rc;

use crate::chip::{chip_ref, Behavior, ChipContext, ChipRef, ContextOverlay, Leaf, Signal};

use super::{Composite, CompositeBehavior};

/// Builds a child at activation time from the composed child context and the
/// input signal. Returning `None` declines to spawn a child.
pub type ChipFactory = Rc<dyn Fn(&ChipContext, &Signal) -> Option<ChipRef>>;

/// A child chip, or a factory producing one.
#[derive(Clone)]
pub enum ChipResolvable {
    Chip(ChipRef),
    Factory(ChipFactory),
}

impl ChipResolvable {
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&ChipContext, &Signal) -> Option<ChipRef> + 'static,
    {
        Self::Factory(Rc::new(factory))
    }

    pub(crate) fn resolve(&self, context: &ChipContext, input_signal: &Signal) -> Option<ChipRef> {
        match self {
            Self::Chip(chip) => Some(Rc::clone(chip)),
            Self::Factory(factory) => factory(context, input_signal),
        }
    }
}

impl fmt::Debug for ChipResolvable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chip(chip) => match chip.try_borrow() {
                Ok(chip) => f.debug_tuple("Chip").field(&chip.chip_type()).finish(),
                Err(_) => f.write_str("Chip(<borrowed>)"),
            },
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

impl From<ChipRef> for ChipResolvable {
    fn from(chip: ChipRef) -> Self {
        Self::Chip(chip)
    }
}

impl<B: Behavior> From<Leaf<B>> for ChipResolvable {
    fn from(chip: Leaf<B>) -> Self {
        Self::Chip(chip_ref(chip))
    }
}

impl<B: CompositeBehavior> From<Composite<B>> for ChipResolvable {
    fn from(chip: Composite<B>) -> Self {
        Self::Chip(chip_ref(chip))
    }
}

/// Everything a composite needs to activate one child.
#[derive(Debug, Clone)]
pub struct ChipActivationInfo {
    pub chip: ChipResolvable,
    /// Explicit child id.
    pub id: Option<String>,
    /// Attribute slot to bind the child to. A trailing `[]` appends to a
    /// list slot instead of replacing a single one.
    pub attribute: Option<String>,
    /// Applied last when composing the child context.
    pub context: Option<ContextOverlay>,
    /// Defaults to the default signal.
    pub input_signal: Option<Signal>,
    /// Expose the child to later children through the context, under its id.
    pub include_in_child_context: bool,
}

impl ChipActivationInfo {
    pub fn new(chip: impl Into<ChipResolvable>) -> Self {
        Self {
            chip: chip.into(),
            id: None,
            attribute: None,
            context: None,
            input_signal: None,
            include_in_child_context: false,
        }
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    #[must_use]
    pub fn context(mut self, context: ContextOverlay) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub fn input_signal(mut self, signal: impl Into<Signal>) -> Self {
        self.input_signal = Some(signal.into());
        self
    }

    #[must_use]
    pub fn include_in_child_context(mut self, include: bool) -> Self {
        self.include_in_child_context = include;
        self
    }
}

impl From<ChipResolvable> for ChipActivationInfo {
    fn from(chip: ChipResolvable) -> Self {
        Self::new(chip)
    }
}

impl From<ChipRef> for ChipActivationInfo {
    fn from(chip: ChipRef) -> Self {
        Self::new(chip)
    }
}

impl<B: Behavior> From<Leaf<B>> for ChipActivationInfo {
    fn from(chip: Leaf<B>) -> Self {
        Self::new(chip)
    }
}

impl<B: CompositeBehavior> From<Composite<B>> for ChipActivationInfo {
    fn from(chip: Composite<B>) -> Self {
        Self::new(chip)
    }
}

/// A child the composite has just activated.
#[derive(Clone)]
pub struct ActiveChild {
    pub id: String,
    pub chip: ChipRef,
}

impl fmt::Debug for ActiveChild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveChild").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::Forever;
    use std::cell::Cell;

    #[test]
    fn factory_sees_context_and_signal() {
        let calls = Rc::new(Cell::new(0));
        let sink = Rc::clone(&calls);
        let resolvable = ChipResolvable::factory(move |context, signal| {
            sink.set(sink.get() + 1);
            (context.contains_key("spawn") && signal.name() == "go")
                .then(|| chip_ref(Leaf::new(Forever)))
        });

        let context = ChipContext::new().with("spawn", serde_json::json!(true));
        assert!(resolvable.resolve(&context, &Signal::new("go")).is_some());
        assert!(resolvable.resolve(&ChipContext::new(), &Signal::new("go")).is_none());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn builder_sets_fields() {
        let info = ChipActivationInfo::new(Leaf::new(Forever))
            .id("music")
            .attribute("tracks[]")
            .input_signal("play")
            .include_in_child_context(true);

        assert_eq!(info.id.as_deref(), Some("music"));
        assert_eq!(info.attribute.as_deref(), Some("tracks[]"));
        assert_eq!(info.input_signal, Some(Signal::new("play")));
        assert!(info.include_in_child_context);
        assert!(info.context.is_none());
    }
}

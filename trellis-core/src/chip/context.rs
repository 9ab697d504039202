//! Chip Context
//!
//! The context is the environment a parent hands to its children: services,
//! configuration, references to sibling chips. It is immutable. A child never
//! edits the context it received; it derives a new one for its own children.
//!
//! # Derivation
//!
//! A child context is built by applying overlays to the parent context, left
//! to right. An overlay is either a set of entries (later entries win on key
//! collision) or a transform function that maps a context to a new one.
//!
//! ```rust
//! use trellis_core::{ChipContext, ContextOverlay};
//! use serde_json::json;
//!
//! let root = ChipContext::new().with("volume", json!(0.5));
//! let child = root.compose([
//!     &ContextOverlay::single("volume", json!(1.0)),
//!     &ContextOverlay::transform(|ctx| ctx.with("level", json!(3))),
//! ]);
//!
//! assert_eq!(root.data("volume"), Some(&json!(0.5)));
//! assert_eq!(child.data("volume"), Some(&json!(1.0)));
//! assert_eq!(child.data("level"), Some(&json!(3)));
//! ```

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use super::{Chip, ChipRef};

/// A value stored in a [`ChipContext`].
#[derive(Clone)]
pub enum ContextValue {
    /// Plain data.
    Data(Value),
    /// A live chip, typically a provider registered by its parent.
    Chip(ChipRef),
    /// Any other shared service object.
    Shared(Rc<dyn Any>),
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(value) => f.debug_tuple("Data").field(value).finish(),
            Self::Chip(chip) => match chip.try_borrow() {
                Ok(chip) => f.debug_tuple("Chip").field(&chip.chip_type()).finish(),
                Err(_) => f.write_str("Chip(<borrowed>)"),
            },
            Self::Shared(_) => f.write_str("Shared(..)"),
        }
    }
}

impl From<Value> for ContextValue {
    fn from(value: Value) -> Self {
        Self::Data(value)
    }
}

impl From<ChipRef> for ContextValue {
    fn from(chip: ChipRef) -> Self {
        Self::Chip(chip)
    }
}

/// Immutable key-value environment passed from parent to child.
///
/// Cloning is cheap; the entries are shared.
#[derive(Clone, Default)]
pub struct ChipContext {
    entries: Rc<IndexMap<String, ContextValue>>,
}

impl ChipContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context from key-value pairs.
    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<ContextValue>,
    {
        Self {
            entries: Rc::new(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect(),
            ),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.entries.get(key)
    }

    /// Get a plain data entry.
    pub fn data(&self, key: &str) -> Option<&Value> {
        match self.entries.get(key) {
            Some(ContextValue::Data(value)) => Some(value),
            _ => None,
        }
    }

    /// Get a chip entry.
    pub fn chip(&self, key: &str) -> Option<ChipRef> {
        match self.entries.get(key) {
            Some(ContextValue::Chip(chip)) => Some(Rc::clone(chip)),
            _ => None,
        }
    }

    /// Get a shared service entry of a known type.
    pub fn shared<T: Any>(&self, key: &str) -> Option<Rc<T>> {
        match self.entries.get(key) {
            Some(ContextValue::Shared(value)) => Rc::clone(value).downcast::<T>().ok(),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Derive a context with one entry added or replaced.
    #[must_use]
    pub fn with(&self, key: impl Into<String>, value: impl Into<ContextValue>) -> ChipContext {
        let mut entries = (*self.entries).clone();
        entries.insert(key.into(), value.into());
        Self {
            entries: Rc::new(entries),
        }
    }

    /// Derive a context by merging entries over this one.
    #[must_use]
    pub fn merge(&self, overlay: &IndexMap<String, ContextValue>) -> ChipContext {
        if overlay.is_empty() {
            return self.clone();
        }
        let mut entries = (*self.entries).clone();
        for (key, value) in overlay {
            entries.insert(key.clone(), value.clone());
        }
        Self {
            entries: Rc::new(entries),
        }
    }

    /// Derive a context by applying one overlay.
    #[must_use]
    pub fn apply(&self, overlay: &ContextOverlay) -> ChipContext {
        match overlay {
            ContextOverlay::Entries(entries) => self.merge(entries),
            ContextOverlay::Transform(transform) => transform(self),
        }
    }

    /// Derive a context by applying overlays left to right.
    #[must_use]
    pub fn compose<'a>(
        &self,
        overlays: impl IntoIterator<Item = &'a ContextOverlay>,
    ) -> ChipContext {
        overlays
            .into_iter()
            .fold(self.clone(), |context, overlay| context.apply(overlay))
    }
}

impl fmt::Debug for ChipContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

/// A function deriving one context from another.
pub type ContextTransform = Rc<dyn Fn(&ChipContext) -> ChipContext>;

/// One step of context derivation.
#[derive(Clone)]
pub enum ContextOverlay {
    Entries(IndexMap<String, ContextValue>),
    Transform(ContextTransform),
}

impl ContextOverlay {
    /// An overlay adding a single entry.
    pub fn single(key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        let mut entries = IndexMap::new();
        entries.insert(key.into(), value.into());
        Self::Entries(entries)
    }

    /// An overlay adding several entries.
    pub fn entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<ContextValue>,
    {
        Self::Entries(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// An overlay computed from the context it is applied to.
    pub fn transform<F>(transform: F) -> Self
    where
        F: Fn(&ChipContext) -> ChipContext + 'static,
    {
        Self::Transform(Rc::new(transform))
    }
}

impl From<IndexMap<String, ContextValue>> for ContextOverlay {
    fn from(entries: IndexMap<String, ContextValue>) -> Self {
        Self::Entries(entries)
    }
}

impl fmt::Debug for ContextOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entries(entries) => f.debug_tuple("Entries").field(entries).finish(),
            Self::Transform(_) => f.write_str("Transform(..)"),
        }
    }
}

//! Signal Implementation
//!
//! A Signal is the message a chip leaves behind when it terminates, and the
//! message a chip receives when it is activated. It is a plain immutable value:
//! a name plus a parameter map.
//!
//! Parents never look inside a child. They read its output signal and decide
//! what that means: advance a sequence, pick the next state, stop a race.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name carried by a signal when none is given.
pub const DEFAULT_SIGNAL_NAME: &str = "default";

/// Parameters attached to a signal, in insertion order.
pub type SignalParams = IndexMap<String, Value>;

/// An immutable named message with parameters.
///
/// # Example
///
/// ```rust
/// use trellis_core::Signal;
///
/// let signal = Signal::new("won").with_param("score", 12);
/// assert_eq!(signal.name(), "won");
/// assert_eq!(signal.param("score"), Some(&serde_json::json!(12)));
/// assert!(Signal::default().is_default());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    name: String,
    #[serde(default)]
    params: SignalParams,
}

impl Signal {
    /// Create a signal with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: SignalParams::new(),
        }
    }

    /// Create a signal with the given parameters.
    pub fn with_params(name: impl Into<String>, params: SignalParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Return a copy of this signal with one more parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &SignalParams {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Whether this is the signal produced when nothing more specific was given.
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_SIGNAL_NAME && self.params.is_empty()
    }

    /// Keep this signal's name but take the parameters of `other`.
    ///
    /// Used when a transition names the next state without data of its own,
    /// so the data of the terminating state passes through.
    #[must_use]
    pub fn with_params_of(&self, other: &Signal) -> Signal {
        Signal {
            name: self.name.clone(),
            params: other.params.clone(),
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNAL_NAME)
    }
}

impl From<&str> for Signal {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Signal {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}(", self.name)?;
            for (i, (key, value)) in self.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, ")")
        }
    }
}

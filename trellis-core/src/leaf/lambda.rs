use std::fmt;

use crate::chip::{Behavior, ChipBase, ChipContext, Signal};
use crate::error::Result;

/// What a [`Lambda`] function returned.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LambdaOutput {
    /// Terminate with the default signal.
    #[default]
    Default,
    Signal(Signal),
}

impl LambdaOutput {
    fn into_signal(self) -> Signal {
        match self {
            Self::Default => Signal::default(),
            Self::Signal(signal) => signal,
        }
    }
}

impl From<()> for LambdaOutput {
    fn from(_: ()) -> Self {
        Self::Default
    }
}

impl From<bool> for LambdaOutput {
    fn from(_: bool) -> Self {
        Self::Default
    }
}

impl From<&str> for LambdaOutput {
    fn from(name: &str) -> Self {
        Self::Signal(Signal::new(name))
    }
}

impl From<String> for LambdaOutput {
    fn from(name: String) -> Self {
        Self::Signal(Signal::new(name))
    }
}

impl From<Signal> for LambdaOutput {
    fn from(signal: Signal) -> Self {
        Self::Signal(signal)
    }
}

impl From<Option<Signal>> for LambdaOutput {
    fn from(signal: Option<Signal>) -> Self {
        signal.map_or(Self::Default, Self::Signal)
    }
}

type LambdaFn = Box<dyn FnMut(&ChipContext, &Signal) -> Result<LambdaOutput>>;

/// Calls a function once on activation, then terminates.
///
/// The function receives the context and input signal. A returned name
/// becomes a signal of that name, a returned [`Signal`] is used as is, and
/// anything else ends with the default signal.
///
/// ```rust
/// use trellis_core::leaf::Lambda;
/// use trellis_core::{Chip, ChipContext, Leaf, Signal, TickInfo};
///
/// let mut chip = Leaf::new(Lambda::new(|_, input| format!("after-{}", input.name())));
/// chip.activate(TickInfo::default(), ChipContext::new(), Signal::new("intro"), None)
///     .unwrap();
/// assert_eq!(chip.output_signal(), Some(&Signal::new("after-intro")));
/// ```
pub struct Lambda {
    f: LambdaFn,
}

impl Lambda {
    pub fn new<F, O>(mut f: F) -> Self
    where
        F: FnMut(&ChipContext, &Signal) -> O + 'static,
        O: Into<LambdaOutput>,
    {
        Self {
            f: Box::new(move |context: &ChipContext, signal: &Signal| Ok(f(context, signal).into())),
        }
    }

    /// A function that can fail; the error propagates out of `activate()`.
    pub fn fallible<F, O>(mut f: F) -> Self
    where
        F: FnMut(&ChipContext, &Signal) -> Result<O> + 'static,
        O: Into<LambdaOutput>,
    {
        Self {
            f: Box::new(move |context: &ChipContext, signal: &Signal| f(context, signal).map(Into::into)),
        }
    }
}

impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Lambda(..)")
    }
}

impl Behavior for Lambda {
    fn chip_type(&self) -> &'static str {
        "Lambda"
    }

    fn on_activate(&mut self, chip: &mut ChipBase) -> Result<()> {
        let output = (self.f)(chip.context(), chip.input_signal())?;
        chip.request_termination(output.into_signal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::{Chip, ChipState, Leaf, TickInfo};
    use crate::error::ChipError;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn run(lambda: Lambda) -> Leaf<Lambda> {
        let mut chip = Leaf::new(lambda);
        chip.activate(TickInfo::default(), ChipContext::new(), Signal::default(), None)
            .unwrap();
        chip
    }

    #[test]
    fn unit_return_is_default_signal() {
        let calls = Rc::new(Cell::new(0));
        let sink = Rc::clone(&calls);
        let chip = run(Lambda::new(move |_, _| sink.set(sink.get() + 1)));

        assert_eq!(calls.get(), 1);
        assert_eq!(chip.state(), ChipState::Inactive);
        assert_eq!(chip.output_signal(), Some(&Signal::default()));
    }

    #[test]
    fn returned_signal_keeps_params() {
        let chip = run(Lambda::new(|_, _| Signal::new("scored").with_param("points", json!(3))));
        let signal = chip.output_signal().unwrap();
        assert_eq!(signal.name(), "scored");
        assert_eq!(signal.param("points"), Some(&json!(3)));
    }

    #[test]
    fn errors_propagate() {
        let mut chip = Leaf::new(Lambda::fallible(|_, _| -> Result<()> {
            Err(ChipError::Behavior("no save slot".into()))
        }));
        let err = chip
            .activate(TickInfo::default(), ChipContext::new(), Signal::default(), None)
            .unwrap_err();
        assert_eq!(err.code(), "CHIP_BEHAVIOR");
    }
}

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::chip::{Behavior, ChipBase, EventSource, Signal};
use crate::error::Result;

/// A handler's verdict on one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Keep waiting.
    Wait,
    /// Terminate with the default signal.
    Done,
    Signal(Signal),
}

impl From<bool> for EventOutcome {
    fn from(done: bool) -> Self {
        if done {
            Self::Done
        } else {
            Self::Wait
        }
    }
}

impl From<Signal> for EventOutcome {
    fn from(signal: Signal) -> Self {
        Self::Signal(signal)
    }
}

impl From<Option<Signal>> for EventOutcome {
    fn from(signal: Option<Signal>) -> Self {
        signal.map_or(Self::Wait, Self::Signal)
    }
}

type EventHandler<E> = Rc<dyn Fn(&E) -> EventOutcome>;

/// Waits for one named event on a source.
///
/// The handler decides whether an event ends the wait. An accepted event
/// terminates the chip on its next tick.
pub struct WaitForEvent<S: EventSource> {
    source: S,
    event: String,
    handler: EventHandler<S::Event>,
    accepted: Rc<RefCell<Option<Signal>>>,
}

impl<S> WaitForEvent<S>
where
    S: EventSource + Clone + 'static,
    S::Event: 'static,
{
    /// End on the first occurrence of `event`.
    pub fn new(source: S, event: impl Into<String>) -> Self {
        Self::with_handler(source, event, |_| EventOutcome::Done)
    }

    pub fn with_handler<F, O>(source: S, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&S::Event) -> O + 'static,
        O: Into<EventOutcome>,
    {
        Self {
            source,
            event: event.into(),
            handler: Rc::new(move |payload: &S::Event| handler(payload).into()),
            accepted: Rc::new(RefCell::new(None)),
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

impl<S: EventSource> fmt::Debug for WaitForEvent<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitForEvent")
            .field("event", &self.event)
            .field("accepted", &self.accepted.borrow())
            .finish()
    }
}

impl<S> Behavior for WaitForEvent<S>
where
    S: EventSource + Clone + 'static,
    S::Event: 'static,
{
    fn chip_type(&self) -> &'static str {
        "WaitForEvent"
    }

    fn on_activate(&mut self, chip: &mut ChipBase) -> Result<()> {
        self.accepted.replace(None);

        let handler = Rc::clone(&self.handler);
        let accepted = Rc::clone(&self.accepted);
        chip.subscribe(&self.source, &self.event, move |payload: &S::Event| {
            if accepted.borrow().is_some() {
                return;
            }
            match handler(payload) {
                EventOutcome::Wait => {}
                EventOutcome::Done => {
                    accepted.replace(Some(Signal::default()));
                }
                EventOutcome::Signal(signal) => {
                    accepted.replace(Some(signal));
                }
            }
        });
        Ok(())
    }

    fn on_tick(&mut self, chip: &mut ChipBase) -> Result<()> {
        let accepted = self.accepted.borrow_mut().take();
        if let Some(signal) = accepted {
            chip.request_termination(signal)?;
        }
        Ok(())
    }
}

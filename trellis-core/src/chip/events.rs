//! Events and Subscriptions
//!
//! Chips announce their lifecycle through named events, and subscribe to
//! events of other sources (child chips, input devices, game objects).
//!
//! # Sources
//!
//! [`EventSource`] is the adapter every source implements: add a listener for
//! a named event, remove it again. [`EventEmitter`] is the built-in source.
//! Other sources (a window, a physics world) implement the trait themselves.
//!
//! # Ownership
//!
//! A chip records every listener it registers in its [`Subscriptions`]. All of
//! them are removed when the chip terminates, so listeners never outlive the
//! activation that created them.
//!
//! # Reentrancy
//!
//! Listeners run synchronously inside `emit`. The listener list is copied out
//! before dispatch, so a listener may add or remove listeners on the same
//! emitter. A listener must not borrow the chip that is emitting.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::signal::Signal;

/// Unique identifier of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier of an event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    /// Generate a new unique source ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback invoked with the event payload.
pub type Listener<T> = Rc<dyn Fn(&T)>;

/// Adapter over anything that can deliver named events.
pub trait EventSource {
    /// Payload delivered to listeners.
    type Event;

    /// Identity used to filter subscriptions by source.
    fn source_id(&self) -> SourceId;

    /// Register a listener. A `once` listener is removed after its first call.
    fn add_listener(&self, event: &str, once: bool, listener: Listener<Self::Event>)
        -> ListenerId;

    /// Remove a listener. Returns `false` if it was not registered.
    fn remove_listener(&self, event: &str, id: ListenerId) -> bool;
}

struct ListenerEntry<T> {
    id: ListenerId,
    once: bool,
    callback: Listener<T>,
}

type ListenerTable<T> = IndexMap<String, SmallVec<[ListenerEntry<T>; 4]>>;

/// A named-event emitter.
///
/// Clones share the same listener table.
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use trellis_core::EventEmitter;
///
/// let emitter: EventEmitter<u32> = EventEmitter::new();
/// let total = Rc::new(Cell::new(0));
/// let sink = Rc::clone(&total);
/// emitter.on("score", move |points| sink.set(sink.get() + points));
///
/// emitter.emit("score", &5);
/// emitter.emit("score", &7);
/// assert_eq!(total.get(), 12);
/// ```
pub struct EventEmitter<T> {
    id: SourceId,
    listeners: Rc<RefCell<ListenerTable<T>>>,
}

impl<T> EventEmitter<T> {
    /// Create an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            id: SourceId::new(),
            listeners: Rc::new(RefCell::new(IndexMap::new())),
        }
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Register a listener that stays until removed.
    pub fn on<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&T) + 'static,
    {
        self.insert(event, false, Rc::new(callback))
    }

    /// Register a listener that is removed after its first call.
    pub fn once<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&T) + 'static,
    {
        self.insert(event, true, Rc::new(callback))
    }

    /// Remove a listener.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(entries) = listeners.get_mut(event) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        before != entries.len()
    }

    /// Deliver `payload` to every listener of `event`.
    ///
    /// Returns the number of listeners called.
    pub fn emit(&self, event: &str, payload: &T) -> usize {
        let callbacks: SmallVec<[Listener<T>; 4]> = {
            let mut listeners = self.listeners.borrow_mut();
            match listeners.get_mut(event) {
                Some(entries) => {
                    let callbacks = entries
                        .iter()
                        .map(|entry| Rc::clone(&entry.callback))
                        .collect();
                    entries.retain(|entry| !entry.once);
                    callbacks
                }
                None => SmallVec::new(),
            }
        };

        for callback in &callbacks {
            callback(payload);
        }
        callbacks.len()
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .borrow()
            .get(event)
            .map_or(0, |entries| entries.len())
    }

    fn insert(&self, event: &str, once: bool, callback: Listener<T>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners
            .borrow_mut()
            .entry(event.to_string())
            .or_default()
            .push(ListenerEntry { id, once, callback });
        id
    }
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for EventEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            listeners: Rc::clone(&self.listeners),
        }
    }
}

impl<T> fmt::Debug for EventEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.borrow();
        f.debug_struct("EventEmitter")
            .field("id", &self.id)
            .field("events", &listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<T> EventSource for EventEmitter<T> {
    type Event = T;

    fn source_id(&self) -> SourceId {
        self.id
    }

    fn add_listener(&self, event: &str, once: bool, listener: Listener<T>) -> ListenerId {
        self.insert(event, once, listener)
    }

    fn remove_listener(&self, event: &str, id: ListenerId) -> bool {
        self.off(event, id)
    }
}

// ----------------------------------------------------------------------------
// Chip lifecycle events
// ----------------------------------------------------------------------------

pub const ACTIVATED: &str = "activated";
pub const TERMINATED: &str = "terminated";
pub const ACTIVATED_CHILD_CHIP: &str = "activatedChildChip";
pub const TERMINATED_CHILD_CHIP: &str = "terminatedChildChip";
pub const STATE_CHANGE: &str = "stateChange";

/// Events every chip emits about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChipEvent {
    /// The chip was activated with this input signal.
    Activated(Signal),
    /// The chip terminated with this output signal.
    Terminated(Signal),
    /// A composite activated a child.
    ActivatedChildChip { id: String },
    /// A composite removed a terminated child.
    TerminatedChildChip { id: String, signal: Signal },
    /// A state machine moved to a new state.
    StateChange {
        previous: Option<Signal>,
        next: Signal,
    },
}

impl ChipEvent {
    /// The event name listeners register for.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Activated(_) => ACTIVATED,
            Self::Terminated(_) => TERMINATED,
            Self::ActivatedChildChip { .. } => ACTIVATED_CHILD_CHIP,
            Self::TerminatedChildChip { .. } => TERMINATED_CHILD_CHIP,
            Self::StateChange { .. } => STATE_CHANGE,
        }
    }
}

impl EventEmitter<ChipEvent> {
    /// Emit a lifecycle event under its own name.
    pub fn dispatch(&self, event: ChipEvent) -> usize {
        self.emit(event.name(), &event)
    }
}

// ----------------------------------------------------------------------------
// Subscriptions
// ----------------------------------------------------------------------------

struct Subscription {
    source: SourceId,
    event: String,
    listener: ListenerId,
    remove: Box<dyn Fn() -> bool>,
}

/// Selects which subscriptions to remove. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    source: Option<SourceId>,
    event: Option<String>,
    listener: Option<ListenerId>,
}

impl SubscriptionFilter {
    /// A filter matching every subscription.
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn source(mut self, source: SourceId) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    #[must_use]
    pub fn listener(mut self, listener: ListenerId) -> Self {
        self.listener = Some(listener);
        self
    }

    fn matches(&self, subscription: &Subscription) -> bool {
        self.source.map_or(true, |s| s == subscription.source)
            && self
                .event
                .as_deref()
                .map_or(true, |e| e == subscription.event)
            && self.listener.map_or(true, |l| l == subscription.listener)
    }
}

/// The listeners a chip has registered on other sources.
#[derive(Default)]
pub struct Subscriptions {
    entries: Vec<Subscription>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` on `source` and remember it for later removal.
    pub fn subscribe<S, F>(&mut self, source: &S, event: &str, once: bool, callback: F) -> ListenerId
    where
        S: EventSource + Clone + 'static,
        F: Fn(&S::Event) + 'static,
    {
        let listener = source.add_listener(event, once, Rc::new(callback));
        let handle = source.clone();
        let event_name = event.to_string();
        self.entries.push(Subscription {
            source: source.source_id(),
            event: event.to_string(),
            listener,
            remove: Box::new(move || handle.remove_listener(&event_name, listener)),
        });
        listener
    }

    /// Remove every subscription matching `filter`. Returns how many matched.
    pub fn unsubscribe(&mut self, filter: &SubscriptionFilter) -> usize {
        let mut removed = 0;
        self.entries.retain(|subscription| {
            if filter.matches(subscription) {
                (subscription.remove)();
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// Remove every subscription.
    pub fn unsubscribe_all(&mut self) -> usize {
        self.unsubscribe(&SubscriptionFilter::any())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|s| (&s.event, s.listener)))
            .finish()
    }
}

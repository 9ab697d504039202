//! Composite Registry
//!
//! [`CompositeCore`] is the state a composite hands to its behavior hooks: the
//! chip base plus the registry of live children.
//!
//! # Child Removal
//!
//! A child reports its termination through its own `terminated` event. The
//! listener cannot touch the composite (it is usually borrowed at that point),
//! so it only records the child in an inbox. The core drains the inbox
//! ("reaps") at well-defined points:
//!
//! - before and after the child tick loop
//! - before activating or terminating a child
//! - inside [`Composite::with_behavior`](super::Composite::with_behavior)
//!
//! Queries such as [`CompositeCore::children`] skip children sitting in the
//! inbox, so they always reflect the live set.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use crate::chip::{
    ChipBase, ChipContext, ChipEvent, ChipRef, ChipState, ContextOverlay, ContextValue,
    EventEmitter, ListenerId, ReloadMemento, Signal, SubscriptionFilter, TickInfo, TERMINATED,
};
use crate::error::{ChipError, Result};

use super::activation::{ActiveChild, ChipActivationInfo};
use super::attributes::{same_chip, split_attribute, AttributeSlot, AttributeSlots};

#[derive(Debug, Clone)]
struct TerminatedChild {
    id: String,
    serial: u64,
    signal: Signal,
}

type Inbox = Rc<RefCell<Vec<TerminatedChild>>>;

struct ChildEntry {
    chip: ChipRef,
    /// Distinguishes successive children registered under the same id.
    serial: u64,
    listener: ListenerId,
    attribute: Option<String>,
    in_context: bool,
}

/// Child bookkeeping shared by every composite.
pub struct CompositeCore {
    base: ChipBase,
    children: IndexMap<String, ChildEntry>,
    /// Children exposed to later children through the context, keyed by id.
    child_chip_context: IndexMap<String, ContextValue>,
    default_child_context: Option<ContextOverlay>,
    attributes: AttributeSlots,
    inbox: Inbox,
    /// Reaped children not yet handed to the behavior.
    pub(super) terminated_log: Vec<(String, Signal)>,
    pub(super) method_call_in_progress: bool,
    next_serial: u64,
}

impl CompositeCore {
    pub(super) fn new(chip_type: &'static str, default_child_context: Option<ContextOverlay>) -> Self {
        Self {
            base: ChipBase::new(chip_type),
            children: IndexMap::new(),
            child_chip_context: IndexMap::new(),
            default_child_context,
            attributes: AttributeSlots::new(),
            inbox: Rc::new(RefCell::new(Vec::new())),
            terminated_log: Vec::new(),
            method_call_in_progress: false,
            next_serial: 0,
        }
    }

    pub fn base(&self) -> &ChipBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut ChipBase {
        &mut self.base
    }

    pub fn state(&self) -> ChipState {
        self.base.state()
    }

    pub fn context(&self) -> &ChipContext {
        self.base.context()
    }

    pub fn reload_memento(&self) -> Option<&ReloadMemento> {
        self.base.reload_memento()
    }

    pub fn events(&self) -> &EventEmitter<ChipEvent> {
        self.base.events()
    }

    /// See [`ChipBase::request_termination`].
    pub fn request_termination(&mut self, signal: Signal) -> Result<()> {
        self.base.request_termination(signal)
    }

    pub fn is_terminating(&self) -> bool {
        self.base.is_terminating()
    }

    pub fn attributes(&self) -> &AttributeSlots {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut AttributeSlots {
        &mut self.attributes
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    fn is_reported(&self, id: &str, serial: u64) -> bool {
        self.inbox
            .borrow()
            .iter()
            .any(|child| child.serial == serial && child.id == id)
    }

    fn live(&self) -> impl Iterator<Item = (&String, &ChildEntry)> {
        self.children
            .iter()
            .filter(|(id, entry)| !self.is_reported(id, entry.serial))
    }

    /// Live children keyed by id, in activation order.
    pub fn children(&self) -> IndexMap<String, ChipRef> {
        self.live()
            .map(|(id, entry)| (id.clone(), Rc::clone(&entry.chip)))
            .collect()
    }

    pub fn child(&self, id: &str) -> Option<ChipRef> {
        self.children
            .get(id)
            .filter(|entry| !self.is_reported(id, entry.serial))
            .map(|entry| Rc::clone(&entry.chip))
    }

    pub fn has_child(&self, id: &str) -> bool {
        self.child(id).is_some()
    }

    pub fn child_ids(&self) -> Vec<String> {
        self.live().map(|(id, _)| id.clone()).collect()
    }

    pub fn child_count(&self) -> usize {
        self.live().count()
    }

    /// The context a child would receive, with `overlay` applied last.
    pub fn child_context(&self, overlay: Option<&ContextOverlay>) -> ChipContext {
        let mut context = self.base.context().merge(&self.child_chip_context);
        if let Some(default) = &self.default_child_context {
            context = context.apply(default);
        }
        if let Some(overlay) = overlay {
            context = context.apply(overlay);
        }
        context
    }

    // ------------------------------------------------------------------------
    // Child activation and termination
    // ------------------------------------------------------------------------

    /// Activate a child.
    ///
    /// Returns `Ok(None)` when a factory declines to produce a chip.
    pub fn activate_child_chip(
        &mut self,
        info: impl Into<ChipActivationInfo>,
    ) -> Result<Option<ActiveChild>> {
        let info = info.into();
        self.reap();

        let input_signal = info.input_signal.clone().unwrap_or_default();
        let context = self.child_context(info.context.as_ref());
        let Some(chip) = info.chip.resolve(&context, &input_signal) else {
            trace!(
                chip_type = self.base.chip_type(),
                "factory declined to produce a child chip"
            );
            return Ok(None);
        };

        let serial = self.next_serial;
        self.next_serial += 1;

        let id = match (&info.id, &info.attribute) {
            (Some(id), _) => id.clone(),
            (None, Some(attribute)) => match split_attribute(attribute) {
                (name, true) => format!("{name}-{serial}"),
                (name, false) => name.to_string(),
            },
            (None, None) => format!("#{serial}"),
        };

        if let Some(attribute) = &info.attribute {
            self.release_attribute(attribute)?;
        }

        if self.has_child(&id) {
            return Err(ChipError::DuplicateChildId(id));
        }

        let reload_memento = self
            .base
            .reload_memento()
            .and_then(|memento| memento.child(&id))
            .cloned();

        let events = chip.borrow().events().clone();
        let inbox = Rc::clone(&self.inbox);
        let reported_id = id.clone();
        let listener = self.base.subscribe_once(&events, TERMINATED, move |event: &ChipEvent| {
            if let ChipEvent::Terminated(signal) = event {
                inbox.borrow_mut().push(TerminatedChild {
                    id: reported_id.clone(),
                    serial,
                    signal: signal.clone(),
                });
            }
        });

        self.children.insert(
            id.clone(),
            ChildEntry {
                chip: Rc::clone(&chip),
                serial,
                listener,
                attribute: info.attribute.clone(),
                in_context: info.include_in_child_context,
            },
        );

        trace!(chip_type = self.base.chip_type(), child = %id, "activating child chip");
        let activation = chip.borrow_mut().activate(
            self.base.tick_info(),
            context,
            input_signal,
            reload_memento,
        );
        if let Err(err) = activation {
            self.children.shift_remove(&id);
            self.base
                .unsubscribe(&SubscriptionFilter::any().listener(listener));
            self.inbox.borrow_mut().retain(|child| child.serial != serial);
            return Err(err);
        }

        if let Some(attribute) = &info.attribute {
            self.attributes.bind(attribute, Rc::clone(&chip));
        }
        if info.include_in_child_context {
            self.child_chip_context
                .insert(id.clone(), ContextValue::Chip(Rc::clone(&chip)));
        }

        self.base
            .events()
            .dispatch(ChipEvent::ActivatedChildChip { id: id.clone() });
        self.reap();

        Ok(Some(ActiveChild { id, chip }))
    }

    /// Terminate a live child. Fails if `id` is not a registered child.
    pub fn terminate_child_chip(&mut self, id: &str, output_signal: Option<Signal>) -> Result<()> {
        self.reap();
        let chip = self
            .child(id)
            .ok_or_else(|| ChipError::UnknownChild(id.to_string()))?;

        if chip.borrow().state() != ChipState::Inactive {
            chip.borrow_mut().terminate(output_signal)?;
        }
        self.reap();

        // A child that ended without its event reaching us is dropped here.
        if let Some(entry) = self.children.get(id) {
            if same_chip(&entry.chip, &chip) {
                let signal = chip.borrow().output_signal().cloned().unwrap_or_default();
                self.remove_child(id, signal);
            }
        }
        Ok(())
    }

    /// A single slot about to be rebound terminates its current chip.
    fn release_attribute(&mut self, attribute: &str) -> Result<()> {
        let (name, is_list) = split_attribute(attribute);
        if is_list {
            return Ok(());
        }
        let existing = match self.attributes.get(name) {
            Some(AttributeSlot::Value(_)) => {
                return Err(ChipError::AttributeNotChip(name.to_string()))
            }
            Some(AttributeSlot::Chip(chip)) => Rc::clone(chip),
            Some(AttributeSlot::List(_)) | None => return Ok(()),
        };

        let owner = self
            .live()
            .find(|(_, entry)| same_chip(&entry.chip, &existing))
            .map(|(id, _)| id.clone());
        match owner {
            Some(id) => self.terminate_child_chip(&id, None),
            None => {
                self.attributes.remove(name);
                Ok(())
            }
        }
    }

    /// Drain the inbox of terminated children.
    pub(crate) fn reap(&mut self) {
        let reported: Vec<TerminatedChild> = self.inbox.borrow_mut().drain(..).collect();
        for child in reported {
            match self.children.get(&child.id) {
                Some(entry) if entry.serial == child.serial => {}
                _ => continue,
            }
            self.remove_child(&child.id, child.signal);
        }
    }

    fn remove_child(&mut self, id: &str, signal: Signal) {
        let Some(entry) = self.children.shift_remove(id) else {
            return;
        };
        if let Some(attribute) = &entry.attribute {
            self.attributes.unbind(attribute, &entry.chip);
        }
        if entry.in_context {
            self.child_chip_context.shift_remove(id);
        }
        self.base
            .unsubscribe(&SubscriptionFilter::any().listener(entry.listener));

        trace!(
            chip_type = self.base.chip_type(),
            child = %id,
            signal = %signal,
            "child chip terminated"
        );
        self.terminated_log.push((id.to_string(), signal.clone()));
        self.base.events().dispatch(ChipEvent::TerminatedChildChip {
            id: id.to_string(),
            signal,
        });
    }

    // ------------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------------

    fn live_chips(&self) -> Vec<ChipRef> {
        self.live().map(|(_, entry)| Rc::clone(&entry.chip)).collect()
    }

    /// Tick every active child once, in activation order.
    ///
    /// Children added during the pass wait for the next tick; children that
    /// end during the pass are skipped.
    pub(super) fn tick_children(&mut self, tick_info: TickInfo) -> Result<()> {
        for chip in self.live_chips() {
            if chip.borrow().state() == ChipState::Active {
                chip.borrow_mut().tick(tick_info)?;
            }
        }
        Ok(())
    }

    pub(super) fn pause_children(&mut self, tick_info: TickInfo) -> Result<()> {
        for chip in self.live_chips() {
            if chip.borrow().state() == ChipState::Active {
                chip.borrow_mut().pause(tick_info)?;
            }
        }
        Ok(())
    }

    pub(super) fn resume_children(&mut self, tick_info: TickInfo) -> Result<()> {
        for chip in self.live_chips() {
            if chip.borrow().state() == ChipState::Paused {
                chip.borrow_mut().resume(tick_info)?;
            }
        }
        Ok(())
    }

    /// Terminate every child still running. All children are visited even if
    /// one fails; the first error is returned.
    pub(super) fn terminate_children(&mut self) -> Result<()> {
        let mut first_error = None;
        for chip in self.live_chips() {
            if chip.borrow().state() == ChipState::Inactive {
                continue;
            }
            if let Err(err) = chip.borrow_mut().terminate(None) {
                first_error.get_or_insert(err);
            }
        }
        self.reap();

        let leftover: Vec<String> = self.children.keys().cloned().collect();
        for id in leftover {
            self.remove_child(&id, Signal::default());
        }
        self.inbox.borrow_mut().clear();

        first_error.map_or(Ok(()), Err)
    }

    pub(super) fn children_mementos(&self) -> Result<IndexMap<String, ReloadMemento>> {
        let mut mementos = IndexMap::new();
        for (id, entry) in self.live() {
            let chip = entry.chip.borrow();
            if chip.state() != ChipState::Inactive {
                mementos.insert(id.clone(), chip.make_reload_memento()?);
            }
        }
        Ok(mementos)
    }

    pub(super) fn release_subscriptions(&mut self) {
        self.base.release_subscriptions();
    }
}

impl std::fmt::Debug for CompositeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeCore")
            .field("base", &self.base)
            .field("children", &self.child_ids())
            .finish()
    }
}

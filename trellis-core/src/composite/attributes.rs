//! Attribute Slots
//!
//! A composite can bind a child to a named slot so that its own code can reach
//! the child without remembering the id. A slot holds one chip, a list of chips
//! (names ending in `[]`), or a plain value the composite stored itself.
//! Chip bindings are removed again when the child terminates.

use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::chip::ChipRef;

/// Marker that turns an attribute name into a list slot.
const LIST_SUFFIX: &str = "[]";

/// Split `name[]` into `("name", true)` and `name` into `("name", false)`.
pub(crate) fn split_attribute(attribute: &str) -> (&str, bool) {
    match attribute.strip_suffix(LIST_SUFFIX) {
        Some(name) => (name, true),
        None => (attribute, false),
    }
}

/// Identity comparison that ignores vtable pointers.
pub(crate) fn same_chip(a: &ChipRef, b: &ChipRef) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

#[derive(Clone)]
pub enum AttributeSlot {
    Chip(ChipRef),
    List(Vec<ChipRef>),
    Value(Value),
}

/// Named slots of a composite.
#[derive(Clone, Default)]
pub struct AttributeSlots {
    slots: IndexMap<String, AttributeSlot>,
}

impl AttributeSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&AttributeSlot> {
        self.slots.get(name)
    }

    /// The chip bound to a single slot.
    pub fn chip(&self, name: &str) -> Option<ChipRef> {
        match self.slots.get(name) {
            Some(AttributeSlot::Chip(chip)) => Some(Rc::clone(chip)),
            _ => None,
        }
    }

    /// The chips bound to a list slot, in activation order.
    pub fn list(&self, name: &str) -> &[ChipRef] {
        match self.slots.get(name) {
            Some(AttributeSlot::List(chips)) => chips,
            _ => &[],
        }
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.slots.get(name) {
            Some(AttributeSlot::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Store a plain value. Chips can no longer be bound under `name`.
    pub fn set_value(&mut self, name: impl Into<String>, value: Value) {
        self.slots.insert(name.into(), AttributeSlot::Value(value));
    }

    pub fn remove(&mut self, name: &str) -> Option<AttributeSlot> {
        self.slots.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn bind(&mut self, attribute: &str, chip: ChipRef) {
        let (name, is_list) = split_attribute(attribute);
        if !is_list {
            self.slots.insert(name.to_string(), AttributeSlot::Chip(chip));
            return;
        }
        match self.slots.get_mut(name) {
            Some(AttributeSlot::List(chips)) => chips.push(chip),
            _ => {
                self.slots
                    .insert(name.to_string(), AttributeSlot::List(vec![chip]));
            }
        }
    }

    /// Remove `chip` from the slot, if it is still bound there.
    pub(crate) fn unbind(&mut self, attribute: &str, chip: &ChipRef) {
        let (name, _) = split_attribute(attribute);
        match self.slots.get_mut(name) {
            Some(AttributeSlot::Chip(bound)) if same_chip(bound, chip) => {
                self.slots.shift_remove(name);
            }
            Some(AttributeSlot::List(chips)) => {
                chips.retain(|bound| !same_chip(bound, chip));
                if chips.is_empty() {
                    self.slots.shift_remove(name);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::{chip_ref, Leaf};
    use crate::leaf::Forever;

    #[test]
    fn list_suffix_is_stripped() {
        assert_eq!(split_attribute("enemies[]"), ("enemies", true));
        assert_eq!(split_attribute("player"), ("player", false));
    }

    #[test]
    fn single_slot_binding() {
        let mut slots = AttributeSlots::new();
        let first = chip_ref(Leaf::new(Forever));
        let second = chip_ref(Leaf::new(Forever));

        slots.bind("player", Rc::clone(&first));
        slots.bind("player", Rc::clone(&second));
        assert!(slots.chip("player").is_some_and(|c| same_chip(&c, &second)));

        // A stale unbind leaves the newer binding alone.
        slots.unbind("player", &first);
        assert!(slots.contains("player"));
        slots.unbind("player", &second);
        assert!(!slots.contains("player"));
    }

    #[test]
    fn list_slot_appends_and_removes() {
        let mut slots = AttributeSlots::new();
        let a = chip_ref(Leaf::new(Forever));
        let b = chip_ref(Leaf::new(Forever));

        slots.bind("enemies[]", Rc::clone(&a));
        slots.bind("enemies[]", Rc::clone(&b));
        assert_eq!(slots.list("enemies").len(), 2);

        slots.unbind("enemies[]", &a);
        assert_eq!(slots.list("enemies").len(), 1);
        assert!(same_chip(&slots.list("enemies")[0], &b));
    }

    #[test]
    fn values_are_not_chips() {
        let mut slots = AttributeSlots::new();
        slots.set_value("score", serde_json::json!(10));
        assert!(slots.chip("score").is_none());
        assert_eq!(slots.value("score"), Some(&serde_json::json!(10)));
    }
}

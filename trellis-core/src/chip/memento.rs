//! Reload Mementos
//!
//! A reload memento is a snapshot of a running chip tree taken just before a
//! code hot-swap, and handed back to `activate()` right after it. Each chip
//! contributes its own data, and composites collect the mementos of their
//! children keyed by child id.
//!
//! A memento is only consumed by a chip of the same type: the `class_name`
//! must equal the chip's type tag. Anything else is ignored and the chip
//! starts fresh. Mementos are not a persistence format across restarts.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MementoError;

/// Data a chip saves about itself.
pub type MementoData = IndexMap<String, Value>;

/// Snapshot of a chip and, recursively, its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadMemento {
    pub class_name: String,
    #[serde(default)]
    pub data: MementoData,
    #[serde(default)]
    pub children: IndexMap<String, ReloadMemento>,
}

impl ReloadMemento {
    /// Create a memento with no data and no children.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            data: MementoData::new(),
            children: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: MementoData) -> Self {
        self.data = data;
        self
    }

    #[must_use]
    pub fn with_child(mut self, id: impl Into<String>, child: ReloadMemento) -> Self {
        self.children.insert(id.into(), child);
        self
    }

    /// Whether this memento was produced by a chip of type `chip_type`.
    pub fn is_for(&self, chip_type: &str) -> bool {
        self.class_name == chip_type
    }

    /// The memento of the child registered under `id`.
    pub fn child(&self, id: &str) -> Option<&ReloadMemento> {
        self.children.get(id)
    }

    /// Read one data field.
    ///
    /// Returns `Ok(None)` when the field is absent.
    pub fn field<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, MementoError> {
        self.data
            .get(key)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(MementoError::from)
    }

    /// Encode as JSON.
    pub fn to_json(&self) -> Result<String, MementoError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON.
    pub fn from_json(json: &str) -> Result<Self, MementoError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode as MessagePack.
    pub fn to_msgpack(&self) -> Result<Vec<u8>, MementoError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Decode from MessagePack.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, MementoError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

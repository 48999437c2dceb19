/// Property-level state store for dynamically overridable widget attributes
///
/// Keyed by widget id, holding per-property JSON values (e.g. enabled,
/// visible, class). Reads of never-set properties return `None`, distinct
/// from an explicitly stored `null` or `false`.
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-widget key/value override store
#[derive(Debug, Default)]
pub struct StateStore {
    /// Map: widget_id -> property -> value
    entries: Arc<RwLock<HashMap<String, Map<String, Value>>>>,
}

impl StateStore {
    /// Create an empty state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one property for a widget
    pub fn set(&self, widget_id: &str, property: &str, value: Value) {
        let mut entries = self.entries.write();
        entries
            .entry(widget_id.to_string())
            .or_default()
            .insert(property.to_string(), value);
    }

    /// Set a property only if it has never been set for this widget
    ///
    /// Used for default seeding on first registration; redeploys never
    /// overwrite client-driven overrides.
    pub fn set_if_absent(&self, widget_id: &str, property: &str, value: Value) {
        let mut entries = self.entries.write();
        entries
            .entry(widget_id.to_string())
            .or_default()
            .entry(property.to_string())
            .or_insert(value);
    }

    /// Read one property; `None` means never set
    pub fn get(&self, widget_id: &str, property: &str) -> Option<Value> {
        let entries = self.entries.read();
        entries
            .get(widget_id)
            .and_then(|props| props.get(property))
            .cloned()
    }

    /// All stored properties for a widget
    pub fn all(&self, widget_id: &str) -> Map<String, Value> {
        let entries = self.entries.read();
        entries.get(widget_id).cloned().unwrap_or_default()
    }

    /// Merge stored overrides for `widget_id` into `target`, with the
    /// store winning on conflicting keys
    pub fn merge_into(&self, widget_id: &str, target: &mut Map<String, Value>) {
        let entries = self.entries.read();
        if let Some(props) = entries.get(widget_id) {
            for (key, value) in props {
                target.insert(key.clone(), value.clone());
            }
        }
    }

    /// Drop all state for a widget
    pub fn remove(&self, widget_id: &str) {
        self.entries.write().remove(widget_id);
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

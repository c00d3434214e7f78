//! Per-entity property store.
//!
//! A named attribute bag of JSON values. Signal routing (properties that
//! write through to typed slots such as `Location::bbox`) lives on the
//! entity, which knows which slots exist; the store itself is plain data.

use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct PropertyStore {
    attrs: serde_json::Map<String, Value>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a property. Returns true when the stored value changed.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        match self.attrs.get(name) {
            Some(existing) if *existing == value => false,
            _ => {
                self.attrs.insert(name.to_string(), value);
                true
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.attrs.get(name).and_then(|v| v.as_f64())
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(|v| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Copy every property into an argument record.
    pub fn add_to_message(&self, map: &mut serde_json::Map<String, Value>) {
        for (k, v) in &self.attrs {
            map.insert(k.clone(), v.clone());
        }
    }
}

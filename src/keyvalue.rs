//! Reduction of the record event stream into ordered key-value pairs.
//!
//! [`KeyValueReducer`] listens to a record producer and emits one
//! `(FieldList, value)` pair per logical field group, in encounter order,
//! bracketed by `begin`/`end` calls per record. Record-level facts travel
//! through the same channel as synthetic pairs: `FORMAT`, `TYPE`, and
//! `LEADER`.
//!
//! Two normalizations happen here, deliberately, so every downstream
//! consumer sees uniform keys:
//!
//! - a data field carrying inline data with no subfields gets an implicit
//!   subfield `a` holding that data;
//! - an optional [`StringTransformer`] is applied to every subfield and
//!   control-field value before the pair is finalized.
//!
//! Null keys are discarded. Null values are passed through — absence of
//! data is meaningful to presence-only entities.

use crate::field::{Field, FieldList};
use crate::listener::MarcStreamListener;
use crate::transform::StringTransformer;

/// Receiver for the reduced key-value stream.
pub trait KeyValueListener {
    /// A record's pair sequence begins.
    fn begin(&mut self) {}

    /// One key-value pair, in emission order.
    fn key_value(&mut self, key: &FieldList, value: Option<&str>);

    /// The record's pair sequence ends.
    fn end(&mut self) {}
}

/// Reduces record events to ordered key-value pairs and fans them out to
/// registered listeners.
pub struct KeyValueReducer {
    current: FieldList,
    transformer: Option<Box<dyn StringTransformer>>,
    listeners: Vec<Box<dyn KeyValueListener>>,
}

impl std::fmt::Debug for KeyValueReducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueReducer")
            .field("listeners", &self.listeners.len())
            .field("transformer", &self.transformer.is_some())
            .finish()
    }
}

impl Default for KeyValueReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueReducer {
    /// Create a reducer with no listeners and no transform.
    #[must_use]
    pub fn new() -> Self {
        KeyValueReducer {
            current: FieldList::new(),
            transformer: None,
            listeners: Vec::new(),
        }
    }

    /// Register a listener. Listeners are notified in registration order.
    #[must_use]
    pub fn add_listener(mut self, listener: Box<dyn KeyValueListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Set the transform applied to values before finalization.
    #[must_use]
    pub fn with_transformer(mut self, transformer: Box<dyn StringTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    fn apply_transform(&self, value: Option<&str>) -> Option<String> {
        match (&self.transformer, value) {
            (Some(t), Some(v)) => Some(t.transform(v)),
            (None, Some(v)) => Some(v.to_string()),
            _ => None,
        }
    }

    fn emit(&mut self, key: &FieldList, value: Option<&str>) {
        // null keys are not passed to the listeners
        if key.is_empty() {
            return;
        }
        for listener in &mut self.listeners {
            listener.key_value(key, value);
        }
    }

    fn emit_singleton(&mut self, key: FieldList, value: Option<&str>) {
        self.emit(&key, value);
    }
}

impl MarcStreamListener for KeyValueReducer {
    fn begin_record(&mut self, format: Option<&str>, record_type: Option<&str>) {
        for listener in &mut self.listeners {
            listener.begin();
        }
        if let Some(format) = format {
            self.emit_singleton(FieldList::format_key(), Some(format));
        }
        if let Some(record_type) = record_type {
            self.emit_singleton(FieldList::type_key(), Some(record_type));
        }
    }

    fn leader(&mut self, label: &str) {
        self.emit_singleton(FieldList::leader_key(), Some(label));
    }

    fn begin_control_field(&mut self, field: &Field) {
        self.current = FieldList::new();
        self.current.push(field.clone());
    }

    fn end_control_field(&mut self, field: &Field) {
        let value = self.apply_transform(field.data());
        let key = std::mem::take(&mut self.current);
        self.emit(&key, value.as_deref());
    }

    fn begin_data_field(&mut self, field: &Field) {
        self.current = FieldList::new();
        self.current.push(field.clone());
    }

    fn end_data_field(&mut self, field: Option<&Field>) {
        let inline = field.and_then(Field::data);
        let value = self.apply_transform(inline);
        let mut key = std::mem::take(&mut self.current);
        // inline data with no subfields: synthesize the implicit subfield so
        // lookup always sees a subfield-bearing key
        if key.len() == 1 {
            if let (Some(designator), Some(data)) = (key.first().cloned(), value.clone()) {
                key.push(Field::subfield(&designator, "a", Some(data)));
            }
        }
        self.emit(&key, value.as_deref());
    }

    fn end_subfield(&mut self, field: &Field) {
        let mut subfield = field.clone();
        if let Some(data) = self.apply_transform(subfield.data()) {
            subfield.set_data(Some(data));
        }
        self.current.push(subfield);
    }

    fn end_record(&mut self) {
        for listener in &mut self.listeners {
            listener.end();
        }
    }
}

/// Collects the reduced stream. Used in tests and diagnostics.
#[derive(Debug, Default)]
pub struct CollectingKeyValueListener {
    /// Completed records: each is the ordered pair list of one record.
    pub records: Vec<Vec<(FieldList, Option<String>)>>,
    current: Vec<(FieldList, Option<String>)>,
}

impl KeyValueListener for CollectingKeyValueListener {
    fn begin(&mut self) {
        self.current.clear();
    }

    fn key_value(&mut self, key: &FieldList, value: Option<&str>) {
        self.current
            .push((key.clone(), value.map(ToString::to_string)));
    }

    fn end(&mut self) {
        self.records.push(std::mem::take(&mut self.current));
    }
}

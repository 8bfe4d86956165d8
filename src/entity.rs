//! Entity handlers and the default resource placement rule.
//!
//! An [`EntityHandler`] is a stateless unit bound to one or more key
//! patterns by the specification. At dispatch it receives the matched key
//! and value together with a [`BuildContext`] over the current record's
//! state. Per-entity configuration travels in the settings map taken from
//! the specification entry — handlers hold no mutable fields of their own,
//! so one handler value serves every worker concurrently.
//!
//! Handlers are resolved by name through an [`EntityRegistry`] built at
//! startup; an unknown name fails specification loading, not the first
//! record that happens to hit it.

use crate::error::Result;
use crate::field::FieldList;
use crate::resource::Resource;
use crate::state::EntityBuilderState;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-entity configuration from the specification.
pub type Settings = serde_json::Map<String, Value>;

/// What the worker should do after a handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The handler placed everything itself; skip default placement.
    Done,
    /// Apply the default placement rule afterwards.
    Continue,
}

/// Dispatch context: the record state plus the matched entry's settings.
#[derive(Debug)]
pub struct BuildContext<'a> {
    /// The per-record builder state, exclusively owned by this worker.
    pub state: &'a mut EntityBuilderState,
    /// Settings of the matched specification entry.
    pub settings: &'a Settings,
    /// Name under which the handler was registered.
    pub handler_name: &'a str,
}

/// A unit of mapping logic bound to key patterns by the specification.
pub trait EntityHandler: Send + Sync {
    /// Process one matched key-value pair.
    ///
    /// Returning [`Dispatch::Continue`] asks the worker to run the default
    /// placement rule for this pair; [`Dispatch::Done`] suppresses it.
    ///
    /// # Errors
    ///
    /// A handler error aborts the current record only; the worker logs it
    /// and moves on to the next job.
    fn fields(
        &self,
        ctx: &mut BuildContext<'_>,
        key: &FieldList,
        value: Option<&str>,
    ) -> Result<Dispatch>;
}

/// Startup-built map from handler name to handler value.
#[derive(Clone, Default)]
pub struct EntityRegistry {
    handlers: HashMap<String, Arc<dyn EntityHandler>>,
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl EntityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        EntityRegistry::default()
    }

    /// Register a handler under a name, replacing any previous binding.
    #[must_use]
    pub fn register(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn EntityHandler>,
    ) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    /// Look up a handler by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn EntityHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered handler names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

/// Default placement of a matched field group onto a resource.
///
/// Opens one nested resource on `target` and writes each subfield with a
/// configured property name onto it. Driven entirely by settings:
///
/// - `subfields` — object mapping subfield code to either a property name
///   (string) or `{ "property": name, "codes": { value: decoded } }` for
///   coded values; codes missing from the table fall back to the raw value.
///   Without a `subfields` object nothing is placed.
/// - `_predicate` — predicate for the nested resource; defaults to the
///   handler name.
/// - `tags` — object mapping a field tag to a predicate override.
/// - `indicators` — object mapping a field tag to an object mapping the
///   indicator characters to a predicate override.
pub fn place_by_default(
    target: &mut Resource,
    key: &FieldList,
    handler_name: &str,
    settings: &Settings,
) {
    let Some(Value::Object(subfields)) = settings.get("subfields") else {
        return;
    };
    let mut predicate = settings
        .get("_predicate")
        .and_then(Value::as_str)
        .unwrap_or(handler_name)
        .to_string();
    // tag- and indicator-based predicate overrides, first match wins
    'outer: for field in key {
        if let Some(Value::Object(tags)) = settings.get("tags") {
            if let Some(Value::String(name)) = tags.get(field.tag()) {
                predicate = name.clone();
                break;
            }
        }
        if let Some(Value::Object(indicators)) = settings.get("indicators") {
            if let Some(Value::Object(by_indicator)) = indicators.get(field.tag()) {
                if let Some(ind) = field.indicator() {
                    if let Some(Value::String(name)) = by_indicator.get(ind) {
                        predicate = name.clone();
                        break 'outer;
                    }
                }
            }
        }
    }
    let mut nested = Resource::new();
    for field in key {
        let (Some(code), Some(data)) = (field.subfield_id(), field.data()) else {
            continue;
        };
        if data.is_empty() {
            continue;
        }
        match subfields.get(code) {
            Some(Value::String(property)) => nested.add_literal(property, data),
            Some(Value::Object(spec)) => {
                let property = spec
                    .get("property")
                    .and_then(Value::as_str)
                    .unwrap_or(code);
                let decoded = spec
                    .get("codes")
                    .and_then(Value::as_object)
                    .and_then(|codes| codes.get(data))
                    .and_then(Value::as_str)
                    .unwrap_or(data);
                nested.add_literal(property, decoded);
            }
            _ => {}
        }
    }
    // attach only if a configured subfield actually matched
    if !nested.is_empty() {
        *target.new_resource(&predicate) = nested;
    }
}

/// Copy a field group verbatim onto a resource: predicate is the tag,
/// properties are the subfield codes. Used for unmapped keys when the queue
/// is configured to keep them.
pub fn place_verbatim(target: &mut Resource, key: &FieldList) {
    let Some(first) = key.first() else {
        return;
    };
    let tag = first.tag().to_string();
    if first.is_control_field() {
        if let Some(data) = first.data() {
            target.add_literal(tag, data);
        }
        return;
    }
    let nested = target.new_resource(&tag);
    for field in key {
        if let (Some(code), Some(data)) = (field.subfield_id(), field.data()) {
            nested.add_literal(code, data);
        }
    }
}

//! Specification: the loaded rule table mapping field keys to entity
//! handlers.
//!
//! A specification is built once at startup from a declarative JSON table
//! and is immutable afterwards — it is shared read-only across all workers.
//! Each top-level key names a registered handler; its `values` array lists
//! the key patterns bound to that handler, and every other member of the
//! object travels to the handler as its settings map:
//!
//! ```json
//! {
//!   "_periodic": [ {"base": 100, "period": 4, "count": 25} ],
//!   "Title":  { "values": ["245$1$0$abc", "246"], "subfields": {"a": "title"} },
//!   "Person": { "values": ["100"], "_predicate": "creator" }
//! }
//! ```
//!
//! Patterns use the same `$`-grouped syntax as derived field keys: `tag`,
//! `tag$i1$i2`, or `tag$i1$i2$subfields`. Subfield groups are sorted at load
//! so `245$1$0$ba` and `245$1$0$ab` are the same pattern. Lookup precedence,
//! most to least specific: exact tag+indicator+subfield-set, then
//! tag+indicator, then tag only.
//!
//! Three-digit tags belonging to a declared periodic family are expanded at
//! load into the family's concrete tags, all bound to the same entry.

use crate::entity::{EntityHandler, EntityRegistry, Settings};
use crate::error::{MarcMapError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A periodic tag family: `count` tags starting at `base`, spaced `period`
/// apart.
///
/// The optional `offset` lets a family claim a range on behalf of another
/// base: with `(base 950, period 5, count 10, offset -50)` a rule naming tag
/// 900 also binds 950, 955, … 995 — the documented "950-999 extends
/// 900-949" case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Periodic {
    /// First tag of the family range.
    pub base: u32,
    /// Distance between consecutive member tags.
    pub period: u32,
    /// Number of member tags.
    pub count: u32,
    /// Shift applied to a rule tag before testing family membership.
    #[serde(default)]
    pub offset: i32,
}

impl Periodic {
    /// A family without offset.
    #[must_use]
    pub fn new(base: u32, period: u32, count: u32) -> Self {
        Periodic {
            base,
            period,
            count,
            offset: 0,
        }
    }

    /// A family claiming a shifted range.
    #[must_use]
    pub fn with_offset(base: u32, period: u32, count: u32, offset: i32) -> Self {
        Periodic {
            base,
            period,
            count,
            offset,
        }
    }

    fn range_end(&self) -> i64 {
        i64::from(self.base) + i64::from(self.period) * i64::from(self.count)
    }

    /// True if a rule naming `tag` falls into this family.
    #[must_use]
    pub fn in_period(&self, tag: u32) -> bool {
        let shifted = i64::from(tag) - i64::from(self.offset);
        shifted >= i64::from(self.base) && shifted < self.range_end()
    }

    /// The concrete tags a rule naming `tag` expands to.
    #[must_use]
    pub fn span(&self, tag: u32) -> Vec<u32> {
        let mut tags = Vec::new();
        let mut current = i64::from(tag) - i64::from(self.offset);
        while current < self.range_end() {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            tags.push(current as u32);
            current += i64::from(self.period);
        }
        tags
    }
}

/// One rule: the resolved handler plus its settings.
pub struct SpecEntry {
    /// Name under which the handler is registered.
    pub handler_name: String,
    /// The resolved handler value, shared across workers.
    pub handler: Arc<dyn EntityHandler>,
    /// Settings passed to the handler at dispatch.
    pub settings: Settings,
}

impl std::fmt::Debug for SpecEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecEntry")
            .field("handler_name", &self.handler_name)
            .field("settings", &self.settings.len())
            .finish()
    }
}

/// Immutable rule table, shared read-only by all workers.
#[derive(Debug, Default)]
pub struct Specification {
    exact: HashMap<String, Arc<SpecEntry>>,
    tag_indicator: HashMap<String, Arc<SpecEntry>>,
    tag: HashMap<String, Arc<SpecEntry>>,
}

impl Specification {
    /// Start building a specification against a handler registry.
    #[must_use]
    pub fn builder(registry: EntityRegistry) -> SpecificationBuilder {
        SpecificationBuilder {
            registry,
            periodics: Vec::new(),
            spec: Specification::default(),
        }
    }

    /// Look up the best-matching entry for a derived field key.
    ///
    /// Precedence: exact tag+indicator+subfield-set, then tag+indicator,
    /// then tag only. Returns `None` for unmapped keys.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<&Arc<SpecEntry>> {
        if let Some(entry) = self.exact.get(key) {
            return Some(entry);
        }
        // a key without a subfield group may itself be in tag+indicator form
        if let Some(entry) = self.tag_indicator.get(key) {
            return Some(entry);
        }
        // strip the subfield group, if the key carries one
        if let Some(pos) = key.rfind('$') {
            if let Some(entry) = self.tag_indicator.get(&key[..pos]) {
                return Some(entry);
            }
        }
        let tag = key.split('$').next().unwrap_or(key);
        self.tag.get(tag)
    }

    /// Number of concrete patterns loaded, including periodic expansions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.exact.len() + self.tag_indicator.len() + self.tag.len()
    }

    /// True if no pattern is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&mut self, pattern: &str, entry: &Arc<SpecEntry>) {
        let groups: Vec<&str> = pattern.split('$').collect();
        match groups.len() {
            1 => {
                self.tag.insert(pattern.to_string(), entry.clone());
            }
            2 | 3 if groups.last() == Some(&"") => {
                // trailing "$": tag+indicator form with empty last group
                self.tag_indicator
                    .insert(pattern.trim_end_matches('$').to_string(), entry.clone());
            }
            2 | 3 => {
                self.tag_indicator.insert(pattern.to_string(), entry.clone());
            }
            _ => {
                // four or more groups always contain a separator
                if let Some((head, subs)) = pattern.rsplit_once('$') {
                    let mut chars: Vec<char> = subs.chars().collect();
                    chars.sort_unstable();
                    chars.dedup();
                    let mut normalized = head.to_string();
                    normalized.push('$');
                    normalized.extend(chars);
                    self.exact.insert(normalized, entry.clone());
                }
            }
        }
    }
}

/// Builds a [`Specification`] from JSON tables and programmatic entries.
#[derive(Debug)]
pub struct SpecificationBuilder {
    registry: EntityRegistry,
    periodics: Vec<Periodic>,
    spec: Specification,
}

impl SpecificationBuilder {
    /// Declare a periodic family. Families apply to patterns loaded after
    /// this call.
    #[must_use]
    pub fn periodic(mut self, periodic: Periodic) -> Self {
        self.periodics.push(periodic);
        self
    }

    /// Bind one pattern to a registered handler with settings.
    ///
    /// # Errors
    ///
    /// Returns [`MarcMapError::UnknownHandler`] if the name is not
    /// registered.
    pub fn entry(mut self, pattern: &str, handler_name: &str, settings: Settings) -> Result<Self> {
        let handler = self
            .registry
            .get(handler_name)
            .ok_or_else(|| MarcMapError::UnknownHandler(handler_name.to_string()))?;
        let entry = Arc::new(SpecEntry {
            handler_name: handler_name.to_string(),
            handler,
            settings,
        });
        self.add_expanded(pattern, &entry);
        Ok(self)
    }

    /// Load a JSON specification table.
    ///
    /// # Errors
    ///
    /// Returns [`MarcMapError::InvalidSpecification`] on malformed JSON and
    /// [`MarcMapError::UnknownHandler`] for names missing from the registry.
    pub fn load_json(mut self, json: &str) -> Result<Self> {
        let table: serde_json::Map<String, Value> = serde_json::from_str(json)
            .map_err(|e| MarcMapError::InvalidSpecification(e.to_string()))?;
        if let Some(periodics) = table.get("_periodic") {
            let families: Vec<Periodic> = serde_json::from_value(periodics.clone())
                .map_err(|e| MarcMapError::InvalidSpecification(format!("_periodic: {e}")))?;
            self.periodics.extend(families);
        }
        for (handler_name, definition) in &table {
            if handler_name == "_periodic" {
                continue;
            }
            let Value::Object(definition) = definition else {
                return Err(MarcMapError::InvalidSpecification(format!(
                    "definition of '{handler_name}' is not an object"
                )));
            };
            let Some(Value::Array(values)) = definition.get("values") else {
                return Err(MarcMapError::InvalidSpecification(format!(
                    "'{handler_name}' has no values array"
                )));
            };
            let mut settings = definition.clone();
            settings.remove("values");
            let mut patterns = Vec::with_capacity(values.len());
            for value in values {
                let Value::String(pattern) = value else {
                    return Err(MarcMapError::InvalidSpecification(format!(
                        "non-string pattern under '{handler_name}'"
                    )));
                };
                patterns.push(pattern.clone());
            }
            for pattern in patterns {
                self = self.entry(&pattern, handler_name, settings.clone())?;
            }
        }
        Ok(self)
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> Arc<Specification> {
        log::info!(
            "specification initialized with {} patterns",
            self.spec.len()
        );
        Arc::new(self.spec)
    }

    /// Expand a pattern through the periodic families and insert every
    /// concrete form.
    fn add_expanded(&mut self, pattern: &str, entry: &Arc<SpecEntry>) {
        let (tag_part, suffix) = match pattern.split_once('$') {
            Some((tag, rest)) => (tag, Some(rest)),
            None => (pattern, None),
        };
        let numeric_tag = if tag_part.len() == 3 {
            tag_part.parse::<u32>().ok()
        } else {
            None
        };
        let mut expanded = false;
        if let Some(tag) = numeric_tag {
            for periodic in &self.periodics {
                if periodic.in_period(tag) {
                    expanded = true;
                    for concrete in periodic.span(tag) {
                        let concrete_pattern = match suffix {
                            Some(suffix) => format!("{concrete:03}${suffix}"),
                            None => format!("{concrete:03}"),
                        };
                        self.spec.insert(&concrete_pattern, entry);
                    }
                }
            }
        }
        if !expanded {
            self.spec.insert(pattern, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{BuildContext, Dispatch};
    use crate::field::FieldList;

    struct Nop;
    impl EntityHandler for Nop {
        fn fields(
            &self,
            _ctx: &mut BuildContext<'_>,
            _key: &FieldList,
            _value: Option<&str>,
        ) -> Result<Dispatch> {
            Ok(Dispatch::Continue)
        }
    }

    fn registry() -> EntityRegistry {
        EntityRegistry::new()
            .register("Title", Arc::new(Nop))
            .register("Person", Arc::new(Nop))
    }

    #[test]
    fn test_lookup_precedence() {
        let spec = Specification::builder(registry())
            .entry("245$1$0$ab", "Title", Settings::new())
            .unwrap()
            .entry("245$1$0", "Person", Settings::new())
            .unwrap()
            .entry("245", "Person", Settings::new())
            .unwrap()
            .build();
        assert_eq!(spec.lookup("245$1$0$ab").unwrap().handler_name, "Title");
        assert_eq!(spec.lookup("245$1$0$xy").unwrap().handler_name, "Person");
        assert_eq!(spec.lookup("245$2$2$xy").unwrap().handler_name, "Person");
    }

    #[test]
    fn test_subfield_set_order_insensitive() {
        let spec = Specification::builder(registry())
            .entry("245$1$0$ba", "Title", Settings::new())
            .unwrap()
            .build();
        assert!(spec.lookup("245$1$0$ab").is_some());
    }

    #[test]
    fn test_unmapped_key_returns_none() {
        let spec = Specification::builder(registry()).build();
        assert!(spec.lookup("999$ $ $a").is_none());
    }

    #[test]
    fn test_unknown_handler_fails_at_load() {
        let result = Specification::builder(registry()).entry(
            "100",
            "NoSuchHandler",
            Settings::new(),
        );
        assert!(matches!(result, Err(MarcMapError::UnknownHandler(_))));
    }

    #[test]
    fn test_periodic_expansion() {
        let spec = Specification::builder(registry())
            .periodic(Periodic::new(100, 4, 25))
            .entry("100", "Person", Settings::new())
            .unwrap()
            .build();
        assert!(spec.lookup("100").is_some());
        assert!(spec.lookup("104").is_some());
        assert!(spec.lookup("196").is_some());
        assert!(spec.lookup("200").is_none());
        // intermediate tags off the period are not claimed
        assert!(spec.lookup("101").is_none());
    }

    #[test]
    fn test_periodic_expansion_keeps_suffix() {
        let spec = Specification::builder(registry())
            .periodic(Periodic::new(100, 4, 25))
            .entry("100$1$ $a", "Person", Settings::new())
            .unwrap()
            .build();
        assert!(spec.lookup("104$1$ $a").is_some());
        assert!(spec.lookup("104$2$ $a").is_none());
    }

    #[test]
    fn test_periodic_offset_claims_disjoint_range() {
        let spec = Specification::builder(registry())
            .periodic(Periodic::new(900, 5, 10))
            .periodic(Periodic::with_offset(950, 5, 10, -50))
            .entry("900", "Person", Settings::new())
            .unwrap()
            .build();
        // the base family
        assert!(spec.lookup("900").is_some());
        assert!(spec.lookup("945").is_some());
        // the shifted family claimed on behalf of 900
        assert!(spec.lookup("950").is_some());
        assert!(spec.lookup("995").is_some());
        assert!(spec.lookup("905").is_some());
        assert!(spec.lookup("899").is_none());
    }

    #[test]
    fn test_load_json() {
        let json = r#"{
            "_periodic": [ {"base": 100, "period": 4, "count": 25} ],
            "Title": {
                "values": ["245$1$0$abc", "246"],
                "subfields": {"a": "title", "b": "remainder", "c": "statement"}
            },
            "Person": { "values": ["100"], "_predicate": "creator" }
        }"#;
        let spec = Specification::builder(registry())
            .load_json(json)
            .unwrap()
            .build();
        let entry = spec.lookup("245$1$0$abc").unwrap();
        assert_eq!(entry.handler_name, "Title");
        assert!(entry.settings.contains_key("subfields"));
        assert!(!entry.settings.contains_key("values"));
        assert_eq!(spec.lookup("246").unwrap().handler_name, "Title");
        // periodic family applied to the Person rule
        assert_eq!(spec.lookup("196").unwrap().handler_name, "Person");
    }

    #[test]
    fn test_load_json_unknown_handler() {
        let json = r#"{ "Ghost": { "values": ["001"] } }"#;
        let result = Specification::builder(registry()).load_json(json);
        assert!(matches!(result, Err(MarcMapError::UnknownHandler(_))));
    }

    #[test]
    fn test_load_json_malformed() {
        let result = Specification::builder(registry()).load_json("not json");
        assert!(matches!(
            result,
            Err(MarcMapError::InvalidSpecification(_))
        ));
    }
}

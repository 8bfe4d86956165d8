//! In-memory resource graph built per record.
//!
//! A [`Resource`] is a node with an optional identifier and an ordered map
//! from predicate names to values: literals or nested resources. For the
//! duration of one record's construction the nodes form a tree — entity
//! handlers open nested resources and write literals onto them, and the
//! completed root is handed to the sink after the record's identifier is
//! assigned.
//!
//! Insertion order of predicates and of values under a predicate is
//! preserved, which keeps repeated fields (multiple subjects, multiple
//! holdings items) in catalog order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One value under a predicate: a literal or a nested resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    /// A literal string value.
    Literal(String),
    /// An embedded (blank) resource.
    Embedded(Resource),
}

impl Node {
    /// The literal value, if this node is one.
    #[must_use]
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Node::Literal(value) => Some(value),
            Node::Embedded(_) => None,
        }
    }

    /// The embedded resource, if this node is one.
    #[must_use]
    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            Node::Literal(_) => None,
            Node::Embedded(resource) => Some(resource),
        }
    }
}

/// A graph node: identifier plus ordered predicate → values map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    id: Option<String>,
    properties: IndexMap<String, Vec<Node>>,
}

impl Resource {
    /// Create an empty blank resource.
    #[must_use]
    pub fn new() -> Self {
        Resource::default()
    }

    /// The resource identifier, unset until assigned at completion.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Assign the resource identifier.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// True if no identifier has been assigned yet.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.id.is_none()
    }

    /// Append a literal value under a predicate.
    pub fn add_literal(&mut self, predicate: impl Into<String>, value: impl Into<String>) {
        self.properties
            .entry(predicate.into())
            .or_default()
            .push(Node::Literal(value.into()));
    }

    /// Open a nested resource under a predicate and return it for mutation.
    pub fn new_resource(&mut self, predicate: impl Into<String>) -> &mut Resource {
        let nodes = self.properties.entry(predicate.into()).or_default();
        nodes.push(Node::Embedded(Resource::new()));
        match nodes.last_mut() {
            Some(Node::Embedded(resource)) => resource,
            _ => unreachable!("just pushed an embedded node"),
        }
    }

    /// All values under a predicate, in insertion order.
    #[must_use]
    pub fn values(&self, predicate: &str) -> Option<&[Node]> {
        self.properties.get(predicate).map(Vec::as_slice)
    }

    /// First literal under a predicate.
    #[must_use]
    pub fn literal(&self, predicate: &str) -> Option<&str> {
        self.properties
            .get(predicate)?
            .iter()
            .find_map(Node::as_literal)
    }

    /// Embedded resources under a predicate, in insertion order.
    pub fn resources(&self, predicate: &str) -> impl Iterator<Item = &Resource> {
        self.properties
            .get(predicate)
            .into_iter()
            .flatten()
            .filter_map(Node::as_resource)
    }

    /// Last embedded resource under a predicate, for continued mutation.
    pub fn last_resource_mut(&mut self, predicate: &str) -> Option<&mut Resource> {
        self.properties
            .get_mut(predicate)?
            .iter_mut()
            .rev()
            .find_map(|node| match node {
                Node::Embedded(resource) => Some(resource),
                Node::Literal(_) => None,
            })
    }

    /// Iterate over predicates in insertion order.
    pub fn predicates(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Number of predicates on this node.
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// True if the node carries no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals_preserve_order() {
        let mut resource = Resource::new();
        resource.add_literal("subject", "history");
        resource.add_literal("subject", "maps");
        let values: Vec<_> = resource
            .values("subject")
            .unwrap()
            .iter()
            .filter_map(Node::as_literal)
            .collect();
        assert_eq!(values, vec!["history", "maps"]);
    }

    #[test]
    fn test_nested_resource() {
        let mut resource = Resource::new();
        {
            let person = resource.new_resource("creator");
            person.add_literal("name", "Melville, Herman");
            person.add_literal("date", "1819-1891");
        }
        let person = resource.resources("creator").next().unwrap();
        assert_eq!(person.literal("name"), Some("Melville, Herman"));
        assert!(person.is_blank());
    }

    #[test]
    fn test_id_assignment() {
        let mut resource = Resource::new();
        assert!(resource.is_blank());
        resource.set_id("(DE-600)123456");
        assert_eq!(resource.id(), Some("(DE-600)123456"));
        assert!(!resource.is_blank());
    }

    #[test]
    fn test_predicate_order_preserved() {
        let mut resource = Resource::new();
        resource.add_literal("z-last", "1");
        resource.add_literal("a-first", "2");
        let predicates: Vec<_> = resource.predicates().collect();
        assert_eq!(predicates, vec!["z-last", "a-first"]);
    }

    #[test]
    fn test_last_resource_mut_continues_mutation() {
        let mut resource = Resource::new();
        resource.new_resource("item").add_literal("status", "lent");
        resource
            .last_resource_mut("item")
            .unwrap()
            .add_literal("shelfmark", "QA76");
        let item = resource.resources("item").next().unwrap();
        assert_eq!(item.literal("status"), Some("lent"));
        assert_eq!(item.literal("shelfmark"), Some("QA76"));
    }

    #[test]
    fn test_structural_equality() {
        let build = || {
            let mut r = Resource::new();
            r.add_literal("title", "Moby Dick");
            r.new_resource("creator").add_literal("name", "Melville");
            r
        };
        assert_eq!(build(), build());
    }
}

//! Field and field-list structures for decoded records.
//!
//! A [`Field`] is one structural unit of an ISO 2709 record: a control field,
//! a data field designator, or a single subfield. A [`FieldList`] groups one
//! logical field (control field, or data field plus its subfields) in
//! encounter order and derives the canonical lookup **key** used by the
//! specification engine.
//!
//! Key syntax: `tag`, then one `$`-group per indicator position, then a
//! `$`-group holding the sorted subfield identifiers. A 245 field with
//! indicators `1` `0` and subfields `c`, `a` derives `245$1$0$ac` — subfield
//! order never changes the key, while the list itself preserves it.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Tag assigned to fields whose directory tag failed validation.
pub const ERROR_TAG: &str = "___";

/// Synthetic tag carrying the record format through the key-value stream.
pub const FORMAT_TAG: &str = "FORMAT";

/// Synthetic tag carrying the record type through the key-value stream.
pub const TYPE_TAG: &str = "TYPE";

/// Synthetic tag carrying the record leader through the key-value stream.
pub const LEADER_TAG: &str = "LEADER";

/// One structural unit of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    tag: String,
    indicator: Option<String>,
    subfield_id: Option<String>,
    data: Option<String>,
}

impl Field {
    /// Create a control field (tag `00x`) with its data.
    #[must_use]
    pub fn control(tag: impl Into<String>, data: Option<String>) -> Self {
        Field {
            tag: tag.into(),
            indicator: None,
            subfield_id: None,
            data,
        }
    }

    /// Create a data field designator with its indicator characters.
    #[must_use]
    pub fn data_field(tag: impl Into<String>, indicator: impl Into<String>) -> Self {
        Field {
            tag: tag.into(),
            indicator: Some(indicator.into()),
            subfield_id: None,
            data: None,
        }
    }

    /// Create a subfield under the given designator.
    #[must_use]
    pub fn subfield(designator: &Field, id: impl Into<String>, data: Option<String>) -> Self {
        Field {
            tag: designator.tag.clone(),
            indicator: designator.indicator.clone(),
            subfield_id: Some(id.into()),
            data,
        }
    }

    /// Create a bare synthetic field used for the `FORMAT`/`TYPE`/`LEADER`
    /// keys.
    #[must_use]
    pub fn synthetic(tag: impl Into<String>) -> Self {
        Field {
            tag: tag.into(),
            indicator: None,
            subfield_id: None,
            data: None,
        }
    }

    /// Field tag, three characters for real fields.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Replace the tag. Used by the decoder to assign [`ERROR_TAG`].
    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.tag = tag.into();
    }

    /// Indicator characters, if this is a data field or subfield.
    #[must_use]
    pub fn indicator(&self) -> Option<&str> {
        self.indicator.as_deref()
    }

    /// Subfield identifier, if this is a subfield.
    #[must_use]
    pub fn subfield_id(&self) -> Option<&str> {
        self.subfield_id.as_deref()
    }

    /// Field data, if any.
    #[must_use]
    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    /// Replace the data, e.g. after a transform at subfield close.
    pub fn set_data(&mut self, data: Option<String>) {
        self.data = data;
    }

    /// True for tags `000`-`009`.
    #[must_use]
    pub fn is_control_field(&self) -> bool {
        self.tag.len() == 3 && self.tag.starts_with("00")
    }

    /// True if this field carries a subfield identifier.
    #[must_use]
    pub fn is_subfield(&self) -> bool {
        self.subfield_id.is_some()
    }
}

/// One logical field: a control field, or a data field designator followed by
/// its subfields in encounter order.
///
/// Order within the list is significant and preserved; the derived [`key`]
/// sorts subfield identifiers so lookup is order-insensitive.
///
/// [`key`]: FieldList::key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldList {
    fields: SmallVec<[Field; 4]>,
}

impl FieldList {
    /// Create an empty field list.
    #[must_use]
    pub fn new() -> Self {
        FieldList {
            fields: SmallVec::new(),
        }
    }

    /// Create a singleton list holding one synthetic field.
    #[must_use]
    pub fn singleton(tag: &str) -> Self {
        let mut list = FieldList::new();
        list.push(Field::synthetic(tag));
        list
    }

    /// The `FORMAT` key.
    #[must_use]
    pub fn format_key() -> Self {
        Self::singleton(FORMAT_TAG)
    }

    /// The `TYPE` key.
    #[must_use]
    pub fn type_key() -> Self {
        Self::singleton(TYPE_TAG)
    }

    /// The `LEADER` key.
    #[must_use]
    pub fn leader_key() -> Self {
        Self::singleton(LEADER_TAG)
    }

    /// Append a field, preserving encounter order.
    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// First field: the control field or data field designator.
    #[must_use]
    pub fn first(&self) -> Option<&Field> {
        self.fields.first()
    }

    /// Number of fields in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if no field has been appended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over the fields in encounter order.
    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Iterate mutably, e.g. for applying a transform.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Field> {
        self.fields.iter_mut()
    }

    /// Derive the canonical lookup key.
    ///
    /// The tag comes from the first field; each indicator position becomes
    /// its own `$`-group, merging distinct characters if subfields disagree;
    /// subfield identifiers are collected, sorted, and deduplicated into the
    /// final group. Empty trailing groups are omitted, so a control field
    /// derives its bare tag.
    #[must_use]
    pub fn key(&self) -> String {
        let Some(first) = self.fields.first() else {
            return String::new();
        };
        let mut key = first.tag().to_string();
        // merge indicator characters per position
        let ind_len = self
            .fields
            .iter()
            .filter_map(|f| f.indicator().map(str::len))
            .max()
            .unwrap_or(0);
        for pos in 0..ind_len {
            let mut chars: Vec<char> = Vec::new();
            for field in &self.fields {
                if let Some(ch) = field.indicator().and_then(|ind| ind.chars().nth(pos)) {
                    if !chars.contains(&ch) {
                        chars.push(ch);
                    }
                }
            }
            key.push('$');
            key.extend(chars);
        }
        let mut subfield_ids: Vec<&str> = self
            .fields
            .iter()
            .filter_map(Field::subfield_id)
            .collect();
        if !subfield_ids.is_empty() {
            subfield_ids.sort_unstable();
            subfield_ids.dedup();
            key.push('$');
            for id in subfield_ids {
                key.push_str(id);
            }
        }
        key
    }
}

impl IntoIterator for FieldList {
    type Item = Field;
    type IntoIter = smallvec::IntoIter<[Field; 4]>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a FieldList {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

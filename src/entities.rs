//! Built-in entity handlers.
//!
//! These cover the record-level bookkeeping every specification needs
//! (identifier, leader, format/type) plus two placement handlers: [`Direct`]
//! for pure settings-driven default placement and [`Item`] for holdings
//! items with library-sigel to ISIL transcoding.
//!
//! All handlers are stateless values; register them once and share them
//! across every worker. [`builtin_registry`] returns a registry with the
//! standard names bound.

use crate::entity::{
    place_by_default, BuildContext, Dispatch, EntityHandler, EntityRegistry, Settings,
};
use crate::error::Result;
use crate::field::{FieldList, FORMAT_TAG};
use crate::resource::Resource;
use serde_json::Value;
use std::sync::Arc;

/// Sets the record identifier from the matched value.
///
/// Settings:
/// - `identifier` — catalog identifier; the record identifier is prefixed
///   with `(identifier)`, the usual union-catalog form.
/// - `_prefix` — literal prefix, used when `identifier` is absent.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordIdentifier;

impl EntityHandler for RecordIdentifier {
    fn fields(
        &self,
        ctx: &mut BuildContext<'_>,
        _key: &FieldList,
        value: Option<&str>,
    ) -> Result<Dispatch> {
        let Some(value) = value else {
            return Ok(Dispatch::Done);
        };
        let prefix = match ctx.settings.get("identifier").and_then(Value::as_str) {
            Some(catalog) => format!("({catalog})"),
            None => ctx
                .settings
                .get("_prefix")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
        };
        let identifier = format!("{prefix}{}", value.trim());
        ctx.state.set_identifier(identifier.clone())?;
        ctx.state.resource_mut()?.add_literal("uid", identifier);
        Ok(Dispatch::Done)
    }
}

/// Stores the raw record leader on the state.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordLeader;

impl EntityHandler for RecordLeader {
    fn fields(
        &self,
        ctx: &mut BuildContext<'_>,
        _key: &FieldList,
        value: Option<&str>,
    ) -> Result<Dispatch> {
        if let Some(label) = value {
            ctx.state.set_label(label);
        }
        Ok(Dispatch::Done)
    }
}

/// Stores the record format and type labels on the state.
///
/// Bound to both the `FORMAT` and `TYPE` synthetic keys; the key's tag
/// decides which slot the value lands in.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatType;

impl EntityHandler for FormatType {
    fn fields(
        &self,
        ctx: &mut BuildContext<'_>,
        key: &FieldList,
        value: Option<&str>,
    ) -> Result<Dispatch> {
        let Some(value) = value else {
            return Ok(Dispatch::Done);
        };
        match key.first().map(crate::field::Field::tag) {
            Some(FORMAT_TAG) => ctx.state.set_format(value),
            _ => ctx.state.set_record_type(value),
        }
        Ok(Dispatch::Done)
    }
}

/// Pure default placement: everything is driven by the settings map.
#[derive(Debug, Default, Clone, Copy)]
pub struct Direct;

impl EntityHandler for Direct {
    fn fields(
        &self,
        _ctx: &mut BuildContext<'_>,
        _key: &FieldList,
        _value: Option<&str>,
    ) -> Result<Dispatch> {
        Ok(Dispatch::Continue)
    }
}

/// Holdings item handler.
///
/// Places the configured subfields onto the record's item resource instead
/// of the root, and resolves library sigels to ISILs on the way: a subfield
/// whose configured property is `member` is looked up in the settings table
/// `sigel2isil` and replaced by the resolved ISIL when present.
#[derive(Debug, Default, Clone, Copy)]
pub struct Item;

impl Item {
    fn resolve_sigels(key: &FieldList, settings: &Settings) -> FieldList {
        let Some(Value::Object(subfields)) = settings.get("subfields") else {
            return key.clone();
        };
        let Some(Value::Object(table)) = settings.get("sigel2isil") else {
            return key.clone();
        };
        let mut resolved = key.clone();
        for field in resolved.iter_mut() {
            let Some(code) = field.subfield_id() else {
                continue;
            };
            let is_member = matches!(subfields.get(code), Some(Value::String(p)) if p == "member");
            if !is_member {
                continue;
            }
            if let Some(isil) = field
                .data()
                .and_then(|sigel| table.get(sigel))
                .and_then(Value::as_str)
            {
                field.set_data(Some(isil.to_string()));
            }
        }
        resolved
    }
}

impl EntityHandler for Item {
    fn fields(
        &self,
        ctx: &mut BuildContext<'_>,
        key: &FieldList,
        _value: Option<&str>,
    ) -> Result<Dispatch> {
        let resolved = Self::resolve_sigels(key, ctx.settings);
        let item: &mut Resource = ctx.state.item_resource_mut()?;
        place_by_default(item, &resolved, ctx.handler_name, ctx.settings);
        Ok(Dispatch::Done)
    }
}

/// Registry with the built-in handlers bound under their standard names.
#[must_use]
pub fn builtin_registry() -> EntityRegistry {
    EntityRegistry::new()
        .register("RecordIdentifier", Arc::new(RecordIdentifier))
        .register("RecordLeader", Arc::new(RecordLeader))
        .register("FormatType", Arc::new(FormatType))
        .register("Direct", Arc::new(Direct))
        .register("Item", Arc::new(Item))
}

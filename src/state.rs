//! Per-record builder state.
//!
//! One [`EntityBuilderState`] exists per record job, owned exclusively by the
//! worker processing that job. It holds the resource graph under
//! construction, the monotonic record number, and the record-level scratch
//! entities accumulate into (identifier, format, type, leader label).
//!
//! After the worker finishes dispatching the record's pairs it calls
//! [`complete`](EntityBuilderState::complete), which seals the state: any
//! later mutation attempt is rejected with
//! [`MarcMapError::StateSealed`]. Sealing is what guarantees the sink never
//! observes a resource that is still being built.

use crate::error::{MarcMapError, Result};
use crate::resource::Resource;

/// Mutable per-record scratch: the resource graph plus record-level facts.
#[derive(Debug)]
pub struct EntityBuilderState {
    record_number: u64,
    resource: Resource,
    item: Resource,
    identifier: Option<String>,
    format: Option<String>,
    record_type: Option<String>,
    label: Option<String>,
    sealed: bool,
}

impl EntityBuilderState {
    /// Create a fresh state for one record job.
    #[must_use]
    pub fn new(record_number: u64) -> Self {
        EntityBuilderState {
            record_number,
            resource: Resource::new(),
            item: Resource::new(),
            identifier: None,
            format: None,
            record_type: None,
            label: None,
            sealed: false,
        }
    }

    /// The monotonic record number assigned when the job was dequeued.
    #[must_use]
    pub fn record_number(&self) -> u64 {
        self.record_number
    }

    /// Read access to the resource graph.
    #[must_use]
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Mutable access to the resource graph.
    ///
    /// # Errors
    ///
    /// Returns [`MarcMapError::StateSealed`] once the state is complete.
    pub fn resource_mut(&mut self) -> Result<&mut Resource> {
        if self.sealed {
            return Err(MarcMapError::StateSealed);
        }
        Ok(&mut self.resource)
    }

    /// Read access to the holdings item scratch resource.
    #[must_use]
    pub fn item_resource(&self) -> &Resource {
        &self.item
    }

    /// Mutable access to the holdings item scratch resource.
    ///
    /// # Errors
    ///
    /// Returns [`MarcMapError::StateSealed`] once the state is complete.
    pub fn item_resource_mut(&mut self) -> Result<&mut Resource> {
        if self.sealed {
            return Err(MarcMapError::StateSealed);
        }
        Ok(&mut self.item)
    }

    /// The record identifier, if an entity has set one.
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Set the record identifier.
    ///
    /// # Errors
    ///
    /// Returns [`MarcMapError::StateSealed`] once the state is complete.
    pub fn set_identifier(&mut self, identifier: impl Into<String>) -> Result<()> {
        if self.sealed {
            return Err(MarcMapError::StateSealed);
        }
        self.identifier = Some(identifier.into());
        Ok(())
    }

    /// The record format label, if seen.
    #[must_use]
    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    /// Store the record format label.
    pub fn set_format(&mut self, format: impl Into<String>) {
        self.format = Some(format.into());
    }

    /// The record type label, if seen.
    #[must_use]
    pub fn record_type(&self) -> Option<&str> {
        self.record_type.as_deref()
    }

    /// Store the record type label.
    pub fn set_record_type(&mut self, record_type: impl Into<String>) {
        self.record_type = Some(record_type.into());
    }

    /// The raw record leader, if seen.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Store the raw record leader.
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = Some(label.into());
    }

    /// True once [`complete`](Self::complete) has run.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Seal the state.
    ///
    /// Folds the item scratch resource into the root under `item` if
    /// anything accumulated there, assigns the record identifier as the
    /// root's id if the root is still blank, and rejects all further
    /// mutation.
    pub fn complete(&mut self) {
        if self.sealed {
            return;
        }
        if !self.item.is_empty() {
            let item = std::mem::take(&mut self.item);
            *self.resource.new_resource("item") = item;
        }
        if self.resource.is_blank() {
            if let Some(identifier) = &self.identifier {
                self.resource.set_id(identifier.clone());
            }
        }
        self.sealed = true;
    }

    /// Hand the finished resource graph to the caller, consuming the state.
    #[must_use]
    pub fn into_resource(self) -> Resource {
        self.resource
    }
}

#![warn(missing_docs)]

//! # marcmap
//!
//! A Rust library for streaming ISO 2709 bibliographic records and mapping
//! them to in-memory resource graphs through a specification-driven worker
//! pipeline.
//!
//! The pipeline has three stages. A streaming [`Iso2709Decoder`] turns the
//! binary catalog format into structural events. A [`KeyValueReducer`]
//! collapses those events into ordered `(FieldList, value)` pairs per
//! record. An [`EntityQueue`] of workers looks each pair up in a loaded
//! [`Specification`] and dispatches it to an [`EntityHandler`] that builds
//! the record's [`Resource`] graph, which is handed to a [`Sink`] once the
//! record completes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use marcmap::{entities, IngestPipeline, Specification};
//! use std::fs::File;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = Specification::builder(entities::builtin_registry())
//!     .load_json(r#"{
//!         "RecordIdentifier": { "values": ["001"], "identifier": "DE-600" },
//!         "Direct": {
//!             "values": ["245"],
//!             "_predicate": "TitleStatement",
//!             "subfields": { "a": "title", "b": "remainder", "c": "statement" }
//!         }
//!     }"#)?
//!     .build();
//!
//! let mut pipeline = IngestPipeline::builder(spec).workers(4).build();
//! pipeline.run(File::open("records.mrc")?)?;
//! let counters = pipeline.close(Duration::from_secs(30))?;
//! println!("completed {} records", counters.completed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`decoder`] — streaming ISO 2709 binary decoder
//! - [`leader`] — the 24-byte record label
//! - [`field`] — fields, field lists, and derived lookup keys
//! - [`listener`] — the record event model
//! - [`keyvalue`] — event stream to key-value reduction
//! - [`transform`] — value transforms (identity, Unicode NFC)
//! - [`specification`] — the rule table, with periodic tag families
//! - [`entity`] — the handler trait, registry, and default placement
//! - [`entities`] — built-in handlers
//! - [`resource`] — the per-record resource graph
//! - [`state`] — per-record builder state with completion sealing
//! - [`queue`] — the bounded worker pool
//! - [`pipeline`] — end-to-end wiring
//! - [`error`] — error types with fatal/recoverable severity
//!
//! ## Concurrency model
//!
//! One bounded channel feeds a fixed set of worker threads. A record's
//! pairs are processed strictly in emission order by exactly one worker;
//! across records no order is guaranteed. The specification and all
//! handlers are immutable after load and shared without locking; the
//! per-record state is owned by a single worker. Shutdown is an explicit
//! closed/draining state with a timeout — workers finish their current
//! record and never leave a half-built resource observable.

pub mod decoder;
pub mod entities;
pub mod entity;
pub mod error;
pub mod field;
pub mod keyvalue;
pub mod leader;
pub mod listener;
pub mod pipeline;
pub mod queue;
pub mod resource;
pub mod specification;
pub mod state;
pub mod transform;

#[cfg(test)]
pub(crate) mod testutil;

pub use decoder::{Iso2709Decoder, RecoveryMode};
pub use entity::{BuildContext, Dispatch, EntityHandler, EntityRegistry, Settings};
pub use error::{MarcMapError, Result, Severity};
pub use field::{Field, FieldList};
pub use keyvalue::{KeyValueListener, KeyValueReducer};
pub use leader::Leader;
pub use listener::{FieldEvent, FieldEventListener, MarcStreamListener, NullListener};
pub use pipeline::IngestPipeline;
pub use queue::{
    Counters, EntityQueue, KeyValueBatch, NullSink, Sink, UnmappedKeyListener,
};
pub use resource::{Node, Resource};
pub use specification::{Periodic, SpecEntry, Specification};
pub use state::EntityBuilderState;
pub use transform::{IdentityTransformer, NfcTransformer, StringTransformer};

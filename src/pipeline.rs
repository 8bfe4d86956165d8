//! End-to-end ingestion pipeline.
//!
//! [`IngestPipeline`] wires the three stages together: the ISO 2709 decoder
//! feeds the key-value reducer, whose batches are submitted to the entity
//! queue. Decoding runs on the calling thread; mapping and resource building
//! run on the queue's workers.
//!
//! ```no_run
//! use marcmap::{entities, IngestPipeline, Specification};
//! use std::fs::File;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let spec = Specification::builder(entities::builtin_registry())
//!     .load_json(r#"{ "RecordIdentifier": { "values": ["001"] } }"#)?
//!     .build();
//! let mut pipeline = IngestPipeline::builder(spec).workers(4).build();
//! pipeline.run(File::open("records.mrc")?)?;
//! let counters = pipeline.close(Duration::from_secs(30))?;
//! println!("completed {} records", counters.completed);
//! # Ok::<(), marcmap::MarcMapError>(())
//! ```

use crate::decoder::{Iso2709Decoder, RecoveryMode};
use crate::error::Result;
use crate::keyvalue::KeyValueReducer;
use crate::queue::{Counters, EntityQueue, Sink, UnmappedKeyListener};
use crate::specification::Specification;
use crate::transform::StringTransformer;
use encoding_rs::Encoding;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

/// Adapter so one shared transformer can serve several reducer instances.
struct SharedTransformer(Arc<dyn StringTransformer>);

impl StringTransformer for SharedTransformer {
    fn transform(&self, value: &str) -> String {
        self.0.transform(value)
    }
}

/// Configures an [`IngestPipeline`].
pub struct IngestPipelineBuilder {
    specification: Arc<Specification>,
    workers: usize,
    depth: usize,
    sink: Option<Arc<dyn Sink>>,
    unmapped: Option<Arc<dyn UnmappedKeyListener>>,
    copy_unmapped: bool,
    recovery_mode: RecoveryMode,
    encoding: &'static Encoding,
    format: Option<String>,
    record_type: Option<String>,
    transformer: Option<Arc<dyn StringTransformer>>,
}

impl std::fmt::Debug for IngestPipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestPipelineBuilder")
            .field("workers", &self.workers)
            .field("recovery_mode", &self.recovery_mode)
            .finish_non_exhaustive()
    }
}

impl IngestPipelineBuilder {
    /// Number of mapping workers. Default 1.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Bounded queue depth. Default 32.
    #[must_use]
    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// The downstream sink.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Listener for unmapped keys.
    #[must_use]
    pub fn unmapped_listener(mut self, listener: Arc<dyn UnmappedKeyListener>) -> Self {
        self.unmapped = Some(listener);
        self
    }

    /// Copy unmapped field groups verbatim onto the resource.
    #[must_use]
    pub fn copy_unmapped(mut self, copy: bool) -> Self {
        self.copy_unmapped = copy;
        self
    }

    /// Decode error policy. Default strict.
    #[must_use]
    pub fn recovery_mode(mut self, mode: RecoveryMode) -> Self {
        self.recovery_mode = mode;
        self
    }

    /// Input character encoding. Default UTF-8.
    #[must_use]
    pub fn encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Format label for `begin_record`.
    #[must_use]
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Type label for `begin_record`.
    #[must_use]
    pub fn record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    /// Value transform applied to subfield data during reduction.
    #[must_use]
    pub fn transformer(mut self, transformer: Arc<dyn StringTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Spawn the queue and return the pipeline.
    #[must_use]
    pub fn build(self) -> IngestPipeline {
        let mut queue = EntityQueue::builder(self.specification)
            .workers(self.workers)
            .depth(self.depth)
            .copy_unmapped(self.copy_unmapped);
        if let Some(sink) = self.sink {
            queue = queue.sink(sink);
        }
        if let Some(listener) = self.unmapped {
            queue = queue.unmapped_listener(listener);
        }
        IngestPipeline {
            queue: queue.build(),
            recovery_mode: self.recovery_mode,
            encoding: self.encoding,
            format: self.format,
            record_type: self.record_type,
            transformer: self.transformer,
        }
    }
}

/// Decoder → reducer → worker queue, assembled.
pub struct IngestPipeline {
    queue: EntityQueue,
    recovery_mode: RecoveryMode,
    encoding: &'static Encoding,
    format: Option<String>,
    record_type: Option<String>,
    transformer: Option<Arc<dyn StringTransformer>>,
}

impl std::fmt::Debug for IngestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("queue", &self.queue)
            .field("recovery_mode", &self.recovery_mode)
            .field("encoding", &self.encoding.name())
            .finish_non_exhaustive()
    }
}

impl IngestPipeline {
    /// Start configuring a pipeline over a loaded specification.
    #[must_use]
    pub fn builder(specification: Arc<Specification>) -> IngestPipelineBuilder {
        IngestPipelineBuilder {
            specification,
            workers: 1,
            depth: 32,
            sink: None,
            unmapped: None,
            copy_unmapped: false,
            recovery_mode: RecoveryMode::default(),
            encoding: encoding_rs::UTF_8,
            format: None,
            record_type: None,
            transformer: None,
        }
    }

    /// Decode a byte stream and submit every record for mapping.
    ///
    /// May be called repeatedly to ingest several streams through the same
    /// queue. Returns the number of records decoded from this stream.
    ///
    /// # Errors
    ///
    /// Returns the first fatal decode error. Records decoded before the
    /// error have already been submitted.
    pub fn run<R: Read>(&mut self, reader: R) -> Result<usize> {
        let mut reducer =
            KeyValueReducer::new().add_listener(Box::new(self.queue.submitter()));
        if let Some(transformer) = &self.transformer {
            reducer =
                reducer.with_transformer(Box::new(SharedTransformer(transformer.clone())));
        }
        let mut decoder = Iso2709Decoder::new(reader)
            .with_recovery_mode(self.recovery_mode)
            .with_encoding(self.encoding);
        if let Some(format) = &self.format {
            decoder = decoder.with_format(format.clone());
        }
        if let Some(record_type) = &self.record_type {
            decoder = decoder.with_record_type(record_type.clone());
        }
        decoder.parse(&mut reducer)
    }

    /// Snapshot the queue counters.
    #[must_use]
    pub fn counters(&self) -> Counters {
        self.queue.counters()
    }

    /// Shut the queue down and wait for in-flight records.
    ///
    /// # Errors
    ///
    /// Returns [`crate::MarcMapError::ShutdownTimeout`] if workers are still
    /// running when the timeout elapses.
    pub fn close(mut self, timeout: Duration) -> Result<Counters> {
        self.queue.close(timeout)?;
        Ok(self.queue.counters())
    }
}

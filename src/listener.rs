//! Record event model.
//!
//! [`MarcStreamListener`] is the callback interface between a record producer
//! (the binary decoder here, or any other dialect decoder) and everything
//! downstream. The producer guarantees the callback sequence follows the
//! record structure: a record begins before any field, a subfield only opens
//! inside a data field, and every begin is matched by its end before the next
//! record starts. Consumers never see the transport.
//!
//! [`FieldEvent`] carries decoder diagnostics: the lenient error policy
//! downgrades malformed-field failures to these events instead of aborting.

use crate::field::Field;

/// Callback interface describing record structure.
///
/// All methods have empty default implementations, so a consumer only
/// implements the events it cares about.
pub trait MarcStreamListener {
    /// A record begins. `format` and `record_type` are producer-level labels
    /// (e.g. `MARC21`/`Bibliographic`), not part of the record content.
    fn begin_record(&mut self, format: Option<&str>, record_type: Option<&str>) {
        let _ = (format, record_type);
    }

    /// The 24-character record label.
    fn leader(&mut self, label: &str) {
        let _ = label;
    }

    /// A control field (tag `00x`) begins.
    fn begin_control_field(&mut self, field: &Field) {
        let _ = field;
    }

    /// The control field ends; `field` carries its data.
    fn end_control_field(&mut self, field: &Field) {
        let _ = field;
    }

    /// A data field begins; `field` is the designator with tag and
    /// indicators.
    fn begin_data_field(&mut self, field: &Field) {
        let _ = field;
    }

    /// The data field ends. `field` may carry inline data when the field had
    /// no subfields.
    fn end_data_field(&mut self, field: Option<&Field>) {
        let _ = field;
    }

    /// A subfield begins.
    fn begin_subfield(&mut self, field: &Field) {
        let _ = field;
    }

    /// The subfield ends; `field` carries the subfield data.
    fn end_subfield(&mut self, field: &Field) {
        let _ = field;
    }

    /// The record ends.
    fn end_record(&mut self) {}
}

/// A listener that ignores every event. Useful as a placeholder in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl MarcStreamListener for NullListener {}

/// Diagnostic events emitted by the decoder under the lenient error policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEvent {
    /// A directory tag failed the `\d{3}` pattern and was rewritten to the
    /// error tag.
    TagCleaned {
        /// The tag as it appeared in the directory.
        original: String,
    },
    /// A malformed field was skipped; the rest of the record continues.
    FieldSkipped {
        /// Tag of the skipped field.
        tag: String,
        /// Why the field was unusable.
        reason: String,
    },
}

/// Receiver for decoder diagnostics.
pub trait FieldEventListener {
    /// Called once per diagnostic event.
    fn receive(&mut self, event: FieldEvent);
}

/// Collects diagnostics into a vector. Handy in tests and batch reports.
#[derive(Debug, Default)]
pub struct CollectingEventListener {
    /// Events received so far, in order.
    pub events: Vec<FieldEvent>,
}

impl FieldEventListener for CollectingEventListener {
    fn receive(&mut self, event: FieldEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_listener_accepts_all_events() {
        let mut listener = NullListener;
        let field = Field::control("001", Some("x".to_string()));
        listener.begin_record(Some("MARC21"), Some("Bibliographic"));
        listener.leader("00024cam a2200024 a 4500");
        listener.begin_control_field(&field);
        listener.end_control_field(&field);
        listener.end_record();
    }

    #[test]
    fn test_collecting_event_listener() {
        let mut collector = CollectingEventListener::default();
        collector.receive(FieldEvent::TagCleaned {
            original: "24x".to_string(),
        });
        collector.receive(FieldEvent::FieldSkipped {
            tag: "245".to_string(),
            reason: "range outside data area".to_string(),
        });
        assert_eq!(collector.events.len(), 2);
        assert!(matches!(
            collector.events[0],
            FieldEvent::TagCleaned { .. }
        ));
    }
}

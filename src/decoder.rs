//! Streaming ISO 2709 decoder.
//!
//! [`Iso2709Decoder`] reads binary catalog records from any
//! [`std::io::Read`] source and drives a [`MarcStreamListener`] through the
//! record structure: leader, directory-ordered fields, subfields. It holds no
//! record model of its own — consumers build whatever they need from the
//! event sequence.
//!
//! Each record is laid out as a 24-byte leader, a directory of 12-byte
//! entries `tag(3) + length(4) + start(5)` terminated by the field
//! terminator (0x1E), and a data area in which fields end with 0x1E,
//! subfields open with 0x1F, and the record closes with 0x1D. The decoder
//! consumes exactly the number of bytes the leader declares per record.
//!
//! Malformed directories and out-of-range fields are decode failures. The
//! [`RecoveryMode`] policy decides whether they abort the stream
//! ([`RecoveryMode::Strict`]) or skip the field, emit a [`FieldEvent`]
//! diagnostic, and continue the record ([`RecoveryMode::Lenient`]).
//! End-of-stream inside a record is fatal in both modes.

use crate::error::{MarcMapError, Result};
use crate::field::{Field, ERROR_TAG};
use crate::leader::{Leader, LEADER_LENGTH};
use crate::listener::{FieldEvent, FieldEventListener, MarcStreamListener};
use encoding_rs::Encoding;
use lazy_static::lazy_static;
use regex::Regex;
use std::io::Read;

/// Record terminator byte (0x1D).
pub const RECORD_TERMINATOR: u8 = 0x1D;
/// Field terminator byte (0x1E).
pub const FIELD_TERMINATOR: u8 = 0x1E;
/// Subfield delimiter byte (0x1F).
pub const SUBFIELD_DELIMITER: u8 = 0x1F;

const DIRECTORY_ENTRY_WIDTH: usize = 12;

lazy_static! {
    static ref TAG_PATTERN: Regex = Regex::new(r"^\d{3}$").unwrap();
}

/// Policy for malformed directories and fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryMode {
    /// Abort the stream on the first malformed field (default).
    #[default]
    Strict,
    /// Skip the malformed field, emit a diagnostic event, continue the
    /// record. Truncation at end of stream is still fatal.
    Lenient,
}

/// Streaming decoder for ISO 2709 binary records.
///
/// # Examples
///
/// ```no_run
/// use marcmap::{Iso2709Decoder, NullListener};
/// use std::fs::File;
///
/// let file = File::open("records.mrc")?;
/// let mut decoder = Iso2709Decoder::new(file);
/// let mut listener = NullListener;
/// let count = decoder.parse(&mut listener)?;
/// println!("decoded {count} records");
/// # Ok::<(), marcmap::MarcMapError>(())
/// ```
pub struct Iso2709Decoder<R: Read> {
    reader: R,
    recovery_mode: RecoveryMode,
    encoding: &'static Encoding,
    format: Option<String>,
    record_type: Option<String>,
    clean_tags: bool,
    event_listener: Option<Box<dyn FieldEventListener + Send>>,
    records_read: usize,
}

impl<R: Read> std::fmt::Debug for Iso2709Decoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Iso2709Decoder")
            .field("recovery_mode", &self.recovery_mode)
            .field("encoding", &self.encoding.name())
            .field("records_read", &self.records_read)
            .finish_non_exhaustive()
    }
}

impl<R: Read> Iso2709Decoder<R> {
    /// Create a decoder over a byte source. UTF-8 input, strict policy.
    pub fn new(reader: R) -> Self {
        Iso2709Decoder {
            reader,
            recovery_mode: RecoveryMode::Strict,
            encoding: encoding_rs::UTF_8,
            format: None,
            record_type: None,
            clean_tags: true,
            event_listener: None,
            records_read: 0,
        }
    }

    /// Set the malformed-field policy.
    #[must_use]
    pub fn with_recovery_mode(mut self, mode: RecoveryMode) -> Self {
        self.recovery_mode = mode;
        self
    }

    /// Set the input character encoding, e.g. `encoding_rs::WINDOWS_1252`
    /// for legacy 8-bit dumps.
    #[must_use]
    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the format label passed to `begin_record`.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Set the type label passed to `begin_record`.
    #[must_use]
    pub fn with_record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    /// Disable rewriting of invalid directory tags to the error tag.
    #[must_use]
    pub fn with_clean_tags(mut self, clean_tags: bool) -> Self {
        self.clean_tags = clean_tags;
        self
    }

    /// Attach a receiver for diagnostic events.
    #[must_use]
    pub fn with_field_event_listener(
        mut self,
        listener: Box<dyn FieldEventListener + Send>,
    ) -> Self {
        self.event_listener = Some(listener);
        self
    }

    /// Number of records decoded so far.
    #[must_use]
    pub fn records_read(&self) -> usize {
        self.records_read
    }

    /// Decode every record in the stream, returning the record count.
    ///
    /// # Errors
    ///
    /// Returns the first fatal decode error; under the lenient policy only
    /// truncation and IO errors are fatal.
    pub fn parse<L: MarcStreamListener>(&mut self, listener: &mut L) -> Result<usize> {
        while self.read_record(listener)? {}
        Ok(self.records_read)
    }

    /// Decode a single record, firing the full event sequence.
    ///
    /// Returns `Ok(true)` if a record was decoded, `Ok(false)` at clean end
    /// of stream.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed input per the recovery policy; end of
    /// stream inside a record is always [`MarcMapError::TruncatedRecord`].
    pub fn read_record<L: MarcStreamListener>(&mut self, listener: &mut L) -> Result<bool> {
        let mut leader_bytes = [0u8; LEADER_LENGTH];
        if !self.read_leader_bytes(&mut leader_bytes)? {
            return Ok(false);
        }
        let leader = Leader::from_bytes(&leader_bytes)?;
        leader.validate_for_reading()?;

        // everything after the leader, including the record terminator
        let mut body = vec![0u8; leader.record_length - LEADER_LENGTH];
        self.reader.read_exact(&mut body).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                MarcMapError::TruncatedRecord(format!(
                    "end of stream inside record {} body",
                    self.records_read + 1
                ))
            } else {
                MarcMapError::IoError(e)
            }
        })?;

        listener.begin_record(self.format.as_deref(), self.record_type.as_deref());
        listener.leader(leader.label());

        let directory_size = leader.directory_size();
        let directory_area = &body[..directory_size.min(body.len())];
        let data_area = &body[directory_size.min(body.len())..];

        let entries = self.directory_entries(directory_area)?;
        for (tag, length, start) in entries {
            self.emit_field(listener, &leader, &tag, length, start, data_area)?;
        }

        listener.end_record();
        self.records_read += 1;
        Ok(true)
    }

    /// Read 24 leader bytes, skipping stray newlines between records.
    /// Returns false on clean EOF before any leader byte.
    fn read_leader_bytes(&mut self, buf: &mut [u8; LEADER_LENGTH]) -> Result<bool> {
        let mut first = [0u8; 1];
        loop {
            match self.reader.read(&mut first)? {
                0 => return Ok(false),
                _ if first[0] == b'\n' || first[0] == b'\r' => {}
                _ => break,
            }
        }
        buf[0] = first[0];
        self.reader.read_exact(&mut buf[1..]).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                MarcMapError::TruncatedRecord("end of stream inside leader".to_string())
            } else {
                MarcMapError::IoError(e)
            }
        })?;
        Ok(true)
    }

    /// Parse directory entries up to the field terminator, in order.
    fn directory_entries(&mut self, area: &[u8]) -> Result<Vec<(String, usize, usize)>> {
        let end = memchr::memchr(FIELD_TERMINATOR, area).unwrap_or(area.len());
        let table = &area[..end];
        if table.len() % DIRECTORY_ENTRY_WIDTH != 0 {
            let err = MarcMapError::InvalidDirectory(format!(
                "directory length {} is not a multiple of {DIRECTORY_ENTRY_WIDTH}",
                table.len()
            ));
            if self.recovery_mode == RecoveryMode::Strict {
                return Err(err);
            }
            self.diagnose(FieldEvent::FieldSkipped {
                tag: ERROR_TAG.to_string(),
                reason: err.to_string(),
            });
        }
        let mut entries = Vec::with_capacity(table.len() / DIRECTORY_ENTRY_WIDTH);
        for chunk in table.chunks_exact(DIRECTORY_ENTRY_WIDTH) {
            let mut tag = String::from_utf8_lossy(&chunk[0..3]).to_string();
            if !TAG_PATTERN.is_match(&tag) {
                if self.recovery_mode == RecoveryMode::Strict {
                    return Err(MarcMapError::InvalidDirectory(format!(
                        "invalid tag '{tag}' in directory"
                    )));
                }
                if self.clean_tags {
                    self.diagnose(FieldEvent::TagCleaned {
                        original: tag.clone(),
                    });
                    tag = ERROR_TAG.to_string();
                }
            }
            let length = parse_ascii_number(&chunk[3..7]);
            let start = parse_ascii_number(&chunk[7..12]);
            match (length, start) {
                (Some(length), Some(start)) => entries.push((tag, length, start)),
                _ => {
                    let err = MarcMapError::InvalidDirectory(format!(
                        "non-numeric length/start in entry for tag {tag}"
                    ));
                    if self.recovery_mode == RecoveryMode::Strict {
                        return Err(err);
                    }
                    self.diagnose(FieldEvent::FieldSkipped {
                        tag,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(entries)
    }

    /// Slice one field out of the data area and fire its events.
    fn emit_field<L: MarcStreamListener>(
        &mut self,
        listener: &mut L,
        leader: &Leader,
        tag: &str,
        length: usize,
        start: usize,
        data_area: &[u8],
    ) -> Result<()> {
        let end = start + length;
        if end > data_area.len() {
            let err = MarcMapError::FieldOutOfRange {
                tag: tag.to_string(),
                start,
                length,
                available: data_area.len(),
            };
            if self.recovery_mode == RecoveryMode::Strict {
                return Err(err);
            }
            self.diagnose(FieldEvent::FieldSkipped {
                tag: tag.to_string(),
                reason: err.to_string(),
            });
            return Ok(());
        }
        let mut bytes = &data_area[start..end];
        // declared lengths include the closing field terminator
        if bytes.last() == Some(&FIELD_TERMINATOR) || bytes.last() == Some(&RECORD_TERMINATOR) {
            bytes = &bytes[..bytes.len() - 1];
        }
        let (text, _, had_errors) = self.encoding.decode(bytes);
        if had_errors {
            let err = MarcMapError::EncodingError(format!(
                "undecodable bytes in field {tag} using {}",
                self.encoding.name()
            ));
            if self.recovery_mode == RecoveryMode::Strict {
                return Err(err);
            }
            self.diagnose(FieldEvent::FieldSkipped {
                tag: tag.to_string(),
                reason: err.to_string(),
            });
            return Ok(());
        }
        let text = text.into_owned();

        if tag.starts_with("00") && tag != ERROR_TAG {
            let field = Field::control(tag, Some(text));
            listener.begin_control_field(&field);
            listener.end_control_field(&field);
            return Ok(());
        }

        // data field: indicators, then inline data and/or subfields
        let ind_len = leader.indicator_length;
        let indicator: String = text.chars().take(ind_len).collect();
        let rest: String = text.chars().skip(ind_len).collect();
        let designator = Field::data_field(tag, indicator);
        listener.begin_data_field(&designator);

        let mut units = rest.split('\u{1F}');
        let inline = units.next().unwrap_or("");
        let id_len = leader.subfield_id_length.saturating_sub(1).max(1);
        for unit in units {
            let id: String = unit.chars().take(id_len).collect();
            let data: String = unit.chars().skip(id_len).collect();
            let subfield = Field::subfield(&designator, id, Some(data));
            listener.begin_subfield(&subfield);
            listener.end_subfield(&subfield);
        }

        if inline.is_empty() {
            listener.end_data_field(Some(&designator));
        } else {
            let mut closing = designator.clone();
            closing.set_data(Some(inline.to_string()));
            listener.end_data_field(Some(&closing));
        }
        Ok(())
    }

    fn diagnose(&mut self, event: FieldEvent) {
        log::warn!("decode diagnostic: {event:?}");
        if let Some(listener) = self.event_listener.as_mut() {
            listener.receive(event);
        }
    }
}

fn parse_ascii_number(bytes: &[u8]) -> Option<usize> {
    let mut result = 0usize;
    for &byte in bytes {
        if byte.is_ascii_digit() {
            result = result * 10 + (byte - b'0') as usize;
        } else {
            return None;
        }
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::CollectingEventListener;
    use std::io::Cursor;

    /// Records the callback sequence for assertions.
    #[derive(Default)]
    struct Tracer {
        calls: Vec<String>,
    }

    impl MarcStreamListener for Tracer {
        fn begin_record(&mut self, format: Option<&str>, record_type: Option<&str>) {
            self.calls.push(format!(
                "begin_record({},{})",
                format.unwrap_or("-"),
                record_type.unwrap_or("-")
            ));
        }
        fn leader(&mut self, label: &str) {
            self.calls.push(format!("leader({label})"));
        }
        fn begin_control_field(&mut self, field: &Field) {
            self.calls.push(format!("begin_control({})", field.tag()));
        }
        fn end_control_field(&mut self, field: &Field) {
            self.calls.push(format!(
                "end_control({}={})",
                field.tag(),
                field.data().unwrap_or("")
            ));
        }
        fn begin_data_field(&mut self, field: &Field) {
            self.calls.push(format!(
                "begin_data({} {})",
                field.tag(),
                field.indicator().unwrap_or("")
            ));
        }
        fn end_data_field(&mut self, field: Option<&Field>) {
            let inline = field.and_then(Field::data).unwrap_or("");
            self.calls.push(format!("end_data({inline})"));
        }
        fn begin_subfield(&mut self, field: &Field) {
            self.calls
                .push(format!("begin_sub({})", field.subfield_id().unwrap_or("")));
        }
        fn end_subfield(&mut self, field: &Field) {
            self.calls.push(format!(
                "end_sub({}={})",
                field.subfield_id().unwrap_or(""),
                field.data().unwrap_or("")
            ));
        }
        fn end_record(&mut self) {
            self.calls.push("end_record".to_string());
        }
    }

    use crate::testutil::build_record;

    #[test]
    fn test_decode_simple_record() {
        let bytes = build_record(
            &[("001", "123456")],
            &[("245", "10", &[("a", "Test title"), ("c", "Author")])],
        );
        let mut decoder = Iso2709Decoder::new(Cursor::new(bytes));
        let mut tracer = Tracer::default();
        assert!(decoder.read_record(&mut tracer).unwrap());
        assert!(!decoder.read_record(&mut tracer).unwrap());
        assert_eq!(decoder.records_read(), 1);

        let calls = tracer.calls.join(";");
        assert!(calls.contains("begin_record"));
        assert!(calls.contains("begin_control(001)"));
        assert!(calls.contains("end_control(001=123456)"));
        assert!(calls.contains("begin_data(245 10)"));
        assert!(calls.contains("end_sub(a=Test title)"));
        assert!(calls.contains("end_sub(c=Author)"));
        assert!(calls.ends_with("end_record"));
    }

    #[test]
    fn test_fields_in_directory_order() {
        let bytes = build_record(
            &[("001", "id"), ("008", "data")],
            &[("100", "1 ", &[("a", "Name")]), ("245", "10", &[("a", "T")])],
        );
        let mut decoder = Iso2709Decoder::new(Cursor::new(bytes));
        let mut tracer = Tracer::default();
        decoder.read_record(&mut tracer).unwrap();
        let tags: Vec<_> = tracer
            .calls
            .iter()
            .filter(|c| c.starts_with("begin_control") || c.starts_with("begin_data"))
            .cloned()
            .collect();
        assert_eq!(
            tags,
            vec![
                "begin_control(001)",
                "begin_control(008)",
                "begin_data(100 1 )",
                "begin_data(245 10)"
            ]
        );
    }

    #[test]
    fn test_inline_data_passed_on_end_data_field() {
        // a data field with indicators and inline content, no subfields,
        // assembled by hand since build_record always emits subfields
        let mut directory = Vec::new();
        let mut data = Vec::new();
        data.extend_from_slice(b"  Der Titel");
        data.push(FIELD_TERMINATOR);
        directory.extend_from_slice(b"331");
        directory.extend_from_slice(format!("{:04}", data.len()).as_bytes());
        directory.extend_from_slice(b"00000");
        directory.push(FIELD_TERMINATOR);
        let base_address = LEADER_LENGTH + directory.len();
        let record_length = base_address + data.len() + 1;
        let mut record = Vec::new();
        record.extend_from_slice(format!("{record_length:05}").as_bytes());
        record.extend_from_slice(b"cam a22");
        record.extend_from_slice(format!("{base_address:05}").as_bytes());
        record.extend_from_slice(b" a 4500");
        record.extend_from_slice(&directory);
        record.extend_from_slice(&data);
        record.push(RECORD_TERMINATOR);

        let mut decoder = Iso2709Decoder::new(Cursor::new(record));
        let mut tracer = Tracer::default();
        decoder.read_record(&mut tracer).unwrap();
        assert!(tracer.calls.contains(&"end_data(Der Titel)".to_string()));
    }

    #[test]
    fn test_truncated_record_is_fatal_in_lenient_mode() {
        let mut bytes = build_record(&[("001", "x")], &[]);
        bytes.truncate(bytes.len() - 5);
        let mut decoder =
            Iso2709Decoder::new(Cursor::new(bytes)).with_recovery_mode(RecoveryMode::Lenient);
        let mut tracer = Tracer::default();
        let err = decoder.read_record(&mut tracer).unwrap_err();
        assert!(matches!(err, MarcMapError::TruncatedRecord(_)));
    }

    #[test]
    fn test_out_of_range_field_strict() {
        let mut bytes = build_record(&[("001", "abcdef")], &[]);
        // corrupt the directory entry length to overshoot the data area
        // directory begins at offset 24: tag(3) then length(4)
        bytes[27..31].copy_from_slice(b"9999");
        let mut decoder = Iso2709Decoder::new(Cursor::new(bytes));
        let mut tracer = Tracer::default();
        let err = decoder.read_record(&mut tracer).unwrap_err();
        assert!(matches!(err, MarcMapError::FieldOutOfRange { .. }));
    }

    #[test]
    fn test_out_of_range_field_lenient_skips_and_diagnoses() {
        let mut bytes = build_record(&[("001", "abcdef"), ("008", "xy")], &[]);
        bytes[27..31].copy_from_slice(b"9999");
        let mut decoder = Iso2709Decoder::new(Cursor::new(bytes))
            .with_recovery_mode(RecoveryMode::Lenient)
            .with_field_event_listener(Box::new(CollectingEventListener::default()));
        let mut tracer = Tracer::default();
        assert!(decoder.read_record(&mut tracer).unwrap());
        // 001 skipped, 008 survives, record closed normally
        let calls = tracer.calls.join(";");
        assert!(!calls.contains("begin_control(001)"));
        assert!(calls.contains("begin_control(008)"));
        assert!(calls.ends_with("end_record"));
    }

    #[test]
    fn test_invalid_tag_cleaned_in_lenient_mode() {
        // the directory tag is invalid on purpose
        let mut bytes = build_record(&[], &[("24x", "10", &[("a", "T")])]);
        let mut decoder = Iso2709Decoder::new(Cursor::new(bytes.clone()))
            .with_recovery_mode(RecoveryMode::Lenient);
        let mut tracer = Tracer::default();
        assert!(decoder.read_record(&mut tracer).unwrap());
        assert!(tracer
            .calls
            .iter()
            .any(|c| c.contains(&format!("begin_data({ERROR_TAG}"))));

        // strict mode rejects the same record
        let mut strict = Iso2709Decoder::new(Cursor::new(std::mem::take(&mut bytes)));
        let mut tracer = Tracer::default();
        assert!(strict.read_record(&mut tracer).is_err());
    }

    #[test]
    fn test_empty_stream_returns_false() {
        let mut decoder = Iso2709Decoder::new(Cursor::new(Vec::new()));
        let mut tracer = Tracer::default();
        assert!(!decoder.read_record(&mut tracer).unwrap());
    }

    #[test]
    fn test_parse_counts_multiple_records() {
        let mut bytes = Vec::new();
        for i in 0..3 {
            bytes.extend(build_record(
                &[("001", &format!("id{i}"))],
                &[("245", "10", &[("a", "T")])],
            ));
        }
        let mut decoder = Iso2709Decoder::new(Cursor::new(bytes));
        let mut tracer = Tracer::default();
        assert_eq!(decoder.parse(&mut tracer).unwrap(), 3);
    }

    #[test]
    fn test_length_accounting_round_trip() {
        // the sum of directory lengths plus base address plus the record
        // terminator reproduces the declared record length
        let bytes = build_record(
            &[("001", "123456")],
            &[("245", "10", &[("a", "Test"), ("b", "Sub")])],
        );
        let declared: usize = String::from_utf8_lossy(&bytes[0..5]).parse().unwrap();
        assert_eq!(declared, bytes.len());
        let base: usize = String::from_utf8_lossy(&bytes[12..17]).parse().unwrap();
        let mut sum = 0usize;
        let mut pos = LEADER_LENGTH;
        while bytes[pos] != FIELD_TERMINATOR {
            let len: usize = String::from_utf8_lossy(&bytes[pos + 3..pos + 7]).parse().unwrap();
            sum += len;
            pos += DIRECTORY_ENTRY_WIDTH;
        }
        assert_eq!(base + sum + 1, declared);
    }

    #[test]
    fn test_latin1_encoding() {
        let mut bytes = build_record(&[], &[("245", "10", &[("a", "placeholder")])]);
        // replace "placeholder" with Latin-1 "Müller" keeping lengths right
        let needle = b"placeholder";
        let pos = bytes
            .windows(needle.len())
            .position(|w| w == needle)
            .unwrap();
        let mut latin = b"M\xfcller     ".to_vec();
        latin.truncate(needle.len());
        bytes[pos..pos + needle.len()].copy_from_slice(&latin);

        let mut decoder =
            Iso2709Decoder::new(Cursor::new(bytes)).with_encoding(encoding_rs::WINDOWS_1252);
        let mut tracer = Tracer::default();
        decoder.read_record(&mut tracer).unwrap();
        assert!(tracer.calls.iter().any(|c| c.contains("Müller")));
    }
}

//! Shared fixture builders for unit tests.

use crate::decoder::{FIELD_TERMINATOR, RECORD_TERMINATOR, SUBFIELD_DELIMITER};
use crate::leader::LEADER_LENGTH;

/// Assemble one binary ISO 2709 record from control fields and data fields
/// with subfields.
pub(crate) fn build_record(
    control_fields: &[(&str, &str)],
    data_fields: &[(&str, &str, &[(&str, &str)])],
) -> Vec<u8> {
    let mut directory = Vec::new();
    let mut data = Vec::new();
    for (tag, value) in control_fields {
        let start = data.len();
        data.extend_from_slice(value.as_bytes());
        data.push(FIELD_TERMINATOR);
        push_entry(&mut directory, tag, data.len() - start, start);
    }
    for (tag, indicator, subfields) in data_fields {
        let start = data.len();
        data.extend_from_slice(indicator.as_bytes());
        for (id, value) in *subfields {
            data.push(SUBFIELD_DELIMITER);
            data.extend_from_slice(id.as_bytes());
            data.extend_from_slice(value.as_bytes());
        }
        data.push(FIELD_TERMINATOR);
        push_entry(&mut directory, tag, data.len() - start, start);
    }
    directory.push(FIELD_TERMINATOR);
    let base_address = LEADER_LENGTH + directory.len();
    let record_length = base_address + data.len() + 1;
    let mut record = Vec::with_capacity(record_length);
    record.extend_from_slice(format!("{record_length:05}").as_bytes());
    record.extend_from_slice(b"cam a22");
    record.extend_from_slice(format!("{base_address:05}").as_bytes());
    record.extend_from_slice(b" a 4500");
    assert_eq!(record.len(), LEADER_LENGTH);
    record.extend_from_slice(&directory);
    record.extend_from_slice(&data);
    record.push(RECORD_TERMINATOR);
    record
}

fn push_entry(directory: &mut Vec<u8>, tag: &str, length: usize, start: usize) {
    directory.extend_from_slice(tag.as_bytes());
    directory.extend_from_slice(format!("{length:04}").as_bytes());
    directory.extend_from_slice(format!("{start:05}").as_bytes());
}

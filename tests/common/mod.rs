//! Shared fixtures for the integration suites.

// not every suite uses every fixture
#![allow(dead_code)]

use marcmap::{entities, Specification};
use std::sync::Arc;

const RECORD_TERMINATOR: u8 = 0x1D;
const FIELD_TERMINATOR: u8 = 0x1E;
const SUBFIELD_DELIMITER: u8 = 0x1F;
const LEADER_LENGTH: usize = 24;

/// One field for the fixture builder: a control field or a data field with
/// subfields.
pub enum FixtureField<'a> {
    Control(&'a str, &'a str),
    Data(&'a str, &'a str, Vec<(&'a str, &'a str)>),
}

/// Assemble one binary ISO 2709 record.
pub fn build_record(fields: &[FixtureField<'_>]) -> Vec<u8> {
    let mut directory = Vec::new();
    let mut data = Vec::new();
    for field in fields {
        let start = data.len();
        let tag = match field {
            FixtureField::Control(tag, value) => {
                data.extend_from_slice(value.as_bytes());
                tag
            }
            FixtureField::Data(tag, indicator, subfields) => {
                data.extend_from_slice(indicator.as_bytes());
                for (id, value) in subfields {
                    data.push(SUBFIELD_DELIMITER);
                    data.extend_from_slice(id.as_bytes());
                    data.extend_from_slice(value.as_bytes());
                }
                tag
            }
        };
        data.push(FIELD_TERMINATOR);
        directory.extend_from_slice(tag.as_bytes());
        directory.extend_from_slice(format!("{:04}", data.len() - start).as_bytes());
        directory.extend_from_slice(format!("{start:05}").as_bytes());
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

/// A stream of `n` small bibliographic records with distinct identifiers.
pub fn bibliographic_stream(n: usize) -> Vec<u8> {
    let mut bytes = Vec::new();
    for i in 0..n {
        let id = format!("bib{i:06}");
        let title = format!("Title number {i}");
        let name = format!("Author {i}");
        bytes.extend(build_record(&[
            FixtureField::Control("001", &id),
            FixtureField::Control("008", "850101s1985"),
            FixtureField::Data("100", "1 ", vec![("a", &name)]),
            FixtureField::Data("245", "10", vec![("a", &title), ("c", &name)]),
            FixtureField::Data("650", " 0", vec![("a", "Whaling")]),
        ]));
    }
    bytes
}

/// A stream of `n` holdings records with interleaved control and data
/// fields.
pub fn holdings_stream(n: usize) -> Vec<u8> {
    let mut bytes = Vec::new();
    for i in 0..n {
        let id = format!("hol{i:06}");
        let sigel = if i % 2 == 0 { "HBZ01" } else { "HBZ02" };
        bytes.extend(build_record(&[
            FixtureField::Control("001", &id),
            FixtureField::Data("852", "  ", vec![("a", sigel), ("b", "QA76.9")]),
            FixtureField::Control("008", "ho"),
            FixtureField::Data("866", " 0", vec![("a", "1.1985 -")]),
        ]));
    }
    bytes
}

/// The standard mapping used across the suites.
pub fn standard_spec() -> Arc<Specification> {
    Specification::builder(entities::builtin_registry())
        .load_json(
            r#"{
            "RecordIdentifier": { "values": ["001"], "identifier": "TEST" },
            "RecordLeader": { "values": ["LEADER"] },
            "FormatType": { "values": ["FORMAT", "TYPE"] },
            "Direct": {
                "values": ["245", "100$1$ $a", "650"],
                "subfields": { "a": "value", "c": "statement" }
            },
            "Item": {
                "values": ["852"],
                "subfields": { "a": "member", "b": "shelfmark" },
                "sigel2isil": { "HBZ01": "DE-605", "HBZ02": "DE-606" }
            }
        }"#,
        )
        .expect("standard spec loads")
        .build()
}

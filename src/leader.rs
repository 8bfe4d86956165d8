//! ISO 2709 record leader (label) parsing.
//!
//! The leader is a 24-byte fixed-length header at the start of every record.
//! The decoder needs four things from it: the total record length, the base
//! address of the data area, the indicator length, and the subfield identifier
//! length. The remaining positions describe the record's status, type, and
//! bibliographic level and are carried through to listeners verbatim.
//!
//! # Structure
//!
//! - Positions 0-4: Record length (5 digits)
//! - Position 5: Record status
//! - Position 6: Record type
//! - Position 7: Bibliographic level
//! - Positions 8-9: Implementation-defined
//! - Position 10: Indicator length (usually 2)
//! - Position 11: Subfield identifier length (usually 2: delimiter + code)
//! - Positions 12-16: Base address of data (5 digits)
//! - Positions 17-23: Implementation-defined / entry map

use crate::error::{MarcMapError, Result};
use serde::{Deserialize, Serialize};

/// Length of the record leader in bytes.
pub const LEADER_LENGTH: usize = 24;

/// ISO 2709 record leader.
///
/// Parsed once per record; the structural lengths steer the decoder, the raw
/// label is handed to listeners through the `leader` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leader {
    /// Total record length in bytes, positions 0-4.
    pub record_length: usize,
    /// Record status, position 5.
    pub record_status: char,
    /// Type of record, position 6.
    pub record_type: char,
    /// Bibliographic level, position 7.
    pub bibliographic_level: char,
    /// Number of indicator characters per data field, position 10.
    pub indicator_length: usize,
    /// Length of a subfield identifier (delimiter plus code), position 11.
    pub subfield_id_length: usize,
    /// Base address of the data area, positions 12-16.
    pub base_address: usize,
    /// The raw 24-character label as read from the stream.
    label: String,
}

impl Leader {
    /// Parse a leader from 24 bytes.
    ///
    /// Non-digit indicator/subfield lengths are repaired to the conventional
    /// value 2, matching how existing catalog dumps with damaged labels are
    /// read in practice. Non-digit record length or base address is an error.
    ///
    /// # Errors
    ///
    /// Returns [`MarcMapError::InvalidLeader`] if fewer than 24 bytes are
    /// given or the numeric fields cannot be parsed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < LEADER_LENGTH {
            return Err(MarcMapError::InvalidLeader(format!(
                "leader must be {} bytes, got {}",
                LEADER_LENGTH,
                bytes.len()
            )));
        }
        let record_length = parse_decimal(&bytes[0..5])
            .ok_or_else(|| MarcMapError::InvalidLeader("non-numeric record length".to_string()))?;
        let base_address = parse_decimal(&bytes[12..17])
            .ok_or_else(|| MarcMapError::InvalidLeader("non-numeric base address".to_string()))?;
        let indicator_length = digit_or(bytes[10], 2);
        let subfield_id_length = digit_or(bytes[11], 2);
        Ok(Leader {
            record_length,
            record_status: bytes[5] as char,
            record_type: bytes[6] as char,
            bibliographic_level: bytes[7] as char,
            indicator_length,
            subfield_id_length,
            base_address,
            label: String::from_utf8_lossy(&bytes[..LEADER_LENGTH]).to_string(),
        })
    }

    /// The raw 24-character label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Validate that the structural lengths make binary reading possible.
    ///
    /// # Errors
    ///
    /// Returns an error if `record_length` or `base_address` is less than 24,
    /// or the base address lies beyond the record end.
    pub fn validate_for_reading(&self) -> Result<()> {
        if self.record_length < LEADER_LENGTH {
            return Err(MarcMapError::InvalidLeader(format!(
                "record length must be at least {LEADER_LENGTH}, got {}",
                self.record_length
            )));
        }
        if self.base_address < LEADER_LENGTH {
            return Err(MarcMapError::InvalidLeader(format!(
                "base address must be at least {LEADER_LENGTH}, got {}",
                self.base_address
            )));
        }
        if self.base_address > self.record_length {
            return Err(MarcMapError::InvalidLeader(format!(
                "base address {} beyond record length {}",
                self.base_address, self.record_length
            )));
        }
        Ok(())
    }

    /// Size of the directory area including its terminator byte.
    #[must_use]
    pub fn directory_size(&self) -> usize {
        self.base_address - LEADER_LENGTH
    }
}

fn parse_decimal(bytes: &[u8]) -> Option<usize> {
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

fn digit_or(byte: u8, fallback: usize) -> usize {
    if byte.is_ascii_digit() {
        (byte - b'0') as usize
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leader_from_bytes() {
        let bytes = b"00714cam a2200205 a 4500";
        let leader = Leader::from_bytes(bytes).unwrap();
        assert_eq!(leader.record_length, 714);
        assert_eq!(leader.record_status, 'c');
        assert_eq!(leader.record_type, 'a');
        assert_eq!(leader.bibliographic_level, 'm');
        assert_eq!(leader.indicator_length, 2);
        assert_eq!(leader.subfield_id_length, 2);
        assert_eq!(leader.base_address, 205);
        assert_eq!(leader.label(), "00714cam a2200205 a 4500");
    }

    #[test]
    fn test_leader_too_short() {
        assert!(Leader::from_bytes(b"00714cam").is_err());
    }

    #[test]
    fn test_leader_non_numeric_length() {
        let result = Leader::from_bytes(b"00x14cam a2200205 a 4500");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("non-numeric record length"));
    }

    #[test]
    fn test_leader_repairs_structural_lengths() {
        // blanks at positions 10/11 fall back to the conventional 2
        let bytes = b"00714cam  2200205 a 4500";
        let leader = Leader::from_bytes(bytes).unwrap();
        assert_eq!(leader.indicator_length, 2);
        assert_eq!(leader.subfield_id_length, 2);
    }

    #[test]
    fn test_validate_rejects_small_base_address() {
        let leader = Leader::from_bytes(b"00050cam a2200010 a 4500").unwrap();
        let err = leader.validate_for_reading().unwrap_err();
        assert!(err.to_string().contains("base address"));
    }

    #[test]
    fn test_validate_rejects_base_beyond_record() {
        let leader = Leader::from_bytes(b"00030cam a2200205 a 4500").unwrap();
        assert!(leader.validate_for_reading().is_err());
    }

    #[test]
    fn test_directory_size() {
        let leader = Leader::from_bytes(b"00714cam a2200205 a 4500").unwrap();
        assert_eq!(leader.directory_size(), 205 - 24);
    }
}

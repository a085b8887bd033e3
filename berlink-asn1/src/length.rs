//! Length octets (X.690 §8.1.3).

use crate::source::ByteSource;
use berlink_core::{BerlinkError, BerlinkResult};

/// Marker value for the indefinite length form.
pub const INDEFINITE: i64 = -1;

/// Decoded length octets: the payload length plus the octet count the
/// encoding occupies.
///
/// `value == -1` means the indefinite form (single `0x80` octet); the
/// payload then runs until an end-of-content terminator. Definite lengths
/// are capped at 32 bits: a long form announcing more than four length
/// octets is rejected with `LengthTooLarge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LengthOctets {
    value: i64,
    length: usize,
}

impl LengthOctets {
    /// Definite length octets for `value` (must be non-negative).
    pub fn definite(value: i64) -> Self {
        Self {
            value,
            length: Self::octet_count(value),
        }
    }

    /// The indefinite form.
    pub fn indefinite() -> Self {
        Self {
            value: INDEFINITE,
            length: 1,
        }
    }

    /// Rebuild from parts recovered off the wire.
    pub fn from_parts(value: i64, length: usize) -> Self {
        Self { value, length }
    }

    /// The decoded length; `-1` for the indefinite form.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Octet count of the encoding.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn is_definite(&self) -> bool {
        self.value >= 0
    }

    /// Octet count the encoding of `value` occupies.
    pub fn octet_count(value: i64) -> usize {
        if value < 128 {
            // covers the indefinite marker as well
            1
        } else if value < 256 {
            2
        } else if value < 65_536 {
            3
        } else if value < (1 << 24) {
            4
        } else {
            5
        }
    }

    /// Read length octets from a source.
    ///
    /// By the time length octets are read an identifier has already been
    /// consumed, so a stream running dry here is always `TruncatedHeader`.
    pub fn read<S: ByteSource>(source: &mut S) -> BerlinkResult<LengthOctets> {
        let first = source.next_octet()?.ok_or_else(|| {
            BerlinkError::TruncatedHeader("length octets missing after identifier".into())
        })?;
        if first < 0x80 {
            return Ok(LengthOctets::from_parts(first as i64, 1));
        }
        if first == 0x80 {
            return Ok(LengthOctets::indefinite());
        }
        let count = (first & 0x7F) as usize;
        if count > 4 {
            return Err(BerlinkError::LengthTooLarge(count));
        }
        let mut value = 0i64;
        for _ in 0..count {
            let octet = source.next_octet()?.ok_or_else(|| {
                BerlinkError::TruncatedHeader("long-form length octets truncated".into())
            })?;
            value = (value << 8) | octet as i64;
        }
        Ok(LengthOctets::from_parts(value, 1 + count))
    }

    /// Append the encoding of `value` to `out`.
    pub fn write_value(value: i64, out: &mut Vec<u8>) {
        if value < 0 {
            out.push(0x80);
        } else if value < 128 {
            out.push(value as u8);
        } else {
            let count = Self::octet_count(value) - 1;
            out.push(0x80 | count as u8);
            for shift in (0..count).rev() {
                out.push((value >> (shift * 8)) as u8);
            }
        }
    }

    /// Append this encoding to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        Self::write_value(self.value, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SliceSource, StreamSource};
    use std::io::Cursor;

    fn roundtrip(value: i64) {
        let mut encoded = Vec::new();
        LengthOctets::write_value(value, &mut encoded);
        assert_eq!(encoded.len(), LengthOctets::octet_count(value));

        let mut buffered = SliceSource::new(&encoded);
        let from_buffer = LengthOctets::read(&mut buffered).unwrap();
        assert_eq!(from_buffer.value(), value);
        assert_eq!(from_buffer.length(), encoded.len());

        let mut streamed = StreamSource::new(Cursor::new(encoded));
        let from_stream = LengthOctets::read(&mut streamed).unwrap();
        assert_eq!(from_stream.value(), value);
    }

    #[test]
    fn test_short_form() {
        let mut encoded = Vec::new();
        LengthOctets::write_value(100, &mut encoded);
        assert_eq!(encoded, vec![100]);
    }

    #[test]
    fn test_indefinite_marker() {
        let mut encoded = Vec::new();
        LengthOctets::write_value(-1, &mut encoded);
        assert_eq!(encoded, vec![0x80]);

        let mut source = SliceSource::new(&encoded);
        let decoded = LengthOctets::read(&mut source).unwrap();
        assert!(!decoded.is_definite());
        assert_eq!(decoded.value(), INDEFINITE);
    }

    #[test]
    fn test_long_form_boundaries() {
        for value in [
            127i64,
            128,
            255,
            256,
            65_535,
            65_536,
            (1 << 24) - 1,
            1 << 24,
            i32::MAX as i64,
        ] {
            roundtrip(value);
        }
    }

    #[test]
    fn test_octet_count_table() {
        assert_eq!(LengthOctets::octet_count(-1), 1);
        assert_eq!(LengthOctets::octet_count(0), 1);
        assert_eq!(LengthOctets::octet_count(127), 1);
        assert_eq!(LengthOctets::octet_count(128), 2);
        assert_eq!(LengthOctets::octet_count(255), 2);
        assert_eq!(LengthOctets::octet_count(256), 3);
        assert_eq!(LengthOctets::octet_count(65_536), 4);
        assert_eq!(LengthOctets::octet_count(1 << 24), 5);
    }

    #[test]
    fn test_oversized_length_rejected() {
        // announces five length octets
        let mut source = SliceSource::new(&[0x85, 0x01, 0x02, 0x03, 0x04, 0x05]);
        assert!(matches!(
            LengthOctets::read(&mut source),
            Err(BerlinkError::LengthTooLarge(5))
        ));
    }

    #[test]
    fn test_truncated_long_form() {
        let mut source = StreamSource::new(Cursor::new(vec![0x82u8, 0x01]));
        assert!(matches!(
            LengthOctets::read(&mut source),
            Err(BerlinkError::TruncatedHeader(_))
        ));
    }

    #[test]
    fn test_missing_length_octet() {
        let mut source = StreamSource::new(Cursor::new(Vec::<u8>::new()));
        assert!(matches!(
            LengthOctets::read(&mut source),
            Err(BerlinkError::TruncatedHeader(_))
        ));
    }
}

//! Wire-format definitions for protocol segments.
//!
//! Every datagram exchanged between peers carries exactly one [`Segment`].
//! This module is responsible for:
//! - Defining the header fields and flag bits.
//! - Computing and verifying the 16-bit one's-complement checksum.
//! - Serialising a [`Segment`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Segment`], returning
//!   [`FramingError`] for malformed input.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! The header is ASCII text: eight decimal fields separated by commas, then a
//! literal `|`, then the raw payload bytes.
//!
//! ```text
//! source_port,dest_port,seq,ack,window,mss,flags,checksum|payload...
//! ```
//!
//! `flags` is `syn*4 + ack*2 + fin`.  The header never contains `|`, so the
//! first `|` always ends it; the payload may contain commas and `|` freely.
//!
//! # Checksum
//!
//! The header is viewed as nine 16-bit words: source port, dest port, the
//! high and low halves of `seq`, the high and low halves of `ack`, window,
//! MSS and the flags word.  The payload follows as big-endian 16-bit words,
//! an odd final byte padded with a zero low byte.  Words are summed modulo
//! 2^16 (carries are discarded, not folded back) and the checksum is the
//! one's complement of that sum.

use crate::error::{FramingError, TransportError};

/// Bit-flag constants for the `flags` header field.
pub mod flags {
    /// Synchronise sequence numbers (handshake).
    pub const SYN: u8 = 0b100;
    /// Acknowledgement field is meaningful.
    pub const ACK: u8 = 0b010;
    /// Sender has no more data.
    pub const FIN: u8 = 0b001;
    /// Every defined bit.
    pub const ALL: u8 = SYN | ACK | FIN;
}

/// Separates the textual header from the payload.
pub const DELIMITER: u8 = b'|';

const FIELD_COUNT: usize = 8;

/// Longest possible header text including the trailing `|`: eight fields at
/// full decimal width (5+5+10+10+5+5+1+5 digits) and seven commas.
pub const MAX_HEADER_LEN: usize = 46 + 7 + 1;

/// Header fields covered by the checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub source_port: u16,
    pub dest_port: u16,
    pub seq: u32,
    pub ack: u32,
    /// Advertised receive window, in segments.
    pub window: u16,
    /// Maximum payload bytes per segment; also the sequence-number stride.
    pub mss: u16,
    /// Bitmask of [`flags`] constants.
    pub flags: u8,
}

impl Header {
    pub fn is_syn(&self) -> bool {
        self.flags & flags::SYN != 0
    }

    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }

    pub fn is_fin(&self) -> bool {
        self.flags & flags::FIN != 0
    }
}

/// A complete protocol segment: header, payload and the checksum carried
/// with them.
///
/// A segment is immutable once built.  [`Segment::new`] always stamps a
/// correct checksum; a segment decoded off the wire keeps whatever checksum
/// it arrived with, so [`Segment::verify`] tells whether it was damaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    header: Header,
    payload: Vec<u8>,
    checksum: u16,
}

impl Segment {
    /// Build a segment and stamp its checksum.
    pub fn new(header: Header, payload: impl Into<Vec<u8>>) -> Self {
        let header = Header {
            flags: header.flags & flags::ALL,
            ..header
        };
        let payload = payload.into();
        let checksum = checksum(&header, &payload);
        Self {
            header,
            payload,
            checksum,
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Checksum as carried on the wire.
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    /// Recompute the checksum over header and payload and compare it with
    /// the carried one.  `false` means the segment is corrupt.
    pub fn verify(&self) -> bool {
        checksum(&self.header, &self.payload) == self.checksum
    }

    /// Like [`Segment::verify`], but reports both checksums on mismatch.
    pub fn check(&self) -> Result<(), TransportError> {
        let computed = checksum(&self.header, &self.payload);
        if computed == self.checksum {
            Ok(())
        } else {
            Err(TransportError::ChecksumMismatch {
                carried: self.checksum,
                computed,
            })
        }
    }

    /// Model transmission damage: the carried checksum is bumped by one and
    /// never recomputed.
    pub fn corrupt(mut self) -> Self {
        self.checksum = self.checksum.wrapping_add(1);
        self
    }

    /// Serialise into the framed text format.
    pub fn encode(&self) -> Vec<u8> {
        let h = &self.header;
        let head = format!(
            "{},{},{},{},{},{},{},{}",
            h.source_port, h.dest_port, h.seq, h.ack, h.window, h.mss, h.flags, self.checksum
        );
        let mut buf = Vec::with_capacity(head.len() + 1 + self.payload.len());
        buf.extend_from_slice(head.as_bytes());
        buf.push(DELIMITER);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse a segment from a received datagram.
    ///
    /// The checksum is **not** verified here; see [`Segment::verify`].
    pub fn decode(buf: &[u8]) -> Result<Self, FramingError> {
        let split = buf
            .iter()
            .position(|&b| b == DELIMITER)
            .ok_or(FramingError::MissingDelimiter)?;
        let head = std::str::from_utf8(&buf[..split]).map_err(|_| FramingError::NotText)?;
        let payload = buf[split + 1..].to_vec();

        let fields: Vec<&str> = head.split(',').collect();
        if fields.len() != FIELD_COUNT {
            return Err(FramingError::FieldCount(fields.len()));
        }

        let raw_flags: u32 = parse_field("flags", fields[6])?;
        let header = Header {
            source_port: parse_field("source_port", fields[0])?,
            dest_port: parse_field("dest_port", fields[1])?,
            seq: parse_field("seq_num", fields[2])?,
            ack: parse_field("ack_num", fields[3])?,
            window: parse_field("window", fields[4])?,
            mss: parse_field("mss", fields[5])?,
            flags: (raw_flags & u32::from(flags::ALL)) as u8,
        };
        let checksum = parse_field("checksum", fields[7])?;

        Ok(Self {
            header,
            payload,
            checksum,
        })
    }
}

/// Plain decimal digits only; `str::parse` alone would also take a `+` sign.
fn parse_field<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, FramingError> {
    let invalid = || FramingError::InvalidField {
        field,
        value: value.to_string(),
    };
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    value.parse().map_err(|_| invalid())
}

/// One's complement of the wraparound 16-bit sum of header words and payload.
pub fn checksum(header: &Header, payload: &[u8]) -> u16 {
    let words = [
        header.source_port,
        header.dest_port,
        (header.seq >> 16) as u16,
        header.seq as u16,
        (header.ack >> 16) as u16,
        header.ack as u16,
        header.window,
        header.mss,
        u16::from(header.flags & flags::ALL),
    ];

    let mut sum = words.iter().fold(0u16, |acc, &w| acc.wrapping_add(w));
    for pair in payload.chunks(2) {
        let lo = pair.get(1).copied().unwrap_or(0);
        sum = sum.wrapping_add(u16::from_be_bytes([pair[0], lo]));
    }

    !sum
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header(seq: u32, ack: u32, flags: u8) -> Header {
        Header {
            source_port: 8001,
            dest_port: 8000,
            seq,
            ack,
            window: 9,
            mss: 15,
            flags,
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let seg = Segment::new(make_header(42, 7, flags::SYN), "Hello, world");
        let decoded = Segment::decode(&seg.encode()).unwrap();
        assert_eq!(decoded, seg);
        assert!(decoded.verify());
    }

    #[test]
    fn odd_length_payload_roundtrip() {
        let seg = Segment::new(make_header(1, 2, flags::ACK), "abc");
        let decoded = Segment::decode(&seg.encode()).unwrap();
        assert_eq!(decoded.payload(), b"abc");
        assert!(decoded.verify());
    }

    #[test]
    fn empty_payload_roundtrip() {
        let seg = Segment::new(make_header(0, 1000, flags::ACK), Vec::new());
        let bytes = seg.encode();
        assert_eq!(bytes.last(), Some(&DELIMITER));
        let decoded = Segment::decode(&bytes).unwrap();
        assert!(decoded.payload().is_empty());
        assert!(decoded.verify());
    }

    #[test]
    fn wire_text_layout() {
        let seg = Segment::new(make_header(100, 0, flags::SYN | flags::ACK), "hi");
        let text = String::from_utf8(seg.encode()).unwrap();
        assert_eq!(text, format!("8001,8000,100,0,9,15,6,{}|hi", seg.checksum()));
    }

    #[test]
    fn payload_may_contain_commas_and_delimiters() {
        let seg = Segment::new(make_header(3, 4, 0), "a,b|c,d");
        let decoded = Segment::decode(&seg.encode()).unwrap();
        assert_eq!(decoded.payload(), b"a,b|c,d");
        assert!(decoded.verify());
    }

    #[test]
    fn checksum_known_value() {
        // 1+2+0+3+0+4+5+6+(4|1) = 26; payload "ab" = 0x6162.
        let h = Header {
            source_port: 1,
            dest_port: 2,
            seq: 3,
            ack: 4,
            window: 5,
            mss: 6,
            flags: flags::SYN | flags::FIN,
        };
        assert_eq!(checksum(&h, b""), !26u16);
        assert_eq!(checksum(&h, b"ab"), !(26u16 + 0x6162));
        // Odd byte is the high half of a zero-padded word.
        assert_eq!(checksum(&h, b"a"), !(26u16 + 0x6100));
    }

    #[test]
    fn checksum_splits_seq_and_ack_into_halves() {
        let mut h = make_header(0x0001_0002, 0x0003_0004, 0);
        h.source_port = 0;
        h.dest_port = 0;
        h.window = 0;
        h.mss = 0;
        assert_eq!(checksum(&h, b""), !(1u16 + 2 + 3 + 4));
    }

    #[test]
    fn checksum_wraps_without_folding_carry() {
        let h = Header {
            source_port: 0xffff,
            dest_port: 0x0002,
            ..Header::default()
        };
        // 0xffff + 2 = 0x0001 mod 2^16; a folded sum would give 0x0002.
        assert_eq!(checksum(&h, b""), !0x0001u16);
    }

    #[test]
    fn flipping_any_checksum_bit_fails_verification() {
        let seg = Segment::new(make_header(99, 5, flags::ACK), "payload!");
        for bit in 0..16 {
            let mut damaged = seg.clone();
            damaged.checksum ^= 1 << bit;
            assert!(!damaged.verify(), "bit {bit} flip went unnoticed");
        }
    }

    #[test]
    fn corrupt_bumps_checksum_by_one() {
        let seg = Segment::new(make_header(10, 0, 0), "data");
        let original = seg.checksum();
        let damaged = seg.corrupt();
        assert_eq!(damaged.checksum(), original.wrapping_add(1));
        assert!(!damaged.verify());
        let decoded = Segment::decode(&damaged.encode()).unwrap();
        assert!(!decoded.verify());
    }

    #[test]
    fn check_reports_both_checksums() {
        let seg = Segment::new(make_header(10, 0, 0), "data");
        assert!(seg.check().is_ok());
        let good = seg.checksum();
        match seg.corrupt().check() {
            Err(TransportError::ChecksumMismatch { carried, computed }) => {
                assert_eq!(computed, good);
                assert_eq!(carried, good.wrapping_add(1));
            }
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
    }

    #[test]
    fn widest_header_fits_max_header_len() {
        let h = Header {
            source_port: u16::MAX,
            dest_port: u16::MAX,
            seq: u32::MAX,
            ack: u32::MAX,
            window: u16::MAX,
            mss: u16::MAX,
            flags: flags::ALL,
        };
        let bytes = Segment::new(h, "xy").encode();
        assert!(bytes.len() - 2 <= MAX_HEADER_LEN);
    }

    #[test]
    fn decode_rejects_padded_fields() {
        let h = make_header(5, 0, flags::ACK);
        let sum = checksum(&h, b"");
        for text in [
            format!("8001,8000, 5,0,9,15,2,{sum}|"),
            format!("8001,8000,5 ,0,9,15,2,{sum}|"),
            format!("8001,8000,5,0,9,15,2,{sum}\n|"),
            format!("8001,8000,+5,0,9,15,2,{sum}|"),
        ] {
            assert!(
                matches!(
                    Segment::decode(text.as_bytes()),
                    Err(FramingError::InvalidField { .. })
                ),
                "{text:?} was accepted"
            );
        }
    }

    #[test]
    fn flags_are_independent() {
        let seg = Segment::new(make_header(0, 0, flags::FIN | flags::ACK), "");
        let h = Segment::decode(&seg.encode()).unwrap().header;
        assert!(h.is_fin());
        assert!(h.is_ack());
        assert!(!h.is_syn());
    }

    #[test]
    fn decode_masks_unknown_flag_bits() {
        let h = make_header(0, 0, flags::SYN);
        let sum = checksum(&h, b"");
        let text = format!("8001,8000,0,0,9,15,12,{sum}|");
        let decoded = Segment::decode(text.as_bytes()).unwrap();
        assert_eq!(decoded.header().flags, flags::SYN);
        assert!(decoded.verify());
    }

    #[test]
    fn decode_missing_delimiter() {
        assert_eq!(
            Segment::decode(b"1,2,3,4,5,6,7,8"),
            Err(FramingError::MissingDelimiter)
        );
        assert_eq!(Segment::decode(b""), Err(FramingError::MissingDelimiter));
    }

    #[test]
    fn decode_wrong_field_count() {
        assert_eq!(
            Segment::decode(b"1,2,3,4,5,6,7|x"),
            Err(FramingError::FieldCount(7))
        );
        assert_eq!(
            Segment::decode(b"1,2,3,4,5,6,7,8,9|"),
            Err(FramingError::FieldCount(9))
        );
    }

    #[test]
    fn decode_non_numeric_field() {
        let err = Segment::decode(b"1,2,three,4,5,6,7,8|").unwrap_err();
        assert_eq!(
            err,
            FramingError::InvalidField {
                field: "seq_num",
                value: "three".into()
            }
        );
    }

    #[test]
    fn decode_out_of_range_port() {
        let err = Segment::decode(b"70000,2,3,4,5,6,7,8|").unwrap_err();
        assert!(matches!(
            err,
            FramingError::InvalidField {
                field: "source_port",
                ..
            }
        ));
    }

    #[test]
    fn decode_binary_header_is_rejected() {
        assert_eq!(
            Segment::decode(&[0xff, 0xfe, b'|']),
            Err(FramingError::NotText)
        );
    }
}

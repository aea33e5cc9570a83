//! Order-preserving byte encoding for `Tuple`s of `TypedValue`s.
//!
//! The tag bytes below are chosen, as in the ambient codebase's `indexing::encoding`
//! module, to provide the cross-type sort order `null < bool < int < float < string`
//! that §4.6 fixes as the one cross-type comparison axiom the planner depends on.

use crate::value::TypedValue;
use std::cmp::Ordering;

pub const TAG_NULL: u8 = 0x01;
pub const TAG_BOOL: u8 = 0x02;
pub const TAG_INT: u8 = 0x03;
pub const TAG_FLOAT: u8 = 0x04;
pub const TAG_STRING: u8 = 0x05;
pub const TAG_BYTES: u8 = 0x06;

/// An ordered tuple of typed components; the unit of key construction for every
/// subspace in §3.1.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tuple(pub Vec<TypedValue>);

impl Tuple {
    pub fn new(values: Vec<TypedValue>) -> Self { Self(values) }
    pub fn empty() -> Self { Self(Vec::new()) }
    pub fn push(&mut self, value: TypedValue) { self.0.push(value) }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for v in &self.0 {
            encode_component(v, &mut out);
        }
        out
    }

    /// The smallest tuple-encoded key strictly greater than this tuple's encoding.
    /// This is the `tuple.next()` operation §6 requires implementations to supply:
    /// used to turn an inclusive bound into an exclusive one when constructing ranges
    /// (e.g. `=` becomes `[v, v.next())`).
    pub fn successor_bytes(&self) -> Vec<u8> { lex_successor(self.encode()) }

    /// Decodes every component of an encoded tuple, repeatedly peeling one off with
    /// `decode_first_component` until the input is exhausted. Used by the index-scan
    /// executor to recover an index entry's full `(key..., primary_key...)` tuple
    /// from raw key bytes, where `decode_first_component` alone only ever peels one
    /// dimension at a time for the statistics collector.
    pub fn decode(mut bytes: &[u8]) -> Option<Tuple> {
        let mut out = Vec::new();
        while !bytes.is_empty() {
            let (value, consumed) = decode_first_component(bytes)?;
            out.push(value);
            bytes = &bytes[consumed..];
        }
        Some(Tuple::new(out))
    }
}

impl From<Vec<TypedValue>> for Tuple {
    fn from(values: Vec<TypedValue>) -> Self { Tuple(values) }
}

fn encode_component(value: &TypedValue, out: &mut Vec<u8>) {
    match value {
        TypedValue::Null => out.push(TAG_NULL),
        TypedValue::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(if *b { 1 } else { 0 });
        }
        TypedValue::I64(v) => {
            out.push(TAG_INT);
            // Big-endian with the sign bit flipped sorts negative-before-positive using
            // plain byte-lexicographic comparison.
            let mut bytes = v.to_be_bytes();
            bytes[0] ^= 0x80;
            out.extend_from_slice(&bytes);
        }
        TypedValue::F64(v) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&encode_f64(*v));
        }
        TypedValue::String(s) => {
            out.push(TAG_STRING);
            encode_escaped(s.as_bytes(), out);
        }
        TypedValue::Bytes(b) => {
            out.push(TAG_BYTES);
            encode_escaped(b, out);
        }
    }
}

/// IEEE-754 order-preserving transform: flip the sign bit for positive numbers, flip
/// every bit for negative numbers. Gives a big-endian byte sequence whose
/// lexicographic order matches numeric order (NaN excluded from range use).
fn encode_f64(v: f64) -> [u8; 8] {
    let bits = v.to_bits();
    let transformed = if bits & (1u64 << 63) != 0 { !bits } else { bits | (1u64 << 63) };
    transformed.to_be_bytes()
}

/// Escape `0x00` as `0x00 0xFF` and terminate with `0x00 0x00`, so a shorter string is
/// always ordered before any extension of it while keeping the encoding unambiguous and
/// still a valid byte-lexicographic delimiter.
fn encode_escaped(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        if b == 0x00 {
            out.push(0x00);
            out.push(0xFF);
        } else {
            out.push(b);
        }
    }
    out.push(0x00);
    out.push(0x00);
}

/// Smallest byte string strictly greater than `key`, by bytewise increment-with-carry.
/// When every byte is already `0xFF`, no in-place increment exists, so a `0x00` byte is
/// appended instead: a proper prefix always sorts before any extension of it, so
/// `key ++ [0x00] > key` holds unconditionally.
pub fn lex_successor(mut key: Vec<u8>) -> Vec<u8> {
    for i in (0..key.len()).rev() {
        if key[i] != 0xFF {
            key[i] += 1;
            key.truncate(i + 1);
            return key;
        }
    }
    key.push(0x00);
    key
}

/// Byte-lexicographic comparison, exposed for callers that only hold encoded keys.
pub fn compare_bytes(a: &[u8], b: &[u8]) -> Ordering { a.cmp(b) }

/// Tag byte plus NUL-escaped bytes of `s`, deliberately missing the `0x00 0x00`
/// terminator `encode_component` would add: a valid byte-lexicographic prefix
/// shared by every string extending `s`. Used by the query planner to build
/// `startsWith` range bounds as `[prefix, lex_successor(prefix))`, the same
/// prefix-then-successor idiom `Subspace::prefix_range` uses for whole tuples.
pub fn encode_string_prefix(s: &str) -> Vec<u8> {
    let mut out = vec![TAG_STRING];
    for &b in s.as_bytes() {
        if b == 0x00 {
            out.push(0x00);
            out.push(0xFF);
        } else {
            out.push(b);
        }
    }
    out
}

/// Decodes the first component of an encoded tuple, returning it along with the
/// number of bytes it occupied. Used by the statistics collector to recover an
/// index's histogram dimension from its raw key bytes without decoding the whole
/// tuple (the primary key suffix that follows it is opaque to that caller anyway).
pub fn decode_first_component(bytes: &[u8]) -> Option<(TypedValue, usize)> {
    let (&tag, rest) = bytes.split_first()?;
    match tag {
        TAG_NULL => Some((TypedValue::Null, 1)),
        TAG_BOOL => rest.first().map(|&b| (TypedValue::Bool(b != 0), 2)),
        TAG_INT => {
            if rest.len() < 8 {
                return None;
            }
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&rest[..8]);
            buf[0] ^= 0x80;
            Some((TypedValue::I64(i64::from_be_bytes(buf)), 9))
        }
        TAG_FLOAT => {
            if rest.len() < 8 {
                return None;
            }
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&rest[..8]);
            let bits = u64::from_be_bytes(buf);
            let restored = if bits & (1u64 << 63) != 0 { bits & !(1u64 << 63) } else { !bits };
            Some((TypedValue::F64(f64::from_bits(restored)), 9))
        }
        TAG_STRING | TAG_BYTES => {
            let (decoded, consumed) = decode_escaped(rest)?;
            let value = if tag == TAG_STRING { TypedValue::String(String::from_utf8(decoded).ok()?) } else { TypedValue::Bytes(decoded) };
            Some((value, 1 + consumed))
        }
        _ => None,
    }
}

/// Reverses `encode_escaped`: un-escapes `0x00 0xFF` back to a single `0x00` byte,
/// stopping at the `0x00 0x00` terminator. Returns the decoded bytes and how many
/// input bytes (including the terminator) were consumed.
fn decode_escaped(bytes: &[u8]) -> Option<(Vec<u8>, usize)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            0x00 => match bytes.get(i + 1) {
                Some(0x00) => return Some((out, i + 2)),
                Some(0xFF) => {
                    out.push(0x00);
                    i += 2;
                }
                _ => return None,
            },
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    None
}

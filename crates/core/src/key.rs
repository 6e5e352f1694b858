//! Group keys and their canonical byte encoding.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::{Timestamp, Value};

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_STR: u8 = 4;
const TAG_TIME: u8 = 5;

const SIGN_BIT: u64 = 1 << 63;

/// An ordered tuple of typed values identifying one aggregation group.
///
/// Immutable after construction and cheap to clone (the values live behind an
/// `Arc`). Equality is structural; the order is lexicographic over the tuple,
/// so a time value at position 0 makes event time the primary sort key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    values: Arc<[Value]>,
}

impl GroupKey {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values: Arc::from(values.into_boxed_slice()),
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// The key's event time: the value at position 0, when it is time-typed.
    ///
    /// By convention the planner puts the event-time column first for
    /// watermark-triggered aggregations.
    pub fn event_time(&self) -> Option<Timestamp> {
        self.values.first().and_then(Value::as_time)
    }

    /// Canonical order-preserving encoding.
    ///
    /// For keys of equal arity, `encode(a) < encode(b)` bytewise iff `a < b`.
    /// Each value is a tag byte (its type rank) followed by a payload whose
    /// byte order matches the value order:
    /// - `Int`: sign-flipped big-endian
    /// - `Float`: IEEE total-order bit transform, big-endian
    /// - `Str`: raw bytes with `0x00` escaped as `0x00 0xFF`, terminated by `0x00`
    /// - `Time`: big-endian nanoseconds
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.values.len() * 9);
        for value in self.values.iter() {
            encode_value(value, &mut out);
        }
        out
    }

    /// Decodes a key previously produced by [`encode`](Self::encode).
    pub fn decode(mut bytes: &[u8]) -> Result<Self, KeyCodecError> {
        let mut values = Vec::new();
        while !bytes.is_empty() {
            let (value, rest) = decode_value(bytes)?;
            values.push(value);
            bytes = rest;
        }
        Ok(Self::new(values))
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

/// Failure to decode bytes that should hold an encoded [`GroupKey`].
#[derive(Debug, thiserror::Error)]
pub enum KeyCodecError {
    #[error("unknown value tag {0:#04x}")]
    UnknownTag(u8),
    #[error("truncated value payload")]
    Truncated,
    #[error("invalid utf-8 in string value")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

fn encode_value(value: &Value, out: &mut Vec<u8>) {
    out.push(value.type_rank());
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push(u8::from(*b)),
        Value::Int(i) => out.extend_from_slice(&((*i as u64) ^ SIGN_BIT).to_be_bytes()),
        Value::Float(f) => {
            let bits = f.to_bits();
            // Negative floats sort descending by raw bits; inverting them (and
            // setting the sign bit on positives) yields total order.
            let ordered = if bits & SIGN_BIT != 0 { !bits } else { bits | SIGN_BIT };
            out.extend_from_slice(&ordered.to_be_bytes());
        }
        Value::Str(s) => {
            for &b in s.as_bytes() {
                if b == 0x00 {
                    out.push(0x00);
                    out.push(0xFF);
                } else {
                    out.push(b);
                }
            }
            out.push(0x00);
        }
        Value::Time(t) => out.extend_from_slice(&t.to_be_bytes()),
    }
}

fn decode_value(bytes: &[u8]) -> Result<(Value, &[u8]), KeyCodecError> {
    let (&tag, rest) = bytes.split_first().ok_or(KeyCodecError::Truncated)?;
    match tag {
        TAG_NULL => Ok((Value::Null, rest)),
        TAG_BOOL => {
            let (&b, rest) = rest.split_first().ok_or(KeyCodecError::Truncated)?;
            Ok((Value::Bool(b != 0), rest))
        }
        TAG_INT => {
            let (raw, rest) = take_u64(rest)?;
            Ok((Value::Int((raw ^ SIGN_BIT) as i64), rest))
        }
        TAG_FLOAT => {
            let (ordered, rest) = take_u64(rest)?;
            let bits = if ordered & SIGN_BIT != 0 { ordered & !SIGN_BIT } else { !ordered };
            Ok((Value::Float(f64::from_bits(bits)), rest))
        }
        TAG_STR => {
            let mut raw = Vec::new();
            let mut i = 0;
            loop {
                match rest.get(i) {
                    None => return Err(KeyCodecError::Truncated),
                    Some(0x00) => match rest.get(i + 1) {
                        Some(0xFF) => {
                            raw.push(0x00);
                            i += 2;
                        }
                        _ => {
                            // Terminator.
                            i += 1;
                            break;
                        }
                    },
                    Some(&b) => {
                        raw.push(b);
                        i += 1;
                    }
                }
            }
            Ok((Value::Str(String::from_utf8(raw)?), &rest[i..]))
        }
        TAG_TIME => {
            let (t, rest) = take_u64(rest)?;
            Ok((Value::Time(t), rest))
        }
        other => Err(KeyCodecError::UnknownTag(other)),
    }
}

fn take_u64(bytes: &[u8]) -> Result<(u64, &[u8]), KeyCodecError> {
    if bytes.len() < 8 {
        return Err(KeyCodecError::Truncated);
    }
    let (head, rest) = bytes.split_at(8);
    let mut buf = [0u8; 8];
    buf.copy_from_slice(head);
    Ok((u64::from_be_bytes(buf), rest))
}

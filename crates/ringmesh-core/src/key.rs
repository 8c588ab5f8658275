//! Ring identifiers.
//!
//! A [`Key`] is a 160-bit unsigned integer on a ring: all arithmetic wraps
//! modulo 2^160. Keys name overlay nodes and routing destinations alike.
//!
//! Two notions of "order" coexist and must not be confused:
//!   - `Ord` is plain numeric order, used only for deterministic tie-breaks.
//!   - [`Key::distance`] / [`Key::between`] are ring-aware and drive routing.
//!
//! Digits are base 16 (`BASE_B` = 4 bits), so a key has 40 digits and the
//! routing table has one row per shared-prefix length.

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Key width in bytes.
pub const KEY_BYTES: usize = 20;

/// Key width in bits.
pub const KEY_BITS: usize = KEY_BYTES * 8;

/// Bits per routing digit.
pub const BASE_B: usize = 4;

/// Number of digits in a key, which is also the number of routing table rows.
pub const KEY_DIGITS: usize = KEY_BITS / BASE_B;

/// Number of distinct digit values: the routing table row width.
pub const DIGIT_VALUES: usize = 1 << BASE_B;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum KeyError {
    #[error("key string has {0} hex digits, at most {KEY_DIGITS} allowed")]
    TooLong(usize),
    #[error("invalid hex in key string: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A point on the 160-bit identifier ring. Big-endian byte order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Key([u8; KEY_BYTES]);

impl Key {
    pub const ZERO: Key = Key([0u8; KEY_BYTES]);

    /// 2^160 − 1.
    pub const MAX: Key = Key([0xff; KEY_BYTES]);

    /// 2^159, the point diametrically opposite zero.
    pub const HALF: Key = Key([
        0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ]);

    pub const fn from_bytes(bytes: [u8; KEY_BYTES]) -> Self {
        Key(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }

    /// Key whose low 32 bits are `v`.
    pub fn from_u32(v: u32) -> Self {
        let mut b = [0u8; KEY_BYTES];
        b[KEY_BYTES - 4..].copy_from_slice(&v.to_be_bytes());
        Key(b)
    }

    /// Parse a hexadecimal key. Shorter strings are left-padded with zeros,
    /// so `"ff"` is the key 255.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.len() > KEY_DIGITS {
            return Err(KeyError::TooLong(s.len()));
        }
        let padded = format!("{:0>width$}", s, width = KEY_DIGITS);
        let mut b = [0u8; KEY_BYTES];
        hex::decode_to_slice(padded, &mut b)?;
        Ok(Key(b))
    }

    /// Digest an arbitrary byte buffer (embedded NULs included) into a key.
    /// BLAKE3 output truncated to the key width.
    pub fn hash(data: &[u8]) -> Self {
        let digest = blake3::hash(data);
        let mut b = [0u8; KEY_BYTES];
        b.copy_from_slice(&digest.as_bytes()[..KEY_BYTES]);
        Key(b)
    }

    pub fn hash_str(s: &str) -> Self {
        Self::hash(s.as_bytes())
    }

    pub fn random() -> Self {
        Key(rand::random::<[u8; KEY_BYTES]>())
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Clockwise distance from `self` to `other`: `(other - self) mod 2^160`.
    pub fn distance(&self, other: &Key) -> Key {
        *other - *self
    }

    /// Ring length of the arc from `self` clockwise to `upper`.
    pub fn interval_size(&self, upper: &Key) -> Key {
        self.distance(upper)
    }

    /// Shorter of the two arcs between `self` and `other`.
    pub fn ring_distance(&self, other: &Key) -> Key {
        let cw = self.distance(other);
        let ccw = other.distance(self);
        cw.min(ccw)
    }

    /// True if walking clockwise from `left` reaches `self` before passing
    /// `right`. Both edges are inside; `left == right` covers the whole ring.
    pub fn between(&self, left: &Key, right: &Key) -> bool {
        if self == left || self == right {
            return true;
        }
        if left < right {
            left < self && self < right
        } else {
            // Arc wraps past zero: only (right, left) is outside.
            !(right < self && self < left)
        }
    }

    /// The point diametrically opposite `self`.
    pub fn midpoint(&self) -> Key {
        *self + Key::HALF
    }

    /// Digit `i` (0 = most significant), `i < KEY_DIGITS`.
    pub fn digit(&self, i: usize) -> usize {
        let byte = self.0[i / 2];
        if i % 2 == 0 {
            (byte >> 4) as usize
        } else {
            (byte & 0x0f) as usize
        }
    }

    /// Length in digits of the longest common prefix with `other`.
    pub fn key_index(&self, other: &Key) -> usize {
        for (i, (a, b)) in self.0.iter().zip(other.0.iter()).enumerate() {
            if a != b {
                return if (a >> 4) == (b >> 4) { 2 * i + 1 } else { 2 * i };
            }
        }
        KEY_DIGITS
    }
}

impl Add for Key {
    type Output = Key;

    fn add(self, rhs: Key) -> Key {
        let mut out = [0u8; KEY_BYTES];
        let mut carry = 0u16;
        for i in (0..KEY_BYTES).rev() {
            let sum = self.0[i] as u16 + rhs.0[i] as u16 + carry;
            out[i] = sum as u8;
            carry = sum >> 8;
        }
        Key(out)
    }
}

impl Sub for Key {
    type Output = Key;

    fn sub(self, rhs: Key) -> Key {
        let mut out = [0u8; KEY_BYTES];
        let mut borrow = 0i16;
        for i in (0..KEY_BYTES).rev() {
            let mut diff = self.0[i] as i16 - rhs.0[i] as i16 - borrow;
            if diff < 0 {
                diff += 256;
                borrow = 1;
            } else {
                borrow = 0;
            }
            out[i] = diff as u8;
        }
        Key(out)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", hex::encode(self.0))
    }
}

impl FromStr for Key {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Key::from_hex(s)
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Key::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

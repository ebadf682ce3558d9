use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Base-32 character map; index is the encoded symbol value
const CHARMAP: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";

/// An account name, packed into a u64.
///
/// Names are up to 12 characters from `.12345a-z` at 5 bits each, plus an
/// optional 13th character restricted to the first 16 symbols. Ordering is
/// the numeric ordering of the packed value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AccountName(u64);

fn symbol_value(c: u8) -> Option<u64> {
    match c {
        b'.' => Some(0),
        b'1'..=b'5' => Some((c - b'1') as u64 + 1),
        b'a'..=b'z' => Some((c - b'a') as u64 + 6),
        _ => None,
    }
}

impl AccountName {
    pub const fn from_u64(value: u64) -> Self {
        AccountName(value)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl FromStr for AccountName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.is_empty() || bytes.len() > 13 {
            return Err(CoreError::InvalidName(s.to_string()));
        }
        // Trailing dots encode as zero and would not round-trip
        if bytes.ends_with(b".") {
            return Err(CoreError::InvalidName(s.to_string()));
        }

        let mut value: u64 = 0;
        for (i, &c) in bytes.iter().enumerate() {
            let sym = symbol_value(c).ok_or_else(|| CoreError::InvalidName(s.to_string()))?;
            if i < 12 {
                value |= (sym & 0x1f) << (64 - 5 * (i as u64 + 1));
            } else {
                // 13th character carries only the low 4 bits
                if sym > 0x0f {
                    return Err(CoreError::InvalidName(s.to_string()));
                }
                value |= sym;
            }
        }

        Ok(AccountName(value))
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = [b'.'; 13];
        let mut tmp = self.0;
        for i in 0..13 {
            let idx = if i == 0 {
                (tmp & 0x0f) as usize
            } else {
                (tmp & 0x1f) as usize
            };
            buf[12 - i] = CHARMAP[idx];
            tmp >>= if i == 0 { 4 } else { 5 };
        }

        let end = buf
            .iter()
            .rposition(|&c| c != b'.')
            .map(|p| p + 1)
            .unwrap_or(0);
        // buf only ever holds charmap bytes, which are ASCII
        f.write_str(std::str::from_utf8(&buf[..end]).unwrap_or(""))
    }
}

impl fmt::Debug for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountName({})", self)
    }
}

// Human-readable formats (JSON ABIs) carry the string form; the packed
// codec carries the raw u64.

impl Serialize for AccountName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            serializer.serialize_u64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for AccountName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            if s.is_empty() {
                return Ok(AccountName::default());
            }
            s.parse().map_err(serde::de::Error::custom)
        } else {
            Ok(AccountName(u64::deserialize(deserializer)?))
        }
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Microseconds since the unix epoch
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct TimePoint(i64);

impl TimePoint {
    pub const fn from_micros(micros: i64) -> Self {
        TimePoint(micros)
    }

    pub const fn from_millis(millis: i64) -> Self {
        TimePoint(millis * 1_000)
    }

    pub const fn micros(&self) -> i64 {
        self.0
    }

    pub const fn millis(&self) -> i64 {
        self.0 / 1_000
    }
}

/// Milliseconds between consecutive block slots
pub const BLOCK_INTERVAL_MS: i64 = 500;

/// Unix milliseconds of slot zero (2000-01-01T00:00:00Z)
pub const BLOCK_TIMESTAMP_EPOCH_MS: i64 = 946_684_800_000;

/// A block timestamp, counted in half-second slots since the chain epoch.
///
/// The compact u32 representation is what block headers carry on the wire.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct BlockTimestamp(u32);

impl BlockTimestamp {
    pub const fn from_slot(slot: u32) -> Self {
        BlockTimestamp(slot)
    }

    pub const fn slot(&self) -> u32 {
        self.0
    }

    /// The slot immediately after this one
    pub const fn next(&self) -> Self {
        BlockTimestamp(self.0 + 1)
    }

    /// Truncates to the containing slot; times before the chain epoch map to slot zero
    pub fn from_time_point(tp: TimePoint) -> Self {
        let ms = tp.millis() - BLOCK_TIMESTAMP_EPOCH_MS;
        if ms <= 0 {
            return BlockTimestamp(0);
        }
        BlockTimestamp((ms / BLOCK_INTERVAL_MS) as u32)
    }

    pub fn to_time_point(&self) -> TimePoint {
        TimePoint::from_millis(self.0 as i64 * BLOCK_INTERVAL_MS + BLOCK_TIMESTAMP_EPOCH_MS)
    }
}

impl fmt::Debug for BlockTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockTimestamp(slot={})", self.0)
    }
}

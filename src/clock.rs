//! # Mux Clock
//!
//! A 64-bit virtual time value in `(seconds, nanoseconds)`, used both as
//! the muxer's own emission clock and as each stream's individual
//! virtual clock. Comparisons are lexicographic on `(sec, nanosec)`;
//! arithmetic normalizes nanosecond carry into seconds.

use std::cmp::Ordering;

/// A point in virtual muxing time.
///
/// `nanosec` is always kept in `[0, 1_000_000_000)`; construction and
/// arithmetic both normalize overflow into `sec`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeValue {
    sec: u32,
    nanosec: u32,
}

const NANOS_PER_SEC: u64 = 1_000_000_000;

impl TimeValue {
    /// The zero time value.
    pub const ZERO: TimeValue = TimeValue { sec: 0, nanosec: 0 };

    /// Builds a `TimeValue`, normalizing a `nanosec` that overflows a
    /// single second rather than panicking.
    pub fn new(sec: u32, nanosec: u32) -> Self {
        let total = sec as u64 + (nanosec as u64 / NANOS_PER_SEC);
        TimeValue {
            sec: total as u32,
            nanosec: nanosec % NANOS_PER_SEC as u32,
        }
    }

    /// Whole seconds component.
    pub fn sec(&self) -> u32 {
        self.sec
    }

    /// Nanoseconds component, always `< 1_000_000_000`.
    pub fn nanosec(&self) -> u32 {
        self.nanosec
    }

    /// Total nanoseconds since zero, widened to avoid overflow.
    pub fn as_nanos(&self) -> u128 {
        self.sec as u128 * NANOS_PER_SEC as u128 + self.nanosec as u128
    }

    /// Advances this clock by `numerator / denominator` seconds using
    /// exact integer arithmetic. A zero `denominator` is a no-op,
    /// matching "insufficient rate info" in the data model (§3).
    pub fn advance(&mut self, numerator: u64, denominator: u64) {
        if denominator == 0 {
            return;
        }
        let add_nanos = (numerator as u128 * NANOS_PER_SEC as u128) / denominator as u128;
        let total = self.as_nanos() + add_nanos;
        self.sec = (total / NANOS_PER_SEC as u128) as u32;
        self.nanosec = (total % NANOS_PER_SEC as u128) as u32;
    }

    /// Adds a duration given directly in 90 kHz clock ticks (PTS/DTS
    /// units), used when seeding a stream's clock from an access
    /// unit's timestamp relative to the program's PCR origin.
    pub fn plus_90khz_ticks(mut self, ticks: i64) -> Self {
        const HZ: i64 = 90_000;
        if ticks >= 0 {
            self.advance(ticks as u64, HZ as u64);
        } else {
            let back = TimeValue::from_90khz_ticks((-ticks) as u64);
            let nanos = self.as_nanos().saturating_sub(back.as_nanos());
            self.sec = (nanos / NANOS_PER_SEC as u128) as u32;
            self.nanosec = (nanos % NANOS_PER_SEC as u128) as u32;
        }
        self
    }

    /// Builds a `TimeValue` directly from a count of 90 kHz ticks.
    pub fn from_90khz_ticks(ticks: u64) -> Self {
        let mut t = TimeValue::ZERO;
        t.advance(ticks, 90_000);
        t
    }
}

impl PartialOrd for TimeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sec.cmp(&other.sec).then(self.nanosec.cmp(&other.nanosec))
    }
}

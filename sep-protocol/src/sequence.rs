//! Sequence Number Handling
//!
//! SEP sequence numbers are full 32-bit counters, one per endpoint and
//! direction. The value 0 is reserved to mean "nothing received yet", so the
//! first message on every endpoint carries sequence number 1.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// Sequence number with 32-bit wraparound semantics
///
/// Counters start at 1 and are never reset while an endpoint is registered.
/// Distances are computed with wrapping arithmetic so ordering stays correct
/// even if a session outlives `u32::MAX` messages.
/// Not `Ord`: compare with [`precedes`](SeqNumber::precedes) and
/// [`follows`](SeqNumber::follows), which respect the wrap.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct SeqNumber(u32);

impl SeqNumber {
    /// The "nothing received yet" marker
    pub const NONE: SeqNumber = SeqNumber(0);

    /// The first sequence number assigned to outgoing messages
    pub const FIRST: SeqNumber = SeqNumber(1);

    #[inline]
    pub const fn new(value: u32) -> Self {
        SeqNumber(value)
    }

    /// Value as carried on the wire
    #[inline]
    pub fn as_raw(self) -> u32 {
        self.0
    }

    /// Whether this is the reserved "nothing yet" value
    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Advance in place, wrapping at `u32::MAX`
    #[inline]
    pub fn increment(&mut self) {
        *self += 1;
    }

    /// The number after this one, wrapping at `u32::MAX`
    #[inline]
    pub fn next(self) -> Self {
        self + 1
    }

    /// Signed number of steps from `self` forward to `other`
    ///
    /// Negative when `other` is older. Numbers more than 2^31 apart alias.
    #[inline]
    pub fn distance_to(self, other: SeqNumber) -> i32 {
        other.0.wrapping_sub(self.0) as i32
    }

    /// `self` comes strictly before `other`
    #[inline]
    pub fn precedes(self, other: SeqNumber) -> bool {
        self.distance_to(other) > 0
    }

    #[inline]
    pub fn precedes_or_eq(self, other: SeqNumber) -> bool {
        self.distance_to(other) >= 0
    }

    /// `self` comes strictly after `other`
    #[inline]
    pub fn follows(self, other: SeqNumber) -> bool {
        self.distance_to(other) < 0
    }

    #[inline]
    pub fn follows_or_eq(self, other: SeqNumber) -> bool {
        self.distance_to(other) <= 0
    }
}

impl fmt::Debug for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqNumber({})", self.0)
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SeqNumber {
    fn from(value: u32) -> Self {
        SeqNumber(value)
    }
}

impl From<SeqNumber> for u32 {
    fn from(seq: SeqNumber) -> u32 {
        seq.0
    }
}

impl Add<u32> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, steps: u32) -> SeqNumber {
        SeqNumber(self.0.wrapping_add(steps))
    }
}

impl AddAssign<u32> for SeqNumber {
    fn add_assign(&mut self, steps: u32) {
        self.0 = self.0.wrapping_add(steps);
    }
}

impl Sub<u32> for SeqNumber {
    type Output = SeqNumber;

    fn sub(self, steps: u32) -> SeqNumber {
        SeqNumber(self.0.wrapping_sub(steps))
    }
}

/// `a - b` is how far `a` is ahead of `b`
impl Sub for SeqNumber {
    type Output = i32;

    fn sub(self, older: SeqNumber) -> i32 {
        older.distance_to(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_is_reserved() {
        assert!(SeqNumber::NONE.is_none());
        assert!(!SeqNumber::FIRST.is_none());
        assert_eq!(SeqNumber::default(), SeqNumber::NONE);
        assert_eq!(SeqNumber::NONE.next(), SeqNumber::FIRST);
    }

    #[test]
    fn test_counter_advances() {
        let mut seq = SeqNumber::FIRST;
        for _ in 0..41 {
            seq.increment();
        }
        assert_eq!(seq, SeqNumber::new(42));
        assert_eq!(u32::from(seq.next()), 43);
    }

    #[test]
    fn test_counter_wraps_through_none() {
        let last = SeqNumber::new(u32::MAX);
        assert_eq!(last.next(), SeqNumber::NONE);
        assert_eq!(last + 2, SeqNumber::FIRST);
    }

    #[test]
    fn test_distance_across_wrap() {
        let before = SeqNumber::new(u32::MAX - 2);
        let after = SeqNumber::new(3);

        assert_eq!(before.distance_to(after), 6);
        assert_eq!(after.distance_to(before), -6);
        assert!(before.precedes(after));
        assert!(after.follows(before));
    }

    #[test]
    fn test_ordering_helpers() {
        let older = SeqNumber::new(7);
        let newer = SeqNumber::new(39);

        assert!(older.precedes(newer) && older.precedes_or_eq(newer));
        assert!(newer.follows(older) && newer.follows_or_eq(older));
        assert!(older.precedes_or_eq(older) && older.follows_or_eq(older));
        assert!(!older.precedes(older) && !older.follows(older));
    }

    #[test]
    fn test_ordering_follows_the_wrap() {
        let last = SeqNumber::new(u32::MAX);
        let first = SeqNumber::FIRST;

        // Raw values say the opposite of the counter order here.
        assert!(last.as_raw() > first.as_raw());
        assert!(last.precedes(first));
        assert!(first.follows(last));
        assert!(!first.precedes(last));
    }

    #[test]
    fn test_operators() {
        let newest = SeqNumber::new(40);
        let acked = SeqNumber::new(8);

        assert_eq!(newest - acked, 32);
        assert_eq!(acked - newest, -32);
        assert_eq!(newest - 32, acked);
        assert_eq!(SeqNumber::FIRST - 1, SeqNumber::NONE);
    }
}

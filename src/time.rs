//! Virtual time for the event queue.
//!
//! Represents a logical timestamp in milliseconds with no dependency on
//! `std::time`. Time advances only when a driver explicitly asks the
//! [`VirtualClock`](crate::clock::VirtualClock) to move forward.

/// A point on the virtual timeline, measured in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct VirtualTime(u64);

impl VirtualTime {
    /// The zero-point of simulation time.
    pub const ZERO: VirtualTime = VirtualTime(0);

    /// Create a `VirtualTime` from a raw millisecond value.
    #[inline]
    pub fn from_millis(ms: u64) -> Self {
        VirtualTime(ms)
    }

    /// Return the raw millisecond value.
    #[inline]
    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// Compute the absolute time that is `delay` ms after `self`.
    /// Returns `None` on overflow.
    #[inline]
    pub fn plus(self, delay: u64) -> Option<VirtualTime> {
        self.0.checked_add(delay).map(VirtualTime)
    }

    /// Returns `true` if `self` is strictly before `other`.
    #[inline]
    pub fn is_before(self, other: VirtualTime) -> bool {
        self.0 < other.0
    }

    /// Milliseconds elapsed between `earlier` and `self`.
    /// Returns `None` if `earlier` is actually later.
    #[inline]
    pub fn duration_since(self, earlier: VirtualTime) -> Option<u64> {
        self.0.checked_sub(earlier.0)
    }

    /// Like [`duration_since`](Self::duration_since) but clamps to zero.
    #[inline]
    pub fn saturating_since(self, earlier: VirtualTime) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl From<u64> for VirtualTime {
    fn from(ms: u64) -> Self {
        VirtualTime(ms)
    }
}

impl std::fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T={}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero() {
        assert_eq!(VirtualTime::ZERO.as_millis(), 0);
        assert_eq!(VirtualTime::default(), VirtualTime::ZERO);
    }

    #[test]
    fn test_ordering() {
        let t1 = VirtualTime::from_millis(10);
        let t2 = VirtualTime::from_millis(20);
        assert!(t1 < t2);
        assert!(t1.is_before(t2));
        assert!(!t2.is_before(t1));
    }

    #[test]
    fn test_plus() {
        let t = VirtualTime::from_millis(100);
        assert_eq!(t.plus(50), Some(VirtualTime::from_millis(150)));
        assert_eq!(t.plus(0), Some(t));
    }

    #[test]
    fn test_plus_overflow() {
        assert!(VirtualTime::from_millis(u64::MAX).plus(1).is_none());
    }

    #[test]
    fn test_duration_since() {
        let t1 = VirtualTime::from_millis(10);
        let t2 = VirtualTime::from_millis(30);
        assert_eq!(t2.duration_since(t1), Some(20));
        assert_eq!(t1.duration_since(t2), None);
        assert_eq!(t1.saturating_since(t2), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(VirtualTime::from_millis(42).to_string(), "T=42");
    }
}

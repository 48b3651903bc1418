use serde::Serialize;
use std::fmt::Display;

/// 0-based, half-open
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Interval {
    pub begin: i64,
    pub end: i64,
}

impl Interval {
    pub fn new(begin: i64, end: i64) -> Self {
        Self { begin, end }
    }

    pub fn len(&self) -> i64 {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.begin < other.end && other.begin < self.end
    }

    pub fn contains(&self, other: &Interval) -> bool {
        other.begin >= self.begin && other.end <= self.end
    }

    pub fn contains_pos(&self, pos: i64) -> bool {
        pos >= self.begin && pos < self.end
    }

    /// Number of bases separating the two intervals, 0 if they overlap or touch.
    pub fn distance_to(&self, other: &Interval) -> i64 {
        if other.end <= self.begin {
            self.begin - other.end
        } else if other.begin >= self.end {
            other.begin - self.end
        } else {
            0
        }
    }

    /// The part of `self` inside `other`; may be empty.
    pub fn intersect(&self, other: &Interval) -> Interval {
        Interval::new(self.begin.max(other.begin), self.end.min(other.end))
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Interval::new(10, 20);
        assert_eq!(a.distance_to(&Interval::new(25, 30)), 5);
        assert_eq!(a.distance_to(&Interval::new(0, 4)), 6);
        assert_eq!(a.distance_to(&Interval::new(20, 22)), 0);
        assert_eq!(a.distance_to(&Interval::new(15, 16)), 0);
        assert!(!a.overlaps(&Interval::new(20, 22)));
        assert!(a.contains(&Interval::new(10, 20)));
        assert_eq!(a.intersect(&Interval::new(5, 12)), Interval::new(10, 12));
    }
}

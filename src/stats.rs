use std::fmt;

/// Running statistics for one key, in tenths.
///
/// A zero `count` marks an unused table slot; a recorded key always has
/// `count >= 1` and `min <= max`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyStats {
    pub min: i32,
    pub max: i32,
    pub sum: i64,
    pub count: u64,
}

impl KeyStats {
    #[inline(always)]
    pub fn new(value: i32) -> Self {
        Self {
            min: value,
            max: value,
            sum: value as i64,
            count: 1,
        }
    }

    #[inline(always)]
    pub fn record(&mut self, value: i32) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value as i64;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &KeyStats) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.count += other.count;
    }

    /// Mean in tenths, rounded half up (toward positive infinity).
    pub fn mean_tenths(&self) -> i64 {
        let sum = self.sum as i128;
        let count = self.count.max(1) as i128;
        // floor(sum / count + 1/2)
        (2 * sum + count).div_euclid(2 * count) as i64
    }
}

/// A tenths value shown with exactly one fractional digit, e.g. `-1.5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tenths(pub i64);

impl fmt::Display for Tenths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{}", abs / 10, abs % 10)
    }
}

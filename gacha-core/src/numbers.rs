//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Convert a count to f64, returning 0.0 if the value cannot be represented.
#[must_use]
pub fn count_to_f64(value: usize) -> f64 {
    cast::<usize, f64>(value).unwrap_or(0.0)
}

/// Ratio of two counters, `None` when the denominator is zero.
#[must_use]
pub fn ratio(numerator: u32, denominator: u32) -> Option<f64> {
    if denominator == 0 {
        return None;
    }
    Some(f64::from(numerator) / f64::from(denominator))
}

/// Percentage of two counters, 0.0 when the denominator is zero.
#[must_use]
pub fn percent(numerator: u32, denominator: u32) -> f64 {
    ratio(numerator, denominator).map_or(0.0, |r| r * 100.0)
}

/// Saturating conversion from a collection length to a u32 counter.
#[must_use]
pub fn len_to_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

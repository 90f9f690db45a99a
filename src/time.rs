//! Time axis utilities
//!
//! The runtime stamps records with microseconds since the epoch. Derived
//! views work on a zero-based millisecond axis.

pub const MICROS_PER_MILLI: f64 = 1_000.0;

/// Convert a microsecond offset into milliseconds
pub fn micros_to_millis(micros: f64) -> f64 {
    micros / MICROS_PER_MILLI
}

/// Index of the left-closed window `[k * width, (k + 1) * width)` holding `t`
///
/// None when the index does not fit in an i64.
pub fn bucket_index(t: f64, width: f64) -> Option<i64> {
    let index = (t / width).floor();
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
    (index >= i64::MIN as f64 && index < i64::MAX as f64).then_some(index as i64)
}

/// Start of the window with the given index
pub fn bucket_start(index: i64, width: f64) -> f64 {
    index as f64 * width
}

/// Seconds elapsed since the first call (used to time refreshes)
pub fn now_seconds() -> f64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_micros_to_millis() {
        assert_eq!(micros_to_millis(150_000.0), 150.0);
        assert_eq!(micros_to_millis(0.0), 0.0);
    }

    #[test]
    fn test_bucket_windows_are_left_closed() {
        assert_eq!(bucket_index(0.0, 100.0), Some(0));
        assert_eq!(bucket_index(99.999, 100.0), Some(0));
        assert_eq!(bucket_index(100.0, 100.0), Some(1));
        assert_eq!(bucket_index(260.0, 100.0), Some(2));
        assert_eq!(bucket_start(2, 100.0), 200.0);
    }

    #[test]
    fn test_bucket_index_out_of_range() {
        assert_eq!(bucket_index(1e7, 1e-12), None);
        assert_eq!(bucket_index(-1e7, 1e-12), None);
        assert_eq!(bucket_index(f64::NAN, 1.0), None);
        assert_eq!(bucket_index(1e7, 1e-6), Some(10_000_000_000_000));
    }
}

//! Shared utility functions and traits

/// Extension trait for tracking minimum and maximum values in Option<T>.
///
/// Works for any partially ordered value, so latency samples in `f64` can
/// use it directly. Incomparable values (NaN) never replace a stored one.
///
/// # Example
///
/// ```
/// use lagbox::utils::MinMaxExt;
///
/// let mut min: Option<f64> = None;
/// let mut max: Option<f64> = None;
///
/// for value in [1.5, 0.5, 2.5] {
///     min.update_min(value);
///     max.update_max(value);
/// }
/// assert_eq!(min, Some(0.5));
/// assert_eq!(max, Some(2.5));
/// ```
pub trait MinMaxExt<T: PartialOrd + Copy> {
    /// Stores `value` if it is smaller than the current minimum or if no
    /// minimum exists yet.
    fn update_min(&mut self, value: T);

    /// Stores `value` if it is larger than the current maximum or if no
    /// maximum exists yet.
    fn update_max(&mut self, value: T);
}

impl<T: PartialOrd + Copy> MinMaxExt<T> for Option<T> {
    fn update_min(&mut self, value: T) {
        if self.map_or(true, |current| value < current) {
            *self = Some(value);
        }
    }

    fn update_max(&mut self, value: T) {
        if self.map_or(true, |current| value > current) {
            *self = Some(value);
        }
    }
}

/// Round `value` to `places` decimal places for presentation.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_min_from_none() {
        let mut min: Option<u64> = None;
        min.update_min(100);
        assert_eq!(min, Some(100));
    }

    #[test]
    fn update_min_larger_value_unchanged() {
        let mut min: Option<u64> = Some(50);
        min.update_min(100);
        assert_eq!(min, Some(50));
    }

    #[test]
    fn update_max_smaller_value_unchanged() {
        let mut max: Option<u64> = Some(200);
        max.update_max(100);
        assert_eq!(max, Some(200));
    }

    #[test]
    fn update_min_max_sequence_f64() {
        let mut min: Option<f64> = None;
        let mut max: Option<f64> = None;

        for value in [5.0, 3.0, 7.0, 2.0, 8.0, 4.0] {
            min.update_min(value);
            max.update_max(value);
        }

        assert_eq!(min, Some(2.0));
        assert_eq!(max, Some(8.0));
    }

    #[test]
    fn nan_does_not_replace_existing_value() {
        let mut min = Some(1.0_f64);
        min.update_min(f64::NAN);
        assert_eq!(min, Some(1.0));
    }

    #[test]
    fn round_to_three_places() {
        assert_eq!(round_to(1.23456, 3), 1.235);
        assert_eq!(round_to(2.0, 3), 2.0);
        assert_eq!(round_to(0.8164965, 2), 0.82);
    }
}

//! Overflow-aware integer arithmetic.
use core::time::Duration;

/// Adds all of `summands` together, returning `overflow` if any intermediate
/// sum would overflow an `i64` in either direction.
///
/// Summands are added left to right, so an intermediate overflow is reported
/// even when a later summand would have brought the total back into range.
///
/// # Examples
///
/// ```
/// use upgrade_lock_util::math::add_with_default;
///
/// assert_eq!(add_with_default(0, &[1, 1]), 2);
/// assert_eq!(add_with_default(0, &[i64::MAX, i64::MIN]), -1);
///
/// // a deadline that would overflow saturates to "forever".
/// assert_eq!(add_with_default(i64::MAX, &[i64::MAX - 5, 10]), i64::MAX);
/// ```
#[must_use]
pub const fn add_with_default(overflow: i64, summands: &[i64]) -> i64 {
    let mut sum: i64 = 0;
    let mut i = 0;
    while i < summands.len() {
        sum = match sum.checked_add(summands[i]) {
            Some(sum) => sum,
            None => return overflow,
        };
        i += 1;
    }
    sum
}

/// Returns the number of whole nanoseconds in `duration`, clamped to
/// [`i64::MAX`].
///
/// Roughly 292 years of nanoseconds fit in an `i64`; anything longer is, for
/// the purposes of waiting on a lock, forever.
///
/// # Examples
///
/// ```
/// use core::time::Duration;
/// use upgrade_lock_util::math::saturating_nanos;
///
/// assert_eq!(saturating_nanos(Duration::from_millis(50)), 50_000_000);
/// assert_eq!(saturating_nanos(Duration::MAX), i64::MAX);
/// ```
#[must_use]
pub const fn saturating_nanos(duration: Duration) -> i64 {
    let nanos = duration.as_nanos();
    if nanos > i64::MAX as u128 {
        i64::MAX
    } else {
        nanos as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn add_with_default_overflow() {
        assert_eq!(add_with_default(0, &[i64::MAX, i64::MIN]), -1);

        assert_eq!(add_with_default(0, &[i64::MIN, i64::MIN]), 0);
        assert_eq!(add_with_default(0, &[i64::MAX, i64::MAX]), 0);
        assert_eq!(add_with_default(0, &[-1, i64::MIN]), 0);
        assert_eq!(add_with_default(0, &[1, i64::MAX]), 0);
        assert_eq!(add_with_default(0, &[i64::MIN, -1]), 0);
        assert_eq!(add_with_default(0, &[i64::MAX, 1]), 0);

        assert_eq!(add_with_default(0, &[-1, -1]), -2);
        assert_eq!(add_with_default(0, &[1, 1]), 2);
    }

    #[test]
    fn add_with_default_empty() {
        assert_eq!(add_with_default(7, &[]), 0);
    }

    #[test]
    fn saturating_nanos_clamps() {
        assert_eq!(saturating_nanos(Duration::ZERO), 0);
        assert_eq!(saturating_nanos(Duration::from_nanos(u64::MAX)), i64::MAX);
        assert_eq!(
            saturating_nanos(Duration::from_nanos(i64::MAX as u64)),
            i64::MAX
        );
    }

    proptest! {
        #[test]
        fn add_with_default_matches_i128(a in any::<i64>(), b in any::<i64>()) {
            let wide = a as i128 + b as i128;
            let expected = if wide > i64::MAX as i128 || wide < i64::MIN as i128 {
                i64::MAX
            } else {
                wide as i64
            };
            prop_assert_eq!(add_with_default(i64::MAX, &[a, b]), expected);
        }

        #[test]
        fn deadlines_never_wrap(start in 0i64.., timeout in any::<u64>()) {
            let timeout = saturating_nanos(Duration::from_nanos(timeout));
            let deadline = add_with_default(i64::MAX, &[start, timeout]);
            prop_assert!(deadline >= start, "deadline {deadline} wrapped before {start}");
        }
    }
}

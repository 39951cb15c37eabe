//! Exact-sum money allocation using the Largest Remainder (Hamilton) method.
//!
//! Splits a total across weighted shares so the parts add up to the total,
//! rounded to the requested precision, with no smallest units lost or gained:
//! 1. Round the total to whole smallest units (half away from zero)
//! 2. Give each entry the floor of its proportional share
//! 3. Hand the leftover units, one each, to the largest fractional parts
//!
//! Steps 2 and 3 run on integers, so the split stays exact for any total a
//! `Decimal` can hold.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Finest precision the allocator will produce. Larger requests are lowered
/// to this many places.
pub const MAX_DECIMAL_PLACES: u32 = 12;

/// Largest mantissa a `Decimal` can carry (2^96 - 1).
const MAX_UNITS: u128 = (1 << 96) - 1;

/// Resolution of the integer weights, relative to the largest weight.
const WEIGHT_BITS: i32 = 48;

/// Allocate `total` across `weights` so the result sums exactly to `total`
/// rounded to `decimal_places`.
///
/// Negative or non-finite weights count as zero, and so does a negative
/// total. When every weight is zero, or the total rounds to zero units, the
/// result is all zeros; the output always has the same length as `weights`.
/// Ties between equal fractional parts go to the earlier entry.
///
/// `decimal_places` above [`MAX_DECIMAL_PLACES`] is lowered to it. A total
/// with too many digits to be held at the requested precision is split at
/// the finest precision a `Decimal` can represent for it instead.
///
/// # Example
///
/// ```
/// use rust_decimal_macros::dec;
/// use parcel_quote::domain::allocate_exact;
///
/// let parts = allocate_exact(&[1.0, 1.0, 1.0], dec!(10), 2);
/// assert_eq!(parts, vec![dec!(3.34), dec!(3.33), dec!(3.33)]);
/// ```
#[must_use]
pub fn allocate_exact(weights: &[f64], total: Decimal, decimal_places: u32) -> Vec<Decimal> {
    let (total_units, scale) = to_units(total, decimal_places.min(MAX_DECIMAL_PLACES));
    let zeros = || vec![Decimal::new(0, scale); weights.len()];

    let weights = integer_weights(weights);
    let weight_sum: u128 = weights.iter().map(|w| u128::from(*w)).sum();
    if weight_sum == 0 || total_units == 0 {
        return zeros();
    }

    // share_i = U * w_i / W = q * w_i + (r * w_i) / W, with r < W.
    let q = total_units / weight_sum;
    let r = total_units % weight_sum;
    let (mut units, remainders): (Vec<u128>, Vec<u128>) = weights
        .iter()
        .map(|w| {
            let w = u128::from(*w);
            let spill = r * w;
            (q * w + spill / weight_sum, spill % weight_sum)
        })
        .unzip();

    let assigned: u128 = units.iter().sum();
    let leftover = usize::try_from(total_units.saturating_sub(assigned)).unwrap_or(usize::MAX);
    if leftover > 0 {
        let mut order: Vec<(usize, u128)> = remainders.into_iter().enumerate().collect();
        // Stable sort keeps input order among equal remainders.
        order.sort_by(|a, b| b.1.cmp(&a.1));
        for (idx, _) in order.into_iter().take(leftover) {
            units[idx] += 1;
        }
    }

    units
        .into_iter()
        .map(|u| from_units(u, scale))
        .collect()
}

/// Total as a count of smallest units plus the scale those units are at.
///
/// The scale is `decimal_places` unless the total has too many digits, in
/// which case it is the largest scale that still fits a `Decimal`.
fn to_units(total: Decimal, decimal_places: u32) -> (u128, u32) {
    if total.is_sign_negative() {
        return (0, decimal_places);
    }
    let rounded =
        total.round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointAwayFromZero);
    let mut units = rounded.mantissa().unsigned_abs();
    let mut scale = rounded.scale();
    while scale < decimal_places {
        match units.checked_mul(10).filter(|next| *next <= MAX_UNITS) {
            Some(next) => {
                units = next;
                scale += 1;
            }
            None => break,
        }
    }
    (units, scale)
}

fn from_units(units: u128, scale: u32) -> Decimal {
    // Every part is at most the total, which already fits.
    i128::try_from(units)
        .ok()
        .and_then(|m| Decimal::try_from_i128_with_scale(m, scale).ok())
        .unwrap_or_default()
}

/// Weights as integers, scaled by a power of two so the largest one spans
/// `WEIGHT_BITS` bits. Weights far below that resolution round to zero.
fn integer_weights(weights: &[f64]) -> Vec<u64> {
    let clean: Vec<f64> = weights
        .iter()
        .map(|w| if w.is_finite() && *w > 0.0 { *w } else { 0.0 })
        .collect();
    let max = clean.iter().copied().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return vec![0; clean.len()];
    }

    let shift = WEIGHT_BITS - (max.log2().floor() as i32 + 1);
    // Two factors so neither overflows or underflows for extreme weights.
    let (lo, hi) = (2f64.powi(shift / 2), 2f64.powi(shift - shift / 2));
    clean.iter().map(|w| (w * lo * hi).round() as u64).collect()
}

/// Round a money amount the same way the allocator rounds its total.
/// `decimal_places` above [`MAX_DECIMAL_PLACES`] is lowered to it.
#[must_use]
pub fn round_money(amount: Decimal, decimal_places: u32) -> Decimal {
    amount.round_dp_with_strategy(
        decimal_places.min(MAX_DECIMAL_PLACES),
        RoundingStrategy::MidpointAwayFromZero,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn sum(values: &[Decimal]) -> Decimal {
        values.iter().copied().sum()
    }

    #[test]
    fn even_split_has_no_leftover() {
        let result = allocate_exact(&[1.0, 1.0, 1.0, 1.0], dec!(10.00), 2);
        assert_eq!(result, vec![dec!(2.5); 4]);
    }

    #[test]
    fn thirds_give_extra_cent_to_first_entry() {
        let result = allocate_exact(&[1.0, 1.0, 1.0], dec!(10.00), 2);
        assert_eq!(result, vec![dec!(3.34), dec!(3.33), dec!(3.33)]);
        assert_eq!(sum(&result), dec!(10));
    }

    #[test]
    fn all_zero_weights_keep_length() {
        assert_eq!(allocate_exact(&[0.0, 0.0], dec!(5.00), 2), vec![dec!(0); 2]);
    }

    #[test]
    fn zero_total_keeps_length() {
        let result = allocate_exact(&[3.0, 1.0, 2.0], dec!(0), 2);
        assert_eq!(result.len(), 3);
        assert!(result.iter().all(Decimal::is_zero));
    }

    #[test]
    fn negative_total_allocates_nothing() {
        let result = allocate_exact(&[1.0, 2.0], dec!(-4.00), 2);
        assert_eq!(result, vec![dec!(0); 2]);
    }

    #[test]
    fn empty_weights_give_empty_result() {
        assert!(allocate_exact(&[], dec!(12.34), 2).is_empty());
    }

    #[test]
    fn largest_remainder_gets_the_leftover() {
        // Ideal cents: 166.67, 333.33, 500.00 -> floors 166, 333, 500, one cent left.
        let result = allocate_exact(&[1.0, 2.0, 3.0], dec!(10.00), 2);
        assert_eq!(result, vec![dec!(1.67), dec!(3.33), dec!(5.00)]);
    }

    #[test]
    fn zero_weight_is_skipped_for_leftovers() {
        let result = allocate_exact(&[0.0, 1.0, 1.0, 1.0], dec!(1.00), 2);
        assert_eq!(result, vec![dec!(0), dec!(0.34), dec!(0.33), dec!(0.33)]);
    }

    #[rstest]
    #[case(vec![-4.0, 1.0], dec!(3.00), vec![dec!(0), dec!(3.00)])]
    #[case(vec![f64::NAN, 1.0, f64::INFINITY], dec!(2.00), vec![dec!(0), dec!(2.00), dec!(0)])]
    fn bad_weights_count_as_zero(
        #[case] weights: Vec<f64>,
        #[case] total: Decimal,
        #[case] expected: Vec<Decimal>,
    ) {
        assert_eq!(allocate_exact(&weights, total, 2), expected);
    }

    #[rstest]
    #[case(dec!(0.005), dec!(0.01))]
    #[case(dec!(2.345), dec!(2.35))]
    #[case(dec!(2.335), dec!(2.34))]
    #[case(dec!(0.004), dec!(0))]
    fn total_rounds_half_up_before_split(#[case] total: Decimal, #[case] expected: Decimal) {
        let result = allocate_exact(&[1.0], total, 2);
        assert_eq!(sum(&result), expected);
        assert_eq!(round_money(total, 2), expected);
    }

    #[test]
    fn whole_units_when_no_decimals() {
        let result = allocate_exact(&[500.0, 250.0, 250.0], dec!(1001), 0);
        assert_eq!(result, vec![dec!(501), dec!(250), dec!(250)]);
    }

    #[rstest]
    #[case(vec![1.0, 3.0, 7.0], dec!(123456.789), 12)]
    #[case(vec![1.0], dec!(999999.999999999999), 12)]
    #[case(vec![1.0, 1.0, 1.0], dec!(10000000), 12)]
    #[case(vec![1.0, 2.0], dec!(100000000000000000), 2)]
    #[case(vec![0.25, 1e-9, 4096.0], dec!(0.000000000007), 12)]
    fn high_precision_totals_sum_exactly(
        #[case] weights: Vec<f64>,
        #[case] total: Decimal,
        #[case] decimal_places: u32,
    ) {
        let result = allocate_exact(&weights, total, decimal_places);
        assert_eq!(result.len(), weights.len());
        assert_eq!(sum(&result), round_money(total, decimal_places));
        assert!(result.iter().all(|v| !v.is_sign_negative()));
    }

    #[test]
    fn many_units_split_by_largest_remainder() {
        let result = allocate_exact(&[1.0, 1.0, 1.0], dec!(10000000), 12);
        assert_eq!(
            result,
            vec![
                dec!(3333333.333333333334),
                dec!(3333333.333333333333),
                dec!(3333333.333333333333)
            ]
        );
        assert_eq!(
            allocate_exact(&[1.0], dec!(999999.999999999999), 12),
            vec![dec!(999999.999999999999)]
        );
    }

    #[test]
    fn total_too_wide_for_precision_still_sums() {
        let result = allocate_exact(&[1.0, 1.0], Decimal::MAX, 2);
        assert_eq!(sum(&result), Decimal::MAX);
        assert_eq!(
            result,
            vec![
                dec!(39614081257132168796771975168),
                dec!(39614081257132168796771975167)
            ]
        );
    }

    #[test]
    fn precision_above_cap_is_lowered() {
        let result = allocate_exact(&[1.0, 1.0, 1.0], dec!(1), 20);
        assert!(result.iter().all(|v| v.scale() == MAX_DECIMAL_PLACES));
        assert_eq!(sum(&result), dec!(1));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn prop_sum_length_and_sign(
            weights in prop::collection::vec(0.0f64..10_000.0, 1..40),
            mantissa in 0i64..=i64::MAX,
            total_scale in 0u32..=12,
            decimal_places in 0u32..=12,
        ) {
            let total = Decimal::new(mantissa, total_scale);
            let result = allocate_exact(&weights, total, decimal_places);

            prop_assert_eq!(result.len(), weights.len());
            prop_assert!(result.iter().all(|v| !v.is_sign_negative() || v.is_zero()));

            let expected = round_money(total, decimal_places);
            if weights.iter().any(|w| *w > 0.0) {
                prop_assert_eq!(sum(&result), expected);
            } else {
                prop_assert!(result.iter().all(Decimal::is_zero));
            }
        }

        #[test]
        fn prop_parts_stay_within_one_unit_of_ideal(
            weights in prop::collection::vec(1.0f64..1_000.0, 1..20),
            cents in 1i64..10_000_000,
        ) {
            let total = Decimal::new(cents, 2);
            let total_weight: f64 = weights.iter().sum();
            let result = allocate_exact(&weights, total, 2);

            for (w, part) in weights.iter().zip(&result) {
                let ideal = w / total_weight * cents as f64;
                let got = (*part * Decimal::from(100)).to_f64().unwrap_or_default();
                prop_assert!((got - ideal).abs() < 1.0 + 1e-6);
            }
        }
    }
}

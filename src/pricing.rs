//! Discount resolution for purchase and sale amounts.
//!
//! Discounts live in nullable columns at several levels (line override,
//! catalog item, supplier default); they collapse into one tagged value
//! evaluated by a single pure function rather than scattered precedence
//! checks on the nullable fields.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Discount {
    #[default]
    None,
    /// Percentage off the gross amount, 0..=100.
    Percent(Decimal),
    /// Fixed amount off each unit.
    Amount(Decimal),
}

impl Discount {
    /// Collapses the nullable storage columns into a tagged value.
    /// A row carrying both columns is treated as a percent discount; the
    /// service layer rejects such rows at write time.
    pub fn from_columns(percent: Option<Decimal>, amount: Option<Decimal>) -> Self {
        match (percent, amount) {
            (Some(p), _) => Discount::Percent(p),
            (None, Some(a)) => Discount::Amount(a),
            (None, None) => Discount::None,
        }
    }

    /// Splits back into the nullable storage columns.
    pub fn into_columns(self) -> (Option<Decimal>, Option<Decimal>) {
        match self {
            Discount::None => (None, None),
            Discount::Percent(p) => (Some(p), None),
            Discount::Amount(a) => (None, Some(a)),
        }
    }

    /// Cascading override resolution: the most specific explicit level
    /// wins, `None` falls through to the next.
    pub fn resolve(line: Discount, item: Discount, supplier: Discount) -> Discount {
        for candidate in [line, item, supplier] {
            if candidate != Discount::None {
                return candidate;
            }
        }
        Discount::None
    }

    /// Net amount for `qty` units at `unit_price`. Never negative.
    pub fn apply(&self, unit_price: Decimal, qty: i32) -> Decimal {
        let qty = Decimal::from(qty);
        let gross = unit_price * qty;
        let net = match self {
            Discount::None => gross,
            Discount::Percent(p) => gross * (dec!(100) - *p) / dec!(100),
            Discount::Amount(a) => (unit_price - *a) * qty,
        };
        net.max(Decimal::ZERO)
    }

    /// Validates the discount is representable: percent within 0..=100,
    /// amount non-negative.
    pub fn is_valid(&self) -> bool {
        match self {
            Discount::None => true,
            Discount::Percent(p) => *p >= Decimal::ZERO && *p <= dec!(100),
            Discount::Amount(a) => *a >= Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn resolve_picks_the_most_specific_level() {
        let line = Discount::Percent(dec!(10));
        let supplier = Discount::Amount(dec!(2));
        assert_eq!(
            Discount::resolve(line, Discount::None, supplier),
            line
        );
        assert_eq!(
            Discount::resolve(Discount::None, Discount::None, supplier),
            supplier
        );
        assert_eq!(
            Discount::resolve(Discount::None, Discount::None, Discount::None),
            Discount::None
        );
    }

    #[test]
    fn apply_computes_net_amounts() {
        assert_eq!(Discount::None.apply(dec!(120), 10), dec!(1200));
        assert_eq!(Discount::Percent(dec!(25)).apply(dec!(120), 10), dec!(900));
        assert_eq!(Discount::Amount(dec!(20)).apply(dec!(120), 10), dec!(1000));
    }

    #[test]
    fn amount_discount_clamps_at_zero() {
        assert_eq!(Discount::Amount(dec!(200)).apply(dec!(120), 10), dec!(0));
    }

    #[test]
    fn columns_round_trip() {
        for d in [
            Discount::None,
            Discount::Percent(dec!(12.5)),
            Discount::Amount(dec!(3)),
        ] {
            let (p, a) = d.into_columns();
            assert_eq!(Discount::from_columns(p, a), d);
        }
    }

    proptest! {
        #[test]
        fn applied_amount_is_never_negative(
            price in 0i64..100_000,
            qty in 1i32..10_000,
            pct in 0i64..=100,
        ) {
            let price = Decimal::from(price);
            for d in [
                Discount::None,
                Discount::Percent(Decimal::from(pct)),
                Discount::Amount(price / dec!(2)),
            ] {
                prop_assert!(d.apply(price, qty) >= Decimal::ZERO);
            }
        }

        #[test]
        fn discount_never_exceeds_gross(
            price in 0i64..100_000,
            qty in 1i32..10_000,
            pct in 0i64..=100,
        ) {
            let price = Decimal::from(price);
            let gross = Discount::None.apply(price, qty);
            prop_assert!(Discount::Percent(Decimal::from(pct)).apply(price, qty) <= gross);
        }
    }
}

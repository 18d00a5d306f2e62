//! Conversion-price protection for earlier preferred classes when a round
//! prices below their current conversion price.

use core_types::{
    money::{self, ShareCount},
    AntiDilution, ShareClass, ShareClassId,
};
use ledger::CapTableSnapshot;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Decimal places kept on adjusted conversion prices and ratios.
pub const RATIO_SCALE: u32 = 10;

/// Terms of the issuance that may trigger an adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DilutiveIssuance {
    pub price_per_share: Decimal,
    pub total_raised: Decimal,
    pub shares_issued: ShareCount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntiDilutionAdjustment {
    pub share_class_id: ShareClassId,
    pub formula: AntiDilution,
    pub old_conversion_price: Decimal,
    pub new_conversion_price: Decimal,
    pub old_conversion_ratio: Decimal,
    pub new_conversion_ratio: Decimal,
}

fn round_ratio(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(RATIO_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Shares outstanding counted by the weighted-average formulas: every share
/// for broad-based, preferred shares only for narrow-based.
fn base_shares(snapshot: &CapTableSnapshot, formula: AntiDilution) -> ShareCount {
    match formula {
        AntiDilution::WeightedAverageNarrow => snapshot
            .share_classes()
            .iter()
            .filter(|class| class.is_preferred())
            .map(|class| snapshot.class_share_count(&class.id))
            .sum(),
        _ => snapshot.total_shares_outstanding(),
    }
}

/// New conversion price for `class` under its formula, or `None` when the
/// class is unprotected or the issuance is not dilutive to it.
pub fn adjusted_conversion_price(
    class: &ShareClass,
    snapshot: &CapTableSnapshot,
    issuance: &DilutiveIssuance,
) -> Result<Option<Decimal>> {
    let Some(old_cp) = class.conversion_price() else {
        return Ok(None);
    };
    if old_cp <= issuance.price_per_share {
        return Ok(None);
    }
    let new_cp = match class.anti_dilution {
        AntiDilution::None => return Ok(None),
        AntiDilution::FullRatchet => issuance.price_per_share,
        formula @ (AntiDilution::WeightedAverageBroad | AntiDilution::WeightedAverageNarrow) => {
            let a = Decimal::from(base_shares(snapshot, formula));
            let b = money::checked_mul_div(issuance.total_raised, Decimal::ONE, old_cp)?;
            let c = Decimal::from(issuance.shares_issued);
            let numerator = a.checked_add(b).ok_or(money::MoneyError::Overflow)?;
            let denominator = a.checked_add(c).ok_or(money::MoneyError::Overflow)?;
            money::checked_mul_div(old_cp, numerator, denominator)?
        }
    };
    Ok(Some(round_ratio(new_cp)))
}

/// Adjustments owed by every protected class in `snapshot` other than
/// `issued_class`, in class id order. A class whose ratio would not increase
/// is left alone.
pub fn compute_adjustments(
    snapshot: &CapTableSnapshot,
    issued_class: &ShareClassId,
    issuance: &DilutiveIssuance,
) -> Result<Vec<AntiDilutionAdjustment>> {
    let mut adjustments = Vec::new();
    for class in snapshot.share_classes().iter() {
        if &class.id == issued_class {
            continue;
        }
        let Some(new_cp) = adjusted_conversion_price(class, snapshot, issuance)? else {
            continue;
        };
        let Some(old_cp) = class.conversion_price() else {
            continue;
        };
        if new_cp <= Decimal::ZERO {
            continue;
        }
        let new_ratio = round_ratio(money::checked_mul_div(
            class.issue_price,
            Decimal::ONE,
            new_cp,
        )?);
        if new_ratio <= class.conversion_ratio {
            continue;
        }
        adjustments.push(AntiDilutionAdjustment {
            share_class_id: class.id.clone(),
            formula: class.anti_dilution,
            old_conversion_price: old_cp,
            new_conversion_price: new_cp,
            old_conversion_ratio: class.conversion_ratio,
            new_conversion_ratio: new_ratio,
        });
    }
    Ok(adjustments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_types::NewPosition;
    use rust_decimal_macros::dec;

    fn base(anti_dilution: AntiDilution) -> CapTableSnapshot {
        let as_of = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let series_a = ShareClass::preferred("series-a", "Series A", 1, dec!(1.00))
            .with_anti_dilution(anti_dilution);
        CapTableSnapshot::genesis("acme".into(), as_of)
            .define_share_class(ShareClass::common("common", "Common"), as_of)
            .unwrap()
            .define_share_class(series_a, as_of)
            .unwrap()
            .apply_issuance(
                &"common".into(),
                vec![NewPosition::new("founder", 9000000, Decimal::ZERO, as_of)],
                as_of,
            )
            .unwrap()
            .apply_issuance(
                &"series-a".into(),
                vec![NewPosition::new("fund-a", 1000000, dec!(1.00), as_of)],
                as_of,
            )
            .unwrap()
    }

    fn down_round() -> DilutiveIssuance {
        DilutiveIssuance {
            price_per_share: dec!(0.50),
            total_raised: dec!(1000000),
            shares_issued: 2000000,
        }
    }

    #[test]
    fn broad_weighted_average_matches_formula() {
        let snapshot = base(AntiDilution::WeightedAverageBroad);
        let adjustments =
            compute_adjustments(&snapshot, &"series-b".into(), &down_round()).unwrap();
        assert_eq!(adjustments.len(), 1);
        let adjustment = &adjustments[0];
        // 1.00 * (10,000,000 + 1,000,000) / (10,000,000 + 2,000,000)
        let expected_cp = dec!(1.00) * dec!(11000000) / dec!(12000000);
        assert_eq!(
            adjustment.new_conversion_price.round_dp(4),
            expected_cp.round_dp(4)
        );
        assert_eq!(adjustment.new_conversion_ratio.round_dp(4), dec!(1.0909));
        assert!(adjustment.new_conversion_ratio > Decimal::ONE);
    }

    #[test]
    fn narrow_weighted_average_counts_preferred_only() {
        let snapshot = base(AntiDilution::WeightedAverageNarrow);
        let adjustments =
            compute_adjustments(&snapshot, &"series-b".into(), &down_round()).unwrap();
        // 1.00 * (1,000,000 + 1,000,000) / (1,000,000 + 2,000,000)
        assert_eq!(adjustments[0].new_conversion_price.round_dp(4), dec!(0.6667));
        assert_eq!(adjustments[0].new_conversion_ratio.round_dp(4), dec!(1.5));
    }

    #[test]
    fn full_ratchet_resets_to_new_price() {
        let snapshot = base(AntiDilution::FullRatchet);
        let adjustments =
            compute_adjustments(&snapshot, &"series-b".into(), &down_round()).unwrap();
        assert_eq!(adjustments[0].new_conversion_price, dec!(0.50));
        assert_eq!(adjustments[0].new_conversion_ratio, dec!(2));
    }

    #[test]
    fn up_round_and_unprotected_classes_are_untouched() {
        let up_round = DilutiveIssuance {
            price_per_share: dec!(1.50),
            total_raised: dec!(1500000),
            shares_issued: 1000000,
        };
        let snapshot = base(AntiDilution::FullRatchet);
        assert!(compute_adjustments(&snapshot, &"series-b".into(), &up_round)
            .unwrap()
            .is_empty());

        let snapshot = base(AntiDilution::None);
        assert!(compute_adjustments(&snapshot, &"series-b".into(), &down_round())
            .unwrap()
            .is_empty());
    }
}

//! Class-level payouts for a fixed set of conversion choices, in exact
//! decimals. Cent rounding happens when payouts are split across holders.

use core_types::money::{self, MoneyError};
use rust_decimal::Decimal;

use crate::model::ClassTerms;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ClassPayout {
    pub preference: Decimal,
    pub participation: Decimal,
}

impl ClassPayout {
    pub fn total(&self) -> Decimal {
        self.preference + self.participation
    }
}

fn share_of(pool: Decimal, weight: Decimal, total_weight: Decimal) -> Result<Decimal, MoneyError> {
    money::checked_mul_div(pool, weight, total_weight)
}

/// Preference pass by seniority tier, then the residual pass by
/// as-converted shares. `converted[i]` waives class `i`'s preference.
pub(crate) fn simulate(
    classes: &[ClassTerms],
    converted: &[bool],
    proceeds: Decimal,
) -> Result<Vec<ClassPayout>, MoneyError> {
    let mut payouts = vec![ClassPayout::default(); classes.len()];
    let mut remaining = proceeds;

    let takes_preference = |idx: usize| {
        classes[idx].preferred && !converted[idx] && classes[idx].preference > Decimal::ZERO
    };
    let mut idx = 0;
    while idx < classes.len() {
        let seniority = classes[idx].seniority;
        let tier: Vec<usize> = (idx..classes.len())
            .take_while(|&i| classes[i].seniority == seniority)
            .collect();
        idx += tier.len();
        let claimants: Vec<usize> = tier.into_iter().filter(|&i| takes_preference(i)).collect();
        let demand: Decimal = claimants.iter().map(|&i| classes[i].preference).sum();
        if demand.is_zero() {
            continue;
        }
        if demand <= remaining {
            for &i in &claimants {
                payouts[i].preference = classes[i].preference;
            }
            remaining -= demand;
        } else {
            for &i in &claimants {
                payouts[i].preference = share_of(remaining, classes[i].preference, demand)?;
            }
            remaining = Decimal::ZERO;
        }
    }

    let claimants: Vec<usize> = (0..classes.len())
        .filter(|&i| {
            (converted[i] || classes[i].participates()) && classes[i].as_converted > Decimal::ZERO
        })
        .collect();
    let mut pool = claimants.clone();
    while remaining > Decimal::ZERO && !pool.is_empty() {
        let weight: Decimal = pool.iter().map(|&i| classes[i].as_converted).sum();
        let mut capped = Vec::new();
        for &i in &pool {
            let Some(cap) = classes[i].cap else { continue };
            if converted[i] {
                continue;
            }
            let headroom = (cap - payouts[i].preference).max(Decimal::ZERO);
            if share_of(remaining, classes[i].as_converted, weight)? > headroom {
                capped.push((i, headroom));
            }
        }
        if capped.is_empty() {
            for &i in &pool {
                payouts[i].participation += share_of(remaining, classes[i].as_converted, weight)?;
            }
            remaining = Decimal::ZERO;
            break;
        }
        for (i, headroom) in capped {
            payouts[i].participation += headroom;
            remaining -= headroom;
            pool.retain(|&j| j != i);
        }
    }

    // Every claimant is capped out: the excess goes to them past their caps,
    // or to every class when there are no claimants at all.
    if remaining > Decimal::ZERO {
        let fallback: Vec<usize> = if claimants.is_empty() {
            (0..classes.len()).collect()
        } else {
            claimants
        };
        let weight: Decimal = fallback.iter().map(|&i| classes[i].as_converted).sum();
        if weight > Decimal::ZERO {
            for &i in &fallback {
                payouts[i].participation += share_of(remaining, classes[i].as_converted, weight)?;
            }
        }
    }
    Ok(payouts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Participation, StakeholderId};
    use rust_decimal_macros::dec;

    use crate::model::HolderStake;

    fn class(
        id: &str,
        seniority: u32,
        preferred: bool,
        participation: Participation,
        shares: u64,
        invested: Decimal,
    ) -> ClassTerms {
        let multiple = if preferred { Decimal::ONE } else { Decimal::ZERO };
        let cap = match participation {
            Participation::ParticipatingCapped { cap_multiple } => Some(cap_multiple * invested),
            _ => None,
        };
        ClassTerms {
            id: id.into(),
            seniority,
            preferred,
            participation,
            liquidation_multiple: multiple,
            shares,
            as_converted: Decimal::from(shares),
            preference: multiple * invested,
            cap,
            holders: vec![HolderStake {
                stakeholder_id: StakeholderId::new(id),
                shares,
                invested,
                largest_position: shares,
            }],
        }
    }

    #[test]
    fn short_tier_splits_pari_passu() {
        let classes = vec![
            class("a", 1, true, Participation::NonParticipating, 100, dec!(1000000)),
            class("b", 1, true, Participation::NonParticipating, 100, dec!(3000000)),
            class("common", u32::MAX, false, Participation::NonParticipating, 800, Decimal::ZERO),
        ];
        let payouts = simulate(&classes, &[false, false, false], dec!(2000000)).unwrap();
        assert_eq!(payouts[0].preference, dec!(500000));
        assert_eq!(payouts[1].preference, dec!(1500000));
        assert_eq!(payouts[2].total(), Decimal::ZERO);
    }

    #[test]
    fn capped_participation_spills_to_common() {
        let classes = vec![
            class(
                "a",
                1,
                true,
                Participation::ParticipatingCapped { cap_multiple: dec!(2) },
                1000000,
                dec!(1000000),
            ),
            class(
                "common",
                u32::MAX,
                false,
                Participation::NonParticipating,
                4000000,
                Decimal::ZERO,
            ),
        ];
        let payouts = simulate(&classes, &[false, false], dec!(10000000)).unwrap();
        assert_eq!(payouts[0].total(), dec!(2000000));
        assert_eq!(payouts[1].total(), dec!(8000000));
    }

    #[test]
    fn capped_out_residual_stays_with_capped_classes() {
        let classes = vec![
            class("b", 1, true, Participation::NonParticipating, 10, dec!(100)),
            class(
                "a",
                2,
                true,
                Participation::ParticipatingCapped { cap_multiple: dec!(2) },
                10,
                dec!(100),
            ),
        ];
        let payouts = simulate(&classes, &[false, false], dec!(600)).unwrap();
        assert_eq!(payouts[0].total(), dec!(100));
        assert_eq!(payouts[1].preference, dec!(100));
        assert_eq!(payouts[1].participation, dec!(400));
    }

    #[test]
    fn residual_without_participants_is_spread() {
        let classes = vec![class("a", 1, true, Participation::NonParticipating, 10, dec!(100))];
        let payouts = simulate(&classes, &[false], dec!(150)).unwrap();
        assert_eq!(payouts[0].preference, dec!(100));
        assert_eq!(payouts[0].participation, dec!(50));
    }
}

use std::collections::BTreeMap;

use core_types::{money::ShareCount, Participation, ShareClassId, StakeholderId};
use ledger::CapTableSnapshot;
use rust_decimal::Decimal;

/// One stakeholder's holdings within a class.
#[derive(Debug, Clone)]
pub(crate) struct HolderStake {
    pub stakeholder_id: StakeholderId,
    pub shares: ShareCount,
    pub invested: Decimal,
    pub largest_position: ShareCount,
}

/// A class with outstanding shares, reduced to what the waterfall needs.
/// Preferred classes are split into tranches of holders who paid the same
/// price per share; each tranche makes its own conversion choice.
#[derive(Debug, Clone)]
pub(crate) struct ClassTerms {
    pub id: ShareClassId,
    pub seniority: u32,
    pub preferred: bool,
    pub participation: Participation,
    pub liquidation_multiple: Decimal,
    pub shares: ShareCount,
    pub as_converted: Decimal,
    pub preference: Decimal,
    /// Ceiling on preference plus participation when capped.
    pub cap: Option<Decimal>,
    /// Ordered by stakeholder id.
    pub holders: Vec<HolderStake>,
}

impl ClassTerms {
    /// Shares in the residual pool without converting.
    pub fn participates(&self) -> bool {
        !self.preferred || !matches!(self.participation, Participation::NonParticipating)
    }

    pub fn holder_preference(&self, holder: &HolderStake) -> Decimal {
        self.liquidation_multiple * holder.invested
    }
}

/// Holders grouped by price paid per share, in order of their lowest
/// stakeholder id.
fn tranches(holders: Vec<HolderStake>) -> Vec<Vec<HolderStake>> {
    let mut groups: Vec<(Option<Decimal>, Vec<HolderStake>)> = Vec::new();
    for holder in holders {
        let price = holder.invested.checked_div(Decimal::from(holder.shares));
        match groups
            .iter_mut()
            .find(|(key, _)| key.is_some() && *key == price)
        {
            Some((_, group)) => group.push(holder),
            None => groups.push((price, vec![holder])),
        }
    }
    groups.into_iter().map(|(_, group)| group).collect()
}

/// Election units holding shares in `snapshot`, senior first. Tranches of a
/// class are adjacent.
pub(crate) fn build_classes(snapshot: &CapTableSnapshot) -> Vec<ClassTerms> {
    let mut classes = Vec::new();
    for class in snapshot.share_classes().by_seniority() {
        let mut holders: BTreeMap<&StakeholderId, HolderStake> = BTreeMap::new();
        for position in snapshot.positions_in_class(class.id.clone()) {
            let stake = holders
                .entry(&position.stakeholder_id)
                .or_insert_with(|| HolderStake {
                    stakeholder_id: position.stakeholder_id.clone(),
                    shares: 0,
                    invested: Decimal::ZERO,
                    largest_position: 0,
                });
            stake.shares += position.share_count;
            stake.invested += position.invested_amount();
            stake.largest_position = stake.largest_position.max(position.share_count);
        }
        if holders.is_empty() {
            continue;
        }
        let holders: Vec<HolderStake> = holders.into_values().collect();
        let preferred = class.is_preferred();
        let groups = if preferred {
            tranches(holders)
        } else {
            vec![holders]
        };
        let liquidation_multiple = if preferred {
            class.liquidation_multiple
        } else {
            Decimal::ZERO
        };
        for holders in groups {
            let shares: ShareCount = holders.iter().map(|h| h.shares).sum();
            let invested: Decimal = holders.iter().map(|h| h.invested).sum();
            let cap = match class.participation {
                Participation::ParticipatingCapped { cap_multiple } if preferred => {
                    Some(cap_multiple * invested)
                }
                _ => None,
            };
            classes.push(ClassTerms {
                id: class.id.clone(),
                seniority: class.seniority,
                preferred,
                participation: class.participation,
                liquidation_multiple,
                shares,
                as_converted: class.as_converted(shares),
                preference: liquidation_multiple * invested,
                cap,
                holders,
            });
        }
    }
    classes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_types::{NewPosition, ShareClass};
    use rust_decimal_macros::dec;

    #[test]
    fn preferred_holders_split_by_price_paid() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let snapshot = CapTableSnapshot::genesis("acme".into(), at)
            .define_share_class(ShareClass::common("common", "Common"), at)
            .unwrap()
            .define_share_class(ShareClass::preferred("series-a", "Series A", 1, dec!(1.00)), at)
            .unwrap()
            .apply_issuance(
                &"common".into(),
                vec![
                    NewPosition::new("founder-1", 500, Decimal::ZERO, at),
                    NewPosition::new("founder-2", 500, Decimal::ZERO, at),
                ],
                at,
            )
            .unwrap()
            .apply_issuance(
                &"series-a".into(),
                vec![
                    NewPosition::new("fund-a", 1000, dec!(1.00), at),
                    NewPosition::new("angel", 10, dec!(10.00), at),
                    NewPosition::new("fund-b", 3000, dec!(1.00), at),
                ],
                at,
            )
            .unwrap();
        let classes = build_classes(&snapshot);
        let summary: Vec<(&str, Vec<&str>, Decimal)> = classes
            .iter()
            .map(|c| {
                (
                    c.id.as_str(),
                    c.holders.iter().map(|h| h.stakeholder_id.as_str()).collect(),
                    c.preference,
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                ("series-a", vec!["angel"], dec!(100)),
                ("series-a", vec!["fund-a", "fund-b"], dec!(4000)),
                ("common", vec!["founder-1", "founder-2"], Decimal::ZERO),
            ]
        );
    }
}

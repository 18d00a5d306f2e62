use core_types::{
    money, CompanyId, ExitEventId, ShareClassId, StakeholderId, WaterfallConfig,
};
use ledger::CapTableSnapshot;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    election::{alternatives, elect},
    error::{Result, WaterfallError},
    model::{build_classes, ClassTerms},
    simulate::{simulate, ClassPayout},
};

/// Payout to one stakeholder for their holdings of one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitDistribution {
    pub exit_event_id: ExitEventId,
    pub stakeholder_id: StakeholderId,
    pub share_class_id: ShareClassId,
    pub payout_amount: Decimal,
    pub conversion_chosen: bool,
}

/// Outcome for a class, or for one tranche of a preferred class whose
/// holders paid different prices. `preference_only_payout` is what the
/// tranche would receive by keeping its preference with every other choice
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassOutcome {
    pub share_class_id: ShareClassId,
    pub stakeholders: Vec<StakeholderId>,
    pub converted: bool,
    pub preference_paid: Decimal,
    pub participation_paid: Decimal,
    pub payout: Decimal,
    pub preference_only_payout: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterfallResult {
    pub exit_event_id: ExitEventId,
    pub company_id: CompanyId,
    pub snapshot_version: u64,
    pub snapshot_id: String,
    pub total_proceeds: Decimal,
    pub distributions: Vec<ExitDistribution>,
    pub classes: Vec<ClassOutcome>,
    pub election_passes: usize,
    /// False when the pass limit ran out before the choices stopped changing.
    pub elections_settled: bool,
}

impl WaterfallResult {
    pub fn total_distributed(&self) -> Decimal {
        self.distributions.iter().map(|d| d.payout_amount).sum()
    }

    /// Sum over every class the stakeholder holds.
    pub fn payout_for(&self, stakeholder_id: &StakeholderId) -> Decimal {
        self.distributions
            .iter()
            .filter(|d| &d.stakeholder_id == stakeholder_id)
            .map(|d| d.payout_amount)
            .sum()
    }

    /// First tranche of the class.
    pub fn class_outcome(&self, share_class_id: &ShareClassId) -> Option<&ClassOutcome> {
        self.classes
            .iter()
            .find(|c| &c.share_class_id == share_class_id)
    }

    /// The tranche holding `stakeholder_id`'s shares of the class.
    pub fn holder_outcome(
        &self,
        share_class_id: &ShareClassId,
        stakeholder_id: &StakeholderId,
    ) -> Option<&ClassOutcome> {
        self.classes.iter().find(|c| {
            &c.share_class_id == share_class_id && c.stakeholders.contains(stakeholder_id)
        })
    }
}

struct Row<'a> {
    class: &'a ClassTerms,
    converted: bool,
    holder: usize,
    exact: Decimal,
    units: i128,
}

#[derive(Debug, Clone, Default)]
pub struct WaterfallEngine {
    config: WaterfallConfig,
}

impl WaterfallEngine {
    pub fn new(config: WaterfallConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WaterfallConfig {
        &self.config
    }

    /// Distributes `total_proceeds` over the holders of `snapshot`. The
    /// payouts always sum to `total_proceeds` exactly; proceeds below the
    /// preference stack are not an error.
    pub fn compute(
        &self,
        exit_event_id: &ExitEventId,
        snapshot: &CapTableSnapshot,
        total_proceeds: Decimal,
    ) -> Result<WaterfallResult> {
        let scale = self.config.currency_scale;
        if total_proceeds < Decimal::ZERO {
            return Err(WaterfallError::invalid_input(format!(
                "proceeds {total_proceeds} are negative"
            )));
        }
        if snapshot.total_shares_outstanding() == 0 {
            return Err(WaterfallError::invalid_input(format!(
                "{} v{} has no shares outstanding",
                snapshot.company_id(),
                snapshot.version()
            )));
        }
        let proceeds_units = money::to_minor_units(total_proceeds, scale).map_err(|err| {
            WaterfallError::invalid_input(format!("proceeds {total_proceeds}: {err}"))
        })?;

        let classes = build_classes(snapshot);
        let elections = elect(&classes, total_proceeds, self.config.max_election_depth)?;
        if !elections.settled {
            warn!(
                "waterfall {}: conversion choices still moving after {} passes",
                exit_event_id, elections.passes
            );
        }
        let payouts = simulate(&classes, &elections.converted, total_proceeds)?;

        let mut outcomes = Vec::with_capacity(classes.len());
        for (idx, class) in classes.iter().enumerate() {
            let chosen = payouts[idx].total();
            let preference_only = if !class.preferred {
                Decimal::ZERO
            } else if elections.converted[idx] {
                alternatives(&classes, &elections.converted, total_proceeds, idx)?.1
            } else {
                chosen
            };
            outcomes.push(ClassOutcome {
                share_class_id: class.id.clone(),
                stakeholders: class.holders.iter().map(|h| h.stakeholder_id.clone()).collect(),
                converted: elections.converted[idx],
                preference_paid: money::floor_to_scale(payouts[idx].preference, scale),
                participation_paid: money::floor_to_scale(payouts[idx].participation, scale),
                payout: money::floor_to_scale(chosen, scale),
                preference_only_payout: money::floor_to_scale(preference_only, scale),
            });
        }

        let mut rows = split_to_holders(&classes, &payouts, &elections.converted, scale)?;
        assign_remainder(&mut rows, proceeds_units)?;

        let distributions: Vec<ExitDistribution> = rows
            .iter()
            .map(|row| ExitDistribution {
                exit_event_id: exit_event_id.clone(),
                stakeholder_id: row.class.holders[row.holder].stakeholder_id.clone(),
                share_class_id: row.class.id.clone(),
                payout_amount: money::from_minor_units(row.units, scale),
                conversion_chosen: row.converted,
            })
            .collect();

        for outcome in &outcomes {
            debug!(
                "waterfall {}: {} converted={} preference={} participation={}",
                exit_event_id,
                outcome.share_class_id,
                outcome.converted,
                outcome.preference_paid,
                outcome.participation_paid
            );
        }
        info!(
            "waterfall {}: distributed {} across {} rows from {} v{}",
            exit_event_id,
            total_proceeds,
            distributions.len(),
            snapshot.company_id(),
            snapshot.version()
        );
        Ok(WaterfallResult {
            exit_event_id: exit_event_id.clone(),
            company_id: snapshot.company_id().clone(),
            snapshot_version: snapshot.version(),
            snapshot_id: snapshot.snapshot_id().to_string(),
            total_proceeds,
            distributions,
            classes: outcomes,
            election_passes: elections.passes,
            elections_settled: elections.settled,
        })
    }
}

/// Preference paid is split by each holder's own preference amount,
/// participation by shares held. Each row is floored to the currency unit.
fn split_to_holders<'a>(
    classes: &'a [ClassTerms],
    payouts: &[ClassPayout],
    converted: &[bool],
    scale: u32,
) -> Result<Vec<Row<'a>>> {
    let mut rows = Vec::new();
    for (idx, (class, payout)) in classes.iter().zip(payouts).enumerate() {
        let class_shares = Decimal::from(class.shares);
        for (holder_idx, holder) in class.holders.iter().enumerate() {
            let mut exact = Decimal::ZERO;
            if !payout.preference.is_zero() && !class.preference.is_zero() {
                exact += money::checked_mul_div(
                    payout.preference,
                    class.holder_preference(holder),
                    class.preference,
                )?;
            }
            if !payout.participation.is_zero() {
                exact += money::checked_mul_div(
                    payout.participation,
                    Decimal::from(holder.shares),
                    class_shares,
                )?;
            }
            let units = money::to_minor_units(money::floor_to_scale(exact, scale), scale)?;
            rows.push(Row {
                class,
                converted: converted[idx],
                holder: holder_idx,
                exact,
                units,
            });
        }
    }
    Ok(rows)
}

/// Gives the units lost to flooring to the row holding the largest single
/// position, lowest stakeholder id then class id on ties.
fn assign_remainder(rows: &mut [Row<'_>], proceeds_units: i128) -> Result<()> {
    let assigned: i128 = rows.iter().map(|r| r.units).sum();
    let remainder = proceeds_units - assigned;
    if remainder < 0 {
        return Err(ledger::LedgerError::invariant(format!(
            "rounded payouts exceed proceeds by {} units",
            -remainder
        ))
        .into());
    }
    if remainder == 0 {
        return Ok(());
    }
    let target = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row.exact > Decimal::ZERO)
        .max_by(|(_, a), (_, b)| {
            let a_holder = &a.class.holders[a.holder];
            let b_holder = &b.class.holders[b.holder];
            a_holder
                .largest_position
                .cmp(&b_holder.largest_position)
                .then_with(|| b_holder.stakeholder_id.cmp(&a_holder.stakeholder_id))
                .then_with(|| b.class.id.cmp(&a.class.id))
        })
        .map(|(idx, _)| idx)
        .ok_or_else(|| {
            ledger::LedgerError::invariant(format!("{remainder} units left with no payee"))
        })?;
    rows[target].units += remainder;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_types::{NewPosition, Participation, ShareClass};
    use rust_decimal_macros::dec;

    fn cap_table(series_a: ShareClass) -> CapTableSnapshot {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        CapTableSnapshot::genesis("acme".into(), at)
            .define_share_class(ShareClass::common("common", "Common"), at)
            .unwrap()
            .define_share_class(series_a, at)
            .unwrap()
            .apply_issuance(
                &"common".into(),
                vec![
                    NewPosition::new("founder-1", 3000000, Decimal::ZERO, at),
                    NewPosition::new("founder-2", 1000000, Decimal::ZERO, at),
                ],
                at,
            )
            .unwrap()
            .apply_issuance(
                &"series-a".into(),
                vec![NewPosition::new("fund-a", 1000000, dec!(1.00), at)],
                at,
            )
            .unwrap()
    }

    fn series_a() -> ShareClass {
        ShareClass::preferred("series-a", "Series A", 1, dec!(1.00))
    }

    fn run(snapshot: &CapTableSnapshot, proceeds: Decimal) -> WaterfallResult {
        WaterfallEngine::default()
            .compute(&"exit-1".into(), snapshot, proceeds)
            .unwrap()
    }

    #[test]
    fn small_exit_goes_to_preference() {
        let result = run(&cap_table(series_a()), dec!(500000));
        assert_eq!(result.payout_for(&"fund-a".into()), dec!(500000));
        assert_eq!(result.payout_for(&"founder-1".into()), Decimal::ZERO);
        assert_eq!(result.payout_for(&"founder-2".into()), Decimal::ZERO);
        let outcome = result.class_outcome(&"series-a".into()).unwrap();
        assert!(!outcome.converted);
        assert_eq!(result.total_distributed(), dec!(500000));
    }

    #[test]
    fn large_exit_converts() {
        let result = run(&cap_table(series_a()), dec!(10000000));
        assert_eq!(result.payout_for(&"fund-a".into()), dec!(2000000));
        assert_eq!(result.payout_for(&"founder-1".into()), dec!(6000000));
        assert_eq!(result.payout_for(&"founder-2".into()), dec!(2000000));
        let outcome = result.class_outcome(&"series-a".into()).unwrap();
        assert!(outcome.converted);
        assert_eq!(outcome.preference_only_payout, dec!(1000000));
        assert!(result
            .distributions
            .iter()
            .filter(|d| d.share_class_id.as_str() == "series-a")
            .all(|d| d.conversion_chosen));
    }

    #[test]
    fn participating_takes_preference_and_share() {
        let class = series_a().with_participation(Participation::Participating);
        let result = run(&cap_table(class), dec!(10000000));
        // 1,000,000 preference plus 20% of the remaining 9,000,000
        assert_eq!(result.payout_for(&"fund-a".into()), dec!(2800000));
        assert_eq!(result.total_distributed(), dec!(10000000));
    }

    #[test]
    fn capped_participation_converts_above_cap() {
        let class = series_a().with_participation(Participation::ParticipatingCapped {
            cap_multiple: dec!(2),
        });
        let snapshot = cap_table(class);
        let at_cap = run(&snapshot, dec!(10000000));
        assert_eq!(at_cap.payout_for(&"fund-a".into()), dec!(2000000));
        assert!(!at_cap.class_outcome(&"series-a".into()).unwrap().converted);

        let above_cap = run(&snapshot, dec!(20000000));
        assert_eq!(above_cap.payout_for(&"fund-a".into()), dec!(4000000));
        assert!(above_cap.class_outcome(&"series-a".into()).unwrap().converted);
    }

    #[test]
    fn holders_who_paid_more_keep_their_preference() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let snapshot = CapTableSnapshot::genesis("acme".into(), at)
            .define_share_class(ShareClass::common("common", "Common"), at)
            .unwrap()
            .define_share_class(series_a(), at)
            .unwrap()
            .apply_issuance(
                &"common".into(),
                vec![NewPosition::new("founder", 100000, Decimal::ZERO, at)],
                at,
            )
            .unwrap()
            .apply_issuance(
                &"series-a".into(),
                vec![
                    NewPosition::new("fund-y", 100000, dec!(1.00), at),
                    NewPosition::new("angel-x", 100, dec!(10.00), at),
                ],
                at,
            )
            .unwrap();
        let result = run(&snapshot, dec!(400000));
        assert!(result.elections_settled);
        assert_eq!(result.payout_for(&"angel-x".into()), dec!(1000));
        assert_eq!(result.payout_for(&"fund-y".into()), dec!(199500));
        assert_eq!(result.payout_for(&"founder".into()), dec!(199500));

        let series_a: ShareClassId = "series-a".into();
        let angel = result.holder_outcome(&series_a, &"angel-x".into()).unwrap();
        assert!(!angel.converted);
        let fund = result.holder_outcome(&series_a, &"fund-y".into()).unwrap();
        assert!(fund.converted);
        assert!(result
            .distributions
            .iter()
            .any(|d| d.stakeholder_id.as_str() == "fund-y" && d.conversion_chosen));
        for outcome in &result.classes {
            assert!(outcome.payout >= outcome.preference_only_payout);
        }
    }

    #[test]
    fn remainder_cent_goes_to_largest_position() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let snapshot = CapTableSnapshot::genesis("acme".into(), at)
            .define_share_class(ShareClass::common("common", "Common"), at)
            .unwrap()
            .apply_issuance(
                &"common".into(),
                vec![
                    NewPosition::new("a", 100, Decimal::ZERO, at),
                    NewPosition::new("b", 100, Decimal::ZERO, at),
                    NewPosition::new("c", 100, Decimal::ZERO, at),
                ],
                at,
            )
            .unwrap();
        let result = run(&snapshot, dec!(100.00));
        assert_eq!(result.payout_for(&"a".into()), dec!(33.34));
        assert_eq!(result.payout_for(&"b".into()), dec!(33.33));
        assert_eq!(result.payout_for(&"c".into()), dec!(33.33));
    }

    #[test]
    fn malformed_input_is_rejected() {
        let snapshot = cap_table(series_a());
        let engine = WaterfallEngine::default();
        for proceeds in [dec!(-1), dec!(10.001)] {
            assert!(matches!(
                engine.compute(&"exit-1".into(), &snapshot, proceeds),
                Err(WaterfallError::InvalidExitInput { .. })
            ));
        }
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let empty = CapTableSnapshot::genesis("acme".into(), at);
        assert!(matches!(
            engine.compute(&"exit-1".into(), &empty, dec!(100)),
            Err(WaterfallError::InvalidExitInput { .. })
        ));
    }

    #[test]
    fn zero_proceeds_pay_nothing() {
        let result = run(&cap_table(series_a()), Decimal::ZERO);
        assert!(result.distributions.iter().all(|d| d.payout_amount.is_zero()));
        assert_eq!(result.distributions.len(), 3);
    }
}

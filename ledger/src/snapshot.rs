use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use core_types::{
    money::{self, ShareCount},
    uid, CompanyId, NewPosition, Position, PositionId, ShareClass, ShareClassId, StakeholderId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    error::{LedgerError, Result},
    registry::ShareClassRegistry,
};

/// Decimal places kept on derived cost bases.
const COST_BASIS_SCALE: u32 = 10;

/// Immutable, versioned view of a company's cap table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapTableSnapshot {
    company_id: CompanyId,
    version: u64,
    snapshot_id: String,
    as_of: DateTime<Utc>,
    total_shares_outstanding: ShareCount,
    positions: Vec<Position>,
    share_classes: ShareClassRegistry,
}

impl CapTableSnapshot {
    /// Version 0: no classes, no positions.
    pub fn genesis(company_id: CompanyId, as_of: DateTime<Utc>) -> Self {
        let share_classes = ShareClassRegistry::default();
        let snapshot_id = uid::snapshot_id(&company_id, 0, as_of, &[], share_classes.iter());
        Self {
            company_id,
            version: 0,
            snapshot_id,
            as_of,
            total_shares_outstanding: 0,
            positions: Vec::new(),
            share_classes,
        }
    }

    pub fn company_id(&self) -> &CompanyId {
        &self.company_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshot_id(&self) -> &str {
        &self.snapshot_id
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    pub fn total_shares_outstanding(&self) -> ShareCount {
        self.total_shares_outstanding
    }

    /// Positions in issuance order.
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn share_classes(&self) -> &ShareClassRegistry {
        &self.share_classes
    }

    pub fn share_class(&self, id: &ShareClassId) -> Result<&ShareClass> {
        self.share_classes.require(id)
    }

    pub fn positions_for(
        &self,
        stakeholder_id: StakeholderId,
    ) -> impl Iterator<Item = &Position> + '_ {
        self.positions
            .iter()
            .filter(move |p| p.stakeholder_id == stakeholder_id)
    }

    pub fn positions_in_class(
        &self,
        share_class_id: ShareClassId,
    ) -> impl Iterator<Item = &Position> + '_ {
        self.positions
            .iter()
            .filter(move |p| p.share_class_id == share_class_id)
    }

    pub fn class_share_count(&self, share_class_id: &ShareClassId) -> ShareCount {
        self.positions_in_class(share_class_id.clone())
            .map(|p| p.share_count)
            .sum()
    }

    /// Total shares per stakeholder, ordered by stakeholder id.
    pub fn holdings(&self) -> BTreeMap<StakeholderId, ShareCount> {
        let mut holdings = BTreeMap::new();
        for position in &self.positions {
            *holdings.entry(position.stakeholder_id.clone()).or_insert(0) += position.share_count;
        }
        holdings
    }

    /// Ownership fraction per stakeholder in fixed point. Units left over by
    /// truncation go to the largest remainders (lowest id on ties), so the
    /// fractions always sum to exactly one.
    pub fn ownership_table(&self) -> Result<BTreeMap<StakeholderId, Decimal>> {
        if self.total_shares_outstanding == 0 {
            return Err(LedgerError::invariant(format!(
                "{} v{} has no shares outstanding",
                self.company_id, self.version
            )));
        }
        let holdings = self.holdings();
        let weights: Vec<u128> = holdings.values().map(|s| u128::from(*s)).collect();
        let units = money::apportion(money::ownership_unit_total(), &weights);
        Ok(holdings
            .into_keys()
            .zip(units)
            .map(|(holder, units)| (holder, money::ownership_fraction(units)))
            .collect())
    }

    /// Zero for stakeholders absent from the snapshot.
    pub fn ownership_percentage(&self, stakeholder_id: &StakeholderId) -> Result<Decimal> {
        let table = self.ownership_table()?;
        Ok(table.get(stakeholder_id).copied().unwrap_or(Decimal::ZERO))
    }

    /// Starts the next version. Nothing is observable until
    /// [`SnapshotDraft::finish`] succeeds.
    pub fn draft(&self, as_of: DateTime<Utc>) -> SnapshotDraft {
        SnapshotDraft {
            company_id: self.company_id.clone(),
            version: self.version + 1,
            as_of,
            next_position_id: self
                .positions
                .iter()
                .map(|p| p.position_id)
                .max()
                .map_or(1, |id| id + 1),
            positions: self.positions.clone(),
            share_classes: self.share_classes.clone(),
        }
    }

    pub fn apply_issuance(
        &self,
        share_class_id: &ShareClassId,
        new_positions: Vec<NewPosition>,
        as_of: DateTime<Utc>,
    ) -> Result<CapTableSnapshot> {
        let mut draft = self.draft(as_of);
        draft.issue(share_class_id, new_positions)?;
        draft.finish()
    }

    pub fn define_share_class(
        &self,
        class: ShareClass,
        as_of: DateTime<Utc>,
    ) -> Result<CapTableSnapshot> {
        let mut draft = self.draft(as_of);
        draft.define_class(class)?;
        draft.finish()
    }

    pub fn apply_conversion(
        &self,
        stakeholder_id: &StakeholderId,
        from_class: &ShareClassId,
        to_class: &ShareClassId,
        as_of: DateTime<Utc>,
    ) -> Result<CapTableSnapshot> {
        let mut draft = self.draft(as_of);
        draft.convert(stakeholder_id, from_class, to_class)?;
        draft.finish()
    }

    /// Re-derives totals and the content id; used on journal reload.
    pub fn validate(&self) -> Result<()> {
        let mut total: ShareCount = 0;
        for position in &self.positions {
            if position.share_count == 0 {
                return Err(LedgerError::invariant(format!(
                    "position {} has zero shares",
                    position.position_id
                )));
            }
            self.share_classes.require(&position.share_class_id)?;
            total = total
                .checked_add(position.share_count)
                .ok_or_else(|| LedgerError::invariant("share total overflow"))?;
        }
        if total != self.total_shares_outstanding {
            return Err(LedgerError::invariant(format!(
                "total shares {} does not match positions sum {}",
                self.total_shares_outstanding, total
            )));
        }
        let expected_id = uid::snapshot_id(
            &self.company_id,
            self.version,
            self.as_of,
            &self.positions,
            self.share_classes.iter(),
        );
        if expected_id != self.snapshot_id {
            return Err(LedgerError::invariant(format!(
                "snapshot id mismatch for {} v{}",
                self.company_id, self.version
            )));
        }
        Ok(())
    }
}

/// Working copy of the next snapshot version.
#[derive(Debug, Clone)]
pub struct SnapshotDraft {
    company_id: CompanyId,
    version: u64,
    as_of: DateTime<Utc>,
    next_position_id: PositionId,
    positions: Vec<Position>,
    share_classes: ShareClassRegistry,
}

impl SnapshotDraft {
    pub fn share_classes(&self) -> &ShareClassRegistry {
        &self.share_classes
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn define_class(&mut self, class: ShareClass) -> Result<()> {
        let has_shares = self
            .positions
            .iter()
            .any(|p| p.share_class_id == class.id);
        self.share_classes.define(class, has_shares)
    }

    /// Appends positions of `share_class_id`; returns the assigned ids.
    pub fn issue(
        &mut self,
        share_class_id: &ShareClassId,
        new_positions: Vec<NewPosition>,
    ) -> Result<Vec<PositionId>> {
        self.share_classes.require(share_class_id)?;
        if new_positions.is_empty() {
            return Err(LedgerError::invariant(format!(
                "issuance of {share_class_id} adds no positions"
            )));
        }
        let mut ids = Vec::with_capacity(new_positions.len());
        for new_position in new_positions {
            if new_position.share_count == 0 {
                return Err(LedgerError::invariant(format!(
                    "issuance to {} of {share_class_id} has non-positive share count",
                    new_position.stakeholder_id
                )));
            }
            if new_position.cost_basis_per_share < Decimal::ZERO {
                return Err(LedgerError::invariant(format!(
                    "issuance to {} of {share_class_id} has negative cost basis",
                    new_position.stakeholder_id
                )));
            }
            let position_id = self.next_position_id;
            self.next_position_id += 1;
            self.positions.push(Position {
                position_id,
                stakeholder_id: new_position.stakeholder_id,
                share_class_id: share_class_id.clone(),
                share_count: new_position.share_count,
                cost_basis_per_share: new_position.cost_basis_per_share,
                issued_at: new_position.issued_at,
            });
            ids.push(position_id);
        }
        Ok(ids)
    }

    pub fn adjust_conversion_ratio(
        &mut self,
        share_class_id: &ShareClassId,
        ratio: Decimal,
    ) -> Result<Decimal> {
        self.share_classes
            .adjust_conversion_ratio(share_class_id, ratio)
    }

    /// Replaces a holder's `from_class` positions with one common position of
    /// `floor(shares * conversion_ratio)` shares carrying the same total
    /// cost. Returns the common shares issued.
    pub fn convert(
        &mut self,
        stakeholder_id: &StakeholderId,
        from_class: &ShareClassId,
        to_class: &ShareClassId,
    ) -> Result<ShareCount> {
        let source = self.share_classes.require(from_class)?.clone();
        let target = self.share_classes.require(to_class)?;
        if !source.is_preferred() || target.is_preferred() {
            return Err(LedgerError::invariant(format!(
                "conversion must go from preferred to common ({from_class} -> {to_class})"
            )));
        }

        let (converted, kept): (Vec<Position>, Vec<Position>) =
            self.positions.drain(..).partition(|p| {
                &p.stakeholder_id == stakeholder_id && &p.share_class_id == from_class
            });
        self.positions = kept;
        if converted.is_empty() {
            return Err(LedgerError::NoHoldings {
                stakeholder_id: stakeholder_id.clone(),
                share_class_id: from_class.clone(),
            });
        }

        let source_shares: ShareCount = converted.iter().map(|p| p.share_count).sum();
        let invested: Decimal = converted.iter().map(Position::invested_amount).sum();
        let common_shares = money::whole_shares(source.as_converted(source_shares))?;
        if common_shares == 0 {
            return Err(LedgerError::invariant(format!(
                "conversion of {stakeholder_id}'s {from_class} yields no common shares"
            )));
        }
        let cost_basis = money::floor_to_scale(
            money::checked_mul_div(invested, Decimal::ONE, Decimal::from(common_shares))?,
            COST_BASIS_SCALE,
        );
        let position_id = self.next_position_id;
        self.next_position_id += 1;
        self.positions.push(Position {
            position_id,
            stakeholder_id: stakeholder_id.clone(),
            share_class_id: to_class.clone(),
            share_count: common_shares,
            cost_basis_per_share: cost_basis,
            issued_at: self.as_of,
        });
        Ok(common_shares)
    }

    pub fn finish(self) -> Result<CapTableSnapshot> {
        let mut total: ShareCount = 0;
        for position in &self.positions {
            total = total.checked_add(position.share_count).ok_or_else(|| {
                LedgerError::invariant(format!(
                    "total shares of {} would overflow the share-count domain",
                    self.company_id
                ))
            })?;
        }
        let snapshot_id = uid::snapshot_id(
            &self.company_id,
            self.version,
            self.as_of,
            &self.positions,
            self.share_classes.iter(),
        );
        Ok(CapTableSnapshot {
            company_id: self.company_id,
            version: self.version,
            snapshot_id,
            as_of: self.as_of,
            total_shares_outstanding: total,
            positions: self.positions,
            share_classes: self.share_classes,
        })
    }
}

/// Cost basis that never overstates `amount` when multiplied back out.
pub fn cost_basis_for(amount: Decimal, shares: ShareCount) -> Result<Decimal> {
    if shares == 0 {
        return Err(LedgerError::invariant("cost basis over zero shares"));
    }
    Ok(money::floor_to_scale(
        money::checked_mul_div(amount, Decimal::ONE, Decimal::from(shares))?,
        COST_BASIS_SCALE,
    ))
}

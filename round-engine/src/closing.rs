use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use core_types::{
    money::{self, ShareCount},
    CompanyId, NewPosition, RoundId, ShareClassId, StakeholderId,
};
use ledger::{cost_basis_for, CapTableSnapshot, LedgerError};
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    anti_dilution::{compute_adjustments, AntiDilutionAdjustment, DilutiveIssuance},
    errors::{Result, RoundError},
    round::Round,
};

/// Terms fixed at closing. `base_version` is the snapshot version the
/// closing is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalTerms {
    pub price_per_share: Decimal,
    pub closed_at: DateTime<Utc>,
    pub base_version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareAllocation {
    pub investor_id: StakeholderId,
    pub amount: Decimal,
    pub share_count: ShareCount,
}

/// Record of a closed round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedRound {
    pub round_id: RoundId,
    pub company_id: CompanyId,
    pub share_class_id: ShareClassId,
    pub price_per_share: Decimal,
    pub total_raised: Decimal,
    pub shares_issued: ShareCount,
    pub pre_money: Decimal,
    pub post_money: Decimal,
    pub base_version: u64,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundClosing {
    pub snapshot: CapTableSnapshot,
    pub adjustments: Vec<AntiDilutionAdjustment>,
    pub allocations: Vec<ShareAllocation>,
    pub record: ClosedRound,
}

/// Splits `shares_issued` across commitments. Each investor gets
/// `floor(shares_issued * amount / total_raised)`; leftover shares go one at
/// a time in ascending investor id order.
pub fn allocate_shares(
    commitments: &BTreeMap<StakeholderId, Decimal>,
    total_raised: Decimal,
    shares_issued: ShareCount,
) -> Result<Vec<ShareAllocation>> {
    let issued = Decimal::from(shares_issued);
    let mut allocations = Vec::with_capacity(commitments.len());
    for (investor_id, amount) in commitments {
        let share_count =
            money::whole_shares(money::checked_mul_div(issued, *amount, total_raised)?)?;
        allocations.push(ShareAllocation {
            investor_id: investor_id.clone(),
            amount: *amount,
            share_count,
        });
    }
    let allocated: ShareCount = allocations.iter().map(|a| a.share_count).sum();
    let mut leftover = shares_issued.checked_sub(allocated).ok_or_else(|| {
        LedgerError::invariant(format!(
            "allocated {allocated} shares, more than the {shares_issued} issued"
        ))
    })?;
    let investors = allocations.len();
    let mut idx = 0;
    while leftover > 0 && investors > 0 {
        allocations[idx % investors].share_count += 1;
        leftover -= 1;
        idx += 1;
    }
    Ok(allocations)
}

/// Computes the snapshot that closes `round` on top of `base`: the round's
/// class, the investors' new positions, and any anti-dilution adjustments,
/// all in one version. Pure; the same inputs give the same snapshot.
pub fn close_round(
    round: &Round,
    base: &CapTableSnapshot,
    terms: &FinalTerms,
) -> Result<RoundClosing> {
    round.ensure_closable()?;
    if base.company_id() != &round.company_id {
        return Err(LedgerError::invariant(format!(
            "round {} belongs to {}, snapshot to {}",
            round.round_id,
            round.company_id,
            base.company_id()
        ))
        .into());
    }
    if base.version() != terms.base_version {
        return Err(LedgerError::StaleSnapshot {
            company_id: base.company_id().clone(),
            expected: terms.base_version,
            actual: base.version(),
        }
        .into());
    }

    let total_raised = round.total_raised();
    if total_raised <= Decimal::ZERO {
        return Err(RoundError::RoundNotReady {
            round_id: round.round_id.clone(),
            reason: "no money raised".to_string(),
        });
    }
    if terms.price_per_share <= Decimal::ZERO {
        return Err(RoundError::RoundNotReady {
            round_id: round.round_id.clone(),
            reason: format!("price per share {} is not positive", terms.price_per_share),
        });
    }

    let shares_issued = money::whole_shares(money::checked_mul_div(
        total_raised,
        Decimal::ONE,
        terms.price_per_share,
    )?)?;
    if shares_issued == 0 {
        return Err(LedgerError::invariant(format!(
            "round {} raises {} at {} per share, less than one share",
            round.round_id, total_raised, terms.price_per_share
        ))
        .into());
    }
    let allocations = allocate_shares(&round.commitments(), total_raised, shares_issued)?;
    if let Some(empty) = allocations.iter().find(|a| a.share_count == 0) {
        return Err(LedgerError::invariant(format!(
            "{} committed {} to round {}, less than one share",
            empty.investor_id, empty.amount, round.round_id
        ))
        .into());
    }

    let mut share_class = round.share_class.clone();
    if share_class.is_preferred() {
        share_class.issue_price = terms.price_per_share;
    }
    let share_class_id = share_class.id.clone();
    let adjustments = compute_adjustments(
        base,
        &share_class_id,
        &DilutiveIssuance {
            price_per_share: terms.price_per_share,
            total_raised,
            shares_issued,
        },
    )?;

    let mut draft = base.draft(terms.closed_at);
    draft.define_class(share_class)?;
    for adjustment in &adjustments {
        draft.adjust_conversion_ratio(&adjustment.share_class_id, adjustment.new_conversion_ratio)?;
        info!(
            "round {}: {:?} adjusts {} conversion price {} -> {} (ratio {} -> {})",
            round.round_id,
            adjustment.formula,
            adjustment.share_class_id,
            adjustment.old_conversion_price,
            adjustment.new_conversion_price,
            adjustment.old_conversion_ratio,
            adjustment.new_conversion_ratio
        );
    }
    let mut new_positions = Vec::with_capacity(allocations.len());
    for allocation in &allocations {
        new_positions.push(NewPosition::new(
            allocation.investor_id.clone(),
            allocation.share_count,
            cost_basis_for(allocation.amount, allocation.share_count)?,
            terms.closed_at,
        ));
    }
    draft.issue(&share_class_id, new_positions)?;
    let snapshot = draft.finish()?;

    let pre_money = terms.price_per_share * Decimal::from(base.total_shares_outstanding());
    let post_money = pre_money + terms.price_per_share * Decimal::from(shares_issued);
    debug!(
        "round {}: {} shares to {} investors at {} (pre {}, post {})",
        round.round_id,
        shares_issued,
        allocations.len(),
        terms.price_per_share,
        pre_money,
        post_money
    );
    Ok(RoundClosing {
        snapshot,
        adjustments,
        allocations,
        record: ClosedRound {
            round_id: round.round_id.clone(),
            company_id: round.company_id.clone(),
            share_class_id,
            price_per_share: terms.price_per_share,
            total_raised,
            shares_issued,
            pre_money,
            post_money,
            base_version: base.version(),
            closed_at: terms.closed_at,
        },
    })
}

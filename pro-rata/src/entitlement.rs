use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use core_types::{
    money, uid, EntitlementId, PositionId, RoundId, StakeholderId,
};
use ledger::CapTableSnapshot;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ProRataError, Result};

/// Entitlement amounts are floored to the cent.
pub const AMOUNT_SCALE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
    Offered,
    Accepted,
    Exercised,
    Declined,
    Expired,
}

impl EntitlementStatus {
    pub fn is_open(self) -> bool {
        matches!(self, EntitlementStatus::Offered | EntitlementStatus::Accepted)
    }
}

/// The round an existing investor may participate in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundOffer {
    pub round_id: RoundId,
    pub target_amount: Decimal,
    pub notification_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProRataEntitlement {
    pub entitlement_id: EntitlementId,
    pub investor_id: StakeholderId,
    pub originating_position_id: PositionId,
    pub round_id: RoundId,
    pub entitlement_amount: Decimal,
    allocation_used: Decimal,
    allocation_remaining: Decimal,
    pub deadline: DateTime<Utc>,
    status: EntitlementStatus,
}

impl ProRataEntitlement {
    pub fn new(
        investor_id: StakeholderId,
        originating_position_id: PositionId,
        round_id: RoundId,
        entitlement_amount: Decimal,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            entitlement_id: uid::entitlement_id(&round_id, &investor_id),
            investor_id,
            originating_position_id,
            round_id,
            entitlement_amount,
            allocation_used: Decimal::ZERO,
            allocation_remaining: entitlement_amount,
            deadline,
            status: EntitlementStatus::Offered,
        }
    }

    pub fn status(&self) -> EntitlementStatus {
        self.status
    }

    pub fn allocation_used(&self) -> Decimal {
        self.allocation_used
    }

    pub fn allocation_remaining(&self) -> Decimal {
        self.allocation_remaining
    }

    /// Moves an open entitlement past its deadline to `Expired`. Returns
    /// true when this call made the transition.
    pub fn refresh_expiry(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.is_open() && now > self.deadline {
            self.status = EntitlementStatus::Expired;
            return true;
        }
        false
    }

    fn expired(&self) -> ProRataError {
        ProRataError::OpportunityExpired {
            entitlement_id: self.entitlement_id.clone(),
            deadline: self.deadline,
        }
    }

    pub fn accept(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.refresh_expiry(now);
        match self.status {
            EntitlementStatus::Offered => {
                self.status = EntitlementStatus::Accepted;
                Ok(())
            }
            EntitlementStatus::Expired => Err(self.expired()),
            status => Err(ProRataError::InvalidStatus {
                entitlement_id: self.entitlement_id.clone(),
                status,
                operation: "accept",
            }),
        }
    }

    /// Takes up `amount` of the remaining allocation. The entitlement is
    /// `Exercised` once nothing remains, `Accepted` otherwise.
    pub fn exercise(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<()> {
        self.refresh_expiry(now);
        match self.status {
            EntitlementStatus::Offered | EntitlementStatus::Accepted => {}
            EntitlementStatus::Expired => return Err(self.expired()),
            status => {
                return Err(ProRataError::InvalidStatus {
                    entitlement_id: self.entitlement_id.clone(),
                    status,
                    operation: "exercise",
                })
            }
        }
        if amount <= Decimal::ZERO {
            return Err(ProRataError::InvalidAmount {
                entitlement_id: self.entitlement_id.clone(),
                amount,
            });
        }
        if amount > self.allocation_remaining {
            return Err(ProRataError::ExceedsAllocation {
                entitlement_id: self.entitlement_id.clone(),
                requested: amount,
                remaining: self.allocation_remaining,
            });
        }
        self.allocation_used += amount;
        self.allocation_remaining -= amount;
        self.status = if self.allocation_remaining.is_zero() {
            EntitlementStatus::Exercised
        } else {
            EntitlementStatus::Accepted
        };
        Ok(())
    }

    pub fn decline(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.refresh_expiry(now);
        match self.status {
            EntitlementStatus::Offered | EntitlementStatus::Accepted => {
                self.status = EntitlementStatus::Declined;
                Ok(())
            }
            EntitlementStatus::Exercised => Err(ProRataError::AlreadyExercised {
                entitlement_id: self.entitlement_id.clone(),
            }),
            EntitlementStatus::Declined => Err(ProRataError::AlreadyDeclined {
                entitlement_id: self.entitlement_id.clone(),
            }),
            EntitlementStatus::Expired => Err(self.expired()),
        }
    }
}

/// One entitlement per stakeholder holding a class with pro-rata rights,
/// sized by the holder's ownership of `prior` and ordered by investor id.
/// Holders whose share rounds to zero get no entitlement.
pub fn create_entitlements(
    prior: &CapTableSnapshot,
    offer: &RoundOffer,
    exercise_window: Duration,
) -> Result<Vec<ProRataEntitlement>> {
    let mut originating: BTreeMap<&StakeholderId, PositionId> = BTreeMap::new();
    for position in prior.positions() {
        let class = prior.share_class(&position.share_class_id)?;
        if !class.pro_rata_right {
            continue;
        }
        originating
            .entry(&position.stakeholder_id)
            .and_modify(|id| *id = (*id).min(position.position_id))
            .or_insert(position.position_id);
    }
    if originating.is_empty() {
        return Ok(Vec::new());
    }

    let ownership = prior.ownership_table()?;
    let deadline = offer.notification_date + exercise_window;
    let mut entitlements = Vec::with_capacity(originating.len());
    for (investor_id, position_id) in originating {
        let fraction = ownership.get(investor_id).copied().unwrap_or(Decimal::ZERO);
        let amount = money::floor_to_scale(
            fraction
                .checked_mul(offer.target_amount)
                .ok_or(money::MoneyError::Overflow)
                .map_err(ledger::LedgerError::from)?,
            AMOUNT_SCALE,
        );
        if amount.is_zero() {
            continue;
        }
        entitlements.push(ProRataEntitlement::new(
            investor_id.clone(),
            position_id,
            offer.round_id.clone(),
            amount,
            deadline,
        ));
    }
    Ok(entitlements)
}

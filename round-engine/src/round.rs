use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use core_types::{CompanyId, RoundId, ShareClass, StakeholderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, RoundError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Planning,
    Open,
    Active,
    Closed,
    Cancelled,
}

impl RoundStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RoundStatus::Closed | RoundStatus::Cancelled)
    }

    fn can_move_to(self, to: RoundStatus) -> bool {
        use RoundStatus::*;
        matches!(
            (self, to),
            (Planning, Open)
                | (Open, Active)
                | (Open, Closed)
                | (Active, Closed)
                | (Planning, Cancelled)
                | (Open, Cancelled)
                | (Active, Cancelled)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investment {
    pub investor_id: StakeholderId,
    pub amount: Decimal,
    pub recorded_at: DateTime<Utc>,
}

/// A priced equity round and the commitments recorded against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub round_id: RoundId,
    pub company_id: CompanyId,
    pub share_class: ShareClass,
    pub price_per_share: Decimal,
    pub target_amount: Decimal,
    pub notification_date: DateTime<Utc>,
    status: RoundStatus,
    investments: Vec<Investment>,
}

impl Round {
    pub fn new(
        round_id: impl Into<RoundId>,
        company_id: impl Into<CompanyId>,
        share_class: ShareClass,
        price_per_share: Decimal,
        target_amount: Decimal,
        notification_date: DateTime<Utc>,
    ) -> Self {
        Self {
            round_id: round_id.into(),
            company_id: company_id.into(),
            share_class,
            price_per_share,
            target_amount,
            notification_date,
            status: RoundStatus::Planning,
            investments: Vec::new(),
        }
    }

    pub fn status(&self) -> RoundStatus {
        self.status
    }

    pub fn investments(&self) -> &[Investment] {
        &self.investments
    }

    fn transition(&mut self, to: RoundStatus) -> Result<()> {
        if !self.status.can_move_to(to) {
            return Err(RoundError::InvalidStatus {
                round_id: self.round_id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn open(&mut self) -> Result<()> {
        self.transition(RoundStatus::Open)
    }

    pub fn activate(&mut self) -> Result<()> {
        self.transition(RoundStatus::Active)
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.transition(RoundStatus::Cancelled)
    }

    /// Marks the round closed once its closing has been committed.
    pub fn mark_closed(&mut self) -> Result<()> {
        self.transition(RoundStatus::Closed)
    }

    /// Checks that the round may close without changing it.
    pub fn ensure_closable(&self) -> Result<()> {
        if self.status.can_move_to(RoundStatus::Closed) {
            Ok(())
        } else {
            Err(RoundError::InvalidStatus {
                round_id: self.round_id.clone(),
                from: self.status,
                to: RoundStatus::Closed,
            })
        }
    }

    /// Only active rounds take money.
    pub fn record_investment(
        &mut self,
        investor_id: impl Into<StakeholderId>,
        amount: Decimal,
        recorded_at: DateTime<Utc>,
    ) -> Result<()> {
        let investor_id = investor_id.into();
        if self.status != RoundStatus::Active {
            return Err(RoundError::InvalidStatus {
                round_id: self.round_id.clone(),
                from: self.status,
                to: RoundStatus::Active,
            });
        }
        if amount <= Decimal::ZERO {
            return Err(RoundError::InvalidInvestment {
                round_id: self.round_id.clone(),
                reason: format!("{investor_id} committed non-positive amount {amount}"),
            });
        }
        self.investments.push(Investment {
            investor_id,
            amount,
            recorded_at,
        });
        Ok(())
    }

    pub fn total_raised(&self) -> Decimal {
        self.investments.iter().map(|i| i.amount).sum()
    }

    /// Committed amount per investor, in ascending investor id order.
    pub fn commitments(&self) -> BTreeMap<StakeholderId, Decimal> {
        let mut commitments = BTreeMap::new();
        for investment in &self.investments {
            *commitments
                .entry(investment.investor_id.clone())
                .or_insert(Decimal::ZERO) += investment.amount;
        }
        commitments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn round() -> Round {
        Round::new(
            "series-b",
            "acme",
            ShareClass::preferred("series-b", "Series B", 1, dec!(2.00)),
            dec!(2.00),
            dec!(5000000),
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn lifecycle_follows_state_machine() {
        let mut round = round();
        let at = round.notification_date;
        assert!(matches!(
            round.record_investment("fund-a", dec!(100), at),
            Err(RoundError::InvalidStatus { .. })
        ));
        assert!(round.activate().is_err());
        round.open().unwrap();
        round.activate().unwrap();
        round.record_investment("fund-a", dec!(100), at).unwrap();
        round.record_investment("fund-a", dec!(50), at).unwrap();
        round.record_investment("angel", dec!(25), at).unwrap();
        assert_eq!(round.total_raised(), dec!(175));
        assert_eq!(
            round.commitments().into_iter().collect::<Vec<_>>(),
            vec![
                (StakeholderId::new("angel"), dec!(25)),
                (StakeholderId::new("fund-a"), dec!(150)),
            ]
        );
        round.ensure_closable().unwrap();
        round.mark_closed().unwrap();
        assert!(round.status().is_terminal());
        assert!(round.cancel().is_err());
    }

    #[test]
    fn rejects_non_positive_investment() {
        let mut round = round();
        round.open().unwrap();
        round.activate().unwrap();
        let at = round.notification_date;
        assert!(matches!(
            round.record_investment("fund-a", Decimal::ZERO, at),
            Err(RoundError::InvalidInvestment { .. })
        ));
    }

    #[test]
    fn planning_round_cannot_close() {
        let mut round = round();
        assert!(round.ensure_closable().is_err());
        round.cancel().unwrap();
        assert!(matches!(
            round.open(),
            Err(RoundError::InvalidStatus {
                from: RoundStatus::Cancelled,
                to: RoundStatus::Open,
                ..
            })
        ));
    }
}

// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::ShareCount;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Company whose cap table is tracked.
    CompanyId
);
string_id!(
    /// Founder, employee, investor, or any other holder of record.
    StakeholderId
);
string_id!(ShareClassId);
string_id!(RoundId);
string_id!(ExitEventId);
string_id!(
    /// Content-derived id, see [`crate::uid::entitlement_id`].
    EntitlementId
);

/// Sequential within a company; assigned by the ledger on issuance.
pub type PositionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareClassKind {
    Common,
    Preferred,
}

/// How a preferred class shares in proceeds left after the preference pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Participation {
    NonParticipating,
    Participating,
    /// Preference plus participation is capped at `cap_multiple` times the
    /// invested amount.
    ParticipatingCapped { cap_multiple: Decimal },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntiDilution {
    None,
    FullRatchet,
    WeightedAverageBroad,
    WeightedAverageNarrow,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShareClassError {
    #[error("share class {id}: liquidation multiple {multiple} is negative")]
    NegativeMultiple { id: ShareClassId, multiple: Decimal },
    #[error("share class {id}: conversion ratio {ratio} must be positive")]
    NonPositiveRatio { id: ShareClassId, ratio: Decimal },
    #[error("share class {id}: preferred stock requires a positive issue price")]
    MissingIssuePrice { id: ShareClassId },
    #[error("share class {id}: participation cap {cap} is below the liquidation multiple")]
    InvalidCap { id: ShareClassId, cap: Decimal },
}

/// Economic terms of a class of security.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareClass {
    pub id: ShareClassId,
    pub name: String,
    pub kind: ShareClassKind,
    /// Lower ranks are paid first.
    pub seniority: u32,
    pub liquidation_multiple: Decimal,
    pub participation: Participation,
    /// Common shares received per share on conversion.
    pub conversion_ratio: Decimal,
    /// Price paid at issuance; the original conversion price.
    pub issue_price: Decimal,
    pub anti_dilution: AntiDilution,
    pub pro_rata_right: bool,
}

impl ShareClass {
    pub fn common(id: impl Into<ShareClassId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ShareClassKind::Common,
            seniority: u32::MAX,
            liquidation_multiple: Decimal::ZERO,
            participation: Participation::NonParticipating,
            conversion_ratio: Decimal::ONE,
            issue_price: Decimal::ZERO,
            anti_dilution: AntiDilution::None,
            pro_rata_right: false,
        }
    }

    /// 1x non-participating preferred, 1:1 conversion, no anti-dilution.
    pub fn preferred(
        id: impl Into<ShareClassId>,
        name: impl Into<String>,
        seniority: u32,
        issue_price: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ShareClassKind::Preferred,
            seniority,
            liquidation_multiple: Decimal::ONE,
            participation: Participation::NonParticipating,
            conversion_ratio: Decimal::ONE,
            issue_price,
            anti_dilution: AntiDilution::None,
            pro_rata_right: true,
        }
    }

    pub fn with_liquidation_multiple(mut self, multiple: Decimal) -> Self {
        self.liquidation_multiple = multiple;
        self
    }

    pub fn with_participation(mut self, participation: Participation) -> Self {
        self.participation = participation;
        self
    }

    pub fn with_anti_dilution(mut self, anti_dilution: AntiDilution) -> Self {
        self.anti_dilution = anti_dilution;
        self
    }

    pub fn with_pro_rata_right(mut self, pro_rata_right: bool) -> Self {
        self.pro_rata_right = pro_rata_right;
        self
    }

    pub fn with_conversion_ratio(mut self, ratio: Decimal) -> Self {
        self.conversion_ratio = ratio;
        self
    }

    pub fn is_preferred(&self) -> bool {
        matches!(self.kind, ShareClassKind::Preferred)
    }

    /// Effective price per common share received on conversion. `None` for
    /// classes issued without a price (founder common).
    pub fn conversion_price(&self) -> Option<Decimal> {
        if self.issue_price <= Decimal::ZERO || self.conversion_ratio <= Decimal::ZERO {
            return None;
        }
        self.issue_price.checked_div(self.conversion_ratio)
    }

    /// Common-equivalent share count for `shares` of this class.
    pub fn as_converted(&self, shares: ShareCount) -> Decimal {
        match self.kind {
            ShareClassKind::Common => Decimal::from(shares),
            ShareClassKind::Preferred => self.conversion_ratio * Decimal::from(shares),
        }
    }

    /// True when `other` differs from `self` at most in its conversion ratio.
    pub fn same_terms_except_ratio(&self, other: &ShareClass) -> bool {
        let mut normalized = other.clone();
        normalized.conversion_ratio = self.conversion_ratio;
        *self == normalized
    }

    pub fn validate(&self) -> Result<(), ShareClassError> {
        if self.liquidation_multiple < Decimal::ZERO {
            return Err(ShareClassError::NegativeMultiple {
                id: self.id.clone(),
                multiple: self.liquidation_multiple,
            });
        }
        if self.conversion_ratio <= Decimal::ZERO {
            return Err(ShareClassError::NonPositiveRatio {
                id: self.id.clone(),
                ratio: self.conversion_ratio,
            });
        }
        if self.is_preferred() && self.issue_price <= Decimal::ZERO {
            return Err(ShareClassError::MissingIssuePrice {
                id: self.id.clone(),
            });
        }
        if let Participation::ParticipatingCapped { cap_multiple } = self.participation {
            if cap_multiple < self.liquidation_multiple {
                return Err(ShareClassError::InvalidCap {
                    id: self.id.clone(),
                    cap: cap_multiple,
                });
            }
        }
        Ok(())
    }
}

/// A holding of record: one issuance of one class to one stakeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub position_id: PositionId,
    pub stakeholder_id: StakeholderId,
    pub share_class_id: ShareClassId,
    pub share_count: ShareCount,
    pub cost_basis_per_share: Decimal,
    pub issued_at: DateTime<Utc>,
}

impl Position {
    /// Amount recorded as paid for this position.
    pub fn invested_amount(&self) -> Decimal {
        self.cost_basis_per_share * Decimal::from(self.share_count)
    }
}

/// Position to be issued; the ledger assigns the id and class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPosition {
    pub stakeholder_id: StakeholderId,
    pub share_count: ShareCount,
    pub cost_basis_per_share: Decimal,
    pub issued_at: DateTime<Utc>,
}

impl NewPosition {
    pub fn new(
        stakeholder_id: impl Into<StakeholderId>,
        share_count: ShareCount,
        cost_basis_per_share: Decimal,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stakeholder_id: stakeholder_id.into(),
            share_count,
            cost_basis_per_share,
            issued_at,
        }
    }
}

// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Deterministic content-derived identifiers for snapshots and entitlements.

use blake3::Hasher;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::types::{CompanyId, EntitlementId, Position, RoundId, ShareClass, StakeholderId};

pub const UID_LEN: usize = 16;

struct UidBuilder {
    hasher: Hasher,
}

impl UidBuilder {
    fn new(domain: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(&(domain.len() as u32).to_le_bytes());
        hasher.update(domain);
        Self { hasher }
    }

    fn write_len_prefixed(&mut self, bytes: &[u8]) {
        self.hasher.update(&(bytes.len() as u32).to_le_bytes());
        self.hasher.update(bytes);
    }

    fn write_str(&mut self, value: &str) -> &mut Self {
        self.write_len_prefixed(value.as_bytes());
        self
    }

    fn write_u64(&mut self, value: u64) -> &mut Self {
        self.hasher.update(&value.to_le_bytes());
        self
    }

    fn write_u32(&mut self, value: u32) -> &mut Self {
        self.hasher.update(&value.to_le_bytes());
        self
    }

    fn write_bool(&mut self, value: bool) -> &mut Self {
        self.hasher.update(&[value as u8]);
        self
    }

    /// Normalized so that `1.0` and `1.00` hash alike.
    fn write_decimal(&mut self, value: Decimal) -> &mut Self {
        self.write_str(&value.normalize().to_string())
    }

    fn write_timestamp(&mut self, value: DateTime<Utc>) -> &mut Self {
        self.hasher.update(&value.timestamp().to_le_bytes());
        self.write_u32(value.timestamp_subsec_nanos())
    }

    fn write_debug(&mut self, value: &impl std::fmt::Debug) -> &mut Self {
        self.write_str(&format!("{value:?}"))
    }

    fn finish(self) -> String {
        let hash = self.hasher.finalize();
        hash.as_bytes()[..UID_LEN]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// Content hash of a snapshot version; identical inputs yield identical ids.
pub fn snapshot_id<'a>(
    company_id: &CompanyId,
    version: u64,
    as_of: DateTime<Utc>,
    positions: &[Position],
    share_classes: impl IntoIterator<Item = &'a ShareClass>,
) -> String {
    let mut builder = UidBuilder::new(b"cap_table_snapshot.v1");
    builder
        .write_str(company_id.as_str())
        .write_u64(version)
        .write_timestamp(as_of);
    builder.write_u64(positions.len() as u64);
    for position in positions {
        builder
            .write_u64(position.position_id)
            .write_str(position.stakeholder_id.as_str())
            .write_str(position.share_class_id.as_str())
            .write_u64(position.share_count)
            .write_decimal(position.cost_basis_per_share)
            .write_timestamp(position.issued_at);
    }
    for class in share_classes {
        builder
            .write_str(class.id.as_str())
            .write_str(&class.name)
            .write_debug(&class.kind)
            .write_u32(class.seniority)
            .write_decimal(class.liquidation_multiple)
            .write_debug(&class.participation)
            .write_decimal(class.conversion_ratio)
            .write_decimal(class.issue_price)
            .write_debug(&class.anti_dilution)
            .write_bool(class.pro_rata_right);
    }
    builder.finish()
}

/// One entitlement per investor per round.
pub fn entitlement_id(round_id: &RoundId, investor_id: &StakeholderId) -> EntitlementId {
    let mut builder = UidBuilder::new(b"pro_rata_entitlement.v1");
    builder
        .write_str(round_id.as_str())
        .write_str(investor_id.as_str());
    EntitlementId::new(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn position(cost: Decimal) -> Position {
        Position {
            position_id: 1,
            stakeholder_id: "alice".into(),
            share_class_id: "common".into(),
            share_count: 100,
            cost_basis_per_share: cost,
            issued_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn snapshot_id_ignores_decimal_scale() {
        let as_of = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let company = CompanyId::new("acme");
        let a = snapshot_id(&company, 1, as_of, &[position(dec!(1.0))], std::iter::empty());
        let b = snapshot_id(&company, 1, as_of, &[position(dec!(1.00))], std::iter::empty());
        let c = snapshot_id(&company, 2, as_of, &[position(dec!(1.00))], std::iter::empty());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), UID_LEN * 2);
    }

    #[test]
    fn entitlement_id_is_stable_per_round_and_investor() {
        let round = RoundId::new("series-b");
        let a = entitlement_id(&round, &"alice".into());
        assert_eq!(a, entitlement_id(&round, &"alice".into()));
        assert_ne!(a, entitlement_id(&round, &"bob".into()));
    }
}

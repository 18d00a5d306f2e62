use std::io::Write;

use chrono::{DateTime, Utc};
use core_types::{CompanyId, ShareCount};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{error::Result, snapshot::CapTableSnapshot};

pub const EXPORT_SCHEMA: &str = "cap_table_positions";
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

/// One flattened position with its class terms and holder ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRow {
    pub position_id: u64,
    pub stakeholder_id: String,
    pub share_class_id: String,
    pub share_class_name: String,
    pub seniority: u32,
    pub share_count: ShareCount,
    pub cost_basis_per_share: Decimal,
    pub invested_amount: Decimal,
    pub conversion_ratio: Decimal,
    pub issued_at: DateTime<Utc>,
    pub holder_ownership: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotExport {
    pub schema: String,
    pub schema_version: u32,
    pub company_id: CompanyId,
    pub version: u64,
    pub snapshot_id: String,
    pub as_of: DateTime<Utc>,
    pub total_shares_outstanding: ShareCount,
    pub rows: Vec<PositionRow>,
}

impl SnapshotExport {
    pub fn from_snapshot(snapshot: &CapTableSnapshot) -> Result<Self> {
        let ownership = if snapshot.total_shares_outstanding() == 0 {
            Default::default()
        } else {
            snapshot.ownership_table()?
        };
        let mut rows = Vec::with_capacity(snapshot.positions().len());
        for position in snapshot.positions() {
            let class = snapshot.share_class(&position.share_class_id)?;
            rows.push(PositionRow {
                position_id: position.position_id,
                stakeholder_id: position.stakeholder_id.to_string(),
                share_class_id: position.share_class_id.to_string(),
                share_class_name: class.name.clone(),
                seniority: class.seniority,
                share_count: position.share_count,
                cost_basis_per_share: position.cost_basis_per_share,
                invested_amount: position.invested_amount(),
                conversion_ratio: class.conversion_ratio,
                issued_at: position.issued_at,
                holder_ownership: ownership
                    .get(&position.stakeholder_id)
                    .copied()
                    .unwrap_or(Decimal::ZERO),
            });
        }
        Ok(Self {
            schema: EXPORT_SCHEMA.to_string(),
            schema_version: EXPORT_SCHEMA_VERSION,
            company_id: snapshot.company_id().clone(),
            version: snapshot.version(),
            snapshot_id: snapshot.snapshot_id().to_string(),
            as_of: snapshot.as_of(),
            total_shares_outstanding: snapshot.total_shares_outstanding(),
            rows,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Header row plus one row per position.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<W> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in &self.rows {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()?;
        csv_writer
            .into_inner()
            .map_err(|err| err.into_error().into())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let bytes = self.write_csv(Vec::new())?;
        String::from_utf8(bytes)
            .map_err(|err| crate::error::LedgerError::invariant(err.to_string()))
    }
}

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use core_types::{CompanyId, NewPosition, ShareClass, ShareClassId, StakeholderId};
use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::{
    config::LedgerConfig,
    error::{LedgerError, Result},
    snapshot::CapTableSnapshot,
    storage::SnapshotJournal,
};

type History = Arc<RwLock<Vec<Arc<CapTableSnapshot>>>>;

/// Counters describing ledger activity since construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub companies: usize,
    pub versions: usize,
    pub commits: u64,
    pub stale_rejections: u64,
}

/// Versioned store of cap table snapshots. Writers are serialized per
/// company and must name the version they built on; readers share
/// published snapshots through `Arc`.
pub struct CapTableLedger {
    config: LedgerConfig,
    companies: RwLock<HashMap<CompanyId, History>>,
    journal: Option<SnapshotJournal>,
    commits: AtomicU64,
    stale_rejections: AtomicU64,
}

impl CapTableLedger {
    /// Empty ledger; journals new versions when a state dir is configured.
    pub fn new(config: LedgerConfig) -> Result<Self> {
        config.ensure_dirs()?;
        let journal = config
            .journal_dir()
            .map(SnapshotJournal::open)
            .transpose()?;
        Ok(Self {
            config,
            companies: RwLock::new(HashMap::new()),
            journal,
            commits: AtomicU64::new(0),
            stale_rejections: AtomicU64::new(0),
        })
    }

    /// Like [`CapTableLedger::new`], then reloads any journaled history.
    pub fn bootstrap(config: LedgerConfig) -> Result<Self> {
        let ledger = Self::new(config)?;
        if let Some(journal) = &ledger.journal {
            let histories = journal.load_all()?;
            let mut companies = ledger.companies.write();
            for (company_id, history) in histories {
                info!(
                    "ledger: restored {} snapshot versions for {}",
                    history.len(),
                    company_id
                );
                let history = history.into_iter().map(Arc::new).collect();
                companies.insert(company_id, Arc::new(RwLock::new(history)));
            }
        }
        Ok(ledger)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Publishes version 0 for a new company.
    pub fn open_company(
        &self,
        company_id: CompanyId,
        as_of: DateTime<Utc>,
    ) -> Result<Arc<CapTableSnapshot>> {
        let mut companies = self.companies.write();
        if companies.contains_key(&company_id) {
            return Err(LedgerError::CompanyExists { company_id });
        }
        let genesis = CapTableSnapshot::genesis(company_id.clone(), as_of);
        if let Some(journal) = &self.journal {
            journal.append(&genesis)?;
        }
        let genesis = Arc::new(genesis);
        companies.insert(company_id.clone(), Arc::new(RwLock::new(vec![genesis.clone()])));
        info!("ledger: opened cap table for {}", company_id);
        Ok(genesis)
    }

    fn history(&self, company_id: &CompanyId) -> Result<History> {
        self.companies
            .read()
            .get(company_id)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownCompany {
                company_id: company_id.clone(),
            })
    }

    pub fn latest(&self, company_id: &CompanyId) -> Result<Arc<CapTableSnapshot>> {
        let history = self.history(company_id)?;
        let guard = history.read();
        guard
            .last()
            .cloned()
            .ok_or_else(|| LedgerError::UnknownCompany {
                company_id: company_id.clone(),
            })
    }

    /// The named version, or the latest when `version` is `None`.
    pub fn snapshot(
        &self,
        company_id: &CompanyId,
        version: Option<u64>,
    ) -> Result<Arc<CapTableSnapshot>> {
        let Some(version) = version else {
            return self.latest(company_id);
        };
        let history = self.history(company_id)?;
        let guard = history.read();
        usize::try_from(version)
            .ok()
            .and_then(|idx| guard.get(idx))
            .cloned()
            .ok_or_else(|| LedgerError::UnknownVersion {
                company_id: company_id.clone(),
                version,
            })
    }

    pub fn versions(&self, company_id: &CompanyId) -> Result<Vec<Arc<CapTableSnapshot>>> {
        let history = self.history(company_id)?;
        let versions = history.read().clone();
        Ok(versions)
    }

    /// Builds and publishes the next version from the latest one. Fails with
    /// [`LedgerError::StaleSnapshot`] if `expected_version` is not the latest;
    /// nothing is published unless `build` and the journal write succeed.
    pub fn commit<F>(
        &self,
        company_id: &CompanyId,
        expected_version: u64,
        build: F,
    ) -> Result<Arc<CapTableSnapshot>>
    where
        F: FnOnce(&CapTableSnapshot) -> Result<CapTableSnapshot>,
    {
        let history = self.history(company_id)?;
        let mut guard = history.write();
        let latest = guard
            .last()
            .cloned()
            .ok_or_else(|| LedgerError::UnknownCompany {
                company_id: company_id.clone(),
            })?;
        if latest.version() != expected_version {
            self.stale_rejections.fetch_add(1, Ordering::Relaxed);
            warn!(
                "ledger: rejected write to {} built on v{} (latest v{})",
                company_id,
                expected_version,
                latest.version()
            );
            return Err(LedgerError::StaleSnapshot {
                company_id: company_id.clone(),
                expected: expected_version,
                actual: latest.version(),
            });
        }

        let next = build(&latest)?;
        if next.company_id() != company_id || next.version() != latest.version() + 1 {
            return Err(LedgerError::invariant(format!(
                "commit for {} v{} produced {} v{}",
                company_id,
                latest.version() + 1,
                next.company_id(),
                next.version()
            )));
        }
        if next.total_shares_outstanding() > self.config.max_total_shares {
            return Err(LedgerError::invariant(format!(
                "{} would have {} shares outstanding, above the configured {}",
                company_id,
                next.total_shares_outstanding(),
                self.config.max_total_shares
            )));
        }
        if let Some(journal) = &self.journal {
            let path = journal.append(&next)?;
            debug!("ledger: journaled {} v{} to {}", company_id, next.version(), path.display());
        }

        let next = Arc::new(next);
        guard.push(next.clone());
        self.commits.fetch_add(1, Ordering::Relaxed);
        info!(
            "ledger: committed {} v{} ({} shares, {} positions)",
            company_id,
            next.version(),
            next.total_shares_outstanding(),
            next.positions().len()
        );
        Ok(next)
    }

    pub fn define_share_class(
        &self,
        company_id: &CompanyId,
        expected_version: u64,
        class: ShareClass,
        as_of: DateTime<Utc>,
    ) -> Result<Arc<CapTableSnapshot>> {
        self.commit(company_id, expected_version, |latest| {
            latest.define_share_class(class, as_of)
        })
    }

    pub fn apply_issuance(
        &self,
        company_id: &CompanyId,
        expected_version: u64,
        share_class_id: &ShareClassId,
        new_positions: Vec<NewPosition>,
        as_of: DateTime<Utc>,
    ) -> Result<Arc<CapTableSnapshot>> {
        self.commit(company_id, expected_version, |latest| {
            latest.apply_issuance(share_class_id, new_positions, as_of)
        })
    }

    pub fn apply_conversion(
        &self,
        company_id: &CompanyId,
        expected_version: u64,
        stakeholder_id: &StakeholderId,
        from_class: &ShareClassId,
        to_class: &ShareClassId,
        as_of: DateTime<Utc>,
    ) -> Result<Arc<CapTableSnapshot>> {
        self.commit(company_id, expected_version, |latest| {
            latest.apply_conversion(stakeholder_id, from_class, to_class, as_of)
        })
    }

    pub fn stats(&self) -> LedgerStats {
        let companies = self.companies.read();
        LedgerStats {
            companies: companies.len(),
            versions: companies.values().map(|h| h.read().len()).sum(),
            commits: self.commits.load(Ordering::Relaxed),
            stale_rejections: self.stale_rejections.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use tempfile::tempdir;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
    }

    fn seeded_ledger(config: LedgerConfig) -> CapTableLedger {
        let ledger = CapTableLedger::new(config).unwrap();
        let company = CompanyId::new("acme");
        ledger.open_company(company.clone(), as_of()).unwrap();
        ledger
            .define_share_class(&company, 0, ShareClass::common("common", "Common"), as_of())
            .unwrap();
        ledger
    }

    #[test]
    fn stale_writer_is_rejected() {
        let ledger = seeded_ledger(LedgerConfig::in_memory());
        let company = CompanyId::new("acme");
        let issue = |expected| {
            ledger.apply_issuance(
                &company,
                expected,
                &"common".into(),
                vec![NewPosition::new("alice", 100, Decimal::ZERO, as_of())],
                as_of(),
            )
        };
        issue(1).unwrap();
        let err = issue(1).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::StaleSnapshot {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        assert_eq!(ledger.stats().stale_rejections, 1);
        assert_eq!(ledger.latest(&company).unwrap().total_shares_outstanding(), 100);
    }

    #[test]
    fn prior_versions_stay_readable() {
        let ledger = seeded_ledger(LedgerConfig::in_memory());
        let company = CompanyId::new("acme");
        ledger
            .apply_issuance(
                &company,
                1,
                &"common".into(),
                vec![NewPosition::new("alice", 100, Decimal::ZERO, as_of())],
                as_of(),
            )
            .unwrap();
        assert_eq!(ledger.snapshot(&company, Some(1)).unwrap().positions().len(), 0);
        assert_eq!(ledger.snapshot(&company, None).unwrap().version(), 2);
        assert!(matches!(
            ledger.snapshot(&company, Some(9)),
            Err(LedgerError::UnknownVersion { version: 9, .. })
        ));
        assert_eq!(ledger.versions(&company).unwrap().len(), 3);
    }

    #[test]
    fn failed_build_publishes_nothing() {
        let ledger = seeded_ledger(LedgerConfig::in_memory());
        let company = CompanyId::new("acme");
        let err = ledger
            .apply_issuance(&company, 1, &"common".into(), Vec::new(), as_of())
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation { .. }));
        assert_eq!(ledger.latest(&company).unwrap().version(), 1);
    }

    #[test]
    fn configured_share_cap_is_enforced() {
        let config = LedgerConfig {
            max_total_shares: 50,
            ..LedgerConfig::in_memory()
        };
        let ledger = seeded_ledger(config);
        let err = ledger
            .apply_issuance(
                &"acme".into(),
                1,
                &"common".into(),
                vec![NewPosition::new("alice", 51, Decimal::ZERO, as_of())],
                as_of(),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation { .. }));
    }

    #[test]
    fn bootstrap_restores_journal() {
        let dir = tempdir().unwrap();
        let config = LedgerConfig::with_state_dir(dir.path());
        {
            let ledger = seeded_ledger(config.clone());
            ledger
                .apply_issuance(
                    &"acme".into(),
                    1,
                    &"common".into(),
                    vec![NewPosition::new("alice", 100, Decimal::ZERO, as_of())],
                    as_of(),
                )
                .unwrap();
        }
        let restored = CapTableLedger::bootstrap(config).unwrap();
        let latest = restored.latest(&"acme".into()).unwrap();
        assert_eq!(latest.version(), 2);
        assert_eq!(latest.total_shares_outstanding(), 100);
        assert!(matches!(
            restored.open_company("acme".into(), as_of()),
            Err(LedgerError::CompanyExists { .. })
        ));
    }

    #[test]
    fn concurrent_writers_on_same_version_commit_once() {
        let ledger = Arc::new(seeded_ledger(LedgerConfig::in_memory()));
        let company = CompanyId::new("acme");
        let outcomes: Vec<Result<Arc<CapTableSnapshot>>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let ledger = ledger.clone();
                    let company = company.clone();
                    scope.spawn(move || {
                        ledger.apply_issuance(
                            &company,
                            1,
                            &"common".into(),
                            vec![NewPosition::new(
                                format!("holder-{i}"),
                                10,
                                Decimal::ZERO,
                                as_of(),
                            )],
                            as_of(),
                        )
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let committed = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(committed, 1);
        assert!(outcomes
            .iter()
            .filter_map(|o| o.as_ref().err())
            .all(LedgerError::is_stale));
        assert_eq!(ledger.latest(&company).unwrap().total_shares_outstanding(), 10);
    }
}

use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use core_types::{
    status::{metric_name, MetricSample, OverallStatus, ServiceMetricsReporter},
    AppConfig, CompanyId, EntitlementId, ExitEventId, NewPosition, RoundId, ShareClass,
    ShareClassId, StakeholderId,
};
use ledger::{CapTableLedger, CapTableSnapshot, LedgerConfig, SnapshotExport};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use pro_rata::{create_entitlements, EntitlementBook, ProRataEntitlement, RoundOffer};
use round_engine::{close_round, ClosedRound, FinalTerms, Round, RoundClosing};
use rust_decimal::Decimal;
use waterfall::{WaterfallEngine, WaterfallResult};

use crate::error::{ControllerError, Result};

const SERVICE_NAME: &str = "captable";

struct ExitRecord {
    company_id: CompanyId,
    snapshot_version: u64,
    total_proceeds: Decimal,
    result: Arc<WaterfallResult>,
}

impl ExitRecord {
    /// The recorded result when the inputs match, a conflict otherwise.
    fn reuse(
        &self,
        exit_event_id: &ExitEventId,
        company_id: &CompanyId,
        snapshot_version: u64,
        total_proceeds: Decimal,
    ) -> Result<Arc<WaterfallResult>> {
        if &self.company_id == company_id
            && self.snapshot_version == snapshot_version
            && self.total_proceeds == total_proceeds
        {
            return Ok(Arc::clone(&self.result));
        }
        Err(ControllerError::ExitEventConflict {
            exit_event_id: exit_event_id.clone(),
        })
    }
}

#[derive(Default)]
struct ControllerCounters {
    rounds_closed: AtomicU64,
    adjustments_applied: AtomicU64,
    waterfalls_computed: AtomicU64,
    unsettled_elections: AtomicU64,
}

/// Entry point for the cap table workflows: ledger writes, round closing,
/// pro-rata rights, and exit waterfalls.
pub struct CapTableController {
    config: AppConfig,
    ledger: Arc<CapTableLedger>,
    rounds: RwLock<HashMap<RoundId, Arc<Mutex<Round>>>>,
    closed_rounds: RwLock<HashMap<RoundId, ClosedRound>>,
    entitlements: EntitlementBook,
    waterfall: WaterfallEngine,
    exits: Mutex<HashMap<ExitEventId, ExitRecord>>,
    counters: ControllerCounters,
}

impl CapTableController {
    pub fn bootstrap(config: AppConfig) -> Result<Self> {
        let ledger = CapTableLedger::bootstrap(LedgerConfig::from(&config.ledger))?;
        let waterfall = WaterfallEngine::new(config.waterfall.clone());
        info!(
            "captable: bootstrapped ({} companies restored)",
            ledger.stats().companies
        );
        Ok(Self {
            config,
            ledger: Arc::new(ledger),
            rounds: RwLock::new(HashMap::new()),
            closed_rounds: RwLock::new(HashMap::new()),
            entitlements: EntitlementBook::new(),
            waterfall,
            exits: Mutex::new(HashMap::new()),
            counters: ControllerCounters::default(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn ledger(&self) -> Arc<CapTableLedger> {
        Arc::clone(&self.ledger)
    }

    pub fn open_company(
        &self,
        company_id: impl Into<CompanyId>,
        as_of: DateTime<Utc>,
    ) -> Result<Arc<CapTableSnapshot>> {
        Ok(self.ledger.open_company(company_id.into(), as_of)?)
    }

    pub fn define_share_class(
        &self,
        company_id: &CompanyId,
        expected_version: u64,
        class: ShareClass,
        as_of: DateTime<Utc>,
    ) -> Result<Arc<CapTableSnapshot>> {
        Ok(self
            .ledger
            .define_share_class(company_id, expected_version, class, as_of)?)
    }

    pub fn issue(
        &self,
        company_id: &CompanyId,
        expected_version: u64,
        share_class_id: &ShareClassId,
        new_positions: Vec<NewPosition>,
        as_of: DateTime<Utc>,
    ) -> Result<Arc<CapTableSnapshot>> {
        Ok(self.ledger.apply_issuance(
            company_id,
            expected_version,
            share_class_id,
            new_positions,
            as_of,
        )?)
    }

    pub fn convert(
        &self,
        company_id: &CompanyId,
        expected_version: u64,
        stakeholder_id: &StakeholderId,
        from_class: &ShareClassId,
        to_class: &ShareClassId,
        as_of: DateTime<Utc>,
    ) -> Result<Arc<CapTableSnapshot>> {
        Ok(self.ledger.apply_conversion(
            company_id,
            expected_version,
            stakeholder_id,
            from_class,
            to_class,
            as_of,
        )?)
    }

    pub fn snapshot(
        &self,
        company_id: &CompanyId,
        version: Option<u64>,
    ) -> Result<Arc<CapTableSnapshot>> {
        Ok(self.ledger.snapshot(company_id, version)?)
    }

    pub fn ownership(
        &self,
        company_id: &CompanyId,
        version: Option<u64>,
        stakeholder_id: &StakeholderId,
    ) -> Result<Decimal> {
        Ok(self
            .snapshot(company_id, version)?
            .ownership_percentage(stakeholder_id)?)
    }

    pub fn export_snapshot(
        &self,
        company_id: &CompanyId,
        version: Option<u64>,
    ) -> Result<SnapshotExport> {
        let snapshot = self.snapshot(company_id, version)?;
        Ok(SnapshotExport::from_snapshot(&snapshot)?)
    }

    // Rounds

    /// Tracks a new round; its company must already be open.
    pub fn plan_round(&self, round: Round) -> Result<()> {
        self.ledger.latest(&round.company_id)?;
        let mut rounds = self.rounds.write();
        if rounds.contains_key(&round.round_id) {
            return Err(ControllerError::RoundExists {
                round_id: round.round_id,
            });
        }
        info!(
            "captable: planned round {} for {}",
            round.round_id, round.company_id
        );
        rounds.insert(round.round_id.clone(), Arc::new(Mutex::new(round)));
        Ok(())
    }

    fn round_slot(&self, round_id: &RoundId) -> Result<Arc<Mutex<Round>>> {
        self.rounds
            .read()
            .get(round_id)
            .cloned()
            .ok_or_else(|| ControllerError::UnknownRound {
                round_id: round_id.clone(),
            })
    }

    pub fn round(&self, round_id: &RoundId) -> Result<Round> {
        Ok(self.round_slot(round_id)?.lock().clone())
    }

    fn update_round<F>(&self, round_id: &RoundId, op: F) -> Result<Round>
    where
        F: FnOnce(&mut Round) -> round_engine::Result<()>,
    {
        let slot = self.round_slot(round_id)?;
        let mut round = slot.lock();
        let from = round.status();
        op(&mut *round)?;
        if from != round.status() {
            info!(
                "captable: round {} {:?} -> {:?}",
                round_id,
                from,
                round.status()
            );
        }
        Ok(round.clone())
    }

    pub fn open_round(&self, round_id: &RoundId) -> Result<Round> {
        self.update_round(round_id, Round::open)
    }

    pub fn activate_round(&self, round_id: &RoundId) -> Result<Round> {
        self.update_round(round_id, Round::activate)
    }

    pub fn cancel_round(&self, round_id: &RoundId) -> Result<Round> {
        self.update_round(round_id, Round::cancel)
    }

    pub fn record_investment(
        &self,
        round_id: &RoundId,
        investor_id: impl Into<StakeholderId>,
        amount: Decimal,
        recorded_at: DateTime<Utc>,
    ) -> Result<Round> {
        let investor_id = investor_id.into();
        self.update_round(round_id, |round| {
            round.record_investment(investor_id, amount, recorded_at)
        })
    }

    /// Closes the round on top of `final_terms.base_version` and publishes
    /// the resulting snapshot. Fails with a stale-snapshot error when the
    /// company has moved past that version.
    pub fn close_round(&self, round_id: &RoundId, final_terms: FinalTerms) -> Result<RoundClosing> {
        let slot = self.round_slot(round_id)?;
        let mut round = slot.lock();
        round.ensure_closable()?;
        let base = self
            .ledger
            .snapshot(&round.company_id, Some(final_terms.base_version))?;
        let closing = close_round(&round, &base, &final_terms)?;
        let published = closing.snapshot.clone();
        self.ledger
            .commit(&round.company_id, final_terms.base_version, move |_| {
                Ok(published)
            })?;
        round.mark_closed()?;

        self.counters.rounds_closed.fetch_add(1, Ordering::Relaxed);
        self.counters
            .adjustments_applied
            .fetch_add(closing.adjustments.len() as u64, Ordering::Relaxed);
        self.closed_rounds
            .write()
            .insert(round_id.clone(), closing.record.clone());
        info!(
            "captable: closed round {} at {} ({} shares, post-money {}, {} adjustments) as {} v{}",
            round_id,
            closing.record.price_per_share,
            closing.record.shares_issued,
            closing.record.post_money,
            closing.adjustments.len(),
            round.company_id,
            closing.snapshot.version()
        );
        Ok(closing)
    }

    pub fn closed_round(&self, round_id: &RoundId) -> Option<ClosedRound> {
        self.closed_rounds.read().get(round_id).cloned()
    }

    // Pro-rata rights

    /// Offers the round to holders of pro-rata classes, sized by their
    /// ownership in `prior_version` (latest when `None`).
    pub fn create_entitlements(
        &self,
        round_id: &RoundId,
        prior_version: Option<u64>,
    ) -> Result<Vec<ProRataEntitlement>> {
        let round = self.round(round_id)?;
        let prior = self.ledger.snapshot(&round.company_id, prior_version)?;
        let offer = RoundOffer {
            round_id: round.round_id.clone(),
            target_amount: round.target_amount,
            notification_date: round.notification_date,
        };
        let entitlements =
            create_entitlements(&prior, &offer, self.config.pro_rata.exercise_window())?;
        self.entitlements.insert_all(entitlements.clone())?;
        info!(
            "captable: offered {} pro-rata entitlements for round {} from {} v{}",
            entitlements.len(),
            round_id,
            prior.company_id(),
            prior.version()
        );
        Ok(entitlements)
    }

    pub fn entitlement(
        &self,
        entitlement_id: &EntitlementId,
        now: DateTime<Utc>,
    ) -> Result<ProRataEntitlement> {
        Ok(self.entitlements.get(entitlement_id, now)?)
    }

    pub fn entitlements_for_round(
        &self,
        round_id: &RoundId,
        now: DateTime<Utc>,
    ) -> Vec<ProRataEntitlement> {
        self.entitlements.for_round(round_id, now)
    }

    pub fn accept(
        &self,
        entitlement_id: &EntitlementId,
        now: DateTime<Utc>,
    ) -> Result<ProRataEntitlement> {
        Ok(self.entitlements.accept(entitlement_id, now)?)
    }

    pub fn exercise(
        &self,
        entitlement_id: &EntitlementId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<ProRataEntitlement> {
        Ok(self.entitlements.exercise(entitlement_id, amount, now)?)
    }

    pub fn decline(
        &self,
        entitlement_id: &EntitlementId,
        now: DateTime<Utc>,
    ) -> Result<ProRataEntitlement> {
        Ok(self.entitlements.decline(entitlement_id, now)?)
    }

    // Exits

    /// Distribution for an exit event. The first result recorded for an
    /// event is final; asking again with the same inputs returns it. The
    /// computation itself runs without holding the exit record lock.
    pub fn compute_waterfall(
        &self,
        exit_event_id: &ExitEventId,
        company_id: &CompanyId,
        snapshot_version: u64,
        total_proceeds: Decimal,
    ) -> Result<Arc<WaterfallResult>> {
        if let Some(record) = self.exits.lock().get(exit_event_id) {
            return record.reuse(exit_event_id, company_id, snapshot_version, total_proceeds);
        }
        let snapshot = self.ledger.snapshot(company_id, Some(snapshot_version))?;
        let result = Arc::new(
            self.waterfall
                .compute(exit_event_id, &snapshot, total_proceeds)?,
        );

        let mut exits = self.exits.lock();
        match exits.entry(exit_event_id.clone()) {
            Entry::Occupied(entry) => {
                debug!(
                    "captable: exit {} was recorded concurrently",
                    exit_event_id
                );
                entry
                    .get()
                    .reuse(exit_event_id, company_id, snapshot_version, total_proceeds)
            }
            Entry::Vacant(entry) => {
                entry.insert(ExitRecord {
                    company_id: company_id.clone(),
                    snapshot_version,
                    total_proceeds,
                    result: Arc::clone(&result),
                });
                drop(exits);
                self.counters
                    .waterfalls_computed
                    .fetch_add(1, Ordering::Relaxed);
                if !result.elections_settled {
                    self.counters
                        .unsettled_elections
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "captable: exit {} recorded with unsettled conversion choices",
                        exit_event_id
                    );
                }
                Ok(result)
            }
        }
    }
}

impl ServiceMetricsReporter for CapTableController {
    fn service_name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn overall(&self) -> OverallStatus {
        if self.counters.unsettled_elections.load(Ordering::Relaxed) > 0 {
            OverallStatus::Warn
        } else {
            OverallStatus::Ok
        }
    }

    fn collect_metrics(&self) -> Vec<MetricSample> {
        let ledger = self.ledger.stats();
        let counters = &self.counters;
        [
            ("companies", ledger.companies as f64),
            ("snapshot_versions", ledger.versions as f64),
            ("commits", ledger.commits as f64),
            ("stale_rejections", ledger.stale_rejections as f64),
            (
                "rounds_closed",
                counters.rounds_closed.load(Ordering::Relaxed) as f64,
            ),
            (
                "anti_dilution_adjustments",
                counters.adjustments_applied.load(Ordering::Relaxed) as f64,
            ),
            (
                "waterfalls_computed",
                counters.waterfalls_computed.load(Ordering::Relaxed) as f64,
            ),
            (
                "entitlements_tracked",
                self.entitlements.len() as f64,
            ),
            (
                "entitlements_expired",
                self.entitlements.expired_count() as f64,
            ),
            (
                "entitlement_exercises",
                self.entitlements.exercise_count() as f64,
            ),
        ]
        .into_iter()
        .map(|(label, value)| {
            MetricSample::gauge(metric_name(SERVICE_NAME, label), value)
                .with_label("service", SERVICE_NAME)
        })
        .collect()
    }
}

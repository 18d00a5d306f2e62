use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use core_types::{EntitlementId, RoundId};
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;

use crate::{
    entitlement::ProRataEntitlement,
    error::{ProRataError, Result},
};

type Slot = Arc<Mutex<ProRataEntitlement>>;

/// Live entitlements. Every operation runs its expiry check and update
/// under the entitlement's own lock, so concurrent exercises of one
/// entitlement serialize while different entitlements proceed in parallel.
#[derive(Default)]
pub struct EntitlementBook {
    slots: RwLock<HashMap<EntitlementId, Slot>>,
    expired: AtomicU64,
    exercises: AtomicU64,
}

impl EntitlementBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds entitlements; fails without inserting any if one is already
    /// tracked.
    pub fn insert_all(&self, entitlements: Vec<ProRataEntitlement>) -> Result<()> {
        let mut slots = self.slots.write();
        if let Some(existing) = entitlements
            .iter()
            .find(|e| slots.contains_key(&e.entitlement_id))
        {
            return Err(ProRataError::DuplicateEntitlement {
                entitlement_id: existing.entitlement_id.clone(),
            });
        }
        for entitlement in entitlements {
            slots.insert(
                entitlement.entitlement_id.clone(),
                Arc::new(Mutex::new(entitlement)),
            );
        }
        Ok(())
    }

    fn slot(&self, entitlement_id: &EntitlementId) -> Result<Slot> {
        self.slots
            .read()
            .get(entitlement_id)
            .cloned()
            .ok_or_else(|| ProRataError::UnknownEntitlement {
                entitlement_id: entitlement_id.clone(),
            })
    }

    fn with_entitlement<F>(
        &self,
        entitlement_id: &EntitlementId,
        now: DateTime<Utc>,
        op: F,
    ) -> Result<ProRataEntitlement>
    where
        F: FnOnce(&mut ProRataEntitlement) -> Result<()>,
    {
        let slot = self.slot(entitlement_id)?;
        let mut entitlement = slot.lock();
        if entitlement.refresh_expiry(now) {
            self.expired.fetch_add(1, Ordering::Relaxed);
            info!(
                "pro-rata: entitlement {} for {} expired at {}",
                entitlement.entitlement_id, entitlement.investor_id, entitlement.deadline
            );
        }
        op(&mut *entitlement)?;
        Ok(entitlement.clone())
    }

    /// Current state, expiring it first if the deadline has passed.
    pub fn get(
        &self,
        entitlement_id: &EntitlementId,
        now: DateTime<Utc>,
    ) -> Result<ProRataEntitlement> {
        self.with_entitlement(entitlement_id, now, |_| Ok(()))
    }

    pub fn accept(
        &self,
        entitlement_id: &EntitlementId,
        now: DateTime<Utc>,
    ) -> Result<ProRataEntitlement> {
        self.with_entitlement(entitlement_id, now, |e| e.accept(now))
    }

    pub fn exercise(
        &self,
        entitlement_id: &EntitlementId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<ProRataEntitlement> {
        let result = self.with_entitlement(entitlement_id, now, |e| e.exercise(amount, now));
        match &result {
            Ok(entitlement) => {
                self.exercises.fetch_add(1, Ordering::Relaxed);
                info!(
                    "pro-rata: {} exercised {} of {} ({} remaining)",
                    entitlement.investor_id,
                    amount,
                    entitlement.entitlement_id,
                    entitlement.allocation_remaining()
                );
            }
            Err(err) => warn!("pro-rata: exercise of {} rejected: {}", entitlement_id, err),
        }
        result
    }

    pub fn decline(
        &self,
        entitlement_id: &EntitlementId,
        now: DateTime<Utc>,
    ) -> Result<ProRataEntitlement> {
        self.with_entitlement(entitlement_id, now, |e| e.decline(now))
    }

    /// Entitlements of one round in investor id order, expiry applied.
    pub fn for_round(&self, round_id: &RoundId, now: DateTime<Utc>) -> Vec<ProRataEntitlement> {
        let slots: Vec<Slot> = self.slots.read().values().cloned().collect();
        let mut entitlements = Vec::new();
        for slot in slots {
            let mut entitlement = slot.lock();
            if &entitlement.round_id != round_id {
                continue;
            }
            if entitlement.refresh_expiry(now) {
                self.expired.fetch_add(1, Ordering::Relaxed);
            }
            entitlements.push(entitlement.clone());
        }
        entitlements.sort_by(|a, b| a.investor_id.cmp(&b.investor_id));
        entitlements
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    pub fn expired_count(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    /// Successful exercises, partial ones included.
    pub fn exercise_count(&self) -> u64 {
        self.exercises.load(Ordering::Relaxed)
    }
}

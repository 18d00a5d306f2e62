use std::collections::BTreeMap;

use core_types::{ShareClass, ShareClassId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

/// Share classes in force at one snapshot version, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareClassRegistry {
    classes: BTreeMap<ShareClassId, ShareClass>,
}

impl ShareClassRegistry {
    pub fn get(&self, id: &ShareClassId) -> Option<&ShareClass> {
        self.classes.get(id)
    }

    pub fn require(&self, id: &ShareClassId) -> Result<&ShareClass> {
        self.classes
            .get(id)
            .ok_or_else(|| LedgerError::UnknownShareClass {
                share_class_id: id.clone(),
            })
    }

    pub fn contains(&self, id: &ShareClassId) -> bool {
        self.classes.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShareClass> {
        self.classes.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Classes ordered by seniority rank, ties broken by id.
    pub fn by_seniority(&self) -> Vec<&ShareClass> {
        let mut classes: Vec<&ShareClass> = self.classes.values().collect();
        classes.sort_by(|a, b| a.seniority.cmp(&b.seniority).then_with(|| a.id.cmp(&b.id)));
        classes
    }

    /// Registers or replaces a class. Terms are frozen once shares exist.
    pub(crate) fn define(&mut self, class: ShareClass, has_shares: bool) -> Result<()> {
        class.validate()?;
        if let Some(existing) = self.classes.get(&class.id) {
            if has_shares && *existing != class {
                let reason = if existing.same_terms_except_ratio(&class) {
                    format!(
                        "conversion ratio of {} changes only through anti-dilution adjustment",
                        class.id
                    )
                } else {
                    format!("terms of {} are frozen while shares are outstanding", class.id)
                };
                return Err(LedgerError::invariant(reason));
            }
        }
        self.classes.insert(class.id.clone(), class);
        Ok(())
    }

    pub(crate) fn adjust_conversion_ratio(
        &mut self,
        id: &ShareClassId,
        ratio: Decimal,
    ) -> Result<Decimal> {
        let class = self
            .classes
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownShareClass {
                share_class_id: id.clone(),
            })?;
        if ratio < class.conversion_ratio {
            return Err(LedgerError::invariant(format!(
                "conversion ratio of {id} may not decrease ({} -> {ratio})",
                class.conversion_ratio
            )));
        }
        let previous = class.conversion_ratio;
        class.conversion_ratio = ratio;
        Ok(previous)
    }
}

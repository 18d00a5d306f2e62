use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use core_types::CompanyId;

use crate::{
    error::{LedgerError, Result},
    snapshot::CapTableSnapshot,
};

const SNAPSHOT_EXT: &str = "json";

/// Append-only directory of committed snapshot versions, one JSON document
/// per version under a per-company directory.
#[derive(Debug, Clone)]
pub struct SnapshotJournal {
    root: PathBuf,
}

impl SnapshotJournal {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn company_dir(&self, company_id: &CompanyId) -> PathBuf {
        let encoded: String = company_id
            .as_str()
            .bytes()
            .map(|b| format!("{b:02x}"))
            .collect();
        self.root.join(encoded)
    }

    pub fn path_for(&self, company_id: &CompanyId, version: u64) -> PathBuf {
        self.company_dir(company_id)
            .join(format!("v{version:012}.{SNAPSHOT_EXT}"))
    }

    /// Writes through a temporary file and renames it into place, refusing
    /// to overwrite an existing version.
    pub fn append(&self, snapshot: &CapTableSnapshot) -> Result<PathBuf> {
        let dir = self.company_dir(snapshot.company_id());
        fs::create_dir_all(&dir)?;
        let path = self.path_for(snapshot.company_id(), snapshot.version());
        if path.exists() {
            return Err(LedgerError::invariant(format!(
                "journal already holds {} v{}",
                snapshot.company_id(),
                snapshot.version()
            )));
        }
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    /// Every company's history in version order. Each history must start
    /// at version 0 and be contiguous.
    pub fn load_all(&self) -> Result<HashMap<CompanyId, Vec<CapTableSnapshot>>> {
        let mut histories = HashMap::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let history = load_company_dir(&entry.path())?;
            if let Some(first) = history.first() {
                histories.insert(first.company_id().clone(), history);
            }
        }
        Ok(histories)
    }
}

fn load_company_dir(dir: &Path) -> Result<Vec<CapTableSnapshot>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some(SNAPSHOT_EXT))
        .collect();
    paths.sort();

    let mut history: Vec<CapTableSnapshot> = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = fs::read(&path)?;
        let snapshot: CapTableSnapshot = serde_json::from_slice(&bytes)?;
        snapshot.validate()?;
        let expected_version = history.len() as u64;
        if snapshot.version() != expected_version {
            return Err(LedgerError::invariant(format!(
                "journal {} skips from v{} to v{}",
                dir.display(),
                expected_version,
                snapshot.version()
            )));
        }
        if let Some(first) = history.first() {
            if first.company_id() != snapshot.company_id() {
                return Err(LedgerError::invariant(format!(
                    "journal {} mixes companies",
                    dir.display()
                )));
            }
        }
        history.push(snapshot);
    }
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_types::{NewPosition, ShareClass};
    use rust_decimal::Decimal;
    use tempfile::tempdir;

    #[test]
    fn append_and_reload_history() {
        let dir = tempdir().unwrap();
        let journal = SnapshotJournal::open(dir.path()).unwrap();
        let as_of = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

        let v0 = CapTableSnapshot::genesis("acme/inc".into(), as_of);
        let v1 = v0
            .define_share_class(ShareClass::common("common", "Common"), as_of)
            .unwrap();
        let v2 = v1
            .apply_issuance(
                &"common".into(),
                vec![NewPosition::new("alice", 10, Decimal::ZERO, as_of)],
                as_of,
            )
            .unwrap();
        for snapshot in [&v0, &v1, &v2] {
            journal.append(snapshot).unwrap();
        }
        assert!(journal.append(&v2).is_err());

        let histories = journal.load_all().unwrap();
        let history = &histories[&CompanyId::new("acme/inc")];
        assert_eq!(history.len(), 3);
        assert_eq!(history[2], v2);
    }
}

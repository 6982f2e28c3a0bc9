//! Append-only match history
//!
//! One record per (donor, recipient) pair. A second insert for the same
//! pair is a `PersistenceConflict`, never an overwrite.

use chrono::{DateTime, Utc};
use organmatch_core::RecordId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::{Result, ServiceError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub donor_id: RecordId,
    pub recipient_id: RecordId,
    pub score: f64,
    pub matched_at: DateTime<Utc>,
}

impl MatchRecord {
    pub fn new(donor_id: RecordId, recipient_id: RecordId, score: f64) -> Self {
        Self {
            donor_id,
            recipient_id,
            score,
            matched_at: Utc::now(),
        }
    }
}

/// Match history storage trait
pub trait MatchHistoryStore: Send + Sync {
    fn find(&self, donor_id: RecordId, recipient_id: RecordId) -> Result<Option<MatchRecord>>;

    /// Fails with `PersistenceConflict` if the pair is already recorded.
    fn insert(&self, record: MatchRecord) -> Result<()>;

    /// Every record, ordered by (donor, recipient)
    fn all(&self) -> Result<Vec<MatchRecord>>;
}

/// Look up the pair and insert only when absent. Returns whether a record
/// was written.
pub fn record_if_absent(store: &dyn MatchHistoryStore, record: MatchRecord) -> Result<bool> {
    if store.find(record.donor_id, record.recipient_id)?.is_some() {
        return Ok(false);
    }
    store.insert(record)?;
    Ok(true)
}

/// In-memory history
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    records: RwLock<BTreeMap<(RecordId, RecordId), MatchRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchHistoryStore for MemoryHistoryStore {
    fn find(&self, donor_id: RecordId, recipient_id: RecordId) -> Result<Option<MatchRecord>> {
        Ok(self.records.read().get(&(donor_id, recipient_id)).cloned())
    }

    fn insert(&self, record: MatchRecord) -> Result<()> {
        let key = (record.donor_id, record.recipient_id);
        let mut records = self.records.write();
        if records.contains_key(&key) {
            return Err(ServiceError::PersistenceConflict {
                donor_id: key.0,
                recipient_id: key.1,
            });
        }
        records.insert(key, record);
        Ok(())
    }

    fn all(&self) -> Result<Vec<MatchRecord>> {
        Ok(self.records.read().values().cloned().collect())
    }
}

/// Sled-backed history
pub struct SledHistoryStore {
    db: Db,
    matches: Tree,
}

impl SledHistoryStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        let matches = db.open_tree("matches")?;
        Ok(Self { db, matches })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Big-endian ids with the sign bit flipped, so byte order is id order
    fn key(donor_id: RecordId, recipient_id: RecordId) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&((donor_id as u64) ^ (1 << 63)).to_be_bytes());
        key[8..].copy_from_slice(&((recipient_id as u64) ^ (1 << 63)).to_be_bytes());
        key
    }
}

impl MatchHistoryStore for SledHistoryStore {
    fn find(&self, donor_id: RecordId, recipient_id: RecordId) -> Result<Option<MatchRecord>> {
        self.matches
            .get(Self::key(donor_id, recipient_id))?
            .map(|v| serde_json::from_slice(&v))
            .transpose()
            .map_err(Into::into)
    }

    fn insert(&self, record: MatchRecord) -> Result<()> {
        let key = Self::key(record.donor_id, record.recipient_id);
        let data = serde_json::to_vec(&record)?;
        match self
            .matches
            .compare_and_swap(key, None as Option<&[u8]>, Some(data))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(ServiceError::PersistenceConflict {
                donor_id: record.donor_id,
                recipient_id: record.recipient_id,
            }),
        }
    }

    fn all(&self) -> Result<Vec<MatchRecord>> {
        self.matches
            .iter()
            .map(|r| {
                let (_, v) = r?;
                Ok(serde_json::from_slice::<MatchRecord>(&v)?)
            })
            .collect()
    }
}

/// Match count and mean score for one calendar month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    /// `YYYY-MM`
    pub month: String,
    pub matches: usize,
    pub average_score: f64,
}

/// Per-month totals, oldest month first.
pub fn monthly_summary(records: &[MatchRecord]) -> Vec<MonthlySummary> {
    let mut months: BTreeMap<String, (usize, f64)> = BTreeMap::new();
    for record in records {
        let entry = months
            .entry(record.matched_at.format("%Y-%m").to_string())
            .or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += record.score;
    }

    months
        .into_iter()
        .map(|(month, (matches, total))| MonthlySummary {
            month,
            matches,
            average_score: (total / matches as f64 * 100.0).round() / 100.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn exercise(store: &dyn MatchHistoryStore) {
        assert!(store.find(1, 2).unwrap().is_none());
        assert!(record_if_absent(store, MatchRecord::new(1, 2, 80.0)).unwrap());
        assert!(!record_if_absent(store, MatchRecord::new(1, 2, 90.0)).unwrap());

        assert!(matches!(
            store.insert(MatchRecord::new(1, 2, 99.0)),
            Err(ServiceError::PersistenceConflict { donor_id: 1, recipient_id: 2 })
        ));
        assert_eq!(store.find(1, 2).unwrap().map(|r| r.score), Some(80.0));

        store.insert(MatchRecord::new(-5, 3, 60.0)).unwrap();
        let pairs: Vec<(RecordId, RecordId)> = store
            .all()
            .unwrap()
            .iter()
            .map(|r| (r.donor_id, r.recipient_id))
            .collect();
        assert_eq!(pairs, vec![(-5, 3), (1, 2)]);
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryHistoryStore::new());
    }

    #[test]
    fn test_sled_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledHistoryStore::new(dir.path().join("history")).unwrap();
        exercise(&store);
        store.flush().unwrap();
    }

    #[test]
    fn test_sled_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history");
        {
            let store = SledHistoryStore::new(&path).unwrap();
            store.insert(MatchRecord::new(4, 5, 70.0)).unwrap();
            store.flush().unwrap();
        }
        let store = SledHistoryStore::new(&path).unwrap();
        assert_eq!(store.find(4, 5).unwrap().map(|r| r.score), Some(70.0));
    }

    #[test]
    fn test_monthly_summary() {
        let at = |m: u32, d: u32| Utc.with_ymd_and_hms(2024, m, d, 12, 0, 0).unwrap();
        let records = vec![
            MatchRecord { matched_at: at(2, 1), ..MatchRecord::new(1, 1, 70.0) },
            MatchRecord { matched_at: at(1, 9), ..MatchRecord::new(1, 2, 60.0) },
            MatchRecord { matched_at: at(2, 20), ..MatchRecord::new(2, 1, 75.0) },
        ];

        let summary = monthly_summary(&records);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].month, "2024-01");
        assert_eq!(summary[0].matches, 1);
        assert_eq!(summary[1].month, "2024-02");
        assert_eq!(summary[1].matches, 2);
        assert_eq!(summary[1].average_score, 72.5);
    }
}

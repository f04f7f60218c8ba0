//! Collision table shared by the mapper cache and the persisted form

use crate::{Fingerprint, Metric, Result, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A single permanent `(original, metric) -> mapped` association
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionRecord {
    /// Fingerprint the metric hashed to
    pub original: Fingerprint,
    /// The metric that lost the original fingerprint
    pub metric: Metric,
    /// Fingerprint allocated to the metric instead
    pub mapped: Fingerprint,
}

/// All collision records, by original fingerprint then metric
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollisionTable {
    entries: HashMap<Fingerprint, HashMap<Metric, Fingerprint>>,
    len: usize,
}

impl CollisionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from records, rejecting structurally invalid input
    pub fn from_records(records: impl IntoIterator<Item = CollisionRecord>) -> Result<Self> {
        let mut table = Self::new();
        for record in records {
            if table.get(record.original, &record.metric).is_some() {
                return Err(StorageError::Corruption(format!(
                    "Duplicate collision record for {} {}",
                    record.original, record.metric
                )));
            }
            table.insert(record.original, record.metric, record.mapped);
        }
        table.validate()?;
        Ok(table)
    }

    /// Look up the mapped fingerprint for a metric at an original fingerprint
    pub fn get(&self, original: Fingerprint, metric: &Metric) -> Option<Fingerprint> {
        self.entries.get(&original)?.get(metric).copied()
    }

    /// Insert a record, returning the mapped fingerprint it replaced
    pub fn insert(
        &mut self,
        original: Fingerprint,
        metric: Metric,
        mapped: Fingerprint,
    ) -> Option<Fingerprint> {
        let prev = self.entries.entry(original).or_default().insert(metric, mapped);
        if prev.is_none() {
            self.len += 1;
        }
        prev
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Highest mapped fingerprint in the table, 0 if empty
    pub fn highest_mapped(&self) -> Fingerprint {
        self.entries
            .values()
            .flat_map(|m| m.values())
            .copied()
            .max()
            .unwrap_or_default()
    }

    /// Records ordered by original fingerprint, then metric
    pub fn iter(&self) -> impl Iterator<Item = CollisionRecord> + '_ {
        let ordered: BTreeMap<_, BTreeMap<_, _>> = self
            .entries
            .iter()
            .map(|(fp, metrics)| (*fp, metrics.iter().collect()))
            .collect();

        ordered.into_iter().flat_map(|(original, metrics)| {
            metrics.into_iter().map(move |(metric, mapped)| CollisionRecord {
                original,
                metric: metric.clone(),
                mapped: *mapped,
            })
        })
    }

    /// Records in allocation order
    pub fn records_by_mapped(&self) -> Vec<CollisionRecord> {
        let mut records: Vec<_> = self.iter().collect();
        records.sort_by_key(|r| r.mapped);
        records
    }

    /// Check that every mapped fingerprint is non-zero and unique
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.len);
        for (original, metrics) in &self.entries {
            for (metric, mapped) in metrics {
                if mapped.0 == 0 {
                    return Err(StorageError::Corruption(format!(
                        "Zero mapped fingerprint for {} {}",
                        original, metric
                    )));
                }
                if !seen.insert(*mapped) {
                    return Err(StorageError::Corruption(format!(
                        "Mapped fingerprint {} assigned more than once",
                        mapped
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(v: &str) -> Metric {
        Metric::new().with_label("foo", v)
    }

    #[test]
    fn test_insert_and_get() {
        let mut table = CollisionTable::new();
        assert!(table.is_empty());
        assert_eq!(table.highest_mapped(), Fingerprint(0));

        table.insert(Fingerprint(100), metric("a"), Fingerprint(1));
        table.insert(Fingerprint(100), metric("b"), Fingerprint(2));
        table.insert(Fingerprint(50), metric("a"), Fingerprint(3));

        assert_eq!(table.len(), 3);
        assert_eq!(table.get(Fingerprint(100), &metric("b")), Some(Fingerprint(2)));
        assert_eq!(table.get(Fingerprint(50), &metric("b")), None);
        assert_eq!(table.get(Fingerprint(7), &metric("a")), None);
        assert_eq!(table.highest_mapped(), Fingerprint(3));
    }

    #[test]
    fn test_iter_is_ordered() {
        let mut table = CollisionTable::new();
        table.insert(Fingerprint(100), metric("b"), Fingerprint(2));
        table.insert(Fingerprint(50), metric("a"), Fingerprint(3));
        table.insert(Fingerprint(100), metric("a"), Fingerprint(1));

        let originals: Vec<_> = table.iter().map(|r| (r.original.0, r.mapped.0)).collect();
        assert_eq!(originals, vec![(50, 3), (100, 1), (100, 2)]);

        let mapped: Vec<_> = table.records_by_mapped().iter().map(|r| r.mapped.0).collect();
        assert_eq!(mapped, vec![1, 2, 3]);
    }

    #[test]
    fn test_from_records_rejects_invalid() {
        let dup_mapped = vec![
            CollisionRecord { original: Fingerprint(10), metric: metric("a"), mapped: Fingerprint(1) },
            CollisionRecord { original: Fingerprint(20), metric: metric("b"), mapped: Fingerprint(1) },
        ];
        assert!(CollisionTable::from_records(dup_mapped).unwrap_err().is_corruption());

        let zero = vec![CollisionRecord {
            original: Fingerprint(10),
            metric: metric("a"),
            mapped: Fingerprint(0),
        }];
        assert!(CollisionTable::from_records(zero).unwrap_err().is_corruption());

        let dup_pair = vec![
            CollisionRecord { original: Fingerprint(10), metric: metric("a"), mapped: Fingerprint(1) },
            CollisionRecord { original: Fingerprint(10), metric: metric("a"), mapped: Fingerprint(2) },
        ];
        assert!(CollisionTable::from_records(dup_pair).unwrap_err().is_corruption());
    }
}

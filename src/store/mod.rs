//! In-memory record store.
//!
//! Each domain keeps its own append-only list of immutable batches behind
//! its own lock, so imports into one domain never block reads of another.

use crate::models::{
    Batch, BatchKey, Domain, DomainRecord, FeedbackRecord, InventoryRecord, ProductionRecord,
    RecordBatch, SalesRecord,
};
use chrono::{Local, NaiveDateTime};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Append-only batch list for a single domain.
#[derive(Debug)]
pub struct Shelf<R> {
    batches: RwLock<Vec<Arc<Batch<R>>>>,
}

impl<R> Default for Shelf<R> {
    fn default() -> Self {
        Self {
            batches: RwLock::new(Vec::new()),
        }
    }
}

impl<R: DomainRecord> Shelf<R> {
    fn push(&self, batch: Batch<R>) {
        let mut batches = self.batches.write().unwrap_or_else(PoisonError::into_inner);
        batches.push(Arc::new(batch));
    }

    /// Consistent view of the batches stored so far.
    fn snapshot(&self) -> Vec<Arc<Batch<R>>> {
        self.batches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn clear(&self) {
        self.batches
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record_count(&self) -> usize {
        self.snapshot().iter().map(|b| b.records.len()).sum()
    }
}

/// Record types that live on a shelf of the store.
pub trait Stored: DomainRecord {
    fn shelf(store: &RecordStore) -> &Shelf<Self>;
}

impl Stored for ProductionRecord {
    fn shelf(store: &RecordStore) -> &Shelf<Self> {
        &store.production
    }
}

impl Stored for SalesRecord {
    fn shelf(store: &RecordStore) -> &Shelf<Self> {
        &store.sales
    }
}

impl Stored for InventoryRecord {
    fn shelf(store: &RecordStore) -> &Shelf<Self> {
        &store.inventory
    }
}

impl Stored for FeedbackRecord {
    fn shelf(store: &RecordStore) -> &Shelf<Self> {
        &store.feedback
    }
}

/// Owner of every imported batch, partitioned by domain.
#[derive(Debug, Default)]
pub struct RecordStore {
    production: Shelf<ProductionRecord>,
    sales: Shelf<SalesRecord>,
    inventory: Shelf<InventoryRecord>,
    feedback: Shelf<FeedbackRecord>,
    sequence: AtomicU64,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new batch and return its key.
    pub fn import_batch<R: Stored>(&self, records: Vec<R>) -> BatchKey {
        let key = BatchKey {
            domain: R::DOMAIN,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            imported_at: Local::now().naive_local(),
        };
        let count = records.len();

        R::shelf(self).push(Batch {
            key: key.clone(),
            records,
        });

        info!("Imported {} {} records as batch {}", count, R::DOMAIN, key);
        key
    }

    /// Append a batch handed over by the import adapter.
    pub fn submit(&self, batch: RecordBatch) -> BatchKey {
        match batch {
            RecordBatch::Production(records) => self.import_batch(records),
            RecordBatch::Sales(records) => self.import_batch(records),
            RecordBatch::Inventory(records) => self.import_batch(records),
            RecordBatch::Feedback(records) => self.import_batch(records),
        }
    }

    /// Every record of the domain, in batch order then within-batch order.
    pub fn all_records<R: Stored>(&self) -> Vec<R> {
        R::shelf(self)
            .snapshot()
            .iter()
            .flat_map(|batch| batch.records.iter().cloned())
            .collect()
    }

    /// Records whose event time lies in `[start, end]`.
    pub fn records_in_range<R: Stored>(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<R> {
        in_range(&self.all_records::<R>(), start, end)
    }

    pub fn record_count(&self, domain: Domain) -> usize {
        match domain {
            Domain::Production => self.production.record_count(),
            Domain::Sales => self.sales.record_count(),
            Domain::Inventory => self.inventory.record_count(),
            Domain::Feedback => self.feedback.record_count(),
        }
    }

    pub fn has_records(&self, domain: Domain) -> bool {
        self.record_count(domain) > 0
    }

    /// Discard every batch of every domain.
    pub fn clear_all(&self) {
        self.production.clear();
        self.sales.clear();
        self.inventory.clear();
        self.feedback.clear();
        info!("Cleared all stored batches");
    }
}

/// Inclusive time filter; records without an event time are dropped.
fn in_range<R: DomainRecord>(records: &[R], start: NaiveDateTime, end: NaiveDateTime) -> Vec<R> {
    let filtered: Vec<R> = records
        .iter()
        .filter(|r| matches!(r.event_time(), Some(t) if t >= start && t <= end))
        .cloned()
        .collect();

    debug!(
        "{} of {} {} records within {} .. {}",
        filtered.len(),
        records.len(),
        R::DOMAIN,
        start,
        end
    );
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap()
    }

    fn production(id: u64, name: &str, produced_at: Option<NaiveDateTime>) -> ProductionRecord {
        ProductionRecord {
            id,
            product_name: name.to_string(),
            produced_qty: 10,
            defective_qty: 1,
            production_line: "L1".to_string(),
            unit_cost: 1.0,
            efficiency_rate: 90.0,
            produced_at,
            imported_at: at(28),
        }
    }

    #[test]
    fn test_all_records_concatenates_batches_in_order() {
        let store = RecordStore::new();
        store.import_batch(vec![production(1, "A", None), production(2, "B", None)]);
        store.import_batch(vec![production(3, "C", None)]);

        let names: Vec<String> = store
            .all_records::<ProductionRecord>()
            .into_iter()
            .map(|r| r.product_name)
            .collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(store.record_count(Domain::Production), 3);
        assert!(!store.has_records(Domain::Sales));
    }

    #[test]
    fn test_batch_keys_are_unique() {
        let store = RecordStore::new();
        let first = store.import_batch::<ProductionRecord>(vec![]);
        let second = store.import_batch::<ProductionRecord>(vec![]);

        assert_ne!(first, second);
        assert!(second.sequence > first.sequence);
        assert_eq!(first.domain, Domain::Production);
    }

    #[test]
    fn test_records_in_range_is_inclusive_and_skips_missing_times() {
        let store = RecordStore::new();
        store.import_batch(vec![
            production(1, "early", Some(at(1))),
            production(2, "start", Some(at(5))),
            production(3, "end", Some(at(10))),
            production(4, "late", Some(at(20))),
            production(5, "undated", None),
        ]);

        let names: Vec<String> = store
            .records_in_range::<ProductionRecord>(at(5), at(10))
            .into_iter()
            .map(|r| r.product_name)
            .collect();
        assert_eq!(names, vec!["start", "end"]);
    }

    #[test]
    fn test_clear_all_empties_every_domain() {
        let store = RecordStore::new();
        store.import_batch(vec![production(1, "A", Some(at(1)))]);
        store.submit(RecordBatch::Sales(vec![]));
        store.clear_all();

        for domain in Domain::ALL {
            assert_eq!(store.record_count(domain), 0);
            assert!(!store.has_records(domain));
        }
        assert!(store.all_records::<ProductionRecord>().is_empty());
    }

    #[test]
    fn test_concurrent_imports_lose_nothing() {
        let store = Arc::new(RecordStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..25)
                        .map(|i| store.import_batch(vec![production(t * 100 + i, "A", None)]))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let keys: Vec<BatchKey> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let sequences: HashSet<u64> = keys.iter().map(|k| k.sequence).collect();

        assert_eq!(sequences.len(), 200);
        assert_eq!(store.record_count(Domain::Production), 200);
    }

    #[test]
    fn test_readers_never_see_partial_batches() {
        const BATCH_SIZE: usize = 7;
        let store = Arc::new(RecordStore::new());

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let batch: Vec<ProductionRecord> = (0..BATCH_SIZE as u64)
                            .map(|j| production(t * 10_000 + i * 100 + j, "A", None))
                            .collect();
                        store.import_batch(batch);
                    }
                })
            })
            .collect();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..200)
                        .map(|_| store.all_records::<ProductionRecord>().len())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        for reader in readers {
            for len in reader.join().unwrap() {
                assert_eq!(len % BATCH_SIZE, 0, "observed {} records", len);
            }
        }
        assert_eq!(store.record_count(Domain::Production), 4 * 50 * BATCH_SIZE);
    }

    #[test]
    fn test_clear_all_during_reads_leaves_whole_batches() {
        const BATCH_SIZE: usize = 5;
        let store = Arc::new(RecordStore::new());

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..100u64 {
                    let batch: Vec<ProductionRecord> = (0..BATCH_SIZE as u64)
                        .map(|j| production(i * 10 + j, "A", None))
                        .collect();
                    store.import_batch(batch);
                    if i % 10 == 9 {
                        store.clear_all();
                    }
                }
            })
        };
        let reader = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                (0..300)
                    .map(|_| store.all_records::<ProductionRecord>().len())
                    .collect::<Vec<_>>()
            })
        };

        writer.join().unwrap();
        for len in reader.join().unwrap() {
            assert_eq!(len % BATCH_SIZE, 0);
        }
        assert_eq!(store.record_count(Domain::Production), 0);
    }
}

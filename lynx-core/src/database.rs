//! Database facade routing operations to the configured index.
//!
//! A [`Database`] owns one index variant plus an independent record map
//! used for metadata and iteration. Reads take shared locks, writes take
//! exclusive locks; statistics counters are atomic. The facade also
//! drives the non-blocking HNSW maintenance protocol
//! ([`optimize`](Database::optimize)).

use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::index::{FlatIndex, HnswIndex, HnswParams, Index, IvfIndex, IvfParams, SearchParams};
use crate::record::{VectorId, VectorRecord};
use crate::storage::{
    read_bytes, read_u32, read_u64, read_u8, read_vector, write_bytes, write_u32, write_u64,
    write_u8, write_vector, FORMAT_VERSION,
};
use crate::write_log::WriteLog;

/// "LYNX" in hex.
const DB_MAGIC: u32 = 0x4C594E58;

/// File name used under `Config::data_path`.
const DB_FILE_NAME: &str = "lynx.db";

/// Which index implementation backs the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    /// Exact brute-force search.
    Flat,
    /// Approximate search over a multi-layer proximity graph.
    Hnsw,
    /// Approximate search over k-means clusters.
    Ivf,
}

impl Default for IndexType {
    fn default() -> Self {
        Self::Flat
    }
}

impl IndexType {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            IndexType::Flat => 0,
            IndexType::Hnsw => 1,
            IndexType::Ivf => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(IndexType::Flat),
            1 => Ok(IndexType::Hnsw),
            2 => Ok(IndexType::Ivf),
            _ => Err(Error::IndexCorrupted(format!(
                "invalid index type tag: {}",
                value
            ))),
        }
    }
}

/// Database configuration. Immutable after [`Database::create`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Vector dimensionality; every stored vector must match.
    pub dimension: usize,
    /// Index implementation to use.
    pub index_type: IndexType,
    /// Distance metric for similarity.
    pub metric: DistanceMetric,
    /// HNSW tuning; ignored for other index types.
    pub hnsw: HnswParams,
    /// IVF tuning; ignored for other index types.
    pub ivf: IvfParams,
    /// Directory where [`Database::save`] writes its state.
    pub data_path: PathBuf,
}

impl Config {
    /// Creates a config with default index parameters and no data path.
    pub fn new(dimension: usize, index_type: IndexType, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            index_type,
            metric,
            hnsw: HnswParams::default(),
            ivf: IvfParams::default(),
            data_path: PathBuf::new(),
        }
    }

    /// Sets the HNSW parameters. Chainable.
    pub fn with_hnsw_params(mut self, hnsw: HnswParams) -> Self {
        self.hnsw = hnsw;
        self
    }

    /// Sets the IVF parameters. Chainable.
    pub fn with_ivf_params(mut self, ivf: IvfParams) -> Self {
        self.ivf = ivf;
        self
    }

    /// Sets the persistence directory. Chainable.
    pub fn with_data_path<P: Into<PathBuf>>(mut self, data_path: P) -> Self {
        self.data_path = data_path.into();
        self
    }

    fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::InvalidArgument(
                "dimension must be at least 1".into(),
            ));
        }
        match self.index_type {
            IndexType::Hnsw => {
                if self.hnsw.m < 2 {
                    return Err(Error::InvalidArgument("hnsw m must be at least 2".into()));
                }
            }
            IndexType::Ivf => {
                if self.ivf.n_clusters == 0 {
                    return Err(Error::InvalidArgument(
                        "ivf n_clusters must be at least 1".into(),
                    ));
                }
                if self.ivf.n_probe == 0 || self.ivf.n_probe > self.ivf.n_clusters {
                    return Err(Error::InvalidArgument(format!(
                        "ivf n_probe must be in 1..={}, got {}",
                        self.ivf.n_clusters, self.ivf.n_probe
                    )));
                }
            }
            IndexType::Flat => {}
        }
        Ok(())
    }
}

/// A single annotated search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResultItem {
    pub id: VectorId,
    /// Public distance (L2 includes the square root).
    pub distance: f32,
    pub metadata: Option<String>,
}

/// Result of a search: hits ascending by distance, plus telemetry.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub items: Vec<SearchResultItem>,
    /// Candidates whose distance was evaluated while searching.
    pub total_candidates: u64,
    /// Wall-clock duration of the query.
    pub query_time_ms: f64,
}

impl SearchResult {
    /// Returns true if the search produced no hits.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A point-in-time view of database counters.
///
/// `avg_query_time_ms` is derived from two independent atomics and may
/// observe a query that has been counted but not yet timed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatabaseStats {
    pub vector_count: usize,
    pub dimension: usize,
    /// Approximate record-map footprint in bytes.
    pub memory_usage_bytes: usize,
    /// Index-reported footprint in bytes.
    pub index_memory_bytes: usize,
    pub total_queries: u64,
    pub total_inserts: u64,
    pub avg_query_time_ms: f64,
}

/// An embeddable vector database.
///
/// Thread-safe: shared references can be used from any number of threads.
/// Reads (search, get, contains, stats, iteration) take shared locks and
/// run concurrently; writes are serialized per structure.
///
/// # Example
///
/// ```
/// use lynx_core::{Config, Database, DistanceMetric, IndexType, VectorRecord};
///
/// let config = Config::new(3, IndexType::Flat, DistanceMetric::L2);
/// let db = Database::create(config).unwrap();
///
/// db.insert(VectorRecord::new(1, vec![1.0, 0.0, 0.0])).unwrap();
/// db.insert(VectorRecord::new(2, vec![0.0, 1.0, 0.0])).unwrap();
///
/// let result = db.search(&[0.9, 0.1, 0.0], 1);
/// assert_eq!(result.items[0].id, 1);
/// ```
pub struct Database {
    config: Config,
    index: RwLock<Index>,
    records: RwLock<HashMap<VectorId, VectorRecord>>,
    write_log: WriteLog,
    total_inserts: AtomicU64,
    total_queries: AtomicU64,
    total_query_time_us: AtomicU64,
}

impl Database {
    /// Creates an empty database for the given configuration.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] on a malformed configuration.
    pub fn create(config: Config) -> Result<Self> {
        config.validate()?;
        let index = Self::create_index(&config);
        Ok(Self {
            config,
            index: RwLock::new(index),
            records: RwLock::new(HashMap::new()),
            write_log: WriteLog::new(),
            total_inserts: AtomicU64::new(0),
            total_queries: AtomicU64::new(0),
            total_query_time_us: AtomicU64::new(0),
        })
    }

    fn create_index(config: &Config) -> Index {
        match config.index_type {
            IndexType::Flat => Index::Flat(FlatIndex::new(config.dimension, config.metric)),
            IndexType::Hnsw => Index::Hnsw(HnswIndex::new(
                config.dimension,
                config.metric,
                config.hnsw,
            )),
            IndexType::Ivf => {
                Index::Ivf(IvfIndex::new(config.dimension, config.metric, config.ivf))
            }
        }
    }

    /// Inserts a record into both the record map and the index.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] on a bad vector length;
    /// [`Error::InvalidState`] on a duplicate id, or for IVF before the
    /// index has been built.
    pub fn insert(&self, record: VectorRecord) -> Result<()> {
        if record.vector.len() != self.config.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimension,
                got: record.vector.len(),
            });
        }

        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return Err(Error::InvalidState(format!(
                "duplicate vector id: {}",
                record.id
            )));
        }

        let mut index = self.index.write();
        index.add(record.id, &record.vector)?;
        if self.write_log.is_enabled() {
            self.write_log.log_insert(record.id, &record.vector);
        }
        drop(index);

        records.insert(record.id, record);
        self.total_inserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Removes a record from both structures.
    ///
    /// # Errors
    ///
    /// [`Error::VectorNotFound`] if neither structure holds the id.
    pub fn remove(&self, id: VectorId) -> Result<()> {
        let mut records = self.records.write();
        let mut index = self.index.write();

        let in_map = records.remove(&id).is_some();
        let in_index = index.remove(id).is_ok();
        if !in_map && !in_index {
            return Err(Error::VectorNotFound(id));
        }

        if self.write_log.is_enabled() {
            self.write_log.log_remove(id);
        }
        Ok(())
    }

    /// Returns true if the id is stored.
    pub fn contains(&self, id: VectorId) -> bool {
        self.records.read().contains_key(&id)
    }

    /// Returns a clone of the stored record.
    pub fn get(&self, id: VectorId) -> Option<VectorRecord> {
        self.records.read().get(&id).cloned()
    }

    /// Inserts a batch of records.
    ///
    /// Flat and HNSW insert individually. IVF takes the bulk-build path
    /// when empty; a batch of at least 10% of the current size triggers a
    /// re-clustering rebuild over existing plus new vectors; smaller
    /// batches fall back to individual inserts against the existing
    /// centroids.
    ///
    /// The whole batch is validated before any mutation.
    pub fn batch_insert(&self, batch: Vec<VectorRecord>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut records = self.records.write();

        let mut seen = std::collections::HashSet::with_capacity(batch.len());
        for record in &batch {
            if record.vector.len() != self.config.dimension {
                return Err(Error::DimensionMismatch {
                    expected: self.config.dimension,
                    got: record.vector.len(),
                });
            }
            if records.contains_key(&record.id) || !seen.insert(record.id) {
                return Err(Error::InvalidState(format!(
                    "duplicate vector id: {}",
                    record.id
                )));
            }
        }

        let mut index = self.index.write();
        match &mut *index {
            Index::Ivf(ivf) => {
                if ivf.size() == 0 {
                    ivf.build(&batch)?;
                } else if batch.len() * 10 >= ivf.size() {
                    let mut merged: Vec<VectorRecord> = records.values().cloned().collect();
                    merged.extend(batch.iter().cloned());
                    ivf.build(&merged)?;
                    debug!(
                        existing = records.len(),
                        batch = batch.len(),
                        "ivf index re-clustered for large batch"
                    );
                } else {
                    for record in &batch {
                        ivf.add(record.id, &record.vector)?;
                    }
                }
            }
            other => {
                for record in &batch {
                    other.add(record.id, &record.vector)?;
                    if self.write_log.is_enabled() {
                        self.write_log.log_insert(record.id, &record.vector);
                    }
                }
            }
        }
        drop(index);

        let n = batch.len() as u64;
        for record in batch {
            records.insert(record.id, record);
        }
        self.total_inserts.fetch_add(n, Ordering::Relaxed);
        Ok(())
    }

    /// Searches with default parameters.
    pub fn search(&self, query: &[f32], k: usize) -> SearchResult {
        self.search_with_params(query, k, &SearchParams::default())
    }

    /// Searches for the k nearest neighbors.
    ///
    /// Invalid input (wrong query dimension, `k = 0`) yields an empty
    /// result and does not count toward `total_queries`.
    pub fn search_with_params(
        &self,
        query: &[f32],
        k: usize,
        params: &SearchParams,
    ) -> SearchResult {
        if k == 0 || query.len() != self.config.dimension {
            return SearchResult::default();
        }

        let start = Instant::now();

        let records = self.records.read();
        let index = self.index.read();
        let raw = index.search(query, k, params);
        drop(index);

        let items: Vec<SearchResultItem> = raw
            .neighbors
            .iter()
            .map(|n| SearchResultItem {
                id: n.id,
                distance: n.distance,
                metadata: records.get(&n.id).and_then(|r| r.metadata.clone()),
            })
            .collect();
        drop(records);

        let elapsed = start.elapsed();
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        self.total_query_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);

        SearchResult {
            items,
            total_candidates: raw.candidates as u64,
            query_time_ms: elapsed.as_secs_f64() * 1_000.0,
        }
    }

    /// Forward-only iteration over stored records, ascending by id.
    ///
    /// The iterator holds a shared lock on the record map: writers block
    /// until every live iterator is dropped, and writes performed after
    /// construction are not observed.
    pub fn all_records(&self) -> RecordIter<'_> {
        let guard = self.records.read();
        let mut ids: Vec<VectorId> = guard.keys().copied().collect();
        ids.sort_unstable();
        RecordIter {
            guard,
            ids: ids.into_iter(),
        }
    }

    /// Number of stored records.
    pub fn size(&self) -> usize {
        self.records.read().len()
    }

    /// Configured vector dimensionality.
    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// The database configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Snapshot of counters and memory estimates.
    pub fn stats(&self) -> DatabaseStats {
        let records = self.records.read();
        let index = self.index.read();

        let memory_usage_bytes: usize = records
            .values()
            .map(|r| 8 + 4 * r.vector.len() + r.metadata.as_ref().map_or(0, String::len))
            .sum();

        let total_queries = self.total_queries.load(Ordering::Relaxed);
        let total_us = self.total_query_time_us.load(Ordering::Relaxed);

        DatabaseStats {
            vector_count: records.len(),
            dimension: self.config.dimension,
            memory_usage_bytes,
            index_memory_bytes: index.memory_usage(),
            total_queries,
            total_inserts: self.total_inserts.load(Ordering::Relaxed),
            avg_query_time_ms: (total_us as f64 / 1_000.0) / total_queries.max(1) as f64,
        }
    }

    /// Present for API compatibility; the core is memory-resident and has
    /// nothing to flush. Persistence goes through [`save`](Self::save).
    pub fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Writes the database to `data_path/lynx.db`.
    ///
    /// The file holds a versioned envelope (config fields and every
    /// record) followed by the length-prefixed index blob.
    pub fn save(&self) -> Result<()> {
        if self.config.data_path.as_os_str().is_empty() {
            return Err(Error::InvalidArgument("no data path configured".into()));
        }
        fs::create_dir_all(&self.config.data_path)?;
        let path = self.config.data_path.join(DB_FILE_NAME);

        // Exclusive access freezes a consistent snapshot.
        let records = self.records.write();
        let index = self.index.write();

        let file = fs::File::create(&path)?;
        let mut w = BufWriter::new(file);

        write_u32(&mut w, DB_MAGIC)?;
        write_u32(&mut w, FORMAT_VERSION)?;
        write_u32(&mut w, self.config.dimension as u32)?;
        write_u8(&mut w, self.config.index_type.as_u8())?;
        write_u8(&mut w, self.config.metric.as_u8())?;

        write_u64(&mut w, records.len() as u64)?;
        let mut ids: Vec<VectorId> = records.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let record = &records[&id];
            write_u64(&mut w, id)?;
            write_vector(&mut w, &record.vector)?;
            let metadata = record.metadata.as_deref().unwrap_or("");
            write_bytes(&mut w, metadata.as_bytes())?;
        }

        let mut blob = Vec::new();
        index.serialize(&mut blob)?;
        write_u64(&mut w, blob.len() as u64)?;
        w.write_all(&blob)?;
        w.flush()?;

        debug!(records = records.len(), path = %path.display(), "database saved");
        Ok(())
    }

    /// Loads the database from `data_path/lynx.db`, replacing all
    /// in-memory state.
    ///
    /// # Errors
    ///
    /// [`Error::IndexCorrupted`] on a bad magic, version, or blob shape;
    /// [`Error::InvalidState`] when the file disagrees with the live
    /// configuration (dimension, index type, metric).
    pub fn load(&self) -> Result<()> {
        let path = self.config.data_path.join(DB_FILE_NAME);
        let file = fs::File::open(&path)?;
        let mut r = BufReader::new(file);

        let magic = read_u32(&mut r)?;
        if magic != DB_MAGIC {
            return Err(Error::IndexCorrupted(format!(
                "bad database magic: {:#010x}",
                magic
            )));
        }
        let version = read_u32(&mut r)?;
        if version != FORMAT_VERSION {
            return Err(Error::IndexCorrupted(format!(
                "unsupported database version: {}",
                version
            )));
        }

        let dimension = read_u32(&mut r)? as usize;
        if dimension != self.config.dimension {
            return Err(Error::InvalidState(format!(
                "stored dimension {} does not match configured {}",
                dimension, self.config.dimension
            )));
        }
        let index_type = IndexType::from_u8(read_u8(&mut r)?)?;
        if index_type != self.config.index_type {
            return Err(Error::InvalidState(format!(
                "stored index type {:?} does not match configured {:?}",
                index_type, self.config.index_type
            )));
        }
        let metric = DistanceMetric::from_u8(read_u8(&mut r)?)?;
        if metric != self.config.metric {
            return Err(Error::InvalidState(format!(
                "stored metric {:?} does not match configured {:?}",
                metric, self.config.metric
            )));
        }

        let count = read_u64(&mut r)?;
        let mut records: HashMap<VectorId, VectorRecord> =
            HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let id = read_u64(&mut r)?;
            let vector = read_vector(&mut r, Some(dimension))?;
            let raw_metadata = read_bytes(&mut r)?;
            let metadata = if raw_metadata.is_empty() {
                None
            } else {
                Some(String::from_utf8(raw_metadata).map_err(|_| {
                    Error::IndexCorrupted(format!("record {} has non-utf8 metadata", id))
                })?)
            };
            if records
                .insert(
                    id,
                    VectorRecord {
                        id,
                        vector,
                        metadata,
                    },
                )
                .is_some()
            {
                return Err(Error::IndexCorrupted(format!("duplicate record id: {}", id)));
            }
        }

        let blob_len = read_u64(&mut r)? as usize;
        let mut blob = vec![0u8; blob_len];
        r.read_exact(&mut blob)
            .map_err(|_| Error::IndexCorrupted("truncated index blob".into()))?;

        let mut index = Self::create_index(&self.config);
        index.deserialize(&mut &blob[..])?;
        if index.size() != records.len() {
            return Err(Error::IndexCorrupted(format!(
                "index holds {} vectors but envelope holds {} records",
                index.size(),
                records.len()
            )));
        }

        *self.records.write() = records;
        *self.index.write() = index;

        debug!(records = count, path = %path.display(), "database loaded");
        Ok(())
    }

    /// Runs the non-blocking HNSW maintenance protocol: compacts a clone
    /// of the graph in the background while writes continue on the live
    /// index, then replays the captured writes and swaps the clone in.
    ///
    /// # Errors
    ///
    /// [`Error::NotSupported`] unless the database uses an HNSW index;
    /// [`Error::InvalidState`] if the write log overflowed, in which
    /// case the live index is left untouched.
    pub fn optimize(&self) -> Result<()> {
        if self.config.index_type != IndexType::Hnsw {
            return Err(Error::NotSupported(
                "optimize applies to HNSW databases only".into(),
            ));
        }

        // Switch logging on under the writer lock so no write is missed.
        {
            let _index = self.index.write();
            self.write_log.clear();
            self.write_log.set_enabled(true);
        }
        debug!("hnsw maintenance started");

        // Snapshot the live graph; concurrent writes keep landing on the
        // live index and in the log.
        let mut clone = {
            let index = self.index.read();
            match &*index {
                Index::Hnsw(hnsw) => hnsw.clone(),
                _ => unreachable!("index type checked above"),
            }
        };

        let tombstones = clone.tombstone_count();
        clone.compact();

        // Replay and swap under the writer lock.
        let mut index = self.index.write();
        if self.write_log.overflowed() {
            self.write_log.set_enabled(false);
            self.write_log.clear();
            warn!("hnsw maintenance aborted: write log overflow");
            return Err(Error::InvalidState(
                "write log overflowed during maintenance".into(),
            ));
        }

        self.write_log.replay_to(&mut clone);
        *index = Index::Hnsw(clone);
        self.write_log.set_enabled(false);
        self.write_log.clear();

        debug!(purged = tombstones, "hnsw maintenance finished");
        Ok(())
    }
}

/// Forward-only iterator over stored records.
///
/// Holds a shared lock on the record map for its whole lifetime.
pub struct RecordIter<'a> {
    guard: RwLockReadGuard<'a, HashMap<VectorId, VectorRecord>>,
    ids: std::vec::IntoIter<VectorId>,
}

impl Iterator for RecordIter<'_> {
    type Item = VectorRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.ids.next().map(|id| self.guard[&id].clone())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl ExactSizeIterator for RecordIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::atomic::AtomicU64 as TestCounter;
    use std::sync::Arc;

    static TEST_COUNTER: TestCounter = TestCounter::new(0);

    fn temp_db_path() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("lynx_test_db")
            .join(format!("db_{}_{}", std::process::id(), id));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect()
    }

    #[test]
    fn test_create_rejects_zero_dimension() {
        let config = Config::new(0, IndexType::Flat, DistanceMetric::L2);
        assert!(matches!(
            Database::create(config),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_create_rejects_bad_n_probe() {
        let config = Config::new(4, IndexType::Ivf, DistanceMetric::L2)
            .with_ivf_params(IvfParams::new(4).with_n_probe(9));
        assert!(matches!(
            Database::create(config),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_insert_get_contains() {
        let db = Database::create(Config::new(3, IndexType::Flat, DistanceMetric::L2)).unwrap();
        db.insert(VectorRecord::new(1, vec![1.0, 2.0, 3.0]).with_metadata("alpha"))
            .unwrap();

        assert_eq!(db.size(), 1);
        assert!(db.contains(1));
        let record = db.get(1).unwrap();
        assert_eq!(record.vector, vec![1.0, 2.0, 3.0]);
        assert_eq!(record.metadata.as_deref(), Some("alpha"));
        assert!(db.get(2).is_none());
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let db = Database::create(Config::new(2, IndexType::Flat, DistanceMetric::L2)).unwrap();
        db.insert(VectorRecord::new(1, vec![1.0, 0.0])).unwrap();
        let result = db.insert(VectorRecord::new(1, vec![0.0, 1.0]));
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_dimension_guard() {
        let db = Database::create(Config::new(16, IndexType::Flat, DistanceMetric::L2)).unwrap();

        let result = db.insert(VectorRecord::new(1, vec![0.0; 15]));
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch {
                expected: 16,
                got: 15
            })
        ));

        let before = db.stats().total_queries;
        let search = db.search(&vec![0.0; 17], 5);
        assert!(search.is_empty());
        assert_eq!(db.stats().total_queries, before);
    }

    #[test]
    fn test_remove_from_both_structures() {
        let db = Database::create(Config::new(2, IndexType::Flat, DistanceMetric::L2)).unwrap();
        db.insert(VectorRecord::new(1, vec![1.0, 0.0])).unwrap();

        db.remove(1).unwrap();
        assert!(!db.contains(1));
        assert!(db.search(&[1.0, 0.0], 1).is_empty());
        assert!(matches!(db.remove(1), Err(Error::VectorNotFound(1))));
    }

    #[test]
    fn test_search_hnsw_unit_vectors() {
        let config = Config::new(4, IndexType::Hnsw, DistanceMetric::L2);
        let db = Database::create(config).unwrap();
        db.insert(VectorRecord::new(1, vec![1.0, 0.0, 0.0, 0.0]))
            .unwrap();
        db.insert(VectorRecord::new(2, vec![0.0, 1.0, 0.0, 0.0]))
            .unwrap();
        db.insert(VectorRecord::new(3, vec![0.9, 0.1, 0.0, 0.0]))
            .unwrap();

        let result = db.search(&[1.0, 0.0, 0.0, 0.0], 2);
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[0].id, 1);
        assert!(result.items[0].distance < 1e-6);
        assert_eq!(result.items[1].id, 3);
        assert!((result.items[1].distance - 0.1414).abs() < 1e-3);
        assert!(result.total_candidates >= 2);
    }

    #[test]
    fn test_search_flat_cosine() {
        let db = Database::create(Config::new(3, IndexType::Flat, DistanceMetric::Cosine)).unwrap();
        db.insert(VectorRecord::new(10, vec![1.0, 0.0, 0.0])).unwrap();
        db.insert(VectorRecord::new(11, vec![0.0, 1.0, 0.0])).unwrap();

        let result = db.search(&[2.0, 0.0, 0.0], 1);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].id, 10);
        assert!(result.items[0].distance.abs() < 1e-6);
    }

    #[test]
    fn test_search_annotates_metadata() {
        let db = Database::create(Config::new(2, IndexType::Flat, DistanceMetric::L2)).unwrap();
        db.insert(VectorRecord::new(1, vec![1.0, 0.0]).with_metadata("m1"))
            .unwrap();
        db.insert(VectorRecord::new(2, vec![0.0, 1.0])).unwrap();

        let result = db.search(&[1.0, 0.0], 2);
        assert_eq!(result.items[0].metadata.as_deref(), Some("m1"));
        assert!(result.items[1].metadata.is_none());
    }

    #[test]
    fn test_search_with_filter() {
        let db = Database::create(Config::new(2, IndexType::Flat, DistanceMetric::L2)).unwrap();
        for i in 0..10u64 {
            db.insert(VectorRecord::new(i, vec![i as f32, 0.0])).unwrap();
        }

        let params = SearchParams::new().with_filter(|id| id >= 5);
        let result = db.search_with_params(&[0.0, 0.0], 3, &params);
        let ids: Vec<VectorId> = result.items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![5, 6, 7]);
    }

    #[test]
    fn test_ivf_batch_insert_builds_when_empty() {
        let config = Config::new(2, IndexType::Ivf, DistanceMetric::L2)
            .with_ivf_params(IvfParams::new(2).with_seed(7));
        let db = Database::create(config).unwrap();

        // Single inserts are rejected before the index is built.
        let early = db.insert(VectorRecord::new(99, vec![0.0, 0.0]));
        assert!(matches!(early, Err(Error::InvalidState(_))));

        db.batch_insert(vec![
            VectorRecord::new(1, vec![0.0, 0.0]),
            VectorRecord::new(2, vec![0.0, 1.0]),
            VectorRecord::new(3, vec![10.0, 10.0]),
            VectorRecord::new(4, vec![10.0, 11.0]),
        ])
        .unwrap();
        assert_eq!(db.size(), 4);

        let params = SearchParams::new().with_n_probe(1);
        let result = db.search_with_params(&[0.1, 0.1], 2, &params);
        let ids: Vec<VectorId> = result.items.iter().map(|i| i.id).collect();
        assert!(ids.contains(&1));
        assert!(ids.contains(&2));
    }

    #[test]
    fn test_ivf_batch_policies() {
        let config = Config::new(2, IndexType::Ivf, DistanceMetric::L2)
            .with_ivf_params(IvfParams::new(4).with_seed(3));
        let db = Database::create(config).unwrap();

        // Bulk build.
        let initial: Vec<VectorRecord> = (0..20u64)
            .map(|i| VectorRecord::new(i, vec![i as f32, (i % 5) as f32]))
            .collect();
        db.batch_insert(initial).unwrap();
        assert_eq!(db.size(), 20);

        // 5 >= 10% of 20: triggers the re-clustering rebuild.
        let rebuild: Vec<VectorRecord> = (20..25u64)
            .map(|i| VectorRecord::new(i, vec![i as f32, 1.0]))
            .collect();
        db.batch_insert(rebuild).unwrap();
        assert_eq!(db.size(), 25);

        // 1 < 10% of 25: incremental insert.
        db.batch_insert(vec![VectorRecord::new(100, vec![3.5, 1.5])])
            .unwrap();
        assert_eq!(db.size(), 26);

        // Everything stays findable with all cells probed.
        let params = SearchParams::new().with_n_probe(4);
        let result = db.search_with_params(&[3.5, 1.5], 1, &params);
        assert_eq!(result.items[0].id, 100);
    }

    #[test]
    fn test_batch_insert_validates_before_mutating() {
        let db = Database::create(Config::new(2, IndexType::Flat, DistanceMetric::L2)).unwrap();
        db.insert(VectorRecord::new(1, vec![1.0, 0.0])).unwrap();

        let result = db.batch_insert(vec![
            VectorRecord::new(2, vec![0.0, 1.0]),
            VectorRecord::new(1, vec![0.5, 0.5]),
        ]);
        assert!(matches!(result, Err(Error::InvalidState(_))));
        assert_eq!(db.size(), 1);
        assert!(!db.contains(2));
    }

    #[test]
    fn test_all_records_snapshot() {
        let db = Database::create(Config::new(2, IndexType::Flat, DistanceMetric::L2)).unwrap();
        for i in [3u64, 1, 2] {
            db.insert(VectorRecord::new(i, vec![i as f32, 0.0])).unwrap();
        }

        let ids: Vec<VectorId> = db.all_records().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let iter = db.all_records();
        assert_eq!(iter.len(), 3);
    }

    #[test]
    fn test_stats() {
        let db = Database::create(Config::new(2, IndexType::Flat, DistanceMetric::L2)).unwrap();
        db.insert(VectorRecord::new(1, vec![1.0, 0.0]).with_metadata("ab"))
            .unwrap();
        db.insert(VectorRecord::new(2, vec![0.0, 1.0])).unwrap();
        db.search(&[1.0, 0.0], 1);
        db.search(&[0.0, 1.0], 1);

        let stats = db.stats();
        assert_eq!(stats.vector_count, 2);
        assert_eq!(stats.dimension, 2);
        assert_eq!(stats.total_inserts, 2);
        assert_eq!(stats.total_queries, 2);
        assert_eq!(stats.memory_usage_bytes, (8 + 8 + 2) + (8 + 8));
        assert!(stats.index_memory_bytes > 0);
        assert!(stats.avg_query_time_ms >= 0.0);
    }

    #[test]
    fn test_flush_is_noop() {
        let db = Database::create(Config::new(2, IndexType::Flat, DistanceMetric::L2)).unwrap();
        db.flush().unwrap();
    }

    #[test]
    fn test_save_without_data_path() {
        let db = Database::create(Config::new(2, IndexType::Flat, DistanceMetric::L2)).unwrap();
        assert!(matches!(db.save(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_save_load_round_trip_flat() {
        let path = temp_db_path();
        let config = Config::new(3, IndexType::Flat, DistanceMetric::L2).with_data_path(&path);

        let db = Database::create(config.clone()).unwrap();
        db.insert(VectorRecord::new(1, vec![1.0, 0.0, 0.0]).with_metadata("one"))
            .unwrap();
        db.insert(VectorRecord::new(2, vec![0.0, 1.0, 0.0])).unwrap();
        db.save().unwrap();

        let restored = Database::create(config).unwrap();
        restored.load().unwrap();

        assert_eq!(restored.size(), 2);
        assert_eq!(restored.get(1).unwrap(), db.get(1).unwrap());
        assert_eq!(restored.get(2).unwrap(), db.get(2).unwrap());

        let a = db.search(&[0.9, 0.1, 0.0], 2);
        let b = restored.search(&[0.9, 0.1, 0.0], 2);
        assert_eq!(
            a.items.iter().map(|i| i.id).collect::<Vec<_>>(),
            b.items.iter().map(|i| i.id).collect::<Vec<_>>()
        );

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_save_load_round_trip_hnsw() {
        let path = temp_db_path();
        let config = Config::new(8, IndexType::Hnsw, DistanceMetric::L2)
            .with_hnsw_params(HnswParams::with_m(8).with_seed(5))
            .with_data_path(&path);

        let db = Database::create(config.clone()).unwrap();
        for (i, v) in random_vectors(500, 8, 11).into_iter().enumerate() {
            db.insert(VectorRecord::new(i as u64, v)).unwrap();
        }
        db.save().unwrap();

        let restored = Database::create(config).unwrap();
        restored.load().unwrap();
        assert_eq!(restored.size(), 500);

        let query: Vec<f32> = random_vectors(1, 8, 99).pop().unwrap();
        let a: Vec<VectorId> = db.search(&query, 10).items.iter().map(|i| i.id).collect();
        let b: Vec<VectorId> = restored
            .search(&query, 10)
            .items
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(a, b);

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_save_load_round_trip_ivf() {
        let path = temp_db_path();
        let config = Config::new(2, IndexType::Ivf, DistanceMetric::L2)
            .with_ivf_params(IvfParams::new(2).with_seed(7))
            .with_data_path(&path);

        let db = Database::create(config.clone()).unwrap();
        db.batch_insert(vec![
            VectorRecord::new(1, vec![0.0, 0.0]),
            VectorRecord::new(2, vec![0.0, 1.0]),
            VectorRecord::new(3, vec![10.0, 10.0]),
            VectorRecord::new(4, vec![10.0, 11.0]),
        ])
        .unwrap();
        db.save().unwrap();

        let restored = Database::create(config).unwrap();
        restored.load().unwrap();
        assert_eq!(restored.size(), 4);

        let params = SearchParams::new().with_n_probe(1);
        let result = restored.search_with_params(&[0.1, 0.1], 2, &params);
        let ids: Vec<VectorId> = result.items.iter().map(|i| i.id).collect();
        assert!(ids.contains(&1));
        assert!(ids.contains(&2));

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_load_rejects_config_mismatch() {
        let path = temp_db_path();
        let config = Config::new(3, IndexType::Flat, DistanceMetric::L2).with_data_path(&path);
        let db = Database::create(config).unwrap();
        db.insert(VectorRecord::new(1, vec![1.0, 0.0, 0.0])).unwrap();
        db.save().unwrap();

        let other =
            Database::create(Config::new(3, IndexType::Flat, DistanceMetric::Cosine).with_data_path(&path))
                .unwrap();
        assert!(matches!(other.load(), Err(Error::InvalidState(_))));

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_load_rejects_garbage_file() {
        let path = temp_db_path();
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(DB_FILE_NAME), b"not a lynx database").unwrap();

        let db = Database::create(
            Config::new(3, IndexType::Flat, DistanceMetric::L2).with_data_path(&path),
        )
        .unwrap();
        assert!(matches!(db.load(), Err(Error::IndexCorrupted(_))));

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_optimize_not_supported_for_flat() {
        let db = Database::create(Config::new(2, IndexType::Flat, DistanceMetric::L2)).unwrap();
        assert!(matches!(db.optimize(), Err(Error::NotSupported(_))));
    }

    #[test]
    fn test_optimize_purges_tombstones() {
        let config = Config::new(4, IndexType::Hnsw, DistanceMetric::L2)
            .with_hnsw_params(HnswParams::with_m(4).with_seed(9));
        let db = Database::create(config).unwrap();

        for (i, v) in random_vectors(50, 4, 23).into_iter().enumerate() {
            db.insert(VectorRecord::new(i as u64, v)).unwrap();
        }
        for i in (0..50u64).step_by(2) {
            db.remove(i).unwrap();
        }
        assert_eq!(db.size(), 25);

        db.optimize().unwrap();
        assert_eq!(db.size(), 25);

        let result = db.search(&[0.0; 4], 10);
        assert!(result.items.iter().all(|item| item.id % 2 == 1));
        assert!(!db.write_log.is_enabled());
        assert!(db.write_log.is_empty());
    }

    #[test]
    fn test_concurrent_searches_agree() {
        let db = Arc::new(
            Database::create(Config::new(4, IndexType::Flat, DistanceMetric::L2)).unwrap(),
        );
        for (i, v) in random_vectors(200, 4, 77).into_iter().enumerate() {
            db.insert(VectorRecord::new(i as u64, v)).unwrap();
        }

        let expected: Vec<VectorId> = db.search(&[0.1; 4], 10).items.iter().map(|i| i.id).collect();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db = Arc::clone(&db);
                let expected = expected.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let ids: Vec<VectorId> =
                            db.search(&[0.1; 4], 10).items.iter().map(|i| i.id).collect();
                        assert_eq!(ids, expected);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_concurrent_inserts() {
        let db = Arc::new(
            Database::create(Config::new(4, IndexType::Flat, DistanceMetric::L2)).unwrap(),
        );

        let threads = 4u64;
        let per_thread = 50u64;
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || {
                    for i in 0..per_thread {
                        let id = t * per_thread + i;
                        db.insert(VectorRecord::new(id, vec![id as f32; 4])).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(db.size(), (threads * per_thread) as usize);
        for id in 0..threads * per_thread {
            assert!(db.contains(id), "id {} missing", id);
        }
        assert_eq!(db.stats().total_inserts, threads * per_thread);
    }

    #[test]
    fn test_inserts_during_maintenance_survive_swap() {
        let config = Config::new(8, IndexType::Hnsw, DistanceMetric::L2)
            .with_hnsw_params(HnswParams::with_m(8).with_seed(31));
        let db = Arc::new(Database::create(config).unwrap());

        for (i, v) in random_vectors(300, 8, 47).into_iter().enumerate() {
            db.insert(VectorRecord::new(i as u64, v)).unwrap();
        }
        for i in (0..300u64).step_by(3) {
            db.remove(i).unwrap();
        }

        let maintenance = {
            let db = Arc::clone(&db);
            std::thread::spawn(move || {
                for _ in 0..3 {
                    db.optimize().unwrap();
                }
            })
        };

        // Writes racing the protocol must be visible whether a search runs
        // before or after the swap.
        for i in 0..40u64 {
            let id = 10_000 + i;
            let vector: Vec<f32> = (0..8).map(|j| ((id + j) as f32).sin()).collect();
            db.insert(VectorRecord::new(id, vector.clone())).unwrap();

            let result = db.search(&vector, 5);
            assert!(
                result.items.iter().any(|item| item.id == id),
                "freshly inserted id {} missing from top-k",
                id
            );
        }

        maintenance.join().unwrap();

        for i in 0..40u64 {
            assert!(db.contains(10_000 + i));
        }
        assert!(db.search(&[0.0; 8], 10).items.iter().all(|i| i.id % 3 != 0 || i.id >= 10_000));
    }
}

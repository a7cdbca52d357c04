//! Nearest-neighbor index implementations.
//!
//! Three interchangeable index types sit behind the [`Index`] variant:
//!
//! - [`FlatIndex`] - exact brute-force search, O(n) per query
//! - [`HnswIndex`] - approximate search over a multi-layer proximity graph
//! - [`IvfIndex`] - approximate search over k-means clusters
//!
//! The database facade owns one variant selected at construction time and
//! guards it with a single reader-writer lock; the index types themselves
//! are plain data with no internal locking.

pub mod flat;
pub mod hnsw;
pub mod ivf;

pub use flat::FlatIndex;
pub use hnsw::{HnswIndex, HnswParams};
pub use ivf::{IvfIndex, IvfParams};

use std::cmp::Ordering;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use crate::error::Result;
use crate::record::{VectorId, VectorRecord};

/// Predicate applied to candidate ids during search.
pub type IdFilter = Arc<dyn Fn(VectorId) -> bool + Send + Sync>;

/// Per-query tuning options.
///
/// Options that do not apply to the chosen index type are ignored.
#[derive(Clone, Default)]
pub struct SearchParams {
    /// Beam width override for HNSW queries. Ignored when below `k`.
    pub ef_search: Option<usize>,
    /// Number of IVF clusters to probe.
    pub n_probe: Option<usize>,
    /// Candidate filter; ids failing the predicate never appear in results.
    pub filter: Option<IdFilter>,
}

impl SearchParams {
    /// Creates empty parameters (index defaults apply).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the HNSW beam width override. Chainable.
    pub fn with_ef_search(mut self, ef_search: usize) -> Self {
        self.ef_search = Some(ef_search);
        self
    }

    /// Sets the IVF probe count override. Chainable.
    pub fn with_n_probe(mut self, n_probe: usize) -> Self {
        self.n_probe = Some(n_probe);
        self
    }

    /// Sets the candidate filter. Chainable.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(VectorId) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }
}

impl fmt::Debug for SearchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchParams")
            .field("ef_search", &self.ef_search)
            .field("n_probe", &self.n_probe)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// A ranked neighbor produced by an index search.
///
/// Ordered by distance with ties broken by ascending id, so heaps and
/// sorts over neighbors are deterministic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: VectorId,
    pub distance: f32,
}

impl Neighbor {
    pub fn new(id: VectorId, distance: f32) -> Self {
        Self { id, distance }
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Raw output of an index search: ranked neighbors plus the number of
/// candidates whose distance was evaluated.
#[derive(Debug, Clone, Default)]
pub struct IndexSearch {
    pub neighbors: Vec<Neighbor>,
    pub candidates: usize,
}

/// The index variant owned by the database facade.
///
/// Dispatches every operation to the concrete implementation; the
/// HNSW-only surface (cloning for maintenance, compaction) stays on
/// [`HnswIndex`] itself.
#[derive(Debug, Clone)]
pub enum Index {
    Flat(FlatIndex),
    Hnsw(HnswIndex),
    Ivf(IvfIndex),
}

impl Index {
    /// Adds a single vector.
    pub fn add(&mut self, id: VectorId, vector: &[f32]) -> Result<()> {
        match self {
            Index::Flat(index) => index.add(id, vector),
            Index::Hnsw(index) => index.add(id, vector),
            Index::Ivf(index) => index.add(id, vector),
        }
    }

    /// Removes a vector by id.
    pub fn remove(&mut self, id: VectorId) -> Result<()> {
        match self {
            Index::Flat(index) => index.remove(id),
            Index::Hnsw(index) => index.remove(id),
            Index::Ivf(index) => index.remove(id),
        }
    }

    /// Returns true if the id is stored and not removed.
    pub fn contains(&self, id: VectorId) -> bool {
        match self {
            Index::Flat(index) => index.contains(id),
            Index::Hnsw(index) => index.contains(id),
            Index::Ivf(index) => index.contains(id),
        }
    }

    /// Searches for the k nearest neighbors.
    pub fn search(&self, query: &[f32], k: usize, params: &SearchParams) -> IndexSearch {
        let filter = params.filter.as_ref();
        match self {
            Index::Flat(index) => index.search(query, k, filter),
            Index::Hnsw(index) => index.search(query, k, params.ef_search, filter),
            Index::Ivf(index) => index.search(query, k, params.n_probe, filter),
        }
    }

    /// Rebuilds the index from a batch of records, clearing existing data.
    pub fn build(&mut self, records: &[VectorRecord]) -> Result<()> {
        match self {
            Index::Flat(index) => index.build(records),
            Index::Hnsw(index) => index.build(records),
            Index::Ivf(index) => index.build(records),
        }
    }

    /// Number of stored (live) vectors.
    pub fn size(&self) -> usize {
        match self {
            Index::Flat(index) => index.size(),
            Index::Hnsw(index) => index.size(),
            Index::Ivf(index) => index.size(),
        }
    }

    /// Vector dimensionality.
    pub fn dimension(&self) -> usize {
        match self {
            Index::Flat(index) => index.dimension(),
            Index::Hnsw(index) => index.dimension(),
            Index::Ivf(index) => index.dimension(),
        }
    }

    /// Approximate memory footprint in bytes.
    pub fn memory_usage(&self) -> usize {
        match self {
            Index::Flat(index) => index.memory_usage(),
            Index::Hnsw(index) => index.memory_usage(),
            Index::Ivf(index) => index.memory_usage(),
        }
    }

    /// Writes the index blob for this variant.
    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<()> {
        match self {
            Index::Flat(index) => index.serialize(w),
            Index::Hnsw(index) => index.serialize(w),
            Index::Ivf(index) => index.serialize(w),
        }
    }

    /// Replaces this index's contents with the blob read from `r`.
    pub fn deserialize<R: Read>(&mut self, r: &mut R) -> Result<()> {
        match self {
            Index::Flat(index) => index.deserialize(r),
            Index::Hnsw(index) => index.deserialize(r),
            Index::Ivf(index) => index.deserialize(r),
        }
    }
}

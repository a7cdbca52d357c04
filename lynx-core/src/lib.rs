//! # Lynx Core
//!
//! Core library for Lynx — an embeddable vector database.
//!
//! This crate stores f32 vectors keyed by u64 identifiers and serves
//! k-nearest-neighbor queries under a configurable distance metric.
//! Three interchangeable index implementations sit behind one facade.
//!
//! ## Core Types
//!
//! ### Indexes
//!
//! - [`FlatIndex`] - exact brute-force search, O(n) per query
//! - [`HnswIndex`] - approximate search over an HNSW graph, O(log n)
//! - [`IvfIndex`] - approximate search over k-means clusters
//!
//! ### Facade
//!
//! - [`Database`] - thread-safe wrapper: validation, statistics,
//!   persistence, and routing to the index selected by [`Config`]
//!
//! ### Types
//!
//! - [`VectorRecord`] - a vector with its [`VectorId`] and metadata
//! - [`DistanceMetric`] - supported distance functions
//! - [`SearchParams`] - per-query tuning (`ef_search`, `n_probe`, filter)
//! - [`SearchResult`] - ranked hits with timing and candidate counts
//!
//! ## Maintenance
//!
//! HNSW databases support non-blocking compaction via
//! [`Database::optimize`]: the graph is cloned and compacted in the
//! background while a bounded [`WriteLog`] captures concurrent writes
//! for replay before the swap.

pub mod database;
pub mod distance;
pub mod error;
pub mod index;
pub mod kmeans;
pub mod record;
pub mod write_log;

mod storage;

// Re-exports for convenient access
pub use database::{
    Config, Database, DatabaseStats, IndexType, RecordIter, SearchResult, SearchResultItem,
};
pub use distance::{DistanceMetric, cosine_distance, dot_product, l2_distance, l2_distance_squared};
pub use error::{Error, Result};
pub use index::{
    FlatIndex, HnswIndex, HnswParams, IdFilter, Index, IvfIndex, IvfParams, Neighbor, SearchParams,
};
pub use kmeans::{KMeans, KMeansOutput};
pub use record::{VectorId, VectorRecord};
pub use write_log::WriteLog;

/// Re-export commonly used types for convenience.
///
/// # Example
///
/// ```rust
/// use lynx_core::prelude::*;
///
/// let config = Config::new(3, IndexType::Flat, DistanceMetric::Cosine);
/// let db = Database::create(config).unwrap();
/// db.insert(VectorRecord::new(1, vec![1.0, 0.0, 0.0])).unwrap();
/// ```
pub mod prelude {
    pub use crate::{
        Config, Database, DatabaseStats, DistanceMetric, Error, HnswParams, IndexType, IvfParams,
        Result, SearchParams, SearchResult, VectorId, VectorRecord,
    };
}

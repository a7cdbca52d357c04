//! # Lynx
//!
//! **An embeddable vector database with exact and approximate k-NN search.**
//!
//! Lynx stores high-dimensional f32 vectors keyed by 64-bit identifiers
//! and serves k-nearest-neighbor queries in-process:
//!
//! - **Semantic search** — find similar documents, images, or audio
//! - **RAG applications** — retrieval for LLM context
//! - **Recommendations** — content-based filtering with embeddings
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | **Three index types** | Flat (exact), HNSW (graph), IVF (clustered) |
//! | **Distance metrics** | L2, Cosine, DotProduct |
//! | **Filtered search** | Combine similarity with an id predicate |
//! | **Persistence** | Binary save/load of records and index state |
//! | **Non-blocking maintenance** | HNSW compaction with write replay |
//!
//! ## Quick Start
//!
//! ```rust
//! use lynx::prelude::*;
//!
//! let config = Config::new(4, IndexType::Flat, DistanceMetric::L2);
//! let db = Database::create(config).unwrap();
//!
//! db.insert(VectorRecord::new(1, vec![1.0, 0.0, 0.0, 0.0]).with_metadata("a")).unwrap();
//! db.insert(VectorRecord::new(2, vec![0.0, 1.0, 0.0, 0.0])).unwrap();
//! db.insert(VectorRecord::new(3, vec![0.9, 0.1, 0.0, 0.0])).unwrap();
//!
//! let result = db.search(&[1.0, 0.0, 0.0, 0.0], 2);
//! assert_eq!(result.items[0].id, 1);
//! assert_eq!(result.items[1].id, 3);
//! ```
//!
//! ## HNSW for Large Datasets
//!
//! ```rust
//! use lynx::prelude::*;
//!
//! let config = Config::new(64, IndexType::Hnsw, DistanceMetric::Cosine)
//!     .with_hnsw_params(HnswParams::with_m(16).with_seed(1));
//! let db = Database::create(config).unwrap();
//!
//! for i in 0..500u64 {
//!     let v: Vec<f32> = (0..64).map(|j| ((i * 64 + j) as f32).sin()).collect();
//!     db.insert(VectorRecord::new(i, v)).unwrap();
//! }
//!
//! let query: Vec<f32> = (0..64).map(|j| (j as f32).cos()).collect();
//! let result = db.search(&query, 10);
//! assert_eq!(result.items.len(), 10);
//! ```
//!
//! ## IVF with Bulk Build
//!
//! IVF needs centroids before single inserts work; `batch_insert` on an
//! empty database takes the bulk-build path:
//!
//! ```rust
//! use lynx::prelude::*;
//!
//! let config = Config::new(2, IndexType::Ivf, DistanceMetric::L2)
//!     .with_ivf_params(IvfParams::new(2).with_seed(7));
//! let db = Database::create(config).unwrap();
//!
//! db.batch_insert(vec![
//!     VectorRecord::new(1, vec![0.0, 0.0]),
//!     VectorRecord::new(2, vec![0.0, 1.0]),
//!     VectorRecord::new(3, vec![10.0, 10.0]),
//!     VectorRecord::new(4, vec![10.0, 11.0]),
//! ]).unwrap();
//!
//! let params = SearchParams::new().with_n_probe(1);
//! let result = db.search_with_params(&[0.1, 0.1], 2, &params);
//! assert_eq!(result.items.len(), 2);
//! ```
//!
//! ## Persistence
//!
//! ```no_run
//! use lynx::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = Config::new(128, IndexType::Hnsw, DistanceMetric::Cosine)
//!         .with_data_path("./lynx-data");
//!     let db = Database::create(config.clone())?;
//!     db.insert(VectorRecord::new(1, vec![0.1; 128]))?;
//!     db.save()?;
//!
//!     // Later, in a fresh process:
//!     let restored = Database::create(config)?;
//!     restored.load()?;
//!     assert_eq!(restored.size(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! Lynx is organized into two crates:
//!
//! - **`lynx-core`** — the indexing core and facade
//! - **`lynx`** — this crate, re-exporting everything
//!
//! ## Thread Safety
//!
//! [`Database`] is thread-safe: reads run concurrently under shared
//! locks, writes are serialized. The bare index types ([`FlatIndex`],
//! [`HnswIndex`], [`IvfIndex`]) are plain data; synchronize externally
//! when using them directly.
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`](Result) with the
//! [`Error`] enum; invalid queries yield an empty [`SearchResult`]
//! instead of an error so batch callers need no special casing.

// Re-export everything from core
pub use lynx_core::*;

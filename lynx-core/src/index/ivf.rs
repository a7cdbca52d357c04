//! IVF (Inverted File) index.
//!
//! Partitions the vector space into `n_clusters` k-means cells. Each
//! cell keeps a centroid and an inverted list of the vectors assigned to
//! it; queries scan only the `n_probe` nearest cells. `n_probe = 1` is
//! fastest, `n_probe = n_clusters` degenerates to brute force.

use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap};
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::index::{IdFilter, IndexSearch, Neighbor};
use crate::kmeans::KMeans;
use crate::record::{VectorId, VectorRecord};
use crate::storage::{
    check_header, read_f32, read_u32, read_u64, read_vector, write_f32, write_u32, write_u64,
    write_vector, FORMAT_VERSION,
};

/// "IVFX" in hex.
const MAGIC: u32 = 0x49564658;

/// Tuning parameters for the IVF index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IvfParams {
    /// Number of k-means cells.
    pub n_clusters: usize,
    /// Cells inspected per query; must not exceed `n_clusters`.
    pub n_probe: usize,
    /// Lloyd iteration cap for clustering.
    pub kmeans_max_iters: usize,
    /// Convergence tolerance for clustering.
    pub kmeans_tolerance: f32,
    /// Seed for k-means++ initialization.
    pub random_seed: u64,
}

impl Default for IvfParams {
    fn default() -> Self {
        Self::new(16)
    }
}

impl IvfParams {
    /// Creates params for `n_clusters` cells with the default probe count
    /// of `min(8, n_clusters)`.
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            n_probe: n_clusters.min(8),
            kmeans_max_iters: 25,
            kmeans_tolerance: 1e-4,
            random_seed: 42,
        }
    }

    /// Sets the probe count. Chainable.
    pub fn with_n_probe(mut self, n_probe: usize) -> Self {
        self.n_probe = n_probe;
        self
    }

    /// Sets the clustering seed. Chainable.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }
}

/// Inverted list for one cell: ids and vectors are parallel-indexed.
#[derive(Debug, Clone, Default)]
struct InvertedList {
    ids: Vec<VectorId>,
    vectors: Vec<Vec<f32>>,
}

impl InvertedList {
    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// IVF index for approximate nearest neighbor search.
///
/// Vectors cannot be added until centroids exist; call
/// [`build`](Self::build) first (or go through the database facade,
/// whose batch insert does this).
#[derive(Debug, Clone)]
pub struct IvfIndex {
    dimension: usize,
    metric: DistanceMetric,
    params: IvfParams,
    centroids: Vec<Vec<f32>>,
    lists: Vec<InvertedList>,
    id_to_cluster: HashMap<VectorId, usize>,
}

impl IvfIndex {
    /// Creates an empty IVF index with uninitialized centroids.
    pub fn new(dimension: usize, metric: DistanceMetric, params: IvfParams) -> Self {
        Self {
            dimension,
            metric,
            params,
            centroids: Vec::new(),
            lists: Vec::new(),
            id_to_cluster: HashMap::new(),
        }
    }

    /// Number of stored vectors.
    pub fn size(&self) -> usize {
        self.id_to_cluster.len()
    }

    /// Vector dimensionality.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The configured parameters.
    pub fn params(&self) -> &IvfParams {
        &self.params
    }

    /// Returns true once k-means centroids have been computed.
    pub fn has_centroids(&self) -> bool {
        !self.centroids.is_empty()
    }

    /// Returns true if the id is stored.
    pub fn contains(&self, id: VectorId) -> bool {
        self.id_to_cluster.contains_key(&id)
    }

    /// Runs k-means over the batch and fills the inverted lists.
    ///
    /// Clears any existing contents.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if fewer records than clusters are
    /// supplied; [`Error::DimensionMismatch`] on a bad vector;
    /// [`Error::InvalidState`] on a duplicate id within the batch.
    pub fn build(&mut self, records: &[VectorRecord]) -> Result<()> {
        if records.len() < self.params.n_clusters {
            return Err(Error::InvalidArgument(format!(
                "need at least {} records to build {} clusters, got {}",
                self.params.n_clusters,
                self.params.n_clusters,
                records.len()
            )));
        }
        for record in records {
            if record.vector.len() != self.dimension {
                return Err(Error::DimensionMismatch {
                    expected: self.dimension,
                    got: record.vector.len(),
                });
            }
        }

        let points: Vec<Vec<f32>> = records.iter().map(|r| r.vector.clone()).collect();
        let clustering = KMeans::new(
            self.params.n_clusters,
            self.params.kmeans_max_iters,
            self.params.kmeans_tolerance,
            self.params.random_seed,
        )
        .run(&points)?;

        let mut lists: Vec<InvertedList> = vec![InvertedList::default(); self.params.n_clusters];
        let mut id_to_cluster = HashMap::with_capacity(records.len());

        for (record, &cluster) in records.iter().zip(clustering.assignments.iter()) {
            if id_to_cluster.insert(record.id, cluster).is_some() {
                return Err(Error::InvalidState(format!(
                    "duplicate vector id: {}",
                    record.id
                )));
            }
            lists[cluster].ids.push(record.id);
            lists[cluster].vectors.push(record.vector.clone());
        }

        debug!(
            records = records.len(),
            clusters = self.params.n_clusters,
            "ivf index built"
        );

        self.centroids = clustering.centroids;
        self.lists = lists;
        self.id_to_cluster = id_to_cluster;
        Ok(())
    }

    /// Appends a vector to the inverted list of its nearest centroid.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] before centroids exist or on a duplicate
    /// id; [`Error::DimensionMismatch`] on length mismatch.
    pub fn add(&mut self, id: VectorId, vector: &[f32]) -> Result<()> {
        if !self.has_centroids() {
            return Err(Error::InvalidState(
                "ivf index has no centroids; build it first".into(),
            ));
        }
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }

        let cluster = self.nearest_centroid(vector);
        match self.id_to_cluster.entry(id) {
            Entry::Occupied(_) => Err(Error::InvalidState(format!("duplicate vector id: {}", id))),
            Entry::Vacant(slot) => {
                slot.insert(cluster);
                self.lists[cluster].ids.push(id);
                self.lists[cluster].vectors.push(vector.to_vec());
                Ok(())
            }
        }
    }

    /// Removes a vector, swap-removing from both parallel sequences.
    pub fn remove(&mut self, id: VectorId) -> Result<()> {
        let cluster = *self
            .id_to_cluster
            .get(&id)
            .ok_or(Error::VectorNotFound(id))?;

        let list = &mut self.lists[cluster];
        let position = list
            .ids
            .iter()
            .position(|&stored| stored == id)
            .ok_or_else(|| {
                Error::IndexCorrupted(format!("id {} missing from its inverted list", id))
            })?;

        list.ids.swap_remove(position);
        list.vectors.swap_remove(position);
        self.id_to_cluster.remove(&id);
        Ok(())
    }

    fn nearest_centroid(&self, vector: &[f32]) -> usize {
        let mut best = 0usize;
        let mut best_dist = f32::MAX;
        for (cluster, centroid) in self.centroids.iter().enumerate() {
            let d = self.metric.compute_fast(vector, centroid);
            if d < best_dist {
                best_dist = d;
                best = cluster;
            }
        }
        best
    }

    /// Scans the `n_probe` nearest cells for the k nearest neighbors.
    ///
    /// The filter is applied before any distance computation. Results are
    /// ascending by distance with ties broken by ascending id.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        n_probe_override: Option<usize>,
        filter: Option<&IdFilter>,
    ) -> IndexSearch {
        if k == 0 || query.len() != self.dimension || !self.has_centroids() {
            return IndexSearch::default();
        }

        let n_probe = n_probe_override
            .unwrap_or(self.params.n_probe)
            .clamp(1, self.params.n_clusters);

        // Rank cells by centroid distance, nearest first.
        let mut ranked: Vec<Neighbor> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(cluster, centroid)| {
                Neighbor::new(cluster as u64, self.metric.compute_fast(query, centroid))
            })
            .collect();
        ranked.sort_unstable();

        let mut heap: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(k + 1);
        let mut candidates = 0usize;

        for probe in ranked.iter().take(n_probe) {
            let list = &self.lists[probe.id as usize];
            for (&id, vector) in list.ids.iter().zip(list.vectors.iter()) {
                if let Some(filter) = filter {
                    if !filter(id) {
                        continue;
                    }
                }
                candidates += 1;

                let neighbor = Neighbor::new(id, self.metric.compute_fast(query, vector));
                if heap.len() < k {
                    heap.push(neighbor);
                } else if neighbor < *heap.peek().expect("heap is non-empty") {
                    heap.push(neighbor);
                    heap.pop();
                }
            }
        }

        let mut neighbors = heap.into_sorted_vec();
        for neighbor in &mut neighbors {
            neighbor.distance = self.metric.finalize(neighbor.distance);
        }

        IndexSearch {
            neighbors,
            candidates,
        }
    }

    /// Approximate memory footprint: centroids, vectors, ids, mapping.
    pub fn memory_usage(&self) -> usize {
        let centroid_bytes = self.centroids.len() * 4 * self.dimension;
        let vector_bytes = self.size() * (8 + 4 * self.dimension);
        let mapping_bytes = self.size() * 16;
        centroid_bytes + vector_bytes + mapping_bytes
    }

    /// Writes the "IVFX" blob: header, params, centroids, inverted lists.
    ///
    /// An unbuilt index stores zero-dimension centroid stubs so the cell
    /// count in the blob always matches `n_clusters`.
    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<()> {
        write_u32(w, MAGIC)?;
        write_u32(w, FORMAT_VERSION)?;

        write_u32(w, self.params.n_clusters as u32)?;
        write_u32(w, self.params.n_probe as u32)?;
        write_u32(w, self.params.kmeans_max_iters as u32)?;
        write_f32(w, self.params.kmeans_tolerance)?;
        write_u64(w, self.params.random_seed)?;

        for cluster in 0..self.params.n_clusters {
            match self.centroids.get(cluster) {
                Some(centroid) => write_vector(w, centroid)?,
                None => write_u32(w, 0)?,
            }
        }

        for cluster in 0..self.params.n_clusters {
            let empty = InvertedList::default();
            let list = self.lists.get(cluster).unwrap_or(&empty);
            write_u64(w, list.len() as u64)?;
            for (&id, vector) in list.ids.iter().zip(list.vectors.iter()) {
                write_u64(w, id)?;
                write_vector(w, vector)?;
            }
        }

        Ok(())
    }

    /// Replaces the contents with the blob read from `r`, rebuilding the
    /// id-to-cluster mapping and validating shapes.
    pub fn deserialize<R: Read>(&mut self, r: &mut R) -> Result<()> {
        check_header(r, MAGIC, "ivf index")?;

        let n_clusters = read_u32(r)? as usize;
        let n_probe = read_u32(r)? as usize;
        let kmeans_max_iters = read_u32(r)? as usize;
        let kmeans_tolerance = read_f32(r)?;
        let random_seed = read_u64(r)?;

        if n_clusters == 0 || n_probe > n_clusters {
            return Err(Error::IndexCorrupted(format!(
                "ivf index: invalid cluster shape ({} clusters, {} probes)",
                n_clusters, n_probe
            )));
        }

        let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(n_clusters);
        let mut initialized = true;
        for _ in 0..n_clusters {
            let centroid = read_vector(r, None)?;
            if centroid.is_empty() {
                initialized = false;
            } else if centroid.len() != self.dimension {
                return Err(Error::IndexCorrupted(format!(
                    "ivf index: centroid has dimension {}, expected {}",
                    centroid.len(),
                    self.dimension
                )));
            }
            centroids.push(centroid);
        }
        if !initialized && centroids.iter().any(|c| !c.is_empty()) {
            return Err(Error::IndexCorrupted(
                "ivf index: partially initialized centroids".into(),
            ));
        }

        let mut lists: Vec<InvertedList> = Vec::with_capacity(n_clusters);
        let mut id_to_cluster = HashMap::new();
        for cluster in 0..n_clusters {
            let len = read_u64(r)? as usize;
            if len > 0 && !initialized {
                return Err(Error::IndexCorrupted(
                    "ivf index: inverted list without centroids".into(),
                ));
            }
            let mut list = InvertedList::default();
            for _ in 0..len {
                let id = read_u64(r)?;
                let vector = read_vector(r, Some(self.dimension))?;
                if id_to_cluster.insert(id, cluster).is_some() {
                    return Err(Error::IndexCorrupted(format!(
                        "ivf index: duplicate id {}",
                        id
                    )));
                }
                list.ids.push(id);
                list.vectors.push(vector);
            }
            lists.push(list);
        }

        self.params = IvfParams {
            n_clusters,
            n_probe,
            kmeans_max_iters,
            kmeans_tolerance,
            random_seed,
        };
        self.centroids = if initialized { centroids } else { Vec::new() };
        self.lists = lists;
        self.id_to_cluster = id_to_cluster;
        Ok(())
    }
}

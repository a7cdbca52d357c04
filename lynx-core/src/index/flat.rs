//! Flat (brute-force) index for exact nearest neighbor search.
//!
//! Computes distances to every stored vector during search. O(n) per
//! query, but exact, and the baseline the approximate indices are
//! measured against.

use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap};
use std::io::{Read, Write};

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::index::{IdFilter, IndexSearch, Neighbor};
use crate::record::{VectorId, VectorRecord};
use crate::storage::{
    check_header, read_u64, read_vector, write_u32, write_u64, write_vector, FORMAT_VERSION,
};

/// "FLAT" in hex.
const MAGIC: u32 = 0x464C4154;

/// Exact brute-force index over an id-to-vector map.
///
/// # Example
///
/// ```
/// use lynx_core::{DistanceMetric, FlatIndex};
///
/// let mut index = FlatIndex::new(3, DistanceMetric::L2);
/// index.add(1, &[1.0, 0.0, 0.0]).unwrap();
/// index.add(2, &[0.0, 1.0, 0.0]).unwrap();
///
/// let result = index.search(&[0.9, 0.1, 0.0], 1, None);
/// assert_eq!(result.neighbors[0].id, 1);
/// ```
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    metric: DistanceMetric,
    vectors: HashMap<VectorId, Vec<f32>>,
}

impl FlatIndex {
    /// Creates an empty flat index.
    pub fn new(dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            metric,
            vectors: HashMap::new(),
        }
    }

    /// Adds a vector.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the vector length differs from the
    /// index dimension; [`Error::InvalidState`] if the id already exists.
    pub fn add(&mut self, id: VectorId, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }

        match self.vectors.entry(id) {
            Entry::Occupied(_) => Err(Error::InvalidState(format!("duplicate vector id: {}", id))),
            Entry::Vacant(slot) => {
                slot.insert(vector.to_vec());
                Ok(())
            }
        }
    }

    /// Removes a vector by id.
    pub fn remove(&mut self, id: VectorId) -> Result<()> {
        self.vectors
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::VectorNotFound(id))
    }

    /// Returns true if the id is stored.
    pub fn contains(&self, id: VectorId) -> bool {
        self.vectors.contains_key(&id)
    }

    /// Exact k-nearest-neighbor scan.
    ///
    /// The filter is applied before any distance computation. Results are
    /// ascending by distance with ties broken by ascending id.
    pub fn search(&self, query: &[f32], k: usize, filter: Option<&IdFilter>) -> IndexSearch {
        if k == 0 || query.len() != self.dimension || self.vectors.is_empty() {
            return IndexSearch::default();
        }

        // Bounded max-heap of size k; the root is the current worst hit.
        let mut heap: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(k + 1);
        let mut candidates = 0usize;

        for (&id, vector) in &self.vectors {
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

        let mut neighbors = heap.into_sorted_vec();
        for neighbor in &mut neighbors {
            neighbor.distance = self.metric.finalize(neighbor.distance);
        }

        IndexSearch {
            neighbors,
            candidates,
        }
    }

    /// Clears the index and adds every record in the batch.
    pub fn build(&mut self, records: &[VectorRecord]) -> Result<()> {
        self.vectors.clear();
        for record in records {
            self.add(record.id, &record.vector)?;
        }
        Ok(())
    }

    /// Number of stored vectors.
    pub fn size(&self) -> usize {
        self.vectors.len()
    }

    /// Vector dimensionality.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Approximate memory footprint: one id plus one f32 row per vector.
    pub fn memory_usage(&self) -> usize {
        self.vectors.len() * (8 + 4 * self.dimension)
    }

    /// Writes the "FLAT" blob: header, count, then id/vector pairs.
    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<()> {
        write_u32(w, MAGIC)?;
        write_u32(w, FORMAT_VERSION)?;
        write_u64(w, self.vectors.len() as u64)?;

        // Stable output for a given contents.
        let mut ids: Vec<VectorId> = self.vectors.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            write_u64(w, id)?;
            write_vector(w, &self.vectors[&id])?;
        }
        Ok(())
    }

    /// Replaces the contents with the blob read from `r`.
    pub fn deserialize<R: Read>(&mut self, r: &mut R) -> Result<()> {
        check_header(r, MAGIC, "flat index")?;

        let count = read_u64(r)?;
        let mut vectors = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let id = read_u64(r)?;
            let vector = read_vector(r, Some(self.dimension))?;
            if vectors.insert(id, vector).is_some() {
                return Err(Error::IndexCorrupted(format!(
                    "flat index: duplicate id {}",
                    id
                )));
            }
        }

        self.vectors = vectors;
        Ok(())
    }
}

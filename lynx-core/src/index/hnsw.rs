//! HNSW (Hierarchical Navigable Small World) graph index.
//!
//! A multi-layer proximity graph: layer 0 contains every node, higher
//! layers are geometrically sparser. Search greedily descends from the
//! top layer, then runs a beam search at layer 0.
//!
//! Removal is tombstone-based: removed nodes stay in the graph for
//! connectivity until [`HnswIndex::compact`] rebuilds it, but they never
//! appear in results.
//!
//! # References
//!
//! - Malkov & Yashunin (2018): "Efficient and robust approximate nearest
//!   neighbor search using HNSW graphs"

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::io::{Read, Write};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::index::{IdFilter, IndexSearch, Neighbor};
use crate::record::{VectorId, VectorRecord};
use crate::storage::{
    check_header, read_f32, read_u32, read_u64, read_vector, write_f32, write_u32, write_u64,
    write_vector, FORMAT_VERSION,
};

/// "HNSW" in hex.
const MAGIC: u32 = 0x484E5357;

/// Tuning parameters for the HNSW graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Graph degree at layers above 0. Higher = better recall, more memory.
    pub m: usize,
    /// Degree cap at layer 0, usually `2 * m`.
    pub m_max_0: usize,
    /// Beam width during construction.
    pub ef_construction: usize,
    /// Default beam width during search; overridable per query.
    pub ef_search: usize,
    /// Seed for level assignment. Fixed seeds give reproducible graphs.
    pub random_seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            m_max_0: 32,
            ef_construction: 200,
            ef_search: 50,
            random_seed: 42,
        }
    }
}

impl HnswParams {
    /// Creates params with the given degree; `m_max_0` follows as `2 * m`.
    pub fn with_m(m: usize) -> Self {
        Self {
            m,
            m_max_0: m * 2,
            ..Default::default()
        }
    }

    /// Sets the level-assignment seed. Chainable.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }
}

/// A node in the graph. Neighbor lists hold ids, never pointers; one
/// duplicate-free list per level `0..=top_level`.
#[derive(Debug, Clone)]
struct Node {
    vector: Vec<f32>,
    top_level: usize,
    neighbors: Vec<Vec<VectorId>>,
}

impl Node {
    fn new(vector: Vec<f32>, top_level: usize) -> Self {
        Self {
            vector,
            top_level,
            neighbors: vec![Vec::new(); top_level + 1],
        }
    }
}

/// HNSW index for approximate nearest neighbor search.
///
/// # Example
///
/// ```
/// use lynx_core::{DistanceMetric, HnswIndex, HnswParams};
///
/// let mut index = HnswIndex::new(3, DistanceMetric::L2, HnswParams::default());
/// index.add(1, &[1.0, 0.0, 0.0]).unwrap();
/// index.add(2, &[0.0, 1.0, 0.0]).unwrap();
///
/// let result = index.search(&[0.9, 0.1, 0.0], 1, None, None);
/// assert_eq!(result.neighbors[0].id, 1);
/// ```
#[derive(Debug, Clone)]
pub struct HnswIndex {
    dimension: usize,
    metric: DistanceMetric,
    params: HnswParams,
    /// Level-assignment multiplier, `1 / ln(m)`.
    ml: f64,
    entry_point: Option<VectorId>,
    max_level: usize,
    nodes: HashMap<VectorId, Node>,
    tombstones: HashSet<VectorId>,
    rng: StdRng,
}

impl HnswIndex {
    /// Creates an empty HNSW index.
    pub fn new(dimension: usize, metric: DistanceMetric, params: HnswParams) -> Self {
        debug_assert!(params.m >= 2, "m must be at least 2");
        let ml = 1.0 / (params.m as f64).ln();
        let rng = StdRng::seed_from_u64(params.random_seed);
        Self {
            dimension,
            metric,
            params,
            ml,
            entry_point: None,
            max_level: 0,
            nodes: HashMap::new(),
            tombstones: HashSet::new(),
            rng,
        }
    }

    /// Number of live (non-tombstoned) vectors.
    pub fn size(&self) -> usize {
        self.nodes.len() - self.tombstones.len()
    }

    /// Vector dimensionality.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The configured parameters.
    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    /// Number of tombstoned nodes awaiting compaction.
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    /// Returns true if the id is stored and not tombstoned.
    pub fn contains(&self, id: VectorId) -> bool {
        self.nodes.contains_key(&id) && !self.tombstones.contains(&id)
    }

    /// Draws a geometric level: `floor(-ln(u) * ml)` for `u ~ (0, 1]`.
    fn random_level(&mut self) -> usize {
        let u: f64 = 1.0 - self.rng.gen::<f64>();
        (-u.ln() * self.ml).floor() as usize
    }

    fn layer_cap(&self, level: usize) -> usize {
        if level == 0 {
            self.params.m_max_0
        } else {
            self.params.m
        }
    }

    #[inline]
    fn fast_distance(&self, query: &[f32], id: VectorId) -> f32 {
        self.metric.compute_fast(query, &self.nodes[&id].vector)
    }

    /// True when the id may enter a result set.
    #[inline]
    fn accepts(&self, id: VectorId, filter: Option<&IdFilter>) -> bool {
        !self.tombstones.contains(&id) && filter.map_or(true, |f| f(id))
    }

    /// Adds a vector to the graph.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] on length mismatch;
    /// [`Error::InvalidState`] if the id is already live.
    pub fn add(&mut self, id: VectorId, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }

        if self.tombstones.contains(&id) {
            // The id is being reused (write-log replay); drop the stale node.
            self.detach(id);
        } else if self.nodes.contains_key(&id) {
            return Err(Error::InvalidState(format!("duplicate vector id: {}", id)));
        }

        let top_level = self.random_level();

        if self.nodes.is_empty() {
            self.nodes.insert(id, Node::new(vector.to_vec(), top_level));
            self.entry_point = Some(id);
            self.max_level = top_level;
            return Ok(());
        }

        let entry = self
            .entry_point
            .expect("non-empty graph has an entry point");

        // Greedy route down through the layers above the new node's level.
        let mut ep = entry;
        for level in (top_level + 1..=self.max_level).rev() {
            ep = self.greedy_descend(vector, ep, level);
        }

        self.nodes.insert(id, Node::new(vector.to_vec(), top_level));

        // Beam-search each layer from min(max_level, top_level) down to 0,
        // connecting the new node as we go.
        let mut entry_points = vec![ep];
        for level in (0..=top_level.min(self.max_level)).rev() {
            let (candidates, _) = self.search_layer(
                vector,
                &entry_points,
                self.params.ef_construction,
                level,
                None,
            );

            let cap = self.layer_cap(level);
            let selected = self.select_neighbors(&candidates, cap);

            self.nodes
                .get_mut(&id)
                .expect("node was just inserted")
                .neighbors[level] = selected.clone();

            for &neighbor_id in &selected {
                let list = &mut self
                    .nodes
                    .get_mut(&neighbor_id)
                    .expect("selected neighbor exists")
                    .neighbors[level];
                if !list.contains(&id) {
                    list.push(id);
                }
                if self.nodes[&neighbor_id].neighbors[level].len() > cap {
                    self.prune_neighbors(neighbor_id, level, cap);
                }
            }

            if !candidates.is_empty() {
                entry_points = candidates.iter().map(|n| n.id).collect();
            }
        }

        if top_level > self.max_level {
            self.entry_point = Some(id);
            self.max_level = top_level;
        }

        Ok(())
    }

    /// Follows the single closest neighbor at a layer until a local
    /// minimum is reached. Tombstoned nodes still route.
    fn greedy_descend(&self, query: &[f32], entry: VectorId, level: usize) -> VectorId {
        let mut current = entry;
        let mut current_dist = self.fast_distance(query, current);

        loop {
            let mut changed = false;
            let node = &self.nodes[&current];

            if level < node.neighbors.len() {
                for &next in &node.neighbors[level] {
                    let d = self.fast_distance(query, next);
                    if d < current_dist {
                        current = next;
                        current_dist = d;
                        changed = true;
                    }
                }
            }

            if !changed {
                return current;
            }
        }
    }

    /// Best-first beam search at one layer.
    ///
    /// `candidates` is a min-heap driving expansion; `results` is a
    /// max-heap capped at `ef` holding the best admissible hits.
    /// Tombstoned and filtered-out nodes are traversed but never enter
    /// `results`. Returns hits ascending plus the visited count.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[VectorId],
        ef: usize,
        level: usize,
        filter: Option<&IdFilter>,
    ) -> (Vec<Neighbor>, usize) {
        let mut visited: HashSet<VectorId> = HashSet::new();
        let mut candidates: BinaryHeap<Reverse<Neighbor>> = BinaryHeap::new();
        let mut results: BinaryHeap<Neighbor> = BinaryHeap::new();

        for &ep in entry_points {
            if !visited.insert(ep) {
                continue;
            }
            let neighbor = Neighbor::new(ep, self.fast_distance(query, ep));
            candidates.push(Reverse(neighbor));
            if self.accepts(ep, filter) {
                results.push(neighbor);
            }
        }

        while let Some(Reverse(closest)) = candidates.pop() {
            if results.len() >= ef {
                if let Some(worst) = results.peek() {
                    if closest.distance > worst.distance {
                        break;
                    }
                }
            }

            let node = &self.nodes[&closest.id];
            if level >= node.neighbors.len() {
                continue;
            }

            for &next in &node.neighbors[level] {
                if !visited.insert(next) {
                    continue;
                }

                let neighbor = Neighbor::new(next, self.fast_distance(query, next));
                let admit = results.len() < ef
                    || results.peek().map_or(true, |worst| neighbor < *worst);

                if admit {
                    candidates.push(Reverse(neighbor));
                    if self.accepts(next, filter) {
                        results.push(neighbor);
                        while results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        (results.into_sorted_vec(), visited.len())
    }

    /// Diversity heuristic: walking candidates in ascending distance to
    /// the query, accept `c` only if it is closer to the query than to
    /// every already-accepted neighbor. Stops at `cap`.
    fn select_neighbors(&self, candidates: &[Neighbor], cap: usize) -> Vec<VectorId> {
        let mut selected: Vec<VectorId> = Vec::with_capacity(cap);

        for candidate in candidates {
            if selected.len() >= cap {
                break;
            }
            let vector = &self.nodes[&candidate.id].vector;
            let diverse = selected.iter().all(|&accepted| {
                candidate.distance
                    < self
                        .metric
                        .compute_fast(vector, &self.nodes[&accepted].vector)
            });
            if diverse {
                selected.push(candidate.id);
            }
        }

        selected
    }

    /// Re-selects a node's neighbor list down to the layer cap using the
    /// same diversity heuristic, with the node itself as the query.
    fn prune_neighbors(&mut self, node_id: VectorId, level: usize, cap: usize) {
        let vector = self.nodes[&node_id].vector.clone();
        let mut candidates: Vec<Neighbor> = self.nodes[&node_id].neighbors[level]
            .iter()
            .map(|&id| Neighbor::new(id, self.metric.compute_fast(&vector, &self.nodes[&id].vector)))
            .collect();
        candidates.sort_unstable();

        let selected = self.select_neighbors(&candidates, cap);
        self.nodes
            .get_mut(&node_id)
            .expect("pruned node exists")
            .neighbors[level] = selected;
    }

    /// Searches for the k nearest live neighbors.
    ///
    /// `ef_override` replaces the configured beam width when at least `k`;
    /// with a filter present the beam is widened to `max(ef, 8k)` so a
    /// selective filter can still fill the result set.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_override: Option<usize>,
        filter: Option<&IdFilter>,
    ) -> IndexSearch {
        if k == 0 || query.len() != self.dimension || self.size() == 0 {
            return IndexSearch::default();
        }

        let mut ef = ef_override.unwrap_or(self.params.ef_search).max(k);
        if filter.is_some() {
            ef = ef.max(k.saturating_mul(8));
        }

        let entry = self
            .entry_point
            .expect("non-empty graph has an entry point");

        let mut ep = entry;
        for level in (1..=self.max_level).rev() {
            ep = self.greedy_descend(query, ep, level);
        }

        let (mut neighbors, visited) = self.search_layer(query, &[ep], ef, 0, filter);
        neighbors.truncate(k);
        for neighbor in &mut neighbors {
            neighbor.distance = self.metric.finalize(neighbor.distance);
        }

        IndexSearch {
            neighbors,
            candidates: visited,
        }
    }

    /// Tombstones a vector. The node stays in the graph for routing until
    /// the next [`compact`](Self::compact).
    pub fn remove(&mut self, id: VectorId) -> Result<()> {
        if !self.contains(id) {
            return Err(Error::VectorNotFound(id));
        }
        self.tombstones.insert(id);
        Ok(())
    }

    /// Physically removes a node and every edge referencing it.
    ///
    /// Pruning can leave asymmetric edges, so the whole graph is swept.
    fn detach(&mut self, id: VectorId) {
        self.tombstones.remove(&id);
        if self.nodes.remove(&id).is_none() {
            return;
        }

        for node in self.nodes.values_mut() {
            for list in &mut node.neighbors {
                list.retain(|&other| other != id);
            }
        }

        if self.entry_point == Some(id) {
            self.max_level = self.nodes.values().map(|n| n.top_level).max().unwrap_or(0);
            self.entry_point = self
                .nodes
                .iter()
                .filter(|(_, n)| n.top_level == self.max_level)
                .map(|(&id, _)| id)
                .min();
        }
    }

    /// Rebuilds the graph from scratch with only live nodes, purging
    /// tombstones. Deterministic: nodes are re-inserted in id order with
    /// a freshly seeded level generator.
    pub fn compact(&mut self) {
        let mut fresh = HnswIndex::new(self.dimension, self.metric, self.params);

        let mut ids: Vec<VectorId> = self
            .nodes
            .keys()
            .filter(|id| !self.tombstones.contains(id))
            .copied()
            .collect();
        ids.sort_unstable();

        for id in ids {
            fresh
                .add(id, &self.nodes[&id].vector)
                .expect("live nodes re-insert cleanly");
        }

        *self = fresh;
    }

    /// Clears the graph and adds every record in the batch.
    pub fn build(&mut self, records: &[VectorRecord]) -> Result<()> {
        *self = HnswIndex::new(self.dimension, self.metric, self.params);
        for record in records {
            self.add(record.id, &record.vector)?;
        }
        Ok(())
    }

    /// Approximate memory footprint: vectors, edges, and tombstones.
    pub fn memory_usage(&self) -> usize {
        let edges: usize = self
            .nodes
            .values()
            .map(|n| n.neighbors.iter().map(Vec::len).sum::<usize>())
            .sum();
        self.nodes.len() * (8 + 4 * self.dimension) + edges * 8 + self.tombstones.len() * 8
    }

    /// Writes the "HNSW" blob: header, params, entry point, nodes with
    /// per-level neighbor lists, then the tombstone set.
    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<()> {
        write_u32(w, MAGIC)?;
        write_u32(w, FORMAT_VERSION)?;

        write_u32(w, self.params.m as u32)?;
        write_u32(w, self.params.m_max_0 as u32)?;
        write_u32(w, self.params.ef_construction as u32)?;
        write_u32(w, self.params.ef_search as u32)?;
        write_f32(w, self.ml as f32)?;
        write_u64(w, self.params.random_seed)?;

        write_u64(w, self.nodes.len() as u64)?;
        write_u64(w, self.entry_point.unwrap_or(u64::MAX))?;

        let mut ids: Vec<VectorId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let node = &self.nodes[&id];
            write_u64(w, id)?;
            write_vector(w, &node.vector)?;
            write_u32(w, node.top_level as u32)?;
            for list in &node.neighbors {
                write_u32(w, list.len() as u32)?;
                for &neighbor in list {
                    write_u64(w, neighbor)?;
                }
            }
        }

        let mut tombstones: Vec<VectorId> = self.tombstones.iter().copied().collect();
        tombstones.sort_unstable();
        write_u64(w, tombstones.len() as u64)?;
        for id in tombstones {
            write_u64(w, id)?;
        }

        Ok(())
    }

    /// Replaces the contents with the blob read from `r`, validating the
    /// graph shape (edge endpoints, entry point, tombstone membership).
    pub fn deserialize<R: Read>(&mut self, r: &mut R) -> Result<()> {
        check_header(r, MAGIC, "hnsw index")?;

        let m = read_u32(r)? as usize;
        let m_max_0 = read_u32(r)? as usize;
        let ef_construction = read_u32(r)? as usize;
        let ef_search = read_u32(r)? as usize;
        let ml = read_f32(r)? as f64;
        let random_seed = read_u64(r)?;

        if m < 2 {
            return Err(Error::IndexCorrupted(format!("hnsw index: m = {}", m)));
        }

        let node_count = read_u64(r)?;
        let entry_raw = read_u64(r)?;

        let mut nodes: HashMap<VectorId, Node> = HashMap::with_capacity(node_count as usize);
        for _ in 0..node_count {
            let id = read_u64(r)?;
            let vector = read_vector(r, Some(self.dimension))?;
            let top_level = read_u32(r)? as usize;

            let mut neighbors = Vec::with_capacity(top_level + 1);
            for _ in 0..=top_level {
                let len = read_u32(r)? as usize;
                let mut list = Vec::with_capacity(len);
                for _ in 0..len {
                    list.push(read_u64(r)?);
                }
                neighbors.push(list);
            }

            if nodes
                .insert(
                    id,
                    Node {
                        vector,
                        top_level,
                        neighbors,
                    },
                )
                .is_some()
            {
                return Err(Error::IndexCorrupted(format!(
                    "hnsw index: duplicate node id {}",
                    id
                )));
            }
        }

        let tombstone_count = read_u64(r)?;
        let mut tombstones = HashSet::with_capacity(tombstone_count as usize);
        for _ in 0..tombstone_count {
            let id = read_u64(r)?;
            if !nodes.contains_key(&id) {
                return Err(Error::IndexCorrupted(format!(
                    "hnsw index: tombstone for unknown id {}",
                    id
                )));
            }
            tombstones.insert(id);
        }

        // Every edge endpoint must exist at the edge's level or above.
        for (id, node) in &nodes {
            for (level, list) in node.neighbors.iter().enumerate() {
                for &neighbor in list {
                    let valid = nodes
                        .get(&neighbor)
                        .map_or(false, |n| n.top_level >= level);
                    if !valid {
                        return Err(Error::IndexCorrupted(format!(
                            "hnsw index: node {} has invalid edge to {} at level {}",
                            id, neighbor, level
                        )));
                    }
                }
            }
        }

        let max_level = nodes.values().map(|n| n.top_level).max().unwrap_or(0);
        let entry_point = if entry_raw == u64::MAX {
            None
        } else {
            Some(entry_raw)
        };

        match entry_point {
            None if !nodes.is_empty() => {
                return Err(Error::IndexCorrupted(
                    "hnsw index: missing entry point for non-empty graph".into(),
                ));
            }
            Some(entry) => {
                let valid = nodes.get(&entry).map_or(false, |n| n.top_level == max_level);
                if !valid {
                    return Err(Error::IndexCorrupted(format!(
                        "hnsw index: entry point {} is not at the top level",
                        entry
                    )));
                }
            }
            None => {}
        }

        self.params = HnswParams {
            m,
            m_max_0,
            ef_construction,
            ef_search,
            random_seed,
        };
        self.ml = ml;
        self.rng = StdRng::seed_from_u64(random_seed);
        self.nodes = nodes;
        self.tombstones = tombstones;
        self.entry_point = entry_point;
        self.max_level = max_level;

        Ok(())
    }
}

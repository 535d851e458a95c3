//! HNSW (Hierarchical Navigable Small World) graph
//!
//! Multi-layer proximity graph for approximate nearest-neighbor search:
//! - higher layers hold exponentially fewer nodes
//! - search descends greedily from the top layer, then runs a beam search
//!   of width `ef_search` on layer 0
//! - deletions are tombstones until the next rebuild
//!
//! Candidates are re-scored exactly and ranked with [`rank_order`], so the
//! graph only decides *which* entries are considered, never their order.
//! When the k-th score is shared by more entries than the beam could hold,
//! that score band is resolved against every live entry so ties break the
//! same way as in [`ExactScan`].

use super::{
    cosine_similarity, rank_order, EntryMap, ExactScan, IndexEntry, MetadataFilter,
    NearestNeighbors, ScoredEntry,
};
use crate::embed::vector_norm;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

const MAX_LEVEL: usize = 16;
const RNG_SEED: u64 = 42;

/// Graph construction and search parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HnswParams {
    /// Max neighbors per node on layers above 0
    pub m: usize,
    /// Beam width while inserting
    pub ef_construction: usize,
    /// Beam width while querying
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 100,
            ef_search: 64,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Scored {
    score: f32,
    slot: u32,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.slot.cmp(&self.slot))
    }
}

#[derive(Debug, Clone)]
struct HnswNode {
    entry: Arc<IndexEntry>,
    neighbors: Vec<Vec<u32>>,
    deleted: bool,
}

/// Approximate nearest-neighbor graph keyed by chunk id
#[derive(Debug, Clone)]
pub struct HnswGraph {
    params: HnswParams,
    m_max0: usize,
    level_mult: f64,
    nodes: Vec<HnswNode>,
    slots: HashMap<String, u32>,
    entry_point: Option<u32>,
    level_max: usize,
    deleted: usize,
    rng_state: u64,
}

impl HnswGraph {
    pub fn new(params: HnswParams) -> Self {
        let m = params.m.max(2);
        Self {
            params: HnswParams { m, ..params },
            m_max0: m * 2,
            level_mult: 1.0 / (m as f64).ln(),
            nodes: Vec::new(),
            slots: HashMap::new(),
            entry_point: None,
            level_max: 0,
            deleted: 0,
            rng_state: RNG_SEED,
        }
    }

    /// Build a graph over `entries`, inserting in chunk-id order
    pub fn build(params: HnswParams, entries: &EntryMap) -> Self {
        let mut graph = Self::new(params);
        graph.insert_all(entries);
        graph
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn insert_all(&mut self, entries: &EntryMap) {
        let mut ordered: Vec<&Arc<IndexEntry>> = entries.values().collect();
        ordered.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        for entry in ordered {
            self.add_node(Arc::clone(entry));
        }
    }

    fn add_node(&mut self, entry: Arc<IndexEntry>) {
        let level = self.select_level();
        let slot = self.nodes.len() as u32;
        let query = entry.vector.clone();
        let query_norm = entry.norm;

        self.slots.insert(entry.chunk_id.clone(), slot);
        self.nodes.push(HnswNode {
            entry,
            neighbors: vec![Vec::new(); level + 1],
            deleted: false,
        });

        let Some(mut ep) = self.entry_point else {
            self.entry_point = Some(slot);
            self.level_max = level;
            return;
        };

        // Greedy descent through layers above the new node
        let mut lc = self.level_max;
        while lc > level {
            ep = self.greedy_closest(ep, &query, query_norm, lc);
            lc -= 1;
        }

        for lc in (0..=level.min(self.level_max)).rev() {
            let candidates = self.search_layer(ep, &query, query_norm, self.params.ef_construction, lc);
            let m_limit = if lc == 0 { self.m_max0 } else { self.params.m };

            let selected: Vec<u32> = candidates
                .iter()
                .map(|s| s.slot)
                .filter(|&s| s != slot)
                .take(m_limit)
                .collect();

            for &neighbor in &selected {
                self.add_neighbor(neighbor, slot, lc);
                self.add_neighbor(slot, neighbor, lc);
            }
            for &neighbor in &selected {
                self.prune_neighbors(neighbor, lc, m_limit);
            }

            if let Some(best) = candidates.first() {
                ep = best.slot;
            }
        }

        if level > self.level_max {
            self.entry_point = Some(slot);
            self.level_max = level;
        }
    }

    fn select_level(&mut self) -> usize {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let r = ((self.rng_state >> 33) as f64 / (1u64 << 31) as f64).max(f64::MIN_POSITIVE);
        ((-r.ln() * self.level_mult).floor() as usize).min(MAX_LEVEL)
    }

    fn similarity(&self, slot: u32, query: &[f32], query_norm: f32) -> f32 {
        cosine_similarity(query, query_norm, &self.nodes[slot as usize].entry)
    }

    fn greedy_closest(&self, entry: u32, query: &[f32], query_norm: f32, level: usize) -> u32 {
        let mut current = entry;
        let mut current_sim = self.similarity(current, query, query_norm);

        loop {
            let mut changed = false;
            if let Some(layer) = self.nodes[current as usize].neighbors.get(level) {
                for &neighbor in layer {
                    let sim = self.similarity(neighbor, query, query_norm);
                    if sim > current_sim {
                        current = neighbor;
                        current_sim = sim;
                        changed = true;
                    }
                }
            }
            if !changed {
                return current;
            }
        }
    }

    /// Beam search on one layer; best first
    fn search_layer(&self, entry: u32, query: &[f32], query_norm: f32, ef: usize, level: usize) -> Vec<Scored> {
        let ef = ef.max(1);
        let mut visited: HashSet<u32> = HashSet::new();
        let mut candidates: BinaryHeap<Scored> = BinaryHeap::new();
        let mut results: BinaryHeap<Reverse<Scored>> = BinaryHeap::new();

        let start = Scored {
            score: self.similarity(entry, query, query_norm),
            slot: entry,
        };
        visited.insert(entry);
        candidates.push(start);
        results.push(Reverse(start));

        while let Some(current) = candidates.pop() {
            let worst = results.peek().map(|r| r.0.score).unwrap_or(f32::NEG_INFINITY);
            if current.score < worst && results.len() >= ef {
                break;
            }

            let Some(layer) = self.nodes[current.slot as usize].neighbors.get(level) else {
                continue;
            };

            for &neighbor in layer {
                if !visited.insert(neighbor) {
                    continue;
                }

                let scored = Scored {
                    score: self.similarity(neighbor, query, query_norm),
                    slot: neighbor,
                };
                let worst = results.peek().map(|r| r.0.score).unwrap_or(f32::NEG_INFINITY);
                if scored.score > worst || results.len() < ef {
                    candidates.push(scored);
                    results.push(Reverse(scored));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<Scored> = results.into_iter().map(|r| r.0).collect();
        out.sort_by(|a, b| b.cmp(a));
        out
    }

    fn add_neighbor(&mut self, from: u32, to: u32, level: usize) {
        let node = &mut self.nodes[from as usize];
        while node.neighbors.len() <= level {
            node.neighbors.push(Vec::new());
        }
        if !node.neighbors[level].contains(&to) {
            node.neighbors[level].push(to);
        }
    }

    fn prune_neighbors(&mut self, slot: u32, level: usize, max_neighbors: usize) {
        let node = &self.nodes[slot as usize];
        let Some(layer) = node.neighbors.get(level) else {
            return;
        };
        if layer.len() <= max_neighbors {
            return;
        }

        let base = &node.entry;
        let mut scored: Vec<Scored> = layer
            .iter()
            .map(|&n| Scored {
                score: cosine_similarity(&base.vector, base.norm, &self.nodes[n as usize].entry),
                slot: n,
            })
            .collect();
        scored.sort_by(|a, b| b.cmp(a));
        let kept: Vec<u32> = scored.into_iter().take(max_neighbors).map(|s| s.slot).collect();

        self.nodes[slot as usize].neighbors[level] = kept;
    }

    /// Live graph candidates for `query`, best first
    fn candidates(&self, query: &[f32], query_norm: f32, ef: usize) -> Vec<u32> {
        let Some(mut ep) = self.entry_point else {
            return Vec::new();
        };

        let mut lc = self.level_max;
        while lc > 0 {
            ep = self.greedy_closest(ep, query, query_norm, lc);
            lc -= 1;
        }

        self.search_layer(ep, query, query_norm, ef, 0)
            .into_iter()
            .filter(|s| !self.nodes[s.slot as usize].deleted)
            .map(|s| s.slot)
            .collect()
    }

    /// Whether another live entry besides `hits` may share the boundary score.
    /// True when two hits share it, or when a layer-0 neighbor of the
    /// boundary hit scores the same.
    fn tie_at_boundary(
        &self,
        hits: &[ScoredEntry],
        boundary: f32,
        query: &[f32],
        query_norm: f32,
        filter: Option<&MetadataFilter>,
    ) -> bool {
        let at_boundary: Vec<&ScoredEntry> = hits.iter().filter(|h| h.score == boundary).collect();
        if at_boundary.len() > 1 {
            return true;
        }

        at_boundary.iter().any(|hit| {
            let Some(&slot) = self.slots.get(&hit.entry.chunk_id) else {
                return false;
            };
            self.nodes[slot as usize]
                .neighbors
                .first()
                .map(|layer| {
                    layer.iter().any(|&n| {
                        let node = &self.nodes[n as usize];
                        !node.deleted
                            && node.entry.chunk_id != hit.entry.chunk_id
                            && filter.map(|f| f.matches(&node.entry)).unwrap_or(true)
                            && self.similarity(n, query, query_norm) == boundary
                    })
                })
                .unwrap_or(false)
        })
    }
}

/// Replace the boundary score band of `hits` with every live entry at that score
fn resolve_boundary_band(
    entries: &EntryMap,
    hits: Vec<ScoredEntry>,
    boundary: f32,
    query: &[f32],
    query_norm: f32,
    filter: Option<&MetadataFilter>,
) -> Vec<ScoredEntry> {
    let mut resolved: Vec<ScoredEntry> = hits.into_iter().filter(|h| h.score > boundary).collect();
    resolved.extend(
        entries
            .values()
            .filter(|e| filter.map(|f| f.matches(e)).unwrap_or(true))
            .filter_map(|e| {
                let score = cosine_similarity(query, query_norm, e);
                (score == boundary).then(|| ScoredEntry {
                    score,
                    entry: Arc::clone(e),
                })
            }),
    );
    resolved.sort_by(rank_order);
    resolved
}

impl NearestNeighbors for HnswGraph {
    fn name(&self) -> &'static str {
        "hnsw"
    }

    fn search(
        &self,
        entries: &EntryMap,
        query: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Vec<ScoredEntry> {
        if limit == 0 || entries.is_empty() {
            return Vec::new();
        }

        let query_norm = vector_norm(query);
        let ef = self.params.ef_search.max(limit);

        let mut hits: Vec<ScoredEntry> = self
            .candidates(query, query_norm, ef)
            .into_iter()
            .filter_map(|slot| {
                let entry = entries.get(&self.nodes[slot as usize].entry.chunk_id)?;
                if !filter.map(|f| f.matches(entry)).unwrap_or(true) {
                    return None;
                }
                Some(ScoredEntry {
                    score: cosine_similarity(query, query_norm, entry),
                    entry: Arc::clone(entry),
                })
            })
            .collect();

        hits.sort_by(rank_order);
        if hits.len() >= limit {
            let boundary = hits[limit - 1].score;
            if self.tie_at_boundary(&hits, boundary, query, query_norm, filter) {
                hits = resolve_boundary_band(entries, hits, boundary, query, query_norm, filter);
            }
        }
        hits.truncate(limit);

        // A selective filter can starve the beam; fall back to scanning
        let reachable = match filter {
            Some(f) if !f.is_empty() => usize::MAX,
            _ => entries.len(),
        };
        if hits.len() < limit && hits.len() < reachable {
            return ExactScan::rank(entries.values(), query, limit, filter);
        }

        hits
    }

    fn insert(&mut self, entry: &Arc<IndexEntry>) {
        self.remove(&entry.chunk_id);
        self.add_node(Arc::clone(entry));
    }

    fn remove(&mut self, chunk_id: &str) {
        if let Some(slot) = self.slots.remove(chunk_id) {
            self.nodes[slot as usize].deleted = true;
            self.deleted += 1;
        }
    }

    fn tombstone_ratio(&self) -> f32 {
        if self.nodes.is_empty() {
            0.0
        } else {
            self.deleted as f32 / self.nodes.len() as f32
        }
    }

    fn rebuild(&mut self, entries: &EntryMap) {
        *self = Self::build(self.params, entries);
    }

    fn clone_box(&self) -> Box<dyn NearestNeighbors> {
        Box::new(self.clone())
    }
}

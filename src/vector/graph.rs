//! HNSW (hierarchical navigable small-world) vector index (§4.7).

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use rand::Rng;

use crate::vector::distance::DistanceMetric;

pub const DEFAULT_M: usize = 16;
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;
const MAX_LAYER_CAP: usize = 16;
const OVER_FETCH_MULTIPLIER: usize = 4;
/// `auto` hybrid strategy threshold: pre-filter when the candidate set is
/// no more than 3% of the corpus, else post-filter.
pub const HYBRID_AUTO_THRESHOLD: f64 = 0.03;

#[derive(Debug, Clone)]
pub struct NodeMetadata {
    pub title: String,
    pub category: String,
    pub preview: String,
}

struct HnswNode {
    external_id: String,
    vector: Vec<f32>,
    metadata: NodeMetadata,
    neighbors: Vec<Vec<u32>>, // indexed by layer
}

#[derive(Clone, Copy)]
struct HeapItem(f64, u32);

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for HeapItem {}
impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStrategy {
    Pre,
    Post,
    Auto,
}

pub struct HnswGraph {
    metric: DistanceMetric,
    m: usize,
    m0: usize,
    ef_construction: usize,
    nodes: Vec<HnswNode>,
    id_to_internal: HashMap<String, u32>,
    entry_point: Option<u32>,
    top_layer: usize,
}

pub struct Neighbor {
    pub id: String,
    pub score: f64,
    pub metadata: NodeMetadata,
}

impl HnswGraph {
    pub fn new(metric: DistanceMetric, m: usize, ef_construction: usize) -> Self {
        Self {
            metric,
            m,
            m0: m * 2,
            ef_construction,
            nodes: Vec::new(),
            id_to_internal: HashMap::new(),
            entry_point: None,
            top_layer: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn draw_layer(&self, rng: &mut impl Rng) -> usize {
        let u: f64 = rng.random_range(f64::MIN_POSITIVE..1.0);
        let layer = (-u.ln() / (self.m as f64).ln()).floor() as usize;
        layer.min(MAX_LAYER_CAP)
    }

    fn distance_to(&self, query: &[f32], internal_id: u32) -> f64 {
        self.metric.distance(query, &self.nodes[internal_id as usize].vector)
    }

    fn greedy_closest(&self, query: &[f32], layer: usize, entry: u32) -> u32 {
        let mut current = entry;
        let mut current_dist = self.distance_to(query, current);
        loop {
            let mut improved = false;
            let neighbors = &self.nodes[current as usize].neighbors;
            if layer >= neighbors.len() {
                break;
            }
            for &candidate in &neighbors[layer] {
                let d = self.distance_to(query, candidate);
                if d < current_dist {
                    current = candidate;
                    current_dist = d;
                    improved = true;
                }
            }
            if !improved {
                break;
            }
        }
        current
    }

    /// ef-bounded search at a single layer from a set of entry points.
    /// Returns `(internal_id, distance)` pairs sorted ascending by distance.
    fn layer_search(
        &self,
        query: &[f32],
        layer: usize,
        entry_points: &[u32],
        ef: usize,
        filter: Option<&dyn Fn(&str) -> bool>,
    ) -> Vec<(u32, f64)> {
        let mut visited: HashSet<u32> = HashSet::new();
        let mut candidates: BinaryHeap<std::cmp::Reverse<HeapItem>> = BinaryHeap::new();
        let mut results: BinaryHeap<HeapItem> = BinaryHeap::new();

        let passes = |id: u32, filter: Option<&dyn Fn(&str) -> bool>| {
            filter
                .map(|f| f(&self.nodes[id as usize].external_id))
                .unwrap_or(true)
        };

        for &ep in entry_points {
            if !visited.insert(ep) {
                continue;
            }
            let d = self.distance_to(query, ep);
            candidates.push(std::cmp::Reverse(HeapItem(d, ep)));
            if passes(ep, filter) {
                results.push(HeapItem(d, ep));
            }
        }

        while let Some(std::cmp::Reverse(HeapItem(cand_dist, cand_id))) = candidates.pop() {
            if results.len() >= ef {
                if let Some(farthest) = results.peek() {
                    if cand_dist > farthest.0 {
                        break;
                    }
                }
            }

            let neighbors = if layer < self.nodes[cand_id as usize].neighbors.len() {
                self.nodes[cand_id as usize].neighbors[layer].clone()
            } else {
                Vec::new()
            };

            for neighbor in neighbors {
                if !visited.insert(neighbor) {
                    continue;
                }
                let d = self.distance_to(query, neighbor);
                let should_expand = results.len() < ef
                    || results.peek().map(|f| d < f.0).unwrap_or(true);
                if should_expand {
                    candidates.push(std::cmp::Reverse(HeapItem(d, neighbor)));
                    if passes(neighbor, filter) {
                        results.push(HeapItem(d, neighbor));
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        let mut out: Vec<(u32, f64)> = results.into_iter().map(|HeapItem(d, id)| (id, d)).collect();
        out.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        out
    }

    /// Keeps the `limit` closest entries to `origin` by distance.
    fn prune_neighbors(&self, origin: u32, candidates: &mut Vec<u32>, limit: usize) {
        let origin_vector = self.nodes[origin as usize].vector.clone();
        candidates.sort_by(|&a, &b| {
            let da = self.metric.distance(&origin_vector, &self.nodes[a as usize].vector);
            let db = self.metric.distance(&origin_vector, &self.nodes[b as usize].vector);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit);
    }

    pub fn insert(
        &mut self,
        external_id: String,
        vector: Vec<f32>,
        metadata: NodeMetadata,
        rng: &mut impl Rng,
    ) {
        let layer = self.draw_layer(rng);
        let internal_id = self.nodes.len() as u32;
        self.nodes.push(HnswNode {
            external_id: external_id.clone(),
            vector: vector.clone(),
            metadata,
            neighbors: vec![Vec::new(); layer + 1],
        });
        self.id_to_internal.insert(external_id, internal_id);

        let Some(mut entry) = self.entry_point else {
            self.entry_point = Some(internal_id);
            self.top_layer = layer;
            return;
        };

        let mut top = self.top_layer;
        for l in (layer + 1..=top).rev() {
            entry = self.greedy_closest(&vector, l, entry);
        }

        for l in (0..=layer.min(top)).rev() {
            let candidates = self.layer_search(&vector, l, &[entry], self.ef_construction, None);
            let limit = if l == 0 { self.m0 } else { self.m };
            let mut selected: Vec<u32> = candidates.iter().take(limit).map(|(id, _)| *id).collect();
            if let Some(&(closest, _)) = candidates.first() {
                entry = closest;
            }

            self.nodes[internal_id as usize].neighbors[l] = selected.clone();
            for &neighbor in &selected {
                let neighbor_neighbors = &mut self.nodes[neighbor as usize].neighbors;
                if l >= neighbor_neighbors.len() {
                    neighbor_neighbors.resize(l + 1, Vec::new());
                }
                neighbor_neighbors[l].push(internal_id);
                let mut list = std::mem::take(&mut neighbor_neighbors[l]);
                if list.len() > limit {
                    self.prune_neighbors(neighbor, &mut list, limit);
                }
                self.nodes[neighbor as usize].neighbors[l] = list;
            }
            selected.clear();
        }

        if layer > top {
            self.entry_point = Some(internal_id);
            self.top_layer = layer;
            top = layer;
        }
        let _ = top;
    }

    /// Plain k-NN search with breadth `ef` (no metadata filter).
    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Vec<Neighbor> {
        self.search_filtered(query, k, ef, None)
    }

    fn search_filtered(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        filter: Option<&dyn Fn(&str) -> bool>,
    ) -> Vec<Neighbor> {
        let Some(mut entry) = self.entry_point else {
            return Vec::new();
        };
        for l in (1..=self.top_layer).rev() {
            entry = self.greedy_closest(query, l, entry);
        }

        let ef = ef.max(k);
        let results = self.layer_search(query, 0, &[entry], ef, filter);
        results
            .into_iter()
            .take(k)
            .map(|(id, d)| {
                let node = &self.nodes[id as usize];
                Neighbor {
                    id: node.external_id.clone(),
                    score: self.metric.score(d),
                    metadata: node.metadata.clone(),
                }
            })
            .collect()
    }

    /// Hybrid (metadata-filtered) search (§4.7).
    pub fn hybrid_search(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        strategy: FilterStrategy,
        candidate_ids: &HashSet<String>,
    ) -> Vec<Neighbor> {
        if candidate_ids.is_empty() {
            return Vec::new();
        }

        let resolved = match strategy {
            FilterStrategy::Pre => FilterStrategy::Pre,
            FilterStrategy::Post => FilterStrategy::Post,
            FilterStrategy::Auto => {
                let ratio = candidate_ids.len() as f64 / self.len().max(1) as f64;
                if ratio <= HYBRID_AUTO_THRESHOLD {
                    FilterStrategy::Pre
                } else {
                    FilterStrategy::Post
                }
            }
        };

        match resolved {
            FilterStrategy::Pre => {
                let small_enough = candidate_ids.len() <= self.m0 * 4;
                if small_enough {
                    self.brute_force_filtered(query, k, candidate_ids)
                } else {
                    let filter = |id: &str| candidate_ids.contains(id);
                    self.search_filtered(query, k, ef, Some(&filter))
                }
            }
            FilterStrategy::Post => {
                let over_fetch = k * OVER_FETCH_MULTIPLIER;
                let results = self.search_filtered(query, over_fetch, ef.max(over_fetch), None);
                results
                    .into_iter()
                    .filter(|n| candidate_ids.contains(&n.id))
                    .take(k)
                    .collect()
            }
            FilterStrategy::Auto => unreachable!("resolved above"),
        }
    }

    fn brute_force_filtered(&self, query: &[f32], k: usize, candidate_ids: &HashSet<String>) -> Vec<Neighbor> {
        let mut scored: Vec<Neighbor> = candidate_ids
            .iter()
            .filter_map(|id| self.id_to_internal.get(id))
            .map(|&internal_id| {
                let node = &self.nodes[internal_id as usize];
                let d = self.metric.distance(query, &node.vector);
                Neighbor {
                    id: node.external_id.clone(),
                    score: self.metric.score(d),
                    metadata: node.metadata.clone(),
                }
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        scored
    }

    pub fn brute_force_search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        let mut scored: Vec<Neighbor> = self
            .nodes
            .iter()
            .map(|node| {
                let d = self.metric.distance(query, &node.vector);
                Neighbor {
                    id: node.external_id.clone(),
                    score: self.metric.score(d),
                    metadata: node.metadata.clone(),
                }
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        scored
    }
}

pub fn shared_rng() -> impl Rng {
    rand::rng()
}

#[allow(dead_code)]
fn assert_send_sync<T: Send + Sync>() {}
#[allow(dead_code)]
fn _graph_is_send_sync() {
    assert_send_sync::<Arc<HnswGraph>>();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_rng(seed: u64) -> rand::rngs::StdRng {
        use rand::SeedableRng;
        rand::rngs::StdRng::seed_from_u64(seed)
    }

    fn meta(label: &str) -> NodeMetadata {
        NodeMetadata {
            title: label.to_string(),
            category: "place".to_string(),
            preview: String::new(),
        }
    }

    fn build_random_graph(n: usize, dim: usize, seed: u64) -> (HnswGraph, Vec<Vec<f32>>) {
        let mut rng = seeded_rng(seed);
        let mut graph = HnswGraph::new(DistanceMetric::Euclidean, DEFAULT_M, DEFAULT_EF_CONSTRUCTION);
        let mut vectors = Vec::with_capacity(n);
        for i in 0..n {
            let v: Vec<f32> = (0..dim).map(|_| rng.random_range(-1.0..1.0)).collect();
            graph.insert(format!("id{i}"), v.clone(), meta(&format!("id{i}")), &mut rng);
            vectors.push(v);
        }
        (graph, vectors)
    }

    #[test]
    fn insert_and_search_returns_k_results() {
        let (graph, vectors) = build_random_graph(200, 8, 42);
        let results = graph.search(&vectors[0], 5, 50);
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].id, "id0");
    }

    #[test]
    fn no_orphan_nodes_every_node_reachable_at_layer_zero() {
        let (graph, _vectors) = build_random_graph(50, 4, 7);
        let mut reachable = HashSet::new();
        let mut frontier = vec![graph.entry_point.unwrap()];
        reachable.insert(frontier[0]);
        while let Some(current) = frontier.pop() {
            for &neighbor in &graph.nodes[current as usize].neighbors[0] {
                if reachable.insert(neighbor) {
                    frontier.push(neighbor);
                }
            }
        }
        assert_eq!(reachable.len(), graph.len());
    }

    #[test]
    fn neighbor_lists_never_exceed_m_or_2m() {
        let (graph, _vectors) = build_random_graph(200, 8, 11);
        for node in &graph.nodes {
            for (layer, list) in node.neighbors.iter().enumerate() {
                let limit = if layer == 0 { graph.m0 } else { graph.m };
                assert!(list.len() <= limit);
            }
        }
    }

    #[test]
    fn increasing_ef_does_not_decrease_recall() {
        let (graph, vectors) = build_random_graph(2000, 16, 99);
        let query = &vectors[17];

        let brute = graph.brute_force_search(query, 10);
        let brute_ids: HashSet<&str> = brute.iter().map(|n| n.id.as_str()).collect();

        let recall = |ef: usize| -> f64 {
            let results = graph.search(query, 10, ef);
            let hits = results.iter().filter(|n| brute_ids.contains(n.id.as_str())).count();
            hits as f64 / brute_ids.len() as f64
        };

        let low_ef_recall = recall(10);
        let high_ef_recall = recall(200);
        assert!(high_ef_recall >= low_ef_recall - 1e-9);
    }

    #[test]
    fn hybrid_pre_filter_only_returns_candidate_ids() {
        let (graph, vectors) = build_random_graph(300, 8, 3);
        let candidates: HashSet<String> = (0..20).map(|i| format!("id{i}")).collect();
        let results = graph.hybrid_search(&vectors[0], 5, 50, FilterStrategy::Pre, &candidates);
        assert!(results.iter().all(|n| candidates.contains(&n.id)));
    }

    #[test]
    fn hybrid_post_filter_only_returns_candidate_ids() {
        let (graph, vectors) = build_random_graph(300, 8, 5);
        let candidates: HashSet<String> = (0..150).map(|i| format!("id{i}")).collect();
        let results = graph.hybrid_search(&vectors[0], 5, 50, FilterStrategy::Post, &candidates);
        assert!(results.iter().all(|n| candidates.contains(&n.id)));
    }
}

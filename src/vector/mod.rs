//! HNSW vector index (§4.7): builds a graph from a `.lance` partition and
//! serves k-NN / hybrid-filtered search.

pub mod distance;
pub mod graph;
pub mod lance;

use std::collections::HashSet;

use rand::SeedableRng;

pub use distance::DistanceMetric;
pub use graph::{FilterStrategy, HnswGraph, Neighbor, NodeMetadata, DEFAULT_EF_CONSTRUCTION, DEFAULT_M};

use crate::error::Result;

pub struct VectorIndex {
    graph: HnswGraph,
    dimension: usize,
}

impl VectorIndex {
    /// Builds a graph from the decoded `.lance` bytes of one category
    /// partition. Node insertion order follows file row order, so builds
    /// are deterministic given the same seed.
    pub fn build_from_lance_bytes(bytes: &[u8], metric: DistanceMetric, seed: u64) -> Result<Self> {
        let file = lance::parse(bytes)?;
        let mut graph = HnswGraph::new(metric, DEFAULT_M, DEFAULT_EF_CONSTRUCTION);
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        for record in &file.records {
            graph.insert(
                record.id.clone(),
                record.embedding.clone(),
                NodeMetadata {
                    title: record.title.clone(),
                    category: record.category.clone(),
                    preview: record.text_preview.clone(),
                },
                &mut rng,
            );
        }
        Ok(Self {
            graph,
            dimension: file.metadata.embedding_dimension as usize,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Vec<Neighbor> {
        self.graph.search(query, k, ef)
    }

    pub fn hybrid_search(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        strategy: FilterStrategy,
        candidate_ids: &HashSet<String>,
    ) -> Vec<Neighbor> {
        self.graph.hybrid_search(query, k, ef, strategy, candidate_ids)
    }

    /// Brute-force fallback used when the HNSW graph failed to load
    /// (§7: the query facade degrades to brute-force scan and reports
    /// `useHnsw=false`).
    pub fn brute_force_search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        self.graph.brute_force_search(query, k)
    }
}

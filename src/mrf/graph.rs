use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use log::debug;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};

use crate::{errors::BPError, factor_types::unary_factor::UnaryFactor};

// The data associated with each variable of the pairwise Markov random field
#[derive(Debug, Clone, PartialEq)]
pub struct VertexData {
    pub potential: UnaryFactor,
    pub belief: UnaryFactor,
    pub residual: f64, // largest outgoing residual of the last update of this vertex
}

impl VertexData {
    pub fn new(potential: UnaryFactor, belief: UnaryFactor) -> Self {
        VertexData {
            potential,
            belief,
            residual: f64::INFINITY,
        }
    }
}

// The data associated with each directed edge of the pairwise Markov random field
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeData {
    pub message: UnaryFactor,
    pub old_message: UnaryFactor,
}

impl EdgeData {
    pub fn new(message: UnaryFactor) -> Self {
        EdgeData {
            old_message: message.clone(),
            message,
        }
    }
}

// Vertex storage: the whole vertex is updated under one exclusive lock
pub struct Vertex {
    data: Mutex<VertexData>,
}

// Edge storage: `message` is written by the source vertex, `old_message` by the target vertex
pub struct Edge {
    message: RwLock<UnaryFactor>,
    old_message: RwLock<UnaryFactor>,
}

impl Edge {
    fn new(edge_data: EdgeData) -> Self {
        Edge {
            message: RwLock::new(edge_data.message),
            old_message: RwLock::new(edge_data.old_message),
        }
    }

    pub fn message(&self) -> RwLockReadGuard<'_, UnaryFactor> {
        self.message.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn message_mut(&self) -> RwLockWriteGuard<'_, UnaryFactor> {
        self.message.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn old_message(&self) -> RwLockReadGuard<'_, UnaryFactor> {
        self.old_message.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn old_message_mut(&self) -> RwLockWriteGuard<'_, UnaryFactor> {
        self.old_message.write().unwrap_or_else(PoisonError::into_inner)
    }
}

pub type MrfDiGraph = DiGraph<Vertex, Edge, usize>;

// Graph of the Markov random field. Vertices and edges are inserted first,
// then `finalize()` freezes the topology and builds the reverse-edge pairing.
pub struct MrfGraph {
    graph: MrfDiGraph,
    finalized: bool,
    reverse: Vec<usize>,       // reverse[e] is the edge with the same endpoints as e in the opposite direction
    in_edges: Vec<Vec<usize>>, // in_edges[v][i] is the reverse of out_edges[v][i]
    out_edges: Vec<Vec<usize>>,
}

impl MrfGraph {
    pub fn new() -> Self {
        MrfGraph::with_capacity(0, 0)
    }

    pub fn with_capacity(num_vertices: usize, num_edges: usize) -> Self {
        MrfGraph {
            graph: DiGraph::with_capacity(num_vertices, num_edges),
            finalized: false,
            reverse: Vec::new(),
            in_edges: Vec::new(),
            out_edges: Vec::new(),
        }
    }

    fn check_not_finalized(&self) -> Result<(), BPError> {
        match self.finalized {
            true => Err(BPError::invalid_config("graph topology is already finalized")),
            false => Ok(()),
        }
    }

    fn check_vertex(&self, vertex: usize) -> Result<(), BPError> {
        match vertex < self.num_vertices() {
            true => Ok(()),
            false => Err(BPError::invalid_config(format!(
                "vertex {} does not exist",
                vertex
            ))),
        }
    }

    // Adds a vertex and returns its id; ids are consecutive starting from zero
    pub fn add_vertex(&mut self, vertex_data: VertexData) -> Result<usize, BPError> {
        self.check_not_finalized()?;
        let node = self.graph.add_node(Vertex {
            data: Mutex::new(vertex_data),
        });
        Ok(node.index())
    }

    // Adds a directed edge and returns its id
    pub fn add_edge(
        &mut self,
        source: usize,
        target: usize,
        edge_data: EdgeData,
    ) -> Result<usize, BPError> {
        self.check_not_finalized()?;
        self.check_vertex(source)?;
        self.check_vertex(target)?;
        if source == target {
            return Err(BPError::invalid_config(format!(
                "self loop at vertex {}",
                source
            )));
        }
        let edge = self.graph.add_edge(
            NodeIndex::<usize>::new(source),
            NodeIndex::<usize>::new(target),
            Edge::new(edge_data),
        );
        Ok(edge.index())
    }

    // Freezes the topology and pairs every directed edge with its reverse
    pub fn finalize(&mut self) -> Result<(), BPError> {
        self.check_not_finalized()?;
        debug!(
            "Finalizing graph with {} vertices and {} edges",
            self.num_vertices(),
            self.num_edges()
        );

        let mut edge_ids = HashMap::with_capacity(self.num_edges());
        for (edge, raw_edge) in self.graph.raw_edges().iter().enumerate() {
            let endpoints = (raw_edge.source().index(), raw_edge.target().index());
            if edge_ids.insert(endpoints, edge).is_some() {
                return Err(BPError::invalid_config(format!(
                    "duplicate edge from {} to {}",
                    endpoints.0, endpoints.1
                )));
            }
        }

        let mut reverse = vec![0; self.num_edges()];
        let mut out_edges = vec![Vec::new(); self.num_vertices()];
        for (edge, raw_edge) in self.graph.raw_edges().iter().enumerate() {
            let (source, target) = (raw_edge.source().index(), raw_edge.target().index());
            reverse[edge] = *edge_ids.get(&(target, source)).ok_or_else(|| {
                BPError::invalid_config(format!(
                    "edge from {} to {} has no reverse edge",
                    source, target
                ))
            })?;
            out_edges[source].push(edge);
        }

        self.in_edges = out_edges
            .iter()
            .map(|edges| edges.iter().map(|edge| reverse[*edge]).collect())
            .collect();
        self.out_edges = out_edges;
        self.reverse = reverse;
        self.finalized = true;
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn num_vertices(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn source(&self, edge: usize) -> usize {
        self.graph.raw_edges()[edge].source().index()
    }

    pub fn target(&self, edge: usize) -> usize {
        self.graph.raw_edges()[edge].target().index()
    }

    // Returns the edge with the same endpoints in the opposite direction (requires a finalized graph)
    pub fn reverse_edge(&self, edge: usize) -> usize {
        self.reverse[edge]
    }

    // Incoming edges of a vertex, aligned with `out_edges()` (requires a finalized graph)
    pub fn in_edges(&self, vertex: usize) -> &[usize] {
        &self.in_edges[vertex]
    }

    // Outgoing edges of a vertex (requires a finalized graph)
    pub fn out_edges(&self, vertex: usize) -> &[usize] {
        &self.out_edges[vertex]
    }

    pub fn neighbors(&self, vertex: usize) -> impl Iterator<Item = usize> + '_ {
        self.out_edges[vertex].iter().map(|edge| self.target(*edge))
    }

    // Takes the exclusive lock of a vertex
    pub fn lock_vertex(&self, vertex: usize) -> MutexGuard<'_, VertexData> {
        self.graph[NodeIndex::<usize>::new(vertex)]
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn edge(&self, edge: usize) -> &Edge {
        &self.graph[EdgeIndex::<usize>::new(edge)]
    }

    // Returns a copy of the vertex data
    pub fn vertex_data(&self, vertex: usize) -> VertexData {
        self.lock_vertex(vertex).clone()
    }

    // Returns a copy of the edge data
    pub fn edge_data(&self, edge: usize) -> EdgeData {
        let edge = self.edge(edge);
        EdgeData {
            message: edge.message().clone(),
            old_message: edge.old_message().clone(),
        }
    }

    // Returns copies of all beliefs, indexed by vertex
    pub fn beliefs(&self) -> Vec<UnaryFactor> {
        (0..self.num_vertices())
            .map(|vertex| self.lock_vertex(vertex).belief.clone())
            .collect()
    }
}

impl Default for MrfGraph {
    fn default() -> Self {
        MrfGraph::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex_data(arity: usize) -> VertexData {
        VertexData::new(UnaryFactor::new(0, arity), UnaryFactor::new(0, arity))
    }

    fn edge_data(arity: usize) -> EdgeData {
        EdgeData::new(UnaryFactor::new(0, arity))
    }

    fn triangle() -> MrfGraph {
        let mut graph = MrfGraph::new();
        for _ in 0..3 {
            graph.add_vertex(vertex_data(2)).unwrap();
        }
        for (source, target) in [(0, 1), (1, 2), (2, 0), (1, 0), (2, 1), (0, 2)] {
            graph.add_edge(source, target, edge_data(2)).unwrap();
        }
        graph
    }

    #[test]
    fn reverse_pairing() {
        let mut graph = triangle();
        graph.finalize().unwrap();

        for edge in 0..graph.num_edges() {
            let reverse = graph.reverse_edge(edge);
            assert_eq!(graph.source(edge), graph.target(reverse));
            assert_eq!(graph.target(edge), graph.source(reverse));
            assert_eq!(graph.reverse_edge(reverse), edge);
        }

        for vertex in 0..graph.num_vertices() {
            assert_eq!(graph.out_edges(vertex).len(), 2);
            for (out_edge, in_edge) in graph.out_edges(vertex).iter().zip(graph.in_edges(vertex)) {
                assert_eq!(graph.source(*out_edge), vertex);
                assert_eq!(graph.target(*in_edge), vertex);
                assert_eq!(graph.source(*in_edge), graph.target(*out_edge));
            }
        }

        let mut neighbors: Vec<usize> = graph.neighbors(0).collect();
        neighbors.sort_unstable();
        assert_eq!(neighbors, vec![1, 2]);
    }

    #[test]
    fn frozen_after_finalize() {
        let mut graph = triangle();
        graph.finalize().unwrap();
        assert!(graph.is_finalized());
        assert!(matches!(
            graph.add_vertex(vertex_data(2)),
            Err(BPError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            graph.add_edge(0, 1, edge_data(2)),
            Err(BPError::InvalidConfiguration(_))
        ));
        assert!(graph.finalize().is_err());
    }

    #[test]
    fn missing_reverse_edge() {
        let mut graph = MrfGraph::new();
        graph.add_vertex(vertex_data(2)).unwrap();
        graph.add_vertex(vertex_data(2)).unwrap();
        graph.add_edge(0, 1, edge_data(2)).unwrap();
        assert!(matches!(
            graph.finalize(),
            Err(BPError::InvalidConfiguration(_))
        ));
        assert!(!graph.is_finalized());
    }

    #[test]
    fn invalid_edges() {
        let mut graph = MrfGraph::new();
        graph.add_vertex(vertex_data(2)).unwrap();
        assert!(graph.add_edge(0, 0, edge_data(2)).is_err());
        assert!(graph.add_edge(0, 5, edge_data(2)).is_err());
    }

    #[test]
    fn edge_slots() {
        let mut graph = triangle();
        graph.finalize().unwrap();
        graph.edge(3).message_mut()[1] = -2.;
        let data = graph.edge_data(3);
        assert_eq!(data.message[1], -2.);
        assert_eq!(data.old_message[1], 0.);

        graph.lock_vertex(1).residual = 0.5;
        assert_eq!(graph.vertex_data(1).residual, 0.5);
        assert_eq!(graph.beliefs().len(), 3);
    }
}

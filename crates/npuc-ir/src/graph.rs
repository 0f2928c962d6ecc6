//! The lowered graph: append-only node and edge stores with index
//! references.
//!
//! Nodes and edges are created monotonically. Edges may be redirected by
//! [`Graph::split_edge`] but are never deleted, so references stay valid
//! for the life of the graph.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::node::Node;
use crate::tensor::{CompilerDataFormat, QuantizationInfo};

/// Identifies a node in a [`Graph`] by creation order.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct NodeRef(u32);

impl NodeRef {
    /// Zero-based creation index of the node.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Identifies an edge in a [`Graph`] by creation order.
#[derive(Clone, Copy, Hash, Eq, PartialEq)]
pub struct EdgeRef(u32);

impl EdgeRef {
    /// Zero-based creation index of the edge.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for EdgeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// A directed edge from a producer node to a consumer node.
#[derive(Clone, Copy, Debug)]
pub struct Edge {
    pub producer: NodeRef,
    pub consumer: NodeRef,
}

/// A DAG of lowered nodes.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its reference.
    pub fn add_node(&mut self, node: Node) -> NodeRef {
        let index = u32::try_from(self.nodes.len()).unwrap_or_else(|_| {
            panic!("graph full: {} nodes exceeds u32::MAX", self.nodes.len())
        });
        self.nodes.push(node);
        NodeRef(index)
    }

    fn add_edge(&mut self, edge: Edge) -> EdgeRef {
        let index = u32::try_from(self.edges.len()).unwrap_or_else(|_| {
            panic!("graph full: {} edges exceeds u32::MAX", self.edges.len())
        });
        self.edges.push(edge);
        EdgeRef(index)
    }

    /// Appends an input edge `producer -> consumer` on the consumer.
    pub fn connect(&mut self, producer: NodeRef, consumer: NodeRef) -> EdgeRef {
        let edge = self.add_edge(Edge { producer, consumer });
        self.nodes[consumer.index()].inputs.push(edge);
        edge
    }

    /// Inserts `middle` between the endpoints of `edge`.
    ///
    /// The existing edge is redirected to end at `middle`, and one new edge
    /// `middle -> old consumer` takes the original edge's input slot on the
    /// consumer, preserving input order. No edge is deleted.
    ///
    /// # Panics
    ///
    /// Panics if `edge` is not an input edge of its recorded consumer.
    pub fn split_edge(&mut self, edge: EdgeRef, middle: NodeRef) -> EdgeRef {
        let consumer = self.edges[edge.index()].consumer;
        self.edges[edge.index()].consumer = middle;
        self.nodes[middle.index()].inputs.push(edge);

        let replacement = self.add_edge(Edge {
            producer: middle,
            consumer,
        });
        let slot = self.nodes[consumer.index()]
            .inputs
            .iter()
            .position(|&e| e == edge)
            .expect("split_edge: edge is not an input of its consumer");
        self.nodes[consumer.index()].inputs[slot] = replacement;
        replacement
    }

    /// Returns the `index`-th input edge of `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` has fewer than `index + 1` inputs.
    pub fn input_edge(&self, node: NodeRef, index: usize) -> EdgeRef {
        self.nodes[node.index()].inputs[index]
    }

    /// All input edges of `node`, in input order.
    pub fn input_edges(&self, node: NodeRef) -> &[EdgeRef] {
        &self.nodes[node.index()].inputs
    }

    /// Number of input edges of `node`.
    pub fn input_count(&self, node: NodeRef) -> usize {
        self.nodes[node.index()].inputs.len()
    }

    /// The node producing the value carried by `edge`.
    pub fn producer(&self, edge: EdgeRef) -> NodeRef {
        self.edges[edge.index()].producer
    }

    /// The node consuming the value carried by `edge`.
    pub fn consumer(&self, edge: EdgeRef) -> NodeRef {
        self.edges[edge.index()].consumer
    }

    /// Activation format produced on `edge`.
    pub fn producer_format(&self, edge: EdgeRef) -> CompilerDataFormat {
        self.node(self.producer(edge)).format
    }

    /// Quantization produced on `edge`.
    pub fn producer_quantization(&self, edge: EdgeRef) -> QuantizationInfo {
        self.node(self.producer(edge)).quantization
    }

    pub fn node(&self, node: NodeRef) -> &Node {
        &self.nodes[node.index()]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Iterates over `(reference, &node)` pairs in creation order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = (NodeRef, &Node)> {
        // Node count is bounded by u32::MAX (enforced in add_node).
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeRef(i as u32), n))
    }

    /// Iterates over `(reference, &edge)` pairs in creation order.
    pub fn iter_edges(&self) -> impl Iterator<Item = (EdgeRef, &Edge)> {
        self.edges
            .iter()
            .enumerate()
            .map(|(i, e)| (EdgeRef(i as u32), e))
    }

    /// Returns node references in topological order (producers first).
    ///
    /// The ordering is deterministic: among ready nodes the one created
    /// earliest is emitted first.
    ///
    /// # Panics
    ///
    /// Panics if the graph contains a cycle.
    pub fn topological_order(&self) -> Vec<NodeRef> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut consumers: HashMap<usize, Vec<usize>> = HashMap::new();

        for edge in &self.edges {
            in_degree[edge.consumer.index()] += 1;
            consumers
                .entry(edge.producer.index())
                .or_default()
                .push(edge.consumer.index());
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(&idx) = ready.iter().next() {
            ready.remove(&idx);
            order.push(NodeRef(idx as u32));
            if let Some(next) = consumers.get(&idx) {
                for &c in next {
                    in_degree[c] -= 1;
                    if in_degree[c] == 0 {
                        ready.insert(c);
                    }
                }
            }
        }

        assert!(
            order.len() == n,
            "topological_order: graph contains a cycle ({} of {} nodes visited)",
            order.len(),
            n,
        );
        order
    }
}

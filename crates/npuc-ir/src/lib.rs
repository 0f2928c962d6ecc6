//! npuc intermediate representation.
//!
//! A graph IR for the lowered form of a neural network: each node
//! corresponds to one hardware-executable primitive (MCE operations, PLE
//! operations, format conversions, reinterprets, sub-tensor extraction,
//! requantization, constants, inputs, outputs). The graph owns two
//! append-only stores (nodes, edges) addressed by lightweight index
//! references.

mod display;
mod graph;
mod node;
mod tensor;

pub use display::dump_graph;
pub use graph::{Edge, EdgeRef, Graph, NodeRef};
pub use node::{
    Fraction, MceOperation, MceParams, Node, NodeKind, PleOperation, ShapeMultiplier,
};
pub use tensor::{
    div_round_up, num_elements, round_up_to_multiple, CompilerDataFormat, DataFormat, DataType,
    Padding, QuantizationInfo, Stride, TensorInfo, TensorShape,
};

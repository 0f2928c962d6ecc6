//! Source network representation for the npuc compiler.
//!
//! A [`Network`] is a DAG of high-level operations (convolutions, pooling,
//! concatenation, ...) built through a checked builder API. The lowering
//! pass in `npuc-lower` walks it in insertion order, which the builder
//! guarantees to be topological.

mod network;
mod ops;

pub use network::{Network, OperandRef, Operation};
pub use ops::{ConstantTensor, ConvolutionInfo, OpKind, PoolingInfo, PoolingType};

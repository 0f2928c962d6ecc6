//! Network-to-graph lowering for the npuc compiler.
//!
//! Converts a source [`npuc_net::Network`] into a [`npuc_ir::Graph`] of
//! hardware-executable primitives. The pass embeds the hardware model:
//! brick-group layout constraints, stride handling via sub-map
//! interleaving, weight-encoder alignment, the padding algebra of
//! transpose convolutions, and a depth-to-space lowering built on a
//! synthesised transpose convolution.
//!
//! The pass is single-threaded and runs to completion; on error the
//! partially built graph is discarded.

mod caps;
mod convert;
mod error;
mod packing;
mod support;
mod transpose_conv;

pub use caps::{Capabilities, NpuCapabilities};
pub use convert::{lower_network, LowerOptions, LoweredGraph};
pub use error::LowerError;
pub use support::{BasicSupport, PermissiveOracle, SupportOracle, SupportedLevel};

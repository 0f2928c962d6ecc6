//! Lowered node kinds.
//!
//! Every node in the lowered graph corresponds one-to-one with a
//! hardware-executable primitive. A node carries a common header (output
//! shape, output quantization, activation format, provenance) and a
//! [`NodeKind`] payload.

use std::collections::BTreeSet;

use crate::tensor::{CompilerDataFormat, QuantizationInfo, Stride, TensorInfo, TensorShape};

/// The MCE (multiply/convolve engine) operation performed by an MCE node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MceOperation {
    Convolution,
    DepthwiseConvolution,
    FullyConnected,
}

/// PLE (programmable layer engine) kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PleOperation {
    /// Whole-plane mean over 8x8 regions.
    MeanXy8x8,
    /// 3x3 average pool, stride 1, UDMA variant.
    AvgPool3x3Stride1Udma,
    /// 2x2 max pool, stride 2.
    MaxPool2x2Stride2,
    /// 3x3 max pool, stride 2.
    MaxPool3x3Stride2,
    Sigmoid,
    /// Element-wise addition without rescale.
    Addition,
    /// Element-wise addition with per-input rescale.
    AdditionRescale,
    /// Submap interleave for stride-2 convolution lowering.
    Interleave2x2Stride2,
}

/// A ratio of two integers, used by [`ShapeMultiplier`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fraction {
    pub numerator: u32,
    pub denominator: u32,
}

impl Fraction {
    pub const ONE: Self = Self {
        numerator: 1,
        denominator: 1,
    };

    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

/// Input-to-output spatial/channel ratio of a PLE operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShapeMultiplier {
    pub height: Fraction,
    pub width: Fraction,
    pub channels: u32,
}

impl ShapeMultiplier {
    /// The identity multiplier: output shape equals input shape.
    pub const IDENTITY: Self = Self {
        height: Fraction::ONE,
        width: Fraction::ONE,
        channels: 1,
    };

    pub fn new(height: Fraction, width: Fraction, channels: u32) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }
}

/// Parameters of an MCE node (convolution, depthwise or fully connected).
///
/// The node owns its weight and bias buffers; weight transformations
/// (padding, rotation, synthesis) performed during lowering hand over
/// freshly built vectors.
#[derive(Clone, Debug, PartialEq)]
pub struct MceParams {
    pub input_shape: TensorShape,
    pub weights_info: TensorInfo,
    pub weights_data: Vec<u8>,
    pub bias_info: TensorInfo,
    pub bias_data: Vec<i32>,
    pub stride: Stride,
    pub upscale_factor: u32,
    pub pad_top: u32,
    pub pad_left: u32,
    pub operation: MceOperation,
}

/// The kind-specific payload of a lowered node.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// A network input.
    Input { info: TensorInfo },
    /// A network output. Identifies the source operation that produces the
    /// value, so callers can match network outputs to producers.
    Output {
        producer_id: u32,
        producer_output_index: u32,
    },
    /// Constant data.
    Constant { info: TensorInfo, data: Vec<u8> },
    /// Converts activation data between NHWC and NHWCB.
    FormatConversion,
    /// Metadata-only shape change; no data movement.
    Reinterpret,
    /// Extracts a sub-tensor at `offset` from its input supertensor.
    ExtractSubtensor { offset: TensorShape },
    /// Concatenates all inputs along `axis`.
    Concat { axis: u32 },
    /// Requantizes its input to the node's output quantization.
    Requantize,
    /// Post-processing bolted onto a preceding MCE operation (relu bounds).
    McePostProcess { lower_bound: i32, upper_bound: i32 },
    /// A multiply/convolve engine operation.
    Mce(Box<MceParams>),
    /// A PLE operation fused after an MCE operation in the same pass.
    FuseOnlyPle {
        operation: PleOperation,
        shape_multiplier: ShapeMultiplier,
    },
    /// A PLE operation consuming DRAM input directly.
    StandalonePle { operation: PleOperation },
    /// Placeholder for operations that can only be estimated, not executed.
    EstimateOnly,
}

/// A node in the lowered graph.
#[derive(Clone, Debug)]
pub struct Node {
    /// Output shape of this node.
    pub shape: TensorShape,
    /// Output quantization of this node.
    pub quantization: QuantizationInfo,
    /// Activation format this node produces.
    pub format: CompilerDataFormat,
    /// Ids of the source operations whose lowering created this node.
    pub provenance: BTreeSet<u32>,
    /// Kind-specific payload.
    pub kind: NodeKind,
    /// Incoming edges, in input order. Managed by the graph.
    pub(crate) inputs: Vec<crate::graph::EdgeRef>,
}

impl Node {
    pub fn new(
        kind: NodeKind,
        shape: TensorShape,
        quantization: QuantizationInfo,
        format: CompilerDataFormat,
        source_ids: &[u32],
    ) -> Self {
        Self {
            shape,
            quantization,
            format,
            provenance: source_ids.iter().copied().collect(),
            kind,
            inputs: Vec::new(),
        }
    }
}

//! The operation support oracle.
//!
//! The lowering pass consults the oracle before rewriting a non-trivial
//! operation. The verdict partitions the rewrite: `Supported` runs the
//! kind-specific lowering, `EstimateOnly` emits a placeholder node, and
//! `Unsupported` aborts the pass.

use npuc_ir::{QuantizationInfo, TensorInfo};
use npuc_net::{ConvolutionInfo, PoolingInfo, PoolingType};

/// Three-valued supportedness verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupportedLevel {
    Supported,
    /// The operation cannot execute but its performance can be estimated.
    EstimateOnly,
    Unsupported,
}

/// Per-kind supportedness queries.
///
/// Every method defaults to [`SupportedLevel::Supported`]; implementations
/// override the kinds their hardware restricts.
pub trait SupportOracle {
    fn pooling(&self, _info: &PoolingInfo, _input: &TensorInfo) -> SupportedLevel {
        SupportedLevel::Supported
    }

    fn softmax(&self, _input: &TensorInfo) -> SupportedLevel {
        SupportedLevel::Supported
    }

    fn addition(
        &self,
        _lhs: &TensorInfo,
        _rhs: &TensorInfo,
        _output_quantization: QuantizationInfo,
    ) -> SupportedLevel {
        SupportedLevel::Supported
    }

    fn concatenation(
        &self,
        _inputs: &[TensorInfo],
        _axis: u32,
        _output_quantization: QuantizationInfo,
    ) -> SupportedLevel {
        SupportedLevel::Supported
    }

    fn split(&self, _input: &TensorInfo, _axis: u32, _sizes: &[u32]) -> SupportedLevel {
        SupportedLevel::Supported
    }

    fn convolution(
        &self,
        _bias: &TensorInfo,
        _weights: &TensorInfo,
        _info: &ConvolutionInfo,
        _input: &TensorInfo,
    ) -> SupportedLevel {
        SupportedLevel::Supported
    }

    fn depthwise_convolution(
        &self,
        _bias: &TensorInfo,
        _weights: &TensorInfo,
        _info: &ConvolutionInfo,
        _input: &TensorInfo,
    ) -> SupportedLevel {
        SupportedLevel::Supported
    }

    fn transpose_convolution(
        &self,
        _bias: &TensorInfo,
        _weights: &TensorInfo,
        _info: &ConvolutionInfo,
        _input: &TensorInfo,
    ) -> SupportedLevel {
        SupportedLevel::Supported
    }
}

/// An oracle that accepts everything. Useful for tests and estimation runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct PermissiveOracle;

impl SupportOracle for PermissiveOracle {}

/// Reference oracle applying the structural restrictions the rewrite rules
/// rely on.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicSupport;

impl SupportOracle for BasicSupport {
    fn pooling(&self, info: &PoolingInfo, input: &TensorInfo) -> SupportedLevel {
        let is_mean = info.pooling_type == PoolingType::Avg
            && info.size_x == input.dimensions[2]
            && info.size_y == input.dimensions[1]
            && info.padding == npuc_ir::Padding::default();
        let known = is_mean
            || matches!(
                (
                    info.size_x,
                    info.size_y,
                    info.stride_x,
                    info.stride_y,
                    info.pooling_type,
                ),
                (3, 3, 1, 1, PoolingType::Avg)
                    | (2, 2, 2, 2, PoolingType::Max)
                    | (3, 3, 2, 2, PoolingType::Max)
            );
        if known {
            SupportedLevel::Supported
        } else {
            SupportedLevel::Unsupported
        }
    }

    fn softmax(&self, _input: &TensorInfo) -> SupportedLevel {
        // No PLE kernel exists for softmax.
        SupportedLevel::EstimateOnly
    }

    fn convolution(
        &self,
        _bias: &TensorInfo,
        _weights: &TensorInfo,
        info: &ConvolutionInfo,
        _input: &TensorInfo,
    ) -> SupportedLevel {
        if info.stride.x == info.stride.y && (info.stride.x == 1 || info.stride.x == 2) {
            SupportedLevel::Supported
        } else {
            SupportedLevel::Unsupported
        }
    }

    fn depthwise_convolution(
        &self,
        bias: &TensorInfo,
        weights: &TensorInfo,
        info: &ConvolutionInfo,
        input: &TensorInfo,
    ) -> SupportedLevel {
        // Channel multiplier > 1 is only expressible as a regular
        // convolution when there is a single input channel.
        if weights.dimensions[3] > 1 && weights.dimensions[2] != 1 {
            return SupportedLevel::Unsupported;
        }
        self.convolution(bias, weights, info, input)
    }

    fn transpose_convolution(
        &self,
        _bias: &TensorInfo,
        weights: &TensorInfo,
        info: &ConvolutionInfo,
        _input: &TensorInfo,
    ) -> SupportedLevel {
        // The internal convolution padding is kernel - 1 - user padding
        // and must not go negative.
        let padding_fits = info.padding.top + 1 <= weights.dimensions[0]
            && info.padding.left + 1 <= weights.dimensions[1];
        if info.stride.x == info.stride.y && info.stride.x == 2 && padding_fits {
            SupportedLevel::Supported
        } else {
            SupportedLevel::Unsupported
        }
    }
}

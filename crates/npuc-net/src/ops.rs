//! Source operation kinds and their parameter structs.

use npuc_ir::{DataFormat, Padding, QuantizationInfo, Stride, TensorInfo};

/// A constant tensor embedded in an operation (weights, bias).
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantTensor {
    pub info: TensorInfo,
    pub data: Vec<u8>,
}

impl ConstantTensor {
    pub fn new(info: TensorInfo, data: Vec<u8>) -> Self {
        Self { info, data }
    }

    /// Builds a constant from `i32` values, stored little-endian.
    pub fn from_i32(info: TensorInfo, values: &[i32]) -> Self {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self { info, data }
    }

    /// Reads the data as little-endian `i32` values.
    ///
    /// # Panics
    ///
    /// Panics if the data length is not a multiple of 4.
    pub fn to_i32_vec(&self) -> Vec<i32> {
        assert!(
            self.data.len() % 4 == 0,
            "constant of {} bytes cannot be read as i32",
            self.data.len()
        );
        self.data
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }
}

/// Stride and padding of a (transpose) convolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConvolutionInfo {
    pub padding: Padding,
    pub stride: Stride,
}

impl ConvolutionInfo {
    pub fn new(padding: Padding, stride: Stride) -> Self {
        Self { padding, stride }
    }
}

/// Pooling flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolingType {
    Max,
    Avg,
}

/// Full pooling configuration. Compared structurally by the lowering
/// pattern match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolingInfo {
    pub size_x: u32,
    pub size_y: u32,
    pub stride_x: u32,
    pub stride_y: u32,
    pub padding: Padding,
    pub pooling_type: PoolingType,
}

/// The kind of a source operation, with kind-specific parameters.
#[derive(Clone, Debug)]
pub enum OpKind {
    Input {
        info: TensorInfo,
    },
    /// Declares a network output with the given external format.
    Output {
        format: DataFormat,
    },
    Constant {
        info: TensorInfo,
        data: Vec<u8>,
    },
    Convolution {
        weights: ConstantTensor,
        bias: ConstantTensor,
        info: ConvolutionInfo,
    },
    DepthwiseConvolution {
        weights: ConstantTensor,
        bias: ConstantTensor,
        info: ConvolutionInfo,
    },
    TransposeConvolution {
        weights: ConstantTensor,
        bias: ConstantTensor,
        info: ConvolutionInfo,
    },
    FullyConnected {
        weights: ConstantTensor,
        bias: ConstantTensor,
    },
    Relu {
        lower_bound: i32,
        upper_bound: i32,
    },
    Sigmoid,
    Softmax,
    Pooling(PoolingInfo),
    Reshape,
    DepthToSpace {
        block_size: u32,
    },
    Addition,
    Concatenation {
        axis: u32,
        output_quantization: QuantizationInfo,
    },
    Split {
        axis: u32,
        sizes: Vec<u32>,
    },
    /// An operation the oracle classified as estimate-only at network
    /// construction time.
    EstimateOnly {
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use npuc_ir::{DataType, QuantizationInfo};

    #[test]
    fn i32_round_trip() {
        let info = TensorInfo::new(
            [1, 1, 1, 3],
            DataType::Int32Quantized,
            DataFormat::Nhwc,
            QuantizationInfo::default(),
        );
        let c = ConstantTensor::from_i32(info, &[-1, 0, 300]);
        assert_eq!(c.data.len(), 12);
        assert_eq!(c.to_i32_vec(), vec![-1, 0, 300]);
    }

    #[test]
    fn pooling_info_structural_equality() {
        let a = PoolingInfo {
            size_x: 2,
            size_y: 2,
            stride_x: 2,
            stride_y: 2,
            padding: Padding::default(),
            pooling_type: PoolingType::Max,
        };
        let mut b = a;
        assert_eq!(a, b);
        b.stride_x = 1;
        assert_ne!(a, b);
    }
}

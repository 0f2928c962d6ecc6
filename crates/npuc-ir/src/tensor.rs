//! Tensor and quantization descriptors.
//!
//! Shapes are 4-vectors in NHWC order throughout the compiler. Weight
//! tensors additionally distinguish per-output (HWIO) from per-multiplier
//! (HWIM) indexing.

use std::fmt;

/// A 4-dimensional tensor shape in NHWC order.
pub type TensorShape = [u32; 4];

/// Element type of a tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    /// 8-bit quantized unsigned integer.
    Uint8Quantized,
    /// 32-bit quantized signed integer (bias data).
    Int32Quantized,
}

impl DataType {
    /// Size of one element in bytes.
    pub fn size_bytes(self) -> u32 {
        match self {
            Self::Uint8Quantized => 1,
            Self::Int32Quantized => 4,
        }
    }
}

/// External data format, as declared on network tensors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataFormat {
    /// Batch, height, width, channels.
    Nhwc,
    /// Brick-group tiled layout used by the hardware.
    Nhwcb,
    /// Weight layout indexed per output channel.
    Hwio,
    /// Weight layout indexed per channel multiplier.
    Hwim,
}

/// Activation data format inside the lowered graph.
///
/// Only the two activation layouts survive lowering; weight formats are
/// carried on the weight tensor infos of MCE nodes instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompilerDataFormat {
    Nhwc,
    Nhwcb,
}

impl fmt::Display for CompilerDataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Nhwc => "NHWC",
            Self::Nhwcb => "NHWCB",
        })
    }
}

impl DataFormat {
    /// Maps an external activation format to its compiler equivalent.
    ///
    /// # Panics
    ///
    /// Panics on weight formats (HWIO/HWIM), which never describe
    /// activation tensors.
    pub fn to_compiler(self) -> CompilerDataFormat {
        match self {
            Self::Nhwc => CompilerDataFormat::Nhwc,
            Self::Nhwcb => CompilerDataFormat::Nhwcb,
            Self::Hwio | Self::Hwim => {
                panic!("weight format {self:?} has no compiler activation equivalent")
            }
        }
    }
}

/// Affine quantization parameters: `real = scale * (stored - zero_point)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuantizationInfo {
    pub zero_point: i32,
    pub scale: f32,
}

impl QuantizationInfo {
    pub fn new(zero_point: i32, scale: f32) -> Self {
        Self { zero_point, scale }
    }
}

impl Default for QuantizationInfo {
    fn default() -> Self {
        Self {
            zero_point: 0,
            scale: 1.0,
        }
    }
}

/// Full description of a tensor: shape, element type, layout and
/// quantization.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorInfo {
    pub dimensions: TensorShape,
    pub data_type: DataType,
    pub format: DataFormat,
    pub quantization: QuantizationInfo,
}

impl TensorInfo {
    pub fn new(
        dimensions: TensorShape,
        data_type: DataType,
        format: DataFormat,
        quantization: QuantizationInfo,
    ) -> Self {
        Self {
            dimensions,
            data_type,
            format,
            quantization,
        }
    }

    /// Total number of elements.
    pub fn num_elements(&self) -> u32 {
        num_elements(self.dimensions)
    }

    /// Total size of the tensor data in bytes.
    pub fn total_size_bytes(&self) -> usize {
        self.num_elements() as usize * self.data_type.size_bytes() as usize
    }
}

/// Convolution stride. The default stride is 1x1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stride {
    pub x: u32,
    pub y: u32,
}

impl Stride {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl Default for Stride {
    fn default() -> Self {
        Self { x: 1, y: 1 }
    }
}

/// Spatial padding applied around the height/width plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Padding {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl Padding {
    pub fn new(top: u32, bottom: u32, left: u32, right: u32) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }
}

/// Number of elements in a shape.
pub fn num_elements(shape: TensorShape) -> u32 {
    shape.iter().product()
}

/// Integer division rounding towards positive infinity.
pub fn div_round_up(numerator: u32, denominator: u32) -> u32 {
    (numerator + denominator - 1) / denominator
}

/// Rounds `value` up to the nearest multiple of `multiple`.
pub fn round_up_to_multiple(value: u32, multiple: u32) -> u32 {
    div_round_up(value, multiple) * multiple
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_counts() {
        assert_eq!(num_elements([1, 8, 8, 16]), 1024);
        assert_eq!(num_elements([1, 1, 1, 1]), 1);
    }

    #[test]
    fn total_size_respects_data_type() {
        let info = TensorInfo::new(
            [1, 1, 1, 32],
            DataType::Int32Quantized,
            DataFormat::Nhwc,
            QuantizationInfo::default(),
        );
        assert_eq!(info.total_size_bytes(), 128);
    }

    #[test]
    fn rounding_helpers() {
        assert_eq!(div_round_up(7, 2), 4);
        assert_eq!(div_round_up(8, 2), 4);
        assert_eq!(round_up_to_multiple(1, 1024), 1024);
        assert_eq!(round_up_to_multiple(1024, 1024), 1024);
        assert_eq!(round_up_to_multiple(1025, 1024), 2048);
    }

    #[test]
    fn external_to_compiler_format() {
        assert_eq!(DataFormat::Nhwc.to_compiler(), CompilerDataFormat::Nhwc);
        assert_eq!(DataFormat::Nhwcb.to_compiler(), CompilerDataFormat::Nhwcb);
    }

    #[test]
    #[should_panic(expected = "no compiler activation equivalent")]
    fn weight_format_has_no_compiler_equivalent() {
        DataFormat::Hwio.to_compiler();
    }

    #[test]
    fn default_stride_is_one() {
        assert_eq!(Stride::default(), Stride::new(1, 1));
    }
}

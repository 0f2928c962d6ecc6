//! Hardware capability queries consumed by the lowering pass.

use npuc_ir::{div_round_up, TensorShape};

/// Read-only hardware parameters the rewrite rules depend on.
pub trait Capabilities {
    /// The brick-group shape `(1, height, width, channels)` of the NHWCB
    /// layout.
    fn brick_group_shape(&self) -> TensorShape;

    /// Channel count of the interleaved tensor produced when a stride
    /// `(stride_x, stride_y)` convolution is decomposed into sub-maps.
    fn num_submap_channels(&self, channels: u32, stride_x: u32, stride_y: u32) -> u32;
}

/// Capabilities of a concrete NPU configuration.
#[derive(Clone, Copy, Debug)]
pub struct NpuCapabilities {
    brick_group_shape: TensorShape,
    num_srams: u32,
}

impl NpuCapabilities {
    pub fn new(brick_group_shape: TensorShape, num_srams: u32) -> Self {
        Self {
            brick_group_shape,
            num_srams,
        }
    }
}

impl Default for NpuCapabilities {
    fn default() -> Self {
        Self::new([1, 8, 8, 16], 16)
    }
}

impl Capabilities for NpuCapabilities {
    fn brick_group_shape(&self) -> TensorShape {
        self.brick_group_shape
    }

    fn num_submap_channels(&self, channels: u32, stride_x: u32, stride_y: u32) -> u32 {
        let interleave_factor = stride_x * stride_y;
        if channels % self.num_srams == 0 {
            channels * interleave_factor
        } else {
            // Partially filled SRAM banks in each sub-map group collapse
            // onto the channel remainder of the final group.
            (div_round_up(channels, self.num_srams) * interleave_factor - 1) * self.num_srams
                + channels % self.num_srams
        }
    }
}

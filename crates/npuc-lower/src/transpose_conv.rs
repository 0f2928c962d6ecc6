//! Shared lowering of transpose convolution.
//!
//! A transpose convolution is realised as zero-upsampling (the MCE upscale
//! factor) followed by an ordinary convolution over 180-degree-rotated
//! weights. Depth-to-space reuses this builder with synthesised weights.

use npuc_ir::{
    CompilerDataFormat, DataFormat, DataType, Graph, MceOperation, MceParams, Node, NodeKind,
    NodeRef, Padding, QuantizationInfo, Stride, TensorInfo, TensorShape,
};

/// Builds the lowered node chain for a transpose convolution.
///
/// The user padding crops the transpose convolution's output, so the
/// internal convolution needs `kernel - 1 - user_padding` input padding for
/// its first output element to depend only on the first input element.
/// Negative values are ruled out by the support oracle.
///
/// Upscaling cannot be combined with kernels larger than 7x7; those split
/// the upscale into a leading identity depthwise pass.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_transpose_conv(
    graph: &mut Graph,
    stride: Stride,
    weights_info: &TensorInfo,
    weights_data: &[u8],
    bias_info: TensorInfo,
    bias_data: Vec<i32>,
    padding: Padding,
    input_info: &TensorInfo,
    output_info: &TensorInfo,
    source_operation_id: u32,
) -> Vec<NodeRef> {
    // The stride is the upscaling factor; the convolution underneath always
    // runs at stride 1. Square strides only.
    assert_eq!(
        stride.x, stride.y,
        "transpose convolution requires a square stride"
    );
    let mut upscale_factor = stride.x;
    let weights_shape = weights_info.dimensions;

    let top_mce_padding = weights_shape[0] - 1 - padding.top;
    let left_mce_padding = weights_shape[1] - 1 - padding.left;

    let mut nodes = Vec::new();
    let mut input_shape = input_info.dimensions;

    if weights_shape[0] > 7 || weights_shape[1] > 7 {
        let intermediate_shape = [
            input_shape[0],
            input_shape[1] * upscale_factor,
            input_shape[2] * upscale_factor,
            input_shape[3],
        ];
        log::debug!(
            "transpose conv kernel {}x{} too large to upscale in one pass, \
             inserting identity depthwise upscale to {intermediate_shape:?}",
            weights_shape[0],
            weights_shape[1],
        );

        let num_ifm = input_shape[3];
        // Identity weights of value 2 at scale 0.5 multiply to exactly 1.
        let weight_scale = 0.5;
        let bias_scale = weight_scale * input_info.quantization.scale;
        let identity_weights_info = TensorInfo::new(
            [1, 1, num_ifm, 1],
            DataType::Uint8Quantized,
            DataFormat::Hwim,
            QuantizationInfo::new(0, weight_scale),
        );
        let identity_bias_info = TensorInfo::new(
            [1, 1, 1, num_ifm],
            DataType::Int32Quantized,
            DataFormat::Nhwc,
            QuantizationInfo::new(0, bias_scale),
        );

        nodes.push(graph.add_node(Node::new(
            NodeKind::Mce(Box::new(MceParams {
                input_shape,
                weights_info: identity_weights_info,
                weights_data: vec![2; num_ifm as usize],
                bias_info: identity_bias_info,
                bias_data: vec![0; num_ifm as usize],
                stride: Stride::default(),
                upscale_factor,
                pad_top: 0,
                pad_left: 0,
                operation: MceOperation::DepthwiseConvolution,
            })),
            intermediate_shape,
            input_info.quantization,
            CompilerDataFormat::Nhwcb,
            &[source_operation_id],
        )));

        upscale_factor = 1;
        input_shape = intermediate_shape;
    }

    let flipped_weights = rotate_weights_xy(weights_data, weights_shape);

    nodes.push(graph.add_node(Node::new(
        NodeKind::Mce(Box::new(MceParams {
            input_shape,
            weights_info: weights_info.clone(),
            weights_data: flipped_weights,
            bias_info,
            bias_data,
            stride: Stride::default(),
            upscale_factor,
            pad_top: top_mce_padding,
            pad_left: left_mce_padding,
            operation: MceOperation::Convolution,
        })),
        output_info.dimensions,
        output_info.quantization,
        CompilerDataFormat::Nhwcb,
        &[source_operation_id],
    )));

    nodes
}

/// Rotates weights 180 degrees in the XY plane. The trailing two
/// dimensions move together as one contiguous block.
pub(crate) fn rotate_weights_xy(data: &[u8], shape: TensorShape) -> Vec<u8> {
    let kernel_height = shape[0] as usize;
    let kernel_width = shape[1] as usize;
    let block = (shape[2] * shape[3]) as usize;
    assert_eq!(data.len(), kernel_height * kernel_width * block);

    let mut flipped = vec![0u8; data.len()];
    for y in 0..kernel_height {
        for x in 0..kernel_width {
            let src = (y * kernel_width + x) * block;
            let dst = ((kernel_height - 1 - y) * kernel_width + (kernel_width - 1 - x)) * block;
            flipped[dst..dst + block].copy_from_slice(&data[src..src + block]);
        }
    }
    flipped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_reverses_xy() {
        // 2x2 kernel, 1 input channel, 1 output channel.
        let original = vec![1, 2, 3, 4];
        let flipped = rotate_weights_xy(&original, [2, 2, 1, 1]);
        assert_eq!(flipped, vec![4, 3, 2, 1]);
    }

    #[test]
    fn rotation_moves_channel_blocks_whole() {
        // 2x1 kernel with a 3-byte channel block per tap.
        let original = vec![1, 2, 3, 4, 5, 6];
        let flipped = rotate_weights_xy(&original, [2, 1, 3, 1]);
        assert_eq!(flipped, vec![4, 5, 6, 1, 2, 3]);
    }

    #[test]
    fn double_rotation_is_identity() {
        let original: Vec<u8> = (0..3 * 3 * 2 * 2).map(|v| v as u8).collect();
        let once = rotate_weights_xy(&original, [3, 3, 2, 2]);
        let twice = rotate_weights_xy(&once, [3, 3, 2, 2]);
        assert_eq!(twice, original);
    }
}

//! The network-to-graph conversion pass.
//!
//! Walks the source network in topological order and rewrites each
//! operation into a chain of lowered nodes. Each rule consults the support
//! oracle where applicable, emits its chain, and wires the chain to the
//! producers recorded in the operand map.

use std::collections::HashMap;

use npuc_ir::{
    div_round_up, round_up_to_multiple, CompilerDataFormat, DataFormat, Fraction, Graph,
    MceOperation, MceParams, Node, NodeKind, NodeRef, Padding, PleOperation, QuantizationInfo,
    ShapeMultiplier, Stride, TensorInfo,
};
use npuc_net::{
    ConstantTensor, ConvolutionInfo, Network, OpKind, OperandRef, Operation, PoolingInfo,
    PoolingType,
};

use crate::caps::Capabilities;
use crate::error::LowerError;
use crate::packing::{pad, shape_containing_linear_elements};
use crate::support::{SupportOracle, SupportedLevel};
use crate::transpose_conv::build_transpose_conv;

/// Options controlling the conversion pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct LowerOptions {
    /// In estimation mode structural rejections are relaxed so that every
    /// network can be lowered to something downstream can estimate.
    pub estimation_mode: bool,
}

/// The result of a successful conversion: the lowered graph plus the
/// binding of every source operand to the node producing its value.
#[derive(Clone, Debug)]
pub struct LoweredGraph {
    pub graph: Graph,
    pub operand_map: HashMap<OperandRef, NodeRef>,
}

/// Lowers a source network onto the hardware primitive graph.
pub fn lower_network(
    network: &Network,
    capabilities: &dyn Capabilities,
    support: &dyn SupportOracle,
    options: LowerOptions,
) -> Result<LoweredGraph, LowerError> {
    let mut converter = Converter {
        network,
        capabilities,
        support,
        options,
        graph: Graph::new(),
        operand_map: HashMap::new(),
    };

    for operation in network.operations() {
        converter.lower_operation(operation)?;
    }

    log::debug!(
        "lowered {} operations into {} nodes and {} edges",
        network.operation_count(),
        converter.graph.node_count(),
        converter.graph.edge_count(),
    );

    Ok(LoweredGraph {
        graph: converter.graph,
        operand_map: converter.operand_map,
    })
}

struct Converter<'a> {
    network: &'a Network,
    capabilities: &'a dyn Capabilities,
    support: &'a dyn SupportOracle,
    options: LowerOptions,
    graph: Graph,
    operand_map: HashMap<OperandRef, NodeRef>,
}

impl<'a> Converter<'a> {
    fn lower_operation(&mut self, op: &Operation) -> Result<(), LowerError> {
        match &op.kind {
            OpKind::Input { info } => self.lower_input(op, info),
            OpKind::Output { format } => self.lower_output(op, *format),
            OpKind::Constant { info, data } => self.lower_constant(op, info, data),
            OpKind::Convolution {
                weights,
                bias,
                info,
            } => self.lower_convolution(op, weights, bias, info),
            OpKind::DepthwiseConvolution {
                weights,
                bias,
                info,
            } => self.lower_depthwise_convolution(op, weights, bias, info),
            OpKind::TransposeConvolution {
                weights,
                bias,
                info,
            } => self.lower_transpose_convolution(op, weights, bias, info),
            OpKind::FullyConnected { weights, bias } => {
                self.lower_fully_connected(op, weights, bias)
            }
            OpKind::Relu {
                lower_bound,
                upper_bound,
            } => self.lower_relu(op, *lower_bound, *upper_bound),
            OpKind::Sigmoid => self.lower_sigmoid(op),
            OpKind::Softmax => self.lower_softmax(op),
            OpKind::Pooling(info) => self.lower_pooling(op, info),
            OpKind::Reshape => self.lower_reshape(op),
            OpKind::DepthToSpace { block_size } => self.lower_depth_to_space(op, *block_size),
            OpKind::Addition => self.lower_addition(op),
            OpKind::Concatenation {
                axis,
                output_quantization,
            } => self.lower_concatenation(op, *axis, *output_quantization),
            OpKind::Split { axis, sizes } => self.lower_split(op, *axis, sizes),
            OpKind::EstimateOnly { .. } => self.lower_estimate_only(op),
        }
    }

    // -----------------------------------------------------------------
    // Wiring helpers
    // -----------------------------------------------------------------

    /// Node currently producing `operand`.
    fn producer_node(&self, operand: OperandRef) -> NodeRef {
        *self
            .operand_map
            .get(&operand)
            .expect("operand not lowered yet; network must be topologically ordered")
    }

    fn input_info(&self, op: &Operation, index: usize) -> &'a TensorInfo {
        self.network.operand_info(op.inputs[index])
    }

    fn input_format(&self, op: &Operation, index: usize) -> CompilerDataFormat {
        self.graph.node(self.producer_node(op.inputs[index])).format
    }

    fn connect_node(&mut self, op: &Operation, node: NodeRef) {
        self.connect_node_chain(op, &[node]);
    }

    /// Connects the chain internally, wires every input operand's producer
    /// to the chain head, and binds the operation's output to the tail.
    fn connect_node_chain(&mut self, op: &Operation, chain: &[NodeRef]) {
        // Multi-output operations wire their outputs themselves, since the
        // chain tail can only stand for a single output.
        assert!(op.outputs.len() <= 1, "chain connection requires <= 1 output");

        for pair in chain.windows(2) {
            self.graph.connect(pair[0], pair[1]);
        }
        for &input in &op.inputs {
            let producer = self.producer_node(input);
            self.graph.connect(producer, chain[0]);
        }
        if !op.outputs.is_empty() {
            self.operand_map.insert(
                OperandRef {
                    op: op.id,
                    index: 0,
                },
                *chain.last().unwrap(),
            );
        }
    }

    /// Emits the placeholder node used when the oracle verdict is
    /// `EstimateOnly`.
    fn emit_estimate_only_node(&mut self, op: &Operation) {
        let out = &op.outputs[0];
        let node = self.graph.add_node(Node::new(
            NodeKind::EstimateOnly,
            out.dimensions,
            out.quantization,
            CompilerDataFormat::Nhwcb,
            &[op.id],
        ));
        self.connect_node(op, node);
    }

    /// Applies an oracle verdict. Returns `Ok(true)` when the kind-specific
    /// lowering should proceed.
    fn apply_verdict(
        &mut self,
        op: &Operation,
        verdict: SupportedLevel,
        what: &str,
    ) -> Result<bool, LowerError> {
        match verdict {
            SupportedLevel::Supported => Ok(true),
            SupportedLevel::EstimateOnly => {
                self.emit_estimate_only_node(op);
                Ok(false)
            }
            SupportedLevel::Unsupported => Err(LowerError::NotSupported(what.to_string())),
        }
    }

    // -----------------------------------------------------------------
    // Per-kind rules
    // -----------------------------------------------------------------

    fn lower_input(&mut self, op: &Operation, info: &TensorInfo) -> Result<(), LowerError> {
        let mut chain = Vec::new();
        let format = info.format.to_compiler();
        chain.push(self.graph.add_node(Node::new(
            NodeKind::Input { info: info.clone() },
            info.dimensions,
            info.quantization,
            format,
            &[op.id],
        )));

        // Operations work best on NHWCB, so convert up front if needed.
        if format != CompilerDataFormat::Nhwcb {
            let out = &op.outputs[0];
            chain.push(self.graph.add_node(Node::new(
                NodeKind::FormatConversion,
                out.dimensions,
                out.quantization,
                CompilerDataFormat::Nhwcb,
                &[op.id],
            )));
        }
        self.connect_node_chain(op, &chain);
        Ok(())
    }

    fn lower_output(&mut self, op: &Operation, format: DataFormat) -> Result<(), LowerError> {
        let producer = op.inputs[0];
        let info = self.input_info(op, 0);
        let target = format.to_compiler();

        // Both nodes carry the *producer's* id so that downstream stages can
        // identify which producing operation each network output belongs to.
        let mut chain = Vec::new();
        if self.input_format(op, 0) != target {
            chain.push(self.graph.add_node(Node::new(
                NodeKind::FormatConversion,
                info.dimensions,
                info.quantization,
                target,
                &[producer.op],
            )));
        }
        chain.push(self.graph.add_node(Node::new(
            NodeKind::Output {
                producer_id: producer.op,
                producer_output_index: producer.index,
            },
            info.dimensions,
            info.quantization,
            target,
            &[producer.op],
        )));
        self.connect_node_chain(op, &chain);
        Ok(())
    }

    fn lower_constant(
        &mut self,
        op: &Operation,
        info: &TensorInfo,
        data: &[u8],
    ) -> Result<(), LowerError> {
        let node = self.graph.add_node(Node::new(
            NodeKind::Constant {
                info: info.clone(),
                data: data.to_vec(),
            },
            info.dimensions,
            info.quantization,
            info.format.to_compiler(),
            &[op.id],
        ));
        self.connect_node(op, node);
        Ok(())
    }

    fn lower_relu(
        &mut self,
        op: &Operation,
        lower_bound: i32,
        upper_bound: i32,
    ) -> Result<(), LowerError> {
        let out = &op.outputs[0];
        let node = self.graph.add_node(Node::new(
            NodeKind::McePostProcess {
                lower_bound,
                upper_bound,
            },
            out.dimensions,
            out.quantization,
            CompilerDataFormat::Nhwcb,
            &[op.id],
        ));
        self.connect_node(op, node);
        Ok(())
    }

    fn lower_sigmoid(&mut self, op: &Operation) -> Result<(), LowerError> {
        let out = &op.outputs[0];
        let node = self.graph.add_node(Node::new(
            NodeKind::FuseOnlyPle {
                operation: PleOperation::Sigmoid,
                shape_multiplier: ShapeMultiplier::IDENTITY,
            },
            out.dimensions,
            out.quantization,
            CompilerDataFormat::Nhwcb,
            &[op.id],
        ));
        self.connect_node(op, node);
        Ok(())
    }

    fn lower_softmax(&mut self, op: &Operation) -> Result<(), LowerError> {
        // The only lowering softmax has is the estimate-only placeholder.
        if self.support.softmax(self.input_info(op, 0)) == SupportedLevel::EstimateOnly {
            self.emit_estimate_only_node(op);
            return Ok(());
        }
        Err(LowerError::NotImplemented("softmax".to_string()))
    }

    fn lower_pooling(&mut self, op: &Operation, info: &PoolingInfo) -> Result<(), LowerError> {
        let input = self.input_info(op, 0);
        let verdict = self.support.pooling(info, input);
        if !self.apply_verdict(op, verdict, "pooling")? {
            return Ok(());
        }

        let input_height = input.dimensions[1];
        let input_width = input.dimensions[2];
        let out = op.outputs[0].clone();

        // A whole-plane average pool with no padding is a mean.
        let mean_info = PoolingInfo {
            size_x: input_width,
            size_y: input_height,
            stride_x: info.stride_x,
            stride_y: info.stride_y,
            padding: Padding::default(),
            pooling_type: PoolingType::Avg,
        };

        let fuse_only = |operation: PleOperation| {
            NodeKind::FuseOnlyPle {
                operation,
                shape_multiplier: ShapeMultiplier::new(
                    Fraction::new(1, info.stride_y),
                    Fraction::new(1, info.stride_x),
                    1,
                ),
            }
        };

        let kind = if *info == mean_info {
            fuse_only(PleOperation::MeanXy8x8)
        } else if *info == pattern(3, 3, 1, 1, info.padding, PoolingType::Avg) {
            NodeKind::StandalonePle {
                operation: PleOperation::AvgPool3x3Stride1Udma,
            }
        } else if *info == pattern(2, 2, 2, 2, info.padding, PoolingType::Max) {
            fuse_only(PleOperation::MaxPool2x2Stride2)
        } else if *info == pattern(3, 3, 2, 2, info.padding, PoolingType::Max) {
            fuse_only(PleOperation::MaxPool3x3Stride2)
        } else {
            return Err(LowerError::NotSupported(format!(
                "pooling {}x{} stride {}x{}",
                info.size_x, info.size_y, info.stride_x, info.stride_y
            )));
        };

        let node = self.graph.add_node(Node::new(
            kind,
            out.dimensions,
            out.quantization,
            CompilerDataFormat::Nhwcb,
            &[op.id],
        ));
        self.connect_node(op, node);
        Ok(())
    }

    fn lower_reshape(&mut self, op: &Operation) -> Result<(), LowerError> {
        let input = self.input_info(op, 0);
        let out = op.outputs[0].clone();
        let mut chain = Vec::new();

        // Convert to NHWC if necessary, reinterpret to the new shape, then
        // convert back to NHWCB.
        if self.input_format(op, 0) != CompilerDataFormat::Nhwc {
            chain.push(self.graph.add_node(Node::new(
                NodeKind::FormatConversion,
                input.dimensions,
                input.quantization,
                CompilerDataFormat::Nhwc,
                &[op.id],
            )));
        }
        chain.push(self.graph.add_node(Node::new(
            NodeKind::Reinterpret,
            out.dimensions,
            out.quantization,
            CompilerDataFormat::Nhwc,
            &[op.id],
        )));
        chain.push(self.graph.add_node(Node::new(
            NodeKind::FormatConversion,
            out.dimensions,
            out.quantization,
            CompilerDataFormat::Nhwcb,
            &[op.id],
        )));
        self.connect_node_chain(op, &chain);
        Ok(())
    }

    fn lower_fully_connected(
        &mut self,
        op: &Operation,
        weights: &ConstantTensor,
        bias: &ConstantTensor,
    ) -> Result<(), LowerError> {
        let input = self.input_info(op, 0);
        let out = op.outputs[0].clone();
        let mut chain = Vec::new();

        // Fully connected input must be NHWC.
        if self.input_format(op, 0) != CompilerDataFormat::Nhwc {
            chain.push(self.graph.add_node(Node::new(
                NodeKind::FormatConversion,
                input.dimensions,
                input.quantization,
                CompilerDataFormat::Nhwc,
                &[op.id],
            )));
        }

        // Reinterpret as NHWCB so the data is copied into SRAM without
        // conversion: pick the smallest shape covering the linear elements
        // in brick format.
        let reinterpreted_input = shape_containing_linear_elements(
            self.capabilities.brick_group_shape(),
            input.dimensions[3],
        );
        chain.push(self.graph.add_node(Node::new(
            NodeKind::Reinterpret,
            reinterpreted_input,
            input.quantization,
            CompilerDataFormat::Nhwcb,
            &[op.id],
        )));

        // The weight encoder requires the input channel count to be a
        // multiple of 1024; pad with the weights' zero point.
        let mut weights_info = weights.info.clone();
        weights_info.dimensions[2] = round_up_to_multiple(weights_info.dimensions[2], 1024);
        let padded_weights = pad(
            &weights.data,
            weights_info.total_size_bytes(),
            weights.info.quantization.zero_point as u8,
        );

        chain.push(self.graph.add_node(Node::new(
            NodeKind::Mce(Box::new(MceParams {
                input_shape: input.dimensions,
                weights_info,
                weights_data: padded_weights,
                bias_info: bias.info.clone(),
                bias_data: bias.to_i32_vec(),
                stride: Stride::default(),
                upscale_factor: 1,
                pad_top: 0,
                pad_left: 0,
                operation: MceOperation::FullyConnected,
            })),
            out.dimensions,
            out.quantization,
            CompilerDataFormat::Nhwcb,
            &[op.id],
        )));
        self.connect_node_chain(op, &chain);
        Ok(())
    }

    fn lower_addition(&mut self, op: &Operation) -> Result<(), LowerError> {
        let lhs = self.input_info(op, 0);
        let rhs = self.input_info(op, 1);
        let out = op.outputs[0].clone();

        let verdict = self.support.addition(lhs, rhs, out.quantization);
        if !self.apply_verdict(op, verdict, "addition")? {
            return Ok(());
        }

        // The non-scaling kernel is only usable when both inputs and the
        // output share one quantization.
        let identical_quantization =
            lhs.quantization == rhs.quantization && lhs.quantization == out.quantization;
        let operation = if identical_quantization {
            PleOperation::Addition
        } else {
            PleOperation::AdditionRescale
        };

        let node = self.graph.add_node(Node::new(
            NodeKind::StandalonePle { operation },
            out.dimensions,
            out.quantization,
            CompilerDataFormat::Nhwcb,
            &[op.id],
        ));
        self.connect_node(op, node);
        Ok(())
    }

    fn lower_concatenation(
        &mut self,
        op: &Operation,
        axis: u32,
        output_quantization: QuantizationInfo,
    ) -> Result<(), LowerError> {
        let input_infos: Vec<TensorInfo> = op
            .inputs
            .iter()
            .map(|&operand| self.network.operand_info(operand).clone())
            .collect();
        let verdict = self
            .support
            .concatenation(&input_infos, axis, output_quantization);

        // Shared inputs cannot be concatenated (the DMA writes each input
        // tensor into its slot of the output supertensor). Estimation does
        // not care, so only reject outside estimation mode.
        for &input in &op.inputs {
            if self.network.consumer_count(input) > 1 && !self.options.estimation_mode {
                return Err(LowerError::NotSupported(
                    "inputs to concatenation cannot be connected to multiple operations"
                        .to_string(),
                ));
            }
        }

        if !self.apply_verdict(op, verdict, "concatenation")? {
            return Ok(());
        }

        // NHWCB is only usable when the DMA can place every input at its
        // offset, i.e. all dimensions along the axis are brick aligned.
        let brick_group = self.capabilities.brick_group_shape();
        let mut format = CompilerDataFormat::Nhwcb;
        for info in &input_infos {
            if info.dimensions[axis as usize] % brick_group[axis as usize] != 0 {
                format = CompilerDataFormat::Nhwc;
                break;
            }
        }
        log::debug!(
            "concatenation {} on axis {axis} uses {format}",
            op.id,
        );

        let out = op.outputs[0].clone();
        let node = self.graph.add_node(Node::new(
            NodeKind::Concat { axis },
            out.dimensions,
            output_quantization,
            format,
            &[op.id],
        ));
        self.connect_node(op, node);

        // Two-phase edge splicing: identify all edges first, then splice,
        // so the node's input list is not rewritten while being scanned.
        let mut conversions = Vec::new();
        for (index, info) in input_infos.iter().enumerate() {
            let edge = self.graph.input_edge(node, index);
            if self.graph.producer_format(edge) != format {
                let conversion = self.graph.add_node(Node::new(
                    NodeKind::FormatConversion,
                    info.dimensions,
                    info.quantization,
                    format,
                    &[op.id],
                ));
                conversions.push((edge, conversion));
            }
        }
        for (edge, conversion) in conversions {
            self.graph.split_edge(edge, conversion);
        }

        // The concat node assumes one quantization across all inputs and
        // the output; requantize any input that differs.
        let target_quantization = out.quantization;
        let mut requantizes = Vec::new();
        for (index, info) in input_infos.iter().enumerate() {
            let edge = self.graph.input_edge(node, index);
            if self.graph.producer_quantization(edge) != target_quantization {
                let requantize = self.graph.add_node(Node::new(
                    NodeKind::Requantize,
                    info.dimensions,
                    target_quantization,
                    format,
                    &[op.id],
                ));
                requantizes.push((edge, requantize));
            }
        }
        for (edge, requantize) in requantizes {
            self.graph.split_edge(edge, requantize);
        }
        Ok(())
    }

    fn lower_split(&mut self, op: &Operation, axis: u32, sizes: &[u32]) -> Result<(), LowerError> {
        let input_info = self.input_info(op, 0);

        match self.support.split(input_info, axis, sizes) {
            SupportedLevel::Supported => {}
            SupportedLevel::EstimateOnly => {
                let input_node = self.producer_node(op.inputs[0]);
                for (index, out) in op.outputs.iter().enumerate() {
                    let node = self.graph.add_node(Node::new(
                        NodeKind::EstimateOnly,
                        out.dimensions,
                        out.quantization,
                        CompilerDataFormat::Nhwcb,
                        &[op.id],
                    ));
                    self.operand_map.insert(
                        OperandRef {
                            op: op.id,
                            index: index as u32,
                        },
                        node,
                    );
                    self.graph.connect(input_node, node);
                }
                return Ok(());
            }
            SupportedLevel::Unsupported => {
                return Err(LowerError::NotSupported("split".to_string()));
            }
        }

        // Same layout rule as concatenation, applied to the outputs.
        let brick_group = self.capabilities.brick_group_shape();
        let mut format = CompilerDataFormat::Nhwcb;
        for out in &op.outputs {
            if out.dimensions[axis as usize] % brick_group[axis as usize] != 0 {
                format = CompilerDataFormat::Nhwc;
                break;
            }
        }
        log::debug!("split {} on axis {axis} uses {format}", op.id);

        let mut input_node = self.producer_node(op.inputs[0]);
        if self.graph.node(input_node).format != format {
            let conversion = self.graph.add_node(Node::new(
                NodeKind::FormatConversion,
                input_info.dimensions,
                input_info.quantization,
                format,
                &[op.id],
            ));
            self.graph.connect(input_node, conversion);
            input_node = conversion;
        }

        // One sub-tensor extraction per output, tiling the axis.
        let mut supertensor_offset = [0u32; 4];
        for (index, &size) in sizes.iter().enumerate() {
            let mut output_shape = input_info.dimensions;
            output_shape[axis as usize] = size;
            let extract = self.graph.add_node(Node::new(
                NodeKind::ExtractSubtensor {
                    offset: supertensor_offset,
                },
                output_shape,
                input_info.quantization,
                format,
                &[op.id],
            ));
            self.graph.connect(input_node, extract);
            self.operand_map.insert(
                OperandRef {
                    op: op.id,
                    index: index as u32,
                },
                extract,
            );
            supertensor_offset[axis as usize] += size;
        }
        Ok(())
    }

    /// Emits the interleave head that turns a stride-2 convolution into a
    /// stride-1 convolution over sub-map channels.
    fn strided_interleave_node(
        &mut self,
        input: &TensorInfo,
        stride: Stride,
        op_id: u32,
    ) -> NodeRef {
        // Only stride 2x2 has a PLE interleave kernel.
        assert!(
            stride.x == 2 && stride.y == 2,
            "strided convolution requires stride 2x2"
        );
        let dims = input.dimensions;
        let height = div_round_up(dims[1], stride.y);
        let width = div_round_up(dims[2], stride.x);
        let channels = self
            .capabilities
            .num_submap_channels(dims[3], stride.x, stride.y);
        log::debug!(
            "operation {op_id}: interleave head {dims:?} -> {:?}",
            [dims[0], height, width, channels],
        );

        self.graph.add_node(Node::new(
            NodeKind::FuseOnlyPle {
                operation: PleOperation::Interleave2x2Stride2,
                shape_multiplier: ShapeMultiplier::new(
                    Fraction::new(1, stride.y),
                    Fraction::new(1, stride.x),
                    stride.x * stride.y,
                ),
            },
            [dims[0], height, width, channels],
            input.quantization,
            CompilerDataFormat::Nhwcb,
            &[op_id],
        ))
    }

    fn lower_convolution(
        &mut self,
        op: &Operation,
        weights: &ConstantTensor,
        bias: &ConstantTensor,
        info: &ConvolutionInfo,
    ) -> Result<(), LowerError> {
        let input = self.input_info(op, 0);
        let verdict = self
            .support
            .convolution(&bias.info, &weights.info, info, input);
        if !self.apply_verdict(op, verdict, "convolution")? {
            return Ok(());
        }

        let out = op.outputs[0].clone();
        let mut chain = Vec::new();
        if info.stride.x > 1 || info.stride.y > 1 {
            chain.push(self.strided_interleave_node(input, info.stride, op.id));
        }

        chain.push(self.graph.add_node(Node::new(
            NodeKind::Mce(Box::new(MceParams {
                input_shape: input.dimensions,
                weights_info: weights.info.clone(),
                weights_data: weights.data.clone(),
                bias_info: bias.info.clone(),
                bias_data: bias.to_i32_vec(),
                stride: info.stride,
                upscale_factor: 1,
                pad_top: info.padding.top,
                pad_left: info.padding.left,
                operation: MceOperation::Convolution,
            })),
            out.dimensions,
            out.quantization,
            CompilerDataFormat::Nhwcb,
            &[op.id],
        )));
        self.connect_node_chain(op, &chain);
        Ok(())
    }

    fn lower_depthwise_convolution(
        &mut self,
        op: &Operation,
        weights: &ConstantTensor,
        bias: &ConstantTensor,
        info: &ConvolutionInfo,
    ) -> Result<(), LowerError> {
        let input = self.input_info(op, 0);
        let verdict = self
            .support
            .depthwise_convolution(&bias.info, &weights.info, info, input);
        if !self.apply_verdict(op, verdict, "depthwise convolution")? {
            return Ok(());
        }

        let out = op.outputs[0].clone();
        let mut chain = Vec::new();
        if info.stride.x > 1 || info.stride.y > 1 {
            chain.push(self.strided_interleave_node(input, info.stride, op.id));
        }

        // A channel multiplier > 1 is only supported with a single input
        // channel, where the depthwise is equivalent to a regular
        // convolution over HWIO weights.
        let mut weights_info = weights.info.clone();
        let operation = if weights_info.dimensions[3] > 1 {
            assert!(
                weights_info.dimensions[2] == 1,
                "channel multiplier > 1 requires a single input channel"
            );
            weights_info.format = DataFormat::Hwio;
            MceOperation::Convolution
        } else {
            MceOperation::DepthwiseConvolution
        };

        // Winograd is never used for depthwise convolution.
        chain.push(self.graph.add_node(Node::new(
            NodeKind::Mce(Box::new(MceParams {
                input_shape: input.dimensions,
                weights_info,
                weights_data: weights.data.clone(),
                bias_info: bias.info.clone(),
                bias_data: bias.to_i32_vec(),
                stride: info.stride,
                upscale_factor: 1,
                pad_top: info.padding.top,
                pad_left: info.padding.left,
                operation,
            })),
            out.dimensions,
            out.quantization,
            CompilerDataFormat::Nhwcb,
            &[op.id],
        )));
        self.connect_node_chain(op, &chain);
        Ok(())
    }

    fn lower_transpose_convolution(
        &mut self,
        op: &Operation,
        weights: &ConstantTensor,
        bias: &ConstantTensor,
        info: &ConvolutionInfo,
    ) -> Result<(), LowerError> {
        let input = self.input_info(op, 0);
        let verdict = self
            .support
            .transpose_convolution(&bias.info, &weights.info, info, input);
        if !self.apply_verdict(op, verdict, "transpose convolution")? {
            return Ok(());
        }

        let out = op.outputs[0].clone();
        let chain = build_transpose_conv(
            &mut self.graph,
            info.stride,
            &weights.info,
            &weights.data,
            bias.info.clone(),
            bias.to_i32_vec(),
            info.padding,
            input,
            &out,
            op.id,
        );
        self.connect_node_chain(op, &chain);
        Ok(())
    }

    fn lower_depth_to_space(&mut self, op: &Operation, block_size: u32) -> Result<(), LowerError> {
        // Lowered as a stride-2 transpose convolution whose 2x2 kernel
        // selects, for each of the four output positions derived from one
        // input position, the input channel that belongs there. The weight
        // vector at each kernel tap is one-hot along input channels.
        assert_eq!(block_size, 2, "depth-to-space requires block size 2");
        let ifm_channels_per_ofm = block_size * block_size;

        let input = self.input_info(op, 0);
        let out = op.outputs[0].clone();
        let input_shape = input.dimensions;
        let output_shape = out.dimensions;

        // A scale of 1.0 would push the overall multiplier to >= 1, which
        // the hardware cannot represent.
        let weights_scale = 0.5f32;
        let weights_info = TensorInfo::new(
            [block_size, block_size, input_shape[3], output_shape[3]],
            npuc_ir::DataType::Uint8Quantized,
            DataFormat::Hwio,
            QuantizationInfo::new(0, weights_scale),
        );
        let mut weights_data = vec![0u8; weights_info.num_elements() as usize];
        let one = (1.0 / weights_scale) as u8;
        for ofm_index in 0..output_shape[3] {
            // The input channels for one output channel start at the output
            // channel's index and are spaced one block apart: all top-left
            // elements first, then top-right, bottom-left, bottom-right.
            let ifm_base = ofm_index;
            let ifm_stride = input_shape[3] / ifm_channels_per_ofm;
            for v in 0..block_size {
                for u in 0..block_size {
                    let ifm_within_block = v * block_size + u;
                    let ifm_index = ifm_base + ifm_within_block * ifm_stride;
                    let element = ((v * block_size + u) * input_shape[3] + ifm_index)
                        * output_shape[3]
                        + ofm_index;
                    weights_data[element as usize] = one;
                }
            }
        }

        let bias_scale = weights_scale * input.quantization.scale;
        let bias_info = TensorInfo::new(
            [1, 1, 1, output_shape[3]],
            npuc_ir::DataType::Int32Quantized,
            DataFormat::Nhwc,
            QuantizationInfo::new(0, bias_scale),
        );
        let bias_data = vec![0i32; output_shape[3] as usize];

        let chain = build_transpose_conv(
            &mut self.graph,
            Stride::new(block_size, block_size),
            &weights_info,
            &weights_data,
            bias_info,
            bias_data,
            Padding::default(),
            input,
            &out,
            op.id,
        );
        self.connect_node_chain(op, &chain);
        Ok(())
    }

    fn lower_estimate_only(&mut self, op: &Operation) -> Result<(), LowerError> {
        // One placeholder per output, each fed by every input's producer.
        for (index, out) in op.outputs.iter().enumerate() {
            let node = self.graph.add_node(Node::new(
                NodeKind::EstimateOnly,
                out.dimensions,
                out.quantization,
                CompilerDataFormat::Nhwcb,
                &[op.id],
            ));
            self.operand_map.insert(
                OperandRef {
                    op: op.id,
                    index: index as u32,
                },
                node,
            );
            for &input in &op.inputs {
                let producer = self.producer_node(input);
                self.graph.connect(producer, node);
            }
        }
        Ok(())
    }
}

fn pattern(
    size_x: u32,
    size_y: u32,
    stride_x: u32,
    stride_y: u32,
    padding: Padding,
    pooling_type: PoolingType,
) -> PoolingInfo {
    PoolingInfo {
        size_x,
        size_y,
        stride_x,
        stride_y,
        padding,
        pooling_type,
    }
}

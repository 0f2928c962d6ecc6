//! The source network: a DAG of high-level operations.
//!
//! Operations are appended through the builder methods, which only accept
//! operand references that already exist. Insertion order is therefore a
//! topological order, and the lowering pass iterates it directly.

use npuc_ir::{DataFormat, QuantizationInfo, TensorInfo};

use crate::ops::{ConstantTensor, ConvolutionInfo, OpKind, PoolingInfo};

/// Identifies one output operand of an operation: the producer's id plus
/// the output index. Used as the key of the operand-to-node map.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct OperandRef {
    pub op: u32,
    pub index: u32,
}

/// A source operation: stable id, operand wiring and kind-specific data.
#[derive(Clone, Debug)]
pub struct Operation {
    pub id: u32,
    pub kind: OpKind,
    /// References to producer outputs, in input order.
    pub inputs: Vec<OperandRef>,
    /// Tensor info of each output, in output order.
    pub outputs: Vec<TensorInfo>,
}

/// A network of operations. Ids are dense and equal to insertion order.
#[derive(Clone, Debug, Default)]
pub struct Network {
    ops: Vec<Operation>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterates operations in insertion (topological) order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.ops.iter()
    }

    /// Looks up an operation by id.
    ///
    /// # Panics
    ///
    /// Panics if no operation with that id exists.
    pub fn operation(&self, id: u32) -> &Operation {
        &self.ops[id as usize]
    }

    pub fn operation_count(&self) -> usize {
        self.ops.len()
    }

    /// Tensor info of an operand.
    pub fn operand_info(&self, operand: OperandRef) -> &TensorInfo {
        &self.operation(operand.op).outputs[operand.index as usize]
    }

    /// Number of operations consuming `operand`.
    pub fn consumer_count(&self, operand: OperandRef) -> usize {
        self.ops
            .iter()
            .flat_map(|op| op.inputs.iter())
            .filter(|&&input| input == operand)
            .count()
    }

    fn push(
        &mut self,
        kind: OpKind,
        inputs: Vec<OperandRef>,
        outputs: Vec<TensorInfo>,
    ) -> u32 {
        for input in &inputs {
            assert!(
                (input.op as usize) < self.ops.len()
                    && (input.index as usize) < self.ops[input.op as usize].outputs.len(),
                "operand {input:?} does not exist in the network"
            );
        }
        let id = self.ops.len() as u32;
        self.ops.push(Operation {
            id,
            kind,
            inputs,
            outputs,
        });
        id
    }

    fn push_single_output(
        &mut self,
        kind: OpKind,
        inputs: Vec<OperandRef>,
        output: TensorInfo,
    ) -> OperandRef {
        let id = self.push(kind, inputs, vec![output]);
        OperandRef { op: id, index: 0 }
    }

    pub fn add_input(&mut self, info: TensorInfo) -> OperandRef {
        let output = info.clone();
        self.push_single_output(OpKind::Input { info }, vec![], output)
    }

    /// Declares `input` as a network output with the given external format.
    /// Returns the output operation's id; the operation has no outputs.
    pub fn add_output(&mut self, input: OperandRef, format: DataFormat) -> u32 {
        self.push(OpKind::Output { format }, vec![input], vec![])
    }

    pub fn add_constant(&mut self, info: TensorInfo, data: Vec<u8>) -> OperandRef {
        let output = info.clone();
        self.push_single_output(OpKind::Constant { info, data }, vec![], output)
    }

    pub fn add_convolution(
        &mut self,
        input: OperandRef,
        weights: ConstantTensor,
        bias: ConstantTensor,
        info: ConvolutionInfo,
        output: TensorInfo,
    ) -> OperandRef {
        self.push_single_output(
            OpKind::Convolution {
                weights,
                bias,
                info,
            },
            vec![input],
            output,
        )
    }

    pub fn add_depthwise_convolution(
        &mut self,
        input: OperandRef,
        weights: ConstantTensor,
        bias: ConstantTensor,
        info: ConvolutionInfo,
        output: TensorInfo,
    ) -> OperandRef {
        self.push_single_output(
            OpKind::DepthwiseConvolution {
                weights,
                bias,
                info,
            },
            vec![input],
            output,
        )
    }

    pub fn add_transpose_convolution(
        &mut self,
        input: OperandRef,
        weights: ConstantTensor,
        bias: ConstantTensor,
        info: ConvolutionInfo,
        output: TensorInfo,
    ) -> OperandRef {
        self.push_single_output(
            OpKind::TransposeConvolution {
                weights,
                bias,
                info,
            },
            vec![input],
            output,
        )
    }

    pub fn add_fully_connected(
        &mut self,
        input: OperandRef,
        weights: ConstantTensor,
        bias: ConstantTensor,
        output: TensorInfo,
    ) -> OperandRef {
        self.push_single_output(OpKind::FullyConnected { weights, bias }, vec![input], output)
    }

    pub fn add_relu(
        &mut self,
        input: OperandRef,
        lower_bound: i32,
        upper_bound: i32,
        output: TensorInfo,
    ) -> OperandRef {
        self.push_single_output(
            OpKind::Relu {
                lower_bound,
                upper_bound,
            },
            vec![input],
            output,
        )
    }

    pub fn add_sigmoid(&mut self, input: OperandRef, output: TensorInfo) -> OperandRef {
        self.push_single_output(OpKind::Sigmoid, vec![input], output)
    }

    pub fn add_softmax(&mut self, input: OperandRef, output: TensorInfo) -> OperandRef {
        self.push_single_output(OpKind::Softmax, vec![input], output)
    }

    pub fn add_pooling(
        &mut self,
        input: OperandRef,
        info: PoolingInfo,
        output: TensorInfo,
    ) -> OperandRef {
        self.push_single_output(OpKind::Pooling(info), vec![input], output)
    }

    pub fn add_reshape(&mut self, input: OperandRef, output: TensorInfo) -> OperandRef {
        self.push_single_output(OpKind::Reshape, vec![input], output)
    }

    pub fn add_depth_to_space(
        &mut self,
        input: OperandRef,
        block_size: u32,
        output: TensorInfo,
    ) -> OperandRef {
        self.push_single_output(OpKind::DepthToSpace { block_size }, vec![input], output)
    }

    pub fn add_addition(
        &mut self,
        lhs: OperandRef,
        rhs: OperandRef,
        output: TensorInfo,
    ) -> OperandRef {
        self.push_single_output(OpKind::Addition, vec![lhs, rhs], output)
    }

    pub fn add_concatenation(
        &mut self,
        inputs: &[OperandRef],
        axis: u32,
        output_quantization: QuantizationInfo,
        output: TensorInfo,
    ) -> OperandRef {
        self.push_single_output(
            OpKind::Concatenation {
                axis,
                output_quantization,
            },
            inputs.to_vec(),
            output,
        )
    }

    pub fn add_split(
        &mut self,
        input: OperandRef,
        axis: u32,
        sizes: Vec<u32>,
        outputs: Vec<TensorInfo>,
    ) -> Vec<OperandRef> {
        assert_eq!(
            sizes.len(),
            outputs.len(),
            "split must declare one output per size"
        );
        let id = self.push(OpKind::Split { axis, sizes }, vec![input], outputs);
        let count = self.ops[id as usize].outputs.len() as u32;
        (0..count).map(|index| OperandRef { op: id, index }).collect()
    }

    pub fn add_estimate_only(
        &mut self,
        inputs: &[OperandRef],
        reason: impl Into<String>,
        outputs: Vec<TensorInfo>,
    ) -> Vec<OperandRef> {
        let id = self.push(
            OpKind::EstimateOnly {
                reason: reason.into(),
            },
            inputs.to_vec(),
            outputs,
        );
        let count = self.ops[id as usize].outputs.len() as u32;
        (0..count).map(|index| OperandRef { op: id, index }).collect()
    }
}

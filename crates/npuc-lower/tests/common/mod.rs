use npuc_ir::{
    DataFormat, DataType, Graph, MceParams, Node, NodeKind, NodeRef, QuantizationInfo, TensorInfo,
};
use npuc_lower::{
    lower_network, LowerOptions, LoweredGraph, NpuCapabilities, PermissiveOracle, SupportOracle,
};
use npuc_net::{ConstantTensor, Network};

/// Route `log` output through the test harness.
#[allow(dead_code)]
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// UINT8 activation tensor info with default quantization.
#[allow(dead_code)]
pub fn uint8_info(format: DataFormat, dimensions: [u32; 4]) -> TensorInfo {
    uint8_info_q(format, dimensions, QuantizationInfo::default())
}

/// UINT8 activation tensor info with explicit quantization.
#[allow(dead_code)]
pub fn uint8_info_q(
    format: DataFormat,
    dimensions: [u32; 4],
    quantization: QuantizationInfo,
) -> TensorInfo {
    TensorInfo::new(dimensions, DataType::Uint8Quantized, format, quantization)
}

/// HWIO weight constant filled with `value`.
#[allow(dead_code)]
pub fn weights(dimensions: [u32; 4], value: u8) -> ConstantTensor {
    weights_q(dimensions, value, QuantizationInfo::new(0, 0.5))
}

#[allow(dead_code)]
pub fn weights_q(
    dimensions: [u32; 4],
    value: u8,
    quantization: QuantizationInfo,
) -> ConstantTensor {
    let info = TensorInfo::new(
        dimensions,
        DataType::Uint8Quantized,
        DataFormat::Hwio,
        quantization,
    );
    let data = vec![value; info.num_elements() as usize];
    ConstantTensor::new(info, data)
}

/// HWIM depthwise weight constant filled with `value`.
#[allow(dead_code)]
pub fn depthwise_weights(dimensions: [u32; 4], value: u8) -> ConstantTensor {
    let info = TensorInfo::new(
        dimensions,
        DataType::Uint8Quantized,
        DataFormat::Hwim,
        QuantizationInfo::new(0, 0.5),
    );
    let data = vec![value; info.num_elements() as usize];
    ConstantTensor::new(info, data)
}

/// Zero INT32 bias for `channels` output channels.
#[allow(dead_code)]
pub fn bias(channels: u32) -> ConstantTensor {
    let info = TensorInfo::new(
        [1, 1, 1, channels],
        DataType::Int32Quantized,
        DataFormat::Nhwc,
        QuantizationInfo::new(0, 0.5),
    );
    ConstantTensor::from_i32(info, &vec![0; channels as usize])
}

/// Lowers with default capabilities and the permissive oracle.
#[allow(dead_code)]
pub fn lower(network: &Network) -> LoweredGraph {
    lower_with(network, &PermissiveOracle)
}

#[allow(dead_code)]
pub fn lower_with(network: &Network, oracle: &dyn SupportOracle) -> LoweredGraph {
    lower_network(
        network,
        &NpuCapabilities::default(),
        oracle,
        LowerOptions::default(),
    )
    .expect("lowering failed")
}

/// Walks producers backwards from `node` while each node has exactly one
/// input, returning the chain head-first.
#[allow(dead_code)]
pub fn chain_back(graph: &Graph, node: NodeRef) -> Vec<NodeRef> {
    let mut chain = vec![node];
    let mut current = node;
    while graph.input_count(current) == 1 {
        current = graph.producer(graph.input_edge(current, 0));
        chain.push(current);
    }
    chain.reverse();
    chain
}

#[allow(dead_code)]
pub fn mce_params(node: &Node) -> &MceParams {
    match &node.kind {
        NodeKind::Mce(params) => params,
        other => panic!("expected an MCE node, found {other:?}"),
    }
}

/// Counts nodes whose kind matches the predicate.
#[allow(dead_code)]
pub fn count_nodes(graph: &Graph, predicate: impl Fn(&NodeKind) -> bool) -> usize {
    graph.iter_nodes().filter(|(_, n)| predicate(&n.kind)).count()
}

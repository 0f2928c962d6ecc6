//! Text dump of a lowered graph for debugging.

use std::fmt::Write;

use crate::graph::Graph;
use crate::node::NodeKind;

fn kind_name(kind: &NodeKind) -> String {
    match kind {
        NodeKind::Input { .. } => "Input".into(),
        NodeKind::Output {
            producer_id,
            producer_output_index,
        } => format!("Output(producer {producer_id}:{producer_output_index})"),
        NodeKind::Constant { data, .. } => format!("Constant({} bytes)", data.len()),
        NodeKind::FormatConversion => "FormatConversion".into(),
        NodeKind::Reinterpret => "Reinterpret".into(),
        NodeKind::ExtractSubtensor { offset } => format!("ExtractSubtensor(offset {offset:?})"),
        NodeKind::Concat { axis } => format!("Concat(axis {axis})"),
        NodeKind::Requantize => "Requantize".into(),
        NodeKind::McePostProcess {
            lower_bound,
            upper_bound,
        } => format!("McePostProcess({lower_bound}..{upper_bound})"),
        NodeKind::Mce(params) => format!("Mce({:?})", params.operation),
        NodeKind::FuseOnlyPle { operation, .. } => format!("FuseOnlyPle({operation:?})"),
        NodeKind::StandalonePle { operation } => format!("StandalonePle({operation:?})"),
        NodeKind::EstimateOnly => "EstimateOnly".into(),
    }
}

/// Renders the graph as text: one line per node, then one line per edge.
pub fn dump_graph(graph: &Graph) -> String {
    let mut out = String::new();

    writeln!(out, "Nodes:").unwrap();
    for (handle, node) in graph.iter_nodes() {
        writeln!(
            out,
            "  {:?} {} shape {:?} {} sources {:?}",
            handle,
            kind_name(&node.kind),
            node.shape,
            node.format,
            node.provenance,
        )
        .unwrap();
    }

    writeln!(out, "Edges:").unwrap();
    for (_, edge) in graph.iter_edges() {
        writeln!(out, "  {:?} -> {:?}", edge.producer, edge.consumer).unwrap();
    }

    out
}

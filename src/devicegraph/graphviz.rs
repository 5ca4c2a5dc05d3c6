//! Graphviz export of a devicegraph.

use petgraph::visit::{EdgeRef, IntoEdgeReferences};

use crate::{
    device::DeviceKind,
    holder::HolderKind,
};

use super::Devicegraph;

/// Node colors per device kind: (border, fill).
fn kind_colors(kind: DeviceKind) -> (&'static str, &'static str) {
    match kind {
        DeviceKind::Disk | DeviceKind::Dasd | DeviceKind::PartitionTable => ("#ff0000", "#ffaaaa"),
        DeviceKind::Partition => ("#cc33cc", "#eeaaee"),
        DeviceKind::Encryption | DeviceKind::LvmPv | DeviceKind::LvmLv => ("#6622dd", "#bb99ff"),
        DeviceKind::LvmVg => ("#0000ff", "#aaaaff"),
        DeviceKind::Filesystem => ("#008800", "#99ee99"),
        DeviceKind::MountPoint => ("#888800", "#eeee99"),
    }
}

fn edge_style(kind: HolderKind) -> &'static str {
    match kind {
        HolderKind::Subdevice => "solid",
        HolderKind::User => "dotted",
        HolderKind::Snapshot => "dashed",
    }
}

impl Devicegraph {
    /// Renders the graph in Graphviz DOT format, one node per device with
    /// kind-specific colors, edge style per holder kind.
    pub fn write_graphviz(&self) -> String {
        let mut out = String::from("digraph devicegraph {\n");
        out.push_str("  node [ shape=rectangle, style=filled, fontname=\"Arial\" ];\n");

        let graph = self.inner();

        for idx in graph.node_indices() {
            let device = &graph[idx];
            let (color, fillcolor) = kind_colors(device.kind());

            out.push_str(&format!(
                "  \"{}\" [ label=\"{}\", color=\"{}\", fillcolor=\"{}\" ];\n",
                device.sid,
                device.describe(),
                color,
                fillcolor,
            ));
        }

        for edge in graph.edge_references() {
            out.push_str(&format!(
                "  \"{}\" -> \"{}\" [ style={} ];\n",
                graph[edge.source()].sid,
                graph[edge.target()].sid,
                edge_style(edge.weight().kind),
            ));
        }

        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        device::DevicePayload,
        devicegraph::Devicegraph,
        holder::HolderKind,
        sid::SidGenerator,
    };

    #[test]
    fn test_write_graphviz() {
        let mut generator = SidGenerator::new();
        let mut graph = Devicegraph::new();

        let disk = graph
            .add_device(
                generator.next_sid(),
                DevicePayload::Disk {
                    name: "sda".into(),
                },
            )
            .unwrap();
        let pt = graph
            .add_device(
                generator.next_sid(),
                DevicePayload::PartitionTable {
                    pt_type: crate::device::PtType::Gpt,
                },
            )
            .unwrap();
        graph.add_holder(disk, pt, HolderKind::Subdevice).unwrap();

        let dot = graph.write_graphviz();

        assert!(dot.starts_with("digraph devicegraph {"));
        assert!(dot.contains("disk 'sda' (sid:42)"));
        assert!(dot.contains("\"sid:42\" -> \"sid:43\" [ style=solid ];"));
        assert!(dot.ends_with("}\n"));
    }
}

//! Graphviz export of an actiongraph.

use petgraph::visit::{EdgeRef, IntoEdgeReferences};

use super::{ActionCategory, Actiongraph};

/// Node colors per action category: (border, fill).
fn category_colors(category: ActionCategory) -> (&'static str, &'static str) {
    match category {
        ActionCategory::Create => ("#008800", "#99ee99"),
        ActionCategory::Modify => ("#0000ff", "#aaaaff"),
        ActionCategory::Delete => ("#ff0000", "#ffaaaa"),
    }
}

impl Actiongraph<'_> {
    /// Renders the graph in Graphviz DOT format, one node per action with
    /// category-specific colors, one edge per dependency.
    pub fn write_graphviz(&self) -> String {
        let mut out = String::from("digraph actiongraph {\n");
        out.push_str("  node [ shape=rectangle, style=filled, fontname=\"Arial\" ];\n");

        for idx in self.graph.node_indices() {
            let action = &self.graph[idx];
            let (color, fillcolor) = category_colors(action.category());

            out.push_str(&format!(
                "  \"{}\" [ label=\"{}\", color=\"{}\", fillcolor=\"{}\" ];\n",
                idx.index(),
                action.text(self.lhs, self.rhs),
                color,
                fillcolor,
            ));
        }

        for edge in self.graph.edge_references() {
            out.push_str(&format!(
                "  \"{}\" -> \"{}\";\n",
                edge.source().index(),
                edge.target().index(),
            ));
        }

        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        actiongraph::Actiongraph,
        device::{DevicePayload, FsType},
        devicegraph::Devicegraph,
        sid::SidGenerator,
    };

    #[test]
    fn test_write_graphviz() {
        let mut generator = SidGenerator::new();
        let lhs = Devicegraph::new();
        let mut rhs = Devicegraph::new();

        rhs.add_device(
            generator.next_sid(),
            DevicePayload::Filesystem {
                fs_type: FsType::Ext4,
                label: String::new(),
            },
        )
        .unwrap();

        let actiongraph = Actiongraph::plan(&lhs, &rhs).unwrap();
        let dot = actiongraph.write_graphviz();

        assert!(dot.starts_with("digraph actiongraph {"));
        assert!(dot.contains("Format filesystem 'ext4' (sid:42)"));
        assert!(dot.ends_with("}\n"));
    }
}

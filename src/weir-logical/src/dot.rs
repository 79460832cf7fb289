//! Graphviz projection of element graphs.

use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::graph::ElementGraph;

/// A named DOT rendering of a graph at one point in planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDump {
    pub label: String,
    pub dot: String,
}

impl GraphDump {
    pub fn new(label: impl Into<String>, graph: &ElementGraph) -> Self {
        let label = label.into();
        let dot = graph.to_dot(&label);
        Self { label, dot }
    }

    /// File-system friendly version of the label.
    pub fn file_stem(&self) -> String {
        self.label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for GraphDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dot)
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl ElementGraph {
    /// Render as a Graphviz digraph. Side-effect free.
    pub fn to_dot(&self, name: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{}\" {{", escape(name));
        for element in self.elements() {
            let mut label = format!("{}\\n{}", escape(&element.name), escape(&element.kind.describe()));
            for (k, v) in &element.annotations {
                let _ = write!(label, "\\n{}={}", escape(k), escape(v));
            }
            if let Some(trap) = &element.trap {
                let _ = write!(label, "\\ntrap={}", escape(trap));
            }
            let _ = writeln!(out, "  {} [label=\"{}\"];", element.id, label);
        }
        for edge in self.edges() {
            let fields = edge
                .scope
                .fields
                .as_ref()
                .map(|f| f.to_string())
                .unwrap_or_else(|| "?".to_string());
            let mut label = format!("{}: {}", edge.scope.ordinal, escape(&fields));
            for (k, v) in &edge.scope.annotations {
                let _ = write!(label, "\\n{}={}", escape(k), escape(v));
            }
            let _ = writeln!(out, "  {} -> {} [label=\"{}\"];", edge.source, edge.target, label);
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementKind, SourceSpec};

    #[test]
    fn test_to_dot() {
        let mut g = ElementGraph::new();
        let s = g.add_element(
            "in",
            ElementKind::Source(SourceSpec {
                fields: ["k"].into(),
            }),
        );
        let t = g.add_element("out", ElementKind::Sink);
        g.add_edge(s, t, 0).unwrap();
        g.annotate(t, "stream-mode", "streamed").unwrap();

        let dot = g.to_dot("plan \"v1\"");
        assert!(dot.starts_with("digraph \"plan \\\"v1\\\"\" {"));
        assert!(dot.contains("e0 -> e1 [label=\"0: ?\"]"));
        assert!(dot.contains("stream-mode=streamed"));

        let dump = GraphDump::new("PreBalanceAssembly/remove dangling", &g);
        assert_eq!(dump.file_stem(), "PreBalanceAssembly_remove_dangling");
    }
}

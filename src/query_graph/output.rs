//! Graphviz rendering of built query graphs, mainly for debugging composition and planning
//! issues: single-source graphs render as a flat digraph, federated graphs as one cluster per
//! subgraph with the cross-subgraph edges drawn between clusters.

use std::fmt::Write;

use crate::query_graph::QueryGraph;
use crate::query_graph::QueryGraphEdge;
use crate::query_graph::QueryGraphNode;

fn label_edge(edge: &QueryGraphEdge) -> String {
    let label = edge.to_string();
    if label.is_empty() {
        String::new()
    } else {
        format!("label=\"{}\"", label.replace('"', "\\\""))
    }
}

fn label_node(node: &QueryGraphNode) -> String {
    format!("label=\"{}\"", node.type_)
}

fn label_cluster_node(node: &QueryGraphNode) -> String {
    let provide_id = match node.provide_id {
        Some(id) => format!("#{}", id),
        None => String::new(),
    };
    format!(r#"label="{}{}@{}""#, node.type_, provide_id, node.source)
}

pub fn to_dot(graph: &QueryGraph) -> String {
    if graph.sources.len() > 1 {
        to_dot_federated(graph).expect("Failed to render the federated graph")
    } else {
        to_dot_flat(graph).expect("Failed to render the graph")
    }
}

fn to_dot_flat(graph: &QueryGraph) -> Result<String, std::fmt::Error> {
    let mut dot_str = String::new();
    writeln!(dot_str, r#"digraph "{}" {{"#, graph.name())?;
    for node in graph.nodes() {
        writeln!(dot_str, "  {} [{}]", node.index, label_node(node))?;
    }
    for edges in &graph.out_edges {
        for edge in edges {
            writeln!(
                dot_str,
                "  {} -> {} [{}]",
                edge.head,
                edge.tail,
                label_edge(edge)
            )?;
        }
    }
    writeln!(dot_str, "}}")?;
    Ok(dot_str)
}

fn to_dot_federated(graph: &QueryGraph) -> Result<String, std::fmt::Error> {
    let node_source = |node: usize| &*graph.nodes[node].source;
    let mut dot_str = String::new();
    writeln!(dot_str, r#"digraph "{}" {{"#, graph.name())?;

    // One cluster per subgraph, holding its nodes and its internal edges.
    for (cluster_name, _) in graph.sources.iter() {
        if **cluster_name == *graph.name() {
            continue; // the root source's nodes are drawn outside any cluster
        }
        writeln!(dot_str, r#"  subgraph "cluster_{}" {{"#, cluster_name)?;
        writeln!(dot_str, r#"    label = "Subgraph \"{}\"";"#, cluster_name)?;
        writeln!(dot_str, r#"    color = "black";"#)?;
        writeln!(dot_str, r#"    style = "";"#)?;
        for node in graph.nodes() {
            if node.source == *cluster_name {
                writeln!(dot_str, "    {} [{}]", node.index, label_cluster_node(node))?;
            }
        }
        for edges in &graph.out_edges {
            for edge in edges {
                if node_source(edge.head) == &**cluster_name
                    && node_source(edge.tail) == &**cluster_name
                {
                    writeln!(
                        dot_str,
                        "    {} -> {} [{}]",
                        edge.head,
                        edge.tail,
                        label_edge(edge)
                    )?;
                }
            }
        }
        writeln!(dot_str, "  }}")?;
    }

    // Root-source nodes.
    for node in graph.nodes() {
        if &*node.source == graph.name() {
            writeln!(dot_str, "  {} [{}]", node.index, label_node(node))?;
        }
    }

    // Cross-cluster edges.
    for edges in &graph.out_edges {
        for edge in edges {
            if node_source(edge.head) != node_source(edge.tail) {
                writeln!(
                    dot_str,
                    "  {} -> {} [{}]",
                    edge.head,
                    edge.tail,
                    label_edge(edge)
                )?;
            }
        }
    }

    writeln!(dot_str, "}}")?;
    Ok(dot_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_graph::build_query_graph::build_query_graph;
    use crate::schema::ValidFederationSchema;

    #[test]
    fn renders_a_flat_digraph_for_single_source_graphs() {
        let schema = ValidFederationSchema::parse_and_validate(
            r#"
            type Query { a: A }
            type A { x: Int }
            "#,
            "schema.graphql",
        )
        .unwrap();
        let graph = build_query_graph("test", schema).unwrap();
        let dot = to_dot(&graph);
        assert!(dot.starts_with(r#"digraph "test" {"#));
        assert!(dot.contains(r#"label="Query""#));
        assert!(dot.contains(r#"label="a""#));
        assert!(!dot.contains("cluster_"));
    }
}

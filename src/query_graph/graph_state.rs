use crate::ensure;
use crate::error::FederationError;
use crate::query_graph::EdgeIndex;
use crate::query_graph::NodeIndex;
use crate::query_graph::QueryGraph;

/// Mutable state attached to the nodes and edges of an (immutable) query graph, addressed by the
/// same indexes the graph uses, and held entirely outside the graph.
///
/// Node state lives in a dense vector of `nodes_count` slots; edge state lives in per-head rows
/// allocated lazily the first time an edge of that head is written. A state table is only
/// meaningful for the graph it was created from and must not outlive it conceptually (indexes of
/// another graph address arbitrary slots).
pub struct QueryGraphState<NodeState, EdgeState = ()> {
    node_states: Vec<Option<NodeState>>,
    edge_states: Vec<Option<Vec<Option<EdgeState>>>>,
    out_degrees: Vec<usize>,
}

impl<NodeState, EdgeState> QueryGraphState<NodeState, EdgeState> {
    pub fn new(graph: &QueryGraph) -> Self {
        let out_degrees = (0..graph.nodes_count())
            .map(|node| graph.out_edges(node).map_or(0, |edges| edges.len()))
            .collect();
        Self {
            node_states: (0..graph.nodes_count()).map(|_| None).collect(),
            edge_states: (0..graph.nodes_count()).map(|_| None).collect(),
            out_degrees,
        }
    }

    pub fn set_node_state(
        &mut self,
        node: NodeIndex,
        state: NodeState,
    ) -> Result<(), FederationError> {
        ensure!(
            node < self.node_states.len(),
            "Node {node} is not part of the graph this state was created for"
        );
        self.node_states[node] = Some(state);
        Ok(())
    }

    pub fn remove_node_state(&mut self, node: NodeIndex) -> Result<(), FederationError> {
        ensure!(
            node < self.node_states.len(),
            "Node {node} is not part of the graph this state was created for"
        );
        self.node_states[node] = None;
        Ok(())
    }

    /// The state for the given node, or `None` when unset.
    pub fn get_node_state(&self, node: NodeIndex) -> Option<&NodeState> {
        self.node_states.get(node).and_then(|state| state.as_ref())
    }

    pub fn set_edge_state(
        &mut self,
        head: NodeIndex,
        edge: EdgeIndex,
        state: EdgeState,
    ) -> Result<(), FederationError> {
        let row = self.edge_row_mut(head, edge)?;
        row[edge] = Some(state);
        Ok(())
    }

    pub fn remove_edge_state(
        &mut self,
        head: NodeIndex,
        edge: EdgeIndex,
    ) -> Result<(), FederationError> {
        let row = self.edge_row_mut(head, edge)?;
        row[edge] = None;
        Ok(())
    }

    /// The state for the given edge, or `None` when unset.
    pub fn get_edge_state(&self, head: NodeIndex, edge: EdgeIndex) -> Option<&EdgeState> {
        self.edge_states
            .get(head)
            .and_then(|row| row.as_ref())
            .and_then(|row| row.get(edge))
            .and_then(|state| state.as_ref())
    }

    fn edge_row_mut(
        &mut self,
        head: NodeIndex,
        edge: EdgeIndex,
    ) -> Result<&mut Vec<Option<EdgeState>>, FederationError> {
        ensure!(
            head < self.edge_states.len(),
            "Node {head} is not part of the graph this state was created for"
        );
        ensure!(
            edge < self.out_degrees[head],
            "Node {head} has no out-edge {edge} in the graph this state was created for"
        );
        let degree = self.out_degrees[head];
        Ok(self.edge_states[head].get_or_insert_with(|| (0..degree).map(|_| None).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_graph::build_query_graph::build_query_graph;
    use crate::schema::ValidFederationSchema;

    fn graph() -> QueryGraph {
        let schema = ValidFederationSchema::parse_and_validate(
            r#"
            type Query { a: A }
            type A { x: Int y: Int }
            "#,
            "schema.graphql",
        )
        .unwrap();
        build_query_graph("test", schema).unwrap()
    }

    #[test]
    fn node_state_is_absent_until_set_and_after_removal() {
        let graph = graph();
        let mut state: QueryGraphState<&str> = QueryGraphState::new(&graph);
        assert_eq!(state.get_node_state(0), None);
        state.set_node_state(0, "visited").unwrap();
        assert_eq!(state.get_node_state(0), Some(&"visited"));
        state.remove_node_state(0).unwrap();
        assert_eq!(state.get_node_state(0), None);
    }

    #[test]
    fn edge_state_is_per_edge_slot() {
        let graph = graph();
        let a = graph.nodes_for_type("A").next().unwrap();
        let mut state: QueryGraphState<(), u32> = QueryGraphState::new(&graph);
        assert_eq!(state.get_edge_state(a, 0), None);
        state.set_edge_state(a, 1, 7).unwrap();
        assert_eq!(state.get_edge_state(a, 0), None);
        assert_eq!(state.get_edge_state(a, 1), Some(&7));
        state.remove_edge_state(a, 1).unwrap();
        assert_eq!(state.get_edge_state(a, 1), None);
    }

    #[test]
    fn out_of_range_indexes_are_rejected() {
        let graph = graph();
        let mut state: QueryGraphState<(), u32> = QueryGraphState::new(&graph);
        assert!(state.set_node_state(graph.nodes_count(), ()).is_err());
        let terminal = graph.nodes_for_type("Int").next().unwrap();
        assert!(state.set_edge_state(terminal, 0, 1).is_err());
    }
}

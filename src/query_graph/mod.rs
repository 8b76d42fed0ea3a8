use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

use apollo_compiler::ast::FieldDefinition;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::Name;
use apollo_compiler::Node;
use indexmap::IndexMap;
use indexmap::IndexSet;

use crate::error::FederationError;
use crate::error::SingleFederationError;
use crate::query_graph::field_set::merge_selection_sets;
use crate::schema::is_structural_field_subtype;
use crate::schema::SchemaRootKind;
use crate::schema::ValidFederationSchema;

pub mod build_query_graph;
pub(crate) mod field_set;
pub mod graph_state;
pub mod output;

/// The `source` name of the synthetic root nodes of a federated query graph. Reserved: no
/// subgraph may use it as its name.
pub const FEDERATED_GRAPH_ROOT_SOURCE: &str = "federated_subgraphs";

/// Index of a node in a query graph. Nodes are never removed, so indexes are stable for the
/// lifetime of the graph and equal the node's position in the node array.
pub type NodeIndex = usize;

/// Position of an edge within its head node's out-edge list. Edges are addressed by the pair
/// `(head, index)`.
pub type EdgeIndex = usize;

#[derive(Debug, Clone)]
pub struct QueryGraphNode {
    /// The position of this node in the owning graph's node array.
    index: NodeIndex,
    /// The GraphQL type this node points to.
    type_: QueryGraphNodeType,
    /// An identifier of the underlying schema containing the `type_` this node points to. This is
    /// mainly used in federated query graphs, where the `source` is a subgraph name.
    source: Arc<str>,
    /// @provides works by creating duplicates of the node/type involved in the provides and adding
    /// the provided edges only to those copies. This means that with @provides, you can have more
    /// than one node per-type-and-subgraph in a query graph. Which is fine, but this `provide_id`
    /// allows distinguishing if a node was created as part of this @provides duplication or not.
    /// The value of this field has no other meaning than to be unique per-@provide, and so all the
    /// nodes copied for a given @provides application will have the same `provide_id`. Overall,
    /// this mostly exists for debugging visualization.
    provide_id: Option<u32>,
    // If present, this node is a root node of the corresponding kind.
    root_kind: Option<SchemaRootKind>,
}

impl QueryGraphNode {
    pub fn index(&self) -> NodeIndex {
        self.index
    }

    pub fn type_(&self) -> &QueryGraphNodeType {
        &self.type_
    }

    pub fn source(&self) -> &Arc<str> {
        &self.source
    }

    pub fn provide_id(&self) -> Option<u32> {
        self.provide_id
    }

    pub fn root_kind(&self) -> Option<SchemaRootKind> {
        self.root_kind
    }

    pub fn is_root_node(&self) -> bool {
        self.root_kind.is_some()
    }
}

impl Display for QueryGraphNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.type_, self.source)?;
        if let Some(provide_id) = self.provide_id {
            write!(f, "-{}", provide_id)?;
        }
        if self.root_kind.is_some() {
            write!(f, "*")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::From)]
pub enum QueryGraphNodeType {
    /// A node pointing to a named type of its source schema.
    SchemaType(Name),
    /// The synthetic root of a federated query graph for the given root kind. These exist only in
    /// federated graphs, under the federated root source.
    FederatedRootType(SchemaRootKind),
}

impl QueryGraphNodeType {
    /// The name of the schema type this node points to, if it is not a synthetic federated root.
    pub fn schema_type_name(&self) -> Option<&Name> {
        match self {
            QueryGraphNodeType::SchemaType(name) => Some(name),
            QueryGraphNodeType::FederatedRootType(_) => None,
        }
    }
}

impl Display for QueryGraphNodeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryGraphNodeType::SchemaType(name) => name.fmt(f),
            QueryGraphNodeType::FederatedRootType(root_kind) => {
                write!(f, "[{}]", root_kind)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryGraphEdge {
    /// The node this edge starts at.
    head: NodeIndex,
    /// The node this edge leads to.
    tail: NodeIndex,
    /// The position of this edge in `head`'s out-edge list.
    index: EdgeIndex,
    /// Indicates what kind of edge this is and what the edge does/represents. For instance, if the
    /// edge represents a field, the `transition` will be a `FieldCollection` transition and will
    /// link to the definition of the field it represents.
    transition: QueryGraphEdgeTransition,
    /// Optional conditions on an edge.
    ///
    /// Conditions are a set of selections (in the GraphQL sense) that the traversal of a query
    /// graph needs to "collect" (traverse edges with transitions corresponding to those selections)
    /// in order to be able to collect that edge.
    ///
    /// Conditions are primarily used for edges corresponding to @key, in which case they correspond
    /// to the fields composing the @key. In other words, for an @key edge, conditions basically
    /// represent the fact that you need the key to be able to use an @key edge.
    ///
    /// Outside of keys, @requires edges also rely on conditions.
    conditions: Option<SelectionSet>,
}

impl QueryGraphEdge {
    pub fn head(&self) -> NodeIndex {
        self.head
    }

    pub fn tail(&self) -> NodeIndex {
        self.tail
    }

    pub fn index(&self) -> EdgeIndex {
        self.index
    }

    pub fn transition(&self) -> &QueryGraphEdgeTransition {
        &self.transition
    }

    pub fn conditions(&self) -> Option<&SelectionSet> {
        self.conditions.as_ref()
    }

    /// Whether this edge collects a field of the given name.
    pub fn is_edge_for_field(&self, name: &str) -> bool {
        match &self.transition {
            QueryGraphEdgeTransition::FieldCollection {
                field_definition, ..
            } => field_definition.name == name,
            _ => false,
        }
    }

    /// Merges the given selections into this edge's conditions. Only meaningful while the owning
    /// graph is being built; built graphs are immutable.
    pub(crate) fn add_to_conditions(&mut self, selections: &SelectionSet) {
        match &mut self.conditions {
            Some(conditions) => merge_selection_sets(conditions, selections),
            None => self.conditions = Some(selections.clone()),
        }
    }
}

impl Display for QueryGraphEdge {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if matches!(self.transition, QueryGraphEdgeTransition::FreeTransition)
            && self.conditions.is_none()
        {
            return Ok(());
        }
        if let Some(conditions) = &self.conditions {
            write!(
                f,
                "{} ⊢ {}",
                conditions.serialize().no_indent(),
                self.transition
            )
        } else {
            self.transition.fmt(f)
        }
    }
}

/// The type of query graph edge "transition".
///
/// An edge transition encodes what the edge corresponds to, in the underlying GraphQL schema.
#[derive(Debug, Clone)]
pub enum QueryGraphEdgeTransition {
    /// A field edge, going from (a node for) the field parent type to the field's (base) type.
    FieldCollection {
        /// The name of the schema containing the field.
        source: Arc<str>,
        /// The object/interface field being collected.
        field_definition: Node<FieldDefinition>,
        /// Whether this field is part of an @provides.
        is_part_of_provides: bool,
    },
    /// A downcast edge, going from a composite type (object, interface, or union) to another
    /// composite type that intersects that type (i.e. has at least one possible runtime object
    /// type in common with it).
    Downcast {
        /// The name of the schema containing the from/to types.
        source: Arc<str>,
        /// The type of the selection set containing the type condition.
        from_type_name: Name,
        /// The type of the type condition, i.e. the type coming after "... on".
        to_type_name: Name,
    },
    /// A key edge (only found in federated query graphs) going from an entity type in a particular
    /// subgraph to the same entity type but in another subgraph. Key transition edges _must_ have
    /// `conditions` corresponding to the key fields.
    KeyResolution,
    /// An unconditioned synthetic edge, only found in federated query graphs out of the synthetic
    /// root nodes. It does not correspond to any physical GraphQL element; it encodes the fact
    /// that a traversal is always free to start in any of the subgraphs.
    FreeTransition,
}

impl QueryGraphEdgeTransition {
    /// Whether taking an edge with this transition corresponds to collecting an element of the
    /// operation being planned (as opposed to a synthetic or key move).
    pub fn collect_operation_elements(&self) -> bool {
        match self {
            QueryGraphEdgeTransition::FieldCollection { .. } => true,
            QueryGraphEdgeTransition::Downcast { .. } => true,
            QueryGraphEdgeTransition::KeyResolution => false,
            QueryGraphEdgeTransition::FreeTransition => false,
        }
    }
}

impl Display for QueryGraphEdgeTransition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryGraphEdgeTransition::FieldCollection {
                field_definition, ..
            } => {
                write!(f, "{}", field_definition.name)
            }
            QueryGraphEdgeTransition::Downcast { to_type_name, .. } => {
                write!(f, "... on {}", to_type_name)
            }
            QueryGraphEdgeTransition::KeyResolution => {
                write!(f, "key()")
            }
            QueryGraphEdgeTransition::FreeTransition => {
                write!(f, "∅")
            }
        }
    }
}

/// Whether transition `a` is compatible with transition `b`, in the sense used by composition
/// validation and query planning when comparing paths.
///
/// Simple variants match their own kind; downcasts match nominally on the casted-to type; field
/// collections match when `a`'s field is a structural subtype of `b`'s, which makes the relation
/// directional.
pub fn matches_transition(a: &QueryGraphEdgeTransition, b: &QueryGraphEdgeTransition) -> bool {
    match (a, b) {
        (
            QueryGraphEdgeTransition::FieldCollection {
                field_definition: a,
                ..
            },
            QueryGraphEdgeTransition::FieldCollection {
                field_definition: b,
                ..
            },
        ) => is_structural_field_subtype(a, b),
        (
            QueryGraphEdgeTransition::Downcast {
                to_type_name: a, ..
            },
            QueryGraphEdgeTransition::Downcast {
                to_type_name: b, ..
            },
        ) => a == b,
        (QueryGraphEdgeTransition::KeyResolution, QueryGraphEdgeTransition::KeyResolution) => true,
        (QueryGraphEdgeTransition::FreeTransition, QueryGraphEdgeTransition::FreeTransition) => {
            true
        }
        _ => false,
    }
}

/// An immutable directed multigraph over one or more GraphQL schemas, where nodes are
/// `(type, source)` positions and edges are the legal moves between them: collecting a field,
/// narrowing to a runtime type, or jumping to another subgraph through an entity key.
///
/// Built through [`build_query_graph::build_query_graph`] and friends; once built, a graph never
/// changes and can be shared freely between readers. Per-node and per-edge consumer state goes in
/// a [`graph_state::QueryGraphState`], not in the graph.
pub struct QueryGraph {
    /// The name of the graph. For a graph representing a single source schema this is that
    /// source's name; for a federated graph it is the federated root source.
    name: Arc<str>,
    /// The nodes of the graph; a node's index is its position here.
    nodes: Vec<QueryGraphNode>,
    /// Out-edges of each node, parallel to `nodes`. An edge's index is its position in its head's
    /// list.
    out_edges: Vec<Vec<QueryGraphEdge>>,
    /// The sources on which the query graph was built, which is a set (potentially of size 1) of
    /// GraphQL schemas keyed by the name identifying them. The `source` of every node is
    /// guaranteed to be a key in this map.
    sources: IndexMap<Arc<str>, ValidFederationSchema>,
    /// Associates type names of the underlying schema(s) to each of the nodes that points to a
    /// type of that name, in node creation order.
    types_to_nodes: IndexMap<Name, IndexSet<NodeIndex>>,
    /// Associates schema root kinds to root nodes.
    root_kinds_to_nodes: IndexMap<SchemaRootKind, NodeIndex>,
}

impl QueryGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges_count(&self) -> usize {
        self.out_edges.iter().map(|edges| edges.len()).sum()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &QueryGraphNode> {
        self.nodes.iter()
    }

    pub fn node_weight(&self, node: NodeIndex) -> Result<&QueryGraphNode, FederationError> {
        self.nodes.get(node).ok_or_else(|| {
            SingleFederationError::Internal {
                message: "Node unexpectedly missing".to_owned(),
            }
            .into()
        })
    }

    /// The out-edges of the given node (precondition: the node belongs to this graph).
    pub fn out_edges(&self, node: NodeIndex) -> Result<&[QueryGraphEdge], FederationError> {
        self.out_edges
            .get(node)
            .map(|edges| edges.as_slice())
            .ok_or_else(|| {
                SingleFederationError::Internal {
                    message: "Node unexpectedly missing".to_owned(),
                }
                .into()
            })
    }

    /// The `index`-th out-edge of the given node, if it exists.
    pub fn out_edge(&self, node: NodeIndex, index: EdgeIndex) -> Option<&QueryGraphEdge> {
        self.out_edges.get(node).and_then(|edges| edges.get(index))
    }

    /// Whether the given node has no out-edges.
    pub fn is_terminal(&self, node: NodeIndex) -> Result<bool, FederationError> {
        Ok(self.out_edges(node)?.is_empty())
    }

    pub fn root_kinds(&self) -> impl Iterator<Item = SchemaRootKind> + '_ {
        self.root_kinds_to_nodes.keys().copied()
    }

    /// The root nodes of the graph, in root-kind order.
    pub fn root_nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.root_kinds_to_nodes.values().copied()
    }

    /// The root node for the given kind, if the graph has one.
    pub fn root_node(&self, root_kind: SchemaRootKind) -> Option<NodeIndex> {
        self.root_kinds_to_nodes.get(&root_kind).copied()
    }

    /// Every node whose type has the given name, in node creation order.
    pub fn nodes_for_type(&self, type_name: &str) -> impl Iterator<Item = NodeIndex> + '_ {
        self.types_to_nodes
            .get(type_name)
            .into_iter()
            .flatten()
            .copied()
    }

    pub fn sources(&self) -> impl Iterator<Item = (&Arc<str>, &ValidFederationSchema)> {
        self.sources.iter()
    }

    pub fn schema_by_source(&self, source: &str) -> Result<&ValidFederationSchema, FederationError> {
        self.sources.get(source).ok_or_else(|| {
            SingleFederationError::Internal {
                message: "Schema unexpectedly missing".to_owned(),
            }
            .into()
        })
    }
}

/// Visits every node and edge of the graph exactly once, depth-first from the graph's roots,
/// ignoring edge conditions entirely.
///
/// `on_node` runs once for every reachable node, before any of that node's out-edges are offered
/// to `on_edge`; `on_edge` runs once for every edge whose head is reached and decides whether the
/// edge's tail is followed. Callers must not rely on any ordering beyond "head before its
/// out-edges".
pub fn simple_traversal<Err>(
    graph: &QueryGraph,
    mut on_node: impl FnMut(NodeIndex) -> Result<(), Err>,
    mut on_edge: impl FnMut(&QueryGraphEdge) -> Result<bool, Err>,
) -> Result<(), Err> {
    let mut marked = vec![false; graph.nodes_count()];
    let mut stack = Vec::new();
    for root in graph.root_nodes() {
        if !marked[root] {
            marked[root] = true;
            stack.push(root);
        }
    }
    while let Some(node) = stack.pop() {
        on_node(node)?;
        for edge in &graph.out_edges[node] {
            if on_edge(edge)? && !marked[edge.tail] {
                marked[edge.tail] = true;
                stack.push(edge.tail);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::build_query_graph::build_query_graph;
    use super::*;
    use crate::error::FederationError;

    fn two_type_graph() -> QueryGraph {
        let schema = ValidFederationSchema::parse_and_validate(
            r#"
            type Query { a: A b: A }
            type A { x: Int }
            "#,
            "schema.graphql",
        )
        .unwrap();
        build_query_graph("test", schema).unwrap()
    }

    #[test]
    fn traversal_visits_every_node_and_edge_once() {
        let graph = two_type_graph();
        let mut nodes = 0;
        let mut edges = 0;
        simple_traversal::<FederationError>(
            &graph,
            |_| {
                nodes += 1;
                Ok(())
            },
            |_| {
                edges += 1;
                Ok(true)
            },
        )
        .unwrap();
        assert_eq!(nodes, graph.nodes_count());
        assert_eq!(edges, graph.edges_count());
    }

    #[test]
    fn traversal_visits_head_before_its_out_edges() {
        let graph = two_type_graph();
        let seen = std::cell::RefCell::new(Vec::new());
        simple_traversal::<FederationError>(
            &graph,
            |node| {
                seen.borrow_mut().push(node);
                Ok(())
            },
            |edge| {
                assert!(seen.borrow().contains(&edge.head()));
                Ok(true)
            },
        )
        .unwrap();
    }

    #[test]
    fn traversal_respects_edge_feedback() {
        let graph = two_type_graph();
        // Refusing every edge leaves only the roots visited.
        let mut nodes = 0;
        let mut edges = 0;
        simple_traversal::<FederationError>(
            &graph,
            |_| {
                nodes += 1;
                Ok(())
            },
            |_| {
                edges += 1;
                Ok(false)
            },
        )
        .unwrap();
        assert_eq!(nodes, 1);
        // The root's own out-edges are still offered.
        assert_eq!(edges, 2);
    }

    #[test]
    fn transition_matching_is_nominal_on_downcasts() {
        let source: Arc<str> = Arc::from("S");
        let cast = |to: &str| QueryGraphEdgeTransition::Downcast {
            source: source.clone(),
            from_type_name: Name::new("I").unwrap(),
            to_type_name: Name::new(to).unwrap(),
        };
        assert!(matches_transition(&cast("A"), &cast("A")));
        assert!(!matches_transition(&cast("A"), &cast("B")));
        assert!(!matches_transition(
            &cast("A"),
            &QueryGraphEdgeTransition::KeyResolution
        ));
        assert!(matches_transition(
            &QueryGraphEdgeTransition::FreeTransition,
            &QueryGraphEdgeTransition::FreeTransition
        ));
    }
}

use std::sync::Arc;

use apollo_compiler::ast::FieldDefinition;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::schema::Component;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::InterfaceType;
use apollo_compiler::schema::ObjectType;
use apollo_compiler::Name;
use apollo_compiler::Node;
use indexmap::IndexMap;
use indexmap::IndexSet;
use strum::IntoEnumIterator;
use tracing::debug;
use tracing::trace;

use crate::bail;
use crate::ensure;
use crate::error::FederationError;
use crate::query_graph::field_set::parse_field_set;
use crate::query_graph::EdgeIndex;
use crate::query_graph::NodeIndex;
use crate::query_graph::QueryGraph;
use crate::query_graph::QueryGraphEdge;
use crate::query_graph::QueryGraphEdgeTransition;
use crate::query_graph::QueryGraphNode;
use crate::query_graph::QueryGraphNodeType;
use crate::query_graph::FEDERATED_GRAPH_ROOT_SOURCE;
use crate::schema::SchemaRootKind;
use crate::schema::ValidFederationSchema;
use crate::subgraph::spec::has_requires;
use crate::subgraph::spec::is_external;
use crate::subgraph::spec::key_applications;
use crate::subgraph::spec::provides_application;
use crate::subgraph::spec::requires_application;
use crate::subgraph::ValidFederationSubgraph;
use crate::Supergraph;

/// Builds a query graph for a single (non-subgraph) schema, for instance a supergraph API
/// schema.
///
/// The graph has one node per output type reachable from the schema's root types, one
/// `FieldCollection` edge per object field and one `Downcast` edge per abstract-type runtime
/// implementation. No edge carries conditions and no federation directive is interpreted.
pub fn build_query_graph(
    name: &str,
    schema: ValidFederationSchema,
) -> Result<QueryGraph, FederationError> {
    build_graph_internal(name, schema, None)
}

/// Builds the query graph of a supergraph's API schema.
pub fn build_supergraph_api_query_graph(
    supergraph: &Supergraph,
) -> Result<QueryGraph, FederationError> {
    let api_schema = supergraph.to_api_schema()?;
    build_query_graph("supergraph", api_schema)
}

/// Builds a "federated" query graph based on the provided supergraph: one that is used to reason
/// about queries made against the set of subgraph services the supergraph was composed from.
///
/// The subgraphs are extracted from the supergraph schema, a query graph is built for each, and
/// the per-subgraph graphs are merged under synthetic root nodes with `@key`, `@requires` and
/// `@provides` wired as cross-subgraph edges and edge conditions.
pub fn build_federated_query_graph(
    supergraph: &Supergraph,
) -> Result<QueryGraph, FederationError> {
    let subgraphs = supergraph.extract_subgraphs()?;
    build_federated_query_graph_from_subgraphs(supergraph.schema().clone(), subgraphs)
}

/// Like [`build_federated_query_graph`], for callers that already hold the subgraph schemas.
///
/// The supergraph schema is only used as context: to decide which interface fields can be reached
/// without type explosion, and as the schema behind the federated root source.
pub fn build_federated_query_graph_from_subgraphs(
    supergraph_schema: ValidFederationSchema,
    subgraphs: Vec<ValidFederationSubgraph>,
) -> Result<QueryGraph, FederationError> {
    let mut graphs = Vec::new();
    for subgraph in subgraphs {
        let graph = build_graph_internal(
            &subgraph.name,
            subgraph.schema.clone(),
            Some(supergraph_schema.clone()),
        )?;
        debug!(
            subgraph = %subgraph.name,
            nodes = graph.nodes_count(),
            edges = graph.edges_count(),
            "built subgraph query graph",
        );
        graphs.push((Arc::<str>::from(subgraph.name.as_str()), subgraph.schema, graph));
    }

    let root_kinds: Vec<SchemaRootKind> = SchemaRootKind::iter()
        .filter(|kind| graphs.iter().any(|(_, _, graph)| graph.root_node(*kind).is_some()))
        .collect();
    let capacity = graphs
        .iter()
        .map(|(_, _, graph)| graph.nodes_count())
        .sum::<usize>()
        + root_kinds.len();

    let root_source: Arc<str> = Arc::from(FEDERATED_GRAPH_ROOT_SOURCE);
    let mut base = BaseQueryGraphBuilder::new(root_source.clone(), capacity);
    // The synthetic roots take the first slots; every subgraph copy is offset past them.
    for kind in &root_kinds {
        base.create_root_node(
            QueryGraphNodeType::FederatedRootType(*kind),
            *kind,
            &root_source,
            &supergraph_schema,
        )?;
    }

    let mut entries = Vec::new();
    for (name, schema, graph) in graphs {
        let copied = base.copy_graph(&graph)?;
        for kind in graph.root_kinds() {
            let federated_root = base.root_node(kind)?;
            let subgraph_root = graph.root_node(kind).ok_or_else(|| {
                crate::internal_error!("Subgraph \"{name}\" lost its {kind} root")
            })?;
            base.add_edge(
                federated_root,
                copied.copied(subgraph_root),
                QueryGraphEdgeTransition::FreeTransition,
                None,
            )?;
        }
        entries.push(FederatedSubgraphEntry {
            schema,
            graph,
            copied,
        });
    }

    let mut builder = FederatedQueryGraphBuilder {
        base,
        subgraphs: entries,
        next_provide_id: 0,
    };
    builder.add_key_edges()?;
    builder.add_requires_conditions()?;
    // All @key edges must exist before @provides duplicates any node, so that the duplicates
    // inherit them.
    builder.add_provides_edges()?;
    let graph = builder.base.build()?;
    debug!(
        nodes = graph.nodes_count(),
        edges = graph.edges_count(),
        "built federated query graph",
    );
    Ok(graph)
}

fn build_graph_internal(
    name: &str,
    schema: ValidFederationSchema,
    supergraph_schema: Option<ValidFederationSchema>,
) -> Result<QueryGraph, FederationError> {
    let builder = SchemaQueryGraphBuilder::new(Arc::from(name), schema, supergraph_schema)?;
    builder.build()
}

/// Maps the node indexes of a graph copied with [`BaseQueryGraphBuilder::copy_graph`] to their
/// position in the destination builder.
#[derive(Debug, Clone, Copy)]
struct CopiedGraphNodes {
    offset: usize,
}

impl CopiedGraphNodes {
    fn copied(&self, node: NodeIndex) -> NodeIndex {
        node + self.offset
    }
}

/// Mutable scaffolding under every query graph build: nodes, per-node out-edges, roots and
/// sources, with the index bookkeeping the final immutable graph relies on.
///
/// The node at any occupied slot `i` has index `i`; freezing through [`Self::build`] fails if a
/// reserved slot was never filled.
struct BaseQueryGraphBuilder {
    name: Arc<str>,
    nodes: Vec<Option<QueryGraphNode>>,
    out_edges: Vec<Vec<QueryGraphEdge>>,
    next_index: usize,
    sources: IndexMap<Arc<str>, ValidFederationSchema>,
    types_to_nodes: IndexMap<Name, IndexSet<NodeIndex>>,
    root_kinds_to_nodes: IndexMap<SchemaRootKind, NodeIndex>,
}

impl BaseQueryGraphBuilder {
    fn new(name: Arc<str>, expected_nodes: usize) -> Self {
        Self {
            name,
            nodes: Vec::with_capacity(expected_nodes),
            out_edges: Vec::with_capacity(expected_nodes),
            next_index: 0,
            sources: IndexMap::new(),
            types_to_nodes: IndexMap::new(),
            root_kinds_to_nodes: IndexMap::new(),
        }
    }

    /// Allocates a node at `index` (defaulting to the next free slot). Registers the
    /// source-to-schema mapping the first time a source is seen.
    fn create_new_node(
        &mut self,
        type_: QueryGraphNodeType,
        source: &Arc<str>,
        schema: &ValidFederationSchema,
        index: Option<NodeIndex>,
    ) -> Result<NodeIndex, FederationError> {
        let index = match index {
            Some(index) => index,
            None => {
                let index = self.next_index;
                self.next_index += 1;
                index
            }
        };
        if index >= self.nodes.len() {
            self.nodes.resize_with(index + 1, || None);
            self.out_edges.resize_with(index + 1, Vec::new);
        }
        ensure!(
            self.nodes[index].is_none(),
            "Cannot create a node at index {index}: the slot is already occupied"
        );
        if !self.sources.contains_key(source) {
            self.sources.insert(source.clone(), schema.clone());
        }
        if let QueryGraphNodeType::SchemaType(type_name) = &type_ {
            self.types_to_nodes
                .entry(type_name.clone())
                .or_default()
                .insert(index);
        }
        self.nodes[index] = Some(QueryGraphNode {
            index,
            type_,
            source: source.clone(),
            provide_id: None,
            root_kind: None,
        });
        Ok(index)
    }

    /// Creates a node and immediately promotes it to the root for `root_kind`.
    fn create_root_node(
        &mut self,
        type_: QueryGraphNodeType,
        root_kind: SchemaRootKind,
        source: &Arc<str>,
        schema: &ValidFederationSchema,
    ) -> Result<NodeIndex, FederationError> {
        let node = self.create_new_node(type_, source, schema, None)?;
        self.set_as_root(root_kind, node)?;
        Ok(node)
    }

    /// Marks an existing node as the root for `root_kind`. Edges address their endpoints by
    /// index, so the node's existing out-edges need no rewriting.
    fn set_as_root(
        &mut self,
        root_kind: SchemaRootKind,
        node: NodeIndex,
    ) -> Result<(), FederationError> {
        ensure!(
            !self.root_kinds_to_nodes.contains_key(&root_kind),
            "A {root_kind} root node already exists"
        );
        self.node_mut(node)?.root_kind = Some(root_kind);
        self.root_kinds_to_nodes.insert(root_kind, node);
        Ok(())
    }

    fn root_node(&self, root_kind: SchemaRootKind) -> Result<NodeIndex, FederationError> {
        self.root_kinds_to_nodes
            .get(&root_kind)
            .copied()
            .ok_or_else(|| crate::internal_error!("No {root_kind} root node was created"))
    }

    /// Appends an edge to `head`'s out-edge list; the new edge's index is the list's prior
    /// length. Conditions are only allowed on edges whose head points to a composite type.
    fn add_edge(
        &mut self,
        head: NodeIndex,
        tail: NodeIndex,
        transition: QueryGraphEdgeTransition,
        conditions: Option<SelectionSet>,
    ) -> Result<(), FederationError> {
        ensure!(
            tail < self.nodes.len() && self.nodes[tail].is_some(),
            "Cannot add an edge to non-existent node {tail}"
        );
        if conditions.is_some() {
            let head_node = self.node(head)?;
            let QueryGraphNodeType::SchemaType(head_type_name) = &head_node.type_ else {
                bail!("Cannot add conditions to an edge out of the synthetic root {head_node}")
            };
            let schema = self.sources.get(&head_node.source).ok_or_else(|| {
                crate::internal_error!("Source \"{}\" was never registered", head_node.source)
            })?;
            ensure!(
                schema.is_composite_type(head_type_name)?,
                "Cannot add conditions to an edge out of non-composite type \"{head_type_name}\""
            );
        }
        let edges = self
            .out_edges
            .get_mut(head)
            .ok_or_else(|| crate::internal_error!("Cannot add an edge to non-existent node {head}"))?;
        let index = edges.len();
        edges.push(QueryGraphEdge {
            head,
            tail,
            index,
            transition,
            conditions,
        });
        Ok(())
    }

    fn node(&self, node: NodeIndex) -> Result<&QueryGraphNode, FederationError> {
        self.nodes
            .get(node)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| crate::internal_error!("Node {node} does not exist"))
    }

    fn node_mut(&mut self, node: NodeIndex) -> Result<&mut QueryGraphNode, FederationError> {
        self.nodes
            .get_mut(node)
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| crate::internal_error!("Node {node} does not exist"))
    }

    fn edge(&self, head: NodeIndex, index: EdgeIndex) -> Result<&QueryGraphEdge, FederationError> {
        self.out_edges
            .get(head)
            .and_then(|edges| edges.get(index))
            .ok_or_else(|| crate::internal_error!("Node {head} has no out-edge {index}"))
    }

    /// Replaces the edge at `(head, index)` with an identical edge leading to `new_tail`.
    fn update_edge_tail(
        &mut self,
        head: NodeIndex,
        index: EdgeIndex,
        new_tail: NodeIndex,
    ) -> Result<(), FederationError> {
        ensure!(
            new_tail < self.nodes.len() && self.nodes[new_tail].is_some(),
            "Cannot point an edge at non-existent node {new_tail}"
        );
        let edge = self
            .out_edges
            .get_mut(head)
            .and_then(|edges| edges.get_mut(index))
            .ok_or_else(|| crate::internal_error!("Node {head} has no out-edge {index}"))?;
        edge.tail = new_tail;
        Ok(())
    }

    /// Merges the given selections into the conditions of the edge at `(head, index)`.
    fn add_to_edge_conditions(
        &mut self,
        head: NodeIndex,
        index: EdgeIndex,
        conditions: &SelectionSet,
    ) -> Result<(), FederationError> {
        let edge = self
            .out_edges
            .get_mut(head)
            .and_then(|edges| edges.get_mut(index))
            .ok_or_else(|| crate::internal_error!("Node {head} has no out-edge {index}"))?;
        edge.add_to_conditions(conditions);
        Ok(())
    }

    /// Allocates a fresh node with the same type and source as `node` and copies all of `node`'s
    /// out-edges onto it (same transitions, conditions, tails and local indexes). The copy has no
    /// in-edges.
    fn make_copy(
        &mut self,
        node: NodeIndex,
        provide_id: Option<u32>,
    ) -> Result<NodeIndex, FederationError> {
        let original = self.node(node)?.clone();
        let schema = self
            .sources
            .get(&original.source)
            .cloned()
            .ok_or_else(|| {
                crate::internal_error!("Source \"{}\" was never registered", original.source)
            })?;
        let copy = self.create_new_node(original.type_.clone(), &original.source, &schema, None)?;
        self.node_mut(copy)?.provide_id = provide_id;
        let edges = self.out_edges[node].clone();
        for edge in edges {
            self.add_edge(copy, edge.tail, edge.transition, edge.conditions)?;
        }
        Ok(copy)
    }

    /// Copies every node and edge of `graph` into this builder, placing the copy of node `i` at
    /// `i + offset` where `offset` is the builder's cursor at the time of the call, and advances
    /// the cursor past the copy.
    ///
    /// Nodes that are unreachable from the roots (a type mentioned only by an @external field,
    /// say) are copied too, so the destination stays dense. Out-edges are copied per head in
    /// order, preserving every edge's local index; root markers are not carried over.
    fn copy_graph(&mut self, graph: &QueryGraph) -> Result<CopiedGraphNodes, FederationError> {
        let offset = self.next_index;
        for node in graph.nodes() {
            let schema = graph.schema_by_source(&node.source)?;
            let copy = self.create_new_node(
                node.type_.clone(),
                &node.source,
                schema,
                Some(node.index + offset),
            )?;
            self.node_mut(copy)?.provide_id = node.provide_id;
        }
        for node in graph.nodes() {
            for edge in graph.out_edges(node.index)? {
                self.add_edge(
                    edge.head + offset,
                    edge.tail + offset,
                    edge.transition.clone(),
                    edge.conditions.clone(),
                )?;
            }
        }
        self.next_index = offset + graph.nodes_count();
        Ok(CopiedGraphNodes { offset })
    }

    /// The first node pointing at the given type in the given source, if any.
    fn node_for_type_and_source(&self, type_name: &Name, source: &str) -> Option<NodeIndex> {
        self.types_to_nodes.get(type_name)?.iter().copied().find(|&node| {
            self.nodes[node]
                .as_ref()
                .is_some_and(|n| &*n.source == source)
        })
    }

    /// Freezes the builder into an immutable graph. Consumes the builder, so it can only run
    /// once.
    fn build(self) -> Result<QueryGraph, FederationError> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (index, slot) in self.nodes.into_iter().enumerate() {
            let node = slot.ok_or_else(|| {
                crate::internal_error!("Node slot {index} was reserved but never filled")
            })?;
            ensure!(
                node.index == index,
                "Node at slot {index} claims index {}",
                node.index
            );
            nodes.push(node);
        }
        for (root_kind, root) in &self.root_kinds_to_nodes {
            ensure!(
                nodes[*root].root_kind == Some(*root_kind),
                "The {root_kind} root points at node {root}, which is not marked as such"
            );
        }
        Ok(QueryGraph {
            name: self.name,
            nodes,
            out_edges: self.out_edges,
            sources: self.sources,
            types_to_nodes: self.types_to_nodes,
            root_kinds_to_nodes: self.root_kinds_to_nodes,
        })
    }
}

/// Walks a single GraphQL schema from its root types and grows a query graph from what it finds.
///
/// In subgraph mode (the schema carries the federation directive definitions, and the supergraph
/// schema is supplied as context) interface nodes additionally get direct field edges whenever
/// every local runtime type of the interface provides the field, which spares the planner from
/// type-exploding those interfaces.
struct SchemaQueryGraphBuilder {
    base: BaseQueryGraphBuilder,
    source: Arc<str>,
    schema: ValidFederationSchema,
    subgraph: Option<SchemaQueryGraphBuilderSubgraphData>,
}

struct SchemaQueryGraphBuilderSubgraphData {
    supergraph_schema: ValidFederationSchema,
}

impl SchemaQueryGraphBuilder {
    fn new(
        source: Arc<str>,
        schema: ValidFederationSchema,
        supergraph_schema: Option<ValidFederationSchema>,
    ) -> Result<Self, FederationError> {
        let is_subgraph = schema.is_federation_subgraph();
        ensure!(
            !is_subgraph || supergraph_schema.is_some(),
            "Cannot build a query graph for subgraph \"{source}\" without its supergraph"
        );
        let subgraph = if is_subgraph {
            supergraph_schema
                .map(|supergraph_schema| SchemaQueryGraphBuilderSubgraphData { supergraph_schema })
        } else {
            None
        };
        let base = BaseQueryGraphBuilder::new(source.clone(), 0);
        Ok(SchemaQueryGraphBuilder {
            base,
            source,
            schema,
            subgraph,
        })
    }

    fn build(mut self) -> Result<QueryGraph, FederationError> {
        for root_kind in SchemaRootKind::iter() {
            if let Some(root_type_name) = self.schema.root_type(root_kind) {
                let root_type_name = root_type_name.clone();
                self.add_recursively_from_root(root_kind, root_type_name)?;
            }
        }
        self.base.build()
    }

    /// Adds a node for the provided root object type (marking that node as a root node for the
    /// provided `root_kind`) and recursively descends into the type definition to add the related
    /// nodes and edges. In other words, calling this method on, say, the root query type of a
    /// schema will add nodes and edges for everything reachable from that root query type.
    fn add_recursively_from_root(
        &mut self,
        root_kind: SchemaRootKind,
        root_type_name: Name,
    ) -> Result<(), FederationError> {
        ensure!(
            matches!(self.schema.get_type(&root_type_name)?, ExtendedType::Object(_)),
            "Root type \"{root_type_name}\" was unexpectedly not an object type"
        );
        let node = self.add_type_recursively(root_type_name)?;
        self.base.set_as_root(root_kind, node)
    }

    /// Adds a node for the provided type in the in-building query graph, and recursively adds
    /// edges and nodes corresponding to the type definition (so for object types, it will add
    /// edges for each field and recursively add nodes for each field's type, etc...).
    fn add_type_recursively(&mut self, type_name: Name) -> Result<NodeIndex, FederationError> {
        if let Some(existing) = self.base.types_to_nodes.get(&type_name) {
            if let Some(first_node) = existing.first() {
                ensure!(
                    existing.len() == 1,
                    "Only one node should have been created for type \"{type_name}\", got {}",
                    existing.len()
                );
                return Ok(*first_node);
            }
        }
        let node = self.base.create_new_node(
            type_name.clone().into(),
            &self.source,
            &self.schema,
            None,
        )?;
        match self.schema.get_type(&type_name)?.clone() {
            ExtendedType::Object(object) => {
                self.add_object_type_edges(&object, node)?;
            }
            ExtendedType::Interface(interface) => {
                // For interfaces, we generally don't add direct edges for their fields. Because
                // in general, the subgraph where a particular field can be fetched from may
                // depend on the runtime implementation. However, if the subgraph we're currently
                // building locally provides a particular interface field for all the
                // supergraph's implementations of the interface (in other words, we know we can
                // always ask the field to that subgraph directly on the interface and will never
                // miss anything), then we can add a direct edge to the field for the interface
                // in that subgraph (which avoids unnecessary type exploding in practice).
                if self.subgraph.is_some() {
                    self.maybe_add_interface_fields_edges(&interface, node)?;
                }
                self.add_abstract_type_edges(interface.name.clone(), node)?;
            }
            ExtendedType::Union(union_) => {
                self.add_abstract_type_edges(union_.name.clone(), node)?;
            }
            // Any other case (scalar, enum or input object) is terminal and has no edges to
            // consider.
            _ => {}
        }
        Ok(node)
    }

    fn add_object_type_edges(
        &mut self,
        object: &Node<ObjectType>,
        head: NodeIndex,
    ) -> Result<(), FederationError> {
        for field in object.fields.values() {
            // Fields marked @external only exist to ensure subgraph schemas are valid GraphQL,
            // but they don't create actual edges. However, even if we don't add an edge, we
            // still want to add the field's type: while there is no "general" edge for an
            // external field, we may later add path-specific edges for it due to a @provides,
            // and in rare cases the field's type could be mentioned nowhere else.
            let skip_edge = is_external(field);
            self.add_edge_for_field(field, head, skip_edge)?;
        }
        Ok(())
    }

    fn add_edge_for_field(
        &mut self,
        field: &Component<FieldDefinition>,
        head: NodeIndex,
        skip_edge: bool,
    ) -> Result<(), FederationError> {
        let tail_type_name = field.ty.inner_named_type().clone();
        let tail = self.add_type_recursively(tail_type_name)?;
        if !skip_edge {
            let transition = QueryGraphEdgeTransition::FieldCollection {
                source: self.source.clone(),
                field_definition: field.node.clone(),
                is_part_of_provides: false,
            };
            self.base.add_edge(head, tail, transition, None)?;
        }
        Ok(())
    }

    fn maybe_add_interface_fields_edges(
        &mut self,
        interface: &Node<InterfaceType>,
        head: NodeIndex,
    ) -> Result<(), FederationError> {
        let Some(subgraph) = &self.subgraph else {
            bail!("Missing subgraph data when building subgraph query graph")
        };
        // The interface might not be part of the supergraph at all (say, it was marked
        // inaccessible). In that case we just don't add direct edges: they are an optimization,
        // and an interface unknown to the supergraph cannot matter to planning anyway.
        if subgraph
            .supergraph_schema
            .try_get_type(&interface.name)
            .is_none()
        {
            return Ok(());
        }
        let supergraph_runtime_types = subgraph
            .supergraph_schema
            .possible_runtime_types(&interface.name)?;
        // The current subgraph may not know some of the supergraph's runtime types. But as edges
        // to an interface can only come from this subgraph, whatever field led here was resolved
        // locally and can never return one of those unknown types, so they can be ignored.
        let local_runtime_types: Vec<Name> = supergraph_runtime_types
            .into_iter()
            .filter(|type_name| self.schema.try_get_type(type_name).is_some())
            .collect();

        for (field_name, field) in &interface.fields {
            // To get a direct edge, the field must not be external itself and must be directly
            // provided by every local runtime type.
            if is_external(field) {
                continue;
            }
            let mut provided_by_all_local_types = true;
            for local_runtime_type in &local_runtime_types {
                if !self.is_directly_provided_by_type(local_runtime_type, field_name)? {
                    provided_by_all_local_types = false;
                }
            }
            if !provided_by_all_local_types {
                continue;
            }
            self.add_edge_for_field(field, head, false)?;
        }
        Ok(())
    }

    fn is_directly_provided_by_type(
        &self,
        object_type_name: &Name,
        field_name: &Name,
    ) -> Result<bool, FederationError> {
        // The field is directly provided if:
        //   1) the type does have it,
        //   2) it is not external,
        //   3) it does not have a @requires (this method decides whether an interface can avoid
        //      type-explosion, but a @requires on an implementation forces explosion so the
        //      requirement is handled).
        let Some(ExtendedType::Object(object)) = self.schema.try_get_type(object_type_name) else {
            return Ok(false);
        };
        let Some(field) = object.fields.get(field_name) else {
            return Ok(false);
        };
        Ok(!is_external(field) && !has_requires(field))
    }

    fn add_abstract_type_edges(
        &mut self,
        abstract_type_name: Name,
        head: NodeIndex,
    ) -> Result<(), FederationError> {
        let implementations = self.schema.possible_runtime_types(&abstract_type_name)?;
        for implementation_type_name in implementations {
            let tail = self.add_type_recursively(implementation_type_name.clone())?;
            let transition = QueryGraphEdgeTransition::Downcast {
                source: self.source.clone(),
                from_type_name: abstract_type_name.clone(),
                to_type_name: implementation_type_name,
            };
            self.base.add_edge(head, tail, transition, None)?;
        }
        Ok(())
    }
}

struct FederatedSubgraphEntry {
    schema: ValidFederationSchema,
    graph: QueryGraph,
    copied: CopiedGraphNodes,
}

/// Wires the federation directives across the copied subgraph graphs: `@key` becomes
/// cross-subgraph `KeyResolution` edges, `@requires` merges into field-edge conditions, and
/// `@provides` redirects field edges into duplicated sub-regions carrying the provided
/// selections.
struct FederatedQueryGraphBuilder {
    base: BaseQueryGraphBuilder,
    subgraphs: Vec<FederatedSubgraphEntry>,
    next_provide_id: u32,
}

impl FederatedQueryGraphBuilder {
    /// For every `@key` on a type of a subgraph, adds an edge from every other subgraph's node
    /// for that type into the declaring subgraph's node, conditioned on the key fields.
    fn add_key_edges(&mut self) -> Result<(), FederationError> {
        for (i, entry) in self.subgraphs.iter().enumerate() {
            for node in entry.graph.nodes() {
                let Some(type_name) = node.type_().schema_type_name() else {
                    continue;
                };
                let type_ = entry.schema.get_type(type_name)?;
                let applications =
                    key_applications(type_.directives().iter().map(|d| &***d))?;
                if applications.is_empty() {
                    continue;
                }
                ensure!(
                    matches!(type_, ExtendedType::Object(_) | ExtendedType::Interface(_)),
                    "Invalid @key on non-object, non-interface type \"{type_name}\""
                );
                for application in applications {
                    // A non-resolvable key cannot be used to reach this subgraph.
                    if !application.resolvable {
                        continue;
                    }
                    let conditions =
                        parse_field_set(&entry.schema, type_name.clone(), application.fields)?;
                    let tail = entry.copied.copied(node.index());
                    for (j, other) in self.subgraphs.iter().enumerate() {
                        if j == i {
                            continue;
                        }
                        // Subgraphs that don't know the type simply get no edge; at this stage
                        // (before @provides duplication) a subgraph holds at most one node per
                        // type.
                        let mut other_nodes = other.graph.nodes_for_type(type_name);
                        let Some(other_node) = other_nodes.next() else {
                            continue;
                        };
                        ensure!(
                            other_nodes.next().is_none(),
                            "Duplicate nodes for type \"{type_name}\" before @provides handling"
                        );
                        let head = other.copied.copied(other_node);
                        trace!(type_name = %type_name, key = application.fields, "adding key edge");
                        self.base.add_edge(
                            head,
                            tail,
                            QueryGraphEdgeTransition::KeyResolution,
                            Some(conditions.clone()),
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    /// For every field with a `@requires`, merges the required selections into the conditions of
    /// the corresponding copied edge. Relies on graph copies preserving per-node edge indexes.
    fn add_requires_conditions(&mut self) -> Result<(), FederationError> {
        for entry in &self.subgraphs {
            for node in entry.graph.nodes() {
                for edge in entry.graph.out_edges(node.index())? {
                    let QueryGraphEdgeTransition::FieldCollection {
                        field_definition, ..
                    } = edge.transition()
                    else {
                        continue;
                    };
                    let Some(requires) = requires_application(field_definition)? else {
                        continue;
                    };
                    let Some(head_type_name) = node.type_().schema_type_name() else {
                        continue;
                    };
                    trace!(
                        field = %field_definition.name,
                        requires,
                        "merging requirement into edge conditions",
                    );
                    let conditions =
                        parse_field_set(&entry.schema, head_type_name.clone(), requires)?;
                    let head = entry.copied.copied(node.index());
                    self.base
                        .add_to_edge_conditions(head, edge.index(), &conditions)?;
                }
            }
        }
        Ok(())
    }

    /// For every field with a `@provides`, duplicates the edge's tail (out-edges included, which
    /// is why keys must already be wired) and materialises the provided selections under the
    /// duplicate, so that taking this specific field edge exposes what the subgraph additionally
    /// provides without affecting any other path to the type.
    fn add_provides_edges(&mut self) -> Result<(), FederationError> {
        for entry in &self.subgraphs {
            for node in entry.graph.nodes() {
                for edge in entry.graph.out_edges(node.index())? {
                    let QueryGraphEdgeTransition::FieldCollection {
                        source,
                        field_definition,
                        ..
                    } = edge.transition()
                    else {
                        continue;
                    };
                    let Some(provides) = provides_application(field_definition)? else {
                        continue;
                    };
                    let provided_type_name = field_definition.ty.inner_named_type();
                    ensure!(
                        entry.schema.is_composite_type(provided_type_name)?,
                        "Invalid @provides on field \"{}\" of non-composite type \"{provided_type_name}\"",
                        field_definition.name
                    );
                    trace!(
                        field = %field_definition.name,
                        provides,
                        "duplicating edge tail for @provides",
                    );
                    let provided =
                        parse_field_set(&entry.schema, provided_type_name.clone(), provides)?;
                    self.next_provide_id += 1;
                    let provide_id = self.next_provide_id;
                    let head = entry.copied.copied(node.index());
                    let original_tail = self.base.edge(head, edge.index())?.tail;
                    let tail_copy = self.base.make_copy(original_tail, Some(provide_id))?;
                    self.base.update_edge_tail(head, edge.index(), tail_copy)?;
                    Self::add_provides_selection(
                        &mut self.base,
                        source,
                        &entry.schema,
                        tail_copy,
                        &provided,
                        provide_id,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Materialises a `@provides` selection under `head`: a `FieldCollection` edge per selected
    /// field (a brand-new node for non-leaf fields, since the provide only reaches a subset of
    /// the type; the existing same-source node for leaf fields when there is one) and a
    /// `Downcast` edge through a fresh node per inline type condition.
    fn add_provides_selection(
        base: &mut BaseQueryGraphBuilder,
        source: &Arc<str>,
        schema: &ValidFederationSchema,
        head: NodeIndex,
        provided: &SelectionSet,
        provide_id: u32,
    ) -> Result<(), FederationError> {
        let mut stack = vec![(head, provided.clone())];
        while let Some((node, selection_set)) = stack.pop() {
            // We reverse the selections because the stack reverses them back.
            for selection in selection_set.selections.iter().rev() {
                match selection {
                    Selection::Field(field) => {
                        let field_definition = field.definition.clone();
                        let tail_type_name = field_definition.ty.inner_named_type().clone();
                        let transition = QueryGraphEdgeTransition::FieldCollection {
                            source: source.clone(),
                            field_definition,
                            is_part_of_provides: true,
                        };
                        if field.selection_set.selections.is_empty() {
                            let tail = match base.node_for_type_and_source(&tail_type_name, source)
                            {
                                Some(existing) => existing,
                                None => base.create_new_node(
                                    tail_type_name.into(),
                                    source,
                                    schema,
                                    None,
                                )?,
                            };
                            base.add_edge(node, tail, transition, None)?;
                        } else {
                            // The provide only reaches the selected subset of the field's type,
                            // so it always gets its own node.
                            let tail = base.create_new_node(
                                tail_type_name.into(),
                                source,
                                schema,
                                None,
                            )?;
                            base.node_mut(tail)?.provide_id = Some(provide_id);
                            base.add_edge(node, tail, transition, None)?;
                            stack.push((tail, field.selection_set.clone()));
                        }
                    }
                    Selection::InlineFragment(fragment) => match &fragment.type_condition {
                        Some(type_condition) => {
                            let from_type_name = base
                                .node(node)?
                                .type_
                                .schema_type_name()
                                .cloned()
                                .ok_or_else(|| {
                                    crate::internal_error!(
                                        "@provides selection unexpectedly walked a synthetic root"
                                    )
                                })?;
                            let tail = base.create_new_node(
                                type_condition.clone().into(),
                                source,
                                schema,
                                None,
                            )?;
                            base.node_mut(tail)?.provide_id = Some(provide_id);
                            let transition = QueryGraphEdgeTransition::Downcast {
                                source: source.clone(),
                                from_type_name,
                                to_type_name: type_condition.clone(),
                            };
                            base.add_edge(node, tail, transition, None)?;
                            stack.push((tail, fragment.selection_set.clone()));
                        }
                        None => stack.push((node, fragment.selection_set.clone())),
                    },
                    Selection::FragmentSpread(_) => {
                        bail!("Unexpected fragment spread in @provides field set")
                    }
                }
            }
        }
        Ok(())
    }
}

//! Query graph construction over federated GraphQL schemas.
//!
//! A query graph is an immutable, directed, indexed multigraph layered over one or more GraphQL
//! schemas: nodes are `(type, source)` positions and edges are the ways a traversal may move
//! between them, by collecting a field, narrowing to a runtime type, or jumping across subgraphs
//! through an entity key. Composition validation and query planning consume these graphs to
//! reason about which queries a set of subgraphs can satisfy and how.
//!
//! Three entry points build graphs:
//! - [`build_query_graph`] for a single plain schema;
//! - [`build_supergraph_api_query_graph`] for the API schema of a [`Supergraph`];
//! - [`build_federated_query_graph`] for the full federated graph of a [`Supergraph`], where
//!   per-subgraph graphs are merged under synthetic roots and `@key`, `@requires` and
//!   `@provides` become cross-subgraph edges and edge conditions.

use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;
use apollo_compiler::Schema;

use crate::error::FederationError;
use crate::error::SingleFederationError;
use crate::schema::ValidFederationSchema;
use crate::subgraph::extract_subgraphs_from_supergraph;
use crate::subgraph::ValidFederationSubgraph;

pub mod error;
pub mod query_graph;
pub mod schema;
pub mod subgraph;

pub use crate::query_graph::build_query_graph::build_federated_query_graph;
pub use crate::query_graph::build_query_graph::build_federated_query_graph_from_subgraphs;
pub use crate::query_graph::build_query_graph::build_query_graph;
pub use crate::query_graph::build_query_graph::build_supergraph_api_query_graph;
pub use crate::query_graph::graph_state::QueryGraphState;
pub use crate::query_graph::matches_transition;
pub use crate::query_graph::simple_traversal;
pub use crate::query_graph::EdgeIndex;
pub use crate::query_graph::NodeIndex;
pub use crate::query_graph::QueryGraph;
pub use crate::query_graph::QueryGraphEdge;
pub use crate::query_graph::QueryGraphEdgeTransition;
pub use crate::query_graph::QueryGraphNode;
pub use crate::query_graph::QueryGraphNodeType;
pub use crate::query_graph::FEDERATED_GRAPH_ROOT_SOURCE;
pub use crate::schema::SchemaRootKind;

/// A validated supergraph schema, as produced by composition with the join spec.
pub struct Supergraph {
    schema: ValidFederationSchema,
}

impl Supergraph {
    pub fn new(schema_str: &str) -> Result<Self, FederationError> {
        let schema = Schema::parse_and_validate(schema_str, "supergraph.graphql")?;
        Ok(Self {
            schema: ValidFederationSchema::new(schema),
        })
    }

    pub fn schema(&self) -> &ValidFederationSchema {
        &self.schema
    }

    /// The subgraphs this supergraph was composed from.
    pub fn extract_subgraphs(&self) -> Result<Vec<ValidFederationSubgraph>, FederationError> {
        extract_subgraphs_from_supergraph(&self.schema)
    }

    /// Generates the API schema from the supergraph schema: the join/link machinery and all
    /// `@inaccessible` elements are stripped, leaving the schema clients actually query.
    pub fn to_api_schema(&self) -> Result<ValidFederationSchema, FederationError> {
        let mut api_schema = self.schema.schema().clone().into_inner();

        // remove schema directives
        api_schema.schema_definition.make_mut().directives.clear();

        // remove join/link machinery types and inaccessible types
        api_schema.types.retain(|type_name, type_| {
            !type_name.starts_with("join__")
                && !type_name.starts_with("link__")
                && !type_.directives().has("inaccessible")
        });

        // remove directive applications and inaccessible members
        for type_ in api_schema.types.values_mut() {
            match type_ {
                ExtendedType::Scalar(scalar) => {
                    scalar.make_mut().directives.clear();
                }
                ExtendedType::Object(object) => {
                    let object = object.make_mut();
                    object.directives.clear();
                    object
                        .fields
                        .retain(|_, field| !field.directives.has("inaccessible"));
                    for field in object.fields.values_mut() {
                        let field = field.make_mut();
                        field.directives.clear();
                        field
                            .arguments
                            .retain(|arg| !arg.directives.has("inaccessible"));
                        for arg in field.arguments.iter_mut() {
                            arg.make_mut().directives.clear();
                        }
                    }
                }
                ExtendedType::Interface(interface) => {
                    let interface = interface.make_mut();
                    interface.directives.clear();
                    interface
                        .fields
                        .retain(|_, field| !field.directives.has("inaccessible"));
                    for field in interface.fields.values_mut() {
                        let field = field.make_mut();
                        field.directives.clear();
                        for arg in field.arguments.iter_mut() {
                            arg.make_mut().directives.clear();
                        }
                    }
                }
                ExtendedType::Union(union_) => {
                    union_.make_mut().directives.clear();
                }
                ExtendedType::Enum(enum_) => {
                    let enum_ = enum_.make_mut();
                    enum_.directives.clear();
                    enum_
                        .values
                        .retain(|_, value| !value.directives.has("inaccessible"));
                    for value in enum_.values.values_mut() {
                        value.make_mut().directives.clear();
                    }
                }
                ExtendedType::InputObject(input_object) => {
                    let input_object = input_object.make_mut();
                    input_object.directives.clear();
                    input_object
                        .fields
                        .retain(|_, field| !field.directives.has("inaccessible"));
                    for field in input_object.fields.values_mut() {
                        field.make_mut().directives.clear();
                    }
                }
            }
        }

        // remove directive definitions, built-ins aside
        api_schema
            .directive_definitions
            .retain(|name, _| matches!(name.as_str(), "skip" | "include" | "deprecated" | "specifiedBy"));

        let valid = api_schema
            .validate()
            .map_err(|e| SingleFederationError::InvalidSupergraph {
                message: format!(
                    "Supergraph API schema is not a valid schema: {}",
                    FederationError::from(e)
                ),
            })?;
        Ok(ValidFederationSchema::new(valid))
    }
}

impl From<Valid<Schema>> for Supergraph {
    fn from(schema: Valid<Schema>) -> Self {
        Self {
            schema: ValidFederationSchema::new(schema),
        }
    }
}

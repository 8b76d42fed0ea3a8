use apollo_compiler::ast::Argument;
use apollo_compiler::ast::Directive;
use apollo_compiler::ast::FieldDefinition;
use apollo_compiler::ast::InputValueDefinition;
use apollo_compiler::ast::Value;
use apollo_compiler::collections::IndexMap;
use apollo_compiler::collections::IndexSet;
use apollo_compiler::name;
use apollo_compiler::schema::Component;
use apollo_compiler::schema::ComponentName;
use apollo_compiler::schema::ComponentOrigin;
use apollo_compiler::schema::EnumType;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::InterfaceType;
use apollo_compiler::schema::ObjectType;
use apollo_compiler::schema::UnionType;
use apollo_compiler::ty;
use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;

use crate::error::FederationError;
use crate::error::SingleFederationError;
use crate::schema::ValidFederationSchema;
use crate::subgraph::spec::directive_optional_boolean_argument;
use crate::subgraph::spec::directive_optional_enum_argument;
use crate::subgraph::spec::directive_optional_string_argument;
use crate::subgraph::spec::directive_required_string_argument;
use crate::subgraph::spec::ENTITIES_QUERY_NAME;
use crate::subgraph::spec::ENTITY_UNION_NAME;
use crate::subgraph::spec::EXTERNAL_DIRECTIVE_NAME;
use crate::subgraph::spec::FEDERATION_SPEC_SCHEMA;
use crate::subgraph::spec::FIELDS_ARGUMENT_NAME;
use crate::subgraph::spec::KEY_DIRECTIVE_NAME;
use crate::subgraph::spec::PROVIDES_DIRECTIVE_NAME;
use crate::subgraph::spec::REPRESENTATIONS_ARGUMENT_NAME;
use crate::subgraph::spec::REQUIRES_DIRECTIVE_NAME;
use crate::subgraph::spec::RESOLVABLE_ARGUMENT_NAME;

pub mod spec;

/// A subgraph participating in a federation: its name, routing URL and validated schema.
pub struct ValidFederationSubgraph {
    pub name: String,
    pub url: String,
    pub schema: ValidFederationSchema,
}

const JOIN_GRAPH_ENUM_NAME: Name = name!("join__Graph");
const JOIN_GRAPH_DIRECTIVE_NAME: Name = name!("join__graph");
const JOIN_TYPE_DIRECTIVE_NAME: Name = name!("join__type");
const JOIN_FIELD_DIRECTIVE_NAME: Name = name!("join__field");
const JOIN_UNION_MEMBER_DIRECTIVE_NAME: Name = name!("join__unionMember");
const JOIN_ENUM_VALUE_DIRECTIVE_NAME: Name = name!("join__enumValue");

const GRAPH_ARGUMENT_NAME: Name = name!("graph");
const NAME_ARGUMENT_NAME: Name = name!("name");
const URL_ARGUMENT_NAME: Name = name!("url");
const KEY_ARGUMENT_NAME: Name = name!("key");
const MEMBER_ARGUMENT_NAME: Name = name!("member");
const REQUIRES_ARGUMENT_NAME: Name = name!("requires");
const PROVIDES_ARGUMENT_NAME: Name = name!("provides");
const EXTERNAL_ARGUMENT_NAME: Name = name!("external");

/// Splits a supergraph schema (composed with the join spec, v0.3 or later) back into the
/// subgraph schemas it was built from, with the join directives translated back into the
/// federation directives (`@key`, `@requires`, `@provides`, `@external`).
///
/// Subgraphs holding at least one entity additionally get the `_Entity` union and an
/// `_entities` field on their query root, keeping every entity reachable from the root the way
/// the runtime exposes it.
pub fn extract_subgraphs_from_supergraph(
    supergraph_schema: &ValidFederationSchema,
) -> Result<Vec<ValidFederationSubgraph>, FederationError> {
    let schema = supergraph_schema.schema();
    let Some(ExtendedType::Enum(graph_enum)) = schema.types.get(&JOIN_GRAPH_ENUM_NAME) else {
        return Err(SingleFederationError::InvalidSupergraph {
            message: format!("Schema has no \"{JOIN_GRAPH_ENUM_NAME}\" enum"),
        }
        .into());
    };
    let graphs = graph_names(graph_enum)?;
    let membership = type_membership(schema, &graphs)?;

    let mut subgraphs = Vec::new();
    for (graph_enum_value, (subgraph_name, url)) in &graphs {
        subgraphs.push(ValidFederationSubgraph {
            name: subgraph_name.clone(),
            url: url.clone(),
            schema: extract_subgraph(schema, subgraph_name, graph_enum_value, &membership)?,
        });
    }
    Ok(subgraphs)
}

/// The subgraph name and URL declared by each `join__Graph` enum value.
fn graph_names(
    graph_enum: &Node<EnumType>,
) -> Result<IndexMap<Name, (String, String)>, FederationError> {
    let mut graphs = IndexMap::default();
    for (value_name, value) in &graph_enum.values {
        let directive = value
            .directives
            .iter()
            .find(|d| d.name == JOIN_GRAPH_DIRECTIVE_NAME)
            .ok_or_else(|| SingleFederationError::InvalidSupergraph {
                message: format!(
                    "Value \"{value_name}\" of the \"{JOIN_GRAPH_ENUM_NAME}\" enum has no \
                     @{JOIN_GRAPH_DIRECTIVE_NAME} application"
                ),
            })?;
        let name = directive_required_string_argument(directive, &NAME_ARGUMENT_NAME)?;
        let url =
            directive_optional_string_argument(directive, &URL_ARGUMENT_NAME)?.unwrap_or_default();
        graphs.insert(value_name.clone(), (name.to_owned(), url.to_owned()));
    }
    Ok(graphs)
}

/// Which graphs each supergraph type belongs to. A type with no `@join__type` application at
/// all belongs to every subgraph.
fn type_membership(
    schema: &Schema,
    graphs: &IndexMap<Name, (String, String)>,
) -> Result<IndexMap<Name, IndexSet<Name>>, FederationError> {
    let mut membership = IndexMap::default();
    for (type_name, type_) in &schema.types {
        if is_join_machinery_type(type_name) || type_.is_built_in() {
            continue;
        }
        let mut joined = IndexSet::default();
        for directive in type_.directives().get_all(&JOIN_TYPE_DIRECTIVE_NAME) {
            if let Some(graph) = directive_optional_enum_argument(directive, &GRAPH_ARGUMENT_NAME)?
            {
                joined.insert(graph);
            }
        }
        if joined.is_empty() {
            joined = graphs.keys().cloned().collect();
        }
        membership.insert(type_name.clone(), joined);
    }
    Ok(membership)
}

fn is_join_machinery_type(type_name: &Name) -> bool {
    type_name.starts_with("join__") || type_name.starts_with("link__")
}

fn extract_subgraph(
    supergraph: &Schema,
    subgraph_name: &str,
    graph: &Name,
    membership: &IndexMap<Name, IndexSet<Name>>,
) -> Result<ValidFederationSchema, FederationError> {
    let mut schema = Schema::parse(
        FEDERATION_SPEC_SCHEMA,
        format!("{subgraph_name}.graphql"),
    )?;

    for (type_name, type_) in &supergraph.types {
        if is_join_machinery_type(type_name) || type_.is_built_in() {
            continue;
        }
        if !membership
            .get(type_name)
            .is_some_and(|joined| joined.contains(graph))
        {
            continue;
        }
        let extracted = match type_ {
            ExtendedType::Scalar(scalar) => {
                let mut scalar = scalar.clone();
                scalar.make_mut().directives.clear();
                Some(ExtendedType::Scalar(scalar))
            }
            ExtendedType::Object(object) => {
                Some(ExtendedType::Object(extract_object(object, graph, membership)?))
            }
            ExtendedType::Interface(interface) => Some(ExtendedType::Interface(
                extract_interface(interface, graph, membership)?,
            )),
            ExtendedType::Union(union_) => extract_union(union_, graph, membership)?
                .map(ExtendedType::Union),
            ExtendedType::Enum(enum_) => Some(ExtendedType::Enum(extract_enum(enum_, graph)?)),
            ExtendedType::InputObject(input_object) => {
                let mut input_object = input_object.clone();
                let input_object_mut = input_object.make_mut();
                input_object_mut.directives.clear();
                for field in input_object_mut.fields.values_mut() {
                    field.make_mut().directives.clear();
                }
                Some(ExtendedType::InputObject(input_object))
            }
        };
        if let Some(extracted) = extracted {
            schema.types.insert(type_name.clone(), extracted);
        }
    }

    copy_root_operations(supergraph, &mut schema);
    add_entity_plumbing(&mut schema);

    let valid = schema
        .validate()
        .map_err(|e| SingleFederationError::InvalidSubgraph {
            message: format!(
                "Extracted subgraph \"{subgraph_name}\" is not a valid schema: {}",
                FederationError::from(e)
            ),
        })?;
    Ok(ValidFederationSchema::new(valid))
}

fn extract_object(
    object: &Node<ObjectType>,
    graph: &Name,
    membership: &IndexMap<Name, IndexSet<Name>>,
) -> Result<Node<ObjectType>, FederationError> {
    let keys = join_type_keys(object.directives.get_all(&JOIN_TYPE_DIRECTIVE_NAME), graph)?;
    let fields = extract_fields(&object.fields, graph)?;
    let mut out = object.clone();
    let out_mut = out.make_mut();
    out_mut.directives.clear();
    for (key_fields, resolvable) in keys {
        out_mut.directives.push(key_directive(&key_fields, resolvable));
    }
    out_mut
        .implements_interfaces
        .retain(|interface| in_graph(membership, &interface.name, graph));
    out_mut.fields = fields;
    Ok(out)
}

fn extract_interface(
    interface: &Node<InterfaceType>,
    graph: &Name,
    membership: &IndexMap<Name, IndexSet<Name>>,
) -> Result<Node<InterfaceType>, FederationError> {
    let keys = join_type_keys(interface.directives.get_all(&JOIN_TYPE_DIRECTIVE_NAME), graph)?;
    let fields = extract_fields(&interface.fields, graph)?;
    let mut out = interface.clone();
    let out_mut = out.make_mut();
    out_mut.directives.clear();
    for (key_fields, resolvable) in keys {
        out_mut.directives.push(key_directive(&key_fields, resolvable));
    }
    out_mut
        .implements_interfaces
        .retain(|parent| in_graph(membership, &parent.name, graph));
    out_mut.fields = fields;
    Ok(out)
}

/// A union keeps the members its `@join__unionMember` applications list for this graph, or (for
/// supergraphs without those applications) the members that exist in the graph at all. A union
/// left with no members is dropped from the subgraph entirely.
fn extract_union(
    union_: &Node<UnionType>,
    graph: &Name,
    membership: &IndexMap<Name, IndexSet<Name>>,
) -> Result<Option<Node<UnionType>>, FederationError> {
    let mut declared_members = IndexSet::default();
    let mut has_member_applications = false;
    for directive in union_.directives.get_all(&JOIN_UNION_MEMBER_DIRECTIVE_NAME) {
        has_member_applications = true;
        if directive_optional_enum_argument(directive, &GRAPH_ARGUMENT_NAME)?.as_ref() == Some(graph)
        {
            let member = directive_required_string_argument(directive, &MEMBER_ARGUMENT_NAME)?;
            declared_members.insert(Name::new(member)?);
        }
    }
    let mut out = union_.clone();
    let out_mut = out.make_mut();
    out_mut.directives.clear();
    if has_member_applications {
        out_mut.members.retain(|member| declared_members.contains(&member.name));
    } else {
        out_mut
            .members
            .retain(|member| in_graph(membership, &member.name, graph));
    }
    if out_mut.members.is_empty() {
        return Ok(None);
    }
    Ok(Some(out))
}

/// An enum keeps the values its `@join__enumValue` applications assign to this graph, or every
/// value when the supergraph records no per-value membership.
fn extract_enum(enum_: &Node<EnumType>, graph: &Name) -> Result<Node<EnumType>, FederationError> {
    let mut kept_values = IndexSet::default();
    let mut has_value_applications = false;
    for (value_name, value) in &enum_.values {
        for directive in value
            .directives
            .iter()
            .filter(|d| d.name == JOIN_ENUM_VALUE_DIRECTIVE_NAME)
        {
            has_value_applications = true;
            if directive_optional_enum_argument(directive, &GRAPH_ARGUMENT_NAME)?.as_ref()
                == Some(graph)
            {
                kept_values.insert(value_name.clone());
            }
        }
    }
    let mut out = enum_.clone();
    let out_mut = out.make_mut();
    out_mut.directives.clear();
    if has_value_applications {
        out_mut.values.retain(|name, _| kept_values.contains(name));
    }
    for value in out_mut.values.values_mut() {
        value.make_mut().directives.clear();
    }
    Ok(out)
}

/// Keeps the fields that belong to `graph` (those with a matching or graph-less `@join__field`,
/// or no `@join__field` at all), translating the application's `external`, `requires` and
/// `provides` arguments back into federation directives.
fn extract_fields(
    fields: &IndexMap<Name, Component<FieldDefinition>>,
    graph: &Name,
) -> Result<IndexMap<Name, Component<FieldDefinition>>, FederationError> {
    let mut kept = IndexMap::default();
    for (field_name, field) in fields {
        let applications: Vec<&Directive> = field
            .directives
            .iter()
            .filter(|d| d.name == JOIN_FIELD_DIRECTIVE_NAME)
            .map(|d| &**d)
            .collect();
        let application = if applications.is_empty() {
            None
        } else {
            let mut found = None;
            for application in applications {
                match directive_optional_enum_argument(application, &GRAPH_ARGUMENT_NAME)? {
                    Some(g) if g == *graph => {
                        found = Some(application);
                        break;
                    }
                    None => found = found.or(Some(application)),
                    _ => {}
                }
            }
            match found {
                Some(application) => Some(application),
                // The field has join__field applications, none for this graph: not ours.
                None => continue,
            }
        };
        let mut out = field.clone();
        let out_mut = out.make_mut();
        out_mut.directives.clear();
        if let Some(application) = application {
            if directive_optional_boolean_argument(application, &EXTERNAL_ARGUMENT_NAME)?
                .unwrap_or(false)
            {
                out_mut.directives.push(Node::new(Directive {
                    name: EXTERNAL_DIRECTIVE_NAME,
                    arguments: Vec::new(),
                }));
            }
            if let Some(requires) =
                directive_optional_string_argument(application, &REQUIRES_ARGUMENT_NAME)?
            {
                out_mut
                    .directives
                    .push(Node::new(fields_directive(REQUIRES_DIRECTIVE_NAME, requires)));
            }
            if let Some(provides) =
                directive_optional_string_argument(application, &PROVIDES_ARGUMENT_NAME)?
            {
                out_mut
                    .directives
                    .push(Node::new(fields_directive(PROVIDES_DIRECTIVE_NAME, provides)));
            }
        }
        kept.insert(field_name.clone(), out);
    }
    Ok(kept)
}

/// The `key:` arguments (with their resolvability) of the `@join__type` applications for
/// `graph`.
fn join_type_keys<'doc>(
    applications: impl Iterator<Item = &'doc Component<Directive>>,
    graph: &Name,
) -> Result<Vec<(String, bool)>, FederationError> {
    let mut keys = Vec::new();
    for application in applications {
        if directive_optional_enum_argument(application, &GRAPH_ARGUMENT_NAME)?.as_ref()
            != Some(graph)
        {
            continue;
        }
        if let Some(key) = directive_optional_string_argument(application, &KEY_ARGUMENT_NAME)? {
            let resolvable =
                directive_optional_boolean_argument(application, &RESOLVABLE_ARGUMENT_NAME)?
                    .unwrap_or(true);
            keys.push((key.to_owned(), resolvable));
        }
    }
    Ok(keys)
}

fn in_graph(membership: &IndexMap<Name, IndexSet<Name>>, type_name: &Name, graph: &Name) -> bool {
    membership
        .get(type_name)
        .is_some_and(|joined| joined.contains(graph))
}

fn copy_root_operations(supergraph: &Schema, schema: &mut Schema) {
    let carried = |root: &Option<ComponentName>| -> Option<ComponentName> {
        root.as_ref()
            .filter(|root| schema.types.contains_key(&root.name))
            .map(|root| ComponentName {
                origin: ComponentOrigin::Definition,
                name: root.name.clone(),
            })
    };
    let query = carried(&supergraph.schema_definition.query);
    let mutation = carried(&supergraph.schema_definition.mutation);
    let subscription = carried(&supergraph.schema_definition.subscription);
    let schema_definition = schema.schema_definition.make_mut();
    schema_definition.query = query;
    schema_definition.mutation = mutation;
    schema_definition.subscription = subscription;
}

/// Adds the `_Entity` union and the `_entities` query field when the subgraph holds entities
/// and has a query root to hang them from. This keeps entities reachable from the root even
/// when no regular field returns them, which the graph builders rely on.
fn add_entity_plumbing(schema: &mut Schema) {
    let entity_type_names: Vec<Name> = schema
        .types
        .iter()
        .filter_map(|(name, type_)| match type_ {
            ExtendedType::Object(object)
                if object
                    .directives
                    .iter()
                    .any(|d| d.name == KEY_DIRECTIVE_NAME) =>
            {
                Some(name.clone())
            }
            _ => None,
        })
        .collect();
    let Some(query_root) = schema.schema_definition.query.clone() else {
        return;
    };
    if entity_type_names.is_empty() {
        return;
    }
    schema.types.insert(
        ENTITY_UNION_NAME,
        ExtendedType::Union(Node::new(UnionType {
            description: None,
            name: ENTITY_UNION_NAME,
            directives: Default::default(),
            members: entity_type_names
                .into_iter()
                .map(|name| ComponentName {
                    origin: ComponentOrigin::Definition,
                    name,
                })
                .collect(),
        })),
    );
    if let Some(ExtendedType::Object(query)) = schema.types.get_mut(&query_root.name) {
        query.make_mut().fields.insert(
            ENTITIES_QUERY_NAME,
            Component {
                origin: ComponentOrigin::Definition,
                node: Node::new(entities_field_definition()),
            },
        );
    }
}

fn entities_field_definition() -> FieldDefinition {
    FieldDefinition {
        description: None,
        name: ENTITIES_QUERY_NAME,
        arguments: vec![Node::new(InputValueDefinition {
            description: None,
            name: REPRESENTATIONS_ARGUMENT_NAME,
            ty: Node::new(ty!([_Any!]!)),
            default_value: None,
            directives: Default::default(),
        })],
        ty: ty!([_Entity]!),
        directives: Default::default(),
    }
}

fn fields_directive(name: Name, fields: &str) -> Directive {
    Directive {
        name,
        arguments: vec![Node::new(Argument {
            name: FIELDS_ARGUMENT_NAME,
            value: Node::new(Value::String(fields.to_owned())),
        })],
    }
}

fn key_directive(fields: &str, resolvable: bool) -> Directive {
    let mut directive = fields_directive(KEY_DIRECTIVE_NAME, fields);
    if !resolvable {
        directive.arguments.push(Node::new(Argument {
            name: RESOLVABLE_ARGUMENT_NAME,
            value: Node::new(Value::Boolean(false)),
        }));
    }
    directive
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::Supergraph;

    // A small two-subgraph supergraph in join spec v0.3 form: Subgraph1 owns Query.t and the
    // entity T (plus S and the union U), Subgraph2 contributes T.a/T.b and the enum E.
    pub(crate) const TEST_SUPERGRAPH: &str = r#"
      schema
        @link(url: "https://specs.apollo.dev/link/v1.0")
        @link(url: "https://specs.apollo.dev/join/v0.3", for: EXECUTION)
      {
        query: Query
      }

      directive @join__enumValue(graph: join__Graph!) repeatable on ENUM_VALUE

      directive @join__field(graph: join__Graph, requires: join__FieldSet, provides: join__FieldSet, type: String, external: Boolean, override: String, usedOverridden: Boolean) repeatable on FIELD_DEFINITION | INPUT_FIELD_DEFINITION

      directive @join__graph(name: String!, url: String!) on ENUM_VALUE

      directive @join__implements(graph: join__Graph!, interface: String!) repeatable on OBJECT | INTERFACE

      directive @join__type(graph: join__Graph!, key: join__FieldSet, extension: Boolean! = false, resolvable: Boolean! = true, isInterfaceObject: Boolean! = false) repeatable on OBJECT | INTERFACE | UNION | ENUM | INPUT_OBJECT | SCALAR

      directive @join__unionMember(graph: join__Graph!, member: String!) repeatable on UNION

      directive @link(url: String, as: String, for: link__Purpose, import: [link__Import]) repeatable on SCHEMA

      enum E
        @join__type(graph: SUBGRAPH2)
      {
        V1 @join__enumValue(graph: SUBGRAPH2)
        V2 @join__enumValue(graph: SUBGRAPH2)
      }

      scalar join__FieldSet

      enum join__Graph {
        SUBGRAPH1 @join__graph(name: "Subgraph1", url: "https://Subgraph1")
        SUBGRAPH2 @join__graph(name: "Subgraph2", url: "https://Subgraph2")
      }

      scalar link__Import

      enum link__Purpose {
        SECURITY
        EXECUTION
      }

      type Query
        @join__type(graph: SUBGRAPH1)
        @join__type(graph: SUBGRAPH2)
      {
        t: T @join__field(graph: SUBGRAPH1)
      }

      type S
        @join__type(graph: SUBGRAPH1)
      {
        x: Int
      }

      type T
        @join__type(graph: SUBGRAPH1, key: "k")
        @join__type(graph: SUBGRAPH2, key: "k")
      {
        k: ID
        a: Int @join__field(graph: SUBGRAPH2)
        b: String @join__field(graph: SUBGRAPH2)
      }

      union U
        @join__type(graph: SUBGRAPH1)
        @join__unionMember(graph: SUBGRAPH1, member: "S")
        @join__unionMember(graph: SUBGRAPH1, member: "T")
       = S | T
    "#;

    fn extracted() -> Vec<ValidFederationSubgraph> {
        let supergraph = Supergraph::new(TEST_SUPERGRAPH).unwrap();
        supergraph.extract_subgraphs().unwrap()
    }

    #[test]
    fn extracts_subgraph_names_and_urls() {
        let subgraphs = extracted();
        let names: Vec<_> = subgraphs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Subgraph1", "Subgraph2"]);
        assert_eq!(subgraphs[0].url, "https://Subgraph1");
    }

    #[test]
    fn splits_types_and_fields_by_graph_membership() {
        let subgraphs = extracted();
        let s1 = subgraphs[0].schema.schema();
        let s2 = subgraphs[1].schema.schema();

        assert!(s1.types.contains_key("S"));
        assert!(!s2.types.contains_key("S"));
        assert!(s2.types.contains_key("E"));
        assert!(!s1.types.contains_key("E"));
        assert!(!s1.types.contains_key("join__Graph"));
        assert!(!s1.types.contains_key("link__Purpose"));

        let ExtendedType::Object(t1) = &s1.types["T"] else {
            panic!("T missing from Subgraph1");
        };
        assert!(t1.fields.contains_key("k"));
        assert!(!t1.fields.contains_key("a"));
        let ExtendedType::Object(t2) = &s2.types["T"] else {
            panic!("T missing from Subgraph2");
        };
        assert!(t2.fields.contains_key("k"));
        assert!(t2.fields.contains_key("a"));
        assert!(t2.fields.contains_key("b"));
    }

    #[test]
    fn translates_join_type_keys_into_key_directives() {
        let subgraphs = extracted();
        for subgraph in &subgraphs {
            let ExtendedType::Object(t) = &subgraph.schema.schema().types["T"] else {
                panic!("T missing from {}", subgraph.name);
            };
            let key = t
                .directives
                .iter()
                .find(|d| d.name == KEY_DIRECTIVE_NAME)
                .expect("T should carry @key");
            let fields =
                directive_required_string_argument(key, &FIELDS_ARGUMENT_NAME).unwrap();
            assert_eq!(fields, "k");
        }
    }

    #[test]
    fn keeps_union_members_declared_for_the_graph() {
        let subgraphs = extracted();
        let s1 = subgraphs[0].schema.schema();
        let ExtendedType::Union(u) = &s1.types["U"] else {
            panic!("U missing from Subgraph1");
        };
        let members: Vec<_> = u.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(members, vec!["S", "T"]);
        assert!(!subgraphs[1].schema.schema().types.contains_key("U"));
    }

    #[test]
    fn adds_entity_plumbing_for_subgraphs_with_entities() {
        let subgraphs = extracted();
        for subgraph in &subgraphs {
            let schema = subgraph.schema.schema();
            let ExtendedType::Union(entity) = &schema.types[ENTITY_UNION_NAME.as_str()] else {
                panic!("_Entity missing from {}", subgraph.name);
            };
            assert_eq!(
                entity.members.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
                vec!["T"]
            );
            let ExtendedType::Object(query) = &schema.types["Query"] else {
                panic!("Query missing from {}", subgraph.name);
            };
            assert!(query.fields.contains_key(ENTITIES_QUERY_NAME.as_str()));
        }
    }

    #[test]
    fn extracted_subgraphs_are_federation_subgraph_schemas() {
        for subgraph in extracted() {
            assert!(subgraph.schema.is_federation_subgraph());
        }
    }
}

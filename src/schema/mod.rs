use std::ops::Deref;
use std::sync::Arc;

use apollo_compiler::ast::FieldDefinition;
use apollo_compiler::ast::OperationType;
use apollo_compiler::ast::Type;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::NamedType;
use apollo_compiler::validation::Valid;
use apollo_compiler::Name;
use apollo_compiler::Schema;
use indexmap::IndexSet;

use crate::error::FederationError;
use crate::error::SingleFederationError;
use crate::subgraph::spec::KEY_DIRECTIVE_NAME;

/// The three root operation kinds a schema may define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumIter)]
pub enum SchemaRootKind {
    #[strum(to_string = "query")]
    Query,
    #[strum(to_string = "mutation")]
    Mutation,
    #[strum(to_string = "subscription")]
    Subscription,
}

impl From<SchemaRootKind> for OperationType {
    fn from(value: SchemaRootKind) -> Self {
        match value {
            SchemaRootKind::Query => OperationType::Query,
            SchemaRootKind::Mutation => OperationType::Mutation,
            SchemaRootKind::Subscription => OperationType::Subscription,
        }
    }
}

/// A validated schema, cheap to clone, used as the "source" schema of query graph nodes.
///
/// This wraps the apollo-compiler schema with the handful of lookups the graph builders need.
#[derive(Clone)]
pub struct ValidFederationSchema {
    schema: Arc<Valid<Schema>>,
}

impl ValidFederationSchema {
    pub fn new(schema: Valid<Schema>) -> Self {
        Self {
            schema: Arc::new(schema),
        }
    }

    pub fn parse_and_validate(
        source_text: &str,
        path: &str,
    ) -> Result<ValidFederationSchema, FederationError> {
        let schema = Schema::parse_and_validate(source_text, path)?;
        Ok(Self::new(schema))
    }

    pub fn schema(&self) -> &Valid<Schema> {
        &self.schema
    }

    pub(crate) fn get_type(&self, type_name: &Name) -> Result<&ExtendedType, FederationError> {
        self.schema
            .types
            .get(type_name)
            .ok_or_else(|| SingleFederationError::Internal {
                message: format!("Schema has no type \"{}\"", type_name),
            })
            .map_err(|e| e.into())
    }

    pub(crate) fn try_get_type(&self, type_name: &Name) -> Option<&ExtendedType> {
        self.schema.types.get(type_name)
    }

    pub(crate) fn is_composite_type(&self, type_name: &Name) -> Result<bool, FederationError> {
        Ok(matches!(
            self.get_type(type_name)?,
            ExtendedType::Object(_) | ExtendedType::Interface(_) | ExtendedType::Union(_)
        ))
    }

    /// The object types a position of the given abstract type may resolve to at runtime. For an
    /// object type this is the type itself, making the method usable on any composite type.
    pub(crate) fn possible_runtime_types(
        &self,
        type_name: &Name,
    ) -> Result<IndexSet<Name>, FederationError> {
        Ok(match self.get_type(type_name)? {
            ExtendedType::Object(_) => IndexSet::from([type_name.clone()]),
            ExtendedType::Interface(_) => self
                .schema
                .types
                .iter()
                .filter(|(_, type_)| match type_ {
                    ExtendedType::Object(object) => object
                        .implements_interfaces
                        .iter()
                        .any(|itf| itf.name == *type_name),
                    _ => false,
                })
                .map(|(name, _)| name.clone())
                .collect(),
            ExtendedType::Union(union_) => union_
                .members
                .iter()
                .map(|member| member.name.clone())
                .collect(),
            _ => {
                return Err(SingleFederationError::Internal {
                    message: format!("Type \"{type_name}\" was unexpectedly not a composite type"),
                }
                .into());
            }
        })
    }

    /// The root object type for the given root kind, if the schema defines one.
    pub(crate) fn root_type(&self, root_kind: SchemaRootKind) -> Option<&NamedType> {
        self.schema.root_operation(root_kind.into())
    }

    /// Whether this schema is a federation subgraph schema, as opposed to a plain GraphQL (e.g.
    /// supergraph API) schema. Subgraph schemas carry the federation directive definitions.
    pub(crate) fn is_federation_subgraph(&self) -> bool {
        self.schema
            .directive_definitions
            .contains_key(&KEY_DIRECTIVE_NAME)
    }
}

impl Deref for ValidFederationSchema {
    type Target = Valid<Schema>;

    fn deref(&self) -> &Self::Target {
        &self.schema
    }
}

impl std::fmt::Debug for ValidFederationSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ValidFederationSchema(..)")
    }
}

/// Whether `a` may stand in for `b` structurally: same name, covariant return type under
/// list/non-null wrapper variance, and every argument of `b` present on `a` at the same type.
///
/// This is nominal on the named base types (interface-implementation subtyping would need a
/// schema to decide and is not part of this relation).
pub(crate) fn is_structural_field_subtype(a: &FieldDefinition, b: &FieldDefinition) -> bool {
    a.name == b.name
        && is_structural_subtype(&a.ty, &b.ty)
        && b.arguments.iter().all(|b_arg| {
            a.arguments
                .iter()
                .any(|a_arg| a_arg.name == b_arg.name && a_arg.ty == b_arg.ty)
        })
}

fn is_structural_subtype(a: &Type, b: &Type) -> bool {
    match (a, b) {
        (Type::Named(a), Type::Named(b)) | (Type::NonNullNamed(a), Type::NonNullNamed(b)) => a == b,
        // A non-null type is a subtype of its nullable form.
        (Type::NonNullNamed(a), Type::Named(b)) => a == b,
        (Type::List(a), Type::List(b))
        | (Type::NonNullList(a), Type::NonNullList(b))
        | (Type::NonNullList(a), Type::List(b)) => is_structural_subtype(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::ty;

    use super::*;

    fn field(name: &str, ty: Type) -> FieldDefinition {
        FieldDefinition {
            description: None,
            name: Name::new(name).unwrap(),
            arguments: Vec::new(),
            ty,
            directives: Default::default(),
        }
    }

    #[test]
    fn structural_subtyping_is_directional_on_nullability() {
        let non_null = field("x", ty!(Int!));
        let nullable = field("x", ty!(Int));
        assert!(is_structural_field_subtype(&non_null, &nullable));
        assert!(!is_structural_field_subtype(&nullable, &non_null));
        assert!(is_structural_field_subtype(&nullable, &nullable));
    }

    #[test]
    fn structural_subtyping_is_nominal_on_base_types() {
        let int = field("x", ty!(Int));
        let string = field("x", ty!(String));
        assert!(!is_structural_field_subtype(&int, &string));
    }

    #[test]
    fn structural_subtyping_recurses_into_lists() {
        let non_null_list = field("x", ty!([Int!]!));
        let list = field("x", ty!([Int!]));
        assert!(is_structural_field_subtype(&non_null_list, &list));
        assert!(!is_structural_field_subtype(&list, &non_null_list));
    }

    #[test]
    fn fields_with_different_names_are_never_subtypes() {
        let x = field("x", ty!(Int));
        let y = field("y", ty!(Int));
        assert!(!is_structural_field_subtype(&x, &y));
    }

    #[test]
    fn possible_runtime_types_cover_interfaces_and_unions() {
        let schema = ValidFederationSchema::parse_and_validate(
            r#"
            type Query { i: I u: U }
            interface I { x: Int }
            type A implements I { x: Int }
            type B implements I { x: Int }
            type C { y: Int }
            union U = A | C
            "#,
            "schema.graphql",
        )
        .unwrap();
        let of = |name: &str| {
            schema
                .possible_runtime_types(&Name::new(name).unwrap())
                .unwrap()
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(of("I"), vec!["A", "B"]);
        assert_eq!(of("U"), vec!["A", "C"]);
        assert_eq!(of("A"), vec!["A"]);
    }
}

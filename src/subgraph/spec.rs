//! Names and definitions of the federation directives this crate interprets, along with typed
//! readers for their applications.

use apollo_compiler::ast::Directive;
use apollo_compiler::ast::FieldDefinition;
use apollo_compiler::ast::Value;
use apollo_compiler::name;
use apollo_compiler::Name;

use crate::error::FederationError;
use crate::error::SingleFederationError;

pub const KEY_DIRECTIVE_NAME: Name = name!("key");
pub const EXTERNAL_DIRECTIVE_NAME: Name = name!("external");
pub const PROVIDES_DIRECTIVE_NAME: Name = name!("provides");
pub const REQUIRES_DIRECTIVE_NAME: Name = name!("requires");
pub const FIELDSET_SCALAR_NAME: Name = name!("FieldSet");

pub const FIELDS_ARGUMENT_NAME: Name = name!("fields");
pub const RESOLVABLE_ARGUMENT_NAME: Name = name!("resolvable");

pub const ANY_SCALAR_NAME: Name = name!("_Any");
pub const ENTITY_UNION_NAME: Name = name!("_Entity");
pub const ENTITIES_QUERY_NAME: Name = name!("_entities");
pub const REPRESENTATIONS_ARGUMENT_NAME: Name = name!("representations");

/// The definitions every subgraph schema is seeded with. Subgraph SDL handed to this crate (or
/// produced by supergraph extraction) validates against these.
pub const FEDERATION_SPEC_SCHEMA: &str = r#"
directive @key(fields: FieldSet!, resolvable: Boolean = true) repeatable on OBJECT | INTERFACE
directive @requires(fields: FieldSet!) on FIELD_DEFINITION
directive @provides(fields: FieldSet!) on FIELD_DEFINITION
directive @external on OBJECT | FIELD_DEFINITION

scalar FieldSet
scalar _Any
"#;

/// A single `@key` application on a type.
pub(crate) struct KeyDirectiveApplication<'doc> {
    pub(crate) fields: &'doc str,
    pub(crate) resolvable: bool,
}

/// All `@key` applications on a type, in declaration order.
pub(crate) fn key_applications<'doc>(
    directives: impl IntoIterator<Item = &'doc Directive>,
) -> Result<Vec<KeyDirectiveApplication<'doc>>, FederationError> {
    let mut applications = Vec::new();
    for directive in directives {
        if directive.name != KEY_DIRECTIVE_NAME {
            continue;
        }
        applications.push(KeyDirectiveApplication {
            fields: directive_required_string_argument(directive, &FIELDS_ARGUMENT_NAME)?,
            resolvable: directive_optional_boolean_argument(directive, &RESOLVABLE_ARGUMENT_NAME)?
                .unwrap_or(true),
        });
    }
    Ok(applications)
}

pub(crate) fn is_external(field: &FieldDefinition) -> bool {
    field
        .directives
        .iter()
        .any(|d| d.name == EXTERNAL_DIRECTIVE_NAME)
}

pub(crate) fn has_requires(field: &FieldDefinition) -> bool {
    field
        .directives
        .iter()
        .any(|d| d.name == REQUIRES_DIRECTIVE_NAME)
}

/// The `fields` argument of the field's `@requires` application, if any.
pub(crate) fn requires_application(
    field: &FieldDefinition,
) -> Result<Option<&str>, FederationError> {
    fields_application(field, &REQUIRES_DIRECTIVE_NAME)
}

/// The `fields` argument of the field's `@provides` application, if any.
pub(crate) fn provides_application(
    field: &FieldDefinition,
) -> Result<Option<&str>, FederationError> {
    fields_application(field, &PROVIDES_DIRECTIVE_NAME)
}

fn fields_application<'doc>(
    field: &'doc FieldDefinition,
    directive_name: &Name,
) -> Result<Option<&'doc str>, FederationError> {
    field
        .directives
        .iter()
        .find(|d| d.name == *directive_name)
        .map(|d| directive_required_string_argument(d, &FIELDS_ARGUMENT_NAME))
        .transpose()
}

pub(crate) fn directive_optional_string_argument<'doc>(
    application: &'doc Directive,
    name: &Name,
) -> Result<Option<&'doc str>, FederationError> {
    match argument_by_name(application, name) {
        Some(value) => match value {
            Value::String(value) => Ok(Some(value)),
            Value::Null => Ok(None),
            _ => Err(SingleFederationError::Internal {
                message: format!(
                    "Argument \"{}\" of directive \"@{}\" must be a string.",
                    name, application.name
                ),
            }
            .into()),
        },
        None => Ok(None),
    }
}

pub(crate) fn directive_required_string_argument<'doc>(
    application: &'doc Directive,
    name: &Name,
) -> Result<&'doc str, FederationError> {
    directive_optional_string_argument(application, name)?.ok_or_else(|| {
        SingleFederationError::Internal {
            message: format!(
                "Required argument \"{}\" of directive \"@{}\" was not present.",
                name, application.name
            ),
        }
        .into()
    })
}

pub(crate) fn directive_optional_boolean_argument(
    application: &Directive,
    name: &Name,
) -> Result<Option<bool>, FederationError> {
    match argument_by_name(application, name) {
        Some(value) => match value {
            Value::Boolean(value) => Ok(Some(*value)),
            Value::Null => Ok(None),
            _ => Err(SingleFederationError::Internal {
                message: format!(
                    "Argument \"{}\" of directive \"@{}\" must be a boolean.",
                    name, application.name
                ),
            }
            .into()),
        },
        None => Ok(None),
    }
}

pub(crate) fn directive_optional_enum_argument(
    application: &Directive,
    name: &Name,
) -> Result<Option<Name>, FederationError> {
    match argument_by_name(application, name) {
        Some(value) => match value {
            Value::Enum(value) => Ok(Some(value.clone())),
            Value::Null => Ok(None),
            _ => Err(SingleFederationError::Internal {
                message: format!(
                    "Argument \"{}\" of directive \"@{}\" must be an enum value.",
                    name, application.name
                ),
            }
            .into()),
        },
        None => Ok(None),
    }
}

fn argument_by_name<'doc>(application: &'doc Directive, name: &Name) -> Option<&'doc Value> {
    application
        .arguments
        .iter()
        .find(|arg| arg.name == *name)
        .map(|arg| arg.value.as_ref())
}

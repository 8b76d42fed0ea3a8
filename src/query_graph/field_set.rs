use apollo_compiler::executable::FieldSet;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::Name;

use crate::error::FederationError;
use crate::schema::ValidFederationSchema;

/// Parses the `fields` argument of a federation directive against the given parent type.
///
/// The parsing takes care of adding curly braces ("{" and "}") if they aren't in the string, and
/// validates the selections against the schema, so conditions attached to query graph edges are
/// always well-formed.
pub(crate) fn parse_field_set(
    schema: &ValidFederationSchema,
    parent_type_name: Name,
    value: &str,
) -> Result<SelectionSet, FederationError> {
    let field_set =
        FieldSet::parse_and_validate(schema.schema(), parent_type_name, value, "field_set.graphql")?;
    Ok(field_set.into_inner().selection_set)
}

/// Merges `source`'s selections into `target`, never removing anything already selected.
///
/// Fields merge by response key and inline fragments by type condition, recursively; the
/// operation is idempotent and commutative at the selection-set level, which is what lets
/// `@requires` conditions pile onto an edge in any order.
pub(crate) fn merge_selection_sets(target: &mut SelectionSet, source: &SelectionSet) {
    for selection in &source.selections {
        match selection {
            Selection::Field(field) => {
                let existing = target.selections.iter().position(|s| match s {
                    Selection::Field(existing) => existing.response_key() == field.response_key(),
                    _ => false,
                });
                match existing {
                    Some(position) => {
                        if let Selection::Field(existing) = &mut target.selections[position] {
                            merge_selection_sets(
                                &mut existing.make_mut().selection_set,
                                &field.selection_set,
                            );
                        }
                    }
                    None => target.selections.push(Selection::Field(field.clone())),
                }
            }
            Selection::InlineFragment(fragment) => {
                let existing = target.selections.iter().position(|s| match s {
                    Selection::InlineFragment(existing) => {
                        existing.type_condition == fragment.type_condition
                    }
                    _ => false,
                });
                match existing {
                    Some(position) => {
                        if let Selection::InlineFragment(existing) =
                            &mut target.selections[position]
                        {
                            merge_selection_sets(
                                &mut existing.make_mut().selection_set,
                                &fragment.selection_set,
                            );
                        }
                    }
                    None => target
                        .selections
                        .push(Selection::InlineFragment(fragment.clone())),
                }
            }
            // Field sets cannot contain named fragment spreads.
            Selection::FragmentSpread(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::name;

    use super::*;

    fn schema() -> ValidFederationSchema {
        ValidFederationSchema::parse_and_validate(
            r#"
            type Query { t: T }
            type T { id: ID name: String nested: N }
            type N { a: Int b: Int }
            "#,
            "schema.graphql",
        )
        .unwrap()
    }

    fn parse(value: &str) -> SelectionSet {
        parse_field_set(&schema(), name!("T"), value).unwrap()
    }

    fn rendered(selection_set: &SelectionSet) -> String {
        selection_set.serialize().no_indent().to_string()
    }

    #[test]
    fn parses_without_outer_braces() {
        let selection_set = parse("id name");
        assert_eq!(selection_set.selections.len(), 2);
    }

    #[test]
    fn merging_is_idempotent() {
        let mut target = parse("id nested { a }");
        let again = target.clone();
        merge_selection_sets(&mut target, &again);
        assert_eq!(rendered(&target), rendered(&again));
    }

    #[test]
    fn merging_is_commutative_on_distinct_fields() {
        let a = parse("id nested { a }");
        let b = parse("name nested { b }");

        let mut a_then_b = a.clone();
        merge_selection_sets(&mut a_then_b, &b);
        let mut b_then_a = b.clone();
        merge_selection_sets(&mut b_then_a, &a);

        // Same selections in both orders, possibly arranged differently.
        assert_eq!(a_then_b.selections.len(), 3);
        assert_eq!(b_then_a.selections.len(), 3);
        assert!(rendered(&a_then_b).contains("nested { a b }"));
        assert!(rendered(&b_then_a).contains("nested { b a }"));
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(parse_field_set(&schema(), name!("T"), "missing").is_err());
    }
}

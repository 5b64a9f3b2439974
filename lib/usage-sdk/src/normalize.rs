use std::cmp::Ordering;
use std::sync::Arc;

use graphql_tools::parser::minify_query;
use graphql_tools::parser::query::Number;
use graphql_tools::static_graphql::query::{
    Definition, Directive, Document, FragmentDefinition, OperationDefinition, Selection,
    SelectionSet, Value, VariableDefinition,
};

/// Derives the report key of an operation from its normalized text.
pub type KeyHashFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

pub fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input))
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("failed to print the normalized operation: {0}")]
pub struct PrintError(String);

#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Replaces int, float and string literals with zero values.
    pub hide_literals: bool,
    pub remove_aliases: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            hide_literals: true,
            remove_aliases: true,
        }
    }
}

/// Produces the canonical form of an executable document: operations first (in their
/// original order), fragments sorted by name, and selections, arguments, directives and
/// variable definitions sorted by name.
pub fn normalize_operation(document: &Document, options: &NormalizeOptions) -> Document {
    let mut normalized = document.clone();

    for definition in normalized.definitions.iter_mut() {
        match definition {
            Definition::Operation(operation) => normalize_operation_definition(operation, options),
            Definition::Fragment(fragment) => normalize_fragment(fragment, options),
        }
    }

    normalized.definitions.sort_by(compare_definitions);
    normalized
}

/// Prints a document in its minified form.
pub fn print_operation(document: &Document) -> Result<String, PrintError> {
    minify_query(&document.to_string()).map_err(|e| PrintError(e.to_string()))
}

fn normalize_operation_definition(
    operation: &mut OperationDefinition,
    options: &NormalizeOptions,
) {
    let (variable_definitions, directives, selection_set) = match operation {
        OperationDefinition::SelectionSet(selection_set) => {
            normalize_selection_set(selection_set, options);
            return;
        }
        OperationDefinition::Query(query) => (
            &mut query.variable_definitions,
            &mut query.directives,
            &mut query.selection_set,
        ),
        OperationDefinition::Mutation(mutation) => (
            &mut mutation.variable_definitions,
            &mut mutation.directives,
            &mut mutation.selection_set,
        ),
        OperationDefinition::Subscription(subscription) => (
            &mut subscription.variable_definitions,
            &mut subscription.directives,
            &mut subscription.selection_set,
        ),
    };

    normalize_variable_definitions(variable_definitions, options);
    normalize_directives(directives, options);
    normalize_selection_set(selection_set, options);
}

fn normalize_fragment(fragment: &mut FragmentDefinition, options: &NormalizeOptions) {
    normalize_directives(&mut fragment.directives, options);
    normalize_selection_set(&mut fragment.selection_set, options);
}

fn normalize_variable_definitions(
    variable_definitions: &mut [VariableDefinition],
    options: &NormalizeOptions,
) {
    for variable in variable_definitions.iter_mut() {
        if let Some(default_value) = variable.default_value.as_mut() {
            normalize_value(default_value, options);
        }
    }

    variable_definitions.sort_by(|a, b| a.name.cmp(&b.name));
}

fn normalize_directives(directives: &mut [Directive], options: &NormalizeOptions) {
    for directive in directives.iter_mut() {
        normalize_arguments(&mut directive.arguments, options);
    }

    directives.sort_by(|a, b| a.name.cmp(&b.name));
}

fn normalize_arguments(arguments: &mut [(String, Value)], options: &NormalizeOptions) {
    for (_, value) in arguments.iter_mut() {
        normalize_value(value, options);
    }

    arguments.sort_by(|a, b| a.0.cmp(&b.0));
}

fn normalize_selection_set(selection_set: &mut SelectionSet, options: &NormalizeOptions) {
    for selection in selection_set.items.iter_mut() {
        match selection {
            Selection::Field(field) => {
                if options.remove_aliases {
                    field.alias = None;
                }
                normalize_arguments(&mut field.arguments, options);
                normalize_directives(&mut field.directives, options);
                normalize_selection_set(&mut field.selection_set, options);
            }
            Selection::FragmentSpread(spread) => {
                normalize_directives(&mut spread.directives, options);
            }
            Selection::InlineFragment(inline_fragment) => {
                normalize_directives(&mut inline_fragment.directives, options);
                normalize_selection_set(&mut inline_fragment.selection_set, options);
            }
        }
    }

    selection_set.items.sort_by(compare_selections);
}

fn normalize_value(value: &mut Value, options: &NormalizeOptions) {
    match value {
        Value::Int(_) if options.hide_literals => *value = Value::Int(Number::from(0)),
        Value::Float(_) if options.hide_literals => *value = Value::Float(0.0),
        Value::String(_) if options.hide_literals => *value = Value::String(String::new()),
        Value::List(items) => {
            for item in items.iter_mut() {
                normalize_value(item, options);
            }
        }
        Value::Object(fields) => {
            for (_, field_value) in fields.iter_mut() {
                normalize_value(field_value, options);
            }
            fields.sort_by(|a, b| a.0.cmp(&b.0));
        }
        _ => {}
    }
}

fn compare_definitions(a: &Definition, b: &Definition) -> Ordering {
    match (a, b) {
        // Keep operations as they are
        (Definition::Operation(_), Definition::Operation(_)) => Ordering::Equal,
        (Definition::Fragment(a), Definition::Fragment(b)) => a.name.cmp(&b.name),
        _ => definition_kind_ordering(a).cmp(&definition_kind_ordering(b)),
    }
}

fn compare_selections(a: &Selection, b: &Selection) -> Ordering {
    match (a, b) {
        (Selection::Field(a), Selection::Field(b)) => a.name.cmp(&b.name),
        (Selection::FragmentSpread(a), Selection::FragmentSpread(b)) => {
            a.fragment_name.cmp(&b.fragment_name)
        }
        _ => selection_kind_ordering(a).cmp(&selection_kind_ordering(b)),
    }
}

fn selection_kind_ordering(selection: &Selection) -> u8 {
    match selection {
        Selection::FragmentSpread(_) => 1,
        Selection::InlineFragment(_) => 2,
        Selection::Field(_) => 3,
    }
}

fn definition_kind_ordering(definition: &Definition) -> u8 {
    match definition {
        Definition::Operation(_) => 1,
        Definition::Fragment(_) => 2,
    }
}

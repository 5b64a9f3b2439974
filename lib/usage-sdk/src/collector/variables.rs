use serde_json::{Map, Value as JsonValue};

use graphql_tools::static_graphql::query::VariableDefinition;
use graphql_tools::static_graphql::schema::TypeDefinition;

use crate::collector::{CollectError, CollectedUsage};
use crate::schema::SchemaDocument;

/// How variable definitions contribute to the usage of input types.
#[derive(Debug, Clone, Copy)]
pub enum VariableStrategy<'v> {
    /// The declared type of every variable is marked as used as a whole.
    MarkWholeType,
    /// Only the input object fields present in the supplied values are marked as used.
    FromValues(&'v Map<String, JsonValue>),
}

impl<'v> VariableStrategy<'v> {
    /// Picks the value-driven strategy only when it is enabled and values were supplied.
    pub fn new(process_variables: bool, variables: Option<&'v Map<String, JsonValue>>) -> Self {
        match variables {
            Some(values) if process_variables => VariableStrategy::FromValues(values),
            _ => VariableStrategy::MarkWholeType,
        }
    }

    pub fn prunes(&self) -> bool {
        matches!(self, VariableStrategy::FromValues(_))
    }

    pub(crate) fn collect_variable(
        &self,
        schema: &SchemaDocument,
        variable: &VariableDefinition,
        usage: &mut CollectedUsage,
    ) -> Result<(), CollectError> {
        let type_name = variable.var_type.inner_type();

        match self {
            VariableStrategy::MarkWholeType => {
                usage.input_types.mark_all(type_name);
                Ok(())
            }
            VariableStrategy::FromValues(values) => {
                let type_def = schema
                    .type_by_name(type_name)
                    .ok_or_else(|| CollectError::UnknownType(type_name.to_string()))?;

                collect_value(schema, type_def, values.get(&variable.name), usage)
            }
        }
    }
}

fn collect_value(
    schema: &SchemaDocument,
    type_def: &TypeDefinition,
    value: Option<&JsonValue>,
    usage: &mut CollectedUsage,
) -> Result<(), CollectError> {
    let input_object = match type_def {
        TypeDefinition::InputObject(input_object) => input_object,
        other => {
            usage.input_types.mark_all(other.name());
            return Ok(());
        }
    };

    let mut elements = Vec::new();
    flatten_lists(value, &mut elements);

    for element in elements {
        match element {
            None | Some(JsonValue::Null) => {
                usage.mark_used(input_object.name.clone());
            }
            Some(JsonValue::Object(object)) => {
                for (field_name, field_value) in object {
                    let Some(field) = type_def.input_field_by_name(field_name) else {
                        continue;
                    };

                    usage.input_types.mark_field(&input_object.name, field_name);

                    let field_type_name = field.value_type.inner_type();
                    let field_type = schema
                        .type_by_name(field_type_name)
                        .ok_or_else(|| CollectError::UnknownType(field_type_name.to_string()))?;

                    collect_value(schema, field_type, Some(field_value), usage)?;
                }
            }
            Some(_) => {}
        }
    }

    Ok(())
}

/// Nested lists are flattened so every object element keeps field granularity.
fn flatten_lists<'v>(value: Option<&'v JsonValue>, elements: &mut Vec<Option<&'v JsonValue>>) {
    match value {
        Some(JsonValue::Array(items)) => {
            for item in items {
                flatten_lists(Some(item), elements);
            }
        }
        other => elements.push(other),
    }
}

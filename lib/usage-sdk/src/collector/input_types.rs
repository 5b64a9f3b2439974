use std::collections::{HashMap, HashSet};

use graphql_tools::static_graphql::schema::{Field, TypeDefinition};

use crate::collector::{make_id, CollectError};
use crate::schema::SchemaDocument;

#[derive(Debug, Default)]
struct InputTypeRecord {
    all: bool,
    fields: HashSet<String>,
}

/// Input types (and enums) seen during a single walk, with either the whole type
/// or only specific fields (enum values) marked as used.
#[derive(Debug, Default)]
pub(crate) struct CollectedInputTypes {
    records: HashMap<String, InputTypeRecord>,
}

impl CollectedInputTypes {
    pub fn mark_all(&mut self, type_name: &str) {
        self.record(type_name).all = true;
    }

    pub fn mark_field(&mut self, type_name: &str, field_name: &str) {
        self.record(type_name).fields.insert(field_name.to_string());
    }

    fn record(&mut self, type_name: &str) -> &mut InputTypeRecord {
        self.records.entry(type_name.to_string()).or_default()
    }

    /// Emits the usage identifiers of every collected type.
    ///
    /// A type marked as a whole is expanded recursively through its fields,
    /// every other type contributes only its recorded fields.
    pub fn resolve(
        self,
        schema: &SchemaDocument,
        entries: &mut HashSet<String>,
    ) -> Result<(), CollectError> {
        let mut expanded: HashSet<&str> = HashSet::new();

        for (type_name, record) in &self.records {
            if record.all {
                mark_entire_type(schema, type_name, &mut expanded, entries)?;
            } else {
                for field_name in &record.fields {
                    entries.insert(make_id(&[type_name, field_name]));
                }
            }
        }

        Ok(())
    }
}

fn mark_entire_type<'s>(
    schema: &'s SchemaDocument,
    type_name: &str,
    expanded: &mut HashSet<&'s str>,
    entries: &mut HashSet<String>,
) -> Result<(), CollectError> {
    let mut pending = vec![lookup(schema, type_name)?];

    while let Some(type_def) = pending.pop() {
        if !expanded.insert(type_def.name()) {
            continue;
        }

        let field_types: Vec<&str> = match type_def {
            TypeDefinition::Scalar(scalar) => {
                entries.insert(make_id(&[&scalar.name]));
                continue;
            }
            TypeDefinition::Enum(enum_type) => {
                for value in &enum_type.values {
                    entries.insert(make_id(&[&enum_type.name, &value.name]));
                }
                continue;
            }
            TypeDefinition::Union(_) => continue,
            TypeDefinition::InputObject(input_object) => input_object
                .fields
                .iter()
                .map(|field| {
                    entries.insert(make_id(&[&input_object.name, &field.name]));
                    field.value_type.inner_type()
                })
                .collect(),
            TypeDefinition::Object(object) => {
                output_field_types(&object.name, &object.fields, entries)
            }
            TypeDefinition::Interface(interface) => {
                output_field_types(&interface.name, &interface.fields, entries)
            }
        };

        for field_type in field_types {
            pending.push(lookup(schema, field_type)?);
        }
    }

    Ok(())
}

fn output_field_types<'s>(
    type_name: &str,
    fields: &'s [Field],
    entries: &mut HashSet<String>,
) -> Vec<&'s str> {
    fields
        .iter()
        .map(|field| {
            entries.insert(make_id(&[type_name, field.name.as_str()]));
            field.field_type.inner_type()
        })
        .collect()
}

fn lookup<'s>(
    schema: &'s SchemaDocument,
    type_name: &str,
) -> Result<&'s TypeDefinition, CollectError> {
    schema
        .type_by_name(type_name)
        .ok_or_else(|| CollectError::UnknownType(type_name.to_string()))
}

use std::collections::HashMap;

use graphql_tools::static_graphql::schema::{Field, Type, TypeDefinition};

use crate::collector::CollectError;
use crate::schema::SchemaDocument;

/// Tracks which schema types apply at the current position of the document walk.
///
/// Every `enter_*` call must be paired with the matching `leave_*` call once the
/// node has been processed.
pub(crate) struct TraversalContext<'s> {
    pub schema: &'s SchemaDocument,
    type_map: HashMap<&'s str, &'s TypeDefinition>,
    parent_types: Vec<&'s TypeDefinition>,
    fields: Vec<&'s Field>,
    input_types: Vec<&'s Type>,
}

impl<'s> TraversalContext<'s> {
    pub fn new(schema: &'s SchemaDocument) -> Self {
        Self {
            schema,
            type_map: schema.type_map(),
            parent_types: Vec::new(),
            fields: Vec::new(),
            input_types: Vec::new(),
        }
    }

    pub fn enter_parent_type(&mut self, parent_type: &'s TypeDefinition) {
        self.parent_types.push(parent_type);
    }

    pub fn leave_parent_type(&mut self) {
        self.parent_types.pop();
    }

    pub fn enter_field(&mut self, field: &'s Field) {
        self.fields.push(field);
    }

    pub fn leave_field(&mut self) {
        self.fields.pop();
    }

    pub fn enter_input_type(&mut self, input_type: &'s Type) {
        self.input_types.push(input_type);
    }

    pub fn leave_input_type(&mut self) {
        self.input_types.pop();
    }

    pub fn current_parent_type(&self) -> Option<&'s TypeDefinition> {
        self.parent_types.last().copied()
    }

    pub fn current_field(&self) -> Option<&'s Field> {
        self.fields.last().copied()
    }

    pub fn current_input_type(&self) -> Option<&'s Type> {
        self.input_types.last().copied()
    }

    pub fn current_named_input_type(&self) -> Result<&'s TypeDefinition, CollectError> {
        let input_type = self
            .current_input_type()
            .ok_or(CollectError::MissingInputType)?;

        self.resolve(input_type.inner_type())
    }

    pub fn resolve(&self, type_name: &str) -> Result<&'s TypeDefinition, CollectError> {
        self.type_map
            .get(type_name)
            .copied()
            .ok_or_else(|| CollectError::UnknownType(type_name.to_string()))
    }
}

/// Type of the elements of a list type. Non-list types are returned as is.
pub(crate) fn list_item_type(type_ref: &Type) -> &Type {
    match type_ref {
        Type::NonNullType(inner) => match inner.as_ref() {
            Type::ListType(item) => item.as_ref(),
            _ => type_ref,
        },
        Type::ListType(item) => item.as_ref(),
        Type::NamedType(_) => type_ref,
    }
}

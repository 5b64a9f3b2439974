mod context;
mod input_types;
mod variables;


use std::collections::HashSet;
use std::sync::Arc;

use graphql_tools::ast::AstNodeWithName;
use graphql_tools::static_graphql::query::{
    Definition, Document, Field, OperationDefinition as OperationNode, Selection, SelectionSet,
    TypeCondition, Value,
};
use graphql_tools::static_graphql::schema::TypeDefinition;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::normalize::{
    md5_hex, normalize_operation, print_operation, KeyHashFn, NormalizeOptions, PrintError,
};
use crate::schema::{prepare_schema, OperationKind, SchemaDocument};

use self::context::{list_item_type, TraversalContext};
use self::input_types::CollectedInputTypes;
pub use self::variables::VariableStrategy;

/// The schema usage of one operation, ready to be reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDefinition {
    pub key: String,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    pub fields: Vec<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CollectError {
    #[error("type '{0}' is not defined in the schema")]
    UnknownType(String),
    #[error("field '{field_name}' is not defined on type '{type_name}'")]
    UnknownField {
        type_name: String,
        field_name: String,
    },
    #[error("argument '{argument_name}' is not defined on field '{type_name}.{field_name}'")]
    UnknownArgument {
        type_name: String,
        field_name: String,
        argument_name: String,
    },
    #[error("field '{field_name}' is not defined on input type '{type_name}'")]
    UnknownInputField {
        type_name: String,
        field_name: String,
    },
    #[error("schema has no root type for {} operations", .0.as_str())]
    MissingRootType(OperationKind),
    #[error("unable to find parent type of '{0}'")]
    MissingParentType(String),
    #[error("unable to resolve the input type of a value")]
    MissingInputType,
    #[error(transparent)]
    Print(#[from] PrintError),
}

#[derive(Clone)]
pub struct CollectorOptions {
    /// Prune input object usage down to the fields present in the supplied variable values.
    /// Default: false
    pub process_variables: bool,
    /// Derives the operation key from the normalized operation.
    /// Default: MD5 hex digest
    pub key_hash_fn: KeyHashFn,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            process_variables: false,
            key_hash_fn: Arc::new(md5_hex),
        }
    }
}

impl CollectorOptions {
    pub fn process_variables(mut self, process_variables: bool) -> Self {
        self.process_variables = process_variables;
        self
    }

    pub fn key_hash_fn<F>(mut self, key_hash_fn: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.key_hash_fn = Arc::new(key_hash_fn);
        self
    }
}

/// Computes which parts of a schema an operation uses.
#[derive(Clone)]
pub struct UsageCollector {
    schema: Arc<SchemaDocument>,
    options: CollectorOptions,
}

impl UsageCollector {
    pub fn new(schema: Arc<SchemaDocument>) -> Self {
        Self::with_options(schema, CollectorOptions::default())
    }

    /// Type extensions of `schema` are merged into their base types before collecting.
    pub fn with_options(schema: Arc<SchemaDocument>, options: CollectorOptions) -> Self {
        Self {
            schema: Arc::new(prepare_schema(&schema)),
            options,
        }
    }

    pub fn schema(&self) -> &Arc<SchemaDocument> {
        &self.schema
    }

    pub fn options(&self) -> &CollectorOptions {
        &self.options
    }

    pub fn collect(
        &self,
        document: &Document,
        variables: Option<&Map<String, JsonValue>>,
    ) -> Result<OperationDefinition, CollectError> {
        let strategy = VariableStrategy::new(self.options.process_variables, variables);
        let fields = collect_schema_usage(&self.schema, document, strategy)?;

        let normalized = normalize_operation(document, &NormalizeOptions::default());
        let operation = print_operation(&normalized)?;
        let key = (self.options.key_hash_fn)(&JsonValue::String(operation.clone()).to_string());

        let operation_name = document.definitions.iter().find_map(|definition| match definition {
            Definition::Operation(operation) => Some(operation.node_name().map(str::to_string)),
            Definition::Fragment(_) => None,
        });

        Ok(OperationDefinition {
            key,
            operation,
            operation_name: operation_name.flatten(),
            fields,
        })
    }
}

/// Walks the document and returns the sorted, deduplicated usage identifiers.
///
/// Types are looked up by their definitions only, so `schema` is expected to have gone
/// through [`prepare_schema`].
pub fn collect_schema_usage(
    schema: &SchemaDocument,
    document: &Document,
    strategy: VariableStrategy<'_>,
) -> Result<Vec<String>, CollectError> {
    let mut walker = UsageWalker {
        ctx: TraversalContext::new(schema),
        strategy,
        usage: CollectedUsage::default(),
    };

    for definition in &document.definitions {
        match definition {
            Definition::Operation(operation) => walker.walk_operation(operation)?,
            Definition::Fragment(fragment) => {
                let TypeCondition::On(type_name) = &fragment.type_condition;
                let parent_type = walker.ctx.resolve(type_name)?;
                walker.walk_selection_set_in(parent_type, &fragment.selection_set)?;
            }
        }
    }

    walker.usage.finish(schema)
}

pub(crate) fn make_id<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join(".")
}

#[derive(Debug, Default)]
pub(crate) struct CollectedUsage {
    pub entries: HashSet<String>,
    pub input_types: CollectedInputTypes,
}

impl CollectedUsage {
    pub fn mark_used(&mut self, id: String) {
        self.entries.insert(id);
    }

    pub fn finish(self, schema: &SchemaDocument) -> Result<Vec<String>, CollectError> {
        let CollectedUsage {
            mut entries,
            input_types,
        } = self;

        input_types.resolve(schema, &mut entries)?;

        let mut fields: Vec<String> = entries.into_iter().collect();
        fields.sort_unstable();
        Ok(fields)
    }
}

struct UsageWalker<'s, 'v> {
    ctx: TraversalContext<'s>,
    strategy: VariableStrategy<'v>,
    usage: CollectedUsage,
}

impl<'s> UsageWalker<'s, '_> {
    fn walk_operation(&mut self, operation: &OperationNode) -> Result<(), CollectError> {
        let kind = match operation {
            OperationNode::SelectionSet(_) | OperationNode::Query(_) => OperationKind::Query,
            OperationNode::Mutation(_) => OperationKind::Mutation,
            OperationNode::Subscription(_) => OperationKind::Subscription,
        };

        for variable in operation.variable_definitions() {
            self.strategy
                .collect_variable(self.ctx.schema, variable, &mut self.usage)?;
        }

        let root_type = kind
            .root_type_name(self.ctx.schema)
            .and_then(|name| self.ctx.resolve(name).ok())
            .ok_or(CollectError::MissingRootType(kind))?;

        self.walk_selection_set_in(root_type, operation.selection_set())
    }

    fn walk_selection_set_in(
        &mut self,
        parent_type: &'s TypeDefinition,
        selection_set: &SelectionSet,
    ) -> Result<(), CollectError> {
        self.ctx.enter_parent_type(parent_type);
        let result = self.walk_selection_set(selection_set);
        self.ctx.leave_parent_type();
        result
    }

    fn walk_selection_set(&mut self, selection_set: &SelectionSet) -> Result<(), CollectError> {
        for selection in &selection_set.items {
            match selection {
                Selection::Field(field) => self.walk_field(field)?,
                // fragment definitions are walked on their own
                Selection::FragmentSpread(_) => {}
                Selection::InlineFragment(inline_fragment) => {
                    let parent_type = match &inline_fragment.type_condition {
                        Some(TypeCondition::On(type_name)) => self.ctx.resolve(type_name)?,
                        None => self
                            .ctx
                            .current_parent_type()
                            .ok_or_else(|| CollectError::MissingParentType("...".to_string()))?,
                    };
                    self.walk_selection_set_in(parent_type, &inline_fragment.selection_set)?;
                }
            }
        }

        Ok(())
    }

    fn walk_field(&mut self, field: &Field) -> Result<(), CollectError> {
        let parent_type = self
            .ctx
            .current_parent_type()
            .ok_or_else(|| CollectError::MissingParentType(field.name.clone()))?;

        match field.name.as_str() {
            "__typename" => {
                self.usage
                    .mark_used(make_id(&[parent_type.name(), "__typename"]));
                return Ok(());
            }
            "__schema" | "__type" => return Ok(()),
            _ => {}
        }

        let field_def =
            parent_type
                .field_by_name(&field.name)
                .ok_or_else(|| CollectError::UnknownField {
                    type_name: parent_type.name().to_string(),
                    field_name: field.name.clone(),
                })?;

        self.usage
            .mark_used(make_id(&[parent_type.name(), field.name.as_str()]));

        self.ctx.enter_field(field_def);
        let result = self.walk_field_contents(field);
        self.ctx.leave_field();
        result
    }

    fn walk_field_contents(&mut self, field: &Field) -> Result<(), CollectError> {
        // directives are skipped, their arguments are not part of the used schema
        for (argument_name, value) in &field.arguments {
            self.walk_argument(argument_name, value)?;
        }

        if field.selection_set.items.is_empty() {
            return Ok(());
        }

        let output_type = match self.ctx.current_field() {
            Some(field_def) => self.ctx.resolve(field_def.field_type.inner_type())?,
            None => return Err(CollectError::MissingParentType(field.name.clone())),
        };

        self.walk_selection_set_in(output_type, &field.selection_set)
    }

    fn walk_argument(
        &mut self,
        argument_name: &str,
        value: &Value,
    ) -> Result<(), CollectError> {
        let (parent_type, field_def) = match (self.ctx.current_parent_type(), self.ctx.current_field()) {
            (Some(parent_type), Some(field_def)) => (parent_type, field_def),
            _ => return Err(CollectError::MissingParentType(argument_name.to_string())),
        };

        let argument_def = field_def
            .arguments
            .iter()
            .find(|argument| argument.name == argument_name)
            .ok_or_else(|| CollectError::UnknownArgument {
                type_name: parent_type.name().to_string(),
                field_name: field_def.name.clone(),
                argument_name: argument_name.to_string(),
            })?;

        self.usage.mark_used(make_id(&[
            parent_type.name(),
            field_def.name.as_str(),
            argument_name,
        ]));

        self.ctx.enter_input_type(&argument_def.value_type);
        let result = self
            .collect_input_value(value)
            .and_then(|_| self.walk_value(value));
        self.ctx.leave_input_type();
        result
    }

    /// Marks the input type of the current position according to the kind of value it receives.
    fn collect_input_value(&mut self, value: &Value) -> Result<(), CollectError> {
        let input_type = self.ctx.current_named_input_type()?;

        match value {
            Value::Enum(enum_value) => self
                .usage
                .input_types
                .mark_field(input_type.name(), enum_value),
            // descended into by walk_value
            Value::Object(_) | Value::List(_) => {}
            // marked from the variable values instead
            Value::Variable(_) if self.strategy.prunes() => {}
            _ => self.usage.input_types.mark_all(input_type.name()),
        }

        Ok(())
    }

    fn walk_value(&mut self, value: &Value) -> Result<(), CollectError> {
        match value {
            Value::List(items) => {
                let list_type = self
                    .ctx
                    .current_input_type()
                    .ok_or(CollectError::MissingInputType)?;

                // nested lists mark their own leaves when walked below
                if items
                    .iter()
                    .any(|item| !matches!(item, Value::Object(_) | Value::List(_)))
                {
                    let item_type = self.ctx.resolve(list_type.inner_type())?;
                    self.usage.input_types.mark_all(item_type.name());
                }

                for item in items {
                    self.ctx.enter_input_type(list_item_type(list_type));
                    let result = self.walk_value(item);
                    self.ctx.leave_input_type();
                    result?;
                }
            }
            Value::Object(fields) => {
                let parent_type = self.ctx.current_named_input_type()?;
                let TypeDefinition::InputObject(input_object) = parent_type else {
                    // an object literal given to a custom scalar
                    self.usage.input_types.mark_all(parent_type.name());
                    return Ok(());
                };

                for (field_name, field_value) in fields {
                    let field_def = parent_type.input_field_by_name(field_name).ok_or_else(|| {
                        CollectError::UnknownInputField {
                            type_name: input_object.name.clone(),
                            field_name: field_name.clone(),
                        }
                    })?;

                    self.ctx.enter_input_type(&field_def.value_type);
                    let result = self
                        .collect_input_value(field_value)
                        .and_then(|_| self.walk_value(field_value));
                    self.ctx.leave_input_type();
                    result?;

                    self.usage
                        .input_types
                        .mark_field(&input_object.name, field_name);
                }
            }
            _ => {}
        }

        Ok(())
    }
}

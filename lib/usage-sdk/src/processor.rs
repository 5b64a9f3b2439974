use std::sync::Arc;

use graphql_tools::parser::parse_query;
use graphql_tools::static_graphql::query::{
    Definition, Document, OperationDefinition as OperationNode, Selection,
};
use moka::sync::Cache;
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::collector::{CollectError, OperationDefinition, UsageCollector};

const CACHE_CAPACITY: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("failed to parse operation: {0}")]
    Parse(String),
    #[error(transparent)]
    Collect(#[from] CollectError),
}

/// Parses raw operation text and collects its schema usage, caching the result per text.
///
/// Introspection-only operations are not reported and resolve to `None`.
pub struct OperationProcessor {
    collector: UsageCollector,
    cache: Cache<String, Option<Arc<OperationDefinition>>>,
}

impl OperationProcessor {
    pub fn new(collector: UsageCollector) -> OperationProcessor {
        OperationProcessor {
            collector,
            cache: Cache::new(CACHE_CAPACITY),
        }
    }

    pub fn collector(&self) -> &UsageCollector {
        &self.collector
    }

    pub fn process(&self, query: &str) -> Result<Option<Arc<OperationDefinition>>, ProcessingError> {
        self.process_with_variables(query, None)
    }

    pub fn process_with_variables(
        &self,
        query: &str,
        variables: Option<&Map<String, JsonValue>>,
    ) -> Result<Option<Arc<OperationDefinition>>, ProcessingError> {
        // pruned usage depends on the variable values, not only on the text
        let depends_on_variables = self.collector.options().process_variables && variables.is_some();

        if !depends_on_variables {
            if let Some(entry) = self.cache.get(query) {
                return Ok(entry);
            }
        }

        let result = self.transform(query, variables)?;

        if !depends_on_variables {
            self.cache.insert(query.to_string(), result.clone());
        }

        Ok(result)
    }

    fn transform(
        &self,
        operation: &str,
        variables: Option<&Map<String, JsonValue>>,
    ) -> Result<Option<Arc<OperationDefinition>>, ProcessingError> {
        let parsed = parse_query::<String>(operation)
            .map_err(|e| ProcessingError::Parse(e.to_string()))?
            .into_static();

        if is_introspection(&parsed) {
            debug!("skipping introspection operation");
            return Ok(None);
        }

        let definition = self.collector.collect(&parsed, variables)?;
        Ok(Some(Arc::new(definition)))
    }
}

/// An operation whose root selections only query the introspection meta fields.
fn is_introspection(document: &Document) -> bool {
    let Some(operation) = document.definitions.iter().find_map(|definition| match definition {
        Definition::Operation(operation) => Some(operation),
        Definition::Fragment(_) => None,
    }) else {
        return false;
    };

    if matches!(
        operation,
        OperationNode::Mutation(_) | OperationNode::Subscription(_)
    ) {
        return false;
    }

    let mut queries_schema = false;
    for selection in &operation.selection_set().items {
        match selection {
            Selection::Field(field) => match field.name.as_str() {
                "__schema" | "__type" => queries_schema = true,
                "__typename" => {}
                _ => return false,
            },
            _ => return false,
        }
    }

    queries_schema
}

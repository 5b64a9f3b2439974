use graphql_tools::static_graphql::schema::{
    self, EnumType, InputObjectType, InterfaceType, ObjectType, ScalarType, TypeDefinition,
    UnionType,
};
use tracing::debug;

pub type SchemaDocument = schema::Document;

type Definition = schema::Definition<'static, String>;
type TypeExtension = schema::TypeExtension<'static, String>;

const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }

    /// Name of the root type serving this kind of operation, if the schema has one.
    pub fn root_type_name<'s>(&self, schema: &'s SchemaDocument) -> Option<&'s str> {
        let name = match self {
            OperationKind::Query => schema.query_type_name(),
            OperationKind::Mutation => schema.mutation_type_name(),
            OperationKind::Subscription => schema.subscription_type_name(),
        };

        name.map(String::as_str)
    }
}

/// Returns a copy of the schema where every `extend ...` definition is merged into the
/// type it extends, and the built-in scalars are declared when the SDL leaves them out.
///
/// Type lookups only see `TypeDefinition`s, so usage collection runs on the prepared copy.
pub fn prepare_schema(schema: &SchemaDocument) -> SchemaDocument {
    let mut definitions: Vec<Definition> = Vec::with_capacity(schema.definitions.len());
    let mut extensions: Vec<&TypeExtension> = Vec::new();

    for definition in &schema.definitions {
        match definition {
            Definition::TypeExtension(extension) => extensions.push(extension),
            other => definitions.push(other.clone()),
        }
    }

    for extension in extensions {
        merge_extension(&mut definitions, extension);
    }

    let mut prepared = SchemaDocument::new(definitions);

    for scalar in BUILTIN_SCALARS {
        if prepared.type_by_name(scalar).is_none() {
            prepared
                .definitions
                .push(Definition::TypeDefinition(TypeDefinition::Scalar(
                    ScalarType::new(scalar.to_string()),
                )));
        }
    }

    prepared
}

fn merge_extension(definitions: &mut Vec<Definition>, extension: &TypeExtension) {
    let name = extension.name();
    let existing = definitions.iter().position(|definition| {
        matches!(definition, Definition::TypeDefinition(type_def) if type_def.name() == name)
    });

    let index = match existing {
        Some(index) => index,
        None => {
            // an extension without a base definition declares the type
            definitions.push(Definition::TypeDefinition(empty_definition(extension)));
            definitions.len() - 1
        }
    };

    let Some(Definition::TypeDefinition(base)) = definitions.get_mut(index) else {
        return;
    };

    match (base, extension) {
        (TypeDefinition::Scalar(scalar), TypeExtension::Scalar(ext)) => {
            scalar.directives.extend(ext.directives.iter().cloned());
        }
        (TypeDefinition::Object(object), TypeExtension::Object(ext)) => {
            object
                .implements_interfaces
                .extend(ext.implements_interfaces.iter().cloned());
            object.directives.extend(ext.directives.iter().cloned());
            object.fields.extend(ext.fields.iter().cloned());
        }
        (TypeDefinition::Interface(interface), TypeExtension::Interface(ext)) => {
            interface
                .implements_interfaces
                .extend(ext.implements_interfaces.iter().cloned());
            interface.directives.extend(ext.directives.iter().cloned());
            interface.fields.extend(ext.fields.iter().cloned());
        }
        (TypeDefinition::Union(union_type), TypeExtension::Union(ext)) => {
            union_type.directives.extend(ext.directives.iter().cloned());
            union_type.types.extend(ext.types.iter().cloned());
        }
        (TypeDefinition::Enum(enum_type), TypeExtension::Enum(ext)) => {
            enum_type.directives.extend(ext.directives.iter().cloned());
            enum_type.values.extend(ext.values.iter().cloned());
        }
        (TypeDefinition::InputObject(input_object), TypeExtension::InputObject(ext)) => {
            input_object.directives.extend(ext.directives.iter().cloned());
            input_object.fields.extend(ext.fields.iter().cloned());
        }
        (base, _) => {
            debug!(
                "ignoring extension of '{}', it does not match the kind of the extended type",
                base.name()
            );
        }
    }
}

fn empty_definition(extension: &TypeExtension) -> TypeDefinition {
    let name = extension.name().to_string();

    match extension {
        TypeExtension::Scalar(_) => TypeDefinition::Scalar(ScalarType::new(name)),
        TypeExtension::Object(_) => TypeDefinition::Object(ObjectType::new(name)),
        TypeExtension::Interface(_) => TypeDefinition::Interface(InterfaceType::new(name)),
        TypeExtension::Union(_) => TypeDefinition::Union(UnionType::new(name)),
        TypeExtension::Enum(_) => TypeDefinition::Enum(EnumType::new(name)),
        TypeExtension::InputObject(_) => TypeDefinition::InputObject(InputObjectType::new(name)),
    }
}

#[cfg(test)]
mod tests {
    use graphql_tools::parser::parse_schema;
    use graphql_tools::static_graphql::schema::TypeDefinition;

    use super::{prepare_schema, OperationKind, SchemaDocument};

    fn prepared(sdl: &str) -> SchemaDocument {
        prepare_schema(&parse_schema::<String>(sdl).unwrap().into_static())
    }

    #[test]
    fn declares_builtin_scalars() {
        let schema = prepared("type Query { a: Int } scalar String");

        assert!(matches!(
            schema.type_by_name("Int"),
            Some(TypeDefinition::Scalar(_))
        ));
        assert!(matches!(
            schema.type_by_name("Query"),
            Some(TypeDefinition::Object(_))
        ));
        assert!(schema.type_by_name("Missing").is_none());

        let declared_strings = schema
            .definitions
            .iter()
            .filter(|definition| definition.name() == Some("String"))
            .count();
        assert_eq!(declared_strings, 1);
    }

    #[test]
    fn merges_type_extensions_into_their_base() {
        let schema = prepared(
            "
            type Query { a: Int }
            extend type Query { b: Int }
            enum Kind { A }
            extend enum Kind { B }
            input Filter { id: ID }
            extend input Filter { name: String }
            ",
        );

        let query = schema.type_by_name("Query").unwrap();
        assert!(query.field_by_name("a").is_some());
        assert!(query.field_by_name("b").is_some());

        let Some(TypeDefinition::Enum(kind)) = schema.type_by_name("Kind") else {
            panic!("Kind should be an enum");
        };
        let values: Vec<&str> = kind.values.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(values, vec!["A", "B"]);

        let filter = schema.type_by_name("Filter").unwrap();
        assert!(filter.input_field_by_name("name").is_some());
    }

    #[test]
    fn declares_types_only_introduced_by_extensions() {
        let schema = prepared("extend type Query { a: Int }");

        assert_eq!(OperationKind::Query.root_type_name(&schema), Some("Query"));
        assert!(schema
            .type_by_name("Query")
            .and_then(|query| query.field_by_name("a"))
            .is_some());
    }

    #[test]
    fn uses_schema_definition_root_names() {
        let schema = prepared(
            "schema { query: RootQuery } type RootQuery { a: Int } type Mutation { b: Int }",
        );

        assert_eq!(
            OperationKind::Query.root_type_name(&schema),
            Some("RootQuery")
        );
        assert_eq!(
            OperationKind::Mutation.root_type_name(&schema),
            Some("Mutation")
        );
        assert_eq!(OperationKind::Subscription.root_type_name(&schema), None);
    }
}

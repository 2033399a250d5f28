// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Schema composition module
//!
//! Combines GraphQL type definitions (SDL documents) and a [`ResolverMap`] into
//! one executable [`ComposedSchema`]. Composition happens once at startup; the
//! result is immutable and shared by every request.

pub mod resolvers;

use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use async_graphql::{
    Request, Response, Value,
    dynamic::{
        self, Enum, EnumItem, Field, InputObject, InputValue, Interface, InterfaceField, Object,
        Scalar, TypeRef, Union,
    },
    parser::{
        parse_schema,
        types::{
            BaseType, ConstDirective, EnumValueDefinition, FieldDefinition,
            InputValueDefinition, SchemaDefinition, Type, TypeDefinition, TypeKind,
            TypeSystemDefinition,
        },
    },
};
use thiserror::Error;
use tracing::debug;

pub use resolvers::{Resolver, ResolverMap, resolver};

use resolvers::OutputKind;

const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];
const DEFAULT_DEPRECATION_REASON: &str = "No longer supported";

/// Reasons type definitions and resolvers cannot be composed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaCompositionError {
    /// A type definition document does not parse
    #[error("type definitions #{index} failed to parse: {message}")]
    Parse {
        /// Position of the document in the input list
        index: usize,
        /// Parser message
        message: String,
    },

    /// A type is defined more than once
    #[error("type {0} is defined more than once")]
    DuplicateType(String),

    /// A field is defined more than once on the same type
    #[error("field {type_name}.{field_name} is defined more than once")]
    DuplicateField {
        /// Owning type
        type_name: String,
        /// Repeated field
        field_name: String,
    },

    /// A type extension or resolver references a type that is not defined
    #[error("type {0} is not defined in the type definitions")]
    UnknownType(String),

    /// A resolver references a field that is not defined
    #[error("resolver {type_name}.{field_name} has no matching field in the type definitions")]
    UnknownField {
        /// Type named by the resolver
        type_name: String,
        /// Field named by the resolver
        field_name: String,
    },

    /// A resolver is bound to a type that has no resolvable fields
    #[error("type {0} is not an object type and cannot have field resolvers")]
    NotAnObject(String),

    /// No query root type exists
    #[error("type definitions do not declare a query root type")]
    MissingQueryRoot,

    /// The definitions use a construct the gateway does not serve
    #[error("unsupported definition: {0}")]
    Unsupported(String),

    /// The execution engine rejected the composed schema
    #[error("{0}")]
    Invalid(String),
}

/// One GraphQL SDL document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefs(Cow<'static, str>);

impl TypeDefs {
    /// Wrap an SDL document
    pub fn new(sdl: impl Into<Cow<'static, str>>) -> Self {
        Self(sdl.into())
    }

    /// The SDL source
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for TypeDefs {
    fn from(sdl: &'static str) -> Self {
        Self::new(sdl)
    }
}

impl From<String> for TypeDefs {
    fn from(sdl: String) -> Self {
        Self::new(sdl)
    }
}

/// Immutable executable schema
///
/// Cloning is cheap; clones share the same underlying schema.
#[derive(Clone)]
pub struct ComposedSchema {
    inner: dynamic::Schema,
    query_type: String,
    mutation_type: Option<String>,
    bindings: Vec<String>,
}

impl ComposedSchema {
    /// Execute a single GraphQL request
    pub async fn execute(&self, request: Request) -> Response {
        self.inner.execute(request).await
    }

    /// Schema in SDL form
    pub fn sdl(&self) -> String {
        self.inner.sdl()
    }

    /// Name of the query root type
    pub fn query_type(&self) -> &str {
        &self.query_type
    }

    /// Name of the mutation root type, if any
    pub fn mutation_type(&self) -> Option<&str> {
        self.mutation_type.as_deref()
    }

    /// Fields bound to an explicit resolver, as `Type.field`, sorted
    pub fn explicit_bindings(&self) -> &[String] {
        &self.bindings
    }
}

impl fmt::Debug for ComposedSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedSchema")
            .field("query_type", &self.query_type)
            .field("mutation_type", &self.mutation_type)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

/// Compose type definitions and resolvers into an executable schema
///
/// Fields without an explicit resolver are bound to the default resolver,
/// which reads the same-named property of the parent value.
///
/// # Errors
///
/// Returns [`SchemaCompositionError`] when the definitions do not parse, are
/// inconsistent with each other, or when a resolver names a type or field that
/// the definitions do not declare.
pub fn compose(
    type_defs: &[TypeDefs],
    resolvers: &ResolverMap,
) -> Result<ComposedSchema, SchemaCompositionError> {
    let mut registry = Registry::default();
    let mut extensions = Vec::new();

    for (index, document) in type_defs.iter().enumerate() {
        let document =
            parse_schema(document.as_str()).map_err(|e| SchemaCompositionError::Parse {
                index,
                message: e.to_string(),
            })?;

        for definition in document.definitions {
            match definition {
                TypeSystemDefinition::Schema(schema) => registry.set_roots(schema.node),
                TypeSystemDefinition::Type(ty) if ty.node.extend => extensions.push(ty.node),
                TypeSystemDefinition::Type(ty) => registry.define(ty.node)?,
                TypeSystemDefinition::Directive(directive) => {
                    debug!(
                        directive = %directive.node.name.node,
                        "ignoring directive definition"
                    );
                }
            }
        }
    }

    for extension in extensions {
        registry.extend(extension)?;
    }

    let (query_type, mutation_type) = registry.roots()?;
    registry.check_resolvers(resolvers)?;

    let mut builder = dynamic::Schema::build(&query_type, mutation_type.as_deref(), None);
    for definition in &registry.types {
        builder = match &definition.kind {
            Kind::Object { implements, fields } => builder.register(registry.object(
                definition,
                implements,
                fields,
                resolvers,
            )),
            Kind::Interface { implements, fields } => {
                if !implements.is_empty() {
                    return Err(SchemaCompositionError::Unsupported(format!(
                        "interface {} implements other interfaces",
                        definition.name
                    )));
                }
                builder.register(interface(definition, fields))
            }
            Kind::Union { members } => builder.register(union(definition, members)),
            Kind::Enum { values } => builder.register(enumeration(definition, values)),
            Kind::InputObject { fields } => builder.register(input_object(definition, fields)),
            Kind::Scalar => builder.register(scalar(definition)),
        };
    }

    let inner = builder
        .finish()
        .map_err(|e| SchemaCompositionError::Invalid(e.to_string()))?;

    let bindings = resolvers
        .iter()
        .map(|(type_name, field_name, _)| format!("{type_name}.{field_name}"))
        .collect();

    debug!(
        query_type = %query_type,
        mutation_type = ?mutation_type,
        types = registry.types.len(),
        resolvers = resolvers.len(),
        "schema composed"
    );

    Ok(ComposedSchema {
        inner,
        query_type,
        mutation_type,
        bindings,
    })
}

#[derive(Debug)]
enum Kind {
    Object {
        implements: Vec<String>,
        fields: Vec<FieldDefinition>,
    },
    Interface {
        implements: Vec<String>,
        fields: Vec<FieldDefinition>,
    },
    Union {
        members: Vec<String>,
    },
    Enum {
        values: Vec<EnumValueDefinition>,
    },
    InputObject {
        fields: Vec<InputValueDefinition>,
    },
    Scalar,
}

#[derive(Debug)]
struct Definition {
    name: String,
    description: Option<String>,
    kind: Kind,
}

#[derive(Debug, Default)]
struct Registry {
    types: Vec<Definition>,
    index: HashMap<String, usize>,
    query: Option<String>,
    mutation: Option<String>,
    subscription: Option<String>,
}

impl Registry {
    fn set_roots(&mut self, schema: SchemaDefinition) {
        if let Some(query) = schema.query {
            self.query = Some(query.node.to_string());
        }
        if let Some(mutation) = schema.mutation {
            self.mutation = Some(mutation.node.to_string());
        }
        if let Some(subscription) = schema.subscription {
            self.subscription = Some(subscription.node.to_string());
        }
    }

    fn define(&mut self, definition: TypeDefinition) -> Result<(), SchemaCompositionError> {
        let name = definition.name.node.to_string();
        if BUILTIN_SCALARS.contains(&name.as_str()) {
            return Err(SchemaCompositionError::DuplicateType(name));
        }
        if self.index.contains_key(&name) {
            return Err(SchemaCompositionError::DuplicateType(name));
        }

        let kind = match definition.kind {
            TypeKind::Scalar => Kind::Scalar,
            TypeKind::Object(object) => Kind::Object {
                implements: names(object.implements.iter().map(|n| &n.node)),
                fields: unique_fields(&name, object.fields.into_iter().map(|f| f.node))?,
            },
            TypeKind::Interface(interface) => Kind::Interface {
                implements: names(interface.implements.iter().map(|n| &n.node)),
                fields: unique_fields(&name, interface.fields.into_iter().map(|f| f.node))?,
            },
            TypeKind::Union(union) => Kind::Union {
                members: names(union.members.iter().map(|n| &n.node)),
            },
            TypeKind::Enum(enumeration) => Kind::Enum {
                values: enumeration.values.into_iter().map(|v| v.node).collect(),
            },
            TypeKind::InputObject(input) => Kind::InputObject {
                fields: input.fields.into_iter().map(|f| f.node).collect(),
            },
        };

        self.index.insert(name.clone(), self.types.len());
        self.types.push(Definition {
            name,
            description: definition.description.map(|d| d.node),
            kind,
        });
        Ok(())
    }

    fn extend(&mut self, extension: TypeDefinition) -> Result<(), SchemaCompositionError> {
        let name = extension.name.node.to_string();
        let position = *self
            .index
            .get(&name)
            .ok_or_else(|| SchemaCompositionError::UnknownType(name.clone()))?;
        let target = &mut self.types[position];

        match (&mut target.kind, extension.kind) {
            (Kind::Object { implements, fields }, TypeKind::Object(ext)) => {
                implements.extend(names(ext.implements.iter().map(|n| &n.node)));
                for field in ext.fields {
                    push_field(&name, fields, field.node)?;
                }
            }
            (Kind::Interface { implements, fields }, TypeKind::Interface(ext)) => {
                implements.extend(names(ext.implements.iter().map(|n| &n.node)));
                for field in ext.fields {
                    push_field(&name, fields, field.node)?;
                }
            }
            (Kind::Union { members }, TypeKind::Union(ext)) => {
                members.extend(names(ext.members.iter().map(|n| &n.node)));
            }
            (Kind::Enum { values }, TypeKind::Enum(ext)) => {
                values.extend(ext.values.into_iter().map(|v| v.node));
            }
            (Kind::InputObject { fields }, TypeKind::InputObject(ext)) => {
                fields.extend(ext.fields.into_iter().map(|f| f.node));
            }
            (Kind::Scalar, TypeKind::Scalar) => {}
            _ => {
                return Err(SchemaCompositionError::Unsupported(format!(
                    "extension of {name} does not match its definition kind"
                )));
            }
        }
        Ok(())
    }

    fn kind_of(&self, name: &str) -> Option<&Kind> {
        self.index.get(name).map(|&position| &self.types[position].kind)
    }

    fn output_kind(&self, ty: &Type) -> OutputKind {
        match self.kind_of(base_name(ty)) {
            Some(Kind::Enum { .. }) => OutputKind::Enum,
            Some(Kind::Union { .. } | Kind::Interface { .. }) => OutputKind::Abstract,
            _ => OutputKind::Plain,
        }
    }

    fn roots(&self) -> Result<(String, Option<String>), SchemaCompositionError> {
        let root = |explicit: &Option<String>, conventional: &str| {
            explicit
                .clone()
                .or_else(|| self.index.contains_key(conventional).then(|| conventional.to_string()))
        };

        if root(&self.subscription, "Subscription").is_some() {
            return Err(SchemaCompositionError::Unsupported(
                "subscription root types are not served over HTTP".to_string(),
            ));
        }

        let query = root(&self.query, "Query").ok_or(SchemaCompositionError::MissingQueryRoot)?;
        let mutation = root(&self.mutation, "Mutation");

        for name in std::iter::once(&query).chain(mutation.as_ref()) {
            match self.kind_of(name) {
                Some(Kind::Object { .. }) => {}
                Some(_) => return Err(SchemaCompositionError::NotAnObject(name.clone())),
                None => return Err(SchemaCompositionError::UnknownType(name.clone())),
            }
        }

        Ok((query, mutation))
    }

    fn check_resolvers(&self, resolvers: &ResolverMap) -> Result<(), SchemaCompositionError> {
        for (type_name, field_name, _) in resolvers.iter() {
            match self.kind_of(type_name) {
                None => return Err(SchemaCompositionError::UnknownType(type_name.to_string())),
                Some(Kind::Object { fields, .. }) => {
                    if !fields.iter().any(|f| f.name.node.as_str() == field_name) {
                        return Err(SchemaCompositionError::UnknownField {
                            type_name: type_name.to_string(),
                            field_name: field_name.to_string(),
                        });
                    }
                }
                Some(_) => return Err(SchemaCompositionError::NotAnObject(type_name.to_string())),
            }
        }
        Ok(())
    }

    fn object(
        &self,
        definition: &Definition,
        implements: &[String],
        fields: &[FieldDefinition],
        resolvers: &ResolverMap,
    ) -> Object {
        let mut object = Object::new(&definition.name);
        if let Some(description) = &definition.description {
            object = object.description(description);
        }
        for name in implements {
            object = object.implement(name);
        }

        for field in fields {
            let field_name = field.name.node.as_str();
            let kind = self.output_kind(&field.ty.node);
            let bound = match resolvers.get(&definition.name, field_name) {
                Some(explicit) if kind == OutputKind::Abstract => {
                    resolvers::abstract_output(Arc::clone(explicit))
                }
                Some(explicit) => Arc::clone(explicit),
                None => resolvers::default_resolver(field_name.to_string(), kind),
            };

            let mut output = Field::new(field_name, type_ref(&field.ty.node), move |ctx| bound(ctx));
            if let Some(description) = &field.description {
                output = output.description(&description.node);
            }
            if let Some(reason) = deprecation(&field.directives) {
                output = output.deprecation(Some(reason));
            }
            for argument in &field.arguments {
                output = output.argument(input_value(&argument.node));
            }
            object = object.field(output);
        }
        object
    }
}

fn interface(definition: &Definition, fields: &[FieldDefinition]) -> Interface {
    let mut interface = Interface::new(&definition.name);
    if let Some(description) = &definition.description {
        interface = interface.description(description);
    }
    for field in fields {
        let mut output = InterfaceField::new(field.name.node.as_str(), type_ref(&field.ty.node));
        if let Some(description) = &field.description {
            output = output.description(&description.node);
        }
        for argument in &field.arguments {
            output = output.argument(input_value(&argument.node));
        }
        interface = interface.field(output);
    }
    interface
}

fn union(definition: &Definition, members: &[String]) -> Union {
    let mut union = Union::new(&definition.name);
    if let Some(description) = &definition.description {
        union = union.description(description);
    }
    for member in members {
        union = union.possible_type(member);
    }
    union
}

fn enumeration(definition: &Definition, values: &[EnumValueDefinition]) -> Enum {
    let mut enumeration = Enum::new(&definition.name);
    if let Some(description) = &definition.description {
        enumeration = enumeration.description(description);
    }
    for value in values {
        let mut item = EnumItem::new(value.value.node.as_str());
        if let Some(description) = &value.description {
            item = item.description(&description.node);
        }
        if let Some(reason) = deprecation(&value.directives) {
            item = item.deprecation(Some(reason));
        }
        enumeration = enumeration.item(item);
    }
    enumeration
}

fn input_object(definition: &Definition, fields: &[InputValueDefinition]) -> InputObject {
    let mut input = InputObject::new(&definition.name);
    if let Some(description) = &definition.description {
        input = input.description(description);
    }
    for field in fields {
        input = input.field(input_value(field));
    }
    input
}

fn scalar(definition: &Definition) -> Scalar {
    let mut scalar = Scalar::new(&definition.name);
    if let Some(description) = &definition.description {
        scalar = scalar.description(description);
    }
    scalar
}

fn input_value(definition: &InputValueDefinition) -> InputValue {
    let mut input = InputValue::new(definition.name.node.as_str(), type_ref(&definition.ty.node));
    if let Some(description) = &definition.description {
        input = input.description(&description.node);
    }
    if let Some(default) = &definition.default_value {
        input = input.default_value(Value::clone(&default.node));
    }
    input
}

fn type_ref(ty: &Type) -> TypeRef {
    let inner = match &ty.base {
        BaseType::Named(name) => TypeRef::Named(Cow::Owned(name.to_string())),
        BaseType::List(item) => TypeRef::List(Box::new(type_ref(item))),
    };
    if ty.nullable {
        inner
    } else {
        TypeRef::NonNull(Box::new(inner))
    }
}

fn base_name(ty: &Type) -> &str {
    match &ty.base {
        BaseType::Named(name) => name.as_str(),
        BaseType::List(item) => base_name(item),
    }
}

fn deprecation(
    directives: &[async_graphql::Positioned<ConstDirective>],
) -> Option<&str> {
    let directive = directives
        .iter()
        .find(|d| d.node.name.node.as_str() == "deprecated")?;
    match directive.node.get_argument("reason").map(|v| &v.node) {
        Some(Value::String(reason)) => Some(reason.as_str()),
        _ => Some(DEFAULT_DEPRECATION_REASON),
    }
}

fn names<'a>(iter: impl Iterator<Item = &'a async_graphql::Name>) -> Vec<String> {
    iter.map(ToString::to_string).collect()
}

fn unique_fields(
    type_name: &str,
    fields: impl Iterator<Item = FieldDefinition>,
) -> Result<Vec<FieldDefinition>, SchemaCompositionError> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for field in fields {
        if !seen.insert(field.name.node.to_string()) {
            return Err(SchemaCompositionError::DuplicateField {
                type_name: type_name.to_string(),
                field_name: field.name.node.to_string(),
            });
        }
        unique.push(field);
    }
    Ok(unique)
}

fn push_field(
    type_name: &str,
    fields: &mut Vec<FieldDefinition>,
    field: FieldDefinition,
) -> Result<(), SchemaCompositionError> {
    if fields.iter().any(|f| f.name.node == field.name.node) {
        return Err(SchemaCompositionError::DuplicateField {
            type_name: type_name.to_string(),
            field_name: field.name.node.to_string(),
        });
    }
    fields.push(field);
    Ok(())
}

#[cfg(test)]
mod tests {
    use async_graphql::dynamic::FieldFuture;
    use serde_json::json;

    use super::*;

    const LIBRARY_SDL: &str = r#"
        "A library catalogue"
        type Query {
            books(limit: Int = 10): [Book!]!
            featured: Book
            version: String!
        }

        type Book {
            title: String!
            author: Author!
            genre: Genre!
        }

        type Author {
            name: String!
        }

        enum Genre {
            FICTION
            HISTORY @deprecated(reason: "merged into NONFICTION")
            NONFICTION
        }
    "#;

    fn library_resolvers() -> ResolverMap {
        ResolverMap::new()
            .field("Query", "books", |ctx| {
                FieldFuture::new(async move {
                    let limit = ctx.args.try_get("limit")?.i64()?;
                    let books = json!([
                        {"title": "Dune", "author": {"name": "Frank Herbert"}, "genre": "FICTION"},
                        {"title": "SPQR", "author": {"name": "Mary Beard"}, "genre": "NONFICTION"}
                    ]);
                    let mut books = Value::from_json(books)?;
                    if let Value::List(items) = &mut books {
                        items.truncate(usize::try_from(limit).unwrap_or(0));
                    }
                    Ok(Some(books))
                })
            })
            .field("Query", "version", |_| {
                FieldFuture::new(async move { Ok(Some(Value::from("1.0.0"))) })
            })
    }

    fn library_schema() -> ComposedSchema {
        compose(&[TypeDefs::new(LIBRARY_SDL)], &library_resolvers()).unwrap()
    }

    #[tokio::test]
    async fn typename_resolves_on_query_root() {
        let schema = library_schema();
        let response = schema.execute(Request::new("{ __typename }")).await;

        assert!(response.errors.is_empty());
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"data": {"__typename": "Query"}})
        );
    }

    #[tokio::test]
    async fn every_declared_field_resolves() {
        let schema = library_schema();
        let response = schema
            .execute(Request::new(
                "{ version featured { title } books { title genre author { name } } }",
            ))
            .await;

        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let data = response.data.into_json().unwrap();
        assert_eq!(data["version"], "1.0.0");
        assert_eq!(data["featured"], serde_json::Value::Null);
        assert_eq!(data["books"][0]["title"], "Dune");
        assert_eq!(data["books"][0]["genre"], "FICTION");
        assert_eq!(data["books"][1]["author"]["name"], "Mary Beard");
    }

    #[tokio::test]
    async fn argument_defaults_apply() {
        let schema = library_schema();
        let response = schema
            .execute(Request::new("{ limited: books(limit: 1) { title } all: books { title } }"))
            .await;

        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let data = response.data.into_json().unwrap();
        assert_eq!(data["limited"].as_array().map(Vec::len), Some(1));
        assert_eq!(data["all"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn composing_twice_is_equivalent() {
        let resolvers = library_resolvers();
        let first = compose(&[TypeDefs::new(LIBRARY_SDL)], &resolvers).unwrap();
        let second = compose(&[TypeDefs::new(LIBRARY_SDL)], &resolvers).unwrap();

        assert_eq!(first.sdl(), second.sdl());
        assert_eq!(first.explicit_bindings(), second.explicit_bindings());

        let query = "{ version books { title genre } }";
        let a = serde_json::to_value(first.execute(Request::new(query)).await).unwrap();
        let b = serde_json::to_value(second.execute(Request::new(query)).await).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn deprecation_survives_composition() {
        let sdl = library_schema().sdl();
        assert!(sdl.contains("merged into NONFICTION"));
    }

    #[test]
    fn resolver_for_unknown_field_fails() {
        let resolvers = library_resolvers().field("Book", "isbn", |_| FieldFuture::from_value(None));
        let err = compose(&[TypeDefs::new(LIBRARY_SDL)], &resolvers).unwrap_err();

        assert_eq!(
            err,
            SchemaCompositionError::UnknownField {
                type_name: "Book".to_string(),
                field_name: "isbn".to_string(),
            }
        );
    }

    #[test]
    fn resolver_for_unknown_type_fails() {
        let resolvers = ResolverMap::new().field("Magazine", "title", |_| FieldFuture::from_value(None));
        let err = compose(&[TypeDefs::new(LIBRARY_SDL)], &resolvers).unwrap_err();

        assert_eq!(err, SchemaCompositionError::UnknownType("Magazine".to_string()));
    }

    #[test]
    fn resolver_on_enum_fails() {
        let resolvers = ResolverMap::new().field("Genre", "FICTION", |_| FieldFuture::from_value(None));
        let err = compose(&[TypeDefs::new(LIBRARY_SDL)], &resolvers).unwrap_err();

        assert_eq!(err, SchemaCompositionError::NotAnObject("Genre".to_string()));
    }

    #[test]
    fn unparsable_definitions_fail() {
        let err = compose(
            &[TypeDefs::new(LIBRARY_SDL), TypeDefs::new("type Broken {")],
            &ResolverMap::new(),
        )
        .unwrap_err();

        assert!(matches!(err, SchemaCompositionError::Parse { index: 1, .. }));
    }

    #[test]
    fn missing_query_root_fails() {
        let err = compose(&[TypeDefs::new("type Book { title: String }")], &ResolverMap::new())
            .unwrap_err();
        assert_eq!(err, SchemaCompositionError::MissingQueryRoot);
    }

    #[test]
    fn duplicate_types_fail() {
        let err = compose(
            &[
                TypeDefs::new("type Query { a: Int }"),
                TypeDefs::new("type Query { b: Int }"),
            ],
            &ResolverMap::new(),
        )
        .unwrap_err();
        assert_eq!(err, SchemaCompositionError::DuplicateType("Query".to_string()));
    }

    #[test]
    fn subscription_roots_are_rejected() {
        let err = compose(
            &[TypeDefs::new("type Query { a: Int } type Subscription { ticks: Int }")],
            &ResolverMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SchemaCompositionError::Unsupported(_)));
    }

    #[test]
    fn undefined_field_type_is_invalid() {
        let err = compose(&[TypeDefs::new("type Query { a: Missing }")], &ResolverMap::new())
            .unwrap_err();
        assert!(matches!(err, SchemaCompositionError::Invalid(_)));
    }

    #[tokio::test]
    async fn extensions_merge_across_documents() {
        let resolvers = ResolverMap::new()
            .field("Query", "ping", |_| FieldFuture::new(async move { Ok(Some(Value::from("pong"))) }))
            .field("Mutation", "touch", |_| FieldFuture::new(async move { Ok(Some(Value::from(true))) }));
        let schema = compose(
            &[
                TypeDefs::new("type Query { ping: String! } type Mutation { touch: Boolean! }"),
                TypeDefs::new("extend type Query { extra: Int }"),
            ],
            &resolvers,
        )
        .unwrap();

        assert_eq!(schema.mutation_type(), Some("Mutation"));
        let response = schema
            .execute(Request::new("{ ping extra }"))
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(
            response.data.into_json().unwrap(),
            json!({"ping": "pong", "extra": null})
        );

        let response = schema.execute(Request::new("mutation { touch }")).await;
        assert_eq!(response.data.into_json().unwrap(), json!({"touch": true}));
    }

    #[test]
    fn extension_of_unknown_type_fails() {
        let err = compose(
            &[TypeDefs::new("type Query { a: Int } extend type Missing { b: Int }")],
            &ResolverMap::new(),
        )
        .unwrap_err();
        assert_eq!(err, SchemaCompositionError::UnknownType("Missing".to_string()));
    }

    #[test]
    fn explicit_schema_definition_renames_roots() {
        let schema = compose(
            &[TypeDefs::new("schema { query: Root } type Root { a: Int }")],
            &ResolverMap::new(),
        )
        .unwrap();
        assert_eq!(schema.query_type(), "Root");
        assert_eq!(schema.mutation_type(), None);
    }

    const SHELF_SDL: &str = r"
        type Query {
            shelf: Shelf!
            items: [Item!]!
            spotlight: Named
        }

        type Shelf {
            items: [Item!]!
            first: Named
        }

        union Item = Book | Film

        interface Named {
            name: String!
        }

        type Book implements Named {
            name: String!
            pages: Int!
        }

        type Film implements Named {
            name: String!
            minutes: Int!
        }
    ";

    fn shelf_json() -> serde_json::Value {
        json!({
            "items": [
                {"__typename": "Book", "name": "Dune", "pages": 412},
                {"__typename": "Film", "name": "Alien", "minutes": 117}
            ],
            "first": {"__typename": "Film", "name": "Alien", "minutes": 117}
        })
    }

    fn shelf_schema() -> ComposedSchema {
        let resolvers = ResolverMap::new()
            .field("Query", "shelf", |_| {
                FieldFuture::new(async move { Ok(Some(Value::from_json(shelf_json())?)) })
            })
            .field("Query", "items", |_| {
                FieldFuture::new(async move {
                    Ok(Some(Value::from_json(shelf_json()["items"].clone())?))
                })
            })
            .field("Query", "spotlight", |_| {
                let book = json!({"__typename": "Book", "name": "SPQR", "pages": 608});
                FieldFuture::from_value(Some(Value::from_json(book).unwrap()))
            });
        compose(&[TypeDefs::new(SHELF_SDL)], &resolvers).unwrap()
    }

    #[tokio::test]
    async fn union_fields_resolve_through_typename() {
        let query = r"{
            shelf { items { ... on Book { name pages } ... on Film { name minutes } } }
            items { __typename }
        }";
        let response = shelf_schema().execute(Request::new(query)).await;

        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(
            response.data.into_json().unwrap(),
            json!({
                "shelf": {"items": [
                    {"name": "Dune", "pages": 412},
                    {"name": "Alien", "minutes": 117}
                ]},
                "items": [{"__typename": "Book"}, {"__typename": "Film"}]
            })
        );
    }

    #[tokio::test]
    async fn interface_fields_resolve_through_typename() {
        let query = r"{
            spotlight { name ... on Book { pages } }
            shelf { first { __typename name ... on Film { minutes } } }
        }";
        let response = shelf_schema().execute(Request::new(query)).await;

        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(
            response.data.into_json().unwrap(),
            json!({
                "spotlight": {"name": "SPQR", "pages": 608},
                "shelf": {"first": {"__typename": "Film", "name": "Alien", "minutes": 117}}
            })
        );
    }

    #[tokio::test]
    async fn abstract_values_without_typename_are_field_errors() {
        let resolvers = ResolverMap::new().field("Query", "spotlight", |_| {
            FieldFuture::new(async move {
                Ok(Some(Value::from_json(json!({"name": "SPQR"}))?))
            })
        });
        let schema = compose(&[TypeDefs::new(SHELF_SDL)], &resolvers).unwrap();
        let response = schema.execute(Request::new("{ spotlight { name } }")).await;

        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0].message.contains("__typename"));
        assert_eq!(
            response.data.into_json().unwrap(),
            json!({"spotlight": null})
        );
    }

    #[test]
    fn interface_extensions_cannot_add_interfaces() {
        let err = compose(
            &[TypeDefs::new(
                "type Query { a: Int } interface Named { name: String } \
                 interface Titled { title: String } \
                 extend interface Named implements Titled { title: String }",
            )],
            &ResolverMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SchemaCompositionError::Unsupported(_)), "{err}");
    }
}

// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Resolver map supplied alongside type definitions

use std::{collections::BTreeMap, fmt, sync::Arc};

use async_graphql::{
    Error, Name, Result, Value,
    dynamic::{FieldFuture, FieldValue, ResolverContext},
};

const TYPENAME: &str = "__typename";

/// A field resolver
pub type Resolver = Arc<dyn for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync>;

/// Wrap a closure into a shareable [`Resolver`]
pub fn resolver<F>(f: F) -> Resolver
where
    F: for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Resolvers keyed by type name, then field name
///
/// Iteration order is sorted, so two maps built from the same entries always
/// compose into the same schema.
#[derive(Clone, Default)]
pub struct ResolverMap {
    types: BTreeMap<String, BTreeMap<String, Resolver>>,
}

impl ResolverMap {
    /// Create an empty resolver map
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration of a field resolver
    #[must_use]
    pub fn field<F>(mut self, type_name: &str, field_name: &str, f: F) -> Self
    where
        F: for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static,
    {
        self.insert(type_name, field_name, resolver(f));
        self
    }

    /// Register a resolver, replacing any previous one for the same field
    pub fn insert(&mut self, type_name: &str, field_name: &str, resolver: Resolver) {
        self.types
            .entry(type_name.to_string())
            .or_default()
            .insert(field_name.to_string(), resolver);
    }

    /// Look up the resolver bound to `type_name.field_name`
    pub fn get(&self, type_name: &str, field_name: &str) -> Option<&Resolver> {
        self.types.get(type_name)?.get(field_name)
    }

    /// Iterate over `(type, field, resolver)` entries in sorted order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Resolver)> {
        self.types.iter().flat_map(|(type_name, fields)| {
            fields
                .iter()
                .map(move |(field_name, resolver)| (type_name.as_str(), field_name.as_str(), resolver))
        })
    }

    /// Number of registered field resolvers
    pub fn len(&self) -> usize {
        self.types.values().map(BTreeMap::len).sum()
    }

    /// Whether no resolvers are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ResolverMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.iter()
                    .map(|(type_name, field_name, _)| format!("{type_name}.{field_name}")),
            )
            .finish()
    }
}

impl<'a> Extend<(&'a str, &'a str, Resolver)> for ResolverMap {
    fn extend<T: IntoIterator<Item = (&'a str, &'a str, Resolver)>>(&mut self, iter: T) {
        for (type_name, field_name, resolver) in iter {
            self.insert(type_name, field_name, resolver);
        }
    }
}

/// What a field's output type needs from a resolved value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputKind {
    /// Scalars, objects and lists of them: the value is used as is
    Plain,
    /// Enum values, which may arrive as strings
    Enum,
    /// Unions and interfaces, resolved to a member object through `__typename`
    Abstract,
}

/// Resolver used for fields with no explicit binding
///
/// Reads the same-named property from the parent object value. Explicit
/// `null` is treated as absent. Enum typed fields get their strings promoted
/// to enum values, abstract typed fields get their concrete type from the
/// object's `__typename`.
pub(crate) fn default_resolver(field_name: String, kind: OutputKind) -> Resolver {
    resolver(move |ctx| {
        let value = ctx.parent_value.as_value().and_then(|parent| match parent {
            Value::Object(map) => map.get(field_name.as_str()).cloned(),
            _ => None,
        });
        match kind {
            OutputKind::Plain => FieldFuture::from_value(value.filter(|v| *v != Value::Null)),
            OutputKind::Enum => {
                FieldFuture::from_value(value.filter(|v| *v != Value::Null).map(promote_enum))
            }
            OutputKind::Abstract => match type_abstract(value.map(FieldValue::from)) {
                Ok(value) => FieldFuture::Value(value),
                Err(e) => FieldFuture::new(async move { Err::<Option<Value>, _>(e) }),
            },
        }
    })
}

/// Wrap an explicit resolver of an abstract typed field
///
/// Plain values returned by `inner` are tagged with the concrete type named by
/// their `__typename`; values already carrying a type pass through.
pub(crate) fn abstract_output(inner: Resolver) -> Resolver {
    resolver(move |ctx| match inner(ctx) {
        FieldFuture::Value(value) => match type_abstract(value) {
            Ok(value) => FieldFuture::Value(value),
            Err(e) => FieldFuture::new(async move { Err::<Option<Value>, _>(e) }),
        },
        FieldFuture::Future(future) => FieldFuture::new(async move { type_abstract(future.await?) }),
    })
}

fn type_abstract(value: Option<FieldValue<'_>>) -> Result<Option<FieldValue<'_>>> {
    let Some(value) = value else {
        return Ok(None);
    };
    if let Some(plain) = value.as_value() {
        return match plain {
            Value::Null => Ok(None),
            plain => with_typename(plain.clone()).map(Some),
        };
    }
    if let Some(items) = value.as_list()
        && items.iter().all(|item| item.as_value().is_some())
    {
        let items = items
            .iter()
            .filter_map(FieldValue::as_value)
            .cloned()
            .map(with_typename)
            .collect::<Result<Vec<_>>>()?;
        return Ok(Some(FieldValue::list(items)));
    }
    Ok(Some(value))
}

fn with_typename<'a>(value: Value) -> Result<FieldValue<'a>> {
    match value {
        Value::Null => Ok(FieldValue::NULL),
        Value::List(items) => Ok(FieldValue::list(
            items
                .into_iter()
                .map(with_typename)
                .collect::<Result<Vec<_>>>()?,
        )),
        Value::Object(map) => {
            let Some(Value::String(type_name)) = map.get(TYPENAME) else {
                return Err(Error::new(format!(
                    "abstract type value has no {TYPENAME} naming its object type"
                )));
            };
            let type_name = type_name.clone();
            Ok(FieldValue::value(Value::Object(map)).with_type(type_name))
        }
        other => Err(Error::new(format!(
            "abstract type value must be an object, found {other}"
        ))),
    }
}

fn promote_enum(value: Value) -> Value {
    match value {
        Value::String(s) => Value::Enum(Name::new(s)),
        Value::List(items) => Value::List(items.into_iter().map(promote_enum).collect()),
        other => other,
    }
}

// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Sample domain served by the gateway binary
//!
//! A read-only book catalogue: SDL type definitions plus the field resolvers
//! that need code. Nested fields (`Book.title`, `Author.name`, ...) have no
//! resolver here and are read from the parent value by the gateway.

use async_graphql::{
    Value,
    dynamic::{FieldFuture, ResolverContext},
};
use serde_json::json;

/// A field resolver
pub type Resolver = Box<dyn for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync>;

/// GraphQL type definitions of the catalogue
pub const TYPE_DEFS: &str = r#"
"""
Read-only book catalogue
"""
type Query {
  "Liveness of the catalogue"
  status: String!
  "All books, optionally restricted to one genre"
  books(genre: Genre): [Book!]!
  "A single book by id"
  book(id: ID!): Book
}

type Book {
  id: ID!
  title: String!
  genre: Genre!
  author: Author!
}

type Author {
  name: String!
  born: Int
}

enum Genre {
  FICTION
  NONFICTION
  POETRY
}
"#;

fn catalogue() -> serde_json::Value {
    json!([
        {
            "id": "1",
            "title": "The Left Hand of Darkness",
            "genre": "FICTION",
            "author": {"name": "Ursula K. Le Guin", "born": 1929}
        },
        {
            "id": "2",
            "title": "The Structure of Scientific Revolutions",
            "genre": "NONFICTION",
            "author": {"name": "Thomas S. Kuhn", "born": 1922}
        },
        {
            "id": "3",
            "title": "Ariel",
            "genre": "POETRY",
            "author": {"name": "Sylvia Plath", "born": 1932}
        }
    ])
}

fn books() -> Vec<serde_json::Value> {
    match catalogue() {
        serde_json::Value::Array(books) => books,
        _ => Vec::new(),
    }
}

fn resolve_status(_: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::from_value(Some(Value::from("ok")))
}

fn resolve_books(ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let genre = match ctx.args.get("genre") {
            Some(genre) => Some(genre.enum_name()?.to_string()),
            None => None,
        };

        let selected = books()
            .into_iter()
            .filter(|book| genre.as_deref().is_none_or(|genre| book["genre"] == genre))
            .collect::<Vec<_>>();

        Ok(Some(Value::from_json(serde_json::Value::Array(selected))?))
    })
}

fn resolve_book(ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let id = ctx.args.try_get("id")?.string()?.to_string();
        match books().into_iter().find(|book| book["id"] == id.as_str()) {
            Some(book) => Ok(Some(Value::from_json(book)?)),
            None => Ok(None),
        }
    })
}

fn boxed<F>(f: F) -> Resolver
where
    F: for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static,
{
    Box::new(f)
}

/// Field resolvers of the catalogue, as `(type, field, resolver)`
pub fn resolvers() -> Vec<(&'static str, &'static str, Resolver)> {
    vec![
        ("Query", "status", boxed(resolve_status)),
        ("Query", "books", boxed(resolve_books)),
        ("Query", "book", boxed(resolve_book)),
    ]
}

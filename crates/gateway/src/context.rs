// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Per-request context handed to resolvers

use std::sync::{Arc, Mutex, PoisonError};

use axum::http::{
    HeaderMap, HeaderName, HeaderValue,
    header::{InvalidHeaderValue, SET_COOKIE},
    request::Parts,
};

use crate::middleware::{CookieSigner, RequestCookies};

/// Output channel of a request
///
/// Headers written here by resolvers are merged into the HTTP response once
/// execution finishes. Clones share the same header map.
#[derive(Debug, Clone, Default)]
pub struct ResponseHandle {
    headers: Arc<Mutex<HeaderMap>>,
}

impl ResponseHandle {
    /// Create an empty response handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a response header, replacing earlier values
    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        self.lock().insert(name, value);
    }

    /// Add a response header, keeping earlier values
    pub fn append_header(&self, name: HeaderName, value: HeaderValue) {
        self.lock().append(name, value);
    }

    /// Add a `Set-Cookie` header
    ///
    /// `attributes` is appended verbatim after the name/value pair, for example
    /// `"Path=/; HttpOnly"`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHeaderValue` if the cookie contains characters not
    /// allowed in a header.
    pub fn set_cookie(
        &self,
        name: &str,
        value: &str,
        attributes: &str,
    ) -> Result<(), InvalidHeaderValue> {
        let mut cookie = format!("{name}={}", urlencoding::encode(value));
        if !attributes.is_empty() {
            cookie.push_str("; ");
            cookie.push_str(attributes);
        }
        self.append_header(SET_COOKIE, HeaderValue::from_str(&cookie)?);
        Ok(())
    }

    /// Take the headers written so far
    pub fn take_headers(&self) -> HeaderMap {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HeaderMap> {
        self.headers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Context value attached to every GraphQL execution
///
/// Holds the request's input channel (method, URI, headers and extensions set
/// by the pipeline) and its output channel. A fresh context is built for every
/// request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request: Arc<Parts>,
    response: ResponseHandle,
}

impl RequestContext {
    /// Build the context for one request
    pub fn new(request: Parts, response: ResponseHandle) -> Self {
        Self {
            request: Arc::new(request),
            response,
        }
    }

    /// The incoming request, without its body
    pub fn request(&self) -> &Parts {
        &self.request
    }

    /// The response handle
    pub fn response(&self) -> &ResponseHandle {
        &self.response
    }

    /// Cookies parsed by the pipeline
    pub fn cookies(&self) -> Option<&RequestCookies> {
        self.request.extensions.get::<RequestCookies>()
    }

    /// Set a cookie signed with the process secret
    ///
    /// # Errors
    ///
    /// Returns `InvalidHeaderValue` if the cookie cannot be encoded as a header.
    /// Does nothing when the request did not pass through the cookie stage.
    pub fn set_signed_cookie(
        &self,
        name: &str,
        value: &str,
        attributes: &str,
    ) -> Result<(), InvalidHeaderValue> {
        match self.request.extensions.get::<CookieSigner>() {
            Some(signer) => self.response.set_cookie(name, &signer.sign(value), attributes),
            None => Ok(()),
        }
    }
}

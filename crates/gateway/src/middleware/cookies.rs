// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Cookie parsing stage
//!
//! Parses the `Cookie` header into [`RequestCookies`]. Two value encodings are
//! understood on top of plain strings:
//!
//! - signed values, `s:<value>.<signature>`, where the signature is the
//!   unpadded base64 HMAC-SHA256 of `<value>` under the process secret;
//! - JSON values, `j:<json>`.
//!
//! Signed cookies that fail verification are dropped. This stage never rejects
//! a request.

use std::{collections::BTreeMap, fmt, sync::Arc};

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::COOKIE},
    middleware::Next,
    response::Response,
};
use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;

use super::{PipelineStage, StageProbe};
use crate::config::CookieSecret;

type HmacSha256 = Hmac<Sha256>;

const SIGNED_PREFIX: &str = "s:";
const JSON_PREFIX: &str = "j:";

/// Signs and verifies cookie values with the process secret
#[derive(Clone)]
pub struct CookieSigner {
    secret: Arc<[u8]>,
}

impl CookieSigner {
    /// Create a signer for the given secret
    pub fn new(secret: &CookieSecret) -> Self {
        Self {
            secret: Arc::from(secret.as_bytes()),
        }
    }

    fn mac(&self) -> HmacSha256 {
        #[allow(clippy::expect_used)]
        HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length")
    }

    /// Produce the signed form `s:<value>.<signature>`
    pub fn sign(&self, value: &str) -> String {
        let mut mac = self.mac();
        mac.update(value.as_bytes());
        let signature = STANDARD_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{SIGNED_PREFIX}{value}.{signature}")
    }

    /// Verify a signed value, returning the original value if the signature matches
    ///
    /// Returns `None` for values that are not in signed form or whose signature
    /// does not match.
    pub fn verify(&self, signed: &str) -> Option<String> {
        let payload = signed.strip_prefix(SIGNED_PREFIX)?;
        let (value, signature) = payload.rsplit_once('.')?;
        let signature = STANDARD_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac();
        mac.update(value.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(value.to_string())
    }
}

impl fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieSigner").finish_non_exhaustive()
    }
}

/// Cookies sent with a request, split into plain and verified signed cookies
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestCookies {
    plain: BTreeMap<String, Value>,
    signed: BTreeMap<String, Value>,
}

impl RequestCookies {
    /// Parse a set of `Cookie` headers
    ///
    /// The first occurrence of a cookie name wins.
    pub fn parse(headers: &HeaderMap, signer: &CookieSigner) -> Self {
        let mut cookies = Self::default();
        let mut seen = std::collections::HashSet::new();

        let pairs = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|header| header.to_str().ok())
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| pair.split_once('='));

        for (name, raw) in pairs {
            let name = name.trim();
            if name.is_empty() || !seen.insert(name.to_string()) {
                continue;
            }

            let value = decode(raw.trim());
            if value.starts_with(SIGNED_PREFIX) {
                match signer.verify(&value) {
                    Some(verified) => {
                        cookies.signed.insert(name.to_string(), json_value(verified));
                    }
                    None => debug!(cookie = %name, "dropping cookie with invalid signature"),
                }
            } else {
                cookies.plain.insert(name.to_string(), json_value(value));
            }
        }
        cookies
    }

    /// Plain cookie by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.plain.get(name)
    }

    /// Verified signed cookie by name
    pub fn get_signed(&self, name: &str) -> Option<&Value> {
        self.signed.get(name)
    }

    /// All plain cookies
    pub fn plain(&self) -> &BTreeMap<String, Value> {
        &self.plain
    }

    /// All verified signed cookies
    pub fn signed(&self) -> &BTreeMap<String, Value> {
        &self.signed
    }

    /// Whether the request carried no usable cookies
    pub fn is_empty(&self) -> bool {
        self.plain.is_empty() && self.signed.is_empty()
    }
}

fn decode(raw: &str) -> String {
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(raw);
    urlencoding::decode(unquoted).map_or_else(|_| unquoted.to_string(), |v| v.into_owned())
}

fn json_value(value: String) -> Value {
    match value.strip_prefix(JSON_PREFIX) {
        Some(json) => serde_json::from_str(json).unwrap_or(Value::String(value)),
        None => Value::String(value),
    }
}

/// State for the cookie stage
#[derive(Debug, Clone)]
pub struct CookieStage {
    pub(super) signer: CookieSigner,
    pub(super) probe: Option<StageProbe>,
}

/// Parse cookies into request extensions
///
/// Inserts [`RequestCookies`] and the [`CookieSigner`] so that resolvers can
/// read cookies and issue signed ones.
pub async fn parse_cookies(
    State(stage): State<CookieStage>,
    mut req: Request,
    next: Next,
) -> Response {
    super::enter(stage.probe.as_ref(), PipelineStage::Cookies);

    let cookies = RequestCookies::parse(req.headers(), &stage.signer);
    debug!(
        plain = cookies.plain.len(),
        signed = cookies.signed.len(),
        "parsed request cookies"
    );

    req.extensions_mut().insert(cookies);
    req.extensions_mut().insert(stage.signer);
    next.run(req).await
}

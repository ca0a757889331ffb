//! Signed request construction: path templates, percent-encoding, common
//! query parameters, and the HMAC-SHA256 request signature.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE as BASE64_URL;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::Sha256;
use url::Url;

use crate::config::Config;
use crate::error::Error;
use crate::telemetry::TelemetryManager;

type HmacSha256 = Hmac<Sha256>;

const SDK_AGENT: &str = concat!("PubNub-Rust/", env!("CARGO_PKG_VERSION"));

/// Everything outside RFC 3986 unreserved characters is percent-encoded,
/// both in path segments and query values.
const ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Characters the service reserves inside channel and group names. Names
/// containing them are rejected at the API boundary rather than encoded.
const RESERVED_IN_NAMES: [char; 5] = [',', '/', ':', '*', '.'];

pub(crate) fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, ENCODE_SET).to_string()
}

/// Comma-joined, individually encoded channel list for a path segment.
/// An empty list renders as `","` (the all-groups subscription form).
pub(crate) fn join_channels(channels: &[String]) -> String {
    if channels.is_empty() {
        ",".to_string()
    } else {
        channels
            .iter()
            .map(|c| encode(c))
            .collect::<Vec<_>>()
            .join(",")
    }
}

pub(crate) fn validate_names(names: &[String], what: &str) -> Result<(), Error> {
    for name in names {
        if name.is_empty() {
            return Err(Error::Validation(format!("empty {what} name")));
        }
        if let Some(bad) = name.chars().find(|c| RESERVED_IN_NAMES.contains(c)) {
            return Err(Error::Validation(format!(
                "{what} name {name:?} contains reserved character {bad:?}"
            )));
        }
    }
    Ok(())
}

/// One outgoing request before the common parameters and signature are
/// attached. `path` segments must already be encoded.
pub(crate) struct RequestSpec {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
    pub auth_required: bool,
}

impl RequestSpec {
    pub(crate) fn new(path: String) -> Self {
        Self {
            path,
            query: Vec::new(),
            body: None,
            auth_required: true,
        }
    }

    pub(crate) fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub(crate) fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach the common parameters (`uuid`, `pnsdk`, `auth`, telemetry) and,
    /// when a secret key is configured, the request signature; then assemble
    /// the final URL.
    pub(crate) fn finalize(
        mut self,
        config: &Config,
        auth_key: Option<&str>,
        telemetry: &TelemetryManager,
    ) -> Result<Url, Error> {
        self.query.push(("uuid".into(), config.uuid.clone()));
        self.query.push(("pnsdk".into(), SDK_AGENT.into()));
        if let Some(auth) = auth_key.or(config.auth_key.as_deref()) {
            if !auth.is_empty() {
                self.query.push(("auth".into(), auth.to_string()));
            }
        }
        self.query.extend(telemetry.query_params());

        let query = canonical_query(&self.query);
        let query = match &config.secret_key {
            Some(secret) if self.auth_required => {
                let signature = sign(config, secret, &self.path, &query)?;
                format!("{query}&signature={signature}")
            }
            _ => query,
        };

        let url = format!(
            "{}://{}{}?{query}",
            config.scheme(),
            config.origin,
            self.path
        );
        Ok(Url::parse(&url)?)
    }
}

/// Keys sorted lexicographically, values encoded with `+` → `%20` semantics
/// (our encode set always yields `%20` for spaces).
fn canonical_query(params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();
    sorted
        .iter()
        .map(|(k, v)| format!("{k}={}", encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// HMAC-SHA256 over `sub_key\npub_key\npath\nquery`, url-safe base64.
fn sign(config: &Config, secret: &str, path: &str, query: &str) -> Result<String, Error> {
    let input = format!(
        "{}\n{}\n{}\n{}",
        config.subscribe_key, config.publish_key, path, query
    );
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| Error::Validation("secret key is not a valid HMAC key".into()))?;
    mac.update(input.as_bytes());
    Ok(BASE64_URL.encode(mac.finalize().into_bytes()))
}

//! Publish a message to one channel.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;

use crate::client::ClientRef;
use crate::error::Error;
use crate::request::{RequestSpec, encode, validate_names};
use crate::types::Operation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResponse {
    /// Timetoken assigned by the server to the published message.
    pub timetoken: u64,
}

pub struct Publish {
    client: Arc<ClientRef>,
    channel: String,
    message: Option<Value>,
    store: Option<bool>,
    ttl: Option<u32>,
    meta: Option<Value>,
    use_post: bool,
}

impl Publish {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        Self {
            client,
            channel: String::new(),
            message: None,
            store: None,
            ttl: None,
            meta: None,
            use_post: false,
        }
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn message(mut self, message: impl Into<Value>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Whether the server stores the message for history. Defaults to the
    /// key-level setting when unset.
    pub fn should_store(mut self, store: bool) -> Self {
        self.store = Some(store);
        self
    }

    /// Per-message time to live in storage, hours.
    pub fn ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Metadata the stream filter can match on.
    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Send the message in a POST body instead of the URL path.
    pub fn use_post(mut self, use_post: bool) -> Self {
        self.use_post = use_post;
        self
    }

    pub async fn execute(self) -> Result<PublishResponse, Error> {
        if self.client.config.publish_key.is_empty() {
            return Err(Error::Validation("publish key is missing".into()));
        }
        validate_names(std::slice::from_ref(&self.channel), "channel")?;
        let message = self
            .message
            .ok_or_else(|| Error::Validation("publish needs a message".into()))?;

        let mut payload = serde_json::to_string(&message)?;
        if let Some(cipher) = &self.client.cipher {
            // The whole serialized message is encrypted and sent as a JSON
            // string; subscribers reverse this transparently.
            payload = serde_json::to_string(&Value::String(cipher.encrypt(payload.as_bytes())))?;
        }

        let base = format!(
            "/publish/{}/{}/0/{}/0",
            encode(&self.client.config.publish_key),
            encode(&self.client.config.subscribe_key),
            encode(&self.channel),
        );
        let mut spec = if self.use_post {
            RequestSpec::new(base).with_body(payload)
        } else {
            RequestSpec::new(format!("{base}/{}", encode(&payload)))
        };
        if let Some(store) = self.store {
            spec = spec.with_query("store", if store { "1" } else { "0" });
        }
        if let Some(ttl) = self.ttl {
            spec = spec.with_query("ttl", ttl.to_string());
        }
        if let Some(meta) = &self.meta {
            spec = spec.with_query("meta", meta.to_string());
        }

        let method = if self.use_post { Method::POST } else { Method::GET };
        let response = self
            .client
            .execute_json(Operation::Publish, method, spec)
            .await?;
        parse_publish_response(&response)
    }
}

/// Wire shape: `[1, "Sent", "<timetoken>"]`.
fn parse_publish_response(response: &Value) -> Result<PublishResponse, Error> {
    let entries = response
        .as_array()
        .ok_or_else(|| Error::MalformedResponse("publish response is not an array".into()))?;
    match entries.first().and_then(Value::as_i64) {
        Some(1) => {}
        _ => {
            let detail = entries
                .get(1)
                .and_then(Value::as_str)
                .unwrap_or("publish rejected");
            return Err(Error::MalformedResponse(detail.to_string()));
        }
    }
    let timetoken = entries
        .get(2)
        .and_then(Value::as_str)
        .and_then(|t| t.parse::<u64>().ok())
        .ok_or_else(|| Error::MalformedResponse("publish response has no timetoken".into()))?;
    Ok(PublishResponse { timetoken })
}

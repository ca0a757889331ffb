//! Fetch stored messages for one channel.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;

use crate::client::ClientRef;
use crate::crypto::Cipher;
use crate::envelope::decrypt_payload;
use crate::error::Error;
use crate::request::{RequestSpec, encode, validate_names};
use crate::types::Operation;

const MAX_COUNT: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryMessage {
    pub message: Value,
    /// Present when the entry carried a `{timetoken, message}` envelope.
    pub timetoken: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryResponse {
    pub messages: Vec<HistoryMessage>,
    pub start_timetoken: u64,
    pub end_timetoken: u64,
}

pub struct History {
    client: Arc<ClientRef>,
    channel: String,
    count: Option<usize>,
    reverse: bool,
    include_timetoken: bool,
    start: Option<u64>,
    end: Option<u64>,
}

impl History {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        Self {
            client,
            channel: String::new(),
            count: None,
            reverse: false,
            include_timetoken: false,
            start: None,
            end: None,
        }
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Number of messages to return; clamped to 1..=100, default 100.
    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn include_timetoken(mut self, include: bool) -> Self {
        self.include_timetoken = include;
        self
    }

    pub fn start(mut self, start: u64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn end(mut self, end: u64) -> Self {
        self.end = Some(end);
        self
    }

    pub async fn execute(self) -> Result<HistoryResponse, Error> {
        validate_names(std::slice::from_ref(&self.channel), "channel")?;

        let count = self.count.unwrap_or(MAX_COUNT).clamp(1, MAX_COUNT);
        let path = format!(
            "/v2/history/sub-key/{}/channel/{}",
            encode(&self.client.config.subscribe_key),
            encode(&self.channel),
        );
        let mut spec = RequestSpec::new(path)
            .with_query("count", count.to_string())
            .with_query("reverse", if self.reverse { "true" } else { "false" })
            .with_query(
                "include_token",
                if self.include_timetoken { "true" } else { "false" },
            );
        if let Some(start) = self.start {
            spec = spec.with_query("start", start.to_string());
        }
        if let Some(end) = self.end {
            spec = spec.with_query("end", end.to_string());
        }

        let response = self
            .client
            .execute_json(Operation::History, Method::GET, spec)
            .await?;
        parse_history_response(response, self.client.cipher.as_ref())
    }
}

/// Wire shape: `[[entries...], start_timetoken, end_timetoken]` where each
/// entry is either a raw payload or a `{timetoken, message}` envelope.
fn parse_history_response(
    response: Value,
    cipher: Option<&Cipher>,
) -> Result<HistoryResponse, Error> {
    let Value::Array(mut parts) = response else {
        return Err(Error::MalformedResponse(
            "history response is not an array".into(),
        ));
    };
    if parts.len() != 3 {
        return Err(Error::MalformedResponse(format!(
            "history response has {} elements, expected 3",
            parts.len()
        )));
    }
    let end_timetoken = timetoken_from(&parts[2])?;
    let start_timetoken = timetoken_from(&parts[1])?;
    let Value::Array(entries) = parts.swap_remove(0) else {
        return Err(Error::MalformedResponse(
            "history message list is not an array".into(),
        ));
    };

    let messages = entries
        .into_iter()
        .map(|entry| decode_entry(entry, cipher))
        .collect();
    Ok(HistoryResponse {
        messages,
        start_timetoken,
        end_timetoken,
    })
}

fn decode_entry(entry: Value, cipher: Option<&Cipher>) -> HistoryMessage {
    match entry {
        // Envelope form; the cipher applies to the inner message.
        Value::Object(mut map)
            if map.contains_key("timetoken") && map.contains_key("message") =>
        {
            let timetoken = map.get("timetoken").and_then(Value::as_u64);
            let message = map.remove("message").unwrap_or(Value::Null);
            HistoryMessage {
                message: apply_cipher(message, cipher),
                timetoken,
            }
        }
        other => HistoryMessage {
            message: apply_cipher(other, cipher),
            timetoken: None,
        },
    }
}

fn apply_cipher(value: Value, cipher: Option<&Cipher>) -> Value {
    match cipher {
        // Undecryptable entries are delivered raw, same as the subscribe path.
        Some(cipher) => decrypt_payload(value, cipher, false).0,
        None => value,
    }
}

fn timetoken_from(value: &Value) -> Result<u64, Error> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| Error::MalformedResponse("history timetoken is not a number".into()))
}

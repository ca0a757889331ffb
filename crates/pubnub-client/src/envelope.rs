//! Subscribe response decoding: typed events out of the wire envelope
//! format, with payload decryption and presence normalization applied.
//!
//! Decoding is pure and total: malformed input yields a `decoding-error`
//! status (top-level) or per-envelope status events, never a panic.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::crypto::Cipher;
use crate::error::Error;
use crate::types::{
    Cursor, MessageEvent, Operation, PresenceAction, PresenceEvent, Status, StatusCategory,
};

pub(crate) const PRESENCE_SUFFIX: &str = "-pnpres";

/// One decoded poll: the advanced cursor plus the events to broadcast, in
/// envelope order.
#[derive(Debug)]
pub(crate) struct DecodedPoll {
    pub cursor: Cursor,
    pub events: Vec<PollEvent>,
}

#[derive(Debug)]
pub(crate) enum PollEvent {
    Message(MessageEvent),
    Presence(PresenceEvent),
    Status(Status),
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    t: WireCursor,
    #[serde(default)]
    m: Vec<WireEnvelope>,
}

#[derive(Debug, Deserialize)]
struct WireCursor {
    t: String,
    #[serde(default)]
    r: i32,
}

#[derive(Debug, Deserialize)]
struct WireEnvelope {
    /// Publisher uuid.
    #[serde(default)]
    i: Option<String>,
    /// Origin cursor (publish position).
    #[serde(default)]
    p: Option<WireOrigin>,
    /// Channel the message was delivered on.
    c: String,
    /// Subscription source: empty or equal to `c` for a direct channel
    /// subscription, otherwise the channel-group name.
    #[serde(default)]
    b: Option<String>,
    /// User payload, arbitrary JSON shape.
    d: Value,
    /// Publisher-attached metadata.
    #[serde(default)]
    u: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireOrigin {
    #[serde(default)]
    t: Option<String>,
}

impl WireCursor {
    fn parse(&self) -> Result<Cursor, Error> {
        let timetoken = self
            .t
            .parse::<u64>()
            .map_err(|_| Error::MalformedResponse(format!("bad timetoken {:?}", self.t)))?;
        Ok(Cursor::new(timetoken, self.r))
    }
}

pub(crate) fn decode_subscribe_response(
    body: &str,
    cipher: Option<&Cipher>,
    disable_pn_other: bool,
) -> Result<DecodedPoll, Error> {
    let wire: WireResponse = serde_json::from_str(body)?;
    let cursor = wire.t.parse()?;

    let mut events = Vec::with_capacity(wire.m.len());
    for envelope in wire.m {
        decode_envelope(envelope, cursor, cipher, disable_pn_other, &mut events);
    }
    Ok(DecodedPoll { cursor, events })
}

/// Best-effort cursor recovery from a body that failed full decoding, so a
/// bad batch can be skipped without rewinding to `(0, 0)`.
pub(crate) fn extract_cursor(body: &str) -> Option<Cursor> {
    #[derive(Deserialize)]
    struct CursorOnly {
        t: WireCursor,
    }
    serde_json::from_str::<CursorOnly>(body)
        .ok()
        .and_then(|c| c.t.parse().ok())
}

fn decode_envelope(
    envelope: WireEnvelope,
    response_cursor: Cursor,
    cipher: Option<&Cipher>,
    disable_pn_other: bool,
    events: &mut Vec<PollEvent>,
) {
    let is_presence = envelope.c.ends_with(PRESENCE_SUFFIX);
    let channel = strip_presence(&envelope.c);
    let subscription = envelope
        .b
        .as_deref()
        .filter(|b| !b.is_empty() && *b != envelope.c)
        .map(strip_presence);

    if is_presence {
        match decode_presence(&envelope.d, channel.clone(), subscription) {
            Ok(event) => events.push(PollEvent::Presence(event)),
            Err(e) => {
                warn!(channel = %channel, error = %e, "dropping malformed presence envelope");
                events.push(PollEvent::Status(
                    Status::new(StatusCategory::DecodingError, Operation::Subscribe)
                        .with_error(e.to_string())
                        .with_affected(vec![channel], Vec::new()),
                ));
            }
        }
        return;
    }

    let (payload, decryption_failed) = match cipher {
        Some(cipher) => decrypt_payload(envelope.d, cipher, disable_pn_other),
        None => (envelope.d, false),
    };
    if decryption_failed {
        events.push(PollEvent::Status(
            Status::new(StatusCategory::DecryptionError, Operation::Subscribe)
                .with_error("payload could not be decrypted, delivering raw")
                .with_affected(vec![channel.clone()], Vec::new()),
        ));
    }

    let timetoken = envelope
        .p
        .and_then(|p| p.t)
        .and_then(|t| t.parse::<u64>().ok())
        .unwrap_or(response_cursor.timetoken);

    events.push(PollEvent::Message(MessageEvent {
        channel,
        subscription,
        timetoken,
        publisher: envelope.i,
        payload,
        user_metadata: envelope.u,
    }));
}

fn strip_presence(name: &str) -> String {
    name.strip_suffix(PRESENCE_SUFFIX).unwrap_or(name).to_string()
}

fn decode_presence(
    payload: &Value,
    channel: String,
    subscription: Option<String>,
) -> Result<PresenceEvent, Error> {
    let object = payload
        .as_object()
        .ok_or_else(|| Error::MalformedResponse("presence payload is not an object".into()))?;
    let action = object
        .get("action")
        .and_then(Value::as_str)
        .and_then(PresenceAction::parse)
        .ok_or_else(|| Error::MalformedResponse("unknown presence action".into()))?;
    Ok(PresenceEvent {
        channel,
        subscription,
        action,
        uuid: object.get("uuid").and_then(Value::as_str).map(String::from),
        occupancy: object.get("occupancy").and_then(Value::as_u64).unwrap_or(0),
        timestamp: object.get("timestamp").and_then(Value::as_u64).unwrap_or(0),
        state: object.get("data").cloned(),
    })
}

/// Apply the cipher to a decoded payload.
///
/// String payloads are decrypted wholesale and the plaintext re-parsed as
/// JSON. Object payloads carrying a string `pn_other` field get only that
/// field decrypted in place. The returned flag reports a decryption failure;
/// the raw payload is still delivered.
pub(crate) fn decrypt_payload(
    payload: Value,
    cipher: &Cipher,
    disable_pn_other: bool,
) -> (Value, bool) {
    match payload {
        Value::String(data) => match cipher.decrypt(&data) {
            Ok(plain) => (parse_plaintext(&plain), false),
            Err(_) => (Value::String(data), true),
        },
        Value::Object(mut map) => {
            if disable_pn_other {
                return (Value::Object(map), false);
            }
            let Some(Value::String(other)) = map.get("pn_other") else {
                return (Value::Object(map), false);
            };
            match cipher.decrypt(other) {
                Ok(plain) => {
                    map.insert("pn_other".to_string(), parse_plaintext(&plain));
                    (Value::Object(map), false)
                }
                Err(_) => (Value::Object(map), true),
            }
        }
        other => (other, false),
    }
}

/// Decrypted bytes are usually JSON; fall back to a literal string.
fn parse_plaintext(plain: &[u8]) -> Value {
    serde_json::from_slice(plain)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(plain).into_owned()))
}

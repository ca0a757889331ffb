//! Access-manager grant: apply read/write/manage permissions to channels,
//! channel groups, and auth keys. Requires the secret key.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::Method;
use serde_json::Value;

use crate::client::ClientRef;
use crate::error::Error;
use crate::request::{RequestSpec, encode};
use crate::types::Operation;

/// TTL bounds in minutes; 0 applies the grant indefinitely.
const MAX_TTL_MINUTES: i64 = 525_600;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyPermissions {
    pub read: bool,
    pub write: bool,
    pub manage: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPermissions {
    pub read: bool,
    pub write: bool,
    pub manage: bool,
    pub ttl: u64,
    /// Per-auth-key permissions; authoritative over the entity-level flags.
    pub auth_keys: HashMap<String, KeyPermissions>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrantResponse {
    pub level: String,
    pub subscribe_key: String,
    pub ttl: u64,
    /// Subkey-wide flags, present on subkey-level grants.
    pub read_enabled: bool,
    pub write_enabled: bool,
    pub manage_enabled: bool,
    pub channels: HashMap<String, EntityPermissions>,
    pub channel_groups: HashMap<String, EntityPermissions>,
}

pub struct Grant {
    client: Arc<ClientRef>,
    read: bool,
    write: bool,
    manage: bool,
    ttl: Option<i64>,
    auth_keys: Vec<String>,
    channels: Vec<String>,
    groups: Vec<String>,
}

impl Grant {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        Self {
            client,
            read: false,
            write: false,
            manage: false,
            ttl: None,
            auth_keys: Vec::new(),
            channels: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    pub fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    pub fn manage(mut self, manage: bool) -> Self {
        self.manage = manage;
        self
    }

    /// Grant validity in minutes (1..=525600); 0 grants indefinitely.
    /// Server default is 1440 when unset.
    pub fn ttl(mut self, ttl: i64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn auth_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auth_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels.extend(channels.into_iter().map(Into::into));
        self
    }

    pub fn channel_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    pub async fn execute(self) -> Result<GrantResponse, Error> {
        let config = &self.client.config;
        if config.publish_key.is_empty() {
            return Err(Error::Validation("publish key is missing".into()));
        }
        if config.secret_key.as_deref().unwrap_or("").is_empty() {
            return Err(Error::Validation("grant requires a secret key".into()));
        }
        if let Some(ttl) = self.ttl {
            if !(0..=MAX_TTL_MINUTES).contains(&ttl) {
                return Err(Error::Validation(format!(
                    "ttl must be within 0..={MAX_TTL_MINUTES} minutes, got {ttl}"
                )));
            }
        }

        let path = format!(
            "/v1/auth/grant/sub-key/{}",
            encode(&config.subscribe_key)
        );
        let mut spec = RequestSpec::new(path)
            .with_query("r", if self.read { "1" } else { "0" })
            .with_query("w", if self.write { "1" } else { "0" })
            .with_query("m", if self.manage { "1" } else { "0" })
            .with_query("timestamp", unix_timestamp().to_string());
        if !self.auth_keys.is_empty() {
            spec = spec.with_query("auth", self.auth_keys.join(","));
        }
        if !self.channels.is_empty() {
            spec = spec.with_query("channel", self.channels.join(","));
        }
        if !self.groups.is_empty() {
            spec = spec.with_query("channel-group", self.groups.join(","));
        }
        if let Some(ttl) = self.ttl {
            spec = spec.with_query("ttl", ttl.to_string());
        }

        let response = self
            .client
            .execute_json(Operation::Grant, Method::GET, spec)
            .await?;
        parse_grant_response(&response)
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn parse_grant_response(response: &Value) -> Result<GrantResponse, Error> {
    let payload = response
        .get("payload")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::MalformedResponse("grant response has no payload".into()))?;

    let payload_ttl = payload.get("ttl").and_then(Value::as_u64).unwrap_or(0);
    let mut resp = GrantResponse {
        level: string_field(payload.get("level")),
        subscribe_key: string_field(payload.get("subscribe_key")),
        ttl: payload_ttl,
        read_enabled: flag(payload.get("r")),
        write_enabled: flag(payload.get("w")),
        manage_enabled: flag(payload.get("m")),
        ..GrantResponse::default()
    };

    // Modern shape: maps keyed by entity name.
    if let Some(channels) = payload.get("channels").and_then(Value::as_object) {
        for (name, value) in channels {
            resp.channels
                .insert(name.clone(), parse_entity(value, payload_ttl));
        }
    }
    if let Some(groups) = payload.get("channel-groups").and_then(Value::as_object) {
        for (name, value) in groups {
            resp.channel_groups
                .insert(name.clone(), parse_entity(value, payload_ttl));
        }
    }

    // Legacy single-entity shape: a bare name with the auth keys at the
    // payload level.
    let legacy_auths = payload.get("auths").and_then(Value::as_object);
    if let Some(name) = payload.get("channel").and_then(Value::as_str) {
        let mut entity = EntityPermissions {
            ttl: payload_ttl,
            ..EntityPermissions::default()
        };
        if let Some(auths) = legacy_auths {
            entity.auth_keys = parse_auth_keys(auths);
        }
        resp.channels.insert(name.to_string(), entity);
    }
    if let Some(name) = payload.get("channel-groups").and_then(Value::as_str) {
        let mut entity = EntityPermissions {
            ttl: payload_ttl,
            ..EntityPermissions::default()
        };
        if let Some(auths) = legacy_auths {
            entity.auth_keys = parse_auth_keys(auths);
        }
        resp.channel_groups.insert(name.to_string(), entity);
    }

    Ok(resp)
}

fn parse_entity(value: &Value, payload_ttl: u64) -> EntityPermissions {
    let mut entity = EntityPermissions {
        read: flag(value.get("r")),
        write: flag(value.get("w")),
        manage: flag(value.get("m")),
        ttl: value.get("ttl").and_then(Value::as_u64).unwrap_or(payload_ttl),
        ..EntityPermissions::default()
    };
    if let Some(auths) = value.get("auths").and_then(Value::as_object) {
        entity.auth_keys = parse_auth_keys(auths);
    }
    entity
}

fn parse_auth_keys(auths: &serde_json::Map<String, Value>) -> HashMap<String, KeyPermissions> {
    auths
        .iter()
        .map(|(key, value)| {
            (
                key.clone(),
                KeyPermissions {
                    read: flag(value.get("r")),
                    write: flag(value.get("w")),
                    manage: flag(value.get("m")),
                },
            )
        })
        .collect()
}

fn flag(value: Option<&Value>) -> bool {
    value.and_then(Value::as_u64) == Some(1)
}

fn string_field(value: Option<&Value>) -> String {
    value.and_then(Value::as_str).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_channel_map_with_auth_keys() {
        let body = json!({
            "status": 200,
            "service": "Access Manager",
            "payload": {
                "level": "user",
                "subscribe_key": "sub_key",
                "ttl": 1440,
                "channels": {
                    "ch": {
                        "r": 0,
                        "w": 0,
                        "m": 0,
                        "auths": {"pam-key": {"r": 1, "w": 1, "m": 0}}
                    }
                }
            }
        });
        let resp = parse_grant_response(&body).unwrap();
        assert_eq!(resp.level, "user");
        assert_eq!(resp.subscribe_key, "sub_key");
        assert_eq!(resp.ttl, 1440);
        let entity = &resp.channels["ch"];
        assert!(!entity.read && !entity.write && !entity.manage);
        assert_eq!(entity.ttl, 1440);
        let key = &entity.auth_keys["pam-key"];
        assert_eq!(
            *key,
            KeyPermissions {
                read: true,
                write: true,
                manage: false
            }
        );
    }

    #[test]
    fn round_trips_flags_and_ttl() {
        let body = json!({
            "payload": {
                "level": "channel",
                "subscribe_key": "sub_key",
                "ttl": 5,
                "channels": {
                    "a": {"r": 1, "w": 0, "m": 1, "ttl": 7},
                    "b": {"r": 0, "w": 1, "m": 0}
                }
            }
        });
        let resp = parse_grant_response(&body).unwrap();
        let a = &resp.channels["a"];
        assert!(a.read && !a.write && a.manage);
        assert_eq!(a.ttl, 7);
        let b = &resp.channels["b"];
        assert!(!b.read && b.write && !b.manage);
        assert_eq!(b.ttl, 5); // falls back to the payload ttl
    }

    #[test]
    fn parses_group_map() {
        let body = json!({
            "payload": {
                "level": "channel-group+auth",
                "subscribe_key": "sub_key",
                "ttl": 60,
                "channel-groups": {
                    "cg": {"r": 1, "w": 0, "m": 1, "auths": {"key-1": {"r": 1, "w": 0, "m": 0}}}
                }
            }
        });
        let resp = parse_grant_response(&body).unwrap();
        let cg = &resp.channel_groups["cg"];
        assert!(cg.read && cg.manage);
        assert!(cg.auth_keys["key-1"].read);
        assert!(!cg.auth_keys["key-1"].write);
    }

    #[test]
    fn parses_legacy_bare_string_shapes() {
        let body = json!({
            "payload": {
                "level": "user",
                "subscribe_key": "sub_key",
                "ttl": 10,
                "channel": "single-ch",
                "auths": {"key-a": {"r": 1, "w": 1, "m": 1}}
            }
        });
        let resp = parse_grant_response(&body).unwrap();
        let entity = &resp.channels["single-ch"];
        assert_eq!(entity.ttl, 10);
        assert!(entity.auth_keys["key-a"].manage);

        let body = json!({
            "payload": {
                "level": "channel-group",
                "subscribe_key": "sub_key",
                "ttl": 20,
                "channel-groups": "legacy-cg",
                "auths": {"key-b": {"r": 0, "w": 1, "m": 0}}
            }
        });
        let resp = parse_grant_response(&body).unwrap();
        let entity = &resp.channel_groups["legacy-cg"];
        assert_eq!(entity.ttl, 20);
        assert!(entity.auth_keys["key-b"].write);
    }

    #[test]
    fn parses_subkey_level_flags() {
        let body = json!({
            "payload": {
                "level": "subkey",
                "subscribe_key": "sub_key",
                "ttl": 0,
                "r": 1,
                "w": 1,
                "m": 0
            }
        });
        let resp = parse_grant_response(&body).unwrap();
        assert!(resp.read_enabled && resp.write_enabled && !resp.manage_enabled);
        assert_eq!(resp.ttl, 0);
        assert!(resp.channels.is_empty());
    }

    #[test]
    fn missing_payload_is_an_error() {
        assert!(parse_grant_response(&json!({"status": 200})).is_err());
    }
}

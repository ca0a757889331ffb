//! Presence operations: occupancy queries, per-uuid state, and the leave
//! announcement issued on unsubscribe.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::warn;

use crate::client::ClientRef;
use crate::error::Error;
use crate::request::{RequestSpec, encode, join_channels, validate_names};
use crate::types::Operation;

#[derive(Debug, Clone, PartialEq)]
pub struct Occupant {
    pub uuid: String,
    pub state: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelOccupancy {
    pub name: String,
    pub occupancy: u64,
    pub occupants: Vec<Occupant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HereNowResponse {
    pub total_channels: u64,
    pub total_occupancy: u64,
    pub channels: Vec<ChannelOccupancy>,
}

pub struct HereNow {
    client: Arc<ClientRef>,
    channels: Vec<String>,
    groups: Vec<String>,
    include_uuids: bool,
    include_state: bool,
}

impl HereNow {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        Self {
            client,
            channels: Vec::new(),
            groups: Vec::new(),
            include_uuids: true,
            include_state: false,
        }
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

    pub fn include_uuids(mut self, include: bool) -> Self {
        self.include_uuids = include;
        self
    }

    pub fn include_state(mut self, include: bool) -> Self {
        self.include_state = include;
        self
    }

    pub async fn execute(self) -> Result<HereNowResponse, Error> {
        validate_names(&self.channels, "channel")?;
        validate_names(&self.groups, "channel group")?;

        let sub_key = encode(&self.client.config.subscribe_key);
        let path = if self.channels.is_empty() && self.groups.is_empty() {
            // Global here-now across the subscribe key.
            format!("/v2/presence/sub-key/{sub_key}")
        } else {
            format!(
                "/v2/presence/sub-key/{sub_key}/channel/{}",
                join_channels(&self.channels)
            )
        };
        let mut spec = RequestSpec::new(path);
        if !self.groups.is_empty() {
            spec = spec.with_query("channel-group", self.groups.join(","));
        }
        if !self.include_uuids {
            spec = spec.with_query("disable-uuids", "1");
        }
        if self.include_state {
            spec = spec.with_query("state", "1");
        }

        let response = self
            .client
            .execute_json(Operation::HereNow, Method::GET, spec)
            .await?;
        parse_here_now_response(&response, &self.channels)
    }
}

fn parse_here_now_response(
    response: &Value,
    requested: &[String],
) -> Result<HereNowResponse, Error> {
    // Multi-channel shape: counts and a channel map under `payload`.
    if let Some(payload) = response.get("payload").and_then(Value::as_object) {
        let mut channels = Vec::new();
        if let Some(map) = payload.get("channels").and_then(Value::as_object) {
            for (name, value) in map {
                channels.push(ChannelOccupancy {
                    name: name.clone(),
                    occupancy: value.get("occupancy").and_then(Value::as_u64).unwrap_or(0),
                    occupants: parse_occupants(value.get("uuids")),
                });
            }
        }
        return Ok(HereNowResponse {
            total_channels: payload
                .get("total_channels")
                .and_then(Value::as_u64)
                .unwrap_or(channels.len() as u64),
            total_occupancy: payload
                .get("total_occupancy")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            channels,
        });
    }

    // Single-channel shape: occupancy and uuids at the top level.
    let occupancy = response
        .get("occupancy")
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::MalformedResponse("here-now response has no occupancy".into()))?;
    let name = requested.first().cloned().unwrap_or_default();
    Ok(HereNowResponse {
        total_channels: 1,
        total_occupancy: occupancy,
        channels: vec![ChannelOccupancy {
            name,
            occupancy,
            occupants: parse_occupants(response.get("uuids")),
        }],
    })
}

/// Occupant entries are bare uuid strings, or objects once state is included.
fn parse_occupants(uuids: Option<&Value>) -> Vec<Occupant> {
    let Some(Value::Array(entries)) = uuids else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(uuid) => Some(Occupant {
                uuid: uuid.clone(),
                state: None,
            }),
            Value::Object(map) => Some(Occupant {
                uuid: map.get("uuid").and_then(Value::as_str)?.to_string(),
                state: map.get("state").cloned(),
            }),
            _ => None,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhereNowResponse {
    pub channels: Vec<String>,
}

pub struct WhereNow {
    client: Arc<ClientRef>,
    uuid: Option<String>,
}

impl WhereNow {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        Self { client, uuid: None }
    }

    /// Query a different uuid; defaults to this client's uuid.
    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub async fn execute(self) -> Result<WhereNowResponse, Error> {
        let uuid = self.uuid.as_deref().unwrap_or(&self.client.config.uuid);
        let path = format!(
            "/v2/presence/sub-key/{}/uuid/{}",
            encode(&self.client.config.subscribe_key),
            encode(uuid),
        );
        let response = self
            .client
            .execute_json(Operation::WhereNow, Method::GET, RequestSpec::new(path))
            .await?;
        let channels = response
            .get("payload")
            .and_then(|p| p.get("channels"))
            .and_then(Value::as_array)
            .ok_or_else(|| Error::MalformedResponse("where-now response has no channels".into()))?
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect();
        Ok(WhereNowResponse { channels })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetStateResponse {
    /// State echoed back by the server.
    pub state: Value,
}

pub struct SetState {
    client: Arc<ClientRef>,
    channels: Vec<String>,
    groups: Vec<String>,
    state: Option<Value>,
}

impl SetState {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        Self {
            client,
            channels: Vec::new(),
            groups: Vec::new(),
            state: None,
        }
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

    pub fn state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    pub async fn execute(self) -> Result<SetStateResponse, Error> {
        if self.channels.is_empty() && self.groups.is_empty() {
            return Err(Error::Validation(
                "set-state needs at least one channel or channel group".into(),
            ));
        }
        validate_names(&self.channels, "channel")?;
        validate_names(&self.groups, "channel group")?;
        let state = self
            .state
            .ok_or_else(|| Error::Validation("set-state needs a state value".into()))?;

        let path = format!(
            "/v2/presence/sub-key/{}/channel/{}/uuid/{}/data",
            encode(&self.client.config.subscribe_key),
            join_channels(&self.channels),
            encode(&self.client.config.uuid),
        );
        let mut spec = RequestSpec::new(path).with_query("state", state.to_string());
        if !self.groups.is_empty() {
            spec = spec.with_query("channel-group", self.groups.join(","));
        }

        let response = self
            .client
            .execute_json(Operation::SetState, Method::GET, spec)
            .await?;
        let echoed = response
            .get("payload")
            .cloned()
            .ok_or_else(|| Error::MalformedResponse("set-state response has no payload".into()))?;

        // Cache it so subsequent subscribes and heartbeats announce the same
        // state.
        self.client.state.merge_presence_state(
            self.channels.iter().chain(self.groups.iter()),
            &state,
        );
        Ok(SetStateResponse { state: echoed })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetStateResponse {
    /// State keyed by channel name.
    pub channels: HashMap<String, Value>,
}

pub struct GetState {
    client: Arc<ClientRef>,
    channels: Vec<String>,
    groups: Vec<String>,
    uuid: Option<String>,
}

impl GetState {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        Self {
            client,
            channels: Vec::new(),
            groups: Vec::new(),
            uuid: None,
        }
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

    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub async fn execute(self) -> Result<GetStateResponse, Error> {
        if self.channels.is_empty() && self.groups.is_empty() {
            return Err(Error::Validation(
                "get-state needs at least one channel or channel group".into(),
            ));
        }
        validate_names(&self.channels, "channel")?;
        validate_names(&self.groups, "channel group")?;

        let uuid = self.uuid.as_deref().unwrap_or(&self.client.config.uuid);
        let path = format!(
            "/v2/presence/sub-key/{}/channel/{}/uuid/{}",
            encode(&self.client.config.subscribe_key),
            join_channels(&self.channels),
            encode(uuid),
        );
        let mut spec = RequestSpec::new(path);
        if !self.groups.is_empty() {
            spec = spec.with_query("channel-group", self.groups.join(","));
        }

        let response = self
            .client
            .execute_json(Operation::GetState, Method::GET, spec)
            .await?;
        let payload = response
            .get("payload")
            .ok_or_else(|| Error::MalformedResponse("get-state response has no payload".into()))?;

        // Multi-channel responses nest states under `channels`; single
        // channel responses are the state itself.
        let channels = match payload.get("channels").and_then(Value::as_object) {
            Some(map) => map
                .iter()
                .map(|(name, state)| (name.clone(), state.clone()))
                .collect(),
            None => {
                let name = self.channels.first().cloned().unwrap_or_default();
                HashMap::from([(name, payload.clone())])
            }
        };
        Ok(GetStateResponse { channels })
    }
}

/// Fire-and-forget presence leave for names dropped from the subscription.
/// Failures are logged; nothing is delivered to listeners.
pub(crate) fn spawn_leave(client: Arc<ClientRef>, channels: Vec<String>, groups: Vec<String>) {
    tokio::spawn(async move {
        let path = format!(
            "/v2/presence/sub-key/{}/channel/{}/leave",
            encode(&client.config.subscribe_key),
            join_channels(&channels),
        );
        let mut spec = RequestSpec::new(path);
        if !groups.is_empty() {
            spec = spec.with_query("channel-group", groups.join(","));
        }
        if let Err(e) = client
            .execute_json(Operation::Leave, Method::GET, spec)
            .await
        {
            warn!(error = %e, "presence leave failed");
        }
    });
}

//! Channel-group registry edits: add/remove member channels, list, delete.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;

use crate::client::ClientRef;
use crate::error::Error;
use crate::request::{RequestSpec, encode, validate_names};
use crate::types::Operation;

fn group_path(client: &ClientRef, group: &str) -> String {
    format!(
        "/v1/channel-registration/sub-key/{}/channel-group/{}",
        encode(&client.config.subscribe_key),
        encode(group),
    )
}

fn validate_group(group: &str) -> Result<(), Error> {
    validate_names(std::slice::from_ref(&group.to_string()), "channel group")
}

pub struct AddChannelToChannelGroup {
    client: Arc<ClientRef>,
    channels: Vec<String>,
    group: String,
}

impl AddChannelToChannelGroup {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        Self {
            client,
            channels: Vec::new(),
            group: String::new(),
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

    pub fn channel_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub async fn execute(self) -> Result<(), Error> {
        validate_group(&self.group)?;
        validate_names(&self.channels, "channel")?;
        if self.channels.is_empty() {
            return Err(Error::Validation("no channels to add".into()));
        }
        let spec = RequestSpec::new(group_path(&self.client, &self.group))
            .with_query("add", self.channels.join(","));
        self.client
            .execute_json(Operation::AddChannelsToChannelGroup, Method::GET, spec)
            .await?;
        Ok(())
    }
}

pub struct RemoveChannelFromChannelGroup {
    client: Arc<ClientRef>,
    channels: Vec<String>,
    group: String,
}

impl RemoveChannelFromChannelGroup {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        Self {
            client,
            channels: Vec::new(),
            group: String::new(),
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

    pub fn channel_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub async fn execute(self) -> Result<(), Error> {
        validate_group(&self.group)?;
        validate_names(&self.channels, "channel")?;
        if self.channels.is_empty() {
            return Err(Error::Validation("no channels to remove".into()));
        }
        let spec = RequestSpec::new(group_path(&self.client, &self.group))
            .with_query("remove", self.channels.join(","));
        self.client
            .execute_json(Operation::RemoveChannelsFromChannelGroup, Method::GET, spec)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelGroupListResponse {
    pub group: String,
    pub channels: Vec<String>,
}

pub struct ListChannelsInChannelGroup {
    client: Arc<ClientRef>,
    group: String,
}

impl ListChannelsInChannelGroup {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        Self {
            client,
            group: String::new(),
        }
    }

    pub fn channel_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub async fn execute(self) -> Result<ChannelGroupListResponse, Error> {
        validate_group(&self.group)?;
        let spec = RequestSpec::new(group_path(&self.client, &self.group));
        let response = self
            .client
            .execute_json(Operation::ListChannelsInChannelGroup, Method::GET, spec)
            .await?;
        let payload = response
            .get("payload")
            .ok_or_else(|| Error::MalformedResponse("group list response has no payload".into()))?;
        let channels = payload
            .get("channels")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::MalformedResponse("group list has no channels".into()))?
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect();
        let group = payload
            .get("group")
            .and_then(Value::as_str)
            .unwrap_or(&self.group)
            .to_string();
        Ok(ChannelGroupListResponse { group, channels })
    }
}

pub struct DeleteChannelGroup {
    client: Arc<ClientRef>,
    group: String,
}

impl DeleteChannelGroup {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        Self {
            client,
            group: String::new(),
        }
    }

    pub fn channel_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub async fn execute(self) -> Result<(), Error> {
        validate_group(&self.group)?;
        let spec = RequestSpec::new(format!(
            "{}/remove",
            group_path(&self.client, &self.group)
        ));
        self.client
            .execute_json(Operation::DeleteChannelGroup, Method::GET, spec)
            .await?;
        Ok(())
    }
}

//! Subscribe / unsubscribe builders. These mutate subscription state and
//! return immediately; the subscribe loop picks the change up via the
//! topology signal and tears down the in-flight long-poll.

use std::sync::Arc;

use crate::client::ClientRef;
use crate::error::Error;
use crate::ops::presence;
use crate::request::validate_names;
use crate::types::{Cursor, Operation, Status, StatusCategory};

pub struct Subscribe {
    client: Arc<ClientRef>,
    channels: Vec<String>,
    groups: Vec<String>,
    with_presence: bool,
    timetoken: Option<u64>,
}

impl Subscribe {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        Self {
            client,
            channels: Vec::new(),
            groups: Vec::new(),
            with_presence: false,
            timetoken: None,
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

    /// Also subscribe the presence siblings of the given names.
    pub fn with_presence(mut self, with_presence: bool) -> Self {
        self.with_presence = with_presence;
        self
    }

    /// Restore the stream position before subscribing (catch-up).
    pub fn timetoken(mut self, timetoken: u64) -> Self {
        self.timetoken = Some(timetoken);
        self
    }

    pub fn execute(self) -> Result<(), Error> {
        if self.channels.is_empty() && self.groups.is_empty() {
            return Err(Error::Validation(
                "subscribe needs at least one channel or channel group".into(),
            ));
        }
        validate_names(&self.channels, "channel")?;
        validate_names(&self.groups, "channel group")?;

        if let Some(timetoken) = self.timetoken {
            self.client.state.set_cursor(Cursor::new(timetoken, 0));
        }
        let delta = self
            .client
            .state
            .add(&self.channels, &self.groups, self.with_presence);
        if delta.is_empty() {
            // Nothing new, but the call still restarts a halted loop.
            self.client.state.touch();
        }
        Ok(())
    }
}

pub struct Unsubscribe {
    client: Arc<ClientRef>,
    channels: Vec<String>,
    groups: Vec<String>,
}

impl Unsubscribe {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        Self {
            client,
            channels: Vec::new(),
            groups: Vec::new(),
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

    pub fn execute(self) -> Result<(), Error> {
        validate_names(&self.channels, "channel")?;
        validate_names(&self.groups, "channel group")?;

        let delta = self.client.state.remove(&self.channels, &self.groups);
        if delta.is_empty() {
            self.client.state.touch();
            return Ok(());
        }

        // Removal itself is silent per channel; one acknowledgment covers
        // the whole call.
        self.client.listeners.broadcast_status(
            &Status::new(StatusCategory::Acknowledgment, Operation::Unsubscribe).with_affected(
                delta.removed_channels.clone(),
                delta.removed_groups.clone(),
            ),
        );
        presence::spawn_leave(
            Arc::clone(&self.client),
            delta.removed_channels,
            delta.removed_groups,
        );
        Ok(())
    }
}

pub struct UnsubscribeAll {
    client: Arc<ClientRef>,
}

impl UnsubscribeAll {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        Self { client }
    }

    pub fn execute(self) -> Result<(), Error> {
        let delta = self.client.state.remove_all();
        if delta.is_empty() {
            self.client.state.touch();
            return Ok(());
        }

        self.client.listeners.broadcast_status(
            &Status::new(StatusCategory::Cancelled, Operation::Unsubscribe).with_affected(
                delta.removed_channels.clone(),
                delta.removed_groups.clone(),
            ),
        );
        presence::spawn_leave(
            Arc::clone(&self.client),
            delta.removed_channels,
            delta.removed_groups,
        );
        Ok(())
    }
}

//! Client façade: owns the shared state, spawns the subscribe loop and the
//! heartbeat scheduler, and hands out operation builders.

use std::sync::Arc;

use reqwest::Method;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::Config;
use crate::crypto::Cipher;
use crate::error::Error;
use crate::heartbeat::{HeartbeatTask, run_heartbeat};
use crate::listener::{Listener, ListenerRegistry};
use crate::ops;
use crate::request::RequestSpec;
use crate::state::SubscriptionState;
use crate::subscribe_loop::{SubscribeLoop, run_subscribe_loop};
use crate::telemetry::TelemetryManager;
use crate::transport::{RequestKind, Transport};
use crate::types::Operation;

/// Handle to one PubNub client instance. Clone is a cheap refcount bump; the
/// background tasks shut down when the last handle is dropped or
/// [`destroy`](Client::destroy) is called.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientRef>,
    _shutdown_guard: Arc<DropGuard>,
}

pub(crate) struct ClientRef {
    pub(crate) config: Config,
    pub(crate) cipher: Option<Cipher>,
    pub(crate) state: Arc<SubscriptionState>,
    pub(crate) listeners: Arc<ListenerRegistry>,
    pub(crate) transport: Transport,
    pub(crate) shutdown: CancellationToken,
}

impl Client {
    /// Validate the configuration and start the background tasks. Must be
    /// called within a Tokio runtime.
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;

        let telemetry = Arc::new(TelemetryManager::new());
        let transport = Transport::new(&config, telemetry)?;
        let state = Arc::new(SubscriptionState::new(
            config.auth_key.clone(),
            config.filter_expression.clone(),
        ));
        let listeners = Arc::new(ListenerRegistry::new());
        let cipher = config
            .cipher_key
            .as_deref()
            .map(|key| Cipher::new(key, config.use_random_iv));
        let shutdown = CancellationToken::new();

        tokio::spawn(run_subscribe_loop(
            SubscribeLoop {
                config: config.clone(),
                cipher: cipher.clone(),
                state: Arc::clone(&state),
                listeners: Arc::clone(&listeners),
                transport: transport.clone(),
            },
            shutdown.clone(),
        ));
        tokio::spawn(run_heartbeat(
            HeartbeatTask {
                config: config.clone(),
                state: Arc::clone(&state),
                listeners: Arc::clone(&listeners),
                transport: transport.clone(),
            },
            shutdown.clone(),
        ));

        Ok(Self {
            inner: Arc::new(ClientRef {
                config,
                cipher,
                state,
                listeners,
                transport,
                shutdown: shutdown.clone(),
            }),
            _shutdown_guard: Arc::new(shutdown.drop_guard()),
        })
    }

    /// Register a listener and return its receiving side.
    pub fn add_listener(&self) -> Listener {
        self.inner.listeners.register()
    }

    /// Remove a listener; it receives no further events.
    pub fn remove_listener(&self, listener: &Listener) {
        self.inner.listeners.remove(listener.id);
    }

    /// Base channel names currently subscribed (presence siblings hidden).
    pub fn subscribed_channels(&self) -> Vec<String> {
        self.inner.state.subscribed_channels()
    }

    /// Channel-group names currently subscribed (presence siblings hidden).
    pub fn subscribed_groups(&self) -> Vec<String> {
        self.inner.state.subscribed_groups()
    }

    /// Replace the server-side stream filter; takes effect on the next poll.
    pub fn set_filter_expression(&self, filter: Option<String>) {
        self.inner.state.set_filter_expression(filter);
    }

    /// Replace the auth key attached to outgoing requests.
    pub fn set_auth_key(&self, auth_key: Option<String>) {
        self.inner.state.set_auth_key(auth_key);
    }

    /// Stop the subscribe loop and heartbeat and drop every listener.
    pub fn destroy(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn subscribe(&self) -> ops::subscribe::Subscribe {
        ops::subscribe::Subscribe::new(Arc::clone(&self.inner))
    }

    pub fn unsubscribe(&self) -> ops::subscribe::Unsubscribe {
        ops::subscribe::Unsubscribe::new(Arc::clone(&self.inner))
    }

    pub fn unsubscribe_all(&self) -> ops::subscribe::UnsubscribeAll {
        ops::subscribe::UnsubscribeAll::new(Arc::clone(&self.inner))
    }

    pub fn publish(&self) -> ops::publish::Publish {
        ops::publish::Publish::new(Arc::clone(&self.inner))
    }

    pub fn history(&self) -> ops::history::History {
        ops::history::History::new(Arc::clone(&self.inner))
    }

    pub fn here_now(&self) -> ops::presence::HereNow {
        ops::presence::HereNow::new(Arc::clone(&self.inner))
    }

    pub fn where_now(&self) -> ops::presence::WhereNow {
        ops::presence::WhereNow::new(Arc::clone(&self.inner))
    }

    pub fn set_state(&self) -> ops::presence::SetState {
        ops::presence::SetState::new(Arc::clone(&self.inner))
    }

    pub fn get_state(&self) -> ops::presence::GetState {
        ops::presence::GetState::new(Arc::clone(&self.inner))
    }

    pub fn grant(&self) -> ops::grant::Grant {
        ops::grant::Grant::new(Arc::clone(&self.inner))
    }

    pub fn add_channel_to_channel_group(&self) -> ops::channel_group::AddChannelToChannelGroup {
        ops::channel_group::AddChannelToChannelGroup::new(Arc::clone(&self.inner))
    }

    pub fn remove_channel_from_channel_group(
        &self,
    ) -> ops::channel_group::RemoveChannelFromChannelGroup {
        ops::channel_group::RemoveChannelFromChannelGroup::new(Arc::clone(&self.inner))
    }

    pub fn list_channels_in_channel_group(
        &self,
    ) -> ops::channel_group::ListChannelsInChannelGroup {
        ops::channel_group::ListChannelsInChannelGroup::new(Arc::clone(&self.inner))
    }

    pub fn delete_channel_group(&self) -> ops::channel_group::DeleteChannelGroup {
        ops::channel_group::DeleteChannelGroup::new(Arc::clone(&self.inner))
    }

    pub fn time(&self) -> ops::time::Time {
        ops::time::Time::new(Arc::clone(&self.inner))
    }
}

impl ClientRef {
    /// Run a one-shot operation and parse the JSON body. Cancellation is
    /// drop-based for one-shot calls: dropping the returned future aborts
    /// the underlying HTTP request; client shutdown aborts it too.
    pub(crate) async fn execute_json(
        &self,
        operation: Operation,
        method: Method,
        mut spec: RequestSpec,
    ) -> Result<serde_json::Value, Error> {
        let body = spec.body.take();
        let auth_key = self.state.snapshot().auth_key;
        let url = spec.finalize(&self.config, auth_key.as_deref(), self.transport.telemetry())?;
        let token = self.shutdown.child_token();
        let text = self
            .transport
            .execute(
                RequestKind::NonSubscribe,
                operation,
                method,
                url,
                body,
                &token,
            )
            .await?;
        Ok(serde_json::from_str(&text)?)
    }
}

use std::time::Duration;

use crate::error::Error;
use crate::reconnect::ReconnectionPolicy;

pub(crate) const DEFAULT_ORIGIN: &str = "ps.pndsn.com";
pub(crate) const DEFAULT_HEARTBEAT_SECONDS: u32 = 300;
pub(crate) const DEFAULT_SUBSCRIBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(310);
pub(crate) const DEFAULT_NON_SUBSCRIBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const DEFAULT_MAXIMUM_RECONNECTION_RETRIES: u32 = 50;

/// Client configuration. Construct with [`Config::new`] and adjust fields
/// before handing it to [`Client::new`](crate::Client::new); the client
/// validates once and the configuration is immutable afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub publish_key: String,
    pub subscribe_key: String,
    /// Enables request signing; required for [`Grant`](crate::Grant).
    pub secret_key: Option<String>,
    /// Client identity; assigned once and stable for the client lifetime.
    pub uuid: String,
    pub auth_key: Option<String>,
    /// Enables AES-256-CBC payload encryption/decryption.
    pub cipher_key: Option<String>,
    /// Per-message random IV prepended to the ciphertext instead of the
    /// legacy fixed IV.
    pub use_random_iv: bool,
    /// Skip in-place decryption of the reserved `pn_other` field.
    pub disable_pn_other_processing: bool,
    /// Server-side stream filter attached to every poll as `filter-expr`.
    pub filter_expression: Option<String>,
    /// Presence timeout announced on subscribe and heartbeat requests.
    pub heartbeat_seconds: u32,
    /// Interval between presence heartbeats; 0 disables the scheduler.
    pub heartbeat_interval: u32,
    pub subscribe_request_timeout: Duration,
    pub non_subscribe_request_timeout: Duration,
    pub connect_timeout: Duration,
    pub maximum_reconnection_retries: u32,
    pub reconnection_policy: ReconnectionPolicy,
    /// Service host. Overridable for tests and private points of presence.
    pub origin: String,
    /// Use https. Disabled only in tests against a local mock.
    pub secure: bool,
}

impl Config {
    pub fn new(publish_key: impl Into<String>, subscribe_key: impl Into<String>) -> Self {
        let heartbeat_seconds = DEFAULT_HEARTBEAT_SECONDS;
        Self {
            publish_key: publish_key.into(),
            subscribe_key: subscribe_key.into(),
            secret_key: None,
            uuid: format!("pn-{}", uuid::Uuid::new_v4()),
            auth_key: None,
            cipher_key: None,
            use_random_iv: false,
            disable_pn_other_processing: false,
            filter_expression: None,
            heartbeat_seconds,
            heartbeat_interval: derived_heartbeat_interval(heartbeat_seconds),
            subscribe_request_timeout: DEFAULT_SUBSCRIBE_REQUEST_TIMEOUT,
            non_subscribe_request_timeout: DEFAULT_NON_SUBSCRIBE_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            maximum_reconnection_retries: DEFAULT_MAXIMUM_RECONNECTION_RETRIES,
            reconnection_policy: ReconnectionPolicy::None,
            origin: DEFAULT_ORIGIN.to_string(),
            secure: true,
        }
    }

    /// Set the presence timeout and re-derive the heartbeat interval.
    pub fn set_heartbeat_seconds(&mut self, seconds: u32) {
        self.heartbeat_seconds = seconds;
        self.heartbeat_interval = derived_heartbeat_interval(seconds);
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.subscribe_key.is_empty() {
            return Err(Error::Validation("subscribe key is missing".into()));
        }
        if self.uuid.is_empty() {
            return Err(Error::Validation("uuid is missing".into()));
        }
        let heartbeat = u64::from(self.heartbeat_seconds.max(self.heartbeat_interval));
        if self.subscribe_request_timeout.as_secs() <= heartbeat {
            return Err(Error::Validation(format!(
                "subscribe request timeout ({}s) must exceed the heartbeat interval ({heartbeat}s)",
                self.subscribe_request_timeout.as_secs(),
            )));
        }
        Ok(())
    }

    pub(crate) fn scheme(&self) -> &'static str {
        if self.secure { "https" } else { "http" }
    }
}

/// The interval the service recommends: half the presence timeout, less one.
fn derived_heartbeat_interval(heartbeat_seconds: u32) -> u32 {
    (heartbeat_seconds / 2).saturating_sub(1)
}

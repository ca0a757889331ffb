//! PubNub realtime client: subscribe engine plus the one-shot REST surface.
//!
//! The core of the crate is a long-running subscribe loop that holds a single
//! long-poll HTTP request open against the PubNub network, rewrites its URL
//! whenever the channel set, authorization, or server cursor changes, and
//! fans decoded messages out to registered listeners without blocking the
//! poller. Around the loop sit an independent presence heartbeat, a bounded
//! reconnection controller, and a payload pipeline (AES-256-CBC decryption,
//! envelope normalization) for heterogeneous message shapes.
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), pubnub_client::Error> {
//! use pubnub_client::{Client, Config};
//!
//! let config = Config::new("demo", "demo");
//! let client = Client::new(config)?;
//! let mut listener = client.add_listener();
//!
//! client.subscribe().channels(["my-channel"]).execute()?;
//!
//! while let Some(message) = listener.message.recv().await {
//!     println!("{}: {}", message.channel, message.payload);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod crypto;
mod envelope;
mod error;
mod heartbeat;
mod listener;
mod ops;
mod reconnect;
mod request;
mod state;
mod subscribe_loop;
mod telemetry;
mod transport;
mod types;

pub use client::Client;
pub use config::Config;
pub use crypto::Cipher;
pub use error::Error;
pub use listener::Listener;
pub use ops::channel_group::{
    AddChannelToChannelGroup, ChannelGroupListResponse, DeleteChannelGroup,
    ListChannelsInChannelGroup, RemoveChannelFromChannelGroup,
};
pub use ops::grant::{EntityPermissions, Grant, GrantResponse, KeyPermissions};
pub use ops::history::{History, HistoryMessage, HistoryResponse};
pub use ops::presence::{
    ChannelOccupancy, GetState, GetStateResponse, HereNow, HereNowResponse, Occupant,
    SetState, SetStateResponse, WhereNow, WhereNowResponse,
};
pub use ops::publish::{Publish, PublishResponse};
pub use ops::subscribe::{Subscribe, Unsubscribe, UnsubscribeAll};
pub use ops::time::{Time, TimeResponse};
pub use reconnect::ReconnectionPolicy;
pub use types::{
    Cursor, MessageEvent, Operation, PresenceAction, PresenceEvent, Status, StatusCategory,
};

//! Public event types delivered to listeners.

use serde_json::Value;

/// Position in the global message stream: server-assigned timetoken plus the
/// region of the serving shard. `(0, 0)` asks the server to start at latest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub timetoken: u64,
    pub region: i32,
}

impl Cursor {
    pub(crate) fn new(timetoken: u64, region: i32) -> Self {
        Self { timetoken, region }
    }

    /// A zero cursor means "no position yet" — the next poll is a handshake.
    pub(crate) fn is_initial(&self) -> bool {
        self.timetoken == 0
    }
}

/// Operation that produced a status event or telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Subscribe,
    Unsubscribe,
    Publish,
    History,
    HereNow,
    WhereNow,
    SetState,
    GetState,
    Grant,
    AddChannelsToChannelGroup,
    RemoveChannelsFromChannelGroup,
    ListChannelsInChannelGroup,
    DeleteChannelGroup,
    Heartbeat,
    Leave,
    Time,
}

impl Operation {
    /// Short key used for the `l_<op>` latency query parameters.
    pub(crate) fn telemetry_key(&self) -> &'static str {
        match self {
            Operation::Subscribe | Operation::Unsubscribe => "sub",
            Operation::Publish => "pub",
            Operation::History => "hist",
            Operation::HereNow
            | Operation::WhereNow
            | Operation::SetState
            | Operation::GetState
            | Operation::Leave => "pres",
            Operation::Grant => "pam",
            Operation::AddChannelsToChannelGroup
            | Operation::RemoveChannelsFromChannelGroup
            | Operation::ListChannelsInChannelGroup
            | Operation::DeleteChannelGroup => "cg",
            Operation::Heartbeat => "hb",
            Operation::Time => "time",
        }
    }
}

/// Category of a status event. Recoverable network faults surface as
/// `UnexpectedDisconnect`/`Timeout` and are retried by the reconnection
/// controller; the rest describe terminal outcomes or acknowledgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    /// First successful handshake for a set of channels/groups.
    Connected,
    /// Successful poll after one or more failed attempts.
    Reconnected,
    /// Clean disconnect (reconnection policy `None` stops after one failure).
    Disconnected,
    /// Recoverable network fault; a retry is scheduled.
    UnexpectedDisconnect,
    /// HTTP 403 from the server.
    AccessDenied,
    /// Request deadline expired.
    Timeout,
    /// HTTP 400 from the server.
    BadRequest,
    /// The retry budget is spent; the loop halts until the next subscribe call.
    ReconnectionAttemptsExhausted,
    /// An in-flight request was torn down on purpose.
    Cancelled,
    /// A fire-and-forget operation completed.
    Acknowledgment,
    /// A payload could not be decrypted; it was delivered raw.
    DecryptionError,
    /// A subscribe response could not be parsed.
    DecodingError,
    /// A presence heartbeat call failed; the poll loop is unaffected.
    HeartbeatFailed,
}

impl StatusCategory {
    /// Whether the subscribe loop treats this category as retryable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StatusCategory::UnexpectedDisconnect | StatusCategory::Timeout
        )
    }
}

/// Status transition delivered on a listener's `status` channel.
#[derive(Debug, Clone)]
pub struct Status {
    pub category: StatusCategory,
    pub operation: Operation,
    pub error: bool,
    pub error_message: Option<String>,
    pub status_code: Option<u16>,
    pub affected_channels: Vec<String>,
    pub affected_groups: Vec<String>,
}

impl Status {
    pub(crate) fn new(category: StatusCategory, operation: Operation) -> Self {
        Self {
            category,
            operation,
            error: false,
            error_message: None,
            status_code: None,
            affected_channels: Vec::new(),
            affected_groups: Vec::new(),
        }
    }

    pub(crate) fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = true;
        self.error_message = Some(message.into());
        self
    }

    pub(crate) fn with_affected(mut self, channels: Vec<String>, groups: Vec<String>) -> Self {
        self.affected_channels = channels;
        self.affected_groups = groups;
        self
    }
}

/// A message received on a subscribed channel or channel group.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// Channel the message was published on.
    pub channel: String,
    /// Channel-group name when the subscription came through a group,
    /// otherwise `None` (direct channel subscription).
    pub subscription: Option<String>,
    /// Publish timetoken.
    pub timetoken: u64,
    /// UUID of the publisher, when the server provided one.
    pub publisher: Option<String>,
    /// Decoded payload; arbitrary JSON shape.
    pub payload: Value,
    /// Metadata attached at publish time.
    pub user_metadata: Option<Value>,
}

/// Presence transition on a channel's presence sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceAction {
    Join,
    Leave,
    Timeout,
    StateChange,
    Interval,
}

impl PresenceAction {
    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "join" => Some(PresenceAction::Join),
            "leave" => Some(PresenceAction::Leave),
            "timeout" => Some(PresenceAction::Timeout),
            "state-change" => Some(PresenceAction::StateChange),
            "interval" => Some(PresenceAction::Interval),
            _ => None,
        }
    }
}

/// Presence event delivered on a listener's `presence` channel. The channel
/// name is the base channel (presence suffix stripped).
#[derive(Debug, Clone)]
pub struct PresenceEvent {
    pub channel: String,
    pub subscription: Option<String>,
    pub action: PresenceAction,
    pub uuid: Option<String>,
    pub occupancy: u64,
    pub timestamp: u64,
    pub state: Option<Value>,
}

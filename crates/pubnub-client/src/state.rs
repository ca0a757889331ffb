//! Subscription state: channel/group sets, the stream cursor, and the
//! topology-changed signal observed by the subscribe loop.
//!
//! Mutators (the public API surface) take the exclusive lock, apply the
//! change, and raise the signal before releasing; readers (the loop, the
//! heartbeat) work from consistent snapshots. The cursor is only advanced by
//! the loop, under a monotonicity guard, between user-initiated restores.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::envelope::PRESENCE_SUFFIX;
use crate::types::Cursor;

/// Channels/groups added or removed by one state mutation. Presence siblings
/// are implied by the flags and never listed separately.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Delta {
    pub added_channels: Vec<String>,
    pub added_groups: Vec<String>,
    pub removed_channels: Vec<String>,
    pub removed_groups: Vec<String>,
}

impl Delta {
    pub(crate) fn is_empty(&self) -> bool {
        self.added_channels.is_empty()
            && self.added_groups.is_empty()
            && self.removed_channels.is_empty()
            && self.removed_groups.is_empty()
    }
}

/// Consistent view of the state for one poll or heartbeat.
#[derive(Debug, Clone, Default)]
pub(crate) struct Snapshot {
    channels: BTreeMap<String, bool>,
    groups: BTreeMap<String, bool>,
    pub cursor: Cursor,
    pub auth_key: Option<String>,
    pub filter_expression: Option<String>,
    pub presence_state: Option<Value>,
}

impl Snapshot {
    pub(crate) fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.groups.is_empty()
    }

    /// Base channel names, presence siblings hidden.
    pub(crate) fn channels(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    pub(crate) fn groups(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    /// Wire-level channel list: base names plus a presence sibling for every
    /// channel the user asked presence for.
    pub(crate) fn wire_channels(&self) -> Vec<String> {
        with_presence_siblings(&self.channels)
    }

    pub(crate) fn wire_groups(&self) -> Vec<String> {
        with_presence_siblings(&self.groups)
    }

    pub(crate) fn is_channel_subscribed(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub(crate) fn is_group_subscribed(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }
}

fn with_presence_siblings(entries: &BTreeMap<String, bool>) -> Vec<String> {
    let mut out = Vec::with_capacity(entries.len() * 2);
    for (name, with_presence) in entries {
        out.push(name.clone());
        if *with_presence {
            out.push(format!("{name}{PRESENCE_SUFFIX}"));
        }
    }
    out
}

#[derive(Debug, Default)]
struct Inner {
    channels: BTreeMap<String, bool>,
    groups: BTreeMap<String, bool>,
    cursor: Cursor,
    auth_key: Option<String>,
    filter_expression: Option<String>,
    presence_state: Option<Value>,
    /// Names added since the last successful poll; announced via a single
    /// `connected` status once the next poll covering them succeeds.
    announce_channels: BTreeSet<String>,
    announce_groups: BTreeSet<String>,
}

pub(crate) struct SubscriptionState {
    inner: RwLock<Inner>,
    topology_tx: watch::Sender<u64>,
    /// Cancellation handle of the in-flight long-poll; tripped by mutators.
    poll_token: RwLock<CancellationToken>,
}

impl SubscriptionState {
    pub(crate) fn new(auth_key: Option<String>, filter_expression: Option<String>) -> Self {
        let (topology_tx, _) = watch::channel(0);
        Self {
            inner: RwLock::new(Inner {
                auth_key,
                filter_expression,
                ..Inner::default()
            }),
            topology_tx,
            poll_token: RwLock::new(CancellationToken::new()),
        }
    }

    /// Receiver for the topology-changed signal.
    pub(crate) fn watch_topology(&self) -> watch::Receiver<u64> {
        self.topology_tx.subscribe()
    }

    /// Install a fresh cancellation handle for the next long-poll. The
    /// returned token is a child of `parent`, so client shutdown also tears
    /// the poll down.
    pub(crate) fn arm_poll(&self, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        *self.poll_token.write().expect("state lock poisoned") = token.clone();
        token
    }

    fn signal_topology_change(&self) {
        self.topology_tx.send_modify(|generation| *generation += 1);
        self.poll_token
            .read()
            .expect("state lock poisoned")
            .cancel();
    }

    pub(crate) fn add(
        &self,
        channels: &[String],
        groups: &[String],
        with_presence: bool,
    ) -> Delta {
        let mut delta = Delta::default();
        {
            let mut inner = self.inner.write().expect("state lock poisoned");
            for name in channels {
                let previous = inner.channels.insert(name.clone(), with_presence);
                if previous.is_none() {
                    delta.added_channels.push(name.clone());
                    inner.announce_channels.insert(name.clone());
                } else if previous != Some(with_presence) {
                    // Presence flag flipped on an existing name: the wire set
                    // changes even though membership does not.
                    delta.added_channels.push(name.clone());
                }
            }
            for name in groups {
                let previous = inner.groups.insert(name.clone(), with_presence);
                if previous.is_none() {
                    delta.added_groups.push(name.clone());
                    inner.announce_groups.insert(name.clone());
                } else if previous != Some(with_presence) {
                    delta.added_groups.push(name.clone());
                }
            }
        }
        if !delta.is_empty() {
            self.signal_topology_change();
        }
        delta
    }

    /// Remove names (and their presence siblings) from the subscription.
    pub(crate) fn remove(&self, channels: &[String], groups: &[String]) -> Delta {
        let mut delta = Delta::default();
        {
            let mut inner = self.inner.write().expect("state lock poisoned");
            for name in channels {
                if inner.channels.remove(name).is_some() {
                    delta.removed_channels.push(name.clone());
                    inner.announce_channels.remove(name);
                }
            }
            for name in groups {
                if inner.groups.remove(name).is_some() {
                    delta.removed_groups.push(name.clone());
                    inner.announce_groups.remove(name);
                }
            }
            if inner.channels.is_empty() && inner.groups.is_empty() {
                inner.cursor = Cursor::default();
            }
        }
        if !delta.is_empty() {
            self.signal_topology_change();
        }
        delta
    }

    pub(crate) fn remove_all(&self) -> Delta {
        let delta;
        {
            let mut inner = self.inner.write().expect("state lock poisoned");
            delta = Delta {
                removed_channels: inner.channels.keys().cloned().collect(),
                removed_groups: inner.groups.keys().cloned().collect(),
                ..Delta::default()
            };
            inner.channels.clear();
            inner.groups.clear();
            inner.announce_channels.clear();
            inner.announce_groups.clear();
            inner.cursor = Cursor::default();
        }
        if !delta.is_empty() {
            self.signal_topology_change();
        }
        delta
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let inner = self.inner.read().expect("state lock poisoned");
        Snapshot {
            channels: inner.channels.clone(),
            groups: inner.groups.clone(),
            cursor: inner.cursor,
            auth_key: inner.auth_key.clone(),
            filter_expression: inner.filter_expression.clone(),
            presence_state: inner.presence_state.clone(),
        }
    }

    /// User-initiated restore; resets the stream position unconditionally.
    pub(crate) fn set_cursor(&self, cursor: Cursor) {
        self.inner.write().expect("state lock poisoned").cursor = cursor;
        self.signal_topology_change();
    }

    /// Loop-internal advance, guarded by monotonicity: a poll response never
    /// moves the cursor backwards.
    pub(crate) fn advance_cursor(&self, cursor: Cursor) {
        let mut inner = self.inner.write().expect("state lock poisoned");
        if cursor.timetoken >= inner.cursor.timetoken {
            inner.cursor = cursor;
        }
    }

    /// Loop-internal reset after a fatal-to-cursor failure. No signal: the
    /// loop itself is the only observer.
    pub(crate) fn reset_cursor(&self) {
        self.inner.write().expect("state lock poisoned").cursor = Cursor::default();
    }

    /// Drop every subscription without signalling; used when the server
    /// denies access and the loop is already parked.
    pub(crate) fn clear_silently(&self) {
        let mut inner = self.inner.write().expect("state lock poisoned");
        inner.channels.clear();
        inner.groups.clear();
        inner.announce_channels.clear();
        inner.announce_groups.clear();
        inner.cursor = Cursor::default();
    }

    /// Stage every currently subscribed name for a fresh `connected`
    /// announcement; used when the loop resumes after a halt.
    pub(crate) fn reannounce_all(&self) {
        let mut inner = self.inner.write().expect("state lock poisoned");
        let channels: Vec<String> = inner.channels.keys().cloned().collect();
        let groups: Vec<String> = inner.groups.keys().cloned().collect();
        inner.announce_channels.extend(channels);
        inner.announce_groups.extend(groups);
    }

    /// Raise the topology signal without changing membership; a subscribe
    /// call that adds nothing new still restarts a halted loop.
    pub(crate) fn touch(&self) {
        self.signal_topology_change();
    }

    /// Names pending a `connected` announcement, drained.
    pub(crate) fn take_announcements(&self) -> (Vec<String>, Vec<String>) {
        let mut inner = self.inner.write().expect("state lock poisoned");
        let channels = std::mem::take(&mut inner.announce_channels);
        let groups = std::mem::take(&mut inner.announce_groups);
        (
            channels.into_iter().collect(),
            groups.into_iter().collect(),
        )
    }

    pub(crate) fn subscribed_channels(&self) -> Vec<String> {
        self.inner
            .read()
            .expect("state lock poisoned")
            .channels
            .keys()
            .cloned()
            .collect()
    }

    pub(crate) fn subscribed_groups(&self) -> Vec<String> {
        self.inner
            .read()
            .expect("state lock poisoned")
            .groups
            .keys()
            .cloned()
            .collect()
    }

    /// Cache presence state for the given names; announced on subsequent
    /// subscribe polls and heartbeats.
    pub(crate) fn merge_presence_state<'a>(
        &self,
        names: impl Iterator<Item = &'a String>,
        state: &Value,
    ) {
        let mut inner = self.inner.write().expect("state lock poisoned");
        let map = inner
            .presence_state
            .get_or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Value::Object(object) = map {
            for name in names {
                object.insert(name.clone(), state.clone());
            }
        }
    }

    pub(crate) fn set_auth_key(&self, auth_key: Option<String>) {
        self.inner.write().expect("state lock poisoned").auth_key = auth_key;
        self.signal_topology_change();
    }

    pub(crate) fn set_filter_expression(&self, filter: Option<String>) {
        self.inner.write().expect("state lock poisoned").filter_expression = filter;
        self.signal_topology_change();
    }
}

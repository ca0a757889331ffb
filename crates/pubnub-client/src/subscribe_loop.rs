//! The subscribe loop: one long-poll at a time, rebuilt from fresh state
//! after every response, cancellation, or topology change.

use std::sync::Arc;

use reqwest::Method;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::crypto::Cipher;
use crate::envelope::{self, PollEvent};
use crate::error::Error;
use crate::listener::ListenerRegistry;
use crate::reconnect::{RetryController, RetryDecision};
use crate::request::{RequestSpec, join_channels};
use crate::state::{Snapshot, SubscriptionState};
use crate::telemetry::TelemetryManager;
use crate::transport::{RequestKind, Transport};
use crate::types::{Operation, Status, StatusCategory};

pub(crate) struct SubscribeLoop {
    pub config: Config,
    pub cipher: Option<Cipher>,
    pub state: Arc<SubscriptionState>,
    pub listeners: Arc<ListenerRegistry>,
    pub transport: Transport,
}

pub(crate) async fn run_subscribe_loop(p: SubscribeLoop, shutdown: CancellationToken) {
    let mut topology = p.state.watch_topology();
    let mut retry = RetryController::new(
        p.config.reconnection_policy,
        p.config.maximum_reconnection_retries,
    );

    loop {
        if shutdown.is_cancelled() {
            return;
        }

        let generation = *topology.borrow_and_update();
        let snapshot = p.state.snapshot();
        if snapshot.is_empty() {
            // Nothing to poll; wait for the next subscribe call.
            if !wait_for_topology(&mut topology, &shutdown).await {
                return;
            }
            retry.reset();
            continue;
        }

        let url = match subscribe_url(&p.config, &snapshot, p.transport.telemetry()) {
            Ok(url) => url,
            Err(e) => {
                emit(&p, status_for_error(&e));
                if !park(&p, &mut topology, &shutdown).await {
                    return;
                }
                retry.reset();
                continue;
            }
        };

        let poll_token = p.state.arm_poll(&shutdown);
        if *topology.borrow() != generation {
            // A mutation slipped in between the snapshot and arming the
            // poll; its cancel hit the previous token, so re-snapshot.
            continue;
        }
        debug!(url = %url, "issuing long-poll");
        let result = p
            .transport
            .execute(
                RequestKind::Subscribe,
                Operation::Subscribe,
                Method::GET,
                url,
                None,
                &poll_token,
            )
            .await;

        match result {
            Ok(body) => match envelope::decode_subscribe_response(
                &body,
                p.cipher.as_ref(),
                p.config.disable_pn_other_processing,
            ) {
                Ok(decoded) => {
                    // The cursor advance must be visible before any listener
                    // observes this response's events.
                    p.state.advance_cursor(decoded.cursor);
                    if retry.is_recovering() {
                        retry.reset();
                        info!("long-poll recovered, reconnected");
                        emit(
                            &p,
                            Status::new(StatusCategory::Reconnected, Operation::Subscribe)
                                .with_affected(snapshot.channels(), snapshot.groups()),
                        );
                    }
                    announce_connected(&p);
                    dispatch(&p, decoded.events);
                }
                Err(e) => {
                    warn!(error = %e, "undecodable subscribe response, skipping batch");
                    emit(
                        &p,
                        Status::new(StatusCategory::DecodingError, Operation::Subscribe)
                            .with_error(e.to_string()),
                    );
                    match envelope::extract_cursor(&body) {
                        Some(cursor) => p.state.advance_cursor(cursor),
                        None => p.state.reset_cursor(),
                    }
                }
            },
            Err(Error::Cancelled) => {
                // Topology changed or the client is shutting down; re-read
                // state and immediately poll the rewritten URL.
                debug!("long-poll cancelled");
            }
            Err(e) if e.is_recoverable() => {
                if e.is_fatal_to_cursor() {
                    p.state.reset_cursor();
                }
                let was_recovering = retry.is_recovering();
                match retry.next() {
                    RetryDecision::Halt => {
                        warn!(error = %e, "long-poll failed, reconnection disabled");
                        emit(
                            &p,
                            Status::new(StatusCategory::Disconnected, Operation::Subscribe)
                                .with_error(e.to_string())
                                .with_affected(snapshot.channels(), snapshot.groups()),
                        );
                        if !park(&p, &mut topology, &shutdown).await {
                            return;
                        }
                        retry.reset();
                    }
                    RetryDecision::Exhausted => {
                        warn!(error = %e, "reconnection attempts exhausted");
                        emit(
                            &p,
                            Status::new(
                                StatusCategory::ReconnectionAttemptsExhausted,
                                Operation::Subscribe,
                            )
                            .with_error(e.to_string())
                            .with_affected(snapshot.channels(), snapshot.groups()),
                        );
                        if !park(&p, &mut topology, &shutdown).await {
                            return;
                        }
                        retry.reset();
                    }
                    RetryDecision::Wait(delay) => {
                        if !was_recovering {
                            emit(
                                &p,
                                status_for_error(&e)
                                    .with_affected(snapshot.channels(), snapshot.groups()),
                            );
                        }
                        warn!(error = %e, delay_secs = delay.as_secs(), "long-poll failed, cooling down");
                        tokio::select! {
                            _ = shutdown.cancelled() => return,
                            _ = tokio::time::sleep(delay) => {}
                            _ = topology.changed() => {}
                        }
                    }
                }
            }
            Err(e) => {
                // Terminal: access denied, bad request, or another 4xx.
                warn!(error = %e, "long-poll rejected");
                let category = e.category();
                emit(
                    &p,
                    Status::new(category, Operation::Subscribe)
                        .with_error(e.to_string())
                        .with_affected(snapshot.channels(), snapshot.groups()),
                );
                if category == StatusCategory::AccessDenied {
                    // The server refused the subscription outright; drop it
                    // so the subscribed sets reflect reality.
                    p.state.clear_silently();
                    continue;
                }
                if !park(&p, &mut topology, &shutdown).await {
                    return;
                }
                retry.reset();
            }
        }
    }
}

/// Wait for the next topology change. Returns `false` on shutdown.
async fn wait_for_topology(
    topology: &mut watch::Receiver<u64>,
    shutdown: &CancellationToken,
) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        changed = topology.changed() => changed.is_ok(),
    }
}

/// Halt until the user mutates the subscription, then stage a fresh
/// `connected` announcement for everything still subscribed.
async fn park(
    p: &SubscribeLoop,
    topology: &mut watch::Receiver<u64>,
    shutdown: &CancellationToken,
) -> bool {
    if !wait_for_topology(topology, shutdown).await {
        return false;
    }
    p.state.reannounce_all();
    true
}

fn status_for_error(e: &Error) -> Status {
    Status::new(e.category(), Operation::Subscribe).with_error(e.to_string())
}

fn emit(p: &SubscribeLoop, status: Status) {
    p.listeners.broadcast_status(&status);
}

/// Emit one `connected` status covering names added since the last
/// successful poll.
fn announce_connected(p: &SubscribeLoop) {
    let (channels, groups) = p.state.take_announcements();
    if channels.is_empty() && groups.is_empty() {
        return;
    }
    info!(?channels, ?groups, "subscription established");
    emit(
        p,
        Status::new(StatusCategory::Connected, Operation::Subscribe)
            .with_affected(channels, groups),
    );
}

/// Broadcast decoded events in envelope order, skipping messages for names
/// the user has since unsubscribed.
fn dispatch(p: &SubscribeLoop, events: Vec<PollEvent>) {
    let snapshot = p.state.snapshot();
    for event in events {
        match event {
            PollEvent::Message(message) => {
                if is_relevant(&snapshot, &message.channel, message.subscription.as_deref()) {
                    p.listeners.broadcast_message(&message);
                }
            }
            PollEvent::Presence(presence) => {
                if is_relevant(&snapshot, &presence.channel, presence.subscription.as_deref()) {
                    p.listeners.broadcast_presence(&presence);
                }
            }
            PollEvent::Status(status) => emit(p, status),
        }
    }
}

fn is_relevant(snapshot: &Snapshot, channel: &str, subscription: Option<&str>) -> bool {
    match subscription {
        Some(group) => snapshot.is_group_subscribed(group),
        None => snapshot.is_channel_subscribed(channel),
    }
}

/// Long-poll URL for the current snapshot.
fn subscribe_url(
    config: &Config,
    snapshot: &Snapshot,
    telemetry: &TelemetryManager,
) -> Result<url::Url, Error> {
    let path = format!(
        "/v2/subscribe/{}/{}/0",
        crate::request::encode(&config.subscribe_key),
        join_channels(&snapshot.wire_channels()),
    );
    let mut spec = RequestSpec::new(path)
        .with_query("tt", snapshot.cursor.timetoken.to_string())
        .with_query("heartbeat", config.heartbeat_seconds.to_string());
    if snapshot.cursor.region != 0 {
        spec = spec.with_query("tr", snapshot.cursor.region.to_string());
    }
    let groups = snapshot.wire_groups();
    if !groups.is_empty() {
        spec = spec.with_query("channel-group", groups.join(","));
    }
    if let Some(filter) = &snapshot.filter_expression {
        spec = spec.with_query("filter-expr", filter.clone());
    }
    if let Some(state) = &snapshot.presence_state {
        spec = spec.with_query("state", state.to_string());
    }
    spec.finalize(config, snapshot.auth_key.as_deref(), telemetry)
}

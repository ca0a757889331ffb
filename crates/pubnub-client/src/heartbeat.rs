//! Presence heartbeat scheduler, independent of the subscribe loop.
//!
//! Ticks every `heartbeat_interval` seconds while at least one channel or
//! group is subscribed. Calls are sequential, so at most one heartbeat is in
//! flight; a tick that fires during an outstanding request is skipped.
//! Failures surface as `heartbeat-failed` status events and never interrupt
//! the poll loop.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Error;
use crate::listener::ListenerRegistry;
use crate::request::{RequestSpec, join_channels};
use crate::state::{Snapshot, SubscriptionState};
use crate::transport::{RequestKind, Transport};
use crate::types::{Operation, Status, StatusCategory};

pub(crate) struct HeartbeatTask {
    pub config: Config,
    pub state: Arc<SubscriptionState>,
    pub listeners: Arc<ListenerRegistry>,
    pub transport: Transport,
}

pub(crate) async fn run_heartbeat(p: HeartbeatTask, shutdown: CancellationToken) {
    let period = Duration::from_secs(u64::from(p.config.heartbeat_interval));
    if period.is_zero() {
        return;
    }
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick of a tokio interval fires immediately; consume it so
    // the first announcement happens one interval after subscribing.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let snapshot = p.state.snapshot();
        if snapshot.is_empty() {
            continue;
        }

        match beat(&p, &snapshot, &shutdown).await {
            Ok(()) => debug!("presence heartbeat sent"),
            Err(Error::Cancelled) => return,
            Err(e) => {
                warn!(error = %e, "presence heartbeat failed");
                p.listeners.broadcast_status(
                    &Status::new(StatusCategory::HeartbeatFailed, Operation::Heartbeat)
                        .with_error(e.to_string())
                        .with_affected(snapshot.channels(), snapshot.groups()),
                );
            }
        }
    }
}

async fn beat(
    p: &HeartbeatTask,
    snapshot: &Snapshot,
    shutdown: &CancellationToken,
) -> Result<(), Error> {
    let path = format!(
        "/v2/presence/sub-key/{}/channel/{}/heartbeat",
        crate::request::encode(&p.config.subscribe_key),
        join_channels(&snapshot.channels()),
    );
    let mut spec = RequestSpec::new(path)
        .with_query("heartbeat", p.config.heartbeat_seconds.to_string());
    let groups = snapshot.groups();
    if !groups.is_empty() {
        spec = spec.with_query("channel-group", groups.join(","));
    }
    if let Some(state) = &snapshot.presence_state {
        spec = spec.with_query("state", state.to_string());
    }
    let url = spec.finalize(
        &p.config,
        snapshot.auth_key.as_deref(),
        p.transport.telemetry(),
    )?;

    let token = shutdown.child_token();
    p.transport
        .execute(
            RequestKind::NonSubscribe,
            Operation::Heartbeat,
            Method::GET,
            url,
            None,
            &token,
        )
        .await?;
    Ok(())
}

//! Per-client latency sampling surfaced as `l_<op>` query parameters.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::Operation;

/// Samples older than this fall out of the window.
const WINDOW: Duration = Duration::from_secs(60);
/// Hard cap per operation kind.
const MAX_SAMPLES: usize = 100;

/// Rolling per-operation latency window. One instance per client; the
/// aggregate average rides along on every outgoing request.
#[derive(Debug, Default)]
pub(crate) struct TelemetryManager {
    samples: Mutex<HashMap<&'static str, VecDeque<(Instant, Duration)>>>,
}

impl TelemetryManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, operation: Operation, latency: Duration) {
        let mut samples = self.samples.lock().expect("telemetry lock poisoned");
        let window = samples.entry(operation.telemetry_key()).or_default();
        window.push_back((Instant::now(), latency));
        while window.len() > MAX_SAMPLES {
            window.pop_front();
        }
    }

    /// Current `(l_<op>, average-seconds)` pairs, pruned to the window and
    /// sorted by key so query strings are deterministic.
    pub(crate) fn query_params(&self) -> Vec<(String, String)> {
        let mut samples = self.samples.lock().expect("telemetry lock poisoned");
        let cutoff = Instant::now().checked_sub(WINDOW);
        let mut params: Vec<(String, String)> = samples
            .iter_mut()
            .filter_map(|(key, window)| {
                if let Some(cutoff) = cutoff {
                    while window.front().is_some_and(|(at, _)| *at < cutoff) {
                        window.pop_front();
                    }
                }
                if window.is_empty() {
                    return None;
                }
                let total: Duration = window.iter().map(|(_, d)| *d).sum();
                let avg = total.as_secs_f64() / window.len() as f64;
                Some((format!("l_{key}"), format!("{avg:.3}")))
            })
            .collect();
        params.sort();
        params
    }
}

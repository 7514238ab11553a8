use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use crossbeam::sync::ShardedLock;
use serde::Serialize;
use serde_json::Value;
use serde_with::skip_serializing_none;
use tracing::{event, Level};

/// Sampling rates above this are clamped.
pub const MAX_SAMPLING_RATE: u64 = 10_000;

pub const CONTEXT_INITIALIZE: &str = "initialize";
pub const CONTEXT_CONFIG_SYNC: &str = "config_sync";

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub key: String,
    pub action: String,
    pub timestamp: i64,
    pub step: Option<String>,
    pub value: Option<Value>,
}

/// Buffers timing markers per context until the host drains them. The
/// store marks `bootstrap`, `download_config_specs`, `get_id_list_sources`
/// and `get_id_list` with `process` / `network_request` steps.
#[derive(Default)]
pub struct Diagnostics {
    markers: Mutex<HashMap<String, Vec<Marker>>>,
    sampling_rates: ShardedLock<HashMap<String, u64>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(
        &self,
        context: &str,
        key: &str,
        action: &str,
        step: Option<&str>,
        value: Option<Value>,
    ) {
        let marker = Marker {
            key: key.to_string(),
            action: action.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            step: step.map(str::to_string),
            value,
        };
        self.markers
            .lock()
            .expect("should always be able to acquire lock")
            .entry(context.to_string())
            .or_default()
            .push(marker);
    }

    /// Drain and emit the markers gathered for one context.
    pub fn log_diagnostics(&self, context: &str) -> Vec<Marker> {
        let markers = self
            .markers
            .lock()
            .expect("should always be able to acquire lock")
            .remove(context)
            .unwrap_or_default();
        if !markers.is_empty() {
            event!(
                Level::DEBUG,
                context = context,
                markers = markers.len(),
                "statsig diagnostics"
            );
        }
        markers
    }

    /// Ingest the sampling-rate map served alongside config specs. Only
    /// numeric values are accepted; everything clamps to
    /// `[0, MAX_SAMPLING_RATE]`.
    pub fn set_sampling_rates(&self, rates: &HashMap<String, Value>) {
        let mut out = HashMap::new();
        for (key, value) in rates {
            if let Some(n) = value.as_f64() {
                let clamped = n.clamp(0.0, MAX_SAMPLING_RATE as f64) as u64;
                out.insert(key.clone(), clamped);
            }
        }
        *self
            .sampling_rates
            .write()
            .expect("should not be poisoned") = out;
    }

    pub fn sampling_rate(&self, key: &str) -> Option<u64> {
        self.sampling_rates
            .read()
            .expect("should not be poisoned")
            .get(key)
            .copied()
    }
}

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::SystemTime,
};

use anyhow::{anyhow, bail, Result};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::{task::JoinHandle, time, time::Duration};
use tracing::{event, Level};

use crate::{
    client_init_response::ClientInitializeResponse,
    evaluator::{models::EvalResult, Evaluator},
    hashing::HashAlgorithm,
    http::StatsigHttpClient,
    models::{
        StatsigConfig, StatsigEvent, StatsigExperiment, StatsigLayer, StatsigOptions, StatsigPost,
        StatsigUser,
    },
    store::SpecStore,
};

const GATE_EXPOSURE_EVENT: &str = "statsig::gate_exposure";
const CONFIG_EXPOSURE_EVENT: &str = "statsig::config_exposure";
const LAYER_EXPOSURE_EVENT: &str = "statsig::layer_exposure";
const MAX_LOG_EVENTS: usize = 950;
const LOGS_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Statsig client that evaluates locally against a periodically synced
/// spec catalog. Evaluation itself never touches the network; only the
/// sync loops and the event flusher do.
pub struct Client {
    http_client: StatsigHttpClient,
    store: Arc<SpecStore>,
    evaluator: Evaluator,
    event_logs: Mutex<Vec<StatsigEvent>>,
    flush_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    pub async fn new(api_key: String, options: StatsigOptions) -> Result<Arc<Self>> {
        let http_client = StatsigHttpClient::new(
            api_key,
            options.api_url.clone(),
            options.api_for_download_config_specs.clone(),
            options.events_url.clone(),
            options.local_mode,
        );
        let store = Arc::new(SpecStore::with_http_client(http_client.clone(), &options));

        match options.init_timeout {
            Some(timeout) => {
                let init_store = store.clone();
                let init = tokio::spawn(async move { init_store.init().await });
                match time::timeout(timeout, init).await {
                    Ok(joined) => joined??,
                    Err(_) => {
                        event!(
                            Level::WARN,
                            "statsig initialize timed out; sync continues in the background"
                        );
                    }
                }
            }
            None => store.init().await?,
        }

        let evaluator = Evaluator::new(store.clone());
        let client = Arc::new(Self {
            http_client,
            store,
            evaluator,
            event_logs: Mutex::new(vec![]),
            flush_handle: Mutex::new(None),
        });

        if !options.local_mode {
            let handle = tokio::spawn(client.clone().background_logs_flush());
            *client
                .flush_handle
                .lock()
                .expect("should always be able to acquire lock") = Some(handle);
        }

        Ok(client)
    }

    pub fn check_gate(self: &Arc<Self>, user: &StatsigUser, gate: &str) -> Result<bool> {
        if user.user_id.is_empty() {
            bail!("statsig: missing user id");
        }
        let result = self.evaluator.check_gate(user, gate);
        let value = result.value;
        self.log_gate_exposure(gate, user, &result);
        Ok(value)
    }

    /// Returns just the config value, parsed into the caller's type.
    pub fn get_dynamic_config<T: DeserializeOwned>(
        self: &Arc<Self>,
        user: &StatsigUser,
        config: &str,
    ) -> Result<T> {
        if user.user_id.is_empty() {
            bail!("statsig: missing user id");
        }
        let mut result = self.evaluator.get_config(user, config);
        let value = result.json_value.take();
        self.log_config_exposure(config, user, &result);
        let value = value.ok_or_else(|| anyhow!("empty config"))?;
        Ok(serde_json::from_value(value)?)
    }

    /// Returns the value, together with the metadata about the group that
    /// matched the check.
    pub fn get_config<T: DeserializeOwned>(
        self: &Arc<Self>,
        user: &StatsigUser,
        config: &str,
    ) -> Result<StatsigConfig<T>> {
        if user.user_id.is_empty() {
            bail!("statsig: missing user id");
        }
        let result = self.evaluator.get_config(user, config);
        let value: Option<T> =
            serde_json::from_value(result.json_value.clone().unwrap_or(Value::Null))?;
        let config = StatsigConfig {
            value,
            name: config.to_string(),
            group_name: result.group_name.clone(),
            rule_id: result.rule_id.clone(),
            group: result.rule_id.clone(),
        };
        self.log_config_exposure(&config.name, user, &result);
        Ok(config)
    }

    /// Like `get_config`, but carries the nested gate checks consulted
    /// during evaluation so experiment analysis can attribute them.
    pub fn get_experiment<T: DeserializeOwned>(
        self: &Arc<Self>,
        user: &StatsigUser,
        experiment: &str,
    ) -> Result<StatsigExperiment<T>> {
        if user.user_id.is_empty() {
            bail!("statsig: missing user id");
        }
        let result = self.evaluator.get_config(user, experiment);
        let value: Option<T> =
            serde_json::from_value(result.json_value.clone().unwrap_or(Value::Null))?;
        let experiment = StatsigExperiment {
            value,
            name: experiment.to_string(),
            group_name: result.group_name.clone(),
            rule_id: result.rule_id.clone(),
            group: result.rule_id.clone(),
            secondary_exposures: result.secondary_exposures.clone(),
        };
        self.log_config_exposure(&experiment.name, user, &result);
        Ok(experiment)
    }

    pub fn get_layer(self: &Arc<Self>, user: &StatsigUser, layer: &str) -> Result<StatsigLayer> {
        if user.user_id.is_empty() {
            bail!("statsig: missing user id");
        }
        let result = self.evaluator.get_layer(user, layer);
        let layer = StatsigLayer {
            name: layer.to_string(),
            rule_id: result.rule_id.clone(),
            group_name: result.group_name.clone(),
            value: result.json_value.clone().unwrap_or_else(|| json!({})),
            allocated_experiment_name: result.config_delegate.clone(),
        };
        self.log_layer_exposure(&layer.name, user, &result);
        Ok(layer)
    }

    /// The whole catalog evaluated for one user, in the client SDK
    /// bootstrap format. None until the store has data.
    pub fn get_client_initialize_response(
        &self,
        user: &StatsigUser,
        hash: HashAlgorithm,
    ) -> Option<ClientInitializeResponse> {
        self.evaluator.get_client_initialize_response(user, hash)
    }

    pub async fn log_event(&self, statsig_post: &StatsigPost) -> Result<()> {
        self.http_client.log_events(statsig_post).await?;
        Ok(())
    }

    pub fn override_gate(&self, gate: &str, value: bool, user_id: Option<&str>) {
        self.evaluator.override_gate(gate, value, user_id);
    }

    pub fn override_config(&self, config: &str, value: Value, user_id: Option<&str>) {
        self.evaluator.override_config(config, value, user_id);
    }

    pub fn override_layer(&self, layer: &str, value: Value, user_id: Option<&str>) {
        self.evaluator.override_layer(layer, value, user_id);
    }

    pub fn clear_all_gate_overrides(&self) {
        self.evaluator.clear_all_gate_overrides();
    }

    pub fn clear_all_config_overrides(&self) {
        self.evaluator.clear_all_config_overrides();
    }

    pub fn clear_all_layer_overrides(&self) {
        self.evaluator.clear_all_layer_overrides();
    }

    /// Safety net for quiesced sync loops; cheap enough to call from the
    /// request path. The forced timers, if any, are logged and returned.
    pub fn reset_sync_timer_if_exited(&self) -> Option<String> {
        let forced = self.store.reset_sync_timer_if_exited();
        if let Some(message) = &forced {
            event!(Level::WARN, "{}", message);
        }
        forced
    }

    /// Direct access to the spec store, for hosts that surface sync
    /// state (init reason, update times) in their own health checks.
    pub fn spec_store(&self) -> Arc<SpecStore> {
        self.store.clone()
    }

    pub async fn shutdown(self: &Arc<Self>) {
        if let Some(handle) = self
            .flush_handle
            .lock()
            .expect("should always be able to acquire lock")
            .take()
        {
            handle.abort();
        }
        self.clone().flush_logs().await;
        self.store.shutdown().await;
    }
}

// Private methods
impl Client {
    async fn background_logs_flush(self: Arc<Self>) {
        let mut interval = time::interval(LOGS_FLUSH_INTERVAL);
        loop {
            interval.tick().await;
            event!(Level::DEBUG, "flushing statsig event logs");
            self.clone().flush_logs().await;
        }
    }

    async fn flush_logs(self: Arc<Self>) {
        let events;
        {
            let mut logs = self
                .event_logs
                .lock()
                .expect("should always be able to acquire lock");
            events = std::mem::take(&mut *logs);
        }

        if !events.is_empty() {
            match self.http_client.log_events(&StatsigPost { events }).await {
                Ok(()) => (),
                Err(e) if e.is_quiet() => (),
                Err(e) => {
                    event!(Level::ERROR, "failed to log events: {}", e);
                }
            }
        }
    }

    fn enqueue_event(self: &Arc<Self>, event: StatsigEvent) {
        let mut events = self
            .event_logs
            .lock()
            .expect("should always be able to acquire lock");
        events.push(event);
        if events.len() >= MAX_LOG_EVENTS {
            drop(events);
            tokio::spawn(self.clone().flush_logs());
        }
    }

    fn log_gate_exposure(
        self: &Arc<Self>,
        gate: &str,
        user: &StatsigUser,
        eval_result: &EvalResult,
    ) {
        let mut metadata = HashMap::from([
            ("gate".to_string(), gate.to_string()),
            ("gateValue".to_string(), eval_result.value.to_string()),
            ("ruleID".to_string(), eval_result.rule_id.clone()),
        ]);
        if let Some(details) = &eval_result.evaluation_details {
            metadata.insert("reason".to_string(), format!("{:?}", details.reason));
        }
        self.enqueue_event(StatsigEvent {
            event_name: GATE_EXPOSURE_EVENT.to_string(),
            value: eval_result.value.to_string(),
            time: unix_timestamp_string(),
            user: user.clone(),
            metadata,
            secondary_exposures: Some(eval_result.secondary_exposures.clone()),
        });
    }

    fn log_config_exposure(
        self: &Arc<Self>,
        config: &str,
        user: &StatsigUser,
        eval_result: &EvalResult,
    ) {
        let mut metadata = HashMap::from([
            ("config".to_string(), config.to_string()),
            ("ruleID".to_string(), eval_result.rule_id.clone()),
        ]);
        if let Some(details) = &eval_result.evaluation_details {
            metadata.insert("reason".to_string(), format!("{:?}", details.reason));
        }
        self.enqueue_event(StatsigEvent {
            event_name: CONFIG_EXPOSURE_EVENT.to_string(),
            value: eval_result.value.to_string(),
            time: unix_timestamp_string(),
            user: user.clone(),
            metadata,
            secondary_exposures: Some(eval_result.secondary_exposures.clone()),
        });
    }

    fn log_layer_exposure(
        self: &Arc<Self>,
        layer: &str,
        user: &StatsigUser,
        eval_result: &EvalResult,
    ) {
        let mut metadata = HashMap::from([
            ("config".to_string(), layer.to_string()),
            ("ruleID".to_string(), eval_result.rule_id.clone()),
            (
                "allocatedExperiment".to_string(),
                eval_result.config_delegate.clone().unwrap_or_default(),
            ),
        ]);
        if let Some(details) = &eval_result.evaluation_details {
            metadata.insert("reason".to_string(), format!("{:?}", details.reason));
        }
        let exposures = eval_result
            .undelegated_secondary_exposures
            .clone()
            .unwrap_or_else(|| eval_result.secondary_exposures.clone());
        self.enqueue_event(StatsigEvent {
            event_name: LAYER_EXPOSURE_EVENT.to_string(),
            value: eval_result.value.to_string(),
            time: unix_timestamp_string(),
            user: user.clone(),
            metadata,
            secondary_exposures: Some(exposures),
        });
    }
}

fn unix_timestamp_string() -> String {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
        .to_string()
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use crossbeam::sync::ShardedLock;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{event, Level};

use crate::data_adapter::{id_list_key, DataAdapter, ID_LISTS_KEY, RULESETS_KEY};
use crate::diagnostics::{Diagnostics, CONTEXT_CONFIG_SYNC, CONTEXT_INITIALIZE};
use crate::errors::StatsigError;
use crate::evaluator::models::{ConfigData, ConfigSpec, EvaluationReason};
use crate::http::StatsigHttpClient;
use crate::id_lists::{self, IdList, IdListMetadata};
use crate::models::{IdListInitStrategy, RulesUpdatedCallback, StatsigMetadata, StatsigOptions};

/// A poller quiet for longer than this (or its own interval, whichever is
/// larger) is considered dead and gets restarted by the watchdog.
pub const SYNC_OUTDATED_MAX: Duration = Duration::from_millis(120_000);

const DEFAULT_RULESETS_SYNC_INTERVAL: Duration = Duration::from_secs(10);
const MIN_RULESETS_SYNC_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_ID_LISTS_SYNC_INTERVAL: Duration = Duration::from_secs(60);
const MIN_ID_LISTS_SYNC_INTERVAL: Duration = Duration::from_secs(30);

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Which source last populated the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitReason {
    Uninitialized,
    Bootstrap,
    DataAdapter,
    Network,
}

impl InitReason {
    pub fn as_evaluation_reason(self) -> EvaluationReason {
        match self {
            InitReason::Uninitialized => EvaluationReason::Uninitialized,
            InitReason::Bootstrap => EvaluationReason::Bootstrap,
            InitReason::DataAdapter => EvaluationReason::DataAdapter,
            InitReason::Network => EvaluationReason::Network,
        }
    }
}

/// One committed generation of the catalog. Updates swap the whole value,
/// so a reader holding an Arc sees gates, configs, layers, the
/// experiment mapping and the timestamp from the same update.
#[derive(Debug, Default)]
pub struct SpecCatalog {
    pub gates: HashMap<String, Arc<ConfigSpec>>,
    pub dynamic_configs: HashMap<String, Arc<ConfigSpec>>,
    pub layers: HashMap<String, Arc<ConfigSpec>>,
    pub experiment_to_layer: HashMap<String, String>,
    pub last_update_time: u64,
}

/// Owns the authoritative spec catalog and the id-list registry, and
/// drives both sync loops.
pub struct SpecStore {
    http: StatsigHttpClient,
    adapter: Option<Arc<dyn DataAdapter>>,
    diagnostics: Arc<Diagnostics>,
    statsig_metadata: StatsigMetadata,

    bootstrap_values: Option<String>,
    local_mode: bool,
    rulesets_interval: Duration,
    id_lists_interval: Duration,
    disable_rulesets_sync: bool,
    disable_id_lists_sync: bool,
    id_list_strategy: IdListInitStrategy,
    rules_updated_callback: Option<RulesUpdatedCallback>,

    catalog: ShardedLock<Arc<SpecCatalog>>,
    id_lists: ShardedLock<HashMap<String, IdList>>,
    init_reason: ShardedLock<InitReason>,
    initial_update_time: AtomicI64,
    sync_failure_count: AtomicU32,
    rulesets_last_active_ms: AtomicI64,
    id_lists_last_active_ms: AtomicI64,
    rulesets_poller: Mutex<Option<JoinHandle<()>>>,
    id_lists_poller: Mutex<Option<JoinHandle<()>>>,
    is_shutdown: AtomicBool,
}

impl SpecStore {
    pub fn new(api_key: &str, options: &StatsigOptions) -> Self {
        let http = StatsigHttpClient::new(
            api_key.to_string(),
            options.api_url.clone(),
            options.api_for_download_config_specs.clone(),
            options.events_url.clone(),
            options.local_mode,
        );
        Self::with_http_client(http, options)
    }

    pub(crate) fn with_http_client(http: StatsigHttpClient, options: &StatsigOptions) -> Self {
        Self {
            http,
            adapter: options.data_adapter.clone(),
            diagnostics: Arc::new(Diagnostics::new()),
            statsig_metadata: StatsigMetadata::new(),
            bootstrap_values: options.bootstrap_values.clone(),
            local_mode: options.local_mode,
            rulesets_interval: options
                .rulesets_sync_interval
                .unwrap_or(DEFAULT_RULESETS_SYNC_INTERVAL)
                .max(MIN_RULESETS_SYNC_INTERVAL),
            id_lists_interval: options
                .id_lists_sync_interval
                .unwrap_or(DEFAULT_ID_LISTS_SYNC_INTERVAL)
                .max(MIN_ID_LISTS_SYNC_INTERVAL),
            disable_rulesets_sync: options.disable_rulesets_sync,
            disable_id_lists_sync: options.disable_id_lists_sync,
            id_list_strategy: options.init_strategy_for_id_lists,
            rules_updated_callback: options.rules_updated_callback.clone(),
            catalog: ShardedLock::new(Arc::new(SpecCatalog::default())),
            id_lists: ShardedLock::new(HashMap::new()),
            init_reason: ShardedLock::new(InitReason::Uninitialized),
            initial_update_time: AtomicI64::new(0),
            sync_failure_count: AtomicU32::new(0),
            rulesets_last_active_ms: AtomicI64::new(now_ms()),
            id_lists_last_active_ms: AtomicI64::new(now_ms()),
            rulesets_poller: Mutex::new(None),
            id_lists_poller: Mutex::new(None),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Seed the store and start the sync loops. Bootstrap values win when
    /// present and no adapter is configured; an adapter always beats
    /// bootstrap. Falls back to the network when neither produced data.
    pub async fn init(self: &Arc<Self>) -> anyhow::Result<()> {
        let mut bootstrapped = false;
        if let Some(bootstrap) = self.bootstrap_values.clone() {
            if self.adapter.is_some() {
                event!(
                    Level::WARN,
                    "both bootstrap values and a data adapter were supplied; ignoring bootstrap"
                );
            } else {
                self.diagnostics
                    .mark(CONTEXT_INITIALIZE, "bootstrap", "start", Some("process"), None);
                match self.sync_bootstrap_values(&bootstrap) {
                    Ok(true) => {
                        self.initial_update_time
                            .store(self.get_last_update_time() as i64, Ordering::SeqCst);
                        bootstrapped = true;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        event!(Level::WARN, "failed to process bootstrap values: {}", e);
                    }
                }
                self.diagnostics.mark(
                    CONTEXT_INITIALIZE,
                    "bootstrap",
                    "end",
                    Some("process"),
                    Some(json!(bootstrapped)),
                );
            }
        }

        if let Some(adapter) = &self.adapter {
            if let Err(e) = adapter.initialize().await {
                event!(Level::ERROR, "failed to initialize data adapter: {}", e);
            }
        }

        if bootstrapped {
            self.start_pollers();
            self.diagnostics.log_diagnostics(CONTEXT_INITIALIZE);
            return Ok(());
        }

        if self.adapter.is_some() {
            if let Err(e) = self.fetch_config_specs_from_adapter().await {
                event!(
                    Level::WARN,
                    "failed to load config specs from data adapter: {}",
                    e
                );
            }
        }
        if self.get_last_update_time() == 0 {
            let _ = self.sync_values(true).await;
        }
        let time = self.get_last_update_time();
        self.initial_update_time
            .store(if time == 0 { -1 } else { time as i64 }, Ordering::SeqCst);

        match self.id_list_strategy {
            IdListInitStrategy::Await => {
                if let Err(e) = self.sync_id_lists().await {
                    if !e.is_quiet() {
                        event!(Level::WARN, "failed initial id list sync: {}", e);
                    }
                }
            }
            IdListInitStrategy::Lazy => {
                let store = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = store.sync_id_lists().await {
                        if !e.is_quiet() {
                            event!(Level::WARN, "failed initial id list sync: {}", e);
                        }
                    }
                });
            }
            IdListInitStrategy::None => {}
        }

        self.start_pollers();
        self.diagnostics.log_diagnostics(CONTEXT_INITIALIZE);
        Ok(())
    }

    /// Parse and install a caller-supplied spec payload.
    pub fn sync_bootstrap_values(&self, payload: &str) -> Result<bool, StatsigError> {
        let updated = self.process_payload_str(payload)?;
        if updated {
            *self.init_reason.write().expect("should not be poisoned") = InitReason::Bootstrap;
        }
        Ok(updated)
    }

    /// One ruleset sync pass. Reads from the adapter when it answers
    /// polling for rulesets, from the network otherwise. Failures are
    /// counted and logged here; cold-start failures log at error level.
    pub async fn sync_values(&self, cold_start: bool) -> Result<(), StatsigError> {
        self.rulesets_last_active_ms.store(now_ms(), Ordering::SeqCst);
        let use_adapter = self
            .adapter
            .as_ref()
            .map(|a| a.supports_polling_updates_for(RULESETS_KEY))
            .unwrap_or(false);
        let result = if use_adapter {
            self.fetch_config_specs_from_adapter().await
        } else {
            self.fetch_config_specs_from_server().await
        };
        let outcome = match result {
            Ok(()) => {
                self.sync_failure_count.store(0, Ordering::SeqCst);
                Ok(())
            }
            Err(e) if e.is_quiet() => Ok(()),
            Err(e) => {
                if cold_start {
                    event!(
                        Level::ERROR,
                        "failed to sync config specs on cold start: {}",
                        e
                    );
                } else {
                    let failures = self.sync_failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                    let failed_for = self.rulesets_interval * failures;
                    if failed_for >= SYNC_OUTDATED_MAX {
                        event!(
                            Level::WARN,
                            "config specs have not synced for at least {:?}: {}",
                            failed_for,
                            e
                        );
                        self.sync_failure_count.store(0, Ordering::SeqCst);
                    }
                }
                Err(e)
            }
        };
        self.diagnostics.log_diagnostics(CONTEXT_CONFIG_SYNC);
        outcome
    }

    async fn fetch_config_specs_from_server(&self) -> Result<(), StatsigError> {
        self.diagnostics.mark(
            CONTEXT_CONFIG_SYNC,
            "download_config_specs",
            "start",
            Some("network_request"),
            None,
        );
        let result = self.http.fetch_config_specs(self.get_last_update_time()).await;
        self.diagnostics.mark(
            CONTEXT_CONFIG_SYNC,
            "download_config_specs",
            "end",
            Some("network_request"),
            Some(json!(result.is_ok())),
        );
        let body = result?;

        self.diagnostics.mark(
            CONTEXT_CONFIG_SYNC,
            "download_config_specs",
            "start",
            Some("process"),
            None,
        );
        let processed = self.process_payload_str(&body);
        self.diagnostics.mark(
            CONTEXT_CONFIG_SYNC,
            "download_config_specs",
            "end",
            Some("process"),
            Some(json!(matches!(processed, Ok(true)))),
        );
        if processed? {
            *self.init_reason.write().expect("should not be poisoned") = InitReason::Network;
            let time = self.get_last_update_time();
            if let Some(callback) = &self.rules_updated_callback {
                callback(&body, time);
            }
            if let Some(adapter) = &self.adapter {
                if let Err(e) = adapter.set(RULESETS_KEY, &body, Some(time)).await {
                    event!(
                        Level::WARN,
                        "failed to store config specs in data adapter: {}",
                        e
                    );
                }
            }
        }
        Ok(())
    }

    async fn fetch_config_specs_from_adapter(&self) -> Result<(), StatsigError> {
        let Some(adapter) = &self.adapter else {
            return Ok(());
        };
        let response = adapter
            .get(RULESETS_KEY)
            .await
            .map_err(|e| StatsigError::Adapter(e.to_string()))?;
        if let Some(error) = response.error {
            return Err(StatsigError::Adapter(error));
        }
        let Some(result) = response.result else {
            return Ok(());
        };
        if self.process_payload_str(&result)? {
            *self.init_reason.write().expect("should not be poisoned") = InitReason::DataAdapter;
        }
        Ok(())
    }

    fn process_payload_str(&self, payload: &str) -> Result<bool, StatsigError> {
        let data: ConfigData =
            serde_json::from_str(payload).map_err(|e| StatsigError::Parse(e.to_string()))?;
        self.process_config_data(data)
    }

    /// Install a parsed payload. Returns Ok(false) when nothing changed
    /// (no updates, or the payload is older than what is already
    /// committed). All four maps and the timestamp move together or not
    /// at all.
    fn process_config_data(&self, data: ConfigData) -> Result<bool, StatsigError> {
        if !data.has_updates {
            return Ok(false);
        }
        let time = data.time.unwrap_or(0);
        if time < self.get_last_update_time() {
            return Ok(false);
        }
        let (Some(gates), Some(configs), Some(layer_configs)) = (
            data.feature_gates,
            data.dynamic_configs,
            data.layer_configs,
        ) else {
            return Err(StatsigError::ConfigConstruction(
                "payload is missing feature_gates, dynamic_configs or layer_configs".to_string(),
            ));
        };

        let gates: HashMap<String, Arc<ConfigSpec>> = gates
            .into_iter()
            .map(|s| (s.name.clone(), Arc::new(s)))
            .collect();
        let dynamic_configs: HashMap<String, Arc<ConfigSpec>> = configs
            .into_iter()
            .map(|s| (s.name.clone(), Arc::new(s)))
            .collect();
        let layers: HashMap<String, Arc<ConfigSpec>> = layer_configs
            .into_iter()
            .map(|s| (s.name.clone(), Arc::new(s)))
            .collect();
        let mut experiment_to_layer = HashMap::new();
        if let Some(layer_map) = data.layers {
            for (layer_name, experiments) in layer_map {
                for experiment in experiments {
                    experiment_to_layer.insert(experiment, layer_name.clone());
                }
            }
        }

        if let Some(rates) = &data.diagnostics {
            self.diagnostics.set_sampling_rates(rates);
        }

        if self.is_shutdown() {
            return Ok(false);
        }
        let mut catalog = self.catalog.write().expect("should not be poisoned");
        if time < catalog.last_update_time {
            return Ok(false);
        }
        *catalog = Arc::new(SpecCatalog {
            gates,
            dynamic_configs,
            layers,
            experiment_to_layer,
            last_update_time: time,
        });
        Ok(true)
    }

    /// One id-list sync pass: refresh the manifest, then stream the byte
    /// ranges each known list is missing.
    pub async fn sync_id_lists(&self) -> Result<(), StatsigError> {
        self.id_lists_last_active_ms.store(now_ms(), Ordering::SeqCst);
        let use_adapter = self
            .adapter
            .as_ref()
            .map(|a| a.supports_polling_updates_for(ID_LISTS_KEY))
            .unwrap_or(false);
        self.diagnostics.mark(
            CONTEXT_CONFIG_SYNC,
            "get_id_list_sources",
            "start",
            Some("network_request"),
            None,
        );
        let manifest: HashMap<String, Value> = if use_adapter {
            let response = self
                .adapter
                .as_ref()
                .expect("adapter checked above")
                .get(ID_LISTS_KEY)
                .await
                .map_err(|e| StatsigError::Adapter(e.to_string()))?;
            match response.result {
                Some(raw) => {
                    serde_json::from_str(&raw).map_err(|e| StatsigError::Parse(e.to_string()))?
                }
                None => HashMap::new(),
            }
        } else {
            let manifest = self.http.fetch_id_list_manifest(&self.statsig_metadata).await?;
            if let Some(adapter) = &self.adapter {
                let raw = serde_json::to_string(&manifest)
                    .map_err(|e| StatsigError::Parse(e.to_string()))?;
                if let Err(e) = adapter.set(ID_LISTS_KEY, &raw, None).await {
                    event!(
                        Level::WARN,
                        "failed to store id list manifest in data adapter: {}",
                        e
                    );
                }
            }
            manifest
        };
        self.diagnostics.mark(
            CONTEXT_CONFIG_SYNC,
            "get_id_list_sources",
            "end",
            Some("network_request"),
            Some(json!(manifest.len())),
        );
        let result = self.process_id_list_manifest(manifest).await;
        self.diagnostics.log_diagnostics(CONTEXT_CONFIG_SYNC);
        result
    }

    async fn process_id_list_manifest(
        &self,
        manifest: HashMap<String, Value>,
    ) -> Result<(), StatsigError> {
        let mut ingested_chunks: Vec<(String, String)> = vec![];
        for (name, entry) in &manifest {
            let Some(meta) = IdListMetadata::from_value(entry) else {
                continue;
            };

            let current = {
                let lists = self.id_lists.read().expect("should not be poisoned");
                lists
                    .get(name)
                    .map(|l| (l.file_id.clone(), l.creation_time, l.read_bytes, l.url.clone()))
            };
            if let Some((_, creation_time, _, _)) = &current {
                if meta.creation_time < *creation_time {
                    continue;
                }
            }

            // A new name or a new file generation starts over from byte 0.
            let needs_reset = match &current {
                None => true,
                Some((file_id, _, _, _)) => *file_id != meta.file_id,
            };
            let (read_bytes, url) = if needs_reset {
                if self.is_shutdown() {
                    return Ok(());
                }
                self.id_lists
                    .write()
                    .expect("should not be poisoned")
                    .insert(
                        name.clone(),
                        IdList::new(
                            name.clone(),
                            meta.url.clone(),
                            meta.file_id.clone(),
                            meta.creation_time,
                        ),
                    );
                (0, meta.url.clone())
            } else {
                let (_, _, read_bytes, url) = current.expect("checked above");
                (read_bytes, url)
            };

            if meta.size <= read_bytes {
                continue;
            }

            self.diagnostics.mark(
                CONTEXT_CONFIG_SYNC,
                "get_id_list",
                "start",
                Some("network_request"),
                None,
            );
            let chunk = self.http.fetch_id_list_chunk(&url, read_bytes).await;
            self.diagnostics.mark(
                CONTEXT_CONFIG_SYNC,
                "get_id_list",
                "end",
                Some("network_request"),
                Some(json!(chunk.is_ok())),
            );
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    if !e.is_quiet() {
                        event!(Level::WARN, "failed to fetch id list {}: {}", name, e);
                    }
                    continue;
                }
            };

            if self.is_shutdown() {
                return Ok(());
            }
            let mut lists = self.id_lists.write().expect("should not be poisoned");
            let Some(content_length) = chunk.content_length else {
                lists.remove(name);
                event!(
                    Level::WARN,
                    "dropping id list {}: response has no content length",
                    name
                );
                continue;
            };
            let mut drop_list = false;
            if let Some(list) = lists.get_mut(name) {
                if list.file_id != meta.file_id {
                    // the list rotated underneath this fetch; let the next
                    // manifest pass re-read it from offset 0
                    continue;
                }
                list.read_bytes += content_length;
                if let Err(e) = id_lists::apply_chunk(list, &chunk.body) {
                    event!(Level::WARN, "{}", e);
                    drop_list = true;
                }
            }
            if drop_list {
                lists.remove(name);
            } else {
                ingested_chunks.push((name.clone(), chunk.body));
            }
        }

        if self.is_shutdown() {
            return Ok(());
        }
        self.id_lists
            .write()
            .expect("should not be poisoned")
            .retain(|name, _| manifest.contains_key(name));

        if let Some(adapter) = &self.adapter {
            for (name, body) in ingested_chunks {
                if let Err(e) = adapter.set(&id_list_key(&name), &body, None).await {
                    event!(
                        Level::WARN,
                        "failed to store id list {} in data adapter: {}",
                        name,
                        e
                    );
                }
            }
        }
        Ok(())
    }

    fn start_pollers(self: &Arc<Self>) {
        if self.local_mode {
            return;
        }
        if !self.disable_rulesets_sync {
            self.restart_rulesets_poller();
        }
        if !self.disable_id_lists_sync {
            self.restart_id_lists_poller();
        }
    }

    fn restart_rulesets_poller(self: &Arc<Self>) {
        let mut slot = self
            .rulesets_poller
            .lock()
            .expect("should always be able to acquire lock");
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        let store = self.clone();
        *slot = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(store.rulesets_interval);
            loop {
                interval.tick().await;
                if store.is_shutdown() {
                    break;
                }
                event!(Level::DEBUG, "refreshing statsig config specs");
                let _ = store.sync_values(false).await;
            }
        }));
    }

    fn restart_id_lists_poller(self: &Arc<Self>) {
        let mut slot = self
            .id_lists_poller
            .lock()
            .expect("should always be able to acquire lock");
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        let store = self.clone();
        *slot = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(store.id_lists_interval);
            loop {
                interval.tick().await;
                if store.is_shutdown() {
                    break;
                }
                event!(Level::DEBUG, "refreshing statsig id lists");
                if let Err(e) = store.sync_id_lists().await {
                    if !e.is_quiet() {
                        event!(Level::WARN, "failed to sync id lists: {}", e);
                    }
                }
            }
        }));
    }

    /// Watchdog for quiesced pollers, safe to call from the request path.
    /// A poller whose last tick is older than
    /// `max(SYNC_OUTDATED_MAX, interval)` is restarted and an immediate
    /// sync is kicked; the returned description says which timers were
    /// forced so the host can log it.
    pub fn reset_sync_timer_if_exited(self: &Arc<Self>) -> Option<String> {
        if self.is_shutdown() {
            return None;
        }
        let now = now_ms();
        let mut forced = vec![];
        if !self.disable_rulesets_sync
            && self.timer_exited(self.rulesets_last_active_ms.load(Ordering::SeqCst), self.rulesets_interval, now)
        {
            self.rulesets_last_active_ms.store(now, Ordering::SeqCst);
            self.restart_rulesets_poller();
            forced.push("download_config_specs");
        }
        if !self.disable_id_lists_sync
            && self.timer_exited(self.id_lists_last_active_ms.load(Ordering::SeqCst), self.id_lists_interval, now)
        {
            self.id_lists_last_active_ms.store(now, Ordering::SeqCst);
            self.restart_id_lists_poller();
            forced.push("get_id_lists");
        }
        if forced.is_empty() {
            None
        } else {
            Some(format!("forced reset of sync timers: {}", forced.join(", ")))
        }
    }

    fn timer_exited(&self, last_active_ms: i64, interval: Duration, now: i64) -> bool {
        let threshold = SYNC_OUTDATED_MAX.max(interval).as_millis() as i64;
        now - last_active_ms > threshold
    }

    /// Stop both pollers and the adapter. Reads keep serving the last
    /// committed state; any in-flight sync results are discarded.
    pub async fn shutdown(&self) {
        self.is_shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self
            .rulesets_poller
            .lock()
            .expect("should always be able to acquire lock")
            .take()
        {
            handle.abort();
        }
        if let Some(handle) = self
            .id_lists_poller
            .lock()
            .expect("should always be able to acquire lock")
            .take()
        {
            handle.abort();
        }
        if let Some(adapter) = &self.adapter {
            if let Err(e) = adapter.shutdown().await {
                event!(Level::WARN, "failed to shut down data adapter: {}", e);
            }
        }
    }

    fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    pub(crate) fn snapshot(&self) -> Arc<SpecCatalog> {
        self.catalog.read().expect("should not be poisoned").clone()
    }

    /// Markers gathered around bootstrap, spec downloads and id-list
    /// fetches, for hosts that forward diagnostics.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn get_gate(&self, name: &str) -> Option<Arc<ConfigSpec>> {
        self.snapshot().gates.get(name).cloned()
    }

    pub fn get_config(&self, name: &str) -> Option<Arc<ConfigSpec>> {
        self.snapshot().dynamic_configs.get(name).cloned()
    }

    pub fn get_layer(&self, name: &str) -> Option<Arc<ConfigSpec>> {
        self.snapshot().layers.get(name).cloned()
    }

    pub fn get_experiment_layer(&self, experiment: &str) -> Option<String> {
        self.snapshot().experiment_to_layer.get(experiment).cloned()
    }

    pub fn get_id_list(&self, name: &str) -> Option<IdList> {
        self.id_lists
            .read()
            .expect("should not be poisoned")
            .get(name)
            .cloned()
    }

    pub fn id_list_contains(&self, name: &str, hashed_id: &str) -> bool {
        self.id_lists
            .read()
            .expect("should not be poisoned")
            .get(name)
            .map(|l| l.ids.contains(hashed_id))
            .unwrap_or(false)
    }

    pub fn get_all_gates(&self) -> Vec<Arc<ConfigSpec>> {
        self.snapshot().gates.values().cloned().collect()
    }

    pub fn get_all_configs(&self) -> Vec<Arc<ConfigSpec>> {
        self.snapshot().dynamic_configs.values().cloned().collect()
    }

    pub fn get_all_layers(&self) -> Vec<Arc<ConfigSpec>> {
        self.snapshot().layers.values().cloned().collect()
    }

    pub fn get_init_reason(&self) -> InitReason {
        *self.init_reason.read().expect("should not be poisoned")
    }

    pub fn get_initial_update_time(&self) -> i64 {
        self.initial_update_time.load(Ordering::SeqCst)
    }

    pub fn get_last_update_time(&self) -> u64 {
        self.catalog
            .read()
            .expect("should not be poisoned")
            .last_update_time
    }

    /// Whether the store has ever committed a catalog.
    pub fn is_serving_checks(&self) -> bool {
        self.get_last_update_time() > 0
    }
}

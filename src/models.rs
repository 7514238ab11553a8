use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

use crate::data_adapter::DataAdapter;
use crate::evaluator::models::SecondaryExposure;

/// Result of a config lookup, together with the metadata about the group
/// that matched the check.
#[derive(Serialize, Deserialize)]
pub struct StatsigConfig<T> {
    pub value: Option<T>,
    pub name: String,
    pub group_name: Option<String>,
    pub rule_id: String,
    pub group: String,
}

/// Result of an experiment lookup, carrying the nested gate checks that
/// were consulted on the way to the matching group.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsigExperiment<T> {
    pub value: Option<T>,
    pub name: String,
    pub group_name: Option<String>,
    pub rule_id: String,
    pub group: String,
    pub secondary_exposures: Vec<SecondaryExposure>,
}

/// Result of a layer lookup. Parameter values may come from the layer
/// default or from the experiment the layer delegated to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsigLayer {
    pub name: String,
    pub rule_id: String,
    pub group_name: Option<String>,
    pub value: Value,
    pub allocated_experiment_name: Option<String>,
}

impl StatsigLayer {
    /// Fetch one parameter from the layer, deserialized into the caller's
    /// type. Returns None when the parameter is absent or has the wrong
    /// shape.
    pub fn get<T: serde::de::DeserializeOwned>(&self, parameter: &str) -> Option<T> {
        let v = self.value.get(parameter)?;
        serde_json::from_value(v.clone()).ok()
    }
}

#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsigPost {
    pub events: Vec<StatsigEvent>,
}

#[skip_serializing_none]
#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsigEvent {
    pub event_name: String,
    pub value: String,
    pub time: String, // unix timestamp
    pub user: StatsigUser,
    pub metadata: HashMap<String, String>,
    pub secondary_exposures: Option<Vec<SecondaryExposure>>,
}

#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsigMetadata {
    pub sdk_type: String,
    pub sdk_version: String,
}

impl StatsigMetadata {
    pub fn new() -> Self {
        Self {
            sdk_type: "rust-server".to_string(),
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for StatsigMetadata {
    fn default() -> Self {
        Self::new()
    }
}

#[skip_serializing_none]
#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsigUser {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub email: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub country: Option<String>,
    pub locale: Option<String>,
    pub app_version: Option<String>,
    pub custom: Option<HashMap<String, Value>>,
    pub private_attributes: Option<HashMap<String, Value>>,
    #[serde(rename = "customIDs")]
    pub custom_ids: Option<HashMap<String, String>>,
    pub statsig_environment: Option<StatsigEnvironment>,
}

#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsigEnvironment {
    pub tier: String,
}

impl StatsigEnvironment {
    pub fn get_field(&self, field: &str) -> Option<String> {
        match field.to_ascii_lowercase().as_str() {
            "tier" => Some(self.tier.clone()),
            _ => None,
        }
    }
}

impl StatsigUser {
    pub fn new(user_id: String, tier: String) -> Self {
        StatsigUser {
            user_id,
            email: None,
            ip: None,
            user_agent: None,
            country: None,
            locale: None,
            app_version: None,
            custom: None,
            private_attributes: None,
            custom_ids: None,
            statsig_environment: Some(StatsigEnvironment { tier }),
        }
    }

    /// Fetch the unit id for `id_type`. "userID" (any casing) or an
    /// unspecified type resolves to the user id; anything else resolves
    /// through customIDs with a case-insensitive key match, or the empty
    /// string when absent so bucketing stays deterministic.
    pub fn get_unit_id(&self, id_type: &str) -> String {
        if id_type.is_empty() || id_type.to_ascii_lowercase() == "userid" {
            return self.user_id.clone();
        }
        if let Some(custom_ids) = &self.custom_ids {
            if let Some(v) = custom_ids.get(id_type) {
                return v.clone();
            }
            let lower = id_type.to_ascii_lowercase();
            if let Some((_, v)) = custom_ids
                .iter()
                .find(|(k, _)| k.to_ascii_lowercase() == lower)
            {
                return v.clone();
            }
        }
        String::new()
    }

    /// Resolve a condition field against the user: well-known top-level
    /// fields first (case-insensitive), then `custom`, then
    /// `privateAttributes`.
    pub fn value_for_field(&self, field: &str) -> Option<Value> {
        let top_level = match field.to_ascii_lowercase().as_str() {
            "userid" | "user_id" => Some(self.user_id.clone()),
            "email" => self.email.clone(),
            "ip" | "ipaddress" | "ip_address" => self.ip.clone(),
            "useragent" | "user_agent" => self.user_agent.clone(),
            "country" => self.country.clone(),
            "locale" => self.locale.clone(),
            "appversion" | "app_version" => self.app_version.clone(),
            _ => None,
        };
        if let Some(v) = top_level {
            if !v.is_empty() {
                return Some(Value::String(v));
            }
        }
        if let Some(v) = lookup_case_insensitive(self.custom.as_ref(), field) {
            return Some(v);
        }
        lookup_case_insensitive(self.private_attributes.as_ref(), field)
    }

    /// Copy of the user safe to echo back to clients.
    pub fn without_private_attributes(&self) -> StatsigUser {
        let mut user = self.clone();
        user.private_attributes = None;
        user
    }
}

fn lookup_case_insensitive(map: Option<&HashMap<String, Value>>, field: &str) -> Option<Value> {
    let map = map?;
    if let Some(v) = map.get(field) {
        return Some(v.clone());
    }
    let lower = field.to_ascii_lowercase();
    map.iter()
        .find(|(k, _)| k.to_ascii_lowercase() == lower)
        .map(|(_, v)| v.clone())
}

/// How the initial id-list fetch relates to `initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdListInitStrategy {
    /// Fetch id lists before initialize returns.
    #[default]
    Await,
    /// Schedule the initial fetch right after initialize returns.
    Lazy,
    /// Skip the initial fetch entirely; the poller still runs.
    None,
}

/// Invoked with the raw spec payload and its timestamp after every
/// successful network sync.
pub type RulesUpdatedCallback = Arc<dyn Fn(&str, u64) + Send + Sync>;

/// Options to use when creating the client, they will override default
/// values, if they exist.
///
/// The default value for api_url is <https://statsigapi.net/v1> and config
/// specs download from <https://api.statsigcdn.com/v1> unless overridden.
#[derive(Clone, Default)]
pub struct StatsigOptions {
    pub api_url: Option<String>,
    pub api_for_download_config_specs: Option<String>,
    pub events_url: Option<String>,
    /// Spec payload used to seed the store before any network call.
    /// Ignored when a data adapter is also supplied.
    pub bootstrap_values: Option<String>,
    pub rulesets_sync_interval: Option<Duration>,
    pub id_lists_sync_interval: Option<Duration>,
    pub disable_rulesets_sync: bool,
    pub disable_id_lists_sync: bool,
    pub init_strategy_for_id_lists: IdListInitStrategy,
    pub data_adapter: Option<Arc<dyn DataAdapter>>,
    pub rules_updated_callback: Option<RulesUpdatedCallback>,
    /// Never touch the network; serve bootstrap/adapter/override data only.
    pub local_mode: bool,
    /// Cap on how long `Client::new` blocks on the initial sync. The sync
    /// keeps running in the background when the cap is hit.
    pub init_timeout: Option<Duration>,
}

impl std::fmt::Debug for StatsigOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsigOptions")
            .field("api_url", &self.api_url)
            .field(
                "api_for_download_config_specs",
                &self.api_for_download_config_specs,
            )
            .field("events_url", &self.events_url)
            .field("has_bootstrap_values", &self.bootstrap_values.is_some())
            .field("rulesets_sync_interval", &self.rulesets_sync_interval)
            .field("id_lists_sync_interval", &self.id_lists_sync_interval)
            .field("disable_rulesets_sync", &self.disable_rulesets_sync)
            .field("disable_id_lists_sync", &self.disable_id_lists_sync)
            .field("local_mode", &self.local_mode)
            .finish()
    }
}

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{json, Map, Value};
use serde_with::skip_serializing_none;

use crate::evaluator::models::{ConfigSpecType, SecondaryExposure};
use crate::evaluator::{clean_exposures, Evaluator};
use crate::hashing::HashAlgorithm;
use crate::models::{StatsigMetadata, StatsigUser};

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct GateInitializeResponse {
    pub name: String,
    pub value: bool,
    pub rule_id: String,
    pub id_type: String,
    pub secondary_exposures: Vec<SecondaryExposure>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct ConfigInitializeResponse {
    pub name: String,
    pub value: Value,
    pub rule_id: String,
    pub group: String,
    pub group_name: Option<String>,
    pub id_type: String,
    pub is_device_based: bool,
    pub secondary_exposures: Vec<SecondaryExposure>,
    pub is_user_in_experiment: Option<bool>,
    pub is_experiment_active: Option<bool>,
    pub is_in_layer: Option<bool>,
    pub explicit_parameters: Option<Vec<String>>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct LayerInitializeResponse {
    pub name: String,
    pub value: Value,
    pub rule_id: String,
    pub group: String,
    pub group_name: Option<String>,
    pub secondary_exposures: Vec<SecondaryExposure>,
    pub undelegated_secondary_exposures: Vec<SecondaryExposure>,
    pub allocated_experiment_name: Option<String>,
    pub is_user_in_experiment: Option<bool>,
    pub is_experiment_active: Option<bool>,
    pub explicit_parameters: Vec<String>,
}

/// The full spec catalog evaluated against one user, in the shape client
/// SDKs consume as their initialize payload.
#[derive(Debug, Clone, Serialize)]
pub struct ClientInitializeResponse {
    pub feature_gates: HashMap<String, GateInitializeResponse>,
    pub dynamic_configs: HashMap<String, ConfigInitializeResponse>,
    pub layer_configs: HashMap<String, LayerInitializeResponse>,
    #[serde(rename = "sdkParams")]
    pub sdk_params: Value,
    pub has_updates: bool,
    pub generator: String,
    #[serde(rename = "sdkInfo")]
    pub sdk_info: StatsigMetadata,
    pub time: u64,
    pub evaluated_keys: Map<String, Value>,
    pub hash_used: String,
    pub user: StatsigUser,
}

impl Evaluator {
    /// Project the whole catalog for one user. Returns None until the
    /// store has committed at least one catalog.
    pub fn get_client_initialize_response(
        &self,
        user: &StatsigUser,
        hash: HashAlgorithm,
    ) -> Option<ClientInitializeResponse> {
        let store = self.store().clone();
        if !store.is_serving_checks() {
            return None;
        }
        let snapshot = store.snapshot();

        let mut feature_gates = HashMap::new();
        for (name, spec) in &snapshot.gates {
            // segment and holdout gates are evaluator bookkeeping, never
            // surfaced to clients
            if matches!(spec.r#type, ConfigSpecType::Segment | ConfigSpecType::Holdout) {
                continue;
            }
            let result = self.eval_spec(user, spec, &snapshot);
            let hashed = hash.hash_name(name);
            feature_gates.insert(
                hashed.clone(),
                GateInitializeResponse {
                    name: hashed,
                    value: !result.unsupported && result.value,
                    rule_id: result.rule_id,
                    id_type: spec.id_type.clone(),
                    secondary_exposures: clean_exposures(&result.secondary_exposures),
                },
            );
        }

        let mut dynamic_configs = HashMap::new();
        for (name, spec) in &snapshot.dynamic_configs {
            let result = self.eval_spec(user, spec, &snapshot);
            let hashed = hash.hash_name(name);
            let mut value = if result.unsupported {
                json!({})
            } else {
                result.json_value.clone().unwrap_or_else(|| json!({}))
            };
            let mut entry = ConfigInitializeResponse {
                name: hashed.clone(),
                value: json!({}),
                rule_id: result.rule_id.clone(),
                group: result.rule_id.clone(),
                group_name: result.group_name.clone(),
                id_type: spec.id_type.clone(),
                is_device_based: spec.id_type.eq_ignore_ascii_case("stableid"),
                secondary_exposures: clean_exposures(&result.secondary_exposures),
                is_user_in_experiment: None,
                is_experiment_active: None,
                is_in_layer: None,
                explicit_parameters: None,
            };
            entry.is_user_in_experiment = Some(result.is_experiment_group);
            entry.is_experiment_active = Some(spec.is_active.unwrap_or(false));
            if spec.has_shared_params {
                entry.is_in_layer = Some(true);
                entry.explicit_parameters =
                    Some(spec.explicit_parameters.clone().unwrap_or_default());
                // layer defaults first, evaluated values overlaid
                if let Some(layer_defaults) = snapshot
                    .experiment_to_layer
                    .get(name)
                    .and_then(|layer| snapshot.layers.get(layer))
                    .and_then(|layer| layer.default_value.as_object())
                {
                    let mut merged = layer_defaults.clone();
                    if let Some(evaluated) = value.as_object() {
                        for (k, v) in evaluated {
                            merged.insert(k.clone(), v.clone());
                        }
                    }
                    value = Value::Object(merged);
                }
            }
            entry.value = value;
            dynamic_configs.insert(hashed, entry);
        }

        let mut layer_configs = HashMap::new();
        for (name, spec) in &snapshot.layers {
            let result = self.eval_spec(user, spec, &snapshot);
            let hashed = hash.hash_name(name);
            let value = if result.unsupported {
                json!({})
            } else {
                result.json_value.clone().unwrap_or_else(|| json!({}))
            };
            let undelegated = result
                .undelegated_secondary_exposures
                .clone()
                .unwrap_or_else(|| result.secondary_exposures.clone());
            let mut entry = LayerInitializeResponse {
                name: hashed.clone(),
                value,
                rule_id: result.rule_id.clone(),
                group: result.rule_id.clone(),
                group_name: result.group_name.clone(),
                secondary_exposures: clean_exposures(&result.secondary_exposures),
                undelegated_secondary_exposures: clean_exposures(&undelegated),
                allocated_experiment_name: None,
                is_user_in_experiment: None,
                is_experiment_active: None,
                explicit_parameters: spec.explicit_parameters.clone().unwrap_or_default(),
            };
            if let Some(delegate_name) = &result.config_delegate {
                entry.allocated_experiment_name = Some(hash.hash_name(delegate_name));
                entry.is_user_in_experiment = Some(result.is_experiment_group);
                if let Some(delegate) = snapshot.dynamic_configs.get(delegate_name) {
                    entry.is_experiment_active = Some(delegate.is_active.unwrap_or(false));
                    entry.explicit_parameters =
                        delegate.explicit_parameters.clone().unwrap_or_default();
                }
            }
            layer_configs.insert(hashed, entry);
        }

        let mut evaluated_keys = Map::new();
        if !user.user_id.is_empty() {
            evaluated_keys.insert("userID".to_string(), json!(user.user_id));
        }
        if let Some(custom_ids) = &user.custom_ids {
            evaluated_keys.insert("customIDs".to_string(), json!(custom_ids));
        }

        Some(ClientInitializeResponse {
            feature_gates,
            dynamic_configs,
            layer_configs,
            sdk_params: json!({}),
            has_updates: true,
            generator: "statsig-local-rust-sdk".to_string(),
            sdk_info: StatsigMetadata::new(),
            time: snapshot.last_update_time,
            evaluated_keys,
            hash_used: hash.as_str().to_string(),
            user: user.without_private_attributes(),
        })
    }
}

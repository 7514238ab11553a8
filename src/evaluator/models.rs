use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_id_type() -> String {
    "userID".to_string()
}

/// Full catalog payload as served by `download_config_specs`. Top-level
/// keys are snake_case on the wire; the spec objects inside are camelCase.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfigData {
    pub feature_gates: Option<Vec<ConfigSpec>>,
    pub dynamic_configs: Option<Vec<ConfigSpec>>,
    pub layer_configs: Option<Vec<ConfigSpec>>,
    /// Layer name to the experiments allocated inside it.
    pub layers: Option<HashMap<String, Vec<String>>>,
    pub has_updates: bool,
    pub time: Option<u64>,
    pub diagnostics: Option<HashMap<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSpecType {
    FeatureGate,
    DynamicConfig,
    Experiment,
    Autotune,
    Layer,
    Segment,
    Holdout,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSpec {
    pub name: String,
    pub r#type: ConfigSpecType,
    pub salt: String,
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<ConfigRule>,
    pub default_value: Value,
    #[serde(default = "default_id_type")]
    pub id_type: String,
    #[serde(default)]
    pub explicit_parameters: Option<Vec<String>>,
    #[serde(default)]
    pub has_shared_params: bool,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub version: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRule {
    #[serde(default)]
    pub name: Option<String>,
    pub id: String,
    /// Bucketing salt; falls back to `id` when absent.
    #[serde(default)]
    pub salt: Option<String>,
    pub pass_percentage: f64,
    #[serde(default)]
    pub conditions: Vec<ConfigCondition>,
    pub return_value: Value,
    #[serde(default = "default_id_type")]
    pub id_type: String,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub is_experiment_group: bool,
    #[serde(default)]
    pub config_delegate: Option<String>,
}

impl ConfigRule {
    pub fn bucketing_salt(&self) -> &str {
        match &self.salt {
            Some(s) if !s.is_empty() => s,
            _ => &self.id,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigCondition {
    pub r#type: ConditionType,
    #[serde(default)]
    pub target_value: Option<Value>,
    #[serde(default)]
    pub operator: Option<OperatorType>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default = "default_id_type")]
    pub id_type: String,
    /// Free-form extras; `salt` drives `user_bucket` conditions.
    #[serde(default)]
    pub additional_values: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    Public,
    FailGate,
    PassGate,
    MultiPassGate,
    MultiFailGate,
    IpBased,
    UaBased,
    UserField,
    EnvironmentField,
    CurrentTime,
    UserBucket,
    UnitId,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorType {
    Gt,
    Gte,
    Lt,
    Lte,
    VersionGt,
    VersionGte,
    VersionLt,
    VersionLte,
    VersionEq,
    VersionNeq,
    Any,
    None,
    AnyCaseSensitive,
    NoneCaseSensitive,
    StrStartsWithAny,
    StrEndsWithAny,
    StrContainsAny,
    StrContainsNone,
    StrMatches,
    Eq,
    Neq,
    Before,
    After,
    On,
    InSegmentList,
    NotInSegmentList,
    ArrayContainsAny,
    ArrayContainsNone,
    ArrayContainsAll,
    NotArrayContainsAll,
    #[serde(other)]
    Unknown,
}

/// Record of a nested gate consulted during evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct SecondaryExposure {
    pub gate: String,
    #[serde(rename = "gateValue")]
    pub gate_value: String,
    #[serde(rename = "ruleID")]
    pub rule_id: String,
}

impl SecondaryExposure {
    pub fn new(gate: String, gate_value: bool, rule_id: String) -> Self {
        Self {
            gate,
            gate_value: gate_value.to_string(),
            rule_id,
        }
    }
}

/// Where the data backing an evaluation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum EvaluationReason {
    Uninitialized,
    Bootstrap,
    DataAdapter,
    Network,
    LocalOverride,
    Unrecognized,
    Unsupported,
}

/// Provenance attached to every evaluation result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationDetails {
    pub reason: EvaluationReason,
    pub config_sync_time: u64,
    pub init_time: i64,
    pub server_time: i64,
}

impl EvaluationDetails {
    pub fn new(reason: EvaluationReason, config_sync_time: u64, init_time: i64) -> Self {
        Self {
            reason,
            config_sync_time,
            init_time,
            server_time: Utc::now().timestamp_millis(),
        }
    }

    pub fn uninitialized() -> Self {
        Self::new(EvaluationReason::Uninitialized, 0, 0)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalResult {
    pub value: bool,
    pub rule_id: String,
    pub group_name: Option<String>,
    pub secondary_exposures: Vec<SecondaryExposure>,
    /// Exposures gathered before an experiment delegation kicked in.
    pub undelegated_secondary_exposures: Option<Vec<SecondaryExposure>>,
    pub json_value: Option<Value>,
    pub explicit_parameters: Option<Vec<String>>,
    pub config_delegate: Option<String>,
    pub is_experiment_group: bool,
    pub unsupported: bool,
    pub config_version: Option<u64>,
    pub evaluation_details: Option<EvaluationDetails>,
}

impl Default for EvalResult {
    fn default() -> Self {
        Self {
            value: false,
            rule_id: "default".to_string(),
            group_name: None,
            secondary_exposures: vec![],
            undelegated_secondary_exposures: None,
            json_value: None,
            explicit_parameters: None,
            config_delegate: None,
            is_experiment_group: false,
            unsupported: false,
            config_version: None,
            evaluation_details: None,
        }
    }
}

impl EvalResult {
    pub fn pass() -> Self {
        Self {
            value: true,
            ..Default::default()
        }
    }

    pub fn fail() -> Self {
        Self::default()
    }

    pub fn unsupported() -> Self {
        Self {
            unsupported: true,
            ..Default::default()
        }
    }
}

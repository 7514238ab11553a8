use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use crossbeam::sync::ShardedLock;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use woothee::parser::Parser as UserAgentParser;

use crate::hashing::{sha256_hex_prefix, sha256_u64};
use crate::models::StatsigUser;
use crate::store::{InitReason, SpecCatalog, SpecStore};

use self::getters::{
    array_any, array_contains, compare_versions, get_epoch_ms, get_numeric_value, get_string,
    local_date, loose_eq, string_array_any, ArrayContainsMode,
};
use self::models::{
    ConditionType, ConfigRule, ConfigSpec, EvalResult, EvaluationDetails, EvaluationReason,
    OperatorType, SecondaryExposure,
};

pub mod getters;
pub mod models;

/// Buckets for rule pass percentages: two decimal places of percent.
const CONDITION_SEGMENT_COUNT: u64 = 10_000;
/// Buckets for `user_bucket` conditions.
const USER_BUCKET_COUNT: u64 = 1_000;
/// Values at or beyond this length never match `str_matches`.
const MAX_VALUE_LEN_FOR_REGEX: usize = 1_000;
/// User agents beyond this length are not parsed.
const MAX_USER_AGENT_LEN: usize = 1_000;

static UA_PARSER: Lazy<UserAgentParser> = Lazy::new(UserAgentParser::new);

enum SpecKind {
    Gate,
    Config,
    Layer,
}

/// Deterministic interpreter over the spec DSL. Reads one catalog
/// snapshot per entry point, so a sync landing mid-evaluation cannot mix
/// generations.
pub struct Evaluator {
    store: Arc<SpecStore>,
    gate_overrides: ShardedLock<HashMap<String, HashMap<String, bool>>>,
    config_overrides: ShardedLock<HashMap<String, HashMap<String, Value>>>,
    layer_overrides: ShardedLock<HashMap<String, HashMap<String, Value>>>,
}

impl Evaluator {
    pub fn new(store: Arc<SpecStore>) -> Self {
        Self {
            store,
            gate_overrides: ShardedLock::new(HashMap::new()),
            config_overrides: ShardedLock::new(HashMap::new()),
            layer_overrides: ShardedLock::new(HashMap::new()),
        }
    }

    pub(crate) fn store(&self) -> &Arc<SpecStore> {
        &self.store
    }

    pub fn check_gate(&self, user: &StatsigUser, gate_name: &str) -> EvalResult {
        if let Some(value) = self.lookup_override(&self.gate_overrides, user, gate_name) {
            return EvalResult {
                value,
                rule_id: "override".to_string(),
                evaluation_details: Some(self.details(EvaluationReason::LocalOverride)),
                ..Default::default()
            };
        }
        self.eval_entry(user, gate_name, SpecKind::Gate)
    }

    pub fn get_config(&self, user: &StatsigUser, config_name: &str) -> EvalResult {
        if let Some(value) = self.lookup_override(&self.config_overrides, user, config_name) {
            return self.override_result(value);
        }
        self.eval_entry(user, config_name, SpecKind::Config)
    }

    pub fn get_layer(&self, user: &StatsigUser, layer_name: &str) -> EvalResult {
        if let Some(value) = self.lookup_override(&self.layer_overrides, user, layer_name) {
            return self.override_result(value);
        }
        self.eval_entry(user, layer_name, SpecKind::Layer)
    }

    pub fn override_gate(&self, gate: &str, value: bool, user_id: Option<&str>) {
        self.gate_overrides
            .write()
            .expect("should not be poisoned")
            .entry(gate.to_string())
            .or_default()
            .insert(user_id.unwrap_or("").to_string(), value);
    }

    pub fn override_config(&self, config: &str, value: Value, user_id: Option<&str>) {
        self.config_overrides
            .write()
            .expect("should not be poisoned")
            .entry(config.to_string())
            .or_default()
            .insert(user_id.unwrap_or("").to_string(), value);
    }

    pub fn override_layer(&self, layer: &str, value: Value, user_id: Option<&str>) {
        self.layer_overrides
            .write()
            .expect("should not be poisoned")
            .entry(layer.to_string())
            .or_default()
            .insert(user_id.unwrap_or("").to_string(), value);
    }

    pub fn clear_all_gate_overrides(&self) {
        self.gate_overrides
            .write()
            .expect("should not be poisoned")
            .clear();
    }

    pub fn clear_all_config_overrides(&self) {
        self.config_overrides
            .write()
            .expect("should not be poisoned")
            .clear();
    }

    pub fn clear_all_layer_overrides(&self) {
        self.layer_overrides
            .write()
            .expect("should not be poisoned")
            .clear();
    }

    pub async fn shutdown(&self) {
        self.store.shutdown().await;
    }

    fn lookup_override<T: Clone>(
        &self,
        overrides: &ShardedLock<HashMap<String, HashMap<String, T>>>,
        user: &StatsigUser,
        name: &str,
    ) -> Option<T> {
        let overrides = overrides.read().expect("should not be poisoned");
        let by_user = overrides.get(name)?;
        // a user-specific entry wins over the "" global entry
        by_user
            .get(&user.user_id)
            .or_else(|| by_user.get(""))
            .cloned()
    }

    fn override_result(&self, value: Value) -> EvalResult {
        EvalResult {
            value: true,
            rule_id: "override".to_string(),
            json_value: Some(value),
            evaluation_details: Some(self.details(EvaluationReason::LocalOverride)),
            ..Default::default()
        }
    }

    fn details(&self, reason: EvaluationReason) -> EvaluationDetails {
        EvaluationDetails::new(
            reason,
            self.store.get_last_update_time(),
            self.store.get_initial_update_time(),
        )
    }

    fn eval_entry(&self, user: &StatsigUser, name: &str, kind: SpecKind) -> EvalResult {
        if self.store.get_init_reason() == InitReason::Uninitialized {
            return EvalResult {
                rule_id: String::new(),
                evaluation_details: Some(self.details(EvaluationReason::Uninitialized)),
                ..Default::default()
            };
        }
        let snapshot = self.store.snapshot();
        let spec = match kind {
            SpecKind::Gate => snapshot.gates.get(name),
            SpecKind::Config => snapshot.dynamic_configs.get(name),
            SpecKind::Layer => snapshot.layers.get(name),
        };
        let Some(spec) = spec.cloned() else {
            return EvalResult {
                rule_id: String::new(),
                evaluation_details: Some(self.details(EvaluationReason::Unrecognized)),
                ..Default::default()
            };
        };

        let mut result = self.eval_spec(user, &spec, &snapshot);
        result.secondary_exposures = clean_exposures(&result.secondary_exposures);
        if let Some(undelegated) = result.undelegated_secondary_exposures.take() {
            result.undelegated_secondary_exposures = Some(clean_exposures(&undelegated));
        }
        let reason = if result.unsupported {
            EvaluationReason::Unsupported
        } else {
            self.store.get_init_reason().as_evaluation_reason()
        };
        result.evaluation_details = Some(self.details(reason));
        result
    }

    /// Interpret one spec against the user: first passing rule wins, then
    /// either delegates to an experiment or buckets on pass percentage.
    pub(crate) fn eval_spec(
        &self,
        user: &StatsigUser,
        spec: &ConfigSpec,
        snapshot: &SpecCatalog,
    ) -> EvalResult {
        if !spec.enabled {
            return EvalResult {
                value: false,
                rule_id: "disabled".to_string(),
                json_value: Some(spec.default_value.clone()),
                config_version: spec.version,
                ..Default::default()
            };
        }

        let mut exposures: Vec<SecondaryExposure> = vec![];
        for rule in &spec.rules {
            let rule_result = self.eval_rule(user, rule, snapshot);
            if rule_result.unsupported {
                return EvalResult::unsupported();
            }
            exposures.extend(rule_result.secondary_exposures);

            if rule_result.value {
                if let Some(delegated) = self.eval_delegate(user, rule, snapshot, &exposures) {
                    return delegated;
                }
                let pass = self.eval_pass_percentage(user, rule, spec);
                return EvalResult {
                    value: pass,
                    rule_id: rule.id.clone(),
                    group_name: rule.group_name.clone(),
                    is_experiment_group: rule.is_experiment_group,
                    json_value: Some(if pass {
                        rule.return_value.clone()
                    } else {
                        spec.default_value.clone()
                    }),
                    explicit_parameters: spec.explicit_parameters.clone(),
                    config_version: spec.version,
                    secondary_exposures: exposures,
                    ..Default::default()
                };
            }
        }

        EvalResult {
            value: false,
            rule_id: "default".to_string(),
            json_value: Some(spec.default_value.clone()),
            explicit_parameters: spec.explicit_parameters.clone(),
            config_version: spec.version,
            secondary_exposures: exposures,
            ..Default::default()
        }
    }

    /// Evaluate the rule's delegation target, if any. A delegate name
    /// that resolves to nothing makes the rule behave as if it had no
    /// delegate at all.
    fn eval_delegate(
        &self,
        user: &StatsigUser,
        rule: &ConfigRule,
        snapshot: &SpecCatalog,
        exposures: &[SecondaryExposure],
    ) -> Option<EvalResult> {
        let delegate_name = rule.config_delegate.as_ref()?;
        let delegate = snapshot.dynamic_configs.get(delegate_name)?;

        let mut result = self.eval_spec(user, delegate, snapshot);
        if result.unsupported {
            return Some(result);
        }
        result.config_delegate = Some(delegate_name.clone());
        result.undelegated_secondary_exposures = Some(exposures.to_vec());
        result.explicit_parameters = delegate.explicit_parameters.clone();
        let mut combined = exposures.to_vec();
        combined.extend(result.secondary_exposures);
        result.secondary_exposures = combined;
        // the delegate's group name wins only when it set one
        if result.group_name.is_none() {
            result.group_name = rule.group_name.clone();
        }
        Some(result)
    }

    fn eval_rule(&self, user: &StatsigUser, rule: &ConfigRule, snapshot: &SpecCatalog) -> EvalResult {
        let mut result = EvalResult::pass();
        for condition in &rule.conditions {
            let condition_result = self.eval_condition(user, condition, snapshot);
            if condition_result.unsupported {
                result.unsupported = true;
            }
            if !condition_result.value {
                result.value = false;
            }
            result
                .secondary_exposures
                .extend(condition_result.secondary_exposures);
        }
        result
    }

    fn eval_pass_percentage(
        &self,
        user: &StatsigUser,
        rule: &ConfigRule,
        spec: &ConfigSpec,
    ) -> bool {
        let hash = sha256_u64(&format!(
            "{}.{}.{}",
            spec.salt,
            rule.bucketing_salt(),
            user.get_unit_id(&rule.id_type)
        ));
        ((hash % CONDITION_SEGMENT_COUNT) as f64) < rule.pass_percentage * 100.0
    }

    fn eval_condition(
        &self,
        user: &StatsigUser,
        condition: &models::ConfigCondition,
        snapshot: &SpecCatalog,
    ) -> EvalResult {
        let field = condition.field.as_deref();
        let value: Option<Value> = match &condition.r#type {
            ConditionType::Public => return EvalResult::pass(),
            ConditionType::PassGate => {
                return self.eval_nested_gate(user, condition, snapshot, true)
            }
            ConditionType::FailGate => {
                return self.eval_nested_gate(user, condition, snapshot, false)
            }
            ConditionType::MultiPassGate => {
                return self.eval_multi_nested_gates(user, condition, snapshot, true)
            }
            ConditionType::MultiFailGate => {
                return self.eval_multi_nested_gates(user, condition, snapshot, false)
            }
            ConditionType::IpBased | ConditionType::UserField => {
                field.and_then(|f| user.value_for_field(f))
            }
            ConditionType::UaBased => field.and_then(|f| {
                user.value_for_field(f)
                    .or_else(|| value_from_user_agent(user, f))
            }),
            ConditionType::EnvironmentField => user
                .statsig_environment
                .as_ref()
                .zip(field)
                .and_then(|(env, f)| env.get_field(f))
                .map(Value::String),
            ConditionType::CurrentTime => Some(json!(Utc::now().timestamp_millis())),
            ConditionType::UserBucket => {
                let salt = condition
                    .additional_values
                    .get("salt")
                    .map(get_string)
                    .unwrap_or_default();
                let unit_id = user.get_unit_id(&condition.id_type);
                Some(json!(sha256_u64(&format!("{salt}.{unit_id}")) % USER_BUCKET_COUNT))
            }
            ConditionType::UnitId => Some(Value::String(user.get_unit_id(&condition.id_type))),
            ConditionType::Unknown => return EvalResult::unsupported(),
        };

        let Some(operator) = &condition.operator else {
            return EvalResult::unsupported();
        };
        let target = condition.target_value.as_ref();
        let value = value.as_ref();
        let pass = match operator {
            OperatorType::Gt => compare_numbers(value, target, |a, b| a > b),
            OperatorType::Gte => compare_numbers(value, target, |a, b| a >= b),
            OperatorType::Lt => compare_numbers(value, target, |a, b| a < b),
            OperatorType::Lte => compare_numbers(value, target, |a, b| a <= b),
            OperatorType::VersionGt => {
                compare_version_values(value, target, |o| o == Ordering::Greater)
            }
            OperatorType::VersionGte => {
                compare_version_values(value, target, |o| o != Ordering::Less)
            }
            OperatorType::VersionLt => {
                compare_version_values(value, target, |o| o == Ordering::Less)
            }
            OperatorType::VersionLte => {
                compare_version_values(value, target, |o| o != Ordering::Greater)
            }
            OperatorType::VersionEq => {
                compare_version_values(value, target, |o| o == Ordering::Equal)
            }
            OperatorType::VersionNeq => {
                compare_version_values(value, target, |o| o != Ordering::Equal)
            }
            OperatorType::Any => value
                .map(|v| array_any(target, &get_string(v), false))
                .unwrap_or(false),
            OperatorType::None => value
                .map(|v| !array_any(target, &get_string(v), false))
                .unwrap_or(false),
            OperatorType::AnyCaseSensitive => value
                .map(|v| array_any(target, &get_string(v), true))
                .unwrap_or(false),
            OperatorType::NoneCaseSensitive => value
                .map(|v| !array_any(target, &get_string(v), true))
                .unwrap_or(false),
            OperatorType::StrStartsWithAny => value
                .map(|v| string_array_any(target, &get_string(v), |v, t| v.starts_with(t)))
                .unwrap_or(false),
            OperatorType::StrEndsWithAny => value
                .map(|v| string_array_any(target, &get_string(v), |v, t| v.ends_with(t)))
                .unwrap_or(false),
            OperatorType::StrContainsAny => value
                .map(|v| string_array_any(target, &get_string(v), |v, t| v.contains(t)))
                .unwrap_or(false),
            OperatorType::StrContainsNone => value
                .map(|v| !string_array_any(target, &get_string(v), |v, t| v.contains(t)))
                .unwrap_or(false),
            OperatorType::StrMatches => str_matches(value, target),
            OperatorType::Eq => loose_eq(value, target),
            OperatorType::Neq => !loose_eq(value, target),
            OperatorType::Before => compare_dates(value, target, |a, b| a < b),
            OperatorType::After => compare_dates(value, target, |a, b| a > b),
            OperatorType::On => match (
                value.and_then(get_epoch_ms),
                target.and_then(get_epoch_ms),
            ) {
                (Some(a), Some(b)) => local_date(a) == local_date(b),
                _ => false,
            },
            OperatorType::InSegmentList => self.in_segment_list(value, target),
            OperatorType::NotInSegmentList => match value {
                Some(_) => !self.in_segment_list(value, target),
                None => false,
            },
            OperatorType::ArrayContainsAny => {
                array_contains(ArrayContainsMode::Any, value, target)
            }
            OperatorType::ArrayContainsNone => {
                array_contains(ArrayContainsMode::None, value, target)
            }
            OperatorType::ArrayContainsAll => {
                array_contains(ArrayContainsMode::All, value, target)
            }
            OperatorType::NotArrayContainsAll => {
                array_contains(ArrayContainsMode::NotAll, value, target)
            }
            OperatorType::Unknown => return EvalResult::unsupported(),
        };

        if pass {
            EvalResult::pass()
        } else {
            EvalResult::fail()
        }
    }

    fn in_segment_list(&self, value: Option<&Value>, target: Option<&Value>) -> bool {
        let (Some(value), Some(target)) = (value, target) else {
            return false;
        };
        let hashed = sha256_hex_prefix(&get_string(value));
        self.store.id_list_contains(&get_string(target), &hashed)
    }

    fn eval_gate_by_name(
        &self,
        user: &StatsigUser,
        gate_name: &str,
        snapshot: &SpecCatalog,
    ) -> EvalResult {
        match snapshot.gates.get(gate_name) {
            Some(gate) => self.eval_spec(user, gate, snapshot),
            None => EvalResult {
                rule_id: String::new(),
                ..Default::default()
            },
        }
    }

    fn eval_nested_gate(
        &self,
        user: &StatsigUser,
        condition: &models::ConfigCondition,
        snapshot: &SpecCatalog,
        want_pass: bool,
    ) -> EvalResult {
        let Some(gate_name) = condition.target_value.as_ref().map(get_string) else {
            return EvalResult::fail();
        };
        let inner = self.eval_gate_by_name(user, &gate_name, snapshot);
        if inner.unsupported {
            return inner;
        }
        let mut exposures = inner.secondary_exposures;
        exposures.push(SecondaryExposure::new(
            gate_name,
            inner.value,
            inner.rule_id,
        ));
        EvalResult {
            value: if want_pass { inner.value } else { !inner.value },
            secondary_exposures: exposures,
            ..Default::default()
        }
    }

    /// Short-circuit OR over a list of gates, with the polarity of each
    /// check adapted to the condition type.
    fn eval_multi_nested_gates(
        &self,
        user: &StatsigUser,
        condition: &models::ConfigCondition,
        snapshot: &SpecCatalog,
        want_pass: bool,
    ) -> EvalResult {
        let Some(gate_names) = condition.target_value.as_ref().and_then(|t| t.as_array()) else {
            return EvalResult::fail();
        };
        let mut exposures: Vec<SecondaryExposure> = vec![];
        let mut pass = false;
        for name in gate_names {
            let gate_name = get_string(name);
            if gate_name.is_empty() {
                continue;
            }
            let inner = self.eval_gate_by_name(user, &gate_name, snapshot);
            if inner.unsupported {
                return EvalResult::unsupported();
            }
            exposures.extend(inner.secondary_exposures.iter().cloned());
            exposures.push(SecondaryExposure::new(
                gate_name,
                inner.value,
                inner.rule_id.clone(),
            ));
            if inner.value == want_pass {
                pass = true;
                break;
            }
        }
        EvalResult {
            value: pass,
            secondary_exposures: exposures,
            ..Default::default()
        }
    }
}

fn compare_numbers(
    value: Option<&Value>,
    target: Option<&Value>,
    compare: impl Fn(f64, f64) -> bool,
) -> bool {
    match (
        value.and_then(|v| get_numeric_value(v)),
        target.and_then(|t| get_numeric_value(t)),
    ) {
        (Some(a), Some(b)) => compare(a, b),
        _ => false,
    }
}

fn compare_version_values(
    value: Option<&Value>,
    target: Option<&Value>,
    matches: impl Fn(Ordering) -> bool,
) -> bool {
    let (Some(value), Some(target)) = (value.map(get_string), target.map(get_string)) else {
        return false;
    };
    match compare_versions(&value, &target) {
        Some(ordering) => matches(ordering),
        None => false,
    }
}

fn compare_dates(
    value: Option<&Value>,
    target: Option<&Value>,
    compare: impl Fn(i64, i64) -> bool,
) -> bool {
    match (value.and_then(get_epoch_ms), target.and_then(get_epoch_ms)) {
        (Some(a), Some(b)) => compare(a, b),
        _ => false,
    }
}

fn str_matches(value: Option<&Value>, target: Option<&Value>) -> bool {
    let (Some(value), Some(target)) = (value.map(get_string), target.map(get_string)) else {
        return false;
    };
    if value.len() >= MAX_VALUE_LEN_FOR_REGEX {
        return false;
    }
    match Regex::new(&target) {
        Ok(re) => re.is_match(&value),
        Err(_) => false,
    }
}

fn value_from_user_agent(user: &StatsigUser, field: &str) -> Option<Value> {
    let user_agent = user.user_agent.as_deref()?;
    if user_agent.len() > MAX_USER_AGENT_LEN {
        return None;
    }
    let parsed = UA_PARSER.parse(user_agent)?;
    let value = match field.to_ascii_lowercase().as_str() {
        "os_name" | "osname" => parsed.os.to_string(),
        "os_version" | "osversion" => parsed.os_version.to_string(),
        "browser_name" | "browsername" => parsed.name.to_string(),
        "browser_version" | "browserversion" => parsed.version.to_string(),
        _ => return None,
    };
    if value.is_empty() || value == "UNKNOWN" {
        return None;
    }
    Some(Value::String(value))
}

/// Drop `segment:` bookkeeping gates and duplicate
/// `(gate, gateValue, ruleID)` triples, keeping first occurrences.
pub(crate) fn clean_exposures(exposures: &[SecondaryExposure]) -> Vec<SecondaryExposure> {
    let mut seen = HashSet::new();
    let mut out = vec![];
    for exposure in exposures {
        if exposure.gate.starts_with("segment:") {
            continue;
        }
        let key = format!(
            "{}|{}|{}",
            exposure.gate, exposure.gate_value, exposure.rule_id
        );
        if seen.insert(key) {
            out.push(exposure.clone());
        }
    }
    out
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use serde_json::json;

    use super::models::{ConfigCondition, ConditionType, OperatorType};
    use super::*;
    use crate::models::{StatsigOptions, StatsigUser};

    fn evaluator_with_specs(payload: serde_json::Value) -> Evaluator {
        let store = Arc::new(SpecStore::new(
            "secret-test",
            &StatsigOptions {
                local_mode: true,
                ..Default::default()
            },
        ));
        store
            .sync_bootstrap_values(&payload.to_string())
            .expect("payload should install");
        Evaluator::new(store)
    }

    fn empty_evaluator() -> Evaluator {
        Evaluator::new(Arc::new(SpecStore::new(
            "secret-test",
            &StatsigOptions {
                local_mode: true,
                ..Default::default()
            },
        )))
    }

    fn condition(
        r#type: ConditionType,
        operator: Option<OperatorType>,
        field: Option<&str>,
        target_value: Option<serde_json::Value>,
    ) -> ConfigCondition {
        ConfigCondition {
            r#type,
            operator,
            field: field.map(str::to_string),
            target_value,
            id_type: "userID".to_string(),
            additional_values: HashMap::new(),
        }
    }

    fn test_user() -> StatsigUser {
        StatsigUser {
            email: Some("user@example.com".to_string()),
            app_version: Some("1.3.0".to_string()),
            user_agent: Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36"
                    .to_string(),
            ),
            custom: Some(HashMap::from([("level".to_string(), json!(42))])),
            ..StatsigUser::new("user_id".to_string(), "production".to_string())
        }
    }

    #[test]
    fn test_eval_condition_table() {
        let user = test_user();
        let empty_catalog = SpecCatalog::default();
        let evaluator = empty_evaluator();
        let cases: Vec<(&str, ConfigCondition, bool, bool)> = vec![
            (
                "public",
                condition(ConditionType::Public, None, None, None),
                true,
                false,
            ),
            (
                "unknown_condition",
                condition(ConditionType::Unknown, None, None, None),
                false,
                true,
            ),
            (
                "unknown_operator",
                condition(ConditionType::UnitId, Some(OperatorType::Unknown), None, None),
                false,
                true,
            ),
            (
                "missing_operator",
                condition(ConditionType::UnitId, None, None, None),
                false,
                true,
            ),
            (
                "any_pass",
                condition(
                    ConditionType::UnitId,
                    Some(OperatorType::Any),
                    None,
                    Some(json!(["other", "USER_ID"])),
                ),
                true,
                false,
            ),
            (
                "any_fail",
                condition(
                    ConditionType::UnitId,
                    Some(OperatorType::Any),
                    None,
                    Some(json!(["other"])),
                ),
                false,
                false,
            ),
            (
                "none_pass",
                condition(
                    ConditionType::UnitId,
                    Some(OperatorType::None),
                    None,
                    Some(json!(["other"])),
                ),
                true,
                false,
            ),
            (
                "any_case_sensitive_fail",
                condition(
                    ConditionType::UnitId,
                    Some(OperatorType::AnyCaseSensitive),
                    None,
                    Some(json!(["USER_ID"])),
                ),
                false,
                false,
            ),
            (
                "numeric_gt",
                condition(
                    ConditionType::UserField,
                    Some(OperatorType::Gt),
                    Some("level"),
                    Some(json!(40)),
                ),
                true,
                false,
            ),
            (
                "numeric_lte_string_target",
                condition(
                    ConditionType::UserField,
                    Some(OperatorType::Lte),
                    Some("level"),
                    Some(json!("42")),
                ),
                true,
                false,
            ),
            (
                "numeric_missing_field",
                condition(
                    ConditionType::UserField,
                    Some(OperatorType::Gt),
                    Some("missing"),
                    Some(json!(1)),
                ),
                false,
                false,
            ),
            (
                "version_gt",
                condition(
                    ConditionType::UserField,
                    Some(OperatorType::VersionGt),
                    Some("appVersion"),
                    Some(json!("1.2.9")),
                ),
                true,
                false,
            ),
            (
                "version_eq_padded",
                condition(
                    ConditionType::UserField,
                    Some(OperatorType::VersionEq),
                    Some("appVersion"),
                    Some(json!("1.3")),
                ),
                true,
                false,
            ),
            (
                "version_invalid",
                condition(
                    ConditionType::UserField,
                    Some(OperatorType::VersionLt),
                    Some("appVersion"),
                    Some(json!("not.a.version")),
                ),
                false,
                false,
            ),
            (
                "str_starts_with",
                condition(
                    ConditionType::UserField,
                    Some(OperatorType::StrStartsWithAny),
                    Some("email"),
                    Some(json!(["USER@", "nope"])),
                ),
                true,
                false,
            ),
            (
                "str_contains_none",
                condition(
                    ConditionType::UserField,
                    Some(OperatorType::StrContainsNone),
                    Some("email"),
                    Some(json!(["@other.com"])),
                ),
                true,
                false,
            ),
            (
                "str_matches",
                condition(
                    ConditionType::UserField,
                    Some(OperatorType::StrMatches),
                    Some("email"),
                    Some(json!("^user@.*\\.com$")),
                ),
                true,
                false,
            ),
            (
                "str_matches_bad_regex",
                condition(
                    ConditionType::UserField,
                    Some(OperatorType::StrMatches),
                    Some("email"),
                    Some(json!("(unclosed")),
                ),
                false,
                false,
            ),
            (
                "eq_loose_number",
                condition(
                    ConditionType::UserField,
                    Some(OperatorType::Eq),
                    Some("level"),
                    Some(json!("42")),
                ),
                true,
                false,
            ),
            (
                "neq_missing_field",
                condition(
                    ConditionType::UserField,
                    Some(OperatorType::Neq),
                    Some("missing"),
                    Some(json!("anything")),
                ),
                true,
                false,
            ),
            (
                "eq_null_both",
                condition(
                    ConditionType::UserField,
                    Some(OperatorType::Eq),
                    Some("missing"),
                    None,
                ),
                true,
                false,
            ),
            (
                "current_time_after",
                condition(
                    ConditionType::CurrentTime,
                    Some(OperatorType::After),
                    None,
                    Some(json!("2000-01-01T00:00:00Z")),
                ),
                true,
                false,
            ),
            (
                "current_time_before",
                condition(
                    ConditionType::CurrentTime,
                    Some(OperatorType::Before),
                    None,
                    Some(json!("2000-01-01T00:00:00Z")),
                ),
                false,
                false,
            ),
            (
                "environment_tier",
                condition(
                    ConditionType::EnvironmentField,
                    Some(OperatorType::Any),
                    Some("tier"),
                    Some(json!(["production", "staging"])),
                ),
                true,
                false,
            ),
            (
                "ua_browser_name",
                condition(
                    ConditionType::UaBased,
                    Some(OperatorType::Any),
                    Some("browser_name"),
                    Some(json!(["Chrome", "Firefox"])),
                ),
                true,
                false,
            ),
            (
                "array_contains_any",
                condition(
                    ConditionType::UserField,
                    Some(OperatorType::ArrayContainsAny),
                    Some("tags"),
                    Some(json!(["beta"])),
                ),
                false, // user has no "tags" array
                false,
            ),
        ];
        for (name, cond, expected_pass, expected_unsupported) in cases {
            let result = evaluator.eval_condition(&user, &cond, &empty_catalog);
            assert_eq!(result.value, expected_pass, "{name}: pass mismatch");
            assert_eq!(
                result.unsupported, expected_unsupported,
                "{name}: unsupported mismatch"
            );
        }
    }

    #[test]
    fn test_user_bucket_condition() {
        let evaluator = empty_evaluator();
        let catalog = SpecCatalog::default();
        let user = StatsigUser::new("u2".to_string(), "production".to_string());
        let bucket = sha256_u64("bkt.u2") % USER_BUCKET_COUNT;
        let mut cond = condition(
            ConditionType::UserBucket,
            Some(OperatorType::Lt),
            None,
            Some(json!(bucket + 1)),
        );
        cond.additional_values
            .insert("salt".to_string(), json!("bkt"));
        assert!(evaluator.eval_condition(&user, &cond, &catalog).value);

        cond.target_value = Some(json!(bucket));
        assert!(!evaluator.eval_condition(&user, &cond, &catalog).value);
    }

    fn gate_payload(pass_percentage: f64) -> serde_json::Value {
        json!({
            "feature_gates": [{
                "name": "test_gate",
                "type": "feature_gate",
                "salt": "salt",
                "enabled": true,
                "defaultValue": false,
                "idType": "userID",
                "rules": [{
                    "name": "public",
                    "id": "public1",
                    "salt": "salt_rule",
                    "passPercentage": pass_percentage,
                    "idType": "userID",
                    "returnValue": true,
                    "groupName": "everyone",
                    "conditions": [{"type": "public", "idType": "userID"}],
                }],
            }],
            "dynamic_configs": [],
            "layer_configs": [],
            "has_updates": true,
            "time": 100,
        })
    }

    #[test]
    fn test_check_gate_pass_and_fail() {
        let user = StatsigUser::new("user_id".to_string(), "production".to_string());

        let evaluator = evaluator_with_specs(gate_payload(100.0));
        let result = evaluator.check_gate(&user, "test_gate");
        assert!(result.value);
        assert_eq!(result.rule_id, "public1");
        assert_eq!(result.group_name.as_deref(), Some("everyone"));

        let evaluator = evaluator_with_specs(gate_payload(0.0));
        assert!(!evaluator.check_gate(&user, "test_gate").value);
    }

    #[test]
    fn test_pass_percentage_bucketing_matches_hash() {
        // salt "s", rule salt "r", unit id "u1": pass iff
        // sha256_u64("s.r.u1") % 10000 < 5000
        let payload = json!({
            "feature_gates": [{
                "name": "half_gate",
                "type": "feature_gate",
                "salt": "s",
                "enabled": true,
                "defaultValue": false,
                "idType": "userID",
                "rules": [{
                    "name": "half",
                    "id": "rule_id",
                    "salt": "r",
                    "passPercentage": 50,
                    "idType": "userID",
                    "returnValue": true,
                    "conditions": [{"type": "public", "idType": "userID"}],
                }],
            }],
            "dynamic_configs": [],
            "layer_configs": [],
            "has_updates": true,
            "time": 100,
        });
        let evaluator = evaluator_with_specs(payload);
        let user = StatsigUser::new("u1".to_string(), "production".to_string());
        let expected = sha256_u64("s.r.u1") % 10_000 < 5_000;
        assert_eq!(evaluator.check_gate(&user, "half_gate").value, expected);
        // deterministic across calls
        assert_eq!(evaluator.check_gate(&user, "half_gate").value, expected);
    }

    #[test]
    fn test_disabled_spec() {
        let payload = json!({
            "feature_gates": [{
                "name": "off_gate",
                "type": "feature_gate",
                "salt": "salt",
                "enabled": false,
                "defaultValue": false,
                "idType": "userID",
                "rules": [],
            }],
            "dynamic_configs": [],
            "layer_configs": [],
            "has_updates": true,
            "time": 100,
        });
        let evaluator = evaluator_with_specs(payload);
        let user = StatsigUser::new("u".to_string(), "production".to_string());
        let result = evaluator.check_gate(&user, "off_gate");
        assert!(!result.value);
        assert_eq!(result.rule_id, "disabled");
    }

    #[test]
    fn test_uninitialized_and_unrecognized_reasons() {
        let user = StatsigUser::new("u".to_string(), "production".to_string());

        let evaluator = empty_evaluator();
        let result = evaluator.check_gate(&user, "whatever");
        assert!(!result.value);
        assert_eq!(
            result.evaluation_details.expect("details attached").reason,
            EvaluationReason::Uninitialized
        );

        let evaluator = evaluator_with_specs(gate_payload(100.0));
        let result = evaluator.check_gate(&user, "missing_gate");
        assert!(!result.value);
        assert_eq!(
            result.evaluation_details.expect("details attached").reason,
            EvaluationReason::Unrecognized
        );
    }

    #[test]
    fn test_unsupported_condition_reason() {
        let payload = json!({
            "feature_gates": [{
                "name": "odd_gate",
                "type": "feature_gate",
                "salt": "salt",
                "enabled": true,
                "defaultValue": false,
                "idType": "userID",
                "rules": [{
                    "name": "odd",
                    "id": "odd1",
                    "passPercentage": 100,
                    "idType": "userID",
                    "returnValue": true,
                    "conditions": [{"type": "some_future_condition", "idType": "userID"}],
                }],
            }],
            "dynamic_configs": [],
            "layer_configs": [],
            "has_updates": true,
            "time": 100,
        });
        let evaluator = evaluator_with_specs(payload);
        let user = StatsigUser::new("u".to_string(), "production".to_string());
        let result = evaluator.check_gate(&user, "odd_gate");
        assert!(!result.value);
        assert!(result.unsupported);
        assert_eq!(
            result.evaluation_details.expect("details attached").reason,
            EvaluationReason::Unsupported
        );
    }

    fn nested_gate_payload() -> serde_json::Value {
        json!({
            "feature_gates": [
                {
                    "name": "inner_gate",
                    "type": "feature_gate",
                    "salt": "salt",
                    "enabled": true,
                    "defaultValue": false,
                    "idType": "userID",
                    "rules": [{
                        "name": "public",
                        "id": "inner_rule",
                        "passPercentage": 100,
                        "idType": "userID",
                        "returnValue": true,
                        "conditions": [{"type": "public", "idType": "userID"}],
                    }],
                },
                {
                    "name": "segment:hidden",
                    "type": "segment",
                    "salt": "salt",
                    "enabled": true,
                    "defaultValue": false,
                    "idType": "userID",
                    "rules": [{
                        "name": "public",
                        "id": "segment_rule",
                        "passPercentage": 100,
                        "idType": "userID",
                        "returnValue": true,
                        "conditions": [{"type": "public", "idType": "userID"}],
                    }],
                },
                {
                    "name": "outer_gate",
                    "type": "feature_gate",
                    "salt": "salt",
                    "enabled": true,
                    "defaultValue": false,
                    "idType": "userID",
                    "rules": [{
                        "name": "needs_both",
                        "id": "outer_rule",
                        "passPercentage": 100,
                        "idType": "userID",
                        "returnValue": true,
                        "conditions": [
                            {"type": "pass_gate", "targetValue": "inner_gate", "idType": "userID"},
                            {"type": "pass_gate", "targetValue": "inner_gate", "idType": "userID"},
                            {"type": "pass_gate", "targetValue": "segment:hidden", "idType": "userID"},
                        ],
                    }],
                },
            ],
            "dynamic_configs": [],
            "layer_configs": [],
            "has_updates": true,
            "time": 100,
        })
    }

    #[test]
    fn test_nested_gate_exposures_deduped_and_segments_dropped() {
        let evaluator = evaluator_with_specs(nested_gate_payload());
        let user = StatsigUser::new("u".to_string(), "production".to_string());
        let result = evaluator.check_gate(&user, "outer_gate");
        assert!(result.value);
        // two duplicate inner_gate exposures collapse into one; the
        // segment: exposure is dropped entirely
        assert_eq!(result.secondary_exposures.len(), 1);
        let exposure = &result.secondary_exposures[0];
        assert_eq!(exposure.gate, "inner_gate");
        assert_eq!(exposure.gate_value, "true");
        assert_eq!(exposure.rule_id, "inner_rule");
    }

    #[test]
    fn test_fail_gate_condition() {
        let payload = json!({
            "feature_gates": [
                {
                    "name": "inner_gate",
                    "type": "feature_gate",
                    "salt": "salt",
                    "enabled": true,
                    "defaultValue": false,
                    "idType": "userID",
                    "rules": [{
                        "name": "public",
                        "id": "inner_rule",
                        "passPercentage": 100,
                        "idType": "userID",
                        "returnValue": true,
                        "conditions": [{"type": "public", "idType": "userID"}],
                    }],
                },
                {
                    "name": "inverted_gate",
                    "type": "feature_gate",
                    "salt": "salt",
                    "enabled": true,
                    "defaultValue": false,
                    "idType": "userID",
                    "rules": [{
                        "name": "inverted",
                        "id": "inverted_rule",
                        "passPercentage": 100,
                        "idType": "userID",
                        "returnValue": true,
                        "conditions": [
                            {"type": "fail_gate", "targetValue": "inner_gate", "idType": "userID"},
                        ],
                    }],
                },
            ],
            "dynamic_configs": [],
            "layer_configs": [],
            "has_updates": true,
            "time": 100,
        });
        let evaluator = evaluator_with_specs(payload);
        let user = StatsigUser::new("u".to_string(), "production".to_string());
        let result = evaluator.check_gate(&user, "inverted_gate");
        // inner gate passes, so fail_gate does not
        assert!(!result.value);
        // the nested check is still recorded with the gate's real value
        assert_eq!(result.secondary_exposures.len(), 1);
        assert_eq!(result.secondary_exposures[0].gate_value, "true");
    }

    fn delegate_payload() -> serde_json::Value {
        json!({
            "feature_gates": [],
            "dynamic_configs": [
                {
                    "name": "exp_a",
                    "type": "experiment",
                    "salt": "salt_a",
                    "enabled": true,
                    "defaultValue": {"param": "a_default"},
                    "idType": "userID",
                    "isActive": true,
                    "rules": [{
                        "name": "delegating",
                        "id": "delegate_rule",
                        "groupName": "outer_group",
                        "passPercentage": 100,
                        "idType": "userID",
                        "returnValue": {"param": "a_value"},
                        "configDelegate": "exp_b",
                        "conditions": [{"type": "public", "idType": "userID"}],
                    }],
                },
                {
                    "name": "exp_b",
                    "type": "experiment",
                    "salt": "salt_b",
                    "enabled": true,
                    "defaultValue": {"param": "b_default"},
                    "idType": "userID",
                    "isActive": true,
                    "explicitParameters": ["param"],
                    "rules": [{
                        "name": "experiment",
                        "id": "b_rule",
                        "groupName": "Control",
                        "isExperimentGroup": true,
                        "passPercentage": 100,
                        "idType": "userID",
                        "returnValue": {"param": "b_value"},
                        "conditions": [{"type": "public", "idType": "userID"}],
                    }],
                },
            ],
            "layer_configs": [],
            "has_updates": true,
            "time": 100,
        })
    }

    #[test]
    fn test_config_delegation() {
        let evaluator = evaluator_with_specs(delegate_payload());
        let user = StatsigUser::new("u".to_string(), "production".to_string());
        let result = evaluator.get_config(&user, "exp_a");
        assert!(result.value);
        assert_eq!(result.config_delegate.as_deref(), Some("exp_b"));
        assert_eq!(result.rule_id, "b_rule");
        // the delegate's group name wins over the delegating rule's
        assert_eq!(result.group_name.as_deref(), Some("Control"));
        assert!(result.is_experiment_group);
        assert_eq!(
            result.explicit_parameters,
            Some(vec!["param".to_string()])
        );
        assert_eq!(result.json_value, Some(json!({"param": "b_value"})));
        // no gate conditions anywhere: both exposure lists are empty but
        // the undelegated list is materialized
        assert_eq!(result.undelegated_secondary_exposures, Some(vec![]));
    }

    #[test]
    fn test_missing_delegate_falls_through() {
        let mut payload = delegate_payload();
        payload["dynamic_configs"][0]["rules"][0]["configDelegate"] = json!("does_not_exist");
        let evaluator = evaluator_with_specs(payload);
        let user = StatsigUser::new("u".to_string(), "production".to_string());
        let result = evaluator.get_config(&user, "exp_a");
        assert!(result.config_delegate.is_none());
        assert_eq!(result.rule_id, "delegate_rule");
        assert_eq!(result.group_name.as_deref(), Some("outer_group"));
        assert_eq!(result.json_value, Some(json!({"param": "a_value"})));
    }

    #[test]
    fn test_overrides() {
        let evaluator = evaluator_with_specs(gate_payload(0.0));
        let user = StatsigUser::new("user_id".to_string(), "production".to_string());
        let other = StatsigUser::new("other".to_string(), "production".to_string());

        evaluator.override_gate("test_gate", true, Some("user_id"));
        let result = evaluator.check_gate(&user, "test_gate");
        assert!(result.value);
        assert_eq!(result.rule_id, "override");
        assert_eq!(
            result.evaluation_details.expect("details attached").reason,
            EvaluationReason::LocalOverride
        );
        // other users still evaluate normally
        assert!(!evaluator.check_gate(&other, "test_gate").value);

        // the "" entry applies to everyone
        evaluator.override_gate("test_gate", true, None);
        assert!(evaluator.check_gate(&other, "test_gate").value);

        evaluator.clear_all_gate_overrides();
        assert!(!evaluator.check_gate(&user, "test_gate").value);

        evaluator.override_config("some_config", json!({"k": 1}), None);
        let result = evaluator.get_config(&user, "some_config");
        assert!(result.value);
        assert_eq!(result.rule_id, "override");
        assert_eq!(result.json_value, Some(json!({"k": 1})));
        evaluator.clear_all_config_overrides();

        evaluator.override_layer("some_layer", json!({"p": 2}), None);
        let result = evaluator.get_layer(&user, "some_layer");
        assert_eq!(result.json_value, Some(json!({"p": 2})));
        evaluator.clear_all_layer_overrides();
        assert_eq!(
            evaluator
                .get_layer(&user, "some_layer")
                .evaluation_details
                .expect("details attached")
                .reason,
            EvaluationReason::Unrecognized
        );
    }

    #[test]
    fn test_default_rule_when_nothing_matches() {
        let payload = json!({
            "feature_gates": [],
            "dynamic_configs": [{
                "name": "config_a",
                "type": "dynamic_config",
                "salt": "salt",
                "enabled": true,
                "defaultValue": {"v": "fallback"},
                "idType": "userID",
                "rules": [{
                    "name": "nobody",
                    "id": "nobody_rule",
                    "passPercentage": 100,
                    "idType": "userID",
                    "returnValue": {"v": "matched"},
                    "conditions": [{
                        "type": "user_field",
                        "operator": "any",
                        "field": "email",
                        "targetValue": ["someone@else.com"],
                        "idType": "userID",
                    }],
                }],
            }],
            "layer_configs": [],
            "has_updates": true,
            "time": 100,
        });
        let evaluator = evaluator_with_specs(payload);
        let user = StatsigUser::new("u".to_string(), "production".to_string());
        let result = evaluator.get_config(&user, "config_a");
        assert!(!result.value);
        assert_eq!(result.rule_id, "default");
        assert_eq!(result.json_value, Some(json!({"v": "fallback"})));
    }
}

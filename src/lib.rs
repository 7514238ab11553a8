//! Implements a statsig server client with full local rule evaluation.
//!
//! The client downloads the rule catalog from the statsig control plane,
//! keeps it fresh with background polling, streams user-segment id lists
//! incrementally, and answers gate/config/experiment/layer checks without
//! any per-request network round trip.
//!
//! To change the default request timeout set the STATSIG_TIMEOUT_MS
//! environment variable to the desired timeout value.
//!
//! Reference: https://docs.statsig.com/server/introduction
//!
//! ## Bootstrap and data adapters
//!
//! The store can be seeded before the first network call, either from a
//! caller-supplied payload (`StatsigOptions::bootstrap_values`) or from a
//! [`DataAdapter`]. When both are supplied the adapter wins and the
//! bootstrap payload is ignored with a warning.
//!
//! ```ignore
//! let client = Client::new(secret_key, StatsigOptions::default()).await?;
//! let passes = client.check_gate(&user, "new_checkout_flow")?;
//! ```

mod client;
mod client_init_response;
mod data_adapter;
mod diagnostics;
mod errors;
mod evaluator;
mod hashing;
mod http;
mod id_lists;
mod store;

pub mod models;

pub use crate::client::Client;
pub use crate::client_init_response::{
    ClientInitializeResponse, ConfigInitializeResponse, GateInitializeResponse,
    LayerInitializeResponse,
};
pub use crate::data_adapter::{
    id_list_key, AdapterResponse, DataAdapter, InMemoryDataAdapter, ID_LISTS_KEY, RULESETS_KEY,
};
pub use crate::diagnostics::{Diagnostics, Marker};
pub use crate::errors::StatsigError;
pub use crate::evaluator::models::{
    ConditionType, ConfigCondition, ConfigData, ConfigRule, ConfigSpec, ConfigSpecType, EvalResult,
    EvaluationDetails, EvaluationReason, OperatorType, SecondaryExposure,
};
pub use crate::evaluator::Evaluator;
pub use crate::hashing::HashAlgorithm;
pub use crate::id_lists::IdList;
pub use crate::store::{InitReason, SpecStore, SYNC_OUTDATED_MAX};

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use crossbeam::sync::ShardedLock;

/// Key holding the full rulesets payload.
pub const RULESETS_KEY: &str = "rulesets";
/// Key holding the id-list manifest.
pub const ID_LISTS_KEY: &str = "id_lists";

/// Key holding the content of a single id list.
pub fn id_list_key(name: &str) -> String {
    format!("id_list::{name}")
}

#[derive(Debug, Clone, Default)]
pub struct AdapterResponse {
    pub result: Option<String>,
    pub error: Option<String>,
    pub time: Option<u64>,
}

/// External key/value cache of spec payloads, possibly shared across
/// processes. When supplied it takes precedence over bootstrap values,
/// and the store writes every fetched payload back through `set`.
#[async_trait]
pub trait DataAdapter: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    async fn shutdown(&self) -> Result<()>;
    async fn get(&self, key: &str) -> Result<AdapterResponse>;
    async fn set(&self, key: &str, value: &str, time: Option<u64>) -> Result<()>;
    /// Whether polling should read `key` from the adapter instead of the
    /// network.
    fn supports_polling_updates_for(&self, key: &str) -> bool {
        let _ = key;
        false
    }
}

/// Process-local adapter. Mostly useful in tests and as a reference for
/// real implementations backed by redis or disk.
#[derive(Default)]
pub struct InMemoryDataAdapter {
    entries: ShardedLock<HashMap<String, (String, Option<u64>)>>,
    poll_from_adapter: bool,
}

impl InMemoryDataAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter that also answers polling reads, not just the initial one.
    pub fn new_with_polling() -> Self {
        Self {
            entries: ShardedLock::new(HashMap::new()),
            poll_from_adapter: true,
        }
    }
}

#[async_trait]
impl DataAdapter for InMemoryDataAdapter {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<AdapterResponse> {
        let entries = self.entries.read().expect("should not be poisoned");
        Ok(match entries.get(key) {
            Some((value, time)) => AdapterResponse {
                result: Some(value.clone()),
                error: None,
                time: *time,
            },
            None => AdapterResponse::default(),
        })
    }

    async fn set(&self, key: &str, value: &str, time: Option<u64>) -> Result<()> {
        self.entries
            .write()
            .expect("should not be poisoned")
            .insert(key.to_string(), (value.to_string(), time));
        Ok(())
    }

    fn supports_polling_updates_for(&self, key: &str) -> bool {
        self.poll_from_adapter && key == RULESETS_KEY
    }
}

use std::collections::HashSet;

use serde_json::Value;

use crate::errors::StatsigError;

/// One streamed user-segment list. `read_bytes` tracks how much of the
/// backing file has been absorbed for the current `file_id` generation;
/// a generation change drops the list and restarts from offset zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdList {
    pub name: String,
    pub ids: HashSet<String>,
    pub read_bytes: u64,
    pub url: String,
    pub file_id: String,
    pub creation_time: i64,
}

impl IdList {
    pub fn new(name: String, url: String, file_id: String, creation_time: i64) -> Self {
        Self {
            name,
            ids: HashSet::new(),
            read_bytes: 0,
            url,
            file_id,
            creation_time,
        }
    }
}

/// Manifest entry describing one list generation. Entries with a
/// non-string url or fileID are skipped wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdListMetadata {
    pub url: String,
    pub file_id: String,
    pub creation_time: i64,
    pub size: u64,
}

impl IdListMetadata {
    pub fn from_value(v: &Value) -> Option<Self> {
        let url = v.get("url")?.as_str()?.to_string();
        let file_id = v.get("fileID")?.as_str()?.to_string();
        let creation_time = v.get("creationTime").and_then(Value::as_i64).unwrap_or(0);
        let size = v.get("size").and_then(Value::as_u64).unwrap_or(0);
        Some(Self {
            url,
            file_id,
            creation_time,
            size,
        })
    }
}

/// Length of the hashed ids carried on the wire, 8 hex characters of
/// sha256.
const HASHED_ID_LEN: usize = 8;

/// Apply one fetched byte range to the list. Each line is `+<hash>` to add
/// or `-<hash>` to remove. Any malformed line, including an id of the
/// wrong length, invalidates the whole list; the caller drops it and lets
/// the next manifest rebuild from offset 0.
pub fn apply_chunk(list: &mut IdList, chunk: &str) -> Result<(), StatsigError> {
    let invalid = |reason: &str| StatsigError::IdList {
        name: list.name.clone(),
        reason: reason.to_string(),
    };
    if !matches!(chunk.as_bytes().first(), Some(b'+') | Some(b'-')) {
        return Err(invalid("chunk does not start with an id operation"));
    }
    for line in chunk.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (op, id) = line.split_at(1);
        if id.len() != HASHED_ID_LEN {
            return Err(invalid("unexpected id length"));
        }
        match op {
            "+" => {
                list.ids.insert(id.to_string());
            }
            "-" => {
                list.ids.remove(id);
            }
            _ => return Err(invalid("unknown id operation")),
        }
    }
    Ok(())
}

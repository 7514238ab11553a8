use std::collections::HashMap;
use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Upper bound on the memoized hash table. When an insert would exceed it
/// the whole table is dropped and rebuilt from scratch.
pub const HASH_CACHE_MAX_ENTRIES: usize = 100_000;

static HASH_CACHE: Lazy<Mutex<HashMap<String, u64>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// First 8 bytes of sha256 interpreted as a big-endian unsigned integer.
///
/// This is the bucketing primitive: modulo arithmetic on the result must
/// stay in u64, never a narrower type. Results are memoized for the life
/// of the process since rule salts repeat on every evaluation.
pub fn sha256_u64(s: &str) -> u64 {
    {
        let cache = HASH_CACHE.lock().expect("should not be poisoned");
        if let Some(v) = cache.get(s) {
            return *v;
        }
    }
    let digest = Sha256::digest(s.as_bytes());
    let v = u64::from_be_bytes(digest[..8].try_into().expect("sha256 digest is 32 bytes"));
    let mut cache = HASH_CACHE.lock().expect("should not be poisoned");
    if cache.len() >= HASH_CACHE_MAX_ENTRIES {
        cache.clear();
    }
    cache.insert(s.to_string(), v);
    v
}

#[cfg(test)]
pub(crate) fn hash_cache_len() -> usize {
    HASH_CACHE.lock().expect("should not be poisoned").len()
}

/// First 8 hex characters of sha256, the format id-list membership is
/// keyed on.
pub fn sha256_hex_prefix(s: &str) -> String {
    let digest = Sha256::digest(s.as_bytes());
    hex::encode(&digest[..4])
}

fn sha256_base64(s: &str) -> String {
    BASE64.encode(Sha256::digest(s.as_bytes()))
}

/// The client-side djb2 variant: UTF-16 code units folded into a wrapping
/// i32, rendered as the unsigned decimal string.
fn djb2(s: &str) -> String {
    let mut hash: i32 = 0;
    for c in s.encode_utf16() {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(c as i32);
    }
    (hash as u32).to_string()
}

/// Hash applied to gate/config names in client initialize payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Djb2,
    None,
}

impl HashAlgorithm {
    pub fn hash_name(&self, name: &str) -> String {
        match self {
            HashAlgorithm::Sha256 => sha256_base64(name),
            HashAlgorithm::Djb2 => djb2(name),
            HashAlgorithm::None => name.to_string(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Djb2 => "djb2",
            HashAlgorithm::None => "none",
        }
    }
}

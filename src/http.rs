use std::collections::HashMap;

use reqwest::{
    header,
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, ClientBuilder, StatusCode,
};
use serde_json::Value;
use tokio::time::Duration;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};

use crate::{
    errors::StatsigError,
    models::{StatsigMetadata, StatsigPost},
};

const API_URL: &str = "https://statsigapi.net/v1";
const CDN_URL: &str = "https://api.statsigcdn.com/v1";
const EVENTS_URL: &str = "https://events.statsigapi.net/v1";

/// The environment variable to change the default timeout for statsig requests.
const STATSIG_TIMEOUT_MS: &str = "STATSIG_TIMEOUT_MS";

fn create_http_connection_client(key: &str) -> Client {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        HeaderName::from_static("statsig-api-key"),
        HeaderValue::from_str(key).expect("should be able to cast api key"),
    );
    let timeout = std::env::var(STATSIG_TIMEOUT_MS)
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u64>()
        .unwrap_or(3000);
    ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(60)))
        .tcp_keepalive(Some(Duration::from_secs(30)))
        .timeout(Duration::from_millis(timeout))
        .default_headers(headers)
        .build()
        .expect("should be able to build the http client")
}

fn retry_strategy() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(100).map(jitter).take(2)
}

/// One fetched byte range of an id list. `content_length` is the
/// advertised header value, which the store credits against `read_bytes`
/// before parsing.
#[derive(Debug, Clone)]
pub struct IdListChunk {
    pub body: String,
    pub content_length: Option<u64>,
}

#[derive(Clone)]
pub struct StatsigHttpClient {
    sdk_key: String,
    base_url: String,
    dcs_url: String,
    events_url: String,
    local_mode: bool,
    http_client: Client,
}

impl StatsigHttpClient {
    pub fn new(
        api_key: String,
        api_url: Option<String>,
        dcs_url: Option<String>,
        events_url: Option<String>,
        local_mode: bool,
    ) -> Self {
        let base_url = api_url.unwrap_or_else(|| API_URL.to_string());
        let dcs_url = dcs_url.unwrap_or_else(|| CDN_URL.to_string());
        let events_url = events_url.unwrap_or_else(|| EVENTS_URL.to_string());
        let http_client = create_http_connection_client(&api_key);
        Self {
            sdk_key: api_key,
            base_url,
            dcs_url,
            events_url,
            local_mode,
            http_client,
        }
    }

    /// GET the full ruleset catalog, as the raw payload string. The raw
    /// form matters: it is handed to the rules-updated callback and the
    /// data adapter byte-for-byte.
    pub async fn fetch_config_specs(&self, since_time: u64) -> Result<String, StatsigError> {
        if self.local_mode {
            return Err(StatsigError::LocalModeNetwork);
        }
        let url = format!(
            "{}/download_config_specs/{}.json?sinceTime={}",
            self.dcs_url, self.sdk_key, since_time
        );
        Retry::spawn(retry_strategy(), || async {
            let response = self
                .http_client
                .get(&url)
                .timeout(Duration::from_secs(10))
                .send()
                .await
                .map_err(|e| network_error("download_config_specs", e.to_string()))?;
            match response.status() {
                StatusCode::OK => response
                    .text()
                    .await
                    .map_err(|e| network_error("download_config_specs", e.to_string())),
                status => Err(network_error(
                    "download_config_specs",
                    format!("unexpected status {status}"),
                )),
            }
        })
        .await
    }

    /// POST for the id-list manifest: list name to url/fileID/creationTime/size.
    /// Entries are left as raw JSON so one malformed entry cannot poison
    /// the rest of the manifest.
    pub async fn fetch_id_list_manifest(
        &self,
        metadata: &StatsigMetadata,
    ) -> Result<HashMap<String, Value>, StatsigError> {
        if self.local_mode {
            return Err(StatsigError::LocalModeNetwork);
        }
        let url = format!("{}/get_id_lists", self.base_url);
        let body = serde_json::json!({ "statsigMetadata": metadata });
        Retry::spawn(retry_strategy(), || async {
            let response = self
                .http_client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| network_error("get_id_lists", e.to_string()))?;
            match response.status() {
                StatusCode::OK => response
                    .json::<HashMap<String, Value>>()
                    .await
                    .map_err(|e| network_error("get_id_lists", e.to_string())),
                status => Err(network_error(
                    "get_id_lists",
                    format!("unexpected status {status}"),
                )),
            }
        })
        .await
    }

    /// Ranged GET of an id-list file from `from_bytes` to the end.
    pub async fn fetch_id_list_chunk(
        &self,
        url: &str,
        from_bytes: u64,
    ) -> Result<IdListChunk, StatsigError> {
        if self.local_mode {
            return Err(StatsigError::LocalModeNetwork);
        }
        let response = self
            .http_client
            .get(url)
            .header(header::RANGE, format!("bytes={from_bytes}-"))
            .send()
            .await
            .map_err(|e| network_error("get_id_list", e.to_string()))?;
        match response.status() {
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => {
                let content_length = response
                    .headers()
                    .get(header::CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                let body = response
                    .text()
                    .await
                    .map_err(|e| network_error("get_id_list", e.to_string()))?;
                Ok(IdListChunk {
                    body,
                    content_length,
                })
            }
            status => Err(network_error(
                "get_id_list",
                format!("unexpected status {status}"),
            )),
        }
    }

    pub async fn log_events(&self, statsig_post: &StatsigPost) -> Result<(), StatsigError> {
        if self.local_mode {
            return Err(StatsigError::LocalModeNetwork);
        }
        let url = format!("{}/log_event", self.events_url);
        let response = self
            .http_client
            .post(url)
            .json(statsig_post)
            .send()
            .await
            .map_err(|e| network_error("log_event", e.to_string()))?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED => Ok(()),
            status => Err(network_error(
                "log_event",
                format!("unexpected status {status}"),
            )),
        }
    }
}

fn network_error(endpoint: &str, message: String) -> StatsigError {
    StatsigError::Network {
        endpoint: endpoint.to_string(),
        message,
    }
}

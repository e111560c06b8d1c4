use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::resolver::{DiscountRow, ReferenceStore, TrackRow};

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 12;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 6;
const TRACKS_TABLE: &str = "tracks";
const DISCOUNTS_TABLE: &str = "discount_types";

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent("tuition-engine/0.1")
        .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|_| Client::new())
});

/// PostgREST-style reference store: one JSON array of rows per table.
#[derive(Debug, Clone)]
pub struct HttpReferenceStore {
    base_url: String,
    api_key: Option<String>,
}

impl HttpReferenceStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{table}", self.base_url)
    }

    async fn fetch_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        if self.base_url.is_empty() {
            return Err(anyhow!("reference store URL is not configured"));
        }
        let mut request = HTTP_CLIENT.get(url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("failed GET request: {url}"))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("failed reading response body: {url}"))?;
        if !status.is_success() {
            let preview: String = body.chars().take(180).collect();
            return Err(anyhow!("GET {url} returned {status}: {preview}"));
        }
        serde_json::from_str(&body).with_context(|| format!("invalid JSON response: {url}"))
    }
}

#[async_trait]
impl ReferenceStore for HttpReferenceStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn get_track(&self, id: &str) -> Result<Option<TrackRow>> {
        let url = self.table_url(TRACKS_TABLE);
        let payload = self
            .fetch_json(
                &url,
                &[("select", "*".to_string()), ("id", format!("eq.{id}"))],
            )
            .await?;
        let rows: Vec<TrackRow> = rows_from_value(payload)?;
        Ok(rows.into_iter().next())
    }

    async fn get_tracks(&self) -> Result<Vec<TrackRow>> {
        let url = self.table_url(TRACKS_TABLE);
        let payload = self.fetch_json(&url, &[("select", "*".to_string())]).await?;
        rows_from_value(payload)
    }

    async fn get_discount_types(&self) -> Result<Vec<DiscountRow>> {
        let url = self.table_url(DISCOUNTS_TABLE);
        let payload = self.fetch_json(&url, &[("select", "*".to_string())]).await?;
        rows_from_value(payload)
    }
}

/// Accepts a bare array of rows or an object wrapping one under a common key.
pub fn rows_from_value<T: DeserializeOwned>(value: Value) -> Result<Vec<T>> {
    let array = match value {
        Value::Array(items) => items,
        Value::Object(object) => extract_row_array(object)
            .ok_or_else(|| anyhow!("response object carries no row array"))?,
        other => return Err(anyhow!("unexpected response shape: {other}")),
    };
    array
        .into_iter()
        .map(|row| serde_json::from_value(row).context("malformed reference row"))
        .collect()
}

fn extract_row_array(mut object: Map<String, Value>) -> Option<Vec<Value>> {
    for key in ["data", "rows", "items", "result"] {
        let matched = object
            .keys()
            .find(|k| k.eq_ignore_ascii_case(key))
            .cloned();
        if let Some(Value::Array(items)) = matched.and_then(|k| object.remove(&k)) {
            return Some(items);
        }
    }
    None
}

pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn sha256_json(value: &Value) -> String {
    let serialized = serde_json::to_string(value).unwrap_or_else(|_| value.to_string());
    sha256_hex(&serialized)
}

//! Model catalog
//!
//! Lists the models the runner can serve, caching the answer for a TTL.
//! The cache is swapped wholesale on every successful fetch and left alone on
//! failure, so readers only ever see a complete list.

use crate::config::Config;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const UNKNOWN_ID: &str = "unknown";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP Error {status} for url: {url}")]
    Status { status: u16, url: String },
    #[error("invalid JSON in model list: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected model list: {0}")]
    Malformed(String),
}

/// A servable model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// Placeholder entry shown when the list could not be fetched
    pub fn fetch_error(error: &CatalogError) -> Self {
        Self::new("error", format!("Could not fetch models: {}", error))
    }

    fn same(id: String) -> Self {
        Self {
            display_name: id.clone(),
            id,
        }
    }
}

/// Recognized shapes of a `/models` response body
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogShape {
    /// OpenAI style: `{"object": "list", "data": [{"id": ...}, ...]}`
    Data(Vec<Map<String, Value>>),
    /// Bare array of names and/or model objects
    List(Vec<Value>),
    /// Anything else; yields no models
    Unknown,
}

impl CatalogShape {
    pub fn classify(body: Value) -> Result<Self, CatalogError> {
        match body {
            Value::Object(mut object) => match object.remove("data") {
                Some(Value::Array(items)) => items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(model) => Ok(model),
                        other => Err(CatalogError::Malformed(format!(
                            "data entry is not an object: {}",
                            other
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(CatalogShape::Data),
                Some(other) => Err(CatalogError::Malformed(format!(
                    "data is not an array: {}",
                    other
                ))),
                None => Ok(CatalogShape::Unknown),
            },
            Value::Array(items) => Ok(CatalogShape::List(items)),
            _ => Ok(CatalogShape::Unknown),
        }
    }

    pub fn into_descriptors(self) -> Vec<ModelDescriptor> {
        match self {
            CatalogShape::Data(models) => models
                .iter()
                .map(|model| {
                    let id = model
                        .get("id")
                        .and_then(text_of)
                        .unwrap_or_else(|| UNKNOWN_ID.to_string());
                    ModelDescriptor::same(id)
                })
                .collect(),
            CatalogShape::List(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(name) => Some(ModelDescriptor::same(name)),
                    Value::Object(model) => {
                        let id = model
                            .get("id")
                            .and_then(text_of)
                            .unwrap_or_else(|| Value::Object(model.clone()).to_string());
                        let display_name = model
                            .get("name")
                            .and_then(text_of)
                            .unwrap_or_else(|| id.clone());
                        Some(ModelDescriptor::new(id, display_name))
                    }
                    _ => None,
                })
                .collect(),
            CatalogShape::Unknown => Vec::new(),
        }
    }
}

/// Parse a `/models` response body into descriptors.
pub fn parse_models(body: Value) -> Result<Vec<ModelDescriptor>, CatalogError> {
    Ok(CatalogShape::classify(body)?.into_descriptors())
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug)]
struct CatalogCache {
    entries: Vec<ModelDescriptor>,
    fetched_at: Instant,
}

/// Cached view of the runner's model list
pub struct ModelCatalog {
    http: reqwest::Client,
    models_url: String,
    ttl: Duration,
    timeout: Duration,
    cache: RwLock<Option<Arc<CatalogCache>>>,
}

impl ModelCatalog {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            models_url: format!("{}/models", config.endpoint_url()),
            ttl: config.model_cache_ttl,
            timeout: config.connection_timeout,
            cache: RwLock::new(None),
        }
    }

    /// Current model list.
    ///
    /// Served from cache while younger than the TTL unless `force_refresh` is
    /// set. Never fails: a fetch error yields a single `error` descriptor.
    pub async fn list_models(&self, force_refresh: bool) -> Vec<ModelDescriptor> {
        if !force_refresh {
            if let Some(entries) = self.fresh() {
                debug!(count = entries.len(), "Serving model list from cache");
                return entries;
            }
        }

        let requested_at = Instant::now();
        match self.fetch().await {
            Ok(entries) => {
                info!(count = entries.len(), url = %self.models_url, "Refreshed model list");
                let cache = CatalogCache {
                    entries: entries.clone(),
                    fetched_at: requested_at,
                };
                *self.cache.write() = Some(Arc::new(cache));
                entries
            }
            Err(e) => {
                warn!(error = %e, url = %self.models_url, "Could not fetch models");
                vec![ModelDescriptor::fetch_error(&e)]
            }
        }
    }

    /// Last successfully fetched list, regardless of age
    pub fn cached(&self) -> Option<Vec<ModelDescriptor>> {
        self.cache.read().as_ref().map(|cache| cache.entries.clone())
    }

    fn fresh(&self) -> Option<Vec<ModelDescriptor>> {
        let cache = Arc::clone(self.cache.read().as_ref()?);
        (cache.fetched_at.elapsed() < self.ttl).then(|| cache.entries.clone())
    }

    async fn fetch(&self) -> Result<Vec<ModelDescriptor>, CatalogError> {
        let response = self
            .http
            .get(&self.models_url)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                url: self.models_url.clone(),
            });
        }

        let bytes = response.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes)?;
        parse_models(body)
    }
}

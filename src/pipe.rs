//! Request pipeline
//!
//! Entry point for the host: shapes each inbound body, picks the endpoint,
//! and relays it. Every failure is turned into an `Error: ...` reply, so the
//! host always gets text back.

use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::config::Config;
use crate::relay::{
    build_http_client, error_text, Relay, RelayError, RelayRequest, Reply, RetryPolicy,
};
use crate::shaper::{self, EndpointKind, ShapeError};
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub const PIPE_ID: &str = "docker_model_runner";
pub const PIPE_NAME: &str = "Docker Model Runner: ";
pub const PIPE_TYPE: &str = "manifold";

#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    #[error("Request body must be a JSON object")]
    NotAnObject,
    #[error("No model specified")]
    NoModel,
    #[error("Unable to determine request type")]
    UnknownRequestType,
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Wires the model catalog, shaping and relay together
pub struct Pipe {
    config: Config,
    catalog: ModelCatalog,
    relay: Relay,
}

impl Pipe {
    pub fn new(config: Config) -> Result<Self, RelayError> {
        let http = build_http_client(&config)?;
        let relay = Relay::new(http.clone(), RetryPolicy::from_config(&config));
        let catalog = ModelCatalog::new(http, &config);
        Ok(Self {
            config,
            catalog,
            relay,
        })
    }

    pub fn id(&self) -> &'static str {
        PIPE_ID
    }

    pub fn name(&self) -> &'static str {
        PIPE_NAME
    }

    pub fn pipe_type(&self) -> &'static str {
        PIPE_TYPE
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Models to present to the host, cached per the configured TTL
    pub async fn pipes(&self) -> Vec<ModelDescriptor> {
        self.catalog.list_models(false).await
    }

    /// Handle one inbound request body. Never fails; errors come back as text.
    pub async fn handle(&self, body: Value) -> Reply {
        let (request, streaming) = match self.prepare(body) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(error = %e, "Rejected request");
                return Reply::Text(error_text(&e));
            }
        };

        debug!(
            kind = request.kind.as_str(),
            url = %request.url,
            streaming,
            "Dispatching request"
        );
        self.relay.dispatch(request, streaming).await
    }

    /// Shape and classify a body into the outbound request.
    ///
    /// Returns the request and whether it should be streamed.
    pub fn prepare(&self, body: Value) -> Result<(RelayRequest, bool), PipeError> {
        let Value::Object(mut body) = body else {
            return Err(PipeError::NotAnObject);
        };

        let raw_model = body.get("model").and_then(Value::as_str).unwrap_or_default();
        let (model, messages) = shaper::normalize(raw_model, body.get("messages"))?;
        if model.is_empty() {
            return Err(PipeError::NoModel);
        }
        body.insert("model".to_string(), Value::String(model));
        if body.contains_key("messages") {
            body.insert("messages".to_string(), serde_json::json!(messages));
        }

        let kind = EndpointKind::classify(&body).ok_or(PipeError::UnknownRequestType)?;
        let streaming = kind == EndpointKind::Chat && wants_stream(&body);
        let url = format!("{}{}", self.config.endpoint_url(), kind.path());

        Ok((RelayRequest::new(kind, url, Value::Object(body)), streaming))
    }
}

fn wants_stream(body: &Map<String, Value>) -> bool {
    matches!(body.get("stream"), Some(Value::Bool(true)))
}

//! dmr-relay - Docker Model Runner request relay
//!
//! This crate provides:
//! - A cached model catalog for the runner's `/models` listing
//! - Request shaping (model id prefixes, text-only message content)
//! - A relay with retry/backoff and buffered or streamed delivery
//! - A CLI front end for trying it out

pub mod catalog;
pub mod config;
pub mod message;
pub mod pipe;
pub mod relay;
pub mod shaper;
pub mod telemetry;

pub use catalog::{CatalogError, ModelCatalog, ModelDescriptor};
pub use config::{Config, ConfigError};
pub use message::ChatMessage;
pub use pipe::{Pipe, PipeError};
pub use relay::{FragmentStream, Relay, RelayError, RelayRequest, Reply, RetryPolicy};
pub use shaper::{EndpointKind, ShapeError};
pub use telemetry::Telemetry;

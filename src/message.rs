//! Outbound chat message type.
//!
//! Inbound messages arrive in whatever shape the caller sends (plain string
//! content or a list of typed parts). After shaping they are reduced to a
//! role and a single text body, which is the only form forwarded upstream.

use serde::{Deserialize, Serialize};

pub const DEFAULT_ROLE: &str = "user";

/// A shaped, text-only chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(DEFAULT_ROLE, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

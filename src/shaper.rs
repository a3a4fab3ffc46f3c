//! Request shaping
//!
//! Normalizes inbound request bodies before they are relayed:
//! - strips the routing namespace from model ids (`ns.model` -> `model`)
//! - reduces multimodal message content to text, replacing images with a note
//! - classifies the body into the endpoint it should be sent to

use crate::message::{ChatMessage, DEFAULT_ROLE};
use serde_json::{Map, Value};

/// Substituted for every image part, since the runner only accepts text.
pub const IMAGE_PLACEHOLDER: &str = "[Image content removed - not supported by Docker Model Runner]";

#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("messages must be an array, got {0}")]
    MessagesNotArray(&'static str),
    #[error("message {index} must be an object, got {kind}")]
    MessageNotObject { index: usize, kind: &'static str },
}

/// Which upstream endpoint a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Chat,
    Completion,
    Embedding,
}

impl EndpointKind {
    /// Classify a request body by the fields it carries.
    ///
    /// `messages` wins over `input`, which wins over `prompt`.
    pub fn classify(body: &Map<String, Value>) -> Option<Self> {
        if body.contains_key("messages") {
            Some(EndpointKind::Chat)
        } else if body.contains_key("input") {
            Some(EndpointKind::Embedding)
        } else if body.contains_key("prompt") {
            Some(EndpointKind::Completion)
        } else {
            None
        }
    }

    /// Path relative to the API root
    pub fn path(&self) -> &'static str {
        match self {
            EndpointKind::Chat => "/chat/completions",
            EndpointKind::Completion => "/completions",
            EndpointKind::Embedding => "/embeddings",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::Chat => "chat",
            EndpointKind::Completion => "completion",
            EndpointKind::Embedding => "embedding",
        }
    }
}

/// Strip everything up to and including the first `.` from a model id.
pub fn normalize_model_id(model_id: &str) -> &str {
    match model_id.split_once('.') {
        Some((_, model)) => model,
        None => model_id,
    }
}

/// Shape a raw `messages` value into text-only chat messages.
///
/// Messages whose content shapes to an empty string are dropped.
pub fn shape_messages(messages: &Value) -> Result<Vec<ChatMessage>, ShapeError> {
    let raw = messages
        .as_array()
        .ok_or_else(|| ShapeError::MessagesNotArray(json_kind(messages)))?;

    let mut shaped = Vec::with_capacity(raw.len());
    for (index, message) in raw.iter().enumerate() {
        let message = message.as_object().ok_or(ShapeError::MessageNotObject {
            index,
            kind: json_kind(message),
        })?;
        let message = shape_message(message);
        if !message.is_empty() {
            shaped.push(message);
        }
    }
    Ok(shaped)
}

/// Shape a single message object. The result may have empty content.
pub fn shape_message(message: &Map<String, Value>) -> ChatMessage {
    let role = match message.get("role") {
        None | Some(Value::Null) => DEFAULT_ROLE.to_string(),
        Some(role) => value_to_text(role),
    };

    let content = match message.get("content") {
        Some(Value::Array(parts)) => shape_parts(parts),
        Some(content) => value_to_text(content),
        None => String::new(),
    };

    ChatMessage { role, content }
}

/// Model id and messages together, as the pipe needs them.
pub fn normalize(
    model_id: &str,
    messages: Option<&Value>,
) -> Result<(String, Vec<ChatMessage>), ShapeError> {
    let model = normalize_model_id(model_id).to_string();
    let messages = match messages {
        Some(messages) => shape_messages(messages)?,
        None => Vec::new(),
    };
    Ok((model, messages))
}

fn shape_parts(parts: &[Value]) -> String {
    let fragments: Vec<&str> = parts
        .iter()
        .filter_map(|part| {
            let part = part.as_object()?;
            match part.get("type").and_then(Value::as_str)? {
                "text" => Some(part.get("text").and_then(Value::as_str).unwrap_or("")),
                "image_url" | "image" => Some(IMAGE_PLACEHOLDER),
                _ => None,
            }
        })
        .collect();

    fragments.join(" ").trim().to_string()
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_model_id() {
        assert_eq!(normalize_model_id("docker_model_runner.ai/llama3.2"), "ai/llama3.2");
        assert_eq!(normalize_model_id("dmr.llama3"), "llama3");
        assert_eq!(normalize_model_id("llama3"), "llama3");
        assert_eq!(normalize_model_id("ns."), "");
    }

    #[test]
    fn test_plain_content_is_kept_verbatim() {
        let shaped = shape_messages(&json!([
            {"role": "system", "content": "  be brief  "},
            {"content": "hi"}
        ]))
        .unwrap();

        assert_eq!(
            shaped,
            vec![
                ChatMessage::new("system", "  be brief  "),
                ChatMessage::user("hi"),
            ]
        );
    }

    #[test]
    fn test_non_string_content_is_rendered() {
        let shaped = shape_messages(&json!([{"role": "user", "content": 42}])).unwrap();
        assert_eq!(shaped[0].content, "42");
    }

    #[test]
    fn test_multimodal_parts_reduced_to_text() {
        let shaped = shape_messages(&json!([{
            "role": "user",
            "content": [
                {"type": "text", "text": "look at"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}},
                {"type": "audio", "data": "..."},
                {"type": "text", "text": "this "}
            ]
        }]))
        .unwrap();

        assert_eq!(
            shaped[0].content,
            format!("look at {} this", IMAGE_PLACEHOLDER)
        );
    }

    #[test]
    fn test_image_only_message_keeps_placeholder() {
        let shaped = shape_messages(&json!([{
            "role": "user",
            "content": [{"type": "image_url", "image_url": {"url": "x"}}]
        }]))
        .unwrap();

        assert_eq!(shaped.len(), 1);
        assert_eq!(shaped[0].content, IMAGE_PLACEHOLDER);
    }

    #[test]
    fn test_empty_messages_are_dropped() {
        let raw = json!([
            {"role": "user", "content": ""},
            {"role": "assistant", "content": "kept"},
            {"role": "user", "content": [{"type": "text", "text": "   "}]},
            {"role": "user", "content": [{"type": "tool_result"}]},
            {"role": "user"},
            {"role": "user", "content": null}
        ]);

        let shaped = shape_messages(&raw).unwrap();
        assert_eq!(shaped, vec![ChatMessage::new("assistant", "kept")]);
    }

    #[test]
    fn test_shaping_is_idempotent() {
        let raw = json!([{
            "role": "user",
            "content": [{"type": "text", "text": "a"}, {"type": "image", "url": "b"}]
        }]);

        let first = shape_messages(&raw).unwrap();
        let second = shape_messages(&raw).unwrap();
        assert_eq!(first, second);

        let reshaped = shape_messages(&serde_json::to_value(&first).unwrap()).unwrap();
        assert_eq!(first, reshaped);
    }

    #[test]
    fn test_malformed_messages_rejected() {
        assert!(matches!(
            shape_messages(&json!("hi")),
            Err(ShapeError::MessagesNotArray("string"))
        ));
        assert!(matches!(
            shape_messages(&json!([{"content": "ok"}, 3])),
            Err(ShapeError::MessageNotObject { index: 1, .. })
        ));
    }

    #[test]
    fn test_classify_priority() {
        let body = |v: Value| v.as_object().cloned().unwrap();

        assert_eq!(
            EndpointKind::classify(&body(json!({"messages": [], "input": "x", "prompt": "y"}))),
            Some(EndpointKind::Chat)
        );
        assert_eq!(
            EndpointKind::classify(&body(json!({"input": "x", "prompt": "y"}))),
            Some(EndpointKind::Embedding)
        );
        assert_eq!(
            EndpointKind::classify(&body(json!({"prompt": "y"}))),
            Some(EndpointKind::Completion)
        );
        assert_eq!(EndpointKind::classify(&body(json!({"model": "m"}))), None);
    }

    #[test]
    fn test_normalize_combines_model_and_messages() {
        let (model, messages) =
            normalize("dmr.llama3", Some(&json!([{"role": "user", "content": "hi"}]))).unwrap();
        assert_eq!(model, "llama3");
        assert_eq!(messages, vec![ChatMessage::user("hi")]);

        let (model, messages) = normalize("llama3", None).unwrap();
        assert_eq!(model, "llama3");
        assert!(messages.is_empty());
    }
}

//! Conversation envelopes and the values that flow between loop iterations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::AgentHandle;

/// One entry of a conversation: the shape every model call sends and every
/// history slot stores. Serializes flat as `{role, type, message|image}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub role: String,
    #[serde(flatten)]
    pub payload: Payload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Text { message: String },
    Image { image: String },
}

impl Envelope {
    pub fn text(role: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            payload: Payload::Text {
                message: message.into(),
            },
        }
    }

    pub fn image(role: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            payload: Payload::Image {
                image: image.into(),
            },
        }
    }

    /// The textual body, regardless of payload kind. Image envelopes yield
    /// their reference so transcripts stay printable.
    pub fn body(&self) -> &str {
        match &self.payload {
            Payload::Text { message } => message,
            Payload::Image { image } => image,
        }
    }
}

/// What enters a dispatch cycle: raw text from a human or parent, or the
/// already-classified outcome of a tool run feeding back into the loop.
pub enum Query {
    Text(String),
    Outcome(ToolOutcome),
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::Text(text.to_string())
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::Text(text)
    }
}

/// The value a tool run produces, routed by `Agent::build_turn`.
pub enum ToolOutcome {
    Text(String),
    Json(Value),
    /// Reference to an image the next turn should carry instead of text.
    Image(String),
    /// A freshly created child agent to attach to the caller. `note` becomes
    /// the textual message of the turn.
    SpawnAgent { agent: AgentHandle, note: String },
}

impl ToolOutcome {
    /// Render the outcome as the message body of an envelope.
    pub fn render(&self) -> String {
        match self {
            ToolOutcome::Text(text) => text.clone(),
            ToolOutcome::Json(value) => match value.as_str() {
                Some(text) => text.to_string(),
                None => value.to_string(),
            },
            ToolOutcome::Image(reference) => reference.clone(),
            ToolOutcome::SpawnAgent { note, .. } => note.clone(),
        }
    }
}

/// A delegated unit of work driving an autonomous agent run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub description: String,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_envelope_serializes_flat() {
        let envelope = Envelope::text("User", "hello");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"role": "User", "type": "text", "message": "hello"})
        );
    }

    #[test]
    fn image_envelope_carries_single_payload_field() {
        let envelope = Envelope::image("User", "/tmp/shot.png");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"role": "User", "type": "image", "image": "/tmp/shot.png"})
        );
        let back: Envelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn outcome_renders_json_strings_bare() {
        let outcome = ToolOutcome::Json(serde_json::json!("plain"));
        assert_eq!(outcome.render(), "plain");

        let outcome = ToolOutcome::Json(serde_json::json!({"answer": 42}));
        assert_eq!(outcome.render(), r#"{"answer":42}"#);
    }
}

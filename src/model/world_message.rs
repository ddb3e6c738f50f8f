use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Messages the client sends over the world channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Ping,
    RequestState,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownMessage {
    CharacterAction {
        #[serde(default)]
        character: Option<String>,
        content: String,
    },
    SceneChange {
        content: String,
    },
    Pong,
}

/// Inbound world event. Types the client does not model are kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldMessage {
    CharacterAction {
        character: Option<String>,
        content: String,
    },
    SceneChange {
        content: String,
    },
    Pong,
    Unknown {
        event_type: String,
        raw: Value,
    },
}

impl WorldMessage {
    pub fn event_type(&self) -> &str {
        match self {
            WorldMessage::CharacterAction { .. } => "character_action",
            WorldMessage::SceneChange { .. } => "scene_change",
            WorldMessage::Pong => "pong",
            WorldMessage::Unknown { event_type, .. } => event_type,
        }
    }
}

impl From<KnownMessage> for WorldMessage {
    fn from(known: KnownMessage) -> Self {
        match known {
            KnownMessage::CharacterAction { character, content } => {
                WorldMessage::CharacterAction { character, content }
            }
            KnownMessage::SceneChange { content } => WorldMessage::SceneChange { content },
            KnownMessage::Pong => WorldMessage::Pong,
        }
    }
}

#[derive(Debug, Error)]
pub enum MessageDecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message has no string `type` field")]
    MissingType,
}

/// Decode one inbound text frame.
///
/// Anything that is a JSON object with a string `type` is accepted; objects
/// whose shape does not match a modelled type fall through to `Unknown`.
pub fn decode_world_message(text: &str) -> Result<WorldMessage, MessageDecodeError> {
    let value: Value = serde_json::from_str(text)?;

    let Value::Object(ref fields) = value else {
        return Err(MessageDecodeError::NotAnObject);
    };

    let event_type = fields
        .get("type")
        .and_then(Value::as_str)
        .ok_or(MessageDecodeError::MissingType)?
        .to_string();

    match serde_json::from_value::<KnownMessage>(value.clone()) {
        Ok(known) => Ok(known.into()),
        Err(_) => Ok(WorldMessage::Unknown {
            event_type,
            raw: value,
        }),
    }
}

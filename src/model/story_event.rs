use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryEventKind {
    Dialogue,
    Action,
    Narration,
    Scene,
    GmEvent,
    Speak,
    Move,
    Interact,
    Think,
    Observe,
}

impl StoryEventKind {
    /// Maps an action or GM note type (`speak`, `narration`, ...) onto an
    /// event kind. Unrecognised types read as a plain action.
    pub fn from_action_type(action_type: &str) -> Self {
        match action_type {
            "speak" => StoryEventKind::Speak,
            "move" => StoryEventKind::Move,
            "interact" => StoryEventKind::Interact,
            "think" => StoryEventKind::Think,
            "observe" => StoryEventKind::Observe,
            "dialogue" => StoryEventKind::Dialogue,
            "narration" => StoryEventKind::Narration,
            "scene" => StoryEventKind::Scene,
            "gm_event" => StoryEventKind::GmEvent,
            _ => StoryEventKind::Action,
        }
    }
}

/// One line of the world's story log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StoryEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,
    pub content: String,
    pub timestamp: String,
}

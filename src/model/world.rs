use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/* =========================
   Requests
   ========================= */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldData {
    pub name: String,
    pub description: String,
    pub genre: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atmosphere: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_locations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub historical_events: Vec<String>,
}

impl Default for WorldData {
    fn default() -> Self {
        Self {
            name: "Aethermoor".into(),
            description:
                "A realm where magic flows through ancient ley lines and mythical creatures roam enchanted forests."
                    .into(),
            genre: "Fantasy".into(),
            atmosphere: Some("Mystical and adventurous".into()),
            key_locations: vec![
                "Crystal Spire".into(),
                "Whispering Woods".into(),
                "Shadowfen Marsh".into(),
                "Dragon's Rest".into(),
            ],
            rules: Some(
                "Magic is real, heroes rise from humble beginnings, and every choice shapes destiny."
                    .into(),
            ),
            historical_events: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterData {
    pub name: String,
    pub role: String,
    pub personality: String,
    pub backstory: String,
    pub goals: Vec<String>,
    pub traits: Vec<String>,
    pub appearance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_style: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub relationships: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterAction {
    pub character_id: String,
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmCommand {
    pub command: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSave {
    pub world_id: String,
    pub session_name: String,
}

/* =========================
   Responses
   ========================= */

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorldResponse {
    pub world_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorldSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub character_count: u32,
    #[serde(default)]
    pub event_count: u32,
    #[serde(default)]
    pub key_locations: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorldList {
    #[serde(default)]
    pub worlds: Vec<WorldSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CharacterStats {
    #[serde(default)]
    pub health: Option<i32>,
    #[serde(default)]
    pub energy: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CharacterSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub stats: CharacterStats,
    #[serde(default)]
    pub emotional_state: Option<String>,
}

impl CharacterSummary {
    pub fn health(&self) -> i32 {
        self.stats.health.unwrap_or(100)
    }

    pub fn energy(&self) -> i32 {
        self.stats.energy.unwrap_or(100)
    }

    pub fn mood(&self) -> &str {
        self.emotional_state.as_deref().unwrap_or("neutral")
    }

    /// Take on the emotional state reported by an action, if any.
    pub fn apply_response(&mut self, response: &ActionResponse) {
        if let Some(state) = &response.emotional_state {
            self.emotional_state = Some(state.clone());
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CharacterList {
    #[serde(default)]
    pub characters: Vec<CharacterSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub character_response: String,
    #[serde(default)]
    pub emotional_state: Option<String>,
}

/// Result of `GET /health`. A failed check is reported as `status: "error"`
/// rather than as an error value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthStatus {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            message: Some(message.into()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status != "error"
    }
}

use serde::{Deserialize, Serialize};

/// Server-authoritative reading counters, mirrored after every generation
/// action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryState {
    pub user_id: String,
    pub current_chapter: u32,
    pub current_page: u32,
    pub total_pages: u32,
    pub pages_generated: u32,
}

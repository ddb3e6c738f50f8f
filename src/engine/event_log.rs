use std::collections::VecDeque;

use uuid::Uuid;

use crate::model::story_event::{StoryEvent, StoryEventKind};
use crate::model::world::ActionResponse;
use crate::model::world_message::WorldMessage;

const JUST_NOW: &str = "Just now";

/// World story log, newest first.
#[derive(Debug, Default)]
pub struct StoryEventLog {
    events: VecDeque<StoryEvent>,
    capacity: Option<usize>,
}

impl StoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Oldest events are dropped once `capacity` is reached.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity: Some(capacity),
        }
    }

    pub fn record(
        &mut self,
        kind: StoryEventKind,
        character: Option<String>,
        content: impl Into<String>,
    ) -> &StoryEvent {
        let event = StoryEvent {
            id: Uuid::new_v4().to_string(),
            kind,
            character,
            content: content.into(),
            timestamp: JUST_NOW.to_string(),
        };

        self.events.push_front(event);
        if let Some(cap) = self.capacity {
            self.events.truncate(cap.max(1));
        }
        &self.events[0]
    }

    /// Log the story-relevant part of an inbound world message. Pongs and
    /// unmodelled types are not story events.
    pub fn apply(&mut self, message: &WorldMessage) -> Option<&StoryEvent> {
        match message {
            WorldMessage::CharacterAction { character, content } => {
                Some(self.record(StoryEventKind::Action, character.clone(), content.clone()))
            }
            WorldMessage::SceneChange { content } => {
                Some(self.record(StoryEventKind::Scene, None, content.clone()))
            }
            WorldMessage::Pong | WorldMessage::Unknown { .. } => None,
        }
    }

    /// Log what a character said or did in reply to a performed action.
    pub fn record_action(
        &mut self,
        action_type: &str,
        character: impl Into<String>,
        response: &ActionResponse,
    ) -> &StoryEvent {
        self.record(
            StoryEventKind::from_action_type(action_type),
            Some(character.into()),
            response.character_response.clone(),
        )
    }

    /// Log a game master's note (narration, dialogue, ...). Commands sent to
    /// the service are not logged here; their effects arrive on the world
    /// channel.
    pub fn record_note(&mut self, note_type: &str, content: impl Into<String>) -> &StoryEvent {
        self.record(StoryEventKind::from_action_type(note_type), None, content)
    }

    pub fn latest(&self) -> Option<&StoryEvent> {
        self.events.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoryEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_event_comes_first() {
        let mut log = StoryEventLog::new();
        log.record(StoryEventKind::Narration, None, "first");
        log.record(StoryEventKind::Narration, None, "second");

        let contents: Vec<&str> = log.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["second", "first"]);
        assert_eq!(log.latest().unwrap().content, "second");
    }

    #[test]
    fn ids_are_unique() {
        let mut log = StoryEventLog::new();
        let a = log.record(StoryEventKind::Scene, None, "x").id.clone();
        let b = log.record(StoryEventKind::Scene, None, "x").id.clone();
        assert_ne!(a, b);
    }

    #[test]
    fn applies_character_actions_and_scene_changes() {
        let mut log = StoryEventLog::new();

        let action = log
            .apply(&WorldMessage::CharacterAction {
                character: Some("Lyra".into()),
                content: "nocks an arrow".into(),
            })
            .cloned()
            .unwrap();
        assert_eq!(action.kind, StoryEventKind::Action);
        assert_eq!(action.character.as_deref(), Some("Lyra"));
        assert_eq!(action.timestamp, "Just now");

        let scene = log
            .apply(&WorldMessage::SceneChange {
                content: "Fog rolls in.".into(),
            })
            .cloned()
            .unwrap();
        assert_eq!(scene.kind, StoryEventKind::Scene);

        assert!(log.apply(&WorldMessage::Pong).is_none());
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn capacity_drops_oldest() {
        let mut log = StoryEventLog::with_capacity(2);
        for n in 0..5 {
            log.record(StoryEventKind::Narration, None, n.to_string());
        }
        let contents: Vec<&str> = log.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["4", "3"]);
    }

    #[test]
    fn action_responses_become_events_of_the_action_type() {
        let mut log = StoryEventLog::new();
        let response = ActionResponse {
            character_response: "\"Stay behind me,\" Lyra whispers.".into(),
            emotional_state: Some("determined".into()),
        };

        let event = log.record_action("speak", "Lyra", &response).clone();
        assert_eq!(event.kind, StoryEventKind::Speak);
        assert_eq!(event.character.as_deref(), Some("Lyra"));
        assert_eq!(event.content, response.character_response);

        log.record_action("juggle", "Bram", &ActionResponse::default());
        assert_eq!(log.latest().unwrap().kind, StoryEventKind::Action);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn gm_notes_have_no_character() {
        let mut log = StoryEventLog::new();
        log.record_note("narration", "The wind howls through the pass.");
        log.record_note("gm_event", "A storm gathers.");

        let kinds: Vec<StoryEventKind> = log.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![StoryEventKind::GmEvent, StoryEventKind::Narration]);
        assert!(log.iter().all(|e| e.character.is_none()));
    }
}

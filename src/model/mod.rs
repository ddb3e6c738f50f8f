pub mod chapter;
pub mod page;
pub mod story_event;
pub mod story_state;
pub mod world;
pub mod world_message;

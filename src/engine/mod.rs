pub mod content_client;
pub mod engine;
pub mod event_log;
pub mod identity;
pub mod page_cache;
pub mod prefetch;
pub mod protocol;
pub mod realtime;
pub mod reveal;
pub mod scheduler;
pub mod session;
pub mod transport;
pub mod world_client;

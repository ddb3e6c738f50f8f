//! Reading client for a remotely generated, page-by-page story.
//!
//! [`engine::content_client::ContentClient`] fetches, caches and prefetches
//! pages; [`engine::reveal::RevealEngine`] paces the reader and asks for more;
//! [`engine::realtime::RealtimeChannel`] follows a simulated world's live
//! events.

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;

pub use config::Config;
pub use engine::content_client::ContentClient;
pub use engine::realtime::{ConnectionState, RealtimeChannel};
pub use engine::reveal::{RevealEngine, RevealEvent, RevealState};
pub use error::{ChannelError, ClientError};
pub use model::page::PageRecord;

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use tracing::{error, info};

use crate::config::Config;
use crate::engine::identity::SessionIdentity;
use crate::engine::transport::{send_json, HttpRequest, HttpTransport};
use crate::error::ClientError;
use crate::model::world::{
    ActionResponse, CharacterAction, CharacterData, CharacterList, CreateWorldResponse,
    GmCommand, HealthStatus, SessionSave, WorldData, WorldList,
};

/// World, character and game-master endpoints.
///
/// Unlike the reading path these calls have no meaningful fallback, so
/// failures are logged and returned.
pub struct WorldClient {
    config: Config,
    transport: Arc<dyn HttpTransport>,
    identity: SessionIdentity,
}

impl WorldClient {
    pub fn new(config: Config, transport: Arc<dyn HttpTransport>, identity: SessionIdentity) -> Self {
        info!(base_url = %config.base_url, "world client initialized");
        Self {
            config,
            transport,
            identity,
        }
    }

    pub fn user_id(&self) -> &str {
        self.identity.id()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_root(), path)
    }

    fn call<T: serde::de::DeserializeOwned>(
        &self,
        what: &str,
        request: HttpRequest,
    ) -> Result<T, ClientError> {
        send_json(&*self.transport, request).map_err(|e| {
            error!(error = %e, "failed to {what}");
            e
        })
    }

    fn post_json<B: Serialize>(&self, url: String, body: &B) -> Result<HttpRequest, ClientError> {
        Ok(HttpRequest::post(url).json(serde_json::to_value(body)?))
    }

    /* ---------- worlds ---------- */

    pub fn create_world(&self, world: &WorldData) -> Result<CreateWorldResponse, ClientError> {
        let url = self.url(&format!("/world/create?user_id={}", self.user_id()));
        self.call("create world", self.post_json(url, world)?)
    }

    pub fn get_worlds(&self) -> Result<WorldList, ClientError> {
        let url = self.url(&format!("/worlds/{}", self.user_id()));
        self.call("get worlds", HttpRequest::get(url))
    }

    pub fn simulate_world(&self, world_id: &str) -> Result<Value, ClientError> {
        let url = self.url(&format!("/world/{world_id}/simulate"));
        self.call("simulate world", HttpRequest::post(url))
    }

    /* ---------- characters ---------- */

    pub fn create_character(
        &self,
        world_id: &str,
        character: &CharacterData,
    ) -> Result<Value, ClientError> {
        let url = self.url(&format!("/character/create/{world_id}"));
        self.call("create character", self.post_json(url, character)?)
    }

    pub fn get_characters(&self, world_id: &str) -> Result<CharacterList, ClientError> {
        let url = self.url(&format!("/characters/{world_id}"));
        self.call("get characters", HttpRequest::get(url))
    }

    pub fn perform_action(&self, action: &CharacterAction) -> Result<ActionResponse, ClientError> {
        let url = self.url("/character/action");
        self.call("perform character action", self.post_json(url, action)?)
    }

    /* ---------- game master ---------- */

    pub fn execute_command(&self, world_id: &str, command: &GmCommand) -> Result<Value, ClientError> {
        let url = self.url(&format!("/gm/command?world_id={world_id}"));
        self.call("execute GM command", self.post_json(url, command)?)
    }

    pub fn save_session(&self, world_id: &str, session_name: &str) -> Result<Value, ClientError> {
        let body = SessionSave {
            world_id: world_id.to_string(),
            session_name: session_name.to_string(),
        };
        let url = self.url("/session/save");
        self.call("save session", self.post_json(url, &body)?)
    }

    pub fn get_sessions(&self, world_id: &str) -> Result<Value, ClientError> {
        let url = self.url(&format!("/sessions/{world_id}"));
        self.call("get sessions", HttpRequest::get(url))
    }

    /// Never fails: an unreachable service reads as `status: "error"`.
    pub fn check_health(&self) -> HealthStatus {
        let url = self.url("/health");
        match send_json::<HealthStatus>(&*self.transport, HttpRequest::get(url)) {
            Ok(status) => status,
            Err(e) => {
                error!(error = %e, "health check failed");
                HealthStatus::error(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::identity::{KeyValueStore, MemoryStore, GM_ID_KEY};
    use crate::engine::transport::{HttpResponse, Method};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<HttpRequest>>,
        reply: Mutex<Option<HttpResponse>>,
    }

    impl HttpTransport for Recorder {
        fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
            self.requests.lock().push(request);
            self.reply
                .lock()
                .clone()
                .ok_or_else(|| ClientError::Transport("connection refused".into()))
        }
    }

    fn client(reply: Option<&str>) -> (WorldClient, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        *recorder.reply.lock() = reply.map(HttpResponse::ok);

        let store = Arc::new(MemoryStore::new());
        store.set(GM_ID_KEY, "gm_test");

        let client = WorldClient::new(
            Config::default(),
            recorder.clone(),
            SessionIdentity::game_master(store),
        );
        (client, recorder)
    }

    #[test]
    fn create_world_posts_body_with_user_query() {
        let (client, recorder) = client(Some(r#"{"world_id":"w-1"}"#));
        let resp = client.create_world(&WorldData::default()).unwrap();
        assert_eq!(resp.world_id, "w-1");

        let req = &recorder.requests.lock()[0];
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.url, "http://localhost:8000/world/create?user_id=gm_test");
        assert_eq!(req.body.as_ref().unwrap()["name"], "Aethermoor");
    }

    #[test]
    fn gm_command_targets_world_query() {
        let (client, recorder) = client(Some("{}"));
        let command = GmCommand {
            command: "set_scene".into(),
            parameters: HashMap::from([("mood".to_string(), Value::from("mysterious"))]),
        };
        client.execute_command("w-9", &command).unwrap();

        let req = &recorder.requests.lock()[0];
        assert_eq!(req.url, "http://localhost:8000/gm/command?world_id=w-9");
        assert_eq!(req.body.as_ref().unwrap()["parameters"]["mood"], "mysterious");
    }

    #[test]
    fn failures_are_returned() {
        let (client, _) = client(None);
        assert!(client.get_worlds().unwrap_err().is_unreachable());
    }

    #[test]
    fn health_check_never_fails() {
        let (client, _) = client(None);
        let health = client.check_health();
        assert!(!health.is_healthy());

        let (client, _) = self::client(Some(r#"{"status":"healthy"}"#));
        assert!(client.check_health().is_healthy());
    }
}

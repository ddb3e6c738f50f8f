#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use spelltale::config::Config;
use spelltale::engine::content_client::ContentClient;
use spelltale::engine::identity::{KeyValueStore, MemoryStore, SessionIdentity, READER_ID_KEY};
use spelltale::engine::scheduler::ManualScheduler;
use spelltale::engine::transport::{HttpRequest, HttpResponse, HttpTransport};
use spelltale::error::ClientError;

pub const USER: &str = "user_test";

/// In-memory story service keyed by URL path.
#[derive(Default)]
pub struct FakeService {
    pub requests: Mutex<Vec<String>>,
    pub pages: Mutex<HashMap<u32, (String, bool)>>,
    pub state: Mutex<Option<String>>,
    pub chapter: Mutex<Option<String>>,
    pub offline: Mutex<bool>,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn page(&self, n: u32, content: &str, next_ready: bool) {
        self.pages.lock().insert(n, (content.to_string(), next_ready));
    }

    pub fn state(&self, current_page: u32, total_pages: u32) {
        *self.state.lock() = Some(format!(
            r#"{{"user_id":"{USER}","current_chapter":1,"current_page":{current_page},"total_pages":{total_pages},"pages_generated":{total_pages}}}"#
        ));
    }

    pub fn go_offline(&self) {
        *self.offline.lock() = true;
    }

    pub fn page_requests(&self, n: u32) -> usize {
        let suffix = format!("/page/{USER}/{n}");
        self.requests
            .lock()
            .iter()
            .filter(|url| url.ends_with(&suffix))
            .count()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl HttpTransport for FakeService {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        self.requests.lock().push(request.url.clone());

        if *self.offline.lock() {
            return Err(ClientError::Transport("connection refused".into()));
        }

        let path = request
            .url
            .strip_prefix("http://localhost:8000")
            .unwrap_or(&request.url)
            .to_string();

        let not_found = HttpResponse {
            status: 404,
            body: r#"{"detail":"not found"}"#.into(),
        };

        if let Some(n) = path.strip_prefix(&format!("/page/{USER}/")) {
            let n: u32 = n.parse().unwrap();
            return Ok(match self.pages.lock().get(&n) {
                Some((content, ready)) => HttpResponse::ok(format!(
                    r#"{{"page_number":{n},"content":"{content}","chapter_id":1,"is_generated":true,"next_page_ready":{ready}}}"#
                )),
                None => not_found,
            });
        }
        if path == format!("/story/state/{USER}") {
            return Ok(self.state.lock().clone().map(HttpResponse::ok).unwrap_or(not_found));
        }
        if path == format!("/chapter/new/{USER}") {
            return Ok(self.chapter.lock().clone().map(HttpResponse::ok).unwrap_or(not_found));
        }
        Ok(not_found)
    }
}

pub fn client(service: &Arc<FakeService>) -> (ContentClient, Arc<ManualScheduler>) {
    let store = Arc::new(MemoryStore::new());
    store.set(READER_ID_KEY, USER);

    let scheduler = Arc::new(ManualScheduler::new());
    let client = ContentClient::new(
        Config::default(),
        service.clone(),
        SessionIdentity::reader(store),
        scheduler.clone(),
    );
    (client, scheduler)
}

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::identity::SessionIdentity;
use crate::engine::page_cache::PageCache;
use crate::engine::prefetch::PrefetchScheduler;
use crate::engine::scheduler::Scheduler;
use crate::engine::transport::{send_json, HttpRequest, HttpTransport};
use crate::error::ClientError;
use crate::model::chapter::Chapter;
use crate::model::page::{NewChapterResponse, PageListing, PageRecord};
use crate::model::story_state::StoryState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Reader,
    Prefetch,
}

/* =========================
   In-flight fetches
   ========================= */

/// Shared outcome of one remote page fetch. Every caller asking for the same
/// page while it is in flight waits here instead of issuing its own request.
struct Flight {
    result: Mutex<Option<PageRecord>>,
    done: Condvar,
}

impl Flight {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn wait(&self) -> PageRecord {
        let mut slot = self.result.lock();
        loop {
            if let Some(record) = slot.as_ref() {
                return record.clone();
            }
            self.done.wait(&mut slot);
        }
    }

    fn complete(&self, record: PageRecord) {
        let mut slot = self.result.lock();
        if slot.is_none() {
            *slot = Some(record);
        }
        self.done.notify_all();
    }

    fn is_complete(&self) -> bool {
        self.result.lock().is_some()
    }
}

/// Held by the caller that performs the fetch. Releases the in-flight slot
/// and wakes waiters even if the fetch unwinds.
struct FlightLease<'a> {
    shared: &'a Shared,
    flight: Arc<Flight>,
    page_number: u32,
}

impl FlightLease<'_> {
    fn finish(self, record: PageRecord) {
        self.flight.complete(record);
    }
}

impl Drop for FlightLease<'_> {
    fn drop(&mut self) {
        {
            let mut inner = self.shared.inner.lock();
            let ours = inner
                .in_flight
                .get(&self.page_number)
                .is_some_and(|f| Arc::ptr_eq(f, &self.flight));
            if ours {
                inner.in_flight.remove(&self.page_number);
            }
        }
        if !self.flight.is_complete() {
            self.flight.complete(PageRecord::fallback(self.page_number));
        }
    }
}

/* =========================
   Client
   ========================= */

#[derive(Default)]
struct Inner {
    cache: PageCache,
    story_state: Option<StoryState>,
    in_flight: HashMap<u32, Arc<Flight>>,
}

struct Shared {
    config: Config,
    transport: Arc<dyn HttpTransport>,
    identity: SessionIdentity,
    prefetch: PrefetchScheduler,
    inner: Mutex<Inner>,
}

/// Page/state/chapter access against the story service.
///
/// Owns the page cache and the mirrored [`StoryState`]. Reading operations
/// never fail: any service problem is logged and replaced with fallback
/// content. Cloning is cheap and clones share one cache.
#[derive(Clone)]
pub struct ContentClient {
    shared: Arc<Shared>,
}

impl ContentClient {
    pub fn new(
        config: Config,
        transport: Arc<dyn HttpTransport>,
        identity: SessionIdentity,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let prefetch = PrefetchScheduler::new(scheduler, config.prefetch_delay);

        info!(base_url = %config.base_url, user_id = %identity.id(), "content client initialized");

        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                identity,
                prefetch,
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    pub fn user_id(&self) -> &str {
        self.shared.identity.id()
    }

    pub fn base_url(&self) -> &str {
        &self.shared.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.shared.config.api_root(), path)
    }

    /* ---------- pages ---------- */

    /// Cached page, or a fresh fetch, or the fallback page on failure.
    pub fn get_page(&self, page_number: u32) -> PageRecord {
        self.resolve(page_number, Origin::Reader)
    }

    /// Content of the page after the server's current page.
    pub fn generate_next_part(&self) -> String {
        let current = self.current_page();
        let Some(next) = current.checked_add(1) else {
            warn!(page = current, "no page after the last page number; repeating it");
            return self.get_page(current).content;
        };
        info!(page = next, "getting next page");
        self.get_page(next).content
    }

    fn resolve(&self, page_number: u32, origin: Origin) -> PageRecord {
        let shared = &*self.shared;

        let (lease, epoch) = {
            let mut inner = shared.inner.lock();

            if let Some(page) = inner.cache.get(page_number) {
                debug!(page = page_number, "retrieved page from cache");
                return page.clone();
            }

            if let Some(flight) = inner.in_flight.get(&page_number).cloned() {
                drop(inner);
                debug!(page = page_number, "joining in-flight fetch");
                return flight.wait();
            }

            let flight = Arc::new(Flight::new());
            inner.in_flight.insert(page_number, flight.clone());
            let lease = FlightLease {
                shared,
                flight,
                page_number,
            };
            (lease, inner.cache.epoch())
        };

        info!(page = page_number, epoch, ?origin, "fetching page from server");

        let (record, stored) = match self.fetch_page(page_number) {
            Ok(page) => {
                let stored = shared
                    .inner
                    .lock()
                    .cache
                    .insert(epoch, page_number, page.clone());
                if stored {
                    info!(
                        page = page_number,
                        next_ready = page.next_page_ready,
                        "page loaded"
                    );
                } else {
                    debug!(page = page_number, epoch, "discarding response from a stale epoch");
                }
                (page, stored)
            }
            Err(e) => {
                warn!(page = page_number, error = %e, ?origin, "failed to get page; using fallback");
                (PageRecord::fallback(page_number), false)
            }
        };

        lease.finish(record.clone());

        if stored && origin == Origin::Reader && !record.next_page_ready {
            if let Some(next) = page_number.checked_add(1) {
                self.schedule_prefetch(next);
            }
        }

        record
    }

    fn fetch_page(&self, page_number: u32) -> Result<PageRecord, ClientError> {
        let url = self.url(&format!("/page/{}/{}", self.user_id(), page_number));
        send_json(&*self.shared.transport, HttpRequest::get(url))
    }

    fn schedule_prefetch(&self, page_number: u32) {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        self.shared.prefetch.schedule(page_number, move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            ContentClient { shared }.preload(page_number);
        });
    }

    /// Warm the cache for `page_number`. Failures are logged by `resolve`.
    fn preload(&self, page_number: u32) {
        if self.shared.inner.lock().cache.contains(page_number) {
            return;
        }
        info!(page = page_number, "preloading page");
        self.resolve(page_number, Origin::Prefetch);
    }

    /* ---------- story state ---------- */

    /// Refresh the mirrored state. On failure the previous state is kept.
    pub fn load_story_state(&self) -> Option<StoryState> {
        match self.try_load_story_state() {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(error = %e, "failed to load story state");
                self.story_state()
            }
        }
    }

    fn try_load_story_state(&self) -> Result<StoryState, ClientError> {
        let url = self.url(&format!("/story/state/{}", self.user_id()));
        let state: StoryState = send_json(&*self.shared.transport, HttpRequest::get(url))?;

        info!(
            chapter = state.current_chapter,
            page = state.current_page,
            total = state.total_pages,
            "story state loaded"
        );
        self.shared.inner.lock().story_state = Some(state.clone());
        Ok(state)
    }

    pub fn story_state(&self) -> Option<StoryState> {
        self.shared.inner.lock().story_state.clone()
    }

    /// Server's current page; 1 until state is known.
    pub fn current_page(&self) -> u32 {
        self.story_state()
            .map(|s| s.current_page)
            .filter(|&p| p > 0)
            .unwrap_or(1)
    }

    pub fn current_chapter(&self) -> u32 {
        self.story_state()
            .map(|s| s.current_chapter)
            .filter(|&c| c > 0)
            .unwrap_or(1)
    }

    /// 0 until state is known.
    pub fn total_pages(&self) -> u32 {
        self.story_state().map(|s| s.total_pages).unwrap_or(0)
    }

    /* ---------- chapters ---------- */

    /// Ask the service for a new chapter. On success the page cache is
    /// cleared (new epoch) and state reloaded; on failure the cache is left
    /// alone and a fallback chapter is returned.
    pub fn generate_new_chapter(&self) -> Chapter {
        info!("creating new chapter");

        let url = self.url(&format!("/chapter/new/{}", self.user_id()));
        let resp: NewChapterResponse =
            match send_json(&*self.shared.transport, HttpRequest::post(url)) {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(error = %e, "failed to generate new chapter; using fallback");
                    return Chapter::fallback_new_chapter();
                }
            };

        let title = resp.title.clone();
        let page = resp.into_page();

        let epoch = {
            let mut inner = self.shared.inner.lock();
            inner.in_flight.clear();
            inner.cache.clear()
        };
        self.shared.prefetch.cancel_all();
        info!(chapter = page.chapter_id, epoch, "new chapter created; page cache cleared");

        self.load_story_state();

        match title {
            Some(title) => Chapter::titled(page, title),
            None => Chapter::from_page(page),
        }
    }

    /// Load state and the reader's current page. Never fails.
    pub fn initialize_story(&self) -> Chapter {
        info!(base_url = %self.base_url(), "initializing story");
        self.load_story_state();
        let page = self.get_page(self.current_page());
        info!(page = page.page_number, "story initialized");
        Chapter::from_page(page)
    }

    /// Like [`initialize_story`](Self::initialize_story), but reports when
    /// the service cannot be reached at all so the caller can show a
    /// connectivity error instead of fallback text.
    pub fn bootstrap(&self) -> Result<Chapter, ClientError> {
        info!(base_url = %self.base_url(), "bootstrapping");
        match self.try_load_story_state() {
            Ok(_) => {}
            Err(e) if e.is_unreachable() => return Err(e),
            Err(e) => warn!(error = %e, "story state unavailable; starting at page 1"),
        }
        let page = self.get_page(self.current_page());
        Ok(Chapter::from_page(page))
    }

    /* ---------- diagnostics ---------- */

    pub fn get_all_pages(&self) -> PageListing {
        let url = self.url(&format!("/pages/{}", self.user_id()));
        send_json(&*self.shared.transport, HttpRequest::get(url)).unwrap_or_else(|e| {
            warn!(error = %e, "failed to get all pages");
            PageListing::default()
        })
    }

    pub fn cached_pages(&self) -> Vec<u32> {
        self.shared.inner.lock().cache.page_numbers()
    }

    pub fn is_cached(&self, page_number: u32) -> bool {
        self.shared.inner.lock().cache.contains(page_number)
    }

    pub fn epoch(&self) -> u64 {
        self.shared.inner.lock().cache.epoch()
    }

    pub fn pending_prefetches(&self) -> usize {
        self.shared.prefetch.pending_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::identity::MemoryStore;
    use crate::engine::scheduler::ManualScheduler;
    use crate::engine::transport::HttpResponse;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::thread;
    use std::time::Duration;

    /// Page requests block until the test releases them.
    struct GatedTransport {
        requests: Mutex<Vec<String>>,
        entered: Mutex<Sender<String>>,
        release: Mutex<Receiver<HttpResponse>>,
    }

    impl HttpTransport for GatedTransport {
        fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
            self.requests.lock().push(request.url.clone());

            if request.url.contains("/page/") {
                let _ = self.entered.lock().send(request.url.clone());
                return self
                    .release
                    .lock()
                    .recv()
                    .map_err(|_| ClientError::Transport("released".into()));
            }
            if request.url.contains("/chapter/new/") {
                return Ok(HttpResponse::ok(
                    r#"{"page_number":1,"content":"Chapter two opens.","chapter_id":2}"#,
                ));
            }
            Err(ClientError::Transport("connection refused".into()))
        }
    }

    fn gated() -> (
        ContentClient,
        Arc<GatedTransport>,
        Receiver<String>,
        Sender<HttpResponse>,
    ) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let transport = Arc::new(GatedTransport {
            requests: Mutex::new(Vec::new()),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let client = ContentClient::new(
            Config::default(),
            transport.clone(),
            SessionIdentity::reader(Arc::new(MemoryStore::new())),
            Arc::new(ManualScheduler::new()),
        );
        (client, transport, entered_rx, release_tx)
    }

    fn page_json(n: u32, content: &str) -> HttpResponse {
        HttpResponse::ok(format!(
            r#"{{"page_number":{n},"content":"{content}","chapter_id":1,"is_generated":true,"next_page_ready":true}}"#
        ))
    }

    /// Callers holding the in-flight entry besides the map and the leader.
    fn joined(client: &ContentClient, page_number: u32) -> usize {
        client
            .shared
            .inner
            .lock()
            .in_flight
            .get(&page_number)
            .map(|f| Arc::strong_count(f).saturating_sub(2))
            .unwrap_or(0)
    }

    #[test]
    fn concurrent_requests_for_one_page_share_a_fetch() {
        let (client, transport, entered, release) = gated();

        let leader = {
            let client = client.clone();
            thread::spawn(move || client.get_page(2))
        };
        entered.recv_timeout(Duration::from_secs(5)).unwrap();

        let follower = {
            let client = client.clone();
            thread::spawn(move || client.get_page(2))
        };
        while joined(&client, 2) == 0 {
            thread::yield_now();
        }

        release.send(page_json(2, "The tower trembled.")).unwrap();

        let a = leader.join().unwrap();
        let b = follower.join().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.content, "The tower trembled.");
        assert_eq!(transport.requests.lock().len(), 1);
        assert!(client.shared.inner.lock().in_flight.is_empty());
    }

    #[test]
    fn response_from_before_a_chapter_reset_is_discarded() {
        let (client, _transport, entered, release) = gated();

        let reader = {
            let client = client.clone();
            thread::spawn(move || client.get_page(3))
        };
        entered.recv_timeout(Duration::from_secs(5)).unwrap();

        let chapter = client.generate_new_chapter();
        assert_eq!(chapter.id, 2);
        assert_eq!(client.epoch(), 1);

        release.send(page_json(3, "A page from chapter one.")).unwrap();
        let late = reader.join().unwrap();

        assert_eq!(late.content, "A page from chapter one.");
        assert!(!client.is_cached(3));
        assert!(client.cached_pages().is_empty());
    }

    #[test]
    fn failed_leader_hands_fallback_to_waiters() {
        let (client, _transport, entered, release) = gated();

        let leader = {
            let client = client.clone();
            thread::spawn(move || client.get_page(5))
        };
        entered.recv_timeout(Duration::from_secs(5)).unwrap();

        let follower = {
            let client = client.clone();
            thread::spawn(move || client.get_page(5))
        };
        while joined(&client, 5) == 0 {
            thread::yield_now();
        }

        drop(release);

        assert_eq!(leader.join().unwrap(), PageRecord::fallback(5));
        assert_eq!(follower.join().unwrap(), PageRecord::fallback(5));
        assert!(!client.is_cached(5));
    }
}

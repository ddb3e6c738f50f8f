use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

pub const READER_ID_KEY: &str = "spelltale_user_id";
pub const READER_ID_PREFIX: &str = "user_";
pub const GM_ID_KEY: &str = "gm_user_id";
pub const GM_ID_PREFIX: &str = "gm_";

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RANDOM_LEN: usize = 9;

/// Scoped string key-value storage backing the session identity.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

/// Lives as long as the process: one process is one reading session.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default)]
    values: HashMap<String, String>,
}

/// JSON file store, used to resume a session across runs.
///
/// Storage problems degrade to "nothing stored": identity generation has no
/// error path.
pub struct FileStore {
    path: PathBuf,
    cache: Mutex<SessionFile>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cache = fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        Self {
            path,
            cache: Mutex::new(cache),
        }
    }

    /// `<config dir>/spelltale/session.json`
    pub fn default_location() -> Self {
        Self::open(crate::config::config_dir().join("session.json"))
    }

    fn persist(&self, file: &SessionFile) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "cannot create session dir");
                return;
            }
        }
        match serde_json::to_string_pretty(file) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.path, json) {
                    warn!(path = %self.path.display(), error = %e, "cannot write session file");
                }
            }
            Err(e) => warn!(error = %e, "cannot encode session file"),
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.cache.lock().values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut file = self.cache.lock();
        file.values.insert(key.to_string(), value.to_string());
        self.persist(&file);
    }
}

/* =========================
   Session identity
   ========================= */

/// Stable per-session opaque identifier, computed lazily on first use.
pub struct SessionIdentity {
    store: Arc<dyn KeyValueStore>,
    key: &'static str,
    prefix: &'static str,
    id: OnceLock<String>,
}

impl SessionIdentity {
    pub fn new(store: Arc<dyn KeyValueStore>, key: &'static str, prefix: &'static str) -> Self {
        Self {
            store,
            key,
            prefix,
            id: OnceLock::new(),
        }
    }

    pub fn reader(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(store, READER_ID_KEY, READER_ID_PREFIX)
    }

    pub fn game_master(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(store, GM_ID_KEY, GM_ID_PREFIX)
    }

    pub fn id(&self) -> &str {
        self.id.get_or_init(|| {
            if let Some(existing) = self.store.get(self.key) {
                return existing;
            }
            let id = generate_id(self.prefix);
            self.store.set(self.key, &id);
            debug!(key = self.key, %id, "generated session id");
            id
        })
    }
}

/// `prefix` + 9 random base-36 chars + base-36 UNIX millis.
pub fn generate_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let random: String = (0..RANDOM_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();

    format!("{prefix}{random}{}", to_base36(millis))
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".into();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn id_is_stable_and_persisted() {
        let store = Arc::new(MemoryStore::new());
        let identity = SessionIdentity::reader(store.clone());

        let first = identity.id().to_string();
        assert_eq!(identity.id(), first);
        assert_eq!(store.get(READER_ID_KEY).as_deref(), Some(first.as_str()));
        assert!(first.starts_with("user_"));
    }

    #[test]
    fn existing_value_is_reused() {
        let store = Arc::new(MemoryStore::new());
        store.set(GM_ID_KEY, "gm_existing");

        let identity = SessionIdentity::game_master(store);
        assert_eq!(identity.id(), "gm_existing");
    }

    #[test]
    fn identities_sharing_a_store_agree() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let a = SessionIdentity::reader(store.clone());
        let b = SessionIdentity::reader(store);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn generated_ids_are_unique() {
        let ids: HashSet<String> = (0..500).map(|_| generate_id("user_")).collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn base36_encoding() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn file_store_round_trips_through_disk() {
        let path = std::env::temp_dir()
            .join(format!("spelltale-test-{}", generate_id("")))
            .join("session.json");

        FileStore::open(&path).set(READER_ID_KEY, "user_abc");
        let reopened = FileStore::open(&path);
        assert_eq!(reopened.get(READER_ID_KEY).as_deref(), Some("user_abc"));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}

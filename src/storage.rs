//! Durable key-value storage for small JSON documents.
//!
//! Every read and write degrades instead of failing: a missing or corrupt
//! value reads as the caller's fallback, a failed write is logged and dropped.
//! Changes made by *other* processes sharing the same storage are published
//! as [`StorageEvent`]s so in-memory views can reload.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// An out-of-band change to a key. `new_value` is `None` when the key was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
  pub key: String,
  pub new_value: Option<String>,
}

/// Storage port. Implementations must never panic or surface errors to callers.
pub trait KvStore: Send + Sync {
  fn get_raw(&self, key: &str) -> Option<String>;
  fn set_raw(&self, key: &str, value: &str);
  /// External changes only; writes made through `self` are not echoed back.
  fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;
}

/// Read and deserialize `key`, or `fallback` if it's absent or unparseable.
pub fn read_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str, fallback: T) -> T {
  let Some(raw) = store.get_raw(key) else { return fallback };
  parse_json(key, &raw, fallback)
}

/// Deserialize a raw stored value, or `fallback` on failure.
pub fn parse_json<T: DeserializeOwned>(key: &str, raw: &str, fallback: T) -> T {
  if raw.is_empty() {
    return fallback;
  }
  match serde_json::from_str(raw) {
    Ok(value) => value,
    Err(e) => {
      warn!(key, err = %e, "storage: stored value is not valid JSON, using fallback");
      fallback
    }
  }
}

/// Serialize and store `value`. Serialization failures are logged and dropped.
pub fn write_json<T: Serialize + ?Sized>(store: &dyn KvStore, key: &str, value: &T) {
  match serde_json::to_string(value) {
    Ok(raw) => store.set_raw(key, &raw),
    Err(e) => warn!(key, err = %e, "storage: failed to serialize value"),
  }
}

const EVENT_CAPACITY: usize = 64;

// --- In-memory store ---

/// Process-local store. Used in tests and as the fallback when no durable
/// location is available.
pub struct MemoryStore {
  values: StdMutex<HashMap<String, String>>,
  events: broadcast::Sender<StorageEvent>,
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self { values: StdMutex::new(HashMap::new()), events }
  }

  fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
    // A poisoned map still holds consistent strings; keep using it.
    self.values.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Apply a change as if another process made it, notifying subscribers.
  #[cfg(test)]
  pub fn apply_external(&self, key: &str, value: Option<&str>) {
    match value {
      Some(v) => {
        self.values().insert(key.to_string(), v.to_string());
      }
      None => {
        self.values().remove(key);
      }
    }
    let _ = self.events.send(StorageEvent { key: key.to_string(), new_value: value.map(str::to_string) });
  }
}

impl KvStore for MemoryStore {
  fn get_raw(&self, key: &str) -> Option<String> {
    self.values().get(key).cloned()
  }

  fn set_raw(&self, key: &str, value: &str) {
    self.values().insert(key.to_string(), value.to_string());
  }

  fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
    self.events.subscribe()
  }
}

// --- File-backed store ---

/// Map a key to a file name: anything outside `[A-Za-z0-9._-]` becomes `_`.
fn file_name_for(key: &str) -> String {
  let safe: String =
    key.chars().map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' }).collect();
  format!("{}.json", safe)
}

struct FileShared {
  dir: PathBuf,
  /// Last value this process read or wrote per key, used to tell our own
  /// writes apart from other processes' writes.
  last_seen: StdMutex<HashMap<String, Option<String>>>,
  events: broadcast::Sender<StorageEvent>,
}

impl FileShared {
  fn path_for(&self, key: &str) -> PathBuf {
    self.dir.join(file_name_for(key))
  }

  fn last_seen(&self) -> std::sync::MutexGuard<'_, HashMap<String, Option<String>>> {
    self.last_seen.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn read_file(&self, key: &str) -> Option<String> {
    match std::fs::read_to_string(self.path_for(key)) {
      Ok(content) => Some(content),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
      Err(e) => {
        warn!(key, err = %e, "storage: failed to read value");
        None
      }
    }
  }

  /// Compare the file for `key` against what we last saw and publish a
  /// change event if another writer touched it.
  fn rescan(&self, key: &str) {
    let event = {
      // Read under the lock: our own writes hold it for their whole duration.
      let mut seen = self.last_seen();
      let current = self.read_file(key);
      let previous = seen.insert(key.to_string(), current.clone());
      (previous.as_ref() != Some(&current)).then(|| StorageEvent { key: key.to_string(), new_value: current })
    };
    if let Some(event) = event {
      debug!(key, removed = event.new_value.is_none(), "storage: external change detected");
      let _ = self.events.send(event);
    }
  }

  fn handle_fs_event(&self, event: Event) {
    if matches!(event.kind, EventKind::Access(_)) {
      return;
    }
    let keys: Vec<String> = {
      let seen = self.last_seen();
      event
        .paths
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .filter_map(|name| seen.keys().find(|k| file_name_for(k) == name).cloned())
        .collect()
    };
    for key in keys {
      self.rescan(&key);
    }
  }
}

/// One JSON file per key inside a directory, watched for external changes.
pub struct FileStore {
  shared: Arc<FileShared>,
  _watcher: Option<RecommendedWatcher>,
}

impl FileStore {
  /// Open (creating if needed) a store rooted at `dir`. A watcher that fails
  /// to start only disables external-change notifications.
  pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
    Self::open_with(dir.as_ref(), true)
  }

  fn open_with(dir: &Path, watch: bool) -> Result<Self> {
    let dir = dir.to_path_buf();
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create storage dir {}", dir.display()))?;
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let shared = Arc::new(FileShared { dir, last_seen: StdMutex::new(HashMap::new()), events });

    let watcher = if watch {
      match build_watcher(Arc::clone(&shared)) {
        Ok(w) => Some(w),
        Err(e) => {
          warn!(err = %e, "storage: file watcher unavailable, external changes will not be observed");
          None
        }
      }
    } else {
      None
    };
    info!(dir = %shared.dir.display(), watching = watcher.is_some(), "storage: opened");
    Ok(Self { shared, _watcher: watcher })
  }

  /// The platform data directory, e.g. `~/.local/share/iamdb/storage`.
  pub fn default_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "iamdb").map(|d| d.data_dir().join("storage"))
  }

  pub fn dir(&self) -> &Path {
    &self.shared.dir
  }

  /// Re-read `key` from disk and publish an event if it changed out-of-band.
  #[cfg(test)]
  pub fn rescan(&self, key: &str) {
    self.shared.rescan(key);
  }
}

fn build_watcher(shared: Arc<FileShared>) -> notify::Result<RecommendedWatcher> {
  let dir = shared.dir.clone();
  let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| match event {
    Ok(event) => shared.handle_fs_event(event),
    Err(e) => debug!(err = %e, "storage: watch error"),
  })?;
  watcher.watch(&dir, RecursiveMode::NonRecursive)?;
  Ok(watcher)
}

impl KvStore for FileStore {
  fn get_raw(&self, key: &str) -> Option<String> {
    let mut seen = self.shared.last_seen();
    let value = self.shared.read_file(key);
    seen.insert(key.to_string(), value.clone());
    value
  }

  fn set_raw(&self, key: &str, value: &str) {
    // Held until the rename lands so `rescan` never sees a half-recorded write.
    let mut seen = self.shared.last_seen();
    seen.insert(key.to_string(), Some(value.to_string()));
    let path = self.shared.path_for(key);
    // Write to a temp file, then rename (atomic)
    let tmp_path = path.with_extension("json.tmp");
    let result = std::fs::write(&tmp_path, value).and_then(|_| std::fs::rename(&tmp_path, &path));
    if let Err(e) = result {
      warn!(key, err = %e, "storage: failed to write value");
      let _ = std::fs::remove_file(&tmp_path);
    }
  }

  fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
    self.shared.events.subscribe()
  }
}

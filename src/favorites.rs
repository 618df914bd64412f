use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::movie::{FavoriteEntry, Movie, MovieId};
use crate::storage::{KvStore, StorageEvent, parse_json, read_json, write_json};

/// Immutable view of the favorites collection at one version.
///
/// Every consumer of a given version shares the same `Arc`, so there is a
/// single in-memory copy no matter how many screens are looking at it.
#[derive(Debug, Default)]
pub struct FavoritesSnapshot {
  entries: Vec<FavoriteEntry>,
  ids: HashSet<MovieId>,
  version: u64,
}

impl FavoritesSnapshot {
  /// Build a snapshot, keeping only the first entry for each id.
  fn new(entries: Vec<FavoriteEntry>, version: u64) -> Self {
    let mut ids = HashSet::with_capacity(entries.len());
    let entries: Vec<FavoriteEntry> = entries.into_iter().filter(|e| ids.insert(e.id.clone())).collect();
    Self { entries, ids, version }
  }

  /// Most recently added first.
  pub fn entries(&self) -> &[FavoriteEntry] {
    &self.entries
  }

  pub fn contains(&self, id: &MovieId) -> bool {
    self.ids.contains(id)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn version(&self) -> u64 {
    self.version
  }
}

/// Decode a stored collection. Individual malformed entries are skipped; a
/// malformed document is an empty collection.
fn decode_entries(values: Vec<Value>) -> Vec<FavoriteEntry> {
  values.into_iter().filter_map(|v| serde_json::from_value::<FavoriteEntry>(v).ok()).collect()
}

struct Inner {
  store: Arc<dyn KvStore>,
  key: String,
  state: watch::Sender<Arc<FavoritesSnapshot>>,
}

/// The session-wide favorites collection, persisted to a [`KvStore`].
///
/// Cloning is cheap and every clone refers to the same collection.
#[derive(Clone)]
pub struct FavoritesStore {
  inner: Arc<Inner>,
}

impl FavoritesStore {
  /// Read the collection once from `store`. An absent or corrupt value is an
  /// empty collection.
  pub fn load(store: Arc<dyn KvStore>, key: &str) -> Self {
    let entries = decode_entries(read_json::<Vec<Value>>(store.as_ref(), key, Vec::new()));
    info!(key, count = entries.len(), "favorites: loaded");
    let (state, _) = watch::channel(Arc::new(FavoritesSnapshot::new(entries, 0)));
    Self { inner: Arc::new(Inner { store, key: key.to_string(), state }) }
  }

  pub fn snapshot(&self) -> Arc<FavoritesSnapshot> {
    Arc::clone(&self.inner.state.borrow())
  }

  /// Receive every new snapshot as it is published.
  pub fn subscribe(&self) -> watch::Receiver<Arc<FavoritesSnapshot>> {
    self.inner.state.subscribe()
  }

  pub fn is_favorite(&self, id: &MovieId) -> bool {
    self.inner.state.borrow().contains(id)
  }

  /// Apply `f` to the current entries and, if it returns a new collection,
  /// publish and persist it. Runs under the channel lock so no reader sees a
  /// half-applied change.
  fn mutate(&self, f: impl FnOnce(&FavoritesSnapshot) -> Option<Vec<FavoriteEntry>>) -> bool {
    let inner = &self.inner;
    inner.state.send_if_modified(|current| {
      let Some(next) = f(current) else { return false };
      let snapshot = FavoritesSnapshot::new(next, current.version + 1);
      write_json(inner.store.as_ref(), &inner.key, snapshot.entries());
      *current = Arc::new(snapshot);
      true
    })
  }

  /// Add `movie` at the front unless it is already a favorite. Movies
  /// without an id are ignored.
  pub fn add(&self, movie: &Movie) {
    let Some(entry) = FavoriteEntry::from_movie(movie) else { return };
    let added = self.mutate(|current| {
      if current.contains(&entry.id) {
        return None;
      }
      let mut next = Vec::with_capacity(current.len() + 1);
      next.push(entry.clone());
      next.extend(current.entries().iter().cloned());
      Some(next)
    });
    if added {
      debug!(id = %entry.id, "favorites: added");
    }
  }

  pub fn remove(&self, id: &MovieId) {
    let removed = self.mutate(|current| {
      current.contains(id).then(|| current.entries().iter().filter(|e| &e.id != id).cloned().collect())
    });
    if removed {
      debug!(id = %id, "favorites: removed");
    }
  }

  /// Remove `movie` if present, otherwise add it at the front, as one
  /// change. Returns whether the movie is a favorite afterwards.
  pub fn toggle(&self, movie: &Movie) -> bool {
    let Some(entry) = FavoriteEntry::from_movie(movie) else { return false };
    let mut now_favorite = false;
    self.mutate(|current| {
      if current.contains(&entry.id) {
        Some(current.entries().iter().filter(|e| e.id != entry.id).cloned().collect())
      } else {
        now_favorite = true;
        let mut next = vec![entry.clone()];
        next.extend(current.entries().iter().cloned());
        Some(next)
      }
    });
    debug!(id = %entry.id, favorite = now_favorite, "favorites: toggled");
    now_favorite
  }

  /// Replace the in-memory view without writing back to storage.
  fn replace_from_storage(&self, entries: Vec<FavoriteEntry>) {
    self.inner.state.send_modify(|current| {
      *current = Arc::new(FavoritesSnapshot::new(entries, current.version + 1));
    });
  }

  /// React to a change another process made to the backing store. Removal
  /// resets to empty; an unparseable value keeps the current view.
  pub fn apply_storage_event(&self, event: &StorageEvent) {
    if event.key != self.inner.key {
      return;
    }
    match &event.new_value {
      None => {
        info!("favorites: cleared externally, resetting");
        self.replace_from_storage(Vec::new());
      }
      Some(raw) => match parse_json::<Option<Vec<Value>>>(&event.key, raw, None) {
        Some(values) => {
          let entries = decode_entries(values);
          info!(count = entries.len(), "favorites: reloaded after external change");
          self.replace_from_storage(entries);
        }
        None => warn!("favorites: ignoring unparseable external change"),
      },
    }
  }

  /// Re-read the collection from storage.
  pub fn reload(&self) {
    let entries = decode_entries(read_json::<Vec<Value>>(self.inner.store.as_ref(), &self.inner.key, Vec::new()));
    self.replace_from_storage(entries);
  }

  /// Follow external changes to the backing store until it goes away.
  pub fn spawn_sync(&self) -> JoinHandle<()> {
    let this = self.clone();
    let mut rx = self.inner.store.subscribe();
    tokio::spawn(async move {
      loop {
        match rx.recv().await {
          Ok(event) => this.apply_storage_event(&event),
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            warn!(skipped, "favorites: storage events lagged, reloading");
            this.reload();
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    })
  }
}

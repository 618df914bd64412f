use ratatui::widgets::ListState;
use std::time::{Duration, Instant};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogClient, CatalogError};
use crate::config::Config;
use crate::constants::constants;
use crate::dictation::{Dictation, DictationState};
use crate::favorites::{FavoritesSnapshot, FavoritesStore};
use crate::input::TextInput;
use crate::movie::{FavoriteEntry, GenreTag, Movie, MovieDetail, MovieId};
use crate::query::{Location, SearchParams};
use crate::results::ResultsView;
use crate::theme::{THEMES, Theme, theme_index};

// --- Types ---

/// Where the user is. History holds routes, not live screens: going back
/// mounts the previous screen afresh, the way a browser reloads a page.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
  Home,
  Results(SearchParams),
  Detail(MovieId),
  Favorites,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomeFocus {
  Input,
  Genres,
}

pub struct HomeView {
  pub input: TextInput,
  pub focus: HomeFocus,
  pub genres: Vec<GenreTag>,
  pub genres_loading: bool,
  pub genres_expanded: bool,
  /// Index into the chips as drawn; the last chip toggles expansion.
  pub genre_cursor: usize,
  genres_rx: Option<oneshot::Receiver<Result<Vec<GenreTag>, CatalogError>>>,
  genres_handle: Option<JoinHandle<()>>,
}

impl HomeView {
  fn mount(client: &CatalogClient) -> Self {
    let (tx, rx) = oneshot::channel();
    let client = client.clone();
    let handle = tokio::spawn(async move {
      let _ = tx.send(client.fetch_genres().await);
    });
    Self {
      input: TextInput::default(),
      focus: HomeFocus::Input,
      genres: Vec::new(),
      genres_loading: true,
      genres_expanded: false,
      genre_cursor: 0,
      genres_rx: Some(rx),
      genres_handle: Some(handle),
    }
  }

  /// Genres currently shown as chips.
  pub fn visible_genres(&self) -> &[GenreTag] {
    let collapsed = constants().collapsed_genre_count;
    if self.genres_expanded || self.genres.len() <= collapsed { &self.genres } else { &self.genres[..collapsed] }
  }

  /// Whether the "show more/less" chip is drawn.
  pub fn has_toggle(&self) -> bool {
    self.genres.len() > constants().collapsed_genre_count
  }

  pub fn chip_count(&self) -> usize {
    self.visible_genres().len() + usize::from(self.has_toggle())
  }

  /// Genre name under chip `index`, `None` for the toggle chip.
  pub fn chip_at(&self, index: usize) -> Option<&str> {
    self.visible_genres().get(index).map(|g| g.name.as_str())
  }

  pub fn toggle_expanded(&mut self) {
    self.genres_expanded = !self.genres_expanded;
    self.genre_cursor = self.genre_cursor.min(self.chip_count().saturating_sub(1));
  }

  fn poll(&mut self) {
    let Some(rx) = self.genres_rx.as_mut() else { return };
    match rx.try_recv() {
      Ok(Ok(genres)) => {
        debug!(count = genres.len(), "home: genres loaded");
        self.genres = genres;
        self.finish_loading();
      }
      Ok(Err(e)) => {
        warn!(err = %e, "home: failed to load genres");
        self.finish_loading();
      }
      Err(oneshot::error::TryRecvError::Empty) => {}
      Err(oneshot::error::TryRecvError::Closed) => self.finish_loading(),
    }
  }

  fn finish_loading(&mut self) {
    self.genres_loading = false;
    self.genres_rx = None;
    self.genres_handle = None;
  }
}

impl Drop for HomeView {
  fn drop(&mut self) {
    if let Some(handle) = self.genres_handle.take() {
      handle.abort();
    }
  }
}

pub struct DetailView {
  pub id: MovieId,
  pub detail: Option<MovieDetail>,
  pub loading: bool,
  /// Vertical scroll of the detail body.
  pub scroll: u16,
  rx: Option<oneshot::Receiver<Result<MovieDetail, CatalogError>>>,
  handle: Option<JoinHandle<()>>,
}

impl DetailView {
  fn mount(client: &CatalogClient, id: MovieId) -> Self {
    let (tx, rx) = oneshot::channel();
    let client = client.clone();
    let fetch_id = id.clone();
    let handle = tokio::spawn(async move {
      let _ = tx.send(client.fetch_movie(&fetch_id).await);
    });
    Self { id, detail: None, loading: true, scroll: 0, rx: Some(rx), handle: Some(handle) }
  }

  fn poll(&mut self) {
    let Some(rx) = self.rx.as_mut() else { return };
    let outcome = match rx.try_recv() {
      Err(oneshot::error::TryRecvError::Empty) => return,
      Ok(outcome) => Some(outcome),
      Err(oneshot::error::TryRecvError::Closed) => None,
    };
    match outcome {
      Some(Ok(detail)) => {
        info!(id = %self.id, title = %detail.movie.title, "detail: loaded");
        self.detail = Some(detail);
      }
      Some(Err(e)) => warn!(id = %self.id, err = %e, "detail: fetch failed"),
      None => warn!(id = %self.id, "detail: fetch task ended without a result"),
    }
    self.loading = false;
    self.rx = None;
    self.handle = None;
  }

  /// The fetch finished without a movie.
  pub fn not_found(&self) -> bool {
    !self.loading && self.detail.is_none()
  }
}

impl Drop for DetailView {
  fn drop(&mut self) {
    if let Some(handle) = self.handle.take() {
      handle.abort();
    }
  }
}

#[derive(Default)]
pub struct FavoritesView {
  pub list_state: ListState,
}

impl FavoritesView {
  fn mount(len: usize) -> Self {
    let mut view = Self::default();
    view.clamp(len);
    view
  }

  /// Keep the selection on a row after the collection changed size.
  fn clamp(&mut self, len: usize) {
    match self.list_state.selected() {
      _ if len == 0 => self.list_state.select(None),
      Some(i) if i >= len => self.list_state.select(Some(len - 1)),
      None => self.list_state.select(Some(0)),
      _ => {}
    }
  }
}

pub enum Screen {
  Home(HomeView),
  Results(ResultsView),
  Detail(DetailView),
  Favorites(FavoritesView),
}

impl Screen {
  fn route(&self) -> Route {
    match self {
      Screen::Home(_) => Route::Home,
      Screen::Results(view) => Route::Results(view.params()),
      Screen::Detail(view) => Route::Detail(view.id.clone()),
      Screen::Favorites(_) => Route::Favorites,
    }
  }
}

pub struct AppOptions {
  pub catalog: CatalogClient,
  pub favorites: FavoritesStore,
  pub theme_index: usize,
  pub initial: Route,
}

pub struct App {
  pub screen: Screen,
  history: Vec<Route>,
  pub catalog: CatalogClient,
  pub favorites: FavoritesStore,
  favorites_rx: watch::Receiver<Arc<FavoritesSnapshot>>,
  favorites_sync: JoinHandle<()>,
  /// Last entry removed from the favorites screen, restorable with undo.
  pub last_removed: Option<FavoriteEntry>,
  pub dictation: Dictation,
  pub theme_index: usize,
  pub last_error: Option<String>,
  pub status_message: Option<String>,
  /// Informational message, lower priority than status and errors.
  pub info_message: Option<String>,
  pub should_quit: bool,
  /// App start instant, drives spinner animation.
  pub started_at: Instant,
  error_time: Option<Instant>,
  info_time: Option<Instant>,
}

impl App {
  pub fn new(options: AppOptions) -> Self {
    let favorites_sync = options.favorites.spawn_sync();
    let favorites_rx = options.favorites.subscribe();
    let screen = mount(&options.catalog, &options.favorites, options.initial);
    Self {
      screen,
      history: Vec::new(),
      catalog: options.catalog,
      favorites: options.favorites,
      favorites_rx,
      favorites_sync,
      last_removed: None,
      dictation: Dictation::new(),
      theme_index: options.theme_index.min(THEMES.len() - 1),
      last_error: None,
      status_message: None,
      info_message: None,
      should_quit: false,
      started_at: Instant::now(),
      error_time: None,
      info_time: None,
    }
  }

  pub fn theme(&self) -> &'static Theme {
    // theme_index is clamped in new() and wrapped in next_theme()
    &THEMES[self.theme_index]
  }

  /// Set an error message with auto-dismiss tracking.
  pub fn set_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  pub fn set_info(&mut self, msg: String) {
    self.info_message = Some(msg);
    self.info_time = Some(Instant::now());
  }

  /// Clear stale error and info messages.
  pub fn expire_error(&mut self) {
    let ttl = Duration::from_secs(constants().error_dismiss_secs);
    if self.error_time.is_some_and(|t| t.elapsed() >= ttl) {
      self.clear_error();
    }
    if self.info_time.is_some_and(|t| t.elapsed() >= ttl) {
      self.info_message = None;
      self.info_time = None;
    }
  }

  pub fn next_theme(&mut self) {
    self.theme_index = (self.theme_index + 1) % THEMES.len();
    let mut config = Config::load();
    config.theme_name = Some(self.theme().name.to_string());
    config.save();
  }

  pub fn current_route(&self) -> Route {
    self.screen.route()
  }

  pub fn history(&self) -> &[Route] {
    &self.history
  }

  // --- Navigation ---

  /// Open `route`, remembering the current screen. Opening the route already
  /// shown does nothing.
  pub fn navigate(&mut self, route: Route) {
    if route == self.current_route() {
      return;
    }
    info!(?route, "nav: push");
    self.clear_error();
    let previous = self.unmount_current();
    self.history.push(previous);
    self.screen = mount(&self.catalog, &self.favorites, route);
  }

  /// Return to the previous screen, or Home when there is none.
  pub fn back(&mut self) {
    if self.history.is_empty() && matches!(self.screen, Screen::Home(_)) {
      self.should_quit = true;
      return;
    }
    let route = self.history.pop().unwrap_or(Route::Home);
    info!(?route, "nav: back");
    self.clear_error();
    self.unmount_current();
    self.screen = mount(&self.catalog, &self.favorites, route);
  }

  /// Stop the current screen's work and return its route for history.
  fn unmount_current(&mut self) -> Route {
    let route = self.screen.route();
    if let Screen::Results(view) = &mut self.screen {
      view.unmount();
    }
    // Dictation targets the screen that started it
    self.dictation.stop();
    self.status_message = None;
    route
  }

  // --- Favorites ---

  pub fn toggle_favorite(&mut self, movie: &Movie) {
    if movie.id.is_none() {
      self.set_error("This movie can't be added to favorites.".to_string());
      return;
    }
    let added = self.favorites.toggle(movie);
    let msg = if added { "Added to favorites" } else { "Removed from favorites" };
    self.set_info(format!("{}: {}", msg, movie.title));
  }

  /// Remove a favorite and keep it around for `undo_remove`.
  pub fn remove_favorite(&mut self, id: &MovieId) {
    let Some(entry) = self.favorites.snapshot().entries().iter().find(|e| &e.id == id).cloned() else { return };
    self.favorites.remove(id);
    self.set_info(format!("Removed from favorites: {} (u to undo)", entry.title));
    self.last_removed = Some(entry);
  }

  /// Put the last removed favorite back, at the front.
  pub fn undo_remove(&mut self) {
    let Some(entry) = self.last_removed.take() else { return };
    self.favorites.add(&entry.to_movie());
    self.set_info(format!("Restored to favorites: {}", entry.title));
  }

  // --- Dictation ---

  pub fn toggle_dictation(&mut self) {
    self.clear_error();
    self.dictation.toggle();
    if !self.dictation.is_active() {
      self.status_message = None;
    }
  }

  fn apply_transcript(&mut self, text: &str) {
    info!(chars = text.len(), "dictation: applying transcript");
    self.clear_error();
    match &mut self.screen {
      Screen::Home(home) => {
        home.input.set(text);
        home.focus = HomeFocus::Input;
      }
      Screen::Results(view) => view.set_query(text),
      Screen::Detail(_) | Screen::Favorites(_) => {}
    }
  }

  // --- Tick ---

  /// Drain finished background work. Called once per loop iteration.
  pub fn check_pending(&mut self) {
    match &mut self.screen {
      Screen::Home(home) => home.poll(),
      Screen::Results(view) => {
        view.poll();
      }
      Screen::Detail(view) => view.poll(),
      Screen::Favorites(_) => {}
    }

    if self.favorites_rx.has_changed().unwrap_or(false) {
      let snapshot = Arc::clone(&self.favorites_rx.borrow_and_update());
      debug!(version = snapshot.version(), count = snapshot.len(), "favorites: new snapshot");
      if let Screen::Favorites(view) = &mut self.screen {
        view.clamp(snapshot.len());
      }
    }

    match self.dictation.poll() {
      Some(Ok(text)) => {
        self.status_message = None;
        self.apply_transcript(&text);
      }
      Some(Err(msg)) => {
        self.status_message = None;
        self.set_error(msg);
      }
      None => self.update_dictation_status(),
    }
  }

  fn update_dictation_status(&mut self) {
    self.status_message = match (&self.dictation.state, self.dictation.download_progress) {
      (DictationState::Idle, _) => None,
      (_, Some((done, total))) if total > 0 => {
        Some(format!("Downloading speech model… {}%", done.saturating_mul(100) / total))
      }
      (DictationState::Listening { .. }, _) => Some("Listening… speak now".to_string()),
      (DictationState::Recognizing { .. }, _) => Some("Recognizing…".to_string()),
    };
  }

  /// Post-draw hook: the results list reports its viewport to the scroll trigger.
  pub fn after_draw(&mut self) {
    if let Screen::Results(view) = &mut self.screen {
      view.after_draw();
    }
  }

  pub fn shutdown(&mut self) {
    self.unmount_current();
    self.favorites_sync.abort();
    info!("app: shut down");
  }
}

fn mount(client: &CatalogClient, favorites: &FavoritesStore, route: Route) -> Screen {
  match route {
    Route::Home => Screen::Home(HomeView::mount(client)),
    Route::Results(params) => Screen::Results(ResultsView::mount(client.clone(), &params)),
    Route::Detail(id) => Screen::Detail(DetailView::mount(client, id)),
    Route::Favorites => Screen::Favorites(FavoritesView::mount(favorites.snapshot().len())),
  }
}

/// Initial route from a launch search string such as `?q=heat`. A genre
/// beats a query when both are given; neither opens Home.
pub fn initial_route(search: &str, favorites: bool) -> Route {
  if favorites {
    return Route::Favorites;
  }
  let params = Location::from_params(&SearchParams::from_search(search)).params();
  if params.subject().is_none() { Route::Home } else { Route::Results(params) }
}

/// Theme from the CLI flag, else the saved preference.
pub fn resolve_theme(cli: Option<&str>, config: &Config) -> usize {
  theme_index(cli.or(config.theme_name.as_deref()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::MemoryStore;
  use serde_json::json;

  fn app(initial: Route) -> App {
    let catalog = CatalogClient::new("http://127.0.0.1:9/api/v1").unwrap();
    let favorites = FavoritesStore::load(Arc::new(MemoryStore::new()), "favorites");
    App::new(AppOptions { catalog, favorites, theme_index: 0, initial })
  }

  fn genres(names: &[&str]) -> Vec<GenreTag> {
    names.iter().map(|n| GenreTag { name: n.to_string() }).collect()
  }

  #[test]
  fn initial_route_from_flags() {
    assert_eq!(initial_route("", false), Route::Home);
    assert_eq!(initial_route("?q=+heat+", false), Route::Results(SearchParams::query("heat")));
    assert_eq!(initial_route("?q=heat&genre=Drama", false), Route::Results(SearchParams::genre("Drama")));
    assert_eq!(initial_route("?q=%20%20", false), Route::Home);
    assert_eq!(initial_route("?utm=x", false), Route::Home);
    assert_eq!(initial_route("?q=heat", true), Route::Favorites);
  }

  #[test]
  fn theme_flag_beats_config() {
    let config = Config { theme_name: Some("matinee".into()), api_base_url: None };
    assert_eq!(resolve_theme(Some("noir"), &config), 2);
    assert_eq!(resolve_theme(None, &config), 1);
  }

  #[tokio::test]
  async fn genre_chips_collapse_to_four() {
    let mut app = app(Route::Home);
    let Screen::Home(home) = &mut app.screen else { panic!("home expected") };
    home.genres = genres(&["Action", "Comedy", "Drama", "Horror", "Romance", "Thriller"]);
    assert_eq!(home.visible_genres().len(), 4);
    assert_eq!(home.chip_count(), 5);
    assert_eq!(home.chip_at(4), None);
    home.genre_cursor = 4;
    home.toggle_expanded();
    assert_eq!(home.visible_genres().len(), 6);
    assert_eq!(home.chip_at(5), Some("Thriller"));
    home.toggle_expanded();
    assert_eq!(home.genre_cursor, 4);
  }

  #[tokio::test]
  async fn few_genres_have_no_toggle() {
    let mut app = app(Route::Home);
    let Screen::Home(home) = &mut app.screen else { panic!("home expected") };
    home.genres = genres(&["Action", "Drama"]);
    assert!(!home.has_toggle());
    assert_eq!(home.chip_count(), 2);
  }

  #[tokio::test]
  async fn navigation_history() {
    let mut app = app(Route::Home);
    app.navigate(Route::Results(SearchParams::query("heat")));
    app.navigate(Route::Detail(MovieId::Num(7)));
    assert_eq!(app.history(), &[Route::Home, Route::Results(SearchParams::query("heat"))]);
    app.back();
    assert_eq!(app.current_route(), Route::Results(SearchParams::query("heat")));
    app.back();
    assert_eq!(app.current_route(), Route::Home);
    assert!(!app.should_quit);
    app.back();
    assert!(app.should_quit);
    app.shutdown();
  }

  #[tokio::test]
  async fn back_from_deep_link_goes_home() {
    let mut app = app(Route::Detail(MovieId::Num(1)));
    app.back();
    assert_eq!(app.current_route(), Route::Home);
    app.shutdown();
  }

  #[tokio::test]
  async fn results_route_keeps_typed_query() {
    let mut app = app(Route::Results(SearchParams::genre("Drama")));
    if let Screen::Results(view) = &mut app.screen {
      view.set_query("alien");
    }
    app.navigate(Route::Favorites);
    assert_eq!(app.history().last(), Some(&Route::Results(SearchParams::query("alien"))));
    app.shutdown();
  }

  #[tokio::test]
  async fn toggle_favorite_requires_id() {
    let mut app = app(Route::Favorites);
    app.toggle_favorite(&Movie::from_json(&json!({ "title": "No id" })));
    assert!(app.last_error.is_some());
    assert!(app.favorites.snapshot().is_empty());

    let movie = Movie::from_json(&json!({ "id": 42, "title": "Heat" }));
    app.toggle_favorite(&movie);
    assert!(app.favorites.is_favorite(&MovieId::Num(42)));
    app.toggle_favorite(&movie);
    assert!(!app.favorites.is_favorite(&MovieId::Num(42)));
    app.shutdown();
  }

  #[tokio::test]
  async fn favorites_selection_follows_collection() {
    let mut app = app(Route::Favorites);
    app.check_pending();
    let Screen::Favorites(view) = &app.screen else { panic!("favorites expected") };
    assert_eq!(view.list_state.selected(), None);
    app.favorites.add(&Movie::from_json(&json!({ "id": 1, "title": "A" })));
    app.check_pending();
    let Screen::Favorites(view) = &app.screen else { panic!("favorites expected") };
    assert_eq!(view.list_state.selected(), Some(0));
    app.shutdown();
  }

  #[tokio::test]
  async fn removed_favorite_can_be_restored() {
    let mut app = app(Route::Favorites);
    app.favorites.add(&Movie::from_json(&json!({ "id": 1, "title": "Alien" })));
    app.favorites.add(&Movie::from_json(&json!({ "id": 2, "title": "Heat" })));
    app.check_pending();

    app.remove_favorite(&MovieId::Num(1));
    assert!(!app.favorites.is_favorite(&MovieId::Num(1)));
    assert_eq!(app.last_removed.as_ref().map(|e| e.title.as_str()), Some("Alien"));
    app.check_pending();
    let Screen::Favorites(view) = &app.screen else { panic!("favorites expected") };
    assert_eq!(view.list_state.selected(), Some(0));

    app.undo_remove();
    assert!(app.favorites.is_favorite(&MovieId::Num(1)));
    assert_eq!(app.favorites.snapshot().entries()[0].id, MovieId::Num(1));
    assert!(app.last_removed.is_none());
    app.shutdown();
  }

  #[tokio::test]
  async fn removing_unknown_favorite_keeps_undo_slot() {
    let mut app = app(Route::Favorites);
    app.remove_favorite(&MovieId::Num(9));
    assert!(app.last_removed.is_none());
    assert!(app.info_message.is_none());
    app.shutdown();
  }

  #[tokio::test]
  async fn navigating_to_current_route_is_ignored() {
    let mut app = app(Route::Favorites);
    app.navigate(Route::Favorites);
    assert!(app.history().is_empty());
    app.shutdown();
  }

  #[tokio::test]
  async fn unreachable_detail_is_not_found() {
    let mut app = app(Route::Detail(MovieId::Num(3)));
    for _ in 0..50 {
      app.check_pending();
      if let Screen::Detail(view) = &app.screen
        && !view.loading
      {
        break;
      }
      tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let Screen::Detail(view) = &app.screen else { panic!("detail expected") };
    assert!(view.not_found());
    app.shutdown();
  }
}

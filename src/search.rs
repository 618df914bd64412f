//! Incremental search and pagination.
//!
//! [`SearchController`] is a plain state machine: every input is a
//! [`SearchEvent`], every side effect it wants is returned as a
//! [`SearchCommand`] for the caller to carry out. It owns no tasks or timers,
//! which keeps ordering and cancellation decisions in one place and testable
//! without a runtime.
//!
//! Lifecycle of a result list:
//! 1. Raw edits schedule a debounce; only the last edit in a quiet period
//!    becomes the active query.
//! 2. A change of active query or genre starts a new epoch: the previous
//!    first-page fetch is cancelled, results are cleared, page 1 is fetched.
//! 3. `LoadMore` fetches page N+1 while the epoch still has more results and
//!    nothing else of its lineage is in flight.
//! 4. Responses carry the ticket they were issued with; tickets from older
//!    epochs are dropped whatever their outcome.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::catalog::CatalogRequest;
use crate::movie::Movie;
use crate::query::{Location, SearchParams};

/// Message shown when an empty search is submitted.
pub const EMPTY_QUERY_MESSAGE: &str = "Please enter a search term.";

/// Identifies one page fetch: the epoch it belongs to and the page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchTicket {
  pub epoch: u64,
  pub page: u32,
}

impl FetchTicket {
  pub fn is_first_page(&self) -> bool {
    self.page == 1
  }
}

/// Inputs to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
  /// The search box text changed (typing or dictation).
  QueryEdited(String),
  /// A debounce timer scheduled with `generation` fired.
  DebounceElapsed { generation: u64 },
  GenreSelected(String),
  /// The user pressed Enter in the search box.
  Submit,
  PageFetched { ticket: FetchTicket, items: Vec<Movie> },
  PageFailed { ticket: FetchTicket, error: String },
  LoadMore,
  Unmount,
}

/// Side effects requested by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchCommand {
  /// Replace any pending debounce timer with one that fires after `delay`.
  ScheduleDebounce { generation: u64, delay: Duration },
  CancelDebounce,
  Fetch { ticket: FetchTicket, request: CatalogRequest },
  /// Best-effort abort; the controller already ignores the ticket.
  Cancel { ticket: FetchTicket },
  /// New query string for the results address (`""` or `?…`).
  ReplaceLocation(String),
}

/// Everything the results screen renders.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchState {
  pub raw_query: String,
  pub debounced_query: String,
  pub genre_filter: String,
  /// Last page successfully merged into `results`.
  pub page: u32,
  pub results: Vec<Movie>,
  pub has_more: bool,
  pub loading_first: bool,
  pub loading_more: bool,
  pub epoch: u64,
  /// User-visible validation message.
  pub error: Option<String>,
}

/// Identity of the current "load more" handler. The infinite-scroll trigger
/// re-establishes its observation whenever this changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollKey {
  pub epoch: u64,
  pub page: u32,
  pub has_more: bool,
  pub loading_first: bool,
  pub loading_more: bool,
}

pub struct SearchController {
  state: SearchState,
  location: Location,
  debounce: Duration,
  debounce_generation: u64,
  /// In-flight page-1 fetch of the current epoch.
  head: Option<FetchTicket>,
  /// In-flight next-page fetch of the current epoch.
  next: Option<FetchTicket>,
  mounted: bool,
}

impl SearchController {
  /// Create the controller for a freshly mounted results screen and return
  /// the commands for its first epoch.
  pub fn mount(params: &SearchParams, debounce: Duration) -> (Self, Vec<SearchCommand>) {
    let mut controller = Self {
      state: SearchState {
        raw_query: params.q.clone(),
        debounced_query: params.q.trim().to_string(),
        genre_filter: params.genre.trim().to_string(),
        page: 1,
        results: Vec::new(),
        has_more: true,
        loading_first: true,
        loading_more: false,
        epoch: 0,
        error: None,
      },
      location: Location::from_params(params),
      debounce,
      debounce_generation: 0,
      head: None,
      next: None,
      mounted: true,
    };
    info!(query = %controller.state.debounced_query, genre = %controller.state.genre_filter, "search: mounted");
    let commands = controller.begin_epoch();
    (controller, commands)
  }

  pub fn state(&self) -> &SearchState {
    &self.state
  }

  pub fn location(&self) -> &Location {
    &self.location
  }

  pub fn is_mounted(&self) -> bool {
    self.mounted
  }

  /// Whether the infinite-scroll trigger may fire.
  pub fn scroll_enabled(&self) -> bool {
    self.mounted && self.state.has_more && !self.state.loading_first
  }

  pub fn scroll_key(&self) -> ScrollKey {
    ScrollKey {
      epoch: self.state.epoch,
      page: self.state.page,
      has_more: self.state.has_more,
      loading_first: self.state.loading_first,
      loading_more: self.state.loading_more,
    }
  }

  /// Request for `page` of the current epoch. A genre filter wins over free
  /// text; with neither, browse everything.
  pub fn request_for(&self, page: u32) -> CatalogRequest {
    if !self.state.genre_filter.is_empty() {
      CatalogRequest::ByGenre { genre: self.state.genre_filter.clone(), page }
    } else if !self.state.debounced_query.is_empty() {
      CatalogRequest::Search { query: self.state.debounced_query.clone(), page }
    } else {
      CatalogRequest::Browse { page }
    }
  }

  pub fn dispatch(&mut self, event: SearchEvent) -> Vec<SearchCommand> {
    if !self.mounted {
      debug!(?event, "search: event after unmount ignored");
      return Vec::new();
    }
    match event {
      SearchEvent::QueryEdited(raw) => self.on_query_edited(raw),
      SearchEvent::DebounceElapsed { generation } => self.on_debounce_elapsed(generation),
      SearchEvent::GenreSelected(genre) => self.on_genre_selected(&genre),
      SearchEvent::Submit => self.on_submit(),
      SearchEvent::PageFetched { ticket, items } => self.on_page_fetched(ticket, items),
      SearchEvent::PageFailed { ticket, error } => self.on_page_failed(ticket, &error),
      SearchEvent::LoadMore => self.on_load_more(),
      SearchEvent::Unmount => self.on_unmount(),
    }
  }

  // --- Transitions ---

  fn on_query_edited(&mut self, raw: String) -> Vec<SearchCommand> {
    self.state.error = None;
    self.location = std::mem::take(&mut self.location).with_query(&raw);
    self.state.raw_query = raw;
    self.debounce_generation += 1;
    vec![
      SearchCommand::ReplaceLocation(self.location.to_search_string()),
      SearchCommand::ScheduleDebounce { generation: self.debounce_generation, delay: self.debounce },
    ]
  }

  fn on_debounce_elapsed(&mut self, generation: u64) -> Vec<SearchCommand> {
    if generation != self.debounce_generation {
      debug!(generation, current = self.debounce_generation, "search: stale debounce ignored");
      return Vec::new();
    }
    self.activate_raw_query()
  }

  /// QUERY_CHANGED: promote the raw text to the active query. Non-empty text
  /// replaces a genre filter.
  fn activate_raw_query(&mut self) -> Vec<SearchCommand> {
    let active = self.state.raw_query.trim().to_string();
    let genre = if active.is_empty() { self.state.genre_filter.clone() } else { String::new() };
    if active == self.state.debounced_query && genre == self.state.genre_filter {
      return Vec::new();
    }
    debug!(query = %active, "search: query changed");
    self.state.debounced_query = active;
    self.state.genre_filter = genre;
    self.begin_epoch()
  }

  /// GENRE_CHANGED: the genre replaces any free text, typed or active.
  fn on_genre_selected(&mut self, genre: &str) -> Vec<SearchCommand> {
    let genre = genre.trim().to_string();
    self.state.error = None;
    self.state.raw_query.clear();
    self.debounce_generation += 1;
    self.location = std::mem::take(&mut self.location).with_genre(&genre);
    let mut commands =
      vec![SearchCommand::CancelDebounce, SearchCommand::ReplaceLocation(self.location.to_search_string())];
    if genre != self.state.genre_filter || !self.state.debounced_query.is_empty() {
      debug!(genre = %genre, "search: genre changed");
      self.state.genre_filter = genre;
      self.state.debounced_query.clear();
      commands.extend(self.begin_epoch());
    }
    commands
  }

  /// Validate the search box; a non-empty query skips the rest of the quiet period.
  fn on_submit(&mut self) -> Vec<SearchCommand> {
    if self.state.raw_query.trim().is_empty() {
      self.state.error = Some(EMPTY_QUERY_MESSAGE.to_string());
      return Vec::new();
    }
    self.state.error = None;
    self.debounce_generation += 1;
    let mut commands = vec![SearchCommand::CancelDebounce];
    commands.extend(self.activate_raw_query());
    commands
  }

  fn begin_epoch(&mut self) -> Vec<SearchCommand> {
    let mut commands = Vec::new();
    if let Some(ticket) = self.head.take() {
      commands.push(SearchCommand::Cancel { ticket });
    }
    // An in-flight next page is left to finish; its epoch no longer matches.
    self.next = None;

    self.state.epoch += 1;
    self.state.results.clear();
    self.state.page = 1;
    self.state.has_more = true;
    self.state.loading_first = true;
    self.state.loading_more = false;

    let ticket = FetchTicket { epoch: self.state.epoch, page: 1 };
    self.head = Some(ticket);
    info!(epoch = ticket.epoch, request = ?self.request_for(1), "search: new epoch");
    commands.push(SearchCommand::Fetch { ticket, request: self.request_for(1) });
    commands
  }

  fn on_page_fetched(&mut self, ticket: FetchTicket, items: Vec<Movie>) -> Vec<SearchCommand> {
    if ticket.epoch != self.state.epoch {
      debug!(?ticket, epoch = self.state.epoch, "search: dropping response from superseded epoch");
      return Vec::new();
    }
    if ticket.is_first_page() {
      if self.head != Some(ticket) {
        return Vec::new();
      }
      self.head = None;
      self.state.loading_first = false;
      self.state.has_more = !items.is_empty();
      self.state.page = 1;
      debug!(count = items.len(), "search: first page loaded");
      self.state.results = items;
    } else {
      if self.next != Some(ticket) {
        return Vec::new();
      }
      self.next = None;
      self.state.loading_more = false;
      if items.is_empty() {
        debug!(page = ticket.page, "search: end of results");
        self.state.has_more = false;
      } else {
        debug!(page = ticket.page, count = items.len(), "search: page appended");
        self.state.results.extend(items);
        self.state.page = ticket.page;
      }
    }
    Vec::new()
  }

  /// A failed first page reads as "no results"; a failed later page keeps
  /// what we have and allows a retry on the next trigger.
  fn on_page_failed(&mut self, ticket: FetchTicket, error: &str) -> Vec<SearchCommand> {
    if ticket.epoch != self.state.epoch {
      return Vec::new();
    }
    if ticket.is_first_page() {
      if self.head != Some(ticket) {
        return Vec::new();
      }
      warn!(err = %error, "search: first page failed, showing no results");
      self.head = None;
      self.state.loading_first = false;
      self.state.results.clear();
      self.state.has_more = false;
    } else {
      if self.next != Some(ticket) {
        return Vec::new();
      }
      warn!(page = ticket.page, err = %error, "search: next page failed");
      self.next = None;
      self.state.loading_more = false;
    }
    Vec::new()
  }

  fn on_load_more(&mut self) -> Vec<SearchCommand> {
    if !self.state.has_more || self.state.loading_first || self.state.loading_more {
      return Vec::new();
    }
    let ticket = FetchTicket { epoch: self.state.epoch, page: self.state.page + 1 };
    self.state.loading_more = true;
    self.next = Some(ticket);
    debug!(page = ticket.page, "search: loading more");
    vec![SearchCommand::Fetch { ticket, request: self.request_for(ticket.page) }]
  }

  fn on_unmount(&mut self) -> Vec<SearchCommand> {
    self.mounted = false;
    let mut commands = vec![SearchCommand::CancelDebounce];
    commands.extend(self.head.take().map(|ticket| SearchCommand::Cancel { ticket }));
    commands.extend(self.next.take().map(|ticket| SearchCommand::Cancel { ticket }));
    self.state.epoch += 1;
    self.state.loading_first = false;
    self.state.loading_more = false;
    info!("search: unmounted");
    commands
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::movie::{MovieId, extract_movies};
  use proptest::prelude::*;
  use reqwest::Url;
  use serde_json::json;

  const DEBOUNCE: Duration = Duration::from_millis(450);

  fn movies(ids: &[i64]) -> Vec<Movie> {
    ids.iter().map(|id| Movie::from_json(&json!({ "id": id, "title": format!("m{}", id) }))).collect()
  }

  fn fetches(commands: &[SearchCommand]) -> Vec<(FetchTicket, CatalogRequest)> {
    commands
      .iter()
      .filter_map(|c| match c {
        SearchCommand::Fetch { ticket, request } => Some((*ticket, request.clone())),
        _ => None,
      })
      .collect()
  }

  fn only_fetch(commands: &[SearchCommand]) -> (FetchTicket, CatalogRequest) {
    let f = fetches(commands);
    assert_eq!(f.len(), 1, "expected exactly one fetch in {:?}", commands);
    f[0].clone()
  }

  fn debounce_generation(commands: &[SearchCommand]) -> u64 {
    commands
      .iter()
      .find_map(|c| match c {
        SearchCommand::ScheduleDebounce { generation, .. } => Some(*generation),
        _ => None,
      })
      .expect("debounce scheduled")
  }

  fn location(commands: &[SearchCommand]) -> Option<String> {
    commands.iter().rev().find_map(|c| match c {
      SearchCommand::ReplaceLocation(s) => Some(s.clone()),
      _ => None,
    })
  }

  fn ids(c: &SearchController) -> Vec<MovieId> {
    c.state().results.iter().filter_map(|m| m.id.clone()).collect()
  }

  /// Mount on an unfiltered browse and resolve its first page.
  fn browsing(first_page: &[i64]) -> SearchController {
    let (mut c, cmds) = SearchController::mount(&SearchParams::default(), DEBOUNCE);
    let (ticket, _) = only_fetch(&cmds);
    c.dispatch(SearchEvent::PageFetched { ticket, items: movies(first_page) });
    c
  }

  #[test]
  fn batman_scenario() {
    let (mut c, cmds) = SearchController::mount(&SearchParams::from_search("?q=batman"), DEBOUNCE);
    let (ticket, request) = only_fetch(&cmds);
    let base = Url::parse("https://moviesapi.codingfront.dev/api/v1").unwrap();
    assert_eq!(request.url(&base).unwrap().as_str(), "https://moviesapi.codingfront.dev/api/v1/movies?q=batman&page=1");
    assert!(c.state().loading_first);

    let page = extract_movies(&json!({ "results": [{ "id": 1, "title": "Batman" }] }));
    c.dispatch(SearchEvent::PageFetched { ticket, items: page });
    assert_eq!(c.state().results.len(), 1);
    assert!(c.state().has_more);
    assert!(!c.state().loading_first);
    assert!(c.scroll_enabled());
  }

  #[test]
  fn empty_first_page_ends_results() {
    let c = browsing(&[]);
    assert!(!c.state().has_more);
    assert!(c.state().results.is_empty());
    assert!(!c.scroll_enabled());
  }

  #[test]
  fn rapid_edits_issue_one_fetch_with_final_value() {
    let mut c = browsing(&[1]);
    let mut generations = Vec::new();
    for raw in ["b", "ba", "bat", "batm"] {
      let cmds = c.dispatch(SearchEvent::QueryEdited(raw.to_string()));
      assert!(fetches(&cmds).is_empty(), "no fetch per keystroke");
      generations.push(debounce_generation(&cmds));
    }
    // Timers from earlier keystrokes firing late change nothing
    for g in &generations[..3] {
      assert!(c.dispatch(SearchEvent::DebounceElapsed { generation: *g }).is_empty());
    }
    let cmds = c.dispatch(SearchEvent::DebounceElapsed { generation: generations[3] });
    let (ticket, request) = only_fetch(&cmds);
    assert_eq!(request, CatalogRequest::Search { query: "batm".into(), page: 1 });
    assert_eq!(ticket.page, 1);
    assert_eq!(c.state().debounced_query, "batm");
  }

  #[test]
  fn unrelated_events_do_not_restart_debounce() {
    let mut c = browsing(&[1, 2]);
    let g = debounce_generation(&c.dispatch(SearchEvent::QueryEdited("heat".into())));
    let more = c.dispatch(SearchEvent::LoadMore);
    assert_eq!(fetches(&more).len(), 1);
    let cmds = c.dispatch(SearchEvent::DebounceElapsed { generation: g });
    assert_eq!(only_fetch(&cmds).1, CatalogRequest::Search { query: "heat".into(), page: 1 });
  }

  #[test]
  fn edits_update_location_with_raw_text() {
    let mut c = browsing(&[1]);
    let cmds = c.dispatch(SearchEvent::QueryEdited("  dune ".into()));
    assert_eq!(location(&cmds).as_deref(), Some("?q=dune"));
    assert_eq!(c.state().raw_query, "  dune ");
    let cmds = c.dispatch(SearchEvent::QueryEdited(String::new()));
    assert_eq!(location(&cmds).as_deref(), Some(""));
  }

  #[test]
  fn whitespace_only_change_keeps_epoch() {
    let (mut c, _) = SearchController::mount(&SearchParams::query("dune"), DEBOUNCE);
    let epoch = c.state().epoch;
    let g = debounce_generation(&c.dispatch(SearchEvent::QueryEdited("dune  ".into())));
    assert!(c.dispatch(SearchEvent::DebounceElapsed { generation: g }).is_empty());
    assert_eq!(c.state().epoch, epoch);
  }

  #[test]
  fn epoch_transition_discards_old_results_for_good() {
    let mut c = browsing(&[1, 2, 3]);
    let more = only_fetch(&c.dispatch(SearchEvent::LoadMore)).0;

    let g = debounce_generation(&c.dispatch(SearchEvent::QueryEdited("alien".into())));
    let cmds = c.dispatch(SearchEvent::DebounceElapsed { generation: g });
    let (head, _) = only_fetch(&cmds);
    assert!(c.state().results.is_empty());
    assert_eq!(c.state().page, 1);
    assert!(c.state().has_more);

    // Old lineage resolves after the switch
    c.dispatch(SearchEvent::PageFetched { ticket: more, items: movies(&[4, 5]) });
    assert!(c.state().results.is_empty());

    c.dispatch(SearchEvent::PageFetched { ticket: head, items: movies(&[100]) });
    assert_eq!(ids(&c), vec![MovieId::Num(100)]);
  }

  #[test]
  fn new_epoch_cancels_previous_head() {
    let (mut c, cmds) = SearchController::mount(&SearchParams::default(), DEBOUNCE);
    let (first, _) = only_fetch(&cmds);
    let cmds = c.dispatch(SearchEvent::GenreSelected("Drama".into()));
    assert!(cmds.contains(&SearchCommand::Cancel { ticket: first }));
    let (second, request) = only_fetch(&cmds);
    assert_eq!(request, CatalogRequest::ByGenre { genre: "Drama".into(), page: 1 });

    // The cancelled fetch completes anyway
    c.dispatch(SearchEvent::PageFetched { ticket: first, items: movies(&[1]) });
    assert!(c.state().results.is_empty());
    assert!(c.state().loading_first);
    c.dispatch(SearchEvent::PageFetched { ticket: second, items: movies(&[2]) });
    assert_eq!(ids(&c), vec![MovieId::Num(2)]);
  }

  #[test]
  fn genre_replaces_free_text() {
    let (mut c, cmds) = SearchController::mount(&SearchParams::query("batman"), DEBOUNCE);
    let (t, _) = only_fetch(&cmds);
    c.dispatch(SearchEvent::PageFetched { ticket: t, items: movies(&[1]) });

    let cmds = c.dispatch(SearchEvent::GenreSelected("Action".into()));
    assert_eq!(location(&cmds).as_deref(), Some("?genre=Action"));
    assert_eq!(c.location().get("q"), None);
    assert_eq!(only_fetch(&cmds).1, CatalogRequest::ByGenre { genre: "Action".into(), page: 1 });
    assert_eq!(c.state().raw_query, "");
    assert_eq!(c.state().debounced_query, "");

    // Later pages stay genre-scoped
    let (t, _) = only_fetch(&cmds);
    c.dispatch(SearchEvent::PageFetched { ticket: t, items: movies(&[7]) });
    let more = c.dispatch(SearchEvent::LoadMore);
    assert_eq!(only_fetch(&more).1, CatalogRequest::ByGenre { genre: "Action".into(), page: 2 });
  }

  #[test]
  fn genre_select_invalidates_pending_debounce() {
    let mut c = browsing(&[1]);
    let g = debounce_generation(&c.dispatch(SearchEvent::QueryEdited("bat".into())));
    c.dispatch(SearchEvent::GenreSelected("Action".into()));
    assert!(c.dispatch(SearchEvent::DebounceElapsed { generation: g }).is_empty());
    assert_eq!(c.state().genre_filter, "Action");
  }

  #[test]
  fn reselecting_same_genre_is_not_a_new_epoch() {
    let (mut c, _) = SearchController::mount(&SearchParams::genre("Action"), DEBOUNCE);
    let epoch = c.state().epoch;
    let cmds = c.dispatch(SearchEvent::GenreSelected("Action".into()));
    assert!(fetches(&cmds).is_empty());
    assert_eq!(c.state().epoch, epoch);
  }

  #[test]
  fn typed_query_replaces_genre_once_active() {
    let (mut c, _) = SearchController::mount(&SearchParams::genre("Action"), DEBOUNCE);
    let cmds = c.dispatch(SearchEvent::QueryEdited("heat".into()));
    assert_eq!(location(&cmds).as_deref(), Some("?q=heat"));
    assert_eq!(c.state().genre_filter, "Action");
    let g = debounce_generation(&cmds);
    let cmds = c.dispatch(SearchEvent::DebounceElapsed { generation: g });
    assert_eq!(only_fetch(&cmds).1, CatalogRequest::Search { query: "heat".into(), page: 1 });
    assert_eq!(c.state().genre_filter, "");
  }

  #[test]
  fn clearing_input_returns_to_browse_all() {
    let (mut c, _) = SearchController::mount(&SearchParams::query("heat"), DEBOUNCE);
    let g = debounce_generation(&c.dispatch(SearchEvent::QueryEdited(String::new())));
    let cmds = c.dispatch(SearchEvent::DebounceElapsed { generation: g });
    assert_eq!(only_fetch(&cmds).1, CatalogRequest::Browse { page: 1 });
  }

  #[test]
  fn load_more_appends_in_order_and_advances_page() {
    let mut c = browsing(&[1, 2]);
    let (t, req) = only_fetch(&c.dispatch(SearchEvent::LoadMore));
    assert_eq!(req, CatalogRequest::Browse { page: 2 });
    assert!(c.state().loading_more);
    c.dispatch(SearchEvent::PageFetched { ticket: t, items: movies(&[3, 4]) });
    assert_eq!(ids(&c), [1, 2, 3, 4].map(MovieId::Num).to_vec());
    assert_eq!(c.state().page, 2);
    assert!(c.state().has_more);
    assert!(!c.state().loading_more);
  }

  #[test]
  fn empty_next_page_stops_pagination() {
    let mut c = browsing(&[1]);
    let (t, _) = only_fetch(&c.dispatch(SearchEvent::LoadMore));
    c.dispatch(SearchEvent::PageFetched { ticket: t, items: Vec::new() });
    assert!(!c.state().has_more);
    assert_eq!(c.state().page, 1);
    assert!(c.dispatch(SearchEvent::LoadMore).is_empty());
  }

  #[test]
  fn first_page_failure_means_no_results() {
    let (mut c, cmds) = SearchController::mount(&SearchParams::query("x"), DEBOUNCE);
    let (t, _) = only_fetch(&cmds);
    c.dispatch(SearchEvent::PageFailed { ticket: t, error: "500".into() });
    assert!(c.state().results.is_empty());
    assert!(!c.state().has_more);
    assert!(!c.state().loading_first);
    assert!(c.dispatch(SearchEvent::LoadMore).is_empty());
  }

  #[test]
  fn next_page_failure_allows_retry() {
    let mut c = browsing(&[1, 2]);
    let (t, _) = only_fetch(&c.dispatch(SearchEvent::LoadMore));
    c.dispatch(SearchEvent::PageFailed { ticket: t, error: "timeout".into() });
    assert_eq!(c.state().results.len(), 2);
    assert!(c.state().has_more);
    assert!(!c.state().loading_more);
    let (retry, _) = only_fetch(&c.dispatch(SearchEvent::LoadMore));
    assert_eq!(retry.page, 2);
  }

  #[test]
  fn load_more_blocked_while_first_page_loading() {
    let (mut c, _) = SearchController::mount(&SearchParams::default(), DEBOUNCE);
    assert!(c.dispatch(SearchEvent::LoadMore).is_empty());
    assert!(!c.scroll_enabled());
  }

  #[test]
  fn load_more_storm_yields_single_request() {
    let mut c = browsing(&[1]);
    let issued: usize = (0..25).map(|_| fetches(&c.dispatch(SearchEvent::LoadMore)).len()).sum();
    assert_eq!(issued, 1);
  }

  #[test]
  fn duplicate_response_is_ignored() {
    let mut c = browsing(&[1]);
    let (t, _) = only_fetch(&c.dispatch(SearchEvent::LoadMore));
    c.dispatch(SearchEvent::PageFetched { ticket: t, items: movies(&[2]) });
    c.dispatch(SearchEvent::PageFetched { ticket: t, items: movies(&[2]) });
    assert_eq!(c.state().results.len(), 2);
  }

  #[test]
  fn submit_validates_and_flushes_debounce() {
    let mut c = browsing(&[1]);
    assert!(c.dispatch(SearchEvent::Submit).is_empty());
    assert_eq!(c.state().error.as_deref(), Some(EMPTY_QUERY_MESSAGE));

    let g = debounce_generation(&c.dispatch(SearchEvent::QueryEdited("up".into())));
    assert_eq!(c.state().error, None);
    let cmds = c.dispatch(SearchEvent::Submit);
    assert!(cmds.contains(&SearchCommand::CancelDebounce));
    assert_eq!(only_fetch(&cmds).1, CatalogRequest::Search { query: "up".into(), page: 1 });
    assert!(c.dispatch(SearchEvent::DebounceElapsed { generation: g }).is_empty());
  }

  #[test]
  fn unmount_cancels_everything_and_ignores_late_results() {
    let mut c = browsing(&[1]);
    let (more, _) = only_fetch(&c.dispatch(SearchEvent::LoadMore));
    let cmds = c.dispatch(SearchEvent::Unmount);
    assert!(cmds.contains(&SearchCommand::Cancel { ticket: more }));
    assert!(cmds.contains(&SearchCommand::CancelDebounce));
    assert!(!c.is_mounted());
    c.dispatch(SearchEvent::PageFetched { ticket: more, items: movies(&[9]) });
    assert_eq!(c.state().results.len(), 1);
    assert!(c.dispatch(SearchEvent::LoadMore).is_empty());
  }

  #[test]
  fn scroll_key_tracks_handler_inputs() {
    let mut c = browsing(&[1]);
    let before = c.scroll_key();
    c.dispatch(SearchEvent::LoadMore);
    assert_ne!(c.scroll_key(), before);
  }

  // --- Property checks ---

  #[derive(Debug, Clone)]
  enum Step {
    LoadMore,
    ResolveHead(u8),
    ResolveNext(u8),
    FailNext,
    FailHead,
    Retype(u8),
    Genre(u8),
  }

  fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
      4 => Just(Step::LoadMore),
      2 => (0u8..3).prop_map(Step::ResolveHead),
      3 => (0u8..3).prop_map(Step::ResolveNext),
      1 => Just(Step::FailNext),
      1 => Just(Step::FailHead),
      1 => (0u8..3).prop_map(Step::Retype),
      1 => (0u8..2).prop_map(Step::Genre),
    ]
  }

  proptest! {
    #[test]
    fn lineage_invariants_hold(steps in proptest::collection::vec(step(), 1..60)) {
      let (mut c, cmds) = SearchController::mount(&SearchParams::default(), DEBOUNCE);
      // Outstanding fetches, oldest first, exactly as a runtime would hold them.
      let mut outstanding: Vec<FetchTicket> = fetches(&cmds).into_iter().map(|(t, _)| t).collect();
      let mut next_id = 0i64;

      for step in steps {
        let has_more_before = c.state().has_more;
        let cmds = match step {
          Step::LoadMore => c.dispatch(SearchEvent::LoadMore),
          Step::ResolveHead(n) | Step::ResolveNext(n) => {
            let want_first = matches!(step, Step::ResolveHead(_));
            let Some(pos) = outstanding.iter().position(|t| t.is_first_page() == want_first) else { continue };
            let ticket = outstanding.remove(pos);
            // Encode the epoch in the ids so stale items are recognisable.
            let items: Vec<Movie> = (0..n)
              .map(|_| {
                next_id += 1;
                Movie::from_json(&json!({ "id": ticket.epoch as i64 * 10_000 + next_id }))
              })
              .collect();
            c.dispatch(SearchEvent::PageFetched { ticket, items })
          }
          Step::FailNext | Step::FailHead => {
            let want_first = matches!(step, Step::FailHead);
            let Some(pos) = outstanding.iter().position(|t| t.is_first_page() == want_first) else { continue };
            let ticket = outstanding.remove(pos);
            c.dispatch(SearchEvent::PageFailed { ticket, error: "boom".into() })
          }
          Step::Retype(n) => {
            let g = debounce_generation(&c.dispatch(SearchEvent::QueryEdited(format!("q{}", n))));
            c.dispatch(SearchEvent::DebounceElapsed { generation: g })
          }
          Step::Genre(n) => c.dispatch(SearchEvent::GenreSelected(format!("g{}", n))),
        };

        for cmd in &cmds {
          match cmd {
            SearchCommand::Fetch { ticket, .. } => {
              if !ticket.is_first_page() {
                prop_assert!(has_more_before, "next page requested with has_more=false");
              }
              outstanding.push(*ticket);
            }
            SearchCommand::Cancel { ticket } => outstanding.retain(|t| t != ticket),
            _ => {}
          }
        }

        let epoch = c.state().epoch;
        let live_next = outstanding.iter().filter(|t| t.epoch == epoch && !t.is_first_page()).count();
        let live_head = outstanding.iter().filter(|t| t.epoch == epoch && t.is_first_page()).count();
        prop_assert!(live_next <= 1);
        prop_assert!(live_head <= 1);
        prop_assert!(!(live_next == 1 && live_head == 1));
        for m in &c.state().results {
          let Some(MovieId::Num(id)) = m.id else { unreachable!() };
          prop_assert_eq!((id / 10_000) as u64, epoch, "result from a superseded epoch");
        }
      }
    }
  }
}

use ratatui::widgets::ListState;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::catalog::CatalogClient;
use crate::constants::constants;
use crate::input::TextInput;
use crate::movie::{GenreRef, Movie};
use crate::query::{Location, SearchParams};
use crate::scroll::{InfiniteScroll, Viewport};
use crate::search::{FetchTicket, ScrollKey, SearchCommand, SearchController, SearchEvent, SearchState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultsFocus {
  Input,
  List,
}

/// Background work owned by one results screen.
#[derive(Default)]
struct SearchTasks {
  debounce: Option<JoinHandle<()>>,
  fetches: HashMap<FetchTicket, JoinHandle<()>>,
  /// Total fetches started, for diagnostics.
  started: usize,
}

impl SearchTasks {
  fn abort_all(&mut self) {
    if let Some(handle) = self.debounce.take() {
      handle.abort();
    }
    for (_, handle) in self.fetches.drain() {
      handle.abort();
    }
  }
}

/// The results screen: search box, controller, and the tasks carrying out
/// its commands. Task outcomes come back over a channel drained each tick.
pub struct ResultsView {
  pub input: TextInput,
  pub focus: ResultsFocus,
  pub list_state: ListState,
  /// Visible window of the list from the last draw.
  pub viewport: Option<Viewport>,
  controller: SearchController,
  scroll: InfiniteScroll<ScrollKey>,
  client: CatalogClient,
  tasks: SearchTasks,
  tx: mpsc::UnboundedSender<SearchEvent>,
  rx: mpsc::UnboundedReceiver<SearchEvent>,
}

impl ResultsView {
  pub fn mount(client: CatalogClient, params: &SearchParams) -> Self {
    let (controller, commands) = SearchController::mount(params, constants().debounce());
    let (tx, rx) = mpsc::unbounded_channel();
    let mut view = Self {
      input: TextInput::new(&params.q),
      focus: if params.q.is_empty() && params.genre.is_empty() { ResultsFocus::Input } else { ResultsFocus::List },
      list_state: ListState::default(),
      viewport: None,
      controller,
      scroll: InfiniteScroll::new(constants().sentinel_margin_rows),
      client,
      tasks: SearchTasks::default(),
      tx,
      rx,
    };
    view.execute(commands);
    view
  }

  pub fn state(&self) -> &SearchState {
    self.controller.state()
  }

  pub fn location(&self) -> &Location {
    self.controller.location()
  }

  pub fn params(&self) -> SearchParams {
    self.controller.location().params()
  }

  pub fn selected_movie(&self) -> Option<&Movie> {
    self.list_state.selected().and_then(|i| self.state().results.get(i))
  }

  #[cfg(test)]
  pub fn fetches_started(&self) -> usize {
    self.tasks.started
  }

  pub fn dispatch(&mut self, event: SearchEvent) {
    let commands = self.controller.dispatch(event);
    self.execute(commands);
  }

  /// Push the search box text into the controller.
  pub fn query_edited(&mut self) {
    self.dispatch(SearchEvent::QueryEdited(self.input.text.clone()));
  }

  pub fn set_query(&mut self, text: &str) {
    self.input.set(text);
    self.query_edited();
  }

  /// Re-scope the screen to `genre`, clearing the search box.
  pub fn select_genre(&mut self, genre: &str) {
    self.input.set("");
    self.list_state.select(None);
    self.dispatch(SearchEvent::GenreSelected(genre.to_string()));
  }

  /// First genre of the selected movie other than the active filter.
  pub fn next_genre_of_selected(&self) -> Option<String> {
    let active = self.params().genre;
    let movie = self.selected_movie()?;
    movie.genres.iter().map(GenreRef::name).find(|g| !g.is_empty() && *g != active).map(str::to_string)
  }

  /// Returns the validation message if the search box was empty.
  pub fn submit(&mut self) -> Option<String> {
    self.dispatch(SearchEvent::Submit);
    let error = self.state().error.clone();
    if error.is_none() {
      self.focus = ResultsFocus::List;
    }
    error
  }

  fn execute(&mut self, commands: Vec<SearchCommand>) {
    for command in commands {
      match command {
        SearchCommand::ScheduleDebounce { generation, delay } => {
          if let Some(handle) = self.tasks.debounce.take() {
            handle.abort();
          }
          let tx = self.tx.clone();
          self.tasks.debounce = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SearchEvent::DebounceElapsed { generation });
          }));
        }
        SearchCommand::CancelDebounce => {
          if let Some(handle) = self.tasks.debounce.take() {
            handle.abort();
          }
        }
        SearchCommand::Fetch { ticket, request } => {
          let client = self.client.clone();
          let tx = self.tx.clone();
          self.tasks.started += 1;
          let handle = tokio::spawn(async move {
            let event = match client.fetch_page(&request).await {
              Ok(items) => SearchEvent::PageFetched { ticket, items },
              Err(e) => SearchEvent::PageFailed { ticket, error: e.to_string() },
            };
            let _ = tx.send(event);
          });
          self.tasks.fetches.insert(ticket, handle);
        }
        SearchCommand::Cancel { ticket } => {
          if let Some(handle) = self.tasks.fetches.remove(&ticket) {
            debug!(?ticket, "results: aborting fetch");
            handle.abort();
          }
        }
        SearchCommand::ReplaceLocation(search) => {
          debug!(location = %search, "results: location replaced");
        }
      }
    }
  }

  /// Apply finished task outcomes. Returns true if anything changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(event) = self.rx.try_recv() {
      if let SearchEvent::PageFetched { ticket, .. } | SearchEvent::PageFailed { ticket, .. } = &event {
        self.tasks.fetches.remove(ticket);
      }
      self.dispatch(event);
      changed = true;
    }
    if changed {
      self.clamp_selection();
    }
    changed
  }

  fn clamp_selection(&mut self) {
    let len = self.state().results.len();
    match self.list_state.selected() {
      _ if len == 0 => self.list_state.select(None),
      Some(i) if i >= len => self.list_state.select(Some(len - 1)),
      None if self.focus == ResultsFocus::List => self.list_state.select(Some(0)),
      _ => {}
    }
  }

  /// Feed the last drawn viewport to the infinite-scroll trigger.
  pub fn after_draw(&mut self) {
    self.scroll.configure(self.controller.scroll_enabled(), self.controller.scroll_key());
    let Some(viewport) = self.viewport else { return };
    let sentinel = self.state().results.len();
    if self.scroll.observe(sentinel, viewport) {
      debug!(sentinel, "results: sentinel in range");
      self.dispatch(SearchEvent::LoadMore);
    }
  }

  pub fn select_next(&mut self) {
    let len = self.state().results.len();
    if len == 0 {
      return;
    }
    let i = self.list_state.selected().map_or(0, |i| (i + 1).min(len - 1));
    self.list_state.select(Some(i));
  }

  pub fn select_previous(&mut self) {
    let i = self.list_state.selected().map_or(0, |i| i.saturating_sub(1));
    if !self.state().results.is_empty() {
      self.list_state.select(Some(i));
    }
  }

  /// Cancel everything this screen started. Idempotent.
  pub fn unmount(&mut self) {
    if self.controller.is_mounted() {
      debug!(fetches = self.tasks.started, location = %self.location().to_search_string(), "results: unmounting");
      let commands = self.controller.dispatch(SearchEvent::Unmount);
      self.execute(commands);
    }
    self.scroll.reset();
    self.tasks.abort_all();
  }
}

impl Drop for ResultsView {
  fn drop(&mut self) {
    if !self.tasks.fetches.is_empty() || self.tasks.debounce.is_some() {
      warn!("results: dropped without unmount, aborting tasks");
    }
    self.tasks.abort_all();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  /// Nothing listens on the discard port, so fetches fail fast.
  fn dead_client() -> CatalogClient {
    CatalogClient::new("http://127.0.0.1:9/api/v1").unwrap()
  }

  async fn settle(view: &mut ResultsView, wait: Duration) {
    let deadline = tokio::time::Instant::now() + wait;
    while tokio::time::Instant::now() < deadline {
      view.poll();
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    view.poll();
  }

  #[tokio::test]
  async fn typing_burst_reaches_catalog_once() {
    let mut view = ResultsView::mount(dead_client(), &SearchParams::default());
    assert_eq!(view.fetches_started(), 1);
    for c in "heat".chars() {
      view.input.insert(c);
      view.query_edited();
    }
    assert_eq!(view.fetches_started(), 1);
    settle(&mut view, constants().debounce() + Duration::from_millis(400)).await;
    assert_eq!(view.fetches_started(), 2);
    assert_eq!(view.state().debounced_query, "heat");
    view.unmount();
  }

  #[tokio::test]
  async fn unreachable_catalog_reads_as_no_results() {
    let mut view = ResultsView::mount(dead_client(), &SearchParams::query("batman"));
    settle(&mut view, Duration::from_millis(500)).await;
    assert!(!view.state().loading_first);
    assert!(view.state().results.is_empty());
    assert!(!view.state().has_more);
    view.unmount();
  }

  #[tokio::test]
  async fn empty_submit_reports_validation_message() {
    let mut view = ResultsView::mount(dead_client(), &SearchParams::default());
    assert_eq!(view.submit().as_deref(), Some(crate::search::EMPTY_QUERY_MESSAGE));
    assert_eq!(view.focus, ResultsFocus::Input);
    view.unmount();
  }

  #[tokio::test]
  async fn unmount_aborts_tasks() {
    let mut view = ResultsView::mount(dead_client(), &SearchParams::default());
    view.set_query("alien");
    view.unmount();
    assert!(view.tasks.fetches.is_empty());
    assert!(view.tasks.debounce.is_none());
    assert!(!view.controller.is_mounted());
  }

  #[tokio::test]
  async fn genre_selection_clears_search_box() {
    let mut view = ResultsView::mount(dead_client(), &SearchParams::query("batman"));
    view.select_genre("Action");
    assert_eq!(view.input.text, "");
    assert_eq!(view.location().to_search_string(), "?genre=Action");
    view.unmount();
  }

  #[tokio::test]
  async fn genre_of_selected_movie_rescopes_results() {
    let mut view = ResultsView::mount(dead_client(), &SearchParams::genre("Crime"));
    let ticket = FetchTicket { epoch: view.state().epoch, page: 1 };
    let heat = Movie::from_json(&serde_json::json!({ "id": 1, "title": "Heat", "genres": ["Crime", "Drama"] }));
    view.dispatch(SearchEvent::PageFetched { ticket, items: vec![heat] });
    view.list_state.select(Some(0));

    let genre = view.next_genre_of_selected();
    assert_eq!(genre.as_deref(), Some("Drama"));
    view.select_genre("Drama");
    assert_eq!(view.params(), SearchParams::genre("Drama"));
    assert!(view.state().results.is_empty());
    assert!(view.state().loading_first);
    assert_eq!(view.list_state.selected(), None);
    assert_eq!(view.fetches_started(), 2);
    view.unmount();
  }
}

mod app;
mod catalog;
mod config;
mod constants;
mod dictation;
mod favorites;
mod format;
mod input;
mod logging;
mod movie;
mod query;
mod results;
mod scroll;
mod search;
mod storage;
mod theme;
mod ui;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use app::{App, AppOptions};
use catalog::CatalogClient;
use config::Config;
use constants::constants;
use favorites::FavoritesStore;
use query::Location;
use storage::{FileStore, KvStore, MemoryStore};

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Open the results screen for this search
  #[arg(short, long, conflicts_with = "genre")]
  query: Option<String>,

  /// Open the results screen filtered by genre
  #[arg(short, long)]
  genre: Option<String>,

  /// Open the results screen at a saved address, e.g. "?genre=Drama"
  #[arg(short, long, value_name = "SEARCH", conflicts_with_all = ["query", "genre"])]
  location: Option<String>,

  /// Catalog API base URL (overrides prefs.toml)
  #[arg(long, value_name = "URL")]
  api_url: Option<String>,

  /// Start on the favorites screen
  #[arg(short, long)]
  favorites: bool,

  /// Colour theme: marquee, matinee or noir
  #[arg(short, long, value_name = "NAME")]
  theme: Option<String>,

  /// Print shell completions and exit
  #[arg(long, value_name = "SHELL")]
  completions: Option<Shell>,
}

/// File-backed storage in the platform data dir, in-memory if that fails.
fn open_storage() -> Arc<dyn KvStore> {
  match FileStore::default_dir().map(FileStore::open) {
    Some(Ok(store)) => {
      info!(dir = %store.dir().display(), "storage: using file store");
      Arc::new(store)
    }
    Some(Err(e)) => {
      warn!(err = %e, "storage: file store unavailable, favorites will not persist");
      Arc::new(MemoryStore::new())
    }
    None => {
      warn!("storage: no data directory, favorites will not persist");
      Arc::new(MemoryStore::new())
    }
  }
}

/// The address the results screen opens at, as a search string.
fn launch_search(args: &Args) -> String {
  match (&args.location, &args.query, &args.genre) {
    (Some(search), _, _) => search.clone(),
    (None, _, Some(genre)) => Location::default().with_genre(genre).to_search_string(),
    (None, Some(query), None) => Location::default().with_query(query).to_search_string(),
    (None, None, None) => String::new(),
  }
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Some(shell) = args.completions {
    clap_complete::generate(shell, &mut Args::command(), "iamdb", &mut std::io::stdout());
    return Ok(());
  }

  let _log_guard = logging::init(None);
  info!(version = env!("CARGO_PKG_VERSION"), "iamdb starting");

  let config = Config::load();
  let api_url =
    args.api_url.clone().or_else(|| config.api_base_url.clone()).unwrap_or_else(|| constants().api_base_url.clone());
  let catalog = CatalogClient::new(&api_url).with_context(|| format!("Invalid catalog URL: {}", api_url))?;
  info!(base = %catalog.base(), "catalog: configured");

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    ratatui::restore();
    default_hook(info);
  }));

  let favorites = FavoritesStore::load(open_storage(), &constants().favorites_key);
  let options = AppOptions {
    catalog,
    favorites,
    theme_index: app::resolve_theme(args.theme.as_deref(), &config),
    initial: app::initial_route(&launch_search(&args), args.favorites),
  };

  let mut terminal = ratatui::init();
  let result = run(&mut terminal, options).await;
  ratatui::restore();
  result
}

async fn run(terminal: &mut DefaultTerminal, options: AppOptions) -> Result<()> {
  let mut app = App::new(options);

  loop {
    app.check_pending();
    terminal.draw(|frame| ui::ui(frame, &mut app)).context("Failed to draw frame")?;
    app.after_draw();

    if event::poll(Duration::from_millis(100))? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => input::handle_key_event(&mut app, key),
        _ => {}
      }
    }

    app.expire_error();
    if app.should_quit {
      break;
    }
  }

  app.shutdown();
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cli_definition_is_valid() {
    Args::command().debug_assert();
  }

  #[test]
  fn query_and_genre_conflict() {
    assert!(Args::try_parse_from(["iamdb", "--query", "heat", "--genre", "Drama"]).is_err());
    let args = Args::try_parse_from(["iamdb", "-q", "heat", "--theme", "noir"]).unwrap();
    assert_eq!(args.query.as_deref(), Some("heat"));
    assert_eq!(args.theme.as_deref(), Some("noir"));
  }

  #[test]
  fn launch_search_from_flags() {
    let args = Args::try_parse_from(["iamdb", "--genre", " Sci Fi "]).unwrap();
    assert_eq!(launch_search(&args), "?genre=Sci+Fi");
    let args = Args::try_parse_from(["iamdb", "-q", "heat"]).unwrap();
    assert_eq!(launch_search(&args), "?q=heat");
    let args = Args::try_parse_from(["iamdb", "--location", "?genre=Drama&page=2"]).unwrap();
    assert_eq!(launch_search(&args), "?genre=Drama&page=2");
    assert_eq!(launch_search(&Args::try_parse_from(["iamdb"]).unwrap()), "");
  }

  #[test]
  fn location_conflicts_with_query() {
    assert!(Args::try_parse_from(["iamdb", "--location", "?q=a", "--query", "b"]).is_err());
  }

  #[test]
  fn completions_flag_parses_shell() {
    let args = Args::try_parse_from(["iamdb", "--completions", "zsh"]).unwrap();
    assert_eq!(args.completions, Some(Shell::Zsh));
  }
}

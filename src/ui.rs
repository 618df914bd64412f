use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Modifier, Style, Stylize},
  text::{Line, Span},
  widgets::{Block, BorderType, List, ListItem, Padding, Paragraph, Wrap},
};

use crate::app::{App, DetailView, HomeFocus, HomeView, Screen};
use crate::favorites::FavoritesStore;
use crate::format::{display_width, format_score, join_genres, safe_text, truncate_str};
use crate::input::TextInput;
use crate::movie::{Movie, MovieDetail};
use crate::results::{ResultsFocus, ResultsView};
use crate::scroll::Viewport;
use crate::theme::Theme;

const SPINNER: [&str; 8] = ["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];

// --- Helpers ---

fn panel<'a>(theme: &Theme, title: impl Into<Line<'a>>) -> Block<'a> {
  Block::bordered()
    .title(title)
    .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(theme.border))
}

fn centered_message(frame: &mut Frame, theme: &Theme, block: Block, area: Rect, msg: &str) {
  let text = vec![Line::from(""), Line::from(Span::styled(msg.to_string(), Style::default().fg(theme.muted)))];
  frame.render_widget(Paragraph::new(text).alignment(Alignment::Center).block(block), area);
}

/// "2008 · USA · ★ 9.0", skipping missing parts.
fn movie_meta(movie: &Movie) -> String {
  let mut parts = Vec::new();
  if let Some(year) = &movie.year {
    parts.push(year.to_string());
  }
  if let Some(country) = &movie.country {
    parts.push(country.to_string());
  }
  if let Some(score) = movie.rating.as_ref().and_then(|r| r.as_f64()) {
    parts.push(format!("★ {}", format_score(score)));
  }
  parts.retain(|p| !p.is_empty());
  parts.join(" · ")
}

/// One list row: favourite marker, title, right-aligned metadata.
fn movie_row<'a>(
  theme: &Theme,
  movie: &Movie,
  favorite: bool,
  inner_w: usize,
  selected: bool,
  i: usize,
) -> ListItem<'a> {
  let fg = if selected { theme.highlight_fg } else { theme.fg };
  let bg = if selected {
    theme.highlight_bg
  } else if i % 2 == 1 {
    theme.stripe_bg
  } else {
    theme.bg
  };
  let marker = if favorite { Span::styled("♥ ", Style::default().fg(theme.favorite)) } else { Span::raw("  ") };
  let right = movie_meta(movie);
  let right_w = right.chars().count();
  let title_max = inner_w.saturating_sub(right_w + 4);
  let title = truncate_str(&movie.title, title_max);
  let gap = inner_w.saturating_sub(title.chars().count() + right_w + 2);
  let line = Line::from(vec![
    marker,
    Span::styled(title, Style::default().fg(fg)),
    Span::raw(" ".repeat(gap)),
    Span::styled(right, Style::default().fg(theme.muted)),
  ]);
  ListItem::new(line).bg(bg)
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  let theme = app.theme();

  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());

  let [header_area, main_area, status_area, footer_area] =
    Layout::vertical([Constraint::Length(1), Constraint::Min(5), Constraint::Length(1), Constraint::Length(1)])
      .areas(frame.area());

  render_header(frame, app, header_area);
  let store = app.favorites.clone();
  match &mut app.screen {
    Screen::Home(home) => render_home(frame, theme, home, main_area),
    Screen::Results(view) => render_results(frame, theme, view, &store, main_area),
    Screen::Detail(view) => render_detail(frame, theme, view, &store, main_area),
    Screen::Favorites(view) => {
      let favorites = store.snapshot();
      let title = format!(" Favorites ({}) ", favorites.len());
      let block = panel(theme, title);
      if favorites.is_empty() {
        centered_message(frame, theme, block, main_area, "No favorites yet. Press f on a movie to save it.");
      } else {
        let inner_w = main_area.width.saturating_sub(4) as usize;
        let items: Vec<ListItem> = favorites
          .entries()
          .iter()
          .enumerate()
          .map(|(i, entry)| {
            let selected = Some(i) == view.list_state.selected();
            movie_row(theme, &entry.to_movie(), true, inner_w, selected, i)
          })
          .collect();
        let list = List::new(items).block(block).highlight_symbol("▶ ");
        frame.render_stateful_widget(list, main_area, &mut view.list_state);
      }
    }
  }
  render_status(frame, app, status_area);
  render_footer(frame, app, footer_area);
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let count = app.favorites.snapshot().len();
  let left = Line::from(vec![
    Span::styled(" ★ iamdb ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)),
    Span::styled(format!(" ♥ {} ", count), Style::default().fg(theme.favorite)),
  ]);
  frame.render_widget(left, area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

fn render_input(frame: &mut Frame, theme: &Theme, input: &mut TextInput, area: Rect, title: &str, focused: bool) {
  let border_color = if focused { theme.accent } else { theme.border };
  let block = Block::bordered()
    .title(title)
    .title_style(Style::default().fg(border_color))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(border_color))
    .padding(Padding::horizontal(1));

  let inner_w = area.width.saturating_sub(4) as usize;
  let cursor_col = display_width(&input.text, input.cursor);
  if cursor_col < input.scroll {
    input.scroll = cursor_col;
  } else if cursor_col >= input.scroll + inner_w {
    input.scroll = cursor_col.saturating_sub(inner_w) + 1;
  }

  let visible: String = input
    .text
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= input.scroll)
    .take_while(|(start, _, _)| *start < input.scroll + inner_w)
    .map(|(_, _, c)| c)
    .collect();

  frame.render_widget(Paragraph::new(visible).style(Style::default().fg(theme.fg)).block(block), area);
  if focused {
    let cursor_x = area.x + 2 + (cursor_col - input.scroll) as u16;
    frame.set_cursor_position((cursor_x, area.y + 1));
  }
}

fn render_home(frame: &mut Frame, theme: &Theme, home: &mut HomeView, area: Rect) {
  let chip_rows = if home.genres_expanded { 6 } else { 3 };
  let [welcome_area, input_area, genres_area] =
    Layout::vertical([Constraint::Min(4), Constraint::Length(3), Constraint::Length(chip_rows)]).areas(area);

  let text = vec![
    Line::from(""),
    Line::from(Span::styled("★  Welcome to iamdb", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))),
    Line::from(""),
    Line::from(Span::styled("Search the movie catalog. Keep your favorites.", Style::default().fg(theme.fg))),
    Line::from(Span::styled("Type a title below and press Enter, or pick a genre.", Style::default().fg(theme.muted))),
  ];
  frame.render_widget(Paragraph::new(text).alignment(Alignment::Center), welcome_area);

  let focused = home.focus == HomeFocus::Input;
  render_input(frame, theme, &mut home.input, input_area, " Search movies ", focused);

  let block = panel(theme, " Genres ");
  if home.genres_loading {
    let text = Span::styled(" Loading…", Style::default().fg(theme.muted));
    frame.render_widget(Paragraph::new(text).block(block), genres_area);
    return;
  }
  if home.genres.is_empty() {
    let text = Span::styled(" No genres", Style::default().fg(theme.muted));
    frame.render_widget(Paragraph::new(text).block(block), genres_area);
    return;
  }

  let chips_focused = home.focus == HomeFocus::Genres;
  let mut labels: Vec<String> = home.visible_genres().iter().map(|g| g.name.clone()).collect();
  if home.has_toggle() {
    labels.push(if home.genres_expanded { "show less".to_string() } else { "show more".to_string() });
  }
  let mut spans = Vec::new();
  for (i, label) in labels.iter().enumerate() {
    let selected = chips_focused && i == home.genre_cursor;
    let style = if selected {
      Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD)
    } else if home.has_toggle() && i == labels.len() - 1 {
      Style::default().fg(theme.accent)
    } else {
      Style::default().fg(theme.fg).bg(theme.stripe_bg)
    };
    spans.push(Span::styled(format!(" {} ", label), style));
    spans.push(Span::raw(" "));
  }
  let chips = Paragraph::new(Line::from(spans)).wrap(Wrap { trim: false }).block(block.padding(Padding::horizontal(1)));
  frame.render_widget(chips, genres_area);
}

fn render_results(frame: &mut Frame, theme: &Theme, view: &mut ResultsView, favorites: &FavoritesStore, area: Rect) {
  let [input_area, list_area] = Layout::vertical([Constraint::Length(3), Constraint::Min(3)]).areas(area);
  let focused = view.focus == ResultsFocus::Input;
  render_input(frame, theme, &mut view.input, input_area, " Search movies ", focused);

  let title = match view.params().subject() {
    Some(subject) => format!(" Result for \"{}\" ", subject),
    None => " All movies ".to_string(),
  };
  let address = view.location().to_search_string();
  let block = panel(theme, title).title_bottom(Line::from(format!(" {} ", address)).right_aligned().fg(theme.muted));
  let state = view.state();

  if state.loading_first {
    view.viewport = None;
    centered_message(frame, theme, block, list_area, "Loading…");
    return;
  }
  if state.results.is_empty() {
    view.viewport = None;
    centered_message(frame, theme, block, list_area, "No results found.");
    return;
  }

  let inner_w = list_area.width.saturating_sub(4) as usize;
  let selected = view.list_state.selected();
  let mut items: Vec<ListItem> = state
    .results
    .iter()
    .enumerate()
    .map(|(i, movie)| {
      let favorite = movie.id.as_ref().is_some_and(|id| favorites.is_favorite(id));
      movie_row(theme, movie, favorite, inner_w, Some(i) == selected, i)
    })
    .collect();
  if state.loading_more {
    items.push(ListItem::new(Line::from(Span::styled("  Loading more…", Style::default().fg(theme.muted)))));
  }

  let list = List::new(items)
    .block(block)
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD));
  frame.render_stateful_widget(list, list_area, &mut view.list_state);

  let height = list_area.height.saturating_sub(2) as usize;
  view.viewport = Some(Viewport { offset: view.list_state.offset(), height });
}

fn detail_lines<'a>(theme: &Theme, detail: &MovieDetail, favorite: bool) -> Vec<Line<'a>> {
  let movie = &detail.movie;
  let label = Style::default().fg(theme.muted);
  let value = Style::default().fg(theme.fg);
  let mut lines = vec![
    Line::from(Span::styled(movie.title.clone(), Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))),
    Line::from(Span::styled(join_genres(&movie.genres), label)),
    Line::from(""),
  ];

  let chips = [
    safe_text(detail.rated.as_ref()),
    safe_text(movie.year.as_ref()),
    safe_text(detail.runtime.as_ref()),
  ];
  let chip_spans: Vec<Span> =
    chips.iter().flat_map(|c| [Span::styled(format!(" {} ", c), value.bg(theme.stripe_bg)), Span::raw(" ")]).collect();
  lines.push(Line::from(chip_spans));
  lines.push(Line::from(""));

  lines.push(Line::from(vec![
    Span::styled("IMDB  ", label),
    Span::styled(format!("★ {}", format_score(detail.imdb_score())), Style::default().fg(theme.accent).bold()),
    Span::styled(format!("  ({} votes)", safe_text(detail.imdb_votes.as_ref())), label),
  ]));
  lines.push(Line::from(vec![
    Span::styled("Rotten Tomatoes  ", label),
    Span::styled(detail.rating_from("Rotten Tomatoes").unwrap_or("-").to_string(), value),
    Span::styled("    Metacritic  ", label),
    Span::styled(detail.rating_from("Metacritic").unwrap_or("-").to_string(), value),
  ]));
  lines.push(Line::from(""));

  if let Some(plot) = &detail.plot {
    lines.push(Line::from(Span::styled(plot.clone(), value)));
    lines.push(Line::from(""));
  }

  let crew = [
    ("Director", safe_text(detail.director.as_ref())),
    ("Writer", safe_text(detail.writer.as_ref())),
    ("Actors", safe_text(detail.actors.as_ref())),
    ("Language", safe_text(detail.language.as_ref())),
    ("Country", safe_text(movie.country.as_ref())),
    ("Awards", safe_text(detail.awards.as_ref())),
    ("Poster", detail.artwork().unwrap_or("-").to_string()),
  ];
  for (name, text) in crew {
    lines.push(Line::from(vec![Span::styled(format!("{:<10}", name), label), Span::styled(text, value)]));
  }
  lines.push(Line::from(""));
  lines.push(if favorite {
    Line::from(Span::styled("♥ In your favorites", Style::default().fg(theme.favorite)))
  } else {
    Line::from(Span::styled("♡ Not in favorites", label))
  });
  lines
}

fn render_detail(frame: &mut Frame, theme: &Theme, view: &DetailView, favorites: &FavoritesStore, area: Rect) {
  let block = panel(theme, " Movie ").padding(Padding::horizontal(1));
  if view.not_found() {
    centered_message(frame, theme, block, area, "Movie not found.");
    return;
  }
  let Some(detail) = &view.detail else {
    centered_message(frame, theme, block, area, "Loading…");
    return;
  };
  let lines = detail_lines(theme, detail, favorites.is_favorite(&view.id));
  let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false }).scroll((view.scroll, 0)).block(block);
  frame.render_widget(paragraph, area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let (text, style) = if let Some(msg) = &app.status_message {
    let tick = (app.started_at.elapsed().as_millis() / 100) as usize % SPINNER.len();
    (format!(" {} {}", SPINNER[tick], msg), Style::default().fg(theme.status))
  } else if let Some(err) = &app.last_error {
    (format!(" ⚠  {}", err), Style::default().fg(theme.error))
  } else if let Some(info) = &app.info_message {
    (format!(" ℹ  {}", info), Style::default().fg(theme.status))
  } else {
    (" Ready".to_string(), Style::default().fg(theme.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let mic = match (app.dictation.is_listening(), app.dictation.is_active()) {
    (true, _) => "Stop mic",
    (false, true) => "Cancel",
    (false, false) => "Voice",
  };
  let esc = if app.history().is_empty() { "Quit" } else { "Back" };
  let keys: Vec<(&str, &str)> = match &app.screen {
    Screen::Home(home) if home.focus == HomeFocus::Input => {
      vec![("Enter", "Search"), ("Tab", "Genres"), ("^r", mic), ("^f", "Favorites"), ("^t", "Theme"), ("Esc", esc)]
    }
    Screen::Home(_) => vec![("←/→", "Move"), ("Enter", "Open"), ("m", "More/less"), ("Tab", "Search")],
    Screen::Results(view) if view.focus == ResultsFocus::Input => {
      vec![("Enter", "Search"), ("↓", "Results"), ("^r", mic), ("^f", "Favorites"), ("Esc", "Back")]
    }
    Screen::Results(_) => vec![
      ("Enter", "Details"),
      ("j/k", "Navigate"),
      ("f", "Favorite"),
      ("g", "Genre"),
      ("/", "Search"),
      ("Esc", "Back"),
    ],
    Screen::Detail(_) => vec![("f", "Favorite"), ("j/k", "Scroll"), ("^f", "Favorites"), ("Esc", "Back")],
    Screen::Favorites(_) if app.last_removed.is_some() => {
      vec![("Enter", "Details"), ("j/k", "Navigate"), ("d", "Remove"), ("u", "Undo"), ("Esc", "Back")]
    }
    Screen::Favorites(_) => vec![("Enter", "Details"), ("j/k", "Navigate"), ("d", "Remove"), ("Esc", "Back")],
  };

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(theme.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();
  frame.render_widget(Line::from(spans), area);

  let theme_label = format!("{} ", theme.name);
  let right = Line::from(Span::styled(&theme_label, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(theme_label.len() as u16), width: theme_label.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn meta_skips_missing_parts() {
    let m =
      Movie::from_json(&json!({ "id": 1, "title": "Heat", "year": "1995", "country": "USA", "imdb_rating": "8.3" }));
    assert_eq!(movie_meta(&m), "1995 · USA · ★ 8.3");
    let bare = Movie::from_json(&json!({ "id": 2 }));
    assert_eq!(movie_meta(&bare), "");
  }

  #[test]
  fn detail_shows_zero_score_and_dashes() {
    let detail = MovieDetail::from_json(&json!({ "title": "Mystery" }), &crate::movie::MovieId::Num(5));
    let theme = &crate::theme::THEMES[0];
    let text: Vec<String> = detail_lines(theme, &detail, false)
      .iter()
      .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect::<String>())
      .collect();
    assert!(text.iter().any(|l| l.contains("★ 0.0")));
    assert!(text.iter().any(|l| l.starts_with("Director") && l.ends_with('-')));
    assert!(text.iter().any(|l| l.contains("Not in favorites")));
  }
}

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, HomeFocus, Route, Screen};
use crate::movie::{Movie, MovieId};
use crate::query::SearchParams;
use crate::results::ResultsFocus;
use crate::search::EMPTY_QUERY_MESSAGE;

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

/// Single-line text field with a char-indexed cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput {
  pub text: String,
  pub cursor: usize,
  /// Horizontal scroll offset in display columns, maintained by the renderer.
  pub scroll: usize,
}

impl TextInput {
  pub fn new(text: &str) -> Self {
    Self { text: text.to_string(), cursor: text.chars().count(), scroll: 0 }
  }

  pub fn set(&mut self, text: &str) {
    *self = Self::new(text);
  }

  pub fn clear(&mut self) {
    self.set("");
  }

  pub fn is_blank(&self) -> bool {
    self.text.trim().is_empty()
  }

  pub fn insert(&mut self, c: char) {
    let byte_idx = char_to_byte_index(&self.text, self.cursor);
    self.text.insert(byte_idx, c);
    self.cursor += 1;
  }

  /// Apply an editing key. Returns true when the text changed.
  pub fn handle_key(&mut self, key: KeyEvent) -> bool {
    let len = self.text.chars().count();
    match key.code {
      KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.insert(c);
        true
      }
      KeyCode::Backspace if self.cursor > 0 => {
        self.cursor -= 1;
        let byte_idx = char_to_byte_index(&self.text, self.cursor);
        self.text.remove(byte_idx);
        true
      }
      KeyCode::Delete if self.cursor < len => {
        let byte_idx = char_to_byte_index(&self.text, self.cursor);
        self.text.remove(byte_idx);
        true
      }
      KeyCode::Left => {
        self.cursor = self.cursor.saturating_sub(1);
        false
      }
      KeyCode::Right => {
        self.cursor = (self.cursor + 1).min(len);
        false
      }
      KeyCode::Home => {
        self.cursor = 0;
        false
      }
      KeyCode::End => {
        self.cursor = len;
        false
      }
      _ => false,
    }
  }
}

/// What a screen handler asks the app to do once its borrow of the screen ends.
#[derive(Debug, Clone, PartialEq)]
enum Action {
  None,
  Error(String),
  Navigate(Route),
  Back,
  ToggleFavorite(Movie),
  RemoveFavorite(MovieId),
  UndoRemove,
  ToggleGenres,
}

// --- Event Handling ---

pub fn handle_key_event(app: &mut App, key: KeyEvent) {
  if key.modifiers.contains(KeyModifiers::CONTROL) {
    match key.code {
      KeyCode::Char('c') => {
        app.should_quit = true;
        return;
      }
      KeyCode::Char('t') => {
        app.next_theme();
        return;
      }
      KeyCode::Char('f') => {
        app.navigate(Route::Favorites);
        return;
      }
      KeyCode::Char('r') => {
        if matches!(app.screen, Screen::Home(_) | Screen::Results(_)) {
          app.toggle_dictation();
        }
        return;
      }
      _ => {}
    }
  }

  let action = match app.screen {
    Screen::Home(_) => handle_home_key(app, key),
    Screen::Results(_) => handle_results_key(app, key),
    Screen::Detail(_) => handle_detail_key(app, key),
    Screen::Favorites(_) => handle_favorites_key(app, key),
  };
  apply(app, action);
}

fn apply(app: &mut App, action: Action) {
  match action {
    Action::None => {}
    Action::Error(msg) => app.set_error(msg),
    Action::Navigate(route) => app.navigate(route),
    Action::Back => app.back(),
    Action::ToggleFavorite(movie) => app.toggle_favorite(&movie),
    Action::RemoveFavorite(id) => app.remove_favorite(&id),
    Action::UndoRemove => app.undo_remove(),
    Action::ToggleGenres => {
      if let Screen::Home(home) = &mut app.screen {
        home.toggle_expanded();
      }
    }
  }
}

fn handle_home_key(app: &mut App, key: KeyEvent) -> Action {
  app.clear_error();
  let Screen::Home(home) = &mut app.screen else { return Action::None };
  match home.focus {
    HomeFocus::Input => match key.code {
      KeyCode::Enter => {
        if home.input.is_blank() {
          Action::Error(EMPTY_QUERY_MESSAGE.to_string())
        } else {
          Action::Navigate(Route::Results(SearchParams::query(&home.input.text)))
        }
      }
      KeyCode::Tab | KeyCode::Down => {
        if !home.genres.is_empty() {
          home.focus = HomeFocus::Genres;
        }
        Action::None
      }
      KeyCode::Esc if !home.input.text.is_empty() => {
        home.input.clear();
        Action::None
      }
      KeyCode::Esc => Action::Back,
      _ => {
        home.input.handle_key(key);
        Action::None
      }
    },
    HomeFocus::Genres => match key.code {
      KeyCode::Left | KeyCode::Char('h') => {
        home.genre_cursor = home.genre_cursor.saturating_sub(1);
        Action::None
      }
      KeyCode::Right | KeyCode::Char('l') => {
        home.genre_cursor = (home.genre_cursor + 1).min(home.chip_count().saturating_sub(1));
        Action::None
      }
      KeyCode::Char('m') => Action::ToggleGenres,
      KeyCode::Enter => match home.chip_at(home.genre_cursor) {
        Some(genre) => Action::Navigate(Route::Results(SearchParams::genre(genre))),
        None => Action::ToggleGenres,
      },
      KeyCode::Tab | KeyCode::Up | KeyCode::Esc => {
        home.focus = HomeFocus::Input;
        Action::None
      }
      _ => Action::None,
    },
  }
}

fn handle_results_key(app: &mut App, key: KeyEvent) -> Action {
  app.clear_error();
  let Screen::Results(view) = &mut app.screen else { return Action::None };
  match view.focus {
    ResultsFocus::Input => match key.code {
      KeyCode::Enter => view.submit().map_or(Action::None, Action::Error),
      KeyCode::Tab | KeyCode::Down => {
        view.focus = ResultsFocus::List;
        if view.list_state.selected().is_none() && !view.state().results.is_empty() {
          view.list_state.select(Some(0));
        }
        Action::None
      }
      KeyCode::Esc => Action::Back,
      _ => {
        if view.input.handle_key(key) {
          view.query_edited();
        }
        Action::None
      }
    },
    ResultsFocus::List => match key.code {
      KeyCode::Down | KeyCode::Char('j') => {
        view.select_next();
        Action::None
      }
      KeyCode::Up | KeyCode::Char('k') => {
        if view.list_state.selected().unwrap_or(0) == 0 {
          view.focus = ResultsFocus::Input;
        } else {
          view.select_previous();
        }
        Action::None
      }
      KeyCode::Enter => match view.selected_movie().map(|m| m.id.clone()) {
        Some(Some(id)) => Action::Navigate(Route::Detail(id)),
        Some(None) => Action::Error("This movie has no details.".to_string()),
        None => Action::None,
      },
      KeyCode::Char('f') => view.selected_movie().cloned().map_or(Action::None, Action::ToggleFavorite),
      KeyCode::Char('g') => match view.next_genre_of_selected() {
        Some(genre) => {
          view.select_genre(&genre);
          Action::None
        }
        None if view.selected_movie().is_some() => Action::Error("No other genre to browse.".to_string()),
        None => Action::None,
      },
      KeyCode::Char('/') | KeyCode::Tab => {
        view.focus = ResultsFocus::Input;
        Action::None
      }
      KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('q') => Action::Back,
      _ => Action::None,
    },
  }
}

fn handle_detail_key(app: &mut App, key: KeyEvent) -> Action {
  let Screen::Detail(view) = &mut app.screen else { return Action::None };
  match key.code {
    KeyCode::Char('f') => view.detail.as_ref().map_or(Action::None, |d| Action::ToggleFavorite(d.movie.clone())),
    KeyCode::Down | KeyCode::Char('j') => {
      view.scroll = view.scroll.saturating_add(1);
      Action::None
    }
    KeyCode::Up | KeyCode::Char('k') => {
      view.scroll = view.scroll.saturating_sub(1);
      Action::None
    }
    KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('q') => Action::Back,
    _ => Action::None,
  }
}

fn handle_favorites_key(app: &mut App, key: KeyEvent) -> Action {
  let entries = app.favorites.snapshot();
  let Screen::Favorites(view) = &mut app.screen else { return Action::None };
  let len = entries.len();
  let selected = view.list_state.selected().filter(|i| *i < len);
  match key.code {
    KeyCode::Down | KeyCode::Char('j') if len > 0 => {
      view.list_state.select(Some(selected.map_or(0, |i| (i + 1).min(len - 1))));
      Action::None
    }
    KeyCode::Up | KeyCode::Char('k') if len > 0 => {
      view.list_state.select(Some(selected.map_or(0, |i| i.saturating_sub(1))));
      Action::None
    }
    KeyCode::Enter => {
      selected.map_or(Action::None, |i| Action::Navigate(Route::Detail(entries.entries()[i].id.clone())))
    }
    KeyCode::Char('d') | KeyCode::Char('f') | KeyCode::Delete => {
      selected.map_or(Action::None, |i| Action::RemoveFavorite(entries.entries()[i].id.clone()))
    }
    KeyCode::Char('u') => Action::UndoRemove,
    KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('q') => Action::Back,
    _ => Action::None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ratatui::crossterm::event::KeyEventKind;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  #[test]
  fn char_index_handles_multibyte() {
    assert_eq!(char_to_byte_index("amélie", 3), 4);
    assert_eq!(char_to_byte_index("abc", 10), 3);
  }

  #[test]
  fn editing_keys() {
    let mut input = TextInput::new("heat");
    assert_eq!(input.cursor, 4);
    assert!(input.handle_key(key(KeyCode::Backspace)));
    assert_eq!(input.text, "hea");
    input.handle_key(key(KeyCode::Home));
    assert!(input.handle_key(key(KeyCode::Char('w'))));
    assert_eq!(input.text, "whea");
    assert!(input.handle_key(key(KeyCode::Delete)));
    assert_eq!(input.text, "wea");
    assert!(!input.handle_key(key(KeyCode::End)));
    assert_eq!(input.cursor, 3);
    assert!(!input.handle_key(key(KeyCode::Right)));
    assert_eq!(input.cursor, 3);
  }

  #[test]
  fn backspace_at_start_is_noop() {
    let mut input = TextInput::new("");
    assert!(!input.handle_key(key(KeyCode::Backspace)));
    assert!(!input.handle_key(key(KeyCode::Delete)));
  }

  #[test]
  fn control_chars_do_not_insert() {
    let mut input = TextInput::default();
    let mut k = KeyEvent::new(KeyCode::Char('x'), KeyModifiers::CONTROL);
    k.kind = KeyEventKind::Press;
    assert!(!input.handle_key(k));
    assert!(input.text.is_empty());
  }

  #[test]
  fn blank_detection() {
    assert!(TextInput::new("   ").is_blank());
    assert!(!TextInput::new(" a ").is_blank());
  }
}

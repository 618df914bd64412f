use std::fmt::Display;

use crate::movie::GenreRef;

/// Comma-separated genre names, skipping empty ones.
pub fn join_genres(genres: &[GenreRef]) -> String {
  genres.iter().map(GenreRef::name).filter(|n| !n.is_empty()).collect::<Vec<_>>().join(", ")
}

/// Render an optional value, or "-" when it is missing or empty.
pub fn safe_text<T: Display>(value: Option<&T>) -> String {
  match value.map(|v| v.to_string()) {
    Some(s) if !s.is_empty() => s,
    _ => "-".to_string(),
  }
}

/// IMDB score with one decimal; a zero score renders as "0.0".
pub fn format_score(score: f64) -> String {
  format!("{:.1}", score)
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
pub fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

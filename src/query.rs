//! Query-string handling for the results screen.
//!
//! The results screen is addressed like a URL (`?q=batman` or
//! `?genre=Action`). `q` and `genre` are mutually exclusive; neither means
//! "browse all".

use reqwest::Url;

/// Base used only to borrow `Url`'s form-encoding for bare query strings.
const LOCATION_BASE: &str = "iamdb://app/results";

fn parse_pairs(search: &str) -> Vec<(String, String)> {
  let Ok(mut url) = Url::parse(LOCATION_BASE) else { return Vec::new() };
  let raw = search.trim().trim_start_matches('?');
  if raw.is_empty() {
    return Vec::new();
  }
  url.set_query(Some(raw));
  url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect()
}

fn encode_pairs(pairs: &[(String, String)]) -> String {
  if pairs.is_empty() {
    return String::new();
  }
  let Ok(mut url) = Url::parse(LOCATION_BASE) else { return String::new() };
  url.query_pairs_mut().extend_pairs(pairs.iter());
  url.query().map(|q| format!("?{}", q)).unwrap_or_default()
}

/// Canonical `{ q, genre }` pair derived from a search string. Both trimmed,
/// missing parameters are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
  pub q: String,
  pub genre: String,
}

impl SearchParams {
  pub fn from_search(search: &str) -> Self {
    Location::from_search(search).params()
  }

  pub fn query(q: &str) -> Self {
    Self { q: q.trim().to_string(), genre: String::new() }
  }

  pub fn genre(genre: &str) -> Self {
    Self { q: String::new(), genre: genre.trim().to_string() }
  }

  /// Heading shown above the result list: the query, else the genre.
  pub fn subject(&self) -> Option<&str> {
    if !self.q.is_empty() {
      Some(&self.q)
    } else if !self.genre.is_empty() {
      Some(&self.genre)
    } else {
      None
    }
  }
}

/// The results screen's address bar. Unknown parameters are preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
  pairs: Vec<(String, String)>,
}

impl Location {
  pub fn from_search(search: &str) -> Self {
    Self { pairs: parse_pairs(search) }
  }

  pub fn from_params(params: &SearchParams) -> Self {
    let loc = Self::default();
    if !params.genre.is_empty() { loc.with_genre(&params.genre) } else { loc.with_query(&params.q) }
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
  }

  pub fn params(&self) -> SearchParams {
    let get = |key: &str| self.get(key).map(str::trim).unwrap_or_default().to_string();
    SearchParams { q: get("q"), genre: get("genre") }
  }

  fn set(&mut self, key: &str, value: &str) {
    if let Some(slot) = self.pairs.iter_mut().find(|(k, _)| k == key) {
      slot.1 = value.to_string();
    } else {
      self.pairs.push((key.to_string(), value.to_string()));
    }
  }

  fn delete(&mut self, key: &str) {
    self.pairs.retain(|(k, _)| k != key);
  }

  /// Reflect typed text: a non-empty query sets `q` and drops `genre`;
  /// an empty one only drops `q`.
  pub fn with_query(mut self, raw: &str) -> Self {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
      self.delete("q");
    } else {
      self.set("q", trimmed);
      self.delete("genre");
    }
    self
  }

  /// Select a genre: sets `genre` and drops `q`.
  pub fn with_genre(mut self, genre: &str) -> Self {
    let trimmed = genre.trim();
    self.delete("q");
    if trimmed.is_empty() {
      self.delete("genre");
    } else {
      self.set("genre", trimmed);
    }
    self
  }

  /// `""` when there are no parameters, otherwise `?k=v&…`.
  pub fn to_search_string(&self) -> String {
    encode_pairs(&self.pairs)
  }
}

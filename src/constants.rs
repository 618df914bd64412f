//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so it's always available,
//! no runtime file I/O. Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // Catalog API
  pub api_base_url: String,
  pub request_timeout_secs: u64,

  // Search
  pub debounce_ms: u64,
  /// How many rows below the viewport the sentinel may sit and still count as visible.
  pub sentinel_margin_rows: usize,
  pub collapsed_genre_count: usize,

  // Favorites
  pub favorites_key: String,

  // Dictation
  pub dictation_secs: u32,
  pub min_chunk_bytes: u64,

  // Status line
  pub error_dismiss_secs: u64,
}

impl Constants {
  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.debounce_ms)
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Tunables ship inside the binary; `embedded_constants_parse` guards the file.
  ron::from_str(include_str!("../constants.ron")).expect("embedded tunables failed to parse")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedded_constants_parse() {
    let c = constants();
    assert_eq!(c.debounce_ms, 450);
    assert_eq!(c.favorites_key, "iamdb:favorites");
    assert!(c.api_base_url.starts_with("https://"));
    assert!(c.collapsed_genre_count > 0);
  }
}

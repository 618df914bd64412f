use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// User preferences persisted to `prefs.toml` in the platform config dir.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Config {
  pub theme_name: Option<String>,
  /// Overrides the built-in catalog endpoint. `--api-url` wins over this.
  pub api_base_url: Option<String>,
}

pub fn project_dirs() -> Option<ProjectDirs> {
  ProjectDirs::from("", "", "iamdb")
}

fn prefs_path() -> Option<PathBuf> {
  project_dirs().map(|dirs| dirs.config_dir().join("prefs.toml"))
}

impl Config {
  pub fn load() -> Self {
    prefs_path().map(|path| Self::load_from(&path)).unwrap_or_default()
  }

  pub fn load_from(path: &Path) -> Self {
    let Ok(content) = std::fs::read_to_string(path) else { return Self::default() };
    match toml::from_str(&content) {
      Ok(config) => config,
      Err(e) => {
        warn!(path = %path.display(), err = %e, "config: ignoring unreadable prefs");
        Self::default()
      }
    }
  }

  pub fn save(&self) {
    if let Some(path) = prefs_path() {
      self.save_to(&path);
    }
  }

  pub fn save_to(&self, path: &Path) {
    if let Some(dir) = path.parent()
      && std::fs::create_dir_all(dir).is_ok()
      && let Ok(content) = toml::to_string(self)
      && let Err(e) = std::fs::write(path, content)
    {
      warn!(path = %path.display(), err = %e, "config: failed to save prefs");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("prefs.toml");
    let config = Config { theme_name: Some("noir".into()), api_base_url: Some("http://localhost:8080/api".into()) };
    config.save_to(&path);
    assert_eq!(Config::load_from(&path), config);
  }

  #[test]
  fn missing_or_broken_file_is_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.toml");
    assert_eq!(Config::load_from(&path), Config::default());
    std::fs::write(&path, "theme_name = [").unwrap();
    assert_eq!(Config::load_from(&path), Config::default());
  }
}

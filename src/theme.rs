use ratatui::style::Color;

/// Palette for one colour scheme. Cycled with Ctrl+T and persisted by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
  pub name: &'static str,
  pub bg: Color,
  pub fg: Color,
  pub accent: Color,
  pub muted: Color,
  pub border: Color,
  pub highlight_fg: Color,
  pub highlight_bg: Color,
  pub stripe_bg: Color,
  pub status: Color,
  pub error: Color,
  pub key_fg: Color,
  pub key_bg: Color,
  /// Favourite marker and rating stars.
  pub favorite: Color,
}

pub const THEMES: [Theme; 3] = [
  Theme {
    name: "marquee",
    bg: Color::Rgb(24, 20, 28),
    fg: Color::Rgb(232, 226, 236),
    accent: Color::Rgb(245, 197, 24),
    muted: Color::Rgb(134, 124, 146),
    border: Color::Rgb(70, 62, 82),
    highlight_fg: Color::Rgb(24, 20, 28),
    highlight_bg: Color::Rgb(245, 197, 24),
    stripe_bg: Color::Rgb(32, 27, 38),
    status: Color::Rgb(132, 204, 190),
    error: Color::Rgb(240, 110, 110),
    key_fg: Color::Rgb(24, 20, 28),
    key_bg: Color::Rgb(134, 124, 146),
    favorite: Color::Rgb(239, 83, 120),
  },
  Theme {
    name: "matinee",
    bg: Color::Rgb(250, 246, 238),
    fg: Color::Rgb(52, 46, 40),
    accent: Color::Rgb(176, 64, 48),
    muted: Color::Rgb(140, 128, 114),
    border: Color::Rgb(214, 204, 188),
    highlight_fg: Color::Rgb(250, 246, 238),
    highlight_bg: Color::Rgb(176, 64, 48),
    stripe_bg: Color::Rgb(242, 236, 224),
    status: Color::Rgb(60, 120, 110),
    error: Color::Rgb(190, 40, 40),
    key_fg: Color::Rgb(250, 246, 238),
    key_bg: Color::Rgb(140, 128, 114),
    favorite: Color::Rgb(200, 40, 90),
  },
  Theme {
    name: "noir",
    bg: Color::Reset,
    fg: Color::Gray,
    accent: Color::White,
    muted: Color::DarkGray,
    border: Color::DarkGray,
    highlight_fg: Color::Black,
    highlight_bg: Color::Gray,
    stripe_bg: Color::Reset,
    status: Color::Gray,
    error: Color::Red,
    key_fg: Color::Black,
    key_bg: Color::DarkGray,
    favorite: Color::Red,
  },
];

/// Index of the theme called `name`, falling back to the first.
pub fn theme_index(name: Option<&str>) -> usize {
  name.and_then(|n| THEMES.iter().position(|t| t.name.eq_ignore_ascii_case(n))).unwrap_or(0)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lookup_by_name() {
    assert_eq!(theme_index(Some("noir")), 2);
    assert_eq!(theme_index(Some("MATINEE")), 1);
    assert_eq!(theme_index(Some("unknown")), 0);
    assert_eq!(theme_index(None), 0);
  }

  #[test]
  fn names_unique() {
    for (i, a) in THEMES.iter().enumerate() {
      assert!(THEMES.iter().skip(i + 1).all(|b| b.name != a.name));
    }
  }
}

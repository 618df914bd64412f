//! Infinite-scroll trigger for row-based lists.
//!
//! The list reports where its sentinel row (the row just past the last item)
//! sits relative to the visible window after each draw. The trigger fires
//! once each time the sentinel comes within `margin` rows of the viewport.

use tracing::trace;

/// Visible window of a list, in rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
  /// Index of the first visible row.
  pub offset: usize,
  pub height: usize,
}

impl Viewport {
  /// Whether `row` is inside the viewport extended by `margin` rows on both sides.
  pub fn near(&self, row: usize, margin: usize) -> bool {
    let start = self.offset.saturating_sub(margin);
    let end = self.offset.saturating_add(self.height).saturating_add(margin);
    row >= start && row < end
  }
}

#[derive(Debug)]
struct Observation {
  in_range: bool,
}

/// At most one observation is live. A new one is established whenever the
/// enabled flag or the handler key changes, releasing the previous one first.
#[derive(Debug)]
pub struct InfiniteScroll<K> {
  margin: usize,
  enabled: bool,
  key: Option<K>,
  observation: Option<Observation>,
  established: u64,
}

impl<K: PartialEq + Copy + std::fmt::Debug> InfiniteScroll<K> {
  pub fn new(margin: usize) -> Self {
    Self { margin, enabled: false, key: None, observation: None, established: 0 }
  }

  /// Update the trigger's inputs. A disabled trigger holds no observation.
  pub fn configure(&mut self, enabled: bool, key: K) {
    if self.enabled == enabled && self.key == Some(key) {
      return;
    }
    self.release();
    self.enabled = enabled;
    self.key = Some(key);
    if enabled {
      self.observation = Some(Observation { in_range: false });
      self.established += 1;
      trace!(?key, established = self.established, "scroll: observing");
    }
  }

  /// Report the sentinel position; returns true when more items should load.
  /// A fresh observation fires at once if the sentinel is already in range.
  pub fn observe(&mut self, sentinel_row: usize, viewport: Viewport) -> bool {
    let Some(observation) = self.observation.as_mut() else { return false };
    let in_range = viewport.height > 0 && viewport.near(sentinel_row, self.margin);
    let fire = in_range && !observation.in_range;
    observation.in_range = in_range;
    fire
  }

  /// Stop observing until the next `configure` with different inputs.
  pub fn release(&mut self) {
    self.observation = None;
  }

  /// Drop the observation and forget the inputs, as on unmount.
  pub fn reset(&mut self) {
    self.release();
    self.enabled = false;
    self.key = None;
  }

  #[cfg(test)]
  pub fn is_observing(&self) -> bool {
    self.observation.is_some()
  }

  /// Number of observations established over the trigger's lifetime.
  #[cfg(test)]
  pub fn established(&self) -> u64 {
    self.established
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn vp(offset: usize, height: usize) -> Viewport {
    Viewport { offset, height }
  }

  #[test]
  fn margin_extends_viewport() {
    let v = vp(10, 5);
    assert!(v.near(10, 0));
    assert!(v.near(14, 0));
    assert!(!v.near(15, 0));
    assert!(v.near(20, 6));
    assert!(!v.near(21, 6));
    assert!(v.near(4, 6));
    assert!(!v.near(3, 6));
  }

  #[test]
  fn fires_once_per_entry() {
    let mut s = InfiniteScroll::new(2);
    s.configure(true, 1u32);
    assert!(!s.observe(30, vp(0, 10)));
    assert!(s.observe(30, vp(19, 10)));
    assert!(!s.observe(30, vp(20, 10)));
    assert!(!s.observe(30, vp(0, 10)));
    assert!(s.observe(30, vp(25, 10)));
  }

  #[test]
  fn disabled_never_fires() {
    let mut s = InfiniteScroll::new(2);
    s.configure(false, 1u32);
    assert!(!s.is_observing());
    assert!(!s.observe(3, vp(0, 10)));
  }

  #[test]
  fn new_key_reobserves_and_fires_if_already_visible() {
    let mut s = InfiniteScroll::new(2);
    s.configure(true, 1u32);
    assert!(s.observe(3, vp(0, 10)));
    assert!(!s.observe(3, vp(0, 10)));
    s.configure(true, 2u32);
    assert_eq!(s.established(), 2);
    assert!(s.observe(3, vp(0, 10)));
  }

  #[test]
  fn same_inputs_keep_observation() {
    let mut s = InfiniteScroll::new(2);
    s.configure(true, 7u32);
    s.observe(3, vp(0, 10));
    s.configure(true, 7u32);
    assert_eq!(s.established(), 1);
    assert!(!s.observe(3, vp(0, 10)));
  }

  #[test]
  fn disable_then_enable_is_a_fresh_observation() {
    let mut s = InfiniteScroll::new(0);
    s.configure(true, 1u32);
    assert!(s.observe(3, vp(0, 10)));
    s.configure(false, 1u32);
    assert!(!s.is_observing());
    s.configure(true, 1u32);
    assert!(s.observe(3, vp(0, 10)));
  }

  #[test]
  fn reset_releases() {
    let mut s = InfiniteScroll::new(0);
    s.configure(true, 1u32);
    s.reset();
    assert!(!s.is_observing());
    assert!(!s.observe(0, vp(0, 10)));
  }

  #[test]
  fn zero_height_viewport_is_never_in_range() {
    let mut s = InfiniteScroll::new(6);
    s.configure(true, 1u32);
    assert!(!s.observe(0, vp(0, 0)));
  }
}

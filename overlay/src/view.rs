//! The node's bounded partial view of the overlay membership.

use {
  crate::wire::Descriptor,
  rand::{seq::IteratorRandom, Rng},
};

/// An ordered collection of at most `capacity` peer descriptors.
///
/// For all reachable states: no two entries share an id, and the local
/// node's own id never appears. Displacement of entries is the shuffle
/// engine's responsibility, so a full view rejects new ids.
#[derive(Debug, Clone)]
pub struct View {
  capacity: usize,
  self_id: String,
  entries: Vec<Descriptor>,
}

impl View {
  pub fn new(capacity: usize, self_id: impl Into<String>) -> Self {
    Self {
      capacity,
      self_id: self_id.into(),
      entries: Vec::with_capacity(capacity),
    }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn contains(&self, id: &str) -> bool {
    self.entries.iter().any(|d| d.id == id)
  }

  /// Inserts a descriptor received from the network.
  ///
  /// An entry already present under the same id only has its timestamp
  /// overwritten, and the local node itself is never admitted. Returns
  /// whether a structural append happened.
  pub fn insert(&mut self, descriptor: Descriptor) -> bool {
    if descriptor.id.is_empty() || descriptor.id == self.self_id {
      return false;
    }
    if let Some(existing) = self.entry_mut(&descriptor.id) {
      existing.timestamp = descriptor.timestamp;
      return false;
    }
    if self.entries.len() >= self.capacity {
      return false;
    }
    self.entries.push(descriptor);
    true
  }

  /// Like [`View::insert`], but also reports success on the
  /// already-present path. Used to restore an exchange partner after a
  /// completed shuffle round.
  pub fn refresh(&mut self, descriptor: Descriptor) -> bool {
    let present = self.contains(&descriptor.id);
    self.insert(descriptor) || present
  }

  /// Removes and returns the entry at `index`, preserving the relative
  /// order of the remaining entries.
  pub fn remove(&mut self, index: usize) -> Descriptor {
    self.entries.remove(index)
  }

  pub fn get(&self, index: usize) -> &Descriptor {
    &self.entries[index]
  }

  /// Index of the entry with the greatest age, ties resolving to the
  /// lowest index.
  pub fn oldest(&self) -> Option<usize> {
    self
      .entries
      .iter()
      .enumerate()
      .min_by_key(|(index, d)| (d.timestamp, *index))
      .map(|(index, _)| index)
  }

  /// Removes up to `k` uniformly random entries and returns them in
  /// selection order. Every subset of size `min(k, len)` is equally
  /// likely.
  pub fn sample<R: Rng>(&mut self, k: usize, rng: &mut R) -> Vec<Descriptor> {
    let k = k.min(self.entries.len());
    let mut selected = Vec::with_capacity(k);
    for _ in 0..k {
      let index = rng.gen_range(0..self.entries.len());
      selected.push(self.entries.remove(index));
    }
    selected
  }

  /// Picks up to `k` uniformly random entries without removing them.
  pub fn choose<R: Rng>(&self, k: usize, rng: &mut R) -> Vec<Descriptor> {
    self
      .entries
      .iter()
      .choose_multiple(rng, k.min(self.entries.len()))
      .into_iter()
      .cloned()
      .collect()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
    self.entries.iter()
  }

  fn entry_mut(&mut self, id: &str) -> Option<&mut Descriptor> {
    self.entries.iter_mut().find(|d| d.id == id)
  }
}

#[cfg(test)]
mod tests {
  use {
    super::View,
    crate::wire::Descriptor,
    rand::{rngs::StdRng, SeedableRng},
    std::collections::HashSet,
  };

  fn descriptor(id: &str, timestamp: u64) -> Descriptor {
    Descriptor {
      id: id.into(),
      addr: "127.0.0.1".parse().unwrap(),
      port: 9000,
      timestamp,
    }
  }

  #[test]
  fn insert_respects_capacity_and_identity() {
    let mut view = View::new(2, "self");

    assert!(view.insert(descriptor("a", 1)));
    assert!(view.insert(descriptor("b", 2)));

    // full view rejects new ids
    assert!(!view.insert(descriptor("c", 3)));
    assert_eq!(view.len(), 2);
    assert!(!view.contains("c"));

    // the local node never appears
    assert!(!view.insert(descriptor("self", 4)));
    assert!(!view.contains("self"));
  }

  #[test]
  fn duplicate_id_adopts_received_timestamp() {
    let mut view = View::new(3, "self");
    assert!(view.insert(descriptor("a", 1)));
    assert!(!view.insert(descriptor("a", 9)));

    assert_eq!(view.len(), 1);
    assert_eq!(view.get(0).timestamp, 9);
  }

  #[test]
  fn refresh_updates_or_appends() {
    let mut view = View::new(2, "self");
    assert!(view.refresh(descriptor("a", 1)));
    assert!(view.refresh(descriptor("a", 5)));
    assert_eq!(view.get(0).timestamp, 5);

    assert!(view.refresh(descriptor("b", 2)));
    assert!(!view.refresh(descriptor("c", 3)));
    assert_eq!(view.len(), 2);
  }

  #[test]
  fn oldest_prefers_lowest_index_on_ties() {
    let mut view = View::new(4, "self");
    view.insert(descriptor("a", 7));
    view.insert(descriptor("b", 3));
    view.insert(descriptor("c", 3));
    view.insert(descriptor("d", 9));

    assert_eq!(view.oldest(), Some(1));

    view.remove(1);
    assert_eq!(view.oldest(), Some(1)); // now "c"
  }

  #[test]
  fn oldest_of_empty_view_is_none() {
    let view = View::new(3, "self");
    assert_eq!(view.oldest(), None);
  }

  #[test]
  fn sampling_removes_what_it_returns() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut view = View::new(5, "self");
    for (i, id) in ["a", "b", "c", "d", "e"].iter().enumerate() {
      view.insert(descriptor(id, i as u64));
    }

    let selected = view.sample(3, &mut rng);
    assert_eq!(selected.len(), 3);
    assert_eq!(view.len(), 2);
    for d in &selected {
      assert!(!view.contains(&d.id));
    }

    // distinct picks
    let ids: HashSet<_> = selected.iter().map(|d| d.id.clone()).collect();
    assert_eq!(ids.len(), 3);
  }

  #[test]
  fn oversized_sample_is_clamped() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut view = View::new(3, "self");
    view.insert(descriptor("a", 1));

    let selected = view.sample(10, &mut rng);
    assert_eq!(selected.len(), 1);
    assert!(view.is_empty());

    assert!(view.sample(2, &mut rng).is_empty());
  }

  #[test]
  fn choose_leaves_the_view_intact() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut view = View::new(3, "self");
    view.insert(descriptor("a", 1));
    view.insert(descriptor("b", 2));
    view.insert(descriptor("c", 3));

    let chosen = view.choose(2, &mut rng);
    assert_eq!(chosen.len(), 2);
    assert_eq!(view.len(), 3);
  }
}

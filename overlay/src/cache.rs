//! Bounded record of recently seen application payloads.

use {
  bytes::Bytes,
  std::collections::{HashSet, VecDeque},
};

/// An insertion-ordered set of payloads with FIFO eviction.
///
/// Payloads are compared as exact byte strings, including any sender-id
/// prefix. Because originated messages are recorded verbatim before
/// transmission, a node never accepts an echo of its own payload back
/// from the network.
#[derive(Debug)]
pub struct MessageCache {
  capacity: usize,
  order: VecDeque<Bytes>,
  seen: HashSet<Bytes>,
}

impl MessageCache {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity,
      order: VecDeque::with_capacity(capacity),
      seen: HashSet::with_capacity(capacity),
    }
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  /// Records a payload and reports whether it was already known. First
  /// sight evicts the oldest record once the cache is full.
  pub fn insert(&mut self, payload: &Bytes) -> bool {
    if self.seen.contains(payload) {
      return true;
    }
    if self.capacity == 0 {
      return false;
    }
    if self.order.len() == self.capacity {
      if let Some(evicted) = self.order.pop_front() {
        self.seen.remove(&evicted);
      }
    }
    self.order.push_back(payload.clone());
    self.seen.insert(payload.clone());
    false
  }
}

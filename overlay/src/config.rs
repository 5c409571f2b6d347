use std::time::Duration;

/// Protocol constants for one overlay node.
#[derive(Debug, Clone)]
pub struct Config {
  /// Maximum number of descriptors held in the local view.
  pub view_length: usize,

  /// Number of descriptors exchanged per shuffle round, including the
  /// initiator's own fresh descriptor.
  pub swap_length: usize,

  /// Number of peers an application payload is forwarded to per hop.
  pub gossip_fanout: usize,

  /// How often a shuffle cycle is initiated.
  pub cycle_interval: Duration,

  /// Number of recently seen payloads kept for duplicate suppression.
  pub cache_size: usize,

  /// Largest datagram accepted or produced. Oversize receptions are
  /// truncated by the transport and fail descriptor parsing.
  pub max_datagram_size: usize,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      view_length: 3,
      swap_length: 2,
      gossip_fanout: 2,
      cycle_interval: Duration::from_secs(10),
      cache_size: 50,
      max_datagram_size: 1024,
    }
  }
}

//! The view-maintenance and dissemination state machine of a single
//! overlay peer.
//!
//! The node owns the view, the duplicate-suppression cache and the
//! shuffle bookkeeping. Event handlers consume a clock reading and
//! return the datagrams to transmit; the runloop performs the socket
//! I/O, so the protocol is driven the same way by the event loop and by
//! tests.

use {
  crate::{
    cache::MessageCache,
    config::Config,
    roster::{PeerIdentity, Roster},
    view::View,
    wire::{self, Datagram, Descriptor},
  },
  bytes::Bytes,
  metrics::{gauge, increment_counter},
  rand::{rngs::StdRng, seq::SliceRandom, SeedableRng},
  std::{fmt::Write as _, net::SocketAddr},
  thiserror::Error,
  tracing::{debug, info},
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("bootstrap roster needs at least two entries")]
  InsufficientRoster,

  #[error("malformed roster record near {0:?}")]
  MalformedRoster(String),

  #[error("peer id {0:?} is too long or contains ':'")]
  InvalidPeerId(String),

  #[error("no roster entry listens on port {0}")]
  UnknownSelf(u16),
}

/// A datagram scheduled for transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
  pub to: SocketAddr,
  pub payload: Bytes,
}

/// One peer of the overlay.
pub struct Node {
  config: Config,
  identity: PeerIdentity,
  view: View,
  cache: MessageCache,

  /// Partner of the most recently initiated shuffle. Its reply restores
  /// it into the view; a lost reply displaces it.
  last_partner: Option<Descriptor>,

  /// Second at which the last cycle ran. Zeroed to force a cycle on the
  /// next tick.
  last_cycle: u64,

  rng: StdRng,
}

// Public API
impl Node {
  /// Creates a node from the bootstrap roster, seeding the view with a
  /// uniformly random subset of the other roster entries.
  pub fn bootstrap(
    config: Config,
    roster: Roster,
    port: u16,
    now: u64,
  ) -> Result<Self, Error> {
    Self::bootstrap_with_rng(config, roster, port, now, StdRng::from_entropy())
  }

  /// Same as [`Node::bootstrap`] with a caller-provided generator,
  /// which makes seeding and all later sampling reproducible.
  pub fn bootstrap_with_rng(
    config: Config,
    roster: Roster,
    port: u16,
    now: u64,
    mut rng: StdRng,
  ) -> Result<Self, Error> {
    let (identity, mut others) = roster.split_self(port)?;

    others.shuffle(&mut rng);
    let mut view = View::new(config.view_length, identity.id.clone());
    for peer in others.into_iter().take(config.view_length) {
      view.insert(Descriptor {
        id: peer.id,
        addr: peer.addr,
        port: peer.port,
        timestamp: now,
      });
    }

    info!(id = %identity.id, peers = view.len(), "node initialized");

    Ok(Self {
      cache: MessageCache::new(config.cache_size),
      last_partner: None,
      last_cycle: now,
      identity,
      view,
      config,
      rng,
    })
  }

  pub fn identity(&self) -> &PeerIdentity {
    &self.identity
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn view(&self) -> impl Iterator<Item = &Descriptor> {
    self.view.iter()
  }

  /// Advances the cycle clock, initiating a shuffle when the interval
  /// has elapsed since the previous one.
  pub fn handle_tick(&mut self, now: u64) -> Vec<Outbound> {
    if now.saturating_sub(self.last_cycle)
      < self.config.cycle_interval.as_secs()
    {
      return Vec::new();
    }
    self.last_cycle = now;
    self.initiate_shuffle(now)
  }

  /// Makes the next tick run a cycle regardless of the interval.
  pub fn force_cycle(&mut self) {
    self.last_cycle = 0;
  }

  /// Consumes one inbound datagram. `from` is the transport source
  /// address, used to return shuffle replies.
  pub fn handle_datagram(
    &mut self,
    payload: &[u8],
    from: SocketAddr,
    now: u64,
  ) -> Vec<Outbound> {
    let datagram = match wire::decode(payload) {
      Some(datagram) => datagram,
      None => {
        increment_counter!("malformed_datagrams");
        debug!(%from, "dropping malformed datagram");
        return Vec::new();
      }
    };

    let outbound = match datagram {
      Datagram::Push(descriptors) => self.consume_push(descriptors, from, now),
      Datagram::Reply(descriptors) => {
        self.consume_reply(descriptors, now);
        Vec::new()
      }
      Datagram::Gossip(payload) => self.consume_gossip(payload),
    };

    gauge!("view_size", self.view.len() as f64);
    outbound
  }

  /// Emits an application payload authored at this node to a random
  /// subset of the view.
  pub fn originate(&mut self, text: &str) -> Vec<Outbound> {
    let payload = Bytes::from(format!("{}: {}", self.identity.id, text));

    // recorded before transmission so the node drops echoes of its own
    // payload
    self.cache.insert(&payload);
    self.forward(payload)
  }

  /// Renders the current view for the operator console.
  pub fn describe_view(&self, now: u64) -> String {
    let mut out = format!("view ({} nodes):\n", self.view.len());
    for (i, d) in self.view.iter().enumerate() {
      let _ = writeln!(
        out,
        "  {}. {} ({}:{}) [age: {}s]",
        i + 1,
        d.id,
        d.addr,
        d.port,
        d.age(now)
      );
    }
    out
  }
}

// Shuffle protocol
impl Node {
  /// One initiated cycle: take the oldest descriptor as the exchange
  /// partner, remove it, and push a fresh self descriptor together with
  /// a random sample of the view.
  ///
  /// The partner is not reinserted here. Only its reply restores it;
  /// a peer that went away is thereby displaced within one cycle.
  fn initiate_shuffle(&mut self, now: u64) -> Vec<Outbound> {
    if self.view.is_empty() {
      return Vec::new();
    }
    let oldest = self.view.oldest().expect("view is non-empty");

    // avoid exchanging with the same peer on consecutive cycles under
    // low churn: fall back to the next-oldest when there is one
    let repeat = self
      .last_partner
      .as_ref()
      .map(|last| last.id == self.view.get(oldest).id)
      .unwrap_or(false);

    let partner = if repeat && self.view.len() > 1 {
      let skipped = self.view.remove(oldest);
      let next = self.view.oldest().expect("view is non-empty");
      let partner = self.view.remove(next);
      self.view.refresh(skipped); // keeps its original timestamp
      partner
    } else {
      self.view.remove(oldest)
    };

    increment_counter!("shuffles_initiated");
    debug!(partner = %partner.id, "initiating shuffle");

    let mut buffer = Vec::with_capacity(self.config.swap_length);
    buffer.push(self.fresh_descriptor(now));
    buffer.extend(
      self
        .view
        .sample(self.config.swap_length.saturating_sub(1), &mut self.rng),
    );

    let push = wire::encode_push(&buffer);
    let to = partner.sock_addr();
    self.last_partner = Some(partner);

    vec![Outbound { to, payload: push }]
  }

  /// Responder half of the shuffle. The reply buffer is sampled before
  /// the received descriptors are integrated, so nothing just received
  /// is echoed straight back to its sender.
  fn consume_push(
    &mut self,
    received: Vec<Descriptor>,
    from: SocketAddr,
    now: u64,
  ) -> Vec<Outbound> {
    increment_counter!("pushes_received");

    let reply_buffer =
      self.view.sample(self.config.swap_length, &mut self.rng);
    let sender = received.first().cloned();

    let added = self.integrate(received, now);
    debug!(added, %from, "integrated pushed descriptors");

    // the exchange partner is guaranteed a slot after the round
    if let Some(mut sender) = sender {
      sender.timestamp = now;
      self.view.refresh(sender);
    }

    vec![Outbound {
      to: from,
      payload: wire::encode_reply(&reply_buffer),
    }]
  }

  /// Initiator continuation: integrate the returned descriptors, then
  /// restore the exchange partner with a fresh timestamp. If the view
  /// refilled from other exchanges in the meantime the partner is
  /// dropped.
  fn consume_reply(&mut self, received: Vec<Descriptor>, now: u64) {
    increment_counter!("replies_received");

    let added = self.integrate(received, now);
    debug!(added, "integrated replied descriptors");

    if let Some(partner) = self.last_partner.clone() {
      self.view.refresh(Descriptor {
        timestamp: now,
        ..partner
      });
    }
  }

  /// Inserts descriptors received from the network, stamping each with
  /// the local clock so a skewed sender cannot fake freshness. Entries
  /// beyond capacity are dropped silently.
  fn integrate(&mut self, received: Vec<Descriptor>, now: u64) -> usize {
    let mut added = 0;
    for mut descriptor in received {
      descriptor.timestamp = now;
      if self.view.insert(descriptor) {
        added += 1;
      }
    }
    added
  }

  fn fresh_descriptor(&self, now: u64) -> Descriptor {
    Descriptor {
      id: self.identity.id.clone(),
      addr: self.identity.addr,
      port: self.identity.port,
      timestamp: now,
    }
  }
}

// Dissemination
impl Node {
  /// An application payload gossiped to this node: unseen payloads are
  /// surfaced to the operator and forwarded onwards, duplicates die
  /// here. The view is never mutated on this path.
  fn consume_gossip(&mut self, payload: Bytes) -> Vec<Outbound> {
    increment_counter!("gossip_received");

    if self.cache.insert(&payload) {
      increment_counter!("duplicate_messages");
      debug!("duplicate payload, not forwarding");
      return Vec::new();
    }
    gauge!("cached_payloads", self.cache.len() as f64);

    info!(payload = %String::from_utf8_lossy(&payload), "gossip");
    self.forward(payload)
  }

  fn forward(&mut self, payload: Bytes) -> Vec<Outbound> {
    let targets = self.view.choose(self.config.gossip_fanout, &mut self.rng);
    if targets.is_empty() {
      debug!("no peers in view to forward to");
      return Vec::new();
    }
    debug!(count = targets.len(), "forwarding to peers");

    targets
      .into_iter()
      .map(|peer| Outbound {
        to: peer.sock_addr(),
        payload: payload.clone(),
      })
      .collect()
  }
}

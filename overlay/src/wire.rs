//! Defines the text wire protocol connecting peers.
//!
//! Datagrams are ASCII and colon-delimited. Two messages carry protocol
//! semantics, any other datagram is an opaque application payload:
//!
//! ```text
//! CYCLON_PUSH:<n>:<id1>:<addr1>:<port1>:<ts1>: ... :
//! CYCLON_REPLY:<n>:<id1>:<addr1>:<port1>:<ts1>: ... :
//! ```
//!
//! `n` is the descriptor count and every field is terminated by a colon,
//! including the last. Timestamps travel on the wire for compatibility
//! only; receivers stamp descriptors with their own clock, so a skewed or
//! hostile sender cannot make its descriptors look fresher than they are.

use {
  bytes::Bytes,
  std::{
    fmt::Write as _,
    net::{Ipv4Addr, SocketAddr},
  },
};

const PUSH_PREFIX: &str = "CYCLON_PUSH:";
const REPLY_PREFIX: &str = "CYCLON_REPLY:";

/// Longest peer id representable on the wire.
pub const MAX_ID_LENGTH: usize = 49;

/// Identifies one peer of the overlay together with the freshness of that
/// knowledge.
#[derive(Debug, Clone)]
pub struct Descriptor {
  /// Short opaque identifier, unique per node. Never contains ':'.
  pub id: String,

  /// Transport address the peer receives datagrams on.
  pub addr: Ipv4Addr,
  pub port: u16,

  /// Seconds since epoch at which this descriptor was last refreshed.
  /// The age used for partner selection is `now - timestamp`.
  pub timestamp: u64,
}

impl Descriptor {
  pub fn age(&self, now: u64) -> u64 {
    now.saturating_sub(self.timestamp)
  }

  pub fn sock_addr(&self) -> SocketAddr {
    (self.addr, self.port).into()
  }
}

impl Eq for Descriptor {}
impl PartialEq for Descriptor {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
  }
}

impl std::hash::Hash for Descriptor {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.id.hash(state);
  }
}

/// A classified inbound datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Datagram {
  /// Shuffle initiation. By convention the first descriptor is the
  /// sender's own, freshly stamped.
  Push(Vec<Descriptor>),

  /// Response to a previously initiated shuffle.
  Reply(Vec<Descriptor>),

  /// Application payload, kept verbatim.
  Gossip(Bytes),
}

pub fn encode_push(descriptors: &[Descriptor]) -> Bytes {
  encode(PUSH_PREFIX, descriptors)
}

pub fn encode_reply(descriptors: &[Descriptor]) -> Bytes {
  encode(REPLY_PREFIX, descriptors)
}

fn encode(prefix: &str, descriptors: &[Descriptor]) -> Bytes {
  let mut out = String::with_capacity(64 * (descriptors.len() + 1));
  out.push_str(prefix);
  let _ = write!(out, "{}:", descriptors.len());
  for d in descriptors {
    let _ = write!(out, "{}:{}:{}:{}:", d.id, d.addr, d.port, d.timestamp);
  }
  Bytes::from(out)
}

/// Classifies one inbound datagram.
///
/// Returns `None` when a protocol message is too malformed to carry
/// anything: a non-UTF8 or non-numeric descriptor count drops the whole
/// datagram. A truncated descriptor group ends parsing and the valid
/// groups before it survive; groups with an empty or oversized id, an
/// unparsable address or a zero port are skipped.
pub fn decode(payload: &[u8]) -> Option<Datagram> {
  if let Some(rest) = payload.strip_prefix(PUSH_PREFIX.as_bytes()) {
    return parse_descriptors(rest).map(Datagram::Push);
  }
  if let Some(rest) = payload.strip_prefix(REPLY_PREFIX.as_bytes()) {
    return parse_descriptors(rest).map(Datagram::Reply);
  }
  Some(Datagram::Gossip(Bytes::copy_from_slice(payload)))
}

fn parse_descriptors(rest: &[u8]) -> Option<Vec<Descriptor>> {
  let rest = std::str::from_utf8(rest).ok()?;
  let mut fields = rest.split(':');
  let count: usize = fields.next()?.parse().ok()?;

  // `count` comes straight off the wire, so capacity is bounded by what
  // a datagram can physically carry rather than by the claimed count
  let mut descriptors = Vec::with_capacity(count.min(16));
  for _ in 0..count {
    let (id, addr, port, timestamp) =
      match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(id), Some(addr), Some(port), Some(ts)) => (id, addr, port, ts),
        _ => break,
      };
    if id.is_empty() || id.len() > MAX_ID_LENGTH {
      continue;
    }
    let addr: Ipv4Addr = match addr.parse() {
      Ok(addr) => addr,
      Err(_) => continue,
    };
    let port: u16 = match port.parse() {
      Ok(port) if port > 0 => port,
      _ => continue,
    };
    descriptors.push(Descriptor {
      id: id.into(),
      addr,
      port,
      // informational only, receivers restamp on integration
      timestamp: timestamp.parse().unwrap_or(0),
    });
  }
  Some(descriptors)
}

#[cfg(test)]
mod tests {
  use super::{decode, encode_push, encode_reply, Datagram, Descriptor};

  fn descriptor(id: &str, port: u16, timestamp: u64) -> Descriptor {
    Descriptor {
      id: id.into(),
      addr: "127.0.0.1".parse().unwrap(),
      port,
      timestamp,
    }
  }

  #[test]
  fn push_roundtrip() {
    let sent = vec![descriptor("alice", 9001, 17), descriptor("bob", 9002, 4)];
    let encoded = encode_push(&sent);
    assert_eq!(
      &encoded[..],
      b"CYCLON_PUSH:2:alice:127.0.0.1:9001:17:bob:127.0.0.1:9002:4:"
    );

    match decode(&encoded) {
      Some(Datagram::Push(received)) => {
        assert_eq!(received, sent);
        assert_eq!(received[0].timestamp, 17);
      }
      other => panic!("expected push, got {other:?}"),
    }
  }

  #[test]
  fn empty_reply_roundtrip() {
    let encoded = encode_reply(&[]);
    assert_eq!(&encoded[..], b"CYCLON_REPLY:0:");
    assert_eq!(decode(&encoded), Some(Datagram::Reply(vec![])));
  }

  #[test]
  fn anything_else_is_gossip() {
    for payload in [
      &b"alice: hello"[..],
      &b"CYCLON_PUSH"[..], // no colon, not a protocol prefix
      &b"cyclon_push:1:"[..],
      &b""[..],
      &b"\xff\xfe not utf8"[..],
    ] {
      match decode(payload) {
        Some(Datagram::Gossip(bytes)) => assert_eq!(&bytes[..], payload),
        other => panic!("expected gossip, got {other:?}"),
      }
    }
  }

  #[test]
  fn unparsable_count_drops_datagram() {
    assert_eq!(decode(b"CYCLON_PUSH:two:alice:127.0.0.1:9001:0:"), None);
    assert_eq!(decode(b"CYCLON_REPLY:"), None);
  }

  #[test]
  fn overstated_count_keeps_parsed_groups() {
    // claims five descriptors, carries one
    let parsed = decode(b"CYCLON_PUSH:5:onlyid:1.2.3.4:42:0:");
    match parsed {
      Some(Datagram::Push(descriptors)) => {
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].id, "onlyid");
        assert_eq!(descriptors[0].port, 42);
      }
      other => panic!("expected push, got {other:?}"),
    }
  }

  #[test]
  fn invalid_groups_are_skipped() {
    let payload = b"CYCLON_PUSH:4\
      ::127.0.0.1:9001:0\
      :carol:not-an-address:9002:0\
      :dave:127.0.0.1:0:0\
      :erin:127.0.0.1:9005:later:";
    match decode(payload) {
      Some(Datagram::Push(descriptors)) => {
        // empty id, bad address and zero port all dropped; the garbage
        // timestamp is tolerated
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].id, "erin");
        assert_eq!(descriptors[0].timestamp, 0);
      }
      other => panic!("expected push, got {other:?}"),
    }
  }

  #[test]
  fn truncated_datagram_keeps_leading_groups() {
    let full = encode_push(&[
      descriptor("alice", 9001, 1),
      descriptor("bob", 9002, 2),
    ]);
    // cut mid-way through the second group, as an undersized receive
    // buffer would
    let truncated = &full[..full.len() - 9];
    match decode(truncated) {
      Some(Datagram::Push(descriptors)) => {
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].id, "alice");
      }
      other => panic!("expected push, got {other:?}"),
    }
  }
}

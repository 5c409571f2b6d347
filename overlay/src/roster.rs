//! Bootstrap roster: the static list of potential peers read once at
//! startup to seed the view and identify the local node. It is never
//! consulted again; membership knowledge afterwards comes exclusively
//! from the network.

use {
  crate::{node::Error, wire::MAX_ID_LENGTH},
  std::{net::Ipv4Addr, path::Path},
};

/// Identity triple of one overlay node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
  pub id: String,
  pub addr: Ipv4Addr,
  pub port: u16,
}

/// The parsed bootstrap roster.
#[derive(Debug, Clone)]
pub struct Roster {
  pub peers: Vec<PeerIdentity>,
}

impl Roster {
  /// Reads a whitespace separated stream of `id address port` records,
  /// e.g. `alice 127.0.0.1 9001`.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
    Self::parse(&std::fs::read_to_string(path)?)
  }

  pub fn parse(contents: &str) -> Result<Self, Error> {
    let mut tokens = contents.split_whitespace();
    let mut peers = Vec::new();

    while let Some(id) = tokens.next() {
      let (addr, port) = match (tokens.next(), tokens.next()) {
        (Some(addr), Some(port)) => (addr, port),
        _ => return Err(Error::MalformedRoster(id.into())),
      };

      // ids travel on a colon-delimited wire, so reject offenders here
      // rather than emit unparsable datagrams later
      if id.len() > MAX_ID_LENGTH || id.contains(':') {
        return Err(Error::InvalidPeerId(id.into()));
      }
      let addr: Ipv4Addr = addr
        .parse()
        .map_err(|_| Error::MalformedRoster(addr.into()))?;
      let port: u16 = port
        .parse()
        .ok()
        .filter(|port| *port > 0)
        .ok_or_else(|| Error::MalformedRoster(port.into()))?;

      peers.push(PeerIdentity { id: id.into(), addr, port });
    }

    if peers.len() < 2 {
      return Err(Error::InsufficientRoster);
    }
    Ok(Self { peers })
  }

  /// Splits the roster into the entry listening on `port` and everyone
  /// else.
  pub fn split_self(
    self,
    port: u16,
  ) -> Result<(PeerIdentity, Vec<PeerIdentity>), Error> {
    let position = self
      .peers
      .iter()
      .position(|peer| peer.port == port)
      .ok_or(Error::UnknownSelf(port))?;

    let mut peers = self.peers;
    let identity = peers.remove(position);
    Ok((identity, peers))
  }
}

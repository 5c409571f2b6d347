//! A single peer in a Cyclon-style peer-sampling overlay.
//!
//! Each node maintains a small, continuously refreshed partial view of
//! the network membership. A periodic push/reply shuffle with the oldest
//! known peer keeps the view mixed, fresh and self-healing under churn,
//! and application payloads are disseminated epidemically over the same
//! view with duplicate suppression.

mod cache;
mod config;
mod node;
mod roster;
mod runloop;
mod view;
mod wire;

pub use {
  bytes::Bytes,
  config::Config,
  node::{Error, Node, Outbound},
  roster::{PeerIdentity, Roster},
  runloop::run,
  wire::Descriptor,
};

//! The node's event loop.
//!
//! One task owns all mutable state and multiplexes the three input
//! sources: inbound datagrams, the operator console and a coarse timer.
//! The blocking wait is bounded by a one second tick so cycles fire
//! promptly, and every datagram produced by a handler is transmitted
//! before the loop returns to the wait.

use {
  crate::node::{Error, Node, Outbound},
  std::time::{Duration, SystemTime, UNIX_EPOCH},
  tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::UdpSocket,
  },
  tracing::{debug, warn},
};

/// Wall clock reading in whole seconds.
fn now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|elapsed| elapsed.as_secs())
    .unwrap_or(0)
}

/// Drives a node until the operator issues `BYE` or the console closes.
pub async fn run(mut node: Node, socket: UdpSocket) -> Result<(), Error> {
  let mut ticker = tokio::time::interval(Duration::from_secs(1));
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  let mut buf = vec![0u8; node.config().max_datagram_size];

  loop {
    let outbound = tokio::select! {
      _ = ticker.tick() => node.handle_tick(now()),

      received = socket.recv_from(&mut buf) => match received {
        Ok((len, from)) => node.handle_datagram(&buf[..len], from, now()),
        Err(error) => {
          warn!(%error, "receive failed");
          Vec::new()
        }
      },

      line = lines.next_line() => match line {
        Ok(Some(line)) => match console_command(&mut node, line.trim()) {
          Some(outbound) => outbound,
          None => break,
        },
        Ok(None) => break, // console closed
        Err(error) => {
          warn!(%error, "console read failed");
          Vec::new()
        }
      },
    };

    transmit(&socket, outbound).await;
  }

  Ok(())
}

/// Interprets one console line. `None` requests shutdown.
fn console_command(node: &mut Node, line: &str) -> Option<Vec<Outbound>> {
  match line {
    "BYE" => None,
    "VIEW" => {
      print!("{}", node.describe_view(now()));
      Some(Vec::new())
    }
    "CYCLE" => {
      node.force_cycle();
      Some(Vec::new())
    }
    text => Some(node.originate(text)),
  }
}

async fn transmit(socket: &UdpSocket, outbound: Vec<Outbound>) {
  for Outbound { to, payload } in outbound {
    debug!(%to, len = payload.len(), "sending datagram");
    if let Err(error) = socket.send_to(&payload, to).await {
      // datagram loss is tolerated by the protocol
      warn!(%to, %error, "send failed");
    }
  }
}

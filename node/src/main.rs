use {
  crate::cli::CliOptions,
  clap::Parser,
  cyclon_overlay as overlay,
  metrics_exporter_prometheus::PrometheusBuilder,
  overlay::{Config, Node, Roster},
  std::time::{Duration, SystemTime, UNIX_EPOCH},
  tokio::net::UdpSocket,
  tracing::{info, warn},
  tracing_subscriber::FmtSubscriber,
};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing::subscriber::set_global_default(FmtSubscriber::new())?;

  // several nodes commonly share one host; only the first gets the
  // default exporter port
  if let Err(error) = PrometheusBuilder::new().install() {
    warn!(%error, "metrics exporter not installed");
  }

  let opts = CliOptions::parse();
  info!("Node options: {opts:?}");

  let mut config = Config::default();
  if let Some(seconds) = opts.cycle_interval {
    config.cycle_interval = Duration::from_secs(seconds);
  }

  let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
  let roster = Roster::load(&opts.roster)?;
  let node = Node::bootstrap(config, roster, opts.port, now)?;

  for peer in node.view() {
    info!(id = %peer.id, addr = %peer.addr, port = peer.port, "initial view");
  }

  let socket = UdpSocket::bind(("0.0.0.0", opts.port)).await?;
  overlay::run(node, socket).await?;
  Ok(())
}

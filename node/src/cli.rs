use {clap::Parser, std::path::PathBuf};

#[derive(Debug, Parser)]
#[clap(about = "A peer of the Cyclon gossip overlay")]
pub struct CliOptions {
  #[clap(
    long,
    short,
    help = "UDP port this node listens on; must match one roster entry"
  )]
  pub port: u16,

  #[clap(
    long,
    default_value = "users.txt",
    help = "bootstrap roster file of whitespace separated `id address \
            port` records"
  )]
  pub roster: PathBuf,

  #[clap(long, help = "seconds between shuffle cycles")]
  pub cycle_interval: Option<u64>,
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/app.db)
  PORT        (default: 5151 or config.listen_port)
  RUST_LOG    (default: info)
"#;

#[derive(Debug, Parser)]
#[command(
    name = "familypoints-server",
    version,
    about = "Family points tracker server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Optional subcommand. Without one, runs the server.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate a config file (activities, tiers, tier partition) and exit
    CheckConfig {
        /// Config file to check; falls back to CONFIG_PATH, then ./config.yaml
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

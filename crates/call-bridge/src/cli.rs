use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "call-bridge",
    version,
    about = "Relays telephony media streams to a conversational-AI agent"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Listen address (overrides config file setting)
    #[arg(long)]
    pub listen: Option<String>,

    /// Remote agent WebSocket URL (overrides config file setting)
    #[arg(long)]
    pub remote_url: Option<String>,

    /// Agent id appended to the remote URL (overrides config file setting)
    #[arg(long)]
    pub agent_id: Option<String>,

    /// Session journal path (overrides config file setting)
    #[arg(long)]
    pub journal: Option<PathBuf>,
}

//! ONET daemon: entry point for running an overlay node.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use onet_node::{init_logging, LogFormat, NodeConfig, OnetNode, ShutdownController};
use onet_transport::{ProbingTransport, TcpProber};
use onet_types::NetworkId;

/// Interval between status lines while the node runs.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "onet-daemon", about = "ONET overlay node daemon")]
struct Cli {
    /// Network to join: "live", "test", or "dev".
    /// When a config file is provided, defaults to the file's network value.
    #[arg(long, env = "ONET_NETWORK")]
    network: Option<String>,

    /// Node id announced to the network (derived from the host when unset).
    #[arg(long, env = "ONET_NODE_ID")]
    node_id: Option<String>,

    /// Address other nodes reach this node at (host:port).
    #[arg(long, env = "ONET_ADVERTISE_ADDRESS")]
    advertise_address: Option<String>,

    /// Bootstrap servers (comma-separated base URLs).
    #[arg(long, env = "ONET_BOOTSTRAP", value_delimiter = ',')]
    bootstrap: Vec<String>,

    /// Maximum number of connections opened automatically.
    #[arg(long, env = "ONET_MAX_CONNECTIONS")]
    max_connections: Option<usize>,

    /// Stake to vote with; the node stays out of consensus when unset.
    #[arg(long, env = "ONET_STAKE")]
    stake: Option<f64>,

    /// Keep Prometheus metrics and log them with each status line.
    #[arg(long, env = "ONET_ENABLE_METRICS")]
    metrics: bool,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "ONET_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "ONET_LOG_FORMAT")]
    log_format: Option<String>,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "ONET_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Node operations.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Print the effective configuration as TOML.
    #[command(name = "config")]
    Config,
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node until SIGINT/SIGTERM.
    Run,
    /// Run every discovery method once and print what was found as JSON.
    Discover,
}

impl Cli {
    /// File config (or defaults) with CLI flags and env vars applied on top.
    fn merged_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_toml_file(path)?,
            None => NodeConfig::default(),
        };
        if let Some(network) = &self.network {
            config.network = NetworkId::parse(network);
        }
        if let Some(id) = &self.node_id {
            config.node_id = Some(id.clone());
        }
        if let Some(address) = &self.advertise_address {
            config.advertise_address = Some(address.clone());
        }
        if !self.bootstrap.is_empty() {
            config.discovery.bootstrap_endpoints = self.bootstrap.clone();
        }
        if let Some(max) = self.max_connections {
            config.max_connections = max;
        }
        if self.stake.is_some() {
            config.consensus_stake = self.stake;
        }
        config.enable_metrics |= self.metrics;
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.merged_config()?;

    let format: LogFormat = config.log_format.parse()?;
    if let Err(e) = init_logging(format, &config.log_level) {
        onet_utils::init_tracing();
        tracing::warn!(error = %e, "structured logging unavailable, using plain output");
    }
    if let Some(path) = &cli.config {
        tracing::info!("loaded config from {}", path.display());
    }

    match cli.command {
        Command::Config => {
            println!("{}", config.to_toml_string()?);
        }
        Command::Node { action } => {
            let node = build_node(config)?;
            match action {
                NodeAction::Run => run(node).await?,
                NodeAction::Discover => {
                    let found = node.discover_nodes().await;
                    println!("{}", serde_json::to_string_pretty(&found)?);
                }
            }
        }
    }
    Ok(())
}

fn build_node(config: NodeConfig) -> anyhow::Result<OnetNode> {
    let connect_timeout = Duration::from_millis(config.discovery.probe_timeout_ms);
    let transport = Arc::new(ProbingTransport::new(connect_timeout));
    Ok(OnetNode::new(config, transport, Arc::new(TcpProber))?)
}

async fn run(node: OnetNode) -> anyhow::Result<()> {
    tracing::info!(
        "starting ONET node {} on {} ({})",
        node.node_id(),
        node.config().network.as_str(),
        node.address(),
    );
    node.start_network().await?;

    let shutdown = ShutdownController::new();
    let signal = shutdown.wait_for_signal();
    tokio::pin!(signal);
    let mut status_tick = tokio::time::interval(STATUS_INTERVAL);
    status_tick.tick().await;

    loop {
        tokio::select! {
            _ = &mut signal => break,
            _ = status_tick.tick() => log_status(&node).await,
        }
    }

    tracing::info!("shutdown signal received, stopping node");
    node.stop_network().await?;
    tracing::info!("ONET daemon exited cleanly");
    Ok(())
}

async fn log_status(node: &OnetNode) {
    let status = node.network_status().await;
    tracing::info!(
        connected = status.connected_nodes,
        known = status.known_nodes,
        health = status.health,
        uptime = %onet_utils::format_duration(status.uptime_secs),
        "network status"
    );
    node.refresh_metrics().await;
    if let Some(metrics) = node.metrics() {
        match metrics.encode_text() {
            Ok(text) => tracing::debug!(metrics = %text, "metrics snapshot"),
            Err(e) => tracing::warn!(error = %e, "failed to encode metrics"),
        }
    }
    tracing::info!(status = %node.consensus().consensus_status().await, "consensus");
}

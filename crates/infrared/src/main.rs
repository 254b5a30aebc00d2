use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use infrared::conn::{ServerConnFactory, TcpBinder, TcpDialer};
use infrared::{ConnectionGauge, ProxyLane, ProxyLaneConfig, ServerConfig};
use tracing::info;

/// A Minecraft reverse proxy: one public port, many backends, routed by the
/// hostname in the handshake.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Cli {
    /// The address to accept game clients on.
    #[clap(long, default_value = "0.0.0.0:25565")]
    listen_to: String,

    /// Virtual host in the form `domain=backend-address`, e.g.
    /// `hub.example.com=127.0.0.1:25566`. May be given multiple times.
    #[clap(long = "server", required = true)]
    servers: Vec<String>,

    /// Accept-loop tasks sharing the listener.
    #[clap(long, default_value_t = 1)]
    listeners: usize,

    /// Gateways routing handshakes to worker pools.
    #[clap(long, default_value_t = 2)]
    gateways: usize,

    /// Worker tasks per virtual host.
    #[clap(long, default_value_t = 1)]
    instances: usize,

    /// Backend dial timeout in milliseconds.
    #[clap(long, default_value_t = 500)]
    dial_timeout_ms: u64,

    /// Idle seconds after the last player leaves before a managed backend
    /// process is stopped.
    #[clap(long, default_value_t = 300)]
    idle_timeout_secs: u64,
}

fn parse_server(arg: &str, cli: &Cli) -> anyhow::Result<ServerConfig> {
    let (domain, proxy_to) = arg
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("expected domain=backend-address, got {arg:?}"))?;

    Ok(ServerConfig {
        domain_name: domain.to_owned(),
        proxy_to: proxy_to.to_owned(),
        number_of_instances: cli.instances,
        timeout: Duration::from_secs(cli.idle_timeout_secs),
        ..ServerConfig::default()
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let servers = cli
        .servers
        .iter()
        .map(|arg| parse_server(arg, &cli))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let lane = ProxyLane::start(ProxyLaneConfig {
        number_of_listeners: cli.listeners,
        number_of_gateways: cli.gateways,
        timeout: Duration::from_millis(cli.dial_timeout_ms),
        listen_to: cli.listen_to.clone(),
        servers,
        server_conn_factory: Arc::new(|timeout| -> Arc<dyn ServerConnFactory> {
            Arc::new(TcpDialer { timeout })
        }),
        listener_factory: Arc::new(TcpBinder),
        gauge: ConnectionGauge::new(),
    })
    .await?;

    wait_for_shutdown().await;

    info!("shutting down");
    lane.close();

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("installing SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}

use clap::Parser;
use conduit_dns_domain::CliOverrides;
use conduit_dns_domain::Config;
use mimalloc::MiMalloc;
use tracing::info;

mod bootstrap;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "conduit-dns")]
#[command(version)]
#[command(about = "Conduit DNS - caching DNS forwarder")]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// DNS listen port
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Bind address
    #[arg(short = 'b', long)]
    bind: Option<String>,

    /// Upstream resolver (ip:port). Repeatable; replaces configured targets.
    #[arg(short = 'u', long = "upstream", value_name = "ADDR")]
    upstreams: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let overrides = CliOverrides {
        port: cli.port,
        bind_address: cli.bind.clone(),
        upstreams: (!cli.upstreams.is_empty()).then(|| cli.upstreams.clone()),
        log_level: cli.log_level.clone(),
    };
    let config = Config::load(cli.config.as_deref(), overrides)?;

    bootstrap::init_logging(&config);
    info!("Starting Conduit DNS v{}", env!("CARGO_PKG_VERSION"));

    let server = bootstrap::start_server(&config).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    server.stop().await;
    info!("Server shutdown complete");
    Ok(())
}

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use waserver::{Config, ServeOutcome, ServerOptions, TlsFiles, WebApi};

// Stamped by CI through environment variables at build time.
const BUILD_TIME: &str = match option_env!("WASERVER_BUILD_TIME") {
    Some(value) => value,
    None => "<NOT SET>",
};
const GIT_HASH: &str = match option_env!("WASERVER_GIT_HASH") {
    Some(value) => value,
    None => "<NOT SET>",
};

#[derive(Parser, Debug)]
#[command(name = "waserver")]
#[command(about = "Web application server with a file-backed JSON data API")]
#[command(disable_version_flag = true)]
struct Cli {
    /// Directory where the web applications are located
    #[arg(default_value = ".")]
    app_path: PathBuf,

    /// Directory where data (JSON) is stored [default: APP_PATH]
    data_path: Option<PathBuf>,

    /// Network port to listen to
    #[arg(short, long, env = "WASERVER_PORT", default_value = "8080")]
    port: u16,

    /// Address to bind to
    #[arg(short, long, env = "WASERVER_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Use secure connection (TLS/HTTPS)
    #[arg(short = 's', long = "tls", env = "WASERVER_TLS")]
    tls: bool,

    /// TLS certificate file
    #[arg(short = 'c', long, env = "WASERVER_CERT", default_value = "cert.pem")]
    cert: PathBuf,

    /// TLS key file
    #[arg(short = 'k', long, env = "WASERVER_KEY", default_value = "key.pem")]
    key: PathBuf,

    /// Enable debugging logs
    #[arg(short, long, env = "WASERVER_DEBUG")]
    debug: bool,

    /// Config file path (optional)
    #[arg(long, env = "WASERVER_CONFIG")]
    config: Option<PathBuf>,

    /// Display version
    #[arg(short = 'v', long)]
    version: bool,
}

/// Combine the bind address and port. IPv6 addresses are accepted bare, e.g. `::`.
fn bind_addr(bind: &str, port: u16) -> Result<SocketAddr> {
    let ip: IpAddr = bind
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .with_context(|| format!("invalid bind address: {bind}"))?;
    Ok(SocketAddr::new(ip, port))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("Version:    {}", env!("CARGO_PKG_VERSION"));
        println!("Build Time: {}", BUILD_TIME);
        println!("GIT Hash:   {}", GIT_HASH);
        return Ok(());
    }

    // Initialize tracing
    let filter = if cli.debug {
        "waserver=debug,tower_http=debug"
    } else {
        "waserver=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config from file if provided, otherwise use defaults
    let config = match &cli.config {
        Some(config_path) => Config::from_file(config_path)
            .map_err(|e| anyhow!("loading config {}: {}", config_path.display(), e))?,
        None => Config::default(),
    };

    let app_dir = cli.app_path.clone();
    let data_dir = cli.data_path.clone().unwrap_or_else(|| app_dir.clone());

    if !app_dir.is_dir() {
        bail!("Application path is not a directory: {}", app_dir.display());
    }

    let addr = bind_addr(&cli.bind, cli.port)?;

    let tls = cli.tls.then(|| TlsFiles {
        cert: cli.cert.clone(),
        key: cli.key.clone(),
    });

    let api = WebApi::new(ServerOptions { addr, tls }, app_dir, data_dir, config);
    let handle = api.start().await.context("starting server")?;

    // Ctrl+C behaves like the shutdown endpoint
    let stop = handle.stopper();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            stop.cancel();
        }
    });

    // Block until the server is done
    match handle.wait().await {
        ServeOutcome::Shutdown => Ok(()),
        ServeOutcome::Failed(reason) => {
            error!("Server stopped: {}", reason);
            bail!("server failed: {reason}")
        }
    }
}

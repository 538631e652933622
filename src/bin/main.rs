//! tinytld binary entry point.

use clap::Parser;
use std::path::PathBuf;
use tinytld::{telemetry, Config, Server, TldError};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Self-registering authoritative DNS for a local top-level domain.
#[derive(Parser, Debug)]
#[command(name = "tinytld")]
#[command(version, about, long_about = None)]
struct Args {
    /// Optional configuration file (TOML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TLD to use.
    #[arg(long)]
    tld: Option<String>,

    /// Port to serve DNS from.
    #[arg(long)]
    port: Option<u16>,

    /// Label at which to register (`<host>.<label>.<tld>`).
    #[arg(long)]
    register: Option<String>,

    /// Address to serve DNS and HTTP on.
    #[arg(long)]
    listen: Option<String>,

    /// Port for HTTP serving; 0 disables it.
    #[arg(long)]
    http: Option<u16>,

    /// File for loading/saving hosts; empty disables persistence.
    #[arg(long)]
    hosts: Option<PathBuf>,

    /// Log level filter, overridden by RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,
}

/// Layer defaults, the config file, TINYTLD__* environment variables and
/// command-line flags, in increasing precedence.
fn load_config(args: &Args) -> Result<Config, TldError> {
    let mut builder = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?);

    if let Some(path) = &args.config {
        builder = builder.add_source(config::File::from(path.clone()));
    }

    builder
        .add_source(
            config::Environment::with_prefix("TINYTLD")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("dns.tld", args.tld.clone())?
        .set_override_option("dns.port", args.port.map(i64::from))?
        .set_override_option("dns.registration_label", args.register.clone())?
        .set_override_option("dns.listen_addr", args.listen.clone())?
        .set_override_option("http.listen_addr", args.listen.clone())?
        .set_override_option("http.port", args.http.map(i64::from))?
        .set_override_option(
            "store.path",
            args.hosts.as_ref().map(|p| p.display().to_string()),
        )?
        .set_override_option("telemetry.log_level", args.log_level.clone())?
        .build()?
        .try_deserialize()
        .map_err(TldError::from)
}

/// Wait for shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => error!("failed to install SIGTERM handler: {}", err),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, stopping"),
        _ = terminate => info!("received SIGTERM, stopping"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config = load_config(&args)?;

    // Initialize telemetry
    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        config_file = ?args.config,
        dns_addr = %config.dns.socket_addr(),
        tld = %config.dns.tld,
        hosts_file = %config.store.path.display(),
        "Starting tinytld"
    );

    let server = Server::new(config)?;

    // Setup graceful shutdown
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    if let Err(e) = server.run(shutdown).await {
        error!("tinytld error: {}", e);
        return Err(e.into());
    }

    info!("tinytld shutdown complete");
    Ok(())
}

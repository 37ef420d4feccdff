mod config_commands;
mod watch_commands;

use std::path::{Path, PathBuf};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    rally_config::RealtimeConfig,
    rally_metrics::MetricsRecorderConfig,
    tracing::{debug, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "rally", about = "Rally - realtime channel subscriptions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of rally.{toml,yaml,json}).
    #[arg(long, global = true, env = "RALLY_CONFIG")]
    config: Option<PathBuf>,

    /// Print collected metrics in Prometheus format on exit.
    #[arg(long, global = true, default_value_t = false)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to a channel and print its events as JSON lines.
    Watch(watch_commands::WatchArgs),
    /// Configuration inspection.
    Config {
        #[command(subcommand)]
        action: Option<config_commands::ConfigAction>,
    },
}

/// Load the config from an explicit path, or discover it, then apply
/// `RALLY_*` environment overrides.
pub(crate) fn load_effective_config(path: Option<&Path>) -> anyhow::Result<RealtimeConfig> {
    match path {
        Some(path) => {
            let mut config = rally_config::load_config(path)
                .with_context(|| format!("loading {}", path.display()))?;
            rally_config::apply_env_overrides(&mut config, |name| std::env::var(name).ok());
            Ok(config)
        },
        None => Ok(rally_config::discover_and_load()),
    }
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; stdout carries event lines.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let _ = rustls::crypto::ring::default_provider().install_default();
    let metrics = rally_metrics::init_metrics(MetricsRecorderConfig {
        enabled: cli.metrics,
        global_labels: vec![("service".into(), "rally".into())],
    })?;

    debug!(version = env!("CARGO_PKG_VERSION"), "rally starting");

    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Commands::Watch(args) => watch_commands::handle_watch(args, config_path).await,
        Commands::Config { action } => config_commands::handle_config(action, config_path),
    };

    if cli.metrics {
        info!("metrics snapshot written to stderr");
        eprint!("{}", metrics.render());
    }
    result
}

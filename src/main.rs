use anyhow::Context;
use clap::Parser;
use network_diagnostics::config::LoggingConfig;
use network_diagnostics::diagnostics::EventKind;
use network_diagnostics::{
    Config, ConfigOverrides, DiagnosticEvent, DiagnosticsMonitor, HttpProbe, Probe,
    RetryStrategyKind,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Continuously probe a backend endpoint and report ping statistics
#[derive(Parser, Debug)]
#[command(name = "network-diagnostics", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Endpoint to probe
    #[arg(short, long)]
    url: Option<String>,

    /// Retry strategy: none, simple, exponential or intelligent
    #[arg(short, long)]
    strategy: Option<RetryStrategyKind>,

    #[arg(long)]
    max_attempts: Option<u32>,

    #[arg(long)]
    base_delay_ms: Option<u64>,

    /// Pause between probe cycles
    #[arg(long)]
    throttle_ms: Option<u64>,

    /// Per-attempt deadline
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Stop after this many probe cycles
    #[arg(long)]
    cycles: Option<u64>,

    /// Run a single probe cycle and exit
    #[arg(long)]
    once: bool,

    /// Print events as JSON lines and log as JSON
    #[arg(long)]
    json: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            url: self.url.clone(),
            strategy: self.strategy,
            max_attempts: self.max_attempts,
            base_delay_ms: self.base_delay_ms,
            throttle_delay_ms: self.throttle_ms,
            timeout_ms: self.timeout_ms,
            log_level: self.verbose.then(|| "debug".to_string()),
            json_logs: self.json.then_some(true),
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn print_event(event: &DiagnosticEvent, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    let line = match &event.kind {
        EventKind::Ping(record) => {
            let marker = if record.outcome.succeeded { "OK  " } else { "FAIL" };
            format!("{marker} {}", record.message)
        }
        EventKind::NetworkStateChange(change) => format!("NET  {:?}", change.state),
    };
    println!("{} {line}", event.timestamp.format("%H:%M:%S%.3f"));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    config.apply_overrides(&cli.overrides());
    config.validate().context("invalid configuration")?;

    if cli.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    init_tracing(&config.logging);

    let probe: Arc<dyn Probe> = Arc::new(HttpProbe::from_config(&config.probe)?);
    let monitor = DiagnosticsMonitor::from_config(&config);

    if cli.once {
        let event = monitor.run_cycle(probe.as_ref()).await;
        print_event(&event, cli.json)?;
    } else {
        let mut feed = monitor.subscribe();
        monitor.start(Arc::clone(&probe), config.retry.clone()).await?;
        info!("Probing {} with {} strategy", probe.target(), config.retry.strategy);

        let mut seen = 0u64;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping probe loop");
                    break;
                }
                received = feed.recv() => match received {
                    Ok(event) => {
                        print_event(&event, cli.json)?;
                        seen += 1;
                        if cli.cycles.is_some_and(|limit| seen >= limit) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Output fell behind, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        monitor.stop().await?;
    }

    let statistics = monitor.statistics().await;
    println!("{}", serde_json::to_string_pretty(&statistics)?);
    Ok(())
}

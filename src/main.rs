//! Resource Health Monitor Binary

use clap::Parser;
use futures::future::join_all;
use health_monitor::{
    classify, MonitorConfig, PollReport, Pollers, ResourceMonitor, Result, Scheduler,
    TrackedResource,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "health_monitor", version, about = "Poll repositories and websites and report their health")]
struct Args {
    /// Repository (`owner/repo` or GitHub URL) or website URL to monitor
    #[arg(
        short,
        long = "resource",
        env = "MONITOR_RESOURCES",
        value_delimiter = ',',
        required = true
    )]
    resources: Vec<String>,

    /// Poll every resource once, print the reports as JSON and exit
    #[arg(long)]
    once: bool,

    /// Evaluate transitions but do not emit alerts
    #[arg(long, env = "MONITOR_MUTE")]
    mute: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    initialize_tracing();

    info!("Starting Resource Health Monitor v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    // Load configuration
    let config = MonitorConfig::from_env();

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    info!(
        "Monitor configuration - Website interval: {:?}, Repository interval: {:?}, API: {}",
        config.website_poll_interval, config.repo_poll_interval, config.github_api_url
    );

    let resources = resolve_resources(&args);
    if resources.is_empty() {
        error!("No valid resources to monitor");
        std::process::exit(1);
    }

    if args.once {
        return poll_once(config, resources).await;
    }

    let (scheduler, mut reports) = Scheduler::new(config)?;
    let summary = scheduler.sync(&resources).await;
    info!("Monitoring {} resources", summary.tracked.len());

    loop {
        tokio::select! {
            Some(report) = reports.recv() => log_report(&report),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Shutting down health monitor");
    scheduler.shutdown().await;
    Ok(())
}

fn resolve_resources(args: &Args) -> Vec<TrackedResource> {
    args.resources
        .iter()
        .map(|input| input.trim())
        .filter(|input| !input.is_empty())
        .filter_map(|input| match classify(input) {
            Ok(target) => Some(target.into_resource().with_notifications(!args.mute)),
            Err(e) => {
                warn!("Skipping '{}': {}", input, e);
                None
            }
        })
        .collect()
}

async fn poll_once(config: MonitorConfig, resources: Vec<TrackedResource>) -> Result<()> {
    let pollers = Pollers::new(&config)?;
    let monitors = resources
        .into_iter()
        .map(|resource| ResourceMonitor::new(resource, pollers.clone(), &config))
        .collect::<Result<Vec<_>>>()?;

    let reports = join_all(monitors.iter().map(|monitor| monitor.poll_once())).await;
    let reports: Vec<PollReport> = reports.into_iter().flatten().collect();

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn log_report(report: &PollReport) {
    match (&report.error, &report.health_score) {
        (Some(error), _) => warn!("{} {} poll failed: {}", report.kind, report.resource_name, error),
        (None, Some(score)) => info!(
            "{} {} is {} with health score {} ({:?})",
            report.kind,
            report.resource_name,
            report.observed_status,
            score.score,
            score.grade()
        ),
        (None, None) => info!("{} {} is {}", report.kind, report.resource_name, report.observed_status),
    }
}

/// Initialize structured logging
fn initialize_tracing() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .json();

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

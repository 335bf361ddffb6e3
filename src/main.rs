use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::ratelimit::{AdmissionPolicy, IntervalThrottle, SlidingWindowLimiter, TokioClock};
use turnstile::simulation::{Simulation, SimulationReport};

/// Drive synthetic multi-user traffic through the admission policies.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Which policy to exercise
    #[arg(short, long, value_enum, default_value_t = PolicyArg::Both)]
    policy: PolicyArg,

    /// Seed for the inter-message delays
    #[arg(long)]
    seed: Option<u64>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Print the reports as JSON instead of one line per message
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    Window,
    Throttle,
    Both,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = TurnstileConfig::load(args.config.as_deref())?;
    info!(
        window_size_secs = config.sliding_window.window_size_secs,
        max_requests = config.sliding_window.max_requests,
        min_interval_secs = config.throttle.min_interval_secs,
        "Configuration loaded"
    );

    let simulation = Simulation::from_config(&config.simulation)?;
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut policies: Vec<Box<dyn AdmissionPolicy>> = Vec::new();
    if matches!(args.policy, PolicyArg::Window | PolicyArg::Both) {
        policies.push(Box::new(SlidingWindowLimiter::with_clock(
            &config.sliding_window,
            TokioClock,
        )?));
    }
    if matches!(args.policy, PolicyArg::Throttle | PolicyArg::Both) {
        policies.push(Box::new(IntervalThrottle::with_clock(
            &config.throttle,
            TokioClock,
        )?));
    }

    let run = async {
        let mut reports = Vec::with_capacity(policies.len());
        for policy in &policies {
            let report = simulation.run(policy.as_ref(), &mut rng).await;
            if !args.json {
                print_report(&report);
            }
            reports.push(report);
        }
        reports
    };

    // Stop early on Ctrl+C or SIGTERM
    tokio::select! {
        reports = run => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            }
        }
        _ = shutdown_signal() => {
            warn!("Simulation interrupted");
        }
    }

    Ok(())
}

fn print_report(report: &SimulationReport) {
    println!("\n=== {} ===", report.policy);
    let mut phase = 0;
    for outcome in &report.outcomes {
        if outcome.phase != phase {
            phase = outcome.phase;
            println!("\n--- phase {} ---", phase);
        }
        println!("{}", outcome);
    }
    println!(
        "\n{} admitted, {} rejected",
        report.admitted(),
        report.rejected()
    );
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}

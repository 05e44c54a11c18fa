use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tollgate::config::{LogFormat, LoggingConfig, TollgateConfig};
use tollgate::ratelimit::{LimitPolicies, QuotaDescriptors, WindowKind};

/// Inspect how Tollgate prices and limits exchange API calls.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve quota descriptors into the enforced policies
    Resolve {
        /// JSON or YAML file holding the exchange's quota descriptors
        #[arg(short, long)]
        limits: Option<PathBuf>,
    },
    /// Show the weight and category of operations
    Classify {
        /// Operation names
        #[arg(required = true)]
        operations: Vec<String>,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = TollgateConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging);
    info!("Tollgate {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Resolve { limits } => {
            let policies = match limits {
                Some(path) => LimitPolicies::resolve(&QuotaDescriptors::from_file(path)?),
                None => config.policies().unwrap_or_else(|| {
                    warn!("No quota descriptors given, showing default limits");
                    LimitPolicies::default()
                }),
            };

            let windows: Vec<_> = [
                (WindowKind::RequestWeight, policies.request_weight),
                (WindowKind::OrderRate, policies.order_rate),
                (WindowKind::OrderDaily, policies.order_daily),
            ]
            .into_iter()
            .map(|(kind, policy)| {
                json!({
                    "window": kind.as_str(),
                    "limit": policy.limit,
                    "interval_secs": policy.interval_secs,
                    "capacity": kind.capacity(&policy),
                })
            })
            .collect();

            println!("{}", serde_json::to_string_pretty(&windows)?);
        }
        Command::Classify { operations } => {
            let table = config.operation_table();
            for name in operations {
                match table.get(&name) {
                    Some(op) => println!(
                        "{name}\tweight={}\t{}",
                        op.weight,
                        if op.order { "order" } else { "general" }
                    ),
                    None => println!("{name}\tunweighted (bypasses quotas)"),
                }
            }
        }
    }

    Ok(())
}

//! api-topology
//!
//! Validates topology files, simulates multi-region rollouts against the
//! in-memory providers and probes live health endpoints.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use regional_api_topology::config::TopologyConfig;
use regional_api_topology::failover::{FailoverController, HealthCheckSettings, HealthProbe, HttpProbe};
use regional_api_topology::simulation::{simulate, SimulationOutcome};
use regional_api_topology::telemetry::{self, LogFormat};
use regional_api_topology::topology::{ResourceStatus, TopologyShape};

/// Multi-region API topology tooling
#[derive(Parser, Debug)]
#[command(name = "api-topology", version, about)]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(long, short, global = true)]
    verbose: bool,

    #[arg(long, value_enum, default_value = "text", env = "LOG_FORMAT", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse and validate a topology file, then print each region's plan
    Validate {
        #[arg(long, env = "TOPOLOGY_CONFIG")]
        config: PathBuf,

        /// Override the file's caller account
        #[arg(long, env = "CALLER_ACCOUNT")]
        caller_account: Option<String>,
    },

    /// Deploy every region concurrently against in-memory providers
    Simulate {
        #[arg(long, env = "TOPOLOGY_CONFIG")]
        config: PathBuf,

        #[arg(long, env = "CALLER_ACCOUNT")]
        caller_account: Option<String>,

        /// Print the full outcome as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Probe a live endpoint with the failover hysteresis
    Probe {
        #[arg(long)]
        fqdn: String,

        #[arg(long, default_value = "443")]
        port: u16,

        #[arg(long, default_value = "/health")]
        path: String,

        /// Region whose endpoint this is
        #[arg(long, default_value = "us-east-1")]
        region: String,

        #[arg(long, default_value = "3")]
        rounds: u32,

        /// Seconds between rounds (10 or 30)
        #[arg(long, default_value = "30")]
        interval: u64,

        /// Probe over plain HTTP instead of HTTPS
        #[arg(long, default_value = "false")]
        plain_http: bool,
    },

    /// Print an example topology file
    ExampleConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose, cli.log_format);

    match cli.command {
        Command::Validate { config, caller_account } => {
            let config = load(&config, caller_account)?;
            print_plan_summary(&config);
            Ok(())
        }
        Command::Simulate {
            config,
            caller_account,
            json,
        } => {
            let config = Arc::new(load(&config, caller_account)?);
            run_simulation(config, json).await
        }
        Command::Probe {
            fqdn,
            port,
            path,
            region,
            rounds,
            interval,
            plain_http,
        } => run_probe(&fqdn, port, &path, &region, rounds, interval, plain_http).await,
        Command::ExampleConfig => {
            println!("{}", serde_json::to_string_pretty(&TopologyConfig::example())?);
            Ok(())
        }
    }
}

fn load(path: &Path, caller_account: Option<String>) -> Result<TopologyConfig> {
    let mut config = TopologyConfig::load(path)?;
    if let Some(account) = caller_account {
        config.caller_account = account;
        config.validate().context("Invalid caller account override")?;
    }
    Ok(config)
}

fn print_plan_summary(config: &TopologyConfig) {
    println!("zone {} (parameter /route53/{})", config.zone.name, config.zone.key);
    for spec in &config.regions {
        let regional = config.regional_domain(spec);
        let (primary, alternate) = match spec.shape {
            TopologyShape::Full => (config.zone.name.as_str(), regional.as_str()),
            TopologyShape::Minimal => (regional.as_str(), config.zone.name.as_str()),
        };

        println!("\n{} [{}]", spec.region, spec.shape);
        println!("  certificate  {} + {}", primary, alternate);
        println!("  domains      {} (default mapping), {}", config.zone.name, regional);
        println!("  records      A/AAAA {}", regional);
        for route in config.routes_for(spec.shape) {
            println!("  route        {} {}", route.method, route.path);
        }
    }
}

async fn run_simulation(config: Arc<TopologyConfig>, json: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    let run = simulate(config, cancel.clone());
    tokio::pin!(run);

    let outcome = tokio::select! {
        outcome = &mut run => outcome?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling regional deployments");
            cancel.cancel();
            run.await?
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    let partial: Vec<&str> = outcome
        .reports
        .iter()
        .filter(|r| !r.is_complete())
        .map(|r| r.region.as_str())
        .collect();
    if !partial.is_empty() {
        bail!("partial deployment in {}", partial.join(", "));
    }
    Ok(())
}

fn print_outcome(outcome: &SimulationOutcome) {
    for report in &outcome.reports {
        println!("\n{} [{}] {:?}", report.region, report.shape, report.outcome);
        for resource in &report.resources {
            match &resource.status {
                ResourceStatus::Ready => println!("  ok       {}", resource.id),
                ResourceStatus::Failed(reason) => println!("  FAILED   {}: {}", resource.id, reason),
                ResourceStatus::Blocked(dep) => println!("  blocked  {} (waiting on {})", resource.id, dep),
            }
        }
        for assumption in &report.assumptions {
            println!("  assumes  {}", assumption);
        }
        if let Some(failure) = &report.first_failure {
            println!("  first failure: {} ({})", failure.resource, failure.reason);
        }
    }

    println!("\nanswers:");
    for answer in &outcome.selected {
        println!("  {} {} {}", answer.region, answer.record.record_type, answer.record.name);
    }
}

async fn run_probe(
    fqdn: &str,
    port: u16,
    path: &str,
    region: &str,
    rounds: u32,
    interval: u64,
    plain_http: bool,
) -> Result<()> {
    let settings = HealthCheckSettings {
        interval: Duration::from_secs(interval),
        ..HealthCheckSettings::default()
    };
    let controller = FailoverController::new(settings.clone());
    let check = controller
        .attach(region, fqdn, port, path, &settings.evaluator_regions)
        .await?;

    let timeout = Duration::from_secs(5);
    let probe = if plain_http {
        HttpProbe::plain_http(timeout)?
    } else {
        HttpProbe::new(timeout)?
    };
    info!(url = %probe.url(&check), rounds, "Probing");

    for round in 1..=rounds {
        for evaluator in &check.evaluator_regions {
            let outcome = probe.probe(&check, evaluator).await;
            controller.record(&check.id, evaluator, &outcome).await?;
        }
        println!("round {}: {}", round, controller.status(&check.id).await?);
        if round < rounds {
            tokio::time::sleep(check.interval).await;
        }
    }

    for transition in controller.transitions().await {
        println!("{} {} -> {}", transition.at.to_rfc3339(), transition.region, transition.status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_interval_defaults_to_check_interval() {
        let cli = Cli::try_parse_from(["api-topology", "probe", "--fqdn", "use1.api.example.org"]).unwrap();
        match cli.command {
            Command::Probe { interval, port, path, .. } => {
                let defaults = HealthCheckSettings::default();
                assert_eq!(Duration::from_secs(interval), defaults.interval);
                assert_eq!(port, defaults.port);
                assert_eq!(path, defaults.path);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}

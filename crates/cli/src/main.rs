use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use converge_core::validate;
use converge_nodepool::NodePoolDiffPlan;
use converge_poll::{await_state, PollSettings};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod scenario;

use scenario::{read_pools, Scenario};

#[derive(Parser, Debug)]
#[command(name = "convergectl", version, about = "Plan node pool changes and exercise the convergence poller")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the update steps that move a cluster from one node pool list to another
    Plan {
        /// Current node pool list (YAML or JSON)
        #[arg(long = "old")]
        old: PathBuf,
        /// Desired node pool list (YAML or JSON)
        #[arg(long = "new")]
        new: PathBuf,
    },
    /// Check a node pool list for malformed or duplicate names
    Validate {
        file: PathBuf,
    },
    /// Run the poller against a scripted sequence of samples
    Simulate {
        file: PathBuf,
    },
}

const LOG_ENV: &str = "CONVERGE_LOG";
const METRICS_ENV: &str = "CONVERGE_METRICS_ADDR";

fn init_tracing(key: &str) {
    let filter = std::env::var(key)
        .ok()
        .and_then(|v| tracing_subscriber::EnvFilter::from_str(&v).ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Serve Prometheus metrics when `key` names a socket address.
fn init_metrics(key: &str) {
    let Ok(addr) = std::env::var(key) else { return };
    let sock = match addr.parse::<std::net::SocketAddr>() {
        Ok(sock) => sock,
        Err(e) => {
            warn!(%addr, error = %e, "ignoring {key}; expected host:port");
            return;
        }
    };
    match metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(sock).install() {
        Ok(()) => info!(%addr, "metrics exporter listening"),
        Err(e) => warn!(error = %e, "metrics exporter not installed"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(LOG_ENV);
    init_metrics(METRICS_ENV);
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { old, new } => {
            let (old, new) = (read_pools(&old)?, read_pools(&new)?);
            let plan = NodePoolDiffPlan::compute(&old, &new)?;
            let steps = if plan.is_noop(&old) { Vec::new() } else { plan.steps() };
            info!(keep = plan.keep.len(), delete = plan.to_delete.len(), steps = steps.len(), "plan computed");
            match cli.output {
                Output::Human => {
                    println!("keep: {}", names(&plan.keep));
                    println!("delete: {}", names(&plan.to_delete));
                    if steps.is_empty() {
                        println!("no changes");
                    }
                    for (i, step) in steps.iter().enumerate() {
                        let pools: Vec<String> = step.pools.iter().map(|p| format!("{}={}", p.name, p.size)).collect();
                        println!("{}. {:<9} [{}]", i + 1, step.kind.as_str(), pools.join(", "));
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&json!({ "plan": plan, "steps": steps }))?),
            }
        }
        Commands::Validate { file } => {
            let pools = read_pools(&file)?;
            validate::node_pools(&pools)?;
            match cli.output {
                Output::Human => println!("{}: {} node pools ok", file.display(), pools.len()),
                Output::Json => println!("{}", json!({ "file": file.display().to_string(), "node_pools": pools.len(), "valid": true })),
            }
        }
        Commands::Simulate { file } => {
            let scenario = Scenario::read(&file)?;
            let spec = scenario.spec(&PollSettings::from_env());
            let refresher = scenario.refresher();

            let cancel = CancellationToken::new();
            let ctrl_c = tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("Ctrl-C received; cancelling simulation");
                        cancel.cancel();
                    }
                }
            });
            let res = await_state(&refresher, &spec, &cancel).await;
            ctrl_c.abort();

            let calls = refresher.calls();
            match (&res, cli.output) {
                (Ok(done), Output::Human) => println!("converged: {} after {} samples", done.label, done.attempts),
                (Err(e), Output::Human) => println!("failed after {calls} samples: {e}"),
                (Ok(done), Output::Json) => println!("{}", json!({ "ok": true, "label": done.label, "samples": done.attempts })),
                (Err(e), Output::Json) => println!("{}", json!({ "ok": false, "kind": format!("{:?}", e.kind()), "error": e.to_string(), "samples": calls })),
            }
            if res.is_err() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn names(pools: &[converge_core::model::NodePool]) -> String {
    if pools.is_empty() {
        return "-".to_string();
    }
    pools.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ")
}

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mcpfix_core::Error;
use mcpfix_setup::{Bootstrap, BootstrapConfig, TeardownReport};
use tokio::process::Command;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "mcpfixctl", version, about = "Ephemeral openMCP test platforms on kind")]
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
    /// Create the platform cluster and install operator and providers
    Up {
        #[arg(long = "config", short = 'c')]
        config: PathBuf,
        /// Platform cluster name (default: random `platform-<hex>`)
        #[arg(long = "name")]
        name: Option<String>,
    },
    /// Remove providers and destroy an existing platform cluster
    Down {
        #[arg(long = "config", short = 'c')]
        config: PathBuf,
        #[arg(long = "platform")]
        platform: String,
    },
    /// Bring a platform up, run a command against it, tear it down
    Run {
        #[arg(long = "config", short = 'c')]
        config: PathBuf,
        /// Command and arguments, after `--`
        #[arg(trailing_var_arg = true, required = true)]
        cmd: Vec<String>,
    },
    /// Render a template with data from a YAML file
    Render {
        template: PathBuf,
        #[arg(long = "data")]
        data: PathBuf,
    },
}

fn init_tracing() {
    let env = std::env::var("MCPFIX_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("MCPFIX_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid MCPFIX_METRICS_ADDR; expected host:port");
        }
    }
}

fn load_config(path: &Path) -> Result<BootstrapConfig> {
    BootstrapConfig::load(path).with_context(|| format!("loading bootstrap config {}", path.display()))
}

fn print_report(output: Output, report: &TeardownReport) {
    match output {
        Output::Human => println!("{}", report),
        Output::Json => {
            let errors: Vec<_> = report.errors.iter().map(|e| serde_json::json!({"stage": e.stage, "error": e.source.to_string()})).collect();
            println!("{}", serde_json::json!({"ran": report.ran, "errors": errors}));
        }
    }
}

async fn run_command(cmd: Vec<String>, cluster: String, namespace: String) -> mcpfix_core::Result<ExitStatus> {
    let (program, args) = cmd.split_first().ok_or_else(|| Error::Lifecycle { op: "run", cluster: cluster.clone(), message: "empty command".into() })?;
    info!(program = %program, cluster = %cluster, "running command against platform");
    let mut child = Command::new(program)
        .args(args)
        .env("MCPFIX_PLATFORM_CLUSTER", &cluster)
        .env("MCPFIX_NAMESPACE", &namespace)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::io(program, e))?;
    tokio::select! {
        status = child.wait() => status.map_err(|e| Error::io(program, e)),
        _ = signal::ctrl_c() => {
            warn!("interrupted; stopping command before teardown");
            let _ = child.kill().await;
            Err(Error::Lifecycle { op: "run", cluster: cluster.clone(), message: "interrupted".into() })
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Up { config, name } => {
            let mut bootstrap = Bootstrap::with_kind(load_config(&config)?);
            if let Some(name) = name.as_deref() {
                bootstrap = bootstrap.cluster_name(name);
            }
            let platform = bootstrap.up().await.context("platform setup failed (teardown already ran)")?;
            match cli.output {
                Output::Human => println!("{}", platform.cluster),
                Output::Json => println!("{}", serde_json::json!({"platformCluster": platform.cluster, "namespace": platform.config.namespace})),
            }
        }
        Commands::Down { config, platform } => {
            let bootstrap = Bootstrap::with_kind(load_config(&config)?);
            let mut ctx = bootstrap.attach(&platform).await;
            let report = bootstrap.down(&mut ctx).await;
            print_report(cli.output, &report);
            if !report.is_clean() {
                return Err(anyhow!("teardown of {} finished with {} error(s)", platform, report.errors.len()));
            }
        }
        Commands::Run { config, cmd } => {
            let bootstrap = Bootstrap::with_kind(load_config(&config)?);
            let status = bootstrap
                .run(move |fx| {
                    let (cluster, namespace) = (fx.platform_cluster().to_string(), fx.namespace().to_string());
                    Box::pin(run_command(cmd, cluster, namespace))
                })
                .await?;
            info!(%status, "command finished");
            if !status.success() {
                std::process::exit(status.code().unwrap_or(1));
            }
        }
        Commands::Render { template, data } => {
            let text = std::fs::read_to_string(&data).with_context(|| format!("reading {}", data.display()))?;
            let ctx: serde_json::Value = serde_yaml::from_str(&text).with_context(|| format!("parsing {}", data.display()))?;
            print!("{}", mcpfix_template::render_file(&template, &ctx)?);
        }
    }
    Ok(())
}

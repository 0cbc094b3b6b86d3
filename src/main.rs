//! fipctl - classify resource identifiers and manage floating IPs
//!
//! Workflow commands run against the JSON inventory named in the config
//! and write it back after every command.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use floating_ip_substrate::activations::floating_ips::{
    FloatingIpEvent, FloatingIps, MemoryBackend, TableAction, FLOATING_IPS_TABLE,
};
use floating_ip_substrate::builder::{build_floating_ips, persist_inventory};
use floating_ip_substrate::config::CONFIG_ENV;
use floating_ip_substrate::{get_int_or_uuid, FloatingIpConfig};
use futures::{Stream, StreamExt};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fipctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify identifiers as integer or UUID
    Classify {
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Show the floating IPs and targets offered for association
    Choices,

    /// Associate a floating IP with an instance
    Associate {
        #[arg(long)]
        ip: String,

        #[arg(long)]
        instance: String,

        /// Relative URL to redirect to afterwards
        #[arg(long)]
        next: Option<String>,

        /// Redirect to the configured instances page afterwards
        #[arg(long, conflicts_with = "next")]
        to_instances: bool,
    },

    /// Disassociate a floating IP from its instance
    Disassociate { ip: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = FloatingIpConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;
    init_tracing(&config.log_filter);

    match cli.command {
        Commands::Classify { values } => Ok(classify(&values)),
        Commands::Choices => {
            let floating_ips = build_floating_ips(&config).await?;
            Ok(print_events(floating_ips.associate_choices()).await)
        }
        Commands::Associate { ip, instance, next, to_instances } => {
            let floating_ips = build_floating_ips(&config).await?;
            let next = if to_instances { Some(config.instances_url.clone()) } else { next };
            let fields = HashMap::from([
                ("ip_id".to_string(), ip),
                ("instance_id".to_string(), instance),
            ]);
            let code = print_events(floating_ips.associate(fields, next)).await;
            save(&config, &floating_ips).await?;
            Ok(code)
        }
        Commands::Disassociate { ip } => {
            let floating_ips = build_floating_ips(&config).await?;
            let object_id = get_int_or_uuid(ip)?;
            let action = TableAction {
                table: FLOATING_IPS_TABLE.to_string(),
                action: "disassociate".to_string(),
                object_id,
            };
            let code = print_events(floating_ips.disassociate(action.to_string())).await;
            save(&config, &floating_ips).await?;
            Ok(code)
        }
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn classify(values: &[String]) -> ExitCode {
    let mut code = ExitCode::SUCCESS;
    for value in values {
        match get_int_or_uuid(value.as_str()) {
            Ok(id) => {
                let kind = if id.is_uuid() { "uuid" } else { "integer" };
                println!("{}", serde_json::json!({ "input": value, "kind": kind, "id": id }));
            }
            Err(e) => {
                println!("{}", serde_json::json!({ "input": value, "error": e.to_string() }));
                code = ExitCode::FAILURE;
            }
        }
    }
    code
}

/// Print each event as a JSON line; fail if any error event was seen
async fn print_events(events: impl Stream<Item = FloatingIpEvent>) -> ExitCode {
    let mut code = ExitCode::SUCCESS;
    let mut events = Box::pin(events);
    while let Some(event) = events.next().await {
        if matches!(event, FloatingIpEvent::Error { .. }) {
            code = ExitCode::FAILURE;
        }
        match serde_json::to_string(&event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!(error = %e, "failed to serialize event"),
        }
    }
    code
}

async fn save(config: &FloatingIpConfig, floating_ips: &FloatingIps<MemoryBackend>) -> Result<()> {
    persist_inventory(config, floating_ips)
        .await
        .with_context(|| format!("failed to save {}", config.inventory_path.display()))
}

//! labwatchctl - CLI client for the labwatch daemon

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use labwatchctl::{default_url, display, LabwatchClient};
use owo_colors::OwoColorize;

#[derive(Parser)]
#[command(name = "labwatchctl")]
#[command(about = "Homelab telemetry at a glance", long_about = None)]
#[command(version = labwatch_common::VERSION)]
struct Cli {
    /// Daemon address
    #[arg(long, global = true, env = "LABWATCH_URL", default_value_t = default_url())]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the metrics snapshot and daemon health
    Status {
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show host telemetry pushed by the homelab agent
    Host,

    /// Unleash the chaos monkey
    Chaos,

    /// Toggle a Home Assistant entity, e.g. light.server_rack
    Toggle { entity_id: String },

    /// Forward an action to the homelab webhook
    Exec { action: String },

    /// Push a telemetry object, e.g. '{"cpuTemp": 52.1}'
    Push {
        json: String,

        /// Ingestion shared secret
        #[arg(long, env = "HOMELAB_INGESTION_KEY")]
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = LabwatchClient::new(&cli.url)?;

    match cli.command {
        Commands::Status { json } => {
            if json {
                let raw = client.snapshot_raw().await?;
                println!("{}", serde_json::to_string_pretty(&raw)?);
                return Ok(());
            }
            let snapshot = client.snapshot().await?;
            print!("{}", display::render_snapshot(&snapshot));
            match client.health().await {
                Ok(health) => print!("{}", display::render_health(&health)),
                Err(e) => eprintln!("  {} {}", "health unavailable:".yellow(), e),
            }
        }
        Commands::Host => {
            let host = client.host().await?;
            print!("{}", display::render_host(&host));
        }
        Commands::Chaos => {
            let ack = client.chaos().await?;
            println!("{} {}", "✓".green(), ack.message);
        }
        Commands::Toggle { entity_id } => {
            let ack = client.toggle(&entity_id).await?;
            println!("{} {}", "✓".green(), ack.message);
        }
        Commands::Exec { action } => {
            client.exec(&action).await?;
            println!("{} {} forwarded", "✓".green(), action);
        }
        Commands::Push { json, key } => {
            let telemetry: serde_json::Value =
                serde_json::from_str(&json).context("Telemetry is not valid JSON")?;
            if !telemetry.is_object() {
                return Err(anyhow!("Telemetry must be a JSON object"));
            }
            let ack = client.push(&telemetry, &key).await?;
            println!("{} stored {}", "✓".green(), ack.telemetry);
        }
    }

    Ok(())
}

//! Queueline CLI - Front-desk commands against a running daemon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9630";

#[derive(Parser)]
#[command(name = "queueline")]
#[command(about = "Queueline walk-in queue CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "QUEUELINE_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a walk-in customer to the end of a queue
    Join {
        /// Business ID
        business_id: String,

        /// Customer name
        name: String,

        /// Contact phone number
        #[arg(short, long)]
        phone: Option<String>,
    },

    /// Start serving a waiting customer
    Serve { entry_id: String },

    /// Mark the customer being served as done
    Done { entry_id: String },

    /// Cancel a waiting or serving customer
    Cancel { entry_id: String },

    /// Delete an entry outright
    Remove { entry_id: String },

    /// Show the live queue of a business
    List {
        /// Business ID
        business_id: String,

        /// Include served and cancelled entries
        #[arg(long)]
        history: bool,
    },

    /// Show queue statistics for a business
    Stats { business_id: String },

    /// Read or change the average service time
    Settings {
        /// New average service time in minutes
        #[arg(long)]
        average_service_minutes: Option<u32>,
    },
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize)]
struct EntryView {
    id: String,
    customer_name: String,
    phone_number: Option<String>,
    position: u32,
    status: String,
    expected_wait_time_minutes: u32,
}

#[derive(Deserialize)]
struct SnapshotView {
    version: u64,
    average_service_minutes: u32,
    entries: Vec<EntryView>,
    #[serde(default)]
    history: Vec<EntryView>,
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "#")]
    position: String,
    id: String,
    name: String,
    phone: String,
    status: String,
    #[tabled(rename = "wait (min)")]
    wait: String,
}

impl From<EntryView> for EntryRow {
    fn from(e: EntryView) -> Self {
        let terminal = e.position == 0;
        Self {
            position: if terminal { "-".to_string() } else { e.position.to_string() },
            id: e.id,
            name: e.customer_name,
            phone: e.phone_number.unwrap_or_default(),
            status: e.status,
            wait: if terminal {
                "-".to_string()
            } else {
                e.expected_wait_time_minutes.to_string()
            },
        }
    }
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    into_result(response)
}

/// Turn a JSON-RPC error object into a command failure
fn into_result(response: JsonRpcResponse) -> Result<serde_json::Value> {
    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

async fn advance(url: &str, entry_id: &str, status: &str) -> Result<EntryView> {
    let params = json!({ "entry_id": entry_id, "status": status });
    let result = call_rpc(url, "queue.advance.v1", params).await?;
    Ok(serde_json::from_value(result)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Join {
            business_id,
            name,
            phone,
        } => {
            let params = json!({
                "business_id": business_id,
                "customer_name": name,
                "phone_number": phone,
            });

            let result = call_rpc(&cli.rpc_url, "queue.join.v1", params).await?;
            let entry: EntryView = serde_json::from_value(result)?;

            println!("{}", "✓ Customer joined the queue".green().bold());
            println!();
            println!("{}", Table::new(vec![EntryRow::from(entry)]));
        }

        Commands::Serve { entry_id } => {
            let entry = advance(&cli.rpc_url, &entry_id, "serving").await?;
            println!(
                "{}",
                format!("✓ Now serving {} ({})", entry.customer_name, entry.id)
                    .green()
                    .bold()
            );
        }

        Commands::Done { entry_id } => {
            let entry = advance(&cli.rpc_url, &entry_id, "served").await?;
            println!(
                "{}",
                format!("✓ {} served", entry.customer_name).green().bold()
            );
        }

        Commands::Cancel { entry_id } => {
            let entry = advance(&cli.rpc_url, &entry_id, "cancelled").await?;
            println!(
                "{}",
                format!("✓ {} cancelled", entry.customer_name).green().bold()
            );
        }

        Commands::Remove { entry_id } => {
            let params = json!({ "entry_id": entry_id });
            call_rpc(&cli.rpc_url, "queue.remove.v1", params).await?;

            println!("{}", format!("✓ Entry {} removed", entry_id).green().bold());
        }

        Commands::List {
            business_id,
            history,
        } => {
            let params = json!({
                "business_id": business_id,
                "include_history": history,
            });
            let result = call_rpc(&cli.rpc_url, "queue.snapshot.v1", params).await?;
            let snapshot: SnapshotView = serde_json::from_value(result)?;

            println!(
                "{}",
                format!("Queue for {} (v{})", business_id, snapshot.version)
                    .cyan()
                    .bold()
            );
            println!(
                "  {} {} min",
                "Average service:".bold(),
                snapshot.average_service_minutes
            );
            println!();

            if snapshot.entries.is_empty() {
                println!("{}", "Nobody is waiting".yellow());
            } else {
                let rows: Vec<EntryRow> = snapshot.entries.into_iter().map(Into::into).collect();
                println!("{}", Table::new(rows));
            }

            if history && !snapshot.history.is_empty() {
                println!();
                println!("{}", "History".cyan().bold());
                let rows: Vec<EntryRow> = snapshot.history.into_iter().map(Into::into).collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Stats { business_id } => {
            let params = json!({ "business_id": business_id });
            let stats = call_rpc(&cli.rpc_url, "queue.stats.v1", params).await?;

            println!("{}", format!("Queue Stats: {}", business_id).cyan().bold());
            println!();
            println!("  {} {}", "Waiting:".bold(), stats["waiting"]);
            let serving = stats["serving_entry_id"].as_str().unwrap_or("-");
            println!("  {} {}", "Serving:".bold(), serving);
            println!("  {} {}", "Served:".bold(), stats["served"]);
            println!("  {} {}", "Cancelled:".bold(), stats["cancelled"]);
            println!();
            let average = stats["average_wait_minutes"].as_f64().unwrap_or(0.0);
            println!("  {} {:.1} min", "Average wait:".bold(), average);
            println!(
                "  {} {} min",
                "Longest wait:".bold(),
                stats["longest_wait_minutes"]
            );
        }

        Commands::Settings {
            average_service_minutes,
        } => {
            let params = match average_service_minutes {
                Some(minutes) => json!({ "average_service_minutes": minutes }),
                None => json!({}),
            };
            let result = call_rpc(&cli.rpc_url, "admin.settings.v1", params).await?;
            if average_service_minutes.is_some() {
                println!("{}", "✓ Settings updated".green().bold());
            }
            println!(
                "  {} {} min",
                "Average service:".bold(),
                result["average_service_minutes"]
            );
        }
    }

    Ok(())
}

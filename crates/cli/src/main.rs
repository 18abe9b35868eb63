//! Semantica CLI - Command-line interface for Semantica Task Engine

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9527";

#[derive(Parser)]
#[command(name = "semantica")]
#[command(about = "Semantica Task Engine CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "QUEUE_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert a new job
    Insert {
        /// Registered worker name
        #[arg(short, long)]
        worker: String,

        /// Queue name (defaults to the worker's own default, then "default")
        #[arg(short, long)]
        queue: Option<String>,

        /// Priority (lower runs first)
        #[arg(short, long)]
        priority: Option<i32>,

        /// Max attempts before the job is discarded
        #[arg(long)]
        max_attempts: Option<i32>,

        /// RFC 3339 timestamp; omit to run as soon as possible
        #[arg(long)]
        scheduled_at: Option<String>,

        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Dedup window in seconds; omit to skip the uniqueness check
        #[arg(long)]
        unique_period_secs: Option<i64>,

        /// Job arguments as a JSON string
        args: String,
    },

    /// Fetch a single job by id
    Get {
        /// Job id
        id: i64,
    },

    /// Cancel jobs matching a queue and/or worker filter
    Cancel {
        #[arg(short, long)]
        queue: Option<String>,

        #[arg(short, long)]
        worker: Option<String>,
    },

    /// Show per-queue dispatcher status
    Status,

    /// Run rescue + prune out of band of their timers
    Maintenance {
        /// Consider an `executing` job stuck after this many seconds
        #[arg(long, default_value = "300")]
        rescue_after_secs: u64,

        /// Prune finished jobs older than this many seconds
        #[arg(long, default_value = "604800")]
        max_age_secs: u64,
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

#[derive(Deserialize, Tabled)]
struct JobRow {
    id: i64,
    state: String,
    queue: String,
    worker: String,
    attempt: i32,
    priority: i32,
}

#[derive(Deserialize, Tabled)]
struct QueueStatusRow {
    name: String,
    state: String,
    limit: usize,
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
        .context("failed to connect to daemon")?
        .json()
        .await
        .context("failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("no result in response"))
}

fn job_row(job: &serde_json::Value) -> Option<JobRow> {
    serde_json::from_value(job.clone()).ok()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Insert {
            worker,
            queue,
            priority,
            max_attempts,
            scheduled_at,
            tags,
            unique_period_secs,
            args,
        } => {
            let args_json: serde_json::Value =
                serde_json::from_str(&args).context("invalid JSON args")?;

            let params = json!({
                "worker": worker,
                "args": args_json,
                "queue": queue,
                "priority": priority,
                "max_attempts": max_attempts,
                "scheduled_at": scheduled_at,
                "tags": tags,
                "unique_period_secs": unique_period_secs,
            });

            let result = call_rpc(&cli.rpc_url, "job.insert.v1", params).await?;
            let conflict = result["conflict"].as_bool().unwrap_or(false);

            if conflict {
                println!("{}", "• Matched an existing unique job".yellow().bold());
            } else {
                println!("{}", "✓ Job inserted".green().bold());
            }
            println!();

            if let Some(row) = job_row(&result["job"]) {
                println!("{}", Table::new(vec![row]));
            }
        }

        Commands::Get { id } => {
            let result = call_rpc(&cli.rpc_url, "job.get.v1", json!({ "id": id })).await?;
            match result["job"].as_object() {
                Some(_) => {
                    if let Some(row) = job_row(&result["job"]) {
                        println!("{}", Table::new(vec![row]));
                    }
                }
                None => println!("{}", format!("No job with id {}", id).yellow()),
            }
        }

        Commands::Cancel { queue, worker } => {
            let params = json!({ "queue": queue, "worker": worker });
            let result = call_rpc(&cli.rpc_url, "job.cancel.v1", params).await?;
            let cancelled = result["cancelled"].as_u64().unwrap_or(0);
            println!(
                "{}",
                format!("✓ Cancelled {} job(s)", cancelled).green().bold()
            );
        }

        Commands::Status => {
            println!("{}", "System Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!("  {} {}", "Node:".bold(), stats["node_id"]);
                    println!(
                        "  {} {} seconds",
                        "Uptime:".bold(),
                        stats["uptime_seconds"]
                    );
                    println!();

                    let rows: Vec<QueueStatusRow> = stats["queues"]
                        .as_array()
                        .cloned()
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(|q| serde_json::from_value(q).ok())
                        .collect();
                    println!("{}", Table::new(rows));
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }

        Commands::Maintenance {
            rescue_after_secs,
            max_age_secs,
        } => {
            println!("{}", "Running maintenance...".cyan().bold());
            println!();

            let params = json!({
                "rescue_after_secs": rescue_after_secs,
                "max_age_secs": max_age_secs,
            });

            match call_rpc(&cli.rpc_url, "admin.maintenance.v1", params).await {
                Ok(result) => {
                    println!(
                        "  {} {} job(s) rescued",
                        "✓".green(),
                        result["rescued"]
                    );
                    println!("  {} {} job(s) pruned", "✓".green(), result["pruned"]);
                }
                Err(e) => {
                    println!("  {} Maintenance failed: {}", "✗".red(), e);
                }
            }
        }
    }

    Ok(())
}

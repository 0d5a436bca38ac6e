//! Conductor CLI - operator commands against the daemon's JSON-RPC endpoint

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9527";

#[derive(Parser)]
#[command(name = "conductorctl")]
#[command(about = "Conductor job orchestrator CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "CONDUCTOR_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a new job
    Enqueue {
        /// Job type (export-run, notification-send, scoring-run, ...)
        #[arg(short, long)]
        job_type: String,

        /// Payload as JSON string
        #[arg(long)]
        payload: String,

        /// Delay before the job becomes visible (ms)
        #[arg(short, long, default_value = "0")]
        delay_ms: i64,

        /// Priority (higher = dequeued first)
        #[arg(short, long, default_value = "0", allow_hyphen_values = true)]
        priority: i32,

        /// Override the default max attempts
        #[arg(long)]
        max_attempts: Option<i32>,
    },

    /// Show one job
    Job {
        /// Job ID
        job_id: String,
    },

    /// Show queue depths
    Health,

    /// Remove finished jobs outside the retention policy
    Prune,
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct EnqueueResult {
    job_id: String,
    queue: String,
    job_type: String,
    durable: bool,
}

#[derive(Deserialize)]
struct QueueRow {
    name: String,
    concurrency: usize,
    pending: u64,
    stats: QueueCounts,
}

#[derive(Deserialize)]
struct QueueCounts {
    waiting: u64,
    delayed: u64,
    active: u64,
    completed: u64,
    failed: u64,
}

#[derive(Deserialize)]
struct HealthResult {
    backend: String,
    durable: bool,
    queues: Vec<QueueRow>,
}

#[derive(Tabled)]
struct QueueLine {
    queue: String,
    concurrency: usize,
    pending: u64,
    waiting: u64,
    delayed: u64,
    active: u64,
    completed: u64,
    failed: u64,
}

impl From<QueueRow> for QueueLine {
    fn from(row: QueueRow) -> Self {
        Self {
            queue: row.name,
            concurrency: row.concurrency,
            pending: row.pending,
            waiting: row.stats.waiting,
            delayed: row.stats.delayed,
            active: row.stats.active,
            completed: row.stats.completed,
            failed: row.stats.failed,
        }
    }
}

fn into_result(response: JsonRpcResponse) -> Result<serde_json::Value> {
    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0",
        method,
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

fn enqueue_params(
    job_type: &str,
    payload: &str,
    delay_ms: i64,
    priority: i32,
    max_attempts: Option<i32>,
) -> Result<serde_json::Value> {
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("Invalid JSON payload")?;

    let mut params = json!({
        "job_type": job_type,
        "payload": payload,
        "delay_ms": delay_ms,
        "priority": priority,
    });
    if let Some(max_attempts) = max_attempts {
        params["max_attempts"] = json!(max_attempts);
    }
    Ok(params)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Enqueue {
            job_type,
            payload,
            delay_ms,
            priority,
            max_attempts,
        } => {
            let params = enqueue_params(&job_type, &payload, delay_ms, priority, max_attempts)?;
            let result = call_rpc(&cli.rpc_url, "jobs.enqueue.v1", params).await?;
            let enqueued: EnqueueResult = serde_json::from_value(result)?;

            if enqueued.durable {
                println!("{}", "✓ Job enqueued".green().bold());
            } else {
                println!(
                    "{}",
                    "! Job accepted but queues are disabled: it will not run"
                        .yellow()
                        .bold()
                );
            }
            println!();
            println!("{}", Table::new(vec![enqueued]));
        }

        Commands::Job { job_id } => {
            let job = call_rpc(&cli.rpc_url, "jobs.get.v1", json!({ "job_id": job_id })).await?;

            let state = job["state"].as_str().unwrap_or("?");
            let state = match state {
                "COMPLETED" => state.green(),
                "FAILED" => state.red(),
                "ACTIVE" => state.cyan(),
                _ => state.normal(),
            };
            println!("{} {}", "Job".bold(), job_id);
            println!("  {} {}", "Type:".bold(), job["job_type"]);
            println!("  {} {}", "Queue:".bold(), job["queue"]);
            println!("  {} {}", "State:".bold(), state);
            println!(
                "  {} {}/{}",
                "Attempts:".bold(),
                job["attempts"],
                job["max_attempts"]
            );
            if let Some(err) = job["last_error"].as_str() {
                println!("  {} {}", "Last error:".bold(), err.red());
            }
            if !job["result"].is_null() {
                println!("  {} {}", "Result:".bold(), job["result"]);
            }
        }

        Commands::Health => {
            println!("{}", "Queue Health".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.health.v1", json!({})).await {
                Ok(result) => {
                    let health: HealthResult = serde_json::from_value(result)?;
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    let mode = if health.durable {
                        health.backend.green()
                    } else {
                        format!("{} (jobs are not executed)", health.backend).yellow()
                    };
                    println!("  {} {}", "Backend:".bold(), mode);
                    println!();

                    let lines: Vec<QueueLine> =
                        health.queues.into_iter().map(QueueLine::from).collect();
                    println!("{}", Table::new(lines));
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }

        Commands::Prune => {
            let result = call_rpc(&cli.rpc_url, "admin.prune.v1", json!({})).await?;
            println!("{}", "✓ Prune completed".green().bold());
            println!("  {} completed jobs removed", result["completed_removed"]);
            println!("  {} failed jobs removed", result["failed_removed"]);
        }
    }

    Ok(())
}

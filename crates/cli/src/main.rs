//! backyctl - command-line client for the backy2 webhook

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use tabled::{Table, Tabled};

const DEFAULT_URL: &str = "http://127.0.0.1:7070";

#[derive(Parser)]
#[command(name = "backyctl")]
#[command(about = "backy2 webhook CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Webhook base URL
    #[arg(long, env = "BACKY_URL", default_value = DEFAULT_URL)]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a backup
    Create,

    /// List backups known to backy2
    List {
        /// Print backy2's own listing instead of a table
        #[arg(long)]
        raw: bool,
    },

    /// Show one backup
    Get {
        /// Backup id returned by create
        id: String,
    },

    /// Delete a backup, or cancel it while it is running
    Delete {
        /// Backup id returned by create
        id: String,
    },
}

#[derive(Deserialize, Tabled)]
struct BackupView {
    id: String,
    status: String,
    #[serde(rename = "sizeMB")]
    #[tabled(rename = "size (MB)", display_with = "display_size")]
    size_mb: f64,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct BackupRow {
    #[tabled(display_with = "display_id")]
    id: Option<String>,
    #[serde(rename = "toolId")]
    #[tabled(rename = "backy2 uid")]
    tool_id: String,
    name: String,
    date: String,
    status: String,
    #[serde(rename = "sizeMB")]
    #[tabled(rename = "size (MB)", display_with = "display_size")]
    size_mb: f64,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

fn display_size(size_mb: &f64) -> String {
    if *size_mb < 0.0 {
        "-".to_string()
    } else {
        format!("{:.2}", size_mb)
    }
}

fn display_id(id: &Option<String>) -> String {
    id.clone().unwrap_or_else(|| "-".to_string())
}

fn colored_status(status: &str) -> String {
    match status {
        "available" => status.green().bold().to_string(),
        "running" => status.yellow().bold().to_string(),
        "deleted" => status.cyan().bold().to_string(),
        _ => status.red().bold().to_string(),
    }
}

/// Decode a backup body. A failed create still answers with a backup body
/// (HTTP 500), so that is tried before the error shape.
async fn read_backup(response: Response) -> Result<BackupView> {
    let status = response.status();
    let body = response.text().await.context("Failed to read response")?;

    if let Ok(backup) = serde_json::from_str::<BackupView>(&body) {
        return Ok(backup);
    }
    Err(http_error(status, &body))
}

fn http_error(status: StatusCode, body: &str) -> anyhow::Error {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) => anyhow::anyhow!("{} ({}): {}", status, err.error, err.message),
        Err(_) => anyhow::anyhow!("{}: {}", status, body),
    }
}

fn print_backup(headline: &str, backup: BackupView) {
    println!("{}", headline.bold());
    println!("  status: {}", colored_status(&backup.status));
    println!();
    println!("{}", Table::new(vec![backup]));
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Create => {
            let response = client
                .post(format!("{}/backups", base))
                .send()
                .await
                .context("Failed to connect to webhook")?;
            let backup = read_backup(response).await?;

            let headline = match backup.status.as_str() {
                "available" => "✓ Backup created".green(),
                "running" => "… Backup started, poll with `backyctl get`".yellow(),
                _ => "✗ Backup failed".red(),
            };
            print_backup(&headline.to_string(), backup);
        }

        Commands::List { raw } => {
            let response = client
                .get(format!("{}/backups", base))
                .query(&[("raw", raw)])
                .send()
                .await
                .context("Failed to connect to webhook")?;

            let status = response.status();
            let body = response.text().await.context("Failed to read response")?;
            if !status.is_success() {
                return Err(http_error(status, &body));
            }

            if raw {
                print!("{}", body);
                return Ok(());
            }

            let rows: Vec<BackupRow> =
                serde_json::from_str(&body).context("Failed to parse backup list")?;
            if rows.is_empty() {
                println!("{}", "No backups".yellow());
            } else {
                println!("{}", Table::new(rows));
            }
        }

        Commands::Get { id } => {
            let response = client
                .get(format!("{}/backups/{}", base, id))
                .send()
                .await
                .context("Failed to connect to webhook")?;
            let backup = read_backup(response).await?;
            print_backup(&format!("Backup {}", id), backup);
        }

        Commands::Delete { id } => {
            let response = client
                .delete(format!("{}/backups/{}", base, id))
                .send()
                .await
                .context("Failed to connect to webhook")?;
            let backup = read_backup(response).await?;
            let headline = format!("✓ Backup {} {}", id, backup.status);
            print_backup(&headline.green().to_string(), backup);
        }
    }

    Ok(())
}

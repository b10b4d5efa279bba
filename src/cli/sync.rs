//! CLI definitions for the EspoCRM sync command.

use clap::{Args, ValueEnum};
use uuid::Uuid;

/// Synchronize data with EspoCRM
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Type of synchronization to run
    #[arg(value_enum, default_value = "full")]
    pub kind: SyncKind,

    /// Client id for a targeted outbound sync
    #[arg(long)]
    pub client_id: Option<Uuid>,

    /// EspoCRM Account id for a targeted inbound sync
    #[arg(long)]
    pub espocrm_id: Option<String>,

    /// Schedule through the background worker instead of running inline
    #[arg(long = "async")]
    pub async_mode: bool,

    /// Only test the EspoCRM connection
    #[arg(long)]
    pub test_connection: bool,

    /// Only print synchronization statistics
    #[arg(long)]
    pub stats: bool,

    /// Database URL (can also be set via DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Output format (json, text)
    #[arg(long, default_value = "text")]
    pub format: String,
}

/// Available synchronization flows.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncKind {
    /// Full bidirectional round
    Full,
    /// Push one client to EspoCRM
    ClientToEspocrm,
    /// Pull one client from EspoCRM
    EspocrmToClient,
}

/// Print a message, honoring the output format.
pub fn output(format: &str, message: &str, json_value: Option<serde_json::Value>) {
    match format {
        "json" => {
            if let Some(value) = json_value {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&value).unwrap_or_default()
                );
            } else {
                println!(r#"{{"message": "{}"}}"#, message);
            }
        }
        _ => {
            println!("{}", message);
        }
    }
}

/// Print an error message
pub fn error(format: &str, message: &str) {
    match format {
        "json" => {
            eprintln!(r#"{{"error": "{}"}}"#, message);
        }
        _ => {
            // Red error block, matching conventional CLI output
            eprintln!("\x1b[31mError: {}\x1b[0m", message);
        }
    }
}

/// Print a table row
pub fn table_row(cells: &[&str]) {
    println!("{}", cells.join("\t"));
}

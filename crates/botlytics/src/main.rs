//! bly: thin CLI over botlytics-core.
//!
//! Key inspection (`decode`, `mint`, `bounds`) plus a `track` command that
//! runs one interaction against a local SQLite store — useful for poking at
//! windowing behavior without a chatbot in front.

use anyhow::{Context, bail};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};

use botlytics_core::analytics::{AnalyticsStore, InteractionRequest};
use botlytics_core::config::AnalyticsConfig;
use botlytics_core::logging::{LogConfig, init_logging};
use botlytics_core::row_key::{self, KeyFactory};
use botlytics_core::sqlite_store::SqliteStore;

#[derive(Parser)]
#[command(name = "bly", version, about = "Chatbot telemetry key and session tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recover the timestamp encoded in a row key or session id
    Decode {
        /// The key to decode
        key: String,
    },
    /// Mint fresh row keys or session ids
    Mint {
        /// How many keys to mint
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Mint session ids instead of row keys
        #[arg(long)]
        session: bool,
        /// Timestamp in milliseconds (wall clock when omitted)
        #[arg(long)]
        timestamp: Option<u64>,
    },
    /// Print the smallest and largest possible key for a millisecond
    Bounds {
        /// Timestamp in milliseconds
        timestamp: u64,
    },
    /// Run one interaction against a local SQLite store
    Track {
        /// Database file path
        #[arg(long, default_value = "botlytics.db")]
        db: String,
        /// Page (bot) identifier
        #[arg(long)]
        page: String,
        /// Sender identifier
        #[arg(long)]
        sender: String,
        /// Event timestamp in milliseconds (wall clock when omitted)
        #[arg(long)]
        timestamp: Option<u64>,
        /// Mark the event as system-generated
        #[arg(long)]
        non_interactive: bool,
        /// Session idle window in milliseconds
        #[arg(long)]
        window_ms: Option<u64>,
    },
}

fn format_ms(ms: u64) -> String {
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .map_or_else(|| "out of range".to_string(), |dt| dt.to_rfc3339())
}

fn wall_clock_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = init_logging(&LogConfig::default());
    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { key } => {
            let ms = row_key::decode_timestamp(&key).context("key does not decode")?;
            println!("{ms} ({})", format_ms(ms));
        }
        Commands::Mint {
            count,
            session,
            timestamp,
        } => {
            if count == 0 {
                bail!("--count must be at least 1");
            }
            let ts = timestamp.unwrap_or_else(wall_clock_ms);
            let mut factory = KeyFactory::new();
            for _ in 0..count {
                let key = if session {
                    factory.next_session_id(ts)
                } else {
                    factory.next_key(ts)
                };
                println!("{key}");
            }
        }
        Commands::Bounds { timestamp } => {
            println!("lower {}", row_key::lower_bound(timestamp));
            println!("upper {}", row_key::upper_bound(timestamp));
        }
        Commands::Track {
            db,
            page,
            sender,
            timestamp,
            non_interactive,
            window_ms,
        } => {
            let store = SqliteStore::open(&db)
                .map_err(|e| anyhow::anyhow!("failed to open {db}: {e}"))?;
            let mut config = AnalyticsConfig::default();
            if let Some(window) = window_ms {
                config.session_duration_ms = window;
            }
            let analytics = AnalyticsStore::with_config(store, &config);
            let request = InteractionRequest {
                page_id: page,
                sender_id: sender,
                timestamp_ms: timestamp,
                non_interactive,
                ..InteractionRequest::default()
            };
            let handle = analytics.track_interaction(&request).await?;
            println!(
                "{}",
                serde_json::json!({
                    "sessionId": handle.session_id,
                    "conversationId": handle.conversation_id,
                    "sessionStartedAt": row_key::decode_timestamp(&handle.session_id).ok(),
                })
            );
        }
    }
    Ok(())
}

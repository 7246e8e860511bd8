//! mnemon CLI
//!
//! Thin command-line transport over the memory service. No domain logic
//! lives here; every command maps onto one service operation and prints
//! JSON.

use std::collections::HashMap;

use clap::{Parser, Subcommand};
use serde_json::Value;

use mnemon::config::Settings;
use mnemon::error::Result;
use mnemon::service::MemoryService;
use mnemon::types::{DetailLevel, ListRequest, SearchMode, SearchRequest};

#[derive(Parser)]
#[command(name = "mnemon")]
#[command(about = "Schema-driven memory store for AI agents")]
#[command(version)]
struct Cli {
    /// Schema registry path
    #[arg(long, env = "MNEMON_SCHEMA_PATH")]
    schema: Option<String>,

    /// User scope for every operation
    #[arg(short, long, env = "MNEMON_USER_ID", default_value = "default")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a memory of any schema type from a JSON payload
    Add {
        /// Entity type
        r#type: String,
        /// JSON payload, e.g. '{"statement": "..."}'
        payload: String,
        /// Tags (comma-separated)
        #[arg(short = 'T', long)]
        tags: Option<String>,
    },
    /// Create a note (anchor = statement)
    Note {
        text: String,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short = 'T', long)]
        tags: Option<String>,
    },
    /// Create a task (anchor = statement)
    Task {
        text: String,
        /// Lifecycle status
        #[arg(short, long)]
        status: Option<String>,
        #[arg(short = 'T', long)]
        tags: Option<String>,
    },
    /// Get a memory by HRID
    Get {
        hrid: String,
    },
    /// Search memories
    Search {
        /// Free-text query
        query: Option<String>,
        /// Restrict to one type
        #[arg(short, long)]
        r#type: Option<String>,
        /// Only records updated within N days
        #[arg(short, long)]
        days: Option<i64>,
        /// Force mode: vector, graph, or hybrid
        #[arg(short, long)]
        mode: Option<String>,
        /// Maximum results
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Include payload fields, not just anchors
        #[arg(long)]
        details: bool,
    },
    /// List memories, newest first
    List {
        #[arg(short, long)]
        r#type: Option<String>,
        #[arg(short, long)]
        days: Option<i64>,
        #[arg(short, long, default_value = "20")]
        limit: usize,
        #[arg(short, long, default_value = "0")]
        offset: usize,
        /// Expand immediate neighbors
        #[arg(long)]
        neighbors: bool,
    },
    /// Update a memory with a JSON patch
    Update {
        hrid: String,
        /// JSON patch, e.g. '{"status": "done"}'
        patch: String,
    },
    /// Delete a memory
    Delete {
        hrid: String,
    },
    /// Add a relationship between two memories
    Relate {
        from_hrid: String,
        predicate: String,
        to_hrid: String,
    },
    /// Remove a relationship
    Unrelate {
        from_hrid: String,
        predicate: String,
        to_hrid: String,
    },
    /// Show schema, store health, and counts
    Info,
}

fn parse_tags(tags: Option<String>) -> Option<Vec<String>> {
    tags.map(|raw| raw.split(',').map(|t| t.trim().to_string()).collect())
}

fn parse_payload(raw: &str) -> Result<HashMap<String, Value>> {
    let value: Value = serde_json::from_str(raw)?;
    value
        .as_object()
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .ok_or_else(|| mnemon::MnemonError::InvalidInput("payload must be a JSON object".to_string()))
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => eprintln!("failed to render output: {e}"),
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::from_env()?;
    if let Some(schema) = cli.schema {
        settings.schema_path = schema;
    }
    let service = MemoryService::open(&settings)?;
    let user = cli.user.as_str();

    match cli.command {
        Commands::Add { r#type, payload, tags } => {
            let memory = service.add(&r#type, parse_payload(&payload)?, user, parse_tags(tags))?;
            print_json(&memory);
        }
        Commands::Note { text, title, tags } => {
            let memory = service.add_note(&text, user, title.as_deref(), parse_tags(tags))?;
            print_json(&memory);
        }
        Commands::Task { text, status, tags } => {
            let memory = service.add_task(&text, user, status.as_deref(), parse_tags(tags))?;
            print_json(&memory);
        }
        Commands::Get { hrid } => {
            let memory = service.get(&hrid, user)?;
            print_json(&memory);
        }
        Commands::Search { query, r#type, days, mode, limit, details } => {
            let request = SearchRequest {
                query,
                limit: Some(limit),
                memory_type: r#type,
                modified_within_days: days,
                mode: mode.as_deref().map(str::parse::<SearchMode>).transpose()
                    .map_err(mnemon::MnemonError::InvalidInput)?,
                include_details: if details {
                    DetailLevel::SelfFields
                } else {
                    DetailLevel::AnchorOnly
                },
                ..SearchRequest::default()
            };
            let results = service.search(&request, user)?;
            print_json(&results);
        }
        Commands::List { r#type, days, limit, offset, neighbors } => {
            let request = ListRequest {
                memory_type: r#type,
                modified_within_days: days,
                limit: Some(limit),
                offset: Some(offset),
                expand_neighbors: neighbors,
                ..ListRequest::default()
            };
            let results = service.list(&request, user)?;
            print_json(&results);
        }
        Commands::Update { hrid, patch } => {
            let memory = service.update(&hrid, parse_payload(&patch)?, user)?;
            print_json(&memory);
        }
        Commands::Delete { hrid } => {
            service.delete(&hrid, user)?;
            println!("deleted {}", hrid.to_uppercase());
        }
        Commands::Relate { from_hrid, predicate, to_hrid } => {
            service.add_relationship(&from_hrid, &to_hrid, &predicate, None, None, user)?;
            println!("{} -[{}]-> {}", from_hrid.to_uppercase(), predicate.to_uppercase(), to_hrid.to_uppercase());
        }
        Commands::Unrelate { from_hrid, predicate, to_hrid } => {
            service.delete_relationship(&from_hrid, &to_hrid, &predicate, None, None, user)?;
            println!("removed {} -[{}]-> {}", from_hrid.to_uppercase(), predicate.to_uppercase(), to_hrid.to_uppercase());
        }
        Commands::Info => {
            print_json(&service.system_info());
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        let envelope = e.envelope("cli");
        eprintln!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_else(|_| e.to_string()));
        std::process::exit(1);
    }
}

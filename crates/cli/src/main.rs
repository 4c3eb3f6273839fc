//! restcache command-line client.
//!
//! Exercises the sync engine against a live REST service: reads go through
//! the local cache with background revalidation, writes go server-first.
//! Logging goes to stderr so record bodies on stdout stay pipeable.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use restcache_client::endpoint::{EndpointConfig, HttpEndpoint, Method};
use restcache_client::resources::Resource;
use restcache_core::record::Operation;
use restcache_core::{AppConfig, CacheEntry, SqliteStore};
use restcache_engine::{ReadSource, SyncEngine};

/// Etag-synchronized record cache over a REST service.
#[derive(Parser)]
#[command(name = "restcache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a record, cache-first with background revalidation
    Get {
        /// Resource name (feed, entry)
        resource: String,

        /// Record key
        key: String,

        /// Print only the immediately available value, skip waiting for
        /// the revalidation result
        #[arg(long)]
        no_wait: bool,
    },

    /// Update a record with an If-Match precondition
    Put {
        /// Resource name (feed, entry)
        resource: String,

        /// Record key
        key: String,

        /// JSON record body
        body: String,

        /// Etag the update is conditional on
        #[arg(short, long)]
        etag: Option<String>,
    },

    /// Create a record
    Create {
        /// Resource name (feed, entry)
        resource: String,

        /// JSON record body
        body: String,

        /// Record key, for resources that don't carry the key in the body
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Delete a record
    Delete {
        /// Resource name (feed, entry)
        resource: String,

        /// Record key
        key: String,
    },
}

/// The built-in resource table, GData-style feeds and their entries.
fn resolve(name: &str) -> Result<Resource> {
    match name {
        "feed" => Ok(Resource::new("feed", "feed")
            .operation(Operation::Read, Method::Get, "lists/{feed}", &["fields"])
            .operation(Operation::Update, Method::Put, "lists/{feed}", &[])
            .operation(Operation::Create, Method::Post, "lists", &[])
            .operation(Operation::Delete, Method::Delete, "lists/{feed}", &[])),
        "entry" => Ok(Resource::new("entry", "entry")
            .operation(Operation::Read, Method::Get, "entries/{entry}", &["fields"])
            .operation(Operation::Update, Method::Put, "entries/{entry}", &[])
            .operation(Operation::Create, Method::Post, "entries", &[])
            .operation(Operation::Delete, Method::Delete, "entries/{entry}", &[])),
        other => bail!("unknown resource: {other}"),
    }
}

fn print_entry(entry: &CacheEntry) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&entry.body)?);
    if let Some(etag) = &entry.etag {
        tracing::info!("etag: {etag}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;

    let store = SqliteStore::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open record store at {}", config.db_path.display()))?
        .with_key_field(&config.key_field);
    let remote = HttpEndpoint::new(EndpointConfig::from(&config))?;
    let engine = SyncEngine::new(store, remote);

    match cli.command {
        Commands::Get { resource, key, no_wait } => {
            let resource = resolve(&resource)?;
            let outcome = engine.read(&resource, &key).await?;
            match outcome.source {
                ReadSource::Cache => tracing::info!("served from cache"),
                ReadSource::Remote => tracing::info!("fetched from server"),
            }
            print_entry(&outcome.entry)?;

            if let Some(revalidation) = outcome.revalidation {
                if no_wait {
                    return Ok(());
                }
                match revalidation.wait().await? {
                    Some(refreshed) => {
                        tracing::info!("server had a newer version");
                        print_entry(&refreshed)?;
                    }
                    None => tracing::info!("cache is current"),
                }
            }
        }
        Commands::Put { resource, key, body, etag } => {
            let resource = resolve(&resource)?;
            let body = serde_json::from_str(&body).context("body is not valid JSON")?;
            let entry = engine.update(&resource, &key, body, etag.as_deref()).await?;
            print_entry(&entry)?;
        }
        Commands::Create { resource, body, key } => {
            let resource = resolve(&resource)?;
            let body = serde_json::from_str(&body).context("body is not valid JSON")?;
            let entry = engine.create(&resource, body, key.as_deref()).await?;
            tracing::info!("created with key {}", entry.key);
            print_entry(&entry)?;
        }
        Commands::Delete { resource, key } => {
            let resource = resolve(&resource)?;
            engine.delete(&resource, &key).await?;
            tracing::info!("deleted {key}");
        }
    }

    Ok(())
}

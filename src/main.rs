use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modeltree::api::{self, SecurityConfig};
use modeltree::config::{Config, DEFAULT_PORT};
use modeltree::model::render_tree;
use modeltree::remote::RemoteService;
use modeltree::store::SqliteStore;
use modeltree::{Endpoint, Format, LocationSet, ModelRegistry, StorageLocation};

#[derive(Parser)]
#[command(name = "mtree")]
#[command(about = "Inspect and synchronise policy-annotated model trees")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the reference storage service
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// SQLite database file (defaults to the platform data dir)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print a locally stored model as a tree
    Tree {
        purpose: String,

        /// Storage format (json, xml, plain, binary)
        #[arg(short, long)]
        format: Option<Format>,
    },
    /// Check that the remote service is reachable
    Health,
    /// Upload a locally stored model to the remote service
    Push {
        purpose: String,

        #[arg(short, long)]
        format: Option<Format>,

        /// Only send values whose effective location is listed
        #[arg(long, value_delimiter = ',')]
        only: Vec<StorageLocation>,
    },
    /// Download a model from the remote service into local storage
    Pull {
        purpose: String,

        #[arg(short, long)]
        format: Option<Format>,

        /// Only apply values whose effective location is listed
        #[arg(long, value_delimiter = ',')]
        only: Vec<StorageLocation>,
    },
}

/// Initialize tracing with output to stderr, or stdout for the server
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "modeltree=info,tower_http=info".into()),
    );

    if use_stderr {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(!matches!(cli.command, Commands::Serve { .. }));
    let config = Config::load();

    match cli.command {
        Commands::Serve { port, host, db } => {
            let store = match db.or_else(|| config.storage.database.clone()) {
                Some(path) => SqliteStore::open(path)?,
                None => SqliteStore::open_default()?,
            };
            store.migrate()?;

            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(serve(store, &host, port))?;
        }
        Commands::Tree { purpose, format } => {
            let format = format.unwrap_or(config.storage.format);
            let mut registry = ModelRegistry::with_storage(config.storage.open()?);
            registry.add_model(&purpose)?;
            registry.load_structure(&purpose, Endpoint::Local, format)?;
            let report =
                registry.load_data(&purpose, Endpoint::Local, format, LocationSet::empty());
            if let Err(e) = report {
                tracing::warn!("No values loaded: {}", e);
            }
            if let Some(tree) = registry.model(&purpose) {
                print!("{}", render_tree(tree));
            }
        }
        Commands::Health => {
            let remote = RemoteService::from_config(config.remote.clone());
            let base = config.remote.base_url();
            if remote.health().with_context(|| format!("Cannot reach {}", base))? {
                println!("{} is healthy", base);
            } else {
                anyhow::bail!("{} answered but is not healthy", base);
            }
        }
        Commands::Push {
            purpose,
            format,
            only,
        } => {
            let format = format.unwrap_or(config.storage.format);
            let filter: LocationSet = only.into_iter().collect();
            let mut registry = ModelRegistry::with_storage(config.storage.open()?)
                .with_remote(RemoteService::from_config(config.remote.clone()));
            registry.add_model(&purpose)?;

            registry.load_structure(&purpose, Endpoint::Local, format)?;
            let report = registry.load_data(&purpose, Endpoint::Local, format, LocationSet::empty())?;
            registry.save_structure(&purpose, Endpoint::Remote, format)?;
            registry.save_data(&purpose, Endpoint::Remote, format, filter)?;
            println!("Pushed {} ({} values)", purpose, report.applied);
        }
        Commands::Pull {
            purpose,
            format,
            only,
        } => {
            let format = format.unwrap_or(config.storage.format);
            let filter: LocationSet = only.into_iter().collect();
            let mut registry = ModelRegistry::with_storage(config.storage.open()?)
                .with_remote(RemoteService::from_config(config.remote.clone()));
            registry.add_model(&purpose)?;

            registry.load_structure(&purpose, Endpoint::Remote, format)?;
            let report = registry.load_data(&purpose, Endpoint::Remote, format, filter)?;
            registry.save_structure(&purpose, Endpoint::Local, format)?;
            registry.save_data(&purpose, Endpoint::Local, format, LocationSet::empty())?;
            println!(
                "Pulled {} ({} values, {} skipped)",
                purpose,
                report.applied,
                report.skipped.len()
            );
        }
    }

    Ok(())
}

async fn serve(store: SqliteStore, host: &str, port: u16) -> anyhow::Result<()> {
    let security = SecurityConfig::from_env();
    if !security.is_enabled() {
        tracing::warn!("Authentication disabled; set MODELTREE_API_KEY or MODELTREE_API_USER/MODELTREE_API_PASSWORD");
    }
    let app = api::create_router(store, security);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
    tracing::info!("modeltree service listening on http://{}:{}/api/v1", host, port);

    axum::serve(listener, app).await?;
    Ok(())
}

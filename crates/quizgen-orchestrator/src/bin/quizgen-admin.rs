//! quizgen-admin: Command-line tool for operating the quizgen orchestrator.
//!
//! Status, diagnosis, repair and reset of generation requests. Output is
//! JSON on stdout; logs go to stderr and follow `RUST_LOG`. Pool sizing reads
//! the `QUIZGEN_DB_*` variables.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use quizgen_db::{Database, PoolConfig};
use quizgen_inference::GatewayBackend;
use quizgen_orchestrator::{Actor, DiagnoseScope, Orchestrator, OrchestratorConfig};

#[derive(Parser)]
#[command(name = "quizgen-admin")]
#[command(author, version, about = "Administration for the quizgen orchestrator")]
#[command(propagate_version = true)]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// User id recorded as the acting administrator
    #[arg(long, env = "QUIZGEN_ADMIN_USER_ID", default_value_t = 0)]
    admin_user_id: i64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    #[cfg(feature = "migrations")]
    Migrate,

    /// Show a request with its topic and question counts
    Status {
        #[arg(short, long)]
        request: Uuid,
    },

    /// Report destination store linkage problems without changing anything
    #[command(group(ArgGroup::new("scope").required(true).args(["collection", "request"])))]
    Diagnose {
        #[arg(short, long)]
        collection: Option<i64>,

        #[arg(short, long)]
        request: Option<Uuid>,
    },

    /// Fix category linkage and publish draft versions in a collection
    Repair {
        #[arg(short, long)]
        collection: i64,
    },

    /// Return a failed or completed request to pending
    Reset {
        #[arg(short, long)]
        request: Uuid,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "quizgen_orchestrator=info,quizgen_db=warn".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let pool_config = PoolConfig::from_env();
    let db = Database::connect_with_config(&cli.database_url, pool_config)
        .await
        .context("connecting to the database")?;

    #[cfg(feature = "migrations")]
    if let Commands::Migrate = cli.command {
        db.migrate().await.context("applying migrations")?;
        return print(&serde_json::json!({ "migrated": true }));
    }

    let gateway = GatewayBackend::from_env().context("configuring the AI gateway client")?;
    let orchestrator = Orchestrator::builder()
        .with_database(&db)
        .with_ai(Arc::new(gateway))
        .with_config(OrchestratorConfig::from_env())
        .build()?;
    let actor = Actor::admin(cli.admin_user_id);

    match cli.command {
        #[cfg(feature = "migrations")]
        Commands::Migrate => Ok(()),
        Commands::Status { request } => {
            print(&orchestrator.get_request_status(&actor, request).await?)
        }
        Commands::Diagnose {
            collection,
            request,
        } => {
            let scope = match (collection, request) {
                (Some(collection), _) => DiagnoseScope::Collection(collection),
                (None, Some(request)) => DiagnoseScope::Request(request),
                (None, None) => anyhow::bail!("either --collection or --request is required"),
            };
            print(&orchestrator.diagnose(&actor, scope).await?)
        }
        Commands::Repair { collection } => print(&orchestrator.repair(&actor, collection).await?),
        Commands::Reset { request } => print(&orchestrator.reset_request(&actor, request).await?),
    }
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! Drive import CLI - run the Drive endpoints against real upstreams.
//!
//! Users, posts and attachments live in memory for the duration of the
//! command; Google, the identity API and object storage are real.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use driveimport_common::{Error, Secret, SubjectId, UserId};
use driveimport_import::memory::MemoryBackend;
use driveimport_import::{
    status_for_error, AppConfig, AuthContext, DriveEndpoints, ImportRequest, UserAccount,
};

#[derive(Parser)]
#[command(name = "driveimport")]
#[command(about = "Import Google Drive files as posts")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (JSON). `DRIVEIMPORT_*` variables override credentials.
    #[arg(short, long, default_value = "driveimport.json")]
    config: PathBuf,

    /// Internal user id.
    #[arg(short, long)]
    user: String,

    /// Identity subject, e.g. `google-oauth2|1234`.
    #[arg(short, long)]
    subject: String,

    /// Google refresh token already stored for the user.
    #[arg(long, env = "DRIVEIMPORT_REFRESH_TOKEN", hide_env_values = true)]
    refresh_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether the user can read their Drive files.
    Verify,

    /// List importable files.
    List {
        /// Continuation token from a previous page.
        #[arg(short, long)]
        page_token: Option<String>,
    },

    /// Import files as posts.
    Import {
        /// JSON file with `{"files": [...], "setFields": {...}}`.
        #[arg(short, long)]
        request: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = AppConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    config.apply_env_overrides();

    let user_id = UserId::new(cli.user).context("Invalid user id")?;
    let subject = SubjectId::new(cli.subject).context("Invalid subject")?;

    let backend = MemoryBackend::new(
        config.storage.upload_base_url.clone(),
        config.storage.url_ttl(),
    );
    let mut user = UserAccount::new(user_id.clone());
    if let Some(token) = cli.refresh_token {
        user = user.with_refresh_token(Secret::new(token));
    }
    backend.users.insert(user).await;

    let endpoints = DriveEndpoints::new(&config, backend.collaborators())
        .context("Failed to set up Drive endpoints")?;
    let ctx = AuthContext::new(user_id, subject);

    match cli.command {
        Commands::Verify => cmd_verify(&endpoints, &ctx).await,
        Commands::List { page_token } => cmd_list(&endpoints, &ctx, page_token.as_deref()).await,
        Commands::Import { request } => cmd_import(&endpoints, &ctx, &request).await,
    }
}

/// Attach the HTTP status an endpoint would answer with.
fn endpoint_error(error: Error) -> anyhow::Error {
    let status = status_for_error(&error);
    anyhow::Error::new(error).context(format!("Request failed with {}", status))
}

async fn cmd_verify(endpoints: &DriveEndpoints, ctx: &AuthContext) -> Result<()> {
    let response = endpoints
        .verify_access(ctx)
        .await
        .map_err(endpoint_error)?;

    println!("{}", response.status);
    Ok(())
}

async fn cmd_list(
    endpoints: &DriveEndpoints,
    ctx: &AuthContext,
    page_token: Option<&str>,
) -> Result<()> {
    let response = endpoints
        .list_files(ctx, page_token)
        .await
        .map_err(endpoint_error)?;

    info!("Listed {} files", response.body.files.len());
    println!("{}", serde_json::to_string_pretty(&response.body)?);
    Ok(())
}

async fn cmd_import(endpoints: &DriveEndpoints, ctx: &AuthContext, request: &Path) -> Result<()> {
    let json = std::fs::read_to_string(request)
        .with_context(|| format!("Failed to read {}", request.display()))?;
    let request: ImportRequest =
        serde_json::from_str(&json).context("Invalid import request")?;

    let response = endpoints
        .import_files(ctx, request)
        .await
        .map_err(endpoint_error)?;

    info!("Imported {} files", response.body.len());
    println!("{}", serde_json::to_string_pretty(&response.body)?);
    Ok(())
}

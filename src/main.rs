use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;

use aimta::api::{ApiClient, ApiError, BackendApi};
use aimta::auth::provider::IdentityProvider;
use aimta::auth::{AuthService, OAuthRefreshProvider, StaticTokenProvider, TokenMonitor};
use aimta::config::AppConfig;
use aimta::document::{DocumentAssembler, MemoryDocument};
use aimta::logging::{log, obj, v_str, Domain, Level};
use aimta::model::{BatchRecord, CachedBatches, ProcessRequest, Region};

#[derive(Parser)]
#[command(
    name = "aimta",
    about = "Batch-analysis document assembly against the AIMTA backend",
    version,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List compounds known to the backend.
    Compounds,

    /// List region templates for a compound.
    Templates { compound_id: String },

    /// Load batch records: cached data when available, otherwise process the source directory.
    Load {
        compound_id: String,
        template_id: String,
        /// Reprocess even when cached data exists.
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
        /// Process through a background task and poll for completion.
        #[arg(long = "async", action = ArgAction::SetTrue)]
        background: bool,
    },

    /// Drop the backend's cached batch data for a compound/template pair.
    ClearCache {
        compound_id: String,
        template_id: String,
    },

    /// Show the backend's view of the current session.
    AuthStatus,

    /// Backend health check.
    Health,

    /// Assemble a document offline from a batch-record JSON file.
    Assemble {
        #[arg(long)]
        compound_code: String,
        /// Template region (CN, EU, US).
        #[arg(long, default_value = "US")]
        region: Region,
        /// JSON array of batch records, or a cached-batches object.
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
        /// Write the document JSON here instead of stdout.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Print a plain-text rendering instead of JSON.
        #[arg(long, action = ArgAction::SetTrue)]
        text: bool,
    },

    /// Load batches for a compound/template and assemble the document.
    Build {
        compound_id: String,
        template_id: String,
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        #[arg(long, action = ArgAction::SetTrue)]
        text: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[("api_base_url", v_str(&config.api_base_url))]),
    );

    match cli.command {
        Commands::Assemble {
            compound_code,
            region,
            input,
            output,
            text,
        } => {
            let batches = read_batches(&input)?;
            assemble(&config, &compound_code, region, batches, output.as_deref(), text)
        }
        command => {
            let (api, monitor) = connect(&config)?;
            let result = run_online(&config, &api, command).await;
            monitor.stop();
            if let Some(err) = result.as_ref().err().and_then(|e| e.downcast_ref::<ApiError>()) {
                eprintln!("{}", err.user_message());
            }
            result
        }
    }
}

async fn run_online(config: &AppConfig, api: &BackendApi, command: Commands) -> Result<()> {
    match command {
        Commands::Compounds => print_json(&api.list_compounds().await?),
        Commands::Templates { compound_id } => print_json(&api.list_templates(&compound_id).await?),
        Commands::Load {
            compound_id,
            template_id,
            force,
            background,
        } => {
            if background {
                let request = ProcessRequest {
                    compound_id,
                    template_id,
                    force_reprocess: force,
                };
                let result = api
                    .process_async(&request, |current, total, status| {
                        eprintln!("[{}/{}] {}", current, total, status);
                    })
                    .await?;
                return print_json(&result);
            }
            let loaded = if force {
                api.reprocess(&compound_id, &template_id).await?
            } else {
                api.load_batches(&compound_id, &template_id).await?
            };
            eprintln!("{}", loaded.status_message());
            print_json(&loaded.batches)
        }
        Commands::ClearCache {
            compound_id,
            template_id,
        } => {
            api.clear_cache(&compound_id, &template_id).await?;
            eprintln!("Cache cleared successfully!");
            Ok(())
        }
        Commands::AuthStatus => print_json(&api.auth_status().await?),
        Commands::Health => print_json(&api.health().await?),
        Commands::Build {
            compound_id,
            template_id,
            output,
            text,
        } => {
            let compound = api
                .list_compounds()
                .await?
                .into_iter()
                .find(|c| c.id == compound_id)
                .ok_or_else(|| anyhow!("unknown compound {}", compound_id))?;
            let template = api
                .list_templates(&compound_id)
                .await?
                .into_iter()
                .find(|t| t.id == template_id)
                .ok_or_else(|| anyhow!("unknown template {}", template_id))?;
            let loaded = api.load_batches(&compound_id, &template_id).await?;
            eprintln!("{}", loaded.status_message());
            assemble(
                config,
                &compound.code,
                template.region,
                loaded.batches,
                output.as_deref(),
                text,
            )
        }
        Commands::Assemble { .. } => Err(anyhow!("assemble runs offline")),
    }
}

/// Session from `AIMTA_TOKEN` / `AIMTA_REFRESH_TOKEN`. With a refresh token
/// the identity provider's refresh grant backs silent renewal.
fn connect(config: &AppConfig) -> Result<(BackendApi, TokenMonitor)> {
    let token = std::env::var("AIMTA_TOKEN").ok().filter(|t| !t.is_empty());
    let refresh = std::env::var("AIMTA_REFRESH_TOKEN")
        .ok()
        .filter(|t| !t.is_empty());

    let provider: Arc<dyn IdentityProvider> = match refresh {
        Some(_) => Arc::new(
            OAuthRefreshProvider::new(config.identity.clone(), config.request_timeout)
                .context("identity provider")?,
        ),
        None => Arc::new(StaticTokenProvider::new(None)),
    };
    let auth = Arc::new(AuthService::new(provider, config));

    match token {
        Some(token) => {
            let user = auth
                .login_with_token(&token, refresh.as_deref())
                .context("AIMTA_TOKEN")?;
            log(
                Level::Info,
                Domain::Auth,
                "session_restored",
                obj(&[("user", v_str(&user.email))]),
            );
        }
        None => auth.session().store_refresh_token(refresh),
    }

    let monitor = TokenMonitor::new(auth.clone(), config.monitor_interval);
    monitor.start();
    let client = ApiClient::new(config, auth)?;
    Ok((BackendApi::new(client, config), monitor))
}

fn read_batches(path: &Path) -> Result<Vec<BatchRecord>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    if value.is_array() {
        return Ok(serde_json::from_value(value)?);
    }
    let cached: CachedBatches = serde_json::from_value(value)
        .with_context(|| format!("{}: expected batch records", path.display()))?;
    Ok(cached.batch_data)
}

fn assemble(
    config: &AppConfig,
    compound_code: &str,
    region: Region,
    batches: Vec<BatchRecord>,
    output: Option<&Path>,
    text: bool,
) -> Result<()> {
    let mut doc = MemoryDocument::new();
    let report = DocumentAssembler::new(compound_code, region, batches)
        .with_sponsor(config.sponsor.clone())
        .assemble(&mut doc)?;
    eprintln!("{}", report.status_message());

    if text {
        print!("{}", doc.to_text());
    }
    match output {
        Some(path) => {
            let json = serde_json::to_string_pretty(&doc)?;
            fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
        }
        None if !text => print_json(&doc)?,
        None => {}
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

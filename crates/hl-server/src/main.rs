use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hl_proto::UserId;
use hl_server::paths::default_config_path;
use hl_server::{Backends, ChatService, Secrets, ServerConfig};
use hl_store::Store;

#[derive(Parser, Debug)]
#[command(author, version, about = "Hushline messaging server", long_about = None)]
struct Cli {
    /// JSON config file; falls back to `config.json` in the data directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the server
    Run,
    /// Generate and store the identity keypair for a new user
    Register {
        #[arg(long)]
        user: String,
    },
    /// Print a connect credential for an existing user
    Token {
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(|| default_config_path().ok().filter(|p| p.exists()));
    let config = ServerConfig::load(config_path.as_deref())?;
    init_tracing(&config.log_filter);

    let secrets = Secrets::from_env()?;
    let service = open_service(config, &secrets).await?;

    match cli.command {
        Commands::Run => run_command(service).await,
        Commands::Register { user } => register_command(service, &user).await,
        Commands::Token { user } => token_command(service, &user).await,
    }
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn open_service(config: ServerConfig, secrets: &Secrets) -> Result<Arc<ChatService>> {
    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let store = Store::open(&config.database_path).await?;
    store.unlock(secrets.vault_passphrase.as_bytes()).await?;
    let backends = Backends::shared(Arc::new(store));
    Ok(Arc::new(ChatService::with_hmac_auth(
        config,
        backends,
        &secrets.auth_secret,
    )))
}

async fn run_command(service: Arc<ChatService>) -> Result<()> {
    let listener = TcpListener::bind(&service.config.listen_addr)
        .await
        .with_context(|| format!("binding {}", service.config.listen_addr))?;
    hl_server::server::serve(listener, service, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    info!("server stopped");
    Ok(())
}

async fn register_command(service: Arc<ChatService>, user: &str) -> Result<()> {
    let user = UserId::parse(user)?;
    let registration = service.auth.register(&user).await?;
    println!("Registered: {}", registration.user_id);
    println!("Fingerprint: {}", registration.fingerprint);
    println!("Credential: {}", registration.credential);
    Ok(())
}

async fn token_command(service: Arc<ChatService>, user: &str) -> Result<()> {
    let user = UserId::parse(user)?;
    println!("{}", service.auth.issue_credential(&user).await?);
    Ok(())
}

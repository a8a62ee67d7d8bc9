//! Vetdesk CLI - command-line front end of the practice console
//!
//! Signs in, issues authenticated requests through the pipeline and checks
//! navigations against the route guard.

mod console;

use clap::{Parser, Subcommand};
use console::Console;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use vetdesk_auth::{FileKeyValueStore, NavigationDecision, SessionStore};
use vetdesk_client::{ApiRequest, Method};
use vetdesk_core::{
    config_error, init_logging, log_operation_error, log_operation_start, log_operation_success,
    performance::measure_async, ConsoleConfig, ErrorContext, EventBus, VetdeskError,
    VetdeskResult,
};

#[derive(Parser)]
#[command(name = "vetdesk")]
#[command(about = "Command-line console for the veterinary practice backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session
    Login {
        email: String,

        /// Password; read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Sign out and remove the stored session
    Logout,

    /// Show the signed-in user
    Whoami {
        /// Ask the backend and update the stored profile
        #[arg(long)]
        remote: bool,
    },

    /// Send an authenticated request
    Request {
        /// HTTP method
        #[arg(value_parser = parse_method)]
        method: Method,

        /// Path relative to the API base URL
        path: String,

        /// JSON request body
        #[arg(long)]
        body: Option<String>,

        /// Do not retry transient failures
        #[arg(long)]
        no_retry: bool,
    },

    /// Check whether a console route is reachable with the current session
    Route { path: String },

    /// Fold a legacy session layout into the current record
    Migrate,

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Initialize default configuration
        #[arg(long)]
        init: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|e| format!("invalid HTTP method '{}': {}", raw, e))
}

#[tokio::main]
async fn main() -> VetdeskResult<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;

    let mut logging_config = config.logging.clone();
    if cli.verbose {
        logging_config.level = "debug".to_string();
        logging_config.filter_directives.clear();
    }

    init_logging(&logging_config).map_err(|e| VetdeskError::Config {
        message: format!("Failed to initialize logging: {}", e),
        source: Some(e),
        context: ErrorContext::new("cli")
            .with_operation("init_logging")
            .with_suggestion("Check the [logging] section of the configuration"),
    })?;

    info!("Starting vetdesk CLI v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Config {
            show,
            init,
            validate,
        } => handle_config(show, init, validate, cli.config.as_ref()),
        Commands::Migrate => handle_migrate(&config),
        command => {
            let console = Console::bootstrap(config)?;
            let result = run_session_command(&console, command).await;
            console.shutdown().await;
            result
        }
    }
}

fn load_config(config_path: Option<&PathBuf>) -> VetdeskResult<ConsoleConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from {:?}", path);
        return ConsoleConfig::from_file(path);
    }

    for path in ConsoleConfig::default_paths() {
        if path.exists() {
            info!("Loading configuration from {:?}", path);
            return ConsoleConfig::from_file(&path);
        }
    }

    info!("No configuration file found, using defaults");
    Ok(ConsoleConfig::default())
}

async fn run_session_command(console: &Console, command: Commands) -> VetdeskResult<()> {
    match command {
        Commands::Login { email, password } => handle_login(console, email, password).await,
        Commands::Logout => handle_logout(console).await,
        Commands::Whoami { remote } => handle_whoami(console, remote).await,
        Commands::Request {
            method,
            path,
            body,
            no_retry,
        } => handle_request(console, method, path, body, no_retry).await,
        Commands::Route { path } => {
            handle_route(console, &path);
            Ok(())
        }
        Commands::Config { .. } | Commands::Migrate => Ok(()),
    }
}

async fn handle_login(
    console: &Console,
    email: String,
    password: Option<String>,
) -> VetdeskResult<()> {
    log_operation_start!("login", email = %email);

    let password = match password {
        Some(password) => password,
        None => read_password()?,
    };

    let session = console.auth.login(&email, &password).await.map_err(|e| {
        log_operation_error!("login", e, email = %email);
        e
    })?;

    println!("✅ Signed in as {}", session.identity.display_string());
    log_operation_success!("login", role = %session.role());
    Ok(())
}

fn read_password() -> VetdeskResult<String> {
    print!("Password: ");
    std::io::stdout().flush()?;

    let mut password = String::new();
    std::io::stdin().read_line(&mut password)?;
    Ok(password.trim_end_matches(['\r', '\n']).to_string())
}

async fn handle_logout(console: &Console) -> VetdeskResult<()> {
    if console.store.get().is_none() {
        println!("Not signed in");
        return Ok(());
    }

    console.auth.logout().await?;
    println!("👋 Signed out");
    Ok(())
}

async fn handle_whoami(console: &Console, remote: bool) -> VetdeskResult<()> {
    if remote {
        let identity = console.auth.sync_profile().await?;
        println!("{}", serde_json::to_string_pretty(&identity)?);
        return Ok(());
    }

    match console.store.get() {
        Some(session) => {
            println!("👤 {}", session.identity.display_string());
            println!("   role: {}", session.role());
            if let Some(issued_at) = session.issued_at_time() {
                println!("   signed in: {}", issued_at.to_rfc3339());
            }
        }
        None => println!("Not signed in"),
    }
    Ok(())
}

async fn handle_request(
    console: &Console,
    method: Method,
    path: String,
    body: Option<String>,
    no_retry: bool,
) -> VetdeskResult<()> {
    log_operation_start!("request", method = %method, path = %path);

    let mut request = ApiRequest::new(method, path.as_str());
    if let Some(body) = body {
        request = request.with_body(serde_json::from_str(&body)?);
    }
    if no_retry {
        request = request.no_retry();
    }

    let response = measure_async("api_request", console.pipeline.execute(request))
        .await
        .map_err(|e| {
            log_operation_error!("request", e, path = %path, kind = ?e.kind());
            e
        })?;

    match serde_json::from_str::<serde_json::Value>(&response.body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", response.body),
    }

    log_operation_success!(
        "request",
        base_url = %console.config.api.base_url,
        path = %path,
        status = response.status
    );
    Ok(())
}

fn handle_route(console: &Console, path: &str) {
    match console.guard.check(path) {
        NavigationDecision::Allow => println!("✅ {} is reachable", path),
        NavigationDecision::RedirectToLogin { path: login, return_to } => {
            println!("🔒 Sign in required: {}?redirect={}", login, return_to)
        }
        NavigationDecision::RedirectToLanding { path: landing } => {
            println!("↪️  Redirected to {}", landing)
        }
        NavigationDecision::AccessDenied { path: denied, denial } => {
            let required: Vec<String> = denial
                .required_roles
                .iter()
                .map(ToString::to_string)
                .collect();
            println!(
                "⛔ Access denied ({}): {} requires one of [{}], current role is {}",
                denied,
                denial.attempted_path,
                required.join(", "),
                denial.current_role
            );
        }
    }
}

fn handle_migrate(config: &ConsoleConfig) -> VetdeskResult<()> {
    let storage = Arc::new(FileKeyValueStore::new(
        config.session.resolved_storage_dir(),
    )?);
    let store = SessionStore::new(storage, EventBus::default());

    let outcome = store.migrate()?;
    println!("📦 Migration: {:?}", outcome);
    Ok(())
}

fn handle_config(
    show: bool,
    init: bool,
    validate: bool,
    config_path: Option<&PathBuf>,
) -> VetdeskResult<()> {
    if init {
        let config_dir = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|d| d.join(".config")))
            .ok_or_else(|| config_error!("Cannot determine a configuration directory", "cli"))?
            .join("vetdesk");

        std::fs::create_dir_all(&config_dir)?;
        let path = config_dir.join("config.toml");

        ConsoleConfig::default().save_to_file(&path)?;
        println!("✅ Configuration initialized at: {:?}", path);
        println!("📝 Edit api.base_url to point at your backend.");
    }

    if show {
        let config = load_config(config_path)?;
        let rendered = toml::to_string_pretty(&config)
            .map_err(|e| config_error!(format!("Failed to render config: {}", e), "cli"))?;
        println!("📋 Current configuration:");
        println!("{}", rendered);
    }

    if validate {
        let config = load_config(config_path)?;
        match config.validate() {
            Ok(()) => println!("✅ Configuration is valid"),
            Err(e) => {
                println!("❌ Configuration validation failed: {}", e);
                return Err(e);
            }
        }
    }

    Ok(())
}

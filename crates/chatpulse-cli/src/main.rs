use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use chatpulse_browser::ClientLauncher;
use chatpulse_core::config::Config;
use chatpulse_gateway::slot::{self, GatewaySlot};
use chatpulse_gateway::{AppState, GatewayOptions, GatewayResult, actions};
use chatpulse_providers::{BriefGenerator, OpenAiProvider};

mod logging;

#[derive(Parser)]
#[command(
    name = "chatpulse",
    about = "WhatsApp unread counts, chat lists and AI briefs over a local HTTP API",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (default: 4321)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the unread chat count
    Unread,

    /// Print the chat list
    Chats {
        /// Only the N most recently active chats
        #[arg(long)]
        latest: Option<usize>,
    },

    /// Generate an AI brief of recent activity
    Brief,

    /// Show configuration summary and whether a server is running
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// Check the configuration for problems
    Validate,
}

/// Commands that run once against a fresh gateway and exit.
enum OneShot {
    Unread,
    Chats { latest: Option<usize> },
    Brief,
}

#[cfg(feature = "browser")]
fn launcher(config: &Config) -> anyhow::Result<Arc<dyn ClientLauncher>> {
    Ok(Arc::new(chatpulse_browser::WebClientLauncher::new(
        config.client(),
    )))
}

#[cfg(not(feature = "browser"))]
fn launcher(_config: &Config) -> anyhow::Result<Arc<dyn ClientLauncher>> {
    anyhow::bail!("chatpulse was built without the `browser` feature; rebuild with `--features browser`")
}

fn gateway_slot(config: &Config) -> anyhow::Result<GatewaySlot> {
    let options = GatewayOptions::from(&config.client());
    Ok(GatewaySlot::with_launcher(launcher(config)?, options))
}

/// Print a gateway result as JSON. Error results fail the command.
fn print_result<T: Serialize>(result: &GatewayResult<T>) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    match result {
        GatewayResult::Error { error } => anyhow::bail!("{error}"),
        GatewayResult::WaitingForQr { .. } => {
            eprintln!("Scan the QR code with WhatsApp on your phone, then retry.");
            Ok(())
        }
        GatewayResult::Ready { .. } => Ok(()),
    }
}

/// Run a one-shot command against the process-wide gateway, then release
/// the client session.
async fn one_shot(config: &Config, command: OneShot) -> anyhow::Result<()> {
    if slot::install_global(gateway_slot(config)?).is_err() {
        anyhow::bail!("Gateway already installed");
    }
    let gateway = slot::instance().ok_or_else(|| anyhow::anyhow!("Gateway not installed"))?;

    let outcome = match command {
        OneShot::Unread => print_result(&actions::unread(&gateway).await),
        OneShot::Chats { latest: None } => print_result(&actions::chats(&gateway).await),
        OneShot::Chats {
            latest: Some(limit),
        } => print_result(&actions::latest(&gateway, limit).await),
        OneShot::Brief => {
            let brief_config = config.brief();
            let generator = OpenAiProvider::from_brief_config(&brief_config)
                .map(|provider| BriefGenerator::new(Arc::new(provider), &brief_config));
            print_result(&actions::brief(&gateway, generator.as_ref()).await)
        }
    };

    drop(gateway);
    slot::reset_instance();
    // Give the browser a moment to close before the runtime shuts down.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    outcome
}

/// Refuse to start a client when the config has errors; log its warnings.
fn check_config(config: &Config) -> anyhow::Result<()> {
    let (warnings, errors) = config.validate();
    for warning in &warnings {
        tracing::warn!("{warning}");
    }
    if !errors.is_empty() {
        anyhow::bail!("Invalid configuration: {}", errors.join("; "));
    }
    Ok(())
}

async fn serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let port = port.unwrap_or_else(|| config.gateway_port());
    let slot = Arc::new(gateway_slot(&config)?);
    let state = AppState::new(Arc::new(config), slot);

    #[cfg(feature = "metrics")]
    let state = state.with_metrics(chatpulse_gateway::metrics::install_prometheus_recorder()?);

    tracing::info!("Starting ChatPulse on port {port}");
    chatpulse_gateway::start_server(Arc::new(state), port).await
}

async fn status(config: &Config, config_path: &std::path::Path) {
    let client = config.client();
    println!("ChatPulse v{}", env!("CARGO_PKG_VERSION"));
    println!("Config: {}", config_path.display());
    println!("Gateway: http://{}:{}", config.bind_addr(), config.gateway_port());
    println!("Browser profile: {}", client.resolve_profile_dir().display());
    println!("Init timeout: {}s", client.init_timeout_secs);
    println!(
        "Brief: {}",
        if config.brief().resolve_api_key().is_some() {
            "configured"
        } else {
            "no API key"
        }
    );
    println!("Browser support: {}", cfg!(feature = "browser"));

    let url = format!(
        "http://{}:{}/health",
        config.bind_addr(),
        config.gateway_port()
    );
    let health = reqwest::Client::new()
        .get(&url)
        .timeout(std::time::Duration::from_secs(2))
        .send()
        .await;
    match health {
        Ok(response) => match response.json::<serde_json::Value>().await {
            Ok(body) => println!("Server: running (client {})", body["client"]),
            Err(_) => println!("Server: responding, unexpected health payload"),
        },
        Err(_) => println!("Server: not running"),
    }
}

fn config_action(
    config: Config,
    config_path: &std::path::Path,
    action: ConfigAction,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Get { key } => match config.get_path(&key) {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => anyhow::bail!("No config value at '{key}'"),
        },
        ConfigAction::Set { key, value } => {
            // Accept JSON literals; anything else is a plain string.
            let parsed = serde_json::from_str(&value)
                .unwrap_or_else(|_| serde_json::Value::String(value.clone()));
            Config::set_path_in_file(config_path, &key, parsed)?;
            println!("Set {key} in {}", config_path.display());
        }
        ConfigAction::Validate => {
            let (warnings, errors) = config.validate();
            for warning in &warnings {
                println!("warning: {warning}");
            }
            for error in &errors {
                println!("error: {error}");
            }
            if !errors.is_empty() {
                anyhow::bail!("{} configuration error(s)", errors.len());
            }
            println!("Config OK");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    logging::init(config.logging.as_ref(), cli.verbose)?;
    tracing::debug!(path = %config_path.display(), "Loaded config");

    match cli.command {
        Commands::Serve { port } => {
            check_config(&config)?;
            serve(config, port).await?
        }
        Commands::Status => status(&config, &config_path).await,
        Commands::Config { action } => config_action(config, &config_path, action)?,
        Commands::Unread => {
            check_config(&config)?;
            one_shot(&config, OneShot::Unread).await?
        }
        Commands::Chats { latest } => {
            check_config(&config)?;
            one_shot(&config, OneShot::Chats { latest }).await?
        }
        Commands::Brief => {
            check_config(&config)?;
            one_shot(&config, OneShot::Brief).await?
        }
    }

    Ok(())
}

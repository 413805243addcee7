//! SMS Relay Daemon
//!
//! Watches the gateway's event directory and forwards SMS and call events.

use chrono::Local;
use clap::{Parser, Subcommand};
use sms_relay::bot;
use sms_relay::channels::{http_client, ChatChannel, ChatTransport, PushChannel, WebhookChannel};
use sms_relay::commands::CommandEndpoint;
use sms_relay::config::Config;
use sms_relay::dispatch::Dispatcher;
use sms_relay::event::{parse_call, parse_sms, EventKind};
use sms_relay::format;
use sms_relay::guard::StartupGuard;
use sms_relay::sms::{AsteriskGateway, SmsGateway};
use sms_relay::watcher::{prepare_event_dir, DirectoryWatcher, Ingestor};
use sms_relay::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// SMS Relay - forward modem SMS and call events to chat channels
#[derive(Parser)]
#[command(name = "sms-relay")]
#[command(about = "Forward SMS and call events from the telephony gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay (default)
    Run,

    /// Print the effective configuration (secrets redacted)
    Config,

    /// Parse an event file and print the notification it would produce
    Parse {
        /// Event file (.txt for SMS, .req for calls); left in place
        file: PathBuf,
    },

    /// Send an SMS through the gateway
    Send {
        /// Destination number
        number: String,

        /// Message text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // The silence window counts from process start
    let guard_start = std::time::Instant::now();
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = Config::from_env();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let guard = StartupGuard::starting_at(guard_start, config.silence_window);
            cmd_run(&config, guard).await
        }
        Commands::Config => cmd_config(&config),
        Commands::Parse { file } => cmd_parse(&config, &file),
        Commands::Send { number, text } => cmd_send(&config, &number, &text.join(" ")).await,
    }
}

// ============================================================================
// CLI Commands
// ============================================================================

fn cmd_config(config: &Config) -> Result<()> {
    println!("{}", config.summary());
    Ok(())
}

fn cmd_parse(config: &Config, file: &Path) -> Result<()> {
    let kind = EventKind::from_path(file).ok_or_else(|| {
        Error::Parse(format!("{}: expected a .txt or .req file", file.display()))
    })?;
    let content = fs::read_to_string(file)?;

    let (message, switches) = match kind {
        EventKind::Sms => {
            let sms = parse_sms(&content);
            (
                Some(format::sms_message(&sms, Local::now(), &config.line_number)),
                config.sms_switches,
            )
        }
        EventKind::Call => {
            let call = parse_call(&content)?;
            (format::call_message(&call, &config.line_number), config.call_switches)
        }
    };

    match message {
        Some(message) => {
            println!("{}", message);
            println!("\n--- {} event, channels: {}", kind.as_str(), switches);
        }
        None => println!("Unknown call type, nothing would be sent"),
    }
    Ok(())
}

async fn cmd_send(config: &Config, number: &str, text: &str) -> Result<()> {
    let gateway = AsteriskGateway::from_config(config);
    let report = gateway.send_sms(number, text).await?;
    if report.success {
        println!("Sent to {}", number);
        Ok(())
    } else {
        Err(Error::CommandFailed(report.output))
    }
}

// ============================================================================
// Daemon
// ============================================================================

async fn cmd_run(config: &Config, guard: StartupGuard) -> Result<()> {
    info!("SMS relay starting");

    prepare_event_dir(&config.event_dir)?;

    // Watch before any network setup; events queue until the ingestor runs
    let (_watcher, rx) = DirectoryWatcher::start(&config.event_dir)?;

    let bot = match &config.telegram_token {
        Some(token) => {
            let bot = bot::build_bot(token, config.proxy_url.as_deref())?;
            let username = bot::verify(&bot).await?;
            info!("Telegram bot @{} connected", username);
            Some(bot)
        }
        None => {
            warn!("TG_TOKEN not set: chat channel and commands disabled");
            None
        }
    };

    let http = http_client(config.send_timeout)?;
    let transport = bot
        .clone()
        .map(|b| Arc::new(b) as Arc<dyn ChatTransport>);
    let dispatcher = Arc::new(Dispatcher::new([
        Arc::new(
            ChatChannel::new(transport, config.allowed_ids.ids().to_vec())
                .with_timeout(config.send_timeout),
        ),
        Arc::new(PushChannel::from_config(http.clone(), config)),
        Arc::new(WebhookChannel::from_config(http, config)),
    ]));

    let ingestor = Arc::new(Ingestor::new(config, dispatcher, guard));

    info!("Relay running | silence window: {}s", config.silence_window.as_secs());
    info!(
        enabled = ?config.sms_switches.enabled_names(),
        "SMS switches: {}", config.sms_switches
    );
    info!(
        enabled = ?config.call_switches.enabled_names(),
        "Call switches: {}", config.call_switches
    );

    let ingest = tokio::spawn(ingestor.run(rx));

    match bot {
        Some(bot) => {
            let gateway: Arc<dyn SmsGateway> = Arc::new(AsteriskGateway::from_config(config));
            let endpoint = Arc::new(CommandEndpoint::new(config.allowed_ids.clone(), gateway));
            bot::run_command_listener(bot, endpoint).await;
        }
        None => {
            tokio::signal::ctrl_c().await?;
        }
    }

    ingest.abort();
    info!("SMS relay stopped");
    Ok(())
}

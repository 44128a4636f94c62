mod config;
mod dialogs;
mod login;
mod output;
mod remote;
mod retry;
mod session;
mod telegram;

use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::dialogs::{AggregateOptions, DialogAggregator};
use crate::login::TerminalAuthenticator;
use crate::output::{DEFAULT_FORMAT, OutputFormat};
use crate::retry::{DEFAULT_FLOOD_WAIT, FloodRetry};
use crate::session::SessionStore;
use crate::telegram::TelegramClient;

#[derive(Parser)]
#[command(
    name = "tg-unread",
    version,
    about = "Count unread Telegram dialogs for a status bar",
    after_help = "Environment:\n  TG_APPID    api id from https://my.telegram.org/apps (required)\n  TG_APPHASH  api hash from https://my.telegram.org/apps (required)\n  PHONE       phone number of the account, used by --auth\n  AUTH_FILE   session file (default ~/.local/share/tg-unread/session.json)\n\nExamples:\n  tg-unread --auth\n  tg-unread --onlyUnmuted\n  tg-unread --format \"{{ unread }} ({{ mentions }})\"\n  tg-unread --count-only"
)]
struct Cli {
    #[arg(long, help = "Log in interactively, save the session and exit")]
    auth: bool,

    #[arg(
        long = "onlyUnmuted",
        alias = "only-unmuted",
        help = "Do not count unread dialogs that are currently muted"
    )]
    only_unmuted: bool,

    #[arg(
        long,
        value_name = "TEMPLATE",
        default_value = DEFAULT_FORMAT,
        help = "Output template with `unread` and `mentions` ({{.unread}} style also works)"
    )]
    format: String,

    #[arg(long, conflicts_with = "format", help = "Print only the unread dialog count")]
    count_only: bool,

    #[arg(
        long,
        value_name = "SECS",
        default_value_t = DEFAULT_FLOOD_WAIT.as_secs(),
        help = "Seconds to sleep when rate limited before retrying"
    )]
    flood_wait: u64,

    #[arg(long, value_name = "N", help = "Give up after N rate-limit retries (default: never)")]
    max_flood_retries: Option<u32>,
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(error) = run().await {
        eprintln!("{error}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let started_at = Utc::now();

    let format = if cli.count_only {
        OutputFormat::CountOnly
    } else {
        OutputFormat::template(&cli.format)?
    };

    let config = Config::load()?;
    let store = SessionStore::new(config.session_path.clone());
    let mut client = TelegramClient::connect(&config, &store).await?;

    let authenticator = TerminalAuthenticator::new(config.phone.clone());
    login::invoke_auth(&mut client, &authenticator, cli.auth).await?;
    if cli.auth {
        client.save_session(&store)?;
        println!("Successfully logged in.");
        return Ok(());
    }

    let options = AggregateOptions {
        only_unmuted: cli.only_unmuted,
        now: started_at,
        retry: FloodRetry {
            interval: Duration::from_secs(cli.flood_wait),
            max_retries: cli.max_flood_retries,
        },
    };
    let counts = DialogAggregator::new(&mut client, options).run().await?;
    client.save_session(&store)?;

    output::print_counts(&format, counts)?;
    Ok(())
}

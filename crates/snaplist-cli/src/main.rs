// Snaplist entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Build the completion client and optional listing backend
// 4. Spawn the token progress task and the Ctrl+C listener
// 5. Run the line REPL on stdin until /quit, EOF or an idle Ctrl+C

mod command;
mod interrupt;
mod photo;
mod progress;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use snaplist_app::{Assistant, ChatReply, HttpBackend, ListingBackend, SessionSettings};
use snaplist_core::config;
use snaplist_core::listing::ListingRecord;
use snaplist_core::WorkflowError;
use snaplist_llm::LlmClient;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Notify};
use tracing::{error, info, warn};

use command::{Command, HELP};
use interrupt::{interruptible, spawn_interrupt_listener};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file, not terminal)
    init_tracing()?;
    info!("snaplist starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: model={}, history_turns={}, timeout={}s",
        config.llm.model, config.session.history_turns, config.session.request_timeout_secs
    );

    // 3. Build the completion client and backend
    let (event_tx, event_rx) = mpsc::channel(256);
    let llm_client = LlmClient::from_config(&config).with_token_sink(event_tx);
    if llm_client.is_active() {
        info!("LLM client initialized (API key configured)");
    } else {
        warn!("LLM client disabled (no API key)");
        println!("No Anthropic API key configured; add one to config/credentials.toml.");
    }

    let backend = match config.backend.url.clone() {
        Some(url) => Some(
            HttpBackend::new(url, config.session.request_timeout())
                .context("failed to set up the listing backend")?,
        ),
        None => None,
    };

    let assistant = Arc::new(Assistant::new(
        Arc::new(llm_client),
        SessionSettings::from_config(&config),
    ));

    // 4. Token progress task and Ctrl+C listener
    let progress = tokio::spawn(progress::show_progress(event_rx));
    let quit = Arc::new(Notify::new());
    let interrupts = spawn_interrupt_listener(assistant.clone(), quit.clone());

    // 5. REPL
    println!("snaplist: snap a photo, get a listing. Type /help for commands.");
    if let Err(e) = run_repl(&assistant, backend.as_ref(), &quit).await {
        error!("REPL error: {e}");
    }

    interrupts.abort();
    progress.abort();
    info!("snaplist shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file, keeping the terminal for the REPL.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = match directories::ProjectDirs::from("", "", "snaplist") {
        Some(dirs) => dirs.data_dir().join("logs"),
        None => std::env::current_dir()?.join("logs"),
    };
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create {}", log_dir.display()))?;

    let log_file = std::fs::File::create(log_dir.join("snaplist.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("snaplist=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}

async fn run_repl(
    assistant: &Assistant,
    backend: Option<&HttpBackend>,
    quit: &Notify,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print_prompt().await;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = quit.notified() => {
                println!();
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(msg) => {
                println!("{msg}");
                continue;
            }
        };

        match command {
            Command::Empty => {}
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Show => match assistant.listing() {
                Some(listing) => print_listing(&listing),
                None => println!("No listing yet. Start with /photo <path>."),
            },
            Command::History => {
                for entry in assistant.transcript() {
                    println!("[{}] {}: {}", entry.at.format("%H:%M"), entry.role.as_str(), entry.content);
                }
            }
            Command::Cancel => {
                if !assistant.cancel() {
                    println!("Nothing to cancel.");
                }
            }
            Command::Reset => {
                assistant.reset();
                println!("Started a new session.");
            }
            Command::Photo { path, notes } => {
                let image = match photo::load_photo(Path::new(&path)) {
                    Ok(image) => image,
                    Err(e) => {
                        println!("{e:#}");
                        continue;
                    }
                };
                println!("Drafting a listing from {path}...");
                let call = assistant.extract(&image, &notes);
                match interruptible(assistant, &mut lines, call).await {
                    Ok(listing) => print_listing(&listing),
                    Err(e) => print_error(&e),
                }
            }
            Command::Publish => {
                let Some(backend) = backend else {
                    println!("No backend configured; set [backend] url in config/assistant.toml.");
                    continue;
                };
                let call = assistant.publish(backend as &dyn ListingBackend);
                match interruptible(assistant, &mut lines, call).await {
                    Ok(id) => println!("Published as {id}."),
                    Err(e) => print_error(&e),
                }
            }
            Command::Chat(text) => {
                let call = assistant.send_message(&text);
                match interruptible(assistant, &mut lines, call).await {
                    Ok(reply) => print_reply(&reply),
                    Err(e) => print_error(&e),
                }
            }
        }
    }
    Ok(())
}

async fn print_prompt() {
    let mut stdout = tokio::io::stdout();
    let _ = stdout.write_all(b"> ").await;
    let _ = stdout.flush().await;
}

fn print_reply(reply: &ChatReply) {
    match reply {
        ChatReply::Updated {
            listing,
            message,
            ignored_fields,
        } => {
            println!("{message}");
            if !ignored_fields.is_empty() {
                println!("(ignored unknown fields: {})", ignored_fields.join(", "));
            }
            print_listing(listing);
        }
        ChatReply::Replaced { listing, message } => {
            println!("{message}");
            print_listing(listing);
        }
        ChatReply::Message(text) => println!("{text}"),
    }
}

fn print_listing(listing: &ListingRecord) {
    println!("== {} ({}) ==", listing.item_name, listing.category);
    println!("Condition: {}", listing.condition);
    println!(
        "Price: {}  target {}  minimum {}",
        listing.listing_price, listing.target_price, listing.minimum_price
    );
    for (label, text) in [
        ("Description", &listing.description),
        ("Selling points", &listing.selling_points),
        ("Known flaws", &listing.known_flaws),
        ("Reason for selling", &listing.reason_for_selling),
        ("Delivery", &listing.delivery_info),
    ] {
        if !text.trim().is_empty() {
            println!("{label}: {text}");
        }
    }
}

fn print_error(err: &WorkflowError) {
    match err {
        WorkflowError::Busy => println!("Still working on the previous request."),
        WorkflowError::Cancelled => println!("Cancelled."),
        other => println!("Error: {other}"),
    }
}

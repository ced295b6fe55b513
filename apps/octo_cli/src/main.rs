mod config;
mod render;

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use client_core::{
    account::{self, AccountSummary},
    api::check_health,
    location::{parse_xyzi, PageQuery},
    Direction, EntitySession, HttpOctoApi, SessionEvent,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{load_settings, Settings, DEFAULT_CONFIG_PATH};

#[derive(Parser, Debug)]
#[command(name = "octo", about = "Browse, mint and iterate Octo entities")]
struct Args {
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[arg(long, global = true)]
    primary_url: Option<String>,
    /// Pass an empty value to disable the fallback endpoint.
    #[arg(long, global = true)]
    fallback_url: Option<String>,
    #[arg(long, global = true)]
    api_key: Option<String>,
    /// Tracing filter; overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report which endpoint answers and its version.
    Health,
    /// Check an API key without storing it.
    Login { key: Option<String> },
    Profile,
    /// Exchange the configured key for a fresh one.
    Renew,
    /// Show one entity iteration, e.g. `view 3,12,2,0`.
    View {
        xyzi: String,
        #[arg(long)]
        redirect: Option<String>,
    },
    Mint { xyzi: String },
    /// Create the next iteration of the entity at `xyzi`. New iterations
    /// always follow the latest one, whatever iteration `xyzi` names.
    Iterate { xyzi: String },
    /// Interactive browsing: prev, next, latest, mint, new, show, open <xyzi>, quit.
    Shell {
        #[arg(default_value = "0,0,0,0")]
        xyzi: String,
        #[arg(long)]
        redirect: Option<String>,
    },
    /// List entities held by an account in a zone.
    Owned {
        #[arg(long)]
        ownership: Option<String>,
        #[arg(long, default_value_t = 0)]
        zone: u8,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match &args.log_level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = resolve_settings(&args)?;
    info!(
        primary = %settings.primary_url,
        fallback = settings.fallback_url.as_deref().unwrap_or("disabled"),
        "octo client starting"
    );
    let api = Arc::new(HttpOctoApi::new(
        settings.endpoint_set()?,
        settings.timeouts(),
        settings.api_key.clone(),
    ));

    match args.command {
        Command::Health => {
            let report = check_health(api.as_ref()).await?;
            println!("{}", render::health(&report));
        }
        Command::Login { key } => {
            let key = key.or(settings.api_key).unwrap_or_default();
            if account::login(api.as_ref(), &key).await? {
                println!("API key accepted");
            } else {
                bail!("Invalid API Key");
            }
        }
        Command::Profile => {
            let user = account::load_profile(api.as_ref(), configured_key(&settings)).await?;
            println!("{}", render::account(&AccountSummary::from(&user)));
        }
        Command::Renew => {
            let key = account::renew_key(api.as_ref(), configured_key(&settings)).await?;
            println!("{key}");
        }
        Command::View { xyzi, redirect } => {
            let session = EntitySession::new(api);
            let card = session
                .open(PageQuery::new(parse_xyzi(&xyzi), redirect))
                .await?;
            println!("{}", render::card(&card, Utc::now()));
        }
        Command::Mint { xyzi } => {
            let session = EntitySession::new(api);
            session.open(PageQuery::new(parse_xyzi(&xyzi), None)).await?;
            let card = session.request_mint().await?;
            println!("{}", render::card(&card, Utc::now()));
            println!("{}", client_core::MINT_SUCCESS_NOTICE);
        }
        Command::Iterate { xyzi } => {
            let session = EntitySession::new(api);
            session.open(PageQuery::new(parse_xyzi(&xyzi), None)).await?;
            session.navigate_latest().await?;
            let card = session.request_new_iteration().await?;
            println!("{}", render::card(&card, Utc::now()));
        }
        Command::Shell { xyzi, redirect } => {
            shell(EntitySession::new(api), PageQuery::new(parse_xyzi(&xyzi), redirect)).await?;
        }
        Command::Owned { ownership, zone } => {
            let ownership = match ownership {
                Some(ownership) => ownership,
                None => {
                    account::load_profile(api.as_ref(), configured_key(&settings))
                        .await?
                        .id
                }
            };
            let rows = account::owned_entities(api.as_ref(), &ownership, zone).await?;
            for row in &rows {
                println!("{}", render::owned_row(row, zone));
            }
            println!("{} entities", rows.len());
        }
    }

    Ok(())
}

fn resolve_settings(args: &Args) -> Result<Settings> {
    let mut settings = load_settings(&args.config)?;
    if let Some(url) = &args.primary_url {
        settings.primary_url = url.clone();
    }
    if let Some(url) = &args.fallback_url {
        settings.fallback_url = Some(url.trim().to_string()).filter(|url| !url.is_empty());
    }
    if let Some(key) = &args.api_key {
        settings.set_api_key(key.clone());
    }
    Ok(settings)
}

fn configured_key(settings: &Settings) -> &str {
    settings.api_key.as_deref().unwrap_or_default()
}

/// Reads commands from stdin. Every card change arrives as a session event,
/// so mutations run in the background and the prompt stays usable while a
/// request is outstanding.
async fn shell(session: Arc<EntitySession>, start: PageQuery) -> Result<()> {
    let mut events = session.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Rendered(card)) => {
                    println!("{}", render::card(&card, Utc::now()))
                }
                Ok(SessionEvent::Notice(message)) => println!("* {message}"),
                Ok(SessionEvent::Error(message)) => println!("! {message}"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    println!("! {skipped} updates skipped")
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Failures are already reported through the event stream.
    let _ = session.open(start).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (None, _) => {}
            (Some("prev" | "p"), _) => {
                let _ = session.navigate(Direction::Previous).await;
            }
            (Some("next" | "n"), _) => {
                let _ = session.navigate(Direction::Next).await;
            }
            (Some("latest" | "l"), _) => {
                let _ = session.navigate_latest().await;
            }
            (Some("show" | "s"), _) => {
                if let Ok(card) = session.current_card().await {
                    println!("{}", render::card(&card, Utc::now()));
                }
            }
            (Some("mint"), _) => {
                let session = session.clone();
                tokio::spawn(async move { session.request_mint().await });
            }
            (Some("new"), _) => {
                let session = session.clone();
                tokio::spawn(async move { session.request_new_iteration().await });
            }
            (Some("open"), Some(xyzi)) => {
                let _ = session.open(PageQuery::new(parse_xyzi(xyzi), None)).await;
            }
            (Some("quit" | "q" | "exit"), _) => break,
            (Some(other), _) => {
                println!("unknown command '{other}'; try prev, next, latest, show, mint, new, open <x,y,z,i>, quit")
            }
        }
    }

    printer.abort();
    Ok(())
}

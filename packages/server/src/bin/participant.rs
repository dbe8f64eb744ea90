//! Participant CLI: join a session, flip twenty times, submit once.
//!
//! Talks to the shared Postgres store directly. The device marker lives in a
//! local JSON file, so a second run against the same session is refused.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use sqlx::postgres::PgPoolOptions;

use coin_toss_core::common::FLIP_TARGET;
use coin_toss_core::domains::results::{FairCoin, Flip, Participant, SubmitError};
use coin_toss_core::domains::sessions::SessionState;
use coin_toss_core::kernel::{FileMarkerStore, PgStore, StreamHub};

#[derive(Parser)]
#[command(name = "participant")]
#[command(about = "Join a coin toss session and submit your flips")]
struct Cli {
    /// Session token from the host's join link
    #[arg(long, env = "COIN_TOSS_SESSION")]
    session: Option<String>,

    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Where this device remembers which sessions it already submitted to
    #[arg(long, env = "COIN_TOSS_MARKERS")]
    markers: Option<PathBuf>,

    /// Flip all twenty at once and submit under this nickname
    #[arg(long)]
    auto: Option<String>,

    /// Seed the coin (reproducible runs)
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&cli.database_url)
        .await
        .context("Failed to connect to database")?;
    let store = Arc::new(PgStore::connect(pool, StreamHub::new()).await?);
    let markers = Arc::new(FileMarkerStore::new(
        cli.markers.unwrap_or_else(FileMarkerStore::default_path),
    ));

    let coin = match cli.seed {
        Some(seed) => FairCoin::seeded(seed),
        None => FairCoin::from_entropy(),
    };
    let mut participant = Participant::join(store, markers, cli.session.as_deref())
        .await
        .with_coin(Box::new(coin));

    let view = participant.session();
    match view.state {
        SessionState::Ready => {}
        SessionState::Closed => {
            println!("{}", "This session is closed.".yellow());
            return Ok(());
        }
        _ => {
            let message = view.message.unwrap_or_else(|| "Session not found.".to_string());
            println!("{}", message.red());
            return Ok(());
        }
    }

    if participant.progress().already_marked {
        println!("{}", "You have already submitted a result for this session.".yellow());
        return Ok(());
    }

    if let Some(label) = cli.auto {
        while participant.flip().is_some() {}
        submit(&mut participant, &label).await;
        return Ok(());
    }

    loop {
        print_progress(&participant);
        let options = ["Flip", "Reset", "Submit", "Exit"];
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("What next?")
            .items(&options)
            .default(0)
            .interact()?;

        match selection {
            0 => {
                if participant.flip().is_none() {
                    println!("{}", format!("All {} flips are done.", FLIP_TARGET).dimmed());
                }
            }
            1 => participant.reset(),
            2 => {
                let label: String = Input::with_theme(&ColorfulTheme::default())
                    .with_prompt("Nickname")
                    .allow_empty(true)
                    .interact_text()?;
                if submit(&mut participant, &label).await {
                    return Ok(());
                }
            }
            _ => return Ok(()),
        }
    }
}

fn print_progress(participant: &Participant) {
    let progress = participant.progress();
    let last = match progress.last {
        Some(Flip::Heads) => "H".bright_green().to_string(),
        Some(Flip::Tails) => "T".bright_blue().to_string(),
        None => "-".dimmed().to_string(),
    };
    println!(
        "{} {}/{}  last: {}  heads: {}  tails: {}",
        "●".bright_cyan(),
        progress.count,
        progress.target,
        last,
        progress.heads,
        progress.tails
    );
}

/// Returns true when nothing more can be done in this session.
async fn submit(participant: &mut Participant, label: &str) -> bool {
    match participant.submit(label).await {
        Ok(result) => {
            println!(
                "{} {} heads, {} tails ({})",
                "Submitted:".bright_green().bold(),
                result.heads,
                result.tails,
                result.sequence
            );
            true
        }
        Err(e @ SubmitError::AlreadySubmitted) | Err(e @ SubmitError::NotReady(_)) => {
            println!("{}", e.to_string().yellow());
            true
        }
        Err(e) => {
            println!("{}", e.to_string().red());
            false
        }
    }
}

//! Host CLI: open a session, hand out the join link, watch results arrive.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Select};
use sqlx::postgres::PgPoolOptions;
use url::Url;

use coin_toss_core::domains::aggregation::{AggregationPipeline, LiveSnapshot};
use coin_toss_core::domains::sessions::SessionHost;
use coin_toss_core::kernel::{PgStore, StreamHub};

#[derive(Parser)]
#[command(name = "host")]
#[command(about = "Run a coin toss session")]
struct Cli {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long, env = "PUBLIC_BASE_URL", default_value = "http://localhost:3000")]
    public_base_url: Url,

    /// Language hint added to join links
    #[arg(long)]
    lang: Option<String>,
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
        .max_connections(4)
        .connect(&cli.database_url)
        .await
        .context("Failed to connect to database")?;
    let store = Arc::new(PgStore::connect(pool, StreamHub::new()).await?);

    let mut host = SessionHost::new(store.clone(), cli.public_base_url);
    let pipeline = AggregationPipeline::spawn(store);

    loop {
        let open = host.current().is_some_and(|s| s.is_open);
        let options = ["Open session", "Close session", "Watch results", "Reload", "Exit"];
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(if open { "Session open" } else { "No open session" })
            .items(&options)
            .default(if open { 2 } else { 0 })
            .interact()?;

        match selection {
            0 => match host.open_session().await {
                Ok(session) => {
                    let id = session.id;
                    pipeline.activate(Some(id));
                    if let Some(link) = host.join_link(cli.lang.as_deref()) {
                        println!("{} {}", "Join link:".bright_green().bold(), link.url);
                        println!("{} {}", "Token:".dimmed(), link.token);
                    }
                }
                Err(e) => println!("{}", e.to_string().red()),
            },
            1 => match host.close_session().await {
                Ok(session) => println!("{} {}", "Closed".yellow(), session.id),
                Err(e) => println!("{}", e.to_string().red()),
            },
            2 => watch(&pipeline).await,
            3 => pipeline.reload(),
            _ => break,
        }
    }

    pipeline.shutdown().await;
    Ok(())
}

/// Print every snapshot until Ctrl+C.
async fn watch(pipeline: &AggregationPipeline) {
    let mut rx = pipeline.subscribe();
    println!("{}", "Watching; Ctrl+C to stop.".dimmed());
    print_snapshot(&rx.borrow_and_update());

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                print_snapshot(&rx.borrow_and_update());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}

fn print_snapshot(snapshot: &LiveSnapshot) {
    let aggregate = &snapshot.aggregate;
    let p_value = aggregate
        .p_value
        .map(|p| format!("{:.4}", p))
        .unwrap_or_else(|| "-".to_string());
    let feed = if snapshot.realtime {
        "live".bright_green()
    } else {
        "offline".yellow()
    };

    println!(
        "[{}] participants: {}  flips: {}  heads: {}  p = {}",
        feed,
        aggregate.participant_count,
        aggregate.total_trials,
        aggregate.total_heads,
        p_value
    );
    if let Some(error) = &snapshot.load_error {
        println!("{}", error.red());
    }

    let peak = aggregate.histogram.iter().copied().max().unwrap_or(0).max(1);
    for (heads, &count) in aggregate.histogram.iter().enumerate() {
        if count > 0 {
            let bar = "█".repeat((count as usize * 40).div_ceil(peak as usize));
            println!("{:>2} {} {}", heads, bar.bright_cyan(), count);
        }
    }
}

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::protocol::IntersectionSnapshot;
use signal_core::Intersection;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::JoinHandle,
};
use tokio_stream::{
    wrappers::{BroadcastStream, WatchStream},
    StreamExt,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod console;

use config::load_settings;
use console::{notice_line, parse_command, status_line, OperatorCommand, HELP};

#[derive(Parser, Debug)]
#[command(about = "Four-way intersection signal simulator")]
struct Cli {
    /// Config file; defaults to ./intersection.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Green duration per lane in seconds (minimum 5).
    #[arg(long)]
    green_seconds: Option<u32>,
    /// Length of one simulated second in milliseconds.
    #[arg(long)]
    second_ms: Option<u64>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive console reading commands from stdin.
    Run,
    /// Run the rotation for a fixed number of simulated seconds, then stop.
    Demo {
        #[arg(long, default_value_t = 20)]
        seconds: u64,
        /// Print snapshots as JSON lines.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(secs) = cli.green_seconds {
        settings.green_secs = secs;
    }
    if let Some(ms) = cli.second_ms {
        settings.second_ms = ms;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = settings.intersection_config();
    let second = config.timing.second;
    let intersection = Intersection::spawn(config);
    info!(
        green_secs = settings.green_secs,
        second_ms = settings.second_ms,
        "intersection ready"
    );

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_console(&intersection).await?,
        Command::Demo { seconds, json } => run_demo(&intersection, second, seconds, json).await?,
    }

    intersection.shutdown().await?;
    Ok(())
}

fn print_snapshot(snapshot: &IntersectionSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
    } else {
        println!("{}", status_line(snapshot));
    }
    Ok(())
}

fn spawn_printers(intersection: &Intersection, json: bool) -> (JoinHandle<()>, JoinHandle<()>) {
    let mut snapshots = WatchStream::new(intersection.watch());
    let snapshot_task = tokio::spawn(async move {
        while let Some(snapshot) = snapshots.next().await {
            if let Err(err) = print_snapshot(&snapshot, json) {
                warn!(%err, "failed to print snapshot");
            }
        }
    });

    let mut notices = BroadcastStream::new(intersection.subscribe());
    let notice_task = tokio::spawn(async move {
        while let Some(notice) = notices.next().await {
            match notice {
                Ok(notice) if !json => println!("# {}", notice_line(&notice)),
                Ok(_) => {}
                Err(err) => warn!(%err, "notice stream lagged"),
            }
        }
    });
    (snapshot_task, notice_task)
}

async fn run_console(intersection: &Intersection) -> Result<()> {
    println!("{HELP}");
    let (snapshot_task, notice_task) = spawn_printers(intersection, false);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(OperatorCommand::Start) => intersection.start().await?,
            Ok(OperatorCommand::Stop) => intersection.stop().await?,
            Ok(OperatorCommand::Duration(secs)) => {
                intersection.set_duration(secs).await?;
            }
            Ok(OperatorCommand::Status) => {
                println!("{}", status_line(&intersection.snapshot().await?));
            }
            Ok(OperatorCommand::Help) => println!("{HELP}"),
            Ok(OperatorCommand::Quit) => break,
            Err(err) => println!("! {err}"),
        }
    }

    intersection.stop().await?;
    snapshot_task.abort();
    notice_task.abort();
    Ok(())
}

async fn run_demo(
    intersection: &Intersection,
    second: Duration,
    seconds: u64,
    json: bool,
) -> Result<()> {
    let (snapshot_task, notice_task) = spawn_printers(intersection, json);
    intersection.start().await?;

    tokio::select! {
        () = tokio::time::sleep(second * u32::try_from(seconds).unwrap_or(u32::MAX)) => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    intersection.stop().await?;
    let last = intersection.snapshot().await?;
    snapshot_task.abort();
    notice_task.abort();
    print_snapshot(&last, json)?;
    Ok(())
}

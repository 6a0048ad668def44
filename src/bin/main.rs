//! pagetrack CLI - replay scripted page activity through a tracker
//!
//! Builds a tracker over an in-memory session history, replays a scenario
//! script against it and prints every beacon the tracker emits.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use pagetrack::{
    parse_script, replay, ChannelBeacon, SentBeacon, SessionHistory, TrackerBuilder,
    TrackerOptions,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PAGE_URL: &str = "https://localhost/";

#[derive(Parser)]
#[command(name = "pagetrack")]
#[command(about = "Replay page activity through the pagetrack collector and inspect its beacons")]
struct Cli {
    /// Log filter (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario script and print the resulting beacons
    Replay {
        /// Tracker options as camelCase JSON (flags below override it)
        #[arg(short, long)]
        options: Option<PathBuf>,

        /// Collection endpoint
        #[arg(short, long, env = "PAGETRACK_REQUEST_URL")]
        request_url: Option<String>,

        /// Initial user id
        #[arg(short, long, env = "PAGETRACK_UUID")]
        uuid: Option<String>,

        /// Track pushState, replaceState and popstate
        #[arg(long)]
        history: bool,

        /// Track hashchange
        #[arg(long)]
        hash: bool,

        /// Track pointer events on elements with a target-key attribute
        #[arg(long)]
        dom: bool,

        /// Track uncaught errors and unhandled rejections
        #[arg(long)]
        js_error: bool,

        /// URL of the page the history starts on
        #[arg(long, default_value = DEFAULT_PAGE_URL)]
        page: String,

        /// Scenario file (or - for stdin)
        #[arg(short, long, default_value = "-")]
        input: String,

        /// Output format: pretty or json
        #[arg(short, long, default_value = "pretty")]
        format: OutputFormat,
    },

    /// Print the default configuration for an endpoint
    Defaults {
        /// Collection endpoint
        #[arg(short, long, env = "PAGETRACK_REQUEST_URL")]
        request_url: String,
    },
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum OutputFormat {
    Pretty,
    Json,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    match cli.command {
        Commands::Replay {
            options,
            request_url,
            uuid,
            history,
            hash,
            dom,
            js_error,
            page,
            input,
            format,
        } => {
            let mut opts = load_options(options.as_ref(), request_url)?;
            if let Some(uuid) = uuid {
                opts = opts.uuid(uuid);
            }
            // flags only switch captures on; the options file decides the rest
            if history {
                opts = opts.history_tracker(true);
            }
            if hash {
                opts = opts.hash_tracker(true);
            }
            if dom {
                opts = opts.dom_tracker(true);
            }
            if js_error {
                opts = opts.js_error(true);
            }
            run_replay(opts, &page, &input, format).await?;
        }
        Commands::Defaults { request_url } => {
            let config = TrackerOptions::new(request_url).resolve();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_options(
    path: Option<&PathBuf>,
    request_url: Option<String>,
) -> Result<TrackerOptions, Box<dyn std::error::Error>> {
    let options = match path {
        Some(path) => {
            TrackerOptions::from_json_with_endpoint(&std::fs::read_to_string(path)?, request_url)?
        }
        None => TrackerOptions::new(request_url.unwrap_or_default()),
    };
    if options.request_url.is_empty() {
        return Err(
            "no request URL: pass --request-url, set PAGETRACK_REQUEST_URL or use --options".into(),
        );
    }
    Ok(options)
}

fn read_input(input: &str) -> std::io::Result<String> {
    if input == "-" {
        use std::io::Read;
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(input)
    }
}

async fn run_replay(
    options: TrackerOptions,
    page: &str,
    input: &str,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let script = read_input(input)?;
    let steps = parse_script(&script)?;

    let (beacon, mut rx) = ChannelBeacon::new();
    let printer = tokio::spawn(async move {
        let mut count = 0usize;
        while let Some(sent) = rx.recv().await {
            count += 1;
            match format {
                OutputFormat::Pretty => print_pretty(count, &sent),
                OutputFormat::Json => print_json(&sent),
            }
        }
        count
    });

    let history = SessionHistory::parse(page)?;
    let tracker = TrackerBuilder::new(options, Arc::new(beacon)).build(history);
    let applied = replay(&steps, &tracker);

    // let rejection reports land before tearing down
    tokio::task::yield_now().await;
    let history = tracker.shutdown();

    let count = printer.await?;
    eprintln!(
        "{} {} steps, {} beacons, page now at {}",
        "done".green().bold(),
        applied,
        count,
        history.current_url()
    );
    let state = history.current_state();
    if !state.is_null() {
        eprintln!("{}: {}", "State".cyan(), state);
    }
    Ok(())
}

fn print_json(sent: &SentBeacon) {
    match sent.beacon.json() {
        Ok(record) => println!("{}", record),
        Err(_) => println!("{}", String::from_utf8_lossy(&sent.beacon.body)),
    }
}

fn print_pretty(n: usize, sent: &SentBeacon) {
    let record = match sent.beacon.json() {
        Ok(record) => record,
        Err(e) => {
            eprintln!("{} beacon #{} is not JSON: {}", "warn".yellow(), n, e);
            return;
        }
    };

    let timestamp = record
        .get("time")
        .and_then(|v| v.as_i64())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!("{}", "━".repeat(60).dimmed());
    println!(
        "{} {} {}",
        format!("BEACON #{}", n).cyan().bold(),
        record.get("event").and_then(|v| v.as_str()).unwrap_or("?").bold(),
        timestamp.dimmed()
    );
    println!("{}", "━".repeat(60).dimmed());
    println!("{}: {}", "To".cyan(), sent.url);
    println!("{}: {}", "Content-Type".cyan(), sent.beacon.content_type);
    if let Some(key) = record.get("targetKey").and_then(|v| v.as_str()) {
        println!("{}: {}", "Target".yellow().bold(), key);
    }
    if let Some(msg) = record.get("message").and_then(|v| v.as_str()) {
        println!("{}: {}", "Message".red().bold(), msg);
    }
    if let Some(uuid) = record.get("uuid").and_then(|v| v.as_str()) {
        println!("{}: {}", "User".cyan(), uuid);
    }
    if let Some(extra) = record.get("extra") {
        println!("{}: {}", "Extra".cyan(), extra);
    }
    println!();
}

mod config;

use std::path::PathBuf;

use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::unbounded_channel;
use tracing_subscriber::{fmt, EnvFilter};

use fetch_core::{
    LoadContext, LoadFailure, LoadReport, LoadResponse, LoadStats, LoaderCallbacks, ResponseKind,
    SegmentLoader,
};

fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");

    if GIT_HASH.is_empty() {
        // Leak is fine — called once, lives for the program's lifetime.
        Box::leak(VERSION.to_string().into_boxed_str())
    } else {
        Box::leak(format!("{VERSION} ({GIT_HASH})").into_boxed_str())
    }
}

/// Fetch one media segment with timeout/retry/backoff semantics.
#[derive(Parser)]
#[command(name = "hls-fetch", version = version_string(), about)]
struct Cli {
    /// Segment URL (http, https, file or data).
    url: String,

    /// First byte of a partial fetch (used only together with --range-end).
    #[arg(long)]
    range_start: Option<u64>,

    /// End byte (exclusive) of a partial fetch.
    #[arg(long)]
    range_end: Option<u64>,

    /// Treat the payload as text instead of binary.
    #[arg(long, default_value_t = false)]
    text: bool,

    /// Write the payload to this file instead of discarding it.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Liveness timeout in milliseconds. Overrides config file.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Delay before the first retry in milliseconds. Overrides config file.
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Maximum number of retries. Overrides config file.
    #[arg(long)]
    max_retry: Option<u32>,

    /// Backoff delay cap in milliseconds. Overrides config file.
    #[arg(long)]
    max_retry_delay_ms: Option<u64>,

    /// Abort the transfer as soon as a timeout is reported, instead of
    /// letting it keep running.
    #[arg(long, default_value_t = false)]
    abort_on_timeout: bool,

    /// Print a JSON report instead of the styled summary.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Path to TOML config file with load defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

enum Outcome {
    Success(Box<LoadResponse>, LoadReport),
    Failure(LoadFailure),
    TimedOut(LoadReport),
}

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let defaults = if let Some(ref path) = cli.config {
        match config::AppConfig::load(path) {
            Ok(c) => {
                tracing::info!(path = %path.display(), "Loaded config file");
                c.defaults
            }
            Err(e) => {
                tracing::error!("{}", e);
                return 1;
            }
        }
    } else {
        config::DefaultsConfig::default()
    };

    let mut load_config = defaults.to_load_config();
    if let Some(v) = cli.timeout_ms {
        load_config = load_config.with_timeout(v);
    }
    if let Some(v) = cli.retry_delay_ms {
        load_config = load_config.with_retry_delay(v);
    }
    if let Some(v) = cli.max_retry {
        load_config = load_config.with_max_retry(v);
    }
    if let Some(v) = cli.max_retry_delay_ms {
        load_config = load_config.with_max_retry_delay(v);
    }

    let mut context = LoadContext::new(&cli.url);
    if let Some(end) = cli.range_end {
        context = context.with_range(cli.range_start.unwrap_or(0), end);
    } else if cli.range_start.is_some() {
        tracing::warn!("--range-start has no effect without --range-end");
    }
    if cli.text {
        context = context.with_response_kind(ResponseKind::Text);
    }

    let loader = SegmentLoader::default();

    let pb = if cli.json {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner:.green} {bytes} ({bytes_per_sec}) {wide_bar}")
                .expect("valid template"),
        );
        pb.println(format!(
            "{} {}",
            style("hls-fetch").bold(),
            style(version_string()).dim()
        ));
        pb.println(format!("  {} {}", style("url:").dim(), style(&cli.url).bold()));
        pb
    };

    let (tx, mut rx) = unbounded_channel();

    let on_success = {
        let tx = tx.clone();
        let pb = pb.clone();
        Box::new(
            move |response: LoadResponse, stats: &LoadStats, _: &LoadContext| {
                pb.finish_and_clear();
                let _ = tx.send(Outcome::Success(
                    Box::new(response),
                    LoadReport::from_stats(stats),
                ));
            },
        )
    };
    let on_error = {
        let tx = tx.clone();
        let pb = pb.clone();
        Box::new(move |failure: LoadFailure, _: &LoadContext| {
            pb.finish_and_clear();
            let _ = tx.send(Outcome::Failure(failure));
        })
    };
    let on_timeout = {
        let tx = tx.clone();
        let pb = pb.clone();
        let loader = loader.clone();
        let abort_on_timeout = cli.abort_on_timeout;
        Box::new(move |stats: &LoadStats, _: &LoadContext| {
            if abort_on_timeout {
                loader.abort();
                pb.finish_and_clear();
                let _ = tx.send(Outcome::TimedOut(LoadReport::from_stats(stats)));
            } else {
                pb.println(format!(
                    "  {} no data for a full timeout window, still waiting",
                    style("timeout").yellow().bold()
                ));
            }
        })
    };
    let on_progress = {
        let pb = pb.clone();
        Box::new(move |stats: &LoadStats, _: &LoadContext| {
            if stats.total > 0 {
                pb.set_length(stats.total);
            }
            pb.set_position(stats.loaded);
        })
    };

    let callbacks = LoaderCallbacks {
        on_success,
        on_error,
        on_timeout,
        on_progress: Some(on_progress),
    };
    // Only the callback clones may keep the channel open; recv() must see it
    // close if the load ends without a terminal outcome.
    drop(tx);

    let load_task = {
        let loader = loader.clone();
        tokio::spawn(async move {
            loader.load(context, load_config, callbacks).await;
        })
    };

    let outcome = tokio::select! {
        outcome = rx.recv() => outcome,
        _ = tokio::signal::ctrl_c() => {
            loader.abort();
            pb.finish_and_clear();
            eprintln!("{}", style("Aborted.").dim());
            let _ = load_task.await;
            return 130;
        }
    };

    let _ = load_task.await;

    match outcome {
        Some(Outcome::Success(response, report)) => {
            if let Some(ref out) = cli.output {
                if let Err(e) = std::fs::write(out, response.data.as_bytes()) {
                    tracing::error!(path = %out.display(), error = %e, "Failed to write payload");
                    return 1;
                }
            }
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).expect("report serializes")
                );
            } else {
                print_summary(&response, &report, cli.output.as_deref());
            }
            0
        }
        Some(Outcome::Failure(failure)) => {
            eprintln!(
                "{} {} while loading {}",
                style("ERROR").red().bold(),
                failure,
                cli.url
            );
            1
        }
        Some(Outcome::TimedOut(report)) => {
            eprintln!(
                "{} no data after {} retries, transfer aborted",
                style("TIMEOUT").yellow().bold(),
                report.retry_count
            );
            1
        }
        // The loader finished without an outcome: aborted elsewhere.
        None => 130,
    }
}

fn print_summary(response: &LoadResponse, report: &LoadReport, output: Option<&std::path::Path>) {
    println!(
        "  {} {}",
        style("resolved:").dim(),
        response.url
    );
    println!(
        "  {} {} bytes ({} total reported)",
        style("loaded:  ").dim(),
        report.loaded,
        report.total
    );
    println!(
        "  {} {}",
        style("started: ").dim(),
        report.started_at.format("%H:%M:%S%.3f")
    );
    if let Some(ttfb) = report.ttfb_ms {
        println!("  {} {}ms", style("ttfb:    ").dim(), ttfb);
    }
    if let Some(duration) = report.duration_ms {
        println!("  {} {}ms", style("duration:").dim(), duration);
    }
    if let Some(bps) = report.bandwidth_bps {
        println!("  {} {:.2} Mbit/s", style("speed:   ").dim(), bps as f64 / 1_000_000.0);
    }
    if report.retry_count > 0 {
        println!(
            "  {} {}",
            style("retries: ").yellow(),
            report.retry_count
        );
    }
    if let Some(path) = output {
        println!("  {} {}", style("written: ").dim(), path.display());
    }
}

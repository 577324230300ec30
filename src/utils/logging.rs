use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

pub const TIMING_TARGET: &str = "bot.timing";

/// Flushes the non-blocking log writers when dropped; keep it alive for the
/// whole process.
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

pub fn parse_log_level(value: &str) -> LevelFilter {
    match value.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" | "warning" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

/// Everything except timing events, with chatty HTTP and Bot API client
/// internals capped at WARN.
fn general_targets(level: LevelFilter) -> Targets {
    Targets::new()
        .with_default(level)
        .with_target(TIMING_TARGET, LevelFilter::OFF)
        .with_target("hyper", LevelFilter::WARN)
        .with_target("hyper_util", LevelFilter::WARN)
        .with_target("reqwest", LevelFilter::WARN)
        .with_target("teloxide", LevelFilter::WARN)
}

fn timing_targets() -> Targets {
    Targets::new()
        .with_default(LevelFilter::OFF)
        .with_target(TIMING_TARGET, LevelFilter::INFO)
}

fn daily_writer(logs_dir: &Path, file_name: &str, guards: &mut Vec<WorkerGuard>) -> NonBlocking {
    let appender = tracing_appender::rolling::daily(logs_dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    guards.push(guard);
    writer
}

/// Stdout plus daily rolling `bot.log`/`bot.jsonl` under `logs_dir`; command
/// and relay timings go to `timing.log`/`timing.jsonl` only.
pub fn init_logging(logs_dir: &Path, log_level: &str) -> LoggingGuards {
    if let Err(err) = fs::create_dir_all(logs_dir) {
        eprintln!("Failed to create logs directory {}: {err}", logs_dir.display());
    }

    let mut guards = Vec::with_capacity(4);
    let general = general_targets(parse_log_level(log_level));
    let timing = timing_targets();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_filter(general.clone());
    let text_layer = tracing_subscriber::fmt::layer()
        .with_writer(daily_writer(logs_dir, "bot.log", &mut guards))
        .with_ansi(false)
        .with_filter(general.clone());
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(daily_writer(logs_dir, "bot.jsonl", &mut guards))
        .with_filter(general);
    let timing_text_layer = tracing_subscriber::fmt::layer()
        .with_writer(daily_writer(logs_dir, "timing.log", &mut guards))
        .with_ansi(false)
        .with_filter(timing.clone());
    let timing_json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(daily_writer(logs_dir, "timing.jsonl", &mut guards))
        .with_filter(timing);

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(text_layer)
        .with(json_layer)
        .with(timing_text_layer)
        .with(timing_json_layer)
        .init();

    LoggingGuards { _guards: guards }
}

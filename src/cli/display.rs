//! Terminal output: progress bars and result tables

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use mlbench_core::{
    ProgressSink, ResultRecord, RunMode, SchedulerEvent, SessionConfig, SettingsSnapshot,
    NOT_AVAILABLE,
};
use mlbench_report::ResultEntry;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}% {msg}";

fn percent_bar(message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar.set_message(message);
    bar
}

pub fn acquisition_bar() -> ProgressBar {
    percent_bar("Acquiring assets")
}

pub fn session_bar() -> ProgressBar {
    percent_bar("Running benchmarks")
}

/// Sink moving `bar` to the reported percentage
pub fn bar_sink(bar: &ProgressBar) -> Arc<dyn ProgressSink> {
    let bar = bar.clone();
    Arc::new(move |percent: u8| bar.set_position(u64::from(percent)))
}

pub fn show_event(bar: &ProgressBar, event: &SchedulerEvent) {
    match event {
        SchedulerEvent::Started {
            benchmark_id,
            mode,
            sequence,
        } => {
            bar.set_message(format!("{benchmark_id} ({mode})"));
            tracing::debug!(benchmark_id = %benchmark_id, sequence, "Run started");
        }
        SchedulerEvent::CoolingStarted { benchmark_id, pause } => {
            bar.set_message(format!("Cooling down before {benchmark_id}"));
            bar.println(format!(
                "Cooling down for {}s before {benchmark_id}",
                pause.as_secs()
            ));
        }
        SchedulerEvent::CoolingFinished { benchmark_id } => {
            bar.set_message(benchmark_id.clone());
        }
        SchedulerEvent::Failed {
            benchmark_id,
            error,
        } => {
            bar.println(format!("✗ {benchmark_id} failed: {error}"));
        }
        SchedulerEvent::Finished(record) if record.error.is_none() => {
            bar.println(format!(
                "✓ {:<28} {:>10} {:>10}",
                record.benchmark_id,
                score_cell(record.score),
                record.accuracy.as_deref().unwrap_or(NOT_AVAILABLE)
            ));
        }
        SchedulerEvent::Finished(_) => {}
        SchedulerEvent::AllFinished { cancelled, .. } => {
            if *cancelled {
                bar.println("Session cancelled");
            }
        }
    }
}

fn score_cell(score: Option<f64>) -> String {
    score
        .map(|s| format!("{s:.2}"))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

pub fn print_banner(config: &SessionConfig, mode: RunMode) {
    println!("\nBackend:  {}", config.backend);
    println!("Mode:     {mode}");
    match config.cooldown {
        Some(true) => println!("Cooldown: {} min", config.cooldown_minutes),
        Some(false) => println!("Cooldown: off"),
        None => println!("Cooldown: from settings"),
    }
    if !config.disabled_benchmarks.is_empty() {
        println!("Skipping: {}", config.disabled_benchmarks.join(", "));
    }
    println!();
}

/// Per-benchmark table followed by the summary score
pub fn print_session(
    results: &[ResultRecord],
    summary: f64,
    max_summary: Option<f64>,
    mode: RunMode,
) {
    println!("\n{:=<72}", "");
    println!(
        "{:<28} {:<16} {:>12} {:>12}",
        "Benchmark", "Runtime", "Score", "Accuracy"
    );
    println!("{:-<72}", "");
    for record in results {
        let accuracy = if mode == RunMode::PerformanceLite {
            NOT_AVAILABLE
        } else {
            record.accuracy.as_deref().unwrap_or(NOT_AVAILABLE)
        };
        println!(
            "{:<28} {:<16} {:>12} {:>12}",
            record.benchmark_id,
            record.runtime,
            score_cell(record.score),
            accuracy
        );
        if let Some(error) = &record.error {
            println!("    error: {error}");
        }
    }
    println!("{:-<72}", "");
    match max_summary {
        Some(max) => println!("Summary score: {summary:.2} (max {max:.2})"),
        None => println!("Summary score: {summary:.2}"),
    }
    println!("{:=<72}\n", "");
}

pub fn print_settings(key: &str, snapshot: &SettingsSnapshot) {
    println!("Settings ({key})");
    for setting in &snapshot.common_settings {
        let choices: Vec<&str> = setting
            .acceptable_values
            .iter()
            .map(|v| v.value.as_str())
            .collect();
        println!(
            "  {:<20} {:<12} {} [{}]",
            setting.id,
            setting.value.value,
            setting.name,
            choices.join(", ")
        );
    }
    if !snapshot.benchmark_settings.is_empty() {
        println!("Benchmarks");
        for setting in &snapshot.benchmark_settings {
            println!(
                "  {:<28} {:<12} {}",
                setting.benchmark_id, setting.accelerator, setting.configuration
            );
        }
    }
}

pub fn print_entries(entries: &[ResultEntry]) {
    println!(
        "{:<28} {:<16} {:>10} {:>10} {:>10} {:<24}",
        "Benchmark", "Runtime", "Score", "Accuracy", "Samples", "Mode"
    );
    for entry in entries {
        println!(
            "{:<28} {:<16} {:>10} {:>10} {:>10} {:<24}",
            entry.benchmark_id,
            entry.configuration.runtime,
            entry.score,
            entry.accuracy,
            entry.num_samples,
            entry.mode
        );
    }
    if let Some(first) = entries.first() {
        println!("Written {}", first.datetime);
    }
}

//! Chronicare: Clinical risk engine for chronic-care cohorts
//!
//! Headless runner: loads configuration from the environment, scores the
//! cohort once and prints the filtered, ranked table.

#![allow(non_snake_case)]

use std::fmt::Write as _;
use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use Chronicare::adapters::artifact::ArtifactCache;
use Chronicare::adapters::sanitize::SanitizingMakeWriter;
use Chronicare::application::{RiskPipeline, RiskReport, RiskThreshold};
use Chronicare::config::PipelineConfig;
use Chronicare::ports::RiskClassifier;
use Chronicare::RiskLevel;

fn render_table(report: &RiskReport, threshold: RiskThreshold) -> String {
    let rows = report.ranked(threshold);
    let id_width = rows
        .iter()
        .map(|r| r.patient_id.chars().count())
        .max()
        .unwrap_or(0)
        .max("Patient ID".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<id_width$}  {:>5}  {:<8}  {:^5}  {}",
        "Patient ID", "Score", "Level", "Trend", "Top Driver"
    );
    let _ = writeln!(out, "{}", "-".repeat(id_width + 48));
    for r in &rows {
        let _ = writeln!(
            out,
            "{:<id_width$}  {:>4}%  {:<8}  {:^5}  {}",
            r.patient_id,
            r.risk_score,
            r.risk_level.to_string(),
            r.trend().arrow(),
            r.top_driver()
        );
    }

    let s = &report.summary;
    let _ = writeln!(
        out,
        "\n{} of {} patients at or above {}% (mean score {:.1}, max {})",
        rows.len(),
        s.patient_count,
        threshold,
        s.mean_score,
        s.max_score
    );
    for level in [RiskLevel::High, RiskLevel::Moderate, RiskLevel::Low] {
        let _ = writeln!(out, "  {:>3}  {}", s.count(level), level.description());
    }
    out
}

fn main() -> Result<()> {
    // Initialize logging.
    //
    // Default behavior:
    // - interactive TTY: log to a file so the table stays readable
    // - non-interactive: log to stdout
    let log_mode = std::env::var("CHRONICARE_LOG_MODE").unwrap_or_else(|_| "auto".to_string());

    let interactive = std::io::stdout().is_terminal();
    let use_file = match log_mode.as_str() {
        "file" => true,
        "stdout" => false,
        // auto
        _ => interactive,
    };

    let (writer, _guard) = if use_file {
        let log_file =
            std::env::var("CHRONICARE_LOG_FILE").unwrap_or_else(|_| "chronicare.log".to_string());

        if let Some(parent) = std::path::Path::new(&log_file).parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("cannot open log file {log_file}"))?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stdout())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    tracing::info!("Starting Chronicare...");

    let config = PipelineConfig::from_env().context("invalid configuration")?;

    // A model that cannot be loaded is fatal before any scoring.
    let cache = ArtifactCache::new(config.refresh_policy());
    let classifier: Arc<dyn RiskClassifier> = config
        .load_model(&cache)
        .context("model artifact unavailable")?;
    let explainer = config.explainer.build(Arc::clone(&classifier));

    let pipeline = RiskPipeline::new(config.loader(), classifier, explainer);
    let report = pipeline
        .run_path(&config.data_path)
        .with_context(|| format!("risk run failed for {}", config.data_path.display()))?;

    print!("{}", render_table(&report, config.risk_threshold));

    tracing::info!("Chronicare run complete.");
    Ok(())
}

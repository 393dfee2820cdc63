//! # Awful Press Digest
//!
//! Folds the day's newspaper editions into one deduplicated digest with full
//! source attribution. The binary is meant to run several times a day on a
//! schedule: each run picks up whichever editions have arrived since the
//! last one, without re-reading editions it already folded in.
//!
//! ## Usage
//!
//! ```sh
//! awful_press_digest -c digest.yaml -i ./inbox -o ./docs
//! ```
//!
//! ## Architecture
//!
//! One run is one reconciliation pass:
//! 1. **Load**: Read today's state (fresh on a new day or a corrupt file)
//! 2. **List**: Find editions available in today's inbox folder
//! 3. **Extract**: One LLM request per new edition
//! 4. **Deduplicate**: Local TF-IDF clustering, then at most one batched merge request
//! 5. **Save**: Persist the new state and write the digest JSON

use awful_aj::{config as aj_config, config_dir, template};
use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::{Duration as StdDuration, Instant};
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod api;
mod cli;
mod collaborators;
mod config;
mod dedup;
mod error;
mod models;
mod outputs;
mod reconcile;
mod state;
mod utils;

use api::{AskFnWrapper, TimeoutAsk};
use cli::Cli;
use collaborators::{InboxListing, LlmExtractor};
use dedup::similarity::TfIdfModel;
use error::DigestError;
use models::{Digest, DigestPhase, DigestState};
use outputs::json;
use reconcile::{completion_gate, expected_source_set, PassOutcome, Reconciler, SkipReason};
use utils::{ensure_writable_dir, today_at_offset};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    info!("press_digest starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // ---- Digest configuration ----
    let mut digest_config = config::load_config(Path::new(&args.config))?;
    args.apply_overrides(&mut digest_config);

    let today = args
        .date
        .unwrap_or_else(|| today_at_offset(digest_config.utc_offset_minutes));
    let expected = expected_source_set(
        &digest_config.expected_sources,
        digest_config.weekly_exclusion.as_ref(),
        today,
    );
    info!(%today, expected = expected.len(), force = args.force, "Digest day resolved");

    // Early check: ensure the output dir is writable
    if let Err(e) = ensure_writable_dir(&digest_config.output_dir).await {
        error!(
            path = %digest_config.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let listing = InboxListing::from_config(&digest_config, PathBuf::from(&digest_config.inbox_dir))?;
    let state_path = PathBuf::from(&digest_config.state_path);
    let loaded = state::load_state(&state_path, today).await;

    // A complete day needs neither the LLM config nor the templates.
    if let Some(reason) = completion_gate(&loaded, args.force) {
        info!(?reason, "Nothing to fold in this run");
        write_output(&loaded, &digest_config.output_dir).await;
        log_completion(start_time, &loaded);
        return Ok(());
    }

    // ---- Load LLM config & templates ----
    let conf_file = match &args.llm_config {
        Some(path) => PathBuf::from(path),
        None => config_dir()?.join("config.yaml"),
    };
    let config_path = conf_file.to_str().ok_or("LLM config path is not valid UTF-8")?;
    let llm_config = aj_config::load_config(config_path)?;
    info!(config_path, "Loaded LLM configuration");

    let extraction_template = template::load_template(&digest_config.extraction_template).await?;
    let merge_template = template::load_template(&digest_config.merge_template).await?;
    info!(
        extraction = %digest_config.extraction_template,
        merge = %digest_config.merge_template,
        "Loaded templates"
    );

    // ---- Collaborators ----
    let extractor = LlmExtractor::new(
        TimeoutAsk::new(
            AskFnWrapper { config: &llm_config, template: &extraction_template },
            StdDuration::from_secs(digest_config.extraction_timeout_secs),
        ),
        &digest_config,
    );
    let merger = TimeoutAsk::new(
        AskFnWrapper { config: &llm_config, template: &merge_template },
        StdDuration::from_secs(digest_config.merge_timeout_secs),
    );

    // ---- Reconciliation pass ----
    let reconciler = Reconciler {
        listing: &listing,
        extractor: &extractor,
        model: &TfIdfModel,
        merger: &merger,
        expected,
        threshold: digest_config.similarity_threshold,
    };
    let (digest_state, outcome) = reconciler.run_pass(loaded, args.force).await;

    match &outcome {
        PassOutcome::Applied(report) => {
            state::save_state(&state_path, &digest_state).await?;
            if !report.failed_sources.is_empty() {
                warn!(failed = ?report.failed_sources, "Some editions contributed no articles");
            }
            if report.degraded_merge {
                warn!("Duplicate clusters were merged with the fallback heuristic");
            }
            info!(
                new_sources = ?report.new_sources,
                raw_articles = report.raw_articles,
                articles = report.articles,
                merged_clusters = report.merged_clusters,
                merge_calls = report.merge_calls,
                "Pass applied"
            );
        }
        PassOutcome::Skipped(SkipReason::NoSourcesAvailable) if digest_state.phase() == DigestPhase::Fresh => {
            error!(%today, "No editions available and nothing built yet today");
            return Err(DigestError::NoSourcesAvailable(today.to_string()).into());
        }
        PassOutcome::Skipped(reason) => {
            info!(?reason, "Nothing to fold in this run");
        }
    }

    // ---- Output ----
    write_output(&digest_state, &digest_config.output_dir).await;
    log_completion(start_time, &digest_state);

    Ok(())
}

/// Write the digest JSON once anything has been folded in today.
async fn write_output(digest_state: &DigestState, output_dir: &str) {
    if digest_state.phase() == DigestPhase::Fresh {
        return;
    }
    let digest = Digest::from_state(digest_state, Utc::now());
    if let Err(e) = json::write_digest(&digest, output_dir).await {
        error!(error = %e, "Failed to write digest JSON");
    }
}

fn log_completion(start_time: Instant, digest_state: &DigestState) {
    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        phase = ?digest_state.phase(),
        articles = digest_state.accumulated_articles.len(),
        "Execution complete"
    );
}

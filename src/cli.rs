//! Command-line interface definitions for Awful Press Digest.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Path options override the matching fields of the digest configuration
//! file, and most can also be set through environment variables.

use crate::config::DigestConfig;
use chrono::NaiveDate;
use clap::Parser;

/// Command-line arguments for the Awful Press Digest application.
///
/// # Examples
///
/// ```sh
/// # Routine scheduled pass with the default digest.yaml
/// awful_press_digest
///
/// # Custom config and state location
/// awful_press_digest -c /etc/digest.yaml --state-file /var/lib/digest/state.json
///
/// # Re-run today even though every expected paper is already in
/// awful_press_digest --force
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the digest configuration file (YAML)
    #[arg(short, long, env = "DIGEST_CONFIG", default_value = "digest.yaml")]
    pub config: String,

    /// Path to the awful_aj LLM config.yaml (defaults to awful_aj's config dir)
    #[arg(long, env = "DIGEST_LLM_CONFIG")]
    pub llm_config: Option<String>,

    /// Where today's reconciliation state is persisted
    #[arg(long, env = "DIGEST_STATE_FILE")]
    pub state_file: Option<String>,

    /// Directory holding one YYYY-MM-DD folder of edition text files per day
    #[arg(short, long, env = "DIGEST_INBOX_DIR")]
    pub inbox_dir: Option<String>,

    /// Output directory for the digest JSON
    #[arg(short, long, env = "DIGEST_OUTPUT_DIR")]
    pub output_dir: Option<String>,

    /// Run the pass even if today's digest is already complete
    #[arg(long)]
    pub force: bool,

    /// Treat this date (YYYY-MM-DD) as today
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

impl Cli {
    /// Apply path overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut DigestConfig) {
        if let Some(path) = &self.state_file {
            config.state_path = path.clone();
        }
        if let Some(dir) = &self.inbox_dir {
            config.inbox_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
    }
}

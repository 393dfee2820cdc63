//! Digest configuration loaded from a YAML file.
//!
//! Every field has a default, so a missing file or a partial file is valid.
//! The defaults describe a deployment over nine Indian dailies,
//! dated in IST, with two business papers that do not print on Sundays.
//!
//! # Example
//!
//! ```yaml
//! similarity_threshold: 0.4
//! state_path: /var/lib/digest/state.json
//! weekly_exclusion:
//!   weekday: Sun
//!   sources: ["Business Standard", "Mint"]
//! ```

use crate::dedup::similarity::DEFAULT_SIMILARITY_THRESHOLD;
use crate::error::{DigestError, Result};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, instrument};

/// Sources that are never expected on one day of the week.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WeeklyExclusion {
    pub weekday: Weekday,
    pub sources: Vec<String>,
}

/// Maps a normalised filename fragment to a newspaper.
///
/// Lower `priority` wins when several editions of one paper are available
/// (1 = Bengaluru, 2 = Delhi, 3 = any edition). When several keywords match
/// one filename at the same priority, the longest keyword decides the paper.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SourceKeyword {
    pub keyword: String,
    pub source: String,
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DigestConfig {
    /// Catalog of newspapers a complete day contains.
    pub expected_sources: Vec<String>,
    pub weekly_exclusion: Option<WeeklyExclusion>,
    /// Cosine similarity at or above which two articles are duplicates.
    pub similarity_threshold: f64,
    /// Labels the extractor may assign.
    pub categories: Vec<String>,
    /// Used when the extractor returns no category or an unknown one.
    pub default_category: String,
    /// Offset of the newspapers' home time zone, in minutes east of UTC.
    pub utc_offset_minutes: i32,
    pub state_path: String,
    /// Holds one `<YYYY-MM-DD>/` directory of edition text files per day.
    pub inbox_dir: String,
    pub output_dir: String,
    pub merge_timeout_secs: u64,
    pub extraction_timeout_secs: u64,
    /// Edition text beyond this many characters is dropped before extraction.
    pub max_document_chars: usize,
    /// awful_aj template used for extraction requests.
    pub extraction_template: String,
    /// awful_aj template used for the merge request.
    pub merge_template: String,
    /// Public base URL the edition files are served from, if any.
    pub reference_base_url: Option<String>,
    pub source_keywords: Vec<SourceKeyword>,
    /// Filename fragments marking supplements and inserts.
    pub skip_keywords: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_keywords() -> Vec<SourceKeyword> {
    let table: &[(&str, &str, u8)] = &[
        ("thehindubengaluru", "The Hindu", 1),
        ("thehindubangalore", "The Hindu", 1),
        ("hindubengaluru", "The Hindu", 1),
        ("hindubangalore", "The Hindu", 1),
        ("thehindudelhi", "The Hindu", 2),
        ("hindudelhi", "The Hindu", 2),
        ("thehindu", "The Hindu", 3),
        ("indianexpressbengaluru", "Indian Express", 1),
        ("indianexpressbangalore", "Indian Express", 1),
        ("iebengaluru", "Indian Express", 1),
        ("iebangalore", "Indian Express", 1),
        ("indianexpressdelhi", "Indian Express", 2),
        ("iedelhi", "Indian Express", 2),
        ("indianexpress", "Indian Express", 3),
        ("financialexpressbengaluru", "Financial Express", 1),
        ("financialexpressbangalore", "Financial Express", 1),
        ("febengaluru", "Financial Express", 1),
        ("febangalore", "Financial Express", 1),
        ("financialexpressdelhi", "Financial Express", 2),
        ("fedelhi", "Financial Express", 2),
        ("financialexpress", "Financial Express", 3),
        ("toibengaluru", "Times of India", 1),
        ("toibangalore", "Times of India", 1),
        ("bengalurutoi", "Times of India", 1),
        ("bangaloretoi", "Times of India", 1),
        ("toidelhi", "Times of India", 2),
        ("delhitoi", "Times of India", 2),
        ("timeofindia", "Times of India", 3),
        ("timesofindia", "Times of India", 3),
        ("htbengaluru", "Hindustan Times", 1),
        ("htbangalore", "Hindustan Times", 1),
        ("hindustantimesbengaluru", "Hindustan Times", 1),
        ("hindustantimesbangalore", "Hindustan Times", 1),
        ("htdelhi", "Hindustan Times", 2),
        ("hindustantimesdelhi", "Hindustan Times", 2),
        ("hindustantimes", "Hindustan Times", 3),
        ("etbengaluru", "Economic Times", 1),
        ("etbangalore", "Economic Times", 1),
        ("bengalureet", "Economic Times", 1),
        ("bengaluruet", "Economic Times", 1),
        ("bangaloreet", "Economic Times", 1),
        ("etdelhi", "Economic Times", 2),
        ("delhiet", "Economic Times", 2),
        ("economictimes", "Economic Times", 3),
        ("businesslinebengaluru", "Business Line", 1),
        ("businesslinebangalore", "Business Line", 1),
        ("blbengaluru", "Business Line", 1),
        ("blbangalore", "Business Line", 1),
        ("thehindubusinesslinebengaluru", "Business Line", 1),
        ("thehindubusinesslinebangalore", "Business Line", 1),
        ("businesslinedelhi", "Business Line", 2),
        ("bldelhi", "Business Line", 2),
        ("businessline", "Business Line", 3),
        ("thehindubusinessline", "Business Line", 3),
        ("businessstandardbengaluru", "Business Standard", 1),
        ("businessstandardbangalore", "Business Standard", 1),
        ("bsbengaluru", "Business Standard", 1),
        ("bsbangalore", "Business Standard", 1),
        ("businessstandarddelhi", "Business Standard", 2),
        ("bsdelhi", "Business Standard", 2),
        ("businessstandard", "Business Standard", 3),
        ("mintbengaluru", "Mint", 1),
        ("mintbangalore", "Mint", 1),
        ("bengalurumint", "Mint", 1),
        ("bangaloremint", "Mint", 1),
        ("mintdelhi", "Mint", 2),
        ("delhimint", "Mint", 2),
        ("livemintdelhi", "Mint", 2),
        ("livemint", "Mint", 3),
        ("mint", "Mint", 3),
    ];
    table
        .iter()
        .map(|&(keyword, source, priority)| SourceKeyword {
            keyword: keyword.to_string(),
            source: source.to_string(),
            priority,
        })
        .collect()
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            expected_sources: strings(&[
                "The Hindu",
                "Indian Express",
                "Financial Express",
                "Times of India",
                "Hindustan Times",
                "Economic Times",
                "Business Line",
                "Business Standard",
                "Mint",
            ]),
            weekly_exclusion: Some(WeeklyExclusion {
                weekday: Weekday::Sun,
                sources: strings(&["Business Standard", "Mint"]),
            }),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            categories: strings(&[
                "Politics", "Economy", "Business", "India", "World", "Sports", "Science",
                "Technology", "Health", "Law", "Environment", "Education", "Culture",
                "Infrastructure",
            ]),
            default_category: "India".to_string(),
            utc_offset_minutes: 330,
            state_path: "digest_state.json".to_string(),
            inbox_dir: "inbox".to_string(),
            output_dir: "docs".to_string(),
            merge_timeout_secs: 300,
            extraction_timeout_secs: 600,
            max_document_chars: 900_000,
            extraction_template: "digest_extractor".to_string(),
            merge_template: "digest_merger".to_string(),
            reference_base_url: None,
            source_keywords: default_keywords(),
            skip_keywords: strings(&["indulge", "magazine", "epaperad", "advertis"]),
        }
    }
}

impl DigestConfig {
    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(DigestError::InvalidConfig {
                field: "similarity_threshold".to_string(),
                value: self.similarity_threshold.to_string(),
            });
        }
        if self.expected_sources.is_empty() {
            return Err(DigestError::InvalidConfig {
                field: "expected_sources".to_string(),
                value: "[]".to_string(),
            });
        }
        if !self.categories.contains(&self.default_category) {
            return Err(DigestError::InvalidConfig {
                field: "default_category".to_string(),
                value: self.default_category.clone(),
            });
        }
        if self.merge_timeout_secs == 0 || self.extraction_timeout_secs == 0 {
            return Err(DigestError::InvalidConfig {
                field: "timeout".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Load and validate the configuration at `path`; a missing file yields defaults.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn load_config(path: &Path) -> Result<DigestConfig> {
    let config = if path.exists() {
        let text = std::fs::read_to_string(path)?;
        let config: DigestConfig = serde_yaml::from_str(&text)?;
        info!("Loaded digest configuration");
        config
    } else {
        info!("No digest configuration file; using defaults");
        DigestConfig::default()
    };
    config.validate()?;
    Ok(config)
}

//! Data models for extracted articles, merged digest entries, and per-day state.
//!
//! This module defines the core data structures used throughout the application:
//! - [`RawArticle`]: One article as extracted from a single newspaper edition
//! - [`Source`]: Attribution of a digest entry back to an edition and page
//! - [`MergedArticle`]: The unit of the final digest
//! - [`DigestEntry`]: Either of the two article shapes, as fed to clustering
//! - [`DigestState`]: Per-day progress persisted between runs
//! - [`Digest`]: The structure handed to downstream renderers and notifiers

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Importance assigned when the extractor does not rate an article.
pub const DEFAULT_IMPORTANCE: u8 = 5;

/// A single article extracted from one newspaper edition.
///
/// Optional fields are resolved when the value is built, so consumers never
/// have to guess at defaults: `page` is at least 1 and `importance` is always
/// within `1..=10`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RawArticle {
    pub headline: String,
    pub summary: String,
    pub category: String,
    /// Newspaper name, e.g. "The Hindu".
    pub source_name: String,
    /// Identifier of the edition document (its file name).
    pub source_document_id: String,
    pub page: u32,
    pub importance: u8,
    pub external_reference_url: Option<String>,
}

impl RawArticle {
    pub fn new(
        headline: impl Into<String>,
        summary: impl Into<String>,
        category: impl Into<String>,
        source_name: impl Into<String>,
        source_document_id: impl Into<String>,
    ) -> Self {
        Self {
            headline: headline.into(),
            summary: summary.into(),
            category: category.into(),
            source_name: source_name.into(),
            source_document_id: source_document_id.into(),
            page: 1,
            importance: DEFAULT_IMPORTANCE,
            external_reference_url: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn with_importance(mut self, importance: u8) -> Self {
        self.importance = importance.clamp(1, 10);
        self
    }

    pub fn with_reference_url(mut self, url: Option<String>) -> Self {
        self.external_reference_url = url;
        self
    }

    /// The attribution entry this article contributes to a cluster.
    pub fn source(&self) -> Source {
        Source {
            source_name: self.source_name.clone(),
            source_document_id: self.source_document_id.clone(),
            page: self.page,
            external_reference_url: self.external_reference_url.clone(),
        }
    }
}

/// Where a digest entry was printed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Source {
    pub source_name: String,
    pub source_document_id: String,
    pub page: u32,
    #[serde(default)]
    pub external_reference_url: Option<String>,
}

/// One story in the final digest, attributed to every newspaper that ran it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MergedArticle {
    pub headline: String,
    pub summary: String,
    pub category: String,
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<u8>,
}

impl From<RawArticle> for MergedArticle {
    fn from(article: RawArticle) -> Self {
        let sources = vec![article.source()];
        Self {
            headline: article.headline,
            summary: article.summary,
            category: article.category,
            sources,
            importance: Some(article.importance),
        }
    }
}

/// A clusterable text record.
///
/// Previously merged articles are re-clustered alongside freshly extracted
/// ones, so the pipeline works over both shapes through this one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestEntry {
    Raw(RawArticle),
    Merged(MergedArticle),
}

impl DigestEntry {
    pub fn headline(&self) -> &str {
        match self {
            DigestEntry::Raw(a) => &a.headline,
            DigestEntry::Merged(a) => &a.headline,
        }
    }

    pub fn summary(&self) -> &str {
        match self {
            DigestEntry::Raw(a) => &a.summary,
            DigestEntry::Merged(a) => &a.summary,
        }
    }

    pub fn category(&self) -> &str {
        match self {
            DigestEntry::Raw(a) => &a.category,
            DigestEntry::Merged(a) => &a.category,
        }
    }

    pub fn importance(&self) -> Option<u8> {
        match self {
            DigestEntry::Raw(a) => Some(a.importance),
            DigestEntry::Merged(a) => a.importance,
        }
    }

    /// Sources already attached to this record, in attribution order.
    pub fn sources(&self) -> Vec<Source> {
        match self {
            DigestEntry::Raw(a) => vec![a.source()],
            DigestEntry::Merged(a) => a.sources.clone(),
        }
    }

    /// Newspaper name(s) shown to the merge capability for this member.
    pub fn source_label(&self) -> String {
        match self {
            DigestEntry::Raw(a) => a.source_name.clone(),
            DigestEntry::Merged(a) => a
                .sources
                .iter()
                .map(|s| s.source_name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Text the similarity model vectorizes.
    pub fn text(&self) -> String {
        format!("{} {}", self.headline(), self.summary())
    }

    /// Pass a record through unchanged as a digest entry.
    pub fn into_merged(self) -> MergedArticle {
        match self {
            DigestEntry::Raw(a) => a.into(),
            DigestEntry::Merged(a) => a,
        }
    }
}

impl From<RawArticle> for DigestEntry {
    fn from(article: RawArticle) -> Self {
        DigestEntry::Raw(article)
    }
}

impl From<MergedArticle> for DigestEntry {
    fn from(article: MergedArticle) -> Self {
        DigestEntry::Merged(article)
    }
}

/// Where a day's digest stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestPhase {
    /// Nothing folded in yet today.
    Fresh,
    InProgress,
    /// Every expected source has been folded in.
    Complete,
}

/// Per-day reconciliation progress, persisted between runs.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DigestState {
    /// Calendar day this state belongs to; a mismatch on load means rollover.
    pub date: NaiveDate,
    #[serde(default)]
    pub processed_sources: BTreeSet<String>,
    #[serde(default)]
    pub accumulated_articles: Vec<MergedArticle>,
    #[serde(default)]
    pub is_complete: bool,
    /// Number of passes that changed this state.
    #[serde(default)]
    pub passes: u32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DigestState {
    pub fn fresh(date: NaiveDate) -> Self {
        Self {
            date,
            processed_sources: BTreeSet::new(),
            accumulated_articles: Vec::new(),
            is_complete: false,
            passes: 0,
            updated_at: None,
        }
    }

    pub fn phase(&self) -> DigestPhase {
        if self.is_complete {
            DigestPhase::Complete
        } else if self.processed_sources.is_empty() {
            DigestPhase::Fresh
        } else {
            DigestPhase::InProgress
        }
    }
}

/// The digest handed to renderers and notifiers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Digest {
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub total_articles: usize,
    pub is_complete: bool,
    /// Newspapers folded into this digest.
    pub newspapers: Vec<String>,
    pub articles: Vec<MergedArticle>,
}

impl Digest {
    pub fn from_state(state: &DigestState, generated_at: DateTime<Utc>) -> Self {
        Self {
            date: state.date,
            generated_at,
            total_articles: state.accumulated_articles.len(),
            is_complete: state.is_complete,
            newspapers: state.processed_sources.iter().cloned().collect(),
            articles: state.accumulated_articles.clone(),
        }
    }
}

//! Incremental reconciliation of a day's digest.
//!
//! A day's digest is built by several runs, each folding in whichever
//! editions became available since the last one. One pass:
//!
//! 1. skip if today is already complete (unless forced)
//! 2. list available editions; `new = available - processed`; skip if empty
//! 3. extract articles from each new edition only
//! 4. deduplicate `accumulated ∪ new articles` (at most one merge call)
//! 5. replace the accumulated articles, mark the new editions processed,
//!    recompute completeness
//!
//! State goes in as a value and comes back out as a value; loading and
//! saving it is the caller's job (see [`crate::state`]).

use crate::api::AskAsync;
use crate::collaborators::{Extractor, SourceListing};
use crate::config::WeeklyExclusion;
use crate::dedup::deduplicate;
use crate::dedup::similarity::SimilarityModel;
use crate::models::{DigestEntry, DigestPhase, DigestState};
use chrono::{Datelike, NaiveDate, Utc};
use std::collections::BTreeSet;
use tracing::{info, instrument, warn};

/// Newspapers a complete digest for `date` must contain.
pub fn expected_source_set(
    catalog: &[String],
    exclusion: Option<&WeeklyExclusion>,
    date: NaiveDate,
) -> BTreeSet<String> {
    let mut expected: BTreeSet<String> = catalog.iter().cloned().collect();
    if let Some(ex) = exclusion.filter(|ex| ex.weekday == date.weekday()) {
        for source in &ex.sources {
            expected.remove(source);
        }
    }
    expected
}

/// Why a pass left the state untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Every expected edition is already in; only a forced run continues.
    AlreadyComplete,
    /// The listing returned nothing at all (or failed).
    NoSourcesAvailable,
    /// Every available edition was folded in by an earlier pass.
    NothingNew,
}

/// The gate at the start of every pass: a complete day stays untouched unless forced.
///
/// Checked on its own by the binary before any LLM configuration is loaded.
pub fn completion_gate(state: &DigestState, force: bool) -> Option<SkipReason> {
    (state.phase() == DigestPhase::Complete && !force).then_some(SkipReason::AlreadyComplete)
}

/// What an applied pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    /// Editions folded in by this pass, in listing order.
    pub new_sources: Vec<String>,
    /// New editions whose extraction failed; still marked processed.
    pub failed_sources: Vec<String>,
    pub raw_articles: usize,
    pub articles: usize,
    /// Duplicate clusters sent to the merge step.
    pub merged_clusters: usize,
    /// 0 or 1.
    pub merge_calls: usize,
    pub degraded_merge: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    Skipped(SkipReason),
    Applied(PassReport),
}

/// Everything a pass talks to, plus the day's expected source set.
pub struct Reconciler<'a, L, E, M, A> {
    pub listing: &'a L,
    pub extractor: &'a E,
    pub model: &'a M,
    pub merger: &'a A,
    pub expected: BTreeSet<String>,
    pub threshold: f64,
}

impl<'a, L, E, M, A> Reconciler<'a, L, E, M, A>
where
    L: SourceListing,
    E: Extractor,
    M: SimilarityModel,
    A: AskAsync<Response = String>,
{
    /// Run one pass over `state`, returning the new state and what happened.
    #[instrument(level = "info", skip_all, fields(date = %state.date, force))]
    pub async fn run_pass(&self, mut state: DigestState, force: bool) -> (DigestState, PassOutcome) {
        let phase_before = state.phase();
        if let Some(reason) = completion_gate(&state, force) {
            info!("Today's digest is already complete");
            return (state, PassOutcome::Skipped(reason));
        }

        let available = match self.listing.list_available_sources(state.date).await {
            Ok(available) => available,
            Err(e) => {
                warn!(error = %e, "Source listing failed; treating as no sources available");
                return (state, PassOutcome::Skipped(SkipReason::NoSourcesAvailable));
            }
        };
        if available.is_empty() {
            info!("No editions available yet");
            return (state, PassOutcome::Skipped(SkipReason::NoSourcesAvailable));
        }

        let new_sources: Vec<(&String, _)> = available
            .iter()
            .filter(|(name, _)| !state.processed_sources.contains(*name))
            .collect();
        if new_sources.is_empty() {
            info!(available = available.len(), "No new editions since the last pass");
            return (state, PassOutcome::Skipped(SkipReason::NothingNew));
        }
        info!(
            new = ?new_sources.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            already = state.processed_sources.len(),
            "Folding in new editions"
        );

        let mut report = PassReport::default();
        let mut fresh_articles: Vec<DigestEntry> = Vec::new();
        for (name, document) in &new_sources {
            match self.extractor.extract(name, document).await {
                Ok(articles) => {
                    info!(source = %name, count = articles.len(), "Extracted edition");
                    fresh_articles.extend(articles.into_iter().map(DigestEntry::Raw));
                }
                Err(e) => {
                    warn!(source = %name, error = %e, "Extraction failed; edition contributes nothing");
                    report.failed_sources.push(name.to_string());
                }
            }
            report.new_sources.push(name.to_string());
        }
        report.raw_articles = fresh_articles.len();

        let mut pool: Vec<DigestEntry> = std::mem::take(&mut state.accumulated_articles)
            .into_iter()
            .map(DigestEntry::Merged)
            .collect();
        pool.extend(fresh_articles);

        let dedup = deduplicate(pool, self.model, self.merger, self.threshold).await;
        report.articles = dedup.articles.len();
        report.merged_clusters = dedup.merged_clusters;
        report.merge_calls = dedup.merge_calls;
        report.degraded_merge = dedup.degraded;

        state.accumulated_articles = dedup.articles;
        state.processed_sources.extend(report.new_sources.iter().cloned());
        state.is_complete = state.processed_sources.is_superset(&self.expected);
        state.passes += 1;
        state.updated_at = Some(Utc::now());

        let missing: Vec<&String> = self.expected.difference(&state.processed_sources).collect();
        info!(
            from = ?phase_before,
            to = ?state.phase(),
            articles = report.articles,
            merge_calls = report.merge_calls,
            ?missing,
            "Pass applied"
        );
        (state, PassOutcome::Applied(report))
    }
}

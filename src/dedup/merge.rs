//! Batched merging of duplicate clusters.
//!
//! Every multi-member cluster of a pass, across all categories, goes out in
//! one request. The response must be a JSON array with one
//! `{headline, summary, category}` object per cluster, in request order.
//! Anything else (transport error, timeout, bad JSON, wrong length, an empty
//! field) fails the whole batch, and every cluster falls back to its member
//! with the longest summary.
//!
//! Source attribution is computed before the call and attached afterwards
//! on both paths.

use crate::api::AskAsync;
use crate::error::{DigestError, Result};
use crate::models::{DigestEntry, MergedArticle, Source};
use crate::utils::{strip_code_fences, truncate_for_log};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Upper bound on merged headline length, in words.
pub const MAX_HEADLINE_WORDS: usize = 12;

/// A duplicate cluster waiting for the batched merge call.
#[derive(Debug, Clone)]
pub struct PendingCluster {
    pub category: String,
    pub members: Vec<DigestEntry>,
    pub sources: Vec<Source>,
}

#[derive(Debug, Serialize)]
struct MergeMember<'a> {
    headline: &'a str,
    summary: &'a str,
    source_name: String,
}

#[derive(Debug, Serialize)]
struct MergeGroup<'a> {
    category: &'a str,
    member_articles: Vec<MergeMember<'a>>,
}

/// One synthesized article from the merge response.
#[derive(Debug, Clone, Deserialize)]
pub struct MergedText {
    pub headline: String,
    pub summary: String,
    pub category: String,
}

/// What a merge step produced and what it cost.
#[derive(Debug)]
pub struct MergeReport {
    /// One article per submitted cluster, in submission order.
    pub articles: Vec<MergedArticle>,
    /// Outbound requests issued: 0 or 1.
    pub calls: usize,
    /// True when the fallback heuristic was used.
    pub degraded: bool,
}

/// Build the single outbound merge request for `clusters`.
pub fn build_merge_prompt(clusters: &[PendingCluster]) -> Result<String> {
    let groups: Vec<MergeGroup<'_>> = clusters
        .iter()
        .map(|c| MergeGroup {
            category: &c.category,
            member_articles: c
                .members
                .iter()
                .map(|m| MergeMember {
                    headline: m.headline(),
                    summary: m.summary(),
                    source_name: m.source_label(),
                })
                .collect(),
        })
        .collect();
    let groups_json = serde_json::to_string_pretty(&groups)?;
    let n = clusters.len();

    Ok(format!(
        "You are a news editor. Several newspapers covered the same stories.\n\
         Below are {n} groups of duplicate articles. Each group holds articles from different newspapers about the same event.\n\
         \n\
         For EACH group, produce one merged article that:\n\
         - Combines the unique facts from every member into one coherent summary of 3-4 sentences\n\
         - Uses the single best, most informative headline among the members (max {MAX_HEADLINE_WORDS} words)\n\
         - Keeps the group's category unchanged\n\
         \n\
         Return ONLY a valid JSON array with exactly {n} objects, one per group, in the same order.\n\
         Each object must have:\n\
         - \"headline\": the best headline (max {MAX_HEADLINE_WORDS} words)\n\
         - \"summary\": the merged 3-4 sentence summary\n\
         - \"category\": the group's category\n\
         \n\
         Groups:\n\
         {groups_json}\n\
         \n\
         Return ONLY the JSON array. No markdown, no explanation."
    ))
}

/// Parse and validate a merge response against the number of clusters sent.
pub fn parse_merge_response(raw: &str, expected: usize) -> Result<Vec<MergedText>> {
    let items: Vec<MergedText> = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| DigestError::MergeCallFailed(format!("malformed response: {e}")))?;

    if items.len() != expected {
        return Err(DigestError::MergeCallFailed(format!(
            "expected {expected} merged articles, got {}",
            items.len()
        )));
    }
    if let Some(pos) = items
        .iter()
        .position(|m| m.headline.trim().is_empty() || m.summary.trim().is_empty())
    {
        return Err(DigestError::MergeCallFailed(format!("item {pos} has an empty headline or summary")));
    }
    Ok(items)
}

/// Longest-summary-wins stand-in for a cluster; ties go to the earlier member.
pub fn fallback_merge(cluster: &PendingCluster) -> MergedArticle {
    let best = cluster
        .members
        .iter()
        .reduce(|best, m| {
            if m.summary().chars().count() > best.summary().chars().count() {
                m
            } else {
                best
            }
        });

    match best {
        Some(best) => MergedArticle {
            headline: best.headline().to_string(),
            summary: best.summary().to_string(),
            category: best.category().to_string(),
            sources: cluster.sources.clone(),
            importance: best.importance(),
        },
        None => MergedArticle {
            headline: String::new(),
            summary: String::new(),
            category: cluster.category.clone(),
            sources: cluster.sources.clone(),
            importance: None,
        },
    }
}

fn from_response(cluster: &PendingCluster, text: MergedText) -> MergedArticle {
    if text.category != cluster.category {
        warn!(
            expected = %cluster.category,
            returned = %text.category,
            "Merge response changed a category; keeping the cluster's"
        );
    }
    MergedArticle {
        headline: text.headline.trim().to_string(),
        summary: text.summary.trim().to_string(),
        category: cluster.category.clone(),
        sources: cluster.sources.clone(),
        importance: cluster.members.iter().filter_map(DigestEntry::importance).max(),
    }
}

/// Merge every pending cluster with at most one call to `api`.
#[instrument(level = "info", skip_all, fields(clusters = clusters.len()))]
pub async fn merge_clusters<A>(api: &A, clusters: &[PendingCluster]) -> MergeReport
where
    A: AskAsync<Response = String>,
{
    if clusters.is_empty() {
        return MergeReport { articles: Vec::new(), calls: 0, degraded: false };
    }

    let prompt = match build_merge_prompt(clusters) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "Could not build merge request; using longest-summary fallback");
            return MergeReport {
                articles: clusters.iter().map(fallback_merge).collect(),
                calls: 0,
                degraded: true,
            };
        }
    };

    let outcome = match api.ask(&prompt).await {
        Ok(raw) => parse_merge_response(&raw, clusters.len()).inspect_err(|_| {
            warn!(response_preview = %truncate_for_log(&raw, 300), "Unusable merge response");
        }),
        Err(e) => Err(DigestError::MergeCallFailed(e.to_string())),
    };

    match outcome {
        Ok(texts) => {
            info!(clusters = clusters.len(), "Merged all clusters in one call");
            MergeReport {
                articles: clusters
                    .iter()
                    .zip(texts)
                    .map(|(c, t)| from_response(c, t))
                    .collect(),
                calls: 1,
                degraded: false,
            }
        }
        Err(e) => {
            warn!(error = %e, clusters = clusters.len(), "Batch merge failed; falling back to longest summary per cluster");
            MergeReport {
                articles: clusters.iter().map(fallback_merge).collect(),
                calls: 1,
                degraded: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawArticle;
    use std::cell::{Cell, RefCell};
    use std::error::Error;

    #[derive(Debug)]
    struct Canned {
        reply: std::result::Result<String, String>,
        calls: Cell<usize>,
        last_prompt: RefCell<String>,
    }

    impl Canned {
        fn ok(reply: &str) -> Self {
            Self { reply: Ok(reply.to_string()), calls: Cell::new(0), last_prompt: RefCell::new(String::new()) }
        }

        fn failing() -> Self {
            Self { reply: Err("connection reset".to_string()), calls: Cell::new(0), last_prompt: RefCell::new(String::new()) }
        }
    }

    impl AskAsync for Canned {
        type Response = String;

        async fn ask(&self, text: &str) -> std::result::Result<String, Box<dyn Error>> {
            self.calls.set(self.calls.get() + 1);
            *self.last_prompt.borrow_mut() = text.to_string();
            self.reply.clone().map_err(Into::into)
        }
    }

    fn member(source: &str, summary: &str) -> DigestEntry {
        RawArticle::new(format!("{source} headline"), summary, "Economy", source, format!("{source}.txt")).into()
    }

    fn pending(members: Vec<DigestEntry>) -> PendingCluster {
        let sources = crate::dedup::sources::attribute_sources(&members);
        PendingCluster { category: "Economy".to_string(), members, sources }
    }

    #[test]
    fn test_fallback_picks_longest_summary() {
        let cluster = pending(vec![
            member("A", &"a".repeat(40)),
            member("B", &"b".repeat(85)),
            member("C", &"c".repeat(12)),
        ]);
        let merged = fallback_merge(&cluster);

        assert_eq!(merged.summary, "b".repeat(85));
        assert_eq!(merged.headline, "B headline");
        assert_eq!(merged.category, "Economy");
        let names: Vec<&str> = merged.sources.iter().map(|s| s.source_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_fallback_ties_go_to_first_member() {
        let cluster = pending(vec![member("A", "same length"), member("B", "same length")]);
        assert_eq!(fallback_merge(&cluster).headline, "A headline");
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let raw = r#"[{"headline":"h","summary":"s","category":"Economy"}]"#;
        assert!(matches!(parse_merge_response(raw, 2), Err(DigestError::MergeCallFailed(_))));
    }

    #[test]
    fn test_parse_rejects_missing_fields_and_empty_text() {
        assert!(parse_merge_response(r#"[{"headline":"h"}]"#, 1).is_err());
        assert!(parse_merge_response(r#"[{"headline":" ","summary":"s","category":"x"}]"#, 1).is_err());
        assert!(parse_merge_response("not json", 1).is_err());
    }

    #[test]
    fn test_parse_accepts_fenced_json() {
        let raw = "```json\n[{\"headline\":\"h\",\"summary\":\"s\",\"category\":\"Economy\"}]\n```";
        assert_eq!(parse_merge_response(raw, 1).unwrap()[0].headline, "h");
    }

    #[test]
    fn test_prompt_carries_every_member() {
        let clusters = vec![
            pending(vec![member("A", "first"), member("B", "second")]),
            pending(vec![member("C", "third"), member("D", "fourth")]),
        ];
        let prompt = build_merge_prompt(&clusters).unwrap();
        assert!(prompt.contains("exactly 2 objects"));
        for name in ["A", "B", "C", "D"] {
            assert!(prompt.contains(&format!("\"source_name\": \"{name}\"")));
        }
        assert!(prompt.contains("\"category\": \"Economy\""));
    }

    #[tokio::test]
    async fn test_no_clusters_means_no_call() {
        let api = Canned::ok("[]");
        let report = merge_clusters(&api, &[]).await;
        assert_eq!(report.calls, 0);
        assert_eq!(api.calls.get(), 0);
        assert!(report.articles.is_empty());
    }

    #[tokio::test]
    async fn test_success_uses_response_and_keeps_sources() {
        let api = Canned::ok(
            r#"[
                {"headline":"Merged one","summary":"Combined facts.","category":"Economy"},
                {"headline":"Merged two","summary":"More facts.","category":"Business"}
            ]"#,
        );
        let clusters = vec![
            pending(vec![member("A", "x"), member("B", "y")]),
            pending(vec![member("C", "x"), member("A", "y")]),
        ];
        let report = merge_clusters(&api, &clusters).await;

        assert_eq!(api.calls.get(), 1);
        assert_eq!(report.calls, 1);
        assert!(!report.degraded);
        assert_eq!(report.articles[0].headline, "Merged one");
        assert_eq!(report.articles[1].headline, "Merged two");
        // Category always stays the cluster's own.
        assert_eq!(report.articles[1].category, "Economy");
        assert_eq!(report.articles[1].sources[0].source_name, "C");
        assert_eq!(report.articles[1].sources[1].source_name, "A");
    }

    #[tokio::test]
    async fn test_wrong_length_falls_back_per_cluster() {
        let api = Canned::ok(r#"[{"headline":"only one","summary":"s","category":"Economy"}]"#);
        let clusters = vec![
            pending(vec![
                member("A", &"a".repeat(40)),
                member("B", &"b".repeat(85)),
                member("C", &"c".repeat(12)),
            ]),
            pending(vec![member("D", "short"), member("E", "a bit longer")]),
        ];
        let report = merge_clusters(&api, &clusters).await;

        assert_eq!(api.calls.get(), 1);
        assert!(report.degraded);
        assert_eq!(report.articles.len(), 2);
        assert_eq!(report.articles[0].summary, "b".repeat(85));
        assert_eq!(report.articles[0].sources.len(), 3);
        assert_eq!(report.articles[1].headline, "E headline");
    }

    #[tokio::test]
    async fn test_transport_failure_falls_back() {
        let api = Canned::failing();
        let clusters = vec![pending(vec![member("A", "short"), member("B", "longer one")])];
        let report = merge_clusters(&api, &clusters).await;

        assert_eq!(api.calls.get(), 1);
        assert!(report.degraded);
        assert_eq!(report.articles[0].headline, "B headline");
        assert!(api.last_prompt.borrow().contains("exactly 1 objects"));
    }
}

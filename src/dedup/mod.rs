//! Cross-source deduplication pipeline.
//!
//! # Submodules
//!
//! - [`similarity`]: TF-IDF similarity and anchor-based clustering (local, free)
//! - [`sources`]: Source attribution for a cluster
//! - [`merge`]: One batched merge call for every duplicate cluster, with fallback
//!
//! # Flow
//!
//! ```text
//! pool ──▶ partition by category ──▶ cluster each category
//!                                      │
//!                 single member ◀──────┴──────▶ multi member
//!                      │                            │
//!                 passthrough              cross-category batch
//!                      │                            │
//!                      │                  merge_clusters (≤ 1 call)
//!                      ▼                            ▼
//!                 passthroughs ++ merged outputs ──▶ digest
//! ```

pub mod merge;
pub mod similarity;
pub mod sources;

use crate::api::AskAsync;
use crate::models::{DigestEntry, MergedArticle};
use merge::{merge_clusters, PendingCluster};
use similarity::{cluster_texts, SimilarityModel};
use sources::attribute_sources;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Result of one deduplication run.
#[derive(Debug)]
pub struct DedupReport {
    pub articles: Vec<MergedArticle>,
    /// Calls made to the merge capability: 0 or 1.
    pub merge_calls: usize,
    /// Clusters with more than one member.
    pub merged_clusters: usize,
    /// True when the merge fallback was used.
    pub degraded: bool,
}

/// Group `entries` by category, keeping categories in first-seen order.
pub fn partition_by_category(entries: Vec<DigestEntry>) -> Vec<(String, Vec<DigestEntry>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<DigestEntry>)> = Vec::new();
    for entry in entries {
        let category = entry.category().to_string();
        match index.get(&category) {
            Some(&i) => groups[i].1.push(entry),
            None => {
                index.insert(category.clone(), groups.len());
                groups.push((category, vec![entry]));
            }
        }
    }
    groups
}

/// Deduplicate a pool of raw and previously merged articles.
#[instrument(level = "info", skip_all, fields(pool = entries.len(), threshold))]
pub async fn deduplicate<M, A>(
    entries: Vec<DigestEntry>,
    model: &M,
    api: &A,
    threshold: f64,
) -> DedupReport
where
    M: SimilarityModel,
    A: AskAsync<Response = String>,
{
    let pool_size = entries.len();
    let mut passthrough: Vec<MergedArticle> = Vec::new();
    let mut pending: Vec<PendingCluster> = Vec::new();

    for (category, group) in partition_by_category(entries) {
        let texts: Vec<String> = group.iter().map(DigestEntry::text).collect();
        let clusters = cluster_texts(model, &texts, threshold);
        debug!(%category, articles = group.len(), clusters = clusters.len(), "Clustered category");

        let mut slots: Vec<Option<DigestEntry>> = group.into_iter().map(Some).collect();
        for cluster in clusters {
            let members: Vec<DigestEntry> = cluster.iter().filter_map(|&i| slots[i].take()).collect();
            match members.len() {
                0 => {}
                1 => passthrough.extend(members.into_iter().map(DigestEntry::into_merged)),
                _ => {
                    let sources = attribute_sources(&members);
                    pending.push(PendingCluster { category: category.clone(), members, sources });
                }
            }
        }
    }

    info!(
        unique = passthrough.len(),
        clusters = pending.len(),
        "Clustering done; merging duplicate clusters"
    );

    let report = merge_clusters(api, &pending).await;
    let merged_clusters = pending.len();
    let mut articles = passthrough;
    articles.extend(report.articles);

    info!(
        before = pool_size,
        after = articles.len(),
        merge_calls = report.calls,
        degraded = report.degraded,
        "Deduplication complete"
    );

    DedupReport {
        articles,
        merge_calls: report.calls,
        merged_clusters,
        degraded: report.degraded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawArticle;
    use similarity::TfIdfModel;
    use std::cell::Cell;
    use std::error::Error;

    /// Echoes back one merged object per group found in the prompt.
    #[derive(Debug, Default)]
    struct Editor {
        calls: Cell<usize>,
    }

    impl AskAsync for Editor {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>> {
            self.calls.set(self.calls.get() + 1);
            let groups = text.matches("\"member_articles\"").count();
            let items: Vec<String> = (0..groups)
                .map(|i| format!(r#"{{"headline":"Merged {i}","summary":"Merged summary {i}.","category":"x"}}"#))
                .collect();
            Ok(format!("[{}]", items.join(",")))
        }
    }

    fn article(source: &str, category: &str, headline: &str, summary: &str) -> DigestEntry {
        RawArticle::new(headline, summary, category, source, format!("{source}.txt")).into()
    }

    #[test]
    fn test_partition_keeps_first_seen_order() {
        let groups = partition_by_category(vec![
            article("A", "Sports", "h1", "s"),
            article("A", "Economy", "h2", "s"),
            article("B", "Sports", "h3", "s"),
        ]);
        let names: Vec<&str> = groups.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(names, vec!["Sports", "Economy"]);
        assert_eq!(groups[0].1.len(), 2);
    }

    #[tokio::test]
    async fn test_dissimilar_articles_pass_through_without_merge_call() {
        let a = article("A", "Sports", "India win cricket final in Mumbai", "Rohit scores a century.");
        let b = article("B", "Sports", "Chess olympiad opens in Chennai", "Grandmasters arrive for round one.");
        let api = Editor::default();

        let report = deduplicate(vec![a.clone(), b.clone()], &TfIdfModel, &api, 0.35).await;

        assert_eq!(api.calls.get(), 0);
        assert_eq!(report.merge_calls, 0);
        assert_eq!(report.articles, vec![a.into_merged(), b.into_merged()]);
    }

    #[tokio::test]
    async fn test_one_merge_call_across_categories() {
        let pool = vec![
            article("A", "Economy", "RBI raises repo rate by 25 basis points", "Inflation stays high, says RBI governor."),
            article("B", "Sports", "India beat Australia in World Cup final", "Kohli anchors the chase in Ahmedabad."),
            article("C", "Economy", "RBI raises repo rate by 25 basis points", "Governor cites inflation stays high."),
            article("D", "Sports", "India beat Australia in World Cup final", "Chase anchored by Kohli in Ahmedabad."),
            article("E", "Health", "Dengue cases rise in Bengaluru", "BBMP steps up fogging drives."),
        ];
        let api = Editor::default();
        let report = deduplicate(pool, &TfIdfModel, &api, 0.35).await;

        assert_eq!(api.calls.get(), 1);
        assert_eq!(report.merge_calls, 1);
        assert_eq!(report.merged_clusters, 2);
        assert_eq!(report.articles.len(), 3);

        // Passthroughs first, then merged clusters in detection order.
        assert_eq!(report.articles[0].headline, "Dengue cases rise in Bengaluru");
        assert_eq!(report.articles[1].category, "Economy");
        assert_eq!(report.articles[2].category, "Sports");
        let names: Vec<&str> = report.articles[1].sources.iter().map(|s| s.source_name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
    }

    #[tokio::test]
    async fn test_clusters_never_span_categories() {
        let pool = vec![
            article("A", "Economy", "Budget session begins in Parliament", "Finance minister tables the bill."),
            article("B", "Politics", "Budget session begins in Parliament", "Finance minister tables the bill."),
        ];
        let api = Editor::default();
        let report = deduplicate(pool, &TfIdfModel, &api, 0.35).await;

        assert_eq!(api.calls.get(), 0);
        assert_eq!(report.articles.len(), 2);
        assert!(report.articles.iter().all(|a| a.sources.len() == 1));
    }
}

//! Upstream collaborators: where editions come from and how articles are read out of them.
//!
//! - [`SourceListing`]: which newspapers have an edition available today
//! - [`Extractor`]: turns one edition into [`RawArticle`]s
//!
//! The production implementations are [`InboxListing`], which scans a dated
//! inbox directory of edition text files, and [`LlmExtractor`], which sends a
//! whole edition to the LLM in a single request.

use crate::api::AskAsync;
use crate::config::{DigestConfig, SourceKeyword};
use crate::error::{DigestError, Result};
use crate::models::RawArticle;
use crate::utils::{normalise_name, strip_code_fences, truncate_chars, truncate_for_log};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Pages with less text than this are treated as blank (ads, photo pages).
const MIN_PAGE_CHARS: usize = 50;

/// One available edition, as handed from the listing to the extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub path: PathBuf,
    /// File name of the edition; becomes `source_document_id`.
    pub document_id: String,
    pub reference_url: Option<String>,
    pub edition_priority: u8,
}

pub trait SourceListing {
    /// Newspapers with an edition available for `today`, keyed by source name.
    async fn list_available_sources(&self, today: NaiveDate) -> Result<BTreeMap<String, SourceDocument>>;
}

pub trait Extractor {
    /// Articles printed in `document`, attributed to `source_name`.
    async fn extract(&self, source_name: &str, document: &SourceDocument) -> Result<Vec<RawArticle>>;
}

/// Lists editions dropped into `<inbox_dir>/<YYYY-MM-DD>/` as `.txt` files.
#[derive(Debug, Clone)]
pub struct InboxListing {
    pub inbox_dir: PathBuf,
    pub keywords: Vec<SourceKeyword>,
    pub skip_keywords: Vec<String>,
    pub reference_base_url: Option<Url>,
}

impl InboxListing {
    pub fn from_config(config: &DigestConfig, inbox_dir: PathBuf) -> Result<Self> {
        let reference_base_url = match &config.reference_base_url {
            Some(base) => {
                // A trailing slash makes `join` append rather than replace the last segment.
                let base = if base.ends_with('/') { base.clone() } else { format!("{base}/") };
                Some(Url::parse(&base).map_err(|e| DigestError::InvalidConfig {
                    field: "reference_base_url".to_string(),
                    value: format!("{base} ({e})"),
                })?)
            }
            None => None,
        };
        Ok(Self {
            inbox_dir,
            keywords: config.source_keywords.clone(),
            skip_keywords: config.skip_keywords.clone(),
            reference_base_url,
        })
    }

    /// Newspaper and edition priority for a filename, or `None` to skip it.
    pub fn match_source(&self, filename: &str) -> Option<(String, u8)> {
        let norm = normalise_name(filename);
        if self.skip_keywords.iter().any(|skip| norm.contains(skip.as_str())) {
            return None;
        }
        self.keywords
            .iter()
            .filter(|k| norm.contains(k.keyword.as_str()))
            .min_by_key(|k| (k.priority, Reverse(k.keyword.len())))
            .map(|k| (k.source.clone(), k.priority))
    }

    fn reference_url(&self, path: &std::path::Path, filename: &str) -> Option<String> {
        match &self.reference_base_url {
            Some(base) => base.join(filename).ok().map(String::from),
            None => std::path::absolute(path)
                .ok()
                .and_then(|abs| Url::from_file_path(abs).ok())
                .map(String::from),
        }
    }
}

impl SourceListing for InboxListing {
    #[instrument(level = "info", skip_all, fields(inbox = %self.inbox_dir.display(), %today))]
    async fn list_available_sources(&self, today: NaiveDate) -> Result<BTreeMap<String, SourceDocument>> {
        let day_dir = self.inbox_dir.join(today.to_string());
        let mut found: BTreeMap<String, SourceDocument> = BTreeMap::new();

        let mut entries = match fs::read_dir(&day_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(dir = %day_dir.display(), "No inbox directory for today");
                return Ok(found);
            }
            Err(e) => return Err(e.into()),
        };

        let mut files: Vec<(String, PathBuf)> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_txt = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("txt"));
            if !is_txt {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                files.push((name.to_string(), path.clone()));
            }
        }
        files.sort();

        for (filename, path) in files {
            let Some((source, priority)) = self.match_source(&filename) else {
                debug!(%filename, "Skipping unrecognised or supplement file");
                continue;
            };
            if found.get(&source).is_some_and(|existing| existing.edition_priority <= priority) {
                debug!(%filename, %source, priority, "Already have a better edition");
                continue;
            }
            let reference_url = self.reference_url(&path, &filename);
            found.insert(
                source,
                SourceDocument { path, document_id: filename, reference_url, edition_priority: priority },
            );
        }

        info!(
            count = found.len(),
            sources = ?found.keys().collect::<Vec<_>>(),
            "Listed available editions"
        );
        Ok(found)
    }
}

/// An article as the extraction model returns it, before normalisation.
#[derive(Debug, Deserialize)]
struct ExtractedRecord {
    #[serde(default)]
    headline: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    page: Option<Value>,
    #[serde(default)]
    importance: Option<Value>,
}

/// Accept `3`, `3.0` or `"3"` from the model.
fn lenient_number(value: &Option<Value>) -> Option<u64> {
    match value.as_ref()? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Joins an edition's pages as `[PAGE N]` blocks, dropping near-blank pages.
///
/// Pages are separated by form feeds, as `pdftotext` writes them.
pub fn page_tagged_text(raw: &str) -> String {
    let mut out = String::new();
    for (i, page) in raw.split('\x0c').enumerate() {
        let text = page.trim();
        if text.chars().count() > MIN_PAGE_CHARS {
            out.push_str(&format!("\n\n[PAGE {}]\n{}", i + 1, text));
        }
    }
    out
}

/// Extracts articles from a whole edition with one LLM request.
#[derive(Debug)]
pub struct LlmExtractor<A> {
    pub api: A,
    pub categories: Vec<String>,
    pub default_category: String,
    pub max_document_chars: usize,
}

impl<A> LlmExtractor<A>
where
    A: AskAsync<Response = String>,
{
    pub fn new(api: A, config: &DigestConfig) -> Self {
        Self {
            api,
            categories: config.categories.clone(),
            default_category: config.default_category.clone(),
            max_document_chars: config.max_document_chars,
        }
    }

    pub fn build_prompt(&self, newspaper: &str, text: &str) -> String {
        format!(
            "You are a senior news editor. Extract EVERY distinct news article from today's {newspaper}.\n\
             \n\
             Rules:\n\
             - Extract ALL news articles, every story, not just major ones.\n\
             - SKIP: advertisements, stock tables, weather forecasts, TV schedules, classifieds, obituaries, horoscopes, crosswords.\n\
             - Identify the page number from the [PAGE N] markers in the text.\n\
             - Category must be exactly one of: {categories}\n\
             - Importance: rate each article 1-10 by national/global significance and reader impact. Front-page lead stories = 8-10. Minor local briefs = 1-3.\n\
             \n\
             Return ONLY a valid JSON array. Each item must have exactly these fields:\n\
             - \"headline\": clear factual headline, max 12 words\n\
             - \"summary\": 2-3 sentences in neutral simple English with key facts and figures\n\
             - \"category\": one category from the list above\n\
             - \"page\": integer page number where the article starts\n\
             - \"importance\": integer 1-10\n\
             \n\
             Full newspaper text:\n\
             {text}\n\
             \n\
             Return ONLY the JSON array. No markdown fences, no explanation, no preamble.",
            categories = self.categories.join(", "),
        )
    }

    fn canonical_category(&self, category: Option<&str>) -> String {
        category
            .and_then(|c| self.categories.iter().find(|known| known.eq_ignore_ascii_case(c.trim())))
            .unwrap_or(&self.default_category)
            .clone()
    }

    /// Parse the model's reply into normalised articles for one edition.
    pub fn parse_response(&self, raw: &str, source_name: &str, document: &SourceDocument) -> Result<Vec<RawArticle>> {
        let records: Vec<ExtractedRecord> =
            serde_json::from_str(strip_code_fences(raw)).map_err(|e| DigestError::ExtractionFailed {
                source_name: source_name.to_string(),
                reason: format!("malformed response: {e}"),
            })?;

        let total = records.len();
        let articles: Vec<RawArticle> = records
            .into_iter()
            .filter(|r| !r.headline.trim().is_empty() && !r.summary.trim().is_empty())
            .map(|r| {
                let page = lenient_number(&r.page).map_or(1, |p| p.min(u32::MAX as u64) as u32);
                let importance = lenient_number(&r.importance).map(|i| i.min(10) as u8);
                let article = RawArticle::new(
                    r.headline.trim(),
                    r.summary.trim(),
                    self.canonical_category(r.category.as_deref()),
                    source_name,
                    document.document_id.clone(),
                )
                .with_page(page)
                .with_reference_url(document.reference_url.clone());
                match importance {
                    Some(i) => article.with_importance(i),
                    None => article,
                }
            })
            .collect();

        if articles.len() < total {
            warn!(source = %source_name, dropped = total - articles.len(), "Dropped records without headline or summary");
        }
        Ok(articles)
    }
}

impl<A> Extractor for LlmExtractor<A>
where
    A: AskAsync<Response = String>,
{
    #[instrument(level = "info", skip_all, fields(source = %source_name, file = %document.document_id))]
    async fn extract(&self, source_name: &str, document: &SourceDocument) -> Result<Vec<RawArticle>> {
        let failed = |reason: String| DigestError::ExtractionFailed {
            source_name: source_name.to_string(),
            reason,
        };

        let raw = fs::read_to_string(&document.path)
            .await
            .map_err(|e| failed(format!("cannot read {}: {e}", document.path.display())))?;
        let mut text = page_tagged_text(&raw);
        if text.is_empty() {
            return Err(failed("no text in edition".to_string()));
        }
        if let Some(original) = truncate_chars(&mut text, self.max_document_chars) {
            warn!(from = original, to = self.max_document_chars, "Edition text truncated");
        }

        info!(chars = text.chars().count(), "Sending edition in a single extraction request");
        let reply = self
            .api
            .ask(&self.build_prompt(source_name, &text))
            .await
            .map_err(|e| failed(e.to_string()))?;

        let articles = self.parse_response(&reply, source_name, document).inspect_err(|_| {
            warn!(response_preview = %truncate_for_log(&reply, 300), "Unusable extraction response");
        })?;
        info!(count = articles.len(), "Extracted articles");
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[derive(Debug)]
    struct Reply(String);

    impl AskAsync for Reply {
        type Response = String;

        async fn ask(&self, _text: &str) -> std::result::Result<String, Box<dyn Error>> {
            Ok(self.0.clone())
        }
    }

    fn listing(inbox: PathBuf) -> InboxListing {
        InboxListing::from_config(&DigestConfig::default(), inbox).unwrap()
    }

    fn document() -> SourceDocument {
        SourceDocument {
            path: PathBuf::from("unused.txt"),
            document_id: "BangaloreTOI.txt".to_string(),
            reference_url: Some("https://example.com/BangaloreTOI.txt".to_string()),
            edition_priority: 1,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 6).unwrap()
    }

    #[test]
    fn test_match_source_prefers_best_edition_keyword() {
        let l = listing(PathBuf::from("inbox"));
        assert_eq!(l.match_source("The_Hindu-Bengaluru.txt"), Some(("The Hindu".to_string(), 1)));
        assert_eq!(l.match_source("thehindu_delhi.txt"), Some(("The Hindu".to_string(), 2)));
        assert_eq!(l.match_source("LiveMint 06-05.txt"), Some(("Mint".to_string(), 3)));
        assert_eq!(l.match_source("TheHindu Magazine.txt"), None);
        assert_eq!(l.match_source("weather.txt"), None);
    }

    #[test]
    fn test_match_source_knows_edition_spellings() {
        let l = listing(PathBuf::from("inbox"));
        let cases = [
            ("BangaloreTOI.txt", "Times of India", 1),
            ("TimeofIndia.txt", "Times of India", 3),
            ("Hindu Bengaluru.txt", "The Hindu", 1),
            ("IE Bengaluru.txt", "Indian Express", 1),
            ("FE_Bengaluru.txt", "Financial Express", 1),
            ("HindustanTimes Bengaluru.txt", "Hindustan Times", 1),
            ("HindustanTimes-Delhi.txt", "Hindustan Times", 2),
            ("BengaluruET.txt", "Economic Times", 1),
            ("BangaloreET.txt", "Economic Times", 1),
            ("Delhi ET.txt", "Economic Times", 2),
            ("BL Bengaluru.txt", "Business Line", 1),
            ("The Hindu BusinessLine Bengaluru.txt", "Business Line", 1),
            ("TheHinduBusinessLine.txt", "Business Line", 3),
            ("BS Bengaluru.txt", "Business Standard", 1),
            ("BS Delhi.txt", "Business Standard", 2),
            ("Bengaluru Mint.txt", "Mint", 1),
            ("DelhiMint.txt", "Mint", 2),
            ("LiveMint Delhi.txt", "Mint", 2),
        ];
        for (filename, source, priority) in cases {
            assert_eq!(
                l.match_source(filename),
                Some((source.to_string(), priority)),
                "{filename}"
            );
        }
    }

    #[tokio::test]
    async fn test_listing_prefers_long_form_bengaluru_edition() {
        let dir = tempfile::tempdir().unwrap();
        let day_dir = dir.path().join("2025-05-06");
        std::fs::create_dir_all(&day_dir).unwrap();
        for name in ["HT Delhi.txt", "HindustanTimes Bengaluru.txt"] {
            std::fs::write(day_dir.join(name), "text").unwrap();
        }

        let found = listing(dir.path().to_path_buf()).list_available_sources(day()).await.unwrap();
        assert_eq!(found["Hindustan Times"].document_id, "HindustanTimes Bengaluru.txt");
        assert_eq!(found["Hindustan Times"].edition_priority, 1);
    }

    #[tokio::test]
    async fn test_listing_keeps_best_edition_per_source() {
        let dir = tempfile::tempdir().unwrap();
        let day_dir = dir.path().join("2025-05-06");
        std::fs::create_dir_all(&day_dir).unwrap();
        for name in ["HT Delhi.txt", "HT Bengaluru.txt", "mint-delhi.txt", "mint-delhi.pdf", "Indulge.txt"] {
            std::fs::write(day_dir.join(name), "text").unwrap();
        }

        let found = listing(dir.path().to_path_buf()).list_available_sources(day()).await.unwrap();

        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["Hindustan Times", "Mint"]);
        assert_eq!(found["Hindustan Times"].document_id, "HT Bengaluru.txt");
        assert_eq!(found["Hindustan Times"].edition_priority, 1);
        assert!(found["Mint"].reference_url.as_deref().unwrap().starts_with("file://"));
    }

    #[tokio::test]
    async fn test_listing_without_day_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let found = listing(dir.path().to_path_buf()).list_available_sources(day()).await.unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_reference_base_url_join() {
        let config = DigestConfig {
            reference_base_url: Some("https://papers.example.com/2025-05-06".to_string()),
            ..DigestConfig::default()
        };
        let l = InboxListing::from_config(&config, PathBuf::from("inbox")).unwrap();
        assert_eq!(
            l.reference_url(std::path::Path::new("inbox/HT Delhi.txt"), "HT Delhi.txt").as_deref(),
            Some("https://papers.example.com/2025-05-06/HT%20Delhi.txt")
        );
    }

    #[test]
    fn test_page_tagged_text_skips_blank_pages() {
        let long = "x".repeat(60);
        let raw = format!("{long}\x0cshort\x0c{long}");
        let tagged = page_tagged_text(&raw);
        assert!(tagged.contains("[PAGE 1]"));
        assert!(!tagged.contains("[PAGE 2]"));
        assert!(tagged.contains("[PAGE 3]"));
    }

    #[test]
    fn test_parse_response_normalises_records() {
        let extractor = LlmExtractor::new(Reply(String::new()), &DigestConfig::default());
        let raw = r#"```json
[
  {"headline": "Metro line opens", "summary": "Phase two opens.", "category": "infrastructure", "page": "4", "importance": 14},
  {"headline": "Mystery", "summary": "Unknown label.", "category": "Gossip", "page": 0},
  {"headline": "", "summary": "No headline."}
]
```"#;
        let articles = extractor.parse_response(raw, "Times of India", &document()).unwrap();

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].category, "Infrastructure");
        assert_eq!(articles[0].page, 4);
        assert_eq!(articles[0].importance, 10);
        assert_eq!(articles[0].source_document_id, "BangaloreTOI.txt");
        assert_eq!(articles[1].category, "India");
        assert_eq!(articles[1].page, 1);
        assert_eq!(articles[1].importance, crate::models::DEFAULT_IMPORTANCE);
        assert_eq!(
            articles[1].external_reference_url.as_deref(),
            Some("https://example.com/BangaloreTOI.txt")
        );
    }

    #[tokio::test]
    async fn test_extract_reads_document_and_attributes_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BangaloreTOI.txt");
        std::fs::write(&path, "Front page text that is comfortably longer than fifty characters.").unwrap();
        let doc = SourceDocument { path, ..document() };

        let extractor = LlmExtractor::new(
            Reply(r#"[{"headline":"h","summary":"s","category":"World","page":1,"importance":7}]"#.to_string()),
            &DigestConfig::default(),
        );
        let articles = extractor.extract("Times of India", &doc).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source_name, "Times of India");
        assert_eq!(articles[0].importance, 7);
    }

    #[derive(Debug, Default)]
    struct Recorder {
        prompt: std::cell::RefCell<String>,
    }

    impl AskAsync for Recorder {
        type Response = String;

        async fn ask(&self, text: &str) -> std::result::Result<String, Box<dyn Error>> {
            *self.prompt.borrow_mut() = text.to_string();
            Ok("[]".to_string())
        }
    }

    #[tokio::test]
    async fn test_extract_truncates_by_characters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BangaloreTOI.txt");
        std::fs::write(&path, "₹".repeat(200)).unwrap();
        let doc = SourceDocument { path, ..document() };

        let config = DigestConfig { max_document_chars: 100, ..DigestConfig::default() };
        let extractor = LlmExtractor::new(Recorder::default(), &config);
        extractor.extract("Times of India", &doc).await.unwrap();

        // "\n\n[PAGE 1]\n" is 11 characters, leaving room for 89 rupee signs.
        let prompt = extractor.api.prompt.borrow();
        assert!(prompt.contains(&format!("[PAGE 1]\n{}\n", "₹".repeat(89))));
        assert!(!prompt.contains(&"₹".repeat(90)));
    }

    #[tokio::test]
    async fn test_extract_missing_file_fails() {
        let extractor = LlmExtractor::new(Reply("[]".to_string()), &DigestConfig::default());
        let err = extractor.extract("Mint", &document()).await.unwrap_err();
        assert!(matches!(err, DigestError::ExtractionFailed { .. }));
    }
}

//! Local text similarity and anchor-based duplicate clustering.
//!
//! Articles are vectorized with TF-IDF over unigrams and bigrams (English
//! stop-words removed, smoothed IDF, L2-normalized rows), so the cosine of two
//! rows is their dot product. Clustering is then a single linear pass:
//!
//! ```text
//! for each unassigned article i (in input order):
//!     open cluster [i]               // i is the anchor
//!     for each unassigned j > i:
//!         if sim(i, j) >= threshold: add j
//! ```
//!
//! Members are compared to the anchor only. Two members of one cluster need
//! not be similar to each other, and the result depends on input order.

use crate::error::{DigestError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Default cosine similarity at or above which an article joins an anchor.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.35;

/// Two or more word characters.
static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("token pattern is a valid regex"));

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| ENGLISH_STOP_WORDS.iter().copied().collect());

/// The 318-word English stop list used by common TF-IDF vectorizers.
const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst", "amoungst",
    "amount", "an", "and", "another", "any", "anyhow", "anyone", "anything", "anyway", "anywhere",
    "are", "around", "as", "at", "back", "be", "became", "because", "become", "becomes", "becoming",
    "been", "before", "beforehand", "behind", "being", "below", "beside", "besides", "between",
    "beyond", "bill", "both", "bottom", "but", "by", "call", "can", "cannot", "cant", "co", "con",
    "could", "couldnt", "cry", "de", "describe", "detail", "do", "done", "down", "due", "during",
    "each", "eg", "eight", "either", "eleven", "else", "elsewhere", "empty", "enough", "etc",
    "even", "ever", "every", "everyone", "everything", "everywhere", "except", "few", "fifteen",
    "fifty", "fill", "find", "fire", "first", "five", "for", "former", "formerly", "forty", "found",
    "four", "from", "front", "full", "further", "get", "give", "go", "had", "has", "hasnt", "have",
    "he", "hence", "her", "here", "hereafter", "hereby", "herein", "hereupon", "hers", "herself",
    "him", "himself", "his", "how", "however", "hundred", "i", "ie", "if", "in", "inc", "indeed",
    "interest", "into", "is", "it", "its", "itself", "keep", "last", "latter", "latterly", "least",
    "less", "ltd", "made", "many", "may", "me", "meanwhile", "might", "mill", "mine", "more",
    "moreover", "most", "mostly", "move", "much", "must", "my", "myself", "name", "namely",
    "neither", "never", "nevertheless", "next", "nine", "no", "nobody", "none", "noone", "nor",
    "not", "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto",
    "or", "other", "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own", "part",
    "per", "perhaps", "please", "put", "rather", "re", "same", "see", "seem", "seemed", "seeming",
    "seems", "serious", "several", "she", "should", "show", "side", "since", "sincere", "six",
    "sixty", "so", "some", "somehow", "someone", "something", "sometime", "sometimes", "somewhere",
    "still", "such", "system", "take", "ten", "than", "that", "the", "their", "them", "themselves",
    "then", "thence", "there", "thereafter", "thereby", "therefore", "therein", "thereupon",
    "these", "they", "thick", "thin", "third", "this", "those", "though", "three", "through",
    "throughout", "thru", "thus", "to", "together", "too", "top", "toward", "towards", "twelve",
    "twenty", "two", "un", "under", "until", "up", "upon", "us", "very", "via", "was", "we", "well",
    "were", "what", "whatever", "when", "whence", "whenever", "where", "whereafter", "whereas",
    "whereby", "wherein", "whereupon", "wherever", "whether", "which", "while", "whither", "who",
    "whoever", "whole", "whom", "whose", "why", "will", "with", "within", "without", "would", "yet",
    "you", "your", "yours", "yourself", "yourselves",
];

/// Produces a symmetric pairwise similarity matrix for a batch of texts.
pub trait SimilarityModel {
    fn similarity_matrix(&self, texts: &[String]) -> Result<Vec<Vec<f64>>>;
}

/// TF-IDF vector space model over unigrams and bigrams.
#[derive(Debug, Default, Clone, Copy)]
pub struct TfIdfModel;

/// Lowercased unigram and bigram terms of `text`, stop-words removed first.
pub fn terms(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| !STOP_WORDS.contains(w))
        .collect();

    let mut out: Vec<String> = words.iter().map(|w| w.to_string()).collect();
    out.extend(words.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
    out
}

impl SimilarityModel for TfIdfModel {
    fn similarity_matrix(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let docs: Vec<Vec<String>> = texts.iter().map(|t| terms(t)).collect();

        // Term ids follow first occurrence so every run builds the same rows.
        let mut vocab: HashMap<&str, usize> = HashMap::new();
        let mut doc_freq: Vec<usize> = Vec::new();
        for doc in &docs {
            let mut seen: HashSet<usize> = HashSet::new();
            for term in doc {
                let next = vocab.len();
                let id = *vocab.entry(term.as_str()).or_insert(next);
                if id == doc_freq.len() {
                    doc_freq.push(0);
                }
                if seen.insert(id) {
                    doc_freq[id] += 1;
                }
            }
        }

        if vocab.is_empty() {
            return Err(DigestError::ClusteringUnavailable(
                "empty vocabulary; every text is stop-words only".to_string(),
            ));
        }

        // Smoothed IDF: ln((1 + n) / (1 + df)) + 1
        let n = docs.len() as f64;
        let idf: Vec<f64> = doc_freq
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        let vectors: Vec<Vec<(usize, f64)>> = docs
            .iter()
            .map(|doc| {
                let mut weights: BTreeMap<usize, f64> = BTreeMap::new();
                for term in doc {
                    let id = vocab[term.as_str()];
                    *weights.entry(id).or_insert(0.0) += idf[id];
                }
                let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
                weights
                    .into_iter()
                    .map(|(id, w)| (id, if norm > 0.0 { w / norm } else { w }))
                    .collect()
            })
            .collect();

        let len = vectors.len();
        let mut matrix = vec![vec![0.0; len]; len];
        for i in 0..len {
            matrix[i][i] = if vectors[i].is_empty() { 0.0 } else { 1.0 };
            for j in (i + 1)..len {
                let sim = dot(&vectors[i], &vectors[j]);
                matrix[i][j] = sim;
                matrix[j][i] = sim;
            }
        }
        debug!(docs = len, terms = vocab.len(), "Built TF-IDF similarity matrix");
        Ok(matrix)
    }
}

/// Dot product of two rows sorted by term id, summed in id order.
fn dot(a: &[(usize, f64)], b: &[(usize, f64)]) -> f64 {
    let (mut i, mut j, mut sum) = (0, 0, 0.0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}

/// Partition indices `0..sim.len()` into anchor-based clusters.
pub fn anchor_clusters(sim: &[Vec<f64>], threshold: f64) -> Vec<Vec<usize>> {
    let mut assigned = vec![false; sim.len()];
    let mut clusters = Vec::new();

    for anchor in 0..sim.len() {
        if assigned[anchor] {
            continue;
        }
        assigned[anchor] = true;
        let mut cluster = vec![anchor];
        for candidate in (anchor + 1)..sim.len() {
            if !assigned[candidate] && sim[anchor][candidate] >= threshold {
                assigned[candidate] = true;
                cluster.push(candidate);
            }
        }
        clusters.push(cluster);
    }
    clusters
}

/// Every index in its own cluster; used when similarity is unavailable.
pub fn singleton_clusters(len: usize) -> Vec<Vec<usize>> {
    (0..len).map(|i| vec![i]).collect()
}

/// Cluster `texts` with `model`, failing open to singletons.
pub fn cluster_texts<M: SimilarityModel>(model: &M, texts: &[String], threshold: f64) -> Vec<Vec<usize>> {
    if texts.len() < 2 {
        return singleton_clusters(texts.len());
    }
    match model.similarity_matrix(texts) {
        Ok(sim) => anchor_clusters(&sim, threshold),
        Err(e) => {
            warn!(error = %e, articles = texts.len(), "Similarity unavailable; skipping dedup for this group");
            singleton_clusters(texts.len())
        }
    }
}

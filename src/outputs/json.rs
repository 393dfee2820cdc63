//! JSON output of the digest for downstream renderers.
//!
//! Each run rewrites both the latest `digest.json` and the dated archive
//! copy, so the archive for a day always reflects its final pass.

use crate::models::Digest;
use crate::utils::ensure_writable_dir;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write a [`Digest`] to `{output_dir}/digest.json` and `{output_dir}/{date}/digest.json`.
///
/// # Returns
///
/// The path of the dated copy, or an error if a directory cannot be created
/// or a file cannot be written.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir, date = %digest.date))]
pub async fn write_digest(digest: &Digest, output_dir: &str) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(digest)?;

    let dated_dir = format!("{}/{}", output_dir.trim_end_matches('/'), digest.date);
    if let Err(e) = ensure_writable_dir(&dated_dir).await {
        error!(%dated_dir, error = %e, "Output directory is not writable");
        return Err(e);
    }

    let dated_path = PathBuf::from(&dated_dir).join("digest.json");
    fs::write(&dated_path, &json).await?;
    let latest_path = PathBuf::from(output_dir).join("digest.json");
    fs::write(&latest_path, &json).await?;

    info!(
        path = %dated_path.display(),
        articles = digest.total_articles,
        newspapers = digest.newspapers.len(),
        "Wrote digest JSON"
    );
    Ok(dated_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DigestState, RawArticle};
    use chrono::{NaiveDate, Utc};

    #[tokio::test]
    async fn test_write_digest_writes_latest_and_dated_copies() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().to_str().unwrap();

        let mut state = DigestState::fresh(NaiveDate::from_ymd_opt(2025, 5, 6).unwrap());
        state.processed_sources.insert("Mint".to_string());
        state
            .accumulated_articles
            .push(RawArticle::new("Headline", "Summary", "Economy", "Mint", "mint.txt").into());
        let digest = Digest::from_state(&state, Utc::now());

        let dated = write_digest(&digest, out).await.unwrap();
        assert_eq!(dated, dir.path().join("2025-05-06/digest.json"));

        let latest: Digest =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("digest.json")).unwrap()).unwrap();
        assert_eq!(latest.total_articles, 1);
        assert_eq!(latest.articles[0].sources[0].source_name, "Mint");
    }
}

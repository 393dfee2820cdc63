//! Persistence boundary for the per-day [`DigestState`].
//!
//! State is read once at the start of a run and written once at the end.
//! Nothing else touches the file. A missing, unreadable, or stale (other
//! day) file always loads as a fresh state for today.

use crate::error::{DigestError, Result};
use crate::models::DigestState;
use chrono::NaiveDate;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

async fn read_state(path: &Path) -> Result<Option<DigestState>> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(DigestError::StateCorrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            });
        }
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| DigestError::StateCorrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// Load today's state, or a fresh one.
#[instrument(level = "info", skip_all, fields(path = %path.display(), %today))]
pub async fn load_state(path: &Path, today: NaiveDate) -> DigestState {
    match read_state(path).await {
        Ok(Some(state)) if state.date == today => {
            info!(
                processed = state.processed_sources.len(),
                articles = state.accumulated_articles.len(),
                complete = state.is_complete,
                "Resuming today's digest state"
            );
            state
        }
        Ok(Some(state)) => {
            warn!(stored = %state.date, "Stored state is from another day; starting fresh");
            DigestState::fresh(today)
        }
        Ok(None) => {
            info!("No stored state; starting fresh");
            DigestState::fresh(today)
        }
        Err(e) => {
            warn!(error = %e, "Stored state unreadable; starting fresh");
            DigestState::fresh(today)
        }
    }
}

/// Overwrite the stored state with `state`.
///
/// The file is replaced atomically so an interrupted write never leaves a
/// half-written state behind.
#[instrument(level = "info", skip_all, fields(path = %path.display(), date = %state.date))]
pub async fn save_state(path: &Path, state: &DigestState) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).await?;
    fs::rename(&tmp, path).await?;
    info!(
        processed = state.processed_sources.len(),
        articles = state.accumulated_articles.len(),
        "Saved digest state"
    );
    Ok(())
}

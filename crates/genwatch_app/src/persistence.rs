use std::path::Path;

use engine_logging::{engine_error, engine_info, engine_warn};
use genwatch_core::{ActiveJobSnapshot, JobId, JobKind};
use genwatch_engine::SessionFile;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedJob {
    job_id: String,
    kind: JobKind,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedState {
    #[serde(default)]
    saved_at: Option<String>,
    active: Vec<PersistedJob>,
}

/// Jobs that were still being watched when the last session ended.
///
/// A missing or unreadable file yields an empty list.
pub(crate) fn load_active_jobs(state_dir: &Path) -> Vec<ActiveJobSnapshot> {
    let session = SessionFile::new(state_dir);
    let path = session.path();
    let content = match session.read() {
        Ok(Some(text)) => text,
        Ok(None) => return Vec::new(),
        Err(err) => {
            engine_warn!("Failed to read session state: {}", err);
            return Vec::new();
        }
    };

    let state: PersistedState = match ron::from_str(&content) {
        Ok(state) => state,
        Err(err) => {
            engine_warn!("Failed to parse session state from {:?}: {}", path, err);
            return Vec::new();
        }
    };

    let active: Vec<ActiveJobSnapshot> = state
        .active
        .into_iter()
        .filter(|job| !job.job_id.trim().is_empty())
        .map(|job| ActiveJobSnapshot {
            job_id: JobId::new(job.job_id),
            kind: job.kind,
            title: job.title,
        })
        .collect();

    engine_info!(
        "Loaded {} active job(s) from {:?} (saved {})",
        active.len(),
        path,
        state.saved_at.as_deref().unwrap_or("at an unknown time")
    );
    active
}

/// Replaces the session file with `active`; an empty list removes it.
pub(crate) fn save_active_jobs(state_dir: &Path, active: &[ActiveJobSnapshot]) {
    let session = SessionFile::new(state_dir);
    if active.is_empty() {
        if let Err(err) = session.clear() {
            engine_error!("Failed to clear session state: {}", err);
        }
        return;
    }

    let state = PersistedState {
        saved_at: Some(chrono::Local::now().to_rfc3339()),
        active: active
            .iter()
            .map(|job| PersistedJob {
                job_id: job.job_id.to_string(),
                kind: job.kind,
                title: job.title.clone(),
            })
            .collect(),
    };

    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(&state, pretty) {
        Ok(content) => content,
        Err(err) => {
            engine_error!("Failed to serialize session state: {}", err);
            return;
        }
    };

    match session.replace(&content) {
        Ok(()) => engine_info!("Saved {} active job(s) to {:?}", active.len(), session.path()),
        Err(err) => engine_error!("Failed to write session state: {}", err),
    }
}

//! JSON document store for evolution state and generation reports.
//!
//! Two documents live under the state directory: `evolution_state.json`
//! (the resumable snapshot, overwritten whole) and
//! `generation_reports.json` (the append-only report sequence). Writes go
//! through a temp file plus rename so a crash mid-write leaves the previous
//! document intact. Missing or unparseable documents load as a cold start.

use crate::domain::errors::StoreError;
use crate::domain::performance::GenerationReport;
use crate::domain::repositories::{EvolutionState, EvolutionStateRepository};
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

const STATE_FILE: &str = "evolution_state.json";
const REPORTS_FILE: &str = "generation_reports.json";

pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Write {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn reports_path(&self) -> PathBuf {
        self.dir.join(REPORTS_FILE)
    }

    /// Read and parse one document. Both a missing file and a corrupt one
    /// come back as `None`; corruption is logged because it usually means a
    /// manual edit went wrong.
    async fn load_document<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(source) => {
                let err = StoreError::Read {
                    path: path.display().to_string(),
                    source,
                };
                warn!(error = %err, "treating unreadable state as cold start");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                let err = StoreError::Corrupt {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "treating corrupt state as cold start");
                None
            }
        }
    }

    /// Serialize to a sibling temp file, then rename over the target.
    async fn write_document<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4()));

        tokio::fs::write(&tmp, json.as_bytes())
            .await
            .map_err(|source| write_error(path, source))?;
        if let Err(source) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(write_error(path, source).into());
        }
        Ok(())
    }
}

fn write_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Write {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl EvolutionStateRepository for JsonStateStore {
    async fn load_state(&self) -> Result<Option<EvolutionState>> {
        Ok(self.load_document(&self.state_path()).await)
    }

    async fn save_state(&self, state: &EvolutionState) -> Result<()> {
        self.write_document(&self.state_path(), state).await
    }

    async fn append_report(&self, report: &GenerationReport) -> Result<()> {
        let mut reports: Vec<GenerationReport> = self
            .load_document(&self.reports_path())
            .await
            .unwrap_or_default();
        reports.push(report.clone());
        self.write_document(&self.reports_path(), &reports).await
    }

    async fn load_reports(&self) -> Result<Vec<GenerationReport>> {
        Ok(self
            .load_document(&self.reports_path())
            .await
            .unwrap_or_default())
    }
}

//! Durable fill log.
//!
//! Append-only JSON-lines store of every fill the terminal reports.
//! Reporting and notification read it; nothing ever rewrites it. Each
//! append is flushed to disk before returning, so a process restart never
//! loses an acknowledged fill.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::FillEvent;
use crate::error::Result;

pub struct FillLog {
    path: PathBuf,
}

impl FillLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one fill record and sync it to disk.
    pub async fn append(&self, event: &FillEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_data().await?;
        debug!(symbol = %event.symbol, qty = event.quantity, "fill logged");
        Ok(())
    }

    /// Read the whole log back, skipping lines that fail to parse.
    pub async fn read_all(&self) -> Result<Vec<FillEvent>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }
}

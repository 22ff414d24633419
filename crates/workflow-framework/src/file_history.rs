//! # File-backed History
//!
//! One JSON-lines file per run: `<dir>/<run_id>.jsonl`, one serialized event per line.
//! A crash in the middle of an append can leave a partial last line; loading drops an
//! undecodable final line, invalid UTF-8 included, by truncating the file so later
//! appends start clean. A final line that decodes but lost its newline gets one back.
//! Any undecodable line before the last fails the load.

use crate::error::FrameworkError;
use crate::history::HistoryStore;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const EXTENSION: &str = "jsonl";

/// History persisted to a directory of JSON-lines files.
pub struct FileHistory<E> {
    dir: PathBuf,
    // Serializes appends so lines from concurrent runs never interleave in one file.
    write_lock: Mutex<()>,
    _event: PhantomData<fn() -> E>,
}

impl<E> FileHistory<E> {
    /// Opens (and creates if missing) a history directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, FrameworkError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| FrameworkError::History(format!("create {}: {e}", dir.display())))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
            _event: PhantomData,
        })
    }

    fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.{EXTENSION}"))
    }

    async fn truncate(&self, path: &Path, len: u64) -> Result<(), FrameworkError> {
        let _guard = self.write_lock.lock().await;
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(path)
            .await
            .map_err(|e| FrameworkError::History(format!("open {}: {e}", path.display())))?;
        file.set_len(len)
            .await
            .map_err(|e| FrameworkError::History(format!("truncate {}: {e}", path.display())))
    }

    // The last event decoded but its newline never reached disk.
    async fn terminate_last_line(&self, path: &Path) -> Result<(), FrameworkError> {
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .await
            .map_err(|e| FrameworkError::History(format!("open {}: {e}", path.display())))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| FrameworkError::History(format!("write {}: {e}", path.display())))?;
        file.sync_data()
            .await
            .map_err(|e| FrameworkError::History(format!("sync {}: {e}", path.display())))
    }
}

/// Byte ranges of the non-blank lines in `bytes`, the last one possibly unterminated.
fn line_spans(bytes: &[u8]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (end, byte) in bytes.iter().enumerate() {
        if *byte == b'\n' {
            spans.push((start, end));
            start = end + 1;
        }
    }
    spans.push((start, bytes.len()));
    spans.retain(|&(start, end)| !bytes[start..end].iter().all(u8::is_ascii_whitespace));
    spans
}

#[async_trait]
impl<E> HistoryStore<E> for FileHistory<E>
where
    E: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn append(&self, run_id: &str, event: &E) -> Result<(), FrameworkError> {
        let mut line = serde_json::to_string(event)
            .map_err(|e| FrameworkError::History(format!("encode event: {e}")))?;
        line.push('\n');

        let path = self.path_for(run_id);
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| FrameworkError::History(format!("open {}: {e}", path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| FrameworkError::History(format!("write {}: {e}", path.display())))?;
        file.sync_data()
            .await
            .map_err(|e| FrameworkError::History(format!("sync {}: {e}", path.display())))?;
        debug!(run_id, "History appended");
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Vec<E>, FrameworkError> {
        let path = self.path_for(run_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(FrameworkError::History(format!(
                    "read {}: {e}",
                    path.display()
                )))
            }
        };

        let lines = line_spans(&bytes);
        let mut events = Vec::with_capacity(lines.len());
        for (index, &(start, end)) in lines.iter().enumerate() {
            match serde_json::from_slice::<E>(&bytes[start..end]) {
                Ok(event) => events.push(event),
                Err(e) if index + 1 == lines.len() => {
                    warn!(run_id, error = %e, "Dropping torn trailing history line");
                    self.truncate(&path, start as u64).await?;
                    return Ok(events);
                }
                Err(e) => {
                    return Err(FrameworkError::History(format!(
                        "decode {} line {}: {e}",
                        path.display(),
                        index + 1
                    )))
                }
            }
        }
        if bytes.last().is_some_and(|&b| b != b'\n') {
            self.terminate_last_line(&path).await?;
        }
        Ok(events)
    }

    async fn list_runs(&self) -> Result<Vec<String>, FrameworkError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| FrameworkError::History(format!("list {}: {e}", self.dir.display())))?;
        let mut runs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FrameworkError::History(format!("list {}: {e}", self.dir.display())))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                runs.push(stem.to_string());
            }
        }
        runs.sort();
        Ok(runs)
    }
}

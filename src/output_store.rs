//! Per-request output files for completed workbooks.
//!
//! Every request gets its own `<uuid>.xlsx`, written atomically (temp file +
//! rename) so a download never sees a partial workbook. Files are deleted by a
//! periodic sweep once they are older than the configured retention.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};
use uuid::Uuid;

pub const OUTPUT_EXTENSION: &str = "xlsx";

/// Reference to a saved output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOutput {
    pub id: String,
    pub file_name: String,
}

/// Directory-backed output store.
#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
}

impl OutputStore {
    /// Open (and create if needed) the output directory.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[cfg(test)]
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Write a completed workbook under a fresh id.
    pub async fn save(&self, bytes: &[u8]) -> io::Result<StoredOutput> {
        let id = Uuid::new_v4().simple().to_string();
        let file_name = format!("{}.{}", id, OUTPUT_EXTENSION);
        let tmp_path = self.dir.join(format!(".{}.tmp", id));
        let final_path = self.dir.join(&file_name);

        if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }

        debug!("OutputStore: stored '{}' ({} bytes)", file_name, bytes.len());
        Ok(StoredOutput { id, file_name })
    }

    /// Delete outputs (and stray temp files) last modified more than `ttl` ago.
    pub async fn sweep_expired(&self, ttl: Duration) -> io::Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_managed_file(&path) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age < ttl {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove expired output {:?}: {}", path, e),
            }
        }

        if removed > 0 {
            info!("OutputStore: removed {} expired file(s)", removed);
        }
        Ok(removed)
    }
}

fn is_managed_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == OUTPUT_EXTENSION || e == "tmp")
        .unwrap_or(false)
}

/// Run [`OutputStore::sweep_expired`] every `interval` for the life of the process.
pub fn spawn_sweeper(store: OutputStore, ttl: Duration, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = store.sweep_expired(ttl).await {
                warn!("Output sweep failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_uses_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::open(dir.path()).unwrap();

        let a = store.save(b"first").await.unwrap();
        let b = store.save(b"second").await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.file_name, format!("{}.xlsx", a.id));
        assert_eq!(std::fs::read(store.path_for(&a.file_name)).unwrap(), b"first");
        assert_eq!(std::fs::read(store.path_for(&b.file_name)).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::open(dir.path()).unwrap();
        store.save(b"data").await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".xlsx"));
    }

    #[tokio::test]
    async fn test_sweep_respects_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::open(dir.path()).unwrap();
        let saved = store.save(b"data").await.unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"unmanaged").unwrap();

        assert_eq!(store.sweep_expired(Duration::from_secs(3600)).await.unwrap(), 0);
        assert!(store.path_for(&saved.file_name).exists());

        assert_eq!(store.sweep_expired(Duration::ZERO).await.unwrap(), 1);
        assert!(!store.path_for(&saved.file_name).exists());
        assert!(dir.path().join("keep.txt").exists());
    }
}

use std::path::PathBuf;

use tracing::{instrument, trace};

use crate::error::Result;
use crate::worker::WorkerKind;

/// Durable per-worker block cursors, one `{kind}_last_block.txt` file per worker
///
/// Lets a restarted worker resume from where it stopped instead of the current chain head.
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        tokio::fs::create_dir_all(&path).await?;

        Ok(Self { path })
    }

    fn file(&self, kind: WorkerKind) -> PathBuf {
        self.path.join(format!("{}_last_block.txt", kind))
    }

    /// A corrupt cursor file is treated as missing
    pub async fn load(&self, kind: WorkerKind) -> Result<Option<u64>> {
        let file = self.file(kind);

        match tokio::fs::read_to_string(&file).await {
            Ok(contents) => Ok(contents.trim().parse().ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes through a temporary file so a crash never leaves a half-written cursor
    #[instrument(skip(self))]
    pub async fn save(&self, kind: WorkerKind, block: u64) -> Result<()> {
        let file = self.file(kind);
        let tmp = file.with_extension("tmp");

        tokio::fs::write(&tmp, block.to_string()).await?;
        tokio::fs::rename(&tmp, &file).await?;
        trace!(event = "saved");

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use color_eyre::Result;
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn test_save_and_load() -> Result<()> {
        let dir = tempdir()?;
        let store = CursorStore::open(dir.path().join("cursors")).await?;

        assert_eq!(store.load(WorkerKind::TipMonitor).await?, None);

        store.save(WorkerKind::TipMonitor, 105).await?;
        store.save(WorkerKind::NameService, 42).await?;
        store.save(WorkerKind::TipMonitor, 110).await?;

        assert_eq!(store.load(WorkerKind::TipMonitor).await?, Some(110));
        assert_eq!(store.load(WorkerKind::NameService).await?, Some(42));
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_cursor_is_missing() -> Result<()> {
        let dir = tempdir()?;
        let store = CursorStore::open(dir.path()).await?;
        std::fs::write(dir.path().join("tipMonitor_last_block.txt"), "garbage")?;

        assert_eq!(store.load(WorkerKind::TipMonitor).await?, None);
        Ok(())
    }
}

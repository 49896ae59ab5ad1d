//! Disk-fill behavior: create, fill, hold, remove.
//!
//! The created file is removed on every exit path: after the hold
//! window, on cancellation, and on a write failure partway through.

use behavior_dsl::DiskFill;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::perturb::sleep_cancellable;

const FILL_CHUNK: usize = 64 << 10;

/// Removes the target file when dropped.
struct FillGuard {
    path: PathBuf,
}

impl Drop for FillGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "disk fill cleanup failed");
        }
    }
}

/// Creates the target file and writes `size` zero bytes, then holds the
/// file on a background worker for the configured duration before
/// removing it.
///
/// # Errors
///
/// Returns the underlying I/O error if the file cannot be created or
/// filled; the partial file is removed before returning.
pub async fn fill(disk: &DiskFill, cancel: &CancellationToken) -> std::io::Result<()> {
    let path = PathBuf::from(&disk.path);
    let mut file = tokio::fs::File::create(&path).await?;
    let guard = FillGuard { path };

    let chunk = vec![0u8; FILL_CHUNK];
    let mut remaining = disk.size;
    while remaining > 0 {
        if cancel.is_cancelled() {
            // Guard drops below; the partial file is removed.
            return Ok(());
        }
        let take = usize::try_from(remaining.min(FILL_CHUNK as u64)).unwrap_or(FILL_CHUNK);
        file.write_all(&chunk[..take]).await?;
        remaining -= take as u64;
    }
    file.flush().await?;

    // Hold the open handle for the window, then let the guard remove it.
    let duration = disk.duration;
    let cancel = cancel.clone();
    tokio::spawn(async move {
        let _file = file;
        let _ = sleep_cancellable(duration, &cancel).await;
        drop(guard);
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fill_creates_and_later_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("fill.dat");
        let disk = DiskFill {
            size: 128 << 10,
            path: target.to_string_lossy().into_owned(),
            duration: Duration::from_millis(50),
        };
        let cancel = CancellationToken::new();

        fill(&disk, &cancel).await.unwrap();
        assert_eq!(std::fs::metadata(&target).unwrap().len(), 128 << 10);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn fill_into_missing_directory_fails() {
        let disk = DiskFill {
            size: 1024,
            path: "/nonexistent-dir/fill.dat".to_string(),
            duration: Duration::from_secs(1),
        };
        let cancel = CancellationToken::new();
        assert!(fill(&disk, &cancel).await.is_err());
    }

    #[tokio::test]
    async fn cancellation_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("partial.dat");
        let disk = DiskFill {
            size: 1 << 20,
            path: target.to_string_lossy().into_owned(),
            duration: Duration::from_secs(10),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        fill(&disk, &cancel).await.unwrap();
        assert!(!target.exists());
    }
}

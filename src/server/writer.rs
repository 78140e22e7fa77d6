use super::error::ServerError;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;

/// Atomically replace `dst` with `content` using write-to-temp-then-rename.
///
/// Parent directories are created as needed. Readers serving the publish
/// root over HTTP only ever see the previous or the new document.
pub(crate) async fn write_atomic(dst: &Path, content: &[u8]) -> Result<(), ServerError> {
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ServerError::io(parent, e))?;
    }

    // Per-write temp name; `create_new` refuses any existing path, so a
    // pre-planted symlink at the temp name is never followed.
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = dst.with_extension(format!("tmp.{:016x}", suffix));

    let mut temp_file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .await
        .map_err(|e| ServerError::io(&temp_path, e))?;

    let written = async {
        temp_file.write_all(content).await?;
        temp_file.sync_all().await
    }
    .await;
    drop(temp_file);

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(ServerError::io(&temp_path, e));
    }

    #[cfg(windows)]
    if tokio::fs::try_exists(dst).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_file(dst).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(ServerError::io(dst, e));
        }
    }

    if let Err(e) = tokio::fs::rename(&temp_path, dst).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(ServerError::io(dst, e));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("v1/en/station_status.json");
        write_atomic(&dst, b"{}").await.unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_replaces_existing_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("gbfs.json");
        write_atomic(&dst, b"old").await.unwrap();
        write_atomic(&dst, b"new").await.unwrap();

        assert_eq!(std::fs::read(&dst).unwrap(), b"new");
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "temp file left behind");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_destination_is_replaced_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("outside.txt");
        std::fs::write(&outside, b"keep").unwrap();
        let dst = dir.path().join("gbfs.json");
        std::os::unix::fs::symlink(&outside, &dst).unwrap();

        write_atomic(&dst, b"{}").await.unwrap();

        assert_eq!(std::fs::read(&outside).unwrap(), b"keep");
        assert!(!std::fs::symlink_metadata(&dst).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read(&dst).unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_unwritable_parent_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let err = write_atomic(&blocker.join("gbfs.json"), b"{}")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Io { .. }));
    }
}

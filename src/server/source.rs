use super::{FeedHandler, ServerError};
use crate::feed::{Feed, FeedName};
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Largest payload file accepted from a source directory.
const MAX_SOURCE_SIZE: u64 = 10 * 1024 * 1024;

/// Builds one handler per static payload file under `dir`.
///
/// Files are laid out like the published tree: `name.json` for feeds without
/// a language and `lang/name.json` otherwise. Each file holds the `data`
/// payload of its feed and is re-read every cycle, so edits are picked up on
/// the next refresh. Files whose stem is not a known feed name, and
/// `gbfs.json`, are skipped.
pub fn static_handlers(dir: &Path) -> Result<Vec<FeedHandler>, ServerError> {
    let mut handlers = Vec::new();
    for (language, path) in source_files(dir)? {
        let Some(name) = feed_name_of(&path) else {
            tracing::warn!(path = %path.display(), "Skipping file that is not a known feed");
            continue;
        };
        if name.is_discovery() {
            tracing::debug!(path = %path.display(), "Skipping discovery file in source directory");
            continue;
        }
        tracing::debug!(
            feed = %name,
            language = language.as_deref().unwrap_or(""),
            path = %path.display(),
            "Registered static feed"
        );
        handlers.push(FeedHandler::new(move |_| {
            let feed = load_payload(name, &path)?;
            Ok(vec![match &language {
                Some(lang) => feed.with_language(lang.clone()),
                None => feed,
            }])
        }));
    }
    Ok(handlers)
}

/// `(language, path)` of every `.json` file at depth one or two.
fn source_files(dir: &Path) -> Result<Vec<(Option<String>, PathBuf)>, ServerError> {
    let mut files = Vec::new();
    for entry in read_dir_sorted(dir)? {
        if entry.is_dir() {
            let Some(language) = entry.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let language = language.to_owned();
            for nested in read_dir_sorted(&entry)? {
                if is_json_file(&nested) {
                    files.push((Some(language.clone()), nested));
                }
            }
        } else if is_json_file(&entry) {
            files.push((None, entry));
        }
    }
    Ok(files)
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, ServerError> {
    let mut paths = std::fs::read_dir(dir)
        .map_err(|e| ServerError::io(dir, e))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::io(dir, e))?;
    paths.sort();
    Ok(paths)
}

fn is_json_file(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "json")
}

fn feed_name_of(path: &Path) -> Option<FeedName> {
    path.file_stem()?.to_str()?.parse().ok()
}

fn load_payload(name: FeedName, path: &Path) -> anyhow::Result<Feed> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat '{}'", path.display()))?;
    if meta.len() > MAX_SOURCE_SIZE {
        anyhow::bail!(
            "'{}' is {} bytes (max {} bytes)",
            path.display(),
            meta.len(),
            MAX_SOURCE_SIZE
        );
    }
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read '{}'", path.display()))?;
    let payload: serde_json::Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("Invalid JSON in '{}'", path.display()))?;
    Ok(Feed::new(name, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{Server, ServerOptions};
    use serde_json::json;

    fn server() -> Server {
        Server::new(ServerOptions::new("bikes", "/unused", "https://example.com")).unwrap()
    }

    #[test]
    fn test_discovers_unlabelled_and_language_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("station_status.json"), r#"{"stations": []}"#).unwrap();
        std::fs::create_dir(dir.path().join("en")).unwrap();
        std::fs::write(
            dir.path().join("en/system_information.json"),
            r#"{"name": "Bikes"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("gbfs.json"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();
        std::fs::write(dir.path().join("README.md"), "hi").unwrap();

        let handlers = static_handlers(dir.path()).unwrap();
        assert_eq!(handlers.len(), 2);

        let server = server();
        let feeds: Vec<Feed> = handlers
            .iter()
            .flat_map(|h| (h.produce)(&server).unwrap())
            .collect();
        let labelled = feeds
            .iter()
            .find(|f| f.name() == FeedName::SystemInformation)
            .unwrap();
        assert_eq!(labelled.language(), Some("en"));
        assert_eq!(labelled.payload(), Some(&json!({"name": "Bikes"})));

        let unlabelled = feeds
            .iter()
            .find(|f| f.name() == FeedName::StationStatus)
            .unwrap();
        assert_eq!(unlabelled.language(), None);
    }

    #[test]
    fn test_invalid_payload_fails_the_handler() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("system_alerts.json"), "not json").unwrap();

        let handlers = static_handlers(dir.path()).unwrap();
        let err = (handlers[0].produce)(&server()).unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = static_handlers(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, ServerError::Io { .. }));
    }
}

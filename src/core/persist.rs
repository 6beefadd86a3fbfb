//! JSON file persistence shared by the indexed file set and the
//! conversation store.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::errors::RagError;

/// Writes `value` as pretty JSON, replacing `path` only once the full
/// document is on disk.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), RagError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(RagError::storage)?;
    }

    let data = serde_json::to_vec_pretty(value).map_err(RagError::storage)?;
    let partial_path = partial_path(path);

    tokio::fs::write(&partial_path, data)
        .await
        .map_err(RagError::storage)?;
    if let Err(err) = tokio::fs::rename(&partial_path, path).await {
        let _ = tokio::fs::remove_file(&partial_path).await;
        return Err(RagError::storage(err));
    }
    Ok(())
}

/// Reads a JSON document. A missing file is `Ok(None)`; unreadable or
/// malformed content is a storage error.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, RagError> {
    let contents = match tokio::fs::read(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(RagError::storage(err)),
    };

    serde_json::from_slice::<T>(&contents)
        .map(Some)
        .map_err(|e| RagError::Storage(format!("{}: {}", path.display(), e)))
}

/// Removes a file, treating "already gone" as success. Returns whether a
/// file was actually removed.
pub async fn remove_file_if_exists(path: &Path) -> Result<bool, RagError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(RagError::storage(err)),
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.partial", uuid::Uuid::new_v4().simple()));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn write_then_read_leaves_no_partial_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("data.json");

        let mut value = BTreeMap::new();
        value.insert("a".to_string(), 1);
        write_json_atomic(&path, &value).await.unwrap();

        let loaded: Option<BTreeMap<String, i32>> = read_json(&path).await.unwrap();
        assert_eq!(loaded, Some(value));

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn missing_file_reads_as_none_and_corrupt_file_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let missing: Option<Vec<String>> = read_json(&tmp.path().join("nope.json")).await.unwrap();
        assert!(missing.is_none());

        let corrupt = tmp.path().join("corrupt.json");
        std::fs::write(&corrupt, "{not json").unwrap();
        let result: Result<Option<Vec<String>>, _> = read_json(&corrupt).await;
        assert!(matches!(result, Err(RagError::Storage(_))));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("x.json");
        std::fs::write(&path, "{}").unwrap();

        assert!(remove_file_if_exists(&path).await.unwrap());
        assert!(!remove_file_if_exists(&path).await.unwrap());
    }
}

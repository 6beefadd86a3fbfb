//! Persisted set of source files already present in the collection.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;
use crate::core::persist::{read_json, remove_file_if_exists, write_json_atomic};

pub const MANIFEST_FILE: &str = "indexed_files.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFileSet {
    #[serde(default)]
    pub indexed_files: BTreeSet<String>,
}

impl IndexedFileSet {
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    /// Missing manifest loads as empty. Corrupt manifest is an error; the
    /// caller decides whether to start over.
    pub async fn load(dir: &Path) -> Result<Self, RagError> {
        Ok(read_json::<Self>(&Self::path_in(dir))
            .await?
            .unwrap_or_default())
    }

    pub async fn save(&self, dir: &Path) -> Result<(), RagError> {
        write_json_atomic(&Self::path_in(dir), self).await
    }

    pub async fn remove(dir: &Path) -> Result<bool, RagError> {
        remove_file_if_exists(&Self::path_in(dir)).await
    }

    pub fn contains(&self, origin_file: &str) -> bool {
        self.indexed_files.contains(origin_file)
    }

    pub fn len(&self) -> usize {
        self.indexed_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexed_files.is_empty()
    }

    /// New set holding every current file plus `files`.
    pub fn union<'a>(&self, files: impl IntoIterator<Item = &'a str>) -> Self {
        let mut next = self.clone();
        next.indexed_files
            .extend(files.into_iter().map(str::to_string));
        next
    }

    pub fn sorted(&self) -> Vec<String> {
        self.indexed_files.iter().cloned().collect()
    }
}

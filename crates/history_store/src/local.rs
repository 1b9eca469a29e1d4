use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::HistoryStoreError;
use crate::paths::temp_file_for;
use crate::schema::{CacheFile, ConversationTurn, CACHE_VERSION};

/// JSON file mirroring the merged history view.
#[derive(Debug, Clone)]
pub struct LocalHistoryFile {
    path: PathBuf,
}

impl LocalHistoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file reads as an empty history.
    pub fn load(&self) -> Result<Vec<ConversationTurn>, HistoryStoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(HistoryStoreError::io("reading history cache", &self.path, source))
            }
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let cache: CacheFile = serde_json::from_str(&text)
            .map_err(|source| HistoryStoreError::json_parse(&self.path, source))?;
        if cache.version != CACHE_VERSION {
            return Err(HistoryStoreError::UnsupportedVersion {
                path: self.path.clone(),
                found: cache.version,
                expected: CACHE_VERSION,
            });
        }
        Ok(cache.turns)
    }

    /// Replaces the file contents atomically via a temporary sibling.
    pub fn save(&self, turns: &[ConversationTurn]) -> Result<(), HistoryStoreError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| {
                HistoryStoreError::io("creating history directory", parent, source)
            })?;
        }

        let cache = CacheFile {
            version: CACHE_VERSION,
            turns: turns.to_vec(),
        };
        let json = serde_json::to_string_pretty(&cache)
            .map_err(|source| HistoryStoreError::json_serialize(&self.path, source))?;

        let temp = temp_file_for(&self.path);
        fs::write(&temp, json)
            .map_err(|source| HistoryStoreError::io("writing history cache", &temp, source))?;
        fs::rename(&temp, &self.path)
            .map_err(|source| HistoryStoreError::io("replacing history cache", &self.path, source))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::LocalHistoryFile;
    use crate::error::HistoryStoreError;
    use crate::schema::ConversationTurn;

    #[test]
    fn missing_file_is_empty_history() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = LocalHistoryFile::new(dir.path().join("nested/history.json"));
        assert!(file.load().expect("load").is_empty());
    }

    #[test]
    fn save_then_load_preserves_turns_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/history.json");
        let file = LocalHistoryFile::new(&path);
        let turns = vec![ConversationTurn::new("q", "a", "2026-02-14T10:00:00.000000Z")];

        file.save(&turns).expect("save");
        assert_eq!(file.load().expect("load"), turns);
        assert!(!dir.path().join("nested/history.json.tmp").exists());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("history.json");
        fs::write(&path, r#"{"version": 9, "turns": []}"#).expect("write");

        let error = LocalHistoryFile::new(&path).load().expect_err("version 9 is unknown");
        assert!(matches!(
            error,
            HistoryStoreError::UnsupportedVersion { found: 9, .. }
        ));
    }
}

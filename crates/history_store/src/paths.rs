use std::path::{Path, PathBuf};

pub const HISTORY_DIR: &str = ".codegen";
pub const HISTORY_FILE_NAME: &str = "history.json";

#[must_use]
pub fn history_file(root: &Path) -> PathBuf {
    root.join(HISTORY_DIR).join(HISTORY_FILE_NAME)
}

/// Sibling path used for atomic replacement of `path`.
#[must_use]
pub fn temp_file_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

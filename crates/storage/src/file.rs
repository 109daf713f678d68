use std::path::Path;

use serde::Serialize;
use snafu::ResultExt;

use super::error::{
    CreateDirSnafu, RenameTempFileSnafu, SerializeStateSnafu, StorageResult, WriteFileSnafu,
};

/// Writes `value` as pretty JSON, replacing `path` through a `.json.tmp` sibling so
/// readers never observe a half-written file.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(CreateDirSnafu {
            stage: "create-parent-directory",
            path: parent.to_path_buf(),
        })?;
    }

    let content = serde_json::to_string_pretty(value).context(SerializeStateSnafu {
        stage: "serialize-json",
    })?;

    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, content).context(WriteFileSnafu {
        stage: "write-temporary-file",
        path: temp_path.clone(),
    })?;

    std::fs::rename(&temp_path, path).context(RenameTempFileSnafu {
        stage: "rename-temporary-file",
        from: temp_path,
        to: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_parents_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("state.json");

        write_json_atomic(&path, &serde_json::json!({"k": 1})).unwrap();
        write_json_atomic(&path, &serde_json::json!({"k": 2})).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["k"], 2);
        assert!(!path.with_extension("json.tmp").exists());
    }
}

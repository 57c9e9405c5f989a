use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{NotebookError, Result};
use crate::models::DirectoryConfig;

/// Name of the config file kept in every notebook directory.
pub const DIR_CONFIG_FILE: &str = "_vnote.json";

/// Older name of the same file; renamed to [`DIR_CONFIG_FILE`] when found.
pub const OBSOLETE_DIR_CONFIG_FILE: &str = ".vnote.json";

/// True for the names of the directory config files, which no note may take.
pub fn is_config_file_name(name: &str) -> bool {
    [DIR_CONFIG_FILE, OBSOLETE_DIR_CONFIG_FILE]
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// Reads and writes the per-directory JSON config.
///
/// The notebook never touches `_vnote.json` directly; it goes through this
/// trait so the store can be swapped (tests inject one that fails writes).
pub trait ConfigStore: Send + Sync {
    /// Reads the config of directory `dir`. Fails if it is missing or unparsable.
    fn read(&self, dir: &Path) -> Result<DirectoryConfig>;

    /// Replaces the config of directory `dir` with `config`.
    fn write(&self, dir: &Path, config: &DirectoryConfig) -> Result<()>;

    fn exists(&self, dir: &Path) -> bool;

    fn delete(&self, dir: &Path) -> Result<()>;
}

/// [`ConfigStore`] backed by pretty-printed JSON files on disk.
#[derive(Debug, Default, Clone)]
pub struct JsonConfigStore;

impl JsonConfigStore {
    pub fn new() -> Self {
        Self
    }

    /// Path of the config file for `dir`, migrating the obsolete file name
    /// if only that one exists.
    pub fn config_path(dir: &Path) -> PathBuf {
        let path = dir.join(DIR_CONFIG_FILE);
        if !path.exists() {
            let obsolete = dir.join(OBSOLETE_DIR_CONFIG_FILE);
            if obsolete.exists() {
                match fs::rename(&obsolete, &path) {
                    Ok(()) => log::info!("renamed obsolete config {} to {}", obsolete.display(), DIR_CONFIG_FILE),
                    Err(e) => {
                        log::warn!("failed to rename obsolete config {}: {}", obsolete.display(), e);
                        return obsolete;
                    }
                }
            }
        }
        path
    }
}

impl ConfigStore for JsonConfigStore {
    fn read(&self, dir: &Path) -> Result<DirectoryConfig> {
        let path = Self::config_path(dir);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(NotebookError::ConfigMissing(dir.to_path_buf()));
            }
            Err(e) => return Err(NotebookError::io("read config", path, e)),
        };

        let corrupt = |reason: String| NotebookError::ConfigCorrupt {
            path: path.clone(),
            reason,
        };
        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;
        match value.as_object() {
            Some(obj) if !obj.is_empty() => {}
            Some(_) => return Err(corrupt("empty config object".to_string())),
            None => return Err(corrupt("config is not a JSON object".to_string())),
        }
        serde_json::from_value(value).map_err(|e| corrupt(e.to_string()))
    }

    fn write(&self, dir: &Path, config: &DirectoryConfig) -> Result<()> {
        let content = serde_json::to_string_pretty(config)?;
        let path = dir.join(DIR_CONFIG_FILE);

        // Write next to the target, then rename over it
        let tmp = dir.join(format!("{}.tmp", DIR_CONFIG_FILE));
        fs::write(&tmp, content).map_err(|e| NotebookError::io("write config", &tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(NotebookError::io("replace config", path, e));
        }
        Ok(())
    }

    fn exists(&self, dir: &Path) -> bool {
        dir.join(DIR_CONFIG_FILE).exists() || dir.join(OBSOLETE_DIR_CONFIG_FILE).exists()
    }

    fn delete(&self, dir: &Path) -> Result<()> {
        for name in [DIR_CONFIG_FILE, OBSOLETE_DIR_CONFIG_FILE] {
            let path = dir.join(name);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(NotebookError::io("delete config", path, e)),
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileRecord, SubDirectoryRecord};
    use chrono::Utc;
    use tempfile::tempdir;

    #[test]
    fn test_read_missing_config() {
        let temp_dir = tempdir().unwrap();
        let store = JsonConfigStore::new();

        match store.read(temp_dir.path()) {
            Err(NotebookError::ConfigMissing(p)) => assert_eq!(p, temp_dir.path()),
            other => panic!("expected ConfigMissing, got {:?}", other),
        }
    }

    #[test]
    fn test_read_corrupt_config() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join(DIR_CONFIG_FILE), "{ not json").unwrap();

        let store = JsonConfigStore::new();
        assert!(matches!(
            store.read(temp_dir.path()),
            Err(NotebookError::ConfigCorrupt { .. })
        ));
    }

    #[test]
    fn test_read_empty_or_non_object_config_is_corrupt() {
        let temp_dir = tempdir().unwrap();
        let store = JsonConfigStore::new();

        for content in ["{}", "  { }\n", "[]", "\"1\""] {
            fs::write(temp_dir.path().join(DIR_CONFIG_FILE), content).unwrap();
            assert!(
                matches!(store.read(temp_dir.path()), Err(NotebookError::ConfigCorrupt { .. })),
                "{:?} should be rejected",
                content
            );
        }
    }

    #[test]
    fn test_write_then_read_preserves_order() {
        let temp_dir = tempdir().unwrap();
        let store = JsonConfigStore::new();

        let mut config = DirectoryConfig::new(Utc::now());
        for name in ["zeta", "alpha", "mid"] {
            config.sub_directories.push(SubDirectoryRecord {
                name: name.to_string(),
            });
        }
        for name in ["c.md", "a.md", "b.md"] {
            config.files.push(FileRecord {
                name: name.to_string(),
                doc_type: None,
                created_time: config.created_time,
                modified_time: config.created_time,
                attachment_folder: String::new(),
                attachments: vec![],
            });
        }

        store.write(temp_dir.path(), &config).unwrap();
        assert!(store.exists(temp_dir.path()));
        assert!(!temp_dir.path().join("_vnote.json.tmp").exists());

        let back = store.read(temp_dir.path()).unwrap();
        let dirs: Vec<_> = back.sub_directories.iter().map(|d| d.name.as_str()).collect();
        let files: Vec<_> = back.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(dirs, vec!["zeta", "alpha", "mid"]);
        assert_eq!(files, vec!["c.md", "a.md", "b.md"]);
    }

    #[test]
    fn test_obsolete_config_is_migrated() {
        let temp_dir = tempdir().unwrap();
        fs::write(
            temp_dir.path().join(OBSOLETE_DIR_CONFIG_FILE),
            r#"{"version": "1", "created_time": "2017-01-01T00:00:00Z", "sub_directories": [], "files": []}"#,
        )
        .unwrap();

        let store = JsonConfigStore::new();
        assert!(store.exists(temp_dir.path()));
        store.read(temp_dir.path()).unwrap();

        assert!(temp_dir.path().join(DIR_CONFIG_FILE).exists());
        assert!(!temp_dir.path().join(OBSOLETE_DIR_CONFIG_FILE).exists());
    }

    #[test]
    fn test_delete_config() {
        let temp_dir = tempdir().unwrap();
        let store = JsonConfigStore::new();
        store.write(temp_dir.path(), &DirectoryConfig::new(Utc::now())).unwrap();

        store.delete(temp_dir.path()).unwrap();
        assert!(!store.exists(temp_dir.path()));
        // Deleting again is fine.
        store.delete(temp_dir.path()).unwrap();
    }
}

use anyhow::{Context, Result};
use nbstore::models::DirectoryConfig;
use nbstore::{ConfigStore, JsonConfigStore, Notebook, Settings, SettingsManager};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Config store that can be switched to fail every write
#[derive(Default)]
pub struct FailingStore {
    inner: JsonConfigStore,
    fail: AtomicBool,
}

#[allow(dead_code)]
impl FailingStore {
    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl ConfigStore for FailingStore {
    fn read(&self, dir: &Path) -> nbstore::Result<DirectoryConfig> {
        self.inner.read(dir)
    }

    fn write(&self, dir: &Path, config: &DirectoryConfig) -> nbstore::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(nbstore::NotebookError::io(
                "write config",
                dir,
                std::io::Error::new(std::io::ErrorKind::Other, "injected failure"),
            ));
        }
        self.inner.write(dir, config)
    }

    fn exists(&self, dir: &Path) -> bool {
        self.inner.exists(dir)
    }

    fn delete(&self, dir: &Path) -> nbstore::Result<()> {
        self.inner.delete(dir)
    }
}

/// Test fixture: a fresh notebook in a temporary directory
#[allow(dead_code)]
pub struct TestNotebook {
    _temp_dir: TempDir,
    pub base: PathBuf,
    pub root: PathBuf,
    pub settings_path: PathBuf,
    pub store: Arc<FailingStore>,
    pub notebook: Notebook,
}

#[allow(dead_code)]
impl TestNotebook {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir().context("Failed to create temporary directory")?;
        let base = temp_dir.path().to_path_buf();
        let root = base.join("notebook");
        let settings_path = base.join("settings.json");
        let store = Arc::new(FailingStore::default());

        let notebook = Notebook::create(&root, "notebook", store.clone(), settings(&settings_path))
            .context("Failed to create notebook")?;

        Ok(Self {
            _temp_dir: temp_dir,
            base,
            root,
            settings_path,
            store,
            notebook,
        })
    }

    /// Loads the notebook again from what is on disk
    pub fn reload(&self) -> Result<Notebook> {
        Notebook::load(&self.root, Arc::new(JsonConfigStore::new()), settings(&self.settings_path))
            .context("Failed to reload notebook")
    }

    /// Writes a file outside the notebook, e.g. as an attachment source
    pub fn outside_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        let dir = self.base.join("outside");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

fn settings(path: &Path) -> Arc<SettingsManager> {
    Arc::new(SettingsManager::with_settings(Settings::default(), path.to_path_buf()))
}

/// Names of the notes of `dir`, in order
#[allow(dead_code)]
pub fn file_names(notebook: &mut Notebook, dir: nbstore::DirId) -> Result<Vec<String>> {
    notebook.open(dir)?;
    let files = notebook.dir(dir)?.files().to_vec();
    let mut names = Vec::with_capacity(files.len());
    for file in files {
        names.push(notebook.file(file)?.name().to_string());
    }
    Ok(names)
}

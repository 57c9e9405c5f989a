use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::SettingsManager;
use crate::error::{NotebookError, Result};
use crate::filesystem::{clean_path, NotebookLayout};
use crate::models::{AttachmentRecord, DirectoryConfig, DocType, FileRecord, NotebookRecord};
use crate::store::ConfigStore;

/// Handle of a directory node inside a [`Notebook`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirId(pub(crate) usize);

/// Handle of a note inside a [`Notebook`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub(crate) usize);

/// In-memory folder of a notebook, lazily synchronized with its `_vnote.json`.
///
/// A closed node has both child sequences empty. Children are loaded by
/// [`Notebook::open`] and freed again by [`Notebook::close`].
#[derive(Debug, Clone)]
pub struct DirNode {
    pub(crate) name: String,
    pub(crate) created_time: DateTime<Utc>,
    pub(crate) opened: bool,
    pub(crate) expanded: bool,
    pub(crate) sub_dirs: Vec<DirId>,
    pub(crate) files: Vec<FileId>,
    pub(crate) parent: Option<DirId>,
}

impl DirNode {
    pub(crate) fn closed(name: impl Into<String>, created_time: DateTime<Utc>, parent: Option<DirId>) -> Self {
        Self {
            name: name.into(),
            created_time,
            opened: false,
            expanded: false,
            sub_dirs: Vec::new(),
            files: Vec::new(),
            parent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_time(&self) -> DateTime<Utc> {
        self.created_time
    }

    pub fn is_opened(&self) -> bool {
        self.opened
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn sub_directories(&self) -> &[DirId] {
        &self.sub_dirs
    }

    pub fn files(&self) -> &[FileId] {
        &self.files
    }

    pub fn parent(&self) -> Option<DirId> {
        self.parent
    }
}

/// In-memory note: metadata plus its attachment records.
#[derive(Debug, Clone)]
pub struct FileNode {
    pub(crate) name: String,
    pub(crate) doc_type: DocType,
    pub(crate) created_time: DateTime<Utc>,
    pub(crate) modified_time: DateTime<Utc>,
    pub(crate) attachment_folder: String,
    pub(crate) attachments: Vec<AttachmentRecord>,
    pub(crate) parent: Option<DirId>,
}

impl FileNode {
    pub(crate) fn new(name: impl Into<String>, doc_type: DocType, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            doc_type,
            created_time: now,
            modified_time: now,
            attachment_folder: String::new(),
            attachments: Vec::new(),
            parent: None,
        }
    }

    pub(crate) fn from_record(record: FileRecord, doc_type: DocType, parent: DirId) -> Self {
        Self {
            name: record.name,
            doc_type,
            created_time: record.created_time,
            modified_time: record.modified_time,
            attachment_folder: record.attachment_folder,
            attachments: record.attachments,
            parent: Some(parent),
        }
    }

    pub(crate) fn to_record(&self) -> FileRecord {
        FileRecord {
            name: self.name.clone(),
            doc_type: Some(self.doc_type),
            created_time: self.created_time,
            modified_time: self.modified_time,
            attachment_folder: self.attachment_folder.clone(),
            attachments: self.attachments.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc_type(&self) -> DocType {
        self.doc_type
    }

    pub fn created_time(&self) -> DateTime<Utc> {
        self.created_time
    }

    pub fn modified_time(&self) -> DateTime<Utc> {
        self.modified_time
    }

    /// Name of this note's folder under the notebook attachment folder.
    /// Empty until the first attachment is added.
    pub fn attachment_folder(&self) -> &str {
        &self.attachment_folder
    }

    pub fn attachments(&self) -> &[AttachmentRecord] {
        &self.attachments
    }

    pub fn parent(&self) -> Option<DirId> {
        self.parent
    }
}

/// A notebook: a root folder on disk plus the arena owning every loaded node.
///
/// Nodes refer to each other through [`DirId`] / [`FileId`] handles. Slots of
/// closed or deleted nodes are cleared and never reused, so a handle that
/// outlived its node yields [`NotebookError::StaleNode`].
pub struct Notebook {
    pub(crate) name: String,
    pub(crate) layout: NotebookLayout,
    pub(crate) record: NotebookRecord,
    pub(crate) store: Arc<dyn ConfigStore>,
    pub(crate) settings: Arc<SettingsManager>,
    pub(crate) dirs: Vec<Option<DirNode>>,
    pub(crate) files: Vec<Option<FileNode>>,
    pub(crate) root: DirId,
}

impl Notebook {
    /// Creates a new notebook at `root`, writing its root config.
    ///
    /// Folder names come from the settings and are stored in the root
    /// config so later setting changes do not move existing content.
    pub fn create(
        root: &Path,
        name: &str,
        store: Arc<dyn ConfigStore>,
        settings: Arc<SettingsManager>,
    ) -> Result<Self> {
        if store.exists(root) {
            return Err(NotebookError::NameConflict(root.display().to_string()));
        }

        let prefs = settings.get();
        let record = NotebookRecord {
            image_folder: Some(prefs.image_folder),
            attachment_folder: Some(prefs.attachment_folder),
            recycle_bin_folder: Some(prefs.recycle_bin_folder),
        };
        let layout = layout_for(root, &record, &settings);
        layout
            .ensure_root()
            .map_err(|e| NotebookError::io("create notebook folder", root, e))?;

        let now = Utc::now();
        let mut config = DirectoryConfig::new(now);
        config.notebook = record.clone();
        store.write(root, &config)?;

        log::info!("created notebook {} at {}", name, root.display());
        Ok(Self::assemble(name.to_string(), layout, record, store, settings, now))
    }

    /// Loads an existing notebook. The root directory stays closed until
    /// first use.
    pub fn load(root: &Path, store: Arc<dyn ConfigStore>, settings: Arc<SettingsManager>) -> Result<Self> {
        let config = store.read(root)?;
        let record = config.notebook;
        let layout = layout_for(root, &record, &settings);
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());

        log::debug!("loaded notebook {} from {}", name, root.display());
        Ok(Self::assemble(name, layout, record, store, settings, config.created_time))
    }

    fn assemble(
        name: String,
        layout: NotebookLayout,
        record: NotebookRecord,
        store: Arc<dyn ConfigStore>,
        settings: Arc<SettingsManager>,
        created_time: DateTime<Utc>,
    ) -> Self {
        let root_name = name.clone();
        Self {
            name,
            layout,
            record,
            store,
            settings,
            dirs: vec![Some(DirNode::closed(root_name, created_time, None))],
            files: Vec::new(),
            root: DirId(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> DirId {
        self.root
    }

    pub fn root_path(&self) -> &Path {
        &self.layout.root
    }

    pub fn layout(&self) -> &NotebookLayout {
        &self.layout
    }

    pub fn settings(&self) -> &Arc<SettingsManager> {
        &self.settings
    }

    pub fn dir(&self, id: DirId) -> Result<&DirNode> {
        self.dirs
            .get(id.0)
            .and_then(|slot| slot.as_ref())
            .ok_or(NotebookError::StaleNode)
    }

    pub(crate) fn dir_mut(&mut self, id: DirId) -> Result<&mut DirNode> {
        self.dirs
            .get_mut(id.0)
            .and_then(|slot| slot.as_mut())
            .ok_or(NotebookError::StaleNode)
    }

    pub fn file(&self, id: FileId) -> Result<&FileNode> {
        self.files
            .get(id.0)
            .and_then(|slot| slot.as_ref())
            .ok_or(NotebookError::StaleNode)
    }

    pub(crate) fn file_mut(&mut self, id: FileId) -> Result<&mut FileNode> {
        self.files
            .get_mut(id.0)
            .and_then(|slot| slot.as_mut())
            .ok_or(NotebookError::StaleNode)
    }

    pub(crate) fn alloc_dir(&mut self, node: DirNode) -> DirId {
        self.dirs.push(Some(node));
        DirId(self.dirs.len() - 1)
    }

    pub(crate) fn alloc_file(&mut self, node: FileNode) -> FileId {
        self.files.push(Some(node));
        FileId(self.files.len() - 1)
    }

    /// Frees a directory node together with everything loaded below it.
    pub(crate) fn free_dir_tree(&mut self, id: DirId) {
        let Some(node) = self.dirs.get_mut(id.0).and_then(|slot| slot.take()) else {
            return;
        };
        for file in node.files {
            self.free_file(file);
        }
        for sub in node.sub_dirs {
            self.free_dir_tree(sub);
        }
    }

    pub(crate) fn free_file(&mut self, id: FileId) {
        if let Some(slot) = self.files.get_mut(id.0) {
            *slot = None;
        }
    }

    /// Absolute path of `dir`, rebuilt by walking the parent handles.
    pub fn dir_path(&self, dir: DirId) -> Result<PathBuf> {
        let relative = self.dir_relative_path(dir)?;
        if relative.as_os_str().is_empty() {
            return Ok(self.layout.root.clone());
        }
        Ok(self.layout.root.join(relative))
    }

    /// Path of `dir` relative to the notebook root; empty for the root.
    pub fn dir_relative_path(&self, dir: DirId) -> Result<PathBuf> {
        let mut names = Vec::new();
        let mut current = dir;
        while current != self.root {
            let node = self.dir(current)?;
            names.push(node.name.as_str());
            // A detached directory has no path until it is re-added.
            current = node.parent.ok_or(NotebookError::StaleNode)?;
        }
        Ok(names.iter().rev().collect())
    }

    /// Folder that contains `dir` on disk.
    pub fn dir_base_path(&self, dir: DirId) -> Result<PathBuf> {
        let path = self.dir_path(dir)?;
        Ok(path.parent().map(Path::to_path_buf).unwrap_or(path))
    }

    pub fn file_path(&self, file: FileId) -> Result<PathBuf> {
        let node = self.file(file)?;
        let parent = node.parent.ok_or(NotebookError::StaleNode)?;
        Ok(self.dir_path(parent)?.join(&node.name))
    }

    pub fn file_relative_path(&self, file: FileId) -> Result<PathBuf> {
        let node = self.file(file)?;
        let parent = node.parent.ok_or(NotebookError::StaleNode)?;
        Ok(self.dir_relative_path(parent)?.join(&node.name))
    }

    /// Builds the config of an opened directory from its in-memory state.
    pub(crate) fn dir_config(&self, dir: DirId) -> Result<DirectoryConfig> {
        let node = self.dir(dir)?;
        if !node.opened {
            return Err(NotebookError::NotOpened(node.name.clone()));
        }

        let mut config = DirectoryConfig::new(node.created_time);
        for sub in &node.sub_dirs {
            config.sub_directories.push(crate::models::SubDirectoryRecord {
                name: self.dir(*sub)?.name.clone(),
            });
        }
        for file in &node.files {
            config.files.push(self.file(*file)?.to_record());
        }
        if dir == self.root {
            config.notebook = self.record.clone();
        }
        Ok(config)
    }

    /// Rewrites the whole config of `dir`.
    pub(crate) fn write_config(&self, dir: DirId) -> Result<()> {
        let config = self.dir_config(dir)?;
        let path = self.dir_path(dir)?;
        self.store.write(&path, &config)
    }

    /// Resolves a note by its path relative to the notebook root, using `/`
    /// or `\` as separators.
    pub fn load_file(&mut self, relative: &str) -> Result<Option<FileId>> {
        let segments: Vec<&str> = relative
            .split(['/', '\\'])
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        self.try_load_file(self.root, &segments)
    }

    /// Resolves an absolute path to a note of this notebook, if it is one.
    pub fn file_from_path(&mut self, path: &Path) -> Result<Option<FileId>> {
        let path = clean_path(path);
        let root = clean_path(&self.layout.root);
        let Ok(relative) = path.strip_prefix(&root) else {
            return Ok(None);
        };
        let relative = relative.to_string_lossy().into_owned();
        if relative.is_empty() {
            return Ok(None);
        }
        self.load_file(&relative)
    }

    /// Absolute path of the attachment folder of `file`, if it has one.
    pub fn attachment_folder_path(&self, file: FileId) -> Result<Option<PathBuf>> {
        let node = self.file(file)?;
        if node.attachment_folder.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.layout.attachments_dir.join(&node.attachment_folder)))
    }

    pub fn doc_type(&self, file: FileId) -> Result<DocType> {
        Ok(self.file(file)?.doc_type)
    }
}

fn layout_for(root: &Path, record: &NotebookRecord, settings: &SettingsManager) -> NotebookLayout {
    let defaults = settings.get();
    NotebookLayout::new(
        root,
        record.attachment_folder.as_deref().unwrap_or(&defaults.attachment_folder),
        record.image_folder.as_deref().unwrap_or(&defaults.image_folder),
        record.recycle_bin_folder.as_deref().unwrap_or(&defaults.recycle_bin_folder),
    )
}

/// Reorders `items` so that position `i` holds `items[permutation[i]]`.
pub(crate) fn apply_permutation<T: Clone>(items: &[T], permutation: &[usize]) -> Result<Vec<T>> {
    let invalid = NotebookError::InvalidPermutation {
        expected: items.len(),
        got: permutation.len(),
    };
    if permutation.len() != items.len() {
        return Err(invalid);
    }

    let mut seen = vec![false; items.len()];
    for &idx in permutation {
        if idx >= items.len() || seen[idx] {
            return Err(invalid);
        }
        seen[idx] = true;
    }
    Ok(permutation.iter().map(|&idx| items[idx].clone()).collect())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::sync::Arc;

    use crate::config::{Settings, SettingsManager};
    use crate::store::testing::FlakyConfigStore;

    use super::Notebook;

    pub fn settings_in(dir: &Path) -> Arc<SettingsManager> {
        Arc::new(SettingsManager::with_settings(
            Settings::default(),
            dir.join("settings.json"),
        ))
    }

    /// Fresh notebook at `<dir>/nb` backed by a store that can fail writes.
    pub fn notebook_in(dir: &Path) -> (Notebook, Arc<FlakyConfigStore>) {
        let store = Arc::new(FlakyConfigStore::new());
        let notebook = Notebook::create(&dir.join("nb"), "nb", store.clone(), settings_in(dir)).unwrap();
        (notebook, store)
    }

    /// Loads the same notebook again from disk with a clean store.
    pub fn reload(dir: &Path) -> Notebook {
        Notebook::load(&dir.join("nb"), Arc::new(FlakyConfigStore::new()), settings_in(dir)).unwrap()
    }
}

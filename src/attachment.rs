use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::directory::name_matches;
use crate::error::{NotebookError, Result};
use crate::filesystem::{self, file_name_with_sequence, is_legal_file_name, NotebookLayout};
use crate::models::{AttachmentRecord, BatchReport};
use crate::notebook::{apply_permutation, FileId, Notebook};
use crate::store::ConfigStore;

/// Fresh folder name under the notebook attachment folder.
pub(crate) fn new_attachment_folder_name(layout: &NotebookLayout) -> String {
    loop {
        let name = Uuid::new_v4().to_string();
        if !layout.attachments_dir.join(&name).exists() {
            return name;
        }
    }
}

/// Attachment folder names of every note recorded in the tree at `dir`.
/// Unreadable configs are skipped.
pub(crate) fn collect_attachment_folders(store: &dyn ConfigStore, dir: &Path) -> Vec<String> {
    let config = match store.read(dir) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("skipping attachments below {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut folders: Vec<String> = config
        .files
        .iter()
        .filter(|f| !f.attachment_folder.is_empty())
        .map(|f| f.attachment_folder.clone())
        .collect();
    for sub in &config.sub_directories {
        folders.extend(collect_attachment_folders(store, &dir.join(&sub.name)));
    }
    folders
}

/// Gives every note in the freshly copied tree at `dir` its own copy of its
/// attachment folder, so the copy and the original never share files.
pub(crate) fn duplicate_attachment_folders(store: &dyn ConfigStore, layout: &NotebookLayout, dir: &Path) -> Result<()> {
    let mut config = store.read(dir)?;

    let mut changed = false;
    for record in config.files.iter_mut().filter(|f| !f.attachment_folder.is_empty()) {
        let src = layout.attachments_dir.join(&record.attachment_folder);
        let folder = new_attachment_folder_name(layout);
        if src.exists() {
            let dest = layout.attachments_dir.join(&folder);
            filesystem::copy_directory(&src, &dest, false)
                .map_err(|e| NotebookError::io("copy attachment folder", &src, e))?;
        }
        record.attachment_folder = folder;
        changed = true;
    }
    if changed {
        store.write(dir, &config)?;
    }

    for sub in &config.sub_directories {
        duplicate_attachment_folders(store, layout, &dir.join(&sub.name))?;
    }
    Ok(())
}

impl Notebook {
    /// Index of attachment `name` of `file`.
    pub fn find_attachment(&self, file: FileId, name: &str, case_sensitive: bool) -> Result<Option<usize>> {
        Ok(self
            .file(file)?
            .attachments
            .iter()
            .position(|a| name_matches(&a.name, name, case_sensitive)))
    }

    pub fn attachment_path(&self, file: FileId, name: &str) -> Result<PathBuf> {
        let folder = self
            .attachment_folder_path(file)?
            .ok_or_else(|| NotebookError::NotFound(name.to_string()))?;
        Ok(folder.join(name))
    }

    /// Returns the note's attachment folder name, creating the folder (and
    /// picking a name for it) on first use. The flag tells whether a new
    /// name was assigned.
    fn ensure_attachment_folder(&mut self, file: FileId) -> Result<(String, bool)> {
        let existing = self.file(file)?.attachment_folder.clone();
        let (folder, assigned) = if existing.is_empty() {
            (new_attachment_folder_name(&self.layout), true)
        } else {
            (existing, false)
        };

        let path = self.layout.attachments_dir.join(&folder);
        fs::create_dir_all(&path).map_err(|e| NotebookError::io("create attachment folder", &path, e))?;
        if assigned {
            self.file_mut(file)?.attachment_folder = folder.clone();
        }
        Ok((folder, assigned))
    }

    /// Undoes [`Self::ensure_attachment_folder`] when it assigned a folder.
    fn release_attachment_folder(&mut self, file: FileId, folder: &str) {
        let path = self.layout.attachments_dir.join(folder);
        if let Err(e) = fs::remove_dir_all(&path) {
            log::warn!("failed to remove attachment folder {}: {}", path.display(), e);
        }
        if let Ok(node) = self.file_mut(file) {
            node.attachment_folder.clear();
        }
    }

    /// Copies `src` into the note's attachment folder, renaming it with a
    /// sequence number on collision, and persists. Returns the stored name.
    pub fn add_attachment(&mut self, file: FileId, src: &Path) -> Result<String> {
        let parent = self.file(file)?.parent.ok_or(NotebookError::StaleNode)?;
        if !src.is_file() {
            return Err(NotebookError::NotFound(src.display().to_string()));
        }
        let src_name = src
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| NotebookError::IllegalName(src.display().to_string()))?;

        let (folder, assigned) = self.ensure_attachment_folder(file)?;
        let folder_path = self.layout.attachments_dir.join(&folder);
        let name = file_name_with_sequence(&folder_path, src_name);
        let dest = folder_path.join(&name);

        if let Err(e) = filesystem::copy_file(src, &dest, false) {
            if assigned {
                self.release_attachment_folder(file, &folder);
            }
            return Err(NotebookError::io("copy attachment", src, e));
        }

        self.file_mut(file)?.attachments.push(AttachmentRecord { name: name.clone() });
        if let Err(e) = self.write_config(parent) {
            self.file_mut(file)?.attachments.pop();
            if let Err(cleanup) = fs::remove_file(&dest) {
                log::warn!("failed to remove {}: {}", dest.display(), cleanup);
            }
            if assigned {
                self.release_attachment_folder(file, &folder);
            }
            return Err(e);
        }

        log::debug!("added attachment {} to {}", name, self.file(file)?.name);
        Ok(name)
    }

    /// Adds each path independently; failures do not undo the others.
    pub fn add_attachments(&mut self, file: FileId, paths: &[PathBuf]) -> BatchReport {
        let mut report = BatchReport::default();
        for path in paths {
            match self.add_attachment(file, path) {
                Ok(name) => report.succeeded.push(name),
                Err(e) => {
                    log::warn!("failed to add attachment {}: {}", path.display(), e);
                    report.errors.push(format!("{}: {}", path.display(), e));
                }
            }
        }
        report
    }

    /// Deletes the named attachments, or all of them for `None`.
    ///
    /// The config is rewritten first; backing files then go to the recycle
    /// bin unless `skip_recycle_bin` is set. When no attachment is left the
    /// note's attachment folder is removed as well.
    pub fn delete_attachments(&mut self, file: FileId, names: Option<&[String]>, skip_recycle_bin: bool) -> Result<()> {
        let node = self.file(file)?;
        let parent = node.parent.ok_or(NotebookError::StaleNode)?;

        let targets: Vec<String> = match names {
            None => node.attachments.iter().map(|a| a.name.clone()).collect(),
            Some(list) => {
                for name in list {
                    if !node.attachments.iter().any(|a| &a.name == name) {
                        return Err(NotebookError::NotFound(name.clone()));
                    }
                }
                list.to_vec()
            }
        };
        if targets.is_empty() {
            return Ok(());
        }

        let folder_path = self.attachment_folder_path(file)?;
        let original_records = node.attachments.clone();
        let original_folder = node.attachment_folder.clone();

        let node = self.file_mut(file)?;
        node.attachments.retain(|a| !targets.contains(&a.name));
        let emptied = node.attachments.is_empty();
        if emptied {
            node.attachment_folder.clear();
        }

        if let Err(e) = self.write_config(parent) {
            let node = self.file_mut(file)?;
            node.attachments = original_records;
            node.attachment_folder = original_folder;
            return Err(e);
        }

        let Some(folder_path) = folder_path else {
            return Ok(());
        };
        let bin = self.layout.recycle_bin();
        let mut messages = Vec::new();
        for name in &targets {
            let path = folder_path.join(name);
            if !path.exists() {
                log::warn!("attachment {} missing on disk", path.display());
                continue;
            }
            if let Err(e) = bin.delete_file(&path, skip_recycle_bin) {
                messages.push(format!("{}: {}", name, e));
            }
        }

        if emptied && folder_path.exists() {
            let leftover = fs::read_dir(&folder_path)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(true);
            let result = if leftover {
                bin.delete_directory(&folder_path, skip_recycle_bin).map(|_| ())
            } else {
                fs::remove_dir(&folder_path)
            };
            if let Err(e) = result {
                messages.push(format!("{}: {}", folder_path.display(), e));
            }
        }

        if !messages.is_empty() {
            return Err(NotebookError::Batch {
                failed: messages.len(),
                total: targets.len(),
                messages,
            });
        }
        Ok(())
    }

    /// Renames an attachment on disk and in the note's record.
    ///
    /// A change of case only is allowed; any other name matching an existing
    /// attachment ignoring case is a conflict.
    pub fn rename_attachment(&mut self, file: FileId, old_name: &str, new_name: &str) -> Result<()> {
        if old_name == new_name {
            return Ok(());
        }
        let parent = self.file(file)?.parent.ok_or(NotebookError::StaleNode)?;
        let idx = self
            .find_attachment(file, old_name, true)?
            .ok_or_else(|| NotebookError::NotFound(old_name.to_string()))?;
        if !is_legal_file_name(new_name) {
            return Err(NotebookError::IllegalName(new_name.to_string()));
        }
        if let Some(other) = self.find_attachment(file, new_name, false)? {
            if other != idx {
                return Err(NotebookError::NameConflict(new_name.to_string()));
            }
        }

        let old_path = self.attachment_path(file, old_name)?;
        let new_path = self.attachment_path(file, new_name)?;
        if new_path.exists() && !name_matches(old_name, new_name, false) {
            return Err(NotebookError::NameConflict(new_name.to_string()));
        }
        fs::rename(&old_path, &new_path).map_err(|e| NotebookError::io("rename attachment", &old_path, e))?;

        self.file_mut(file)?.attachments[idx].name = new_name.to_string();
        if let Err(e) = self.write_config(parent) {
            self.file_mut(file)?.attachments[idx].name = old_name.to_string();
            if let Err(undo) = fs::rename(&new_path, &old_path) {
                log::warn!("failed to rename {} back: {}", new_path.display(), undo);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Applies `permutation` (new position -> old index) to the attachments.
    pub fn sort_attachments(&mut self, file: FileId, permutation: &[usize]) -> Result<()> {
        let parent = self.file(file)?.parent.ok_or(NotebookError::StaleNode)?;
        let original = self.file(file)?.attachments.clone();
        let sorted = apply_permutation(&original, permutation)?;
        self.file_mut(file)?.attachments = sorted;

        if let Err(e) = self.write_config(parent) {
            self.file_mut(file)?.attachments = original;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::testing::*;
    use crate::notebook::FileId;
    use tempfile::{tempdir, TempDir};

    fn external(temp_dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let dir = temp_dir.path().join("outside");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn attachment_names(notebook: &Notebook, file: FileId) -> Vec<String> {
        notebook
            .file(file)
            .unwrap()
            .attachments()
            .iter()
            .map(|a| a.name.clone())
            .collect()
    }

    #[test]
    fn test_add_attachment_creates_folder_on_first_use() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let note = notebook.create_file(notebook.root(), "todo.md").unwrap();
        assert!(notebook.attachment_folder_path(note).unwrap().is_none());

        let src = external(&temp_dir, "spec.pdf", "pdf");
        let name = notebook.add_attachment(note, &src).unwrap();

        assert_eq!(name, "spec.pdf");
        let stored = notebook.attachment_path(note, "spec.pdf").unwrap();
        assert_eq!(fs::read_to_string(stored).unwrap(), "pdf");
        assert!(src.exists());

        let mut reloaded = reload(temp_dir.path());
        let root = reloaded.root();
        let note = reloaded.find_file(root, "todo.md", true).unwrap().unwrap();
        assert_eq!(attachment_names(&reloaded, note), vec!["spec.pdf"]);
        assert!(!reloaded.file(note).unwrap().attachment_folder().is_empty());
    }

    #[test]
    fn test_add_attachment_sequences_duplicate_names() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let note = notebook.create_file(notebook.root(), "todo.md").unwrap();
        let src = external(&temp_dir, "spec.pdf", "pdf");

        notebook.add_attachment(note, &src).unwrap();
        assert_eq!(notebook.add_attachment(note, &src).unwrap(), "spec_1.pdf");
        assert_eq!(attachment_names(&notebook, note), vec!["spec.pdf", "spec_1.pdf"]);
    }

    #[test]
    fn test_add_attachments_reports_each_failure() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let note = notebook.create_file(notebook.root(), "todo.md").unwrap();
        let a = external(&temp_dir, "a.png", "a");
        let b = external(&temp_dir, "b.png", "b");

        let report = notebook.add_attachments(note, &[a, temp_dir.path().join("missing.png"), b]);
        assert_eq!(report.succeeded, vec!["a.png", "b.png"]);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("missing.png"));
    }

    #[test]
    fn test_add_attachment_rolls_back_on_write_failure() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, store) = notebook_in(temp_dir.path());
        let note = notebook.create_file(notebook.root(), "todo.md").unwrap();
        let src = external(&temp_dir, "spec.pdf", "pdf");

        store.fail_writes(true);
        assert!(notebook.add_attachment(note, &src).is_err());
        assert!(attachment_names(&notebook, note).is_empty());
        assert!(notebook.file(note).unwrap().attachment_folder().is_empty());
        let leftovers = fs::read_dir(&notebook.layout().attachments_dir).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_delete_some_attachments_keeps_folder() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let note = notebook.create_file(notebook.root(), "todo.md").unwrap();
        notebook.add_attachment(note, &external(&temp_dir, "a.png", "a")).unwrap();
        notebook.add_attachment(note, &external(&temp_dir, "b.png", "b")).unwrap();

        notebook
            .delete_attachments(note, Some(&["a.png".to_string()]), false)
            .unwrap();
        assert_eq!(attachment_names(&notebook, note), vec!["b.png"]);
        assert!(notebook.attachment_path(note, "b.png").unwrap().exists());
        assert!(notebook.layout().recycle_bin_dir.join("a.png").exists());
    }

    #[test]
    fn test_delete_all_attachments_removes_folder() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let note = notebook.create_file(notebook.root(), "todo.md").unwrap();
        notebook.add_attachment(note, &external(&temp_dir, "a.png", "a")).unwrap();
        let folder = notebook.attachment_folder_path(note).unwrap().unwrap();

        notebook.delete_attachments(note, None, true).unwrap();
        assert!(attachment_names(&notebook, note).is_empty());
        assert!(notebook.file(note).unwrap().attachment_folder().is_empty());
        assert!(!folder.exists());
    }

    #[test]
    fn test_delete_unknown_attachment_changes_nothing() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let note = notebook.create_file(notebook.root(), "todo.md").unwrap();
        notebook.add_attachment(note, &external(&temp_dir, "a.png", "a")).unwrap();

        let result = notebook.delete_attachments(note, Some(&["a.png".to_string(), "nope.png".to_string()]), false);
        assert!(matches!(result, Err(NotebookError::NotFound(_))));
        assert_eq!(attachment_names(&notebook, note), vec!["a.png"]);
    }

    #[test]
    fn test_delete_attachments_restores_records_on_write_failure() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, store) = notebook_in(temp_dir.path());
        let note = notebook.create_file(notebook.root(), "todo.md").unwrap();
        notebook.add_attachment(note, &external(&temp_dir, "a.png", "a")).unwrap();

        store.fail_writes(true);
        assert!(notebook.delete_attachments(note, None, false).is_err());
        assert_eq!(attachment_names(&notebook, note), vec!["a.png"]);
        assert!(notebook.attachment_path(note, "a.png").unwrap().exists());
    }

    #[test]
    fn test_rename_attachment() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let note = notebook.create_file(notebook.root(), "todo.md").unwrap();
        notebook.add_attachment(note, &external(&temp_dir, "a.png", "a")).unwrap();
        notebook.add_attachment(note, &external(&temp_dir, "b.png", "b")).unwrap();

        assert!(matches!(
            notebook.rename_attachment(note, "a.png", "B.PNG"),
            Err(NotebookError::NameConflict(_))
        ));
        assert!(matches!(
            notebook.rename_attachment(note, "a.png", "a?.png"),
            Err(NotebookError::IllegalName(_))
        ));
        assert!(matches!(
            notebook.rename_attachment(note, "zzz.png", "c.png"),
            Err(NotebookError::NotFound(_))
        ));

        notebook.rename_attachment(note, "a.png", "c.png").unwrap();
        assert_eq!(attachment_names(&notebook, note), vec!["c.png", "b.png"]);
        assert!(notebook.attachment_path(note, "c.png").unwrap().exists());
        assert!(!notebook.attachment_path(note, "a.png").unwrap().exists());
    }

    #[test]
    fn test_rename_attachment_case_only_is_allowed() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let note = notebook.create_file(notebook.root(), "todo.md").unwrap();
        notebook.add_attachment(note, &external(&temp_dir, "a.png", "a")).unwrap();

        notebook.rename_attachment(note, "a.png", "A.png").unwrap();
        assert_eq!(attachment_names(&notebook, note), vec!["A.png"]);
    }

    #[test]
    fn test_rename_attachment_keeps_unlisted_file_in_folder() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let root = notebook.root();
        let note = notebook.create_file(root, "todo.md").unwrap();
        notebook.add_attachment(note, &external(&temp_dir, "a.png", "a")).unwrap();
        let stray = notebook.attachment_path(note, "stray.png").unwrap();
        fs::write(&stray, "keep").unwrap();

        let result = notebook.rename_attachment(note, "a.png", "stray.png");

        assert!(matches!(result, Err(NotebookError::NameConflict(_))));
        assert_eq!(fs::read_to_string(&stray).unwrap(), "keep");
        assert_eq!(attachment_names(&notebook, note), vec!["a.png"]);
        assert!(notebook.attachment_path(note, "a.png").unwrap().exists());
    }

    #[test]
    fn test_sort_and_find_attachments() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let note = notebook.create_file(notebook.root(), "todo.md").unwrap();
        for name in ["a.png", "b.png", "c.png"] {
            notebook.add_attachment(note, &external(&temp_dir, name, name)).unwrap();
        }

        notebook.sort_attachments(note, &[2, 0, 1]).unwrap();
        assert_eq!(attachment_names(&notebook, note), vec!["c.png", "a.png", "b.png"]);
        assert_eq!(notebook.find_attachment(note, "A.PNG", false).unwrap(), Some(1));
        assert_eq!(notebook.find_attachment(note, "A.PNG", true).unwrap(), None);
        assert!(matches!(
            notebook.sort_attachments(note, &[0, 1]),
            Err(NotebookError::InvalidPermutation { .. })
        ));
    }

    #[test]
    fn test_copied_directory_gets_own_attachment_folders() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let root = notebook.root();
        let src = notebook.create_sub_directory(root, "Src").unwrap();
        let note = notebook.create_file(src, "n.md").unwrap();
        notebook.add_attachment(note, &external(&temp_dir, "a.png", "a")).unwrap();

        let copy = notebook.copy_directory(root, "Copy", src, false).unwrap();
        let copied_note = notebook.find_file(copy, "n.md", true).unwrap().unwrap();

        let original_folder = notebook.file(note).unwrap().attachment_folder().to_string();
        let copied_folder = notebook.file(copied_note).unwrap().attachment_folder().to_string();
        assert_ne!(original_folder, copied_folder);
        assert!(notebook.attachment_path(copied_note, "a.png").unwrap().exists());

        notebook.delete_sub_directory(root, copy, true).unwrap();
        assert!(notebook.attachment_path(note, "a.png").unwrap().exists());
        assert!(!notebook.layout().attachments_dir.join(copied_folder).exists());
    }
}

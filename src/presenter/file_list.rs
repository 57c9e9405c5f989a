use std::path::PathBuf;

use crate::clipboard::{Clipboard, ClipboardSession, FileTransfer};
use crate::error::{NotebookError, Result};
use crate::filesystem::{copied_file_name, file_name_with_sequence};
use crate::models::ApiResult;
use crate::notebook::{DirId, FileId, Notebook};

use super::ListDiff;

/// Stem of the name suggested for new notes.
const NEW_NOTE_STEM: &str = "Untitled";

/// Notes of one directory, in their persisted order.
#[derive(Debug, Default)]
pub struct FileListPresenter {
    dir: Option<DirId>,
    items: Vec<FileId>,
    session: ClipboardSession,
}

impl FileListPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn directory(&self) -> Option<DirId> {
        self.dir
    }

    pub fn items(&self) -> &[FileId] {
        &self.items
    }

    pub fn session(&self) -> &ClipboardSession {
        &self.session
    }

    /// Shows the notes of `dir`, or nothing for `None`.
    pub fn set_directory(&mut self, notebook: &mut Notebook, dir: Option<DirId>) -> Result<ListDiff<FileId>> {
        self.dir = dir;
        self.update_file_list(notebook)
    }

    /// Re-reads the directory and reports which notes appeared or vanished.
    pub fn update_file_list(&mut self, notebook: &mut Notebook) -> Result<ListDiff<FileId>> {
        let items = match self.dir {
            Some(dir) => {
                notebook.open(dir)?;
                notebook.dir(dir)?.files().to_vec()
            }
            None => Vec::new(),
        };
        let diff = ListDiff::between(&self.items, &items);
        self.items = items;
        Ok(diff)
    }

    fn refresh(&mut self, notebook: &mut Notebook) {
        if let Err(e) = self.update_file_list(notebook) {
            log::warn!("failed to refresh note list: {}", e);
            self.items.clear();
        }
    }

    fn current_dir(&self) -> Result<DirId> {
        self.dir
            .ok_or_else(|| NotebookError::NotFound("no folder selected".to_string()))
    }

    /// Suggested name for a new note: `Untitled.md`, sequenced if taken.
    pub fn default_new_file_name(&self, notebook: &Notebook) -> Result<String> {
        let dir = self.current_dir()?;
        let suffix = notebook.settings().get().default_markdown_suffix();
        let path = notebook.dir_path(dir)?;
        Ok(file_name_with_sequence(&path, &format!("{}.{}", NEW_NOTE_STEM, suffix)))
    }

    pub fn new_file(&mut self, notebook: &mut Notebook, name: &str, insert_title: Option<bool>) -> ApiResult {
        let created = self
            .current_dir()
            .and_then(|dir| notebook.create_note(dir, name, insert_title));
        match created {
            Ok(_) => {
                self.refresh(notebook);
                ApiResult::with_name(name)
            }
            Err(e) => ApiResult::error(e.to_string()),
        }
    }

    pub fn rename_file(&mut self, notebook: &mut Notebook, file: FileId, new_name: &str) -> ApiResult {
        match notebook.rename_file(file, new_name) {
            Ok(()) => {
                self.refresh(notebook);
                ApiResult::with_name(new_name)
            }
            Err(e) => ApiResult::error(e.to_string()),
        }
    }

    /// Deletes each note on its own; the result lists the ones that failed.
    pub fn delete_files(&mut self, notebook: &mut Notebook, files: &[FileId], skip_recycle_bin: bool) -> ApiResult {
        let mut count = 0;
        let mut errors = Vec::new();
        for &file in files {
            let name = notebook
                .file(file)
                .map(|n| n.name().to_string())
                .unwrap_or_else(|_| format!("{:?}", file));
            match notebook.delete_file(file, skip_recycle_bin) {
                Ok(()) => count += 1,
                Err(e) => errors.push(format!("{}: {}", name, e)),
            }
        }
        self.refresh(notebook);
        ApiResult::batch(count, errors)
    }

    pub fn import_files(&mut self, notebook: &mut Notebook, paths: &[PathBuf]) -> ApiResult {
        let dir = match self.current_dir() {
            Ok(dir) => dir,
            Err(e) => return ApiResult::error(e.to_string()),
        };
        let report = notebook.import_files(dir, paths);
        self.refresh(notebook);
        report.to_api_result()
    }

    /// Packs the selected notes into a transfer for [`Self::paste`].
    pub fn copy_selected(&self, notebook: &Notebook, files: &[FileId], is_cut: bool) -> Result<FileTransfer> {
        let files = files
            .iter()
            .map(|&f| notebook.file_path(f))
            .collect::<Result<Vec<_>>>()?;
        Ok(FileTransfer { is_cut, files })
    }

    /// Pastes a transfer into the current directory.
    ///
    /// A cut from this same directory is skipped. A copy into the same
    /// directory, or onto a taken name, gets a `_copy` name. Paths that are
    /// not notes of this notebook are reported as failures. The clipboard
    /// nonce changes afterwards.
    pub fn paste(&mut self, notebook: &mut Notebook, transfer: &FileTransfer) -> ApiResult {
        let result = self.paste_into_current(notebook, transfer);
        self.session.regenerate();
        self.refresh(notebook);
        result
    }

    fn paste_into_current(&mut self, notebook: &mut Notebook, transfer: &FileTransfer) -> ApiResult {
        let dir = match self.current_dir().and_then(|dir| notebook.open(dir).map(|_| dir)) {
            Ok(dir) => dir,
            Err(e) => return ApiResult::error(e.to_string()),
        };

        let mut count = 0;
        let mut errors = Vec::new();
        for path in &transfer.files {
            match self.paste_one(notebook, dir, path, transfer.is_cut) {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) => {
                    log::warn!("failed to paste {}: {}", path.display(), e);
                    errors.push(format!("{}: {}", path.display(), e));
                }
            }
        }
        ApiResult::batch(count, errors)
    }

    /// Returns false when the note was skipped.
    fn paste_one(&mut self, notebook: &mut Notebook, dir: DirId, path: &std::path::Path, is_cut: bool) -> Result<bool> {
        let src = notebook
            .file_from_path(path)?
            .ok_or_else(|| NotebookError::NotFound("not a note of this notebook".to_string()))?;
        let node = notebook.file(src)?;
        let name = node.name().to_string();
        let same_dir = node.parent() == Some(dir);

        if same_dir && is_cut {
            log::debug!("skip cut and paste of {} in the same folder", name);
            return Ok(false);
        }

        // A name is free only if neither the folder's notes nor its disk use it
        let dir_path = notebook.dir_path(dir)?;
        let is_free = |candidate: &str| -> Result<bool> {
            Ok(!notebook.child_name_taken(dir, candidate, None, None)? && !dir_path.join(candidate).exists())
        };
        let target = if !same_dir && is_free(&name)? {
            name
        } else {
            copied_file_name(&name, is_free)?
        };
        notebook.copy_file(dir, &target, src, is_cut)?;
        Ok(true)
    }

    /// Puts the selected notes on `clipboard`, tagged with this session's
    /// nonce.
    pub fn copy_to_clipboard(
        &self,
        notebook: &Notebook,
        clipboard: &mut dyn Clipboard,
        files: &[FileId],
        is_cut: bool,
    ) -> ApiResult {
        match self.copy_selected(notebook, files, is_cut) {
            Ok(transfer) if transfer.files.is_empty() => ApiResult::error("no notes selected"),
            Ok(transfer) => {
                clipboard.set_text(self.session.encode(&transfer));
                ApiResult::batch(transfer.files.len(), Vec::new())
            }
            Err(e) => ApiResult::error(e.to_string()),
        }
    }

    /// True if a directory is shown and the clipboard holds a valid payload
    /// from this session.
    pub fn paste_available(&self, clipboard: &dyn Clipboard) -> bool {
        self.dir.is_some()
            && clipboard
                .text()
                .is_some_and(|text| self.session.decode(&text).is_ok())
    }

    /// Pastes the clipboard payload, then clears the clipboard.
    pub fn paste_from_clipboard(&mut self, notebook: &mut Notebook, clipboard: &mut dyn Clipboard) -> ApiResult {
        let Some(text) = clipboard.text() else {
            return ApiResult::error("clipboard is empty");
        };
        let transfer = match self.session.decode(&text) {
            Ok(transfer) => transfer,
            Err(e) => return ApiResult::error(e.to_string()),
        };

        let result = self.paste(notebook, &transfer);
        clipboard.clear();
        result
    }

    /// Manual sort: `permutation[i]` is the current index of the note that
    /// should end up at position `i`.
    pub fn sort_items(&mut self, notebook: &mut Notebook, permutation: &[usize]) -> ApiResult {
        let result = self.current_dir().and_then(|dir| notebook.sort_files(dir, permutation));
        self.refresh(notebook);
        match result {
            Ok(()) => ApiResult::success(),
            Err(e) => ApiResult::error(e.to_string()),
        }
    }

    /// Drag-and-drop move of the run `[first, last]` to `dest_start`.
    pub fn reorder(&mut self, notebook: &mut Notebook, first: usize, last: usize, dest_start: usize) -> ApiResult {
        let result = self
            .current_dir()
            .and_then(|dir| notebook.reorder_files(dir, first, last, dest_start));
        self.refresh(notebook);
        match result {
            Ok(()) => ApiResult::success(),
            Err(e) => ApiResult::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::notebook::testing::*;
    use std::fs;
    use tempfile::tempdir;

    fn names(notebook: &Notebook, presenter: &FileListPresenter) -> Vec<String> {
        presenter
            .items()
            .iter()
            .map(|&f| notebook.file(f).unwrap().name().to_string())
            .collect()
    }

    fn presenter_on(notebook: &mut Notebook, dir: DirId) -> FileListPresenter {
        let mut presenter = FileListPresenter::new();
        presenter.set_directory(notebook, Some(dir)).unwrap();
        presenter
    }

    #[test]
    fn test_update_file_list_reports_diff() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let root = notebook.root();
        let a = notebook.create_file(root, "a.md").unwrap();
        let mut presenter = presenter_on(&mut notebook, root);

        let b = notebook.create_file(root, "b.md").unwrap();
        notebook.delete_file(a, true).unwrap();
        let diff = presenter.update_file_list(&mut notebook).unwrap();

        assert_eq!(diff.added, vec![b]);
        assert_eq!(diff.removed, vec![a]);
        assert_eq!(names(&notebook, &presenter), vec!["b.md"]);
    }

    #[test]
    fn test_new_file_and_default_name() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let root = notebook.root();
        let mut presenter = presenter_on(&mut notebook, root);

        let name = presenter.default_new_file_name(&notebook).unwrap();
        assert_eq!(name, "Untitled.md");
        assert!(presenter.new_file(&mut notebook, &name, None).success);
        assert_eq!(presenter.default_new_file_name(&notebook).unwrap(), "Untitled_1.md");

        let failed = presenter.new_file(&mut notebook, "untitled.md", None);
        assert!(!failed.success);
        assert_eq!(names(&notebook, &presenter), vec!["Untitled.md"]);
    }

    #[test]
    fn test_new_file_without_directory() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let mut presenter = FileListPresenter::new();

        assert!(!presenter.new_file(&mut notebook, "a.md", None).success);
        assert!(presenter.default_new_file_name(&notebook).is_err());
    }

    #[test]
    fn test_delete_files_batch() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let root = notebook.root();
        let a = notebook.create_file(root, "a.md").unwrap();
        let b = notebook.create_file(root, "b.md").unwrap();
        notebook.create_file(root, "c.md").unwrap();
        let mut presenter = presenter_on(&mut notebook, root);

        // b is deleted twice; the second attempt hits a stale handle
        let result = presenter.delete_files(&mut notebook, &[a, b, b], false);
        assert!(!result.success);
        assert_eq!(result.count, Some(2));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(names(&notebook, &presenter), vec!["c.md"]);
    }

    #[test]
    fn test_paste_copy_into_same_folder_gets_copy_name() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let root = notebook.root();
        let a = notebook.create_note(root, "a.md", Some(true)).unwrap();
        let mut presenter = presenter_on(&mut notebook, root);

        let transfer = presenter.copy_selected(&notebook, &[a], false).unwrap();
        let result = presenter.paste(&mut notebook, &transfer);
        assert!(result.success);
        assert_eq!(result.count, Some(1));
        assert_eq!(names(&notebook, &presenter), vec!["a.md", "a_copy.md"]);
    }

    #[test]
    fn test_paste_copy_over_case_variant_gets_copy_name() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let root = notebook.root();
        notebook.create_file(root, "A.md").unwrap();
        let other = notebook.create_sub_directory(root, "Other").unwrap();
        let a = notebook.create_file(other, "a.md").unwrap();

        let source = presenter_on(&mut notebook, other);
        let transfer = source.copy_selected(&notebook, &[a], false).unwrap();

        let mut target = presenter_on(&mut notebook, root);
        let result = target.paste(&mut notebook, &transfer);
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.count, Some(1));
        assert_eq!(names(&notebook, &target), vec!["A.md", "a_copy.md"]);
    }

    #[test]
    fn test_paste_skips_unregistered_file_on_disk() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let root = notebook.root();
        let dest = notebook.create_sub_directory(root, "Dest").unwrap();
        let a = notebook.create_file(root, "a.md").unwrap();
        let dest_path = notebook.dir_path(dest).unwrap();
        fs::write(dest_path.join("a.md"), "PRECIOUS").unwrap();

        let source = presenter_on(&mut notebook, root);
        let transfer = source.copy_selected(&notebook, &[a], false).unwrap();

        let mut target = presenter_on(&mut notebook, dest);
        assert!(target.paste(&mut notebook, &transfer).success);
        assert_eq!(names(&notebook, &target), vec!["a_copy.md"]);
        assert_eq!(fs::read_to_string(dest_path.join("a.md")).unwrap(), "PRECIOUS");
    }

    #[test]
    fn test_paste_cut_into_same_folder_is_skipped() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let root = notebook.root();
        let a = notebook.create_file(root, "a.md").unwrap();
        let mut presenter = presenter_on(&mut notebook, root);

        let transfer = presenter.copy_selected(&notebook, &[a], true).unwrap();
        let result = presenter.paste(&mut notebook, &transfer);
        assert!(result.success);
        assert_eq!(result.count, Some(0));
        assert_eq!(names(&notebook, &presenter), vec!["a.md"]);
    }

    #[test]
    fn test_paste_cut_moves_between_folders() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let root = notebook.root();
        let dest = notebook.create_sub_directory(root, "Dest").unwrap();
        let a = notebook.create_file(root, "a.md").unwrap();

        let source = presenter_on(&mut notebook, root);
        let transfer = source.copy_selected(&notebook, &[a], true).unwrap();

        let mut target = presenter_on(&mut notebook, dest);
        let result = target.paste(&mut notebook, &transfer);
        assert!(result.success);
        assert_eq!(names(&notebook, &target), vec!["a.md"]);
        assert!(notebook.dir(root).unwrap().files().is_empty());
    }

    #[test]
    fn test_paste_reports_foreign_paths() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let root = notebook.root();
        let mut presenter = presenter_on(&mut notebook, root);
        let stray = temp_dir.path().join("stray.md");
        fs::write(&stray, "").unwrap();

        let transfer = FileTransfer {
            is_cut: false,
            files: vec![stray],
        };
        let result = presenter.paste(&mut notebook, &transfer);
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_clipboard_round_trip_and_nonce() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let root = notebook.root();
        let dest = notebook.create_sub_directory(root, "Dest").unwrap();
        let a = notebook.create_file(root, "a.md").unwrap();
        let mut clipboard = MemoryClipboard::new();

        let mut presenter = presenter_on(&mut notebook, root);
        assert!(!presenter.paste_available(&clipboard));
        assert!(presenter.copy_to_clipboard(&notebook, &mut clipboard, &[a], false).success);
        assert!(presenter.paste_available(&clipboard));

        // Payload from another session is refused
        let other = presenter_on(&mut notebook, dest);
        assert!(!other.paste_available(&clipboard));

        presenter.set_directory(&mut notebook, Some(dest)).unwrap();
        let magic = presenter.session().magic();
        let result = presenter.paste_from_clipboard(&mut notebook, &mut clipboard);
        assert!(result.success);
        assert_ne!(presenter.session().magic(), magic);
        assert!(clipboard.text().is_none());
        assert_eq!(names(&notebook, &presenter), vec!["a.md"]);
    }

    #[test]
    fn test_stale_clipboard_is_not_pasted() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let root = notebook.root();
        let a = notebook.create_file(root, "a.md").unwrap();
        let mut clipboard = MemoryClipboard::new();
        let mut presenter = presenter_on(&mut notebook, root);

        presenter.copy_to_clipboard(&notebook, &mut clipboard, &[a], false);
        let transfer = presenter.copy_selected(&notebook, &[a], false).unwrap();
        presenter.paste(&mut notebook, &transfer);

        assert!(!presenter.paste_available(&clipboard));
        assert!(!presenter.paste_from_clipboard(&mut notebook, &mut clipboard).success);
    }

    #[test]
    fn test_sort_and_reorder() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let root = notebook.root();
        for name in ["a.md", "b.md", "c.md"] {
            notebook.create_file(root, name).unwrap();
        }
        let mut presenter = presenter_on(&mut notebook, root);

        assert!(presenter.sort_items(&mut notebook, &[2, 1, 0]).success);
        assert_eq!(names(&notebook, &presenter), vec!["c.md", "b.md", "a.md"]);

        assert!(presenter.reorder(&mut notebook, 0, 0, 3).success);
        assert_eq!(names(&notebook, &presenter), vec!["b.md", "a.md", "c.md"]);

        assert!(!presenter.reorder(&mut notebook, 0, 1, 1).success);
        assert!(!presenter.sort_items(&mut notebook, &[0]).success);
    }

    #[test]
    fn test_import_files() {
        let temp_dir = tempdir().unwrap();
        let (mut notebook, _) = notebook_in(temp_dir.path());
        let root = notebook.root();
        let mut presenter = presenter_on(&mut notebook, root);
        let outside = temp_dir.path().join("x.md");
        fs::write(&outside, "x").unwrap();

        let result = presenter.import_files(&mut notebook, &[outside]);
        assert!(result.success);
        assert_eq!(result.count, Some(1));
        assert_eq!(names(&notebook, &presenter), vec!["x.md"]);
    }
}

use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::Utc;

use crate::attachment;
use crate::error::{NotebookError, Result};
use crate::filesystem::{self, equal_path, is_legal_file_name};
use crate::models::{iso8601, DirectoryConfig};
use crate::notebook::{apply_permutation, DirId, DirNode, FileId, FileNode, Notebook};
use crate::store::is_config_file_name;

pub(crate) fn name_matches(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.to_lowercase() == b.to_lowercase()
    }
}

/// Lookups triggered by paths follow the platform's file name rules.
pub(crate) fn platform_case_sensitive() -> bool {
    !cfg!(windows)
}

fn remove_quietly(path: &Path) {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    if let Err(e) = result {
        log::warn!("failed to clean up {}: {}", path.display(), e);
    }
}

impl Notebook {
    /// Loads the children of `dir` from its config. Idempotent.
    ///
    /// Child directories are registered closed; notes are rebuilt with their
    /// full metadata. On a missing or corrupt config the node stays closed.
    pub fn open(&mut self, dir: DirId) -> Result<()> {
        if self.dir(dir)?.opened {
            return Ok(());
        }

        let path = self.dir_path(dir)?;
        let config = self.store.read(&path)?;

        let mut sub_dirs = Vec::with_capacity(config.sub_directories.len());
        for record in config.sub_directories {
            sub_dirs.push(self.alloc_dir(DirNode::closed(record.name, iso8601::epoch(), Some(dir))));
        }
        let mut files = Vec::with_capacity(config.files.len());
        for record in config.files {
            let doc_type = self.settings.doc_type_for(&record.name);
            files.push(self.alloc_file(FileNode::from_record(record, doc_type, dir)));
        }

        let node = self.dir_mut(dir)?;
        node.created_time = config.created_time;
        node.sub_dirs = sub_dirs;
        node.files = files;
        node.opened = true;

        log::debug!(
            "opened directory {} ({} folders, {} notes)",
            path.display(),
            node.sub_dirs.len(),
            node.files.len()
        );
        Ok(())
    }

    /// Frees everything loaded below `dir` and marks it closed.
    pub fn close(&mut self, dir: DirId) -> Result<()> {
        let node = self.dir_mut(dir)?;
        if !node.opened {
            return Ok(());
        }

        let files = std::mem::take(&mut node.files);
        let sub_dirs = std::mem::take(&mut node.sub_dirs);
        node.opened = false;
        node.expanded = false;

        for file in files {
            self.free_file(file);
        }
        for sub in sub_dirs {
            self.free_dir_tree(sub);
        }
        Ok(())
    }

    pub fn is_opened(&self, dir: DirId) -> Result<bool> {
        Ok(self.dir(dir)?.opened)
    }

    /// Expanding a directory loads it first.
    pub fn set_expanded(&mut self, dir: DirId, expanded: bool) -> Result<()> {
        if expanded {
            self.open(dir)?;
        }
        self.dir_mut(dir)?.expanded = expanded;
        Ok(())
    }

    /// True if `name` collides, ignoring case, with a child of `dir` other
    /// than `skip_dir` / `skip_file`. Notes and folders share one namespace.
    pub(crate) fn child_name_taken(
        &self,
        dir: DirId,
        name: &str,
        skip_dir: Option<DirId>,
        skip_file: Option<FileId>,
    ) -> Result<bool> {
        let node = self.dir(dir)?;
        for &sub in &node.sub_dirs {
            if Some(sub) != skip_dir && name_matches(&self.dir(sub)?.name, name, false) {
                return Ok(true);
            }
        }
        for &file in &node.files {
            if Some(file) != skip_file && name_matches(&self.file(file)?.name, name, false) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Creates folder `name` under `dir` with an empty config.
    ///
    /// Nothing is left behind on failure: the folder is removed and the
    /// parent's sequence and config are untouched.
    pub fn create_sub_directory(&mut self, dir: DirId, name: &str) -> Result<DirId> {
        if !is_legal_file_name(name) {
            return Err(NotebookError::IllegalName(name.to_string()));
        }
        self.open(dir)?;

        let path = self.dir_path(dir)?.join(name);
        if is_config_file_name(name) || self.child_name_taken(dir, name, None, None)? || path.exists() {
            return Err(NotebookError::NameConflict(name.to_string()));
        }

        fs::create_dir(&path).map_err(|e| NotebookError::io("create directory", &path, e))?;

        let now = Utc::now();
        if let Err(e) = self.store.write(&path, &DirectoryConfig::new(now)) {
            remove_quietly(&path);
            return Err(e);
        }

        let id = self.alloc_dir(DirNode::closed(name, now, Some(dir)));
        self.dir_mut(dir)?.sub_dirs.push(id);
        if let Err(e) = self.write_config(dir) {
            self.dir_mut(dir)?.sub_dirs.pop();
            self.free_dir_tree(id);
            remove_quietly(&path);
            return Err(e);
        }

        log::info!("created directory {}", path.display());
        Ok(id)
    }

    pub fn find_sub_directory(&mut self, dir: DirId, name: &str, case_sensitive: bool) -> Result<Option<DirId>> {
        self.open(dir)?;
        for &sub in &self.dir(dir)?.sub_dirs {
            if name_matches(&self.dir(sub)?.name, name, case_sensitive) {
                return Ok(Some(sub));
            }
        }
        Ok(None)
    }

    pub fn find_file(&mut self, dir: DirId, name: &str, case_sensitive: bool) -> Result<Option<FileId>> {
        self.open(dir)?;
        for &file in &self.dir(dir)?.files {
            if name_matches(&self.file(file)?.name, name, case_sensitive) {
                return Ok(Some(file));
            }
        }
        Ok(None)
    }

    /// Creates an empty note `name` in `dir`.
    pub fn create_file(&mut self, dir: DirId, name: &str) -> Result<FileId> {
        self.create_file_with_content(dir, name, "")
    }

    /// Creates note `name` holding `content`, registers it and persists.
    /// On a failed config write the physical file is deleted again.
    pub(crate) fn create_file_with_content(&mut self, dir: DirId, name: &str, content: &str) -> Result<FileId> {
        if !is_legal_file_name(name) {
            return Err(NotebookError::IllegalName(name.to_string()));
        }
        self.open(dir)?;

        let path = self.dir_path(dir)?.join(name);
        if is_config_file_name(name) || self.child_name_taken(dir, name, None, None)? || path.exists() {
            return Err(NotebookError::NameConflict(name.to_string()));
        }

        let mut handle = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| NotebookError::io("create note", &path, e))?;
        if let Err(e) = handle.write_all(content.as_bytes()) {
            drop(handle);
            remove_quietly(&path);
            return Err(NotebookError::io("write note", &path, e));
        }
        drop(handle);

        let mut node = FileNode::new(name, self.settings.doc_type_for(name), Utc::now());
        node.parent = Some(dir);
        let id = self.alloc_file(node);
        self.dir_mut(dir)?.files.push(id);

        if let Err(e) = self.write_config(dir) {
            self.dir_mut(dir)?.files.pop();
            self.free_file(id);
            remove_quietly(&path);
            return Err(e);
        }

        log::info!("created note {}", path.display());
        Ok(id)
    }

    /// Inserts a detached note at `index` (appends when `None` or past the
    /// end) and re-parents it to `dir`.
    pub fn add_file(&mut self, dir: DirId, file: FileId, index: Option<usize>) -> Result<()> {
        self.open(dir)?;

        let node = self.file(file)?;
        if node.parent.is_some() {
            return Err(NotebookError::AlreadyAttached(node.name.clone()));
        }
        let name = node.name.clone();
        if self.child_name_taken(dir, &name, None, Some(file))? {
            return Err(NotebookError::NameConflict(name));
        }

        let len = self.dir(dir)?.files.len();
        let at = index.map_or(len, |i| i.min(len));
        self.dir_mut(dir)?.files.insert(at, file);
        self.file_mut(file)?.parent = Some(dir);

        if let Err(e) = self.write_config(dir) {
            self.dir_mut(dir)?.files.remove(at);
            self.file_mut(file)?.parent = None;
            return Err(e);
        }
        Ok(())
    }

    /// Registers a note file that already exists inside `dir` on disk.
    pub fn add_file_by_name(&mut self, dir: DirId, name: &str, index: Option<usize>) -> Result<FileId> {
        if !is_legal_file_name(name) {
            return Err(NotebookError::IllegalName(name.to_string()));
        }
        self.open(dir)?;

        let path = self.dir_path(dir)?.join(name);
        if !path.is_file() {
            return Err(NotebookError::NotFound(path.display().to_string()));
        }

        let id = self.alloc_file(FileNode::new(name, self.settings.doc_type_for(name), Utc::now()));
        if let Err(e) = self.add_file(dir, id, index) {
            self.free_file(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Inserts a detached directory node at `index` and re-parents it.
    pub fn add_sub_directory(&mut self, dir: DirId, sub: DirId, index: Option<usize>) -> Result<()> {
        self.open(dir)?;

        let node = self.dir(sub)?;
        if node.parent.is_some() || sub == self.root {
            return Err(NotebookError::AlreadyAttached(node.name.clone()));
        }
        let name = node.name.clone();
        if self.child_name_taken(dir, &name, Some(sub), None)? {
            return Err(NotebookError::NameConflict(name));
        }

        let len = self.dir(dir)?.sub_dirs.len();
        let at = index.map_or(len, |i| i.min(len));
        self.dir_mut(dir)?.sub_dirs.insert(at, sub);
        self.dir_mut(sub)?.parent = Some(dir);

        if let Err(e) = self.write_config(dir) {
            self.dir_mut(dir)?.sub_dirs.remove(at);
            self.dir_mut(sub)?.parent = None;
            return Err(e);
        }
        Ok(())
    }

    /// Registers a folder that already exists inside `dir` on disk, giving
    /// it an empty config if it has none.
    pub fn add_sub_directory_by_name(&mut self, dir: DirId, name: &str, index: Option<usize>) -> Result<DirId> {
        if !is_legal_file_name(name) {
            return Err(NotebookError::IllegalName(name.to_string()));
        }
        self.open(dir)?;

        let path = self.dir_path(dir)?.join(name);
        if !path.is_dir() {
            return Err(NotebookError::NotFound(path.display().to_string()));
        }

        let created_config = !self.store.exists(&path);
        let created_time = if created_config {
            let now = Utc::now();
            self.store.write(&path, &DirectoryConfig::new(now))?;
            now
        } else {
            iso8601::epoch()
        };

        let id = self.alloc_dir(DirNode::closed(name, created_time, None));
        if let Err(e) = self.add_sub_directory(dir, id, index) {
            self.free_dir_tree(id);
            if created_config {
                if let Err(cleanup) = self.store.delete(&path) {
                    log::warn!("failed to remove config of {}: {}", path.display(), cleanup);
                }
            }
            return Err(e);
        }
        Ok(id)
    }

    fn sub_directory_index(&self, dir: DirId, sub: DirId) -> Result<usize> {
        let node = self.dir(dir)?;
        if !node.opened {
            return Err(NotebookError::NotOpened(node.name.clone()));
        }
        match node.sub_dirs.iter().position(|&d| d == sub) {
            Some(idx) => Ok(idx),
            None => Err(NotebookError::NotMember(self.dir(sub)?.name.clone(), node.name.clone())),
        }
    }

    pub(crate) fn file_index(&self, dir: DirId, file: FileId) -> Result<usize> {
        let node = self.dir(dir)?;
        if !node.opened {
            return Err(NotebookError::NotOpened(node.name.clone()));
        }
        match node.files.iter().position(|&f| f == file) {
            Some(idx) => Ok(idx),
            None => Err(NotebookError::NotMember(self.file(file)?.name.clone(), node.name.clone())),
        }
    }

    /// Detaches `sub` from `dir` and persists. The node stays in the arena,
    /// detached, so it can be re-added elsewhere.
    pub fn remove_sub_directory(&mut self, dir: DirId, sub: DirId) -> Result<()> {
        let idx = self.sub_directory_index(dir, sub)?;
        self.dir_mut(dir)?.sub_dirs.remove(idx);

        if let Err(e) = self.write_config(dir) {
            self.dir_mut(dir)?.sub_dirs.insert(idx, sub);
            return Err(e);
        }
        self.dir_mut(sub)?.parent = None;
        log::debug!("folder {} removed from {}", self.dir(sub)?.name, self.dir(dir)?.name);
        Ok(())
    }

    /// Detaches `file` from `dir` and persists. The node stays in the arena,
    /// detached, so it can be re-added elsewhere.
    pub fn remove_file(&mut self, dir: DirId, file: FileId) -> Result<()> {
        let idx = self.file_index(dir, file)?;
        self.dir_mut(dir)?.files.remove(idx);

        if let Err(e) = self.write_config(dir) {
            self.dir_mut(dir)?.files.insert(idx, file);
            return Err(e);
        }
        self.file_mut(file)?.parent = None;
        log::debug!("note {} removed from {}", self.file(file)?.name, self.dir(dir)?.name);
        Ok(())
    }

    /// Closes `sub`, deregisters it from `dir` and deletes its folder, to
    /// the recycle bin unless `skip_recycle_bin` is set. Attachment folders
    /// of notes inside the tree go the same way.
    pub fn delete_sub_directory(&mut self, dir: DirId, sub: DirId, skip_recycle_bin: bool) -> Result<()> {
        self.sub_directory_index(dir, sub)?;
        let path = self.dir_path(sub)?;
        let attachment_folders = attachment::collect_attachment_folders(self.store.as_ref(), &path);

        self.close(sub)?;
        self.remove_sub_directory(dir, sub)?;
        self.free_dir_tree(sub);

        let bin = self.layout.recycle_bin();
        bin.delete_directory(&path, skip_recycle_bin)
            .map_err(|e| NotebookError::io("delete directory", &path, e))?;

        for folder in attachment_folders {
            let folder_path = self.layout.attachments_dir.join(&folder);
            if folder_path.exists() {
                if let Err(e) = bin.delete_directory(&folder_path, skip_recycle_bin) {
                    log::warn!("failed to delete attachment folder {}: {}", folder_path.display(), e);
                }
            }
        }

        log::info!(
            "deleted {} {}",
            path.display(),
            if skip_recycle_bin { "from disk" } else { "to recycle bin" }
        );
        Ok(())
    }

    /// Renames the folder of `dir` and persists the parent's config,
    /// renaming the folder back if that fails. Same name is a no-op.
    pub fn rename_directory(&mut self, dir: DirId, new_name: &str) -> Result<()> {
        let node = self.dir(dir)?;
        if node.name == new_name {
            return Ok(());
        }
        let parent = match node.parent {
            Some(parent) => parent,
            None if dir == self.root => return Err(NotebookError::RootDirectory),
            None => return Err(NotebookError::StaleNode),
        };
        if !is_legal_file_name(new_name) {
            return Err(NotebookError::IllegalName(new_name.to_string()));
        }
        if self.child_name_taken(parent, new_name, Some(dir), None)? {
            return Err(NotebookError::NameConflict(new_name.to_string()));
        }

        let old_path = self.dir_path(dir)?;
        let new_path = self.dir_path(parent)?.join(new_name);
        if new_path.exists() && !equal_path(&old_path, &new_path) && !name_matches(&node.name, new_name, false) {
            return Err(NotebookError::NameConflict(new_name.to_string()));
        }

        fs::rename(&old_path, &new_path).map_err(|e| NotebookError::io("rename directory", &old_path, e))?;
        let old_name = std::mem::replace(&mut self.dir_mut(dir)?.name, new_name.to_string());

        if let Err(e) = self.write_config(parent) {
            self.dir_mut(dir)?.name = old_name;
            if let Err(undo) = fs::rename(&new_path, &old_path) {
                log::warn!("failed to rename {} back: {}", new_path.display(), undo);
            }
            return Err(e);
        }

        log::info!("renamed directory {} to {}", old_path.display(), new_name);
        Ok(())
    }

    /// Moves the run `[first, last]` of notes so it starts at `dest_start`,
    /// an index into the sequence before the move that must lie outside
    /// the run.
    pub fn reorder_files(&mut self, dir: DirId, first: usize, last: usize, dest_start: usize) -> Result<()> {
        self.open(dir)?;

        let original = self.dir(dir)?.files.clone();
        let len = original.len();
        if first > last || last >= len || dest_start > len || (first..=last).contains(&dest_start) {
            return Err(NotebookError::InvalidReorder {
                first,
                last,
                dest: dest_start,
            });
        }

        let mut files = original.clone();
        let run: Vec<FileId> = files.drain(first..=last).collect();
        let at = if dest_start > last {
            dest_start - run.len()
        } else {
            dest_start
        };
        files.splice(at..at, run);
        self.dir_mut(dir)?.files = files;

        if let Err(e) = self.write_config(dir) {
            log::warn!("failed to reorder notes [{}, {}] to {}: {}", first, last, dest_start, e);
            self.dir_mut(dir)?.files = original;
            return Err(e);
        }
        Ok(())
    }

    /// Applies `permutation` (new position -> old index) to the notes of
    /// `dir` and persists, restoring the old order on failure.
    pub fn sort_files(&mut self, dir: DirId, permutation: &[usize]) -> Result<()> {
        self.open(dir)?;

        let original = self.dir(dir)?.files.clone();
        let sorted = apply_permutation(&original, permutation)?;
        self.dir_mut(dir)?.files = sorted;

        if let Err(e) = self.write_config(dir) {
            self.dir_mut(dir)?.files = original;
            return Err(e);
        }
        Ok(())
    }

    /// Copies (or moves, if `is_cut`) the folder of `src` into `dest_dir`
    /// as `dest_name`.
    ///
    /// A cut re-parents the existing node; a copy registers a fresh one
    /// whose notes get their own attachment folders. Returns `src` when
    /// source and destination are the same path.
    pub fn copy_directory(&mut self, dest_dir: DirId, dest_name: &str, src: DirId, is_cut: bool) -> Result<DirId> {
        let src_path = filesystem::clean_path(&self.dir_path(src)?);
        let dest_path = filesystem::clean_path(&self.dir_path(dest_dir)?.join(dest_name));
        if equal_path(&src_path, &dest_path) {
            return Ok(src);
        }
        if !is_legal_file_name(dest_name) {
            return Err(NotebookError::IllegalName(dest_name.to_string()));
        }
        self.open(dest_dir)?;
        if self.child_name_taken(dest_dir, dest_name, None, None)? {
            return Err(NotebookError::NameConflict(dest_name.to_string()));
        }

        let src_parent = self.dir(src)?.parent.ok_or(NotebookError::RootDirectory)?;

        filesystem::copy_directory(&src_path, &dest_path, is_cut)
            .map_err(|e| NotebookError::io(if is_cut { "move directory" } else { "copy directory" }, &src_path, e))?;

        if !is_cut {
            if let Err(e) = attachment::duplicate_attachment_folders(self.store.as_ref(), &self.layout, &dest_path) {
                remove_quietly(&dest_path);
                return Err(e);
            }
            return match self.add_sub_directory_by_name(dest_dir, dest_name, None) {
                Ok(id) => Ok(id),
                Err(e) => {
                    remove_quietly(&dest_path);
                    Err(e)
                }
            };
        }

        let undo_move = |e: NotebookError| {
            if let Err(undo) = filesystem::copy_directory(&dest_path, &src_path, true) {
                log::warn!("failed to move {} back: {}", dest_path.display(), undo);
            }
            e
        };

        self.remove_sub_directory(src_parent, src).map_err(undo_move)?;
        let old_name = std::mem::replace(&mut self.dir_mut(src)?.name, dest_name.to_string());
        if let Err(e) = self.add_sub_directory(dest_dir, src, None) {
            self.dir_mut(src)?.name = old_name;
            let e = undo_move(e);
            if let Err(readd) = self.add_sub_directory(src_parent, src, None) {
                log::warn!("failed to re-register {}: {}", src_path.display(), readd);
            }
            return Err(e);
        }

        log::info!("moved directory {} to {}", src_path.display(), dest_path.display());
        Ok(src)
    }

    /// Resolves `segments` (folder names then a note name) below `dir`,
    /// opening folders on the way.
    ///
    /// Folders opened only for a lookup that fails are closed again.
    pub fn try_load_file(&mut self, dir: DirId, segments: &[&str]) -> Result<Option<FileId>> {
        let Some((head, rest)) = segments.split_first() else {
            return Ok(None);
        };

        let was_opened = self.dir(dir)?.opened;
        self.open(dir)?;

        let case_sensitive = platform_case_sensitive();
        let found = if rest.is_empty() {
            self.find_file(dir, head, case_sensitive)
        } else {
            match self.find_sub_directory(dir, head, case_sensitive) {
                Ok(Some(sub)) => self.try_load_file(sub, rest),
                other => other.map(|_| None),
            }
        };

        if !matches!(found, Ok(Some(_))) && !was_opened {
            self.close(dir)?;
        }
        found
    }

    /// True if `file` lives somewhere below `dir`.
    pub fn contains_file(&self, dir: DirId, file: FileId) -> Result<bool> {
        let mut current = self.file(file)?.parent;
        while let Some(id) = current {
            if id == dir {
                return Ok(true);
            }
            current = self.dir(id)?.parent;
        }
        Ok(false)
    }

    /// Persists the directory holding `file` after a note-level change.
    pub fn update_file_config(&self, file: FileId) -> Result<()> {
        let parent = self.file(file)?.parent.ok_or(NotebookError::StaleNode)?;
        self.write_config(parent)
    }
}

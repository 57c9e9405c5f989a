use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::attachment::new_attachment_folder_name;
use crate::directory::name_matches;
use crate::error::{NotebookError, Result};
use crate::filesystem::{self, equal_path, file_name_with_sequence, is_legal_file_name, split_suffix};
use crate::models::{BatchReport, DocType};
use crate::notebook::{DirId, FileId, FileNode, Notebook};
use crate::store::is_config_file_name;

impl Notebook {
    /// Creates a note, writing `# <stem>` into Markdown notes when title
    /// insertion is on. `insert_title` overrides the setting.
    pub fn create_note(&mut self, dir: DirId, name: &str, insert_title: Option<bool>) -> Result<FileId> {
        let insert = insert_title.unwrap_or_else(|| self.settings.insert_title_from_note_name());
        let content = if insert && self.settings.doc_type_for(name) == DocType::Markdown {
            format!("# {}\n", split_suffix(name).0)
        } else {
            String::new()
        };
        self.create_file_with_content(dir, name, &content)
    }

    pub fn read_note(&self, file: FileId) -> Result<String> {
        let path = self.file_path(file)?;
        fs::read_to_string(&path).map_err(|e| NotebookError::io("read note", path, e))
    }

    /// Writes the note's content and records the modification time.
    pub fn save_note(&mut self, file: FileId, content: &str) -> Result<()> {
        let path = self.file_path(file)?;
        fs::write(&path, content).map_err(|e| NotebookError::io("write note", &path, e))?;

        let previous = std::mem::replace(&mut self.file_mut(file)?.modified_time, Utc::now());
        if let Err(e) = self.update_file_config(file) {
            self.file_mut(file)?.modified_time = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Renames the note on disk and in its directory's config.
    ///
    /// Fails on an illegal name or a sibling matching ignoring case; a
    /// change of case only is allowed.
    pub fn rename_file(&mut self, file: FileId, new_name: &str) -> Result<()> {
        let node = self.file(file)?;
        if node.name == new_name {
            return Ok(());
        }
        let parent = node.parent.ok_or(NotebookError::StaleNode)?;
        if !is_legal_file_name(new_name) {
            return Err(NotebookError::IllegalName(new_name.to_string()));
        }
        if is_config_file_name(new_name) || self.child_name_taken(parent, new_name, None, Some(file))? {
            return Err(NotebookError::NameConflict(new_name.to_string()));
        }

        let old_path = self.file_path(file)?;
        let new_path = self.dir_path(parent)?.join(new_name);
        if new_path.exists() && !name_matches(&self.file(file)?.name, new_name, false) {
            return Err(NotebookError::NameConflict(new_name.to_string()));
        }
        fs::rename(&old_path, &new_path).map_err(|e| NotebookError::io("rename note", &old_path, e))?;

        let doc_type = self.settings.doc_type_for(new_name);
        let node = self.file_mut(file)?;
        let old_name = std::mem::replace(&mut node.name, new_name.to_string());
        let old_type = std::mem::replace(&mut node.doc_type, doc_type);

        if let Err(e) = self.write_config(parent) {
            let node = self.file_mut(file)?;
            node.name = old_name;
            node.doc_type = old_type;
            if let Err(undo) = fs::rename(&new_path, &old_path) {
                log::warn!("failed to rename {} back: {}", new_path.display(), undo);
            }
            return Err(e);
        }

        log::info!("renamed note {} to {}", old_path.display(), new_name);
        Ok(())
    }

    /// Copies (or moves, if `is_cut`) note `src` into `dest_dir` as
    /// `dest_name`, attachments included.
    ///
    /// A cut moves the existing node; a copy registers a new one with its own
    /// attachment folder. Returns `src` when the paths are the same.
    pub fn copy_file(&mut self, dest_dir: DirId, dest_name: &str, src: FileId, is_cut: bool) -> Result<FileId> {
        let src_path = self.file_path(src)?;
        let dest_path = self.dir_path(dest_dir)?.join(dest_name);
        if equal_path(&src_path, &dest_path) {
            return Ok(src);
        }
        if !is_legal_file_name(dest_name) {
            return Err(NotebookError::IllegalName(dest_name.to_string()));
        }
        self.open(dest_dir)?;
        if is_config_file_name(dest_name)
            || self.child_name_taken(dest_dir, dest_name, None, None)?
            || dest_path.exists()
        {
            return Err(NotebookError::NameConflict(dest_name.to_string()));
        }

        filesystem::copy_file(&src_path, &dest_path, is_cut)
            .map_err(|e| NotebookError::io(if is_cut { "move note" } else { "copy note" }, &src_path, e))?;

        let result = if is_cut {
            self.move_file_node(dest_dir, dest_name, src)
        } else {
            self.register_copy(dest_dir, dest_name, src)
        };

        match result {
            Ok(id) => {
                log::info!(
                    "{} {} to {}",
                    if is_cut { "moved" } else { "copied" },
                    src_path.display(),
                    dest_path.display()
                );
                Ok(id)
            }
            Err(e) => {
                let undo = if is_cut {
                    filesystem::copy_file(&dest_path, &src_path, true)
                } else {
                    fs::remove_file(&dest_path)
                };
                if let Err(undo) = undo {
                    log::warn!("failed to undo copy of {}: {}", src_path.display(), undo);
                }
                Err(e)
            }
        }
    }

    fn move_file_node(&mut self, dest_dir: DirId, dest_name: &str, src: FileId) -> Result<FileId> {
        let src_parent = self.file(src)?.parent.ok_or(NotebookError::StaleNode)?;
        let idx = self.file_index(src_parent, src)?;
        self.remove_file(src_parent, src)?;

        let doc_type = self.settings.doc_type_for(dest_name);
        let node = self.file_mut(src)?;
        let old_name = std::mem::replace(&mut node.name, dest_name.to_string());
        let old_type = std::mem::replace(&mut node.doc_type, doc_type);

        if let Err(e) = self.add_file(dest_dir, src, None) {
            let node = self.file_mut(src)?;
            node.name = old_name;
            node.doc_type = old_type;
            if let Err(readd) = self.add_file(src_parent, src, Some(idx)) {
                log::warn!("failed to re-register note {}: {}", self.file(src)?.name, readd);
            }
            return Err(e);
        }
        Ok(src)
    }

    fn register_copy(&mut self, dest_dir: DirId, dest_name: &str, src: FileId) -> Result<FileId> {
        let source = self.file(src)?.clone();
        let mut node = FileNode::new(dest_name, self.settings.doc_type_for(dest_name), source.created_time);
        node.modified_time = source.modified_time;

        let mut new_folder = None;
        if !source.attachment_folder.is_empty() {
            let folder = new_attachment_folder_name(&self.layout);
            let from = self.layout.attachments_dir.join(&source.attachment_folder);
            if from.exists() {
                let to = self.layout.attachments_dir.join(&folder);
                filesystem::copy_directory(&from, &to, false)
                    .map_err(|e| NotebookError::io("copy attachment folder", &from, e))?;
                new_folder = Some(to);
            }
            node.attachment_folder = folder;
            node.attachments = source.attachments;
        }

        let id = self.alloc_file(node);
        if let Err(e) = self.add_file(dest_dir, id, None) {
            self.free_file(id);
            if let Some(folder) = new_folder {
                if let Err(cleanup) = fs::remove_dir_all(&folder) {
                    log::warn!("failed to remove {}: {}", folder.display(), cleanup);
                }
            }
            return Err(e);
        }
        Ok(id)
    }

    /// Deregisters the note, then deletes its file and attachment folder,
    /// to the recycle bin unless `skip_recycle_bin` is set.
    pub fn delete_file(&mut self, file: FileId, skip_recycle_bin: bool) -> Result<()> {
        let parent = self.file(file)?.parent.ok_or(NotebookError::StaleNode)?;
        let path = self.file_path(file)?;
        let attachments = self.attachment_folder_path(file)?;

        self.remove_file(parent, file)?;
        self.free_file(file);

        let bin = self.layout.recycle_bin();
        bin.delete_file(&path, skip_recycle_bin)
            .map_err(|e| NotebookError::io("delete note", &path, e))?;
        if let Some(folder) = attachments.filter(|f| f.exists()) {
            bin.delete_directory(&folder, skip_recycle_bin)
                .map_err(|e| NotebookError::io("delete attachment folder", &folder, e))?;
        }

        log::info!(
            "deleted note {} {}",
            path.display(),
            if skip_recycle_bin { "from disk" } else { "to recycle bin" }
        );
        Ok(())
    }

    /// Copies external files into `dir` and registers them as notes, using
    /// a sequenced name when one is taken. Each file is handled on its own.
    pub fn import_files(&mut self, dir: DirId, paths: &[PathBuf]) -> BatchReport {
        let mut report = BatchReport::default();
        for path in paths {
            match self.import_file(dir, path) {
                Ok(name) => report.succeeded.push(name),
                Err(e) => {
                    log::warn!("failed to import {}: {}", path.display(), e);
                    report.errors.push(format!("{}: {}", path.display(), e));
                }
            }
        }
        report
    }

    fn import_file(&mut self, dir: DirId, src: &Path) -> Result<String> {
        if !src.is_file() {
            return Err(NotebookError::NotFound(src.display().to_string()));
        }
        let src_name = src
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| is_legal_file_name(n))
            .ok_or_else(|| NotebookError::IllegalName(src.display().to_string()))?;

        self.open(dir)?;
        let dir_path = self.dir_path(dir)?;
        let name = file_name_with_sequence(&dir_path, src_name);
        let dest = dir_path.join(&name);

        filesystem::copy_file(src, &dest, false).map_err(|e| NotebookError::io("import note", src, e))?;
        if let Err(e) = self.add_file_by_name(dir, &name, None) {
            if let Err(cleanup) = fs::remove_file(&dest) {
                log::warn!("failed to remove {}: {}", dest.display(), cleanup);
            }
            return Err(e);
        }
        Ok(name)
    }
}

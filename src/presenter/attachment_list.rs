use std::path::PathBuf;

use serde::Serialize;

use crate::error::{NotebookError, Result};
use crate::filesystem::is_legal_file_name;
use crate::models::ApiResult;
use crate::notebook::{FileId, Notebook};

use super::ListDiff;

/// Which attachment panel buttons are usable, plus the count label.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ButtonState {
    pub add_enabled: bool,
    pub delete_enabled: bool,
    pub clear_enabled: bool,
    pub locate_enabled: bool,
    pub count: usize,
}

/// Attachments of one note, in their persisted order.
#[derive(Debug, Default)]
pub struct AttachmentListPresenter {
    file: Option<FileId>,
    items: Vec<String>,
}

impl AttachmentListPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&self) -> Option<FileId> {
        self.file
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn set_file(&mut self, notebook: &Notebook, file: Option<FileId>) -> Result<ListDiff<String>> {
        self.file = file;
        self.update_content(notebook)
    }

    pub fn update_content(&mut self, notebook: &Notebook) -> Result<ListDiff<String>> {
        let items = match self.file {
            Some(file) => notebook
                .file(file)?
                .attachments()
                .iter()
                .map(|a| a.name.clone())
                .collect(),
            None => Vec::new(),
        };
        let diff = ListDiff::between(&self.items, &items);
        self.items = items;
        Ok(diff)
    }

    fn refresh(&mut self, notebook: &Notebook) {
        if let Err(e) = self.update_content(notebook) {
            log::warn!("failed to refresh attachment list: {}", e);
            self.file = None;
            self.items.clear();
        }
    }

    fn current_file(&self) -> Result<FileId> {
        self.file
            .ok_or_else(|| NotebookError::NotFound("no note selected".to_string()))
    }

    pub fn add_attachments(&mut self, notebook: &mut Notebook, paths: &[PathBuf]) -> ApiResult {
        let file = match self.current_file() {
            Ok(file) => file,
            Err(e) => return ApiResult::error(e.to_string()),
        };
        let report = notebook.add_attachments(file, paths);
        self.refresh(notebook);
        report.to_api_result()
    }

    pub fn delete_items(&mut self, notebook: &mut Notebook, names: &[String], skip_recycle_bin: bool) -> ApiResult {
        let result = self
            .current_file()
            .and_then(|file| notebook.delete_attachments(file, Some(names), skip_recycle_bin));
        self.refresh(notebook);
        match result {
            Ok(()) => ApiResult::batch(names.len(), Vec::new()),
            Err(e) => ApiResult::error(e.to_string()),
        }
    }

    /// Deletes every attachment of the note, to the recycle bin unless
    /// `skip_recycle_bin` is set.
    pub fn clear(&mut self, notebook: &mut Notebook, skip_recycle_bin: bool) -> ApiResult {
        let count = self.items.len();
        let result = self
            .current_file()
            .and_then(|file| notebook.delete_attachments(file, None, skip_recycle_bin));
        self.refresh(notebook);
        match result {
            Ok(()) => ApiResult::batch(count, Vec::new()),
            Err(e) => ApiResult::error(e.to_string()),
        }
    }

    /// Checks the new name against the displayed list before asking the
    /// model; a case-only change of the same entry is allowed.
    pub fn rename_item(&mut self, notebook: &mut Notebook, old_name: &str, new_name: &str) -> ApiResult {
        if old_name == new_name {
            return ApiResult::with_name(new_name);
        }
        if !is_legal_file_name(new_name) {
            return ApiResult::error(format!("Illegal name: {:?}", new_name));
        }
        let conflict = self
            .items
            .iter()
            .any(|item| item != old_name && item.to_lowercase() == new_name.to_lowercase());
        if conflict {
            return ApiResult::error(format!("Name conflicts with existing attachment: {}", new_name));
        }

        let result = self
            .current_file()
            .and_then(|file| notebook.rename_attachment(file, old_name, new_name));
        self.refresh(notebook);
        match result {
            Ok(()) => ApiResult::with_name(new_name),
            Err(e) => ApiResult::error(e.to_string()),
        }
    }

    pub fn sort_items(&mut self, notebook: &mut Notebook, permutation: &[usize]) -> ApiResult {
        let result = self
            .current_file()
            .and_then(|file| notebook.sort_attachments(file, permutation));
        self.refresh(notebook);
        match result {
            Ok(()) => ApiResult::success(),
            Err(e) => ApiResult::error(e.to_string()),
        }
    }

    pub fn button_state(&self, notebook: &Notebook) -> ButtonState {
        let Some(node) = self.file.and_then(|f| notebook.file(f).ok()) else {
            return ButtonState::default();
        };
        let has_folder = !node.attachment_folder().is_empty();
        let count = node.attachments().len();
        ButtonState {
            add_enabled: true,
            delete_enabled: has_folder && count > 0,
            clear_enabled: has_folder && count > 0,
            locate_enabled: has_folder,
            count,
        }
    }
}

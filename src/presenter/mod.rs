//! Headless list presenters.
//!
//! They hold what a list widget would display, translate user actions into
//! notebook mutations and answer with an [`ApiResult`](crate::models::ApiResult).
//! After every action the list is re-read from the model, so what they show
//! is always what the configs on disk say.

pub mod attachment_list;
pub mod file_list;

pub use attachment_list::{AttachmentListPresenter, ButtonState};
pub use file_list::FileListPresenter;

/// Identity diff between two displayed lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListDiff<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

impl<T> Default for ListDiff<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<T: PartialEq + Clone> ListDiff<T> {
    pub fn between(old: &[T], new: &[T]) -> Self {
        Self {
            added: new.iter().filter(|item| !old.contains(item)).cloned().collect(),
            removed: old.iter().filter(|item| !new.contains(item)).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

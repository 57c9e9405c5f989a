pub mod attachment;
pub mod cli;
pub mod clipboard;
pub mod config;
pub mod directory;
pub mod error;
pub mod filesystem;
pub mod models;
pub mod note;
pub mod notebook;
pub mod presenter;
pub mod store;

pub use clipboard::{Clipboard, ClipboardSession, FileTransfer, MemoryClipboard};
pub use config::{Settings, SettingsManager};
pub use error::{NotebookError, Result};
pub use models::{ApiResult, BatchReport, DocType};
pub use notebook::{DirId, FileId, Notebook};
pub use store::{ConfigStore, JsonConfigStore};

use crate::cli::args::Args;

pub fn run(args: Args) -> anyhow::Result<()> {
    log::debug!("starting nbstore with {:?}", args);
    cli::execute(args)
}

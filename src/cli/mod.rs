pub mod args;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};

use crate::config::SettingsManager;
use crate::directory::platform_case_sensitive;
use crate::models::ApiResult;
use crate::notebook::{DirId, FileId, Notebook};
use crate::presenter::{AttachmentListPresenter, FileListPresenter};
use crate::store::JsonConfigStore;

use args::{Args, Command};

pub fn execute(args: Args) -> Result<()> {
    let settings = open_settings(args.settings.as_deref())?;

    if let Command::Init { path, name } = &args.command {
        return init(&settings, path, name.as_deref());
    }

    let root = notebook_root(args.notebook.as_deref(), &settings)?;
    let mut notebook = Notebook::load(&root, Arc::new(JsonConfigStore::new()), settings.clone())
        .with_context(|| format!("Failed to open notebook at {}", root.display()))?;
    log::debug!("using notebook {} at {}", notebook.name(), root.display());

    match args.command {
        Command::Init { .. } => bail!("init cannot run against an open notebook"),
        Command::Tree => {
            println!("{}", notebook.name());
            let root = notebook.root();
            print_tree(&mut notebook, root, 1)
        }
        Command::Mkdir { path } => {
            let (parent, name) = split_parent(&path)?;
            let dir = resolve_folder(&mut notebook, parent)?;
            notebook
                .create_sub_directory(dir, name)
                .with_context(|| format!("Failed to create folder {}", path))?;
            println!("created {}", path);
            Ok(())
        }
        Command::New {
            folder,
            name,
            title,
            no_title,
        } => {
            let dir = resolve_folder(&mut notebook, &folder)?;
            let mut presenter = FileListPresenter::new();
            presenter.set_directory(&mut notebook, Some(dir))?;
            let name = match name {
                Some(name) => name,
                None => presenter.default_new_file_name(&notebook)?,
            };
            let insert_title = match (title, no_title) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let result = presenter.new_file(&mut notebook, &name, insert_title);
            check(result, "Failed to create note")?;
            println!("created {}", join_path(&folder, &name));
            Ok(())
        }
        Command::Ls { folder } => {
            let dir = resolve_folder(&mut notebook, &folder)?;
            let mut presenter = FileListPresenter::new();
            presenter.set_directory(&mut notebook, Some(dir))?;
            for &file in presenter.items() {
                let node = notebook.file(file)?;
                println!(
                    "{}\t{}\t{}",
                    node.name(),
                    node.doc_type().as_str(),
                    node.modified_time().format("%Y-%m-%d %H:%M:%S")
                );
            }
            Ok(())
        }
        Command::Rm { notes, permanent } => {
            let files = notes
                .iter()
                .map(|n| resolve_note(&mut notebook, n))
                .collect::<Result<Vec<_>>>()?;
            let mut presenter = FileListPresenter::new();
            let result = presenter.delete_files(&mut notebook, &files, permanent);
            check(result, "Failed to delete notes")
        }
        Command::Mv { note, new_name } => {
            let file = resolve_note(&mut notebook, &note)?;
            notebook
                .rename_file(file, &new_name)
                .with_context(|| format!("Failed to rename {} to {}", note, new_name))?;
            Ok(())
        }
        Command::Cp { notes, to, cut } => {
            let files = notes
                .iter()
                .map(|n| resolve_note(&mut notebook, n))
                .collect::<Result<Vec<_>>>()?;
            let dest = resolve_folder(&mut notebook, &to)?;
            let mut presenter = FileListPresenter::new();
            presenter.set_directory(&mut notebook, Some(dest))?;
            let transfer = presenter.copy_selected(&notebook, &files, cut)?;
            let result = presenter.paste(&mut notebook, &transfer);
            check(result, "Failed to paste notes")
        }
        Command::Import { folder, files } => {
            let dir = resolve_folder(&mut notebook, &folder)?;
            let mut presenter = FileListPresenter::new();
            presenter.set_directory(&mut notebook, Some(dir))?;
            let result = presenter.import_files(&mut notebook, &files);
            check(result, "Failed to import files")
        }
        Command::Attach { note, files } => {
            let mut presenter = attachment_presenter(&mut notebook, &note)?;
            let result = presenter.add_attachments(&mut notebook, &files);
            check(result, "Failed to add attachments")
        }
        Command::Detach {
            note,
            names,
            permanent,
        } => {
            let mut presenter = attachment_presenter(&mut notebook, &note)?;
            let result = if names.is_empty() {
                presenter.clear(&mut notebook, permanent)
            } else {
                presenter.delete_items(&mut notebook, &names, permanent)
            };
            check(result, "Failed to delete attachments")
        }
        Command::Attachments { note } => {
            let presenter = attachment_presenter(&mut notebook, &note)?;
            for name in presenter.items() {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

fn open_settings(path: Option<&Path>) -> Result<Arc<SettingsManager>> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => SettingsManager::default_path()?,
    };
    let settings = SettingsManager::new(path.clone())
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    Ok(Arc::new(settings))
}

fn notebook_root(explicit: Option<&Path>, settings: &SettingsManager) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    settings
        .last_notebook()
        .map(PathBuf::from)
        .context("No notebook given and no last notebook recorded; use --notebook or init")
}

fn init(settings: &Arc<SettingsManager>, path: &Path, name: Option<&str>) -> Result<()> {
    let root = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Could not determine current directory")?
            .join(path)
    };
    let default_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string());
    let name = name.unwrap_or(&default_name);

    Notebook::create(&root, name, Arc::new(JsonConfigStore::new()), settings.clone())
        .with_context(|| format!("Failed to create notebook at {}", root.display()))?;

    settings.set_last_notebook(Some(root.to_string_lossy().into_owned()));
    settings.save_sync().context("Failed to save settings")?;
    println!("created notebook {} at {}", name, root.display());
    Ok(())
}

fn print_tree(notebook: &mut Notebook, dir: DirId, depth: usize) -> Result<()> {
    notebook.open(dir)?;
    let node = notebook.dir(dir)?;
    let sub_dirs = node.sub_directories().to_vec();
    let files = node.files().to_vec();
    let indent = "  ".repeat(depth);

    for sub in sub_dirs {
        println!("{}{}/", indent, notebook.dir(sub)?.name());
        print_tree(notebook, sub, depth + 1)?;
    }
    for file in files {
        let node = notebook.file(file)?;
        if node.attachments().is_empty() {
            println!("{}{}", indent, node.name());
        } else {
            println!("{}{} [{} attachment(s)]", indent, node.name(), node.attachments().len());
        }
    }
    Ok(())
}

/// Walks `path` ("a/b", "" for the root) down from the root folder.
fn resolve_folder(notebook: &mut Notebook, path: &str) -> Result<DirId> {
    let mut dir = notebook.root();
    for segment in path.split(['/', '\\']).filter(|s| !s.is_empty()) {
        dir = notebook
            .find_sub_directory(dir, segment, platform_case_sensitive())?
            .ok_or_else(|| anyhow!("Folder not found: {}", path))?;
    }
    Ok(dir)
}

fn resolve_note(notebook: &mut Notebook, path: &str) -> Result<FileId> {
    notebook
        .load_file(path)?
        .ok_or_else(|| anyhow!("Note not found: {}", path))
}

fn attachment_presenter(notebook: &mut Notebook, note: &str) -> Result<AttachmentListPresenter> {
    let file = resolve_note(notebook, note)?;
    let mut presenter = AttachmentListPresenter::new();
    presenter.set_file(notebook, Some(file))?;
    Ok(presenter)
}

fn split_parent(path: &str) -> Result<(&str, &str)> {
    let trimmed = path.trim_end_matches(['/', '\\']);
    match trimmed.rfind(['/', '\\']) {
        Some(idx) => Ok((&trimmed[..idx], &trimmed[idx + 1..])),
        None if !trimmed.is_empty() => Ok(("", trimmed)),
        None => bail!("Empty folder path"),
    }
}

fn join_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_end_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", folder, name)
    }
}

/// Turns a failed presenter result into an error listing each failure.
fn check(result: ApiResult, what: &str) -> Result<()> {
    if let Some(count) = result.count {
        log::info!("{} item(s) processed", count);
    }
    if result.success {
        return Ok(());
    }
    let mut message = format!("{}: {}", what, result.error.unwrap_or_default());
    for error in &result.errors {
        message.push_str("\n  ");
        message.push_str(error);
    }
    Err(anyhow!(message))
}

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use walkdir::WalkDir;

/// Characters a note, folder or attachment name may not contain.
/// Plain spaces are allowed, other whitespace is not.
const FILE_NAME_PATTERN: &str = r#"^(?:[^\\/:*?"<>|\s]| )+$"#;

fn file_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(FILE_NAME_PATTERN).expect("file name pattern is valid"))
}

/// Returns true if `name` can be used as a single path component.
///
/// Rejects empty names, `.`/`..`, path separators, characters that are
/// reserved on Windows, and whitespace other than a plain space.
pub fn is_legal_file_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    file_name_regex().is_match(name)
}

/// Splits `name` into stem and suffix (without the dot).
/// A leading dot is part of the stem, so ".hidden" has no suffix.
pub fn split_suffix(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// Lower-cased suffix of `name`, if any.
pub fn suffix_of(name: &str) -> Option<String> {
    split_suffix(name).1.map(|s| s.to_lowercase())
}

fn join_stem_suffix(stem: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(s) => format!("{}.{}", stem, s),
        None => stem.to_string(),
    }
}

/// Returns `name` if nothing by that name exists in `dir`, otherwise the
/// first free `stem_N.suffix` with N counting up from 1.
pub fn file_name_with_sequence(dir: &Path, name: &str) -> String {
    if !dir.join(name).exists() {
        return name.to_string();
    }

    let (stem, suffix) = split_suffix(name);
    let mut seq = 1;
    loop {
        let candidate = join_stem_suffix(&format!("{}_{}", stem, seq), suffix);
        if !dir.join(&candidate).exists() {
            return candidate;
        }
        seq += 1;
    }
}

/// Name for a copy of `name`: the first of `stem_copy.suffix`,
/// `stem_copy_1.suffix`, `stem_copy_2.suffix`, ... that `is_free` accepts.
pub fn copied_file_name<E>(name: &str, mut is_free: impl FnMut(&str) -> Result<bool, E>) -> Result<String, E> {
    let (stem, suffix) = split_suffix(name);
    let copy_stem = format!("{}_copy", stem);
    let candidate = join_stem_suffix(&copy_stem, suffix);
    if is_free(&candidate)? {
        return Ok(candidate);
    }

    let mut seq = 1;
    loop {
        let candidate = join_stem_suffix(&format!("{}_{}", copy_stem, seq), suffix);
        if is_free(&candidate)? {
            return Ok(candidate);
        }
        seq += 1;
    }
}

/// Lexically normalizes a path: drops `.` components and folds `..`.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Path equality after normalization; case-insensitive on Windows.
pub fn equal_path(a: &Path, b: &Path) -> bool {
    let a = clean_path(a);
    let b = clean_path(b);
    if cfg!(windows) {
        a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
    } else {
        a == b
    }
}

/// Copies (or moves, if `is_cut`) a single file, creating the destination's
/// parent directory as needed.
pub fn copy_file(src: &Path, dest: &Path, is_cut: bool) -> io::Result<()> {
    if equal_path(src, dest) {
        return Ok(());
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    if is_cut {
        // rename fails across devices; fall back to copy + remove
        if fs::rename(src, dest).is_ok() {
            return Ok(());
        }
        fs::copy(src, dest)?;
        fs::remove_file(src)
    } else {
        fs::copy(src, dest).map(|_| ())
    }
}

/// Recursively copies (or moves) the directory tree at `src` to `dest`.
/// `dest` must not exist yet.
pub fn copy_directory(src: &Path, dest: &Path, is_cut: bool) -> io::Result<()> {
    if equal_path(src, dest) {
        return Ok(());
    }
    if dest.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", dest.display()),
        ));
    }
    if clean_path(dest).starts_with(clean_path(src)) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "cannot copy a directory into itself",
        ));
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    if is_cut && fs::rename(src, dest).is_ok() {
        return Ok(());
    }

    for entry in WalkDir::new(src) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    if is_cut {
        fs::remove_dir_all(src)?;
    }
    Ok(())
}

/// Notebook-scoped trash folder.
///
/// Deleted files and directories are moved here under a sequenced name
/// unless the caller asks to skip the bin, in which case they are removed
/// permanently.
#[derive(Debug, Clone)]
pub struct RecycleBin {
    dir: PathBuf,
}

impl RecycleBin {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn target_for(&self, path: &Path) -> io::Result<PathBuf> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
        fs::create_dir_all(&self.dir)?;
        Ok(self.dir.join(file_name_with_sequence(&self.dir, name)))
    }

    /// Removes a single file. Returns the location in the bin, if any.
    pub fn delete_file(&self, path: &Path, skip_recycle_bin: bool) -> io::Result<Option<PathBuf>> {
        if skip_recycle_bin {
            fs::remove_file(path)?;
            return Ok(None);
        }
        let target = self.target_for(path)?;
        copy_file(path, &target, true)?;
        Ok(Some(target))
    }

    /// Removes a whole directory tree. Returns the location in the bin, if any.
    pub fn delete_directory(&self, path: &Path, skip_recycle_bin: bool) -> io::Result<Option<PathBuf>> {
        if skip_recycle_bin {
            fs::remove_dir_all(path)?;
            return Ok(None);
        }
        let target = self.target_for(path)?;
        copy_directory(path, &target, true)?;
        Ok(Some(target))
    }
}

/// On-disk layout of one notebook.
///
/// The structure is:
/// - `{root}/_vnote.json` - root directory config plus notebook keys
/// - `{root}/{attachment_folder}/` - one sub-folder per note with attachments
/// - `{root}/{image_folder}/` - images referenced from notes
/// - `{root}/{recycle_bin_folder}/` - deleted notes, folders and attachments
#[derive(Debug, Clone)]
pub struct NotebookLayout {
    pub root: PathBuf,
    pub attachments_dir: PathBuf,
    pub images_dir: PathBuf,
    pub recycle_bin_dir: PathBuf,
}

impl NotebookLayout {
    pub fn new(root: &Path, attachment_folder: &str, image_folder: &str, recycle_bin_folder: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            attachments_dir: root.join(attachment_folder),
            images_dir: root.join(image_folder),
            recycle_bin_dir: root.join(recycle_bin_folder),
        }
    }

    /// Ensures the notebook root exists. Attachment, image and recycle bin
    /// folders are created on first use.
    pub fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    pub fn recycle_bin(&self) -> RecycleBin {
        RecycleBin::new(self.recycle_bin_dir.clone())
    }
}

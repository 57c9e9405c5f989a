use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::error::{NotebookError, Result};
use crate::filesystem::suffix_of;
use crate::models::DocType;

/// Debounce delay for settings saves (1 second)
const SAVE_DEBOUNCE_MS: u64 = 1000;

/// Name of the application folder under the platform config directory.
const APP_DIR_NAME: &str = "nbstore";

/// Global preferences shared by every notebook.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    /// Suffixes (lower case, without dot) that map a file name to a doc type.
    pub doc_suffixes: BTreeMap<DocType, Vec<String>>,
    /// Default folder names for notebooks that do not specify their own.
    pub attachment_folder: String,
    pub image_folder: String,
    pub recycle_bin_folder: String,
    /// Write `# <name>` into newly created Markdown notes.
    pub insert_title_from_note_name: bool,
    pub last_notebook: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut doc_suffixes = BTreeMap::new();
        doc_suffixes.insert(
            DocType::Markdown,
            vec!["md".to_string(), "markdown".to_string(), "mkd".to_string()],
        );
        doc_suffixes.insert(DocType::Html, vec!["html".to_string(), "htm".to_string()]);

        Self {
            doc_suffixes,
            attachment_folder: "_v_attachments".to_string(),
            image_folder: "_v_images".to_string(),
            recycle_bin_folder: "_v_recycle_bin".to_string(),
            insert_title_from_note_name: true,
            last_notebook: None,
        }
    }
}

impl Settings {
    /// Document type of a file called `name`, decided by its suffix.
    pub fn doc_type_for(&self, name: &str) -> DocType {
        let Some(suffix) = suffix_of(name) else {
            return DocType::Unknown;
        };
        self.doc_suffixes
            .iter()
            .find(|(_, suffixes)| suffixes.iter().any(|s| s.eq_ignore_ascii_case(&suffix)))
            .map(|(doc_type, _)| *doc_type)
            .unwrap_or(DocType::Unknown)
    }

    /// Suffix used for new Markdown notes: "md" if configured, otherwise the
    /// first configured Markdown suffix.
    pub fn default_markdown_suffix(&self) -> String {
        let suffixes = self.doc_suffixes.get(&DocType::Markdown);
        match suffixes {
            Some(list) if list.iter().any(|s| s == "md") => "md".to_string(),
            Some(list) if !list.is_empty() => list[0].clone(),
            _ => "md".to_string(),
        }
    }
}

/// SettingsManager handles loading, saving, and updating global preferences.
///
/// Features:
/// - Thread-safe access via RwLock
/// - Debounced saving to avoid excessive disk writes
/// - Merges saved settings with defaults for missing fields
///
/// Directory configs never go through here; they are written immediately by
/// the notebook.
pub struct SettingsManager {
    /// The current settings
    settings: RwLock<Settings>,
    /// Path to the settings file
    settings_path: PathBuf,
    /// Handle to the debounced save task
    save_handle: Mutex<Option<JoinHandle<()>>>,
    /// Shared copy for the async save task
    settings_for_save: Arc<RwLock<Settings>>,
    /// Shared path for the async save task
    settings_path_for_save: Arc<PathBuf>,
}

impl SettingsManager {
    /// Creates a new SettingsManager reading `settings_path`.
    ///
    /// Missing files yield defaults; missing fields are filled from defaults.
    pub fn new(settings_path: PathBuf) -> Result<Self> {
        let settings = Self::load_from_file(&settings_path)?;
        Ok(Self::with_settings(settings, settings_path))
    }

    /// Creates a SettingsManager from already-built settings.
    pub fn with_settings(settings: Settings, settings_path: PathBuf) -> Self {
        let settings_for_save = Arc::new(RwLock::new(settings.clone()));
        let settings_path_for_save = Arc::new(settings_path.clone());

        Self {
            settings: RwLock::new(settings),
            settings_path,
            save_handle: Mutex::new(None),
            settings_for_save,
            settings_path_for_save,
        }
    }

    /// Platform settings file, e.g. `~/.config/nbstore/settings.json` on Linux.
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| NotebookError::Settings("Could not determine config directory".to_string()))?;
        Ok(dir.join(APP_DIR_NAME).join("settings.json"))
    }

    fn load_from_file(path: &Path) -> Result<Settings> {
        if !path.exists() {
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(path).map_err(|e| NotebookError::io("read settings", path, e))?;
        merge_settings_with_defaults(&content)
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, Settings> {
        self.settings.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Gets a clone of the current settings.
    pub fn get(&self) -> Settings {
        self.read_lock().clone()
    }

    /// Updates the settings using a closure. Nothing is written to disk.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.write_lock();
        f(&mut settings);

        let mut shared = self
            .settings_for_save
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *shared = settings.clone();
    }

    /// Schedules a debounced save.
    ///
    /// A pending save is cancelled and replaced; the write happens
    /// SAVE_DEBOUNCE_MS after the last call. Must run inside a tokio runtime.
    pub async fn schedule_save(&self) {
        let mut handle_guard = self.save_handle.lock().await;

        if let Some(handle) = handle_guard.take() {
            handle.abort();
        }

        let settings_ref = Arc::clone(&self.settings_for_save);
        let path_ref = Arc::clone(&self.settings_path_for_save);

        let handle = tokio::spawn(async move {
            sleep(Duration::from_millis(SAVE_DEBOUNCE_MS)).await;

            let settings = settings_ref.read().unwrap_or_else(|e| e.into_inner()).clone();
            if let Err(e) = write_settings(path_ref.as_ref(), &settings) {
                log::warn!("Failed to persist settings: {}", e);
            }
        });

        *handle_guard = Some(handle);
    }

    /// Updates the settings and schedules a debounced save.
    pub async fn update_and_save<F>(&self, f: F)
    where
        F: FnOnce(&mut Settings),
    {
        self.update(f);
        self.schedule_save().await;
    }

    /// Saves the settings to disk immediately.
    pub fn save_sync(&self) -> Result<()> {
        let settings = self.get();
        write_settings(&self.settings_path, &settings)
    }

    pub fn doc_type_for(&self, name: &str) -> DocType {
        self.read_lock().doc_type_for(name)
    }

    pub fn insert_title_from_note_name(&self) -> bool {
        self.read_lock().insert_title_from_note_name
    }

    pub fn set_insert_title_from_note_name(&self, enabled: bool) {
        self.update(|settings| settings.insert_title_from_note_name = enabled);
    }

    pub fn last_notebook(&self) -> Option<String> {
        self.read_lock().last_notebook.clone()
    }

    pub fn set_last_notebook(&self, path: Option<String>) {
        self.update(|settings| settings.last_notebook = path);
    }

    /// Returns the settings file path.
    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }
}

fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| NotebookError::io("create settings directory", parent, e))?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    fs::write(path, content).map_err(|e| NotebookError::io("write settings", path, e))
}

/// Merges a partial settings JSON with defaults.
///
/// Unknown keys are ignored and keys with the wrong type keep their default.
pub fn merge_settings_with_defaults(partial_json: &str) -> Result<Settings> {
    if partial_json.trim().is_empty() {
        return Ok(Settings::default());
    }

    let json_value: serde_json::Value = serde_json::from_str(partial_json)
        .map_err(|e| NotebookError::Settings(format!("Failed to parse settings: {}", e)))?;

    let mut settings = Settings::default();

    if let Some(obj) = json_value.as_object() {
        if let Some(v) = obj.get("doc_suffixes") {
            if let Ok(suffixes) = serde_json::from_value::<BTreeMap<DocType, Vec<String>>>(v.clone()) {
                settings.doc_suffixes = suffixes
                    .into_iter()
                    .map(|(doc_type, list)| (doc_type, list.into_iter().map(|s| s.to_lowercase()).collect()))
                    .collect();
            }
        }
        if let Some(v) = obj.get("attachment_folder").and_then(|v| v.as_str()) {
            settings.attachment_folder = v.to_string();
        }
        if let Some(v) = obj.get("image_folder").and_then(|v| v.as_str()) {
            settings.image_folder = v.to_string();
        }
        if let Some(v) = obj.get("recycle_bin_folder").and_then(|v| v.as_str()) {
            settings.recycle_bin_folder = v.to_string();
        }
        if let Some(v) = obj.get("insert_title_from_note_name").and_then(|v| v.as_bool()) {
            settings.insert_title_from_note_name = v;
        }
        if let Some(v) = obj.get("last_notebook") {
            settings.last_notebook = v.as_str().map(|s| s.to_string());
        }
    }

    Ok(settings)
}

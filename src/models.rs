use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version string written into every directory config.
pub const DIR_CONFIG_VERSION: &str = "1";

/// Document kind of a note, derived from its file suffix.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Markdown,
    Html,
    Unknown,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Unknown => "unknown",
        }
    }
}

/// Serde helpers for UTC timestamps stored as ISO-8601 strings.
///
/// Reading is lenient: a missing or malformed value becomes the Unix epoch
/// instead of failing the whole config.
pub mod iso8601 {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(time: &DateTime<Utc>) -> String {
        time.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn parse(value: &str) -> Option<DateTime<Utc>> {
        if let Ok(t) = DateTime::parse_from_rfc3339(value) {
            return Some(t.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
            .ok()
            .map(|t| t.and_utc())
    }

    pub fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::default()
    }

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse).unwrap_or_else(epoch))
    }
}

/// Entry of the `sub_directories` array.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SubDirectoryRecord {
    pub name: String,
}

/// Entry of a note's `attachments` array.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AttachmentRecord {
    pub name: String,
}

/// Entry of the `files` array: everything needed to rebuild a note node.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FileRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<DocType>,
    #[serde(with = "iso8601", default = "iso8601::epoch")]
    pub created_time: DateTime<Utc>,
    #[serde(with = "iso8601", default = "iso8601::epoch")]
    pub modified_time: DateTime<Utc>,
    #[serde(default)]
    pub attachment_folder: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentRecord>,
}

/// Notebook-level keys merged into the root directory's config.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct NotebookRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recycle_bin_folder: Option<String>,
}

/// Contents of one directory's `_vnote.json`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DirectoryConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(with = "iso8601", default = "iso8601::epoch")]
    pub created_time: DateTime<Utc>,
    #[serde(default)]
    pub sub_directories: Vec<SubDirectoryRecord>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
    #[serde(flatten)]
    pub notebook: NotebookRecord,
}

fn default_version() -> String {
    DIR_CONFIG_VERSION.to_string()
}

impl DirectoryConfig {
    /// Empty config for a freshly created directory.
    pub fn new(created_time: DateTime<Utc>) -> Self {
        Self {
            version: DIR_CONFIG_VERSION.to_string(),
            created_time,
            sub_directories: Vec::new(),
            files: Vec::new(),
            notebook: NotebookRecord::default(),
        }
    }
}

/// Result handed back to a UI layer for one presenter action.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ApiResult {
    /// Create a successful result
    pub fn success() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Create a success result carrying the name of the affected entry
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            success: true,
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Result of a batch action: successes are committed even when some
    /// items failed, so `count` is always reported.
    pub fn batch(count: usize, errors: Vec<String>) -> Self {
        Self {
            success: errors.is_empty(),
            error: if errors.is_empty() {
                None
            } else {
                Some(format!("{} item(s) failed", errors.len()))
            },
            count: Some(count),
            errors,
            ..Default::default()
        }
    }
}

/// Outcome of a non-transactional batch: what went through and what did not.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchReport {
    /// Names of the entries that were committed, in input order.
    pub succeeded: Vec<String>,
    /// One message per failed item.
    pub errors: Vec<String>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.errors.len()
    }

    pub fn to_api_result(&self) -> ApiResult {
        ApiResult::batch(self.succeeded.len(), self.errors.clone())
    }

    /// Turns a report with failures into [`NotebookError::Batch`].
    pub fn into_result(self) -> crate::error::Result<Vec<String>> {
        if self.errors.is_empty() {
            return Ok(self.succeeded);
        }
        Err(crate::error::NotebookError::Batch {
            failed: self.errors.len(),
            total: self.total(),
            messages: self.errors,
        })
    }
}

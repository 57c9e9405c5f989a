use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Operation tag of a clipboard payload. Only note copy exists.
pub const OP_COPY_FILE: u8 = 0;

/// Copy/cut request passed between list presenters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransfer {
    pub is_cut: bool,
    /// Absolute paths of the notes being transferred.
    pub files: Vec<PathBuf>,
}

/// Why clipboard text was not accepted as a paste source.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Clipboard text is not a JSON object")]
    NotJson,

    #[error("Clipboard payload lacks key {0:?}")]
    MissingKey(&'static str),

    #[error("Clipboard payload has a malformed {0:?}")]
    BadValue(&'static str),

    #[error("Unsupported clipboard operation {0}")]
    UnsupportedOperation(u64),

    #[error("Clipboard payload belongs to another session")]
    StaleMagic,

    #[error("Clipboard payload has no files")]
    Empty,
}

/// Wire form of a transfer on the system clipboard.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClipboardPayload {
    pub magic: u32,
    #[serde(rename = "type")]
    pub op: u8,
    pub is_cut: bool,
    pub files: Vec<String>,
}

impl ClipboardPayload {
    pub fn new(magic: u32, transfer: &FileTransfer) -> Self {
        Self {
            magic,
            op: OP_COPY_FILE,
            is_cut: transfer.is_cut,
            files: transfer
                .files
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({
            "magic": self.magic,
            "type": self.op,
            "is_cut": self.is_cut,
            "files": self.files,
        })
        .to_string()
    }

    /// Parses and validates clipboard text against the session nonce.
    ///
    /// All four keys must be present, the operation must be a note copy, the
    /// magic must equal `magic` and the file list must not be empty.
    pub fn parse(text: &str, magic: u32) -> Result<FileTransfer, PayloadError> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(|_| PayloadError::NotJson)?;
        let obj = value.as_object().ok_or(PayloadError::NotJson)?;

        let field = |key: &'static str| obj.get(key).ok_or(PayloadError::MissingKey(key));
        let payload_magic = field("magic")?.as_u64().ok_or(PayloadError::BadValue("magic"))?;
        let op = field("type")?.as_u64().ok_or(PayloadError::BadValue("type"))?;
        let is_cut = field("is_cut")?.as_bool().ok_or(PayloadError::BadValue("is_cut"))?;
        let files = field("files")?.as_array().ok_or(PayloadError::BadValue("files"))?;

        if op != u64::from(OP_COPY_FILE) {
            return Err(PayloadError::UnsupportedOperation(op));
        }
        if payload_magic != u64::from(magic) {
            return Err(PayloadError::StaleMagic);
        }

        let files = files
            .iter()
            .map(|f| f.as_str().map(PathBuf::from).ok_or(PayloadError::BadValue("files")))
            .collect::<Result<Vec<_>, _>>()?;
        if files.is_empty() {
            return Err(PayloadError::Empty);
        }
        Ok(FileTransfer { is_cut, files })
    }
}

/// Per-presenter clipboard nonce. Payloads carrying any other value are
/// refused, and the value changes after every paste.
#[derive(Debug, Clone)]
pub struct ClipboardSession {
    magic: u32,
}

impl Default for ClipboardSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipboardSession {
    pub fn new() -> Self {
        Self { magic: random_magic() }
    }

    pub fn magic(&self) -> u32 {
        self.magic
    }

    pub fn regenerate(&mut self) {
        let previous = self.magic;
        while self.magic == previous {
            self.magic = random_magic();
        }
    }

    pub fn encode(&self, transfer: &FileTransfer) -> String {
        ClipboardPayload::new(self.magic, transfer).to_json()
    }

    pub fn decode(&self, text: &str) -> Result<FileTransfer, PayloadError> {
        ClipboardPayload::parse(text, self.magic)
    }
}

fn random_magic() -> u32 {
    let bits = Uuid::new_v4().as_u128();
    (bits ^ (bits >> 64)) as u32
}

/// Text clipboard the presenters read from and write to.
pub trait Clipboard {
    fn set_text(&mut self, text: String);
    fn text(&self) -> Option<String>;
    fn clear(&mut self);
}

/// Process-local clipboard.
#[derive(Debug, Default, Clone)]
pub struct MemoryClipboard {
    text: Option<String>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clipboard for MemoryClipboard {
    fn set_text(&mut self, text: String) {
        self.text = Some(text);
    }

    fn text(&self) -> Option<String> {
        self.text.clone()
    }

    fn clear(&mut self) {
        self.text = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn transfer() -> FileTransfer {
        FileTransfer {
            is_cut: true,
            files: vec![PathBuf::from("/nb/a.md"), PathBuf::from("/nb/b.md")],
        }
    }

    #[test]
    fn test_payload_json_shape() {
        let session = ClipboardSession::new();
        let value: serde_json::Value = serde_json::from_str(&session.encode(&transfer())).unwrap();

        assert_eq!(value["magic"], session.magic());
        assert_eq!(value["type"], 0);
        assert_eq!(value["is_cut"], true);
        assert_eq!(value["files"][1], "/nb/b.md");
    }

    #[test]
    fn test_decode_own_payload() {
        let session = ClipboardSession::new();
        let text = session.encode(&transfer());
        assert_eq!(session.decode(&text).unwrap(), transfer());
    }

    #[test]
    fn test_regenerate_invalidates_old_payload() {
        let mut session = ClipboardSession::new();
        let text = session.encode(&transfer());
        let before = session.magic();

        session.regenerate();
        assert_ne!(session.magic(), before);
        assert_eq!(session.decode(&text), Err(PayloadError::StaleMagic));
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        let session = ClipboardSession::new();
        let magic = session.magic();

        assert_eq!(session.decode("plain text"), Err(PayloadError::NotJson));
        assert_eq!(session.decode("[1, 2]"), Err(PayloadError::NotJson));
        assert_eq!(
            session.decode(&format!(r#"{{"magic": {}, "type": 0, "files": ["/a.md"]}}"#, magic)),
            Err(PayloadError::MissingKey("is_cut"))
        );
        assert_eq!(
            session.decode(&format!(r#"{{"magic": {}, "type": 1, "is_cut": false, "files": ["/a.md"]}}"#, magic)),
            Err(PayloadError::UnsupportedOperation(1))
        );
        assert_eq!(
            session.decode(&format!(r#"{{"magic": {}, "type": 0, "is_cut": false, "files": []}}"#, magic)),
            Err(PayloadError::Empty)
        );
    }

    #[test]
    fn test_memory_clipboard() {
        let mut clipboard = MemoryClipboard::new();
        assert!(clipboard.text().is_none());
        clipboard.set_text("x".to_string());
        assert_eq!(clipboard.text().as_deref(), Some("x"));
        clipboard.clear();
        assert!(clipboard.text().is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A well-formed payload is refused whenever its magic differs from
        /// the session's.
        #[test]
        fn prop_foreign_magic_rejected(magic in any::<u32>(), is_cut in any::<bool>()) {
            let session = ClipboardSession::new();
            prop_assume!(magic != session.magic());

            let payload = ClipboardPayload::new(magic, &FileTransfer {
                is_cut,
                files: vec![PathBuf::from("/nb/a.md")],
            });
            prop_assert_eq!(session.decode(&payload.to_json()), Err(PayloadError::StaleMagic));
        }
    }
}

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::store::{Conversation, ConversationStore, MemoryStore, StoreError};

const STATE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RelationStateDocument {
    version: u32,
    conversations: Vec<Conversation>,
}

/// Conversation store persisted as a versioned JSON document.
///
/// Every `flush` rewrites the whole document into a sibling temp file and
/// renames it over the old one, so a crash mid-write leaves the previous
/// document intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    /// Loads the document at `path`. A missing file yields an empty store; an
    /// unreadable or malformed one is an error, since starting over would
    /// forget every acknowledged baseline.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Ok(Self {
                    path,
                    inner: MemoryStore::new(),
                });
            }
            Err(error) => {
                return Err(StoreError::Read(format!("{}: {error}", path.display())));
            }
        };

        let document = serde_json::from_str::<RelationStateDocument>(raw.as_str())
            .map_err(|error| StoreError::Malformed(format!("{}: {error}", path.display())))?;
        if document.version != STATE_SCHEMA_VERSION {
            return Err(StoreError::Malformed(format!(
                "{}: unsupported version {}",
                path.display(),
                document.version
            )));
        }

        Ok(Self {
            path,
            inner: MemoryStore::from_conversations(document.conversations),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }
}

impl ConversationStore for JsonFileStore {
    fn conversation(&mut self, scope: &str) -> Result<&mut Conversation, StoreError> {
        self.inner.conversation(scope)
    }

    fn find(&self, scope: &str) -> Option<&Conversation> {
        self.inner.find(scope)
    }

    fn conversations(&self) -> Box<dyn Iterator<Item = &Conversation> + '_> {
        self.inner.conversations()
    }

    fn remove(&mut self, scope: &str) -> Result<Option<Conversation>, StoreError> {
        self.inner.remove(scope)
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|error| StoreError::Write(error.to_string()))?;
        }
        let encoded = serde_json::to_string_pretty(&RelationStateDocument {
            version: STATE_SCHEMA_VERSION,
            conversations: self.inner.snapshot(),
        })
        .map_err(|error| StoreError::Write(error.to_string()))?;

        let tmp_path = temporary_state_path(&self.path);
        fs::write(&tmp_path, encoded)
            .map_err(|error| StoreError::Write(format!("{}: {error}", tmp_path.display())))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|error| StoreError::Write(format!("{}: {error}", self.path.display())))
    }
}

fn temporary_state_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let extension = path
        .extension()
        .map_or_else(|| "tmp".to_string(), |ext| format!("{}.tmp", ext.to_string_lossy()));
    tmp.set_extension(extension);
    tmp
}

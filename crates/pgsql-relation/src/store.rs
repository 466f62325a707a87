//! Per-service conversation state and the store contract the negotiation core
//! depends on.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Store-layer error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("conversation scope is required")]
    EmptyScope,
    #[error("state read failed: {0}")]
    Read(String),
    #[error("state write failed: {0}")]
    Write(String),
    #[error("state document malformed: {0}")]
    Malformed(String),
}

/// Negotiation state bound to one remote service.
///
/// `remote` is the relation's shared view: the peer writes its request into
/// it and this side writes its answer over it. `local` is this side's private
/// memory of what it already acknowledged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    scope: String,
    #[serde(default)]
    remote: BTreeMap<String, Value>,
    #[serde(default)]
    local: BTreeMap<String, Value>,
    #[serde(default)]
    states: BTreeSet<String>,
}

impl Conversation {
    #[must_use]
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn scope(&self) -> &str {
        self.scope.as_str()
    }

    /// Reads a field from the relation's remote view.
    #[must_use]
    pub fn get_remote(&self, field: &str) -> Option<&Value> {
        self.remote.get(field)
    }

    /// Reads a string field from the remote view, falling back to `default`
    /// when the field is absent or not a string.
    #[must_use]
    pub fn get_remote_str<'a>(&'a self, field: &str, default: &'a str) -> &'a str {
        self.remote
            .get(field)
            .and_then(Value::as_str)
            .unwrap_or(default)
    }

    /// Writes one field of this side's answer into the remote view.
    pub fn set_remote(&mut self, field: &str, value: Value) {
        self.remote.insert(field.to_string(), value);
    }

    /// Writes several answer fields into the remote view as one unit.
    pub fn set_remote_many(&mut self, fields: BTreeMap<String, Value>) {
        self.remote.extend(fields);
    }

    /// Applies settings sent by the peer. A `null` value unsets the field.
    pub fn receive_remote(&mut self, fields: impl IntoIterator<Item = (String, Value)>) {
        for (field, value) in fields {
            if value.is_null() {
                self.remote.remove(field.as_str());
            } else {
                self.remote.insert(field, value);
            }
        }
    }

    #[must_use]
    pub fn get_local(&self, field: &str) -> Option<&Value> {
        self.local.get(field)
    }

    pub fn set_local(&mut self, field: &str, value: Value) {
        self.local.insert(field.to_string(), value);
    }

    pub fn set_state(&mut self, name: &str) {
        self.states.insert(name.to_string());
    }

    pub fn remove_state(&mut self, name: &str) {
        self.states.remove(name);
    }

    #[must_use]
    pub fn is_state(&self, name: &str) -> bool {
        self.states.contains(name)
    }

    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(String::as_str)
    }
}

/// Keyed set of conversations, one per remote service.
///
/// The negotiation core only talks to this trait; the transport decides where
/// the state actually lives.
pub trait ConversationStore {
    /// Returns the conversation for `scope`, creating it when absent.
    fn conversation(&mut self, scope: &str) -> Result<&mut Conversation, StoreError>;

    /// Looks up an existing conversation without creating one.
    fn find(&self, scope: &str) -> Option<&Conversation>;

    /// Enumerates every known conversation.
    fn conversations(&self) -> Box<dyn Iterator<Item = &Conversation> + '_>;

    /// Drops the conversation for `scope`, returning it if it existed.
    fn remove(&mut self, scope: &str) -> Result<Option<Conversation>, StoreError>;

    /// Makes pending mutations durable. Stores without durability do nothing.
    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Map-backed store used by tests and embedders that persist state themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    conversations: BTreeMap<String, Conversation>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub(crate) fn from_conversations(conversations: Vec<Conversation>) -> Self {
        Self {
            conversations: conversations
                .into_iter()
                .map(|conversation| (conversation.scope.clone(), conversation))
                .collect(),
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Conversation> {
        self.conversations.values().cloned().collect()
    }
}

impl ConversationStore for MemoryStore {
    fn conversation(&mut self, scope: &str) -> Result<&mut Conversation, StoreError> {
        let scope = scope.trim();
        if scope.is_empty() {
            return Err(StoreError::EmptyScope);
        }
        Ok(self
            .conversations
            .entry(scope.to_string())
            .or_insert_with(|| Conversation::new(scope)))
    }

    fn find(&self, scope: &str) -> Option<&Conversation> {
        self.conversations.get(scope.trim())
    }

    fn conversations(&self) -> Box<dyn Iterator<Item = &Conversation> + '_> {
        Box::new(self.conversations.values())
    }

    fn remove(&mut self, scope: &str) -> Result<Option<Conversation>, StoreError> {
        let scope = scope.trim();
        if scope.is_empty() {
            return Err(StoreError::EmptyScope);
        }
        Ok(self.conversations.remove(scope))
    }
}

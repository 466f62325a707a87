//! Provides-side negotiation for the `pgsql` relation.
//!
//! Each remote service gets one conversation. Joined/changed notifications
//! diff the service's request against what was last acknowledged and raise
//! `database.requested` / `roles.requested`; `provide_database` and
//! `ack_roles` answer the request, record the new baseline, and clear the
//! flag.

pub mod cli;
pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod evaluate;
pub mod file_store;
pub mod flags;
pub mod provider;
pub mod query;
pub mod store;

pub use config::{ConfigError, ProviderConfig};
pub use credentials::GeneratedCredentials;
pub use dispatch::{
    DatabaseRequest, DispatchError, DispatchReport, Dispatcher, HandlerError, ProvisioningHandler,
};
pub use evaluate::{Evaluation, HookKind, RelationEvent};
pub use file_store::JsonFileStore;
pub use flags::{DEFAULT_RELATION_NAME, RequestFlag};
pub use provider::{DatabaseGrant, PgsqlProvides, ProvisionOutcome};
pub use query::parse_roles;
pub use store::{Conversation, ConversationStore, MemoryStore, StoreError};

//! Provides side of the pgsql relation: owns the injected store and answers
//! pending database and roles requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::flags::{DEFAULT_RELATION_NAME, RequestFlag};
use crate::store::{Conversation, ConversationStore, StoreError};

/// Connection and credential answer published to a requesting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseGrant {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub schema_user: String,
    pub schema_password: String,
    /// Opaque to this crate; published verbatim.
    pub state: String,
}

impl DatabaseGrant {
    fn to_remote_fields(&self) -> BTreeMap<String, Value> {
        BTreeMap::from([
            ("host".to_string(), Value::from(self.host.as_str())),
            ("port".to_string(), Value::from(self.port)),
            ("database".to_string(), Value::from(self.database.as_str())),
            ("user".to_string(), Value::from(self.user.as_str())),
            ("password".to_string(), Value::from(self.password.as_str())),
            ("schema_user".to_string(), Value::from(self.schema_user.as_str())),
            (
                "schema_password".to_string(),
                Value::from(self.schema_password.as_str()),
            ),
            ("state".to_string(), Value::from(self.state.as_str())),
        ])
    }

    /// Rebuilds the grant last written into the remote view, if complete.
    #[must_use]
    pub fn from_remote(conversation: &Conversation) -> Option<Self> {
        let text = |field: &str| {
            conversation
                .get_remote(field)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let port = conversation
            .get_remote("port")
            .and_then(Value::as_u64)
            .and_then(|port| u16::try_from(port).ok())?;
        Some(Self {
            host: text("host")?,
            port,
            database: text("database")?,
            user: text("user")?,
            password: text("password")?,
            schema_user: text("schema_user")?,
            schema_password: text("schema_password")?,
            state: text("state")?,
        })
    }
}

/// Result of a guarded provisioning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Applied,
    /// The corresponding flag was not set, so nothing changed.
    NotRequested,
}

/// Negotiation state machine for the provides side of one relation.
#[derive(Debug, Clone)]
pub struct PgsqlProvides<S> {
    relation_name: String,
    store: S,
}

impl<S: ConversationStore> PgsqlProvides<S> {
    pub fn new(store: S) -> Self {
        Self::with_relation_name(DEFAULT_RELATION_NAME, store)
    }

    pub fn with_relation_name(relation_name: impl Into<String>, store: S) -> Self {
        Self {
            relation_name: relation_name.into(),
            store,
        }
    }

    #[must_use]
    pub fn relation_name(&self) -> &str {
        self.relation_name.as_str()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    #[must_use]
    pub fn flag_name(&self, flag: RequestFlag) -> String {
        flag.state_name(self.relation_name.as_str())
    }

    /// Whether `flag` is currently pending for `service`.
    #[must_use]
    pub fn is_requested(&self, service: &str, flag: RequestFlag) -> bool {
        let name = self.flag_name(flag);
        self.store
            .find(service)
            .is_some_and(|conversation| conversation.is_state(name.as_str()))
    }

    /// Publishes `grant` to `service`, records its database as the new
    /// baseline, and clears the database flag.
    ///
    /// Does nothing unless a database request is pending for `service`.
    pub fn provide_database(
        &mut self,
        service: &str,
        grant: &DatabaseGrant,
    ) -> Result<ProvisionOutcome, StoreError> {
        if !self.is_requested(service, RequestFlag::Database) {
            warn!(
                relation = %self.relation_name,
                service,
                "provide_database called without a pending database request"
            );
            return Ok(ProvisionOutcome::NotRequested);
        }

        let flag = self.flag_name(RequestFlag::Database);
        let conversation = self.store.conversation(service)?;
        conversation.set_remote_many(grant.to_remote_fields());
        conversation.set_local("database", Value::from(grant.database.as_str()));
        conversation.remove_state(flag.as_str());
        self.store.flush()?;

        info!(
            relation = %self.relation_name,
            service,
            database = %grant.database,
            host = %grant.host,
            port = grant.port,
            "database provided"
        );
        Ok(ProvisionOutcome::Applied)
    }

    /// Records `roles` exactly as given as the acknowledged baseline for
    /// `service` and clears the roles flag.
    ///
    /// Does nothing unless a roles request is pending for `service`.
    pub fn ack_roles(
        &mut self,
        service: &str,
        roles: &[String],
    ) -> Result<ProvisionOutcome, StoreError> {
        if !self.is_requested(service, RequestFlag::Roles) {
            warn!(
                relation = %self.relation_name,
                service,
                "ack_roles called without a pending roles request"
            );
            return Ok(ProvisionOutcome::NotRequested);
        }

        let flag = self.flag_name(RequestFlag::Roles);
        let conversation = self.store.conversation(service)?;
        conversation.set_local("roles", Value::from(roles.to_vec()));
        conversation.remove_state(flag.as_str());
        self.store.flush()?;

        info!(relation = %self.relation_name, service, ?roles, "roles acknowledged");
        Ok(ProvisionOutcome::Applied)
    }

    /// Drops all state for `service` once its relation is broken.
    pub fn forget(&mut self, service: &str) -> Result<bool, StoreError> {
        let removed = self.store.remove(service)?.is_some();
        if removed {
            self.store.flush()?;
            info!(relation = %self.relation_name, service, "conversation removed");
        }
        Ok(removed)
    }
}

//! Read-only views over the negotiation state. Queries never create
//! conversations; unknown services read as defaults.

use serde_json::Value;

use crate::flags::RequestFlag;
use crate::provider::PgsqlProvides;
use crate::store::{Conversation, ConversationStore};

/// Splits a comma-separated roles field, dropping empty entries.
#[must_use]
pub fn parse_roles(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter(|role| !role.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn requested_database_of(conversation: &Conversation) -> &str {
    conversation.get_remote_str("database", "")
}

pub(crate) fn previous_database_of(conversation: &Conversation) -> Option<&str> {
    conversation.get_local("database").and_then(Value::as_str)
}

pub(crate) fn requested_roles_of(conversation: &Conversation) -> Vec<String> {
    parse_roles(conversation.get_remote_str("roles", ""))
}

pub(crate) fn previous_roles_of(conversation: &Conversation) -> Option<Vec<String>> {
    let roles = conversation.get_local("roles")?.as_array()?;
    roles
        .iter()
        .map(|role| role.as_str().map(str::to_string))
        .collect()
}

impl<S: ConversationStore> PgsqlProvides<S> {
    /// Roles currently requested by `service`.
    #[must_use]
    pub fn requested_roles(&self, service: &str) -> Vec<String> {
        self.store()
            .find(service)
            .map(requested_roles_of)
            .unwrap_or_default()
    }

    /// `(service, requested roles)` for every known conversation, whether or
    /// not a roles request is pending.
    #[must_use]
    pub fn all_requested_roles(&self) -> Vec<(String, Vec<String>)> {
        self.store()
            .conversations()
            .map(|conversation| {
                (
                    conversation.scope().to_string(),
                    requested_roles_of(conversation),
                )
            })
            .collect()
    }

    /// Roles last acknowledged for `service`, exactly as they were given.
    ///
    /// Only a stored list of strings reads back; any other stored value
    /// (a bare string, a number, a list with non-string entries) yields
    /// `None`. Use [`Self::previous_roles_value`] to see it unnarrowed.
    #[must_use]
    pub fn previous_roles(&self, service: &str) -> Option<Vec<String>> {
        self.store().find(service).and_then(previous_roles_of)
    }

    /// Raw stored roles baseline for `service`, whatever its shape.
    #[must_use]
    pub fn previous_roles_value(&self, service: &str) -> Option<&Value> {
        self.store()
            .find(service)
            .and_then(|conversation| conversation.get_local("roles"))
    }

    /// Lazily yields `(service, requested database)` for every known
    /// conversation. An empty name means the service wants one generated.
    /// Each call enumerates the store afresh.
    pub fn requested_databases(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.store().conversations().map(|conversation| {
            (conversation.scope(), requested_database_of(conversation))
        })
    }

    /// Database name requested by `service`; empty when none was named.
    #[must_use]
    pub fn requested_database(&self, service: &str) -> &str {
        self.store()
            .find(service)
            .map_or("", requested_database_of)
    }

    /// Database last provided to `service`.
    #[must_use]
    pub fn previous_database(&self, service: &str) -> Option<&str> {
        self.store().find(service).and_then(previous_database_of)
    }

    /// Services with `flag` currently pending, in store order.
    #[must_use]
    pub fn pending(&self, flag: RequestFlag) -> Vec<String> {
        let name = self.flag_name(flag);
        self.store()
            .conversations()
            .filter(|conversation| conversation.is_state(name.as_str()))
            .map(|conversation| conversation.scope().to_string())
            .collect()
    }
}

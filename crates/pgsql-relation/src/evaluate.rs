use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::flags::RequestFlag;
use crate::provider::PgsqlProvides;
use crate::query::{
    previous_database_of, previous_roles_of, requested_database_of, requested_roles_of,
};
use crate::store::{ConversationStore, StoreError};

/// Relation hook kinds delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Joined,
    Changed,
    Departed,
    Broken,
}

impl HookKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Joined => "joined",
            Self::Changed => "changed",
            Self::Departed => "departed",
            Self::Broken => "broken",
        }
    }

    /// Joined and changed notifications carry new peer settings.
    #[must_use]
    pub fn is_negotiation(self) -> bool {
        matches!(self, Self::Joined | Self::Changed)
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "joined" => Ok(Self::Joined),
            "changed" => Ok(Self::Changed),
            "departed" => Ok(Self::Departed),
            "broken" => Ok(Self::Broken),
            other => Err(format!("unknown relation hook: {other}")),
        }
    }
}

/// One inbound relation notification for a remote unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationEvent {
    pub kind: HookKind,
    /// Remote unit name, e.g. `wordpress/0`.
    pub remote_unit: String,
}

impl RelationEvent {
    pub fn new(kind: HookKind, remote_unit: impl Into<String>) -> Self {
        Self {
            kind,
            remote_unit: remote_unit.into(),
        }
    }

    /// Service owning the remote unit; all units of a service share one
    /// conversation.
    #[must_use]
    pub fn service(&self) -> &str {
        let unit = self.remote_unit.trim();
        unit.split_once('/').map_or(unit, |(service, _)| service)
    }
}

/// Flags raised by one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub service: String,
    pub raised: Vec<RequestFlag>,
}

impl<S: ConversationStore> PgsqlProvides<S> {
    /// Handles a joined or changed notification: raises the database and
    /// roles flags for the sending service when its request differs from what
    /// was last acknowledged.
    pub fn joined_changed(&mut self, event: &RelationEvent) -> Result<Evaluation, StoreError> {
        self.evaluate(event.service())
    }

    /// Diffs the current request of `service` against its acknowledged
    /// baseline. Flags are only ever raised here; clearing belongs to
    /// `provide_database` and `ack_roles`.
    pub fn evaluate(&mut self, service: &str) -> Result<Evaluation, StoreError> {
        let database_flag = self.flag_name(RequestFlag::Database);
        let roles_flag = self.flag_name(RequestFlag::Roles);
        let conversation = self.store_mut().conversation(service)?;

        let mut raised = Vec::new();

        let requested_database = requested_database_of(conversation);
        if previous_database_of(conversation) != Some(requested_database) {
            raised.push(RequestFlag::Database);
        }

        let requested_roles = requested_roles_of(conversation);
        if previous_roles_of(conversation).as_ref() != Some(&requested_roles) {
            raised.push(RequestFlag::Roles);
        }

        for flag in &raised {
            match flag {
                RequestFlag::Database => conversation.set_state(database_flag.as_str()),
                RequestFlag::Roles => conversation.set_state(roles_flag.as_str()),
            }
        }

        let service = conversation.scope().to_string();
        if !raised.is_empty() {
            self.store_mut().flush()?;
        }

        debug!(
            relation = %self.relation_name(),
            service = %service,
            ?raised,
            "evaluated request"
        );
        Ok(Evaluation { service, raised })
    }
}

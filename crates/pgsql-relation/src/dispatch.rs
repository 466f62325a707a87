//! Explicit flag-gated dispatch: evaluate the inbound event, then hand every
//! pending request to the provider's handler and acknowledge the answer.

use tracing::{debug, info};

use crate::evaluate::{HookKind, RelationEvent};
use crate::flags::RequestFlag;
use crate::provider::{DatabaseGrant, PgsqlProvides, ProvisionOutcome};
use crate::store::{ConversationStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("internal: {0}")]
    Internal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("handler failed for service {service}: {source}")]
    Handler {
        service: String,
        #[source]
        source: HandlerError,
    },
}

/// A pending database request as seen by the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRequest {
    pub service: String,
    /// Empty when the service wants a generated name.
    pub requested_database: String,
    pub previous_database: Option<String>,
    /// Complete answer already in the remote view, if any.
    pub published: Option<DatabaseGrant>,
}

/// Provider-side code that actually creates databases and roles.
pub trait ProvisioningHandler {
    fn grant_database(&mut self, request: &DatabaseRequest) -> Result<DatabaseGrant, HandlerError>;

    /// Returns the roles actually granted; they become the acknowledged
    /// baseline verbatim.
    fn grant_roles(
        &mut self,
        service: &str,
        requested: &[String],
    ) -> Result<Vec<String>, HandlerError>;
}

/// What one dispatch did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub service: String,
    pub raised: Vec<RequestFlag>,
    pub provided: Vec<String>,
    pub acknowledged: Vec<String>,
    pub removed: bool,
}

#[derive(Debug)]
pub struct Dispatcher<H> {
    handler: H,
}

impl<H: ProvisioningHandler> Dispatcher<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Processes one relation event to completion. A handler failure aborts
    /// the dispatch and leaves the failing request pending.
    pub fn handle<S: ConversationStore>(
        &mut self,
        provides: &mut PgsqlProvides<S>,
        event: &RelationEvent,
    ) -> Result<DispatchReport, DispatchError> {
        let mut report = DispatchReport {
            service: event.service().to_string(),
            ..DispatchReport::default()
        };

        match event.kind {
            HookKind::Joined | HookKind::Changed => {
                let evaluation = provides.joined_changed(event)?;
                report.raised = evaluation.raised;
            }
            HookKind::Departed => {
                debug!(unit = %event.remote_unit, "remote unit departed");
            }
            HookKind::Broken => {
                report.removed = provides.forget(event.service())?;
            }
        }

        self.serve_pending(provides, &mut report)?;
        Ok(report)
    }

    /// Serves every pending request across all services.
    pub fn serve_pending<S: ConversationStore>(
        &mut self,
        provides: &mut PgsqlProvides<S>,
        report: &mut DispatchReport,
    ) -> Result<(), DispatchError> {
        for service in provides.pending(RequestFlag::Database) {
            let request = DatabaseRequest {
                requested_database: provides.requested_database(&service).to_string(),
                previous_database: provides.previous_database(&service).map(str::to_string),
                published: provides
                    .store()
                    .find(&service)
                    .and_then(DatabaseGrant::from_remote),
                service,
            };
            let grant = self
                .handler
                .grant_database(&request)
                .map_err(|source| DispatchError::Handler {
                    service: request.service.clone(),
                    source,
                })?;
            if provides.provide_database(&request.service, &grant)? == ProvisionOutcome::Applied {
                report.provided.push(request.service);
            }
        }

        for service in provides.pending(RequestFlag::Roles) {
            let requested = provides.requested_roles(&service);
            let granted = self
                .handler
                .grant_roles(&service, &requested)
                .map_err(|source| DispatchError::Handler {
                    service: service.clone(),
                    source,
                })?;
            if provides.ack_roles(&service, &granted)? == ProvisionOutcome::Applied {
                report.acknowledged.push(service);
            }
        }

        if !report.provided.is_empty() || !report.acknowledged.is_empty() {
            info!(
                provided = ?report.provided,
                acknowledged = ?report.acknowledged,
                "pending requests served"
            );
        }
        Ok(())
    }
}

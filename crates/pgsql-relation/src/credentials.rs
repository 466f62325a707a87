use crate::dispatch::{DatabaseRequest, HandlerError, ProvisioningHandler};
use crate::provider::DatabaseGrant;

const PASSWORD_BYTES: usize = 16;
const MAX_IDENTIFIER_LEN: usize = 63;

/// Handler that answers requests with generated names and random passwords.
///
/// A request naming the database already answered in the remote view (or
/// naming none) gets that answer's credentials back instead of fresh ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCredentials {
    pub host: String,
    pub port: u16,
    pub state: String,
}

impl GeneratedCredentials {
    pub fn new(host: impl Into<String>, port: u16, state: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            state: state.into(),
        }
    }
}

impl ProvisioningHandler for GeneratedCredentials {
    fn grant_database(&mut self, request: &DatabaseRequest) -> Result<DatabaseGrant, HandlerError> {
        if let Some(published) = &request.published
            && (request.requested_database.is_empty()
                || request.requested_database == published.database)
        {
            return Ok(DatabaseGrant {
                host: self.host.clone(),
                port: self.port,
                state: self.state.clone(),
                ..published.clone()
            });
        }

        let service = sanitize_identifier(request.service.as_str());
        if service.is_empty() {
            return Err(HandlerError::Rejected(format!(
                "service name {:?} has no usable characters",
                request.service
            )));
        }
        let database = if request.requested_database.is_empty() {
            service.clone()
        } else {
            request.requested_database.clone()
        };
        let user = truncate_identifier(format!("juju_{service}"));
        let schema_user = truncate_identifier(format!("{user}_schema"));

        Ok(DatabaseGrant {
            host: self.host.clone(),
            port: self.port,
            database,
            user,
            password: generate_password(),
            schema_user,
            schema_password: generate_password(),
            state: self.state.clone(),
        })
    }

    fn grant_roles(
        &mut self,
        _service: &str,
        requested: &[String],
    ) -> Result<Vec<String>, HandlerError> {
        Ok(requested.to_vec())
    }
}

/// Lowercases `raw` and maps anything outside `[a-z0-9_]` to `_`, prefixing
/// names that would otherwise start with a digit.
#[must_use]
pub fn sanitize_identifier(raw: &str) -> String {
    let mut identifier = raw
        .trim()
        .chars()
        .map(|ch| {
            let ch = ch.to_ascii_lowercase();
            if ch.is_ascii_alphanumeric() { ch } else { '_' }
        })
        .collect::<String>();
    if identifier.chars().all(|ch| ch == '_') {
        return String::new();
    }
    if identifier.starts_with(|ch: char| ch.is_ascii_digit()) {
        identifier.insert_str(0, "db_");
    }
    truncate_identifier(identifier)
}

// Postgres silently truncates identifiers past 63 bytes.
fn truncate_identifier(mut identifier: String) -> String {
    identifier.truncate(MAX_IDENTIFIER_LEN);
    identifier
}

fn generate_password() -> String {
    hex::encode(rand::random::<[u8; PASSWORD_BYTES]>())
}

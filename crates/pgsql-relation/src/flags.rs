/// Relation name used when the embedding charm does not configure one.
pub const DEFAULT_RELATION_NAME: &str = "db";

/// Pending-request flags raised by the evaluator and cleared on acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestFlag {
    Database,
    Roles,
}

impl RequestFlag {
    pub const ALL: [Self; 2] = [Self::Database, Self::Roles];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database.requested",
            Self::Roles => "roles.requested",
        }
    }

    /// Full state name, scoped by relation, e.g. `db.database.requested`.
    #[must_use]
    pub fn state_name(self, relation_name: &str) -> String {
        format!("{relation_name}.{}", self.as_str())
    }
}

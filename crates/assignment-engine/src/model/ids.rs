//! Strongly-typed identifiers for tenants, agents and tickets

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Borrow the raw identifier
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Tenant identifier. Every other entity is scoped by one.
    TenantId
);

string_id!(
    /// Agent identifier
    AgentId
);

string_id!(
    /// Ticket identifier
    TicketId
);

impl TicketId {
    /// Generate a fresh random ticket id
    pub fn new() -> Self {
        TicketId(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = AgentId::from("agent-001");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"agent-001\"");
        assert_eq!(id.to_string(), "agent-001");
        assert_eq!(id.as_str(), "agent-001");
    }

    #[test]
    fn test_generated_ticket_ids_are_unique() {
        assert_ne!(TicketId::new(), TicketId::new());
    }
}

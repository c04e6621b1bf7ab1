//! Identifiers used across the orchestration engine and approval workflow

use crate::{TypesError, TypesResult};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Build an identifier, rejecting empty or whitespace-only input
            pub fn parse(id: impl Into<String>) -> TypesResult<Self> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(TypesError::InvalidIdentifier(format!(
                        "{} must not be empty",
                        stringify!($name)
                    )));
                }
                Ok(Self(id))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Unique identifier of a registered service
    ServiceId
);

string_id!(
    /// Identifier of one orchestration run
    SessionId
);

string_id!(
    /// Identifier of a course; keys the approval workflow
    CourseId
);

string_id!(
    /// Identifier of the faculty member owning a course workflow
    FacultyId
);

string_id!(
    /// Identifier of a learner requesting a personalized learning tree
    LearnerId
);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_blank() {
        assert!(CourseId::parse("  ").is_err());
        assert_eq!(CourseId::parse("C1").unwrap(), CourseId::new("C1"));
    }

    #[test]
    fn test_session_short() {
        let id = SessionId::new("abc");
        assert_eq!(id.short(), "abc");
        let generated = SessionId::generate();
        assert_eq!(generated.short().len(), 8);
    }

    #[test]
    fn test_transparent_serde() {
        let id = ServiceId::new("content.chunker");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"content.chunker\"");
    }
}

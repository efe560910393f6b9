use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// One entry in the conversation log.
///
/// The `id` is fixed at creation. While a generation streams into an
/// assistant turn its `content` only grows; the sole wholesale replacement
/// is the error annotation written when a stream fails. The serialized
/// shape (`id`, `role`, `content`, `collapsed`, `timestamp`) is also the
/// export record format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            collapsed: false,
            created_at: Utc::now(),
        }
    }

    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, Role::User, content)
    }

    /// Empty assistant turn created as the target of a new generation.
    pub fn assistant_placeholder(id: impl Into<String>) -> Self {
        Self::new(id, Role::Assistant, "")
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_assistant(&self) -> bool {
        self.role.is_assistant()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn turn_export_record_shape() {
        let turn = Turn::user("aa", "hello");
        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(value["id"], "aa");
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"], "hello");
        assert_eq!(value["collapsed"], false);
        assert!(value.get("timestamp").is_some());
        assert!(value.get("created_at").is_none());
    }

    #[test]
    fn assistant_placeholder_starts_empty() {
        let turn = Turn::assistant_placeholder("ab");
        assert!(turn.is_assistant());
        assert!(turn.content.is_empty());
        assert!(!turn.collapsed);
    }
}

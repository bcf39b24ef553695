use serde::{Deserialize, Serialize};

/// Who performed a change-log-producing operation.
///
/// Mirrors the `actor` shape on a change-log entry: a write is always
/// attributed to a user, an action invocation, or the system itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Actor {
    #[serde(rename = "type")]
    pub kind: ActorKind,
    pub user_id: Option<String>,
    pub invocation_id: Option<String>,
    pub action_definition_id: Option<String>,
    pub on_behalf_of_user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "UPPERCASE")]
pub enum ActorKind {
    User,
    Action,
    System,
}

impl Actor {
    #[must_use]
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            kind: ActorKind::User,
            user_id: Some(user_id.into()),
            invocation_id: None,
            action_definition_id: None,
            on_behalf_of_user_id: None,
        }
    }

    #[must_use]
    pub fn action(
        invocation_id: impl Into<String>,
        action_definition_id: impl Into<String>,
        on_behalf_of_user_id: Option<String>,
    ) -> Self {
        Self {
            kind: ActorKind::Action,
            user_id: None,
            invocation_id: Some(invocation_id.into()),
            action_definition_id: Some(action_definition_id.into()),
            on_behalf_of_user_id,
        }
    }

    #[must_use]
    pub fn system() -> Self {
        Self {
            kind: ActorKind::System,
            user_id: None,
            invocation_id: None,
            action_definition_id: None,
            on_behalf_of_user_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_actor_carries_user_id() {
        let a = Actor::user("u-1");
        assert_eq!(a.kind, ActorKind::User);
        assert_eq!(a.user_id.as_deref(), Some("u-1"));
    }

    #[test]
    fn system_actor_has_no_identifiers() {
        let a = Actor::system();
        assert_eq!(a.kind, ActorKind::System);
        assert!(a.user_id.is_none());
    }

    #[test]
    fn serde_field_names_match_spec() {
        let a = Actor::user("u-1");
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["type"], "USER");
    }
}

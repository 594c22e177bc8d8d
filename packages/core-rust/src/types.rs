use serde::{Deserialize, Serialize};

/// Identity of an authenticated user, as loaded from the principal store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    /// Unique identifier of the user.
    pub user_id: String,
    /// Identifier of the principal (login method) that authenticated the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<String>,
    /// Roles assigned to this user for authorization checks.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Disabled users keep valid credentials but must be refused service.
    #[serde(default)]
    pub disabled: bool,
    /// Optional operator-supplied explanation shown to disabled users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_message: Option<String>,
}

impl AuthInfo {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            principal_id: None,
            roles: Vec::new(),
            disabled: false,
            disabled_message: None,
        }
    }

    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn disabled(mut self, message: Option<String>) -> Self {
        self.disabled = true;
        self.disabled_message = message;
        self
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

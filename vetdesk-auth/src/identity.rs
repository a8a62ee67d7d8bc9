//! User Identity and Role Resolution
//!
//! The backend reports roles through more than one field. [`resolve_role`]
//! is the single place that turns those raw fields into a [`Role`].

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Console role classification
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Pet owner using the client area
    #[default]
    Client,
    /// Veterinary practitioner
    Practitioner,
    /// Practitioner with the paid practice-management tier
    PractitionerPro,
    /// Back-office administrator
    Admin,
}

impl Role {
    /// Whether holding `self` passes a check that requires `required`.
    ///
    /// `PractitionerPro` passes every `Practitioner` check.
    pub fn satisfies(&self, required: Role) -> bool {
        *self == required || (*self == Role::PractitionerPro && required == Role::Practitioner)
    }

    /// Whether `self` passes a check against any of `required`
    pub fn satisfies_any(&self, required: &[Role]) -> bool {
        required.iter().any(|role| self.satisfies(*role))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Practitioner => write!(f, "practitioner"),
            Role::PractitionerPro => write!(f, "practitioner_pro"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "practitioner" => Ok(Role::Practitioner),
            "practitioner_pro" => Ok(Role::PractitionerPro),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// User id as sent by the backend, which uses both numeric and string ids
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdentityId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityId::Number(id) => write!(f, "{}", id),
            IdentityId::Text(id) => write!(f, "{}", id),
        }
    }
}

/// Identity of the signed-in user, as returned by `/auth/me` and login
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<IdentityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Preferred role field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    /// Fallback role field used by older backend versions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Remaining profile fields, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Identity {
    pub fn new(id: impl Into<IdentityId>, name: Option<String>, user_type: Option<String>) -> Self {
        Self {
            id: Some(id.into()),
            name,
            user_type,
            role: None,
            extra: serde_json::Map::new(),
        }
    }

    /// A present id; empty string ids count as absent
    pub fn has_id(&self) -> bool {
        match &self.id {
            Some(IdentityId::Number(_)) => true,
            Some(IdentityId::Text(id)) => !id.trim().is_empty(),
            None => false,
        }
    }

    pub fn user_id(&self) -> Option<String> {
        self.has_id()
            .then(|| self.id.as_ref().map(|id| id.to_string()))
            .flatten()
    }

    /// Resolved role, see [`resolve_role`]
    pub fn resolved_role(&self) -> Role {
        resolve_role(self)
    }

    /// Get user display string
    pub fn display_string(&self) -> String {
        let role = self.resolved_role();
        match (&self.name, self.user_id()) {
            (Some(name), _) => format!("{} ({})", name, role),
            (None, Some(id)) => format!("{} ({})", id, role),
            (None, None) => format!("unknown ({})", role),
        }
    }
}

impl From<i64> for IdentityId {
    fn from(id: i64) -> Self {
        IdentityId::Number(id)
    }
}

impl From<&str> for IdentityId {
    fn from(id: &str) -> Self {
        IdentityId::Text(id.to_string())
    }
}

impl From<String> for IdentityId {
    fn from(id: String) -> Self {
        IdentityId::Text(id)
    }
}

/// Resolve the canonical role of an identity.
///
/// Precedence: `user_type`, then `role`, then [`Role::default`]. The first
/// field that is present and non-blank decides; a value that names no known
/// role resolves to the default role rather than falling through.
pub fn resolve_role(identity: &Identity) -> Role {
    let raw = [identity.user_type.as_deref(), identity.role.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|raw| !raw.is_empty());

    match raw {
        Some(raw) => raw.parse().unwrap_or_else(|e: String| {
            warn!(error = %e, "Unrecognised role, using default");
            Role::default()
        }),
        None => Role::default(),
    }
}

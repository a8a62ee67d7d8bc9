//! Route Guard
//!
//! Decides, per navigation, whether a destination is reachable. [`decide`] is
//! pure; [`RouteGuard`] only adds a fresh session read and the route lookup.
//!
//! Rules, first match wins:
//!
//! 1. signed in, public route: redirect to the role landing page
//! 2. signed out, protected or role-restricted route: redirect to login
//! 3. signed in, role-restricted route, role not allowed: access denied,
//!    except that an admin heading to the dashboard lands in the admin area
//! 4. everything else is allowed

use crate::identity::Role;
use crate::routes::{normalize_path, RouteClass, RouteMeta, RouteTable};
use crate::session::{Session, SessionStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use vetdesk_core::RoutesConfig;


/// Well-known destinations the guard redirects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardPaths {
    pub login: String,
    pub dashboard: String,
    pub admin: String,
    pub access_denied: String,
}

impl From<&RoutesConfig> for GuardPaths {
    fn from(config: &RoutesConfig) -> Self {
        Self {
            login: normalize_path(&config.login_path).to_string(),
            dashboard: normalize_path(&config.dashboard_path).to_string(),
            admin: normalize_path(&config.admin_path).to_string(),
            access_denied: normalize_path(&config.access_denied_path).to_string(),
        }
    }
}

impl Default for GuardPaths {
    fn default() -> Self {
        Self::from(&RoutesConfig::default())
    }
}

impl GuardPaths {
    /// Where a signed-in user of `role` starts
    pub fn landing_for(&self, role: Role) -> &str {
        match role {
            Role::Admin => &self.admin,
            _ => &self.dashboard,
        }
    }
}

/// Details shown on the access-denied view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDenied {
    pub required_roles: Vec<Role>,
    pub current_role: Role,
    pub attempted_path: String,
}

/// Outcome of a navigation check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum NavigationDecision {
    Allow,
    /// No session; `return_to` is the path to resume after login
    RedirectToLogin { path: String, return_to: String },
    /// Signed-in user sent to their role's landing area
    RedirectToLanding { path: String },
    AccessDenied { path: String, denial: AccessDenied },
}

impl NavigationDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, NavigationDecision::Allow)
    }

    /// Redirect target, `None` when navigation proceeds
    pub fn redirect_target(&self) -> Option<&str> {
        match self {
            NavigationDecision::Allow => None,
            NavigationDecision::RedirectToLogin { path, .. }
            | NavigationDecision::RedirectToLanding { path }
            | NavigationDecision::AccessDenied { path, .. } => Some(path),
        }
    }
}

/// Decide a navigation to `attempted_path`, declared by `route`, given `session`.
pub fn decide(
    session: Option<&Session>,
    route: &RouteMeta,
    attempted_path: &str,
    paths: &GuardPaths,
) -> NavigationDecision {
    let attempted_path = normalize_path(attempted_path);
    let session = session.filter(|session| session.is_authenticated());

    match (session, route.class()) {
        (Some(session), RouteClass::Public) => NavigationDecision::RedirectToLanding {
            path: paths.landing_for(session.role()).to_string(),
        },
        (None, RouteClass::Protected | RouteClass::RoleRestricted) => {
            NavigationDecision::RedirectToLogin {
                path: paths.login.clone(),
                return_to: attempted_path.to_string(),
            }
        }
        (Some(session), RouteClass::RoleRestricted) => {
            let role = session.role();
            let required = route.required_roles();

            if role.satisfies_any(required) {
                NavigationDecision::Allow
            } else if role == Role::Admin && attempted_path == paths.dashboard {
                NavigationDecision::RedirectToLanding {
                    path: paths.admin.clone(),
                }
            } else {
                NavigationDecision::AccessDenied {
                    path: paths.access_denied.clone(),
                    denial: AccessDenied {
                        required_roles: required.to_vec(),
                        current_role: role,
                        attempted_path: attempted_path.to_string(),
                    },
                }
            }
        }
        (Some(_), RouteClass::Protected) | (None, RouteClass::Public) => {
            NavigationDecision::Allow
        }
    }
}

/// Navigation guard bound to the session store and route table
pub struct RouteGuard {
    store: Arc<SessionStore>,
    table: RouteTable,
    paths: GuardPaths,
}

impl RouteGuard {
    pub fn new(store: Arc<SessionStore>, table: RouteTable, paths: GuardPaths) -> Self {
        Self {
            store,
            table,
            paths,
        }
    }

    /// Check a navigation. The session is read anew on every call.
    pub fn check(&self, path: &str) -> NavigationDecision {
        let session = self.store.get();
        let route = self.table.lookup(path);
        let decision = decide(session.as_ref(), &route, path, &self.paths);

        debug!(
            path,
            route = %route.path,
            class = ?route.class(),
            authenticated = session.is_some(),
            ?decision,
            "Navigation checked"
        );

        decision
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }
}

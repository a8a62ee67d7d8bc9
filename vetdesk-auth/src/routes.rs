//! Route metadata and lookup

use crate::identity::Role;
use serde::Serialize;
use vetdesk_core::{config_error, RoutesConfig, VetdeskResult};

/// How a route is gated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteClass {
    /// Only meaningful without a session (login, register)
    Public,
    /// Any authenticated session
    Protected,
    /// Authenticated and holding one of the declared roles
    RoleRestricted,
}

/// Declared metadata of one route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteMeta {
    pub path: String,
    pub public: bool,
    pub roles: Option<Vec<Role>>,
}

impl RouteMeta {
    pub fn public(path: &str) -> Self {
        Self {
            path: path.to_string(),
            public: true,
            roles: None,
        }
    }

    pub fn protected(path: &str) -> Self {
        Self {
            path: path.to_string(),
            public: false,
            roles: None,
        }
    }

    pub fn restricted(path: &str, roles: &[Role]) -> Self {
        Self {
            path: path.to_string(),
            public: false,
            roles: Some(roles.to_vec()),
        }
    }

    /// `public` wins; an empty role list carries no constraint
    pub fn class(&self) -> RouteClass {
        if self.public {
            return RouteClass::Public;
        }

        match &self.roles {
            Some(roles) if !roles.is_empty() => RouteClass::RoleRestricted,
            _ => RouteClass::Protected,
        }
    }

    pub fn required_roles(&self) -> &[Role] {
        self.roles.as_deref().unwrap_or_default()
    }
}

/// All known routes of the console
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<RouteMeta>,
}

impl RouteTable {
    pub fn new(routes: Vec<RouteMeta>) -> Self {
        let mut table = Self { routes: Vec::new() };
        for route in routes {
            table.insert(route);
        }
        table
    }

    /// Built-in console routes plus the entries declared in configuration
    pub fn from_config(config: &RoutesConfig) -> VetdeskResult<Self> {
        use Role::*;

        let mut table = Self::new(vec![
            RouteMeta::public(&config.login_path),
            RouteMeta::public("/register"),
            RouteMeta::public("/forgot-password"),
            RouteMeta::public("/reset-password"),
            // Admins have their own landing area, see the guard's dashboard carve-out
            RouteMeta::restricted(&config.dashboard_path, &[Client, Practitioner]),
            RouteMeta::restricted(&config.admin_path, &[Admin]),
            RouteMeta::protected(&config.access_denied_path),
            RouteMeta::protected("/profile"),
            RouteMeta::protected("/messages"),
            RouteMeta::protected("/animals"),
            RouteMeta::protected("/appointments"),
            RouteMeta::restricted("/consultations", &[Practitioner, Admin]),
            RouteMeta::restricted("/stock", &[Practitioner, Admin]),
            RouteMeta::restricted("/accounting", &[PractitionerPro, Admin]),
        ]);

        for entry in &config.entries {
            let roles = entry
                .roles
                .as_ref()
                .map(|names| {
                    names
                        .iter()
                        .map(|name| {
                            name.parse::<Role>()
                                .map_err(|e| config_error!(e, "route_table"))
                        })
                        .collect::<VetdeskResult<Vec<Role>>>()
                })
                .transpose()?;

            table.insert(RouteMeta {
                path: normalize_path(&entry.path).to_string(),
                public: entry.public,
                roles,
            });
        }

        Ok(table)
    }

    /// Add a route, replacing any route with the same path
    pub fn insert(&mut self, mut route: RouteMeta) {
        route.path = normalize_path(&route.path).to_string();
        self.routes.retain(|existing| existing.path != route.path);
        self.routes.push(route);
    }

    /// Metadata for `path`: exact match, else the longest prefix ending on a
    /// segment boundary, else an auth-only route for that path.
    pub fn lookup(&self, path: &str) -> RouteMeta {
        let path = normalize_path(path);

        if let Some(route) = self.routes.iter().find(|route| route.path == path) {
            return route.clone();
        }

        self.routes
            .iter()
            .filter(|route| {
                route.path == "/"
                    || path
                        .strip_prefix(route.path.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .max_by_key(|route| route.path.len())
            .cloned()
            .unwrap_or_else(|| RouteMeta::protected(path))
    }

    pub fn routes(&self) -> &[RouteMeta] {
        &self.routes
    }
}

/// Strip query, fragment and trailing slashes
pub fn normalize_path(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

//! Vetdesk Auth - sessions, roles and route authorization
//!
//! - [`session`]: the persisted session record and the store that owns it
//! - [`identity`]: user identity and role resolution
//! - [`routes`]: route metadata and lookup
//! - [`guard`]: the per-navigation authorization decision

pub mod guard;
pub mod identity;
pub mod routes;
pub mod session;

pub use guard::{decide, AccessDenied, GuardPaths, NavigationDecision, RouteGuard};
pub use identity::{resolve_role, Identity, IdentityId, Role};
pub use routes::{RouteClass, RouteMeta, RouteTable};
pub use session::{
    FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, MigrationOutcome, Session,
    SessionStore,
};

//! Authentication: access keys, credential strategies, and the per-tenant
//! resolver factory.

pub mod access_key;
pub mod bearer;
pub mod principal;
pub mod resolver;
pub mod session;

pub use access_key::{detect_access_key, API_KEY_HEADER};
pub use bearer::JwtBearerAuthenticator;
pub use principal::{load_principal_file, InMemoryPrincipalStore, PrincipalRecord};
pub use resolver::{
    AnonymousAuthenticator, AuthContextResolver, AuthContextResolverFactory, Authenticator,
    DefaultResolverFactory, StrategyResolver,
};
pub use session::{
    load_session_file, spawn_session_purger, InMemorySessionStore, Session,
    SessionCookieAuthenticator, SessionRecord,
};

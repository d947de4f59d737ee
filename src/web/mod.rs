use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::Key;

pub mod api_service;
pub mod graphql_schema;
pub mod graphql_service;
pub mod site_map_service;

pub const SESSION_COOKIE: &str = "auth-cookie";

/// Signed cookie session holding the identity and the entry workflow state.
pub fn session_middleware(secret_key: &str, domain: Option<&str>) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), Key::derive_from(secret_key.as_bytes()))
        .cookie_name(SESSION_COOKIE.to_string())
        .cookie_secure(false)
        .cookie_domain(domain.map(str::to_string))
        .build()
}

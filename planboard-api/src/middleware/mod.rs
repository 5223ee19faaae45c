/// Middleware modules for the API server
///
/// - [`auth`]: Bearer token validation, attaches [`AuthContext`](planboard_shared::auth::context::AuthContext)
/// - [`rate_limit`]: Per-user and per-IP token buckets
/// - [`security`]: Security response headers

pub mod auth;
pub mod rate_limit;
pub mod security;

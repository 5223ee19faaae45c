/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and strength checks
/// - [`jwt`]: Access/refresh token issuance and validation
/// - [`context`]: The authenticated caller attached to each request
/// - [`authorization`]: Role rules and role-scoped project visibility
///
/// # Roles
///
/// | Role | Sees | Manages |
/// |------|------|---------|
/// | ADMIN | every project | everything, users included |
/// | MAINTAINER | projects they own | their own projects |
/// | MEMBER | projects they belong to | tasks in those projects |

pub mod authorization;
pub mod context;
pub mod jwt;
pub mod password;

/// Role-based visibility and permission checks
///
/// # Visibility
///
/// Which projects a caller can see depends only on their role:
///
/// | Role       | Visible projects                 |
/// |------------|----------------------------------|
/// | ADMIN      | every non-deleted project        |
/// | MAINTAINER | projects they own                |
/// | MEMBER     | projects they are a member of    |
///
/// [`ProjectScope`] turns that rule into a SQL predicate so every query that
/// touches projects, tasks, columns or activity filters the same way. A
/// project outside the caller's scope is reported as not found.
///
/// # Example
///
/// ```
/// use planboard_shared::auth::authorization::ProjectScope;
/// use planboard_shared::auth::context::AuthContext;
/// use planboard_shared::models::user::UserRole;
/// use sqlx::{Postgres, QueryBuilder};
/// use uuid::Uuid;
///
/// let auth = AuthContext::new(Uuid::new_v4(), UserRole::Maintainer);
/// let mut qb = QueryBuilder::<Postgres>::new("SELECT p.id FROM projects p WHERE p.deleted_at IS NULL");
/// ProjectScope::for_user(&auth).push_condition(&mut qb, "p");
///
/// assert!(qb.sql().contains("p.owner_id = $1"));
/// ```

use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::context::AuthContext;
use crate::models::user::UserRole;

/// Error type for authorization checks
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    /// Caller's role is too low for the operation
    #[error("Requires {required} role")]
    InsufficientRole { required: &'static str },

    /// Caller is neither an admin nor the project owner
    #[error("Only the project owner or an admin can do this")]
    NotProjectManager,

    /// Admin tried to change or delete their own account
    #[error("{0}")]
    SelfModification(&'static str),
}

/// Set of projects visible to a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectScope {
    All,
    Owned(Uuid),
    Member(Uuid),
}

impl ProjectScope {
    pub fn for_user(auth: &AuthContext) -> Self {
        match auth.role {
            UserRole::Admin => ProjectScope::All,
            UserRole::Maintainer => ProjectScope::Owned(auth.user_id),
            UserRole::Member => ProjectScope::Member(auth.user_id),
        }
    }

    /// Appends ` AND <visibility predicate>` for the projects table aliased `alias`
    pub fn push_condition(&self, qb: &mut QueryBuilder<'_, Postgres>, alias: &str) {
        match self {
            ProjectScope::All => {}
            ProjectScope::Owned(user_id) => {
                qb.push(format!(" AND {}.owner_id = ", alias));
                qb.push_bind(*user_id);
            }
            ProjectScope::Member(user_id) => {
                qb.push(format!(
                    " AND EXISTS (SELECT 1 FROM project_members pm WHERE pm.project_id = {}.id AND pm.user_id = ",
                    alias
                ));
                qb.push_bind(*user_id);
                qb.push(")");
            }
        }
    }
}

/// Requires the ADMIN role
pub fn require_admin(auth: &AuthContext) -> Result<(), AuthzError> {
    if auth.is_admin() {
        Ok(())
    } else {
        Err(AuthzError::InsufficientRole { required: "ADMIN" })
    }
}

/// Requires a role that may create projects (ADMIN or MAINTAINER)
pub fn require_project_creator(auth: &AuthContext) -> Result<(), AuthzError> {
    match auth.role {
        UserRole::Admin | UserRole::Maintainer => Ok(()),
        UserRole::Member => Err(AuthzError::InsufficientRole {
            required: "MAINTAINER",
        }),
    }
}

/// Requires ADMIN or ownership of the project owned by `owner_id`
///
/// Used for project updates, deletion, membership and column management.
pub fn require_project_manager(auth: &AuthContext, owner_id: Uuid) -> Result<(), AuthzError> {
    if auth.is_admin() || auth.user_id == owner_id {
        Ok(())
    } else {
        Err(AuthzError::NotProjectManager)
    }
}

/// Rejects admin operations that target the caller's own account
pub fn forbid_self(auth: &AuthContext, target: Uuid, message: &'static str) -> Result<(), AuthzError> {
    if auth.user_id == target {
        Err(AuthzError::SelfModification(message))
    } else {
        Ok(())
    }
}

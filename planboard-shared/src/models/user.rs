/// User model and database operations
///
/// Users are never hard-deleted. Deleting a user sets `deleted_at`; every
/// read in this module filters those rows out, so a deleted user can no
/// longer log in and their email may be registered again.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email VARCHAR(255) NOT NULL,
///     password_hash VARCHAR(255) NOT NULL,
///     name VARCHAR(100) NOT NULL,
///     role user_role NOT NULL DEFAULT 'MEMBER',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_login_at TIMESTAMPTZ,
///     deleted_at TIMESTAMPTZ
/// );
/// CREATE UNIQUE INDEX users_email_active_key ON users (lower(email)) WHERE deleted_at IS NULL;
/// ```
///
/// # Example
///
/// ```no_run
/// use planboard_shared::models::user::User;
/// # use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// if let Some(user) = User::find_active_by_email(&pool, "Ada@Example.com").await? {
///     println!("{} is {}", user.email, user.role.as_str());
/// }
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::pagination::PageRequest;

const USER_COLUMNS: &str =
    "id, email, password_hash, name, role, created_at, updated_at, last_login_at";

/// Advisory lock key serializing registrations so exactly one user bootstraps as ADMIN
const REGISTRATION_LOCK_KEY: i64 = 0x706c_616e_626f_6172;

/// Role hierarchy controlling project visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    Admin,
    Maintainer,
    Member,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::Maintainer => "MAINTAINER",
            UserRole::Member => "MEMBER",
        }
    }

    /// Whether users with this role may own projects
    pub fn can_own_projects(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Maintainer)
    }
}

/// A live (non-deleted) user account
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,

    /// Argon2id PHC string, never sent to clients
    pub password_hash: String,

    pub name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Public view of a user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
            last_login_at: user.last_login_at,
        }
    }
}

/// Input for creating a user
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,

    /// Already hashed, see [`crate::auth::password::hash_password`]
    pub password_hash: String,

    pub name: String,
    pub role: UserRole,
}

/// Profile changes a user may make to their own account
#[derive(Debug, Clone, Default)]
pub struct UpdateProfile {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UpdateProfile {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }
}

/// Filters for the admin user listing
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Case-insensitive match on email or name
    pub search: Option<String>,
    pub role: Option<UserRole>,
}

impl UserFilter {
    fn push_conditions(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", escape_like(search));
            qb.push(" AND (email ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR name ILIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }

        if let Some(role) = self.role {
            qb.push(" AND role = ");
            qb.push_bind(role);
        }
    }
}

/// Escapes `%`, `_` and `\` for use inside an ILIKE pattern
pub(crate) fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl User {
    /// Inserts a user
    ///
    /// # Errors
    ///
    /// A unique violation on `users_email_active_key` when a live account
    /// already uses the email.
    pub async fn create<'e, E>(executor: E, data: CreateUser) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, name, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(data.email.trim())
        .bind(data.password_hash)
        .bind(data.name.trim())
        .bind(data.role)
        .fetch_one(executor)
        .await?;

        Ok(user)
    }

    /// Role for the next registration: ADMIN when no account has ever existed
    ///
    /// Takes a transaction-scoped advisory lock, so call it inside the
    /// registration transaction before [`User::create`].
    pub async fn registration_role(conn: &mut sqlx::PgConnection) -> Result<UserRole, sqlx::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(REGISTRATION_LOCK_KEY)
            .execute(&mut *conn)
            .await?;

        let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM users)")
            .fetch_one(&mut *conn)
            .await?;

        Ok(if exists { UserRole::Member } else { UserRole::Admin })
    }

    pub async fn find_active_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Finds a live user by email, ignoring case
    pub async fn find_active_by_email<'e, E>(
        executor: E,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1) AND deleted_at IS NULL"
        ))
        .bind(email.trim())
        .fetch_optional(executor)
        .await
    }

    /// Applies profile changes, returning `None` if the user is gone
    pub async fn update_profile<'e, E>(
        executor: E,
        id: Uuid,
        data: UpdateProfile,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET updated_at = NOW()");

        if let Some(name) = data.name {
            qb.push(", name = ");
            qb.push_bind(name.trim().to_string());
        }
        if let Some(email) = data.email {
            qb.push(", email = ");
            qb.push_bind(email.trim().to_string());
        }

        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(" AND deleted_at IS NULL RETURNING ");
        qb.push(USER_COLUMNS);

        qb.build_query_as::<User>().fetch_optional(executor).await
    }

    pub async fn update_password<'e, E>(
        executor: E,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn update_last_login<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_role<'e, E>(
        executor: E,
        id: Uuid,
        role: UserRole,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET role = $2, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(role)
        .fetch_optional(executor)
        .await
    }

    /// Marks the user deleted; `false` if unknown or already deleted
    pub async fn soft_delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists live users, newest first, with the total matching count
    pub async fn list(
        pool: &PgPool,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM users WHERE deleted_at IS NULL",
        );
        filter.push_conditions(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL"
        ));
        filter.push_conditions(&mut qb);
        qb.push(" ORDER BY created_at DESC, id LIMIT ");
        qb.push_bind(page.sql_limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let users = qb.build_query_as::<User>().fetch_all(pool).await?;

        Ok((users, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> User {
        User {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            name: "Ada".to_string(),
            role: UserRole::Maintainer,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        }
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&UserRole::Admin).unwrap(), "\"ADMIN\"");
        assert_eq!(
            serde_json::from_str::<UserRole>("\"MAINTAINER\"").unwrap(),
            UserRole::Maintainer
        );
        assert!(serde_json::from_str::<UserRole>("\"admin\"").is_err());
    }

    #[test]
    fn test_role_can_own_projects() {
        assert!(UserRole::Admin.can_own_projects());
        assert!(UserRole::Maintainer.can_own_projects());
        assert!(!UserRole::Member.can_own_projects());
    }

    #[test]
    fn test_response_hides_password_hash() {
        let json = serde_json::to_value(UserResponse::from(sample())).unwrap();
        assert_eq!(json["email"], "ada@example.com");
        assert_eq!(json["role"], "MAINTAINER");
        assert!(json.get("password_hash").is_none());
    }

    #[test]
    fn test_update_profile_is_empty() {
        assert!(UpdateProfile::default().is_empty());
        assert!(!UpdateProfile {
            name: Some("Grace".to_string()),
            email: None
        }
        .is_empty());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_filter_sql() {
        let filter = UserFilter {
            search: Some("  ada ".to_string()),
            role: Some(UserRole::Admin),
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM users WHERE deleted_at IS NULL");
        filter.push_conditions(&mut qb);

        assert_eq!(
            qb.sql(),
            "SELECT 1 FROM users WHERE deleted_at IS NULL AND (email ILIKE $1 OR name ILIKE $2) AND role = $3"
        );
    }

    #[test]
    fn test_blank_search_is_ignored() {
        let filter = UserFilter {
            search: Some("   ".to_string()),
            role: None,
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1");
        filter.push_conditions(&mut qb);
        assert_eq!(qb.sql(), "SELECT 1");
    }
}

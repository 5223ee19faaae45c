/// Project membership
///
/// Members see a project and can work on its tasks. The owner is not stored
/// here; ownership lives on `projects.owner_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use utoipa::ToSchema;
use uuid::Uuid;

use super::user::UserRole;

/// A member of a project with their public profile
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ProjectMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    /// When the user joined the project
    pub joined_at: DateTime<Utc>,
}

impl ProjectMember {
    /// Members of a project, oldest first; soft-deleted users are left out
    pub async fn list(pool: &PgPool, project_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProjectMember>(
            r#"
            SELECT pm.project_id, pm.user_id, u.email, u.name, u.role, pm.created_at AS joined_at
            FROM project_members pm
            JOIN users u ON u.id = pm.user_id
            WHERE pm.project_id = $1 AND u.deleted_at IS NULL
            ORDER BY pm.created_at, u.name
            "#,
        )
        .bind(project_id)
        .fetch_all(pool)
        .await
    }

    /// Adds a member
    ///
    /// # Errors
    ///
    /// A unique violation on `project_members_pkey` when the user already
    /// belongs to the project.
    pub async fn add<'e, E>(executor: E, project_id: Uuid, user_id: Uuid) -> Result<DateTime<Utc>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (joined_at,): (DateTime<Utc>,) = sqlx::query_as(
            r#"
            INSERT INTO project_members (project_id, user_id)
            VALUES ($1, $2)
            RETURNING created_at
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_one(executor)
        .await?;

        Ok(joined_at)
    }

    /// Removes a member; `false` if they were not one
    pub async fn remove<'e, E>(executor: E, project_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM project_members WHERE project_id = $1 AND user_id = $2")
            .bind(project_id)
            .bind(user_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

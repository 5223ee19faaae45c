/// Kanban columns
///
/// Columns of a project have positions exactly `0..n-1`. Appending, deleting
/// and reordering keep that invariant; callers hold the project row lock
/// ([`Project::lock_visible`](super::project::Project::lock_visible)) while
/// mutating so concurrent requests serialize.
///
/// Positions are exposed to clients as `order`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{apply_shifts, Positioned};
use crate::ordering::{self, OrderingError};

const STATUS_COLUMNS: &str = "id, project_id, name, position, created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct TaskStatus {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    #[serde(rename = "order")]
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why a column could not be deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeleteStatusError {
    #[error("Column still holds {0} task(s)")]
    NotEmpty(i64),

    #[error("A project must keep at least one column")]
    LastColumn,
}

impl TaskStatus {
    /// Columns of a project in board order
    pub async fn list_for_project<'e, E>(executor: E, project_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, TaskStatus>(&format!(
            "SELECT {STATUS_COLUMNS} FROM task_statuses WHERE project_id = $1 ORDER BY position"
        ))
        .bind(project_id)
        .fetch_all(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, TaskStatus>(&format!(
            "SELECT {STATUS_COLUMNS} FROM task_statuses WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// First column of a project, where new tasks land by default
    pub async fn first_for_project<'e, E>(executor: E, project_id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, TaskStatus>(&format!(
            "SELECT {STATUS_COLUMNS} FROM task_statuses WHERE project_id = $1 ORDER BY position LIMIT 1"
        ))
        .bind(project_id)
        .fetch_optional(executor)
        .await
    }

    /// Appends a column at the end of the board
    pub async fn append(conn: &mut PgConnection, project_id: Uuid, name: &str) -> Result<Self, sqlx::Error> {
        let (len,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM task_statuses WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(&mut *conn)
            .await?;

        sqlx::query_as::<_, TaskStatus>(&format!(
            r#"
            INSERT INTO task_statuses (project_id, name, position)
            VALUES ($1, $2, $3)
            RETURNING {STATUS_COLUMNS}
            "#
        ))
        .bind(project_id)
        .bind(name.trim())
        .bind(ordering::append_position(len))
        .fetch_one(&mut *conn)
        .await
    }

    pub async fn rename<'e, E>(executor: E, id: Uuid, name: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, TaskStatus>(&format!(
            r#"
            UPDATE task_statuses
            SET name = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {STATUS_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name.trim())
        .fetch_optional(executor)
        .await
    }

    /// Deletes an empty column and closes the gap it leaves
    ///
    /// Returns `Ok(Err(..))` when the column may not be deleted.
    pub async fn delete(
        conn: &mut PgConnection,
        status: &TaskStatus,
    ) -> Result<Result<(), DeleteStatusError>, sqlx::Error> {
        let (tasks,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE status_id = $1")
            .bind(status.id)
            .fetch_one(&mut *conn)
            .await?;
        if tasks > 0 {
            return Ok(Err(DeleteStatusError::NotEmpty(tasks)));
        }

        let (columns,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM task_statuses WHERE project_id = $1")
            .bind(status.project_id)
            .fetch_one(&mut *conn)
            .await?;
        if columns <= 1 {
            return Ok(Err(DeleteStatusError::LastColumn));
        }

        // Re-read the position under the project lock.
        let (position,): (i32,) =
            sqlx::query_as("DELETE FROM task_statuses WHERE id = $1 RETURNING position")
                .bind(status.id)
                .fetch_one(&mut *conn)
                .await?;

        let gap = ordering::close_gap(status.project_id, position);
        apply_shifts(conn, Positioned::Statuses, &[gap], None).await?;

        Ok(Ok(()))
    }

    /// Sets positions to the index of each id in `status_ids`
    ///
    /// `status_ids` must be a permutation of the project's columns.
    pub async fn reorder(
        conn: &mut PgConnection,
        project_id: Uuid,
        status_ids: &[Uuid],
    ) -> Result<Result<Vec<Self>, OrderingError>, sqlx::Error> {
        let current: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM task_statuses WHERE project_id = $1 ORDER BY position")
                .bind(project_id)
                .fetch_all(&mut *conn)
                .await?;

        if let Err(e) = ordering::validate_permutation(&current, status_ids) {
            return Ok(Err(e));
        }

        sqlx::query(
            r#"
            UPDATE task_statuses s
            SET position = (o.ord - 1)::INTEGER, updated_at = NOW()
            FROM unnest($2::UUID[]) WITH ORDINALITY AS o(id, ord)
            WHERE s.id = o.id AND s.project_id = $1 AND s.position <> (o.ord - 1)::INTEGER
            "#,
        )
        .bind(project_id)
        .bind(status_ids)
        .execute(&mut *conn)
        .await?;

        Ok(Ok(Self::list_for_project(&mut *conn, project_id).await?))
    }
}

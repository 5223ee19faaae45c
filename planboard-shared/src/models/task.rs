/// Task (card) model and database operations
///
/// Cards sit in exactly one column and carry a dense `position` within it.
/// Every mutation that changes positions locks the affected column rows
/// first (`SELECT ... FOR UPDATE`, in id order so two movers can't
/// deadlock), then applies a plan from [`crate::ordering`].
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     status_id UUID NOT NULL REFERENCES task_statuses(id),
///     assignee_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     title VARCHAR(200) NOT NULL,
///     description TEXT,
///     position INTEGER NOT NULL CHECK (position >= 0),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT tasks_position_key UNIQUE (status_id, position) DEFERRABLE INITIALLY DEFERRED
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use planboard_shared::models::task::{CreateTask, Task};
/// # use sqlx::PgPool;
/// # use uuid::Uuid;
///
/// # async fn example(pool: PgPool, project_id: Uuid, todo: Uuid, done: Uuid, me: Uuid) -> Result<(), sqlx::Error> {
/// let mut tx = pool.begin().await?;
/// let task = Task::create(&mut tx, CreateTask {
///     project_id,
///     status_id: todo,
///     assignee_id: None,
///     created_by: me,
///     title: "Write release notes".to_string(),
///     description: None,
/// }).await?;
///
/// // Move it to the top of "Done"
/// let (moved, _from) = Task::move_to(&mut tx, task.id, done, 0).await?;
/// tx.commit().await?;
/// assert_eq!(moved.position, 0);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor, PgPool, Postgres, QueryBuilder};
use utoipa::ToSchema;
use uuid::Uuid;

use super::user::escape_like;
use super::{apply_shifts, Positioned};
use crate::auth::authorization::ProjectScope;
use crate::ordering;
use crate::pagination::PageRequest;

const TASK_COLUMNS: &str = "t.id, t.project_id, t.status_id, t.assignee_id, t.created_by, \
                            t.title, t.description, t.position, t.created_at, t.updated_at";

/// A card on a project board
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub status_id: Uuid,
    pub assignee_id: Option<Uuid>,
    /// `None` once the creator's row is gone
    pub created_by: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    /// Position within the column
    #[serde(rename = "order")]
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a task; the column must belong to `project_id`
#[derive(Debug, Clone)]
pub struct CreateTask {
    pub project_id: Uuid,
    pub status_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub created_by: Uuid,
    pub title: String,
    pub description: Option<String>,
}

/// Task changes; `Some(None)` clears a nullable field
#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub assignee_id: Option<Option<Uuid>>,
}

impl UpdateTask {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.assignee_id.is_none()
    }
}

/// Filters for a project's task listing
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    /// Case-insensitive match on title or description
    pub search: Option<String>,
}

impl TaskFilter {
    fn push_conditions(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(status_id) = self.status_id {
            qb.push(" AND t.status_id = ");
            qb.push_bind(status_id);
        }

        if let Some(assignee_id) = self.assignee_id {
            qb.push(" AND t.assignee_id = ");
            qb.push_bind(assignee_id);
        }

        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", escape_like(search));
            qb.push(" AND (t.title ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR t.description ILIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }
    }
}

/// Where a moved task came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviousPlacement {
    pub status_id: Uuid,
    pub position: i32,
}

/// Locks column rows in id order
async fn lock_columns(conn: &mut PgConnection, ids: &[Uuid]) -> Result<(), sqlx::Error> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    sqlx::query("SELECT id FROM task_statuses WHERE id = ANY($1) ORDER BY id FOR UPDATE")
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;

    Ok(())
}

async fn column_len(
    conn: &mut PgConnection,
    status_id: Uuid,
    excluding: Option<Uuid>,
) -> Result<i64, sqlx::Error> {
    let (len,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM tasks WHERE status_id = $1 AND ($2::UUID IS NULL OR id <> $2)",
    )
    .bind(status_id)
    .bind(excluding)
    .fetch_one(&mut *conn)
    .await?;

    Ok(len)
}

impl Task {
    /// Creates a task at the end of its column
    pub async fn create(conn: &mut PgConnection, data: CreateTask) -> Result<Self, sqlx::Error> {
        lock_columns(conn, &[data.status_id]).await?;
        let len = column_len(conn, data.status_id, None).await?;

        sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks AS t (project_id, status_id, assignee_id, created_by, title, description, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING t.id, t.project_id, t.status_id, t.assignee_id, t.created_by,
                      t.title, t.description, t.position, t.created_at, t.updated_at
            "#,
        )
        .bind(data.project_id)
        .bind(data.status_id)
        .bind(data.assignee_id)
        .bind(data.created_by)
        .bind(data.title.trim())
        .bind(data.description)
        .bind(ordering::append_position(len))
        .fetch_one(&mut *conn)
        .await
    }

    /// Finds a task whose project is live and visible to `scope`
    pub async fn find_visible<'e, E>(
        executor: E,
        id: Uuid,
        scope: ProjectScope,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {TASK_COLUMNS} FROM tasks t \
             JOIN projects p ON p.id = t.project_id AND p.deleted_at IS NULL \
             WHERE t.id = "
        ));
        qb.push_bind(id);
        scope.push_condition(&mut qb, "p");

        qb.build_query_as::<Task>().fetch_optional(executor).await
    }

    /// Lists a project's tasks by column order, then card order
    pub async fn list(
        pool: &PgPool,
        project_id: Uuid,
        filter: &TaskFilter,
        page: PageRequest,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM tasks t WHERE t.project_id = ");
        count.push_bind(project_id);
        filter.push_conditions(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {TASK_COLUMNS} FROM tasks t \
             JOIN task_statuses s ON s.id = t.status_id \
             WHERE t.project_id = "
        ));
        qb.push_bind(project_id);
        filter.push_conditions(&mut qb);
        qb.push(" ORDER BY s.position, t.position LIMIT ");
        qb.push_bind(page.sql_limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let tasks = qb.build_query_as::<Task>().fetch_all(pool).await?;

        Ok((tasks, total))
    }

    /// Updates title, description or assignee
    pub async fn update<'e, E>(executor: E, id: Uuid, data: UpdateTask) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE tasks t SET updated_at = NOW()");

        if let Some(title) = data.title {
            qb.push(", title = ");
            qb.push_bind(title.trim().to_string());
        }
        if let Some(description) = data.description {
            qb.push(", description = ");
            qb.push_bind(description);
        }
        if let Some(assignee_id) = data.assignee_id {
            qb.push(", assignee_id = ");
            qb.push_bind(assignee_id);
        }

        qb.push(" WHERE t.id = ");
        qb.push_bind(id);
        qb.push(" RETURNING ");
        qb.push(TASK_COLUMNS);

        qb.build_query_as::<Task>().fetch_optional(executor).await
    }

    /// Moves a task to `position` in `target_status_id`
    ///
    /// The target column must belong to the task's project. The position is
    /// clamped into the column. Returns the moved task and where it was.
    pub async fn move_to(
        conn: &mut PgConnection,
        id: Uuid,
        target_status_id: Uuid,
        position: i32,
    ) -> Result<(Self, PreviousPlacement), sqlx::Error> {
        let (source_status_id,): (Uuid,) = sqlx::query_as("SELECT status_id FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;

        lock_columns(conn, &[source_status_id, target_status_id]).await?;

        // The card may have moved between the first read and the lock.
        let (current_status_id, from): (Uuid, i32) =
            sqlx::query_as("SELECT status_id, position FROM tasks WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_one(&mut *conn)
                .await?;
        if current_status_id != source_status_id {
            lock_columns(conn, &[current_status_id]).await?;
        }

        let target_len = column_len(conn, target_status_id, Some(id)).await?;
        let plan = ordering::plan_move(current_status_id, from, target_status_id, position, target_len);

        apply_shifts(conn, Positioned::Tasks, &plan.shifts, Some(id)).await?;

        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            UPDATE tasks t
            SET status_id = $2, position = $3, updated_at = NOW()
            WHERE t.id = $1
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(target_status_id)
        .bind(plan.position)
        .fetch_one(&mut *conn)
        .await?;

        Ok((
            task,
            PreviousPlacement {
                status_id: current_status_id,
                position: from,
            },
        ))
    }

    /// Deletes a task and closes the gap in its column
    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let status_id: Option<Uuid> = sqlx::query_scalar("SELECT status_id FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        let Some(status_id) = status_id else {
            return Ok(false);
        };

        lock_columns(conn, &[status_id]).await?;

        let removed: Option<(Uuid, i32)> =
            sqlx::query_as("DELETE FROM tasks WHERE id = $1 RETURNING status_id, position")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;
        let Some((status_id, position)) = removed else {
            return Ok(false);
        };

        apply_shifts(conn, Positioned::Tasks, &[ordering::close_gap(status_id, position)], None).await?;

        Ok(true)
    }

    /// Clears the assignee on a project's tasks assigned to `user_id`
    pub async fn unassign_user<'e, E>(executor: E, project_id: Uuid, user_id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET assignee_id = NULL, updated_at = NOW()
            WHERE project_id = $1 AND assignee_id = $2
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }
}

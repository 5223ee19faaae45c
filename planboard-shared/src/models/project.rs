/// Project model and database operations
///
/// Projects are soft-deleted. A new project is created together with its
/// three default columns so a board is usable straight away.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE projects (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(120) NOT NULL,
///     description TEXT,
///     status project_status NOT NULL DEFAULT 'ACTIVE',
///     owner_id UUID NOT NULL REFERENCES users(id),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     deleted_at TIMESTAMPTZ
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use planboard_shared::auth::authorization::ProjectScope;
/// use planboard_shared::models::project::{CreateProject, Project};
/// # use sqlx::PgPool;
/// # use uuid::Uuid;
///
/// # async fn example(pool: PgPool, owner: Uuid) -> Result<(), sqlx::Error> {
/// let mut tx = pool.begin().await?;
/// let (project, columns) = Project::create(&mut tx, owner, CreateProject {
///     name: "Launch".to_string(),
///     description: None,
/// }).await?;
/// tx.commit().await?;
///
/// assert_eq!(columns.len(), 3);
/// let visible = Project::find_visible(&pool, project.id, ProjectScope::Owned(owner)).await?;
/// assert!(visible.is_some());
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor, PgPool, Postgres, QueryBuilder};
use utoipa::ToSchema;
use uuid::Uuid;

use super::task_status::TaskStatus;
use super::user::escape_like;
use crate::auth::authorization::ProjectScope;
use crate::pagination::PageRequest;

/// Columns every new project starts with, in board order
pub const DEFAULT_STATUSES: [&str; 3] = ["To Do", "In Progress", "Done"];

const PROJECT_COLUMNS: &str =
    "p.id, p.name, p.description, p.status, p.owner_id, p.created_at, p.updated_at";

/// Project lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "project_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ProjectStatus {
    Active,
    Archived,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "ACTIVE",
            ProjectStatus::Archived => "ARCHIVED",
            ProjectStatus::Completed => "COMPLETED",
        }
    }
}

/// A live project
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateProject {
    pub name: String,
    pub description: Option<String>,
}

/// Project changes; `None` leaves a field untouched
///
/// `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<ProjectStatus>,
    pub owner_id: Option<Uuid>,
}

impl UpdateProject {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.owner_id.is_none()
    }
}

/// Filters for project listings
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    /// Case-insensitive match on name or description
    pub search: Option<String>,
}

impl ProjectFilter {
    pub(crate) fn push_conditions(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(status) = self.status {
            qb.push(" AND p.status = ");
            qb.push_bind(status);
        }

        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", escape_like(search));
            qb.push(" AND (p.name ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR p.description ILIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }
    }
}

/// `SELECT ... FROM projects p WHERE p.id = $1 AND p.deleted_at IS NULL AND <scope>`
pub(crate) fn visible_query(id: Uuid, scope: ProjectScope) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {PROJECT_COLUMNS} FROM projects p WHERE p.id = "));
    qb.push_bind(id);
    qb.push(" AND p.deleted_at IS NULL");
    scope.push_condition(&mut qb, "p");
    qb
}

impl Project {
    /// Creates a project owned by `owner_id` with the default columns
    ///
    /// Run inside a transaction so the project and its columns appear together.
    pub async fn create(
        conn: &mut PgConnection,
        owner_id: Uuid,
        data: CreateProject,
    ) -> Result<(Self, Vec<TaskStatus>), sqlx::Error> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects (name, description, owner_id)
            VALUES ($1, $2, $3)
            RETURNING id, name, description, status, owner_id, created_at, updated_at
            "#,
        )
        .bind(data.name.trim())
        .bind(data.description)
        .bind(owner_id)
        .fetch_one(&mut *conn)
        .await?;

        let mut columns = Vec::with_capacity(DEFAULT_STATUSES.len());
        for name in DEFAULT_STATUSES {
            columns.push(TaskStatus::append(&mut *conn, project.id, name).await?);
        }

        Ok((project, columns))
    }

    /// Finds a live project the scope can see
    pub async fn find_visible<'e, E>(
        executor: E,
        id: Uuid,
        scope: ProjectScope,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        visible_query(id, scope)
            .build_query_as::<Project>()
            .fetch_optional(executor)
            .await
    }

    /// Like [`find_visible`](Self::find_visible) but locks the project row
    ///
    /// Column reorders and deletions take this lock so they serialize per project.
    pub async fn lock_visible(
        conn: &mut PgConnection,
        id: Uuid,
        scope: ProjectScope,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut qb = visible_query(id, scope);
        qb.push(" FOR UPDATE OF p");
        qb.build_query_as::<Project>().fetch_optional(conn).await
    }

    /// Lists visible projects, newest first, with the total matching count
    pub async fn list(
        pool: &PgPool,
        scope: ProjectScope,
        filter: &ProjectFilter,
        page: PageRequest,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let mut count =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM projects p WHERE p.deleted_at IS NULL");
        scope.push_condition(&mut count, "p");
        filter.push_conditions(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PROJECT_COLUMNS} FROM projects p WHERE p.deleted_at IS NULL"
        ));
        scope.push_condition(&mut qb, "p");
        filter.push_conditions(&mut qb);
        qb.push(" ORDER BY p.created_at DESC, p.id LIMIT ");
        qb.push_bind(page.sql_limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let projects = qb.build_query_as::<Project>().fetch_all(pool).await?;

        Ok((projects, total))
    }

    /// Applies changes to a live project
    pub async fn update<'e, E>(
        executor: E,
        id: Uuid,
        data: UpdateProject,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE projects p SET updated_at = NOW()");

        if let Some(name) = data.name {
            qb.push(", name = ");
            qb.push_bind(name.trim().to_string());
        }
        if let Some(description) = data.description {
            qb.push(", description = ");
            qb.push_bind(description);
        }
        if let Some(status) = data.status {
            qb.push(", status = ");
            qb.push_bind(status);
        }
        if let Some(owner_id) = data.owner_id {
            qb.push(", owner_id = ");
            qb.push_bind(owner_id);
        }

        qb.push(" WHERE p.id = ");
        qb.push_bind(id);
        qb.push(" AND p.deleted_at IS NULL RETURNING ");
        qb.push(PROJECT_COLUMNS);

        qb.build_query_as::<Project>().fetch_optional(executor).await
    }

    pub async fn soft_delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE projects SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Whether `user_id` may be assigned tasks here: the owner or a member
    pub async fn is_participant<'e, E>(
        executor: E,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (participant,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM users u
                JOIN projects p ON p.id = $1
                WHERE u.id = $2
                  AND u.deleted_at IS NULL
                  AND (
                      p.owner_id = u.id
                      OR EXISTS (
                          SELECT 1 FROM project_members pm
                          WHERE pm.project_id = p.id AND pm.user_id = u.id
                      )
                  )
            )
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_one(executor)
        .await?;

        Ok(participant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_statuses() {
        assert_eq!(DEFAULT_STATUSES, ["To Do", "In Progress", "Done"]);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&ProjectStatus::Archived).unwrap(),
            "\"ARCHIVED\""
        );
        assert_eq!(ProjectStatus::Completed.as_str(), "COMPLETED");
    }

    #[test]
    fn test_update_is_empty() {
        assert!(UpdateProject::default().is_empty());
        assert!(!UpdateProject {
            description: Some(None),
            ..Default::default()
        }
        .is_empty());
    }

    #[test]
    fn test_visible_query_for_member() {
        let qb = visible_query(Uuid::new_v4(), ProjectScope::Member(Uuid::new_v4()));
        let sql = qb.sql();
        assert!(sql.contains("WHERE p.id = $1 AND p.deleted_at IS NULL"));
        assert!(sql.contains("pm.user_id = $2"));
    }

    #[test]
    fn test_visible_query_for_admin() {
        let qb = visible_query(Uuid::new_v4(), ProjectScope::All);
        assert!(qb.sql().ends_with("p.deleted_at IS NULL"));
    }

    #[test]
    fn test_filter_conditions() {
        let filter = ProjectFilter {
            status: Some(ProjectStatus::Active),
            search: Some("road".to_string()),
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM projects p WHERE TRUE");
        filter.push_conditions(&mut qb);
        assert_eq!(
            qb.sql(),
            "SELECT 1 FROM projects p WHERE TRUE AND p.status = $1 AND (p.name ILIKE $2 OR p.description ILIKE $3)"
        );
    }
}

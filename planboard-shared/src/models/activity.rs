/// Append-only activity log
///
/// Every state change records one event in the same transaction as the
/// change itself. Rows are never updated or deleted; a trigger on the table
/// rejects both, and this module exposes only [`ActivityEvent::record`] and
/// reads.
///
/// # Example
///
/// ```no_run
/// use planboard_shared::models::activity::{ActivityAction, ActivityEvent, NewActivity};
/// use serde_json::json;
/// # use sqlx::PgPool;
/// # use uuid::Uuid;
///
/// # async fn example(pool: PgPool, project_id: Uuid, user_id: Uuid) -> Result<(), sqlx::Error> {
/// let mut tx = pool.begin().await?;
/// // ... mutate the project ...
/// ActivityEvent::record(
///     &mut *tx,
///     NewActivity::new(ActivityAction::ProjectUpdated, Some(user_id))
///         .project(project_id)
///         .metadata(json!({ "fields": ["name"] })),
/// )
/// .await?;
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::authorization::ProjectScope;
use crate::pagination::PageRequest;

const EVENT_COLUMNS: &str = "e.id, e.project_id, e.user_id, e.action, e.metadata, e.created_at";

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "activity_action", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityAction {
    ProjectCreated,
    ProjectUpdated,
    ProjectDeleted,
    MemberAdded,
    MemberRemoved,
    StatusCreated,
    StatusUpdated,
    StatusDeleted,
    StatusesReordered,
    TaskCreated,
    TaskUpdated,
    TaskMoved,
    TaskDeleted,
    UserRegistered,
    UserRoleChanged,
    UserDeleted,
}

/// An immutable activity record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ActivityEvent {
    pub id: Uuid,
    /// `None` for account-level events
    pub project_id: Option<Uuid>,
    /// Actor; `None` for system events
    pub user_id: Option<Uuid>,
    pub action: ActivityAction,
    #[schema(value_type = Object)]
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Builder for an event about to be recorded
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub action: ActivityAction,
    pub user_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub metadata: JsonValue,
}

impl NewActivity {
    pub fn new(action: ActivityAction, user_id: Option<Uuid>) -> Self {
        Self {
            action,
            user_id,
            project_id: None,
            metadata: JsonValue::Object(Default::default()),
        }
    }

    pub fn project(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Filters for activity listings; all optional, all combined with AND
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub project_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub action: Option<ActivityAction>,
    /// Inclusive lower bound on `created_at`
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub to: Option<DateTime<Utc>>,
}

impl ActivityFilter {
    pub(crate) fn push_conditions(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(project_id) = self.project_id {
            qb.push(" AND e.project_id = ");
            qb.push_bind(project_id);
        }
        if let Some(user_id) = self.user_id {
            qb.push(" AND e.user_id = ");
            qb.push_bind(user_id);
        }
        if let Some(action) = self.action {
            qb.push(" AND e.action = ");
            qb.push_bind(action);
        }
        if let Some(from) = self.from {
            qb.push(" AND e.created_at >= ");
            qb.push_bind(from);
        }
        if let Some(to) = self.to {
            qb.push(" AND e.created_at <= ");
            qb.push_bind(to);
        }
    }
}

/// Restricts events aliased `e` to those the scope may see
///
/// Admins see every event. Everyone else sees only events of live projects
/// visible to them, never account-level events.
pub(crate) fn push_visibility(qb: &mut QueryBuilder<'_, Postgres>, scope: ProjectScope) {
    if scope == ProjectScope::All {
        return;
    }

    qb.push(" AND EXISTS (SELECT 1 FROM projects p WHERE p.id = e.project_id AND p.deleted_at IS NULL");
    scope.push_condition(qb, "p");
    qb.push(")");
}

impl ActivityEvent {
    /// Appends an event
    ///
    /// Pass the transaction that made the change (`&mut *tx`).
    pub async fn record<'e, E>(executor: E, event: NewActivity) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let recorded = sqlx::query_as::<_, ActivityEvent>(
            r#"
            INSERT INTO activity_events AS e (project_id, user_id, action, metadata)
            VALUES ($1, $2, $3, $4)
            RETURNING e.id, e.project_id, e.user_id, e.action, e.metadata, e.created_at
            "#,
        )
        .bind(event.project_id)
        .bind(event.user_id)
        .bind(event.action)
        .bind(event.metadata)
        .fetch_one(executor)
        .await?;

        tracing::debug!(
            event_id = %recorded.id,
            action = ?recorded.action,
            project_id = ?recorded.project_id,
            "Recorded activity"
        );

        Ok(recorded)
    }

    /// Lists visible events, newest first, with the total matching count
    pub async fn list(
        pool: &PgPool,
        scope: ProjectScope,
        filter: &ActivityFilter,
        page: PageRequest,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM activity_events e WHERE TRUE");
        push_visibility(&mut count, scope);
        filter.push_conditions(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {EVENT_COLUMNS} FROM activity_events e WHERE TRUE"
        ));
        push_visibility(&mut qb, scope);
        filter.push_conditions(&mut qb);
        qb.push(" ORDER BY e.created_at DESC, e.id DESC LIMIT ");
        qb.push_bind(page.sql_limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let events = qb.build_query_as::<ActivityEvent>().fetch_all(pool).await?;

        Ok((events, total))
    }

    /// Most recent visible events
    pub async fn recent<'e, E>(executor: E, scope: ProjectScope, limit: i64) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {EVENT_COLUMNS} FROM activity_events e WHERE TRUE"
        ));
        push_visibility(&mut qb, scope);
        qb.push(" ORDER BY e.created_at DESC, e.id DESC LIMIT ");
        qb.push_bind(limit);

        qb.build_query_as::<ActivityEvent>().fetch_all(executor).await
    }
}

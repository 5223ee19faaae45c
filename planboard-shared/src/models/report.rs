/// Dashboard and report aggregations
///
/// Read-only queries that count across projects, tasks and activity. Every
/// aggregate is restricted by the caller's [`ProjectScope`], so an ADMIN's
/// dashboard covers the whole system and a MEMBER's covers only the projects
/// they belong to.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use utoipa::ToSchema;
use uuid::Uuid;

use super::activity::{push_visibility, ActivityAction, ActivityEvent};
use super::project::{ProjectFilter, ProjectStatus};
use crate::auth::authorization::ProjectScope;
use crate::pagination::PageRequest;

/// Number of events shown on the dashboard
pub const RECENT_ACTIVITY_LIMIT: i64 = 10;

/// Window used when an activity report names no range
pub const DEFAULT_ACTIVITY_DAYS: i64 = 30;

/// Longest activity report range
pub const MAX_ACTIVITY_DAYS: i64 = 366;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ProjectCounts {
    pub total: i64,
    pub active: i64,
    pub archived: i64,
    pub completed: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct TaskCounts {
    pub total: i64,
    pub assigned_to_me: i64,
    pub unassigned: i64,
}

/// Tasks in columns sharing a name, across visible projects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct StatusCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Dashboard {
    pub projects: ProjectCounts,
    pub tasks: TaskCounts,
    pub tasks_by_status: Vec<StatusCount>,
    pub recent_activity: Vec<ActivityEvent>,
}

/// One row of the per-project statistics report
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ProjectStats {
    pub project_id: Uuid,
    pub name: String,
    pub status: ProjectStatus,
    pub owner_id: Uuid,
    pub task_count: i64,
    pub unassigned_count: i64,
    pub member_count: i64,
    pub last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ColumnCount {
    pub status_id: Uuid,
    pub name: String,
    #[serde(rename = "order")]
    pub position: i32,
    pub count: i64,
}

/// Tasks per assignee; `assignee_id == None` is the unassigned bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AssigneeCount {
    pub assignee_id: Option<Uuid>,
    pub assignee_name: Option<String>,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ActionCount {
    pub action: ActivityAction,
    pub count: i64,
}

/// Breakdown of a single project
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectReport {
    pub project_id: Uuid,
    pub total_tasks: i64,
    pub tasks_by_status: Vec<ColumnCount>,
    pub tasks_by_assignee: Vec<AssigneeCount>,
    pub activity_by_action: Vec<ActionCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub count: i64,
}

/// Activity per UTC day over a range, zero-filled
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActivityReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total: i64,
    pub days: Vec<DailyCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("from must not be after to")]
    Inverted,

    #[error("range must not exceed 366 days")]
    TooLong,
}

/// A validated activity report range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl ActivityRange {
    /// Fills missing bounds and validates
    ///
    /// `to` defaults to `now`; `from` defaults to 30 days before `to`.
    pub fn resolve(
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Self, RangeError> {
        let to = to.unwrap_or(now);
        let from = from.unwrap_or(to - Duration::days(DEFAULT_ACTIVITY_DAYS));

        if from > to {
            return Err(RangeError::Inverted);
        }
        if to - from > Duration::days(MAX_ACTIVITY_DAYS) {
            return Err(RangeError::TooLong);
        }

        Ok(Self { from, to })
    }

    /// Every UTC day the range touches, ascending
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let last = self.to.date_naive();
        self.from
            .date_naive()
            .iter_days()
            .take_while(move |day| *day <= last)
    }
}

/// Expands sparse per-day counts to one entry per day of `range`
pub fn fill_days(range: &ActivityRange, counts: &[DailyCount]) -> Vec<DailyCount> {
    let by_day: HashMap<NaiveDate, i64> = counts.iter().map(|c| (c.day, c.count)).collect();

    range
        .days()
        .map(|day| DailyCount {
            day,
            count: by_day.get(&day).copied().unwrap_or(0),
        })
        .collect()
}

/// Puts an explicit zero unassigned bucket last when no task is unassigned
pub fn with_unassigned_bucket(mut counts: Vec<AssigneeCount>) -> Vec<AssigneeCount> {
    if !counts.iter().any(|c| c.assignee_id.is_none()) {
        counts.push(AssigneeCount {
            assignee_id: None,
            assignee_name: None,
            count: 0,
        });
    }
    counts
}

/// Builds the caller's dashboard
pub async fn dashboard(pool: &PgPool, scope: ProjectScope, user_id: Uuid) -> Result<Dashboard, sqlx::Error> {
    let mut qb = QueryBuilder::<Postgres>::new(
        r#"
        SELECT COUNT(*) AS total,
               COUNT(*) FILTER (WHERE p.status = 'ACTIVE') AS active,
               COUNT(*) FILTER (WHERE p.status = 'ARCHIVED') AS archived,
               COUNT(*) FILTER (WHERE p.status = 'COMPLETED') AS completed
        FROM projects p
        WHERE p.deleted_at IS NULL
        "#,
    );
    scope.push_condition(&mut qb, "p");
    let projects = qb.build_query_as::<ProjectCounts>().fetch_one(pool).await?;

    let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(t.id) AS total, COUNT(t.id) FILTER (WHERE t.assignee_id = ");
    qb.push_bind(user_id);
    qb.push(
        r#") AS assigned_to_me,
               COUNT(t.id) FILTER (WHERE t.assignee_id IS NULL) AS unassigned
        FROM tasks t
        JOIN projects p ON p.id = t.project_id
        WHERE p.deleted_at IS NULL"#,
    );
    scope.push_condition(&mut qb, "p");
    let tasks = qb.build_query_as::<TaskCounts>().fetch_one(pool).await?;

    let mut qb = QueryBuilder::<Postgres>::new(
        r#"
        SELECT s.name, COUNT(t.id) AS count
        FROM task_statuses s
        JOIN projects p ON p.id = s.project_id
        LEFT JOIN tasks t ON t.status_id = s.id
        WHERE p.deleted_at IS NULL
        "#,
    );
    scope.push_condition(&mut qb, "p");
    qb.push(" GROUP BY s.name ORDER BY MIN(s.position), s.name");
    let tasks_by_status = qb.build_query_as::<StatusCount>().fetch_all(pool).await?;

    let recent_activity = ActivityEvent::recent(pool, scope, RECENT_ACTIVITY_LIMIT).await?;

    Ok(Dashboard {
        projects,
        tasks,
        tasks_by_status,
        recent_activity,
    })
}

/// Per-project statistics for visible projects, newest project first
pub async fn project_stats(
    pool: &PgPool,
    scope: ProjectScope,
    filter: &ProjectFilter,
    page: PageRequest,
) -> Result<(Vec<ProjectStats>, i64), sqlx::Error> {
    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM projects p WHERE p.deleted_at IS NULL");
    scope.push_condition(&mut count, "p");
    filter.push_conditions(&mut count);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::<Postgres>::new(
        r#"
        SELECT p.id AS project_id, p.name, p.status, p.owner_id,
               (SELECT COUNT(*) FROM tasks t WHERE t.project_id = p.id) AS task_count,
               (SELECT COUNT(*) FROM tasks t
                WHERE t.project_id = p.id AND t.assignee_id IS NULL) AS unassigned_count,
               (SELECT COUNT(*) FROM project_members pm
                JOIN users u ON u.id = pm.user_id
                WHERE pm.project_id = p.id AND u.deleted_at IS NULL) AS member_count,
               (SELECT MAX(e.created_at) FROM activity_events e
                WHERE e.project_id = p.id) AS last_activity_at
        FROM projects p
        WHERE p.deleted_at IS NULL
        "#,
    );
    scope.push_condition(&mut qb, "p");
    filter.push_conditions(&mut qb);
    qb.push(" ORDER BY p.created_at DESC, p.id LIMIT ");
    qb.push_bind(page.sql_limit());
    qb.push(" OFFSET ");
    qb.push_bind(page.offset());

    let rows = qb.build_query_as::<ProjectStats>().fetch_all(pool).await?;

    Ok((rows, total))
}

/// Breakdown for one project; the caller checks visibility first
pub async fn project_report(pool: &PgPool, project_id: Uuid) -> Result<ProjectReport, sqlx::Error> {
    let tasks_by_status = sqlx::query_as::<_, ColumnCount>(
        r#"
        SELECT s.id AS status_id, s.name, s.position, COUNT(t.id) AS count
        FROM task_statuses s
        LEFT JOIN tasks t ON t.status_id = s.id
        WHERE s.project_id = $1
        GROUP BY s.id
        ORDER BY s.position
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    let by_assignee = sqlx::query_as::<_, AssigneeCount>(
        r#"
        SELECT t.assignee_id, u.name AS assignee_name, COUNT(*) AS count
        FROM tasks t
        LEFT JOIN users u ON u.id = t.assignee_id
        WHERE t.project_id = $1
        GROUP BY t.assignee_id, u.name
        ORDER BY count DESC, u.name NULLS LAST
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    let activity_by_action = sqlx::query_as::<_, ActionCount>(
        r#"
        SELECT action, COUNT(*) AS count
        FROM activity_events
        WHERE project_id = $1
        GROUP BY action
        ORDER BY count DESC, action
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    Ok(ProjectReport {
        project_id,
        total_tasks: tasks_by_status.iter().map(|c| c.count).sum(),
        tasks_by_status,
        tasks_by_assignee: with_unassigned_bucket(by_assignee),
        activity_by_action,
    })
}

/// Visible activity per UTC day over `range`
pub async fn activity_report(
    pool: &PgPool,
    scope: ProjectScope,
    range: ActivityRange,
    project_id: Option<Uuid>,
) -> Result<ActivityReport, sqlx::Error> {
    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT (date_trunc('day', e.created_at AT TIME ZONE 'UTC'))::DATE AS day, COUNT(*) AS count \
         FROM activity_events e WHERE e.created_at >= ",
    );
    qb.push_bind(range.from);
    qb.push(" AND e.created_at <= ");
    qb.push_bind(range.to);
    if let Some(project_id) = project_id {
        qb.push(" AND e.project_id = ");
        qb.push_bind(project_id);
    }
    push_visibility(&mut qb, scope);
    qb.push(" GROUP BY day ORDER BY day");

    let counts = qb.build_query_as::<DailyCount>().fetch_all(pool).await?;

    Ok(ActivityReport {
        from: range.from,
        to: range.to,
        total: counts.iter().map(|c| c.count).sum(),
        days: fill_days(&range, &counts),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_range_defaults_to_last_30_days() {
        let now = at(2025, 3, 31);
        let range = ActivityRange::resolve(None, None, now).unwrap();
        assert_eq!(range.to, now);
        assert_eq!(range.from, now - Duration::days(30));
    }

    #[test]
    fn test_range_from_only() {
        let now = at(2025, 3, 31);
        let range = ActivityRange::resolve(Some(at(2025, 3, 1)), None, now).unwrap();
        assert_eq!(range.to, now);
    }

    #[test]
    fn test_range_rejects_inverted() {
        let result = ActivityRange::resolve(Some(at(2025, 3, 2)), Some(at(2025, 3, 1)), at(2025, 4, 1));
        assert_eq!(result, Err(RangeError::Inverted));
    }

    #[test]
    fn test_range_limit() {
        let now = at(2026, 1, 1);
        assert!(ActivityRange::resolve(Some(at(2025, 1, 1)), Some(at(2026, 1, 1)), now).is_ok());
        assert_eq!(
            ActivityRange::resolve(Some(at(2024, 1, 1)), Some(at(2025, 6, 1)), now),
            Err(RangeError::TooLong)
        );
    }

    #[test]
    fn test_days_inclusive() {
        let range = ActivityRange {
            from: at(2025, 2, 27),
            to: at(2025, 3, 2),
        };
        let days: Vec<_> = range.days().map(|d| d.to_string()).collect();
        assert_eq!(days, ["2025-02-27", "2025-02-28", "2025-03-01", "2025-03-02"]);
    }

    #[test]
    fn test_fill_days() {
        let range = ActivityRange {
            from: at(2025, 1, 1),
            to: at(2025, 1, 3),
        };
        let sparse = [DailyCount {
            day: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            count: 7,
        }];

        let filled = fill_days(&range, &sparse);
        let counts: Vec<i64> = filled.iter().map(|d| d.count).collect();
        assert_eq!(counts, [0, 7, 0]);
    }

    #[test]
    fn test_unassigned_bucket_added_once() {
        let someone = AssigneeCount {
            assignee_id: Some(Uuid::new_v4()),
            assignee_name: Some("Ada".to_string()),
            count: 2,
        };

        let with_bucket = with_unassigned_bucket(vec![someone.clone()]);
        assert_eq!(with_bucket.len(), 2);
        assert_eq!(with_bucket[1].count, 0);

        let already = AssigneeCount {
            assignee_id: None,
            assignee_name: None,
            count: 3,
        };
        let unchanged = with_unassigned_bucket(vec![someone, already]);
        assert_eq!(unchanged.len(), 2);
        assert_eq!(unchanged[1].count, 3);
    }

    #[test]
    fn test_column_count_serializes_order() {
        let json = serde_json::to_value(ColumnCount {
            status_id: Uuid::new_v4(),
            name: "Done".to_string(),
            position: 2,
            count: 5,
        })
        .unwrap();
        assert_eq!(json["order"], 2);
    }
}

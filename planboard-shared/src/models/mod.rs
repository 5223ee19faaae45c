/// Database models for Planboard
///
/// Each model owns its SQL. Reads that touch projects take a
/// [`ProjectScope`](crate::auth::authorization::ProjectScope) so role-based
/// visibility is applied in the query itself. Functions that must run inside
/// a caller's transaction take `&mut PgConnection` (pass `&mut *tx`); simple
/// reads accept any executor.
///
/// # Models
///
/// - `user`: Accounts, roles and soft deletion
/// - `project`: Projects and their lifecycle
/// - `project_member`: Project membership
/// - `task_status`: Ordered Kanban columns per project
/// - `task`: Cards within columns
/// - `activity`: Append-only activity log
/// - `report`: Dashboard and report aggregations
///
/// # Example
///
/// ```no_run
/// use planboard_shared::models::user::{CreateUser, User, UserRole};
/// use planboard_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let user = User::create(&pool, CreateUser {
///     email: "ada@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     name: "Ada".to_string(),
///     role: UserRole::Member,
/// }).await?;
/// # Ok(())
/// # }
/// ```

use sqlx::{PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::ordering::Shift;

pub mod activity;
pub mod project;
pub mod project_member;
pub mod report;
pub mod task;
pub mod task_status;
pub mod user;

/// Tables whose rows carry a dense `position`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Positioned {
    /// Columns, scoped by project
    Statuses,
    /// Cards, scoped by column
    Tasks,
}

impl Positioned {
    fn table(self) -> &'static str {
        match self {
            Positioned::Statuses => "task_statuses",
            Positioned::Tasks => "tasks",
        }
    }

    fn scope_column(self) -> &'static str {
        match self {
            Positioned::Statuses => "project_id",
            Positioned::Tasks => "status_id",
        }
    }
}

/// Builds the UPDATE statement for one planned shift
pub(crate) fn shift_query(
    target: Positioned,
    shift: &Shift,
    exclude: Option<Uuid>,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "UPDATE {table} SET position = position + ",
        table = target.table()
    ));
    qb.push_bind(shift.delta);
    qb.push(", updated_at = NOW() WHERE ");
    qb.push(target.scope_column());
    qb.push(" = ");
    qb.push_bind(shift.scope);
    qb.push(" AND position >= ");
    qb.push_bind(shift.start);

    if let Some(end) = shift.end {
        qb.push(" AND position <= ");
        qb.push_bind(end);
    }

    if let Some(id) = exclude {
        qb.push(" AND id <> ");
        qb.push_bind(id);
    }

    qb
}

/// Applies planned shifts in order
///
/// Must run in the transaction that holds the scope locks; the unique
/// position constraints are deferred to commit.
pub(crate) async fn apply_shifts(
    conn: &mut PgConnection,
    target: Positioned,
    shifts: &[Shift],
    exclude: Option<Uuid>,
) -> Result<(), sqlx::Error> {
    for shift in shifts {
        shift_query(target, shift, exclude)
            .build()
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_query_bounded() {
        let shift = Shift {
            scope: Uuid::new_v4(),
            start: 2,
            end: Some(4),
            delta: -1,
        };
        let qb = shift_query(Positioned::Tasks, &shift, Some(Uuid::new_v4()));

        assert_eq!(
            qb.sql(),
            "UPDATE tasks SET position = position + $1, updated_at = NOW() \
             WHERE status_id = $2 AND position >= $3 AND position <= $4 AND id <> $5"
        );
    }

    #[test]
    fn test_shift_query_open_ended() {
        let shift = Shift {
            scope: Uuid::new_v4(),
            start: 1,
            end: None,
            delta: -1,
        };
        let qb = shift_query(Positioned::Statuses, &shift, None);

        assert_eq!(
            qb.sql(),
            "UPDATE task_statuses SET position = position + $1, updated_at = NOW() \
             WHERE project_id = $2 AND position >= $3"
        );
    }
}

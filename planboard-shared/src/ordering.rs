/// Dense ordering for Kanban columns and cards
///
/// Columns within a project and cards within a column carry a `position`
/// that is always exactly `0..n-1`. Every mutation is planned here as a set
/// of range shifts that the model layer applies inside one transaction:
///
/// ```text
/// move card from position 1 to 3 in the same column:
///
///   before: [A0 B1 C2 D3 E4]
///   shift:  positions 2..=3 by -1  ->  C1 D2
///   place:  B at 3
///   after:  [A0 C1 D2 B3 E4]
/// ```
///
/// The planner is pure; the SQL lives in `models::task` and `models::task_status`.

use std::collections::HashSet;
use uuid::Uuid;

/// Errors for invalid reorder requests
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderingError {
    #[error("expected {expected} ids, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("id {0} appears more than once")]
    Duplicate(Uuid),

    #[error("id {0} does not belong to this project")]
    Unknown(Uuid),
}

/// Shift `position` by `delta` for rows of `scope` with `start <= position <= end`
///
/// `end == None` means "to the end of the scope".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shift {
    /// Column id for cards, project id for columns
    pub scope: Uuid,
    pub start: i32,
    pub end: Option<i32>,
    pub delta: i32,
}

/// Result of planning a card move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    /// Final position of the moved item
    pub position: i32,

    /// Shifts for the other items, applied in order
    pub shifts: Vec<Shift>,
}

impl MovePlan {
    /// True when the item stays where it is
    pub fn is_noop(&self) -> bool {
        self.shifts.is_empty()
    }
}

/// Position for an item appended to a scope that already holds `len` items
pub fn append_position(len: i64) -> i32 {
    i32::try_from(len.max(0)).unwrap_or(i32::MAX)
}

/// Clamps a requested position into `0..=len`
///
/// `len` counts the items of the destination scope, excluding the moved one.
pub fn clamp_position(requested: i32, len: i64) -> i32 {
    requested.clamp(0, append_position(len))
}

/// Plans moving an item from `(source, from)` to `(target, requested)`
///
/// `target_len` is the number of items in `target` excluding the moved item.
pub fn plan_move(source: Uuid, from: i32, target: Uuid, requested: i32, target_len: i64) -> MovePlan {
    let position = clamp_position(requested, target_len);

    if source == target {
        let shifts = if position > from {
            vec![Shift {
                scope: source,
                start: from + 1,
                end: Some(position),
                delta: -1,
            }]
        } else if position < from {
            vec![Shift {
                scope: source,
                start: position,
                end: Some(from - 1),
                delta: 1,
            }]
        } else {
            Vec::new()
        };

        return MovePlan { position, shifts };
    }

    MovePlan {
        position,
        shifts: vec![
            close_gap(source, from),
            Shift {
                scope: target,
                start: position,
                end: None,
                delta: 1,
            },
        ],
    }
}

/// Shift that closes the hole left by removing the item at `from`
pub fn close_gap(scope: Uuid, from: i32) -> Shift {
    Shift {
        scope,
        start: from + 1,
        end: None,
        delta: -1,
    }
}

/// Checks that `requested` is a permutation of `current`
pub fn validate_permutation(current: &[Uuid], requested: &[Uuid]) -> Result<(), OrderingError> {
    if current.len() != requested.len() {
        return Err(OrderingError::LengthMismatch {
            expected: current.len(),
            actual: requested.len(),
        });
    }

    let known: HashSet<&Uuid> = current.iter().collect();
    let mut seen = HashSet::with_capacity(requested.len());

    for id in requested {
        if !known.contains(id) {
            return Err(OrderingError::Unknown(*id));
        }
        if !seen.insert(id) {
            return Err(OrderingError::Duplicate(*id));
        }
    }

    Ok(())
}

/// Whether `positions` is exactly `0..n-1` in some order
pub fn is_dense(positions: &[i32]) -> bool {
    let mut sorted = positions.to_vec();
    sorted.sort_unstable();
    sorted.iter().enumerate().all(|(i, p)| *p as usize == i)
}

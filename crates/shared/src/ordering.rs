//! Pure rank computations for user-ordered sections.
//!
//! Nothing here touches storage or rendering: a drag end is turned into a new
//! id sequence with [`reorder`], the sequence into a full rank reassignment
//! with [`to_order_assignments`], and a received batch is checked against the
//! owner's current sections with [`validate_assignments`].

use std::collections::HashSet;

use thiserror::Error;

use crate::{
    domain::SectionId,
    error::{ApiError, ErrorCode},
    protocol::SectionOrder,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderingError {
    #[error("index {index} is out of bounds for a sequence of {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("moved element does not match the element at index {index}")]
    MovedMismatch { index: usize },
    #[error("section {0} not found")]
    UnknownSection(SectionId),
    #[error("section {0} appears more than once")]
    DuplicateSection(SectionId),
    #[error("order value {0} is assigned more than once")]
    DuplicateOrder(i64),
    #[error("reorder must assign every section; {missing} missing")]
    Incomplete { missing: usize },
}

impl From<OrderingError> for ApiError {
    fn from(value: OrderingError) -> Self {
        let code = match value {
            OrderingError::IndexOutOfBounds { .. } | OrderingError::MovedMismatch { .. } => {
                ErrorCode::InvalidIndex
            }
            OrderingError::UnknownSection(_) => ErrorCode::NotFound,
            OrderingError::DuplicateSection(_)
            | OrderingError::DuplicateOrder(_)
            | OrderingError::Incomplete { .. } => ErrorCode::ValidationFailed,
        };
        ApiError::new(code, value.to_string())
    }
}

/// Removes the element at `from_index` and re-inserts it at `to_index`.
///
/// `to_index` addresses the resulting sequence, so moving the last element to
/// the front is `reorder(seq, last, len - 1, 0)`.
pub fn reorder<T: PartialEq + Copy>(
    current: &[T],
    moved: T,
    from_index: usize,
    to_index: usize,
) -> Result<Vec<T>, OrderingError> {
    let len = current.len();
    for index in [from_index, to_index] {
        if index >= len {
            return Err(OrderingError::IndexOutOfBounds { index, len });
        }
    }
    if current[from_index] != moved {
        return Err(OrderingError::MovedMismatch { index: from_index });
    }

    let mut next = current.to_vec();
    let element = next.remove(from_index);
    next.insert(to_index, element);
    Ok(next)
}

pub fn to_order_assignments(sequence: &[SectionId]) -> Vec<SectionOrder> {
    sequence
        .iter()
        .zip(0_i64..)
        .map(|(id, order)| SectionOrder { id: *id, order })
        .collect()
}

/// Checks that `assignments` is a complete reassignment of `existing`: every
/// section exactly once, no shared order value, nothing foreign.
pub fn validate_assignments(
    existing: &[SectionId],
    assignments: &[SectionOrder],
) -> Result<(), OrderingError> {
    let known: HashSet<SectionId> = existing.iter().copied().collect();
    let mut seen_ids = HashSet::with_capacity(assignments.len());
    let mut seen_orders = HashSet::with_capacity(assignments.len());

    for assignment in assignments {
        if !known.contains(&assignment.id) {
            return Err(OrderingError::UnknownSection(assignment.id));
        }
        if !seen_ids.insert(assignment.id) {
            return Err(OrderingError::DuplicateSection(assignment.id));
        }
        if !seen_orders.insert(assignment.order) {
            return Err(OrderingError::DuplicateOrder(assignment.order));
        }
    }

    let missing = known.len() - seen_ids.len();
    if missing > 0 {
        return Err(OrderingError::Incomplete { missing });
    }
    Ok(())
}

/// The id sequence an assignment batch describes, ties broken by id.
pub fn sequence_from_assignments(assignments: &[SectionOrder]) -> Vec<SectionId> {
    let mut sorted = assignments.to_vec();
    sorted.sort_by_key(|assignment| (assignment.order, assignment.id));
    sorted.into_iter().map(|assignment| assignment.id).collect()
}

//! Dense-position invariant check.
//!
//! For a parent with `n` items the positions must be exactly `{0, …, n-1}`.

use serde::{Deserialize, Serialize};

use crate::types::ParentId;

/// First defect found in a parent's positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenseViolation {
    /// Two or more items share `position`.
    Duplicate { position: u32 },
    /// `expected` is unoccupied; the next occupied position is `found`.
    Gap { expected: u32, found: u32 },
}

impl std::fmt::Display for DenseViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenseViolation::Duplicate { position } => {
                write!(f, "duplicate position {position}")
            }
            DenseViolation::Gap { expected, found } => {
                write!(f, "gap at position {expected} (next occupied {found})")
            }
        }
    }
}

/// Check that `positions` form `{0, …, n-1}` with no gaps or duplicates.
pub fn check_dense<I>(positions: I) -> Result<(), DenseViolation>
where
    I: IntoIterator<Item = u32>,
{
    let mut sorted: Vec<u32> = positions.into_iter().collect();
    sorted.sort_unstable();

    for (i, &found) in sorted.iter().enumerate() {
        let expected = i as u32;
        if found == expected {
            continue;
        }
        if expected > 0 && found == expected - 1 {
            return Err(DenseViolation::Duplicate { position: found });
        }
        return Err(DenseViolation::Gap { expected, found });
    }
    Ok(())
}

/// Result of verifying one parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenseReport {
    pub parent: ParentId,
    pub count: u32,
    pub violation: Option<DenseViolation>,
}

impl DenseReport {
    pub fn is_dense(&self) -> bool {
        self.violation.is_none()
    }
}

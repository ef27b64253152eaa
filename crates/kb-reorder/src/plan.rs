//! Shift computation.
//!
//! Every mutation is expressed as at most two contiguous range shifts plus
//! one placement. Planning is pure: it takes slots and a parent snapshot and
//! never touches storage, so the arithmetic is tested without a backend.
//!
//! ```text
//! same parent, p < t     (p, t]  -1   then item -> t
//! same parent, t < p     [t, p)  +1   then item -> t
//! cross parent P -> Q    P: (p, ∞) -1 ; Q: [t, ∞) +1 ; item -> (Q, t)
//! remove                 P: (p, ∞) -1 ; delete item
//! ```

use crate::error::ReorderError;
use crate::types::{ParentId, ParentSnapshot, Slot};

// ---------------------------------------------------------------------------
// RangeShift
// ---------------------------------------------------------------------------

/// Add `delta` to the position of every item in `parent` whose position lies
/// in `from..=to` (`to == None` means unbounded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeShift {
    pub parent: ParentId,
    pub from: u32,
    pub to: Option<u32>,
    pub delta: i32,
}

impl RangeShift {
    /// Shift a bounded range `from..=to`.
    pub fn range(parent: ParentId, from: u32, to: u32, delta: i32) -> Self {
        Self {
            parent,
            from,
            to: Some(to),
            delta,
        }
    }

    /// Shift everything at or after `from`.
    pub fn tail(parent: ParentId, from: u32, delta: i32) -> Self {
        Self {
            parent,
            from,
            to: None,
            delta,
        }
    }

    pub fn covers(&self, position: u32) -> bool {
        position >= self.from && self.to.map_or(true, |to| position <= to)
    }

    /// New position for an item this shift covers. `None` if the result
    /// would be negative or overflow, which a correct plan never produces.
    pub fn apply(&self, position: u32) -> Option<u32> {
        position.checked_add_signed(self.delta)
    }
}

// ---------------------------------------------------------------------------
// MovePlan
// ---------------------------------------------------------------------------

/// Writes a move performs, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    pub shifts: Vec<RangeShift>,
    /// `None` when the item already sits at the destination.
    pub place: Option<Slot>,
}

impl MovePlan {
    pub fn is_noop(&self) -> bool {
        self.place.is_none()
    }
}

/// Clamp/validate a requested index against the target parent's snapshot.
///
/// Cross-parent: valid indices are `0..=count(Q)`.
/// Same parent: `count(P)` still counts the moving item, so `count(P)` is the
/// "end" sentinel and maps to `count(P) - 1`; anything above is invalid.
pub fn resolve_index(
    current: Slot,
    target: ParentSnapshot,
    requested: u32,
) -> Result<u32, ReorderError> {
    if requested > target.count {
        return Err(ReorderError::InvalidIndex {
            index: i64::from(requested),
            max: Some(target.count),
        });
    }
    if current.parent == target.parent && requested == target.count {
        return Ok(target.count.saturating_sub(1));
    }
    Ok(requested)
}

/// Plan the move of an item from `current` to `destination`.
///
/// `destination.position` must already be resolved with [`resolve_index`].
pub fn plan_move(current: Slot, destination: Slot) -> MovePlan {
    if current == destination {
        return MovePlan {
            shifts: Vec::new(),
            place: None,
        };
    }

    let mut shifts = Vec::with_capacity(2);
    if current.parent == destination.parent {
        let (p, t) = (current.position, destination.position);
        if t > p {
            shifts.push(RangeShift::range(current.parent, p + 1, t, -1));
        } else {
            shifts.push(RangeShift::range(current.parent, t, p - 1, 1));
        }
    } else {
        shifts.push(RangeShift::tail(current.parent, current.position + 1, -1));
        shifts.push(RangeShift::tail(destination.parent, destination.position, 1));
    }

    MovePlan {
        shifts,
        place: Some(destination),
    }
}

/// The shift that closes the gap a removed item leaves behind.
pub fn plan_remove(current: Slot) -> RangeShift {
    RangeShift::tail(current.parent, current.position + 1, -1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

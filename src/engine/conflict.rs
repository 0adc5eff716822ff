use chrono::{DateTime, SubsecRound, Utc};
use ulid::Ulid;

use crate::model::*;

/// Creation timestamps are UTC truncated to whole seconds.
pub(crate) fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// The existing block a candidate collided with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub block_id: Ulid,
    pub label: String,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl From<&Block> for Conflict {
    fn from(block: &Block) -> Self {
        Self {
            block_id: block.block_id,
            label: block.label.clone(),
            start: block.start,
            end: block.end,
        }
    }
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Time overlaps with existing block '{}' ({}-{})",
            self.label, self.start, self.end
        )
    }
}

/// Linear scan of the bucket. Half-open: touching endpoints do not conflict.
/// The first colliding block in bucket order is reported.
pub fn check_no_overlap(candidate: &Span, existing: &[Block]) -> Result<(), Conflict> {
    for block in existing {
        let other = block.span();
        let no_overlap = candidate.end <= other.start || candidate.start >= other.end;
        if !no_overlap {
            return Err(Conflict::from(block));
        }
    }
    Ok(())
}

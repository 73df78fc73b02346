//! Typed errors surfaced to submitters.
//!
//! Every failure is local to the offending submission; the simulation never
//! aborts globally because one task could not be placed.

use thiserror::Error;

use crate::types::{MemUnits, Tick};

/// Why a task submission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The submission exceeds the remaining admission budget. Recoverable:
    /// the caller may resubmit with an adjusted cost or footprint.
    #[error("admission rejected: needs {needed} units, {available} available")]
    AdmissionRejected { needed: u64, available: u64 },

    /// Memory was required but no evictable candidate could cover it.
    /// Fatal only to this submission.
    #[error("resource exhausted: {needed} memory units needed, {available} reclaimable")]
    ResourceExhausted {
        needed: MemUnits,
        available: MemUnits,
    },

    /// The submission was timestamped earlier than the current virtual time.
    #[error("invalid ordering: submission at tick {at} is before current tick {now}")]
    InvalidOrdering { at: Tick, now: Tick },
}

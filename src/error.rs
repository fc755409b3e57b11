//! The tagged error taxonomy threaded through every fallible engine operation (§7).
//!
//! Replaces the ad-hoc integer return codes of the reference implementation with a
//! single `thiserror`-derived enum, per the design note in SPEC_FULL.md §9.

use thiserror::Error;

/// Errors produced by the contact-plan store, the routing phases, and the orchestrator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CgrError {
    /// Invalid inputs: null/zero node id, out-of-range value, malformed bundle.
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// `now` moved backwards relative to the last observed call time.
    #[error("clock regression: now ({now}) precedes last observed time ({last_seen})")]
    ClockRegression {
        /// The `now` passed to the call that triggered this error.
        now: crate::types::Date,
        /// The last `now` the engine observed.
        last_seen: crate::types::Date,
    },

    /// A contact or range addition violates the pairwise non-overlap invariant.
    #[error("overlapping contact or range for the same (from, to) pair")]
    Overlap,

    /// A revise operation targeted a contact or range that does not exist.
    #[error("no such contact or range to revise")]
    NotFound,

    /// Allocation failure (arena exhaustion under a host-imposed capacity bound).
    #[error("out of memory")]
    OutOfMemory,

    /// No feasible route exists to the destination under the given constraints.
    #[error("no route")]
    NoRoute,

    /// The bundle's expiration time has already passed.
    #[error("bundle already expired")]
    ExpiredBundle,

    /// The host-supplied backlog callback reported it has no plan for the neighbor.
    #[error("no contact plan for neighbor")]
    PlanMissing,

    /// An internal invariant was violated; callers should treat this as fatal and
    /// tear down and re-initialize the engine.
    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl CgrError {
    /// Maps a `CgrError` to the legacy ION-style integer return code, for hosts porting
    /// call sites that still expect the reference implementation's negative-code
    /// convention (§4.8, §7).
    pub fn to_legacy_code(&self) -> i32 {
        match self {
            CgrError::NoRoute => -1,
            CgrError::OutOfMemory => -2,
            CgrError::BadArgument(_) => -3,
            CgrError::ClockRegression { .. } => -5,
            CgrError::Internal(_) => -4,
            CgrError::ExpiredBundle | CgrError::PlanMissing | CgrError::Overlap | CgrError::NotFound => -4,
        }
    }
}

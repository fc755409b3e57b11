//! The backlog callback (C13): a host-supplied, pure, non-blocking queue-depth query phase 2
//! uses to compute earliest transmission opportunity (§4.5 step 3, §4.11).

use crate::error::CgrError;
use crate::types::{NodeID, Priority, Volume};

/// Queries a neighbor's outbound queue depth for a given priority class.
///
/// Implementations must be pure with respect to engine state and must not block or perform
/// I/O synchronously on the calling thread — the engine calls this inline during phase 2 and
/// never awaits or spawns while doing so (§5).
pub trait BacklogQuery {
    /// Returns `(applicable, total)` backlog in bytes ahead of `ordinal` for `priority`
    /// traffic queued to `neighbor`. `applicable` counts only bundles at or above this
    /// priority queued ahead of `ordinal`; `total` counts every byte queued regardless of
    /// ordinal, used by phase 2's all-hops queue-delay accumulation.
    ///
    /// Returns [`CgrError::PlanMissing`] if the host has no queue state for `neighbor` yet.
    fn query(&self, neighbor: NodeID, priority: Priority, ordinal: u32) -> Result<(Volume, Volume), CgrError>;
}

/// A [`BacklogQuery`] that reports no backlog anywhere, useful for hosts without per-neighbor
/// queue accounting and for tests that only exercise the routing math.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBacklog;

impl BacklogQuery for NoBacklog {
    fn query(&self, _neighbor: NodeID, _priority: Priority, _ordinal: u32) -> Result<(Volume, Volume), CgrError> {
        Ok((0.0, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_backlog_reports_zero() {
        let backlog = NoBacklog;
        assert_eq!(backlog.query(2, Priority::Bulk, 0).unwrap(), (0.0, 0.0));
    }
}

//! The bundle view (C4): the subset of a DTN bundle's metadata that routing needs to see.
//! This crate never constructs or mutates bundles itself — a host application builds one per
//! forwarding decision and hands it to [`crate::engine::CgrEngine::get_best_routes`] (§4.4).

use crate::contact::ContactId;
use crate::types::{Confidence, Date, NodeID, Ordinal, Priority, Volume};

/// Per-bundle flags that change how phase 1/2/3 treat a forwarding decision (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BundleFlags {
    /// Critical bundles bypass the single-best-route selection of phase 3 and are instead
    /// handed every non-failed route to the destination (§4.7).
    pub critical: bool,
    /// Whether the bundle may be fragmented to fit a route with insufficient residual volume
    /// (§4.6 "Route volume limit").
    pub fragmentable: bool,
    /// Set when this bundle arrived via backward propagation from a node that couldn't
    /// forward it; phase 1 excludes that node from consideration (§4.4 "Excluded neighbors").
    pub backward_propagation: bool,
    /// Marks a bundle used only to probe reachability; never actually transmitted.
    pub probe: bool,
}

/// The view of a bundle that the routing engine consumes for one forwarding decision.
#[derive(Debug, Clone)]
pub struct Bundle {
    /// The bundle's final destination.
    pub terminus: NodeID,
    /// The node currently holding the bundle (normally the local node).
    pub sender: NodeID,
    /// Size in the same volume unit as contact `mtv` (bytes).
    pub size: Volume,
    /// Estimated volume consumed, including convergence-layer overhead (§4.6); computed by the
    /// engine from `size` and the active [`crate::config::EngineConfig`], not supplied by the
    /// host.
    pub evc: Volume,
    /// The bundle's expiration time; contacts ending at or after this time cannot carry it.
    pub expiration_time: Date,
    /// Forwarding priority class.
    pub priority: Priority,
    /// A monotonically increasing per-priority sequence number, used to break ties and to key
    /// backlog queries (§4.10).
    pub ordinal: Ordinal,
    pub flags: BundleFlags,
    /// The confidence of the best route found so far, when re-forwarding after a failure
    /// (§4.7 "Confidence floor").
    pub dlv_confidence: Confidence,
    /// An already-known MSR source route, if the bundle carries one (§4.8).
    pub msr_route: Option<Vec<ContactId>>,
    /// Neighbors that have already failed to forward this bundle and must be excluded from
    /// consideration (§4.4 "Excluded neighbors").
    pub failed_neighbors: Vec<NodeID>,
    /// The full geographic route a bundle with a known path has already committed to, used by
    /// MSR to look up a matching computed route rather than searching from scratch (§4.8).
    pub geo_route: Vec<NodeID>,
}

impl Bundle {
    /// Computes `evc`, the estimated volume consumption, applying the configured
    /// convergence-layer overhead percentage with its floor (§4.6):
    /// `max(size * perc / 100, min_overhead)`.
    pub fn compute_evc(size: Volume, config: &crate::config::EngineConfig) -> Volume {
        (size * config.perc_convergence_layer_overhead / 100.0).max(config.min_convergence_layer_overhead)
    }

    /// Whether `neighbor` has already been excluded for this forwarding decision, either
    /// because it previously failed or because the bundle arrived via backward propagation
    /// from it.
    pub fn excludes(&self, neighbor: NodeID) -> bool {
        self.failed_neighbors.contains(&neighbor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn evc_applies_percentage_with_floor() {
        let config = EngineConfig::ccsds_sabr();
        assert_eq!(Bundle::compute_evc(1_000_000.0, &config), 30_000.0);
        assert_eq!(Bundle::compute_evc(10.0, &config), config.min_convergence_layer_overhead);
    }

    #[test]
    fn excludes_checks_failed_neighbors_list() {
        let bundle = Bundle {
            terminus: 9,
            sender: 1,
            size: 100.0,
            evc: 103.0,
            expiration_time: 1000.0,
            priority: Priority::Normal,
            ordinal: 1,
            flags: BundleFlags::default(),
            dlv_confidence: 0.0,
            msr_route: None,
            failed_neighbors: vec![2, 3],
            geo_route: Vec::new(),
        };
        assert!(bundle.excludes(2));
        assert!(!bundle.excludes(4));
    }
}

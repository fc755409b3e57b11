//! Phase 3 — the best-route chooser (C7): the comparator that ranks candidates and the policy
//! that turns a ranked list into the emitted forwarding set (§4.6).

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::bundle::Bundle;
use crate::config::EngineConfig;
use crate::contact::RouteId;
use crate::node::NodeRegistry;
use crate::route::Route;
use crate::types::Priority;

/// Strict lexicographic comparator over two candidate routes (§4.6 "Comparator"), returning
/// `Less` when `a` should be preferred over `b`.
fn compare(a: &Route, b: &Route, config: &EngineConfig) -> Ordering {
    a.check_value
        .cmp(&b.check_value)
        .then_with(|| {
            if config.neglect_confidence {
                Ordering::Equal
            } else {
                b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal)
            }
        })
        .then_with(|| a.pbat.partial_cmp(&b.pbat).unwrap_or(Ordering::Equal))
        .then_with(|| a.hop_count.cmp(&b.hop_count))
        .then_with(|| a.owlt_sum.partial_cmp(&b.owlt_sum).unwrap_or(Ordering::Equal))
        .then_with(|| a.next_hop.cmp(&b.next_hop))
}

/// Whether this bundle's forwarding set should include the best route to every neighbor
/// (fan-out) rather than a single overall winner: critical bundles always fan out, and so does
/// an Expedited bundle carrying the shared-ordinal cardinality that load-spreads duplicates
/// across disjoint paths (§4.6).
fn fans_out(bundle: &Bundle) -> bool {
    bundle.flags.critical || bundle.priority == Priority::Expedited
}

/// Ranks `candidates` and returns the forwarding set the host should actually transmit along:
/// the single best route, or one route per distinct neighbor when `fans_out` applies (§4.6).
pub fn choose_forwarding_set(candidates: &[RouteId], registry: &NodeRegistry, bundle: &Bundle, config: &EngineConfig) -> Vec<RouteId> {
    let mut routes: Vec<(RouteId, &Route)> = candidates.iter().filter_map(|&id| registry.route(id).map(|r| (id, r))).collect();
    if routes.is_empty() {
        return Vec::new();
    }

    routes.sort_by(|(_, a), (_, b)| compare(a, b, config));

    if fans_out(bundle) {
        let mut winners: HashMap<crate::types::NodeID, RouteId> = HashMap::new();
        for (id, route) in &routes {
            winners.entry(route.next_hop).or_insert(*id);
        }
        let mut emitted: Vec<RouteId> = winners.into_values().collect();
        emitted.sort_by(|&a, &b| {
            let ra = registry.route(a).expect("winner came from routes");
            let rb = registry.route(b).expect("winner came from routes");
            compare(ra, rb, config)
        });
        emitted
    } else {
        vec![routes[0].0]
    }
}

//! The MSR fast path (C8): validates and adopts a bundle's already-known source route,
//! short-circuiting phase 1/2's Dijkstra search when it still holds (§4.7).

use log::{debug, trace};

use crate::bundle::Bundle;
use crate::config::EngineConfig;
use crate::contact::{ContactId, RouteId};
use crate::contact_plan::ContactPlanStore;
use crate::node::NodeRegistry;
use crate::route::Route;
use crate::types::{Date, Duration, NodeID};

/// Attempts to adopt `bundle.msr_route` as a finished route to `destination`, validating every
/// hop still resolves to a live, unsuppressed, unexpired contact chaining out of `local_node`,
/// and that the chain reaches `destination` under the configured matching mode. Returns the
/// materialized route's id on success — already cited and filed into the destination's
/// routing object, exactly as a phase-1 search would have left it — or `None` on any mismatch,
/// so the orchestrator falls through to the full pipeline (§4.7).
pub fn attempt(
    bundle: &Bundle,
    local_node: NodeID,
    destination: NodeID,
    now: Date,
    contacts: &mut ContactPlanStore,
    registry: &mut NodeRegistry,
    config: &EngineConfig,
) -> Option<RouteId> {
    if !config.msr_enabled {
        return None;
    }
    let requested = bundle.msr_route.as_ref()?;
    if requested.is_empty() {
        return None;
    }

    let accepted = validate_chain(requested, local_node, now, contacts, config)?;
    let last_hop = contacts.get_contact(*accepted.last()?)?;
    let reaches_destination = last_hop.info.to_node == destination;

    if config.wise_node {
        if accepted.len() != requested.len() || !reaches_destination {
            trace!("MSR wise-node match failed: {} of {} hops resolved, reaches_destination={}", accepted.len(), requested.len(), reaches_destination);
            return None;
        }
    } else {
        if (accepted.len() as u32) < config.msr_hops_lower_bound {
            trace!("MSR non-wise match below lower bound: {} < {}", accepted.len(), config.msr_hops_lower_bound);
            return None;
        }
        if last_hop.info.to_time <= now {
            trace!("MSR non-wise prefix ends in an already-closed contact");
            return None;
        }
    }

    let route_id = materialize(destination, &accepted, now, contacts, registry)?;
    debug!(
        "MSR adopted a {}-hop route to {} ({} mode)",
        accepted.len(),
        destination,
        if config.wise_node { "wise" } else { "non-wise" }
    );
    Some(route_id)
}

/// Walks `requested` hop by hop, accepting a prefix that still resolves to a live,
/// unsuppressed, unexpired contact chaining `from_node` to `from_node` through the sequence,
/// each one departing no earlier than `msr_time_tolerance` seconds before the running arrival
/// estimate (§4.7 step 2). Stops at the first hop that fails to match; returns `None` if even
/// the first hop does not.
fn validate_chain(requested: &[ContactId], local_node: NodeID, now: Date, contacts: &ContactPlanStore, config: &EngineConfig) -> Option<Vec<ContactId>> {
    let mut accepted = Vec::with_capacity(requested.len());
    let mut expected_from = local_node;
    let mut earliest_departure = now;

    for &id in requested {
        let Some(contact) = contacts.get_contact(id) else { break };
        let info = contact.info;
        if contact.suppressed || info.from_node != expected_from || info.to_time <= now {
            break;
        }
        if info.from_time + config.msr_time_tolerance < earliest_departure {
            break;
        }
        accepted.push(id);
        expected_from = info.to_node;
        earliest_departure = info.from_time.max(earliest_departure);
    }

    if accepted.is_empty() {
        None
    } else {
        Some(accepted)
    }
}

/// Builds a [`Route`] from an already-validated hop sequence, recomputing arrival time,
/// accumulated confidence and OWLT the same way phase 1's Dijkstra search would, then cites and
/// files it exactly as [`crate::phase1::compute_routes`] does for a freshly found route.
fn materialize(destination: NodeID, hops: &[ContactId], now: Date, contacts: &mut ContactPlanStore, registry: &mut NodeRegistry) -> Option<RouteId> {
    let first = contacts.get_contact(hops[0])?.info;
    let mut arrival = first.from_time;
    let mut confidence = 1.0;
    let mut owlt_sum: Duration = 0.0;
    let mut to_time = Date::INFINITY;

    for &id in hops {
        let info = contacts.get_contact(id)?.info;
        to_time = to_time.min(info.to_time);
        let departure = arrival.max(info.from_time);
        let owlt = contacts.get_applicable_range(info.from_node, info.to_node, departure)? as Duration;
        arrival = departure + owlt;
        owlt_sum += owlt;
        confidence *= info.confidence;
    }

    let route = Route::new(destination, hops.to_vec(), first.to_node, first.from_time, to_time, arrival, confidence, owlt_sum, now);
    let route_id = registry.insert_route(route);
    for &hop in hops {
        if let Some(contact) = contacts.get_contact_mut(hop) {
            contact.cite(route_id);
        }
    }
    registry.object_mut(destination).selected_routes.push(route_id);
    Some(route_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::{ContactInfo, ContactType};
    use crate::contact_plan::AddOutcome;

    fn scheduled(from: NodeID, to: NodeID, from_time: Date, to_time: Date) -> ContactInfo {
        ContactInfo { from_node: from, to_node: to, from_time, to_time, xmit_rate: 1000.0, confidence: 0.9, contact_type: ContactType::Scheduled }
    }

    fn add(contacts: &mut ContactPlanStore, info: ContactInfo) -> ContactId {
        match contacts.add_contact(info).unwrap() {
            AddOutcome::Added(id) => id,
            AddOutcome::Revised(id) => id,
        }
    }

    #[test]
    fn disabled_msr_never_attempts_a_match() {
        let mut contacts = ContactPlanStore::new();
        let mut registry = NodeRegistry::new();
        let hop = add(&mut contacts, scheduled(1, 9, 0.0, 100.0));
        contacts.add_range(1, 9, 0.0, 100.0, 1).unwrap();
        let mut config = EngineConfig::ccsds_sabr();
        config.msr_enabled = false;

        let bundle = Bundle { msr_route: Some(vec![hop]), ..bundle_template() };
        assert!(attempt(&bundle, 1, 9, 0.0, &mut contacts, &mut registry, &config).is_none());
    }

    #[test]
    fn wise_node_mode_adopts_a_chain_that_reaches_the_destination() {
        let mut contacts = ContactPlanStore::new();
        let mut registry = NodeRegistry::new();
        let hop1 = add(&mut contacts, scheduled(1, 2, 0.0, 100.0));
        let hop2 = add(&mut contacts, scheduled(2, 9, 0.0, 100.0));
        contacts.add_range(1, 2, 0.0, 100.0, 1).unwrap();
        contacts.add_range(2, 9, 0.0, 100.0, 1).unwrap();
        let mut config = EngineConfig::ccsds_sabr();
        config.msr_enabled = true;
        config.wise_node = true;

        let bundle = Bundle { msr_route: Some(vec![hop1, hop2]), ..bundle_template() };
        let route_id = attempt(&bundle, 1, 9, 0.0, &mut contacts, &mut registry, &config).unwrap();
        let route = registry.route(route_id).unwrap();
        assert_eq!(route.hops, vec![hop1, hop2]);
        assert_eq!(route.next_hop, 2);
        assert!(registry.object(9).unwrap().selected_routes.contains(&route_id));
    }

    #[test]
    fn wise_node_mode_rejects_a_chain_that_stops_short_of_the_destination() {
        let mut contacts = ContactPlanStore::new();
        let mut registry = NodeRegistry::new();
        let hop1 = add(&mut contacts, scheduled(1, 2, 0.0, 100.0));
        contacts.add_range(1, 2, 0.0, 100.0, 1).unwrap();
        let mut config = EngineConfig::ccsds_sabr();
        config.msr_enabled = true;
        config.wise_node = true;

        let bundle = Bundle { msr_route: Some(vec![hop1]), ..bundle_template() };
        assert!(attempt(&bundle, 1, 9, 0.0, &mut contacts, &mut registry, &config).is_none());
        assert!(registry.object(9).is_none());
    }

    #[test]
    fn non_wise_mode_accepts_a_prefix_above_the_lower_bound() {
        let mut contacts = ContactPlanStore::new();
        let mut registry = NodeRegistry::new();
        let hop1 = add(&mut contacts, scheduled(1, 2, 0.0, 100.0));
        contacts.add_range(1, 2, 0.0, 100.0, 1).unwrap();
        // A second leg the bundle believes exists but has since been removed from the plan.
        let stale_hop = add(&mut contacts, scheduled(2, 9, 0.0, 100.0));
        contacts.remove_contact(stale_hop).unwrap();
        let mut config = EngineConfig::ccsds_sabr();
        config.msr_enabled = true;
        config.wise_node = false;
        config.msr_hops_lower_bound = 1;

        let bundle = Bundle { msr_route: Some(vec![hop1, stale_hop]), ..bundle_template() };
        let route_id = attempt(&bundle, 1, 9, 0.0, &mut contacts, &mut registry, &config).unwrap();
        assert_eq!(registry.route(route_id).unwrap().hops, vec![hop1]);
    }

    #[test]
    fn a_suppressed_or_broken_first_hop_yields_no_match() {
        let mut contacts = ContactPlanStore::new();
        let mut registry = NodeRegistry::new();
        let hop1 = add(&mut contacts, scheduled(1, 2, 0.0, 100.0));
        contacts.get_contact_mut(hop1).unwrap().suppressed = true;
        let mut config = EngineConfig::ccsds_sabr();
        config.msr_enabled = true;

        let bundle = Bundle { msr_route: Some(vec![hop1]), ..bundle_template() };
        assert!(attempt(&bundle, 1, 9, 0.0, &mut contacts, &mut registry, &config).is_none());
    }

    fn bundle_template() -> Bundle {
        Bundle {
            terminus: 9,
            sender: 1,
            size: 0.0,
            evc: 0.0,
            expiration_time: Date::INFINITY,
            priority: crate::types::Priority::Normal,
            ordinal: 0,
            flags: crate::bundle::BundleFlags::default(),
            dlv_confidence: 0.0,
            msr_route: None,
            failed_neighbors: Vec::new(),
            geo_route: Vec::new(),
        }
    }
}

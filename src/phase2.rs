//! Phase 2 — candidate selection (C6): feasibility, loop avoidance, ETO/PBAT, route volume
//! limit, confidence floor, and the booking journal that makes overbooking reversible (§4.5).

use std::collections::HashSet;

use log::trace;

use crate::backlog::BacklogQuery;
use crate::bundle::Bundle;
use crate::config::{EngineConfig, QueueDelay};
use crate::contact::{ContactId, RouteId};
use crate::contact_plan::ContactPlanStore;
use crate::node::NodeRegistry;
use crate::route::CheckValue;
use crate::types::{Date, NodeID, Priority, Volume};

/// Records every volume booking phase 2 makes against contact `mtv` cells this call, so a
/// candidate route phase 3 does not select can have its booking reversed without residual
/// side effects (§4.5 "Overbooking", §5).
#[derive(Debug, Default)]
pub struct BookingJournal {
    entries: Vec<(RouteId, ContactId, Priority, Volume)>,
}

impl BookingJournal {
    fn record(&mut self, route: RouteId, contact: ContactId, priority: Priority, protected_amount: Volume) {
        self.entries.push((route, contact, priority, protected_amount));
    }

    /// Rolls back every booking made for routes not present in `keep`, in reverse order.
    pub fn rollback_unselected(&mut self, keep: &HashSet<RouteId>, contacts: &mut ContactPlanStore) {
        let mut remaining = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..).rev() {
            let (route, contact, priority, protected_amount) = entry;
            if keep.contains(&route) {
                remaining.push(entry);
                continue;
            }
            if let Some(c) = contacts.get_contact_mut(contact) {
                c.unbook(priority, protected_amount);
            }
        }
        remaining.reverse();
        self.entries = remaining;
    }

    /// Rolls back every booking this journal recorded, in reverse order; used when the whole
    /// call fails and nothing was actually forwarded.
    pub fn rollback_all(&mut self, contacts: &mut ContactPlanStore) {
        self.rollback_unselected(&HashSet::new(), contacts);
    }
}

fn evaluate_loop_avoidance(neighbor: NodeID, hops: &[ContactId], bundle: &Bundle, contacts: &ContactPlanStore, config: &EngineConfig) -> CheckValue {
    if config.avoid_loop.is_reactive() && bundle.excludes(neighbor) {
        return CheckValue::FailedNeighbor;
    }
    if config.avoid_loop.is_proactive() {
        if bundle.geo_route.contains(&neighbor) {
            return CheckValue::ClosingLoop;
        }
        let passes_other_geo_node = hops.iter().any(|&hop| {
            contacts.get_contact(hop).map_or(false, |c| bundle.geo_route.contains(&c.info.to_node) || bundle.geo_route.contains(&c.info.from_node))
        });
        if passes_other_geo_node {
            return CheckValue::PossibleLoop;
        }
    }
    CheckValue::NoLoop
}

/// Subtracts convergence-layer overhead (percentage with floor) from a residual volume figure
/// (§4.5 step 6).
fn apply_overhead(volume: Volume, config: &EngineConfig) -> Volume {
    let overhead = (volume * config.perc_convergence_layer_overhead / 100.0).max(config.min_convergence_layer_overhead);
    (volume - overhead).max(0.0)
}

/// Evaluates every route in `destination`'s `selected_routes` against the bundle, books
/// tentative volume on every survivor, and returns the surviving candidate ids along with the
/// journal needed to undo bookings for whichever of them phase 3 does not ultimately choose
/// (§4.5).
pub fn select_candidates(
    destination: NodeID,
    now: Date,
    bundle: &Bundle,
    excluded_neighbors: &HashSet<NodeID>,
    contacts: &mut ContactPlanStore,
    registry: &mut NodeRegistry,
    backlog: &dyn BacklogQuery,
    config: &EngineConfig,
) -> Result<(Vec<RouteId>, BookingJournal), crate::error::CgrError> {
    let route_ids = registry.object(destination).map(|o| o.selected_routes.clone()).unwrap_or_default();
    let mut journal = BookingJournal::default();
    let mut candidates = Vec::new();

    for route_id in route_ids {
        let Some(route) = registry.route(route_id) else { continue };
        let next_hop = route.next_hop;
        let to_time = route.to_time;
        let from_time = route.from_time;
        let arrival_time = route.arrival_time;
        let confidence = route.confidence;
        let hops = route.hops.clone();

        if to_time <= now || excluded_neighbors.contains(&next_hop) {
            trace!("route to {} via {} rejected: expired or excluded neighbor", destination, next_hop);
            continue;
        }

        let check_value = evaluate_loop_avoidance(next_hop, &hops, bundle, contacts, config);

        let (applicable_backlog, total_backlog) = backlog.query(next_hop, bundle.priority, bundle.ordinal)?;
        let first_hop_rate = contacts.get_contact(hops[0]).map(|c| c.info.xmit_rate).unwrap_or(0.0);
        let mut delay = if first_hop_rate > 0.0 { applicable_backlog / first_hop_rate } else { 0.0 };
        if config.queue_delay == QueueDelay::AllHops {
            for &hop in &hops[1..] {
                if let Some(contact) = contacts.get_contact(hop) {
                    if contact.info.xmit_rate > 0.0 {
                        let residual = contact.mtv[bundle.priority.index()];
                        delay += total_backlog.min(residual) / contact.info.xmit_rate;
                    }
                }
            }
        }
        let eto = from_time.max(now) + delay;
        let pbat = arrival_time + delay;

        if pbat > bundle.expiration_time {
            trace!("route to {} via {} rejected: pbat {} exceeds deadline {}", destination, next_hop, pbat, bundle.expiration_time);
            continue;
        }

        let route_volume_limit = hops
            .iter()
            .filter_map(|&hop| contacts.get_contact(hop))
            .map(|c| apply_overhead(c.confidence_weighted_residual(bundle.priority), config))
            .fold(Volume::INFINITY, f64::min);

        if bundle.evc > route_volume_limit && !bundle.flags.fragmentable && !bundle.flags.critical {
            trace!("route to {} via {} rejected: evc {} exceeds rvl {}", destination, next_hop, bundle.evc, route_volume_limit);
            continue;
        }

        if !config.neglect_confidence && !bundle.flags.critical && confidence < bundle.dlv_confidence + config.min_confidence_improvement {
            trace!("route to {} via {} rejected: confidence {} below floor", destination, next_hop, confidence);
            continue;
        }

        let mut protected_total = 0.0;
        let mut overbooked_total = 0.0;
        for &hop in &hops {
            if let Some(contact) = contacts.get_contact_mut(hop) {
                let (protected, overbooked) = contact.book(bundle.priority, bundle.evc);
                journal.record(route_id, hop, bundle.priority, protected);
                protected_total += protected;
                overbooked_total += overbooked;
            }
        }

        if let Some(route) = registry.route_mut(route_id) {
            route.check_value = check_value;
            route.eto = eto;
            route.pbat = pbat;
            route.route_volume_limit = route_volume_limit;
            route.protected = protected_total;
            route.overbooked = overbooked_total;
        }

        candidates.push(route_id);
    }

    Ok((candidates, journal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::NoBacklog;
    use crate::bundle::BundleFlags;
    use crate::contact::{ContactInfo, ContactType};
    use crate::contact_plan::AddOutcome;
    use crate::route::Route;

    fn scheduled(from: NodeID, to: NodeID, from_time: Date, to_time: Date, rate: f64) -> ContactInfo {
        ContactInfo { from_node: from, to_node: to, from_time, to_time, xmit_rate: rate, confidence: 1.0, contact_type: ContactType::Scheduled }
    }

    fn bundle(terminus: NodeID, size: Volume, expiration: Date) -> Bundle {
        Bundle {
            terminus,
            sender: 1,
            size,
            evc: size,
            expiration_time: expiration,
            priority: Priority::Normal,
            ordinal: 0,
            flags: BundleFlags::default(),
            dlv_confidence: 0.0,
            msr_route: None,
            failed_neighbors: Vec::new(),
            geo_route: Vec::new(),
        }
    }

    fn setup_direct_route(contacts: &mut ContactPlanStore, registry: &mut NodeRegistry) -> RouteId {
        let id = match contacts.add_contact(scheduled(1, 2, 0.0, 100.0, 1000.0)).unwrap() {
            AddOutcome::Added(id) => id,
            _ => unreachable!(),
        };
        let route = Route::new(2, vec![id], 2, 0.0, 100.0, 10.0, 1.0, 10.0, 0.0);
        let route_id = registry.insert_route(route);
        contacts.get_contact_mut(id).unwrap().cite(route_id);
        registry.object_mut(2).selected_routes.push(route_id);
        route_id
    }

    #[test]
    fn feasible_route_survives_and_books_volume() {
        let mut contacts = ContactPlanStore::new();
        let mut registry = NodeRegistry::new();
        let route_id = setup_direct_route(&mut contacts, &mut registry);
        let b = bundle(2, 1000.0, 1000.0);
        let config = EngineConfig::ccsds_sabr();

        let (candidates, _journal) = select_candidates(2, 0.0, &b, &HashSet::new(), &mut contacts, &mut registry, &NoBacklog, &config).unwrap();
        assert_eq!(candidates, vec![route_id]);
        let route = registry.route(route_id).unwrap();
        assert_eq!(route.check_value, CheckValue::NoLoop);
        assert_eq!(route.protected, 1000.0);
    }

    #[test]
    fn route_past_deadline_is_rejected() {
        let mut contacts = ContactPlanStore::new();
        let mut registry = NodeRegistry::new();
        setup_direct_route(&mut contacts, &mut registry);
        let b = bundle(2, 1000.0, 5.0);
        let config = EngineConfig::ccsds_sabr();

        let (candidates, _) = select_candidates(2, 0.0, &b, &HashSet::new(), &mut contacts, &mut registry, &NoBacklog, &config).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn oversized_non_fragmentable_bundle_is_rejected() {
        let mut contacts = ContactPlanStore::new();
        let mut registry = NodeRegistry::new();
        setup_direct_route(&mut contacts, &mut registry);
        let mut b = bundle(2, 1_000_000.0, 1000.0);
        b.evc = 1_000_000.0;
        let config = EngineConfig::ccsds_sabr();

        let (candidates, _) = select_candidates(2, 0.0, &b, &HashSet::new(), &mut contacts, &mut registry, &NoBacklog, &config).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn fragmentable_oversized_bundle_survives_rvl_check() {
        let mut contacts = ContactPlanStore::new();
        let mut registry = NodeRegistry::new();
        setup_direct_route(&mut contacts, &mut registry);
        let mut b = bundle(2, 1_000_000.0, 1000.0);
        b.evc = 1_000_000.0;
        b.flags.fragmentable = true;
        let config = EngineConfig::ccsds_sabr();

        let (candidates, _) = select_candidates(2, 0.0, &b, &HashSet::new(), &mut contacts, &mut registry, &NoBacklog, &config).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn rollback_unselected_restores_mtv_for_losing_candidates() {
        let mut contacts = ContactPlanStore::new();
        let mut registry = NodeRegistry::new();
        let route_id = setup_direct_route(&mut contacts, &mut registry);
        let b = bundle(2, 1000.0, 1000.0);
        let config = EngineConfig::ccsds_sabr();

        let (_candidates, mut journal) = select_candidates(2, 0.0, &b, &HashSet::new(), &mut contacts, &mut registry, &NoBacklog, &config).unwrap();
        let hop = registry.route(route_id).unwrap().hops[0];
        let booked_mtv = contacts.get_contact(hop).unwrap().mtv[Priority::Normal.index()];

        journal.rollback_unselected(&HashSet::new(), &mut contacts);
        let restored_mtv = contacts.get_contact(hop).unwrap().mtv[Priority::Normal.index()];
        assert!(restored_mtv > booked_mtv);
    }

    #[test]
    fn excluded_neighbor_is_rejected_at_feasibility() {
        let mut contacts = ContactPlanStore::new();
        let mut registry = NodeRegistry::new();
        setup_direct_route(&mut contacts, &mut registry);
        let b = bundle(2, 1000.0, 1000.0);
        let config = EngineConfig::ccsds_sabr();
        let excluded = HashSet::from([2]);

        let (candidates, _) = select_candidates(2, 0.0, &b, &excluded, &mut contacts, &mut registry, &NoBacklog, &config).unwrap();
        assert!(candidates.is_empty());
    }
}

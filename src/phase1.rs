//! Phase 1 — the route builder (C5): time-expanded Dijkstra over contacts, per-neighbor
//! suppression to enumerate one route per local neighbor, and Yen/Lawler spur generation for
//! k-shortest alternatives (§4.4).

use std::collections::HashSet;

use log::{debug, trace};

use crate::config::EngineConfig;
use crate::contact::{ContactId, RouteId};
use crate::contact_plan::ContactPlanStore;
use crate::node::NodeRegistry;
use crate::route::{candidate_wins, Route, RoutingWork};
use crate::types::{Confidence, Date, Duration, HopCount, NodeID};

/// Finds up to `N` new routes to `destination`, where `N` is the number of local neighbors not
/// already cited by the destination's routing object, capped by `config.max_dijkstra_routes`
/// (`0` = unlimited) unless `max_routes_override` forces a different cap (used by the
/// orchestrator to give critical bundles unlimited fan-out regardless of policy). Returns the
/// number of routes added (§4.4 "Goal", "Per-neighbor iteration").
pub fn compute_routes(
    local_node: NodeID,
    destination: NodeID,
    now: Date,
    contacts: &mut ContactPlanStore,
    registry: &mut NodeRegistry,
    work: &mut RoutingWork,
    config: &EngineConfig,
    max_routes_override: Option<u32>,
) -> Result<usize, crate::error::CgrError> {
    let root = contacts
        .registration_for(local_node)
        .ok_or_else(|| crate::error::CgrError::Internal("local node has no registration contact".into()))?;

    let unrouted = registry.unrouted_neighbors(destination);
    if unrouted.is_empty() {
        return Ok(0);
    }

    let quota = max_routes_override.unwrap_or(config.max_dijkstra_routes);
    let target = if quota == 0 { unrouted.len() } else { (quota as usize).min(unrouted.len()) };

    let already_cited = registry.object(destination).map(|o| o.citations.clone()).unwrap_or_default();
    reset_suppression(contacts, local_node);
    for &neighbor in &already_cited {
        suppress_first_hops_to(contacts, local_node, neighbor);
    }

    let mut produced = 0;
    while produced < target {
        match dijkstra_search(contacts, work, root, destination, now, config) {
            Some(destination_contact) => {
                let route_id = materialize_and_store_route(destination, destination_contact, now, contacts, registry, work);
                let Some(route_id) = route_id else { break };
                let neighbor = registry.route(route_id).expect("just inserted").next_hop;
                registry.object_mut(destination).citations.insert(neighbor);
                produced += 1;
                suppress_first_hops_to(contacts, local_node, neighbor);
            }
            None => break,
        }
    }

    reset_suppression(contacts, local_node);
    debug!("phase 1 produced {} route(s) to {} (target {})", produced, destination, target);
    Ok(produced)
}

/// Clears the transient `suppressed` flag on every contact leaving `local_node`.
fn reset_suppression(contacts: &mut ContactPlanStore, local_node: NodeID) {
    let ids: Vec<ContactId> = contacts.contacts_from(local_node).map(|(id, _)| id).collect();
    for id in ids {
        if let Some(contact) = contacts.get_contact_mut(id) {
            contact.suppressed = false;
        }
    }
}

/// Suppresses every contact leaving `local_node` toward `neighbor`, so a subsequent Dijkstra
/// search is forced through a different first hop (§4.4 "Per-neighbor iteration").
fn suppress_first_hops_to(contacts: &mut ContactPlanStore, local_node: NodeID, neighbor: NodeID) {
    let ids: Vec<ContactId> = contacts.contacts_from(local_node).filter(|(_, c)| c.info.to_node == neighbor).map(|(id, _)| id).collect();
    for id in ids {
        if let Some(contact) = contacts.get_contact_mut(id) {
            contact.suppressed = true;
        }
    }
}

/// Runs one time-expanded Dijkstra search rooted at `root`, returning the contact that reaches
/// `destination` with the best metric, or `None` if unreachable (§4.4 "Algorithm").
fn dijkstra_search(contacts: &mut ContactPlanStore, work: &mut RoutingWork, root: ContactId, destination: NodeID, now: Date, config: &EngineConfig) -> Option<ContactId> {
    work.begin_search();
    work.seed_root(root, now, 1.0);
    run_search(contacts, work, root, destination, now, config)
}

/// Runs a Dijkstra search rooted at `spur_node`, seeded with the arrival/confidence/OWLT
/// already accumulated along the parent route's prefix up to and including `spur_node`, rather
/// than at `now` with confidence 1.0 (§4.4 "Yen-style k-shortest").
fn spur_search(
    contacts: &mut ContactPlanStore,
    work: &mut RoutingWork,
    spur_node: ContactId,
    destination: NodeID,
    seed_arrival: Date,
    seed_confidence: Confidence,
    seed_hop_count: HopCount,
    seed_owlt: Duration,
    now: Date,
    config: &EngineConfig,
) -> Option<ContactId> {
    work.begin_search();
    work.seed_root_with(spur_node, seed_arrival, seed_confidence, seed_hop_count, seed_owlt);
    run_search(contacts, work, spur_node, destination, now, config)
}

fn run_search(contacts: &mut ContactPlanStore, work: &mut RoutingWork, root: ContactId, destination: NodeID, now: Date, config: &EngineConfig) -> Option<ContactId> {
    let mut touched: HashSet<ContactId> = HashSet::new();
    touched.insert(root);

    loop {
        let current = pick_frontier_min(work, &touched, config.neglect_confidence)?;
        work.mark_visited(current);

        let info = contacts.get_contact(current)?.info;
        if current != root && info.to_node == destination {
            return Some(current);
        }

        let arrival = work.best_arrival(current);
        let confidence = work.best_confidence(current);

        let candidates: Vec<(ContactId, crate::contact::ContactInfo)> = contacts
            .contacts_from(info.to_node)
            .filter(|(id, c)| !c.suppressed && !work.is_visited(*id) && c.info.to_time > now)
            .map(|(id, c)| (id, c.info))
            .collect();

        for (candidate_id, candidate_info) in candidates {
            let departure = arrival.max(candidate_info.from_time);
            let owlt = match contacts.get_applicable_range(info.to_node, candidate_info.to_node, departure) {
                Some(owlt) => owlt as Duration * (1.0 + config.range_rate_margin_factor()),
                None => {
                    trace!("no applicable range {} -> {} @ {}, skipping candidate", info.to_node, candidate_info.to_node, departure);
                    continue;
                }
            };
            let candidate_arrival = departure + owlt;
            if candidate_arrival >= candidate_info.to_time {
                continue;
            }
            let candidate_confidence = confidence * candidate_info.confidence;
            if work.relax(candidate_id, candidate_arrival, candidate_confidence, owlt, current, config.neglect_confidence) {
                touched.insert(candidate_id);
            }
        }
    }
}

fn pick_frontier_min(work: &mut RoutingWork, touched: &HashSet<ContactId>, neglect_confidence: bool) -> Option<ContactId> {
    let mut best: Option<(ContactId, (Date, Confidence, HopCount, Duration))> = None;
    for &id in touched {
        if work.is_visited(id) {
            continue;
        }
        let metric = (work.best_arrival(id), work.best_confidence(id), work.hop_count(id), work.owlt_sum(id));
        if metric.0.is_infinite() {
            continue;
        }
        let wins = match best {
            None => true,
            Some((_, current)) => candidate_wins(metric, current, neglect_confidence),
        };
        if wins {
            best = Some((id, metric));
        }
    }
    best.map(|(id, _)| id)
}

/// Reconstructs the path to `destination_contact`, builds a [`Route`] from it, and files it
/// into the global route arena and the destination's `selected_routes` list, citing every hop.
fn materialize_and_store_route(
    destination: NodeID,
    destination_contact: ContactId,
    now: Date,
    contacts: &mut ContactPlanStore,
    registry: &mut NodeRegistry,
    work: &mut RoutingWork,
) -> Option<RouteId> {
    let hops = work.reconstruct_path(destination_contact);
    if hops.is_empty() {
        return None;
    }

    let first = contacts.get_contact(hops[0])?.info;
    let to_time = hops.iter().filter_map(|&h| contacts.get_contact(h)).map(|c| c.info.to_time).fold(Date::INFINITY, f64::min);

    let route = Route::new(
        destination,
        hops.clone(),
        first.to_node,
        first.from_time,
        to_time,
        work.best_arrival(destination_contact),
        work.best_confidence(destination_contact),
        work.owlt_sum(destination_contact),
        now,
    );

    let route_id = registry.insert_route(route);
    for &hop in &hops {
        if let Some(contact) = contacts.get_contact_mut(hop) {
            contact.cite(route_id);
        }
    }
    registry.object_mut(destination).selected_routes.push(route_id);
    Some(route_id)
}

/// Replays `hops` in order, returning the arrival time, accumulated confidence, and accumulated
/// OWLT at the end of each hop, the same way a fresh Dijkstra search would have computed them
/// (§4.4 step 4/5). Used to re-seed a spur search partway along a parent route without redoing
/// the whole prefix.
fn accumulate_prefix(hops: &[ContactId], contacts: &ContactPlanStore, config: &EngineConfig) -> Option<Vec<(Date, Confidence, Duration)>> {
    let mut out = Vec::with_capacity(hops.len());
    let mut arrival: f64 = 0.0;
    let mut confidence = 1.0;
    let mut owlt_sum = 0.0;
    for &hop in hops {
        let info = contacts.get_contact(hop)?.info;
        let departure = arrival.max(info.from_time);
        let owlt = contacts.get_applicable_range(info.from_node, info.to_node, departure)? as Duration * (1.0 + config.range_rate_margin_factor());
        arrival = departure + owlt;
        owlt_sum += owlt;
        confidence *= info.confidence;
        out.push((arrival, confidence, owlt_sum));
    }
    Some(out)
}

/// Builds a [`Route`] from an already-known, already-validated hop sequence (a spur's combined
/// prefix and suffix), without touching a `RoutingObject`'s lists — the caller decides whether
/// it lands in `known_routes` or `selected_routes`.
fn materialize_spur(destination: NodeID, hops: &[ContactId], now: Date, contacts: &mut ContactPlanStore, registry: &mut NodeRegistry, config: &EngineConfig) -> Option<RouteId> {
    let first = contacts.get_contact(hops[0])?.info;
    let to_time = hops.iter().filter_map(|&h| contacts.get_contact(h)).map(|c| c.info.to_time).fold(Date::INFINITY, f64::min);
    let accumulated = accumulate_prefix(hops, contacts, config)?;
    let &(arrival, confidence, owlt_sum) = accumulated.last()?;

    let route = Route::new(destination, hops.to_vec(), first.to_node, first.from_time, to_time, arrival, confidence, owlt_sum, now);
    let route_id = registry.insert_route(route);
    for &hop in hops {
        if let Some(contact) = contacts.get_contact_mut(hop) {
            contact.cite(route_id);
        }
    }
    Some(route_id)
}

/// Generates Yen/Lawler spur routes from `parent`: for each of its hops, suppresses the edge
/// immediately following it and reruns Dijkstra rooted at that hop (Lawler's refinement — only
/// the one deviating edge is suppressed, not the whole prefix), filing any result that differs
/// from `parent` as a child spur in `destination`'s `known_routes` pool. A no-op once `parent`
/// already has its spurs computed (§4.4 "Yen-style k-shortest").
pub fn compute_spurs(
    parent_id: RouteId,
    destination: NodeID,
    now: Date,
    contacts: &mut ContactPlanStore,
    registry: &mut NodeRegistry,
    work: &mut RoutingWork,
    config: &EngineConfig,
) -> Result<usize, crate::error::CgrError> {
    let Some(parent) = registry.route(parent_id) else { return Ok(0) };
    if parent.spurs_computed {
        return Ok(0);
    }
    let hops = parent.hops.clone();
    let Some(prefix_state) = accumulate_prefix(&hops, contacts, config) else {
        return Ok(0);
    };

    let mut produced = 0;
    for i in 0..hops.len() {
        let spur_node = hops[i];
        let following = hops.get(i + 1).copied();
        if let Some(next) = following {
            if let Some(contact) = contacts.get_contact_mut(next) {
                contact.suppressed = true;
            }
        }

        let (seed_arrival, seed_confidence, seed_owlt) = prefix_state[i];
        let found = spur_search(contacts, work, spur_node, destination, seed_arrival, seed_confidence, i as HopCount + 1, seed_owlt, now, config);

        if let Some(next) = following {
            if let Some(contact) = contacts.get_contact_mut(next) {
                contact.suppressed = false;
            }
        }

        let Some(destination_contact) = found else { continue };
        let mut suffix = work.reconstruct_path(destination_contact);
        if suffix.is_empty() {
            continue;
        }
        let mut full_hops = hops[..=i].to_vec();
        full_hops.append(&mut suffix);
        if full_hops == hops {
            continue;
        }

        let Some(route_id) = materialize_spur(destination, &full_hops, now, contacts, registry, config) else { continue };
        if let Some(route) = registry.route_mut(route_id) {
            route.root_of_spur = Some(parent_id);
            route.citation_to_father = Some(spur_node);
        }
        if let Some(parent) = registry.route_mut(parent_id) {
            parent.children.push(route_id);
        }
        registry.object_mut(destination).known_routes.push(route_id);
        produced += 1;
    }

    if let Some(parent) = registry.route_mut(parent_id) {
        parent.spurs_computed = true;
    }
    debug!("generated {} spur route(s) from a selected route to {}", produced, destination);
    Ok(produced)
}

/// Promotes one route out of `destination`'s `known_routes` pool (Yen "list B") into
/// `selected_routes` ("list A"), giving phase 2 a fresh candidate without a full Dijkstra
/// re-search (§4.5 "If none survive and `knownRoutes` has spurs, promote one").
pub fn promote_spur(destination: NodeID, registry: &mut NodeRegistry) -> Option<RouteId> {
    let route_id = *registry.object(destination)?.known_routes.first()?;
    registry.promote_known_to_selected(destination, route_id);
    Some(route_id)
}

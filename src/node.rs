//! The node / neighbor registry (C3): per-destination routing state and the local-neighbor
//! set phase 1 fans Dijkstra searches out over (§4.3).

use std::collections::HashSet;
use std::collections::HashMap;

use log::debug;

use crate::arena::Arena;
use crate::contact::RouteId;
use crate::contact_plan::ContactPlanStore;
use crate::route::Route;
use crate::types::{Date, NodeID};

/// Per-destination routing state: the two Yen route lists and the set of local neighbors a
/// route to this destination has already been found through (§3, §4.4 "Outputs").
#[derive(Debug, Default)]
pub struct RoutingObject {
    /// Yen "list A": finalized routes, reusable across calls without recomputation.
    pub selected_routes: Vec<RouteId>,
    /// Yen "list B": computed-but-unpromoted spur candidates, consulted when phase 2 needs an
    /// alternative to every currently selected route.
    pub known_routes: Vec<RouteId>,
    /// Local neighbors through which at least one route to this destination has been found;
    /// phase 1 only needs to search through a neighbor not already in this set (§4.4 "Goal").
    pub citations: HashSet<NodeID>,
}

impl RoutingObject {
    fn is_empty(&self) -> bool {
        self.selected_routes.is_empty() && self.known_routes.is_empty() && self.citations.is_empty()
    }
}

/// Owns the global route arena and the per-destination [`RoutingObject`] map, plus the
/// derived local-neighbor set (§4.3).
pub struct NodeRegistry {
    routes: Arena<Route>,
    objects: HashMap<NodeID, RoutingObject>,
    /// Nodes for which the local node has at least one future scheduled contact, as of the
    /// last rebuild.
    local_neighbors: HashSet<NodeID>,
}

impl NodeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        NodeRegistry { routes: Arena::new(), objects: HashMap::new(), local_neighbors: HashSet::new() }
    }

    /// Returns the routing object for `destination`, materializing an empty one on first
    /// access (§4.3 "materialized lazily").
    pub fn object_mut(&mut self, destination: NodeID) -> &mut RoutingObject {
        self.objects.entry(destination).or_default()
    }

    /// Returns the routing object for `destination`, if one has been materialized.
    pub fn object(&self, destination: NodeID) -> Option<&RoutingObject> {
        self.objects.get(&destination)
    }

    /// Allocates a new route in the global arena, returning its id.
    pub fn insert_route(&mut self, route: Route) -> RouteId {
        self.routes.insert(route)
    }

    /// Borrows a route by id.
    pub fn route(&self, id: RouteId) -> Option<&Route> {
        self.routes.get(id)
    }

    /// Mutably borrows a route by id.
    pub fn route_mut(&mut self, id: RouteId) -> Option<&mut Route> {
        self.routes.get_mut(id)
    }

    /// Removes a route from the arena and uncites it from every contact it traversed
    /// (§3 "Ownership"). Does not remove it from any `RoutingObject`'s lists — callers that
    /// drain a list should call this once per id they remove.
    pub fn remove_route(&mut self, id: RouteId, contacts: &mut ContactPlanStore) {
        if let Some(route) = self.routes.remove(id) {
            for hop in &route.hops {
                if let Some(contact) = contacts.get_contact_mut(*hop) {
                    contact.uncite(id);
                }
            }
        }
    }

    /// Removes exactly `ids` from `destination`'s routing object and uncites them from every
    /// hop they traversed, leaving every other cached route (to this destination or any other)
    /// untouched (§8 invariant 9: "no more, no less"). A neighbor is dropped from the
    /// destination's citation set only once none of its remaining routes still reference it, so
    /// phase 1 knows to search through that neighbor again.
    pub fn remove_routes(&mut self, destination: NodeID, ids: &HashSet<RouteId>, contacts: &mut ContactPlanStore) {
        if ids.is_empty() {
            return;
        }

        let mut removed_next_hops = HashSet::new();
        for &id in ids {
            if let Some(route) = self.routes.get(id) {
                removed_next_hops.insert(route.next_hop);
            }
        }

        if let Some(object) = self.objects.get_mut(&destination) {
            object.selected_routes.retain(|id| !ids.contains(id));
            object.known_routes.retain(|id| !ids.contains(id));
        }

        for &id in ids {
            self.remove_route(id, contacts);
        }

        let mut still_routed = HashSet::new();
        if let Some(object) = self.objects.get(&destination) {
            for &id in object.selected_routes.iter().chain(object.known_routes.iter()) {
                if let Some(route) = self.routes.get(id) {
                    still_routed.insert(route.next_hop);
                }
            }
        }
        if let Some(object) = self.objects.get_mut(&destination) {
            object.citations.retain(|neighbor| still_routed.contains(neighbor) || !removed_next_hops.contains(neighbor));
        }

        self.objects.retain(|_, o| !o.is_empty());
        debug!("removed {} route(s) from destination {}", ids.len(), destination);
    }

    /// Drops every route associated with `destination` and clears its neighbor citations
    /// (§4.3 `reset(node)`).
    pub fn reset(&mut self, destination: NodeID, contacts: &mut ContactPlanStore) {
        let Some(object) = self.objects.get_mut(&destination) else { return };
        let selected = std::mem::take(&mut object.selected_routes);
        let known = std::mem::take(&mut object.known_routes);
        object.citations.clear();
        for id in selected.into_iter().chain(known) {
            self.remove_route(id, contacts);
        }
        self.objects.retain(|_, o| !o.is_empty());
        debug!("reset routing object for destination {}", destination);
    }

    /// Resets every destination's routing object; called when the contact-plan edit time has
    /// advanced since the last call (§4.8 step 1).
    pub fn invalidate_all(&mut self, contacts: &mut ContactPlanStore) {
        let destinations: Vec<NodeID> = self.objects.keys().copied().collect();
        for destination in destinations {
            self.reset(destination, contacts);
        }
    }

    /// Removes `id` from a destination's route lists without freeing it from the arena; used
    /// when promoting a spur from `known_routes` into `selected_routes` rather than deleting
    /// it.
    pub fn promote_known_to_selected(&mut self, destination: NodeID, id: RouteId) {
        let object = self.objects.entry(destination).or_default();
        if let Some(pos) = object.known_routes.iter().position(|&r| r == id) {
            object.known_routes.remove(pos);
        }
        if !object.selected_routes.contains(&id) {
            object.selected_routes.push(id);
        }
    }

    /// Recomputes the local-neighbor set from every scheduled contact out of `local_node` that
    /// has not yet expired, and drops any destination citations naming a neighbor that fell out
    /// of the set (§4.3 `remove_old_neighbors`).
    pub fn remove_old_neighbors(&mut self, local_node: NodeID, contacts: &ContactPlanStore, now: Date) {
        let fresh: HashSet<NodeID> = contacts
            .contacts_from(local_node)
            .filter(|(_, c)| c.info.contact_type == crate::contact::ContactType::Scheduled && c.info.to_time > now)
            .map(|(_, c)| c.info.to_node)
            .collect();

        let dropped: Vec<NodeID> = self.local_neighbors.difference(&fresh).copied().collect();
        if !dropped.is_empty() {
            for object in self.objects.values_mut() {
                for neighbor in &dropped {
                    object.citations.remove(neighbor);
                }
            }
            debug!("dropped {} stale local neighbor(s)", dropped.len());
        }
        self.local_neighbors = fresh;
    }

    /// The current local-neighbor set, as of the last [`NodeRegistry::remove_old_neighbors`]
    /// call.
    pub fn local_neighbors(&self) -> &HashSet<NodeID> {
        &self.local_neighbors
    }

    /// Local neighbors not yet cited by `destination`'s routing object, i.e. the neighbors
    /// phase 1 still needs to search through to satisfy its per-call route quota (§4.4 "Goal").
    pub fn unrouted_neighbors(&self, destination: NodeID) -> Vec<NodeID> {
        let routed = self.objects.get(&destination).map(|o| &o.citations);
        self.local_neighbors
            .iter()
            .copied()
            .filter(|n| routed.map_or(true, |r| !r.contains(n)))
            .collect()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

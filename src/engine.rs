//! The orchestrator (C9): the one entry point a host actually calls, tying the contact-plan
//! store, the node registry, and phases 1 through 3 into the per-call pipeline (§4.8).

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

use log::{debug, info};

use crate::backlog::BacklogQuery;
use crate::bundle::Bundle;
use crate::config::EngineConfig;
use crate::contact::{ContactId, RouteId};
use crate::contact_plan::{AddOutcome, ContactPlanStore};
use crate::error::CgrError;
use crate::node::NodeRegistry;
use crate::range::RangeId;
use crate::route::{Route, RoutingWork};
use crate::types::{Confidence, DataRate, Date, EditTime, NodeID, Owlt};
use crate::{msr, phase1, phase2, phase3};

/// A routing engine bound to one local node's contact plan and policy. Owns every mutable
/// structure a call touches: the contact-plan store, the per-destination route cache, and the
/// reusable Dijkstra scratch space.
///
/// Deliberately `!Sync` (§5): a `Cell` marker field documents the single-call-at-a-time
/// contract in the type system rather than a comment, since the scratch structures beneath
/// this use plain mutation, not atomics or locking.
pub struct CgrEngine {
    local_node: NodeID,
    config: EngineConfig,
    contacts: ContactPlanStore,
    registry: NodeRegistry,
    work: RoutingWork,
    backlog: Box<dyn BacklogQuery>,
    /// The contact-plan edit time as of the last call, used to detect concurrent mutation and
    /// trigger a full cache invalidation (§4.8 step 1).
    last_seen_edit_time: EditTime,
    /// The `now` passed to the last call, enforcing the monotone-time contract (§5, §7).
    last_seen_now: Date,
    _not_sync: PhantomData<Cell<()>>,
}

impl CgrEngine {
    /// One-time setup: seeds the local node's registration contact and stores `config` and
    /// `backlog` for the lifetime of the engine (§6).
    pub fn initialize(own_node: NodeID, reference_time: Date, config: EngineConfig, backlog: Box<dyn BacklogQuery>) -> Result<Self, CgrError> {
        if own_node == 0 {
            return Err(CgrError::BadArgument("own_node must be non-zero".into()));
        }

        let mut contacts = ContactPlanStore::new();
        contacts.add_contact(crate::contact::ContactInfo {
            from_node: own_node,
            to_node: own_node,
            from_time: 0.0,
            to_time: crate::types::MAX_TIME,
            xmit_rate: 0.0,
            confidence: 1.0,
            contact_type: crate::contact::ContactType::Registration,
        })?;
        let last_seen_edit_time = contacts.edit_time();

        info!("engine initialized for node {}", own_node);
        Ok(CgrEngine {
            local_node: own_node,
            config,
            contacts,
            registry: NodeRegistry::new(),
            work: RoutingWork::new(),
            backlog,
            last_seen_edit_time,
            last_seen_now: reference_time,
            _not_sync: PhantomData,
        })
    }

    /// Adds a contact, or revises an existing one sharing the identical window (§4.2, §6).
    pub fn add_contact(&mut self, info: crate::contact::ContactInfo) -> Result<AddOutcome, CgrError> {
        self.upsert_contact(info)
    }

    /// Revises an existing contact's rate and confidence, rejecting the call with
    /// [`CgrError::NotFound`] if no contact shares `info`'s `(from, to, from_time, to_time)`
    /// window, rather than silently creating one the way [`Self::add_contact`] would (§6).
    pub fn revise_contact(&mut self, info: crate::contact::ContactInfo) -> Result<AddOutcome, CgrError> {
        match self.upsert_contact(info)? {
            AddOutcome::Added(id) => {
                self.contacts.remove_contact(id)?;
                Err(CgrError::NotFound)
            }
            revised @ AddOutcome::Revised(_) => Ok(revised),
        }
    }

    fn upsert_contact(&mut self, info: crate::contact::ContactInfo) -> Result<AddOutcome, CgrError> {
        let previous_rate = self
            .contacts
            .contacts_from(info.from_node)
            .find(|(_, c)| c.info.to_node == info.to_node && c.info.from_time == info.from_time)
            .map(|(_, c)| c.info.xmit_rate);

        let outcome = self.contacts.add_contact(info)?;
        if let AddOutcome::Revised(id) = outcome {
            if previous_rate != Some(info.xmit_rate) {
                if let Some(contact) = self.contacts.get_contact(id) {
                    let citations = contact.citations.clone();
                    self.cascade_invalidate(citations);
                }
            }
        }
        Ok(outcome)
    }

    /// Revises only a contact's confidence. Not considered a significant contact-plan change:
    /// cached routes survive (§4.2).
    pub fn revise_confidence(&mut self, id: ContactId, confidence: Confidence) -> Result<(), CgrError> {
        self.contacts.revise_confidence(id, confidence)
    }

    /// Revises a contact's transmission rate, invalidating every route that cites it (resolved
    /// Open Question §9(a)).
    pub fn revise_xmit_rate(&mut self, id: ContactId, xmit_rate: DataRate) -> Result<(), CgrError> {
        let citations = self.contacts.revise_xmit_rate(id, xmit_rate)?;
        self.cascade_invalidate(citations);
        Ok(())
    }

    /// Removes a contact, invalidating every route that traversed it.
    pub fn remove_contact(&mut self, id: ContactId) -> Result<(), CgrError> {
        let contact = self.contacts.remove_contact(id)?;
        self.cascade_invalidate(contact.citations);
        Ok(())
    }

    /// Adds a propagation-delay range.
    pub fn add_range(&mut self, from_node: NodeID, to_node: NodeID, from_time: Date, to_time: Date, owlt: Owlt) -> Result<RangeId, CgrError> {
        self.contacts.add_range(from_node, to_node, from_time, to_time, owlt)
    }

    /// Removes a propagation-delay range.
    pub fn remove_range(&mut self, id: RangeId) -> Result<(), CgrError> {
        self.contacts.remove_range(id)?;
        Ok(())
    }

    /// Removes exactly the routes in `citations` from their owning destinations' routing
    /// objects, leaving every other cached route untouched (§8 invariant 9: "Contact removal
    /// invalidates exactly the routes whose hops reference it, no more, no less").
    fn cascade_invalidate(&mut self, citations: HashSet<RouteId>) {
        if citations.is_empty() {
            return;
        }
        let mut by_destination: HashMap<NodeID, HashSet<RouteId>> = HashMap::new();
        for id in citations {
            if let Some(route) = self.registry.route(id) {
                by_destination.entry(route.terminus).or_default().insert(id);
            }
        }
        for (destination, ids) in by_destination {
            self.registry.remove_routes(destination, &ids, &mut self.contacts);
        }
    }

    /// The main call (§4.8, §6): tries MSR, falls through to the P1↔P2 iteration, then P3,
    /// returning the forwarding set the host should actually transmit along.
    ///
    /// `bundle.evc` is overwritten from `bundle.size` and the active config rather than trusted
    /// from the caller, per `Bundle`'s own field doc. An already-expired bundle is a no-op
    /// (`Ok(vec![])`, return code `0` in the distilled spec's convention) rather than an error;
    /// a bundle that survives every rejection but still has no feasible route is
    /// [`CgrError::NoRoute`] (return code `−1`).
    pub fn get_best_routes(&mut self, now: Date, mut bundle: Bundle, excluded_neighbors: &HashSet<NodeID>) -> Result<Vec<Route>, CgrError> {
        if now < self.last_seen_now {
            return Err(CgrError::ClockRegression { now, last_seen: self.last_seen_now });
        }

        let edit_time = self.contacts.edit_time();
        if edit_time > self.last_seen_edit_time {
            self.registry.invalidate_all(&mut self.contacts);
            self.registry.remove_old_neighbors(self.local_node, &self.contacts, now);
            self.last_seen_edit_time = edit_time;
            debug!("contact plan changed since last call, invalidated all cached routes to node {}", self.local_node);
        }

        self.contacts.remove_expired(now);
        self.last_seen_now = now;

        if bundle.expiration_time <= now {
            debug!("bundle to {} already past its deadline at call time, no-op", bundle.terminus);
            return Ok(Vec::new());
        }

        bundle.evc = Bundle::compute_evc(bundle.size, &self.config);
        self.registry.object_mut(bundle.terminus);

        let mut excluded = excluded_neighbors.clone();
        if self.config.avoid_loop.is_reactive() {
            excluded.extend(bundle.failed_neighbors.iter().copied());
        }
        if !bundle.flags.backward_propagation {
            excluded.insert(bundle.sender);
        }

        if let Some(route) = self.try_msr(now, &bundle, &excluded)? {
            return Ok(route);
        }

        let (candidates, mut journal) = self.drive_phase1_phase2(now, &bundle, &excluded)?;
        let chosen = phase3::choose_forwarding_set(&candidates, &self.registry, &bundle, &self.config);

        if chosen.is_empty() {
            journal.rollback_all(&mut self.contacts);
            return Err(CgrError::NoRoute);
        }

        let keep: HashSet<RouteId> = chosen.iter().copied().collect();
        journal.rollback_unselected(&keep, &mut self.contacts);
        Ok(chosen.iter().filter_map(|&id| self.registry.route(id).cloned()).collect())
    }

    /// Attempts the MSR fast path. Returns `Ok(Some(routes))` if the adopted route survived
    /// phase 2/3 and the call should return immediately; `Ok(None)` to fall through to the
    /// full pipeline, discarding whatever MSR candidate was provisionally inserted so it does
    /// not pollute the next call's cache (§4.7 step 6).
    fn try_msr(&mut self, now: Date, bundle: &Bundle, excluded: &HashSet<NodeID>) -> Result<Option<Vec<Route>>, CgrError> {
        let Some(msr_route_id) = msr::attempt(bundle, self.local_node, bundle.terminus, now, &mut self.contacts, &mut self.registry, &self.config) else {
            return Ok(None);
        };

        let (candidates, mut journal) = phase2::select_candidates(bundle.terminus, now, bundle, excluded, &mut self.contacts, &mut self.registry, self.backlog.as_ref(), &self.config)?;
        let chosen = phase3::choose_forwarding_set(&candidates, &self.registry, bundle, &self.config);

        if !chosen.is_empty() {
            let keep: HashSet<RouteId> = chosen.iter().copied().collect();
            journal.rollback_unselected(&keep, &mut self.contacts);
            debug!("MSR fast path produced {} route(s) to {}", keep.len(), bundle.terminus);
            return Ok(Some(chosen.iter().filter_map(|&id| self.registry.route(id).cloned()).collect()));
        }

        journal.rollback_all(&mut self.contacts);
        self.registry.object_mut(bundle.terminus).selected_routes.retain(|&id| id != msr_route_id);
        self.registry.remove_route(msr_route_id, &mut self.contacts);
        debug!("MSR candidate for {} did not survive phase 2, falling through to the full pipeline", bundle.terminus);
        Ok(None)
    }

    /// Alternates phase 1 (compute more routes) and phase 2 (evaluate what is cached) until
    /// phase 2 finds at least one survivor or phase 1 can no longer produce new routes (§4.8
    /// step 4). Once every local neighbor has a cached route and phase 2 still has no survivor,
    /// falls back to generating Yen/Lawler spurs off the existing selected routes and promoting
    /// one at a time (§4.5 "If none survive and `knownRoutes` has spurs, promote one ... loop").
    /// Bounded by the local-neighbor count plus a fixed spur-promotion budget, since each round
    /// either cites a previously-unrouted neighbor or promotes exactly one spur.
    fn drive_phase1_phase2(&mut self, now: Date, bundle: &Bundle, excluded: &HashSet<NodeID>) -> Result<(Vec<RouteId>, phase2::BookingJournal), CgrError> {
        const MAX_SPUR_PROMOTIONS: usize = 8;
        let max_routes_override = if bundle.flags.critical { Some(0) } else { None };
        let iteration_cap = self.registry.local_neighbors().len() + 1 + MAX_SPUR_PROMOTIONS;

        let mut candidates = Vec::new();
        let mut journal = phase2::BookingJournal::default();

        for _ in 0..iteration_cap {
            let (found, this_journal) = phase2::select_candidates(bundle.terminus, now, bundle, excluded, &mut self.contacts, &mut self.registry, self.backlog.as_ref(), &self.config)?;
            candidates = found;
            journal = this_journal;
            if !candidates.is_empty() {
                break;
            }
            let produced = phase1::compute_routes(self.local_node, bundle.terminus, now, &mut self.contacts, &mut self.registry, &mut self.work, &self.config, max_routes_override)?;
            if produced > 0 {
                continue;
            }
            if !self.promote_a_spur(bundle.terminus, now)? {
                break;
            }
        }

        Ok((candidates, journal))
    }

    /// Generates spurs off every selected route to `destination` that does not have them yet,
    /// then promotes the first known spur into `selected_routes`. Returns whether a spur was
    /// promoted, i.e. whether phase 2 has new ground to cover (§4.5 "promote one ... loop").
    fn promote_a_spur(&mut self, destination: NodeID, now: Date) -> Result<bool, CgrError> {
        let parents = self.registry.object(destination).map(|o| o.selected_routes.clone()).unwrap_or_default();
        for parent_id in parents {
            if self.registry.route(parent_id).map_or(true, |r| r.spurs_computed) {
                continue;
            }
            phase1::compute_spurs(parent_id, destination, now, &mut self.contacts, &mut self.registry, &mut self.work, &self.config)?;
        }
        Ok(phase1::promote_spur(destination, &mut self.registry).is_some())
    }

    /// Final teardown (§6): drops every contact, range, and cached route.
    pub fn destroy(&mut self, _now: Date) {
        self.contacts.destroy();
        self.registry = NodeRegistry::new();
        self.work = RoutingWork::new();
        info!("engine destroyed for node {}", self.local_node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::NoBacklog;
    use crate::bundle::BundleFlags;
    use crate::contact::ContactType;

    fn bundle(terminus: NodeID, expiration: Date) -> Bundle {
        Bundle {
            terminus,
            sender: 1,
            size: 100.0,
            evc: 0.0,
            expiration_time: expiration,
            priority: crate::types::Priority::Normal,
            ordinal: 0,
            flags: BundleFlags::default(),
            dlv_confidence: 0.0,
            msr_route: None,
            failed_neighbors: Vec::new(),
            geo_route: Vec::new(),
        }
    }

    fn scheduled(from: NodeID, to: NodeID, from_time: Date, to_time: Date) -> crate::contact::ContactInfo {
        crate::contact::ContactInfo { from_node: from, to_node: to, from_time, to_time, xmit_rate: 1000.0, confidence: 1.0, contact_type: ContactType::Scheduled }
    }

    #[test]
    fn direct_route_is_found_end_to_end() {
        let mut engine = CgrEngine::initialize(1, 0.0, EngineConfig::ccsds_sabr(), Box::new(NoBacklog)).unwrap();
        engine.add_contact(scheduled(1, 9, 0.0, 100.0)).unwrap();
        engine.add_range(1, 9, 0.0, 100.0, 1).unwrap();

        let routes = engine.get_best_routes(0.0, bundle(9, 1000.0), &HashSet::new()).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].next_hop, 9);
    }

    #[test]
    fn unreachable_destination_is_no_route() {
        let mut engine = CgrEngine::initialize(1, 0.0, EngineConfig::ccsds_sabr(), Box::new(NoBacklog)).unwrap();
        engine.add_contact(scheduled(1, 2, 0.0, 100.0)).unwrap();
        engine.add_range(1, 2, 0.0, 100.0, 1).unwrap();

        let err = engine.get_best_routes(0.0, bundle(42, 1000.0), &HashSet::new()).unwrap_err();
        assert_eq!(err, CgrError::NoRoute);
    }

    #[test]
    fn expired_bundle_is_a_no_op() {
        let mut engine = CgrEngine::initialize(1, 0.0, EngineConfig::ccsds_sabr(), Box::new(NoBacklog)).unwrap();
        let routes = engine.get_best_routes(100.0, bundle(9, 50.0), &HashSet::new()).unwrap();
        assert!(routes.is_empty());
    }

    #[test]
    fn clock_regression_is_rejected() {
        let mut engine = CgrEngine::initialize(1, 10.0, EngineConfig::ccsds_sabr(), Box::new(NoBacklog)).unwrap();
        engine.add_contact(scheduled(1, 9, 0.0, 100.0)).unwrap();
        let err = engine.get_best_routes(5.0, bundle(9, 1000.0), &HashSet::new()).unwrap_err();
        assert!(matches!(err, CgrError::ClockRegression { .. }));
    }

    #[test]
    fn rate_revision_invalidates_cached_route_so_a_later_call_recomputes() {
        let mut engine = CgrEngine::initialize(1, 0.0, EngineConfig::ccsds_sabr(), Box::new(NoBacklog)).unwrap();
        let id = match engine.add_contact(scheduled(1, 9, 0.0, 100.0)).unwrap() {
            AddOutcome::Added(id) => id,
            _ => unreachable!(),
        };
        engine.add_range(1, 9, 0.0, 100.0, 1).unwrap();
        engine.get_best_routes(0.0, bundle(9, 1000.0), &HashSet::new()).unwrap();
        assert!(engine.registry.object(9).is_some());

        engine.revise_xmit_rate(id, 2000.0).unwrap();
        assert!(engine.registry.object(9).map_or(true, |o| o.selected_routes.is_empty()));
    }

    #[test]
    fn zero_local_node_is_rejected_at_initialize() {
        assert!(CgrEngine::initialize(0, 0.0, EngineConfig::ccsds_sabr(), Box::new(NoBacklog)).is_err());
    }

    /// Node 2 can reach 9 either via a fast detour through node 3 (which Dijkstra prefers) or
    /// directly (slower but ample capacity). The detour's last hop is volume-starved, so phase 2
    /// rejects it; the orchestrator should fall back to a Yen/Lawler spur off the same selected
    /// route and recover the direct path instead of returning `NoRoute`.
    #[test]
    fn spur_promotion_recovers_when_the_primary_route_fails_feasibility() {
        let mut engine = CgrEngine::initialize(1, 0.0, EngineConfig::ccsds_sabr(), Box::new(NoBacklog)).unwrap();
        engine.add_contact(scheduled(1, 2, 0.0, 1000.0)).unwrap();
        engine.add_range(1, 2, 0.0, 1000.0, 1).unwrap();
        engine.add_contact(scheduled(2, 9, 0.0, 1000.0)).unwrap();
        engine.add_range(2, 9, 0.0, 1000.0, 50).unwrap();
        engine.add_contact(scheduled(2, 3, 0.0, 1000.0)).unwrap();
        engine.add_range(2, 3, 0.0, 1000.0, 1).unwrap();

        let mut starved = scheduled(3, 9, 0.0, 1000.0);
        starved.xmit_rate = 0.05;
        engine.add_contact(starved).unwrap();
        engine.add_range(3, 9, 0.0, 1000.0, 1).unwrap();

        let routes = engine.get_best_routes(0.0, bundle(9, 1000.0), &HashSet::new()).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].next_hop, 2);
        assert_eq!(routes[0].hop_count, 2, "should have fallen back to the direct 2-hop spur, not the starved 3-hop path");
    }
}

//! Routes (phase-1 output, phase-2 annotation) and the Dijkstra scratch space phase 1 reuses
//! across calls (§4.4, §4.5, §4.6).

use crate::arena::Index;
use crate::contact::{ContactId, RouteId};
use crate::types::{Confidence, Date, HopCount, NodeID, Volume};

/// The outcome of phase 2's loop-avoidance check on a candidate route (§4.5 step 2).
///
/// Declaration order is the comparator order phase 3 sorts by (§4.6 step 1: "lower `checkValue`
/// loop class"): neither `ClosingLoop` nor `FailedNeighbor` removes a route from candidacy by
/// itself, they only rank it behind every class that precedes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum CheckValue {
    /// Not yet evaluated this call.
    #[default]
    Unchecked,
    /// No loop risk detected.
    NoLoop,
    /// The route's neighbor overlaps the bundle's geo-route without closing it; ranked below
    /// `NoLoop` under proactive loop avoidance.
    PossibleLoop,
    /// The route would close a loop back through the bundle's own geo-route; ranked below
    /// `PossibleLoop`.
    ClosingLoop,
    /// The route's neighbor already failed to forward this bundle under reactive loop
    /// avoidance; ranked worst.
    FailedNeighbor,
}

/// A candidate path from the local node to a destination, found by phase 1 and annotated by
/// phase 2 (§4.4, §4.5, §4.6).
///
/// Routes also double as nodes of the Yen/Lawler k-shortest-path search tree: a spur route's
/// `root_of_spur` names the prefix route it deviated from, and `children` lists every spur
/// computed from this route so far.
#[derive(Debug, Clone)]
pub struct Route {
    /// The bundle's final destination this route was computed for.
    pub terminus: NodeID,
    /// The contacts along the path, in transmission order. `hops[0].to_node` is the next-hop
    /// neighbor.
    pub hops: Vec<ContactId>,
    /// The next-hop neighbor, i.e. `hops[0].to_node`; cached because phase 3 groups routes by
    /// neighbor.
    pub next_hop: NodeID,
    /// The first hop's `from_time`: the earliest the route could begin, ignoring backlog.
    pub from_time: Date,
    /// The minimum `to_time` across every hop: the latest this route remains viable at all.
    pub to_time: Date,
    /// The time a bundle transmitted along this route's first hop is expected to arrive at the
    /// destination, before queue delay (§4.4 step 4).
    pub arrival_time: Date,
    /// The product of every hop's contact confidence (§4.4 step 5).
    pub confidence: Confidence,
    /// Number of contacts in `hops`.
    pub hop_count: HopCount,
    /// Sum of each hop's OWLT (including range-rate margin), used as the final phase-3
    /// tiebreak (§4.6 comparator step 5).
    pub owlt_sum: crate::types::Duration,
    /// The time phase 1 computed this route, used by the MSR fast path and diagnostics.
    pub computed_at: Date,

    /// Earliest time this route's first hop can actually begin transmitting the bundle,
    /// accounting for backlog ahead of it (§4.5 step 3).
    pub eto: Date,
    /// Projected bundle arrival time: `eto`'s corresponding arrival estimate plus propagation
    /// and, under `QueueDelay::AllHops`, every subsequent hop's backlog (§4.5 step 3).
    pub pbat: Date,
    /// The maximum volume this route can carry, after subtracting convergence-layer overhead
    /// at every hop (§4.5 step 6).
    pub route_volume_limit: Volume,
    /// Outcome of phase 2's loop and feasibility checks.
    pub check_value: CheckValue,
    /// Volume booked against this route's hops that exceeded at least one hop's residual `mtv`
    /// (§4.5 "Overbooking").
    pub overbooked: Volume,
    /// Volume booked against this route's hops that fit within every hop's residual `mtv`.
    pub protected: Volume,

    /// The prefix route this route branched from during a Yen/Lawler spur search; `None` for
    /// a route found directly by Dijkstra.
    pub root_of_spur: Option<RouteId>,
    /// Whether spur candidates have already been generated from this route (so the k-shortest
    /// search does not redo the work on a later call).
    pub spurs_computed: bool,
    /// The contact this route's citation set registers it under on its spur-root route, so the
    /// spur can be un-cited in one step if the root is invalidated.
    pub citation_to_father: Option<ContactId>,
    /// Spur routes computed from this one.
    pub children: Vec<RouteId>,
}

impl Route {
    /// Builds a freshly computed phase-1 route, with every phase-2/Yen field at its initial
    /// value.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        terminus: NodeID,
        hops: Vec<ContactId>,
        next_hop: NodeID,
        from_time: Date,
        to_time: Date,
        arrival_time: Date,
        confidence: Confidence,
        owlt_sum: crate::types::Duration,
        computed_at: Date,
    ) -> Self {
        let hop_count = hops.len() as HopCount;
        Route {
            terminus,
            hops,
            next_hop,
            from_time,
            to_time,
            arrival_time,
            confidence,
            hop_count,
            owlt_sum,
            computed_at,
            eto: 0.0,
            pbat: arrival_time,
            route_volume_limit: Volume::INFINITY,
            check_value: CheckValue::Unchecked,
            overbooked: 0.0,
            protected: 0.0,
            root_of_spur: None,
            spurs_computed: false,
            citation_to_father: None,
            children: Vec::new(),
        }
    }

    /// Whether `node` appears as an intermediate hop's sender or the route's next hop,
    /// i.e. the route passes through `node` before reaching the terminus (§4.5 proactive loop
    /// check needs this against each node of the bundle's geo-route).
    pub fn passes_through(&self, node: NodeID, contacts: &crate::contact_plan::ContactPlanStore) -> bool {
        if self.next_hop == node {
            return true;
        }
        self.hops.iter().any(|&hop| contacts.get_contact(hop).map_or(false, |c| c.info.from_node == node || c.info.to_node == node))
    }
}

/// Per-contact scratch slot reused across phase-1 Dijkstra searches. Indexed in parallel with
/// the contact arena; a `generation` stamp distinguishes "visited this search" from stale data
/// left over by a previous call, so the scratch vector only needs to grow, never be cleared
/// (SPEC_FULL.md §9 design note).
#[derive(Debug, Clone, Copy)]
struct DijkstraSlot {
    generation: u64,
    best_arrival: Date,
    best_confidence: Confidence,
    hop_count: HopCount,
    owlt_sum: crate::types::Duration,
    predecessor: Option<ContactId>,
    visited: bool,
}

impl Default for DijkstraSlot {
    fn default() -> Self {
        DijkstraSlot {
            generation: 0,
            best_arrival: Date::INFINITY,
            best_confidence: 0.0,
            hop_count: 0,
            owlt_sum: 0.0,
            predecessor: None,
            visited: false,
        }
    }
}

/// The tiebreak tuple phase 1 compares two candidate paths into the same contact by (§4.4
/// step 6): earliest arrival, then (unless neglected) higher confidence, then fewer hops, then
/// lower accumulated OWLT.
pub(crate) fn candidate_wins(
    candidate: (Date, Confidence, HopCount, crate::types::Duration),
    current: (Date, Confidence, HopCount, crate::types::Duration),
    neglect_confidence: bool,
) -> bool {
    let (c_arrival, c_confidence, c_hops, c_owlt) = candidate;
    let (b_arrival, b_confidence, b_hops, b_owlt) = current;
    if c_arrival != b_arrival {
        return c_arrival < b_arrival;
    }
    if !neglect_confidence && c_confidence != b_confidence {
        return c_confidence > b_confidence;
    }
    if c_hops != b_hops {
        return c_hops < b_hops;
    }
    c_owlt < b_owlt
}

/// Reusable Dijkstra working storage for one node's phase-1 searches (§4.4, §9).
///
/// A naive implementation would allocate a fresh `HashMap<ContactId, _>` per call; instead
/// this keeps one `Vec` sized to the contact arena and a monotonically increasing
/// `generation` counter, so starting a new search is an O(1) bump rather than an O(contacts)
/// clear.
#[derive(Debug, Default)]
pub struct RoutingWork {
    slots: Vec<DijkstraSlot>,
    generation: u64,
}

impl RoutingWork {
    /// Creates empty scratch space; it grows lazily as contact indices are touched.
    pub fn new() -> Self {
        RoutingWork { slots: Vec::new(), generation: 0 }
    }

    /// Starts a new search, invalidating every slot from prior searches in O(1).
    pub fn begin_search(&mut self) {
        self.generation += 1;
    }

    fn slot(&mut self, id: ContactId) -> &mut DijkstraSlot {
        let raw = id.raw();
        if raw >= self.slots.len() {
            self.slots.resize(raw + 1, DijkstraSlot::default());
        }
        let slot = &mut self.slots[raw];
        if slot.generation != self.generation {
            *slot = DijkstraSlot { generation: self.generation, ..DijkstraSlot::default() };
        }
        slot
    }

    /// The best known arrival time at `id` in the current search, or `+inf` if unreached.
    pub fn best_arrival(&mut self, id: ContactId) -> Date {
        self.slot(id).best_arrival
    }

    /// The confidence accumulated along the best known path to `id`.
    pub fn best_confidence(&mut self, id: ContactId) -> Confidence {
        self.slot(id).best_confidence
    }

    /// The number of hops along the best known path to `id`.
    pub fn hop_count(&mut self, id: ContactId) -> HopCount {
        self.slot(id).hop_count
    }

    /// The accumulated OWLT (including range-rate margin) along the best known path to `id`.
    pub fn owlt_sum(&mut self, id: ContactId) -> crate::types::Duration {
        self.slot(id).owlt_sum
    }

    /// Whether `id` has been popped from the frontier and finalized in the current search.
    pub fn is_visited(&mut self, id: ContactId) -> bool {
        self.slot(id).visited
    }

    /// Marks `id` visited (finalized) for the current search.
    pub fn mark_visited(&mut self, id: ContactId) {
        self.slot(id).visited = true;
    }

    /// Seeds the search root directly, bypassing `relax` since a root has no predecessor.
    pub fn seed_root(&mut self, root: ContactId, arrival: Date, confidence: Confidence) {
        self.seed_root_with(root, arrival, confidence, 0, 0.0);
    }

    /// Seeds the search root with an already-accumulated hop count and OWLT sum, for a Yen/
    /// Lawler spur search rooted partway along a parent route rather than at the local node.
    pub fn seed_root_with(&mut self, root: ContactId, arrival: Date, confidence: Confidence, hop_count: HopCount, owlt_sum: crate::types::Duration) {
        let slot = self.slot(root);
        slot.best_arrival = arrival;
        slot.best_confidence = confidence;
        slot.hop_count = hop_count;
        slot.owlt_sum = owlt_sum;
    }

    /// Relaxes the edge into `id` arriving via `predecessor` with `owlt` additional delay. If
    /// the candidate path wins the §4.4 step 6 tiebreak over the best known path, records it
    /// and returns `true`.
    pub fn relax(
        &mut self,
        id: ContactId,
        candidate_arrival: Date,
        candidate_confidence: Confidence,
        owlt: crate::types::Duration,
        predecessor: ContactId,
        neglect_confidence: bool,
    ) -> bool {
        let predecessor_hops = self.hop_count(predecessor);
        let predecessor_owlt = self.owlt_sum(predecessor);
        let candidate = (candidate_arrival, candidate_confidence, predecessor_hops + 1, predecessor_owlt + owlt);
        let slot = self.slot(id);
        let current = (slot.best_arrival, slot.best_confidence, slot.hop_count, slot.owlt_sum);
        if candidate_wins(candidate, current, neglect_confidence) {
            slot.best_arrival = candidate.0;
            slot.best_confidence = candidate.1;
            slot.hop_count = candidate.2;
            slot.owlt_sum = candidate.3;
            slot.predecessor = Some(predecessor);
            true
        } else {
            false
        }
    }

    /// The predecessor contact recorded for `id` in the current search, if any.
    pub fn predecessor(&mut self, id: ContactId) -> Option<ContactId> {
        self.slot(id).predecessor
    }

    /// Walks the predecessor chain from `id` back to (and excluding) the search root,
    /// returning hops in transmission order.
    pub fn reconstruct_path(&mut self, mut id: ContactId) -> Vec<ContactId> {
        let mut hops = Vec::new();
        while let Some(prev) = self.predecessor(id) {
            hops.push(id);
            id = prev;
        }
        hops.reverse();
        hops
    }
}

/// A convenience alias naming the arena index type as it appears in other modules' docs.
pub type RouteArenaIndex = Index<Route>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    #[test]
    fn check_value_orders_worst_last() {
        assert!(CheckValue::NoLoop < CheckValue::PossibleLoop);
        assert!(CheckValue::PossibleLoop < CheckValue::ClosingLoop);
        assert!(CheckValue::ClosingLoop < CheckValue::FailedNeighbor);
    }

    #[test]
    fn routing_work_relax_keeps_best_arrival_and_resets_across_searches() {
        let mut arena: Arena<crate::contact::Contact> = Arena::new();
        let a = arena.insert(crate::contact::Contact::registration(1));
        let b = arena.insert(crate::contact::Contact::registration(2));

        let mut work = RoutingWork::new();
        work.begin_search();
        work.seed_root(a, 0.0, 1.0);
        assert!(work.relax(b, 100.0, 1.0, 10.0, a, false));
        assert!(!work.relax(b, 200.0, 1.0, 10.0, a, false));
        assert_eq!(work.best_arrival(b), 100.0);

        work.begin_search();
        assert_eq!(work.best_arrival(b), Date::INFINITY);
        assert!(!work.is_visited(b));
    }

    #[test]
    fn reconstruct_path_walks_predecessors_in_order() {
        let mut arena: Arena<crate::contact::Contact> = Arena::new();
        let root = arena.insert(crate::contact::Contact::registration(1));
        let hop1 = arena.insert(crate::contact::Contact::registration(2));
        let hop2 = arena.insert(crate::contact::Contact::registration(3));

        let mut work = RoutingWork::new();
        work.begin_search();
        work.seed_root(root, 0.0, 1.0);
        work.relax(hop1, 10.0, 1.0, 10.0, root, false);
        work.relax(hop2, 20.0, 1.0, 10.0, hop1, false);

        assert_eq!(work.reconstruct_path(hop2), vec![hop1, hop2]);
    }

    #[test]
    fn relax_prefers_higher_confidence_on_arrival_tie() {
        let mut arena: Arena<crate::contact::Contact> = Arena::new();
        let root = arena.insert(crate::contact::Contact::registration(1));
        let via_a = arena.insert(crate::contact::Contact::registration(2));
        let via_b = arena.insert(crate::contact::Contact::registration(3));
        let dest = arena.insert(crate::contact::Contact::registration(4));

        let mut work = RoutingWork::new();
        work.begin_search();
        work.seed_root(root, 0.0, 1.0);
        work.relax(via_a, 5.0, 0.9, 5.0, root, false);
        work.relax(via_b, 5.0, 0.5, 5.0, root, false);

        assert!(work.relax(dest, 50.0, 0.9 * 0.8, 45.0, via_a, false));
        assert!(!work.relax(dest, 50.0, 0.5 * 0.8, 45.0, via_b, false));
        assert_eq!(work.predecessor(dest), Some(via_a));
    }
}

//! The contact definition: a directed transmission opportunity between two nodes, its
//! volume-tracking cells, and the citation set that lets a removal cascade into route
//! invalidation (§3).

use std::collections::HashSet;

use crate::arena::Index;
use crate::route::Route;
use crate::types::{Confidence, DataRate, Date, NodeID, Priority, Volume, MAX_TIME, PRIORITY_LEVELS};

/// A stable reference to a [`Contact`] stored in a [`crate::contact_plan::ContactPlanStore`]'s arena.
pub type ContactId = Index<Contact>;

/// A stable reference to a [`Route`] stored in a destination's [`crate::node::RoutingObject`].
pub type RouteId = Index<Route>;

/// Whether a contact is a real scheduled transmission opportunity or the synthetic
/// self-loop used to seed Dijkstra at the local node (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactType {
    /// A real, time-bounded transmission opportunity between two distinct nodes.
    Scheduled,
    /// A synthetic contact with `from == to` and an epochal `[0, MAX_TIME)` window, used as
    /// the Dijkstra root and as a per-node singleton.
    Registration,
}

/// The ordering key for contacts in the contact-plan store's [`crate::index::OrderedIndex`]:
/// `(from_node, to_node, from_time)` ascending (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ContactKey {
    /// The transmitting node.
    pub from_node: NodeID,
    /// The receiving node.
    pub to_node: NodeID,
    /// Bit pattern of the contact's start time, ordered consistently with `Date`'s natural
    /// order for all finite, non-NaN values (contact-plan adapters are expected to reject NaN
    /// times at the boundary, per §4.2's `RejectedArgs` outcome).
    pub from_time_bits: u64,
}

impl ContactKey {
    /// Builds a key from the raw `(from, to, from_time)` triple.
    pub fn new(from_node: NodeID, to_node: NodeID, from_time: Date) -> Self {
        ContactKey { from_node, to_node, from_time_bits: order_preserving_bits(from_time) }
    }
}

/// Converts a finite `f64` into a `u64` whose unsigned ordering matches the float's natural
/// ordering, so it can be used as a `BTreeMap` key component.
fn order_preserving_bits(value: f64) -> u64 {
    let bits = value.to_bits();
    if value.is_sign_negative() {
        !bits
    } else {
        bits | (1 << 63)
    }
}

/// The basic, immutable-once-added timing and rate information for a contact.
#[derive(Debug, Clone, Copy)]
pub struct ContactInfo {
    /// The transmitting node.
    pub from_node: NodeID,
    /// The receiving node.
    pub to_node: NodeID,
    /// The start of the contact's transmission window.
    pub from_time: Date,
    /// The end of the contact's transmission window (exclusive).
    pub to_time: Date,
    /// The data rate available during the window, in bytes per second.
    pub xmit_rate: DataRate,
    /// The probability that the contact actually occurs as scheduled, in `[0, 1]`.
    pub confidence: Confidence,
    /// Scheduled vs. synthetic Registration.
    pub contact_type: ContactType,
}

impl ContactInfo {
    /// Checks the basic well-formedness invariants (§3, §8 invariants 1 and boundary
    /// behaviors): `from_time <= to_time` (strict unless Registration), and a Registration
    /// contact must be a self-loop with the epochal sentinel window.
    pub fn is_well_formed(&self) -> bool {
        match self.contact_type {
            ContactType::Registration => self.from_node == self.to_node && self.to_time == MAX_TIME,
            ContactType::Scheduled => self.from_time < self.to_time,
        }
    }

    /// The key this contact would occupy in the contact-plan store's ordered index.
    pub fn key(&self) -> ContactKey {
        ContactKey::new(self.from_node, self.to_node, self.from_time)
    }
}

/// A directed transmission opportunity, owned exclusively by the contact-plan store (§3).
#[derive(Debug, Clone)]
pub struct Contact {
    /// The contact's timing, rate, and confidence.
    pub info: ContactInfo,
    /// Residual transmission volume per priority class, monotonically decreasing via booking.
    pub mtv: [Volume; PRIORITY_LEVELS],
    /// Whether this contact is temporarily suppressed during a phase-1 per-neighbor
    /// iteration or a Yen spur search (§4.4). Never persisted across calls.
    pub suppressed: bool,
    /// Back-references to every route hop that currently traverses this contact, so that
    /// removing the contact can cascade into invalidating exactly those routes (§3, §8
    /// invariant 9).
    pub citations: HashSet<RouteId>,
}

impl Contact {
    /// Creates a new contact if its info is well-formed, initializing `mtv` to
    /// `xmit_rate * (to_time - from_time)` in every priority cell (`0` for Registration
    /// contacts, which carry no volume).
    pub fn try_new(info: ContactInfo) -> Option<Self> {
        if !info.is_well_formed() {
            return None;
        }
        let volume = match info.contact_type {
            ContactType::Registration => 0.0,
            ContactType::Scheduled => info.xmit_rate * (info.to_time - info.from_time),
        };
        Some(Contact {
            info,
            mtv: [volume; PRIORITY_LEVELS],
            suppressed: false,
            citations: HashSet::new(),
        })
    }

    /// Creates the synthetic Registration contact used to seed Dijkstra at `node`.
    pub fn registration(node: NodeID) -> Self {
        Contact::try_new(ContactInfo {
            from_node: node,
            to_node: node,
            from_time: 0.0,
            to_time: MAX_TIME,
            xmit_rate: 0.0,
            confidence: 1.0,
            contact_type: ContactType::Registration,
        })
        .expect("registration contacts are well-formed by construction")
    }

    /// The residual volume available to `priority`, weighted by the contact's confidence, as
    /// used by the route-volume-limit computation (§4.5 step 6).
    pub fn confidence_weighted_residual(&self, priority: Priority) -> Volume {
        self.mtv[priority.index()] * self.info.confidence
    }

    /// Books `amount` of volume for `priority`, returning the portion that fit within the
    /// residual `mtv` ("protected") and the portion that did not ("overbooked"), per §4.5's
    /// overbooking rule. `mtv` is floored at zero; the booking always succeeds (callers decide
    /// whether an overbooked remainder is acceptable).
    pub fn book(&mut self, priority: Priority, amount: Volume) -> (Volume, Volume) {
        let cell = &mut self.mtv[priority.index()];
        let protected = amount.min(*cell);
        let overbooked = amount - protected;
        *cell -= protected;
        (protected, overbooked)
    }

    /// Reverses a previous booking, per the per-call booking journal described in §5.
    pub fn unbook(&mut self, priority: Priority, protected_amount: Volume) {
        self.mtv[priority.index()] += protected_amount;
    }

    /// Registers that `route` now has a hop on this contact.
    pub fn cite(&mut self, route: RouteId) {
        self.citations.insert(route);
    }

    /// Removes the back-reference to `route`, if present.
    pub fn uncite(&mut self, route: RouteId) {
        self.citations.remove(&route);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduled(from: NodeID, to: NodeID, from_time: Date, to_time: Date) -> ContactInfo {
        ContactInfo {
            from_node: from,
            to_node: to,
            from_time,
            to_time,
            xmit_rate: 1000.0,
            confidence: 1.0,
            contact_type: ContactType::Scheduled,
        }
    }

    #[test]
    fn rejects_from_time_equal_to_time() {
        assert!(Contact::try_new(scheduled(1, 2, 10.0, 10.0)).is_none());
    }

    #[test]
    fn rejects_registration_between_distinct_nodes() {
        let info = ContactInfo {
            from_node: 1,
            to_node: 2,
            from_time: 0.0,
            to_time: MAX_TIME,
            xmit_rate: 0.0,
            confidence: 1.0,
            contact_type: ContactType::Registration,
        };
        assert!(Contact::try_new(info).is_none());
    }

    #[test]
    fn mtv_initializes_to_rate_times_duration() {
        let c = Contact::try_new(scheduled(1, 2, 0.0, 100.0)).unwrap();
        assert_eq!(c.mtv, [100_000.0; PRIORITY_LEVELS]);
    }

    #[test]
    fn booking_splits_protected_and_overbooked() {
        let mut c = Contact::try_new(scheduled(1, 2, 0.0, 1.0)).unwrap();
        c.mtv[Priority::Bulk.index()] = 500.0;
        let (protected, overbooked) = c.book(Priority::Bulk, 800.0);
        assert_eq!(protected, 500.0);
        assert_eq!(overbooked, 300.0);
        assert_eq!(c.mtv[Priority::Bulk.index()], 0.0);
    }

    #[test]
    fn unbook_restores_volume() {
        let mut c = Contact::try_new(scheduled(1, 2, 0.0, 1.0)).unwrap();
        c.mtv[Priority::Normal.index()] = 1000.0;
        let (protected, _) = c.book(Priority::Normal, 400.0);
        c.unbook(Priority::Normal, protected);
        assert_eq!(c.mtv[Priority::Normal.index()], 1000.0);
    }

    #[test]
    fn contact_key_orders_by_from_to_start() {
        let a = scheduled(1, 2, 10.0, 20.0).key();
        let b = scheduled(1, 2, 20.0, 30.0).key();
        let c = scheduled(1, 3, 0.0, 5.0).key();
        assert!(a < b);
        assert!(b < c);
    }
}

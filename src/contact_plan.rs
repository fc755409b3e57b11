//! The contact-plan store (C2): owns contacts and ranges, enforces the pairwise
//! non-overlap invariant, and stamps a monotone edit time on every mutation (§4.2).
//!
//! Route ownership and the cascading invalidation that a contact removal triggers live one
//! layer up, in [`crate::node::NodeRegistry`] — this module only reports which routes were
//! citing a removed contact (as a set of [`RouteId`]s) and lets the caller do the cascade
//! (§3 "Ownership").

use std::collections::HashMap;

use log::{debug, warn};

use crate::arena::Arena;
use crate::contact::{Contact, ContactId, ContactInfo, ContactKey, ContactType, RouteId};
use crate::error::CgrError;
use crate::index::OrderedIndex;
use crate::range::{Range, RangeId, RangeKey};
use crate::types::{Confidence, DataRate, Date, EditTime, NodeID};

/// The outcome of [`ContactPlanStore::add_contact`] (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A brand new contact was inserted.
    Added(ContactId),
    /// An existing contact with the identical `(from, to, from_time, to_time)` window was
    /// revised in place.
    Revised(ContactId),
}

impl ContactPlanStore {
    fn reject_overlap() -> CgrError {
        CgrError::Overlap
    }
}

/// Owns every [`Contact`] and [`Range`] in the plan, indexed for ordered traversal and
/// point lookup by `(from, to, from_time)`.
pub struct ContactPlanStore {
    contacts: Arena<Contact>,
    contact_index: OrderedIndex<ContactKey, ContactId>,
    registrations: HashMap<NodeID, ContactId>,
    ranges: Arena<Range>,
    range_index: OrderedIndex<RangeKey, RangeId>,
    /// Strictly increases on every mutating operation (§3, §8 invariant 10).
    edit_time: EditTime,
    /// Cached earliest `to_time` across all contacts, so `remove_expired` can no-op cheaply
    /// when nothing has expired yet (§4.2 "Expiry").
    next_expiry_time: Option<Date>,
}

impl Default for ContactPlanStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactPlanStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        ContactPlanStore {
            contacts: Arena::new(),
            contact_index: OrderedIndex::new(),
            registrations: HashMap::new(),
            ranges: Arena::new(),
            range_index: OrderedIndex::new(),
            edit_time: EditTime::ZERO,
            next_expiry_time: None,
        }
    }

    /// The current contact-plan edit time, compared by the orchestrator on call entry to
    /// decide whether cached routes must be invalidated (§4.8 step 1).
    pub fn edit_time(&self) -> EditTime {
        self.edit_time
    }

    fn bump_edit_time(&mut self) {
        self.edit_time = self.edit_time.tick();
    }

    fn note_expiry(&mut self, to_time: Date) {
        self.next_expiry_time = Some(match self.next_expiry_time {
            Some(current) => current.min(to_time),
            None => to_time,
        });
    }

    /// Adds a contact, or revises an existing one sharing the identical
    /// `(from, to, from_time, to_time)` window (§4.2).
    ///
    /// Registration contacts are singletons per node: a second attempt to add one for a node
    /// that already has one is rejected as an overlap. A new scheduled contact overlapping an
    /// existing scheduled contact for the same `(from, to)` pair (but not sharing its exact
    /// window) is also rejected.
    pub fn add_contact(&mut self, info: ContactInfo) -> Result<AddOutcome, CgrError> {
        if !info.is_well_formed() {
            return Err(CgrError::BadArgument("contact window or registration shape is invalid".into()));
        }

        match info.contact_type {
            ContactType::Registration => self.add_registration(info),
            ContactType::Scheduled => self.add_scheduled(info),
        }
    }

    fn add_registration(&mut self, info: ContactInfo) -> Result<AddOutcome, CgrError> {
        if self.registrations.contains_key(&info.from_node) {
            return Err(Self::reject_overlap());
        }
        let contact = Contact::try_new(info).ok_or_else(|| CgrError::BadArgument("malformed registration contact".into()))?;
        let id = self.contacts.insert(contact);
        self.registrations.insert(info.from_node, id);
        self.contact_index.insert(info.key(), id).map_err(|_| CgrError::Internal("registration key collision".into()))?;
        self.bump_edit_time();
        debug!("added registration contact for node {}", info.from_node);
        Ok(AddOutcome::Added(id))
    }

    fn add_scheduled(&mut self, info: ContactInfo) -> Result<AddOutcome, CgrError> {
        let key = info.key();

        if let Some(&existing_id) = self.contact_index.search(&key) {
            let existing = self.contacts.get(existing_id).expect("index points at a live contact");
            if existing.info.to_time == info.to_time {
                return self.revise_in_place(existing_id, info.xmit_rate, info.confidence);
            }
            warn!(
                "rejecting contact ({} -> {} @ {}) whose window conflicts with an existing entry at the same start time",
                info.from_node, info.to_node, info.from_time
            );
            return Err(Self::reject_overlap());
        }

        if self.overlaps_existing(&info) {
            warn!("rejecting overlapping scheduled contact {} -> {} [{}, {})", info.from_node, info.to_node, info.from_time, info.to_time);
            return Err(Self::reject_overlap());
        }

        let contact = Contact::try_new(info).ok_or_else(|| CgrError::BadArgument("malformed contact".into()))?;
        let id = self.contacts.insert(contact);
        self.contact_index.insert(key, id).map_err(|_| CgrError::Internal("contact key collision after overlap check".into()))?;
        self.note_expiry(info.to_time);
        self.bump_edit_time();
        debug!("added contact {} -> {} [{}, {})", info.from_node, info.to_node, info.from_time, info.to_time);
        Ok(AddOutcome::Added(id))
    }

    fn overlaps_existing(&self, info: &ContactInfo) -> bool {
        let lo = ContactKey::new(info.from_node, info.to_node, Date::NEG_INFINITY);
        let hi = ContactKey::new(info.from_node, info.to_node, Date::INFINITY);
        self.contact_index.range(lo..=hi).any(|(_, &id)| {
            let other = self.contacts.get(id).expect("index points at a live contact");
            other.info.from_time < info.to_time && info.from_time < other.info.to_time
        })
    }

    fn revise_in_place(&mut self, id: ContactId, xmit_rate: DataRate, confidence: Confidence) -> Result<AddOutcome, CgrError> {
        let contact = self.contacts.get_mut(id).expect("index points at a live contact");
        let rate_changed = contact.info.xmit_rate != xmit_rate;
        contact.info.xmit_rate = xmit_rate;
        contact.info.confidence = confidence;
        if rate_changed {
            let duration = contact.info.to_time - contact.info.from_time;
            contact.mtv = [xmit_rate * duration; crate::types::PRIORITY_LEVELS];
        }
        self.bump_edit_time();
        if rate_changed {
            debug!("revised contact {:?}: xmit_rate changed, routes through it must be invalidated", id);
        }
        Ok(AddOutcome::Revised(id))
    }

    /// Revises only the confidence of an existing contact. Unlike revising `xmit_rate`, this
    /// is not considered a significant contact-plan change: observers keep their cached
    /// routes (§4.2).
    pub fn revise_confidence(&mut self, id: ContactId, confidence: Confidence) -> Result<(), CgrError> {
        let contact = self.contacts.get_mut(id).ok_or(CgrError::NotFound)?;
        contact.info.confidence = confidence;
        self.bump_edit_time();
        Ok(())
    }

    /// Revises a contact's transmission rate. Per the resolved open question in SPEC_FULL.md
    /// §9(a), the source leaves already-booked volume (`mtv`) untouched here — it only
    /// invalidates every route citing the contact: the caller (normally the orchestrator) must
    /// follow this with a cascade invalidation using the returned citation set, exactly as it
    /// would for a removal.
    pub fn revise_xmit_rate(&mut self, id: ContactId, xmit_rate: DataRate) -> Result<std::collections::HashSet<RouteId>, CgrError> {
        let contact = self.contacts.get_mut(id).ok_or(CgrError::NotFound)?;
        contact.info.xmit_rate = xmit_rate;
        let citations = contact.citations.clone();
        self.bump_edit_time();
        Ok(citations)
    }

    /// Removes a contact by id, returning it (with its citation set intact) so the caller can
    /// cascade-invalidate the routes it lists (§3, §8 invariant 9).
    pub fn remove_contact(&mut self, id: ContactId) -> Result<Contact, CgrError> {
        let key = self.contacts.get(id).ok_or(CgrError::NotFound)?.info.key();
        let contact = self.contacts.remove(id).ok_or(CgrError::NotFound)?;
        self.contact_index.delete(&key);
        if contact.info.contact_type == ContactType::Registration {
            self.registrations.remove(&contact.info.from_node);
        }
        self.bump_edit_time();
        debug!("removed contact {:?}, cascading to {} cited routes", id, contact.citations.len());
        Ok(contact)
    }

    /// Looks up a contact by id.
    pub fn get_contact(&self, id: ContactId) -> Option<&Contact> {
        self.contacts.get(id)
    }

    /// Mutably looks up a contact by id (used by phase 2 to book/unbook volume).
    pub fn get_contact_mut(&mut self, id: ContactId) -> Option<&mut Contact> {
        self.contacts.get_mut(id)
    }

    /// Iterates over every live contact, in `(from, to, from_time)` order.
    pub fn iter_contacts(&self) -> impl Iterator<Item = (ContactId, &Contact)> {
        self.contact_index.iter().map(|(_, &id)| (id, self.contacts.get(id).expect("index points at a live contact")))
    }

    /// Iterates over every scheduled contact whose `from_node` is `node`, in start-time order.
    /// Used by the node registry to derive the local-neighbor set (§4.3).
    pub fn contacts_from(&self, node: NodeID) -> impl Iterator<Item = (ContactId, &Contact)> {
        let lo = ContactKey::new(node, NodeID::MIN, Date::NEG_INFINITY);
        let hi = ContactKey::new(node, NodeID::MAX, Date::INFINITY);
        self.contact_index.range(lo..=hi).filter_map(move |(k, &id)| {
            if k.from_node == node {
                Some((id, self.contacts.get(id).expect("index points at a live contact")))
            } else {
                None
            }
        })
    }

    /// The registration contact for `node`, if one has been added.
    pub fn registration_for(&self, node: NodeID) -> Option<ContactId> {
        self.registrations.get(&node).copied()
    }

    /// Adds a range. Returns [`CgrError::Overlap`] if it overlaps an existing range for the
    /// same `(from, to)` pair.
    pub fn add_range(&mut self, from_node: NodeID, to_node: NodeID, from_time: Date, to_time: Date, owlt: crate::types::Owlt) -> Result<RangeId, CgrError> {
        let range = Range::try_new(from_node, to_node, from_time, to_time, owlt)
            .ok_or_else(|| CgrError::BadArgument("range window must be non-empty".into()))?;

        let lo = RangeKey::new(from_node, to_node, Date::NEG_INFINITY);
        let hi = RangeKey::new(from_node, to_node, Date::INFINITY);
        let overlaps = self.range_index.range(lo..=hi).any(|(_, &id)| {
            let other = self.ranges.get(id).expect("index points at a live range");
            other.from_time < to_time && from_time < other.to_time
        });
        if overlaps {
            return Err(Self::reject_overlap());
        }

        let id = self.ranges.insert(range);
        self.range_index
            .insert(range.key(), id)
            .map_err(|_| CgrError::Internal("range key collision after overlap check".into()))?;
        self.bump_edit_time();
        Ok(id)
    }

    /// Removes a range by id.
    pub fn remove_range(&mut self, id: RangeId) -> Result<Range, CgrError> {
        let range = self.ranges.get(id).copied().ok_or(CgrError::NotFound)?;
        self.ranges.remove(id);
        self.range_index.delete(&range.key());
        self.bump_edit_time();
        Ok(range)
    }

    /// Returns the one-way light-time of the range covering `target_time` between `from` and
    /// `to`, or `None` if no range applies (§4.2 "Ranges applicable-at").
    pub fn get_applicable_range(&self, from: NodeID, to: NodeID, target_time: Date) -> Option<crate::types::Owlt> {
        let lo = RangeKey::new(from, to, Date::NEG_INFINITY);
        let hi = RangeKey::new(from, to, Date::INFINITY);
        self.range_index.range(lo..=hi).find_map(|(_, &id)| {
            let range = self.ranges.get(id).expect("index points at a live range");
            if range.covers(target_time) {
                Some(range.owlt)
            } else {
                None
            }
        })
    }

    /// Removes every contact whose `to_time <= now`, cascading each removal's citations back
    /// to the caller for route invalidation. A no-op unless `now` has reached the cached
    /// `next_expiry_time` (§4.2 "Expiry").
    pub fn remove_expired(&mut self, now: Date) -> Vec<Contact> {
        match self.next_expiry_time {
            Some(next) if now < next => return Vec::new(),
            None => return Vec::new(),
            _ => {}
        }

        let expired_ids: Vec<ContactId> = self
            .contact_index
            .iter()
            .filter(|(_, &id)| {
                let contact = self.contacts.get(id).expect("index points at a live contact");
                contact.info.contact_type == ContactType::Scheduled && contact.info.to_time <= now
            })
            .map(|(_, &id)| id)
            .collect();

        let mut removed = Vec::with_capacity(expired_ids.len());
        for id in expired_ids {
            if let Ok(contact) = self.remove_contact(id) {
                removed.push(contact);
            }
        }

        self.next_expiry_time = self
            .contact_index
            .iter()
            .filter_map(|(_, &id)| {
                let contact = self.contacts.get(id).expect("index points at a live contact");
                match contact.info.contact_type {
                    ContactType::Scheduled => Some(contact.info.to_time),
                    ContactType::Registration => None,
                }
            })
            .fold(None, |acc, t| Some(acc.map_or(t, |a: Date| a.min(t))));

        removed
    }

    /// Drops every contact and range, resetting the store to its just-constructed state
    /// except for the edit time, which keeps advancing (§4.2 `reset`).
    pub fn reset(&mut self) {
        self.contacts.clear();
        self.contact_index = OrderedIndex::new();
        self.registrations.clear();
        self.ranges.clear();
        self.range_index = OrderedIndex::new();
        self.next_expiry_time = None;
        self.bump_edit_time();
    }

    /// Final teardown (§4.2 `destroy`); equivalent to `reset` at the store layer, kept as a
    /// distinct name to mirror the engine-level `destroy` entry point (§6).
    pub fn destroy(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduled(from: NodeID, to: NodeID, from_time: Date, to_time: Date) -> ContactInfo {
        ContactInfo { from_node: from, to_node: to, from_time, to_time, xmit_rate: 1000.0, confidence: 1.0, contact_type: ContactType::Scheduled }
    }

    #[test]
    fn add_then_remove_restores_edit_time_advancing_state() {
        let mut store = ContactPlanStore::new();
        let t0 = store.edit_time();
        let id = match store.add_contact(scheduled(1, 2, 0.0, 10.0)).unwrap() {
            AddOutcome::Added(id) => id,
            _ => panic!("expected Added"),
        };
        assert!(store.edit_time() > t0);
        assert!(store.get_contact(id).is_some());
        store.remove_contact(id).unwrap();
        assert!(store.get_contact(id).is_none());
    }

    #[test]
    fn identical_window_is_revised_not_duplicated() {
        let mut store = ContactPlanStore::new();
        store.add_contact(scheduled(1, 2, 0.0, 10.0)).unwrap();
        let outcome = store.add_contact(ContactInfo { xmit_rate: 2000.0, ..scheduled(1, 2, 0.0, 10.0) }).unwrap();
        assert!(matches!(outcome, AddOutcome::Revised(_)));
        assert_eq!(store.iter_contacts().count(), 1);
    }

    #[test]
    fn overlapping_scheduled_contacts_are_rejected() {
        let mut store = ContactPlanStore::new();
        store.add_contact(scheduled(1, 2, 0.0, 10.0)).unwrap();
        let err = store.add_contact(scheduled(1, 2, 5.0, 15.0)).unwrap_err();
        assert_eq!(err, CgrError::Overlap);
    }

    #[test]
    fn adjacent_non_overlapping_contacts_are_accepted() {
        let mut store = ContactPlanStore::new();
        store.add_contact(scheduled(1, 2, 0.0, 10.0)).unwrap();
        assert!(store.add_contact(scheduled(1, 2, 10.0, 20.0)).is_ok());
    }

    #[test]
    fn registration_is_a_singleton_per_node() {
        let mut store = ContactPlanStore::new();
        let info = ContactInfo { from_node: 1, to_node: 1, from_time: 0.0, to_time: crate::types::MAX_TIME, xmit_rate: 0.0, confidence: 1.0, contact_type: ContactType::Registration };
        store.add_contact(info).unwrap();
        assert_eq!(store.add_contact(info).unwrap_err(), CgrError::Overlap);
    }

    #[test]
    fn remove_expired_is_a_noop_before_next_expiry() {
        let mut store = ContactPlanStore::new();
        store.add_contact(scheduled(1, 2, 0.0, 100.0)).unwrap();
        assert!(store.remove_expired(50.0).is_empty());
        let removed = store.remove_expired(100.0);
        assert_eq!(removed.len(), 1);
    }

    #[test]
    fn applicable_range_is_found_by_window() {
        let mut store = ContactPlanStore::new();
        store.add_range(1, 2, 0.0, 100.0, 5).unwrap();
        assert_eq!(store.get_applicable_range(1, 2, 50.0), Some(5));
        assert_eq!(store.get_applicable_range(1, 2, 150.0), None);
    }

    #[test]
    fn xmit_rate_revision_leaves_mtv_untouched_and_returns_empty_citations_when_uncited() {
        let mut store = ContactPlanStore::new();
        let id = match store.add_contact(scheduled(1, 2, 0.0, 10.0)).unwrap() {
            AddOutcome::Added(id) => id,
            _ => unreachable!(),
        };
        let mtv_before = store.get_contact(id).unwrap().mtv;
        let citations = store.revise_xmit_rate(id, 5000.0).unwrap();
        assert!(citations.is_empty());
        assert_eq!(store.get_contact(id).unwrap().info.xmit_rate, 5000.0);
        assert_eq!(store.get_contact(id).unwrap().mtv, mtv_before);
    }
}

//! Relay waitlists and flood suppression.
//!
//! When a relay request cannot be satisfied immediately, the requester is
//! parked on a waitlist keyed by content id and the request is flooded
//! onward. A per-(content, sender) suppression window keeps repeated
//! floods from turning into storms.

use std::collections::{BTreeSet, HashMap};
use veilmesh_core::{ContentId, MeshAddress};
use veilmesh_domain::MediaMeta;

/// Re-floods of the same (content, sender) pair inside this window are
/// dropped (ms).
pub const SUPPRESSION_WINDOW_MS: u64 = 10_000;

/// Waitlists are abandoned after this long without a find (ms).
const WAITLIST_TTL_MS: u64 = 10 * 60 * 1000;

#[derive(Debug)]
struct Waitlist {
    meta: Option<MediaMeta>,
    listeners: BTreeSet<MeshAddress>,
    created_at: u64,
}

/// Book-keeping for relay requests passing through this node.
#[derive(Debug, Default)]
pub struct RelayCoordinator {
    waitlists: HashMap<ContentId, Waitlist>,
    recent: HashMap<(ContentId, MeshAddress), u64>,
}

impl RelayCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a relay request for this (content, sender) pair arrived
    /// inside the suppression window. Records the request either way.
    pub fn suppress(&mut self, content_id: &ContentId, sender: &MeshAddress, now: u64) -> bool {
        let key = (content_id.clone(), sender.clone());
        match self.recent.get(&key) {
            Some(last) if now.saturating_sub(*last) < SUPPRESSION_WINDOW_MS => true,
            _ => {
                self.recent.insert(key, now);
                false
            }
        }
    }

    /// Whether no waitlist exists yet for this content.
    pub fn is_first_request(&self, content_id: &ContentId) -> bool {
        !self.waitlists.contains_key(content_id)
    }

    /// Park a requester until a source turns up.
    pub fn register(
        &mut self,
        content_id: ContentId,
        meta: Option<MediaMeta>,
        requester: MeshAddress,
        now: u64,
    ) {
        let entry = self.waitlists.entry(content_id).or_insert_with(|| Waitlist {
            meta,
            listeners: BTreeSet::new(),
            created_at: now,
        });
        entry.listeners.insert(requester);
    }

    /// Metadata remembered for a waitlisted content id.
    pub fn meta_for(&self, content_id: &ContentId) -> Option<&MediaMeta> {
        self.waitlists.get(content_id).and_then(|w| w.meta.as_ref())
    }

    /// A source was found: release and return every waiting requester.
    pub fn take_waiters(&mut self, content_id: &ContentId) -> Vec<MeshAddress> {
        match self.waitlists.remove(content_id) {
            Some(waitlist) => waitlist.listeners.into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Drop expired suppression entries and stale waitlists.
    pub fn prune(&mut self, now: u64) {
        self.recent
            .retain(|_, last| now.saturating_sub(*last) < SUPPRESSION_WINDOW_MS);
        self.waitlists
            .retain(|_, w| now.saturating_sub(w.created_at) < WAITLIST_TTL_MS);
    }

    /// Number of live waitlists.
    pub fn waitlist_count(&self) -> usize {
        self.waitlists.len()
    }
}

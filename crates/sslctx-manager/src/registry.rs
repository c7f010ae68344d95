// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! Context registry bookkeeping
//!
//! The registry is plain data guarded by the manager's mutex. It tracks,
//! per slot:
//! - the shared context handle (the registry's own reference)
//! - whether the entry is live or retired
//! - the number of holders that still have to release it
//! - how many of those holds are still in service, i.e. not yet replaced
//!   by an update
//!
//! An entry is retired once none of its holds is in service. With
//! deduplication several listeners can share one entry, and rotating one
//! of them must not hide the material the others still serve.
//!
//! Live entries are indexed by fingerprint and contribute their expiration
//! to a sorted multiset, so the soonest expiry is always the first key.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::context::{ContextId, SharedContext, SlotId};

#[derive(Debug)]
struct RegistryEntry {
    context: SharedContext,
    retired: bool,
    holders: usize,
    active: usize,
}

/// Result of dropping one hold on an entry
#[derive(Debug)]
pub(crate) enum ReleaseOutcome {
    /// Other holders remain
    Held {
        /// Holders left
        remaining: usize,
    },
    /// Last holder released; the entry is gone
    Erased {
        /// The registry's reference, to be dropped outside the lock
        context: SharedContext,
        /// Whether the entry was still live when erased
        was_live: bool,
    },
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    entries: BTreeMap<SlotId, RegistryEntry>,
    live_by_id: HashMap<ContextId, SlotId>,
    expirations: BTreeMap<i64, usize>,
}

impl Registry {
    /// Add one holder to the live entry with this fingerprint
    pub(crate) fn join_live(&mut self, id: &ContextId) -> Option<SharedContext> {
        let slot = self.live_by_id.get(id)?;
        let entry = self.entries.get_mut(slot)?;
        entry.holders += 1;
        entry.active += 1;
        Some(Arc::clone(&entry.context))
    }

    /// Add one holder to a specific live entry
    pub(crate) fn join_slot(&mut self, slot: SlotId) -> Option<SharedContext> {
        let entry = self.entries.get_mut(&slot).filter(|entry| !entry.retired)?;
        entry.holders += 1;
        entry.active += 1;
        Some(Arc::clone(&entry.context))
    }

    /// Insert a freshly built context as live with one holder
    pub(crate) fn insert(&mut self, context: SharedContext) {
        let slot = context.slot();
        self.live_by_id.insert(context.id().clone(), slot);
        if let Some(expires_at) = context.expires_at() {
            *self.expirations.entry(expires_at.timestamp()).or_insert(0) += 1;
        }
        self.entries.insert(
            slot,
            RegistryEntry {
                context,
                retired: false,
                holders: 1,
                active: 1,
            },
        );
    }

    /// Take one hold out of service after its holder moved to a replacement
    ///
    /// The entry is retired when no hold remains in service. Returns whether
    /// this call retired it.
    pub(crate) fn supersede(&mut self, slot: SlotId) -> bool {
        let Some(entry) = self.entries.get_mut(&slot) else {
            return false;
        };
        entry.active = entry.active.saturating_sub(1);
        if entry.active > 0 {
            return false;
        }
        self.retire(slot)
    }

    /// Mark an entry retired; returns whether it was live
    ///
    /// Holder counts are untouched.
    pub(crate) fn retire(&mut self, slot: SlotId) -> bool {
        let Some(entry) = self.entries.get_mut(&slot) else {
            return false;
        };
        if entry.retired {
            return false;
        }
        entry.retired = true;

        let context = Arc::clone(&entry.context);
        if self.live_by_id.get(context.id()) == Some(&slot) {
            self.live_by_id.remove(context.id());
        }
        if let Some(expires_at) = context.expires_at() {
            self.forget_expiration(expires_at.timestamp());
        }
        true
    }

    /// Drop one hold; `None` if the slot is not present
    ///
    /// Handles are indistinguishable, so a release is charged to a
    /// superseded hold first. The entry stays live while any hold may still
    /// be in service.
    pub(crate) fn release(&mut self, slot: SlotId) -> Option<ReleaseOutcome> {
        let entry = self.entries.get_mut(&slot)?;
        entry.holders -= 1;
        entry.active = entry.active.min(entry.holders);
        if entry.holders > 0 {
            return Some(ReleaseOutcome::Held {
                remaining: entry.holders,
            });
        }

        let was_live = self.retire(slot);
        let entry = self.entries.remove(&slot)?;
        Some(ReleaseOutcome::Erased {
            context: entry.context,
            was_live,
        })
    }

    pub(crate) fn contains(&self, slot: SlotId) -> bool {
        self.entries.contains_key(&slot)
    }

    pub(crate) fn is_live(&self, slot: SlotId) -> bool {
        self.entries.get(&slot).is_some_and(|entry| !entry.retired)
    }

    pub(crate) fn holders(&self, slot: SlotId) -> Option<usize> {
        self.entries.get(&slot).map(|entry| entry.holders)
    }

    #[cfg(test)]
    pub(crate) fn active_holders(&self, slot: SlotId) -> Option<usize> {
        self.entries.get(&slot).map(|entry| entry.active)
    }

    /// Soonest expiration among live entries, as unix seconds
    pub(crate) fn min_expiry(&self) -> Option<i64> {
        self.expirations.keys().next().copied()
    }

    /// Live handles in slot order
    pub(crate) fn snapshot_live(&self) -> Vec<SharedContext> {
        self.entries
            .values()
            .filter(|entry| !entry.retired)
            .map(|entry| Arc::clone(&entry.context))
            .collect()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.entries.values().filter(|entry| !entry.retired).count()
    }

    pub(crate) fn retired_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.retired).count()
    }

    fn forget_expiration(&mut self, timestamp: i64) {
        if let Some(count) = self.expirations.get_mut(&timestamp) {
            *count -= 1;
            if *count == 0 {
                self.expirations.remove(&timestamp);
            }
        }
    }
}

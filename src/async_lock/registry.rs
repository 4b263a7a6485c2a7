use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::HolderId;

#[derive(Debug)]
struct OwnershipEntry {
    token:  Arc<String>,
    count:  usize,
    lost:   bool,
    cancel: CancellationToken,
}

/// Result of looking up an existing acquisition before going to the store.
#[derive(Debug)]
pub(crate) enum Reentry {
    /// The holder owns the key. The count has been incremented.
    Reentered { token: Arc<String>, count: usize },
    /// The holder owns the key, but its lease has been lost.
    Lost,
    /// The holder does not own the key.
    Vacant,
}

/// Result of giving back one acquisition.
#[derive(Debug)]
pub(crate) enum Decrement {
    /// The holder does not own the key (or owns it through a different token).
    NotOwner,
    /// The holder still owns the key through outer acquisitions.
    Held { count: usize },
    /// That was the outermost acquisition. The entry has been removed and its renewal task cancelled.
    Released { token: Arc<String>, lost: bool },
}

/// Locks owned by this process, keyed by holder and lock key.
///
/// The mutex is only held for a lookup and its update, never across an `.await`.
#[derive(Debug, Default)]
pub(crate) struct OwnershipRegistry {
    entries: Mutex<HashMap<(HolderId, String), OwnershipEntry>>,
    /// Only read or written while `entries` is locked.
    closed:  AtomicBool,
}

impl OwnershipRegistry {
    pub(crate) fn try_reenter(&self, holder: HolderId, key: &str) -> Reentry {
        let mut entries = self.entries.lock();

        match entries.get_mut(&(holder, String::from(key))) {
            Some(entry) if entry.lost => Reentry::Lost,
            Some(entry) => {
                entry.count += 1;

                Reentry::Reentered {
                    token: entry.token.clone(),
                    count: entry.count,
                }
            },
            None => Reentry::Vacant,
        }
    }

    /// Records a fresh acquisition from the store with a count of 1. Returns `false` without recording it once the registry is closed.
    pub(crate) fn insert(
        &self,
        holder: HolderId,
        key: String,
        token: Arc<String>,
        cancel: CancellationToken,
    ) -> bool {
        let mut entries = self.entries.lock();

        if self.closed.load(Ordering::Relaxed) {
            return false;
        }

        let entry = OwnershipEntry {
            token,
            count: 1,
            lost: false,
            cancel,
        };

        if let Some(previous) = entries.insert((holder, key), entry) {
            previous.cancel.cancel();
        }

        true
    }

    /// Gives back one acquisition. With `token` set, the entry must also carry that token.
    pub(crate) fn decrement(&self, holder: HolderId, key: &str, token: Option<&str>) -> Decrement {
        let mut entries = self.entries.lock();

        let map_key = (holder, String::from(key));

        let Some(entry) = entries.get_mut(&map_key) else {
            return Decrement::NotOwner;
        };

        if let Some(token) = token {
            if entry.token.as_str() != token {
                return Decrement::NotOwner;
            }
        }

        entry.count -= 1;

        if entry.count > 0 {
            return Decrement::Held {
                count: entry.count,
            };
        }

        match entries.remove(&map_key) {
            Some(entry) => {
                entry.cancel.cancel();

                Decrement::Released {
                    token: entry.token,
                    lost:  entry.lost,
                }
            },
            None => Decrement::NotOwner,
        }
    }

    /// Marks the entry as lost if it still belongs to `token`. Returns whether it has been marked.
    pub(crate) fn mark_lost(&self, holder: HolderId, key: &str, token: &str) -> bool {
        let mut entries = self.entries.lock();

        match entries.get_mut(&(holder, String::from(key))) {
            Some(entry) if entry.token.as_str() == token && !entry.cancel.is_cancelled() => {
                entry.lost = true;
                entry.cancel.cancel();

                true
            },
            _ => false,
        }
    }

    /// How many times `holder` currently holds `key`.
    pub(crate) fn count(&self, holder: HolderId, key: &str) -> usize {
        self.entries.lock().get(&(holder, String::from(key))).map_or(0, |entry| entry.count)
    }

    /// Stops every renewal task and refuses further inserts. The entries stay so that their holders can still release.
    pub(crate) fn close(&self) {
        let entries = self.entries.lock();

        self.closed.store(true, Ordering::Relaxed);

        for entry in entries.values() {
            entry.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(
        holder: HolderId,
        key: &str,
        token: &str,
    ) -> (OwnershipRegistry, CancellationToken) {
        let registry = OwnershipRegistry::default();
        let cancel = CancellationToken::new();

        registry.insert(holder, String::from(key), Arc::new(String::from(token)), cancel.clone());

        (registry, cancel)
    }

    #[test]
    fn reentry_increments_the_count() {
        let holder = HolderId::new();
        let (registry, _) = registry_with(holder, "k", "t");

        match registry.try_reenter(holder, "k") {
            Reentry::Reentered {
                token,
                count,
            } => {
                assert_eq!("t", token.as_str());
                assert_eq!(2, count);
            },
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(2, registry.count(holder, "k"));
        assert!(matches!(registry.try_reenter(HolderId::new(), "k"), Reentry::Vacant));
    }

    #[test]
    fn final_decrement_removes_and_cancels() {
        let holder = HolderId::new();
        let (registry, cancel) = registry_with(holder, "k", "t");

        registry.try_reenter(holder, "k");

        assert!(matches!(registry.decrement(holder, "k", None), Decrement::Held { count: 1 }));
        assert!(!cancel.is_cancelled());

        match registry.decrement(holder, "k", Some("t")) {
            Decrement::Released {
                token,
                lost,
            } => {
                assert_eq!("t", token.as_str());
                assert!(!lost);
            },
            other => panic!("unexpected {other:?}"),
        }

        assert!(cancel.is_cancelled());
        assert_eq!(0, registry.count(holder, "k"));
        assert!(matches!(registry.decrement(holder, "k", None), Decrement::NotOwner));
    }

    #[test]
    fn other_holders_and_tokens_are_not_owners() {
        let holder = HolderId::new();
        let (registry, _) = registry_with(holder, "k", "t");

        assert!(matches!(registry.decrement(HolderId::new(), "k", None), Decrement::NotOwner));
        assert!(matches!(registry.decrement(holder, "k", Some("other")), Decrement::NotOwner));
        assert_eq!(1, registry.count(holder, "k"));
    }

    #[test]
    fn lost_entries_cannot_be_reentered() {
        let holder = HolderId::new();
        let (registry, cancel) = registry_with(holder, "k", "t");

        assert!(!registry.mark_lost(holder, "k", "other"));
        assert!(registry.mark_lost(holder, "k", "t"));
        assert!(cancel.is_cancelled());

        assert!(matches!(registry.try_reenter(holder, "k"), Reentry::Lost));
        assert!(matches!(
            registry.decrement(holder, "k", None),
            Decrement::Released { lost: true, .. }
        ));
    }

    #[test]
    fn closed_registry_refuses_inserts() {
        let holder = HolderId::new();
        let (registry, cancel) = registry_with(holder, "k", "t");

        registry.close();

        assert!(cancel.is_cancelled());
        assert_eq!(1, registry.count(holder, "k"));

        let late_cancel = CancellationToken::new();

        assert!(!registry.insert(
            holder,
            String::from("other"),
            Arc::new(String::from("u")),
            late_cancel.clone()
        ));
        assert_eq!(0, registry.count(holder, "other"));

        // existing entries can still be released
        assert!(matches!(
            registry.decrement(holder, "k", Some("t")),
            Decrement::Released { lost: false, .. }
        ));
    }

    #[test]
    fn released_entries_are_not_marked_lost() {
        let holder = HolderId::new();
        let (registry, _) = registry_with(holder, "k", "t");

        registry.decrement(holder, "k", None);

        assert!(!registry.mark_lost(holder, "k", "t"));
    }
}

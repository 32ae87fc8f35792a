//! Connection registry for the relay.
//!
//! The registry is a fixed-capacity slot table: slot `i` holds the connection
//! with id `i`, if any. Alongside the table it keeps the number of occupied
//! slots and the watermark (highest occupied id), so iteration only ever walks
//! `0..=watermark` rather than the whole capacity.
//!
//! Every index is bounds-checked against the capacity. An id outside the range
//! is rejected, never used to index.

use crate::{
    connection::{Connection, ConnectionId},
    error::RegistryError,
};

/// Default number of simultaneously registered connections.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Registry of live connections.
///
/// # Invariants
///
/// - `count` equals the number of occupied slots
/// - `watermark` is the highest occupied id, `None` iff `count == 0`
/// - failed mutations leave all three fields untouched
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    /// Slot table, one entry per possible id
    slots: Vec<Option<Connection>>,
    /// Number of occupied slots
    count: usize,
    /// Highest occupied id
    watermark: Option<ConnectionId>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ConnectionRegistry {
    /// Create an empty registry holding at most `capacity` connections.
    pub fn new(capacity: usize) -> Self {
        Self { slots: vec![None; capacity], count: 0, watermark: None }
    }

    /// Register a connection under `id` with its default nickname.
    ///
    /// Fails if `id` is outside the capacity range or already taken.
    pub fn register(&mut self, id: ConnectionId) -> Result<&Connection, RegistryError> {
        let capacity = self.capacity();
        let slot = self
            .slots
            .get_mut(id.get())
            .ok_or(RegistryError::CapacityExceeded { id, capacity })?;

        if slot.is_some() {
            return Err(RegistryError::AlreadyRegistered(id));
        }

        self.count += 1;
        self.watermark = Some(self.watermark.map_or(id, |w| w.max(id)));

        Ok(&*slot.insert(Connection::new(id)))
    }

    /// Remove the connection under `id`.
    ///
    /// Returns `None` without touching state if nothing is registered there.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Connection> {
        let conn = self.slots.get_mut(id.get())?.take()?;
        self.count -= 1;

        if self.watermark == Some(id) {
            self.watermark = self.highest_occupied_below(id);
        }

        Some(conn)
    }

    /// Connection registered under `id`. `None` if absent or out of range.
    pub fn lookup(&self, id: ConnectionId) -> Option<&Connection> {
        self.slots.get(id.get()).and_then(Option::as_ref)
    }

    /// Check if `id` is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lookup(id).is_some()
    }

    /// All registered connections except `excluded`, in ascending id order.
    ///
    /// Reflects the registry at call time. `excluded` need not be registered.
    pub fn others_than(&self, excluded: ConnectionId) -> impl Iterator<Item = &Connection> + '_ {
        self.iter().filter(move |conn| conn.id() != excluded)
    }

    /// All registered connections in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> + '_ {
        let end = self.watermark.map_or(0, |w| w.get() + 1);
        self.slots[..end].iter().filter_map(Option::as_ref)
    }

    /// Lowest id with no connection registered. `None` when full.
    pub fn vacant_id(&self) -> Option<ConnectionId> {
        self.slots.iter().position(Option::is_none).map(ConnectionId::new)
    }

    /// Number of registered connections.
    pub fn count(&self) -> usize {
        self.count
    }

    /// No connections are registered.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Highest registered id. `None` when empty.
    pub fn watermark(&self) -> Option<ConnectionId> {
        self.watermark
    }

    /// Maximum number of connections this registry can hold.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn highest_occupied_below(&self, id: ConnectionId) -> Option<ConnectionId> {
        if self.count == 0 {
            return None;
        }
        self.slots[..id.get()].iter().rev().find_map(|slot| slot.as_ref().map(Connection::id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: usize) -> ConnectionId {
        ConnectionId::new(raw)
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = ConnectionRegistry::new(16);

        let conn = registry.register(id(3)).unwrap().clone();
        assert_eq!(conn.nickname().as_str(), "user#3");

        assert_eq!(registry.lookup(id(3)), Some(&conn));
        assert!(registry.lookup(id(4)).is_none());
        assert!(registry.contains(id(3)));
    }

    #[test]
    fn register_duplicate_fails_without_mutation() {
        let mut registry = ConnectionRegistry::new(16);
        registry.register(id(2)).unwrap();

        assert_eq!(registry.register(id(2)), Err(RegistryError::AlreadyRegistered(id(2))));
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.watermark(), Some(id(2)));
    }

    #[test]
    fn register_beyond_capacity_fails_without_mutation() {
        let mut registry = ConnectionRegistry::new(4);
        registry.register(id(1)).unwrap();

        let result = registry.register(id(4));
        assert_eq!(result, Err(RegistryError::CapacityExceeded { id: id(4), capacity: 4 }));
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.watermark(), Some(id(1)));

        assert!(registry.register(id(usize::MAX)).is_err());
        assert!(registry.lookup(id(usize::MAX)).is_none());
    }

    #[test]
    fn count_and_watermark_track_registrations() {
        let mut registry = ConnectionRegistry::new(16);
        assert!(registry.is_empty());
        assert_eq!(registry.watermark(), None);

        for raw in [5, 1, 9, 3] {
            registry.register(id(raw)).unwrap();
        }

        assert_eq!(registry.count(), 4);
        assert_eq!(registry.watermark(), Some(id(9)));
    }

    #[test]
    fn unregister_below_watermark_keeps_watermark() {
        let mut registry = ConnectionRegistry::new(16);
        registry.register(id(2)).unwrap();
        registry.register(id(7)).unwrap();

        assert!(registry.unregister(id(2)).is_some());
        assert_eq!(registry.watermark(), Some(id(7)));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn unregister_watermark_rescans_downward() {
        let mut registry = ConnectionRegistry::new(16);
        for raw in [1, 4, 8] {
            registry.register(id(raw)).unwrap();
        }

        registry.unregister(id(8));
        assert_eq!(registry.watermark(), Some(id(4)));

        registry.unregister(id(4));
        assert_eq!(registry.watermark(), Some(id(1)));

        registry.unregister(id(1));
        assert_eq!(registry.watermark(), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_absent_is_noop() {
        let mut registry = ConnectionRegistry::new(4);
        registry.register(id(1)).unwrap();

        assert!(registry.unregister(id(2)).is_none());
        assert!(registry.unregister(id(99)).is_none());
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.watermark(), Some(id(1)));
    }

    #[test]
    fn others_than_excludes_sender_in_ascending_order() {
        let mut registry = ConnectionRegistry::new(16);
        for raw in [6, 0, 3, 11] {
            registry.register(id(raw)).unwrap();
        }

        let others: Vec<_> = registry.others_than(id(3)).map(Connection::id).collect();
        assert_eq!(others, vec![id(0), id(6), id(11)]);

        let all: Vec<_> = registry.others_than(id(15)).map(Connection::id).collect();
        assert_eq!(all, vec![id(0), id(3), id(6), id(11)]);
    }

    #[test]
    fn others_than_reflects_live_registry() {
        let mut registry = ConnectionRegistry::new(8);
        registry.register(id(0)).unwrap();
        registry.register(id(1)).unwrap();

        assert_eq!(registry.others_than(id(0)).count(), 1);
        registry.unregister(id(1));
        assert_eq!(registry.others_than(id(0)).count(), 0);
    }

    #[test]
    fn vacant_id_is_lowest_free_slot() {
        let mut registry = ConnectionRegistry::new(3);
        assert_eq!(registry.vacant_id(), Some(id(0)));

        registry.register(id(0)).unwrap();
        registry.register(id(1)).unwrap();
        assert_eq!(registry.vacant_id(), Some(id(2)));

        registry.unregister(id(0));
        assert_eq!(registry.vacant_id(), Some(id(0)));

        registry.register(id(0)).unwrap();
        registry.register(id(2)).unwrap();
        assert_eq!(registry.vacant_id(), None);
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let mut registry = ConnectionRegistry::new(0);
        assert_eq!(registry.vacant_id(), None);
        assert!(registry.register(id(0)).is_err());
        assert_eq!(registry.iter().count(), 0);
    }
}

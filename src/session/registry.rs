//! Live-connection registry keyed by connection id.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::conn::MuxConn;

/// Concurrent map of the session's registered connections.
///
/// After [`close`](Self::close) the registry is empty for good: lookups
/// return `None` and inserts are refused.
#[derive(Debug, Default)]
pub struct ConnRegistry {
    conns: DashMap<i32, MuxConn>,
    closed: AtomicBool,
}

impl ConnRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live connection.
    pub fn get(&self, id: i32) -> Option<MuxConn> {
        if self.is_closed() {
            return None;
        }
        self.conns.get(&id).map(|entry| entry.value().clone())
    }

    /// Register `conn` under `id` if the id is free.
    ///
    /// Returns `false` if the id is taken or the registry is closed. Ids are
    /// never replaced in place; a connection leaves only through
    /// [`delete`](Self::delete) or [`close`](Self::close).
    pub fn insert_new(&self, id: i32, conn: MuxConn) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.conns.entry(id) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                slot.insert(conn);
            }
        }
        self.undo_if_closed(id)
    }

    /// Remove a connection.
    pub fn delete(&self, id: i32) -> Option<MuxConn> {
        self.conns.remove(&id).map(|(_, conn)| conn)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: i32) -> bool {
        !self.is_closed() && self.conns.contains_key(&id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Shut down every registered connection and refuse further inserts.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let conns: Vec<MuxConn> = self.conns.iter().map(|e| e.value().clone()).collect();
        self.conns.clear();
        for conn in conns {
            conn.shutdown();
        }
    }

    // A close racing an insert may have snapshotted the map before the
    // insert landed.
    fn undo_if_closed(&self, id: i32) -> bool {
        if !self.is_closed() {
            return true;
        }
        if let Some(conn) = self.delete(id) {
            conn.shutdown();
        }
        false
    }
}

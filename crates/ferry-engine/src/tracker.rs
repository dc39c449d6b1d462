//! Dynamic-type identity tracking
//!
//! "The same" dynamically defined class, serialized twice, must reconstruct
//! as one class object per destination process. The tracker assigns each
//! dynamic class an opaque tracking id on first serialization and lets the
//! destination dedup reconstructions against it. Both directions of the
//! mapping are weak: the tracker never keeps a class alive, and a collected
//! class frees its id entry.

use ferry_runtime::ClassObject;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Opaque token identifying a dynamically defined type across repeated
/// serializations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackingId([u8; 16]);

impl TrackingId {
    /// Generate a fresh random id
    pub fn random() -> Self {
        Self(rand::random::<u128>().to_le_bytes())
    }

    /// The id's wire form
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Rebuild an id from its wire form
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// The two inverse weak maps, always updated together
#[derive(Debug, Default)]
struct TrackerMaps {
    /// class object-id → (class, tracking id)
    forward: FxHashMap<u64, (Weak<ClassObject>, TrackingId)>,
    /// tracking id → class
    inverse: FxHashMap<TrackingId, Weak<ClassObject>>,
}

impl TrackerMaps {
    fn purge_dead(&mut self) {
        self.forward.retain(|_, (class, _)| class.upgrade().is_some());
        self.inverse.retain(|_, class| class.upgrade().is_some());
    }

    fn insert(&mut self, class: &Arc<ClassObject>, id: TrackingId) {
        self.forward
            .insert(class.object_id, (Arc::downgrade(class), id));
        self.inverse.insert(id, Arc::downgrade(class));
    }
}

/// Weak, two-way registry mapping dynamic classes to tracking ids
///
/// One registry per process side: the source consults it when serializing
/// (`id_for`), the destination when reconstructing (`lookup`/`register`).
/// Registries are never shared across processes. The single lock is scoped
/// to each check-or-insert operation.
#[derive(Debug)]
pub struct ClassTracker {
    inner: Mutex<TrackerMaps>,
}

impl ClassTracker {
    /// Create an empty tracker
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(TrackerMaps::default()),
        })
    }

    /// Tracking id for `class`, allocating one on first use
    pub fn id_for(&self, class: &Arc<ClassObject>) -> TrackingId {
        let mut maps = self.inner.lock();
        if let Some((tracked, id)) = maps.forward.get(&class.object_id) {
            if tracked.upgrade().is_some() {
                return *id;
            }
        }
        let id = TrackingId::random();
        maps.purge_dead();
        maps.insert(class, id);
        log::debug!("tracking class '{}' as {id}", class.qualname);
        id
    }

    /// Class already reconstructed under `id` in this process, if any
    pub fn lookup(&self, id: TrackingId) -> Option<Arc<ClassObject>> {
        self.inner.lock().inverse.get(&id)?.upgrade()
    }

    /// Bind a reconstructed class to the id it was carried under
    ///
    /// Fails when the id is already bound to a different live class: the
    /// payload and this process disagree about what the id means.
    pub fn register(&self, id: TrackingId, class: &Arc<ClassObject>) -> Result<(), TrackingId> {
        let mut maps = self.inner.lock();
        if let Some(existing) = maps.inverse.get(&id).and_then(Weak::upgrade) {
            if existing.object_id != class.object_id {
                return Err(id);
            }
            return Ok(());
        }
        maps.purge_dead();
        maps.insert(class, id);
        Ok(())
    }

    /// Number of live tracked classes
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .forward
            .values()
            .filter(|(class, _)| class.upgrade().is_some())
            .count()
    }

    /// True when nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_runtime::ClassKind;

    fn make_class(name: &str) -> Arc<ClassObject> {
        ClassObject::new(ClassKind::Plain, name, name, None, vec![])
    }

    #[test]
    fn test_id_stable_per_class() {
        let tracker = ClassTracker::new();
        let class = make_class("C");
        let first = tracker.id_for(&class);
        let second = tracker.id_for(&class);
        assert_eq!(first, second);
    }

    #[test]
    fn test_distinct_classes_distinct_ids() {
        let tracker = ClassTracker::new();
        let a = tracker.id_for(&make_class("A"));
        let b = tracker.id_for(&make_class("B"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_lookup_after_register() {
        let tracker = ClassTracker::new();
        let class = make_class("C");
        let id = TrackingId::random();
        tracker.register(id, &class).unwrap();
        assert!(Arc::ptr_eq(&tracker.lookup(id).unwrap(), &class));
    }

    #[test]
    fn test_register_same_class_twice_ok() {
        let tracker = ClassTracker::new();
        let class = make_class("C");
        let id = TrackingId::random();
        tracker.register(id, &class).unwrap();
        tracker.register(id, &class).unwrap();
    }

    #[test]
    fn test_register_conflict() {
        let tracker = ClassTracker::new();
        let id = TrackingId::random();
        tracker.register(id, &make_class("A")).unwrap();
        assert!(tracker.register(id, &make_class("B")).is_err());
    }

    #[test]
    fn test_neither_side_keeps_classes_alive() {
        let tracker = ClassTracker::new();
        let id = {
            let class = make_class("Transient");
            tracker.id_for(&class)
        };
        assert!(tracker.lookup(id).is_none());
        // A later insert purges the dead pair from both maps.
        tracker.id_for(&make_class("Other"));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_id_roundtrips_through_bytes() {
        let id = TrackingId::random();
        assert_eq!(TrackingId::from_bytes(*id.as_bytes()), id);
    }
}

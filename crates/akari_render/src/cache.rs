use std::sync::Arc;

use akari_utils::hash::NoHashMap;
use parking_lot::{Mutex, MutexGuard};

use crate::error::Result;

/// Append-only map from structural hash to a cached object.
///
/// Objects are never evicted. They go away when the store is dropped, which
/// happens with the owning [`Device`](crate::Device).
pub struct ObjectStore<T> {
    kind: &'static str,
    objects: Mutex<NoHashMap<u64, Arc<T>>>,
}

impl<T> ObjectStore<T> {
    pub fn with_capacity(kind: &'static str, capacity: usize) -> Self {
        Self {
            kind,
            objects: Mutex::new(NoHashMap::with_capacity_and_hasher(
                capacity,
                Default::default(),
            )),
        }
    }
    pub fn try_get(&self, hash: u64) -> Option<Arc<T>> {
        self.objects.lock().get(&hash).cloned()
    }
    /// Registers a freshly created object.
    ///
    /// # Panics
    /// When an object with the same hash is already registered. Callers must
    /// check with [`ObjectStore::try_get`] first.
    #[cfg(test)]
    pub fn insert(&self, hash: u64, object: Arc<T>) {
        Self::register(self.kind, &mut self.objects.lock(), hash, object);
    }
    fn register(
        kind: &str,
        objects: &mut MutexGuard<'_, NoHashMap<u64, Arc<T>>>,
        hash: u64,
        object: Arc<T>,
    ) {
        let previous = objects.insert(hash, object);
        assert!(
            previous.is_none(),
            "{} {:#018x} was registered twice, use try_get before creating it",
            kind,
            hash
        );
    }
    /// Returns the object registered under `hash`, running `create` on a miss.
    ///
    /// The store stays locked while `create` runs, so concurrent callers asking
    /// for the same hash wait and then get the same object.
    pub fn get_or_try_create(
        &self,
        hash: u64,
        create: impl FnOnce() -> Result<T>,
    ) -> Result<Arc<T>> {
        let mut objects = self.objects.lock();

        if let Some(object) = objects.get(&hash) {
            log::trace!("{} cache hit {:#018x}", self.kind, hash);
            return Ok(object.clone());
        }

        let object = Arc::new(create()?);
        Self::register(self.kind, &mut objects, hash, object.clone());

        Ok(object)
    }
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for ObjectStore<T> {
    fn drop(&mut self) {
        let objects = self.objects.get_mut();
        let count = objects.len();
        objects.clear();

        log::debug!("Dropped {} store with {} objects", self.kind, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn creates_once_then_hits() {
        let store = ObjectStore::with_capacity("test object", 4);
        let mut calls = 0;

        let first = store
            .get_or_try_create(7, || {
                calls += 1;
                Ok(String::from("seven"))
            })
            .unwrap();
        let second = store
            .get_or_try_create(7, || {
                calls += 1;
                Ok(String::from("other"))
            })
            .unwrap();

        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn failed_creation_registers_nothing() {
        let store: ObjectStore<u32> = ObjectStore::with_capacity("test object", 4);

        let result = store.get_or_try_create(1, || Err(Error::NoSubpasses));

        assert_eq!(result.unwrap_err(), Error::NoSubpasses);
        assert!(store.try_get(1).is_none());
        assert!(store.is_empty());
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_registration_panics() {
        let store = ObjectStore::with_capacity("test object", 4);

        store.insert(3, Arc::new(3u32));
        store.insert(3, Arc::new(4u32));
    }
}

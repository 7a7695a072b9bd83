use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::RwLock;

/// A keyed in-memory table shared between request handlers.
///
/// Every method takes the lock for exactly the duration of the call, so a
/// closure passed to [`MemoryTable::update`] observes and mutates the entry
/// without interleaving with any other access to the same table.
#[derive(Debug)]
pub struct MemoryTable<K, V> {
    map: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for MemoryTable<K, V> {
    fn default() -> Self { Self { map: RwLock::new(HashMap::new()) } }
}

impl<K: Eq + Hash, V: Clone> MemoryTable<K, V> {
    pub fn new() -> Self { Self::default() }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.map.read().get(key).cloned()
    }

    /// Insert or overwrite; returns the previous value.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        self.map.write().insert(key, value)
    }

    /// Insert only when the key is vacant. Returns false (and drops `value`)
    /// when the key is already taken.
    pub fn put_if_absent(&self, key: K, value: V) -> bool {
        let mut m = self.map.write();
        if m.contains_key(&key) { return false; }
        m.insert(key, value);
        true
    }

    pub fn delete<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.map.write().remove(key)
    }

    /// Run `f` against the stored value under the write lock.
    /// Returns `None` when the key is absent.
    pub fn update<Q, R>(&self, key: &Q, f: impl FnOnce(&mut V) -> R) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let mut m = self.map.write();
        m.get_mut(key).map(f)
    }

    pub fn len(&self) -> usize { self.map.read().len() }

    pub fn is_empty(&self) -> bool { self.map.read().is_empty() }
}

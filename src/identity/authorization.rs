use tracing::info;

use super::table::MemoryTable;

/// Remembered consent decisions, keyed by (identity URL, trust root).
/// Both halves of the key are compared as opaque strings.
pub trait ConsumerAuthStore: Send + Sync {
    /// Unknown pairs are not authorized.
    fn is_authorized(&self, identity: &str, trust_root: &str) -> bool;
    /// Last write wins.
    fn store(&self, identity: &str, trust_root: &str, approved: bool);
    /// No-op when the pair is unknown.
    fn remove(&self, identity: &str, trust_root: &str);
}

#[derive(Debug, Default)]
pub struct MemoryConsumerAuthStore {
    decisions: MemoryTable<(String, String), bool>,
}

impl MemoryConsumerAuthStore {
    pub fn new() -> Self { Self::default() }

    fn key(identity: &str, trust_root: &str) -> (String, String) {
        (identity.to_string(), trust_root.to_string())
    }
}

impl ConsumerAuthStore for MemoryConsumerAuthStore {
    fn is_authorized(&self, identity: &str, trust_root: &str) -> bool {
        self.decisions.get(&Self::key(identity, trust_root)).unwrap_or(false)
    }

    fn store(&self, identity: &str, trust_root: &str, approved: bool) {
        self.decisions.put(Self::key(identity, trust_root), approved);
        info!(target: "consent", identity, trust_root, approved, "stored consumer authorization");
    }

    fn remove(&self, identity: &str, trust_root: &str) {
        if self.decisions.delete(&Self::key(identity, trust_root)).is_some() {
            info!(target: "consent", identity, trust_root, "removed consumer authorization");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "http://localhost:8000/id/alice";
    const ROOT: &str = "http://rp.example/";

    #[test]
    fn unknown_pairs_are_not_authorized() {
        let store = MemoryConsumerAuthStore::new();
        assert!(!store.is_authorized(ID, ROOT));
        assert!(!store.is_authorized("", ""));
    }

    #[test]
    fn last_write_wins() {
        let store = MemoryConsumerAuthStore::new();
        store.store(ID, ROOT, true);
        assert!(store.is_authorized(ID, ROOT));
        store.store(ID, ROOT, false);
        assert!(!store.is_authorized(ID, ROOT));
    }

    #[test]
    fn keys_are_not_normalized() {
        let store = MemoryConsumerAuthStore::new();
        store.store(ID, ROOT, true);
        assert!(!store.is_authorized(ID, "http://rp.example"));
        assert!(!store.is_authorized("http://localhost:8000/id/alice/", ROOT));
    }

    #[test]
    fn remove_is_idempotent() {
        let store = MemoryConsumerAuthStore::new();
        store.remove(ID, ROOT);
        store.store(ID, ROOT, true);
        store.remove(ID, ROOT);
        store.remove(ID, ROOT);
        assert!(!store.is_authorized(ID, ROOT));
    }
}

//! The process-wide client registry: one coarse-grained lock over a
//! `HashMap`, plus the per-client counters and name slot every Session
//! shares a reference to. Contention here is low — membership only changes
//! on connect/disconnect/rename — so a single `std::sync::Mutex` is the
//! right tool; nothing in this module ever awaits while holding it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::connection::OutboundHandle;

pub type ClientId = String;

/// The mutable, shared-by-reference state for one client: its name slot and
/// its two delivery counters. Owned by the `Registry` (shared) and also
/// referenced by the owning `Session` for local reads.
pub struct ClientData {
    pub id: ClientId,
    name: Mutex<Option<String>>,
    sent: AtomicU64,
    received: AtomicU64,
}

impl ClientData {
    pub fn new(id: ClientId) -> Self {
        ClientData {
            id,
            name: Mutex::new(None),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> Option<String> {
        self.name.lock().expect("client name mutex poisoned").clone()
    }

    pub fn set_name(&self, name: String) {
        *self.name.lock().expect("client name mutex poisoned") = Some(name);
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn incr_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }
}

/// A registered peer: everything another Session needs in order to enqueue
/// frames into it and read its public counters/name. Cheap to clone (an
/// `Arc`), safe to hold outside the Registry's lock.
pub struct SessionHandle {
    pub data: Arc<ClientData>,
    pub outbound: OutboundHandle,
}

#[derive(Default)]
pub struct Registry {
    inner: Mutex<HashMap<ClientId, Arc<SessionHandle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn add(&self, id: ClientId, handle: Arc<SessionHandle>) {
        self.inner.lock().expect("registry mutex poisoned").insert(id, handle);
    }

    pub fn remove(&self, id: &str) {
        self.inner.lock().expect("registry mutex poisoned").remove(id);
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.inner.lock().expect("registry mutex poisoned").get(id).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<SessionHandle>> {
        self.inner
            .lock()
            .expect("registry mutex poisoned")
            .values()
            .find(|handle| handle.data.name().as_deref() == Some(name))
            .cloned()
    }

    /// A shallow, lock-free-to-iterate snapshot of every session except
    /// `except_id`. Individual `SessionHandle`s stay valid after the lock
    /// is released; their internal state (name, counters) may keep
    /// changing, which callers must tolerate per the Registry's contract.
    pub fn snapshot_except(&self, except_id: &str) -> Vec<Arc<SessionHandle>> {
        self.inner
            .lock()
            .expect("registry mutex poisoned")
            .iter()
            .filter(|(id, _)| id.as_str() != except_id)
            .map(|(_, handle)| handle.clone())
            .collect()
    }

    /// Checks `name` for a collision against every other registered session
    /// and, if none exists, assigns it to `id`'s `ClientData` — both under
    /// the same `inner` lock acquisition, so no second caller can observe
    /// `name` as free after the first caller has already claimed it (§4.4:
    /// "checked and asserted under the same lock that protects name
    /// mutation"). Returns `false`, leaving the registry untouched, if
    /// another session already holds `name`.
    pub fn try_set_name(&self, id: &str, name: &str) -> bool {
        let inner = self.inner.lock().expect("registry mutex poisoned");
        let taken = inner
            .iter()
            .any(|(other_id, handle)| other_id.as_str() != id && handle.data.name().as_deref() == Some(name));
        if taken {
            return false;
        }
        if let Some(handle) = inner.get(id) {
            handle.data.set_name(name.to_string());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_lookup_remove() {
        let registry = Registry::new();
        let handle = real_handle("id-1").await;
        registry.add("id-1".into(), handle);

        assert!(registry.lookup("id-1").is_some());
        registry.remove("id-1");
        assert!(registry.lookup("id-1").is_none());
    }

    #[tokio::test]
    async fn name_uniqueness_check() {
        let registry = Registry::new();
        let alice = real_handle("id-alice").await;
        registry.add("id-alice".into(), alice);
        let bob = real_handle("id-bob").await;
        registry.add("id-bob".into(), bob);

        assert!(registry.try_set_name("id-alice", "Alice"));
        assert!(!registry.try_set_name("id-bob", "Alice"));
        assert!(registry.try_set_name("id-alice", "Alice"));
        assert!(registry.try_set_name("id-bob", "Carol"));
    }

    /// Two sessions racing to claim the same name must not both succeed:
    /// the scan-then-assign in `try_set_name` happens under one lock
    /// acquisition, so exactly one of any number of concurrent callers
    /// wins (§4.4, §8 invariant 2).
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registration_of_same_name_has_exactly_one_winner() {
        let registry = Arc::new(Registry::new());
        const CONTENDERS: usize = 8;
        for i in 0..CONTENDERS {
            registry.add(format!("id-{i}"), real_handle(&format!("id-{i}")).await);
        }

        let mut tasks = Vec::new();
        for i in 0..CONTENDERS {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.try_set_name(&format!("id-{i}"), "Alice")
            }));
        }

        let mut wins = 0;
        for task in tasks {
            if task.await.unwrap() {
                wins += 1;
            }
        }

        assert_eq!(wins, 1);
        let claimants = (0..CONTENDERS)
            .filter(|i| {
                registry
                    .lookup(&format!("id-{i}"))
                    .map(|h| h.data.name().as_deref() == Some("Alice"))
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(claimants, 1);
    }

    #[tokio::test]
    async fn snapshot_except_excludes_self() {
        let registry = Registry::new();
        registry.add("id-1".into(), real_handle("id-1").await);
        registry.add("id-2".into(), real_handle("id-2").await);

        let snapshot = registry.snapshot_except("id-1");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].data.id, "id-2");
    }

    #[tokio::test]
    async fn find_by_name_matches_registered_name() {
        let registry = Registry::new();
        let bob = real_handle("id-bob").await;
        bob.data.set_name("Bob".into());
        registry.add("id-bob".into(), bob);

        assert!(registry.find_by_name("Bob").is_some());
        assert!(registry.find_by_name("Nobody").is_none());
    }

    async fn real_handle(id: &str) -> Arc<SessionHandle> {
        use tokio::net::{TcpListener, TcpStream};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let client = TcpStream::connect(addr).await.unwrap();
        let server = accept.await.unwrap();
        // Keep the client side alive for the test's duration by leaking it
        // into the spawned task's scope; the registry tests only exercise
        // map bookkeeping, not I/O.
        std::mem::forget(client);

        let (_conn, outbound) = crate::connection::Connection::new(server);
        Arc::new(SessionHandle {
            data: Arc::new(ClientData::new(id.to_string())),
            outbound,
        })
    }
}

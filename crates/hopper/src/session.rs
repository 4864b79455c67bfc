//! Client session tracking
//!
//! A session binds one client address to one connected upstream socket for
//! the duration of its activity. The table only guarantees key uniqueness;
//! liveness is enforced by the reactor's per-operation deadlines, whose
//! expiry surfaces as I/O errors that trigger [`SessionTable::remove`].

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use spin::Mutex;
use tokio::{net::UdpSocket, time::Instant};

/// One client's pairing with its upstream socket.
pub struct Session {
    /// Connected socket towards the chosen next hop.
    pub upstream: Arc<UdpSocket>,
    /// The next hop drawn at session creation; never changes afterwards.
    pub upstream_addr: SocketAddr,
    /// Refreshed on every successful I/O involving this session.
    pub last_activity: Instant,
}

/// Client address to session map. All mutation goes through a single lock
/// held only across the map operation itself, never across I/O.
#[derive(Default)]
pub struct SessionTable {
    inner: Mutex<HashMap<SocketAddr, Session>>,
}

impl SessionTable {
    pub fn new() -> SessionTable {
        SessionTable::default()
    }

    /// Registers `client`, replacing any previous pairing.
    pub fn insert(&self, client: SocketAddr, upstream: Arc<UdpSocket>, upstream_addr: SocketAddr) {
        self.inner.lock().insert(
            client,
            Session {
                upstream,
                upstream_addr,
                last_activity: Instant::now(),
            },
        );
    }

    /// The upstream pairing of `client`, if one exists.
    pub fn upstream_of(&self, client: &SocketAddr) -> Option<(Arc<UdpSocket>, SocketAddr)> {
        self.inner
            .lock()
            .get(client)
            .map(|session| (session.upstream.clone(), session.upstream_addr))
    }

    /// Marks `client` as active now.
    pub fn touch(&self, client: &SocketAddr) {
        if let Some(session) = self.inner.lock().get_mut(client) {
            session.last_activity = Instant::now();
        }
    }

    /// Drops the session of `client`. Returns whether one existed.
    pub fn remove(&self, client: &SocketAddr) -> bool {
        self.inner.lock().remove(client).is_some()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn one_session_per_client() {
        let table = SessionTable::new();
        let client = addr(40000);

        let first = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let second = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());

        table.insert(client, first, addr(3000));
        table.insert(client, second.clone(), addr(3001));
        assert_eq!(table.len(), 1);

        let (upstream, upstream_addr) = table.upstream_of(&client).unwrap();
        assert_eq!(upstream_addr, addr(3001));
        assert_eq!(
            upstream.local_addr().unwrap(),
            second.local_addr().unwrap()
        );
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let table = SessionTable::new();
        let client = addr(40001);
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());

        table.insert(client, socket, addr(3000));
        assert!(table.remove(&client));
        assert!(!table.remove(&client));
        assert!(table.is_empty());
        assert!(table.upstream_of(&client).is_none());
    }
}

//! UDP relay engine
//!
//! Two cooperating loops share the listen socket, the session table and the
//! reactor. The ingress loop reads client datagrams from the listen socket,
//! re-ciphers them and queues writes towards the paired upstream socket,
//! opening a new pairing on first contact. The completion loop consumes
//! reactor completions: successful upstream reads travel the inverse cipher
//! path back to the client, and any upstream error or expired deadline
//! evicts the session. The next packet from the same client simply pairs
//! again.

use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use byte_string::ByteStr;
use log::{debug, error, info, trace, warn};
use rand::seq::SliceRandom;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::{net::UdpSocket, sync::watch, time::Instant};

use crate::{
    config::Config,
    crypto::{self, BlockCrypt},
    packet::{self, MTU_LIMIT},
    reactor::{Completion, OpKind, Reactor},
    session::SessionTable,
};

/// Inspects a decoded client payload before it is re-encoded for the next
/// hop. Returning `None` blackholes the packet.
pub type OnClientIn = Box<dyn Fn(SocketAddr, &[u8]) -> Option<Vec<u8>> + Send + Sync>;

/// Inspects a decoded upstream payload before it is re-encoded for the
/// client; arguments are the next hop's address and the client's address.
/// Returning `None` drops the packet, but the reply path stays armed.
pub type OnNextHopIn = Box<dyn Fn(SocketAddr, SocketAddr, &[u8]) -> Option<Vec<u8>> + Send + Sync>;

/// Startup failures. All fatal: the process should exit non-zero.
#[derive(Error, Debug)]
pub enum ListenError {
    #[error("no next hop provided")]
    NoNextHops,
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
    #[error(transparent)]
    Crypto(#[from] crypto::CryptoError),
}

/// A UDP relay bound to its listen socket.
pub struct Listener {
    socket: Arc<UdpSocket>,
    crypt_in: Option<Box<dyn BlockCrypt>>,
    crypt_out: Option<Box<dyn BlockCrypt>>,
    next_hops: Vec<SocketAddr>,
    timeout: Duration,
    sessions: SessionTable,
    reactor: Reactor,
    on_client_in: Option<OnClientIn>,
    on_next_hop_in: Option<OnNextHopIn>,
    cancel_tx: watch::Sender<bool>,
    closed: AtomicBool,
}

fn bind_listen_socket(addr: SocketAddr, sockbuf: usize) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_recv_buffer_size(sockbuf)?;
    socket.set_send_buffer_size(sockbuf)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}

async fn connect_upstream(addr: SocketAddr) -> io::Result<UdpSocket> {
    let bind_addr: SocketAddr = match addr {
        SocketAddr::V4(..) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(..) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(addr).await?;
    Ok(socket)
}

impl Listener {
    /// Binds the listen socket and prepares both cipher pipelines.
    ///
    /// Must run inside a tokio runtime.
    pub fn bind(config: &Config) -> Result<Listener, ListenError> {
        if config.next_hops.is_empty() {
            return Err(ListenError::NoNextHops);
        }

        let socket = bind_listen_socket(config.listen, config.sockbuf).map_err(|source| ListenError::Bind {
            addr: config.listen,
            source,
        })?;

        info!("initiating key derivation");
        let key_in = crypto::derive_key(&config.key_in, crypto::KEY_SALT, crypto::KEY_ROUNDS);
        let key_out = crypto::derive_key(&config.key_out, crypto::KEY_SALT, crypto::KEY_ROUNDS);
        info!("key derivation done");

        let crypt_in = crypto::new_block_crypt(config.cipher_in, &key_in)?;
        let crypt_out = crypto::new_block_crypt(config.cipher_out, &key_out)?;

        if let Ok(local) = socket.local_addr() {
            info!("listening on {}", local);
        }

        let (cancel_tx, _) = watch::channel(false);

        Ok(Listener {
            socket: Arc::new(socket),
            crypt_in,
            crypt_out,
            next_hops: config.next_hops.clone(),
            timeout: config.timeout,
            sessions: SessionTable::new(),
            reactor: Reactor::new(),
            on_client_in: None,
            on_next_hop_in: None,
            cancel_tx,
            closed: AtomicBool::new(false),
        })
    }

    /// Installs the pre-route hook applied to decoded client payloads.
    pub fn with_on_client_in(mut self, hook: OnClientIn) -> Listener {
        self.on_client_in = Some(hook);
        self
    }

    /// Installs the post-route hook applied to decoded upstream payloads.
    pub fn with_on_next_hop_in(mut self, hook: OnNextHopIn) -> Listener {
        self.on_next_hop_in = Some(hook);
        self
    }

    /// Address of the listen socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Number of live client sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Serves until [`Listener::close`] is called or the listen socket
    /// fails. Packet and session errors never terminate the engine.
    pub async fn run(&self) -> io::Result<()> {
        let result = tokio::select! {
            done = self.ingress_loop() => done,
            done = self.completion_loop() => done,
        };
        self.close();
        result
    }

    /// Shuts the engine down: stops both loops and cancels every in-flight
    /// upstream operation, evicting all sessions. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("closing listener");
            let _ = self.cancel_tx.send(true);
            self.reactor.close();
            self.sessions.clear();
        }
    }

    async fn ingress_loop(&self) -> io::Result<()> {
        let mut cancel_rx = self.cancel_tx.subscribe();
        let mut buf = vec![0u8; MTU_LIMIT];

        loop {
            let (n, peer) = tokio::select! {
                _ = cancel_rx.changed() => return Ok(()),
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(err) => {
                        error!("listen socket read failed: {}", err);
                        return Err(err);
                    }
                },
            };

            self.handle_client_packet(&mut buf[..n], peer).await;
        }
    }

    async fn handle_client_packet(&self, data: &mut [u8], peer: SocketAddr) {
        let payload = match packet::decrypt_packet(self.crypt_in.as_deref(), data) {
            Ok(payload) => payload,
            Err(err) => {
                debug!("dropped packet from {}: {}", peer, err);
                return;
            }
        };

        trace!("client {} sent {} bytes: {:?}", peer, payload.len(), ByteStr::new(payload));

        let rewritten;
        let payload = match &self.on_client_in {
            Some(hook) => match hook(peer, payload) {
                Some(out) => {
                    rewritten = out;
                    &rewritten[..]
                }
                None => return,
            },
            None => payload,
        };

        let frame = packet::encrypt_packet(self.crypt_out.as_deref(), payload);
        let deadline = Instant::now() + self.timeout;

        if let Some((upstream, _)) = self.sessions.upstream_of(&peer) {
            self.sessions.touch(&peer);
            self.reactor.write_with_deadline(peer, upstream, frame, deadline);
            return;
        }

        // First contact: draw a hop and pair a fresh connected socket.
        let next_hop = match self.next_hops.choose(&mut rand::thread_rng()) {
            Some(&hop) => hop,
            None => return, // bind() rejects empty hop lists
        };
        let upstream = match connect_upstream(next_hop).await {
            Ok(socket) => Arc::new(socket),
            Err(err) => {
                warn!("failed to dial next hop {}: {}", next_hop, err);
                return;
            }
        };

        info!("new connection: {} -> {}", peer, next_hop);
        self.sessions.insert(peer, upstream.clone(), next_hop);

        // Arm the reply path before the first write goes out.
        self.reactor
            .read_with_deadline(peer, upstream.clone(), vec![0u8; MTU_LIMIT], deadline);
        self.reactor.write_with_deadline(peer, upstream, frame, deadline);
    }

    async fn completion_loop(&self) -> io::Result<()> {
        loop {
            let batch = match self.reactor.wait().await {
                Ok(batch) => batch,
                Err(err) => {
                    debug!("reactor stopped: {}", err);
                    return Ok(());
                }
            };

            for done in batch {
                self.dispatch(done).await;
            }
        }
    }

    async fn dispatch(&self, done: Completion) {
        match done.kind {
            OpKind::Write => match done.result {
                Ok(..) => self.sessions.touch(&done.ctx),
                Err(err) => {
                    info!("upstream write for {} failed: {}", done.ctx, err);
                    self.sessions.remove(&done.ctx);
                }
            },
            OpKind::Read => match done.result {
                Ok(n) => self.upstream_in(done.ctx, done.socket, done.buf, n).await,
                Err(err) => {
                    info!("upstream read for {} failed: {}", done.ctx, err);
                    self.sessions.remove(&done.ctx);
                }
            },
        }
    }

    /// Handles one datagram that arrived from a next hop on behalf of
    /// `client`, then re-arms the read on that upstream socket.
    async fn upstream_in(&self, client: SocketAddr, upstream: Arc<UdpSocket>, mut buf: Vec<u8>, n: usize) {
        self.sessions.touch(&client);

        match packet::decrypt_packet(self.crypt_out.as_deref(), &mut buf[..n]) {
            Err(err) => {
                debug!("dropped upstream packet for {}: {}", client, err);
            }
            Ok(payload) => {
                trace!(
                    "upstream sent {} bytes for {}: {:?}",
                    payload.len(),
                    client,
                    ByteStr::new(payload)
                );

                let rewritten;
                let payload = match (&self.on_next_hop_in, upstream.peer_addr()) {
                    (Some(hook), Ok(hop)) => match hook(hop, client, payload) {
                        Some(out) => {
                            rewritten = out;
                            Some(&rewritten[..])
                        }
                        None => None,
                    },
                    _ => Some(payload),
                };

                if let Some(payload) = payload {
                    let frame = packet::encrypt_packet(self.crypt_in.as_deref(), payload);
                    // Fire and forget: a failed reply is not fatal to the
                    // session.
                    if let Err(err) = self.socket.send_to(&frame, client).await {
                        warn!("reply to {} failed: {}", client, err);
                    }
                }
            }
        }

        // Re-arm the reply path whether or not this datagram was forwarded.
        self.reactor
            .read_with_deadline(client, upstream, vec![0u8; MTU_LIMIT], Instant::now() + self.timeout);
    }
}

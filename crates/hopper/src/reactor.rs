//! Deadline-driven UDP completion queue
//!
//! One reactor multiplexes reads and writes across any number of connected
//! upstream sockets. Every operation carries an absolute deadline and an
//! opaque context (the client address that owns the upstream socket), so read
//! completions can be routed back to the right client without a reverse
//! lookup. Completions are drained in batches from [`Reactor::wait`].
//!
//! [`Reactor::close`] cancels everything in flight; each pending operation
//! then surfaces a completion carrying a cancellation error, and once the
//! queue is fully drained `wait` reports a terminal error.

use std::{
    io::{self, ErrorKind},
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use log::trace;
use tokio::{
    net::UdpSocket,
    sync::{mpsc, watch, Mutex},
    time::{self, Instant},
};

/// Direction of a completed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Read,
    Write,
}

/// Outcome of one queued operation.
#[derive(Debug)]
pub struct Completion {
    pub kind: OpKind,
    /// Context handed in when the operation was queued. Never inspected by
    /// the reactor.
    pub ctx: SocketAddr,
    /// The socket the operation ran on.
    pub socket: Arc<UdpSocket>,
    /// The operation's buffer: read target, or the frame that was written.
    pub buf: Vec<u8>,
    /// Bytes transferred, or the failure (I/O error, deadline, cancellation).
    pub result: io::Result<usize>,
}

pub struct Reactor {
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: Mutex<mpsc::UnboundedReceiver<Completion>>,
    cancel_tx: watch::Sender<bool>,
    closed: AtomicBool,
    inflight: Arc<AtomicUsize>,
}

fn closed_error() -> io::Error {
    io::Error::new(ErrorKind::Interrupted, "reactor closed")
}

async fn perform(kind: OpKind, socket: &UdpSocket, buf: &mut Vec<u8>) -> io::Result<usize> {
    match kind {
        OpKind::Read => socket.recv(buf.as_mut_slice()).await,
        OpKind::Write => socket.send(buf).await,
    }
}

impl Reactor {
    pub fn new() -> Reactor {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (cancel_tx, _) = watch::channel(false);
        Reactor {
            completions_tx,
            completions_rx: Mutex::new(completions_rx),
            cancel_tx,
            closed: AtomicBool::new(false),
            inflight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queues a receive on `socket` into `buf`, completing with the byte
    /// count or an error no later than `deadline`.
    pub fn read_with_deadline(&self, ctx: SocketAddr, socket: Arc<UdpSocket>, buf: Vec<u8>, deadline: Instant) {
        self.submit(OpKind::Read, ctx, socket, buf, deadline);
    }

    /// Queues a send of `data` on `socket`, completing with the byte count
    /// or an error no later than `deadline`.
    pub fn write_with_deadline(&self, ctx: SocketAddr, socket: Arc<UdpSocket>, data: Vec<u8>, deadline: Instant) {
        self.submit(OpKind::Write, ctx, socket, data, deadline);
    }

    fn submit(&self, kind: OpKind, ctx: SocketAddr, socket: Arc<UdpSocket>, mut buf: Vec<u8>, deadline: Instant) {
        let tx = self.completions_tx.clone();
        let inflight = self.inflight.clone();
        inflight.fetch_add(1, Ordering::AcqRel);

        // Subscribing before the closed check pins the ordering: either the
        // flag is observed here, or the cancel notification reaches the task.
        let mut cancel_rx = self.cancel_tx.subscribe();
        if self.closed.load(Ordering::Acquire) {
            let _ = tx.send(Completion {
                kind,
                ctx,
                socket,
                buf,
                result: Err(closed_error()),
            });
            inflight.fetch_sub(1, Ordering::AcqRel);
            return;
        }

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel_rx.changed() => Err(closed_error()),
                done = time::timeout_at(deadline, perform(kind, &socket, &mut buf)) => match done {
                    Ok(done) => done,
                    Err(..) => Err(io::Error::new(ErrorKind::TimedOut, "deadline exceeded")),
                },
            };

            let _ = tx.send(Completion {
                kind,
                ctx,
                socket,
                buf,
                result,
            });
            inflight.fetch_sub(1, Ordering::AcqRel);
        });
    }

    /// Blocks until at least one operation has completed and returns every
    /// completion that is ready, in completion order. Errors once the
    /// reactor has been closed and fully drained.
    pub async fn wait(&self) -> io::Result<Vec<Completion>> {
        let mut rx = self.completions_rx.lock().await;
        let mut cancel_rx = self.cancel_tx.subscribe();
        let mut batch = Vec::new();

        loop {
            while let Ok(done) = rx.try_recv() {
                batch.push(done);
            }
            if !batch.is_empty() {
                return Ok(batch);
            }
            if self.closed.load(Ordering::Acquire) && self.inflight.load(Ordering::Acquire) == 0 {
                // A task may have completed between the drain above and the
                // counter read; inflight hitting zero means every completion
                // is already in the channel, so one more drain settles it.
                while let Ok(done) = rx.try_recv() {
                    batch.push(done);
                }
                if !batch.is_empty() {
                    return Ok(batch);
                }
                return Err(closed_error());
            }

            tokio::select! {
                done = rx.recv() => match done {
                    Some(done) => batch.push(done),
                    None => return Err(closed_error()),
                },
                _ = cancel_rx.changed() => {}
            }
        }
    }

    /// Cancels all outstanding operations. Idempotent; safe to call from
    /// several tasks at once.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            trace!("reactor closing, cancelling in-flight operations");
            let _ = self.cancel_tx.send(true);
        }
    }
}

impl Default for Reactor {
    fn default() -> Reactor {
        Reactor::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn socket_pair() -> (Arc<UdpSocket>, Arc<UdpSocket>) {
        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        a.connect(b.local_addr().unwrap()).await.unwrap();
        b.connect(a.local_addr().unwrap()).await.unwrap();
        (Arc::new(a), Arc::new(b))
    }

    fn ctx() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 50000))
    }

    #[tokio::test]
    async fn write_then_read_completes() {
        let reactor = Reactor::new();
        let (a, b) = socket_pair().await;
        let deadline = Instant::now() + Duration::from_secs(2);

        reactor.read_with_deadline(ctx(), b.clone(), vec![0u8; 1500], deadline);
        reactor.write_with_deadline(ctx(), a.clone(), b"ping".to_vec(), deadline);

        let mut write_seen = false;
        let mut read_seen = false;
        while !(write_seen && read_seen) {
            for done in reactor.wait().await.unwrap() {
                match done.kind {
                    OpKind::Write => {
                        assert_eq!(done.result.unwrap(), 4);
                        write_seen = true;
                    }
                    OpKind::Read => {
                        let n = done.result.unwrap();
                        assert_eq!(&done.buf[..n], b"ping");
                        read_seen = true;
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn expired_deadline_surfaces_timeout() {
        let reactor = Reactor::new();
        let (_a, b) = socket_pair().await;

        reactor.read_with_deadline(ctx(), b, vec![0u8; 1500], Instant::now() + Duration::from_millis(50));

        let batch = reactor.wait().await.unwrap();
        assert_eq!(batch.len(), 1);
        let done = &batch[0];
        assert_eq!(done.kind, OpKind::Read);
        assert_eq!(done.result.as_ref().unwrap_err().kind(), ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn close_cancels_pending_and_terminates_wait() {
        let reactor = Reactor::new();
        let (_a, b) = socket_pair().await;

        reactor.read_with_deadline(ctx(), b, vec![0u8; 1500], Instant::now() + Duration::from_secs(60));
        reactor.close();
        reactor.close(); // idempotent

        let batch = reactor.wait().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(
            batch[0].result.as_ref().unwrap_err().kind(),
            ErrorKind::Interrupted
        );

        assert_eq!(
            reactor.wait().await.unwrap_err().kind(),
            ErrorKind::Interrupted
        );
    }

    #[tokio::test]
    async fn submit_after_close_is_cancelled() {
        let reactor = Reactor::new();
        let (a, _b) = socket_pair().await;

        reactor.close();
        reactor.write_with_deadline(ctx(), a, b"late".to_vec(), Instant::now() + Duration::from_secs(1));

        let batch = reactor.wait().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].kind, OpKind::Write);
        assert!(batch[0].result.is_err());
    }
}

//! Production replication transport over TCP.
//!
//! The authority listens; every follower holds one connection. Each
//! connection streams back-to-back raw snapshots of exactly
//! [`WireSnapshot::encoded_len`] bytes, so a reader that always reads that
//! many bytes never exposes a torn value.
//!
//! Last-write-wins comes from a `tokio::sync::watch` slot: a connection that
//! is still busy writing one snapshot skips every snapshot published in the
//! meantime and sends only the newest one next.

use crate::error::EnvError;
use crate::network::{SnapshotPublisher, SnapshotSubscriber, WireSnapshot};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pause after a failed accept, e.g. while the process is out of descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Authority-side TCP transport.
pub struct TcpPublisher<S: WireSnapshot> {
    /// Address the listener is bound to
    local_addr: SocketAddr,
    
    /// Latest published snapshot
    slot: watch::Sender<S>,
    
    /// Number of currently connected followers
    followers: Arc<AtomicUsize>,
    
    /// Accept loop task
    acceptor: JoinHandle<()>,
}

impl<S: WireSnapshot> TcpPublisher<S> {
    /// Binds the listener and starts accepting followers.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// `EnvError::TransportUnavailable` if the address cannot be bound.
    pub async fn bind(addr: &str, initial: S) -> Result<Self, EnvError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| EnvError::unavailable(addr, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| EnvError::unavailable(addr, e))?;
        
        let (slot, template) = watch::channel(initial);
        let followers = Arc::new(AtomicUsize::new(0));
        let acceptor = tokio::spawn(accept_loop(listener, template, followers.clone()));
        
        info!(%local_addr, "replication publisher listening");
        
        Ok(Self {
            local_addr,
            slot,
            followers,
            acceptor,
        })
    }
    
    /// Returns the bound address (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
    
    /// Returns the number of followers currently connected.
    pub fn follower_count(&self) -> usize {
        self.followers.load(Ordering::Relaxed)
    }
}

impl<S: WireSnapshot> SnapshotPublisher<S> for TcpPublisher<S> {
    fn publish(&self, snapshot: S) -> Result<(), EnvError> {
        if self.acceptor.is_finished() {
            return Err(EnvError::Closed);
        }
        self.slot.send_replace(snapshot);
        Ok(())
    }
}

impl<S: WireSnapshot> Drop for TcpPublisher<S> {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

async fn accept_loop<S: WireSnapshot>(
    listener: TcpListener,
    template: watch::Receiver<S>,
    followers: Arc<AtomicUsize>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("accept failed: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, "set_nodelay failed: {}", e);
        }
        
        // A fresh clone has not seen the current value yet, so the newest
        // snapshot goes out as soon as the connection is up.
        let rx = template.clone();
        let followers = followers.clone();
        let connected = followers.fetch_add(1, Ordering::Relaxed) + 1;
        info!(%peer, connected, "follower connected");
        
        tokio::spawn(async move {
            match stream_snapshots(stream, rx).await {
                Ok(()) => debug!(%peer, "publisher closed, ending stream"),
                Err(e) => warn!(%peer, "follower dropped: {}", e),
            }
            followers.fetch_sub(1, Ordering::Relaxed);
        });
    }
}

async fn stream_snapshots<S: WireSnapshot>(
    mut stream: TcpStream,
    mut rx: watch::Receiver<S>,
) -> Result<(), EnvError> {
    let mut buf = Vec::new();
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        buf.clear();
        snapshot.encode_into(&mut buf);
        stream
            .write_all(&buf)
            .await
            .map_err(|e| EnvError::network(e.to_string()))?;
    }
    Ok(())
}

/// Follower-side TCP transport.
pub struct TcpSubscriber<S: WireSnapshot> {
    /// Authority address
    peer: SocketAddr,
    
    /// Latest complete snapshot received
    slot: watch::Receiver<S>,
    
    /// Reader task
    reader: JoinHandle<()>,
}

impl<S: WireSnapshot> TcpSubscriber<S> {
    /// Connects to the authority and starts reading snapshots.
    ///
    /// `initial` is returned by `latest()` until the first snapshot arrives
    /// and also fixes the expected wire layout.
    ///
    /// # Errors
    /// `EnvError::TransportUnavailable` if the authority cannot be reached.
    pub async fn connect(addr: &str, initial: S) -> Result<Self, EnvError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| EnvError::unavailable(addr, e))?;
        let peer = stream
            .peer_addr()
            .map_err(|e| EnvError::unavailable(addr, e))?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, "set_nodelay failed: {}", e);
        }
        
        let (tx, slot) = watch::channel(initial.clone());
        let reader = tokio::spawn(read_snapshots(stream, initial, tx));
        
        info!(%peer, "replication subscriber connected");
        
        Ok(Self { peer, slot, reader })
    }
    
    /// Returns the authority address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
    
    /// Returns false once the stream from the authority has ended.
    pub fn is_connected(&self) -> bool {
        !self.reader.is_finished()
    }
}

impl<S: WireSnapshot> SnapshotSubscriber<S> for TcpSubscriber<S> {
    fn latest(&self) -> S {
        self.slot.borrow().clone()
    }
}

impl<S: WireSnapshot> Drop for TcpSubscriber<S> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_snapshots<S: WireSnapshot>(mut stream: TcpStream, template: S, slot: watch::Sender<S>) {
    let mut buf = vec![0u8; template.encoded_len()];
    loop {
        match stream.read_exact(&mut buf).await {
            Ok(_) => match template.decode_like(&buf) {
                Ok(snapshot) => {
                    slot.send_replace(snapshot);
                }
                Err(e) => warn!("discarding undecodable snapshot: {}", e),
            },
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                warn!("authority closed the replication stream");
                break;
            }
            Err(e) => {
                warn!("replication stream failed: {}", e);
                break;
            }
        }
    }
}

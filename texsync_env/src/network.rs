//! Replication transport abstraction for texsync nodes.

use crate::error::EnvError;
use crate::types::NodeId;

/// Authority-side end of the replication boundary.
///
/// # Implementations
///
/// - **Production**: `TcpPublisher` - one watch slot fanned out to TCP followers
/// - **Simulation**: `SimPublisher` - router queue with configurable loss/latency
///
/// # Snapshot Flow
///
/// ```text
/// Authority                 Transport                  Follower
///   |                           |                          |
///   |-- publish(snapshot) ----->|                          |
///   |-- publish(snapshot') ---->|  (snapshot coalesced)    |
///   |                           |-- [latency/loss] ------->| latest() -> snapshot'
/// ```
pub trait SnapshotPublisher<S>: Send + Sync + 'static {
    /// Hands an owned snapshot to the transport.
    ///
    /// Never blocks. `Ok(())` means the transport accepted the value, not that
    /// any follower received it: snapshots may be dropped, coalesced or
    /// delivered out of order. The one guarantee is that a follower never
    /// observes a partially written snapshot.
    ///
    /// # Returns
    /// * `Ok(())` - Snapshot accepted for best-effort delivery
    /// * `Err(EnvError::Closed)` - The transport has shut down
    fn publish(&self, snapshot: S) -> Result<(), EnvError>;
}

/// Follower-side end of the replication boundary.
pub trait SnapshotSubscriber<S>: Send + Sync + 'static {
    /// Returns the most recently received complete snapshot.
    ///
    /// Before anything has arrived this is the initial value the subscriber
    /// was constructed with.
    fn latest(&self) -> S;
}

/// Raw fixed-length byte representation used by real transports.
///
/// There is no framing, length prefix or schema negotiation: both ends must
/// be built with the same layout. The receiver's own initial value serves as
/// the layout template when decoding.
pub trait WireSnapshot: Clone + Send + Sync + 'static {
    /// Exact number of bytes `encode_into` appends.
    fn encoded_len(&self) -> usize;
    
    /// Appends the raw representation of `self` to `out`.
    fn encode_into(&self, out: &mut Vec<u8>);
    
    /// Decodes bytes produced by a peer whose layout matches `self`.
    fn decode_like(&self, bytes: &[u8]) -> Result<Self, EnvError>;
}

/// Fault-injection controls for simulated transports.
///
/// Link settings are per follower: the authority is the only sender.
pub trait LinkController: Send + Sync {
    /// Sets the probability (0.0 - 1.0) that a snapshot to `node` is dropped.
    fn set_link_loss(&self, node: NodeId, loss_rate: f64);
    
    /// Sets a fixed delivery delay, in ticks, for snapshots to `node`.
    fn set_link_latency(&self, node: NodeId, latency_ticks: u64);
    
    /// Sets the probability (0.0 - 1.0) that a snapshot to `node` arrives twice.
    fn set_link_duplication(&self, node: NodeId, duplication_rate: f64);
    
    /// Cuts `node` off from the authority until healed.
    fn partition(&self, node: NodeId);
    
    /// Heals all partitions.
    fn heal_all(&self);
}

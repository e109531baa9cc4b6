//! Simulated last-write-wins transport with fault injection.
//!
//! The authority end pushes snapshots into a router queue. Nothing reaches a
//! follower until the world calls [`SimNetwork::route`], which applies the
//! per-link faults and overwrites each follower's slot with whatever is due.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use texsync_env::{EnvError, LinkController, NodeId, SnapshotPublisher, SnapshotSubscriber};
use tokio::sync::{mpsc, watch};
use tracing::trace;

/// Authority end of the simulated transport.
pub struct SimPublisher<S> {
    /// This node's ID
    local_id: NodeId,
    
    /// Sender to the router queue
    tx: mpsc::UnboundedSender<S>,
}

impl<S> SnapshotPublisher<S> for SimPublisher<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn publish(&self, snapshot: S) -> Result<(), EnvError> {
        trace!(node = %self.local_id, "queued snapshot");
        self.tx.send(snapshot).map_err(|_| EnvError::Closed)
    }
}

/// Follower end of the simulated transport: a single overwritten slot.
pub struct SimSubscriber<S> {
    slot: watch::Receiver<S>,
}

impl<S> SnapshotSubscriber<S> for SimSubscriber<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn latest(&self) -> S {
        self.slot.borrow().clone()
    }
}

/// Fault settings for one authority -> follower link.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkFaults {
    /// Drop probability (0.0 - 1.0)
    pub loss: f64,
    
    /// Probability (0.0 - 1.0) that a snapshot is delivered a second time
    pub duplication: f64,
    
    /// Fixed delay in ticks
    pub latency_ticks: u64,
    
    /// Extra uniform delay in `0..=jitter_ticks`; reorders snapshots
    pub jitter_ticks: u64,
}

/// Network controller for fault injection.
#[derive(Default)]
pub struct SimNetworkController {
    /// Per-link fault settings
    links: Mutex<HashMap<NodeId, LinkFaults>>,
    
    /// Followers currently cut off from the authority
    partitioned: Mutex<HashSet<NodeId>>,
}

impl SimNetworkController {
    /// Creates a controller with every link clean.
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Replaces all fault settings for a link, including jitter.
    pub fn set_link_faults(&self, node: NodeId, faults: LinkFaults) {
        let faults = LinkFaults {
            loss: faults.loss.clamp(0.0, 1.0),
            duplication: faults.duplication.clamp(0.0, 1.0),
            ..faults
        };
        lock(&self.links).insert(node, faults);
    }
    
    /// Returns the fault settings for a link (clean by default).
    pub fn faults(&self, node: NodeId) -> LinkFaults {
        lock(&self.links).get(&node).copied().unwrap_or_default()
    }
    
    /// Checks whether a follower is cut off.
    pub fn is_partitioned(&self, node: NodeId) -> bool {
        lock(&self.partitioned).contains(&node)
    }
    
    /// Resets every link to clean and heals partitions.
    pub fn clear(&self) {
        lock(&self.links).clear();
        self.heal_all();
    }
    
    fn update(&self, node: NodeId, f: impl FnOnce(&mut LinkFaults)) {
        let mut links = lock(&self.links);
        f(links.entry(node).or_default());
    }
}

impl LinkController for SimNetworkController {
    fn set_link_loss(&self, node: NodeId, loss_rate: f64) {
        self.update(node, |faults| faults.loss = loss_rate.clamp(0.0, 1.0));
    }
    
    fn set_link_latency(&self, node: NodeId, latency_ticks: u64) {
        self.update(node, |faults| faults.latency_ticks = latency_ticks);
    }
    
    fn set_link_duplication(&self, node: NodeId, duplication_rate: f64) {
        self.update(node, |faults| faults.duplication = duplication_rate.clamp(0.0, 1.0));
    }
    
    fn partition(&self, node: NodeId) {
        lock(&self.partitioned).insert(node);
    }
    
    fn heal_all(&self) {
        lock(&self.partitioned).clear();
    }
}

// Fault tables hold plain data; a poisoned lock is still consistent.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    /// Snapshots taken off the router queue
    pub sent: u64,
    
    /// Per-link copies lost to loss or partition
    pub dropped: u64,
    
    /// Extra copies scheduled by duplication
    pub duplicated: u64,
    
    /// Copies written into a follower slot
    pub delivered: u64,
}

struct Link<S> {
    node: NodeId,
    slot: watch::Sender<S>,
}

struct InFlight<S> {
    due: u64,
    seq: u64,
    link: usize,
    snapshot: S,
}

/// In-memory router between one authority and its followers.
pub struct SimNetwork<S> {
    /// Sender cloned into every publisher
    tx: mpsc::UnboundedSender<S>,
    
    /// Router queue
    rx: mpsc::UnboundedReceiver<S>,
    
    /// Registered follower slots
    links: Vec<Link<S>>,
    
    /// Copies waiting out their latency
    in_flight: Vec<InFlight<S>>,
    
    /// Fault injection
    controller: Arc<SimNetworkController>,
    
    /// Seeded fault RNG
    rng: ChaCha8Rng,
    
    stats: NetworkStats,
    next_seq: u64,
}

impl<S> SimNetwork<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Creates a router drawing its faults from `rng`.
    pub fn new(rng: ChaCha8Rng) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            links: Vec::new(),
            in_flight: Vec::new(),
            controller: Arc::new(SimNetworkController::new()),
            rng,
            stats: NetworkStats::default(),
            next_seq: 0,
        }
    }
    
    /// Creates the authority end.
    pub fn publisher(&self, local_id: NodeId) -> SimPublisher<S> {
        SimPublisher {
            local_id,
            tx: self.tx.clone(),
        }
    }
    
    /// Registers a follower link whose slot starts at `initial`.
    pub fn subscribe(&mut self, node: NodeId, initial: S) -> SimSubscriber<S> {
        let (slot, rx) = watch::channel(initial);
        self.links.push(Link { node, slot });
        SimSubscriber { slot: rx }
    }
    
    /// Returns the fault controller.
    pub fn controller(&self) -> &Arc<SimNetworkController> {
        &self.controller
    }
    
    /// Returns the transport counters.
    pub fn stats(&self) -> NetworkStats {
        self.stats
    }
    
    /// Number of copies still waiting on latency.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
    
    /// Moves queued snapshots onto the links, then delivers everything due
    /// at `tick`. Returns the number of copies delivered.
    pub fn route(&mut self, tick: u64) -> usize {
        while let Ok(snapshot) = self.rx.try_recv() {
            self.stats.sent += 1;
            
            for (index, link) in self.links.iter().enumerate() {
                if self.controller.is_partitioned(link.node) {
                    self.stats.dropped += 1;
                    continue;
                }
                
                let faults = self.controller.faults(link.node);
                if faults.loss > 0.0 && self.rng.gen_bool(faults.loss) {
                    self.stats.dropped += 1;
                    continue;
                }
                
                let jitter = if faults.jitter_ticks > 0 {
                    self.rng.gen_range(0..=faults.jitter_ticks)
                } else {
                    0
                };
                let due = tick + faults.latency_ticks + jitter;
                
                self.in_flight.push(InFlight {
                    due,
                    seq: self.next_seq,
                    link: index,
                    snapshot: snapshot.clone(),
                });
                self.next_seq += 1;
                
                if faults.duplication > 0.0 && self.rng.gen_bool(faults.duplication) {
                    self.stats.duplicated += 1;
                    self.in_flight.push(InFlight {
                        due: due + 1,
                        seq: self.next_seq,
                        link: index,
                        snapshot: snapshot.clone(),
                    });
                    self.next_seq += 1;
                }
            }
        }
        
        let (mut ready, waiting): (Vec<_>, Vec<_>) =
            self.in_flight.drain(..).partition(|copy| copy.due <= tick);
        self.in_flight = waiting;
        ready.sort_by_key(|copy| (copy.due, copy.seq));
        
        let mut delivered = 0;
        for copy in ready {
            let link = &self.links[copy.link];
            if self.controller.is_partitioned(link.node) {
                self.stats.dropped += 1;
                continue;
            }
            link.slot.send_replace(copy.snapshot);
            delivered += 1;
        }
        
        self.stats.delivered += delivered as u64;
        trace!(tick, delivered, pending = self.in_flight.len(), "routed snapshots");
        delivered
    }
}

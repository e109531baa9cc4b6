//! Role-scoped node behaviours.
//!
//! The role is resolved once at startup by choosing which behaviour to build;
//! nothing downstream branches on "am I the authority".
//!
//! ```text
//! AuthorityNode                       FollowerNode
//!   driver.tick(dt)                     subscriber.latest()
//!   publisher.publish(snapshot)              │
//!   applier.apply(own state) ──┐   ┌── applier.apply(snapshot)
//!                              ▼   ▼
//!                          RenderTarget::upload
//! ```

use crate::apply::{ApplyOutcome, StateApplier};
use crate::authority::AuthorityDriver;
use crate::render::RenderTarget;
use crate::state::SharedState;
use std::sync::Arc;
use texsync_env::{NodeId, Role, SnapshotPublisher, SnapshotSubscriber};
use tracing::{debug, info, warn};

/// Control commands accepted by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Regenerate the payload now, outside the tick cadence
    Regenerate,
    
    /// Zero time, angle and version
    Reset,
}

impl std::str::FromStr for Command {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // A bare space is the interactive "regenerate" key
        if s == " " {
            return Ok(Command::Regenerate);
        }
        match s.trim().to_lowercase().as_str() {
            "regen" | "regenerate" | "space" => Ok(Command::Regenerate),
            "reset" | "2" => Ok(Command::Reset),
            _ => Err(format!("Unknown command: {}", s.trim())),
        }
    }
}

/// What one tick did on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    /// Version of the state the node holds after the tick
    pub version: u64,
    
    /// Whether the authority regenerated the payload (always false on followers)
    pub regenerated: bool,
    
    /// What happened to the local render resource
    pub outcome: ApplyOutcome,
}

/// Common tick/apply interface implemented once per role.
pub trait NodeBehavior: Send {
    /// The role this behaviour implements.
    fn role(&self) -> Role;
    
    /// Node identifier (for logging).
    fn node_id(&self) -> NodeId;
    
    /// Runs one simulation + render step.
    fn tick(&mut self, dt: f32) -> TickSummary;
    
    /// Handles a control command. Returns false if the role ignores it.
    fn handle(&mut self, command: Command) -> bool;
    
    /// The node's local copy of the state.
    fn state(&self) -> &SharedState;
    
    /// The node's change-detection state.
    fn applier(&self) -> &StateApplier;
    
    /// Number of generator runs performed by this node.
    fn regenerations(&self) -> u64 {
        0
    }
}

/// The authority: mutates, publishes and renders its own state.
pub struct AuthorityNode<P, T>
where
    P: SnapshotPublisher<SharedState>,
    T: RenderTarget,
{
    node_id: NodeId,
    driver: AuthorityDriver,
    publisher: Arc<P>,
    target: T,
    applier: StateApplier,
    publish_failures: u64,
}

impl<P, T> AuthorityNode<P, T>
where
    P: SnapshotPublisher<SharedState>,
    T: RenderTarget,
{
    /// Creates the authority behaviour.
    pub fn new(node_id: NodeId, driver: AuthorityDriver, publisher: Arc<P>, target: T) -> Self {
        Self {
            node_id,
            driver,
            publisher,
            target,
            applier: StateApplier::new(),
            publish_failures: 0,
        }
    }
    
    /// Returns the driver.
    pub fn driver(&self) -> &AuthorityDriver {
        &self.driver
    }
    
    /// Returns the local render resource.
    pub fn target(&self) -> &T {
        &self.target
    }
    
    /// Number of snapshots the transport refused.
    pub fn publish_failures(&self) -> u64 {
        self.publish_failures
    }
}

impl<P, T> NodeBehavior for AuthorityNode<P, T>
where
    P: SnapshotPublisher<SharedState>,
    T: RenderTarget,
{
    fn role(&self) -> Role {
        Role::Authority
    }
    
    fn node_id(&self) -> NodeId {
        self.node_id
    }
    
    fn tick(&mut self, dt: f32) -> TickSummary {
        let report = self.driver.tick(dt);
        
        // Published every tick: time and angle always change
        if let Err(e) = self.publisher.publish(self.driver.snapshot()) {
            self.publish_failures += 1;
            warn!(node = %self.node_id, version = report.version, "publish failed: {}", e);
        }
        
        let outcome = self.applier.apply(self.driver.state(), &mut self.target);
        
        TickSummary {
            version: report.version,
            regenerated: report.regenerated,
            outcome,
        }
    }
    
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Regenerate => self.driver.regenerate(),
            Command::Reset => {
                self.driver.reset();
                info!(node = %self.node_id, "animation reset");
            }
        }
        true
    }
    
    fn state(&self) -> &SharedState {
        self.driver.state()
    }
    
    fn applier(&self) -> &StateApplier {
        &self.applier
    }
    
    fn regenerations(&self) -> u64 {
        self.driver.regenerations()
    }
}

/// A follower: mirrors the latest received snapshot into its render resource.
pub struct FollowerNode<S, T>
where
    S: SnapshotSubscriber<SharedState>,
    T: RenderTarget,
{
    node_id: NodeId,
    subscriber: Arc<S>,
    target: T,
    applier: StateApplier,
    mirror: SharedState,
}

impl<S, T> FollowerNode<S, T>
where
    S: SnapshotSubscriber<SharedState>,
    T: RenderTarget,
{
    /// Creates the follower behaviour.
    pub fn new(node_id: NodeId, subscriber: Arc<S>, target: T) -> Self {
        let mirror = SharedState::initial(target.dimensions());
        Self {
            node_id,
            subscriber,
            target,
            applier: StateApplier::new(),
            mirror,
        }
    }
    
    /// Returns the local render resource.
    pub fn target(&self) -> &T {
        &self.target
    }
}

impl<S, T> NodeBehavior for FollowerNode<S, T>
where
    S: SnapshotSubscriber<SharedState>,
    T: RenderTarget,
{
    fn role(&self) -> Role {
        Role::Follower
    }
    
    fn node_id(&self) -> NodeId {
        self.node_id
    }
    
    fn tick(&mut self, _dt: f32) -> TickSummary {
        let snapshot = self.subscriber.latest();
        let outcome = self.applier.apply(&snapshot, &mut self.target);
        
        if outcome == ApplyOutcome::Applied && snapshot.update_flag {
            info!(
                node = %self.node_id,
                version = snapshot.version,
                time = snapshot.time,
                angle = snapshot.angle,
                "received regenerated texture"
            );
        }
        
        if outcome != ApplyOutcome::Rejected {
            self.mirror = snapshot;
        }
        TickSummary {
            version: self.mirror.version,
            regenerated: false,
            outcome,
        }
    }
    
    fn handle(&mut self, command: Command) -> bool {
        debug!(node = %self.node_id, ?command, "followers ignore control commands");
        false
    }
    
    fn state(&self) -> &SharedState {
        &self.mirror
    }
    
    fn applier(&self) -> &StateApplier {
        &self.applier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::DriverConfig;
    use crate::render::CpuTexture;
    use crate::state::Dimensions;
    use std::sync::Mutex;
    use texsync_env::EnvError;
    
    /// In-memory last-write-wins slot acting as both transport ends.
    struct Loopback {
        slot: Mutex<SharedState>,
        published: Mutex<u64>,
    }
    
    impl Loopback {
        fn new(dims: Dimensions) -> Arc<Self> {
            Arc::new(Self {
                slot: Mutex::new(SharedState::initial(dims)),
                published: Mutex::new(0),
            })
        }
        
        fn put(&self, state: SharedState) {
            *self.slot.lock().unwrap() = state;
        }
    }
    
    impl SnapshotPublisher<SharedState> for Loopback {
        fn publish(&self, snapshot: SharedState) -> Result<(), EnvError> {
            *self.published.lock().unwrap() += 1;
            self.put(snapshot);
            Ok(())
        }
    }
    
    impl SnapshotSubscriber<SharedState> for Loopback {
        fn latest(&self) -> SharedState {
            self.slot.lock().unwrap().clone()
        }
    }
    
    struct Refusing;
    
    impl SnapshotPublisher<SharedState> for Refusing {
        fn publish(&self, _snapshot: SharedState) -> Result<(), EnvError> {
            Err(EnvError::Closed)
        }
    }
    
    fn dims() -> Dimensions {
        Dimensions::square(6).unwrap()
    }
    
    fn authority(link: Arc<Loopback>) -> AuthorityNode<Loopback, CpuTexture> {
        AuthorityNode::new(
            NodeId::from_seed(0),
            AuthorityDriver::new(dims(), DriverConfig::default()),
            link,
            CpuTexture::new(dims()),
        )
    }
    
    #[test]
    fn test_command_parsing() {
        assert_eq!(" ".parse::<Command>(), Ok(Command::Regenerate));
        assert_eq!("regen".parse::<Command>(), Ok(Command::Regenerate));
        assert_eq!("2".parse::<Command>(), Ok(Command::Reset));
        assert_eq!(" Reset \n".parse::<Command>(), Ok(Command::Reset));
        assert!("1".parse::<Command>().is_err());
    }
    
    #[test]
    fn test_authority_publishes_every_tick() {
        let link = Loopback::new(dims());
        let mut node = authority(link.clone());
        
        for _ in 0..10 {
            node.tick(1.0 / 60.0);
        }
        
        assert_eq!(*link.published.lock().unwrap(), 10);
        assert_eq!(link.latest().version, 10);
        assert_eq!(link.latest(), *node.state());
    }
    
    #[test]
    fn test_authority_renders_own_state() {
        let link = Loopback::new(dims());
        let mut node = authority(link);
        
        for _ in 0..30 {
            let summary = node.tick(1.0 / 60.0);
            assert_eq!(summary.outcome, ApplyOutcome::Applied);
        }
        
        assert_eq!(node.target().uploads(), 30);
        assert_eq!(node.target().pixels(), &node.state().payload);
        assert_eq!(node.applier().last_applied(), Some(30));
    }
    
    #[test]
    fn test_authority_survives_publish_failure() {
        let mut node = AuthorityNode::new(
            NodeId::from_seed(0),
            AuthorityDriver::new(dims(), DriverConfig::default()),
            Arc::new(Refusing),
            CpuTexture::new(dims()),
        );
        
        let summary = node.tick(0.1);
        
        assert_eq!(summary.version, 1);
        assert_eq!(summary.outcome, ApplyOutcome::Applied);
        assert_eq!(node.publish_failures(), 1);
    }
    
    #[test]
    fn test_authority_handles_commands() {
        let link = Loopback::new(dims());
        let mut node = authority(link);
        for _ in 0..12 {
            node.tick(0.1);
        }
        
        assert!(node.handle(Command::Regenerate));
        assert_eq!(node.regenerations(), 2);
        
        assert!(node.handle(Command::Reset));
        assert_eq!(node.state().version, 0);
        assert_eq!(node.state().time, 0.0);
    }
    
    #[test]
    fn test_forced_regenerate_published_with_flag() {
        let link = Loopback::new(dims());
        let mut node = authority(link.clone());
        node.tick(0.1);
        node.tick(0.1);
        let before = link.latest().payload;
        
        assert!(node.handle(Command::Regenerate));
        node.tick(0.1);
        
        let published = link.latest();
        assert_eq!(published.version, 3);
        assert!(published.update_flag);
        assert_ne!(published.payload, before);
        
        node.tick(0.1);
        assert!(!link.latest().update_flag);
    }
    
    #[test]
    fn test_follower_applies_only_new_versions() {
        let link = Loopback::new(dims());
        let mut follower = FollowerNode::new(NodeId::from_seed(1), link.clone(), CpuTexture::new(dims()));
        let mut source = AuthorityDriver::new(dims(), DriverConfig::default());
        
        // Nothing received yet: the default snapshot (version 0) is applied once
        assert_eq!(follower.tick(0.0).outcome, ApplyOutcome::Applied);
        assert_eq!(follower.tick(0.0).outcome, ApplyOutcome::Unchanged);
        
        source.tick(0.1);
        link.put(source.snapshot());
        assert_eq!(follower.tick(0.0).outcome, ApplyOutcome::Applied);
        assert_eq!(follower.tick(0.0).outcome, ApplyOutcome::Unchanged);
        
        assert_eq!(follower.target().uploads(), 2);
        assert_eq!(follower.state(), &source.snapshot());
    }
    
    #[test]
    fn test_follower_keeps_mirror_on_rejected_snapshot() {
        let link = Loopback::new(dims());
        let mut follower =
            FollowerNode::new(NodeId::from_seed(1), link.clone(), CpuTexture::new(dims()));
        follower.tick(0.1);
        let shown = follower.state().clone();
        
        let mut wrong = SharedState::initial(Dimensions::square(4).unwrap());
        wrong.version = 5;
        link.put(wrong);
        let summary = follower.tick(0.1);
        
        assert_eq!(summary.outcome, ApplyOutcome::Rejected);
        assert_eq!(summary.version, shown.version);
        assert_eq!(follower.state(), &shown);
        assert_eq!(follower.state().dimensions(), dims());
    }
    
    #[test]
    fn test_follower_ignores_commands() {
        let link = Loopback::new(dims());
        let mut follower = FollowerNode::new(NodeId::from_seed(1), link, CpuTexture::new(dims()));
        
        assert!(!follower.handle(Command::Reset));
        assert!(!follower.handle(Command::Regenerate));
        assert_eq!(follower.regenerations(), 0);
    }
    
    #[test]
    fn test_authority_and_follower_converge() {
        let link = Loopback::new(dims());
        let mut leader = authority(link.clone());
        let mut follower = FollowerNode::new(NodeId::from_seed(1), link, CpuTexture::new(dims()));
        
        for _ in 0..95 {
            leader.tick(1.0 / 60.0);
            follower.tick(1.0 / 60.0);
        }
        
        assert_eq!(follower.state().version, 95);
        assert_eq!(follower.target().pixels(), leader.target().pixels());
        assert_eq!(leader.regenerations(), 4);
    }
}

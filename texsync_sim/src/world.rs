//! SimWorld - The simulation harness container.

use crate::context::SimContext;
use crate::network::{SimNetwork, SimNetworkController, SimPublisher, SimSubscriber};

use std::sync::Arc;
use std::time::Duration;
use texsync_core::{
    AuthorityDriver, AuthorityNode, Command, CpuTexture, Dimensions, DriverConfig, FollowerNode,
    NodeBehavior, SharedState, TickSummary,
};
use texsync_env::NodeId;

/// Authority node as wired inside the simulator.
pub type SimAuthority = AuthorityNode<SimPublisher<SharedState>, CpuTexture>;

/// Follower node as wired inside the simulator.
pub type SimFollower = FollowerNode<SimSubscriber<SharedState>, CpuTexture>;

/// Texture size used by the simulator unless configured otherwise.
pub const SIM_DIMENSIONS: Dimensions = match Dimensions::square(64) {
    Ok(dims) => dims,
    Err(_) => panic!("simulator texture side must be non-zero"),
};

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,
    
    /// Number of followers to spawn
    pub num_followers: usize,
    
    /// Tick rate in Hz
    pub tick_rate_hz: u32,
    
    /// Texture dimensions shared by every node
    pub dims: Dimensions,
    
    /// Authority driver settings
    pub driver: DriverConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_followers: 3,
            tick_rate_hz: 60,
            dims: SIM_DIMENSIONS,
            driver: DriverConfig::default(),
        }
    }
}

/// What one world tick did.
#[derive(Debug, Clone)]
pub struct WorldTick {
    /// Tick index (0-based)
    pub tick: u64,
    
    /// Authority summary
    pub authority: TickSummary,
    
    /// One summary per follower, in spawn order
    pub followers: Vec<TickSummary>,
    
    /// Copies the network delivered this tick
    pub delivered: usize,
}

/// The SimWorld - one authority and its followers on a simulated network.
///
/// Each tick runs the authority, routes the network, then runs every
/// follower, all on the caller's thread.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,
    
    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,
    
    network: SimNetwork<SharedState>,
    authority: SimAuthority,
    followers: Vec<SimFollower>,
    
    /// Current tick count
    tick_count: u64,
}

impl SimWorld {
    /// Creates a new SimWorld with the given configuration.
    pub fn new(config: SimConfig) -> Self {
        let context = SimContext::shared(config.seed);
        let network_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let mut network = SimNetwork::new(context.derive_rng(network_seed));
        
        let authority_id = NodeId::from_seed(config.seed);
        let driver = AuthorityDriver::new(config.dims, config.driver);
        let publisher = Arc::new(network.publisher(authority_id));
        let authority = AuthorityNode::new(
            authority_id,
            driver,
            publisher,
            CpuTexture::new(config.dims),
        );
        
        let followers = (0..config.num_followers)
            .map(|i| {
                let id = NodeId::from_seed(config.seed.wrapping_add(1 + i as u64));
                let subscriber = network.subscribe(id, SharedState::initial(config.dims));
                FollowerNode::new(id, Arc::new(subscriber), CpuTexture::new(config.dims))
            })
            .collect();
        
        Self {
            config,
            context,
            network,
            authority,
            followers,
            tick_count: 0,
        }
    }
    
    /// Fixed timestep for this world.
    pub fn dt(&self) -> f32 {
        1.0 / self.config.tick_rate_hz.max(1) as f32
    }
    
    /// Advances the world by one tick.
    pub fn tick(&mut self) -> WorldTick {
        let tick = self.tick_count;
        let dt = self.dt();
        
        let authority = self.authority.tick(dt);
        let delivered = self.network.route(tick);
        let followers = self
            .followers
            .iter_mut()
            .map(|follower| follower.tick(dt))
            .collect();
        
        self.context
            .advance_time(Duration::from_secs_f64(1.0 / self.config.tick_rate_hz.max(1) as f64));
        self.tick_count += 1;
        
        WorldTick {
            tick,
            authority,
            followers,
            delivered,
        }
    }
    
    /// Sends a control command to the authority before the next tick.
    pub fn command(&mut self, command: Command) -> bool {
        self.authority.handle(command)
    }
    
    /// Returns the authority node.
    pub fn authority(&self) -> &SimAuthority {
        &self.authority
    }
    
    /// Returns the follower nodes.
    pub fn followers(&self) -> &[SimFollower] {
        &self.followers
    }
    
    /// Returns the follower IDs in spawn order.
    pub fn follower_ids(&self) -> Vec<NodeId> {
        self.followers.iter().map(|f| f.node_id()).collect()
    }
    
    /// Returns the fault controller.
    pub fn controller(&self) -> Arc<SimNetworkController> {
        Arc::clone(self.network.controller())
    }
    
    /// Returns the network.
    pub fn network(&self) -> &SimNetwork<SharedState> {
        &self.network
    }
    
    /// Returns the current tick count.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
    
    /// Returns true when every follower shows the authority's current pixels
    /// at the authority's current version.
    pub fn converged(&self) -> bool {
        let state = self.authority.state();
        self.followers.iter().all(|f| {
            f.state().version == state.version
                && f.target().pixels().as_bytes() == state.payload.as_bytes()
        })
    }
}

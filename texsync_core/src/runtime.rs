//! Node Runtime - drives a role behaviour at a fixed tick cadence.
//!
//! One tick at a time, never concurrently: drain pending control commands,
//! run a simulation + render step, then sleep until the next deadline on the
//! node's clock. With a `SimContext` the same loop runs on virtual time.
//!
//! # Usage
//!
//! ```ignore
//! use texsync_core::runtime::{NodeRuntime, RuntimeConfig};
//! use texsync_env::TokioContext;
//!
//! let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
//! let mut runtime = NodeRuntime::new(TokioContext::shared(), behavior, RuntimeConfig::default());
//! runtime.run(rx).await;
//! ```

use crate::node::{Command, NodeBehavior, TickSummary};
use std::sync::Arc;
use std::time::Duration;
use texsync_env::NodeContext;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info};

/// Configuration for the tick loop.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Node's logical name (for logging)
    pub name: String,
    
    /// Tick rate in Hz (default: 60)
    pub tick_rate_hz: u32,
    
    /// Stop after this many ticks (None = run until the process exits)
    pub max_ticks: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name: "texsync-node".to_string(),
            tick_rate_hz: 60,
            max_ticks: None,
        }
    }
}

impl RuntimeConfig {
    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz;
        self
    }
    
    /// Sets a tick limit.
    pub fn with_max_ticks(mut self, ticks: u64) -> Self {
        self.max_ticks = Some(ticks);
        self
    }
}

/// Counters reported when a bounded run finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Ticks executed
    pub ticks: u64,
    
    /// Payload uploads into the local render resource
    pub applied: u64,
    
    /// Snapshots refused for a dimension mismatch
    pub rejected: u64,
    
    /// Generator runs (authority only)
    pub regenerations: u64,
    
    /// Control commands that took effect
    pub commands: u64,
}

/// Fixed-cadence driver for one node.
pub struct NodeRuntime<Ctx, B>
where
    Ctx: NodeContext,
    B: NodeBehavior,
{
    context: Arc<Ctx>,
    behavior: B,
    config: RuntimeConfig,
    tick_count: u64,
    commands_handled: u64,
}

impl<Ctx, B> NodeRuntime<Ctx, B>
where
    Ctx: NodeContext,
    B: NodeBehavior,
{
    /// Creates a runtime around an already-resolved role behaviour.
    pub fn new(context: Arc<Ctx>, behavior: B, config: RuntimeConfig) -> Self {
        Self {
            context,
            behavior,
            config,
            tick_count: 0,
            commands_handled: 0,
        }
    }
    
    /// Simulated seconds per tick.
    pub fn dt(&self) -> f32 {
        1.0 / self.config.tick_rate_hz.max(1) as f32
    }
    
    /// Wall (or virtual) time between tick starts.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.config.tick_rate_hz.max(1) as f64)
    }
    
    /// Returns the current tick count.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
    
    /// Returns the role behaviour.
    pub fn behavior(&self) -> &B {
        &self.behavior
    }
    
    /// Drains pending commands without blocking, then ticks once.
    pub fn step(&mut self, commands: &mut mpsc::UnboundedReceiver<Command>) -> TickSummary {
        loop {
            match commands.try_recv() {
                Ok(command) => {
                    if self.behavior.handle(command) {
                        self.commands_handled += 1;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        
        self.tick_count += 1;
        let summary = self.behavior.tick(self.dt());
        
        if self.tick_count % 60 == 0 {
            debug!(
                node = %self.config.name,
                tick = self.tick_count,
                version = summary.version,
                "tick"
            );
        }
        summary
    }
    
    /// Runs the loop until `max_ticks` is reached (forever if unset).
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<Command>) -> RuntimeStats {
        let hz = self.config.tick_rate_hz.max(1) as f64;
        let started = self.context.now();
        
        info!(
            node = %self.config.name,
            id = %self.behavior.node_id(),
            role = %self.behavior.role(),
            tick_rate_hz = self.config.tick_rate_hz,
            "tick loop started"
        );
        
        let mut scheduled: u64 = 0;
        loop {
            if let Some(max) = self.config.max_ticks {
                if self.tick_count >= max {
                    break;
                }
            }
            
            self.step(&mut commands);
            scheduled += 1;
            
            // Sleep to the next deadline so slow ticks do not accumulate drift
            let deadline = started + Duration::from_secs_f64(scheduled as f64 / hz);
            let now = self.context.now();
            self.context.sleep(deadline.saturating_sub(now)).await;
        }
        
        let stats = self.stats();
        info!(node = %self.config.name, ticks = stats.ticks, applied = stats.applied, "tick loop finished");
        stats
    }
    
    /// Current counters.
    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            ticks: self.tick_count,
            applied: self.behavior.applier().applied_count(),
            rejected: self.behavior.applier().rejected_count(),
            regenerations: self.behavior.regenerations(),
            commands: self.commands_handled,
        }
    }
}

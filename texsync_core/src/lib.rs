//! texsync Core - leader/follower replication of a procedural texture
//!
//! One authority process owns a monolithic [`SharedState`] (time, angle, an
//! RGB8 pixel buffer and a version counter), advances it every tick and
//! publishes an owned snapshot. Followers take the latest snapshot the
//! transport delivered, compare versions, and upload the whole payload into
//! their render resource when it changed.
//!
//! Layers, leaves first:
//! 1. [`generator`] - pure `(time, angle, version) -> pixels`
//! 2. [`state`] / [`wire`] - the snapshot value and its raw byte layout
//! 3. [`authority`] - the only mutation path
//! 4. [`apply`] / [`render`] - change detection and upload
//! 5. [`node`] / [`runtime`] - role behaviours and the tick loop

pub mod state;
pub mod wire;
pub mod generator;
pub mod authority;
pub mod apply;
pub mod render;
pub mod node;
pub mod runtime;

// Re-export key types for convenience
pub use state::{Dimensions, Payload, SharedState, StateError};
pub use generator::generate;
pub use authority::{AngleWrap, AuthorityDriver, DriverConfig, TickReport};
pub use apply::{ApplyOutcome, StateApplier};
pub use render::{CpuTexture, RenderTarget};
pub use node::{AuthorityNode, Command, FollowerNode, NodeBehavior, TickSummary};
pub use runtime::{NodeRuntime, RuntimeConfig, RuntimeStats};

//! texsync Deterministic Simulation Harness
//!
//! Runs one authority and any number of followers in a single thread over a
//! simulated last-write-wins network, so replication can be checked under
//! loss, duplication, reordering and partitions with reproducible results.
//!
//! # Core Principle: Nothing Runs Unless Ticked
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: Virtual clock advances one fixed step per world tick
//! - **Network**: Router queue with per-link loss, duplication, latency, jitter and partitions
//! - **Randomness**: All fault decisions derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           SimWorld                           │
//! │  ┌───────────────┐   publish   ┌──────────────────────────┐  │
//! │  │ AuthorityNode │────────────►│ SimNetwork (router queue) │  │
//! │  └───────────────┘             └────────────┬─────────────┘  │
//! │                                 route(tick) │ faults applied │
//! │                    ┌────────────────┬───────┴───────┐        │
//! │               ┌────▼─────┐    ┌─────▼────┐    ┌─────▼────┐   │
//! │               │ Follower │    │ Follower │    │ Follower │   │
//! │               │   slot   │    │   slot   │    │   slot   │   │
//! │               └──────────┘    └──────────┘    └──────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use texsync_sim::{ScenarioRunner, scenarios::ScenarioId};
//! use texsync_core::Dimensions;
//!
//! let runner = ScenarioRunner::new(42, 2)
//!     .with_duration(1.0)
//!     .with_dimensions(Dimensions::new(8, 8).unwrap());
//! let result = runner.run(ScenarioId::Lossy);
//! assert!(result.passed);
//! ```

mod context;
mod world;
mod network;
mod runner;
mod exporter;
pub mod scenarios;

pub use context::SimContext;
pub use world::{SimAuthority, SimConfig, SimFollower, SimWorld, WorldTick};
pub use network::{LinkFaults, NetworkStats, SimNetwork, SimNetworkController, SimPublisher, SimSubscriber};
pub use runner::{RecordedRun, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use exporter::{AuthorityFrame, FollowerFrame, SimEvent, SimExport, SimFrame};

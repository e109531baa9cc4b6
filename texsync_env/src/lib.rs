//! texsync Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seams that let the texsync replication
//! core run unchanged in **Production** (tokio + TCP) and **Simulation**
//! (virtual clock + in-memory transport).
//!
//! # Core Concept
//!
//! The core never touches a clock or a socket directly. It sees:
//! - Time (`now()`, `sleep()`) through [`NodeContext`]
//! - Replication (`publish()`, `latest()`) through [`SnapshotPublisher`]
//!   and [`SnapshotSubscriber`]
//!
//! The transport contract is deliberately weak: best-effort, last-write-wins,
//! never torn. Anything stronger is an implementation detail of a transport.
//!
//! # Example
//!
//! ```ignore
//! use texsync_env::{NodeContext, SnapshotSubscriber};
//!
//! async fn follow<Ctx: NodeContext, Sub: SnapshotSubscriber<State>>(ctx: &Ctx, sub: &Sub) {
//!     loop {
//!         let snapshot = sub.latest();
//!         apply(snapshot);
//!         ctx.sleep(Duration::from_millis(16)).await;
//!     }
//! }
//! ```

mod context;
mod network;
mod types;
mod error;
mod tokio_impl;
mod tcp_impl;

pub use context::NodeContext;
pub use network::{LinkController, SnapshotPublisher, SnapshotSubscriber, WireSnapshot};
pub use types::{NodeId, Role};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use tcp_impl::{TcpPublisher, TcpSubscriber};

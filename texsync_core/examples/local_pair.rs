//! Local Pair Demo - authority and follower in one process
//! ======================================================
//!
//! Binds an authority on an ephemeral localhost port, connects one follower,
//! runs both tick loops for three simulated seconds and writes the
//! follower's texture to an image file (PPM or PNG by extension).
//!
//! Run:
//! ```bash
//! cargo run --example local_pair -- [out.ppm]
//! ```

use std::sync::Arc;
use std::time::Duration;
use texsync_core::{
    AuthorityDriver, AuthorityNode, CpuTexture, Dimensions, DriverConfig, FollowerNode,
    NodeBehavior, NodeRuntime, RuntimeConfig, SharedState,
};
use texsync_env::{NodeId, TcpPublisher, TcpSubscriber, TokioContext};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🎨 texsync Local Pair Demo");
    println!("==========================\n");

    let out = std::env::args().nth(1).unwrap_or_else(|| "follower.ppm".to_string());
    let dims = Dimensions::square(128)?;
    let ticks = 180;

    // ========================================================================
    // AUTHORITY
    // ========================================================================

    let driver = AuthorityDriver::new(dims, DriverConfig::default());
    let publisher = TcpPublisher::bind("127.0.0.1:0", driver.snapshot()).await?;
    let addr = publisher.local_addr().to_string();
    println!("📡 Authority listening on {}", addr);

    let authority = AuthorityNode::new(
        NodeId::new(),
        driver,
        Arc::new(publisher),
        CpuTexture::new(dims),
    );

    // ========================================================================
    // FOLLOWER
    // ========================================================================

    let subscriber = TcpSubscriber::connect(&addr, SharedState::initial(dims)).await?;
    let follower = FollowerNode::new(NodeId::new(), Arc::new(subscriber), CpuTexture::new(dims));
    println!("🔗 Follower connected\n");

    let context = TokioContext::shared();
    let config = RuntimeConfig::default().with_max_ticks(ticks);

    let mut authority_rt = NodeRuntime::new(context.clone(), authority, config.clone());
    let mut follower_rt = NodeRuntime::new(context, follower, config);

    // Neither side gets commands; dropping the senders closes the channels.
    let (_, authority_rx) = mpsc::unbounded_channel();
    let (_, follower_rx) = mpsc::unbounded_channel();

    let (a, f) = tokio::join!(authority_rt.run(authority_rx), follower_rt.run(follower_rx));

    // One more look at the slot after the authority stopped publishing
    tokio::time::sleep(Duration::from_millis(50)).await;
    let tail = follower_rt.step(&mut mpsc::unbounded_channel().1);

    println!("Authority: {} ticks, {} regenerations", a.ticks, a.regenerations);
    println!("Follower:  {} ticks, {} uploads", f.ticks, f.applied);
    println!(
        "Versions:  authority {} / follower {}",
        authority_rt.behavior().state().version,
        tail.version
    );

    follower_rt.behavior().target().write_image(&out)?;
    println!("\n🖼  Wrote {} texture to {}", dims, out);

    Ok(())
}

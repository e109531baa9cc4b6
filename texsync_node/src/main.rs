//! texsync-node - one participant in the replicated texture animation.
//!
//! The role is fixed at startup. An authority binds the TCP endpoint and
//! publishes one snapshot per tick; a follower connects to it and mirrors
//! whatever arrives into its local texture.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use texsync_core::{
    AngleWrap, AuthorityDriver, AuthorityNode, Command, CpuTexture, Dimensions, DriverConfig, FollowerNode,
    NodeBehavior, NodeRuntime, RuntimeConfig, RuntimeStats, SharedState,
};
use texsync_env::{EnvError, NodeId, Role, TcpPublisher, TcpSubscriber, TokioContext};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod control;

/// texsync replicated texture node
#[derive(Parser, Debug)]
#[command(name = "texsync-node")]
#[command(about = "Run a texsync authority or follower", long_about = None)]
struct Args {
    /// Role in the pair (authority or follower)
    #[arg(short, long)]
    role: Role,
    
    /// Endpoint the authority binds and followers connect to
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    addr: String,
    
    /// Tick rate in Hz
    #[arg(long, default_value = "60")]
    fps: u32,
    
    /// Logical node name for logs
    #[arg(short, long)]
    name: Option<String>,
    
    /// Angle wraparound policy (single or modulo)
    #[arg(long, default_value = "single")]
    wrap: AngleWrap,
    
    /// Regenerate the texture every N ticks (0 = only on demand)
    #[arg(long, default_value = "30")]
    regen_every: u64,
    
    /// Stop after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,
    
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    
    // RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    
    match run(args).await {
        Ok(stats) => {
            info!(
                ticks = stats.ticks,
                applied = stats.applied,
                regenerations = stats.regenerations,
                commands = stats.commands,
                "node stopped"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_status(&e))
        }
    }
}

/// Status 2 when the replication transport could not be set up, 1 otherwise.
fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<EnvError>() {
        Some(env) if env.is_fatal() => 2,
        _ => 1,
    }
}

async fn run(args: Args) -> Result<RuntimeStats> {
    let dims = Dimensions::BUILD;
    let role = args.role;
    let node_id = NodeId::new();
    
    let mut config = RuntimeConfig {
        name: args.name.clone().unwrap_or_else(|| format!("{}-{}", role, node_id)),
        ..Default::default()
    }
    .with_tick_rate(args.fps);
    if let Some(ticks) = args.max_ticks {
        config = config.with_max_ticks(ticks);
    }
    
    info!(node = %config.name, %role, addr = %args.addr, %dims, "starting texsync node");
    
    let context = TokioContext::shared();
    let (tx, rx) = mpsc::unbounded_channel();
    
    match role {
        Role::Authority => {
            let driver_config = DriverConfig::default()
                .with_regenerate_every(args.regen_every)
                .with_angle_wrap(args.wrap);
            let driver = AuthorityDriver::new(dims, driver_config);
            
            let publisher = TcpPublisher::bind(&args.addr, driver.snapshot())
                .await
                .with_context(|| format!("authority cannot serve on {}", args.addr))?;
            info!(addr = %publisher.local_addr(), "authority listening");
            
            let publisher = Arc::new(publisher);
            let node = AuthorityNode::new(node_id, driver, publisher.clone(), CpuTexture::new(dims));
            start_controls(role, tx)?;
            let stats = drive(NodeRuntime::new(context, node, config), rx).await;
            info!(followers = publisher.follower_count(), "authority stopping");
            Ok(stats)
        }
        Role::Follower => {
            let subscriber = TcpSubscriber::connect(&args.addr, SharedState::initial(dims))
                .await
                .with_context(|| format!("follower cannot reach authority at {}", args.addr))?;
            info!(peer = %subscriber.peer_addr(), "follower connected");
            
            let node = FollowerNode::new(node_id, Arc::new(subscriber), CpuTexture::new(dims));
            start_controls(role, tx)?;
            Ok(drive(NodeRuntime::new(context, node, config), rx).await)
        }
    }
}

fn start_controls(role: Role, tx: mpsc::UnboundedSender<Command>) -> Result<()> {
    control::print_controls(role);
    control::spawn_stdin_reader(tx).context("cannot start stdin reader")
}

/// Runs the tick loop until it finishes or Ctrl-C arrives.
async fn drive<B: NodeBehavior>(
    mut runtime: NodeRuntime<TokioContext, B>,
    commands: mpsc::UnboundedReceiver<Command>,
) -> RuntimeStats {
    let finished = tokio::select! {
        stats = runtime.run(commands) => Some(stats),
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            None
        }
    };
    finished.unwrap_or_else(|| runtime.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_exit_status_separates_transport_failures() {
        let unavailable = anyhow::Error::new(EnvError::unavailable("127.0.0.1:1", "connection refused"))
            .context("follower cannot reach authority at 127.0.0.1:1");
        assert_eq!(exit_status(&unavailable), 2);
        
        let closed = anyhow::Error::new(EnvError::Closed);
        assert_eq!(exit_status(&closed), 1);
        
        let other = anyhow::anyhow!("cannot start stdin reader");
        assert_eq!(exit_status(&other), 1);
    }
}

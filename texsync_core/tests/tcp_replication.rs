//! Authority and follower nodes replicating over the real TCP transport.

use std::sync::Arc;
use std::time::Duration;
use texsync_core::{
    ApplyOutcome, AuthorityDriver, AuthorityNode, CpuTexture, Dimensions, DriverConfig,
    FollowerNode, NodeBehavior, SharedState,
};
use texsync_env::{NodeId, SnapshotSubscriber, TcpPublisher, TcpSubscriber};

fn dims() -> Dimensions {
    Dimensions::new(32, 24).unwrap()
}

#[tokio::test]
async fn test_follower_converges_over_tcp() {
    let publisher = Arc::new(
        TcpPublisher::bind("127.0.0.1:0", SharedState::initial(dims()))
            .await
            .unwrap(),
    );
    let addr = publisher.local_addr().to_string();
    let subscriber = Arc::new(
        TcpSubscriber::connect(&addr, SharedState::initial(dims()))
            .await
            .unwrap(),
    );

    let mut authority = AuthorityNode::new(
        NodeId::from_seed(0),
        AuthorityDriver::new(dims(), DriverConfig::default()),
        publisher,
        CpuTexture::new(dims()),
    );
    let mut follower = FollowerNode::new(NodeId::from_seed(1), subscriber.clone(), CpuTexture::new(dims()));

    for _ in 0..45 {
        authority.tick(1.0 / 60.0);
        follower.tick(1.0 / 60.0);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    // Let the last snapshot drain, then one more follower tick
    for _ in 0..200 {
        if subscriber.latest().version == 45 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    follower.tick(1.0 / 60.0);

    assert_eq!(follower.state().version, 45);
    assert_eq!(follower.state(), authority.state());
    assert_eq!(follower.target().pixels(), authority.target().pixels());
    // Coalescing may skip versions, never adds applications
    assert!(follower.applier().applied_count() <= 46);
    assert_eq!(follower.tick(1.0 / 60.0).outcome, ApplyOutcome::Unchanged);
}

#[tokio::test]
async fn test_follower_startup_fails_without_authority() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let err = TcpSubscriber::connect(&addr, SharedState::initial(dims()))
        .await
        .err()
        .expect("connect must fail");
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_followers_joining_at_different_times_converge() {
    let publisher = Arc::new(
        TcpPublisher::bind("127.0.0.1:0", SharedState::initial(dims()))
            .await
            .unwrap(),
    );
    let addr = publisher.local_addr().to_string();
    let mut authority = AuthorityNode::new(
        NodeId::from_seed(0),
        AuthorityDriver::new(dims(), DriverConfig::default()),
        publisher.clone(),
        CpuTexture::new(dims()),
    );

    let mut followers = Vec::new();
    for seed in 1..=2u64 {
        let subscriber = Arc::new(
            TcpSubscriber::connect(&addr, SharedState::initial(dims()))
                .await
                .unwrap(),
        );
        followers.push((
            subscriber.clone(),
            FollowerNode::new(NodeId::from_seed(seed), subscriber, CpuTexture::new(dims())),
        ));
    }

    for tick in 0..70 {
        if tick == 40 {
            let subscriber = Arc::new(
                TcpSubscriber::connect(&addr, SharedState::initial(dims()))
                    .await
                    .unwrap(),
            );
            followers.push((
                subscriber.clone(),
                FollowerNode::new(NodeId::from_seed(3), subscriber, CpuTexture::new(dims())),
            ));
        }
        authority.tick(1.0 / 60.0);
        for (_, follower) in followers.iter_mut() {
            follower.tick(1.0 / 60.0);
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    for (subscriber, follower) in followers.iter_mut() {
        for _ in 0..200 {
            if subscriber.latest().version == 70 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        follower.tick(1.0 / 60.0);

        assert_eq!(follower.state(), authority.state());
        assert_eq!(follower.target().pixels(), authority.target().pixels());
    }
    assert_eq!(publisher.follower_count(), 3);
}

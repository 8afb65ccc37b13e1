use std::time::Duration;

use futures::StreamExt;
use ringway_node::{
    ConnectionConfig,
    FailureDetectorConfig,
    NodeLocator,
    RingwayNodeBuilder,
    Role,
};

fn connection_cfg(seeds: &[String]) -> ConnectionConfig {
    let gossip_addr = test_helper::get_unused_gossip_addr();
    let service_addr = test_helper::get_unused_addr();
    ConnectionConfig::new(gossip_addr, gossip_addr, service_addr, seeds)
}

fn fast_failure_detector() -> FailureDetectorConfig {
    FailureDetectorConfig {
        phi_threshold: 6.0,
        initial_interval: Duration::from_millis(500),
        ..Default::default()
    }
}

#[tokio::test]
// TODO: Replace the UDP transport with an in-memory one so this cannot flake on busy hosts.
pub async fn test_member_join() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let node_1_cfg = connection_cfg(&[]);
    let seeds = [node_1_cfg.public_addr.to_string()];
    let node_2_cfg = connection_cfg(&seeds);
    let gateway_cfg = connection_cfg(&seeds);

    let node_1 = RingwayNodeBuilder::new("node-1", node_1_cfg.clone())
        .connect()
        .await?;
    let node_2 = RingwayNodeBuilder::new("node-2", node_2_cfg.clone())
        .connect()
        .await?;
    let gateway = RingwayNodeBuilder::new("gateway", gateway_cfg)
        .with_role(Role::Watcher)
        .connect()
        .await?;

    for node in [&node_1, &node_2, &gateway] {
        node.wait_for_nodes(&["node-1", "node-2", "gateway"], Duration::from_secs(30))
            .await
            .expect("Nodes should connect within timeout.");
    }

    for node in [&node_1, &node_2, &gateway] {
        let stats = node.statistics();
        assert_eq!(stats.num_live_members(), 3);
        assert_eq!(stats.num_ring_members(), 2, "Watchers do not own keys.");
        assert_eq!(stats.num_dead_members(), 0);
        assert_eq!(node.ring().len(), 2);
    }

    let locator = gateway.locator();
    let members = locator.members();
    assert_eq!(members["node-1"].public_addr, node_1_cfg.service_addr);
    assert_eq!(members["node-2"].public_addr, node_2_cfg.service_addr);
    assert_eq!(members["gateway"].role, Role::Watcher);

    for i in 0..100 {
        let key = format!("key-{i}");
        let owner = locator.get_node(key.as_bytes())?;
        assert_eq!(owner.role, Role::RingMember);
    }

    gateway.shutdown().await;
    node_2.shutdown().await;
    node_1.shutdown().await;

    Ok(())
}

#[tokio::test]
// TODO: Replace the UDP transport with an in-memory one so this cannot flake on busy hosts.
pub async fn test_member_leave() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let node_1_cfg = connection_cfg(&[]);
    let seeds = [node_1_cfg.public_addr.to_string()];
    let node_2_cfg = connection_cfg(&seeds);
    let gateway_cfg = connection_cfg(&seeds);

    let node_1 = RingwayNodeBuilder::new("node-1", node_1_cfg)
        .with_failure_detector_config(fast_failure_detector())
        .connect()
        .await?;
    let node_2 = RingwayNodeBuilder::new("node-2", node_2_cfg)
        .with_failure_detector_config(fast_failure_detector())
        .connect()
        .await?;
    let gateway = RingwayNodeBuilder::new("gateway", gateway_cfg)
        .with_role(Role::Watcher)
        .with_failure_detector_config(fast_failure_detector())
        .connect()
        .await?;

    gateway
        .wait_for_nodes(&["node-1", "node-2"], Duration::from_secs(30))
        .await
        .expect("Nodes should connect within timeout.");
    assert_eq!(gateway.ring().len(), 2);

    node_2.shutdown().await;

    // Let the failure detector mark the node as dead.
    let mut left = false;
    for _ in 0..120 {
        if gateway.ring().len() == 1 {
            left = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert!(left, "Node 2 should be removed from the ring.");

    let entries = gateway.ring().entries();
    assert_eq!(entries[0].node_id(), "node-1");
    assert_eq!(entries[0].bound(), u32::MAX, "The survivor owns the whole ring.");
    assert_eq!(gateway.statistics().num_ring_members(), 1);

    let change = gateway
        .membership_changes()
        .next()
        .await
        .expect("Change stream should be open.");
    let left = change.left.iter().map(|m| m.node_id.as_str()).collect::<Vec<_>>();
    assert_eq!(left, ["node-2"]);
    assert!(change.joined.is_empty());

    gateway.shutdown().await;
    node_1.shutdown().await;

    Ok(())
}

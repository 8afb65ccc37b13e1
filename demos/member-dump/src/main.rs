#[macro_use]
extern crate tracing;

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use ringway::node::{ConnectionConfig, NodeLocator, RingwayNodeBuilder, Role, DEFAULT_CLUSTER_ID};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args: Args = Args::parse();

    let gossip_addr = SocketAddr::new(args.host, args.gossip_port);
    let connection_cfg =
        ConnectionConfig::new(gossip_addr, gossip_addr, gossip_addr, args.seeds.iter());

    let node = RingwayNodeBuilder::new(args.name.clone(), connection_cfg)
        .with_role(Role::Watcher)
        .with_cluster_id(&args.cluster_id)
        .connect()
        .await?;
    let locator = node.locator();
    let mut changes = node.membership_changes();

    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(change) = changes.next() => {
                for member in change.joined {
                    info!(node_id = %member.node_id, role = %member.role, "Member joined.");
                }
                for member in change.left {
                    info!(node_id = %member.node_id, role = %member.role, "Member left.");
                }
                continue;
            },
            _ = interval.tick() => {},
        }

        let stats = node.statistics();
        info!(
            num_live_members = stats.num_live_members(),
            num_dead_members = stats.num_dead_members(),
            num_ring_members = stats.num_ring_members(),
            "Cluster state."
        );

        for member in locator.members().values() {
            info!(
                node_id = %member.node_id,
                gossip_addr = %member.gossip_addr,
                public_addr = %member.public_addr,
                role = %member.role,
                meta = ?[member.role.as_byte()],
                "Member."
            );
        }

        for entry in node.ring().entries() {
            info!(node_id = %entry.node_id(), bound = entry.bound(), "Ring entry.");
        }

        if let Some(key) = args.probe_key.as_deref() {
            match locator.get_node(key.as_bytes()) {
                Ok(member) => info!(key = %key, node_id = %member.node_id, "Key owner."),
                Err(e) => warn!(key = %key, error = %e, "Unable to resolve key owner."),
            }
        }
    }

    node.shutdown().await;

    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(long)]
    /// The unique name of this observer within the cluster.
    name: String,

    #[arg(long = "seed")]
    /// The gossip addresses of the nodes to join the cluster through.
    seeds: Vec<String>,

    #[arg(long, default_value = "127.0.0.1")]
    /// The address to bind gossip to.
    host: IpAddr,

    #[arg(long, default_value_t = 7946)]
    /// The port used for gossip.
    gossip_port: u16,

    #[arg(long, default_value_t = DEFAULT_CLUSTER_ID.to_string())]
    /// The ID of the cluster to join.
    cluster_id: String,

    #[arg(long)]
    /// A routing key whose owner is printed along with the members.
    probe_key: Option<String>,
}

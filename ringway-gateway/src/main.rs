#[macro_use]
extern crate tracing;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use ringway_gateway::Redirector;
use ringway_node::{ConnectionConfig, RingwayNodeBuilder, Role, DEFAULT_CLUSTER_ID};
use ringway_rpc::Server;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args: Args = Args::parse();

    let gossip_addr = SocketAddr::new(args.host, args.gossip_port);
    let service_addr = SocketAddr::new(args.host, args.service_port);
    let connection_cfg =
        ConnectionConfig::new(gossip_addr, gossip_addr, service_addr, args.seeds.iter());

    let node = RingwayNodeBuilder::new(args.name.clone(), connection_cfg)
        .with_role(Role::Watcher)
        .with_cluster_id(&args.cluster_id)
        .connect()
        .await?;

    let redirector = Arc::new(Redirector::new(node.locator()));
    let server = Server::listen(service_addr, redirector.clone()).await?;
    redirector.bind_connector(server.dialer())?;

    info!(
        name = %args.name,
        gossip_addr = %gossip_addr,
        service_addr = %server.local_addr(),
        "Gateway is ready."
    );

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal.");

    server.shutdown();
    node.shutdown().await;

    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(long)]
    /// The unique name of the gateway within the cluster.
    name: String,

    #[arg(long = "seed")]
    /// The gossip addresses of the nodes to join the cluster through.
    ///
    /// The flag can be repeated, at least one seed is needed for the
    /// gateway to discover any backends.
    seeds: Vec<String>,

    #[arg(long, default_value = "127.0.0.1")]
    /// The address to bind both gossip and the message service to.
    ///
    /// This address is also advertised to the rest of the cluster.
    host: IpAddr,

    #[arg(long, default_value_t = 7946)]
    /// The port used for gossip.
    gossip_port: u16,

    #[arg(long, default_value_t = 10000)]
    /// The port the gateway accepts client and backend messages on.
    service_port: u16,

    #[arg(long, default_value_t = DEFAULT_CLUSTER_ID.to_string())]
    /// The ID of the cluster to join.
    cluster_id: String,
}

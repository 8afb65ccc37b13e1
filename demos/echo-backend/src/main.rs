#[macro_use]
extern crate tracing;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use ringway::gateway::{bind_push, CLIENT_ADDR_QUERY};
use ringway::node::{ConnectionConfig, RingwayNodeBuilder, Role, DEFAULT_CLUSTER_ID};
use ringway::rpc::{Code, Handler, Message, Request, Server};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args: Args = Args::parse();

    let gossip_addr = SocketAddr::new(args.host, args.gossip_port);
    let service_addr = SocketAddr::new(args.host, args.service_port);
    let connection_cfg =
        ConnectionConfig::new(gossip_addr, gossip_addr, service_addr, args.seeds.iter());

    let server = Server::listen(
        service_addr,
        Arc::new(EchoHandler {
            name: args.name.clone(),
        }),
    )
    .await?;

    let node = RingwayNodeBuilder::new(args.name.clone(), connection_cfg)
        .with_role(Role::RingMember)
        .with_cluster_id(&args.cluster_id)
        .connect()
        .await?;

    info!(
        name = %args.name,
        gossip_addr = %gossip_addr,
        service_addr = %server.local_addr(),
        "Echo backend is ready."
    );

    tokio::signal::ctrl_c().await?;

    server.shutdown();
    node.shutdown().await;

    Ok(())
}

struct EchoHandler {
    name: String,
}

#[async_trait]
impl Handler for EchoHandler {
    async fn on_message(&self, request: Request) -> Message {
        let msg = request.message();
        info!(
            path = %msg.path(),
            remote_addr = %request.remote_addr(),
            payload_len = msg.payload().len(),
            "Received message."
        );

        match msg.path() {
            "/call" => Message::response(Code::Content, self.name.clone()),
            "/bidirectional" => {
                push_later(&request, &self.name);
                Message::response(Code::Content, self.name.clone())
            },
            _ => Message::response(Code::NotFound, "no such path"),
        }
    }
}

/// Pushes a message back to the client from an independent task.
fn push_later(request: &Request, name: &str) {
    let push = Message::request(Code::Post, "/bidirectional")
        .with_payload(format!("push from {name}"));
    let push = match bind_push(request, push) {
        Ok(push) => push,
        Err(e) => {
            warn!(error = %e, "Nothing to push back to.");
            return;
        },
    };
    let binding = push.query(CLIENT_ADDR_QUERY).flatten().unwrap_or_default().to_string();
    let conn = request.connection().clone();

    tokio::spawn(async move {
        match conn.call(&push).await {
            Ok(reply) => info!(
                binding = %binding,
                code = %reply.code(),
                payload = %String::from_utf8_lossy(reply.payload()),
                "Client replied to push."
            ),
            Err(e) => error!(binding = %binding, error = %e, "Failed to push to client."),
        }
    });
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(long)]
    /// The unique name of the node within the cluster.
    name: String,

    #[arg(long = "seed")]
    /// The gossip addresses of the nodes to join the cluster through.
    seeds: Vec<String>,

    #[arg(long, default_value = "127.0.0.1")]
    /// The address to bind both gossip and the message service to.
    host: IpAddr,

    #[arg(long, default_value_t = 7946)]
    /// The port used for gossip.
    gossip_port: u16,

    #[arg(long, default_value_t = 10000)]
    /// The port the node accepts messages on.
    service_port: u16,

    #[arg(long, default_value_t = DEFAULT_CLUSTER_ID.to_string())]
    /// The ID of the cluster to join.
    cluster_id: String,
}

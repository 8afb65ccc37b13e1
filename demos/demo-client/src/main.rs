#[macro_use]
extern crate tracing;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use rand::distributions::Alphanumeric;
use rand::Rng;
use ringway::gateway::KEY_QUERY;
use ringway::rpc::{Code, Connection, Handler, Message, Request};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args: Args = Args::parse();

    let conn = Connection::connect(args.gateway_addr, Arc::new(PushHandler)).await?;
    info!(gateway_addr = %args.gateway_addr, "Connected to gateway.");

    let mut calls = BTreeMap::<String, usize>::new();
    let mut interval = tokio::time::interval(*args.period);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = interval.tick() => {},
        }

        let key = args.key.clone().unwrap_or_else(random_key);
        let request = Message::request(Code::Get, args.path.clone()).with_query(KEY_QUERY, &key);

        match conn.call(&request).await {
            Ok(reply) => {
                let payload = String::from_utf8_lossy(reply.payload()).to_string();
                info!(key = %key, code = %reply.code(), payload = %payload, "Received reply.");
                *calls.entry(payload).or_default() += 1;
            },
            Err(e) => {
                error!(key = %key, error = %e, "Call failed.");
                if conn.is_closed() {
                    break;
                }
            },
        }
    }

    for (reply, count) in calls {
        info!(reply = %reply, count = count, "Reply tally.");
    }
    conn.close();

    Ok(())
}

fn random_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}

/// Answers the messages backends push back through the gateway.
struct PushHandler;

#[async_trait]
impl Handler for PushHandler {
    async fn on_message(&self, request: Request) -> Message {
        let msg = request.message();
        info!(
            path = %msg.path(),
            payload = %String::from_utf8_lossy(msg.payload()),
            "Received push from backend."
        );

        if msg.path() != "/bidirectional" {
            return Message::response(Code::BadRequest, "unexpected push");
        }
        Message::response(Code::Content, "push received")
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(long = "addr", default_value = "127.0.0.1:10000")]
    /// The service address of the gateway.
    gateway_addr: SocketAddr,

    #[arg(long, default_value = "/call")]
    /// The path to call, `/bidirectional` asks the backend to push back.
    path: String,

    #[arg(long)]
    /// The routing key to use, a random key is used for each call if unset.
    key: Option<String>,

    #[arg(long, default_value = "5s")]
    /// The time to wait between calls.
    period: humantime::Duration,
}

//! Local-segment discovery: handshake with well-known ports on nearby hosts.
//!
//! The exchange is one line each way:
//! ```text
//! -> ONET/1 HELLO
//! <- ONET/1 NODE <node-id> <cap,cap,...|->
//! ```
//! A registered node answers handshakes on its announce port until it is
//! withdrawn.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

use crate::{DiscoveryError, DiscoverySource, MethodKind, NodeDescriptor};

const HELLO: &str = "ONET/1 HELLO";
const NODE_PREFIX: &str = "ONET/1 NODE ";
const MAX_LINE: u64 = 1024;

struct Responder {
    node_id: String,
    addr: SocketAddr,
    task: JoinHandle<()>,
}

pub struct LocalSegmentSource {
    targets: Vec<String>,
    announce_port: Option<u16>,
    timeout: Duration,
    responder: Mutex<Option<Responder>>,
}

impl LocalSegmentSource {
    pub fn new(
        hosts: &[String],
        ports: &[u16],
        announce_port: Option<u16>,
        timeout: Duration,
    ) -> Self {
        let targets = hosts
            .iter()
            .flat_map(|h| ports.iter().map(move |p| format!("{h}:{p}")))
            .collect();
        Self {
            targets,
            announce_port,
            timeout,
            responder: Mutex::new(None),
        }
    }

    /// Address the handshake responder is bound to, if announced.
    pub fn listening_addr(&self) -> Option<SocketAddr> {
        self.responder().as_ref().map(|r| r.addr)
    }

    fn responder(&self) -> std::sync::MutexGuard<'_, Option<Responder>> {
        self.responder.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for LocalSegmentSource {
    fn drop(&mut self) {
        if let Some(responder) = self.responder().take() {
            responder.task.abort();
        }
    }
}

/// Format the handshake reply for `node`.
fn node_line(node: &NodeDescriptor) -> String {
    let caps = if node.capabilities.is_empty() {
        "-".to_string()
    } else {
        node.capabilities.iter().cloned().collect::<Vec<_>>().join(",")
    };
    format!("{NODE_PREFIX}{} {caps}\n", node.id)
}

/// Parse a handshake reply received from `address`.
fn parse_node_line(line: &str, address: &str) -> Option<NodeDescriptor> {
    let rest = line.trim_end().strip_prefix(NODE_PREFIX)?;
    let mut parts = rest.split_whitespace();
    let id = parts.next()?;
    let caps: Vec<&str> = match parts.next() {
        None | Some("-") => Vec::new(),
        Some(list) => list.split(',').filter(|c| !c.is_empty()).collect(),
    };
    Some(NodeDescriptor::new(id, address).with_capabilities(caps))
}

async fn handshake(address: String, timeout: Duration) -> Option<NodeDescriptor> {
    let exchange = async {
        let mut stream = TcpStream::connect(&address).await.ok()?;
        stream.write_all(format!("{HELLO}\n").as_bytes()).await.ok()?;
        let mut reader = BufReader::new(stream.take(MAX_LINE));
        let mut line = String::new();
        reader.read_line(&mut line).await.ok()?;
        parse_node_line(&line, &address)
    };
    tokio::time::timeout(timeout, exchange).await.ok().flatten()
}

async fn answer(mut stream: TcpStream, reply: String, timeout: Duration) {
    let exchange = async {
        let (read_half, mut write_half) = stream.split();
        let mut reader = BufReader::new(read_half.take(MAX_LINE));
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        if line.trim_end() == HELLO {
            write_half.write_all(reply.as_bytes()).await?;
        }
        Ok::<_, std::io::Error>(())
    };
    if let Ok(Err(e)) = tokio::time::timeout(timeout, exchange).await {
        tracing::trace!(error = %e, "local handshake aborted");
    }
}

#[async_trait]
impl DiscoverySource for LocalSegmentSource {
    fn kind(&self) -> MethodKind {
        MethodKind::LocalSegment
    }

    async fn query(&self) -> Result<Vec<NodeDescriptor>, DiscoveryError> {
        let mut set = JoinSet::new();
        for target in &self.targets {
            set.spawn(handshake(target.clone(), self.timeout));
        }

        let mut found = Vec::new();
        while let Some(joined) = set.join_next().await {
            if let Ok(Some(node)) = joined {
                found.push(node);
            }
        }
        found.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(found)
    }

    async fn announce(&self, local: &NodeDescriptor) -> Result<(), DiscoveryError> {
        let Some(port) = self.announce_port else {
            return Ok(());
        };
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let addr = listener.local_addr()?;
        let reply = node_line(local);
        let timeout = self.timeout;
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        tokio::spawn(answer(stream, reply.clone(), timeout));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "local responder accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        });
        tracing::info!(node = %local.id, %addr, "answering local-segment handshakes");

        let previous = self.responder().replace(Responder {
            node_id: local.id.clone(),
            addr,
            task,
        });
        if let Some(previous) = previous {
            previous.task.abort();
        }
        Ok(())
    }

    async fn withdraw(&self, node_id: &str) -> Result<(), DiscoveryError> {
        let mut guard = self.responder();
        if guard.as_ref().is_some_and(|r| r.node_id == node_id) {
            if let Some(responder) = guard.take() {
                responder.task.abort();
            }
        }
        Ok(())
    }
}

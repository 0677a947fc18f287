//! Bounded-time connectivity and latency probes.
//!
//! A probe is a TCP connect attempt; its round-trip time doubles as the
//! latency measurement. Timeouts and refusals are ordinary negative results,
//! never errors.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;

/// Latency reported when a node is unreachable or was never measured.
pub const DEFAULT_LATENCY_MS: f64 = 1_000.0;

/// Result of a single connectivity probe.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProbeOutcome {
    Reachable { rtt_ms: f64 },
    Unreachable,
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable { .. })
    }

    /// Measured latency, or [`DEFAULT_LATENCY_MS`] for unreachable nodes.
    pub fn latency_ms(&self) -> f64 {
        match self {
            Self::Reachable { rtt_ms } => *rtt_ms,
            Self::Unreachable => DEFAULT_LATENCY_MS,
        }
    }
}

/// Measures whether a node answers within a bounded time.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    async fn probe(&self, address: &str, timeout: Duration) -> ProbeOutcome;
}

/// Probes by opening (and immediately dropping) a TCP connection.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpProber;

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, address: &str, timeout: Duration) -> ProbeOutcome {
        let started = Instant::now();
        match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
            Ok(Ok(_stream)) => ProbeOutcome::Reachable {
                rtt_ms: started.elapsed().as_secs_f64() * 1_000.0,
            },
            Ok(Err(e)) => {
                tracing::trace!(%address, error = %e, "probe refused");
                ProbeOutcome::Unreachable
            }
            Err(_) => {
                tracing::trace!(%address, ?timeout, "probe timed out");
                ProbeOutcome::Unreachable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn listening_socket_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let outcome = TcpProber.probe(&addr, Duration::from_secs(2)).await;
        assert!(outcome.is_reachable());
        assert!(outcome.latency_ms() < DEFAULT_LATENCY_MS);
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let outcome = TcpProber.probe(&addr, Duration::from_millis(500)).await;
        assert_eq!(outcome, ProbeOutcome::Unreachable);
        assert_eq!(outcome.latency_ms(), DEFAULT_LATENCY_MS);
    }

    #[tokio::test]
    async fn malformed_address_is_unreachable() {
        let outcome = TcpProber.probe("not an address", Duration::from_millis(200)).await;
        assert!(!outcome.is_reachable());
    }
}

//! Message-transport boundary for the ONET overlay.
//!
//! The overlay core never opens sockets for application traffic itself; it
//! talks to a [`Transport`] handle injected at construction. This crate
//! defines that contract, the membership events a transport emits, and the
//! bounded-time connectivity [`Prober`] that discovery and routing use to
//! measure reachability and latency.

pub mod error;
pub mod probe;
pub mod probing_transport;
pub mod transport;

pub use error::TransportError;
pub use probe::{ProbeOutcome, Prober, TcpProber};
pub use probing_transport::ProbingTransport;
pub use transport::{Transport, TransportEvent, EVENT_CHANNEL_CAPACITY};

//! Nullable infrastructure for deterministic testing.
//!
//! Everything the overlay core touches outside the process (clock, transport,
//! connectivity probes) sits behind a trait or a `now` argument. This crate
//! provides test-friendly implementations that:
//! - Return deterministic, scriptable values
//! - Record what the code under test asked of them
//! - Never touch the network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod prober;
pub mod transport;

pub use clock::NullClock;
pub use prober::NullProber;
pub use transport::NullTransport;

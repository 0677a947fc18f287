//! Nullable prober: scripted connectivity results.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use onet_transport::{ProbeOutcome, Prober};

/// A prober that answers from a script instead of the network.
///
/// Addresses without a scripted outcome get the fallback, which starts as
/// reachable at 10 ms.
pub struct NullProber {
    outcomes: Mutex<HashMap<String, ProbeOutcome>>,
    fallback: Mutex<ProbeOutcome>,
    probed: Mutex<Vec<String>>,
}

impl NullProber {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(HashMap::new()),
            fallback: Mutex::new(ProbeOutcome::Reachable { rtt_ms: 10.0 }),
            probed: Mutex::new(Vec::new()),
        }
    }

    /// Script a reachable answer with the given round-trip time.
    pub fn reachable(&self, address: &str, rtt_ms: f64) {
        self.script(address, ProbeOutcome::Reachable { rtt_ms });
    }

    /// Script an unreachable answer.
    pub fn unreachable(&self, address: &str) {
        self.script(address, ProbeOutcome::Unreachable);
    }

    /// Outcome for addresses with nothing scripted.
    pub fn set_fallback(&self, outcome: ProbeOutcome) {
        *lock(&self.fallback) = outcome;
    }

    /// Every address probed so far, in order.
    pub fn probed(&self) -> Vec<String> {
        lock(&self.probed).clone()
    }

    fn script(&self, address: &str, outcome: ProbeOutcome) {
        lock(&self.outcomes).insert(address.to_string(), outcome);
    }
}

impl Default for NullProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for NullProber {
    async fn probe(&self, address: &str, _timeout: Duration) -> ProbeOutcome {
        lock(&self.probed).push(address.to_string());
        let scripted = lock(&self.outcomes).get(address).copied();
        scripted.unwrap_or_else(|| *lock(&self.fallback))
    }
}

/// Test doubles never poison their locks on purpose; recover if a test panicked.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_outcomes_override_fallback() {
        let prober = NullProber::new();
        prober.unreachable("10.0.0.1:1");
        prober.reachable("10.0.0.2:1", 42.0);

        let timeout = Duration::from_millis(1);
        assert_eq!(prober.probe("10.0.0.1:1", timeout).await, ProbeOutcome::Unreachable);
        assert_eq!(prober.probe("10.0.0.2:1", timeout).await.latency_ms(), 42.0);
        assert!(prober.probe("10.0.0.3:1", timeout).await.is_reachable());
        assert_eq!(prober.probed().len(), 3);
    }
}

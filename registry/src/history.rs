//! Per-node probe history and the reliability score derived from it.
//!
//! Reliability blends three signals, each normalised to `[0, 1]`:
//! - uptime ratio: successful probes / all probes (weight 0.4)
//! - response-time consistency: `1 - stddev / mean` of successful RTTs (0.3)
//! - recent activity: 1.0 if the last success is under a minute old,
//!   decaying linearly to 0.0 at ten minutes (0.3)

use std::collections::VecDeque;

use onet_types::{Timestamp, DEFAULT_RELIABILITY};

/// Maximum probe samples retained per node.
const MAX_SAMPLES: usize = 32;

const UPTIME_WEIGHT: f64 = 0.4;
const CONSISTENCY_WEIGHT: f64 = 0.3;
const ACTIVITY_WEIGHT: f64 = 0.3;

/// A success within this window counts as fully active.
const ACTIVITY_FRESH_SECS: u64 = 60;
/// A success older than this contributes no activity.
const ACTIVITY_STALE_SECS: u64 = 600;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Sample {
    at: Timestamp,
    /// `None` for a failed probe.
    rtt_ms: Option<f64>,
}

/// Bounded ring of recent probe outcomes for one node.
#[derive(Clone, Debug, Default)]
pub struct ProbeHistory {
    samples: VecDeque<Sample>,
    consecutive_failures: u32,
}

impl ProbeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, rtt_ms: f64, now: Timestamp) {
        self.push(Sample {
            at: now,
            rtt_ms: Some(rtt_ms),
        });
        self.consecutive_failures = 0;
    }

    /// Record a failed probe and return the current failure streak.
    pub fn record_failure(&mut self, now: Timestamp) -> u32 {
        self.push(Sample {
            at: now,
            rtt_ms: None,
        });
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    fn push(&mut self, sample: Sample) {
        if self.samples.len() >= MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Mean RTT over successful probes, if any.
    pub fn mean_rtt_ms(&self) -> Option<f64> {
        let rtts: Vec<f64> = self.samples.iter().filter_map(|s| s.rtt_ms).collect();
        if rtts.is_empty() {
            return None;
        }
        Some(rtts.iter().sum::<f64>() / rtts.len() as f64)
    }

    /// Reliability percentage in `0..=100`.
    ///
    /// Returns [`DEFAULT_RELIABILITY`] when no history exists.
    pub fn reliability(&self, now: Timestamp) -> u8 {
        if self.samples.is_empty() {
            return DEFAULT_RELIABILITY;
        }

        let score = UPTIME_WEIGHT * self.uptime_ratio()
            + CONSISTENCY_WEIGHT * self.consistency()
            + ACTIVITY_WEIGHT * self.recent_activity(now);
        (score * 100.0).round().clamp(0.0, 100.0) as u8
    }

    fn uptime_ratio(&self) -> f64 {
        let ok = self.samples.iter().filter(|s| s.rtt_ms.is_some()).count();
        ok as f64 / self.samples.len() as f64
    }

    fn consistency(&self) -> f64 {
        let rtts: Vec<f64> = self.samples.iter().filter_map(|s| s.rtt_ms).collect();
        match rtts.len() {
            0 => 0.0,
            1 => 1.0,
            n => {
                let mean = rtts.iter().sum::<f64>() / n as f64;
                if mean <= f64::EPSILON {
                    return 1.0;
                }
                let variance = rtts.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n as f64;
                (1.0 - variance.sqrt() / mean).clamp(0.0, 1.0)
            }
        }
    }

    fn recent_activity(&self, now: Timestamp) -> f64 {
        let Some(last_ok) = self
            .samples
            .iter()
            .rev()
            .find(|s| s.rtt_ms.is_some())
            .map(|s| s.at)
        else {
            return 0.0;
        };
        let age = last_ok.elapsed_since(now);
        if age <= ACTIVITY_FRESH_SECS {
            1.0
        } else if age >= ACTIVITY_STALE_SECS {
            0.0
        } else {
            let span = (ACTIVITY_STALE_SECS - ACTIVITY_FRESH_SECS) as f64;
            1.0 - (age - ACTIVITY_FRESH_SECS) as f64 / span
        }
    }
}

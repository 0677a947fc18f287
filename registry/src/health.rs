//! Composite network health score.

const CONNECTION_WEIGHT: f64 = 0.6;
const LATENCY_WEIGHT: f64 = 0.4;
/// Average latency at which the latency component reaches zero.
const LATENCY_CEILING_MS: f64 = 1_000.0;

/// Health in `[0, 1]`: `0.6 × connected/total + 0.4 × max(0, 1 − avg_latency/1000)`.
///
/// Zero when no nodes are known.
pub fn health_score(connected: usize, total: usize, avg_latency_ms: f64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let connection_ratio = (connected as f64 / total as f64).clamp(0.0, 1.0);
    let latency_health = if avg_latency_ms.is_finite() {
        (1.0 - avg_latency_ms / LATENCY_CEILING_MS).clamp(0.0, 1.0)
    } else {
        0.0
    };
    CONNECTION_WEIGHT * connection_ratio + LATENCY_WEIGHT * latency_health
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_network_is_unhealthy() {
        assert_eq!(health_score(0, 0, 0.0), 0.0);
    }

    #[test]
    fn fully_connected_fast_network_is_healthy() {
        assert!((health_score(4, 4, 0.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn components_are_weighted() {
        // half connected, 500ms average: 0.6*0.5 + 0.4*0.5
        assert!((health_score(2, 4, 500.0) - 0.5).abs() < 1e-9);
        // latency beyond the ceiling contributes nothing
        assert!((health_score(4, 4, 5_000.0) - 0.6).abs() < 1e-9);
    }
}

use proptest::prelude::*;

use onet_routing::{Algorithm, RoutePriority, Router, RoutingConfig, RoutingError};
use onet_types::{NodeStatus, RemoteNode, Timestamp};

/// A random overlay: node `n{i}` with a latency, a connection flag and links
/// to other nodes by index.
fn arb_network() -> impl Strategy<Value = Vec<(f64, bool, Vec<usize>)>> {
    prop::collection::vec(
        (
            1.0f64..500.0,
            any::<bool>(),
            prop::collection::vec(0usize..12, 0..4),
        ),
        1..12,
    )
}

fn build(network: &[(f64, bool, Vec<usize>)], algorithm: Algorithm) -> Router {
    let now = Timestamp::new(10);
    let mut router = Router::new(
        "me",
        RoutingConfig {
            algorithm,
            ..RoutingConfig::default()
        },
    );
    for (i, (latency, connected, links)) in network.iter().enumerate() {
        let status = if *connected {
            NodeStatus::Connected
        } else {
            NodeStatus::Discovered
        };
        let links: Vec<String> = links
            .iter()
            .filter(|l| **l < network.len())
            .map(|l| format!("n{l}"))
            .collect();
        router.add_node(
            &RemoteNode::new(format!("n{i}"), format!("10.0.0.{i}:1"), now)
                .with_latency(*latency)
                .with_status(status)
                .with_links(links),
            now,
        );
    }
    router
}

proptest! {
    /// Every algorithm agrees on whether a target is reachable, and every
    /// path starts at the local node, ends at the target and never repeats.
    #[test]
    fn paths_are_simple_and_agree_on_reachability(network in arb_network(), pick in 0usize..12) {
        let target = format!("n{}", pick % network.len());
        let now = Timestamp::new(10);
        let mut outcomes = Vec::new();
        for algorithm in [Algorithm::ShortestPath, Algorithm::Dijkstra, Algorithm::AStar, Algorithm::Intelligent] {
            let mut router = build(&network, algorithm);
            match router.find_optimal_route(&target, RoutePriority::Normal, now) {
                Ok(path) => {
                    prop_assert_eq!(path.first().map(String::as_str), Some("me"));
                    prop_assert_eq!(path.last(), Some(&target));
                    let mut unique = path.clone();
                    unique.sort();
                    unique.dedup();
                    prop_assert_eq!(unique.len(), path.len());
                    outcomes.push(true);
                }
                Err(RoutingError::NoRoute(_)) => outcomes.push(false),
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }
        prop_assert!(outcomes.windows(2).all(|w| w[0] == w[1]));
    }

    /// A* never finds a costlier path than Dijkstra.
    #[test]
    fn a_star_is_optimal(network in arb_network(), pick in 0usize..12) {
        let target = format!("n{}", pick % network.len());
        let now = Timestamp::new(10);
        let router = build(&network, Algorithm::Dijkstra);
        let dijkstra = router.compute_path(&target, RoutePriority::Normal, Algorithm::Dijkstra, now);
        let a_star = router.compute_path(&target, RoutePriority::Normal, Algorithm::AStar, now);
        if let (Some(d), Some(a)) = (dijkstra, a_star) {
            prop_assert!((a.scores.cost - d.scores.cost).abs() < 1e-6);
        }
    }

    /// After a metric update no cached path through that node stays valid.
    #[test]
    fn metric_updates_invalidate_dependent_paths(network in arb_network(), pick in 0usize..12) {
        let now = Timestamp::new(10);
        let mut router = build(&network, Algorithm::Dijkstra);
        for i in 0..network.len() {
            let _ = router.find_optimal_route(&format!("n{i}"), RoutePriority::Normal, now);
        }
        let changed = format!("n{}", pick % network.len());
        router.update_node_metrics(&changed, 123.0, 50, 1.0, now).unwrap();

        prop_assert!(router.cache().valid_entries().all(|(_, p)| !p.contains(&changed)));
    }

    /// Quality scores stay within the unit interval.
    #[test]
    fn quality_is_bounded(network in arb_network(), pick in 0usize..12) {
        let target = format!("n{}", pick % network.len());
        let router = build(&network, Algorithm::Intelligent);
        if let Some(path) = router.compute_path(&target, RoutePriority::High, Algorithm::Intelligent, Timestamp::new(10)) {
            prop_assert!((0.0..=1.0).contains(&path.scores.quality));
        }
    }
}

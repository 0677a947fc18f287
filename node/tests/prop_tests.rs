use std::collections::{BTreeMap, BTreeSet};

use onet_node::{NetworkTopology, NodeConfig, NodeMetrics};
use proptest::prelude::*;

fn adjacency() -> impl Strategy<Value = BTreeMap<String, BTreeSet<String>>> {
    prop::collection::vec((0u8..8, 0u8..8), 0..24).prop_map(|edges| {
        let mut adjacency: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (a, b) in edges.into_iter().filter(|(a, b)| a != b) {
            let (a, b) = (format!("n{a}"), format!("n{b}"));
            adjacency.entry(a.clone()).or_default().insert(b.clone());
            adjacency.entry(b).or_default().insert(a);
        }
        adjacency
    })
}

proptest! {
    #[test]
    fn topology_links_are_unique_and_ordered(adj in adjacency()) {
        let topology = NetworkTopology::build("n0", &[], &adj);
        let unique: BTreeSet<_> = topology.connections.iter().cloned().collect();
        prop_assert_eq!(unique.len(), topology.connections.len());
        for link in &topology.connections {
            prop_assert!(link.a < link.b);
            prop_assert!(adj[&link.a].contains(&link.b));
        }
        let degree_sum: usize = adj.values().map(BTreeSet::len).sum();
        prop_assert_eq!(degree_sum, topology.connections.len() * 2);
    }

    #[test]
    fn health_gauge_stays_in_range(health in -1.0f64..2.0) {
        let metrics = NodeMetrics::new().unwrap();
        metrics.set_health(health);
        let value = metrics.network_health.get();
        prop_assert!((0..=1000).contains(&value));
    }

    #[test]
    fn config_round_trips(stake in 0.0f64..1e9, id in "[a-f0-9]{8,40}", auto in any::<bool>()) {
        let config = NodeConfig {
            node_id: Some(id),
            consensus_stake: Some(stake),
            auto_connect: auto,
            ..NodeConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        prop_assert_eq!(NodeConfig::from_toml_str(&text).unwrap(), config);
    }
}

use onet_types::RemoteNode;

use crate::MethodKind;

/// Capacity of the discovery event channel.
pub const DISCOVERY_EVENT_CAPACITY: usize = 256;

/// Membership changes observed by discovery.
#[derive(Clone, Debug, PartialEq)]
pub enum DiscoveryEvent {
    /// A method round turned up reachable nodes (new or refreshed).
    NodesDiscovered {
        method: MethodKind,
        nodes: Vec<RemoteNode>,
    },
    /// A node failed too many probes or its connection dropped.
    NodeLost { node_id: String },
}

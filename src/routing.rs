use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::{
    addressing::{Address, Allocator, SubnetId},
    error::SceneError,
    topology::{IfaceId, NodeId, Topology},
};

/// One forwarding decision: frames for `destination` leave through the
/// node's own `next_hop` interface and are handed to `gateway`, the
/// neighbouring interface on the same link. For a directly attached subnet
/// the gateway is the next hop itself (delivery happens on-link).
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct RoutingEntry {
    pub destination: SubnetId,
    pub next_hop: IfaceId,
    pub gateway: IfaceId,
}

/// Forwarding state for every node, computed once from the finished
/// topology by breadth-first search over the link graph (uniform hop cost).
/// The topology is static after construction, so this is never invalidated.
#[derive(Debug, Default)]
pub struct RoutingTable {
    entries: FxHashMap<NodeId, Vec<RoutingEntry>>,
    owners: FxHashMap<Address, IfaceId>,
}

impl RoutingTable {
    #[must_use]
    pub fn compute(topology: &Topology, allocator: &Allocator) -> RoutingTable {
        let mut owners = FxHashMap::default();
        for (id, iface) in topology.ifaces() {
            let address = iface
                .address()
                .expect("routing computed before addressing finished");
            owners.insert(address, id);
        }

        let mut entries: FxHashMap<NodeId, Vec<RoutingEntry>> = FxHashMap::default();
        for source in (0..topology.node_count()).map(|i| topology.node_id(i)) {
            let reached = breadth_first(topology, source);
            let mut table = Vec::new();
            for (subnet_id, subnet) in allocator.subnets() {
                let best = topology
                    .ifaces()
                    .filter(|(_, iface)| iface.address().is_some_and(|a| subnet.contains(a)))
                    .filter_map(|(id, iface)| {
                        reached
                            .get(&iface.node())
                            .map(|&(dist, first_hop)| (dist, id, first_hop))
                    })
                    .min_by_key(|&(dist, id, _)| (dist, id));
                if let Some((_, target, first_hop)) = best {
                    let (next_hop, gateway) = first_hop.unwrap_or((target, target));
                    table.push(RoutingEntry {
                        destination: subnet_id,
                        next_hop,
                        gateway,
                    });
                }
            }
            entries.insert(source, table);
        }
        RoutingTable { entries, owners }
    }

    #[must_use]
    pub fn entries(&self, node: NodeId) -> &[RoutingEntry] {
        self.entries.get(&node).map_or(&[], Vec::as_slice)
    }

    /// The interface holding `address`, if any was assigned it.
    #[must_use]
    pub fn owner_of(&self, address: Address) -> Option<IfaceId> {
        self.owners.get(&address).copied()
    }

    #[must_use]
    pub fn route(&self, node: NodeId, destination: SubnetId) -> Option<&RoutingEntry> {
        self.entries(node)
            .iter()
            .find(|entry| entry.destination == destination)
    }

    /// Route lookup as a hard error: a missing route at agent start-up is a
    /// topology/address mismatch, fatal to the run.
    pub fn require_route(
        &self,
        allocator: &Allocator,
        node: NodeId,
        to: Address,
    ) -> Result<&RoutingEntry, SceneError> {
        allocator
            .subnet_of(to)
            .and_then(|subnet| self.route(node, subnet))
            .ok_or(SceneError::Unreachable { from: node, to })
    }
}

/// Hop distance from `source` to every reachable node, along with the
/// `(local iface, neighbour iface)` first hop used to get there. The source
/// itself is present with distance zero and no first hop.
fn breadth_first(
    topology: &Topology,
    source: NodeId,
) -> FxHashMap<NodeId, (usize, Option<(IfaceId, IfaceId)>)> {
    let mut reached = FxHashMap::default();
    reached.insert(source, (0, None));
    let mut frontier = VecDeque::from([source]);
    while let Some(node) = frontier.pop_front() {
        let (dist, first_hop) = reached[&node];
        for &out in topology.node_ifaces(node) {
            let link = topology.iface(out).link();
            for &peer in topology.link(link).ifaces() {
                let neighbour = topology.iface(peer).node();
                if neighbour == node || reached.contains_key(&neighbour) {
                    continue;
                }
                let hop = first_hop.or(Some((out, peer)));
                reached.insert(neighbour, (dist + 1, hop));
                frontier.push_back(neighbour);
            }
        }
    }
    reached
}

use serde::{Deserialize, Serialize};

use crate::{
    addressing::Address,
    error::SceneError,
    quantities::{Information, InformationRate, TimeSpan},
};

/// Most nodes a single segment may carry; one /24 subnet must be able to
/// address every interface on the segment.
pub const MAX_SEGMENT_NODES: usize = 250;

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct NodeId(usize);

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LinkId(usize);

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct IfaceId(usize);

impl NodeId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl IfaceId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
pub enum LinkKind {
    PointToPoint,
    SharedMedium,
    Wireless,
}

/// Transmission parameters of one link: serialization rate, fixed
/// propagation delay, and the per-traversal loss probability.
#[derive(PartialEq, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LinkParams {
    pub rate: InformationRate,
    pub delay: TimeSpan,
    pub loss: f64,
}

#[derive(Debug)]
pub struct Node {
    ifaces: Vec<IfaceId>,
}

#[derive(Debug)]
pub struct Link {
    kind: LinkKind,
    params: LinkParams,
    ifaces: Vec<IfaceId>,
}

impl Link {
    #[must_use]
    pub const fn kind(&self) -> LinkKind {
        self.kind
    }

    #[must_use]
    pub const fn params(&self) -> &LinkParams {
        &self.params
    }

    /// Attached interfaces in attachment order. For wireless links the
    /// access point's interface is first.
    #[must_use]
    pub fn ifaces(&self) -> &[IfaceId] {
        &self.ifaces
    }
}

#[derive(Debug)]
pub struct Iface {
    node: NodeId,
    link: LinkId,
    address: Option<Address>,
}

impl Iface {
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    #[must_use]
    pub const fn link(&self) -> LinkId {
        self.link
    }

    #[must_use]
    pub const fn address(&self) -> Option<Address> {
        self.address
    }
}

/// The simulation registry: owns every node, link, and interface.
/// Entities are created during construction and never destroyed.
#[derive(Debug, Default)]
pub struct Topology {
    nodes: Vec<Node>,
    links: Vec<Link>,
    ifaces: Vec<Iface>,
}

impl Topology {
    #[must_use]
    pub fn new() -> Topology {
        Topology::default()
    }

    pub fn create_nodes(&mut self, n: usize) -> Vec<NodeId> {
        (0..n)
            .map(|_| {
                let id = NodeId(self.nodes.len());
                self.nodes.push(Node { ifaces: Vec::new() });
                id
            })
            .collect()
    }

    /// Connects exactly two distinct nodes with a point-to-point link.
    pub fn connect_point_to_point(
        &mut self,
        a: NodeId,
        b: NodeId,
        params: LinkParams,
    ) -> Result<LinkId, SceneError> {
        if a == b {
            return Err(SceneError::ArityViolation {
                expected: "two distinct nodes",
                got: 1,
            });
        }
        Ok(self.install_link(LinkKind::PointToPoint, &[a, b], params))
    }

    /// Connects two or more nodes to a shared contention medium.
    pub fn connect_shared_medium(
        &mut self,
        nodes: &[NodeId],
        params: LinkParams,
    ) -> Result<LinkId, SceneError> {
        if nodes.len() < 2 {
            return Err(SceneError::ArityViolation {
                expected: "at least two nodes",
                got: nodes.len(),
            });
        }
        self.check_segment_size(nodes.len())?;
        Ok(self.install_link(LinkKind::SharedMedium, nodes, params))
    }

    /// Connects an access point and its stations to one wireless segment.
    /// The access point is a distinguished member of the link (its
    /// interface comes first), not a separate entity.
    pub fn connect_wireless(
        &mut self,
        ap: NodeId,
        stations: &[NodeId],
        params: LinkParams,
    ) -> Result<LinkId, SceneError> {
        if stations.is_empty() {
            return Err(SceneError::ArityViolation {
                expected: "an access point and at least one station",
                got: 1,
            });
        }
        self.check_segment_size(1 + stations.len())?;
        let mut members = Vec::with_capacity(1 + stations.len());
        members.push(ap);
        members.extend_from_slice(stations);
        Ok(self.install_link(LinkKind::Wireless, &members, params))
    }

    pub fn check_segment_size(&self, nodes: usize) -> Result<(), SceneError> {
        if nodes > MAX_SEGMENT_NODES {
            return Err(SceneError::TopologyTooLarge {
                requested: nodes,
                limit: MAX_SEGMENT_NODES,
            });
        }
        Ok(())
    }

    fn install_link(&mut self, kind: LinkKind, members: &[NodeId], params: LinkParams) -> LinkId {
        let link = LinkId(self.links.len());
        let ifaces = members.iter().map(|&node| self.attach(node, link)).collect();
        self.links.push(Link {
            kind,
            params,
            ifaces,
        });
        link
    }

    fn attach(&mut self, node: NodeId, link: LinkId) -> IfaceId {
        let id = IfaceId(self.ifaces.len());
        self.ifaces.push(Iface {
            node,
            link,
            address: None,
        });
        self.nodes[node.0].ifaces.push(id);
        id
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The id of the `index`-th created node. Node ids are dense.
    #[must_use]
    pub fn node_id(&self, index: usize) -> NodeId {
        assert!(index < self.nodes.len(), "no node at index {index}");
        NodeId(index)
    }

    #[must_use]
    pub fn iface_count(&self) -> usize {
        self.ifaces.len()
    }

    #[must_use]
    pub fn node_ifaces(&self, node: NodeId) -> &[IfaceId] {
        &self.nodes[node.0].ifaces
    }

    #[must_use]
    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.0]
    }

    #[must_use]
    pub fn iface(&self, id: IfaceId) -> &Iface {
        &self.ifaces[id.0]
    }

    pub fn ifaces(&self) -> impl Iterator<Item = (IfaceId, &Iface)> {
        self.ifaces.iter().enumerate().map(|(i, x)| (IfaceId(i), x))
    }

    /// Records the interface's address. Interfaces are write-once.
    pub(crate) fn set_address(&mut self, id: IfaceId, address: Address) {
        let iface = &mut self.ifaces[id.0];
        assert!(
            iface.address.is_none(),
            "interface {id:?} already has an address"
        );
        iface.address = Some(address);
    }

    /// Time for `size` to fully traverse `link`: serialization plus
    /// propagation delay.
    #[must_use]
    pub fn transit_delay(&self, link: LinkId, size: Information) -> TimeSpan {
        let params = &self.links[link.0].params;
        params.delay + size / params.rate
    }
}

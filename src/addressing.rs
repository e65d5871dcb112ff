use std::{fmt::Display, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    error::SceneError,
    topology::{IfaceId, Topology},
};

/// A 32-bit network address, displayed (and serialized) in dotted-quad form.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub struct Address(u32);

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

impl Address {
    #[must_use]
    pub const fn from_octets(a: u8, b: u8, c: u8, d: u8) -> Address {
        Address(u32::from_be_bytes([a, b, c, d]))
    }

    #[must_use]
    pub const fn to_bits(self) -> u32 {
        self.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d] = self.0.to_be_bytes();
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets = s
            .split('.')
            .map(|part| {
                part.parse::<u8>()
                    .map_err(|e| format!("bad octet {part:?}: {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        match octets.as_slice() {
            [a, b, c, d] => Ok(Address::from_octets(*a, *b, *c, *d)),
            _ => Err(format!("expected four octets, got {}", octets.len())),
        }
    }
}

/// A contiguous address range: `base` and a prefix length. Networks never
/// overlap; the allocator rejects intersecting requests.
#[derive(PartialEq, Eq, Clone, Copy, Serialize, Deserialize, Debug)]
pub struct Subnet {
    base: u32,
    prefix: u8,
}

impl Subnet {
    /// Builds the subnet containing `base`, normalized to its first address.
    #[must_use]
    #[allow(clippy::manual_range_contains)]
    pub const fn new(base: Address, prefix: u8) -> Subnet {
        assert!(prefix >= 1 && prefix <= 30, "prefix leaves no room for hosts");
        Subnet {
            base: base.to_bits() & Subnet::mask(prefix),
            prefix,
        }
    }

    const fn mask(prefix: u8) -> u32 {
        u32::MAX << (32 - prefix)
    }

    #[must_use]
    pub const fn first(self) -> Address {
        Address(self.base)
    }

    #[must_use]
    pub const fn last(self) -> Address {
        Address(self.base | !Subnet::mask(self.prefix))
    }

    /// Usable host addresses, excluding the network and broadcast values.
    #[must_use]
    pub const fn capacity(self) -> u32 {
        (1 << (32 - self.prefix)) - 2
    }

    #[must_use]
    pub const fn contains(self, address: Address) -> bool {
        address.to_bits() & Subnet::mask(self.prefix) == self.base
    }

    #[must_use]
    pub const fn overlaps(self, other: Subnet) -> bool {
        self.first().to_bits() <= other.last().to_bits()
            && other.first().to_bits() <= self.last().to_bits()
    }
}

impl Display for Subnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.first(), self.prefix)
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SubnetId(usize);

#[derive(Debug)]
struct SubnetState {
    subnet: Subnet,
    issued: u32,
}

/// Hands out non-overlapping subnets, and addresses within them in strictly
/// increasing order from the first usable host. Issue order is part of the
/// contract: the k-th interface assigned on a subnet holds its k-th address.
#[derive(Debug, Default)]
pub struct Allocator {
    subnets: Vec<SubnetState>,
}

impl Allocator {
    #[must_use]
    pub fn new() -> Allocator {
        Allocator::default()
    }

    /// Reserves the range `[base, base + 2^(32-prefix))`. Intersection with
    /// any previously allocated subnet is checked now, not at assignment.
    pub fn allocate(&mut self, base: Address, prefix: u8) -> Result<SubnetId, SceneError> {
        let subnet = Subnet::new(base, prefix);
        if let Some(existing) = self
            .subnets
            .iter()
            .map(|s| s.subnet)
            .find(|s| s.overlaps(subnet))
        {
            return Err(SceneError::OverlapDetected {
                requested: subnet,
                existing,
            });
        }
        let id = SubnetId(self.subnets.len());
        self.subnets.push(SubnetState { subnet, issued: 0 });
        Ok(id)
    }

    /// Issues the subnet's next host address to `iface`.
    pub fn assign(
        &mut self,
        id: SubnetId,
        topology: &mut Topology,
        iface: IfaceId,
    ) -> Result<Address, SceneError> {
        let state = &mut self.subnets[id.0];
        if state.issued == state.subnet.capacity() {
            return Err(SceneError::RangeExhausted {
                subnet: state.subnet,
            });
        }
        state.issued += 1;
        let address = Address(state.subnet.first().to_bits() + state.issued);
        topology.set_address(iface, address);
        Ok(address)
    }

    /// Assigns the subnet's next addresses to each interface in order.
    pub fn assign_all(
        &mut self,
        id: SubnetId,
        topology: &mut Topology,
        ifaces: &[IfaceId],
    ) -> Result<Vec<Address>, SceneError> {
        ifaces
            .iter()
            .map(|&iface| self.assign(id, topology, iface))
            .collect()
    }

    pub fn subnets(&self) -> impl Iterator<Item = (SubnetId, Subnet)> + '_ {
        self.subnets
            .iter()
            .enumerate()
            .map(|(i, s)| (SubnetId(i), s.subnet))
    }

    #[must_use]
    pub fn subnet_of(&self, address: Address) -> Option<SubnetId> {
        self.subnets
            .iter()
            .position(|s| s.subnet.contains(address))
            .map(SubnetId)
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;
    use pretty_assertions::assert_eq;

    use super::{Address, Allocator, Subnet};
    use crate::{
        error::SceneError,
        topology::{LinkParams, Topology},
        quantities::{megabits_per_second, milliseconds},
    };

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn address_round_trips_through_display() {
        let address = Address::from_octets(10, 1, 2, 254);
        assert_eq!(address.to_string(), "10.1.2.254");
        assert_eq!(addr("10.1.2.254"), address);
    }

    #[test]
    fn allocated_subnets_are_pairwise_disjoint() {
        let mut allocator = Allocator::new();
        for base in ["10.1.1.0", "10.1.2.0", "10.1.3.0"] {
            allocator.allocate(addr(base), 24).unwrap();
        }
        let subnets: Vec<_> = allocator.subnets().map(|(_, s)| s).collect();
        for (a, b) in subnets.iter().tuple_combinations::<(_, _)>() {
            assert!(!a.overlaps(*b), "{a} overlaps {b}");
        }
    }

    #[test]
    fn overlap_is_rejected_at_allocation_time() {
        let mut allocator = Allocator::new();
        allocator.allocate(addr("10.1.1.0"), 24).unwrap();
        assert_eq!(
            allocator.allocate(addr("10.1.1.128"), 25),
            Err(SceneError::OverlapDetected {
                requested: Subnet::new(addr("10.1.1.128"), 25),
                existing: Subnet::new(addr("10.1.1.0"), 24),
            })
        );
        // A covering supernet collides too.
        assert!(allocator.allocate(addr("10.1.0.0"), 16).is_err());
    }

    #[test]
    fn addresses_issue_in_increasing_order() {
        let mut topo = Topology::new();
        let nodes = topo.create_nodes(3);
        let link = topo
            .connect_shared_medium(
                &nodes,
                LinkParams {
                    rate: megabits_per_second(100.),
                    delay: milliseconds(1.),
                    loss: 0.,
                },
            )
            .unwrap();
        let ifaces = topo.link(link).ifaces().to_vec();
        let mut allocator = Allocator::new();
        let subnet = allocator.allocate(addr("10.1.2.0"), 24).unwrap();
        let issued = allocator.assign_all(subnet, &mut topo, &ifaces).unwrap();
        assert_eq!(
            issued,
            vec![addr("10.1.2.1"), addr("10.1.2.2"), addr("10.1.2.3")]
        );
        assert!(issued.iter().tuple_windows().all(|(a, b)| a < b));
    }

    #[test]
    fn exhausted_subnet_refuses_further_hosts() {
        let mut topo = Topology::new();
        let nodes = topo.create_nodes(4);
        let link = topo
            .connect_shared_medium(
                &nodes,
                LinkParams {
                    rate: megabits_per_second(100.),
                    delay: milliseconds(1.),
                    loss: 0.,
                },
            )
            .unwrap();
        let ifaces = topo.link(link).ifaces().to_vec();
        let mut allocator = Allocator::new();
        // A /30 has exactly two usable hosts.
        let subnet = allocator.allocate(addr("192.168.0.0"), 30).unwrap();
        allocator.assign(subnet, &mut topo, ifaces[0]).unwrap();
        allocator.assign(subnet, &mut topo, ifaces[1]).unwrap();
        assert_eq!(
            allocator.assign(subnet, &mut topo, ifaces[2]),
            Err(SceneError::RangeExhausted {
                subnet: Subnet::new(addr("192.168.0.0"), 30),
            })
        );
    }

    #[test]
    fn subnet_of_finds_the_owning_range() {
        let mut allocator = Allocator::new();
        let a = allocator.allocate(addr("10.1.1.0"), 24).unwrap();
        let b = allocator.allocate(addr("10.1.2.0"), 24).unwrap();
        assert_eq!(allocator.subnet_of(addr("10.1.2.7")), Some(b));
        assert_eq!(allocator.subnet_of(addr("10.1.1.200")), Some(a));
        assert_eq!(allocator.subnet_of(addr("10.9.9.9")), None);
    }
}

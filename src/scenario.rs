use std::{cell::RefCell, rc::Rc};

use serde::{Deserialize, Serialize};

use crate::{
    addressing::{Address, Allocator},
    apps::{EchoClient, EchoServer},
    error::SceneError,
    mobility::{GridLayout, Mobility, Rect},
    net::Stack,
    quantities::{
        megabits_per_second, microseconds, milliseconds, nanoseconds, seconds, Float, Time,
        TimeSpan,
    },
    routing::RoutingTable,
    sim::Scheduler,
    topology::{IfaceId, LinkParams, NodeId, Topology, MAX_SEGMENT_NODES},
    trace::{MemorySink, NothingSink, TraceRecord, TraceSink},
    util::{
        logging::{for_verbosity, Logger},
        rand::{ContinuousDistribution, Rng},
    },
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct SubnetSpec {
    pub base: Address,
    pub prefix: u8,
}

/// Which node in the shared-medium segment hosts the echo server, and when
/// it listens. The endpoint is an explicit index into the segment's member
/// list; index zero is the bridge node shared with the point-to-point pair.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub endpoint: usize,
    pub port: u16,
    pub start: TimeSpan,
    pub stop: TimeSpan,
}

/// Which station runs the echo client, and its traffic shape. The endpoint
/// is an explicit index into the station list.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: usize,
    pub max_packets: u64,
    pub interval: TimeSpan,
    pub payload_size: usize,
    pub start: TimeSpan,
    pub stop: TimeSpan,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MobilityConfig {
    pub grid: GridLayout,
    pub bounds: Rect,
    pub walk_speed: ContinuousDistribution<Float>,
    pub course_interval: TimeSpan,
}

/// One dumbbell scenario: a point-to-point pair whose far node bridges onto
/// a shared-medium segment, and whose near node is the access point of a
/// wireless segment of mobile stations.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScenarioConfig {
    /// Shared-medium nodes beyond the bridge node.
    pub n_shared: usize,
    /// Wireless stations, not counting the access point.
    pub n_stations: usize,
    pub seed: u64,
    pub tracing: bool,
    pub stop_time: TimeSpan,
    pub p2p: LinkParams,
    pub shared: LinkParams,
    pub wireless: LinkParams,
    pub p2p_subnet: SubnetSpec,
    pub shared_subnet: SubnetSpec,
    pub wireless_subnet: SubnetSpec,
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub mobility: MobilityConfig,
}

impl Default for ScenarioConfig {
    fn default() -> ScenarioConfig {
        ScenarioConfig {
            n_shared: 9,
            n_stations: 9,
            seed: 1,
            tracing: false,
            stop_time: seconds(10.),
            p2p: LinkParams {
                rate: megabits_per_second(5.),
                delay: milliseconds(2.),
                loss: 0.,
            },
            shared: LinkParams {
                rate: megabits_per_second(100.),
                delay: nanoseconds(6560.),
                loss: 0.,
            },
            wireless: LinkParams {
                rate: megabits_per_second(54.),
                delay: microseconds(3.),
                loss: 0.,
            },
            p2p_subnet: SubnetSpec {
                base: Address::from_octets(10, 1, 1, 0),
                prefix: 24,
            },
            shared_subnet: SubnetSpec {
                base: Address::from_octets(10, 1, 2, 0),
                prefix: 24,
            },
            wireless_subnet: SubnetSpec {
                base: Address::from_octets(10, 1, 3, 0),
                prefix: 24,
            },
            server: ServerConfig {
                endpoint: 9,
                port: 9,
                start: seconds(1.),
                stop: seconds(10.),
            },
            client: ClientConfig {
                endpoint: 8,
                max_packets: 1,
                interval: seconds(1.),
                payload_size: 1024,
                start: seconds(2.),
                stop: seconds(10.),
            },
            mobility: MobilityConfig {
                grid: GridLayout {
                    min_x: 0.,
                    min_y: 0.,
                    delta_x: 5.,
                    delta_y: 10.,
                    columns: 3,
                },
                bounds: Rect::new(-50., 50., -50., 50.),
                walk_speed: ContinuousDistribution::Uniform { min: 2., max: 4. },
                course_interval: seconds(1.),
            },
        }
    }
}

impl ScenarioConfig {
    /// Rejects impossible configurations up front, before any node or
    /// address exists.
    pub fn validate(&self) -> Result<(), SceneError> {
        let shared_members = self.n_shared + 1;
        let wireless_members = self.n_stations + 1;
        for members in [shared_members, wireless_members] {
            if members > MAX_SEGMENT_NODES {
                return Err(SceneError::TopologyTooLarge {
                    requested: members,
                    limit: MAX_SEGMENT_NODES,
                });
            }
        }
        if self.server.endpoint >= shared_members {
            return Err(SceneError::InvalidEndpoint {
                role: "server",
                index: self.server.endpoint,
                len: shared_members,
            });
        }
        if self.client.endpoint >= self.n_stations {
            return Err(SceneError::InvalidEndpoint {
                role: "client",
                index: self.client.endpoint,
                len: self.n_stations,
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ScenarioReport {
    pub events_dispatched: u64,
    pub requests_sent: u64,
    pub replies_received: u64,
    pub server_received: u64,
    pub trace: Vec<TraceRecord>,
}

/// A fully assembled scenario, ready to run to its stop time.
pub struct Scenario {
    sched: Scheduler,
    stack: Rc<Stack>,
    server: Rc<RefCell<EchoServer<Box<dyn Logger>>>>,
    client: Rc<RefCell<EchoClient<Box<dyn Logger>>>>,
    sink: Option<MemorySink>,
    stop_time: Time,
    server_iface: IfaceId,
    client_iface: IfaceId,
}

impl Scenario {
    /// Assembles topology, addressing, routing, mobility, and agents from
    /// `config`, and registers every start, stop, and motion event. Any
    /// configuration error surfaces here; a built scenario always runs.
    pub fn build(config: &ScenarioConfig, verbose: bool) -> Result<Scenario, SceneError> {
        config.validate()?;
        let mut rng = Rng::from_seed(config.seed);

        let mut topology = Topology::new();
        let pair = topology.create_nodes(2);
        let access_point = pair[0];
        let bridge = pair[1];
        let mut shared_nodes = vec![bridge];
        shared_nodes.extend(topology.create_nodes(config.n_shared));
        let stations = topology.create_nodes(config.n_stations);

        topology.connect_point_to_point(access_point, bridge, config.p2p)?;
        let shared_link = topology.connect_shared_medium(&shared_nodes, config.shared)?;
        let wireless_link = topology.connect_wireless(access_point, &stations, config.wireless)?;

        let mut allocator = Allocator::new();
        let p2p_net = allocator.allocate(config.p2p_subnet.base, config.p2p_subnet.prefix)?;
        let shared_net =
            allocator.allocate(config.shared_subnet.base, config.shared_subnet.prefix)?;
        let wireless_net =
            allocator.allocate(config.wireless_subnet.base, config.wireless_subnet.prefix)?;

        let p2p_ifaces = vec![
            topology.node_ifaces(access_point)[0],
            topology.node_ifaces(bridge)[0],
        ];
        allocator.assign_all(p2p_net, &mut topology, &p2p_ifaces)?;
        let shared_ifaces = topology.link(shared_link).ifaces().to_vec();
        allocator.assign_all(shared_net, &mut topology, &shared_ifaces)?;
        // Stations take the low wireless addresses; the access point the
        // one after them. Its interface sits first on the link.
        let wireless_ifaces = topology.link(wireless_link).ifaces().to_vec();
        allocator.assign_all(wireless_net, &mut topology, &wireless_ifaces[1..])?;
        allocator.assign(wireless_net, &mut topology, wireless_ifaces[0])?;

        let mut mobility = Mobility::new();
        mobility.place_on_grid(&stations, &config.mobility.grid);
        mobility.attach_random_walk(
            &stations,
            config.mobility.bounds,
            &config.mobility.walk_speed,
            config.mobility.course_interval,
            &mut rng,
        );
        mobility.fix_position(&[access_point]);

        let routing = RoutingTable::compute(&topology, &allocator);

        let server_node = shared_nodes[config.server.endpoint];
        let server_iface = shared_ifaces[config.server.endpoint];
        let server_address = topology
            .iface(server_iface)
            .address()
            .expect("shared segment fully addressed");
        let client_node = stations[config.client.endpoint];
        let client_iface = wireless_ifaces[1 + config.client.endpoint];

        let sink_handle = config.tracing.then(MemorySink::new);
        let sink: Box<dyn TraceSink> = match &sink_handle {
            Some(sink) => Box::new(sink.clone()),
            None => Box::new(NothingSink),
        };
        let stack = Stack::new(
            topology,
            allocator,
            routing,
            mobility,
            rng.create_child(),
            sink,
            for_verbosity(verbose, "net"),
        );

        let mut sched = Scheduler::new();
        let server = EchoServer::new(
            server_node,
            config.server.port,
            for_verbosity(verbose, "echo-server"),
        );
        EchoServer::install(&server, &stack);
        EchoServer::schedule_start(&server, &mut sched, Time::from_sim_start(config.server.start))?;
        EchoServer::schedule_stop(&server, &mut sched, Time::from_sim_start(config.server.stop))?;

        let client = EchoClient::new(
            client_node,
            server_address,
            config.server.port,
            config.client.max_packets,
            config.client.interval,
            config.client.payload_size,
            for_verbosity(verbose, "echo-client"),
        );
        EchoClient::install(&client, &stack);
        EchoClient::schedule_start(
            &client,
            &stack,
            &mut sched,
            Time::from_sim_start(config.client.start),
        )?;
        EchoClient::schedule_stop(&client, &mut sched, Time::from_sim_start(config.client.stop))?;

        let stop_time = Time::from_sim_start(config.stop_time);
        for &station in &stations {
            schedule_motion(
                &stack,
                &mut sched,
                station,
                config.mobility.course_interval,
                stop_time,
            );
        }

        Ok(Scenario {
            sched,
            stack,
            server,
            client,
            sink: sink_handle,
            stop_time,
            server_iface,
            client_iface,
        })
    }

    #[must_use]
    pub const fn stack(&self) -> &Rc<Stack> {
        &self.stack
    }

    #[must_use]
    pub const fn server_iface(&self) -> IfaceId {
        self.server_iface
    }

    #[must_use]
    pub const fn client_iface(&self) -> IfaceId {
        self.client_iface
    }

    /// Dispatches every event up to and including the stop time.
    #[must_use]
    pub fn run(mut self) -> ScenarioReport {
        let events_dispatched = self.sched.run(self.stop_time);
        ScenarioReport {
            events_dispatched,
            requests_sent: self.client.borrow().sent(),
            replies_received: self.client.borrow().received(),
            server_received: self.server.borrow().received(),
            trace: self.sink.map(|sink| sink.records()).unwrap_or_default(),
        }
    }
}

/// Periodic course-change tick for one mobile node. Each tick samples the
/// node's position (advancing its walk) and schedules the next tick until
/// the stop time.
fn schedule_motion(
    stack: &Rc<Stack>,
    sched: &mut Scheduler,
    node: NodeId,
    interval: TimeSpan,
    until: Time,
) {
    let at = sched.now() + interval;
    if at > until {
        return;
    }
    let stack = Rc::clone(stack);
    // The tick time is never behind the clock, so this cannot violate
    // causality.
    sched
        .schedule(at, move |s| {
            let position = stack.position_of(node, s.now());
            stack.log(&format!("{node:?} moved to {position:?}"));
            schedule_motion(&stack, s, node, interval, until);
        })
        .unwrap();
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{Scenario, ScenarioConfig};
    use crate::{
        addressing::Address,
        error::SceneError,
        quantities::{seconds, Time},
        topology::MAX_SEGMENT_NODES,
        trace::Direction,
    };

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn default_scenario_round_trips_one_echo() {
        let mut config = ScenarioConfig::default();
        config.tracing = true;
        let scenario = Scenario::build(&config, false).unwrap();
        let client_iface = scenario.client_iface();
        let report = scenario.run();

        assert_eq!(report.requests_sent, 1);
        assert_eq!(report.server_received, 1);
        assert_eq!(report.replies_received, 1);

        let sends: Vec<_> = report
            .trace
            .iter()
            .filter(|r| r.iface == client_iface && r.direction == Direction::Send)
            .collect();
        let receives: Vec<_> = report
            .trace
            .iter()
            .filter(|r| r.iface == client_iface && r.direction == Direction::Receive)
            .collect();
        assert_eq!(sends.len(), 1);
        assert_eq!(receives.len(), 1);
        assert_eq!(sends[0].time, Time::from_sim_start(seconds(2.)));
        assert!(receives[0].time > sends[0].time);
        assert!(receives[0].time <= Time::from_sim_start(seconds(10.)));
        assert_eq!(receives[0].payload, sends[0].payload);
        assert_eq!(sends[0].payload.len(), 1024);
    }

    #[test]
    fn addresses_follow_the_segment_layout() {
        let config = ScenarioConfig::default();
        let scenario = Scenario::build(&config, false).unwrap();
        let topology = scenario.stack().topology();

        let ap_ifaces = topology.node_ifaces(topology.node_id(0));
        assert_eq!(
            topology.iface(ap_ifaces[0]).address(),
            Some(addr("10.1.1.1"))
        );
        // AP wireless address comes after all nine stations.
        assert_eq!(
            topology.iface(ap_ifaces[1]).address(),
            Some(addr("10.1.3.10"))
        );

        let bridge_ifaces = topology.node_ifaces(topology.node_id(1));
        assert_eq!(
            topology.iface(bridge_ifaces[0]).address(),
            Some(addr("10.1.1.2"))
        );
        assert_eq!(
            topology.iface(bridge_ifaces[1]).address(),
            Some(addr("10.1.2.1"))
        );

        assert_eq!(
            topology.iface(scenario.server_iface()).address(),
            Some(addr("10.1.2.10"))
        );
        assert_eq!(
            topology.iface(scenario.client_iface()).address(),
            Some(addr("10.1.3.9"))
        );
    }

    #[test]
    fn request_sent_at_the_deadline_gets_no_reply() {
        let mut config = ScenarioConfig::default();
        config.tracing = true;
        config.client.start = seconds(9.9999);
        let scenario = Scenario::build(&config, false).unwrap();
        let client_iface = scenario.client_iface();
        let report = scenario.run();

        assert_eq!(report.requests_sent, 1);
        assert_eq!(report.server_received, 0);
        assert_eq!(report.replies_received, 0);
        assert!(report
            .trace
            .iter()
            .any(|r| r.iface == client_iface && r.direction == Direction::Send));
        assert!(!report
            .trace
            .iter()
            .any(|r| r.iface == client_iface && r.direction == Direction::Receive));
    }

    #[test]
    fn oversized_wireless_segment_is_rejected() {
        let mut config = ScenarioConfig::default();
        config.n_stations = MAX_SEGMENT_NODES;
        let Err(err) = Scenario::build(&config, false) else {
            panic!("oversized segment was accepted")
        };
        assert_eq!(
            err,
            SceneError::TopologyTooLarge {
                requested: MAX_SEGMENT_NODES + 1,
                limit: MAX_SEGMENT_NODES,
            }
        );
    }

    #[test]
    fn out_of_range_endpoints_are_rejected() {
        let mut config = ScenarioConfig::default();
        config.client.endpoint = config.n_stations;
        let Err(err) = Scenario::build(&config, false) else {
            panic!("client endpoint out of range was accepted")
        };
        assert_eq!(
            err,
            SceneError::InvalidEndpoint {
                role: "client",
                index: 9,
                len: 9,
            }
        );

        let mut config = ScenarioConfig::default();
        config.server.endpoint = config.n_shared + 1;
        let Err(err) = Scenario::build(&config, false) else {
            panic!("server endpoint out of range was accepted")
        };
        assert_eq!(
            err,
            SceneError::InvalidEndpoint {
                role: "server",
                index: 10,
                len: 10,
            }
        );
    }

    #[test]
    fn runs_are_deterministic_for_a_seed() {
        let mut config = ScenarioConfig::default();
        config.tracing = true;
        config.wireless.loss = 0.3;
        config.client.max_packets = 4;
        config.client.interval = seconds(0.5);

        let first = Scenario::build(&config, false).unwrap().run();
        let second = Scenario::build(&config, false).unwrap().run();

        assert_eq!(first.events_dispatched, second.events_dispatched);
        assert_eq!(first.replies_received, second.replies_received);
        assert_eq!(first.trace, second.trace);
    }

    #[test]
    fn stations_drift_from_their_grid_slots() {
        let config = ScenarioConfig::default();
        let scenario = Scenario::build(&config, false).unwrap();
        let stack = scenario.stack().clone();
        assert_eq!(stack.topology().node_count(), 2 + config.n_shared + config.n_stations);
        // Stations are created after the p2p pair and the extra
        // shared-medium nodes.
        let first_station = stack.topology().node_id(2 + config.n_shared);
        let bridge = stack.topology().node_id(1);
        let start = stack.position_of(first_station, Time::SIM_START);
        assert_eq!((start.x, start.y), (0., 0.));
        let _ = scenario.run();
        let later = stack.position_of(first_station, Time::from_sim_start(seconds(10.)));
        assert!(start != later);
        // Walks stay inside their bounding box.
        assert!((-50. ..=50.).contains(&later.x) && (-50. ..=50.).contains(&later.y));
        // Nodes without a motion model stay put.
        assert_eq!(
            stack.position_of(bridge, Time::from_sim_start(seconds(10.))),
            stack.position_of(bridge, Time::SIM_START)
        );
    }
}

use std::{cell::RefCell, rc::Rc};

use rustc_hash::FxHashMap;

use crate::{
    addressing::{Address, Allocator},
    error::SceneError,
    mobility::{Mobility, Position},
    quantities::{bytes, Information, Time},
    routing::RoutingTable,
    sim::Scheduler,
    topology::{IfaceId, NodeId, Topology},
    trace::{Direction, TraceSink},
    util::{logging::Logger, rand::Rng},
};

/// Link-level and network-level headers charged to every frame.
pub const FRAME_OVERHEAD: Information = bytes(28);

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Frame {
    pub src: Address,
    pub dst: Address,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u64,
    pub payload: Vec<u8>,
}

impl Frame {
    #[must_use]
    pub fn size(&self) -> Information {
        bytes(self.payload.len() as u64) + FRAME_OVERHEAD
    }
}

/// An application endpoint bound to a `(node, port)` pair.
pub trait Handler {
    fn deliver(&mut self, stack: &Rc<Stack>, sched: &mut Scheduler, iface: IfaceId, frame: Frame);
}

/// The installed network stack: the finished topology with its addressing,
/// routing, and mobility state, plus the port bindings that deliver frames
/// to agents. Immutable during the run except through clock-dispatched
/// actions; every mutable part sits behind a `RefCell`, and agents hold the
/// stack through a shared `Rc`.
pub struct Stack {
    topology: Topology,
    allocator: Allocator,
    routing: RoutingTable,
    mobility: RefCell<Mobility>,
    handlers: RefCell<FxHashMap<(NodeId, u16), Rc<RefCell<dyn Handler>>>>,
    rng: RefCell<Rng>,
    sink: RefCell<Box<dyn TraceSink>>,
    logger: RefCell<Box<dyn Logger>>,
}

impl Stack {
    #[must_use]
    pub fn new(
        topology: Topology,
        allocator: Allocator,
        routing: RoutingTable,
        mobility: Mobility,
        rng: Rng,
        sink: Box<dyn TraceSink>,
        logger: Box<dyn Logger>,
    ) -> Rc<Stack> {
        Rc::new(Stack {
            topology,
            allocator,
            routing,
            mobility: RefCell::new(mobility),
            handlers: RefCell::new(FxHashMap::default()),
            rng: RefCell::new(rng),
            sink: RefCell::new(sink),
            logger: RefCell::new(logger),
        })
    }

    #[must_use]
    pub const fn topology(&self) -> &Topology {
        &self.topology
    }

    #[must_use]
    pub const fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    #[must_use]
    pub const fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    pub fn position_of(&self, node: NodeId, time: Time) -> Position {
        self.mobility.borrow_mut().position_of(node, time)
    }

    pub fn log(&self, msg: &str) {
        log!(self.logger.borrow_mut(), "{msg}");
    }

    /// Registers `handler` to receive frames addressed to `(node, port)`.
    pub fn bind(&self, node: NodeId, port: u16, handler: Rc<RefCell<dyn Handler>>) {
        let previous = self.handlers.borrow_mut().insert((node, port), handler);
        assert!(previous.is_none(), "port {port} already bound on {node:?}");
    }

    /// The source address a frame from `node` toward `target` should carry:
    /// the address of the interface the route leaves through.
    pub fn source_address(&self, node: NodeId, target: Address) -> Result<Address, SceneError> {
        let entry = self.routing.require_route(&self.allocator, node, target)?;
        Ok(self
            .topology
            .iface(entry.next_hop)
            .address()
            .expect("routed interface has an address"))
    }

    /// Originates `frame` at `from`, recording the send with the trace sink
    /// and scheduling its first link traversal.
    pub fn send(
        self: &Rc<Self>,
        sched: &mut Scheduler,
        from: NodeId,
        frame: Frame,
    ) -> Result<(), SceneError> {
        let owner = self
            .routing
            .owner_of(frame.dst)
            .ok_or(SceneError::UnknownTarget { address: frame.dst })?;
        if self.topology.iface(owner).node() == from {
            // Local delivery, no link transit.
            self.sink
                .borrow_mut()
                .record(sched.now(), owner, Direction::Send, &frame.payload);
            let stack = Rc::clone(self);
            sched.schedule(sched.now(), move |s| stack.arrive(s, owner, frame))?;
            return Ok(());
        }
        let entry = self.routing.require_route(&self.allocator, from, frame.dst)?;
        self.sink
            .borrow_mut()
            .record(sched.now(), entry.next_hop, Direction::Send, &frame.payload);
        self.forward(sched, from, frame)
    }

    /// Sends `frame` out of `at` toward its destination: one link traversal
    /// with the link's delay and loss applied, scheduled on the clock.
    fn forward(
        self: &Rc<Self>,
        sched: &mut Scheduler,
        at: NodeId,
        frame: Frame,
    ) -> Result<(), SceneError> {
        let owner = self
            .routing
            .owner_of(frame.dst)
            .ok_or(SceneError::UnknownTarget { address: frame.dst })?;
        let entry = *self.routing.require_route(&self.allocator, at, frame.dst)?;
        let link = self.topology.iface(entry.next_hop).link();
        let receiver = if self.topology.iface(owner).link() == link {
            owner
        } else {
            entry.gateway
        };
        let params = self.topology.link(link).params();
        if self.rng.borrow_mut().chance(params.loss) {
            log!(
                self.logger.borrow_mut(),
                "frame {} for {} lost on {link:?}",
                frame.seq,
                frame.dst
            );
            return Ok(());
        }
        let at_time = sched.now() + self.topology.transit_delay(link, frame.size());
        let stack = Rc::clone(self);
        sched.schedule(at_time, move |s| stack.arrive(s, receiver, frame))?;
        Ok(())
    }

    /// A frame has fully traversed one link. Either this interface holds the
    /// destination address, in which case the frame is recorded and handed
    /// to the bound agent, or the owning node relays it onward.
    fn arrive(self: &Rc<Self>, sched: &mut Scheduler, iface: IfaceId, frame: Frame) {
        let node = self.topology.iface(iface).node();
        if self.topology.iface(iface).address() == Some(frame.dst) {
            self.sink
                .borrow_mut()
                .record(sched.now(), iface, Direction::Receive, &frame.payload);
            let handler = self
                .handlers
                .borrow()
                .get(&(node, frame.dst_port))
                .map(Rc::clone);
            if let Some(handler) = handler {
                handler.borrow_mut().deliver(self, sched, iface, frame);
            } else {
                log!(
                    self.logger.borrow_mut(),
                    "no listener on {}:{}",
                    frame.dst,
                    frame.dst_port
                );
            }
        } else if let Err(e) = self.forward(sched, node, frame) {
            log!(self.logger.borrow_mut(), "relay at {node:?} dropped frame: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use pretty_assertions::assert_eq;

    use super::{Frame, Handler, Stack};
    use crate::{
        addressing::{Address, Allocator},
        mobility::Mobility,
        quantities::{bytes, megabits_per_second, milliseconds, seconds, Time},
        routing::RoutingTable,
        sim::Scheduler,
        topology::{IfaceId, LinkParams, Topology},
        trace::{Direction, MemorySink},
        util::{logging::NothingLogger, rand::Rng},
    };

    struct Recorder {
        delivered: Vec<(Time, Frame)>,
    }

    impl Handler for Recorder {
        fn deliver(&mut self, _: &Rc<Stack>, sched: &mut Scheduler, _: IfaceId, frame: Frame) {
            self.delivered.push((sched.now(), frame));
        }
    }

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn p2p_stack(loss: f64) -> (Rc<Stack>, MemorySink) {
        let mut topo = Topology::new();
        let nodes = topo.create_nodes(2);
        let link = topo
            .connect_point_to_point(
                nodes[0],
                nodes[1],
                LinkParams {
                    // 1000-byte payloads serialize in roughly a millisecond.
                    rate: megabits_per_second(8.),
                    delay: milliseconds(2.),
                    loss,
                },
            )
            .unwrap();
        let ifaces = topo.link(link).ifaces().to_vec();
        let mut allocator = Allocator::new();
        let subnet = allocator.allocate(addr("10.1.1.0"), 24).unwrap();
        allocator.assign_all(subnet, &mut topo, &ifaces).unwrap();
        let routing = RoutingTable::compute(&topo, &allocator);
        let sink = MemorySink::new();
        let stack = Stack::new(
            topo,
            allocator,
            routing,
            Mobility::new(),
            Rng::from_seed(1),
            Box::new(sink.clone()),
            Box::new(NothingLogger::new()),
        );
        (stack, sink)
    }

    fn frame(payload: &[u8]) -> Frame {
        Frame {
            src: addr("10.1.1.1"),
            dst: addr("10.1.1.2"),
            src_port: 49153,
            dst_port: 9,
            seq: 0,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn frame_arrives_after_transit_delay() {
        let (stack, sink) = p2p_stack(0.);
        let recorder = Rc::new(RefCell::new(Recorder {
            delivered: Vec::new(),
        }));
        let receiver = stack.topology().node_id(1);
        stack.bind(receiver, 9, recorder.clone());

        let mut sched = Scheduler::new();
        let sender = stack.topology().node_id(0);
        // 972 payload bytes + 28 overhead = 1000 bytes on the wire.
        stack.send(&mut sched, sender, frame(&[7u8; 972])).unwrap();
        sched.run(Time::from_sim_start(seconds(10.)));

        let delivered = &recorder.borrow().delivered;
        assert_eq!(delivered.len(), 1);
        let (at, received) = &delivered[0];
        let expected = Time::from_sim_start(milliseconds(2.) + bytes(1000) / megabits_per_second(8.));
        assert_eq!(*at, expected);
        assert_eq!(received.payload, vec![7u8; 972]);

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].direction, Direction::Send);
        assert_eq!(records[1].direction, Direction::Receive);
    }

    #[test]
    fn lossy_link_drops_the_frame() {
        let (stack, sink) = p2p_stack(1.);
        let recorder = Rc::new(RefCell::new(Recorder {
            delivered: Vec::new(),
        }));
        let receiver = stack.topology().node_id(1);
        stack.bind(receiver, 9, recorder.clone());

        let mut sched = Scheduler::new();
        let sender = stack.topology().node_id(0);
        stack.send(&mut sched, sender, frame(b"doomed")).unwrap();
        sched.run(Time::from_sim_start(seconds(10.)));

        assert_eq!(recorder.borrow().delivered.len(), 0);
        // The send was still observable; only the receive is missing.
        let directions: Vec<_> = sink.records().iter().map(|r| r.direction).collect();
        assert_eq!(directions, vec![Direction::Send]);
    }

    #[test]
    fn unknown_destination_is_rejected() {
        let (stack, _) = p2p_stack(0.);
        let mut sched = Scheduler::new();
        let sender = stack.topology().node_id(0);
        let mut unknown = frame(b"x");
        unknown.dst = addr("10.9.9.9");
        assert!(stack.send(&mut sched, sender, unknown).is_err());
    }

    #[test]
    fn unbound_port_drops_silently() {
        let (stack, sink) = p2p_stack(0.);
        let mut sched = Scheduler::new();
        let sender = stack.topology().node_id(0);
        stack.send(&mut sched, sender, frame(b"nobody home")).unwrap();
        sched.run(Time::from_sim_start(seconds(10.)));
        // Arrival is traced even though no agent consumed it.
        assert_eq!(sink.records().len(), 2);
    }
}

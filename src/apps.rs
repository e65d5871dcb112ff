use std::{cell::RefCell, rc::Rc};

use crate::{
    addressing::Address,
    error::SceneError,
    net::{Frame, Handler, Stack},
    quantities::{Time, TimeSpan},
    sim::{EventHandle, Scheduler},
    topology::{IfaceId, NodeId},
    util::logging::Logger,
};

/// Source port echo clients bind to.
pub const CLIENT_PORT: u16 = 49153;

/// Byte written into every generated payload.
const FILL: u8 = 0x55;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum AgentState {
    Unstarted,
    Running,
    Stopped,
}

/// Listens on a port and echoes every frame back to its sender, ports
/// swapped, payload untouched.
pub struct EchoServer<L> {
    node: NodeId,
    port: u16,
    state: AgentState,
    received: u64,
    logger: L,
}

impl<L: Logger + 'static> EchoServer<L> {
    pub fn new(node: NodeId, port: u16, logger: L) -> Rc<RefCell<EchoServer<L>>> {
        Rc::new(RefCell::new(EchoServer {
            node,
            port,
            state: AgentState::Unstarted,
            received: 0,
            logger,
        }))
    }

    pub fn install(server: &Rc<RefCell<Self>>, stack: &Stack) {
        let (node, port) = {
            let server = server.borrow();
            (server.node, server.port)
        };
        stack.bind(node, port, server.clone());
    }

    pub fn schedule_start(
        server: &Rc<RefCell<Self>>,
        sched: &mut Scheduler,
        time: Time,
    ) -> Result<EventHandle, SceneError> {
        let server = Rc::clone(server);
        sched.schedule(time, move |s| {
            let mut server = server.borrow_mut();
            server.state = AgentState::Running;
            log!(server.logger, "listening on port {} at {}", server.port, s.now());
        })
    }

    pub fn schedule_stop(
        server: &Rc<RefCell<Self>>,
        sched: &mut Scheduler,
        time: Time,
    ) -> Result<EventHandle, SceneError> {
        let server = Rc::clone(server);
        sched.schedule(time, move |_| {
            server.borrow_mut().state = AgentState::Stopped;
        })
    }

    #[must_use]
    pub const fn received(&self) -> u64 {
        self.received
    }

    #[must_use]
    pub const fn state(&self) -> AgentState {
        self.state
    }
}

impl<L: Logger + 'static> Handler for EchoServer<L> {
    fn deliver(&mut self, stack: &Rc<Stack>, sched: &mut Scheduler, _: IfaceId, frame: Frame) {
        if self.state != AgentState::Running {
            log!(self.logger, "ignoring frame {} while {:?}", frame.seq, self.state);
            return;
        }
        self.received += 1;
        log!(
            self.logger,
            "echoing {} bytes back to {}:{}",
            frame.payload.len(),
            frame.src,
            frame.src_port
        );
        let reply = Frame {
            src: frame.dst,
            dst: frame.src,
            src_port: self.port,
            dst_port: frame.src_port,
            seq: frame.seq,
            payload: frame.payload,
        };
        if let Err(e) = stack.send(sched, self.node, reply) {
            log!(self.logger, "echo reply dropped: {e}");
        }
    }
}

/// Sends fixed-size frames to a server endpoint at a fixed interval and
/// counts the echoed replies.
pub struct EchoClient<L> {
    node: NodeId,
    target: Address,
    target_port: u16,
    max_packets: u64,
    interval: TimeSpan,
    payload_size: usize,
    state: AgentState,
    sent: u64,
    received: u64,
    logger: L,
}

impl<L: Logger + 'static> EchoClient<L> {
    pub fn new(
        node: NodeId,
        target: Address,
        target_port: u16,
        max_packets: u64,
        interval: TimeSpan,
        payload_size: usize,
        logger: L,
    ) -> Rc<RefCell<EchoClient<L>>> {
        Rc::new(RefCell::new(EchoClient {
            node,
            target,
            target_port,
            max_packets,
            interval,
            payload_size,
            state: AgentState::Unstarted,
            sent: 0,
            received: 0,
            logger,
        }))
    }

    pub fn install(client: &Rc<RefCell<Self>>, stack: &Stack) {
        let node = client.borrow().node;
        stack.bind(node, CLIENT_PORT, client.clone());
    }

    /// Registers the start event. The target must already be resolvable:
    /// an unknown or unreachable server address fails here, before the
    /// clock ever runs.
    pub fn schedule_start(
        client: &Rc<RefCell<Self>>,
        stack: &Rc<Stack>,
        sched: &mut Scheduler,
        time: Time,
    ) -> Result<EventHandle, SceneError> {
        {
            let client = client.borrow();
            stack
                .routing()
                .owner_of(client.target)
                .ok_or(SceneError::UnknownTarget {
                    address: client.target,
                })?;
            stack
                .routing()
                .require_route(stack.allocator(), client.node, client.target)?;
        }
        let client = Rc::clone(client);
        let stack = Rc::clone(stack);
        sched.schedule(time, move |s| {
            {
                let mut client = client.borrow_mut();
                client.state = AgentState::Running;
                log!(client.logger, "starting toward {} at {}", client.target, s.now());
            }
            Self::send_next(&client, &stack, s);
        })
    }

    pub fn schedule_stop(
        client: &Rc<RefCell<Self>>,
        sched: &mut Scheduler,
        time: Time,
    ) -> Result<EventHandle, SceneError> {
        let client = Rc::clone(client);
        sched.schedule(time, move |_| {
            client.borrow_mut().state = AgentState::Stopped;
        })
    }

    fn send_next(client: &Rc<RefCell<Self>>, stack: &Rc<Stack>, sched: &mut Scheduler) {
        let (node, frame) = {
            let mut me = client.borrow_mut();
            if me.state != AgentState::Running || me.sent >= me.max_packets {
                return;
            }
            let src = match stack.source_address(me.node, me.target) {
                Ok(src) => src,
                Err(e) => {
                    log!(me.logger, "send aborted: {e}");
                    return;
                }
            };
            let seq = me.sent;
            me.sent += 1;
            log!(
                me.logger,
                "sending frame {seq} of {} bytes to {}:{}",
                me.payload_size,
                me.target,
                me.target_port
            );
            let frame = Frame {
                src,
                dst: me.target,
                src_port: CLIENT_PORT,
                dst_port: me.target_port,
                seq,
                payload: vec![FILL; me.payload_size],
            };
            (me.node, frame)
        };
        if let Err(e) = stack.send(sched, node, frame) {
            log!(client.borrow_mut().logger, "send failed: {e}");
        }
        let more = {
            let me = client.borrow();
            me.sent < me.max_packets
        };
        if more {
            let interval = client.borrow().interval;
            let next = Rc::clone(client);
            let next_stack = Rc::clone(stack);
            // Inside an action the clock only moves forward, so this
            // cannot violate causality.
            sched
                .schedule(sched.now() + interval, move |s| {
                    Self::send_next(&next, &next_stack, s);
                })
                .unwrap();
        }
    }

    #[must_use]
    pub const fn sent(&self) -> u64 {
        self.sent
    }

    #[must_use]
    pub const fn received(&self) -> u64 {
        self.received
    }

    #[must_use]
    pub const fn state(&self) -> AgentState {
        self.state
    }
}

impl<L: Logger + 'static> Handler for EchoClient<L> {
    fn deliver(&mut self, _: &Rc<Stack>, sched: &mut Scheduler, _: IfaceId, frame: Frame) {
        if self.state != AgentState::Running {
            log!(self.logger, "ignoring reply {} while {:?}", frame.seq, self.state);
            return;
        }
        self.received += 1;
        log!(
            self.logger,
            "reply {} of {} bytes from {} at {}",
            frame.seq,
            frame.payload.len(),
            frame.src,
            sched.now()
        );
    }
}

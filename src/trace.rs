use std::{cell::RefCell, rc::Rc};

use crate::{quantities::Time, topology::IfaceId};

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Direction {
    Send,
    Receive,
}

#[derive(PartialEq, Clone, Debug)]
pub struct TraceRecord {
    pub time: Time,
    pub iface: IfaceId,
    pub direction: Direction,
    pub payload: Vec<u8>,
}

/// Frame-level observability collaborator. Absence of a sink must not
/// change simulation outcomes, only what can be inspected afterwards.
pub trait TraceSink {
    fn record(&mut self, time: Time, iface: IfaceId, direction: Direction, payload: &[u8]);
}

pub struct NothingSink;

impl TraceSink for NothingSink {
    fn record(&mut self, _: Time, _: IfaceId, _: Direction, _: &[u8]) {}
}

/// Collects records in memory; cloned handles share the same buffer, so a
/// test can keep one and hand the other to the scenario.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Rc<RefCell<Vec<TraceRecord>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> MemorySink {
        MemorySink::default()
    }

    #[must_use]
    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.borrow().clone()
    }
}

impl TraceSink for MemorySink {
    fn record(&mut self, time: Time, iface: IfaceId, direction: Direction, payload: &[u8]) {
        self.records.borrow_mut().push(TraceRecord {
            time,
            iface,
            direction,
            payload: payload.to_vec(),
        });
    }
}

use thiserror::Error;

use crate::{
    addressing::{Address, Subnet},
    quantities::Time,
    topology::NodeId,
};

/// Construction-time and scheduling-time faults. All are fatal to the run:
/// each one names the invariant that was violated, and none is retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("subnet {subnet} has no remaining host addresses")]
    RangeExhausted { subnet: Subnet },

    #[error("requested subnet {requested} overlaps already-allocated {existing}")]
    OverlapDetected { requested: Subnet, existing: Subnet },

    #[error("link accepts {expected} but {got} were given")]
    ArityViolation {
        expected: &'static str,
        got: usize,
    },

    #[error("segment of {requested} nodes exceeds the per-segment limit of {limit}")]
    TopologyTooLarge { requested: usize, limit: usize },

    #[error("no route from {from:?} to {to}")]
    Unreachable { from: NodeId, to: Address },

    #[error("cannot schedule at {requested}, clock is already at {now}")]
    CausalityViolation { now: Time, requested: Time },

    #[error("target {address} is not assigned to any interface")]
    UnknownTarget { address: Address },

    #[error("no {role} at index {index}, segment has {len} candidates")]
    InvalidEndpoint {
        role: &'static str,
        index: usize,
        len: usize,
    },
}

use std::{cmp::Reverse, hash::BuildHasherDefault};

use ordered_float::NotNan;
use priority_queue::PriorityQueue;
use rustc_hash::{FxHashMap, FxHasher};

use crate::{
    error::SceneError,
    quantities::{seconds, Float, Time},
    util::logging::{Logger, NothingLogger},
};

pub type Action = Box<dyn FnOnce(&mut Scheduler)>;

/// Identifies a still-pending event. Handles are never reused, so a stale
/// handle cancels nothing.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub struct EventHandle(u64);

/// The execution kernel: a single global queue of timestamped actions,
/// dispatched one at a time in `(timestamp, schedule order)` order.
pub struct Scheduler {
    now: Time,
    next_seq: u64,
    queue: PriorityQueue<EventHandle, Reverse<(NotNan<Float>, u64)>, BuildHasherDefault<FxHasher>>,
    actions: FxHashMap<EventHandle, Action>,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Scheduler {
        Scheduler {
            now: Time::SIM_START,
            next_seq: 0,
            queue: PriorityQueue::with_default_hasher(),
            actions: FxHashMap::default(),
        }
    }

    #[must_use]
    pub const fn now(&self) -> Time {
        self.now
    }

    /// Enqueues `action` to run at `time`. Events sharing a timestamp are
    /// dispatched in the order they were scheduled.
    pub fn schedule(
        &mut self,
        time: Time,
        action: impl FnOnce(&mut Scheduler) + 'static,
    ) -> Result<EventHandle, SceneError> {
        if time < self.now {
            return Err(SceneError::CausalityViolation {
                now: self.now,
                requested: time,
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        let handle = EventHandle(seq);
        self.queue
            .push(handle, Reverse((NotNan::new(time.seconds()).unwrap(), seq)));
        self.actions.insert(handle, Box::new(action));
        Ok(handle)
    }

    /// Removes a pending event. Cancelling an already-dispatched or
    /// already-cancelled handle is a no-op.
    pub fn cancel(&mut self, handle: EventHandle) {
        self.queue.remove(&handle);
        self.actions.remove(&handle);
    }

    #[must_use]
    pub fn next_time(&self) -> Option<Time> {
        self.queue
            .peek()
            .map(|(_, Reverse((t, _)))| Time::from_sim_start(seconds(t.into_inner())))
    }

    /// Dispatches events until the queue is empty or the next event lies
    /// strictly beyond `stop_time`; such events are silently dropped.
    /// Returns the number of events dispatched by this call.
    pub fn run(&mut self, stop_time: Time) -> u64 {
        self.run_logged(stop_time, NothingLogger::new())
    }

    /// As `run`, logging each dispatch time.
    pub fn run_logged<L: Logger>(&mut self, stop_time: Time, mut logger: L) -> u64 {
        let mut count = 0;
        while let Some(time) = self.next_time() {
            if time > stop_time {
                break;
            }
            log!(logger, "time = {time}");
            let (handle, _) = self.queue.pop().unwrap();
            let action = self.actions.remove(&handle).unwrap();
            self.now = time;
            count += 1;
            action(self);
        }
        count
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

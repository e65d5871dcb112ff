use std::{
    fmt::Display,
    ops::{Add, Sub},
};

use serde::{Deserialize, Serialize};

use super::{Float, TimeSpan};

/// An absolute simulated timestamp, measured from the start of the run.
#[derive(PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Serialize, Deserialize, Debug)]
pub struct Time(TimeSpan);

impl Time {
    pub const SIM_START: Time = Time(TimeSpan::ZERO);

    #[must_use]
    pub fn from_sim_start(t: TimeSpan) -> Time {
        Time::SIM_START + t
    }

    #[must_use]
    pub const fn seconds(self) -> Float {
        self.0.seconds()
    }
}

impl Sub<Time> for Time {
    type Output = TimeSpan;

    fn sub(self, other: Time) -> Self::Output {
        self.0 - other.0
    }
}

impl Add<TimeSpan> for Time {
    type Output = Time;

    fn add(self, other: TimeSpan) -> Self::Output {
        Time(self.0 + other)
    }
}

impl Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}t", self.0)
    }
}

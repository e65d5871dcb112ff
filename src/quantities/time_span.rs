use std::{
    fmt::Display,
    ops::{Add, Sub},
};

use format_num::format_num;
use serde::{Deserialize, Serialize};

use super::Float;

/// A signed duration in simulated seconds.
#[derive(PartialEq, Clone, Copy, Serialize, Deserialize, Debug)]
pub struct TimeSpan(Float);

impl Eq for TimeSpan {}

impl PartialOrd for TimeSpan {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeSpan {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl TimeSpan {
    pub const ZERO: TimeSpan = TimeSpan(0.);

    #[must_use]
    pub const fn seconds(self) -> Float {
        self.0
    }
}

impl Display for TimeSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", format_num!(".3s", self.0))
    }
}

#[must_use]
pub const fn seconds(value: Float) -> TimeSpan {
    TimeSpan(value)
}

#[must_use]
pub fn milliseconds(value: Float) -> TimeSpan {
    seconds(value / 1000.)
}

#[must_use]
pub fn microseconds(value: Float) -> TimeSpan {
    seconds(value / 1_000_000.)
}

#[must_use]
pub fn nanoseconds(value: Float) -> TimeSpan {
    seconds(value / 1_000_000_000.)
}

impl Add for TimeSpan {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        TimeSpan(self.0 + rhs.0)
    }
}

impl Sub for TimeSpan {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        TimeSpan(self.0 - rhs.0)
    }
}

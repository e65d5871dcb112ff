use std::fmt::Display;

use format_num::format_num;
use serde::{Deserialize, Serialize};

use super::Float;

#[derive(PartialEq, PartialOrd, Clone, Copy, Serialize, Deserialize, Debug)]
pub struct InformationRate(Float);

impl InformationRate {
    #[must_use]
    pub const fn bits_per_second(self) -> Float {
        self.0
    }
}

#[must_use]
pub const fn bits_per_second(r: Float) -> InformationRate {
    InformationRate(r)
}

#[must_use]
pub const fn megabits_per_second(r: Float) -> InformationRate {
    InformationRate(r * 1_000_000.)
}

impl Display for InformationRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}bps", format_num!(".3s", self.0))
    }
}

use std::ops::Add;

use serde::{Deserialize, Serialize};

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Serialize, Deserialize, Debug)]
pub struct Information(u64);

impl Information {
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.bytes() * 8
    }

    #[must_use]
    pub const fn bytes(self) -> u64 {
        self.0
    }
}

#[must_use]
pub const fn bytes(value: u64) -> Information {
    Information(value)
}

impl Add<Information> for Information {
    type Output = Information;

    fn add(self, rhs: Information) -> Self::Output {
        Information(self.0 + rhs.0)
    }
}

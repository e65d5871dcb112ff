use std::ops::Div;

pub type Float = f64;

pub mod information;
pub mod information_rate;
pub mod time;
pub mod time_span;

pub use information::*;
pub use information_rate::*;
pub use time::*;
pub use time_span::*;

impl Div<InformationRate> for Information {
    type Output = TimeSpan;

    fn div(self, rhs: InformationRate) -> Self::Output {
        seconds(self.bits() as Float / rhs.bits_per_second())
    }
}

impl Div<TimeSpan> for Information {
    type Output = InformationRate;

    fn div(self, rhs: TimeSpan) -> Self::Output {
        bits_per_second(self.bits() as Float / rhs.seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::{bytes, megabits_per_second, milliseconds};

    #[test]
    fn serialization_delay() {
        // 1000 bytes over 8 Mbps take a millisecond on the wire.
        let delay = bytes(1000) / megabits_per_second(8.);
        assert_eq!(delay, milliseconds(1.));
    }
}

//! Rolling average with carried remainder.
//!
//! Each update weights the previous average by `2^SHIFT - 1` and the new
//! sample by one, then divides by `2^SHIFT` with a shift. The bits the shift
//! drops are kept and added back on the next update, so truncation never
//! biases the result: a constant input converges to exactly that input.

/// Filter used for the cell taps and panel/fuse baselines (31/32 decay).
pub type ChannelAverage = RollingAverage<5>;

/// Filter used for the die temperature (3/4 decay).
pub type TemperatureAverage = RollingAverage<2>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RollingAverage<const SHIFT: u32> {
    average: u16,
    dropped: u16,
}

impl<const SHIFT: u32> RollingAverage<SHIFT> {
    const MASK: u32 = (1 << SHIFT) - 1;

    pub const fn new() -> Self {
        Self::seeded(0)
    }

    /// Starts from `value` instead of zero to shorten settling.
    pub const fn seeded(value: u16) -> Self {
        Self {
            average: value,
            dropped: 0,
        }
    }

    /// Folds `sample` into the average and returns the new average.
    pub fn update(&mut self, sample: u16) -> u16 {
        let acc = Self::MASK * u32::from(self.average) + u32::from(sample) + u32::from(self.dropped);
        self.dropped = (acc & Self::MASK) as u16;
        self.average = (acc >> SHIFT) as u16;
        self.average
    }

    /// Replaces the average with an unfiltered reading, keeping the carry.
    pub fn overwrite(&mut self, sample: u16) {
        self.average = sample;
    }

    pub fn value(&self) -> u16 {
        self.average
    }

    pub fn dropped_bits(&self) -> u16 {
        self.dropped
    }
}

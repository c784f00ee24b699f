//! Channel acquisition and stacked-tap to cell conversion.
//!
//! The cell channels are wired as a stack: tap `i` measures cells `0..=i`
//! together. Cell `i` is therefore tap `i` minus tap `i - 1`, except cell 0
//! which is tap 0 itself. Taps are filtered before they are differenced so
//! threshold crossings see a stable value.

use crate::board::{AnalogFrontEnd, CELL_COUNT, Channel};
use crate::filter::ChannelAverage;

const FILTERED_CHANNELS: usize = 6;

/// Filtered channel state and derived cell voltages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readings {
    averages: [ChannelAverage; FILTERED_CHANNELS],
    cells: [u16; CELL_COUNT],
    min_cell: usize,
    max_cell: usize,
}

impl Readings {
    /// Seeds every cell at `cell_seed` so a freshly woken unit does not have
    /// to climb all the way from zero.
    pub fn seeded(cell_seed: u16) -> Self {
        let mut averages = [ChannelAverage::new(); FILTERED_CHANNELS];
        for (i, avg) in averages.iter_mut().take(CELL_COUNT).enumerate() {
            *avg = ChannelAverage::seeded(cell_seed.saturating_mul(i as u16 + 1));
        }
        let mut readings = Self {
            averages,
            cells: [0; CELL_COUNT],
            min_cell: 0,
            max_cell: 0,
        };
        readings.recompute_cells();
        readings
    }

    /// One control-loop acquisition: cell taps through the filter, panel and
    /// fuse read directly because they need a fast response.
    pub fn refresh(&mut self, afe: &mut impl AnalogFrontEnd) {
        for channel in Channel::CELLS {
            self.filter(channel, afe.sample(channel));
        }
        self.recompute_cells();
        for channel in [Channel::Panel, Channel::Fuse] {
            self.averages[channel.index()].overwrite(afe.sample(channel));
        }
    }

    /// Filters `channel` as well, including panel and fuse. Used where
    /// precision matters more than latency.
    pub fn refresh_filtered(&mut self, afe: &mut impl AnalogFrontEnd, channels: &[Channel]) {
        for &channel in channels {
            self.filter(channel, afe.sample(channel));
        }
        self.recompute_cells();
    }

    fn filter(&mut self, channel: Channel, raw: u16) {
        if let Some(avg) = self.averages.get_mut(channel.index()) {
            avg.update(raw);
        }
    }

    /// Differences the taps and finds the extreme cells.
    ///
    /// The search starts from cell 0 as the candidate and scans cells 1..=3,
    /// so cell 0 only wins when nothing after it is strictly lower (or
    /// higher).
    fn recompute_cells(&mut self) {
        self.min_cell = 0;
        self.max_cell = 0;
        for i in 0..CELL_COUNT {
            let tap = self.averages[i].value();
            self.cells[i] = if i == 0 {
                tap
            } else {
                tap.saturating_sub(self.averages[i - 1].value())
            };
            if i != 0 {
                if self.cells[i] < self.cells[self.min_cell] {
                    self.min_cell = i;
                }
                if self.cells[i] > self.cells[self.max_cell] {
                    self.max_cell = i;
                }
            }
        }
    }

    pub fn cells(&self) -> &[u16; CELL_COUNT] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> u16 {
        self.cells[index]
    }

    pub fn min_cell(&self) -> usize {
        self.min_cell
    }

    pub fn max_cell(&self) -> usize {
        self.max_cell
    }

    pub fn min_cell_voltage(&self) -> u16 {
        self.cells[self.min_cell]
    }

    pub fn max_cell_voltage(&self) -> u16 {
        self.cells[self.max_cell]
    }

    /// Filtered top tap: the whole battery.
    pub fn battery(&self) -> u16 {
        self.averages[Channel::Cell4.index()].value()
    }

    pub fn panel(&self) -> u16 {
        self.averages[Channel::Panel.index()].value()
    }

    pub fn fuse(&self) -> u16 {
        self.averages[Channel::Fuse.index()].value()
    }
}

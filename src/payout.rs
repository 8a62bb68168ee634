use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::{EngineError, Result};
use crate::types::Amount;

/// Fixed-shape payout lookup: `ROWS × COLS` amounts, stored row-major.
/// A zero cell means "no entitlement" for that combination.
///
/// The shape is part of the type, so an application's table can never be
/// resized after it is filed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutTable<const ROWS: usize, const COLS: usize> {
    cells: [[Amount; COLS]; ROWS],
}

impl<const ROWS: usize, const COLS: usize> PayoutTable<ROWS, COLS> {
    pub const LEN: usize = ROWS * COLS;

    /// Build a table from a flat row-major slice. The slice must have
    /// exactly `ROWS * COLS` entries.
    pub fn from_options(options: &[Amount]) -> Result<Self> {
        if options.len() != Self::LEN {
            return Err(EngineError::InvalidPayoutOptions {
                expected: Self::LEN,
                actual: options.len(),
            });
        }
        let mut cells = [[0; COLS]; ROWS];
        for (i, &amount) in options.iter().enumerate() {
            cells[i / COLS][i % COLS] = amount;
        }
        Ok(PayoutTable { cells })
    }

    /// Zero-based read; `None` outside the table shape.
    pub fn cell(&self, row: usize, col: usize) -> Option<Amount> {
        self.cells.get(row)?.get(col).copied()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Amount; COLS]> {
        self.cells.iter()
    }

    /// Flat row-major copy, the same layout the table was built from.
    pub fn to_vec(&self) -> Vec<Amount> {
        self.cells.iter().flatten().copied().collect()
    }

    pub fn max_amount(&self) -> Amount {
        self.cells.iter().flatten().copied().max().unwrap_or(0)
    }
}

// Serialized flat, matching the `payout_options` array applicants submit.
impl<const ROWS: usize, const COLS: usize> Serialize for PayoutTable<ROWS, COLS> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.cells.iter().flatten())
    }
}

/// The business rule turning a reported storm outcome into a payout cell.
///
/// Product revisions disagree on what the two reported numbers mean, so each
/// rule is its own type and an engine is built for exactly one of them.
pub trait PayoutRegime: fmt::Debug {
    type Table: Clone + fmt::Debug + PartialEq + Serialize;

    /// Short name used in logs and on the command line.
    const NAME: &'static str;

    /// Validate an applicant's flat option list against the table shape.
    fn table_from(&self, options: &[Amount]) -> Result<Self::Table>;

    /// Resolve a reported `(category, measure)` pair to a non-zero amount.
    fn resolve(&self, table: &Self::Table, category: u32, measure: u32) -> Result<Amount>;
}

/// Table-index regime: `category` and `bucket` are 1-based row and column
/// indices into a 7 × 3 table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBucket;

impl CategoryBucket {
    pub const CATEGORIES: usize = 7;
    pub const BUCKETS: usize = 3;
}

pub type CategoryTable = PayoutTable<{ CategoryBucket::CATEGORIES }, { CategoryBucket::BUCKETS }>;

impl PayoutRegime for CategoryBucket {
    type Table = CategoryTable;

    const NAME: &'static str = "category-bucket";

    fn table_from(&self, options: &[Amount]) -> Result<Self::Table> {
        CategoryTable::from_options(options)
    }

    fn resolve(&self, table: &Self::Table, category: u32, bucket: u32) -> Result<Amount> {
        let in_bounds = (1..=Self::CATEGORIES as u32).contains(&category)
            && (1..=Self::BUCKETS as u32).contains(&bucket);
        if !in_bounds {
            return Err(EngineError::InvalidCategory { category, bucket });
        }
        let amount = table
            .cell((category - 1) as usize, (bucket - 1) as usize)
            .ok_or(EngineError::InvalidCategory { category, bucket })?;
        if amount == 0 {
            return Err(EngineError::NoPayoutForBucket { category, bucket });
        }
        Ok(amount)
    }
}

/// Magnitude regime: `category` is the storm's Saffir-Simpson class and
/// `measure` is its closest approach to the insured point in metres.
///
/// Only major storms (categories 3 to 5) within `max_distance` pay. The
/// distance is split into three equal bands; the table is band-major, one
/// row per band and one column per category, closest band first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceBand {
    pub max_distance: u32,
    pub lowest_category: u32,
}

impl DistanceBand {
    pub const BANDS: usize = 3;
    pub const CATEGORIES: usize = 3;
    /// Thirty miles in metres.
    pub const DEFAULT_MAX_DISTANCE: u32 = 48_280;

    pub fn band_width(&self) -> u32 {
        self.max_distance.div_ceil(Self::BANDS as u32).max(1)
    }

    /// Zero-based band for a distance already known to be payable.
    pub fn band(&self, distance: u32) -> usize {
        ((distance / self.band_width()) as usize).min(Self::BANDS - 1)
    }
}

impl Default for DistanceBand {
    fn default() -> Self {
        DistanceBand { max_distance: Self::DEFAULT_MAX_DISTANCE, lowest_category: 3 }
    }
}

pub type DistanceTable = PayoutTable<{ DistanceBand::BANDS }, { DistanceBand::CATEGORIES }>;

impl PayoutRegime for DistanceBand {
    type Table = DistanceTable;

    const NAME: &'static str = "distance-band";

    fn table_from(&self, options: &[Amount]) -> Result<Self::Table> {
        DistanceTable::from_options(options)
    }

    fn resolve(&self, table: &Self::Table, category: u32, distance: u32) -> Result<Amount> {
        if distance > self.max_distance {
            return Err(EngineError::TooFarForPayout { distance, max: self.max_distance });
        }
        let band = self.band(distance);
        let highest = self.lowest_category.saturating_add(Self::CATEGORIES as u32 - 1);
        if !(self.lowest_category..=highest).contains(&category) {
            return Err(EngineError::InvalidCategory { category, bucket: band as u32 + 1 });
        }
        let column = (category - self.lowest_category) as usize;
        let amount = table
            .cell(band, column)
            .ok_or(EngineError::InvalidCategory { category, bucket: band as u32 + 1 })?;
        if amount == 0 {
            return Err(EngineError::NoPayoutForBucket { category, bucket: band as u32 + 1 });
        }
        Ok(amount)
    }
}

use crate::error::{HmmError, Result};

/// Number of return bins used by the stock engine
pub const NUM_SYMBOLS: usize = 100;

/// Half-width of the modelled return range: returns are binned over [-2%, +2%]
pub const RETURN_RANGE: f64 = 0.02;

/// Maps real-valued returns onto a fixed alphabet of equal-width bins.
///
/// Returns outside `[-range, +range]` saturate into the boundary bins, so the
/// first and last bins are open-ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnDiscretizer {
    num_symbols: usize,
    range: f64,
}

impl Default for ReturnDiscretizer {
    fn default() -> Self {
        Self {
            num_symbols: NUM_SYMBOLS,
            range: RETURN_RANGE,
        }
    }
}

impl ReturnDiscretizer {
    /// Needs at least one bin and a positive, finite range
    pub fn new(num_symbols: usize, range: f64) -> Result<Self> {
        if num_symbols == 0 {
            return Err(HmmError::InvalidParameter(
                "discretizer needs at least one symbol".to_string(),
            ));
        }
        if !(range > 0.0 && range.is_finite()) {
            return Err(HmmError::InvalidParameter(format!(
                "discretizer range must be positive and finite, got {}",
                range
            )));
        }
        Ok(Self { num_symbols, range })
    }

    pub fn num_symbols(&self) -> usize {
        self.num_symbols
    }

    pub fn bin_width(&self) -> f64 {
        2.0 * self.range / self.num_symbols as f64
    }

    pub fn symbol(&self, ret: f64) -> usize {
        let raw = ((ret + self.range) * self.num_symbols as f64 / (2.0 * self.range)).floor();
        if raw.is_nan() || raw < 0.0 {
            0
        } else {
            (raw as usize).min(self.num_symbols - 1)
        }
    }

    pub fn discretize(&self, returns: &[f64]) -> Vec<usize> {
        returns.iter().map(|&r| self.symbol(r)).collect()
    }

    /// `[lower, upper)` edges of bin `k`; the boundary bins extend to infinity
    pub fn bin_edges(&self, k: usize) -> (f64, f64) {
        let width = self.bin_width();
        let lower = if k == 0 {
            f64::NEG_INFINITY
        } else {
            -self.range + k as f64 * width
        };
        let upper = if k + 1 >= self.num_symbols {
            f64::INFINITY
        } else {
            -self.range + (k + 1) as f64 * width
        };
        (lower, upper)
    }

    /// Midpoint of bin `k` (boundary bins use their finite edge plus half a width)
    pub fn bin_center(&self, k: usize) -> f64 {
        -self.range + (k as f64 + 0.5) * self.bin_width()
    }
}

/// Simple percentage returns between consecutive prices
pub fn returns_from_prices(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

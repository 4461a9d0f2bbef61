use ndarray::{Array1, Array2};
use tracing::{debug, warn};

use super::discretize::ReturnDiscretizer;
use super::math::{gaussian_bin_mass, normalize_rows};
use crate::config::NumericSettings;

/// Observed data handed to an emission model during re-estimation
#[derive(Debug, Clone, Copy)]
pub struct Sample<'a> {
    pub symbols: &'a [usize],
    /// Raw values behind the symbols, when the model is fitted on a continuous series
    pub values: Option<&'a [f64]>,
}

impl<'a> Sample<'a> {
    pub fn symbols(symbols: &'a [usize]) -> Self {
        Self { symbols, values: None }
    }

    pub fn with_values(symbols: &'a [usize], values: &'a [f64]) -> Self {
        Self {
            symbols,
            values: Some(values),
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Emission family plugged into the EM loop.
///
/// The loop only needs the current symbol probabilities and a way to
/// re-estimate them from the state-occupancy posteriors.
pub trait EmissionModel {
    fn num_states(&self) -> usize;

    fn num_symbols(&self) -> usize;

    /// Row-stochastic `num_states x num_symbols` table
    fn probs(&self) -> &Array2<f64>;

    fn log_table(&self) -> Array2<f64> {
        self.probs().mapv(f64::ln)
    }

    /// M-step. `gamma[[t, i]]` is the occupancy posterior for every observation.
    fn reestimate(&mut self, sample: &Sample<'_>, gamma: &Array2<f64>);
}

/// Free categorical emissions, re-estimated from expected symbol counts
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalEmission {
    probs: Array2<f64>,
}

impl CategoricalEmission {
    pub fn from_probs(probs: &Array2<f64>) -> Self {
        Self { probs: probs.clone() }
    }

    pub fn into_probs(self) -> Array2<f64> {
        self.probs
    }
}

impl EmissionModel for CategoricalEmission {
    fn num_states(&self) -> usize {
        self.probs.nrows()
    }

    fn num_symbols(&self) -> usize {
        self.probs.ncols()
    }

    fn probs(&self) -> &Array2<f64> {
        &self.probs
    }

    fn reestimate(&mut self, sample: &Sample<'_>, gamma: &Array2<f64>) {
        let n_states = self.num_states();
        let mut counts = Array2::<f64>::zeros(self.probs.raw_dim());
        let mut occupancy = Array1::<f64>::zeros(n_states);

        for (t, &symbol) in sample.symbols.iter().enumerate() {
            for i in 0..n_states {
                counts[[i, symbol]] += gamma[[t, i]];
                occupancy[i] += gamma[[t, i]];
            }
        }

        for i in 0..n_states {
            if !(occupancy[i] > 0.0) || !occupancy[i].is_finite() {
                warn!("State {} has no posterior mass, keeping its emission row", i);
                continue;
            }
            for k in 0..self.num_symbols() {
                self.probs[[i, k]] = counts[[i, k]] / occupancy[i];
            }
        }
    }
}

/// Emissions derived from a per-state Gaussian over return bins.
///
/// Each state carries a mean and std of the underlying return; the symbol
/// table is the Gaussian mass falling in each bin of the discretizer.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedGaussianEmission {
    discretizer: ReturnDiscretizer,
    means: Array1<f64>,
    stds: Array1<f64>,
    probs: Array2<f64>,
    numerics: NumericSettings,
}

impl BinnedGaussianEmission {
    /// Table regenerated from the given Gaussian parameters
    pub fn from_gaussians(
        discretizer: ReturnDiscretizer,
        means: Array1<f64>,
        stds: Array1<f64>,
        numerics: NumericSettings,
    ) -> Self {
        let n_states = means.len();
        let mut emission = Self {
            discretizer,
            means,
            stds,
            probs: Array2::zeros((n_states, discretizer.num_symbols())),
            numerics,
        };
        for i in 0..n_states {
            emission.stds[i] = emission.floor_std(i, emission.stds[i]);
            emission.regenerate_row(i);
        }
        emission
    }

    /// Arbitrary starting table alongside the Gaussian parameters (used by random seeding)
    pub fn with_probs(
        discretizer: ReturnDiscretizer,
        means: Array1<f64>,
        stds: Array1<f64>,
        mut probs: Array2<f64>,
        numerics: NumericSettings,
    ) -> Self {
        normalize_rows(&mut probs);
        let mut emission = Self {
            discretizer,
            means,
            stds,
            probs,
            numerics,
        };
        for i in 0..emission.stds.len() {
            emission.stds[i] = emission.floor_std(i, emission.stds[i]);
        }
        emission
    }

    pub fn means(&self) -> &Array1<f64> {
        &self.means
    }

    pub fn stds(&self) -> &Array1<f64> {
        &self.stds
    }

    pub fn discretizer(&self) -> &ReturnDiscretizer {
        &self.discretizer
    }

    fn floor_std(&self, state: usize, std: f64) -> f64 {
        if std.is_finite() && std >= self.numerics.min_std {
            std
        } else {
            debug!(
                "State {} std {:.3e} below floor, clamping to {:.3e}",
                state, std, self.numerics.min_std
            );
            self.numerics.min_std
        }
    }

    /// Gaussian mass per bin, floored at `emission_floor`, then the row is renormalised
    fn regenerate_row(&mut self, state: usize) {
        let mean = self.means[state];
        let std = self.stds[state];
        let floor = self.numerics.emission_floor;

        let mut total = 0.0;
        for k in 0..self.discretizer.num_symbols() {
            let (lower, upper) = self.discretizer.bin_edges(k);
            let mass = gaussian_bin_mass(lower, upper, mean, std).max(floor);
            self.probs[[state, k]] = mass;
            total += mass;
        }
        for k in 0..self.discretizer.num_symbols() {
            self.probs[[state, k]] /= total;
        }
    }
}

impl EmissionModel for BinnedGaussianEmission {
    fn num_states(&self) -> usize {
        self.means.len()
    }

    fn num_symbols(&self) -> usize {
        self.discretizer.num_symbols()
    }

    fn probs(&self) -> &Array2<f64> {
        &self.probs
    }

    /// Weighted moments of the raw returns over t < T-1, then the bin masses.
    /// Without raw values the bin centres stand in for them.
    fn reestimate(&mut self, sample: &Sample<'_>, gamma: &Array2<f64>) {
        let horizon = sample.len().saturating_sub(1);
        let centers: Vec<f64>;
        let values: &[f64] = match sample.values {
            Some(values) => values,
            None => {
                centers = sample
                    .symbols
                    .iter()
                    .map(|&k| self.discretizer.bin_center(k))
                    .collect();
                &centers
            }
        };

        for i in 0..self.num_states() {
            let mut sum_gamma = 0.0;
            let mut sum_returns = 0.0;
            let mut sum_squared_returns = 0.0;
            for t in 0..horizon {
                let g = gamma[[t, i]];
                sum_gamma += g;
                sum_returns += g * values[t];
                sum_squared_returns += g * values[t] * values[t];
            }

            if !(sum_gamma > 0.0) || !sum_gamma.is_finite() {
                warn!("State {} has no posterior mass, keeping its return distribution", i);
                continue;
            }

            let mean = sum_returns / sum_gamma;
            let variance = sum_squared_returns / sum_gamma - mean * mean;
            let std = if variance > 0.0 { variance.sqrt() } else { 0.0 };

            self.means[i] = mean;
            self.stds[i] = self.floor_std(i, std);
            self.regenerate_row(i);
        }
    }
}

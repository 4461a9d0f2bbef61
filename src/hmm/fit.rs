use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::algorithms::{forward_backward, posteriors, LogTables};
use super::emission::{EmissionModel, Sample};
use crate::error::{HmmError, Result};

/// Outcome of a Baum-Welch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    /// Log-likelihood of the sequence under the parameters entering each iteration
    pub log_likelihoods: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl FitReport {
    pub fn final_log_likelihood(&self) -> Option<f64> {
        self.log_likelihoods.last().copied()
    }
}

/// Expectation-Maximization over the initial, transition and emission tables
#[derive(Debug, Clone, Copy)]
pub struct BaumWelch {
    max_iterations: usize,
    tolerance: f64,
}

impl BaumWelch {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }

    /// Runs EM until the log-likelihood moves by less than `tolerance` or the
    /// iteration budget is spent. Parameters are updated in place; an iteration
    /// whose likelihood is not finite aborts before touching them.
    pub fn run<E: EmissionModel + ?Sized>(
        &self,
        initial: &mut Array1<f64>,
        transition: &mut Array2<f64>,
        emission: &mut E,
        observations: &[usize],
        values: Option<&[f64]>,
    ) -> Result<FitReport> {
        if observations.is_empty() {
            return Err(HmmError::EmptySequence);
        }
        if let Some(values) = values {
            if values.len() != observations.len() {
                return Err(HmmError::LengthMismatch {
                    expected: observations.len(),
                    found: values.len(),
                });
            }
        }

        let sample = Sample {
            symbols: observations,
            values,
        };
        let mut prev_log_likelihood = f64::NEG_INFINITY;
        let mut report = FitReport {
            log_likelihoods: Vec::with_capacity(self.max_iterations),
            iterations: 0,
            converged: false,
        };

        for iteration in 0..self.max_iterations {
            // E-step
            let tables = LogTables::new(initial, transition, &*emission);
            let fb = forward_backward(&tables, observations);
            let log_likelihood = fb.log_likelihood;

            if !log_likelihood.is_finite() {
                warn!("Baum-Welch iteration {}: log-likelihood is {}", iteration + 1, log_likelihood);
                return Err(HmmError::DegenerateLikelihood);
            }

            let post = posteriors(&tables, observations, &fb);

            // M-step
            update_initial(initial, &post.gamma);
            update_transition(transition, &post.gamma, &post.xi_sum);
            emission.reestimate(&sample, &post.gamma);

            report.log_likelihoods.push(log_likelihood);
            report.iterations = iteration + 1;

            let delta = (log_likelihood - prev_log_likelihood).abs();
            debug!(
                "Baum-Welch iteration {}: log-likelihood {:.6}, delta {:.3e}",
                iteration + 1,
                log_likelihood,
                delta
            );

            if delta < self.tolerance {
                report.converged = true;
                break;
            }
            prev_log_likelihood = log_likelihood;
        }

        if report.converged {
            info!(
                "Baum-Welch converged after {} iterations (log-likelihood {:.6})",
                report.iterations,
                report.final_log_likelihood().unwrap_or(f64::NAN)
            );
        } else {
            info!(
                "Baum-Welch stopped at max iterations {} (log-likelihood {:.6})",
                report.iterations,
                report.final_log_likelihood().unwrap_or(f64::NAN)
            );
        }

        Ok(report)
    }
}

fn update_initial(initial: &mut Array1<f64>, gamma: &Array2<f64>) {
    for i in 0..initial.len() {
        initial[i] = gamma[[0, i]];
    }
}

/// `A[i][j] = sum_t xi[t][i][j] / sum_t gamma[t][i]` over t < T-1
fn update_transition(transition: &mut Array2<f64>, gamma: &Array2<f64>, xi_sum: &Array2<f64>) {
    let horizon = gamma.nrows().saturating_sub(1);
    for i in 0..transition.nrows() {
        let sum_gamma: f64 = (0..horizon).map(|t| gamma[[t, i]]).sum();
        if !(sum_gamma > 0.0) || !sum_gamma.is_finite() {
            warn!("State {} has no posterior mass, keeping its transition row", i);
            continue;
        }
        for j in 0..transition.ncols() {
            transition[[i, j]] = xi_sum[[i, j]] / sum_gamma;
        }
    }
}

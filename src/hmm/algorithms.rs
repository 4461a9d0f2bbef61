//! Log-space dynamic programs shared by every model in the crate.
//!
//! All tables are indexed `[[t, state]]`. Callers validate observation
//! indices before reaching this module.

use ndarray::{Array1, Array2, Axis};

use super::emission::EmissionModel;
use super::math::{argmax, log_sum_exp, log_sum_exp_view};

/// Log of the initial, transition and emission tables
#[derive(Debug, Clone, PartialEq)]
pub struct LogTables {
    pub log_initial: Array1<f64>,
    pub log_transition: Array2<f64>,
    pub log_emission: Array2<f64>,
}

impl LogTables {
    pub fn new<E: EmissionModel + ?Sized>(
        initial: &Array1<f64>,
        transition: &Array2<f64>,
        emission: &E,
    ) -> Self {
        Self {
            log_initial: initial.mapv(f64::ln),
            log_transition: transition.mapv(f64::ln),
            log_emission: emission.log_table(),
        }
    }

    pub fn num_states(&self) -> usize {
        self.log_initial.len()
    }

    #[inline]
    fn emit(&self, state: usize, symbol: usize) -> f64 {
        self.log_emission[[state, symbol]]
    }
}

/// Output of the forward-backward pass
#[derive(Debug, Clone)]
pub struct ForwardBackward {
    pub alpha: Array2<f64>,
    pub beta: Array2<f64>,
    pub log_likelihood: f64,
}

/// State-occupancy and summed transition posteriors for one EM iteration
#[derive(Debug, Clone)]
pub struct Posteriors {
    /// `gamma[[t, i]]` = P(state_t = i | observations)
    pub gamma: Array2<f64>,
    /// `xi_sum[[i, j]]` = sum over t < T-1 of P(state_t = i, state_t+1 = j | observations)
    pub xi_sum: Array2<f64>,
}

/// Forward table in log space
pub fn forward(tables: &LogTables, observations: &[usize]) -> Array2<f64> {
    let n_obs = observations.len();
    let n_states = tables.num_states();
    let mut log_alpha = Array2::from_elem((n_obs, n_states), f64::NEG_INFINITY);
    if n_obs == 0 {
        return log_alpha;
    }

    // Initialization
    for state in 0..n_states {
        log_alpha[[0, state]] = tables.log_initial[state] + tables.emit(state, observations[0]);
    }

    // Recursion
    let mut log_sum_terms = vec![0.0; n_states];
    for t in 1..n_obs {
        for j in 0..n_states {
            for i in 0..n_states {
                log_sum_terms[i] = log_alpha[[t - 1, i]] + tables.log_transition[[i, j]];
            }
            log_alpha[[t, j]] = log_sum_exp(&log_sum_terms) + tables.emit(j, observations[t]);
        }
    }

    log_alpha
}

/// Backward table in log space (`beta[[T-1, i]] = 0`)
pub fn backward(tables: &LogTables, observations: &[usize]) -> Array2<f64> {
    let n_obs = observations.len();
    let n_states = tables.num_states();
    let mut log_beta = Array2::zeros((n_obs, n_states));
    if n_obs == 0 {
        return log_beta;
    }

    let mut log_sum_terms = vec![0.0; n_states];
    for t in (0..n_obs - 1).rev() {
        let next_symbol = observations[t + 1];
        for i in 0..n_states {
            for j in 0..n_states {
                log_sum_terms[j] = tables.log_transition[[i, j]]
                    + tables.emit(j, next_symbol)
                    + log_beta[[t + 1, j]];
            }
            log_beta[[t, i]] = log_sum_exp(&log_sum_terms);
        }
    }

    log_beta
}

pub fn forward_backward(tables: &LogTables, observations: &[usize]) -> ForwardBackward {
    let alpha = forward(tables, observations);
    let beta = backward(tables, observations);
    let log_likelihood = match observations.len() {
        0 => f64::NEG_INFINITY,
        n => log_sum_exp_view(alpha.row(n - 1)),
    };

    ForwardBackward {
        alpha,
        beta,
        log_likelihood,
    }
}

/// Gamma and summed xi from a completed forward-backward pass
pub fn posteriors(tables: &LogTables, observations: &[usize], fb: &ForwardBackward) -> Posteriors {
    let n_obs = observations.len();
    let n_states = tables.num_states();
    let log_likelihood = fb.log_likelihood;

    let mut gamma = Array2::zeros((n_obs, n_states));
    for t in 0..n_obs {
        for i in 0..n_states {
            gamma[[t, i]] = (fb.alpha[[t, i]] + fb.beta[[t, i]] - log_likelihood).exp();
        }
    }

    let mut xi_sum = Array2::zeros((n_states, n_states));
    for t in 0..n_obs.saturating_sub(1) {
        let next_symbol = observations[t + 1];
        for i in 0..n_states {
            for j in 0..n_states {
                let log_xi = fb.alpha[[t, i]]
                    + tables.log_transition[[i, j]]
                    + tables.emit(j, next_symbol)
                    + fb.beta[[t + 1, j]]
                    - log_likelihood;
                xi_sum[[i, j]] += log_xi.exp();
            }
        }
    }

    Posteriors { gamma, xi_sum }
}

/// Most likely state path and its joint log-probability
pub fn viterbi(tables: &LogTables, observations: &[usize]) -> (Vec<usize>, f64) {
    let n_obs = observations.len();
    let n_states = tables.num_states();
    if n_obs == 0 {
        return (Vec::new(), f64::NEG_INFINITY);
    }

    let mut log_delta = Array2::from_elem((n_obs, n_states), f64::NEG_INFINITY);
    let mut psi = Array2::<usize>::zeros((n_obs, n_states));

    // Initialization
    for state in 0..n_states {
        log_delta[[0, state]] = tables.log_initial[state] + tables.emit(state, observations[0]);
    }

    // Recursion
    for t in 1..n_obs {
        for j in 0..n_states {
            let emission = tables.emit(j, observations[t]);
            for i in 0..n_states {
                let val = log_delta[[t - 1, i]] + tables.log_transition[[i, j]] + emission;
                if val > log_delta[[t, j]] {
                    log_delta[[t, j]] = val;
                    psi[[t, j]] = i;
                }
            }
        }
    }

    // Backtracking
    let mut states = vec![0; n_obs];
    states[n_obs - 1] = argmax(log_delta.row(n_obs - 1));
    for t in (0..n_obs - 1).rev() {
        states[t] = psi[[t + 1, states[t + 1]]];
    }

    let best = log_delta[[n_obs - 1, states[n_obs - 1]]];
    (states, best)
}

/// Joint log-probability of a given state path together with the observations
pub fn path_log_probability(tables: &LogTables, observations: &[usize], path: &[usize]) -> f64 {
    if observations.is_empty() || path.len() != observations.len() {
        return f64::NEG_INFINITY;
    }

    let mut log_prob = tables.log_initial[path[0]] + tables.emit(path[0], observations[0]);
    for t in 1..observations.len() {
        log_prob += tables.log_transition[[path[t - 1], path[t]]] + tables.emit(path[t], observations[t]);
    }
    log_prob
}

/// Filtered posteriors P(state_t | observations[0..=t]): each forward row normalised
pub fn filtered(log_alpha: &Array2<f64>) -> Array2<f64> {
    let mut filtered = Array2::zeros(log_alpha.raw_dim());
    for (t, row) in log_alpha.axis_iter(Axis(0)).enumerate() {
        let log_norm = log_sum_exp_view(row);
        for (i, &value) in row.iter().enumerate() {
            filtered[[t, i]] = (value - log_norm).exp();
        }
    }
    filtered
}

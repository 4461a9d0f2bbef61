//! Linear-space Viterbi decoder for [`DiscreteHmm`].
//!
//! Scores are raw products of probabilities, so long sequences underflow to
//! zero and the decoded path degrades to the tie-break order. Use
//! [`DiscreteHmm::viterbi_log`] for anything longer than a few hundred steps.

use ndarray::Array2;

use super::model::DiscreteHmm;
use crate::error::Result;

/// Most likely state path for `observations`.
///
/// Ties resolve to the lowest state index (first maximum wins).
pub fn viterbi(model: &DiscreteHmm, observations: &[usize]) -> Result<Vec<usize>> {
    model.validate()?;
    model.check_observations(observations)?;

    let n_states = model.num_states;
    let n_obs = observations.len();

    let mut scores = Array2::<f64>::zeros((n_obs, n_states));
    let mut backpointers = Array2::<usize>::zeros((n_obs, n_states));

    for s in 0..n_states {
        scores[[0, s]] = model.initial[s] * model.emission[[s, observations[0]]];
    }

    for t in 1..n_obs {
        for s in 0..n_states {
            let mut max_prob = f64::NEG_INFINITY;
            let mut best_state = 0;
            for i in 0..n_states {
                let prob = scores[[t - 1, i]] * model.transition[[i, s]];
                if prob > max_prob {
                    max_prob = prob;
                    best_state = i;
                }
            }
            scores[[t, s]] = max_prob * model.emission[[s, observations[t]]];
            backpointers[[t, s]] = best_state;
        }
    }

    let mut last_state = 0;
    let mut max_prob = f64::NEG_INFINITY;
    for s in 0..n_states {
        if scores[[n_obs - 1, s]] > max_prob {
            max_prob = scores[[n_obs - 1, s]];
            last_state = s;
        }
    }

    let mut path = vec![0; n_obs];
    path[n_obs - 1] = last_state;
    for t in (1..n_obs).rev() {
        path[t - 1] = backpointers[[t, path[t]]];
    }

    Ok(path)
}

//! Information criteria, out-of-sample fit, and state-count search.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::seeding::ParameterSeeder;
use super::stock::StockHmm;
use crate::config::EngineConfig;
use crate::error::{HmmError, Result};

/// Free parameters of an engine: transition rows, emission rows, plus a mean
/// and std per state
pub fn parameter_count(num_states: usize, num_symbols: usize) -> usize {
    num_states * num_states.saturating_sub(1)
        + num_states * num_symbols.saturating_sub(1)
        + 2 * num_states
}

pub fn aic(log_likelihood: f64, num_params: usize) -> f64 {
    2.0 * num_params as f64 - 2.0 * log_likelihood
}

pub fn bic(log_likelihood: f64, num_params: usize, num_observations: usize) -> f64 {
    num_params as f64 * (num_observations as f64).ln() - 2.0 * log_likelihood
}

pub fn hqc(log_likelihood: f64, num_params: usize, num_observations: usize) -> f64 {
    -2.0 * log_likelihood + 2.0 * num_params as f64 * (num_observations as f64).ln().ln()
}

pub fn caic(log_likelihood: f64, num_params: usize, num_observations: usize) -> f64 {
    -2.0 * log_likelihood + num_params as f64 * ((num_observations as f64).ln() + 1.0)
}

/// `1 - RSS/TSS` of predictions against realised returns
pub fn out_of_sample_r_squared(true_returns: &[f64], predicted_returns: &[f64]) -> Result<f64> {
    if true_returns.len() != predicted_returns.len() {
        return Err(HmmError::LengthMismatch {
            expected: true_returns.len(),
            found: predicted_returns.len(),
        });
    }
    if true_returns.is_empty() {
        return Err(HmmError::EmptySequence);
    }

    let mean = true_returns.iter().sum::<f64>() / true_returns.len() as f64;
    let (rss, tss) = true_returns
        .iter()
        .zip(predicted_returns)
        .fold((0.0, 0.0), |(rss, tss), (&actual, &predicted)| {
            (
                rss + (actual - predicted).powi(2),
                tss + (actual - mean).powi(2),
            )
        });

    if tss == 0.0 {
        return Err(HmmError::ZeroTotalVariance);
    }
    Ok(1.0 - rss / tss)
}

/// Which criterion ranks candidate models (lower is better)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InformationCriterion {
    Aic,
    Bic,
    Hqc,
    Caic,
}

impl InformationCriterion {
    pub fn score(
        &self,
        log_likelihood: f64,
        num_params: usize,
        num_observations: usize,
    ) -> f64 {
        match self {
            InformationCriterion::Aic => aic(log_likelihood, num_params),
            InformationCriterion::Bic => bic(log_likelihood, num_params, num_observations),
            InformationCriterion::Hqc => hqc(log_likelihood, num_params, num_observations),
            InformationCriterion::Caic => caic(log_likelihood, num_params, num_observations),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InformationCriterion::Aic => "aic",
            InformationCriterion::Bic => "bic",
            InformationCriterion::Hqc => "hqc",
            InformationCriterion::Caic => "caic",
        }
    }
}

impl fmt::Display for InformationCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

impl FromStr for InformationCriterion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "aic" => Ok(InformationCriterion::Aic),
            "bic" => Ok(InformationCriterion::Bic),
            "hqc" => Ok(InformationCriterion::Hqc),
            "caic" => Ok(InformationCriterion::Caic),
            _ => anyhow::bail!("Unknown information criterion: {}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub num_states: usize,
    pub log_likelihood: f64,
    pub score: f64,
}

/// Result of [`select_num_states`]: the winning fitted engine plus every candidate's score
#[derive(Debug, Clone)]
pub struct StateSelection {
    pub model: StockHmm,
    pub criterion: InformationCriterion,
    pub candidates: Vec<CandidateScore>,
}

impl StateSelection {
    pub fn num_states(&self) -> usize {
        self.model.num_states()
    }
}

/// Fits one engine per candidate state count and keeps the lowest-scoring one.
///
/// Ties keep the smaller model. Every candidate draws its starting point from
/// the same `seeder`.
pub fn select_num_states(
    returns: &[f64],
    candidates: RangeInclusive<usize>,
    criterion: InformationCriterion,
    config: &EngineConfig,
    seeder: &mut dyn ParameterSeeder,
) -> Result<StateSelection> {
    if returns.is_empty() {
        return Err(HmmError::EmptySequence);
    }
    if *candidates.start() == 0 || candidates.is_empty() {
        return Err(HmmError::InvalidNumStates);
    }

    let mut scores = Vec::new();
    let mut best: Option<(f64, StockHmm)> = None;

    for num_states in candidates {
        let mut candidate_config = config.clone();
        candidate_config.model.num_states = num_states;

        let mut model = StockHmm::with_config(&candidate_config, &mut *seeder)?;
        model.fit(returns)?;
        let log_likelihood = model.log_likelihood(returns)?;
        let score = criterion.score(
            log_likelihood,
            parameter_count(num_states, model.num_symbols()),
            returns.len(),
        );

        debug!(
            "{} states: log-likelihood {:.4}, {} {:.4}",
            num_states, log_likelihood, criterion, score
        );
        scores.push(CandidateScore {
            num_states,
            log_likelihood,
            score,
        });

        let improves = match &best {
            Some((best_score, _)) => score < *best_score,
            None => true,
        };
        if improves {
            best = Some((score, model));
        }
    }

    let (score, model) = best.ok_or(HmmError::InvalidNumStates)?;
    info!(
        "Selected {} states by {} (score {:.4})",
        model.num_states(),
        criterion,
        score
    );

    Ok(StateSelection {
        model,
        criterion,
        candidates: scores,
    })
}

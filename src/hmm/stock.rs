use ndarray::{Array1, Array2};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::algorithms::{self, ForwardBackward, LogTables};
use super::discretize::{ReturnDiscretizer, NUM_SYMBOLS};
use super::emission::{BinnedGaussianEmission, EmissionModel};
use super::fit::{BaumWelch, FitReport};
use super::math::{log_sum_exp_view, normalize, normalize_rows};
use super::model::{check_distribution, check_len, check_observations, DiscreteHmm};
use super::seeding::{ParameterSeeder, RandomSeeder};
use super::selection::{self, parameter_count};
use crate::config::EngineConfig;
use crate::error::{HmmError, Result};
use crate::types::TradingSignal;

/// Regime model over daily returns.
///
/// Returns are binned into [`NUM_SYMBOLS`] symbols over [-2%, +2%]; each
/// state's emission row is the mass of a Gaussian over those bins, so fitting
/// moves the per-state mean/std and the table follows.
#[derive(Debug, Clone)]
pub struct StockHmm {
    initial: Array1<f64>,
    transition: Array2<f64>,
    emission: BinnedGaussianEmission,
    config: EngineConfig,
}

/// Plain-vector snapshot of the fitted parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub num_states: usize,
    pub num_symbols: usize,
    pub initial_probs: Vec<f64>,
    pub transition_probs: Vec<Vec<f64>>,
    pub emission_probs: Vec<Vec<f64>>,
    pub mean_returns: Vec<f64>,
    pub std_returns: Vec<f64>,
}

impl StockHmm {
    /// Randomly initialised engine with default settings
    pub fn new(num_states: usize) -> Result<Self> {
        Self::with_seeder(num_states, &mut RandomSeeder::from_entropy())
    }

    pub fn with_seeder<S: ParameterSeeder + ?Sized>(
        num_states: usize,
        seeder: &mut S,
    ) -> Result<Self> {
        let mut config = EngineConfig::default();
        config.model.num_states = num_states;
        Self::with_config(&config, seeder)
    }

    /// Engine shaped by `config`, starting tables drawn from `seeder` and row-normalised
    pub fn with_config<S: ParameterSeeder + ?Sized>(
        config: &EngineConfig,
        seeder: &mut S,
    ) -> Result<Self> {
        validate_config(config)?;
        let n = config.model.num_states;

        let seeded = seeder.seed(n, NUM_SYMBOLS);
        check_len("seeded initial", n, seeded.initial.len())?;
        check_len("seeded transition rows", n, seeded.transition.nrows())?;
        check_len("seeded transition columns", n, seeded.transition.ncols())?;
        check_len("seeded emission rows", n, seeded.emission.nrows())?;
        check_len("seeded emission columns", NUM_SYMBOLS, seeded.emission.ncols())?;
        check_len("seeded means", n, seeded.means.len())?;
        check_len("seeded stds", n, seeded.stds.len())?;

        let mut initial = seeded.initial;
        let mut transition = seeded.transition;
        normalize(&mut initial);
        normalize_rows(&mut transition);

        let emission = BinnedGaussianEmission::with_probs(
            ReturnDiscretizer::default(),
            seeded.means,
            seeded.stds,
            seeded.emission,
            config.numerics.clone(),
        );

        debug!("Initialised {}-state engine", n);
        Ok(Self {
            initial,
            transition,
            emission,
            config: config.clone(),
        })
    }

    /// Explicit starting point; emissions are derived from the Gaussians
    pub fn from_parameters(
        initial: Array1<f64>,
        transition: Array2<f64>,
        means: Array1<f64>,
        stds: Array1<f64>,
    ) -> Result<Self> {
        let mut config = EngineConfig::default();
        config.model.num_states = initial.len();
        Self::from_parameters_with_config(initial, transition, means, stds, &config)
    }

    pub fn from_parameters_with_config(
        initial: Array1<f64>,
        transition: Array2<f64>,
        means: Array1<f64>,
        stds: Array1<f64>,
        config: &EngineConfig,
    ) -> Result<Self> {
        validate_config(config)?;
        let n = config.model.num_states;
        check_len("initial", n, initial.len())?;
        check_len("transition rows", n, transition.nrows())?;
        check_len("transition columns", n, transition.ncols())?;
        check_len("means", n, means.len())?;
        check_len("stds", n, stds.len())?;

        check_distribution("initial", 0, initial.iter())?;
        for (i, row) in transition.rows().into_iter().enumerate() {
            check_distribution("transition", i, row.iter())?;
        }

        let emission = BinnedGaussianEmission::from_gaussians(
            ReturnDiscretizer::default(),
            means,
            stds,
            config.numerics.clone(),
        );

        Ok(Self {
            initial,
            transition,
            emission,
            config: config.clone(),
        })
    }

    pub fn num_states(&self) -> usize {
        self.initial.len()
    }

    pub fn num_symbols(&self) -> usize {
        self.emission.num_symbols()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn initial_probs(&self) -> &Array1<f64> {
        &self.initial
    }

    pub fn transition_probs(&self) -> &Array2<f64> {
        &self.transition
    }

    pub fn emission_probs(&self) -> &Array2<f64> {
        self.emission.probs()
    }

    pub fn mean_returns(&self) -> &Array1<f64> {
        self.emission.means()
    }

    pub fn std_returns(&self) -> &Array1<f64> {
        self.emission.stds()
    }

    pub fn parameters(&self) -> ModelParameters {
        ModelParameters {
            num_states: self.num_states(),
            num_symbols: self.num_symbols(),
            initial_probs: self.initial.to_vec(),
            transition_probs: self.transition.rows().into_iter().map(|r| r.to_vec()).collect(),
            emission_probs: self
                .emission_probs()
                .rows()
                .into_iter()
                .map(|r| r.to_vec())
                .collect(),
            mean_returns: self.mean_returns().to_vec(),
            std_returns: self.std_returns().to_vec(),
        }
    }

    /// Current tables as a plain discrete model
    pub fn to_discrete_hmm(&self) -> Result<DiscreteHmm> {
        DiscreteHmm::from_tables(
            self.initial.clone(),
            self.transition.clone(),
            self.emission_probs().clone(),
        )
    }

    pub fn discretize_returns(&self, returns: &[f64]) -> Vec<usize> {
        self.emission.discretizer().discretize(returns)
    }

    fn log_tables(&self) -> LogTables {
        LogTables::new(&self.initial, &self.transition, &self.emission)
    }

    /// Final forward row: log P(observations, last state = i)
    pub fn forward(&self, observations: &[usize]) -> Result<Array1<f64>> {
        check_observations(observations, self.num_symbols())?;
        let alpha = algorithms::forward(&self.log_tables(), observations);
        Ok(alpha.row(observations.len() - 1).to_owned())
    }

    /// Most likely state path, computed in log space
    pub fn viterbi(&self, observations: &[usize]) -> Result<Vec<usize>> {
        check_observations(observations, self.num_symbols())?;
        let (path, _) = algorithms::viterbi(&self.log_tables(), observations);
        Ok(path)
    }

    pub fn forward_backward(&self, observations: &[usize]) -> Result<ForwardBackward> {
        check_observations(observations, self.num_symbols())?;
        Ok(algorithms::forward_backward(&self.log_tables(), observations))
    }

    /// Fits the model to `returns` with Baum-Welch.
    ///
    /// The series is discretised once; each iteration re-derives the means and
    /// stds from the raw returns and regenerates the emission rows from them.
    pub fn baum_welch(
        &mut self,
        returns: &[f64],
        max_iterations: usize,
        tolerance: f64,
    ) -> Result<FitReport> {
        check_returns(returns)?;
        let observations = self.discretize_returns(returns);

        info!(
            "Fitting {}-state engine on {} returns",
            self.num_states(),
            returns.len()
        );

        BaumWelch::new(max_iterations, tolerance).run(
            &mut self.initial,
            &mut self.transition,
            &mut self.emission,
            &observations,
            Some(returns),
        )
    }

    /// [`Self::baum_welch`] with the configured iteration budget and tolerance
    pub fn fit(&mut self, returns: &[f64]) -> Result<FitReport> {
        let fitting = self.config.fitting.clone();
        self.baum_welch(returns, fitting.max_iterations, fitting.tolerance)
    }

    pub fn log_likelihood(&self, returns: &[f64]) -> Result<f64> {
        check_returns(returns)?;
        let last = self.forward(&self.discretize_returns(returns))?;
        Ok(log_sum_exp_view(last.view()))
    }

    /// `gamma[[t, i]]` = P(state_t = i | all returns)
    pub fn state_posteriors(&self, returns: &[f64]) -> Result<Array2<f64>> {
        check_returns(returns)?;
        let observations = self.discretize_returns(returns);
        let tables = self.log_tables();
        let fb = algorithms::forward_backward(&tables, &observations);
        if !fb.log_likelihood.is_finite() {
            return Err(HmmError::DegenerateLikelihood);
        }
        Ok(algorithms::posteriors(&tables, &observations, &fb).gamma)
    }

    /// Discretise then decode
    pub fn decode_returns(&self, returns: &[f64]) -> Result<Vec<usize>> {
        check_returns(returns)?;
        self.viterbi(&self.discretize_returns(returns))
    }

    /// Expected next return under the initial distribution: `sum_i initial[i] * mean[i]`.
    ///
    /// Ignores any observed history; see [`Self::predict_next_return_from_history`].
    pub fn predict_next_return(&self) -> f64 {
        self.initial.dot(self.mean_returns())
    }

    /// Expected next return given the filtered state after `returns`
    pub fn predict_next_return_from_history(&self, returns: &[f64]) -> Result<f64> {
        let predictions = self.one_step_predictions(returns)?;
        Ok(predictions[predictions.len() - 1])
    }

    pub fn trading_signal(&self) -> TradingSignal {
        TradingSignal::from_prediction(self.predict_next_return(), &self.config.signal)
    }

    /// Signal for each step of `returns`, from the prediction made after seeing returns[..=t]
    pub fn trading_signals(&self, returns: &[f64]) -> Result<Vec<TradingSignal>> {
        let predictions = self.one_step_predictions(returns)?;
        Ok(predictions
            .iter()
            .map(|&p| TradingSignal::from_prediction(p, &self.config.signal))
            .collect())
    }

    fn one_step_predictions(&self, returns: &[f64]) -> Result<Array1<f64>> {
        check_returns(returns)?;
        let observations = self.discretize_returns(returns);
        let alpha = algorithms::forward(&self.log_tables(), &observations);
        if !log_sum_exp_view(alpha.row(observations.len() - 1)).is_finite() {
            return Err(HmmError::DegenerateLikelihood);
        }

        let filtered = algorithms::filtered(&alpha);
        let next_state = filtered.dot(&self.transition);
        Ok(next_state.dot(self.mean_returns()))
    }

    pub fn calculate_aic(&self, log_likelihood: f64) -> f64 {
        selection::aic(log_likelihood, self.parameter_count())
    }

    pub fn calculate_bic(&self, log_likelihood: f64, num_observations: usize) -> f64 {
        selection::bic(log_likelihood, self.parameter_count(), num_observations)
    }

    pub fn calculate_hqc(&self, log_likelihood: f64, num_observations: usize) -> f64 {
        selection::hqc(log_likelihood, self.parameter_count(), num_observations)
    }

    pub fn calculate_caic(&self, log_likelihood: f64, num_observations: usize) -> f64 {
        selection::caic(log_likelihood, self.parameter_count(), num_observations)
    }

    pub fn calculate_out_of_sample_r_squared(
        &self,
        true_returns: &[f64],
        predicted_returns: &[f64],
    ) -> Result<f64> {
        selection::out_of_sample_r_squared(true_returns, predicted_returns)
    }

    pub fn parameter_count(&self) -> usize {
        parameter_count(self.num_states(), self.num_symbols())
    }

    /// Draws a state path and matching returns from the model
    pub fn simulate<R: Rng + ?Sized>(
        &self,
        len: usize,
        rng: &mut R,
    ) -> Result<(Vec<usize>, Vec<f64>)> {
        let invalid = |e: &dyn std::fmt::Display| HmmError::InvalidParameter(e.to_string());

        let start = WeightedIndex::<f64>::new(self.initial.iter()).map_err(|e| invalid(&e))?;
        let rows = self
            .transition
            .rows()
            .into_iter()
            .map(|row| WeightedIndex::<f64>::new(row.iter()).map_err(|e| invalid(&e)))
            .collect::<Result<Vec<_>>>()?;
        let emissions = self
            .mean_returns()
            .iter()
            .zip(self.std_returns().iter())
            .map(|(&mean, &std)| Normal::new(mean, std).map_err(|e| invalid(&e)))
            .collect::<Result<Vec<_>>>()?;

        let mut states: Vec<usize> = Vec::with_capacity(len);
        let mut returns = Vec::with_capacity(len);
        for t in 0..len {
            let state = if t == 0 {
                start.sample(rng)
            } else {
                rows[states[t - 1]].sample(rng)
            };
            states.push(state);
            returns.push(emissions[state].sample(rng));
        }
        Ok((states, returns))
    }
}

fn validate_config(config: &EngineConfig) -> Result<()> {
    if config.model.num_states == 0 {
        return Err(HmmError::InvalidNumStates);
    }
    config
        .validate()
        .map_err(|errors| HmmError::InvalidConfig(errors.join(", ")))
}

fn check_returns(returns: &[f64]) -> Result<()> {
    if returns.is_empty() {
        return Err(HmmError::EmptySequence);
    }
    if let Some(index) = returns.iter().position(|r| !r.is_finite()) {
        return Err(HmmError::NonFiniteReturn { index });
    }
    Ok(())
}

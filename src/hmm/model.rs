use ndarray::{Array1, Array2};

use super::algorithms::{self, LogTables};
use super::emission::CategoricalEmission;
use super::fit::{BaumWelch, FitReport};
use super::viterbi;
use crate::config::FittingSettings;
use crate::error::{HmmError, Result};

/// Tolerance used when checking that a probability row sums to one
pub const STOCHASTIC_TOLERANCE: f64 = 1e-6;

/// Discrete-observation HMM held in linear probability space.
///
/// `transition[[i, j]]` is P(next = j | current = i) and `emission[[i, k]]` is
/// P(symbol k | state i).
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteHmm {
    pub num_states: usize,
    pub num_symbols: usize,
    pub initial: Array1<f64>,
    pub transition: Array2<f64>,
    pub emission: Array2<f64>,
}

impl DiscreteHmm {
    /// All-zero tables of the right shape, to be filled in by the caller
    pub fn new(num_states: usize, num_symbols: usize) -> Self {
        Self {
            num_states,
            num_symbols,
            initial: Array1::zeros(num_states),
            transition: Array2::zeros((num_states, num_states)),
            emission: Array2::zeros((num_states, num_symbols)),
        }
    }

    pub fn from_tables(
        initial: Array1<f64>,
        transition: Array2<f64>,
        emission: Array2<f64>,
    ) -> Result<Self> {
        let model = Self {
            num_states: initial.len(),
            num_symbols: emission.ncols(),
            initial,
            transition,
            emission,
        };
        model.validate()?;
        Ok(model)
    }

    /// Shape and row-stochasticity checks
    pub fn validate(&self) -> Result<()> {
        let n = self.num_states;
        if n == 0 {
            return Err(HmmError::InvalidNumStates);
        }
        check_len("initial", n, self.initial.len())?;
        check_len("transition rows", n, self.transition.nrows())?;
        check_len("transition columns", n, self.transition.ncols())?;
        check_len("emission rows", n, self.emission.nrows())?;
        check_len("emission columns", self.num_symbols, self.emission.ncols())?;

        check_distribution("initial", 0, self.initial.iter())?;
        for (i, row) in self.transition.rows().into_iter().enumerate() {
            check_distribution("transition", i, row.iter())?;
        }
        for (i, row) in self.emission.rows().into_iter().enumerate() {
            check_distribution("emission", i, row.iter())?;
        }
        Ok(())
    }

    pub fn check_observations(&self, observations: &[usize]) -> Result<()> {
        check_observations(observations, self.num_symbols)
    }

    /// Linear-space MAP path; see [`viterbi::viterbi`]
    pub fn viterbi(&self, observations: &[usize]) -> Result<Vec<usize>> {
        viterbi::viterbi(self, observations)
    }

    /// Log-space MAP path, safe for long sequences
    pub fn viterbi_log(&self, observations: &[usize]) -> Result<Vec<usize>> {
        self.check_observations(observations)?;
        let (path, _) = algorithms::viterbi(&self.log_tables(), observations);
        Ok(path)
    }

    /// Final forward row: log P(obs[0..T], state_T-1 = i)
    pub fn forward(&self, observations: &[usize]) -> Result<Array1<f64>> {
        self.check_observations(observations)?;
        let alpha = algorithms::forward(&self.log_tables(), observations);
        Ok(alpha.row(observations.len() - 1).to_owned())
    }

    pub fn log_likelihood(&self, observations: &[usize]) -> Result<f64> {
        let last = self.forward(observations)?;
        Ok(super::math::log_sum_exp_view(last.view()))
    }

    /// Re-estimate all three tables with classic counted Baum-Welch
    pub fn fit(&mut self, observations: &[usize], settings: &FittingSettings) -> Result<FitReport> {
        self.check_observations(observations)?;
        let mut emission = CategoricalEmission::from_probs(&self.emission);
        let report = BaumWelch::new(settings.max_iterations, settings.tolerance).run(
            &mut self.initial,
            &mut self.transition,
            &mut emission,
            observations,
            None,
        )?;
        self.emission = emission.into_probs();
        Ok(report)
    }

    pub fn log_tables(&self) -> LogTables {
        LogTables::new(&self.initial, &self.transition, &CategoricalEmission::from_probs(&self.emission))
    }
}

pub(crate) fn check_observations(observations: &[usize], num_symbols: usize) -> Result<()> {
    if observations.is_empty() {
        return Err(HmmError::EmptySequence);
    }
    if let Some((index, &symbol)) = observations
        .iter()
        .enumerate()
        .find(|(_, &s)| s >= num_symbols)
    {
        return Err(HmmError::SymbolOutOfRange {
            index,
            symbol,
            num_symbols,
        });
    }
    Ok(())
}

pub(crate) fn check_len(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(HmmError::DimensionMismatch { what, expected, found });
    }
    Ok(())
}

pub(crate) fn check_distribution<'a>(
    what: &'static str,
    row: usize,
    values: impl Iterator<Item = &'a f64>,
) -> Result<()> {
    let mut sum = 0.0;
    for &v in values {
        if !(v >= 0.0) {
            return Err(HmmError::NotStochastic { what, row, sum: f64::NAN });
        }
        sum += v;
    }
    if (sum - 1.0).abs() > STOCHASTIC_TOLERANCE {
        return Err(HmmError::NotStochastic { what, row, sum });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn weather_model() -> DiscreteHmm {
        DiscreteHmm::from_tables(
            array![0.6, 0.4],
            array![[0.7, 0.3], [0.4, 0.6]],
            array![[0.5, 0.4, 0.1], [0.1, 0.3, 0.6]],
        )
        .unwrap()
    }

    #[test]
    fn test_new_has_zeroed_tables() {
        let model = DiscreteHmm::new(2, 3);
        assert_eq!(model.transition.shape(), &[2, 2]);
        assert_eq!(model.emission.shape(), &[2, 3]);
        assert!(model.initial.iter().all(|&p| p == 0.0));
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_rows() {
        let result = DiscreteHmm::from_tables(
            array![0.6, 0.4],
            array![[0.7, 0.7], [0.4, 0.6]],
            array![[0.5, 0.4, 0.1], [0.1, 0.3, 0.6]],
        );
        assert!(matches!(
            result,
            Err(HmmError::NotStochastic { what: "transition", row: 0, .. })
        ));

        let result = DiscreteHmm::from_tables(
            array![0.6, 0.4],
            array![[0.7, 0.3], [0.4, 0.6]],
            array![[0.5, 0.5], [0.1, 0.9], [0.5, 0.5]],
        );
        assert!(matches!(result, Err(HmmError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_observation_checks() {
        let model = weather_model();
        assert_eq!(model.check_observations(&[]), Err(HmmError::EmptySequence));
        assert_eq!(
            model.check_observations(&[0, 1, 3]),
            Err(HmmError::SymbolOutOfRange { index: 2, symbol: 3, num_symbols: 3 })
        );
        assert!(model.check_observations(&[0, 1, 2]).is_ok());
    }

    #[test]
    fn test_log_and_linear_viterbi_agree() {
        let model = weather_model();
        let observations = [0, 1, 2, 1];
        assert_eq!(model.viterbi(&observations).unwrap(), model.viterbi_log(&observations).unwrap());
    }

    #[test]
    fn test_forward_likelihood_single_observation() {
        let model = weather_model();
        // P(obs = 2) = 0.6 * 0.1 + 0.4 * 0.6
        let ll = model.log_likelihood(&[2]).unwrap();
        assert_abs_diff_eq!(ll, 0.30f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_fit_keeps_tables_stochastic() {
        let mut model = weather_model();
        let observations = [0, 0, 1, 2, 2, 2, 1, 0, 0, 1, 2, 2, 0, 1];
        let report = model
            .fit(&observations, &FittingSettings { max_iterations: 20, tolerance: 1e-9 })
            .unwrap();

        assert!(report.iterations >= 1);
        assert!(model.validate().is_ok());
        for pair in report.log_likelihoods.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-9, "log-likelihood decreased: {:?}", pair);
        }
    }
}

//! End-to-end tests for the regime engine and the discrete decoder

use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use regime_hmm::hmm::algorithms::{path_log_probability, LogTables};
use regime_hmm::hmm::math::log_sum_exp;
use regime_hmm::hmm::{
    returns_from_prices, select_num_states, CategoricalEmission, InformationCriterion,
    RandomSeeder,
};
use regime_hmm::{viterbi, DiscreteHmm, EngineConfig, HmmError, StockHmm, TradingSignal};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(filter)
        .try_init()
        .ok();
}

fn alternating_returns(len: usize) -> Vec<f64> {
    (0..len)
        .map(|t| if t % 2 == 0 { 0.01 } else { -0.01 })
        .collect()
}

fn assert_row_stochastic(engine: &StockHmm) {
    assert_abs_diff_eq!(engine.initial_probs().sum(), 1.0, epsilon = 1e-9);
    for row in engine.transition_probs().rows() {
        assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
    }
    for row in engine.emission_probs().rows() {
        assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
    }
}

fn random_discrete_model(rng: &mut StdRng, num_states: usize, num_symbols: usize) -> DiscreteHmm {
    let mut initial = Array1::from_shape_fn(num_states, |_| rng.gen_range(0.1..1.0));
    let mut transition = Array2::from_shape_fn((num_states, num_states), |_| rng.gen_range(0.1..1.0));
    let mut emission = Array2::from_shape_fn((num_states, num_symbols), |_| rng.gen_range(0.1..1.0));

    initial /= initial.sum();
    for mut row in transition.rows_mut() {
        let sum = row.sum();
        row /= sum;
    }
    for mut row in emission.rows_mut() {
        let sum = row.sum();
        row /= sum;
    }
    DiscreteHmm::from_tables(initial, transition, emission).unwrap()
}

#[test]
fn test_alternating_regimes_separate() {
    init_logging();

    let returns = alternating_returns(50);
    let mut engine = StockHmm::from_parameters(
        array![0.5, 0.5],
        array![[0.5, 0.5], [0.5, 0.5]],
        array![0.008, -0.008],
        array![0.005, 0.005],
    )
    .unwrap();

    let report = engine.baum_welch(&returns, 50, 1e-6).unwrap();

    assert!(report.iterations <= 50);
    for pair in report.log_likelihoods.windows(2) {
        assert!(pair[1] >= pair[0] - 1e-6, "log-likelihood decreased: {:?}", pair);
    }
    assert_row_stochastic(&engine);

    let means = engine.mean_returns();
    let up = if means[0] > means[1] { 0 } else { 1 };
    let down = 1 - up;
    assert_abs_diff_eq!(means[up], 0.01, epsilon = 1e-3);
    assert_abs_diff_eq!(means[down], -0.01, epsilon = 1e-3);

    let path = engine.viterbi(&engine.discretize_returns(&returns)).unwrap();
    assert_eq!(path.len(), returns.len());
    for (t, &state) in path.iter().enumerate() {
        let expected = if returns[t] > 0.0 { up } else { down };
        assert_eq!(state, expected, "step {} decoded to the wrong regime", t);
    }

    // Alternation is learned by the transition matrix
    assert!(engine.transition_probs()[[up, down]] > 0.9);
    assert!(engine.transition_probs()[[down, up]] > 0.9);
}

#[test]
fn test_fitted_engine_trades_on_history() {
    init_logging();

    let mut returns = vec![0.008; 20];
    returns.extend(vec![-0.008; 20]);
    returns.extend(vec![0.008; 20]);

    let mut engine = StockHmm::from_parameters(
        array![0.5, 0.5],
        array![[0.9, 0.1], [0.1, 0.9]],
        array![0.006, -0.006],
        array![0.004, 0.004],
    )
    .unwrap();
    engine.fit(&returns).unwrap();
    assert_row_stochastic(&engine);

    let signals = engine.trading_signals(&returns).unwrap();
    assert_eq!(signals.len(), returns.len());
    assert_eq!(signals[10], TradingSignal::Buy);
    assert_eq!(signals[30], TradingSignal::Sell);
    assert_eq!(signals[59], TradingSignal::Buy);

    let next = engine.predict_next_return_from_history(&returns).unwrap();
    assert!(next > 0.005);

    let ll = engine.log_likelihood(&returns).unwrap();
    assert!(ll.is_finite());
    assert!(engine.calculate_bic(ll, returns.len()) > engine.calculate_aic(ll));
}

#[test]
fn test_random_start_stays_stochastic() {
    init_logging();

    let mut rng = StdRng::seed_from_u64(2024);
    let returns: Vec<f64> = (0..120).map(|_| rng.gen_range(-0.03..0.03)).collect();

    for seed in 0..3 {
        let mut engine = StockHmm::with_seeder(3, &mut RandomSeeder::seeded(seed)).unwrap();
        assert_row_stochastic(&engine);
        engine.baum_welch(&returns, 15, 1e-8).unwrap();
        assert_row_stochastic(&engine);
        assert!(engine.std_returns().iter().all(|&s| s > 0.0));
    }
}

#[test]
fn test_prices_to_decoded_regimes() {
    let mut prices = vec![100.0];
    for t in 0..30 {
        let step = if t < 15 { 1.01 } else { 0.99 };
        let last = prices[prices.len() - 1];
        prices.push(last * step);
    }
    let returns = returns_from_prices(&prices);
    assert_eq!(returns.len(), 30);

    let engine = StockHmm::from_parameters(
        array![0.5, 0.5],
        array![[0.95, 0.05], [0.05, 0.95]],
        array![0.01, -0.01],
        array![0.003, 0.003],
    )
    .unwrap();

    let path = engine.decode_returns(&returns).unwrap();
    assert!(path[..15].iter().all(|&s| s == 0));
    assert!(path[15..].iter().all(|&s| s == 1));
}

#[test]
fn test_state_count_selection() {
    init_logging();

    let mut rng = StdRng::seed_from_u64(8);
    let mut engine_rng = StdRng::seed_from_u64(9);
    let generator = StockHmm::from_parameters(
        array![0.5, 0.5],
        array![[0.9, 0.1], [0.1, 0.9]],
        array![0.008, -0.008],
        array![0.002, 0.002],
    )
    .unwrap();
    let (_, returns) = generator.simulate(150, &mut rng).unwrap();

    let mut config = EngineConfig::default();
    config.fitting.max_iterations = 20;
    let mut seeder = RandomSeeder::new(&mut engine_rng);

    let selection =
        select_num_states(&returns, 1..=3, InformationCriterion::Aic, &config, &mut seeder).unwrap();

    assert_eq!(selection.candidates.len(), 3);
    assert!((1..=3).contains(&selection.num_states()));
    assert!(selection.candidates.iter().all(|c| c.log_likelihood.is_finite()));
}

#[test]
fn test_discrete_viterbi_example() {
    let model = DiscreteHmm::from_tables(
        array![0.6, 0.4],
        array![[0.7, 0.3], [0.4, 0.6]],
        array![[0.5, 0.4, 0.1], [0.1, 0.3, 0.6]],
    )
    .unwrap();

    assert_eq!(viterbi(&model, &[0, 1, 2, 1]).unwrap(), vec![0, 0, 1, 1]);
    assert_eq!(model.viterbi_log(&[0, 1, 2, 1]).unwrap(), vec![0, 0, 1, 1]);
    assert_eq!(viterbi(&model, &[]), Err(HmmError::EmptySequence));
}

#[test]
fn test_forward_bounds_viterbi_on_random_models() {
    let mut rng = StdRng::seed_from_u64(77);

    for _ in 0..20 {
        let model = random_discrete_model(&mut rng, 3, 4);
        let observations: Vec<usize> = (0..12).map(|_| rng.gen_range(0..4)).collect();

        let tables = LogTables::new(
            &model.initial,
            &model.transition,
            &CategoricalEmission::from_probs(&model.emission),
        );
        let path = model.viterbi_log(&observations).unwrap();
        let best = path_log_probability(&tables, &observations, &path);
        let total = log_sum_exp(&model.forward(&observations).unwrap().to_vec());

        assert!(total >= best - 1e-12);
        assert_eq!(path, viterbi(&model, &observations).unwrap());
    }
}

#[test]
fn test_discrete_fit_is_monotone() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut model = random_discrete_model(&mut rng, 2, 3);
    let observations: Vec<usize> = (0..60).map(|t| if t % 7 < 4 { 0 } else { 2 }).collect();

    let mut config = EngineConfig::default();
    config.fitting.max_iterations = 40;
    config.fitting.tolerance = 1e-12;

    let report = model.fit(&observations, &config.fitting).unwrap();

    for pair in report.log_likelihoods.windows(2) {
        assert!(pair[1] >= pair[0] - 1e-9, "log-likelihood decreased: {:?}", pair);
    }
    assert!(model.validate().is_ok());
}

#[test]
fn test_errors_are_reported() {
    let engine = StockHmm::with_seeder(2, &mut RandomSeeder::seeded(1)).unwrap();

    assert!(matches!(engine.decode_returns(&[]), Err(HmmError::EmptySequence)));
    assert!(matches!(
        engine.calculate_out_of_sample_r_squared(&[0.01], &[0.01, 0.02]),
        Err(HmmError::LengthMismatch { .. })
    ));
    assert!(matches!(StockHmm::new(0), Err(HmmError::InvalidNumStates)));
}

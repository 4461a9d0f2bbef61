pub mod algorithms;
pub mod discretize;
pub mod emission;
pub mod fit;
pub mod math;
pub mod model;
pub mod seeding;
pub mod selection;
pub mod stock;
pub mod viterbi;

pub use algorithms::{ForwardBackward, LogTables, Posteriors};
pub use discretize::{returns_from_prices, ReturnDiscretizer, NUM_SYMBOLS, RETURN_RANGE};
pub use emission::{BinnedGaussianEmission, CategoricalEmission, EmissionModel, Sample};
pub use fit::{BaumWelch, FitReport};
pub use model::DiscreteHmm;
pub use seeding::{ParameterSeeder, RandomSeeder, SeededParameters};
pub use selection::{
    out_of_sample_r_squared, parameter_count, select_num_states, CandidateScore,
    InformationCriterion, StateSelection,
};
pub use stock::{ModelParameters, StockHmm};

use thiserror::Error;

/// Errors reported by the HMM engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HmmError {
    #[error("Observation sequence is empty")]
    EmptySequence,

    #[error("Symbol {symbol} at position {index} is outside the alphabet of {num_symbols} symbols")]
    SymbolOutOfRange {
        index: usize,
        symbol: usize,
        num_symbols: usize,
    },

    #[error("Sequence length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("Number of states must be at least 1")]
    InvalidNumStates,

    #[error("Dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{what} row {row} is not a probability distribution (sum = {sum})")]
    NotStochastic {
        what: &'static str,
        row: usize,
        sum: f64,
    },

    #[error("Return at position {index} is not finite")]
    NonFiniteReturn { index: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("True returns have zero total variance")]
    ZeroTotalVariance,

    #[error("Sequence log-likelihood is not finite under the current parameters")]
    DegenerateLikelihood,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, HmmError>;

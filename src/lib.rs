//! Hidden Markov models for market regimes.
//!
//! [`StockHmm`] bins daily returns, fits regime parameters with Baum-Welch and
//! turns them into return predictions and BUY/SELL/HOLD signals.
//! [`DiscreteHmm`] is the plain symbolic model with its own Viterbi decoder.

pub mod config;
pub mod error;
pub mod hmm;
pub mod types;

pub use config::EngineConfig;
pub use error::{HmmError, Result};
pub use hmm::viterbi::viterbi;
pub use hmm::{DiscreteHmm, FitReport, InformationCriterion, StockHmm};
pub use types::TradingSignal;

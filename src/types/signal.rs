use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::SignalSettings;

/// Discrete trading decision derived from a predicted return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradingSignal {
    Buy,
    Sell,
    Hold,
}

impl TradingSignal {
    /// Strict thresholds: a prediction exactly on a threshold is a HOLD
    pub fn from_prediction(predicted_return: f64, settings: &SignalSettings) -> Self {
        if predicted_return > settings.buy_threshold {
            TradingSignal::Buy
        } else if predicted_return < settings.sell_threshold {
            TradingSignal::Sell
        } else {
            TradingSignal::Hold
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradingSignal::Buy => "BUY",
            TradingSignal::Sell => "SELL",
            TradingSignal::Hold => "HOLD",
        }
    }
}

impl fmt::Display for TradingSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TradingSignal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(TradingSignal::Buy),
            "SELL" => Ok(TradingSignal::Sell),
            "HOLD" => Ok(TradingSignal::Hold),
            _ => Err(anyhow::anyhow!("Unknown trading signal: {}", s)),
        }
    }
}

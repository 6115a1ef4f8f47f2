//! Advisory Signal - Daily Trade Recommendation
//!
//! The advisory provider returns one `DailySignal` per symbol and day.
//! Prices stay in `Decimal` end to end so the Open command body carries
//! exactly the digits the provider produced.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trade direction recommended by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(alias = "BUY", alias = "Buy", alias = "long")]
    Buy,
    #[serde(alias = "SELL", alias = "Sell", alias = "short")]
    Sell,
}

impl Direction {
    /// Order-type code understood by the agent (0 = buy, 1 = sell).
    pub const fn agent_code(self) -> u8 {
        match self {
            Self::Buy => 0,
            Self::Sell => 1,
        }
    }
}

/// One-day outlook for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySignal {
    /// Instrument, e.g. `USDCAD`.
    #[serde(default)]
    pub symbol: String,
    /// Buy or sell.
    pub direction: Direction,
    /// Suggested entry price.
    #[serde(alias = "entry_price")]
    pub entry_price: Decimal,
    /// Take-profit level.
    #[serde(alias = "take_profit")]
    pub take_profit: Decimal,
    /// Stop-loss level.
    #[serde(alias = "stop_loss")]
    pub stop_loss: Decimal,
    /// Provider confidence, 0–100.
    pub confidence: u8,
    /// Short free-text justification.
    #[serde(default)]
    pub rationale: String,
}

impl DailySignal {
    /// Whether the signal clears the confidence bar (strictly greater).
    pub fn is_actionable(&self, min_confidence: u8) -> bool {
        self.confidence > min_confidence
    }

    /// Body of the Open command: `"<code> <symbol> <lots> <tp> <sl>"`.
    pub fn open_command_body(&self, lot_size: Decimal) -> String {
        format!(
            "{} {} {} {} {}",
            self.direction.agent_code(),
            self.symbol,
            lot_size,
            self.take_profit,
            self.stop_loss
        )
    }
}

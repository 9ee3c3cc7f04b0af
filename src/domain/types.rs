use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub timestamp: i64,
}

/// A buy/sell intent handed to the order simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub timestamp: i64,
}

/// What came back from the simulator. A rejection is data, not an error:
/// the caller records "no trade occurred" and moves on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    Filled(Fill),
    Rejected { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub price: Decimal,
    pub fee: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub average_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Portfolio {
    pub cash: Decimal,
    pub positions: HashMap<String, Position>,
}

impl Portfolio {
    pub fn new(cash: Decimal) -> Self {
        Self {
            cash,
            positions: HashMap::new(),
        }
    }

    pub fn position_qty(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// Cash plus open positions marked at the supplied price.
    pub fn equity_at(&self, symbol: &str, price: Decimal) -> Decimal {
        self.cash + self.position_qty(symbol) * price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_equity_marks_open_position() {
        let mut portfolio = Portfolio::new(dec!(1000));
        portfolio.positions.insert(
            "TEST".to_string(),
            Position {
                symbol: "TEST".to_string(),
                quantity: dec!(5),
                average_price: dec!(10),
            },
        );

        assert_eq!(portfolio.equity_at("TEST", dec!(12)), dec!(1060));
        assert_eq!(portfolio.equity_at("OTHER", dec!(99)), dec!(1000));
    }
}

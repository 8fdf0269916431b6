//! Order requests handed to the broker/order layer

use crate::signal::{OrderType, Signal, SignalAction};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A signal that survived filtering, ready for submission
///
/// Built 1:1 from a [`Signal`]; ownership passes to the order layer once
/// published on the `order-requests` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub order_id: Uuid,
    pub strategy_id: String,
    pub symbol: String,
    pub action: SignalAction,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    /// Timestamp of the originating signal
    pub signal_timestamp_ns: u64,
    /// When this request was generated
    pub generated_at_ns: u64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl OrderRequest {
    /// Map a validated signal to an order request
    ///
    /// Returns `None` when the signal has no action or order type; callers
    /// validate shape before reaching this point.
    pub fn from_signal(signal: &Signal, generated_at_ns: u64) -> Option<Self> {
        Some(Self {
            order_id: Uuid::new_v4(),
            strategy_id: signal.strategy_id.clone(),
            symbol: signal.symbol.clone(),
            action: signal.action?,
            order_type: signal.order_type?,
            price: signal.price,
            quantity: signal.quantity,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            signal_timestamp_ns: signal.timestamp_ns,
            generated_at_ns,
            metadata: signal.metadata.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_from_signal_carries_trade_parameters() {
        let signal = Signal::new("s1", "NIFTY", SignalAction::Sell, OrderType::Limit, dec!(5))
            .with_price(dec!(22000.5))
            .with_stop_loss(dec!(22100))
            .with_take_profit(dec!(21800))
            .with_timestamp(42);

        let order = OrderRequest::from_signal(&signal, 100).unwrap();
        assert_eq!(order.strategy_id, "s1");
        assert_eq!(order.action, SignalAction::Sell);
        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.price, Some(dec!(22000.5)));
        assert_eq!(order.stop_loss, Some(dec!(22100)));
        assert_eq!(order.take_profit, Some(dec!(21800)));
        assert_eq!(order.signal_timestamp_ns, 42);
        assert_eq!(order.generated_at_ns, 100);
    }

    #[test]
    fn test_from_signal_without_action() {
        let mut signal = Signal::market("s1", "NIFTY", SignalAction::Buy, dec!(1));
        signal.action = None;
        assert!(OrderRequest::from_signal(&signal, 0).is_none());
    }
}

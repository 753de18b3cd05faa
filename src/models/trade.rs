use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// A trade recognized in a chat message, e.g. `buy 0.5 <mint>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeCommand {
    pub action: TradeAction,
    /// Absent when the message named no amount; the user gets prompted for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// Token mint address (base58)
    pub mint: String,
}

/// Order handed to the execution side once action, amount and mint are all known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOrder {
    pub chat_id: i64,
    pub user_id: String,
    pub wallet_address: String,
    pub action: TradeAction,
    /// SOL to spend for buys, percent of holdings for sells
    pub amount: f64,
    pub mint: String,
    pub requested_at: DateTime<Utc>,
}

impl TradeOrder {
    pub fn new(
        chat_id: i64,
        user_id: &str,
        wallet_address: &str,
        action: TradeAction,
        amount: f64,
        mint: &str,
    ) -> Self {
        Self {
            chat_id,
            user_id: user_id.to_string(),
            wallet_address: wallet_address.to_string(),
            action,
            amount,
            mint: mint.to_string(),
            requested_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_shape() {
        let command = TradeCommand {
            action: TradeAction::Sell,
            amount: None,
            mint: "So11111111111111111111111111111111111111112".to_string(),
        };
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["action"], "sell");
        assert!(json.get("amount").is_none());

        let with_amount = TradeCommand {
            amount: Some(0.5),
            ..command
        };
        let json = serde_json::to_value(&with_amount).unwrap();
        assert_eq!(json["amount"], 0.5);
    }
}

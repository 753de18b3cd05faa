use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::TradeAction;

/// What a force-reply prompt was waiting for.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingPrompt {
    /// Trade command that named a token but no amount
    Trade { action: TradeAction, mint: String },
    /// Withdrawal amount awaiting a destination address
    Withdrawal { amount_sol: f64 },
}

/// Pending prompts keyed by chat id and the prompt's message id.
#[derive(Debug, Default)]
pub struct PendingPrompts {
    prompts: RwLock<HashMap<(i64, i32), PendingPrompt>>,
}

impl PendingPrompts {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn remember(&self, chat_id: i64, prompt_message_id: i32, prompt: PendingPrompt) {
        debug!("Pending prompt {} in chat {}: {:?}", prompt_message_id, chat_id, prompt);
        self.prompts
            .write()
            .await
            .insert((chat_id, prompt_message_id), prompt);
    }

    /// Removes and returns the prompt; each prompt is answered once.
    pub async fn take(&self, chat_id: i64, prompt_message_id: i32) -> Option<PendingPrompt> {
        self.prompts
            .write()
            .await
            .remove(&(chat_id, prompt_message_id))
    }
}

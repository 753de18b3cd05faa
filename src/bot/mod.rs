use std::sync::Arc;
use tokio::sync::mpsc;

use crate::models::TradeOrder;
use crate::storage::UserRepository;

pub mod actions;
pub mod commands;
pub mod parser;
pub mod pending;
pub mod prompts;
pub mod router;

/// Shared by every handler; all members are safe to use concurrently.
pub struct BotState {
    pub users: Arc<UserRepository>,
    pub pending: pending::PendingPrompts,
    pub orders: mpsc::Sender<TradeOrder>, // consumed by the execution side
}

impl BotState {
    pub fn new(
        users: Arc<UserRepository>,
        orders: mpsc::Sender<TradeOrder>,
    ) -> Self {
        Self {
            users,
            pending: pending::PendingPrompts::new(),
            orders,
        }
    }
}

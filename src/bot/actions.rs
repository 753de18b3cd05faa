//! Handlers behind each routed message: trade hand-off, settings prompts, withdrawals.

use async_trait::async_trait;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ForceReply, MessageId, ParseMode};
use teloxide::utils::html;
use tracing::{info, warn};

use crate::bot::parser::is_valid_wallet_address;
use crate::bot::pending::PendingPrompt;
use crate::bot::prompts::PromptKind;
use crate::bot::BotState;
use crate::error::{Result, TraderbotError};
use crate::models::{TradeAction, TradeCommand, TradeOrder, User, UserFilter, UserSettings, UserUpdate};

/// Lowest Jito tip the bot will configure.
pub const MIN_JITO_FEE_SOL: f64 = 0.0001;

const MAX_SELL_PERCENT: f64 = 100.0;

/// Force-reply aimed only at the user being prompted in group chats.
fn prompt_markup() -> ForceReply {
    ForceReply::new().selective(true)
}

/// User-facing reason an order amount cannot be queued, if any.
pub fn trade_amount_problem(action: TradeAction, amount: f64) -> Option<&'static str> {
    if !amount.is_finite() || amount <= 0.0 {
        return Some("❌ Enter an amount greater than zero.");
    }
    if action == TradeAction::Sell && amount > MAX_SELL_PERCENT {
        return Some("❌ You can sell at most 100% of your holdings.");
    }
    None
}

/// Everything the router can hand a message to.
#[async_trait]
pub trait IntakeActions: Send + Sync {
    async fn execute_immediate_trade(&self, chat_id: i64, command: TradeCommand) -> Result<()>;
    async fn buy(&self, chat_id: i64, amount_sol: f64, reply_to: i32) -> Result<()>;
    async fn sell(&self, chat_id: i64, percent: f64, reply_to: i32) -> Result<()>;
    async fn withdraw(&self, chat_id: i64, amount_text: &str, reply_to: i32) -> Result<()>;
    async fn withdraw_address(&self, chat_id: i64, address: &str, reply_to: i32) -> Result<()>;
    async fn set_slippage(&self, chat_id: i64, percent: f64, reply_to: i32) -> Result<()>;
    async fn set_buy_preset(&self, chat_id: i64, amount_sol: f64, reply_to: i32) -> Result<()>;
    async fn set_auto_buy_amount(&self, chat_id: i64, amount_sol: f64, reply_to: i32) -> Result<()>;
    async fn set_gas_fee(&self, chat_id: i64, fee_sol: f64, reply_to: i32) -> Result<()>;
    async fn set_jito_fee(&self, chat_id: i64, fee_sol: f64, reply_to: i32) -> Result<()>;
    async fn show_contract_info(&self, chat_id: i64, mint: &str) -> Result<()>;
}

/// `IntakeActions` answering through the Telegram bot.
pub struct TelegramActions {
    bot: Bot,
    state: Arc<BotState>,
}

impl TelegramActions {
    pub fn new(bot: Bot, state: Arc<BotState>) -> Self {
        Self { bot, state }
    }

    async fn send_html(&self, chat_id: i64, text: String) -> Result<Message> {
        Ok(self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await?)
    }

    async fn send_prompt(&self, chat_id: i64, kind: PromptKind) -> Result<Message> {
        Ok(self
            .bot
            .send_message(ChatId(chat_id), kind.template())
            .parse_mode(ParseMode::Html)
            .reply_markup(prompt_markup())
            .await?)
    }

    async fn delete_quietly(&self, chat_id: i64, message_id: i32) {
        if let Err(e) = self
            .bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await
        {
            warn!("Could not delete prompt {} in chat {}: {}", message_id, chat_id, e);
        }
    }

    /// Sends a force-reply prompt to a chat that has a wallet.
    pub async fn prompt_for(&self, chat_id: i64, kind: PromptKind) -> Result<()> {
        if self.require_user(chat_id).await?.is_none() {
            return Ok(());
        }
        self.send_prompt(chat_id, kind).await?;
        Ok(())
    }

    /// Active user for the chat, or `None` after telling the user to /start.
    async fn require_user(&self, chat_id: i64) -> Result<Option<User>> {
        let user = self.state.users.find_one(&UserFilter::by_chat_id(chat_id))?;
        if user.is_none() {
            self.send_html(
                chat_id,
                "👋 You don't have a wallet yet. Send /start to create one.".to_string(),
            )
            .await?;
        }
        Ok(user)
    }

    async fn submit_order(
        &self,
        chat_id: i64,
        user: &User,
        action: TradeAction,
        amount: f64,
        mint: &str,
    ) -> Result<()> {
        let order = TradeOrder::new(chat_id, &user.id, &user.wallet_address, action, amount, mint);
        self.state
            .orders
            .send(order)
            .await
            .map_err(|_| TraderbotError::OrderQueueClosed)?;
        info!("Queued {} order for user {}: {} of {}", action, user.id, amount, mint);

        let unit = match action {
            TradeAction::Buy => "SOL",
            TradeAction::Sell => "%",
        };
        self.send_html(
            chat_id,
            format!(
                "⏳ <b>{} order submitted</b>\nToken: {}\nAmount: {} {}",
                if action == TradeAction::Buy { "Buy" } else { "Sell" },
                html::code_inline(mint),
                amount,
                unit
            ),
        )
        .await?;
        Ok(())
    }

    async fn answer_pending_trade(
        &self,
        chat_id: i64,
        expected: TradeAction,
        amount: f64,
        reply_to: i32,
    ) -> Result<()> {
        let Some(user) = self.require_user(chat_id).await? else {
            return Ok(());
        };
        // the prompt stays pending so the user can answer again
        if let Some(problem) = trade_amount_problem(expected, amount) {
            self.send_html(chat_id, problem.to_string()).await?;
            return Ok(());
        }
        match self.state.pending.take(chat_id, reply_to).await {
            Some(PendingPrompt::Trade { action, mint }) if action == expected => {
                self.delete_quietly(chat_id, reply_to).await;
                self.submit_order(chat_id, &user, action, amount, &mint).await
            }
            _ => {
                self.send_html(
                    chat_id,
                    format!(
                        "⌛ This prompt has expired. Send <code>{} &lt;amount&gt; &lt;token&gt;</code> again.",
                        expected
                    ),
                )
                .await?;
                Ok(())
            }
        }
    }

    async fn update_settings<F>(
        &self,
        chat_id: i64,
        reply_to: i32,
        confirmation: String,
        change: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut UserSettings) + Send,
    {
        let Some(user) = self.require_user(chat_id).await? else {
            return Ok(());
        };
        let mut settings = user.settings.clone();
        change(&mut settings);
        self.state
            .users
            .update_one(&user.id, UserUpdate::settings(settings))?
            .ok_or_else(|| TraderbotError::UserNotFound(user.id.clone()))?;

        self.delete_quietly(chat_id, reply_to).await;
        self.send_html(chat_id, confirmation).await?;
        Ok(())
    }
}

#[async_trait]
impl IntakeActions for TelegramActions {
    async fn execute_immediate_trade(&self, chat_id: i64, command: TradeCommand) -> Result<()> {
        let Some(user) = self.require_user(chat_id).await? else {
            return Ok(());
        };
        match command.amount {
            Some(amount) => {
                if let Some(problem) = trade_amount_problem(command.action, amount) {
                    self.send_html(chat_id, problem.to_string()).await?;
                    return Ok(());
                }
                self.submit_order(chat_id, &user, command.action, amount, &command.mint)
                    .await
            }
            None => {
                let kind = match command.action {
                    TradeAction::Buy => PromptKind::BuyAmount,
                    TradeAction::Sell => PromptKind::SellPercent,
                };
                let prompt = self.send_prompt(chat_id, kind).await?;
                self.state
                    .pending
                    .remember(
                        chat_id,
                        prompt.id.0,
                        PendingPrompt::Trade {
                            action: command.action,
                            mint: command.mint,
                        },
                    )
                    .await;
                Ok(())
            }
        }
    }

    async fn buy(&self, chat_id: i64, amount_sol: f64, reply_to: i32) -> Result<()> {
        self.answer_pending_trade(chat_id, TradeAction::Buy, amount_sol, reply_to)
            .await
    }

    async fn sell(&self, chat_id: i64, percent: f64, reply_to: i32) -> Result<()> {
        self.answer_pending_trade(chat_id, TradeAction::Sell, percent, reply_to)
            .await
    }

    async fn withdraw(&self, chat_id: i64, amount_text: &str, reply_to: i32) -> Result<()> {
        if self.require_user(chat_id).await?.is_none() {
            return Ok(());
        }
        let amount_sol = match amount_text.trim().parse::<f64>() {
            Ok(amount) if amount > 0.0 => amount,
            _ => {
                self.send_html(chat_id, "❌ Enter an amount greater than zero.".to_string())
                    .await?;
                return Ok(());
            }
        };
        self.delete_quietly(chat_id, reply_to).await;
        let prompt = self.send_prompt(chat_id, PromptKind::WithdrawAddress).await?;
        self.state
            .pending
            .remember(chat_id, prompt.id.0, PendingPrompt::Withdrawal { amount_sol })
            .await;
        Ok(())
    }

    async fn withdraw_address(&self, chat_id: i64, address: &str, reply_to: i32) -> Result<()> {
        let Some(user) = self.require_user(chat_id).await? else {
            return Ok(());
        };
        let address = address.trim();
        if !is_valid_wallet_address(address) {
            self.send_html(chat_id, "❌ That is not a valid Solana address.".to_string())
                .await?;
            return Ok(());
        }
        match self.state.pending.take(chat_id, reply_to).await {
            Some(PendingPrompt::Withdrawal { amount_sol }) => {
                info!(
                    "Withdrawal requested by user {}: {} SOL to {}",
                    user.id, amount_sol, address
                );
                self.delete_quietly(chat_id, reply_to).await;
                self.send_html(
                    chat_id,
                    format!(
                        "📤 <b>Withdrawal requested</b>\nAmount: {} SOL\nTo: {}",
                        amount_sol,
                        html::code_inline(address)
                    ),
                )
                .await?;
            }
            _ => {
                self.send_html(
                    chat_id,
                    "⌛ This withdrawal prompt has expired. Start the withdrawal again.".to_string(),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn set_slippage(&self, chat_id: i64, percent: f64, reply_to: i32) -> Result<()> {
        self.update_settings(
            chat_id,
            reply_to,
            format!("✅ Slippage set to <b>{}%</b>", percent),
            move |settings| settings.slippage_percent = percent,
        )
        .await
    }

    async fn set_buy_preset(&self, chat_id: i64, amount_sol: f64, reply_to: i32) -> Result<()> {
        self.update_settings(
            chat_id,
            reply_to,
            format!("✅ Custom buy amount set to <b>{} SOL</b>", amount_sol),
            move |settings| settings.custom_buy_amount_sol = Some(amount_sol),
        )
        .await
    }

    async fn set_auto_buy_amount(&self, chat_id: i64, amount_sol: f64, reply_to: i32) -> Result<()> {
        self.update_settings(
            chat_id,
            reply_to,
            format!("✅ Auto buy amount set to <b>{} SOL</b>", amount_sol),
            move |settings| settings.auto_buy_amount_sol = amount_sol,
        )
        .await
    }

    async fn set_gas_fee(&self, chat_id: i64, fee_sol: f64, reply_to: i32) -> Result<()> {
        self.update_settings(
            chat_id,
            reply_to,
            format!("✅ Gas fee set to <b>{} SOL</b>", fee_sol),
            move |settings| settings.gas_fee_sol = fee_sol,
        )
        .await
    }

    async fn set_jito_fee(&self, chat_id: i64, fee_sol: f64, reply_to: i32) -> Result<()> {
        self.update_settings(
            chat_id,
            reply_to,
            format!("✅ Jito tip set to <b>{} SOL</b>", fee_sol),
            move |settings| settings.jito_fee_sol = fee_sol,
        )
        .await
    }

    async fn show_contract_info(&self, chat_id: i64, mint: &str) -> Result<()> {
        self.send_html(
            chat_id,
            format!(
                "🪙 <b>Token</b>\n{}\n\n<a href=\"https://birdeye.so/solana/token/{}\">View on Birdeye</a>\n\nSend <code>buy &lt;amount&gt; {}</code> to trade it.",
                html::code_inline(mint),
                mint,
                mint
            ),
        )
        .await?;
        Ok(())
    }
}

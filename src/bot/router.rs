//! Decides what an inbound text message means and hands it to the matching action.

use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{debug, error, warn};

use crate::bot::actions::{IntakeActions, TelegramActions, MIN_JITO_FEE_SOL};
use crate::bot::parser::{is_valid_wallet_address, parse_trade_command, LinkEntity};
use crate::bot::prompts::PromptKind;
use crate::bot::BotState;
use crate::error::{Result, TraderbotError};
use crate::models::TradeCommand;

lazy_static! {
    static ref REPLY_NUMBER: Regex = Regex::new(r"^[0-9]+(\.[0-9]+)?$").unwrap();
}

/// The message a user replied to.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyContext {
    pub message_id: i32,
    /// Rendered text of the replied message; `None` for photos, stickers, etc.
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub text: String,
    pub links: Vec<LinkEntity>,
    pub reply_to: Option<ReplyContext>,
}

impl IncomingMessage {
    /// `None` for messages without text.
    pub fn from_telegram(msg: &Message) -> Option<Self> {
        let text = msg.text()?;
        Some(Self {
            chat_id: msg.chat.id.0,
            text: text.to_string(),
            links: LinkEntity::from_message(msg),
            reply_to: msg.reply_to_message().map(|reply| ReplyContext {
                message_id: reply.id.0,
                text: reply.text().map(str::to_string),
            }),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    ImmediateTrade(TradeCommand),
    Buy { amount_sol: f64, reply_to: i32 },
    Sell { percent: f64, reply_to: i32 },
    Withdraw { amount_text: String, reply_to: i32 },
    WithdrawAddress { address: String, reply_to: i32 },
    SetSlippage { percent: f64, reply_to: i32 },
    SetBuyPreset { amount_sol: f64, reply_to: i32 },
    SetAutoBuyAmount { amount_sol: f64, reply_to: i32 },
    SetGasFee { fee_sol: f64, reply_to: i32 },
    SetJitoFee { fee_sol: f64, reply_to: i32 },
    ContractInfo { mint: String },
    Ignore,
}

fn route_numeric_reply(prompt: Option<PromptKind>, text: &str, reply_to: i32) -> Route {
    let amount = match text.parse::<f64>() {
        Ok(amount) if amount.is_finite() => amount,
        _ => return Route::Ignore,
    };
    match prompt {
        Some(PromptKind::BuyAmount) => Route::Buy {
            amount_sol: amount,
            reply_to,
        },
        Some(PromptKind::SellPercent) => Route::Sell {
            percent: amount,
            reply_to,
        },
        Some(PromptKind::WithdrawAmount) => Route::Withdraw {
            amount_text: text.to_string(),
            reply_to,
        },
        Some(PromptKind::Slippage) => Route::SetSlippage {
            percent: amount,
            reply_to,
        },
        Some(PromptKind::BuyPreset) => Route::SetBuyPreset {
            amount_sol: amount,
            reply_to,
        },
        Some(PromptKind::AutoBuyAmount) => Route::SetAutoBuyAmount {
            amount_sol: amount,
            reply_to,
        },
        Some(PromptKind::GasFee) => Route::SetGasFee {
            fee_sol: amount,
            reply_to,
        },
        Some(PromptKind::JitoFee) => Route::SetJitoFee {
            fee_sol: if amount > MIN_JITO_FEE_SOL {
                amount
            } else {
                MIN_JITO_FEE_SOL
            },
            reply_to,
        },
        Some(PromptKind::WithdrawAddress) | None => Route::Ignore,
    }
}

/// Pure routing decision; performs no I/O.
pub fn route_message(msg: &IncomingMessage) -> Route {
    if msg.reply_to.is_none() {
        if let Some(command) = parse_trade_command(&msg.text, &msg.links) {
            return Route::ImmediateTrade(command);
        }
    }

    if let Some(ReplyContext {
        message_id,
        text: Some(replied_text),
    }) = &msg.reply_to
    {
        let prompt = PromptKind::from_reply_text(replied_text);
        // A reply to a prompt is never reinterpreted as anything else.
        if REPLY_NUMBER.is_match(&msg.text) {
            return route_numeric_reply(prompt, &msg.text, *message_id);
        }
        return match prompt {
            Some(PromptKind::WithdrawAddress) => Route::WithdrawAddress {
                address: msg.text.clone(),
                reply_to: *message_id,
            },
            _ => Route::Ignore,
        };
    }

    if is_valid_wallet_address(&msg.text) {
        return Route::ContractInfo {
            mint: msg.text.trim().to_string(),
        };
    }

    Route::Ignore
}

pub async fn dispatch<A>(actions: &A, msg: &IncomingMessage, route: Route) -> Result<()>
where
    A: IntakeActions + ?Sized,
{
    let chat_id = msg.chat_id;
    match route {
        Route::ImmediateTrade(command) => actions.execute_immediate_trade(chat_id, command).await,
        Route::Buy {
            amount_sol,
            reply_to,
        } => actions.buy(chat_id, amount_sol, reply_to).await,
        Route::Sell { percent, reply_to } => actions.sell(chat_id, percent, reply_to).await,
        Route::Withdraw {
            amount_text,
            reply_to,
        } => actions.withdraw(chat_id, &amount_text, reply_to).await,
        Route::WithdrawAddress { address, reply_to } => {
            actions.withdraw_address(chat_id, &address, reply_to).await
        }
        Route::SetSlippage { percent, reply_to } => {
            actions.set_slippage(chat_id, percent, reply_to).await
        }
        Route::SetBuyPreset {
            amount_sol,
            reply_to,
        } => actions.set_buy_preset(chat_id, amount_sol, reply_to).await,
        Route::SetAutoBuyAmount {
            amount_sol,
            reply_to,
        } => actions.set_auto_buy_amount(chat_id, amount_sol, reply_to).await,
        Route::SetGasFee { fee_sol, reply_to } => {
            actions.set_gas_fee(chat_id, fee_sol, reply_to).await
        }
        Route::SetJitoFee { fee_sol, reply_to } => {
            actions.set_jito_fee(chat_id, fee_sol, reply_to).await
        }
        Route::ContractInfo { mint } => actions.show_contract_info(chat_id, &mint).await,
        Route::Ignore => Ok(()),
    }
}

/// teloxide endpoint for plain (non-command) messages.
pub async fn message_handler(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(incoming) = IncomingMessage::from_telegram(&msg) else {
        return Ok(());
    };
    let route = route_message(&incoming);
    debug!("Chat {} routed to {:?}", incoming.chat_id, route);

    let actions = TelegramActions::new(bot, state);
    match dispatch(&actions, &incoming, route).await {
        Ok(()) => Ok(()),
        Err(TraderbotError::Telegram(e)) => Err(e),
        Err(e) if e.is_fatal() => {
            error!("Fatal error while handling chat {}: {}", incoming.chat_id, e);
            Ok(())
        }
        Err(e) => {
            warn!("Message from chat {} not handled: {}", incoming.chat_id, e);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

    fn message(text: &str) -> IncomingMessage {
        IncomingMessage {
            chat_id: 42,
            text: text.to_string(),
            links: Vec::new(),
            reply_to: None,
        }
    }

    fn reply(text: &str, prompt: PromptKind) -> IncomingMessage {
        IncomingMessage {
            reply_to: Some(ReplyContext {
                message_id: 7,
                text: Some(prompt.display_text()),
            }),
            ..message(text)
        }
    }

    #[test]
    fn test_immediate_trade() {
        let route = route_message(&message(&format!("buy 1.5 {}", BONK)));
        match route {
            Route::ImmediateTrade(command) => {
                assert_eq!(command.amount, Some(1.5));
                assert_eq!(command.mint, BONK);
            }
            other => panic!("unexpected route {:?}", other),
        }
    }

    #[test]
    fn test_replies_never_trigger_immediate_trades() {
        let msg = reply(&format!("buy 1 {}", BONK), PromptKind::BuyAmount);
        assert_eq!(route_message(&msg), Route::Ignore);
    }

    #[test]
    fn test_numeric_replies_by_prompt() {
        assert_eq!(
            route_message(&reply("0.25", PromptKind::BuyAmount)),
            Route::Buy { amount_sol: 0.25, reply_to: 7 }
        );
        assert_eq!(
            route_message(&reply("50", PromptKind::SellPercent)),
            Route::Sell { percent: 50.0, reply_to: 7 }
        );
        assert_eq!(
            route_message(&reply("1.0", PromptKind::WithdrawAmount)),
            Route::Withdraw { amount_text: "1.0".to_string(), reply_to: 7 }
        );
        assert_eq!(
            route_message(&reply("15", PromptKind::Slippage)),
            Route::SetSlippage { percent: 15.0, reply_to: 7 }
        );
        assert_eq!(
            route_message(&reply("2", PromptKind::BuyPreset)),
            Route::SetBuyPreset { amount_sol: 2.0, reply_to: 7 }
        );
        assert_eq!(
            route_message(&reply("0.3", PromptKind::AutoBuyAmount)),
            Route::SetAutoBuyAmount { amount_sol: 0.3, reply_to: 7 }
        );
        assert_eq!(
            route_message(&reply("0.01", PromptKind::GasFee)),
            Route::SetGasFee { fee_sol: 0.01, reply_to: 7 }
        );
    }

    #[test]
    fn test_jito_fee_is_clamped_to_minimum() {
        assert_eq!(
            route_message(&reply("0.00001", PromptKind::JitoFee)),
            Route::SetJitoFee { fee_sol: 0.0001, reply_to: 7 }
        );
        assert_eq!(
            route_message(&reply("0.0001", PromptKind::JitoFee)),
            Route::SetJitoFee { fee_sol: 0.0001, reply_to: 7 }
        );
        assert_eq!(
            route_message(&reply("0.002", PromptKind::JitoFee)),
            Route::SetJitoFee { fee_sol: 0.002, reply_to: 7 }
        );
    }

    #[test]
    fn test_overflowing_numeric_reply_is_ignored() {
        let digits = "9".repeat(400);
        for prompt in PromptKind::ALL {
            assert_eq!(route_message(&reply(&digits, prompt)), Route::Ignore);
        }
        let fraction = format!("{}.5", digits);
        assert_eq!(route_message(&reply(&fraction, PromptKind::Slippage)), Route::Ignore);
    }

    #[test]
    fn test_overflowing_trade_amount_asks_for_one() {
        let route = route_message(&message(&format!("buy {} {}", "9".repeat(400), BONK)));
        match route {
            Route::ImmediateTrade(command) => {
                assert_eq!(command.amount, None);
                assert_eq!(command.mint, BONK);
            }
            other => panic!("unexpected route {:?}", other),
        }
    }

    #[test]
    fn test_withdraw_address_reply() {
        assert_eq!(
            route_message(&reply(BONK, PromptKind::WithdrawAddress)),
            Route::WithdrawAddress { address: BONK.to_string(), reply_to: 7 }
        );
        // numbers are not addresses
        assert_eq!(route_message(&reply("12", PromptKind::WithdrawAddress)), Route::Ignore);
    }

    #[test]
    fn test_non_numeric_reply_to_amount_prompt_is_ignored() {
        assert_eq!(route_message(&reply("lots", PromptKind::BuyAmount)), Route::Ignore);
        assert_eq!(route_message(&reply(" 1", PromptKind::BuyAmount)), Route::Ignore);
        assert_eq!(route_message(&reply(BONK, PromptKind::Slippage)), Route::Ignore);
    }

    #[test]
    fn test_reply_to_unknown_prompt_is_ignored() {
        let msg = IncomingMessage {
            reply_to: Some(ReplyContext {
                message_id: 3,
                text: Some("Some older message".to_string()),
            }),
            ..message(BONK)
        };
        // even a valid address does not fall through to contract info
        assert_eq!(route_message(&msg), Route::Ignore);
    }

    #[test]
    fn test_reply_without_text_falls_through_to_contract_info() {
        let msg = IncomingMessage {
            reply_to: Some(ReplyContext {
                message_id: 3,
                text: None,
            }),
            ..message(BONK)
        };
        assert_eq!(route_message(&msg), Route::ContractInfo { mint: BONK.to_string() });
    }

    #[test]
    fn test_bare_address_shows_contract_info() {
        assert_eq!(
            route_message(&message(BONK)),
            Route::ContractInfo { mint: BONK.to_string() }
        );
        assert_eq!(route_message(&message("hello there")), Route::Ignore);
        assert_eq!(route_message(&message("buy")), Route::Ignore);
    }

    #[derive(Default)]
    struct RecordingActions {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingActions {
        fn record(&self, call: String) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IntakeActions for RecordingActions {
        async fn execute_immediate_trade(&self, chat_id: i64, command: TradeCommand) -> Result<()> {
            self.record(format!("trade {} {} {:?} {}", chat_id, command.action, command.amount, command.mint))
        }
        async fn buy(&self, chat_id: i64, amount_sol: f64, reply_to: i32) -> Result<()> {
            self.record(format!("buy {} {} {}", chat_id, amount_sol, reply_to))
        }
        async fn sell(&self, chat_id: i64, percent: f64, reply_to: i32) -> Result<()> {
            self.record(format!("sell {} {} {}", chat_id, percent, reply_to))
        }
        async fn withdraw(&self, chat_id: i64, amount_text: &str, reply_to: i32) -> Result<()> {
            self.record(format!("withdraw {} {} {}", chat_id, amount_text, reply_to))
        }
        async fn withdraw_address(&self, chat_id: i64, address: &str, reply_to: i32) -> Result<()> {
            self.record(format!("withdraw_address {} {} {}", chat_id, address, reply_to))
        }
        async fn set_slippage(&self, chat_id: i64, percent: f64, reply_to: i32) -> Result<()> {
            self.record(format!("slippage {} {} {}", chat_id, percent, reply_to))
        }
        async fn set_buy_preset(&self, chat_id: i64, amount_sol: f64, reply_to: i32) -> Result<()> {
            self.record(format!("preset {} {} {}", chat_id, amount_sol, reply_to))
        }
        async fn set_auto_buy_amount(&self, chat_id: i64, amount_sol: f64, reply_to: i32) -> Result<()> {
            self.record(format!("auto_buy {} {} {}", chat_id, amount_sol, reply_to))
        }
        async fn set_gas_fee(&self, chat_id: i64, fee_sol: f64, reply_to: i32) -> Result<()> {
            self.record(format!("gas {} {} {}", chat_id, fee_sol, reply_to))
        }
        async fn set_jito_fee(&self, chat_id: i64, fee_sol: f64, reply_to: i32) -> Result<()> {
            self.record(format!("jito {} {} {}", chat_id, fee_sol, reply_to))
        }
        async fn show_contract_info(&self, chat_id: i64, mint: &str) -> Result<()> {
            self.record(format!("info {} {}", chat_id, mint))
        }
    }

    async fn route_and_dispatch(actions: &RecordingActions, msg: IncomingMessage) {
        let route = route_message(&msg);
        dispatch(actions, &msg, route).await.unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_reaches_matching_action() {
        let actions = RecordingActions::default();

        route_and_dispatch(&actions, message(&format!("sell {}", BONK))).await;
        route_and_dispatch(&actions, reply("0.5", PromptKind::BuyAmount)).await;
        route_and_dispatch(&actions, reply("25", PromptKind::SellPercent)).await;
        route_and_dispatch(&actions, reply("3", PromptKind::WithdrawAmount)).await;
        route_and_dispatch(&actions, reply(BONK, PromptKind::WithdrawAddress)).await;
        route_and_dispatch(&actions, reply("12", PromptKind::Slippage)).await;
        route_and_dispatch(&actions, reply("1", PromptKind::BuyPreset)).await;
        route_and_dispatch(&actions, reply("2", PromptKind::AutoBuyAmount)).await;
        route_and_dispatch(&actions, reply("0.004", PromptKind::GasFee)).await;
        route_and_dispatch(&actions, reply("0", PromptKind::JitoFee)).await;
        route_and_dispatch(&actions, message(BONK)).await;
        route_and_dispatch(&actions, message("gm")).await;

        assert_eq!(
            actions.calls(),
            vec![
                format!("trade 42 sell None {}", BONK),
                "buy 42 0.5 7".to_string(),
                "sell 42 25 7".to_string(),
                "withdraw 42 3 7".to_string(),
                format!("withdraw_address 42 {} 7", BONK),
                "slippage 42 12 7".to_string(),
                "preset 42 1 7".to_string(),
                "auto_buy 42 2 7".to_string(),
                "gas 42 0.004 7".to_string(),
                "jito 42 0.0001 7".to_string(),
                format!("info 42 {}", BONK),
            ]
        );
    }

    struct FailingActions;

    #[async_trait]
    impl IntakeActions for FailingActions {
        async fn execute_immediate_trade(&self, _: i64, _: TradeCommand) -> Result<()> {
            Err(TraderbotError::MissingKeyMaterial)
        }
        async fn buy(&self, _: i64, _: f64, _: i32) -> Result<()> {
            Err(TraderbotError::UserNotFound("42".to_string()))
        }
        async fn sell(&self, _: i64, _: f64, _: i32) -> Result<()> { Ok(()) }
        async fn withdraw(&self, _: i64, _: &str, _: i32) -> Result<()> { Ok(()) }
        async fn withdraw_address(&self, _: i64, _: &str, _: i32) -> Result<()> { Ok(()) }
        async fn set_slippage(&self, _: i64, _: f64, _: i32) -> Result<()> { Ok(()) }
        async fn set_buy_preset(&self, _: i64, _: f64, _: i32) -> Result<()> { Ok(()) }
        async fn set_auto_buy_amount(&self, _: i64, _: f64, _: i32) -> Result<()> { Ok(()) }
        async fn set_gas_fee(&self, _: i64, _: f64, _: i32) -> Result<()> { Ok(()) }
        async fn set_jito_fee(&self, _: i64, _: f64, _: i32) -> Result<()> { Ok(()) }
        async fn show_contract_info(&self, _: i64, _: &str) -> Result<()> { Ok(()) }
    }

    #[tokio::test]
    async fn test_dispatch_surfaces_branch_errors() {
        let trade = message(&format!("buy 1 {}", BONK));
        let result = dispatch(&FailingActions, &trade, route_message(&trade)).await;
        assert!(matches!(result, Err(ref e) if e.is_fatal()));

        let buy = reply("1", PromptKind::BuyAmount);
        let result = dispatch(&FailingActions, &buy, route_message(&buy)).await;
        assert!(matches!(result, Err(ref e) if !e.is_fatal()));

        let ignored = message("nothing to see");
        assert!(dispatch(&FailingActions, &ignored, route_message(&ignored)).await.is_ok());
    }
}

use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use teloxide::utils::html;
use tracing::{error, info, warn};

use crate::bot::actions::TelegramActions;
use crate::bot::prompts::PromptKind;
use crate::bot::router;
use crate::bot::BotState;
use crate::error::{Result, TraderbotError};
use crate::models::{NewUser, User, UserFilter, UserSettings};
use crate::solana::wallet::{generate_wallet, key_matches_address};
use crate::storage::UserRepository;

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Create your wallet & show the main menu")]
    Start,
    #[command(description = "Show this help message")]
    Help,
    #[command(description = "Show your wallet address")]
    Wallet,
    #[command(description = "Show your trade settings")]
    Settings,
    #[command(description = "Withdraw SOL to another wallet")]
    Withdraw,
    #[command(description = "Set slippage tolerance")]
    Slippage,
    #[command(description = "Set your custom buy amount")]
    BuyPreset,
    #[command(description = "Set the auto buy amount")]
    AutoBuy,
    #[command(description = "Set the priority fee")]
    GasFee,
    #[command(description = "Set the Jito tip")]
    JitoFee,
}

impl Command {
    /// Prompt a command opens, for commands answered by a reply.
    pub fn prompt(&self) -> Option<PromptKind> {
        match self {
            Command::Withdraw => Some(PromptKind::WithdrawAmount),
            Command::Slippage => Some(PromptKind::Slippage),
            Command::BuyPreset => Some(PromptKind::BuyPreset),
            Command::AutoBuy => Some(PromptKind::AutoBuyAmount),
            Command::GasFee => Some(PromptKind::GasFee),
            Command::JitoFee => Some(PromptKind::JitoFee),
            Command::Start | Command::Help | Command::Wallet | Command::Settings => None,
        }
    }
}

const TRADE_HELP: &str = "\n\nTrade by sending a message like:\n\
    <code>buy 0.5 &lt;token address or Birdeye link&gt;</code>\n\
    <code>sell 50 &lt;token address&gt;</code>\n\n\
    /settings shows your trade settings, /withdraw moves SOL out.";

fn wallet_message(user: &User, greeting: &str) -> String {
    format!(
        "{}\n\n<b>Wallet:</b> {}{}",
        greeting,
        html::code_inline(&user.wallet_address),
        TRADE_HELP
    )
}

async fn start(bot: &Bot, msg: &Message, state: &BotState) -> Result<()> {
    let chat_id = msg.chat.id;
    let wallet = generate_wallet();
    let referrer_code = msg
        .text()
        .and_then(UserRepository::extract_unique_code)
        .map(str::to_string);
    let (user, created) = state.users.create_if_absent(NewUser {
        chat_id: chat_id.0,
        username: msg.from().and_then(|from| from.username.clone()),
        wallet_address: wallet.address.to_string(),
        private_key: wallet.private_key,
        referrer_code,
        nonce: 0,
    })?;

    let greeting = if created {
        info!("New wallet {} created for chat {}", user.wallet_address, chat_id);
        "🤖 <b>Welcome!</b> A new Solana wallet was created for you."
    } else {
        "🤖 <b>Welcome back!</b>"
    };

    bot.send_message(chat_id, wallet_message(&user, greeting))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

async fn wallet(bot: &Bot, msg: &Message, state: &BotState) -> Result<()> {
    let chat_id = msg.chat.id;
    let user = state
        .users
        .find_one(&UserFilter::by_chat_id(chat_id.0))?
        .ok_or_else(|| TraderbotError::UserNotFound(chat_id.to_string()))?;

    if !key_matches_address(&user.private_key, &user.wallet_address) {
        warn!(
            "Stored key of user {} does not match wallet {}",
            user.id, user.wallet_address
        );
    }

    bot.send_message(chat_id, wallet_message(&user, "💼 <b>Your wallet</b>"))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

fn settings_message(settings: &UserSettings) -> String {
    let custom_buy = settings
        .custom_buy_amount_sol
        .map_or_else(|| "not set".to_string(), |amount| format!("{} SOL", amount));
    format!(
        "⚙️ <b>Settings</b>\n\
         Slippage: {}% (/slippage)\n\
         Custom buy: {} (/buypreset)\n\
         Auto buy: {} SOL (/autobuy)\n\
         Gas fee: {} SOL (/gasfee)\n\
         Jito tip: {} SOL (/jitofee)",
        settings.slippage_percent,
        custom_buy,
        settings.auto_buy_amount_sol,
        settings.gas_fee_sol,
        settings.jito_fee_sol
    )
}

async fn settings(bot: &Bot, msg: &Message, state: &BotState) -> Result<()> {
    let chat_id = msg.chat.id;
    let user = state
        .users
        .find_one(&UserFilter::by_chat_id(chat_id.0))?
        .ok_or_else(|| TraderbotError::UserNotFound(chat_id.to_string()))?;

    bot.send_message(chat_id, settings_message(&user.settings))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

pub async fn command_handler(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: Arc<BotState>,
) -> ResponseResult<()> {
    let chat_id = msg.chat.id;
    info!("Received command: {:?} from chat: {}", cmd, chat_id);

    let result = match cmd {
        Command::Start => start(&bot, &msg, &state).await,
        Command::Help => {
            bot.send_message(chat_id, Command::descriptions().to_string())
                .await?;
            Ok(())
        }
        Command::Wallet => wallet(&bot, &msg, &state).await,
        Command::Settings => settings(&bot, &msg, &state).await,
        Command::Withdraw
        | Command::Slippage
        | Command::BuyPreset
        | Command::AutoBuy
        | Command::GasFee
        | Command::JitoFee => match cmd.prompt() {
            Some(kind) => {
                TelegramActions::new(bot.clone(), state.clone())
                    .prompt_for(chat_id.0, kind)
                    .await
            }
            None => Ok(()),
        },
    };

    match result {
        Ok(()) => Ok(()),
        Err(TraderbotError::Telegram(e)) => Err(e),
        Err(TraderbotError::UserNotFound(_)) => {
            bot.send_message(chat_id, "👋 You don't have a wallet yet. Send /start to create one.")
                .await?;
            Ok(())
        }
        Err(e) => {
            if e.is_fatal() {
                error!("Fatal error while handling {:?} in chat {}: {}", cmd_name(&msg), chat_id, e);
            } else {
                warn!("Command {:?} failed in chat {}: {}", cmd_name(&msg), chat_id, e);
            }
            bot.send_message(chat_id, "❌ Something went wrong. Please try again later.")
                .await?;
            Ok(())
        }
    }
}

fn cmd_name(msg: &Message) -> Option<&str> {
    msg.text().and_then(|text| text.split_whitespace().next())
}

pub async fn start_bot(bot: Bot, state: Arc<BotState>) -> anyhow::Result<()> {
    bot.set_my_commands(Command::bot_commands()).await?;

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(command_handler),
        )
        .branch(Update::filter_message().endpoint(router::message_handler));

    info!("Dispatcher starting");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

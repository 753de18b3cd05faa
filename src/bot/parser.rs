//! Immediate trade commands typed straight into the chat:
//!
//! ```text
//! buy 0.5 https://birdeye.so/solana/token/<mint>
//! sell <mint>
//! buy 1 Birdeye            (where "Birdeye" is a hyperlink to the token page)
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use teloxide::types::{Message, MessageEntityKind};
use tracing::debug;

use crate::models::{TradeAction, TradeCommand};

lazy_static! {
    static ref TRADE_PREFIX: Regex = Regex::new(r"(?i)^(buy|sell)\b").unwrap();
    // The amount must be a whole token so a mint starting with digits is never split.
    static ref AMOUNT: Regex = Regex::new(r"^([0-9]+(?:\.[0-9]+)?)(?:\s+|$)").unwrap();
    static ref BIRDEYE_TOKEN_URL: Regex =
        Regex::new(r"(?i:birdeye\.so/solana/token/)([1-9A-HJ-NP-Za-km-z]{32,44})\b").unwrap();
    static ref BASE58_ADDRESS: Regex = Regex::new(r"\b([1-9A-HJ-NP-Za-km-z]{32,44})\b").unwrap();
}

/// A hyperlink hidden behind message text. Offsets are UTF-16 code units, as Telegram sends them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntity {
    pub offset: usize,
    pub length: usize,
    pub url: String,
}

impl LinkEntity {
    pub fn new(offset: usize, length: usize, url: &str) -> Self {
        Self {
            offset,
            length,
            url: url.to_string(),
        }
    }

    /// Text the link is attached to, or `None` if the offsets don't fit `text`.
    pub fn anchor_text(&self, text: &str) -> Option<String> {
        let units: Vec<u16> = text.encode_utf16().collect();
        let end = self.offset.checked_add(self.length)?;
        let slice = units.get(self.offset..end)?;
        String::from_utf16(slice).ok()
    }

    /// Hyperlink entities (`text_link`) of a Telegram message.
    pub fn from_message(msg: &Message) -> Vec<Self> {
        msg.entities()
            .unwrap_or_default()
            .iter()
            .filter_map(|entity| match &entity.kind {
                MessageEntityKind::TextLink { url } => {
                    Some(Self::new(entity.offset, entity.length, url.as_str()))
                }
                _ => None,
            })
            .collect()
    }
}

fn birdeye_mint(haystack: &str) -> Option<String> {
    BIRDEYE_TOKEN_URL
        .captures(haystack)
        .map(|caps| caps[1].to_string())
}

fn bare_mint(haystack: &str) -> Option<String> {
    BASE58_ADDRESS
        .captures(haystack)
        .map(|caps| caps[1].to_string())
}

/// Link entities win over anything written in the text, regardless of position.
fn extract_mint(text: &str, remainder: &str, links: &[LinkEntity]) -> Option<String> {
    for link in links {
        if let Some(mint) = birdeye_mint(&link.url) {
            debug!(
                "Mint {} taken from hyperlink over {:?}",
                mint,
                link.anchor_text(text)
            );
            return Some(mint);
        }
    }
    birdeye_mint(remainder).or_else(|| bare_mint(remainder))
}

/// True when the whole text is a Solana public key.
pub fn is_valid_wallet_address(text: &str) -> bool {
    Pubkey::from_str(text.trim()).is_ok()
}

/// Returns `None` for anything that is not a complete `buy`/`sell` command.
pub fn parse_trade_command(text: &str, links: &[LinkEntity]) -> Option<TradeCommand> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let prefix = TRADE_PREFIX.captures(trimmed)?;
    let action = if prefix[1].eq_ignore_ascii_case("buy") {
        TradeAction::Buy
    } else {
        TradeAction::Sell
    };
    let mut remainder = trimmed[prefix[0].len()..].trim_start();

    let mut amount = None;
    if let Some(caps) = AMOUNT.captures(remainder) {
        // Enough digits overflow to infinity, which is no amount at all.
        amount = caps[1].parse::<f64>().ok().filter(|value| value.is_finite());
        remainder = remainder[caps[0].len()..].trim_start();
    }

    let mint = extract_mint(text, remainder, links)?;

    Some(TradeCommand {
        action,
        amount,
        mint,
    })
}

//! Force-reply prompts the bot sends, and recognition of replies to them.
//!
//! Telegram hands back the replied-to message as rendered text, without the HTML
//! markup it was sent with, so prompts are identified by comparing that text with
//! each template after stripping its tags.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref MARKUP_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
}

pub const BUY_XSOL_TEXT: &str =
    "🟢 <b>Buy Token</b>\nReply with the amount of SOL you want to spend.";
pub const SELL_XPRO_TEXT: &str =
    "🔴 <b>Sell Token</b>\nReply with the percentage of your holdings to sell.";
pub const WITHDRAW_XTOKEN_TEXT: &str =
    "💸 <b>Withdraw</b>\nReply with the amount of SOL to withdraw.";
pub const WITHDRAW_TOKEN_AMT_TEXT: &str =
    "💸 <b>Withdraw</b>\nReply with the wallet address to withdraw to.";
pub const SET_SLIPPAGE_TEXT: &str =
    "⚙️ <b>Slippage</b>\nReply with your slippage tolerance in percent.";
pub const PRESET_BUY_TEXT: &str =
    "⚙️ <b>Buy Preset</b>\nReply with your custom buy amount in SOL.";
pub const AUTO_BUY_TEXT: &str =
    "⚙️ <b>Auto Buy</b>\nReply with the SOL amount to spend on auto buys.";
pub const SET_GAS_FEE: &str =
    "⛽ <b>Gas Fee</b>\nReply with the priority fee in SOL.";
pub const SET_JITO_FEE: &str =
    "⚡ <b>Jito Tip</b>\nReply with the Jito tip in SOL (minimum 0.0001).";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    BuyAmount,
    SellPercent,
    WithdrawAmount,
    WithdrawAddress,
    Slippage,
    BuyPreset,
    AutoBuyAmount,
    GasFee,
    JitoFee,
}

impl PromptKind {
    pub const ALL: [PromptKind; 9] = [
        PromptKind::BuyAmount,
        PromptKind::SellPercent,
        PromptKind::WithdrawAmount,
        PromptKind::WithdrawAddress,
        PromptKind::Slippage,
        PromptKind::BuyPreset,
        PromptKind::AutoBuyAmount,
        PromptKind::GasFee,
        PromptKind::JitoFee,
    ];

    /// HTML template sent to the user.
    pub fn template(&self) -> &'static str {
        match self {
            Self::BuyAmount => BUY_XSOL_TEXT,
            Self::SellPercent => SELL_XPRO_TEXT,
            Self::WithdrawAmount => WITHDRAW_XTOKEN_TEXT,
            Self::WithdrawAddress => WITHDRAW_TOKEN_AMT_TEXT,
            Self::Slippage => SET_SLIPPAGE_TEXT,
            Self::BuyPreset => PRESET_BUY_TEXT,
            Self::AutoBuyAmount => AUTO_BUY_TEXT,
            Self::GasFee => SET_GAS_FEE,
            Self::JitoFee => SET_JITO_FEE,
        }
    }

    /// The template as Telegram shows it back in `reply_to_message.text`.
    pub fn display_text(&self) -> String {
        strip_markup(self.template())
    }

    /// Exact match against the stripped templates.
    pub fn from_reply_text(text: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.display_text() == text)
    }
}

pub fn strip_markup(text: &str) -> String {
    MARKUP_TAG.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_strip_markup() {
        assert_eq!(strip_markup("<b>Bold</b> and <i>it</i>"), "Bold and it");
        assert_eq!(strip_markup("no tags"), "no tags");
        assert_eq!(strip_markup("<a href=\"x\">link</a>"), "link");
    }

    #[test]
    fn test_every_prompt_recognized_from_rendered_text() {
        for kind in PromptKind::ALL {
            assert_eq!(PromptKind::from_reply_text(&kind.display_text()), Some(kind));
        }
    }

    #[test]
    fn test_display_texts_are_distinct() {
        let texts: HashSet<String> = PromptKind::ALL.iter().map(|k| k.display_text()).collect();
        assert_eq!(texts.len(), PromptKind::ALL.len());
    }

    #[test]
    fn test_raw_template_or_edited_text_not_recognized() {
        assert_eq!(PromptKind::from_reply_text(BUY_XSOL_TEXT), None);
        let mut edited = PromptKind::BuyAmount.display_text();
        edited.push('!');
        assert_eq!(PromptKind::from_reply_text(&edited), None);
        assert_eq!(PromptKind::from_reply_text("hello"), None);
    }
}

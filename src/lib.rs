//! Message intake for a Telegram trading bot on Solana.
//!
//! Chat messages become trade commands or reply-routed settings changes, and user
//! records keep their wallet keys encrypted at rest.

pub mod bot;
pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod solana;
pub mod storage;

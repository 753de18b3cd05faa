pub mod trade;
pub mod user;

// Re-export commonly used types
pub use trade::{TradeAction, TradeCommand, TradeOrder};
pub use user::{NewUser, StoredUser, User, UserFilter, UserSettings, UserUpdate};

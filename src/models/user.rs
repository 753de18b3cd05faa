use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user trade settings edited through reply prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub slippage_percent: f64,
    pub custom_buy_amount_sol: Option<f64>,
    pub auto_buy_amount_sol: f64,
    pub gas_fee_sol: f64,
    pub jito_fee_sol: f64,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            slippage_percent: 10.0,
            custom_buy_amount_sol: None,
            auto_buy_amount_sol: 0.1,
            gas_fee_sol: 0.005,
            jito_fee_sol: 0.0001,
        }
    }
}

impl UserSettings {
    /// JSON has no infinity or NaN; such values would come back as `null`.
    pub fn is_finite(&self) -> bool {
        self.slippage_percent.is_finite()
            && self.custom_buy_amount_sol.map_or(true, f64::is_finite)
            && self.auto_buy_amount_sol.is_finite()
            && self.gas_fee_sol.is_finite()
            && self.jito_fee_sol.is_finite()
    }
}

/// User as handed to callers: private key in clear, no fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub chat_id: i64,
    pub username: Option<String>,
    pub wallet_address: String,
    pub private_key: String,
    pub referrer_code: Option<String>,
    pub retired: bool,
    pub nonce: u32,
    pub settings: UserSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User as persisted. Field names of the secret pair match records written
/// before encryption was introduced, so old documents still deserialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredUser {
    pub id: String,
    pub chat_id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub wallet_address: String,
    #[serde(rename = "private_key", default)]
    pub private_key_ciphertext: String,
    #[serde(rename = "private_key_hash", default, skip_serializing_if = "Option::is_none")]
    pub private_key_fingerprint: Option<String>,
    #[serde(default)]
    pub referrer_code: Option<String>,
    #[serde(default)]
    pub retired: bool,
    #[serde(default)]
    pub nonce: u32,
    #[serde(default)]
    pub settings: UserSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredUser {
    pub fn from_new(new_user: NewUser) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            chat_id: new_user.chat_id,
            username: new_user.username,
            wallet_address: new_user.wallet_address,
            private_key_ciphertext: String::new(),
            private_key_fingerprint: None,
            referrer_code: new_user.referrer_code,
            retired: false,
            nonce: new_user.nonce,
            settings: UserSettings::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Converts to the caller-facing shape; the fingerprint is dropped here.
    pub fn into_user(self, private_key: String) -> User {
        User {
            id: self.id,
            chat_id: self.chat_id,
            username: self.username,
            wallet_address: self.wallet_address,
            private_key,
            referrer_code: self.referrer_code,
            retired: self.retired,
            nonce: self.nonce,
            settings: self.settings,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Applies every non-secret field of `update`. The secret pair is sealed by the repository.
    pub fn apply(&mut self, update: &UserUpdate) {
        if let Some(username) = &update.username {
            self.username = Some(username.clone());
        }
        if let Some(wallet_address) = &update.wallet_address {
            self.wallet_address = wallet_address.clone();
        }
        if let Some(referrer_code) = &update.referrer_code {
            self.referrer_code = Some(referrer_code.clone());
        }
        if let Some(retired) = update.retired {
            self.retired = retired;
        }
        if let Some(nonce) = update.nonce {
            self.nonce = nonce;
        }
        if let Some(settings) = &update.settings {
            self.settings = settings.clone();
        }
        self.updated_at = Utc::now();
    }
}

/// Request for `UserRepository::create`.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub chat_id: i64,
    pub username: Option<String>,
    pub wallet_address: String,
    /// Raw secret; encrypted before it is stored. Empty means "no key".
    pub private_key: String,
    pub referrer_code: Option<String>,
    pub nonce: u32,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub wallet_address: Option<String>,
    /// Raw secret. `Some("")` is treated like `None`.
    pub private_key: Option<String>,
    pub referrer_code: Option<String>,
    pub retired: Option<bool>,
    pub nonce: Option<u32>,
    pub settings: Option<UserSettings>,
}

impl UserUpdate {
    pub fn settings(settings: UserSettings) -> Self {
        Self {
            settings: Some(settings),
            ..Self::default()
        }
    }
}

/// Equality filter over stored users; unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilter {
    pub id: Option<String>,
    pub chat_id: Option<i64>,
    pub username: Option<String>,
    pub wallet_address: Option<String>,
    pub retired: Option<bool>,
}

impl UserFilter {
    pub fn by_chat_id(chat_id: i64) -> Self {
        Self {
            chat_id: Some(chat_id),
            ..Self::default()
        }
    }

    pub fn by_username(username: &str) -> Self {
        Self {
            username: Some(username.to_string()),
            ..Self::default()
        }
    }

    pub fn matches(&self, user: &StoredUser) -> bool {
        self.id.as_ref().map_or(true, |id| &user.id == id)
            && self.chat_id.map_or(true, |chat_id| user.chat_id == chat_id)
            && self
                .username
                .as_ref()
                .map_or(true, |name| user.username.as_ref() == Some(name))
            && self
                .wallet_address
                .as_ref()
                .map_or(true, |address| &user.wallet_address == address)
            && self.retired.map_or(true, |retired| user.retired == retired)
    }
}

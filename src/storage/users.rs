//! User persistence on top of an embedded sled tree.
//!
//! Every write seals the raw private key (ciphertext + fingerprint), every read opens
//! it again. A record whose secret cannot be opened is still returned, with the stored
//! value untouched, so a single bad document never hides the others.

use sled::transaction::ConflictableTransactionError;
use sled::Transactional;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::crypto::{fingerprint, SecretCodec};
use crate::error::{Result, TraderbotError};
use crate::models::{NewUser, StoredUser, User, UserFilter, UserUpdate};

const USERS_TREE: &str = "users";
// chat id (big endian) -> id of the user `/start` created for it
const CHAT_INDEX_TREE: &str = "users_by_chat";

/// Ciphertext and fingerprint computed from the same raw value.
#[derive(Debug, Clone)]
struct SealedSecret {
    ciphertext: String,
    fingerprint: String,
}

#[derive(Clone)]
pub struct UserRepository {
    tree: sled::Tree,
    chat_index: sled::Tree,
    codec: Arc<SecretCodec>,
}

impl UserRepository {
    pub fn open(path: impl AsRef<Path>, codec: Arc<SecretCodec>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TraderbotError::DatabaseError(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        let db = sled::open(path)?;
        info!("User database opened at {}", path.display());
        Self::with_db(&db, codec)
    }

    pub fn with_db(db: &sled::Db, codec: Arc<SecretCodec>) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(USERS_TREE)?,
            chat_index: db.open_tree(CHAT_INDEX_TREE)?,
            codec,
        })
    }

    fn seal(&self, raw: Option<&str>) -> Result<Option<SealedSecret>> {
        match raw {
            Some(raw) if !raw.is_empty() => Ok(Some(SealedSecret {
                ciphertext: self.codec.encrypt(raw)?,
                fingerprint: fingerprint(raw),
            })),
            _ => Ok(None),
        }
    }

    fn reveal(&self, stored: StoredUser) -> User {
        if stored.private_key_ciphertext.is_empty() {
            return stored.into_user(String::new());
        }
        match self.codec.decrypt(&stored.private_key_ciphertext) {
            Ok(private_key) => stored.into_user(private_key),
            Err(e) => {
                warn!(
                    "Failed to decrypt private key for user {} ({:?}): {}",
                    stored.id, stored.username, e
                );
                let kept = stored.private_key_ciphertext.clone();
                stored.into_user(kept)
            }
        }
    }

    fn encode(user: &StoredUser) -> Result<Vec<u8>> {
        if !user.settings.is_finite() {
            return Err(TraderbotError::InvalidInput(format!(
                "Settings of user {} must be finite numbers",
                user.id
            )));
        }
        Ok(serde_json::to_vec(user)?)
    }

    fn persist(&self, user: &StoredUser) -> Result<()> {
        self.tree.insert(user.id.as_bytes(), Self::encode(user)?)?;
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<StoredUser>> {
        match self.tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Matching users, oldest first. Undecodable documents are skipped.
    fn load_matching(&self, filter: &UserFilter) -> Result<Vec<StoredUser>> {
        let mut users = Vec::new();
        for entry in self.tree.iter() {
            let (key, bytes) = entry?;
            let user: StoredUser = match serde_json::from_slice(&bytes) {
                Ok(user) => user,
                Err(e) => {
                    warn!(
                        "Skipping undecodable user document {}: {}",
                        String::from_utf8_lossy(&key),
                        e
                    );
                    continue;
                }
            };
            if filter.matches(&user) {
                users.push(user);
            }
        }
        users.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(users)
    }

    fn first_matching(&self, filter: &UserFilter) -> Result<Option<StoredUser>> {
        Ok(self.load_matching(filter)?.into_iter().next())
    }

    fn apply_and_persist(
        &self,
        mut stored: StoredUser,
        update: &UserUpdate,
        sealed: Option<&SealedSecret>,
    ) -> Result<StoredUser> {
        stored.apply(update);
        if let Some(sealed) = sealed {
            stored.private_key_ciphertext = sealed.ciphertext.clone();
            stored.private_key_fingerprint = Some(sealed.fingerprint.clone());
        }
        self.persist(&stored)?;
        Ok(stored)
    }

    fn prepare(&self, new_user: NewUser) -> Result<StoredUser> {
        let sealed = self.seal(Some(new_user.private_key.as_str()))?;
        let mut stored = StoredUser::from_new(new_user);
        if let Some(sealed) = sealed {
            stored.private_key_ciphertext = sealed.ciphertext;
            stored.private_key_fingerprint = Some(sealed.fingerprint);
        }
        Ok(stored)
    }

    pub fn create(&self, new_user: NewUser) -> Result<User> {
        let stored = self.prepare(new_user)?;
        self.persist(&stored)?;
        info!("Created user {} for chat {}", stored.id, stored.chat_id);
        Ok(self.reveal(stored))
    }

    /// Active user of `new_user.chat_id`, created from `new_user` if there is none.
    /// The flag is `true` when this call created it. Concurrent calls for one chat
    /// create a single user: the document and the chat index entry are written in
    /// one sled transaction that first checks the index.
    pub fn create_if_absent(&self, new_user: NewUser) -> Result<(User, bool)> {
        if let Some(existing) = self.find_one(&UserFilter::by_chat_id(new_user.chat_id))? {
            return Ok((existing, false));
        }

        let stored = self.prepare(new_user)?;
        let document = Self::encode(&stored)?;
        let chat_key = stored.chat_id.to_be_bytes().to_vec();

        let owner = (&self.tree, &self.chat_index)
            .transaction(|(users, index)| {
                if let Some(owner_id) = index.get(&chat_key)? {
                    if let Some(bytes) = users.get(&owner_id)? {
                        // retired or unreadable owners are replaced
                        if let Ok(owner) = serde_json::from_slice::<StoredUser>(&bytes) {
                            if !owner.retired {
                                return Ok(Some(owner));
                            }
                        }
                    }
                }
                users.insert(stored.id.as_bytes(), document.clone())?;
                index.insert(chat_key.clone(), stored.id.as_bytes())?;
                Ok::<_, ConflictableTransactionError>(None)
            })
            .map_err(|e| {
                TraderbotError::DatabaseError(format!(
                    "Failed to create user for chat {}: {:?}",
                    stored.chat_id, e
                ))
            })?;

        match owner {
            Some(owner) => {
                debug!("Chat {} already owned by user {}", owner.chat_id, owner.id);
                Ok((self.reveal(owner), false))
            }
            None => {
                info!("Created user {} for chat {}", stored.id, stored.chat_id);
                Ok((self.reveal(stored), true))
            }
        }
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.load(id)?.map(|stored| self.reveal(stored)))
    }

    /// Oldest matching user that is not retired.
    pub fn find_one(&self, filter: &UserFilter) -> Result<Option<User>> {
        let filter = UserFilter {
            retired: Some(false),
            ..filter.clone()
        };
        Ok(self.first_matching(&filter)?.map(|stored| self.reveal(stored)))
    }

    /// Most recently updated matching user, retired or not.
    pub fn find_last_one(&self, filter: &UserFilter) -> Result<Option<User>> {
        Ok(self
            .load_matching(filter)?
            .into_iter()
            .max_by_key(|user| user.updated_at)
            .map(|stored| self.reveal(stored)))
    }

    pub fn find(&self, filter: &UserFilter) -> Result<Vec<User>> {
        Ok(self
            .load_matching(filter)?
            .into_iter()
            .map(|stored| self.reveal(stored))
            .collect())
    }

    /// Matching users with active ones first, then by ascending nonce.
    pub fn find_and_sort(&self, filter: &UserFilter) -> Result<Vec<User>> {
        let mut users = self.load_matching(filter)?;
        users.sort_by_key(|user| (user.retired, user.nonce));
        Ok(users.into_iter().map(|stored| self.reveal(stored)).collect())
    }

    pub fn update_one(&self, id: &str, update: UserUpdate) -> Result<Option<User>> {
        let sealed = self.seal(update.private_key.as_deref())?;
        let Some(stored) = self.load(id)? else {
            debug!("update_one: no user with id {}", id);
            return Ok(None);
        };
        let updated = self.apply_and_persist(stored, &update, sealed.as_ref())?;
        Ok(Some(self.reveal(updated)))
    }

    pub fn find_and_update_one(
        &self,
        filter: &UserFilter,
        update: UserUpdate,
    ) -> Result<Option<User>> {
        let sealed = self.seal(update.private_key.as_deref())?;
        let Some(stored) = self.first_matching(filter)? else {
            return Ok(None);
        };
        let updated = self.apply_and_persist(stored, &update, sealed.as_ref())?;
        Ok(Some(self.reveal(updated)))
    }

    /// Returns the number of users updated. A new private key is sealed once and
    /// written to every match.
    pub fn update_many(&self, filter: &UserFilter, update: UserUpdate) -> Result<usize> {
        let sealed = self.seal(update.private_key.as_deref())?;
        let matching = self.load_matching(filter)?;
        let count = matching.len();
        for stored in matching {
            self.apply_and_persist(stored, &update, sealed.as_ref())?;
        }
        Ok(count)
    }

    pub fn delete_one(&self, filter: &UserFilter) -> Result<Option<User>> {
        let Some(stored) = self.first_matching(filter)? else {
            return Ok(None);
        };
        self.tree.remove(stored.id.as_bytes())?;
        info!("Deleted user {}", stored.id);
        Ok(Some(self.reveal(stored)))
    }

    /// `"/start abc123"` -> `Some("abc123")`
    pub fn extract_unique_code(text: &str) -> Option<&str> {
        text.split(' ').nth(1).filter(|code| !code.is_empty())
    }
}

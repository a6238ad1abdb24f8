use crate::error::StoreError;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Registered application user
///
/// Records are created once (registration or bootstrap) and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Sequential identifier, starting at 1
    pub id: u64,

    /// Unique login name
    pub username: String,

    /// Argon2 PHC string of the user's password
    pub password_hash: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Username → password-hash records
///
/// Implementations must keep usernames unique even under concurrent inserts.
pub trait CredentialStore: Send + Sync {
    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Insert a new record.
    ///
    /// # Errors
    /// * `StoreError::DuplicateUsername` if `username` is already present
    fn insert(&self, username: &str, password_hash: &str) -> Result<UserRecord, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;
}

type UserMap = BTreeMap<String, UserRecord>;

fn new_record(users: &UserMap, username: &str, password_hash: &str) -> UserRecord {
    let id = users.values().map(|u| u.id).max().unwrap_or(0) + 1;
    UserRecord {
        id,
        username: username.to_string(),
        password_hash: password_hash.to_string(),
        created_at: Utc::now(),
    }
}

/// Credential store persisted as a pretty-printed JSON map in a single file
///
/// Every operation re-reads the file, so external edits are picked up. The
/// mutex spans read-check-write of an insert.
pub struct JsonUserStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonUserStore {
    /// Open the store at `path`, creating the parent directory and an empty
    /// `{}` file if they don't exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                create_dir_all(parent).map_err(io_err)?;
            }
        }
        if !path.exists() {
            fs::write(&path, b"{}").map_err(io_err)?;
            info!("created user store at {}", path.display());
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_users(&self) -> Result<UserMap, StoreError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_users(&self, users: &UserMap) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(users)?;
        fs::write(&self.path, json).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl CredentialStore for JsonUserStore {
    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.read_users()?.remove(username))
    }

    fn insert(&self, username: &str, password_hash: &str) -> Result<UserRecord, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut users = self.read_users()?;
        if users.contains_key(username) {
            return Err(StoreError::DuplicateUsername(username.to_string()));
        }

        let record = new_record(&users, username, password_hash);
        users.insert(username.to_string(), record.clone());
        self.write_users(&users)?;
        Ok(record)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.read_users()?.len())
    }
}

/// Credential store that lives only as long as the process.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<UserMap>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryUserStore {
    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let users = self.users.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(users.get(username).cloned())
    }

    fn insert(&self, username: &str, password_hash: &str) -> Result<UserRecord, StoreError> {
        let mut users = self.users.lock().map_err(|_| StoreError::Poisoned)?;
        if users.contains_key(username) {
            return Err(StoreError::DuplicateUsername(username.to_string()));
        }
        let record = new_record(&users, username, password_hash);
        users.insert(username.to_string(), record.clone());
        Ok(record)
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.users.lock().map_err(|_| StoreError::Poisoned)?.len())
    }
}

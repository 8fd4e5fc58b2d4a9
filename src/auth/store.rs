//! SQLite-backed credential and session store.
//!
//! Tables (created by the schema migration steps, not here):
//! - `users`: username, password_hash, salt, created_at
//! - `sessions`: token_hash, user_id, expires_at
//!
//! Passwords are stretched with iterated SHA-256 over a per-user random
//! salt; session tokens are high-entropy and stored only as digests.

use crate::store::Store;
use anyhow::{bail, Result};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default session duration: 2 hours (seconds).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 2 * 3600;

/// Token byte length before hex encoding (32 bytes = 64 hex chars).
const TOKEN_BYTES: usize = 32;

/// Salt byte length for password hashing.
const SALT_BYTES: usize = 16;

/// Number of SHA-256 iterations for password stretching.
const HASH_ITERATIONS: u32 = 100_000;

/// A registered user.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: i64,
}

/// An active session.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: i64,
    pub expires_at: i64,
}

/// Credential store over the shared database handle.
pub struct AuthStore {
    store: Store,
    session_ttl_secs: u64,
}

impl AuthStore {
    pub fn new(store: Store, session_ttl_secs: u64) -> Self {
        Self {
            store,
            session_ttl_secs,
        }
    }

    // ── User management ─────────────────────────────────────────────

    /// Register a new user. Returns the account id.
    ///
    /// Duplicate detection rides on the UNIQUE constraint: the insert is
    /// attempted and a constraint violation becomes the user-facing error,
    /// so no check-then-insert race exists.
    pub fn register(&self, username: &str, password: &str) -> Result<i64> {
        let trimmed = username.trim();
        if trimmed.is_empty() {
            bail!("Username cannot be empty");
        }
        if trimmed.len() > 64 {
            bail!("Username too long (max 64 characters)");
        }
        if password.is_empty() {
            bail!("Password cannot be empty");
        }

        let salt = generate_salt();
        let password_hash = hash_password(password, &salt);
        let now = epoch_secs();

        let conn = self.store.conn()?;
        let result = conn.execute(
            "INSERT INTO users (username, password_hash, salt, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![trimmed, password_hash, salt, now as i64],
        );

        match result {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                bail!("Username '{}' is already taken", trimmed)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Authenticate a user by username + password.
    ///
    /// The failure message is identical for unknown usernames and wrong
    /// passwords, and an unknown username still burns one hash computation
    /// so response timing does not reveal which field was wrong.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let trimmed = username.trim();
        let conn = self.store.conn()?;
        let row: Result<(i64, String, String, i64), _> = conn.query_row(
            "SELECT id, password_hash, salt, created_at FROM users WHERE username = ?1",
            rusqlite::params![trimmed],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        );

        match row {
            Ok((id, stored_hash, salt, created_at)) => {
                let attempt_hash = hash_password(password, &salt);
                if !constant_time_eq(stored_hash.as_bytes(), attempt_hash.as_bytes()) {
                    bail!("Invalid username or password");
                }
                Ok(User {
                    id,
                    username: trimmed.to_string(),
                    created_at,
                })
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                let _ = hash_password(password, "0000000000000000");
                bail!("Invalid username or password");
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a user by id.
    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let conn = self.store.conn()?;
        let row = conn.query_row(
            "SELECT id, username, created_at FROM users WHERE id = ?1",
            rusqlite::params![user_id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        );

        match row {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Count registered users.
    pub fn user_count(&self) -> Result<u64> {
        let conn = self.store.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ── Session management ──────────────────────────────────────────

    /// Create a session for an authenticated user.
    /// Returns the plaintext token (only revealed once).
    pub fn create_session(&self, user_id: i64) -> Result<String> {
        let token = generate_token();
        let token_hash = hash_token(&token);
        let now = epoch_secs();
        let expires_at = now + self.session_ttl_secs;

        let conn = self.store.conn()?;
        // Housekeeping: drop expired rows while we are here anyway.
        conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            rusqlite::params![now as i64],
        )?;
        conn.execute(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![token_hash, user_id, now as i64, expires_at as i64],
        )?;

        Ok(token)
    }

    /// Validate a session token. Returns `None` if the token is unknown or
    /// expired; storage trouble also degrades to `None` (logged) so callers
    /// resolving identity never fail the request outright.
    pub fn validate_session(&self, token: &str) -> Option<Session> {
        let conn = match self.store.conn() {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!("session lookup unavailable: {err:#}");
                return None;
            }
        };

        let token_hash = hash_token(token);
        let now = epoch_secs() as i64;
        let row = conn.query_row(
            "SELECT user_id, expires_at FROM sessions
             WHERE token_hash = ?1 AND expires_at > ?2",
            rusqlite::params![token_hash, now],
            |row| {
                Ok(Session {
                    user_id: row.get(0)?,
                    expires_at: row.get(1)?,
                })
            },
        );

        match row {
            Ok(session) => Some(session),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(err) => {
                tracing::warn!("session lookup failed: {err}");
                None
            }
        }
    }

    /// Revoke a session by token. Returns whether a row was deleted.
    pub fn revoke_session(&self, token: &str) -> Result<bool> {
        let token_hash = hash_token(token);
        let conn = self.store.conn()?;
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE token_hash = ?1",
            rusqlite::params![token_hash],
        )?;
        Ok(deleted > 0)
    }
}

// ── Cryptographic helpers ───────────────────────────────────────────

/// Generate a random salt (hex-encoded).
fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a random session token (hex-encoded).
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a password with salt using iterated SHA-256.
fn hash_password(password: &str, salt: &str) -> String {
    let mut hash = Sha256::new();
    hash.update(salt.as_bytes());
    hash.update(password.as_bytes());
    let mut result = hash.finalize();

    // Iterated hashing for key stretching
    for _ in 1..HASH_ITERATIONS {
        let mut h = Sha256::new();
        h.update(result);
        h.update(salt.as_bytes());
        result = h.finalize();
    }

    hex::encode(result)
}

/// Hash a session token (SHA-256, single pass — tokens are already high-entropy).
fn hash_token(token: &str) -> String {
    let mut h = Sha256::new();
    h.update(token.as_bytes());
    hex::encode(h.finalize())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, AuthStore) {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(&tmp.path().join("desk.db")).unwrap();
        store.migrate().unwrap();
        (tmp, AuthStore::new(store, 3600))
    }

    #[test]
    fn register_and_authenticate() {
        let (_tmp, auth) = test_store();

        let user_id = auth.register("ana", "pw1").unwrap();
        let user = auth.authenticate("ana", "pw1").unwrap();
        assert_eq!(user.id, user_id);
        assert_eq!(user.username, "ana");
    }

    #[test]
    fn register_duplicate_username_fails_and_keeps_one_row() {
        let (_tmp, auth) = test_store();

        auth.register("ana", "pw1").unwrap();
        let result = auth.register("ana", "other");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("already taken"));
        assert_eq!(auth.user_count().unwrap(), 1);
    }

    #[test]
    fn usernames_are_case_sensitive() {
        let (_tmp, auth) = test_store();

        let first = auth.register("Ana", "pw1").unwrap();
        let second = auth.register("ana", "pw2").unwrap();
        assert_ne!(first, second);
        assert_eq!(auth.authenticate("Ana", "pw1").unwrap().id, first);
        assert_eq!(auth.authenticate("ana", "pw2").unwrap().id, second);
    }

    #[test]
    fn authenticate_wrong_password_fails() {
        let (_tmp, auth) = test_store();

        auth.register("ana", "pw1").unwrap();
        let result = auth.authenticate("ana", "wrong");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid"));
    }

    #[test]
    fn failure_message_is_uniform_for_unknown_user_and_wrong_password() {
        let (_tmp, auth) = test_store();

        auth.register("ana", "pw1").unwrap();
        let wrong_password = auth.authenticate("ana", "wrong").unwrap_err().to_string();
        let unknown_user = auth.authenticate("ghost", "pw1").unwrap_err().to_string();
        assert_eq!(wrong_password, unknown_user);
    }

    #[test]
    fn register_empty_username_fails() {
        let (_tmp, auth) = test_store();

        let result = auth.register("   ", "pw1");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn register_empty_password_fails() {
        let (_tmp, auth) = test_store();

        let result = auth.register("ana", "");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn session_create_and_validate() {
        let (_tmp, auth) = test_store();

        let user_id = auth.register("ana", "pw1").unwrap();
        let token = auth.create_session(user_id).unwrap();
        assert!(!token.is_empty());

        let session = auth.validate_session(&token);
        assert!(session.is_some());
        assert_eq!(session.unwrap().user_id, user_id);
    }

    #[test]
    fn session_invalid_token_returns_none() {
        let (_tmp, auth) = test_store();

        assert!(auth.validate_session("no_such_token").is_none());
    }

    #[test]
    fn session_revoke() {
        let (_tmp, auth) = test_store();

        let user_id = auth.register("ana", "pw1").unwrap();
        let token = auth.create_session(user_id).unwrap();

        assert!(auth.validate_session(&token).is_some());
        assert!(auth.revoke_session(&token).unwrap());
        assert!(auth.validate_session(&token).is_none());
        assert!(!auth.revoke_session(&token).unwrap());
    }

    #[test]
    fn expired_session_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(&tmp.path().join("desk.db")).unwrap();
        store.migrate().unwrap();
        let auth = AuthStore::new(store, 0);

        let user_id = auth.register("ana", "pw1").unwrap();
        let token = auth.create_session(user_id).unwrap();
        assert!(auth.validate_session(&token).is_none());
    }

    #[test]
    fn get_user_by_id() {
        let (_tmp, auth) = test_store();

        let user_id = auth.register("ana", "pw1").unwrap();
        let user = auth.get_user(user_id).unwrap();
        assert_eq!(user.unwrap().username, "ana");
        assert!(auth.get_user(9999).unwrap().is_none());
    }

    #[test]
    fn password_hash_is_deterministic_with_same_salt() {
        let h1 = hash_password("test_password", "fixed_salt_value");
        let h2 = hash_password("test_password", "fixed_salt_value");
        assert_eq!(h1, h2);
    }

    #[test]
    fn password_hash_differs_with_different_salt() {
        let h1 = hash_password("test_password", "salt_a");
        let h2 = hash_password("test_password", "salt_b");
        assert_ne!(h1, h2);
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}

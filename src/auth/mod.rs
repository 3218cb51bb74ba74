pub mod session;

pub use session::*;

use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection, Row};
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A row of the `users` table, without the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
}

/// Username/password store in a local SQLite file. Each operation opens its
/// own connection and runs a single statement.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    options: SqliteConnectOptions,
    path: String,
}

impl CredentialStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_path)?.create_if_missing(true);
        Ok(Self {
            options,
            path: db_path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    async fn connect(&self) -> Result<SqliteConnection> {
        Ok(self.options.connect().await?)
    }

    /// Create the users table if it does not exist.
    pub async fn init(&self) -> Result<()> {
        info!("Initializing credential store at: {}", self.path);

        let mut conn = self.connect().await?;
        let result = sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE,
                password TEXT
            )
            "#,
        )
        .execute(&mut conn)
        .await;
        release(conn).await;

        result?;
        Ok(())
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<UserRecord> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::invalid("Username must not be empty."));
        }
        if password.is_empty() {
            return Err(Error::invalid("Password must not be empty."));
        }

        let mut conn = self.connect().await?;
        let result = sqlx::query("INSERT INTO users (username, password) VALUES (?, ?)")
            .bind(username)
            .bind(hash_password(password))
            .execute(&mut conn)
            .await;
        release(conn).await;

        match result {
            Ok(done) => {
                info!("Registered user {}", username);
                Ok(UserRecord {
                    id: done.last_insert_rowid(),
                    username: username.to_string(),
                })
            }
            Err(e) if is_unique_violation(&e) => {
                warn!("Signup rejected, username {} is taken", username);
                Err(Error::DuplicateUsername(username.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the user when the password matches the stored hash.
    pub async fn verify(&self, username: &str, password: &str) -> Result<UserRecord> {
        let username = username.trim();

        let mut conn = self.connect().await?;
        let row = sqlx::query("SELECT id, username, password FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&mut conn)
            .await;
        release(conn).await;

        let row = match row? {
            Some(r) => r,
            None => {
                warn!("Login failed for unknown user {}", username);
                return Err(Error::AuthFailure);
            }
        };

        let stored: Option<String> = row.try_get("password")?;
        if !stored.map_or(false, |h| password_matches(&h, password)) {
            warn!("Login failed for {}", username);
            return Err(Error::AuthFailure);
        }

        info!("User {} logged in", username);
        Ok(UserRecord {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
        })
    }

    /// Changes a username in place; the password hash is untouched.
    pub async fn rename(&self, old_username: &str, new_username: &str) -> Result<()> {
        let new_username = new_username.trim();
        if new_username.is_empty() {
            return Err(Error::invalid("New username must not be empty."));
        }

        let mut conn = self.connect().await?;
        let result = sqlx::query("UPDATE users SET username = ? WHERE username = ?")
            .bind(new_username)
            .bind(old_username)
            .execute(&mut conn)
            .await;
        release(conn).await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(Error::AuthFailure),
            Ok(_) => {
                info!("Renamed user {} to {}", old_username, new_username);
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => {
                Err(Error::DuplicateUsername(new_username.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Closes a finished connection. The statement outcome is already decided,
/// so a failed close is only logged.
async fn release(conn: SqliteConnection) {
    if let Err(e) = conn.close().await {
        warn!("Failed to close credential store connection: {}", e);
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// `<salt-hex>$<sha256(salt || password)-hex>` with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4();
    format!("{}${}", hex::encode(salt.as_bytes()), digest(salt.as_bytes(), password))
}

/// Checks a password against a stored hash. Unsalted hex digests written by
/// older databases are still accepted.
pub fn password_matches(stored: &str, password: &str) -> bool {
    match stored.split_once('$') {
        Some((salt_hex, expected)) => match hex::decode(salt_hex) {
            Ok(salt) => constant_time_eq(digest(&salt, password).as_bytes(), expected.as_bytes()),
            Err(_) => false,
        },
        None => constant_time_eq(digest(&[], password).as_bytes(), stored.as_bytes()),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    async fn store() -> (TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.db");
        let store = CredentialStore::new(path.to_str().unwrap()).unwrap();
        store.init().await.unwrap();
        (dir, store)
    }

    async fn stored_hash(store: &CredentialStore, username: &str) -> String {
        let mut conn = store.connect().await.unwrap();
        let row = sqlx::query("SELECT password FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&mut conn)
            .await
            .unwrap();
        row.get("password")
    }

    #[tokio::test]
    async fn test_register_then_verify() {
        let (_dir, store) = store().await;

        let user = assert_ok!(store.register("alice", "s3cret").await);
        assert_eq!(user.username, "alice");

        let found = assert_ok!(store.verify("alice", "s3cret").await);
        assert_eq!(found, user);
        assert!(matches!(
            store.verify("alice", "wrong").await,
            Err(Error::AuthFailure)
        ));
        assert!(matches!(
            store.verify("bob", "s3cret").await,
            Err(Error::AuthFailure)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let (_dir, store) = store().await;

        assert_ok!(store.register("alice", "one").await);
        assert!(matches!(
            store.register("alice", "two").await,
            Err(Error::DuplicateUsername(_))
        ));
        // The first password still works
        assert_ok!(store.verify("alice", "one").await);
    }

    #[tokio::test]
    async fn test_plaintext_never_stored() {
        let (_dir, store) = store().await;
        assert_ok!(store.register("alice", "hunter2").await);

        let hash = stored_hash(&store, "alice").await;
        assert!(!hash.contains("hunter2"));
        assert!(hash.contains('$'));
    }

    #[tokio::test]
    async fn test_register_rejects_empty_fields() {
        let (_dir, store) = store().await;
        assert!(matches!(
            store.register("  ", "pw").await,
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            store.register("alice", "").await,
            Err(Error::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn test_rename() {
        let (_dir, store) = store().await;
        assert_ok!(store.register("alice", "pw").await);
        assert_ok!(store.register("bob", "pw").await);

        assert_ok!(store.rename("alice", "carol").await);
        assert_ok!(store.verify("carol", "pw").await);
        assert_err!(store.verify("alice", "pw").await);

        assert!(matches!(
            store.rename("carol", "bob").await,
            Err(Error::DuplicateUsername(_))
        ));
        assert!(matches!(
            store.rename("nobody", "dave").await,
            Err(Error::AuthFailure)
        ));
        assert!(matches!(
            store.rename("carol", "").await,
            Err(Error::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn test_statement_errors_surface_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.db");
        let store = CredentialStore::new(path.to_str().unwrap()).unwrap();

        // No users table yet
        assert!(matches!(
            store.register("alice", "pw").await,
            Err(Error::Storage(_))
        ));
        assert!(matches!(
            store.verify("alice", "pw").await,
            Err(Error::Storage(_))
        ));
        assert!(matches!(
            store.rename("alice", "bob").await,
            Err(Error::Storage(_))
        ));

        assert_ok!(store.init().await);
        assert_ok!(store.register("alice", "pw").await);
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let (_dir, store) = store().await;
        assert_ok!(store.register("alice", "pw").await);
        assert_ok!(store.init().await);
        assert_ok!(store.verify("alice", "pw").await);
    }

    #[test]
    fn test_salted_hashes_differ() {
        let a = hash_password("same");
        let b = hash_password("same");
        assert_ne!(a, b);
        assert!(password_matches(&a, "same"));
        assert!(password_matches(&b, "same"));
        assert!(!password_matches(&a, "other"));
    }

    #[test]
    fn test_unsalted_digest_accepted() {
        // sha256("password")
        let legacy = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8";
        assert!(password_matches(legacy, "password"));
        assert!(!password_matches(legacy, "Password"));
    }
}

/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::error::{Result, SocialError};
use crate::privacy::Privacy;
use crate::social_db::{now_ms, write_tx, SocialDb, User, UserId};
use rusqlite::{params, ErrorCode, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::info;

const MAX_USERNAME_LEN: usize = 50;

impl SocialDb {
    /// Creates an account and returns it with its bearer token. Only the
    /// token's SHA-256 is stored; the plain token is never readable again.
    pub fn register(&self, username: &str, avatar_url: Option<&str>, privacy: Privacy) -> Result<(User, String)> {
        let username = username.trim().to_ascii_lowercase();
        if !is_valid_username(&username) {
            return Err(SocialError::validation(
                "username must be 1-50 chars of a-z, 0-9, '_' or '-' and not a number",
            ));
        }
        let avatar_url = avatar_url.map(str::trim).filter(|s| !s.is_empty());

        let token = generate_token();
        let now = now_ms();
        let mut conn = self.conn()?;
        let tx = write_tx(&mut conn)?;
        let taken: Option<i64> = tx
            .query_row("SELECT 1 FROM users WHERE username=?1", params![username], |r| r.get(0))
            .optional()?;
        if taken.is_some() {
            return Err(SocialError::UsernameTaken);
        }
        tx.execute(
            "INSERT INTO users(username, avatar_url, privacy, token_sha256, created_at_ms) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![username, avatar_url, privacy, token_hash_hex(&token), now],
        )
        .map_err(|e| match e.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => SocialError::UsernameTaken,
            _ => e.into(),
        })?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!(user = id, username = %username, privacy = privacy.as_str(), "user registered");
        let user = User {
            id,
            username,
            avatar_url: avatar_url.map(str::to_string),
            privacy,
            created_at_ms: now,
        };
        Ok((user, token))
    }

    /// Maps a bearer token to its account.
    pub fn authenticate(&self, token: &str) -> Result<UserId> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SocialError::Unauthenticated);
        }
        let conn = self.conn()?;
        let id: Option<UserId> = conn
            .query_row(
                "SELECT id FROM users WHERE token_sha256=?1",
                params![token_hash_hex(token)],
                |r| r.get(0),
            )
            .optional()?;
        id.ok_or(SocialError::Unauthenticated)
    }

    pub fn me(&self, user: UserId) -> Result<User> {
        self.require_user(user)
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let v = header.trim();
    let v = v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer "))?;
    let v = v.trim();
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

/// Usernames share the path segment with numeric ids, so all-digit names are refused.
pub fn is_valid_username(user: &str) -> bool {
    if user.is_empty() || user.len() > MAX_USERNAME_LEN {
        return false;
    }
    if !user.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
        return false;
    }
    let digits = user.strip_prefix('-').unwrap_or(user);
    digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit())
}

fn generate_token() -> String {
    // 24 random bytes -> 48 hex chars
    let mut b = [0u8; 24];
    use rand::RngCore as _;
    rand::rngs::OsRng.fill_bytes(&mut b);
    hex::encode(b)
}

fn token_hash_hex(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social_db::testutil::*;

    #[test]
    fn username_rules() {
        assert!(is_valid_username("alice"));
        assert!(is_valid_username("a_b-9"));
        assert!(is_valid_username("-"));
        assert!(!is_valid_username(""));
        assert!(!is_valid_username("Alice"));
        assert!(!is_valid_username("al ice"));
        assert!(!is_valid_username("123"));
        assert!(!is_valid_username("-42"));
        assert!(!is_valid_username(&"x".repeat(51)));
        assert!(is_valid_username(&"x".repeat(50)));
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("  bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic abc"), None);
    }

    #[test]
    fn register_then_authenticate() {
        let (_dir, db) = open_temp();
        let (user, token) = db.register(" Alice ", Some(" https://cdn/a.png "), Privacy::Private).unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.avatar_url.as_deref(), Some("https://cdn/a.png"));
        assert_eq!(token.len(), 48);

        assert_eq!(db.authenticate(&token).unwrap(), user.id);
        assert!(matches!(db.authenticate("nope"), Err(SocialError::Unauthenticated)));
        assert!(matches!(db.authenticate(""), Err(SocialError::Unauthenticated)));

        let me = db.me(user.id).unwrap();
        assert_eq!(me.privacy, Privacy::Private);
    }

    #[test]
    fn duplicate_and_invalid_usernames_are_refused() {
        let (_dir, db) = open_temp();
        public_user(&db, "bob");
        assert!(matches!(db.register("BOB", None, Privacy::Public), Err(SocialError::UsernameTaken)));
        assert!(matches!(db.register("77", None, Privacy::Public), Err(SocialError::Validation(_))));
        assert!(matches!(db.register("", None, Privacy::Public), Err(SocialError::Validation(_))));
    }

    #[test]
    fn tokens_are_unique_per_account() {
        let (_dir, db) = open_temp();
        let (a, ta) = db.register("a", None, Privacy::Public).unwrap();
        let (b, tb) = db.register("b", Some(""), Privacy::Public).unwrap();
        assert_ne!(ta, tb);
        assert_eq!(b.avatar_url, None);
        assert_eq!(db.authenticate(&ta).unwrap(), a.id);
        assert_eq!(db.authenticate(&tb).unwrap(), b.id);
    }
}

/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::error::{Result, SocialError};
use crate::privacy::Privacy;
use crate::stories::StoryConfig;
use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub type UserId = i64;

const BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Clone)]
pub struct SocialDb {
    path: PathBuf,
    story_cfg: StoryConfig,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
    pub privacy: Privacy,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct UserSummary {
    pub user_id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// A user addressed either by numeric id or by username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRef {
    Id(UserId),
    Username(String),
}

impl UserRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SocialError::validation("empty user reference"));
        }
        let digits = raw.strip_prefix('-').unwrap_or(raw);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return parse_id(raw, "user id").map(Self::Id);
        }
        Ok(Self::Username(raw.to_ascii_lowercase()))
    }
}

/// Parses a path id; ids are strictly positive.
pub fn parse_id(raw: &str, what: &str) -> Result<i64> {
    let id: i64 = raw
        .trim()
        .parse()
        .map_err(|_| SocialError::validation(format!("invalid {what}")))?;
    check_id(id, what)
}

pub fn check_id(id: i64, what: &str) -> Result<i64> {
    if id <= 0 {
        return Err(SocialError::validation(format!("invalid {what}")));
    }
    Ok(id)
}

impl SocialDb {
    pub fn open(db_path: impl AsRef<Path>, story_cfg: StoryConfig) -> anyhow::Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let conn = Connection::open(&path).with_context(|| format!("open db: {}", path.display()))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS users (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              username TEXT NOT NULL UNIQUE,
              avatar_url TEXT NULL,
              privacy TEXT NOT NULL DEFAULT 'public' CHECK(privacy IN ('public', 'private')),
              token_sha256 TEXT NOT NULL UNIQUE,
              created_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS follows (
              follower_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
              followee_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
              created_at_ms INTEGER NOT NULL,
              PRIMARY KEY(follower_id, followee_id),
              CHECK(follower_id <> followee_id)
            );
            CREATE INDEX IF NOT EXISTS idx_follows_followee ON follows(followee_id);

            -- Pending requests against private accounts; never coexists with a follows row.
            CREATE TABLE IF NOT EXISTS follow_requests (
              follower_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
              followee_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
              created_at_ms INTEGER NOT NULL,
              PRIMARY KEY(follower_id, followee_id),
              CHECK(follower_id <> followee_id)
            );
            CREATE INDEX IF NOT EXISTS idx_follow_requests_followee ON follow_requests(followee_id, created_at_ms);

            CREATE TABLE IF NOT EXISTS stories (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              owner_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
              media_url TEXT NOT NULL,
              media_kind TEXT NOT NULL CHECK(media_kind IN ('image', 'video')),
              created_at_ms INTEGER NOT NULL,
              expires_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_stories_owner_created ON stories(owner_id, created_at_ms);
            CREATE INDEX IF NOT EXISTS idx_stories_expires ON stories(expires_at_ms);

            CREATE TABLE IF NOT EXISTS story_views (
              story_id INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
              viewer_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
              viewed_at_ms INTEGER NOT NULL,
              PRIMARY KEY(story_id, viewer_id)
            );
            CREATE INDEX IF NOT EXISTS idx_story_views_viewer ON story_views(viewer_id);
            "#,
        )
        .context("init schema")?;
        Ok(Self { path, story_cfg })
    }

    pub fn story_config(&self) -> &StoryConfig {
        &self.story_cfg
    }

    pub(crate) fn conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    pub fn health_check(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let conn = self.conn()?;
        Ok(load_user(&conn, id)?)
    }

    pub fn require_user(&self, id: UserId) -> Result<User> {
        self.get_user(id)?.ok_or(SocialError::NotFound("user"))
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("{USER_SELECT} WHERE username=?1"),
                params![username.trim().to_ascii_lowercase()],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn resolve_user(&self, target: &UserRef) -> Result<User> {
        let user = match target {
            UserRef::Id(id) => self.get_user(*id)?,
            UserRef::Username(name) => self.find_user_by_username(name)?,
        };
        user.ok_or(SocialError::NotFound("user"))
    }
}

/// Opens an IMMEDIATE transaction: the write lock is taken up front so reads
/// inside the transaction cannot be invalidated by another writer.
pub(crate) fn write_tx(conn: &mut Connection) -> Result<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

const USER_SELECT: &str = "SELECT id, username, avatar_url, privacy, created_at_ms FROM users";

pub(crate) fn user_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: r.get(0)?,
        username: r.get(1)?,
        avatar_url: r.get(2)?,
        privacy: r.get(3)?,
        created_at_ms: r.get(4)?,
    })
}

pub(crate) fn load_user(conn: &Connection, id: UserId) -> rusqlite::Result<Option<User>> {
    conn.query_row(&format!("{USER_SELECT} WHERE id=?1"), params![id], user_from_row)
        .optional()
}

pub(crate) fn user_exists(conn: &Connection, id: UserId) -> rusqlite::Result<bool> {
    let hit: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE id=?1", params![id], |r| r.get(0))
        .optional()?;
    Ok(hit.is_some())
}

pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use tempfile::TempDir;

    pub const MINUTE_MS: i64 = 60 * 1000;

    pub fn db_path(dir: &TempDir) -> PathBuf {
        dir.path().join("stories.db")
    }

    pub fn open_temp() -> (TempDir, SocialDb) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = SocialDb::open(db_path(&dir), StoryConfig::default()).expect("open db");
        (dir, db)
    }

    pub fn public_user(db: &SocialDb, name: &str) -> UserId {
        db.register(name, None, Privacy::Public).expect("register").0.id
    }

    pub fn private_user(db: &SocialDb, name: &str) -> UserId {
        db.register(name, None, Privacy::Private).expect("register").0.id
    }
}

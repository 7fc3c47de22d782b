/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::error::{Result, SocialError};
use crate::relationships::edge_exists;
use crate::social_db::{check_id, user_exists, write_tx, SocialDb, UserId};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};

pub type StoryId = i64;

const MS_PER_MINUTE: i64 = 60 * 1000;
const DAY_MINUTES: u32 = 24 * 60;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct StoryConfig {
    /// Lifetime used when the client sends no ttl, or a non-positive one.
    pub default_ttl_minutes: Option<u32>,
    /// Hard cap on a story's lifetime.
    pub max_ttl_minutes: Option<u32>,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            default_ttl_minutes: Some(DAY_MINUTES),
            max_ttl_minutes: Some(DAY_MINUTES),
        }
    }
}

impl StoryConfig {
    /// Clamps a requested ttl into `(0, max]`, falling back to the default.
    pub fn ttl_ms(&self, requested_minutes: Option<i64>) -> i64 {
        let max = i64::from(self.max_ttl_minutes.unwrap_or(DAY_MINUTES).max(1));
        let default = i64::from(self.default_ttl_minutes.unwrap_or(DAY_MINUTES)).clamp(1, max);
        let minutes = match requested_minutes {
            Some(m) if m > 0 => m.min(max),
            _ => default,
        };
        minutes * MS_PER_MINUTE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            _ => Err(SocialError::validation("media_type must be image or video")),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl FromSql for MediaKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

impl ToSql for MediaKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Story {
    pub id: StoryId,
    pub owner_id: UserId,
    pub media_url: String,
    pub media_type: MediaKind,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewOutcome {
    Recorded,
    AlreadyViewed,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoryViewer {
    pub viewer_id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
    pub viewed_at_ms: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StoryViews {
    pub story_id: StoryId,
    pub total_views: u64,
    pub views: Vec<StoryViewer>,
}

impl SocialDb {
    pub fn create_story(
        &self,
        owner: UserId,
        media_url: &str,
        media_type: &str,
        ttl_minutes: Option<i64>,
        now: i64,
    ) -> Result<Story> {
        let media_url = media_url.trim();
        if media_url.is_empty() {
            return Err(SocialError::validation("media_url is required"));
        }
        let media_type = MediaKind::parse(media_type)?;
        let expires_at_ms = now.saturating_add(self.story_config().ttl_ms(ttl_minutes));

        let conn = self.conn()?;
        if !user_exists(&conn, owner)? {
            return Err(SocialError::NotFound("user"));
        }
        conn.execute(
            "INSERT INTO stories(owner_id, media_url, media_kind, created_at_ms, expires_at_ms) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![owner, media_url, media_type, now, expires_at_ms],
        )?;
        Ok(Story {
            id: conn.last_insert_rowid(),
            owner_id: owner,
            media_url: media_url.to_string(),
            media_type,
            created_at_ms: now,
            expires_at_ms,
        })
    }

    pub fn get_story(&self, id: StoryId) -> Result<Option<Story>> {
        let conn = self.conn()?;
        Ok(load_story(&conn, id)?)
    }

    pub fn delete_story(&self, id: StoryId, requested_by: UserId) -> Result<()> {
        check_id(id, "story id")?;
        let mut conn = self.conn()?;
        let tx = write_tx(&mut conn)?;
        let story = load_story(&tx, id)?.ok_or(SocialError::NotFound("story"))?;
        if story.owner_id != requested_by {
            return Err(SocialError::Forbidden("not your story"));
        }
        tx.execute("DELETE FROM story_views WHERE story_id=?1", params![id])?;
        tx.execute("DELETE FROM stories WHERE id=?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    /// Deletes every story with `expires_at_ms <= now`; view markers go with them.
    pub fn reap_expired(&self, now: i64) -> Result<u64> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM stories WHERE expires_at_ms <= ?1", params![now])?;
        Ok(n as u64)
    }

    /// Drops view markers whose story is gone. Deletes made through
    /// [`SocialDb`] cascade, so this only finds markers left by a connection
    /// that ran with `foreign_keys` off.
    pub fn prune_orphan_views(&self) -> Result<u64> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM story_views WHERE story_id NOT IN (SELECT id FROM stories)",
            [],
        )?;
        Ok(n as u64)
    }

    /// Marks `story` as seen by `viewer`. A repeat view is a no-op reported as
    /// [`ViewOutcome::AlreadyViewed`]. Stories the viewer may not see are
    /// reported like missing ones.
    pub fn record_view(&self, story: StoryId, viewer: UserId, now: i64) -> Result<ViewOutcome> {
        check_id(story, "story id")?;
        let mut conn = self.conn()?;
        let tx = write_tx(&mut conn)?;
        let Some(item) = load_story(&tx, story)? else {
            return Err(SocialError::NotFoundOrExpired);
        };
        if !is_active(item.expires_at_ms, now) || !can_view(&tx, viewer, item.owner_id)? {
            return Err(SocialError::NotFoundOrExpired);
        }
        let n = tx.execute(
            "INSERT INTO story_views(story_id, viewer_id, viewed_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(story_id, viewer_id) DO NOTHING",
            params![story, viewer, now],
        )?;
        tx.commit()?;
        Ok(if n > 0 { ViewOutcome::Recorded } else { ViewOutcome::AlreadyViewed })
    }

    /// Viewers of `story`, newest first. Owner only.
    pub fn list_views(&self, story: StoryId, requested_by: UserId) -> Result<StoryViews> {
        check_id(story, "story id")?;
        let conn = self.conn()?;
        let item = load_story(&conn, story)?.ok_or(SocialError::NotFound("story"))?;
        if item.owner_id != requested_by {
            return Err(SocialError::Forbidden("not your story"));
        }
        let mut stmt = conn.prepare(
            "SELECT v.viewer_id, u.username, u.avatar_url, v.viewed_at_ms
             FROM story_views v JOIN users u ON u.id = v.viewer_id
             WHERE v.story_id=?1
             ORDER BY v.viewed_at_ms DESC, v.rowid DESC",
        )?;
        let views = stmt
            .query_map(params![story], |r| {
                Ok(StoryViewer {
                    viewer_id: r.get(0)?,
                    username: r.get(1)?,
                    avatar_url: r.get(2)?,
                    viewed_at_ms: r.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(StoryViews {
            story_id: story,
            total_views: views.len() as u64,
            views,
        })
    }
}

pub(crate) fn is_active(expires_at_ms: i64, now: i64) -> bool {
    expires_at_ms > now
}

/// Owner sees their own stories; anyone else needs an accepted follow edge.
pub(crate) fn can_view(conn: &Connection, viewer: UserId, owner: UserId) -> rusqlite::Result<bool> {
    Ok(viewer == owner || edge_exists(conn, viewer, owner)?)
}

fn load_story(conn: &Connection, id: StoryId) -> rusqlite::Result<Option<Story>> {
    conn.query_row(
        "SELECT id, owner_id, media_url, media_kind, created_at_ms, expires_at_ms FROM stories WHERE id=?1",
        params![id],
        |r| {
            Ok(Story {
                id: r.get(0)?,
                owner_id: r.get(1)?,
                media_url: r.get(2)?,
                media_type: r.get(3)?,
                created_at_ms: r.get(4)?,
                expires_at_ms: r.get(5)?,
            })
        },
    )
    .optional()
}

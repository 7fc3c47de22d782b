/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::error::{Result, SocialError};
use crate::social_db::{check_id, now_ms, user_exists, write_tx, SocialDb, UserId, UserSummary};
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FollowEntry {
    #[serde(flatten)]
    pub user: UserSummary,
    pub since_ms: i64,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Following,
    Followers,
}

impl SocialDb {
    /// Inserts the edge `follower -> followee` without consulting privacy;
    /// the follow paths in `follow_requests` decide when that is allowed.
    pub fn create_edge(&self, follower: UserId, followee: UserId) -> Result<()> {
        if follower == followee {
            return Err(SocialError::SelfFollow);
        }
        check_id(follower, "user id")?;
        check_id(followee, "user id")?;
        let mut conn = self.conn()?;
        let tx = write_tx(&mut conn)?;
        if !user_exists(&tx, follower)? || !user_exists(&tx, followee)? {
            return Err(SocialError::NotFound("user"));
        }
        if !insert_edge(&tx, follower, followee, now_ms())? {
            return Err(SocialError::AlreadyFollowing);
        }
        delete_request(&tx, follower, followee)?;
        tx.commit()?;
        Ok(())
    }

    /// Removes the edge; returns false when there was nothing to remove.
    pub fn delete_edge(&self, follower: UserId, followee: UserId) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM follows WHERE follower_id=?1 AND followee_id=?2",
            params![follower, followee],
        )?;
        Ok(n > 0)
    }

    pub fn is_following(&self, follower: UserId, followee: UserId) -> Result<bool> {
        let conn = self.conn()?;
        Ok(edge_exists(&conn, follower, followee)?)
    }

    /// Users `user` follows, in the order the edges were created.
    pub fn list_following(&self, user: UserId) -> Result<Vec<FollowEntry>> {
        self.list_edges(user, Direction::Following)
    }

    /// Users following `user`, in the order the edges were created.
    pub fn list_followers(&self, user: UserId) -> Result<Vec<FollowEntry>> {
        self.list_edges(user, Direction::Followers)
    }

    fn list_edges(&self, user: UserId, dir: Direction) -> Result<Vec<FollowEntry>> {
        let conn = self.conn()?;
        if !user_exists(&conn, user)? {
            return Err(SocialError::NotFound("user"));
        }
        let (join_col, filter_col) = match dir {
            Direction::Following => ("followee_id", "follower_id"),
            Direction::Followers => ("follower_id", "followee_id"),
        };
        let sql = format!(
            "SELECT u.id, u.username, u.avatar_url, f.created_at_ms
             FROM follows f JOIN users u ON u.id = f.{join_col}
             WHERE f.{filter_col}=?1
             ORDER BY f.created_at_ms ASC, f.rowid ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![user], follow_entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

pub(crate) fn follow_entry_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<FollowEntry> {
    Ok(FollowEntry {
        user: UserSummary {
            user_id: r.get(0)?,
            username: r.get(1)?,
            avatar_url: r.get(2)?,
        },
        since_ms: r.get(3)?,
    })
}

pub(crate) fn edge_exists(conn: &Connection, follower: UserId, followee: UserId) -> rusqlite::Result<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM follows WHERE follower_id=?1 AND followee_id=?2",
            params![follower, followee],
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

/// Returns false when the edge was already there.
pub(crate) fn insert_edge(conn: &Connection, follower: UserId, followee: UserId, now: i64) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "INSERT INTO follows(follower_id, followee_id, created_at_ms) VALUES (?1, ?2, ?3)
         ON CONFLICT(follower_id, followee_id) DO NOTHING",
        params![follower, followee, now],
    )?;
    Ok(n > 0)
}

/// Returns false when there was no pending request for the pair.
pub(crate) fn delete_request(conn: &Connection, follower: UserId, followee: UserId) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "DELETE FROM follow_requests WHERE follower_id=?1 AND followee_id=?2",
        params![follower, followee],
    )?;
    Ok(n > 0)
}

/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::error::{Result, SocialError};
use crate::privacy::Privacy;
use crate::relationships::{delete_request, edge_exists, follow_entry_from_row, insert_edge, FollowEntry};
use crate::social_db::{check_id, now_ms, user_exists, write_tx, SocialDb, UserId, UserRef};
use rusqlite::{params, OptionalExtension};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    /// Target is public: the edge exists now.
    Followed,
    /// Target is private: a request awaits the target's decision.
    Requested,
}

impl FollowOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Followed => "following",
            Self::Requested => "requested",
        }
    }
}

impl SocialDb {
    /// Follows a public account or files a request against a private one.
    /// Returns the target id alongside the outcome.
    pub fn follow(&self, follower: UserId, target: &UserRef) -> Result<(UserId, FollowOutcome)> {
        let target = self.target_id(target)?;
        let outcome = self.request_follow(follower, &UserRef::Id(target))?;
        Ok((target, outcome))
    }

    pub fn request_follow(&self, follower: UserId, target: &UserRef) -> Result<FollowOutcome> {
        let target = self.target_id(target)?;
        if follower == target {
            return Err(SocialError::SelfFollow);
        }
        check_id(target, "user id")?;

        let mut conn = self.conn()?;
        let tx = write_tx(&mut conn)?;
        let privacy: Privacy = tx
            .query_row("SELECT privacy FROM users WHERE id=?1", params![target], |r| r.get(0))
            .optional()?
            .ok_or(SocialError::NotFound("user"))?;
        if !user_exists(&tx, follower)? {
            return Err(SocialError::NotFound("user"));
        }
        if edge_exists(&tx, follower, target)? {
            return Err(SocialError::AlreadyFollowing);
        }

        let now = now_ms();
        let outcome = match privacy {
            Privacy::Public => {
                if !insert_edge(&tx, follower, target, now)? {
                    return Err(SocialError::AlreadyFollowing);
                }
                delete_request(&tx, follower, target)?;
                FollowOutcome::Followed
            }
            Privacy::Private => {
                let n = tx.execute(
                    "INSERT INTO follow_requests(follower_id, followee_id, created_at_ms) VALUES (?1, ?2, ?3)
                     ON CONFLICT(follower_id, followee_id) DO NOTHING",
                    params![follower, target, now],
                )?;
                if n == 0 {
                    return Err(SocialError::AlreadyRequested);
                }
                FollowOutcome::Requested
            }
        };
        tx.commit()?;
        Ok(outcome)
    }

    /// Turns the pending request `follower -> followee` into an edge.
    ///
    /// Edge insert and request delete commit together. When an edge already
    /// exists the stale request is still removed and `AlreadyFollowing` is
    /// returned.
    pub fn accept_request(&self, followee: UserId, follower: UserId) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = write_tx(&mut conn)?;
        let result = resolve_request(&tx, followee, follower);
        if matches!(result, Ok(()) | Err(SocialError::AlreadyFollowing)) {
            tx.commit()?;
        }
        result
    }

    /// [`SocialDb::accept_request`] for the going-public cascade. The
    /// followee's privacy is re-read under the write lock; `Ok(false)` means
    /// the account is private again and nothing was touched.
    pub(crate) fn accept_request_while_public(&self, followee: UserId, follower: UserId) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = write_tx(&mut conn)?;
        let privacy: Privacy = tx
            .query_row("SELECT privacy FROM users WHERE id=?1", params![followee], |r| r.get(0))
            .optional()?
            .ok_or(SocialError::NotFound("user"))?;
        if privacy == Privacy::Private {
            return Ok(false);
        }
        let result = resolve_request(&tx, followee, follower);
        if matches!(result, Ok(()) | Err(SocialError::AlreadyFollowing)) {
            tx.commit()?;
        }
        result.map(|()| true)
    }

    pub fn reject_request(&self, followee: UserId, follower: UserId) -> Result<()> {
        let conn = self.conn()?;
        if !delete_request(&conn, follower, followee)? {
            return Err(SocialError::NotFound("follow request"));
        }
        Ok(())
    }

    /// Requesters awaiting `user`'s decision, oldest first.
    pub fn list_pending_requests(&self, user: UserId) -> Result<Vec<FollowEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT u.id, u.username, u.avatar_url, r.created_at_ms
             FROM follow_requests r JOIN users u ON u.id = r.follower_id
             WHERE r.followee_id=?1
             ORDER BY r.created_at_ms ASC, r.rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![user], follow_entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn target_id(&self, target: &UserRef) -> Result<UserId> {
        match target {
            UserRef::Id(id) => Ok(*id),
            UserRef::Username(_) => Ok(self.resolve_user(target)?.id),
        }
    }

    pub(crate) fn pending_requester_ids(&self, user: UserId) -> Result<Vec<UserId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT follower_id FROM follow_requests WHERE followee_id=?1 ORDER BY created_at_ms ASC, rowid ASC",
        )?;
        let ids = stmt
            .query_map(params![user], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<UserId>>>()?;
        Ok(ids)
    }
}

/// Edge insert and request delete for one pending request. A stale request
/// next to an existing edge is deleted and reported as `AlreadyFollowing`;
/// the caller commits on `Ok` and on `AlreadyFollowing` only.
fn resolve_request(conn: &rusqlite::Connection, followee: UserId, follower: UserId) -> Result<()> {
    if !request_exists(conn, follower, followee)? {
        return Err(SocialError::NotFound("follow request"));
    }
    if edge_exists(conn, follower, followee)? {
        delete_request(conn, follower, followee)?;
        return Err(SocialError::AlreadyFollowing);
    }
    insert_edge(conn, follower, followee, now_ms())?;
    delete_request(conn, follower, followee)?;
    Ok(())
}

fn request_exists(conn: &rusqlite::Connection, follower: UserId, followee: UserId) -> rusqlite::Result<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM follow_requests WHERE follower_id=?1 AND followee_id=?2",
            params![follower, followee],
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

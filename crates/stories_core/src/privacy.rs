/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::error::{Result, SocialError};
use crate::social_db::{write_tx, SocialDb, UserId};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Public,
    Private,
}

impl Privacy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Public => Self::Private,
            Self::Private => Self::Public,
        }
    }
}

impl FromSql for Privacy {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

impl ToSql for Privacy {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivacyToggle {
    pub privacy: Privacy,
    /// Pending requests turned into follow edges by the private -> public cascade.
    pub auto_accepted: u64,
}

impl SocialDb {
    /// Flips the account between public and private.
    ///
    /// Going public resolves the requests pending at the moment of the flip,
    /// one transaction per request. Requests filed after the flip see the
    /// public flag and follow directly. Each acceptance re-reads the flag under
    /// the write lock and the cascade stops as soon as the account is private
    /// again, leaving the rest pending. If storage fails mid-cascade the flip
    /// and the requests already resolved stay in place.
    pub fn toggle_privacy(&self, user: UserId) -> Result<PrivacyToggle> {
        let privacy = self.flip_privacy(user)?;
        if privacy == Privacy::Private {
            return Ok(PrivacyToggle { privacy, auto_accepted: 0 });
        }

        let mut auto_accepted = 0u64;
        for follower in self.pending_requester_ids(user)? {
            match self.accept_request_while_public(user, follower) {
                Ok(true) => auto_accepted += 1,
                Ok(false) => {
                    debug!(user = user, "account went private again, cascade stopped");
                    break;
                }
                // Resolved concurrently, or an edge already existed: the
                // request is gone either way.
                Err(SocialError::AlreadyFollowing) | Err(SocialError::NotFound(_)) => {
                    debug!(user = user, follower = follower, "cascade skipped already-resolved request");
                }
                Err(e) => return Err(e),
            }
        }
        if auto_accepted > 0 {
            info!(user = user, auto_accepted = auto_accepted, "account went public, pending follow requests accepted");
        }
        Ok(PrivacyToggle { privacy, auto_accepted })
    }

    fn flip_privacy(&self, user: UserId) -> Result<Privacy> {
        let mut conn = self.conn()?;
        let tx = write_tx(&mut conn)?;
        let current: Privacy = tx
            .query_row("SELECT privacy FROM users WHERE id=?1", params![user], |r| r.get(0))
            .optional()?
            .ok_or(SocialError::NotFound("user"))?;
        let next = current.toggled();
        tx.execute("UPDATE users SET privacy=?1 WHERE id=?2", params![next, user])?;
        tx.commit()?;
        Ok(next)
    }
}

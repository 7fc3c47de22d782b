/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Viewer-specific story feed.
//!
//! Composition is two stages: one ordered query yields flat
//! `(owner, story, seen)` rows, then [`group_feed_rows`] folds them into
//! per-owner blocks. The fold is pure so it can be tested without storage.

use crate::error::{Result, SocialError};
use crate::social_db::{user_exists, SocialDb, UserId, UserSummary};
use crate::stories::{can_view, MediaKind, StoryId};
use anyhow::Context;
use rusqlite::params;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FeedStory {
    pub id: StoryId,
    pub media_url: String,
    pub media_type: MediaKind,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
    pub seen: bool,
}

/// One row of the flat feed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRow {
    pub owner: UserSummary,
    pub story: FeedStory,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FeedBlock {
    #[serde(flatten)]
    pub owner: UserSummary,
    pub stories: Vec<FeedStory>,
    pub all_seen: bool,
}

/// Groups rows by owner. Blocks keep the position of their owner's first row
/// and stories keep row order inside each block.
pub fn group_feed_rows(rows: impl IntoIterator<Item = FeedRow>) -> Vec<FeedBlock> {
    let mut blocks: Vec<FeedBlock> = Vec::new();
    let mut index: HashMap<UserId, usize> = HashMap::new();
    for FeedRow { owner, story } in rows {
        let slot = *index.entry(owner.user_id).or_insert_with(|| {
            blocks.push(FeedBlock {
                owner,
                stories: Vec::new(),
                all_seen: true,
            });
            blocks.len() - 1
        });
        blocks[slot].stories.push(story);
    }
    for block in &mut blocks {
        block.all_seen = block.stories.iter().all(|s| s.seen);
    }
    blocks
}

impl SocialDb {
    /// Active stories of `viewer` and everyone `viewer` follows, grouped by
    /// owner in ascending owner id order.
    pub fn compose_feed(&self, viewer: UserId, now: i64) -> Result<Vec<FeedBlock>> {
        let rows = self.feed_rows(viewer, now).context("compose feed")?;
        Ok(group_feed_rows(rows))
    }

    /// Active stories of a single owner as seen by `viewer`, oldest first.
    /// A viewer without access gets an empty list.
    pub fn user_stories(&self, viewer: UserId, target: UserId, now: i64) -> Result<Vec<FeedStory>> {
        let conn = self.conn()?;
        if !user_exists(&conn, target)? {
            return Err(SocialError::NotFound("user"));
        }
        if !can_view(&conn, viewer, target)? {
            return Ok(Vec::new());
        }
        let mut stmt = conn.prepare(
            "SELECT s.id, s.media_url, s.media_kind, s.created_at_ms, s.expires_at_ms,
                    sv.viewer_id IS NOT NULL
             FROM stories s
             LEFT JOIN story_views sv ON sv.story_id = s.id AND sv.viewer_id = ?2
             WHERE s.owner_id = ?1 AND s.expires_at_ms > ?3
             ORDER BY s.created_at_ms ASC, s.id ASC",
        )?;
        let stories = stmt
            .query_map(params![target, viewer, now], |r| feed_story_from_row(r, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("user stories")?;
        Ok(stories)
    }

    fn feed_rows(&self, viewer: UserId, now: i64) -> anyhow::Result<Vec<FeedRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT u.id, u.username, u.avatar_url,
                    s.id, s.media_url, s.media_kind, s.created_at_ms, s.expires_at_ms,
                    sv.viewer_id IS NOT NULL
             FROM stories s
             JOIN users u ON u.id = s.owner_id
             LEFT JOIN follows f ON f.followee_id = s.owner_id AND f.follower_id = ?1
             LEFT JOIN story_views sv ON sv.story_id = s.id AND sv.viewer_id = ?1
             WHERE (f.follower_id IS NOT NULL OR s.owner_id = ?1) AND s.expires_at_ms > ?2
             ORDER BY u.id ASC, s.created_at_ms ASC, s.id ASC",
        )?;
        let rows = stmt
            .query_map(params![viewer, now], |r| {
                Ok(FeedRow {
                    owner: UserSummary {
                        user_id: r.get(0)?,
                        username: r.get(1)?,
                        avatar_url: r.get(2)?,
                    },
                    story: feed_story_from_row(r, 3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn feed_story_from_row(r: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<FeedStory> {
    Ok(FeedStory {
        id: r.get(base)?,
        media_url: r.get(base + 1)?,
        media_type: r.get(base + 2)?,
        created_at_ms: r.get(base + 3)?,
        expires_at_ms: r.get(base + 4)?,
        seen: r.get(base + 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social_db::testutil::*;
    use crate::social_db::UserRef;

    fn summary(id: UserId) -> UserSummary {
        UserSummary {
            user_id: id,
            username: format!("u{id}"),
            avatar_url: None,
        }
    }

    fn row(owner: UserId, story: StoryId, seen: bool) -> FeedRow {
        FeedRow {
            owner: summary(owner),
            story: FeedStory {
                id: story,
                media_url: format!("m{story}"),
                media_type: MediaKind::Image,
                created_at_ms: story,
                expires_at_ms: story + 1000,
                seen,
            },
        }
    }

    fn ids(block: &FeedBlock) -> Vec<StoryId> {
        block.stories.iter().map(|s| s.id).collect()
    }

    #[test]
    fn fold_keeps_first_appearance_order() {
        let blocks = group_feed_rows(vec![
            row(3, 1, true),
            row(1, 2, false),
            row(3, 3, true),
            row(2, 4, true),
            row(1, 5, true),
        ]);
        let owners: Vec<_> = blocks.iter().map(|b| b.owner.user_id).collect();
        assert_eq!(owners, vec![3, 1, 2]);
        assert_eq!(ids(&blocks[0]), vec![1, 3]);
        assert_eq!(ids(&blocks[1]), vec![2, 5]);
        assert_eq!(ids(&blocks[2]), vec![4]);
    }

    #[test]
    fn fold_all_seen_needs_every_story_seen() {
        let blocks = group_feed_rows(vec![row(1, 1, true), row(1, 2, false), row(2, 3, true)]);
        assert!(!blocks[0].all_seen);
        assert!(blocks[1].all_seen);
        assert!(group_feed_rows(Vec::new()).is_empty());
    }

    #[test]
    fn feed_scenario_seen_then_expired() {
        let (_dir, db) = open_temp();
        let u1 = public_user(&db, "u1");
        let u2 = public_user(&db, "u2");
        let t0 = 1_000_000;
        let i1 = db.create_story(u1, "https://cdn/i1.jpg", "image", Some(60), t0).unwrap();
        db.request_follow(u2, &UserRef::Id(u1)).unwrap();

        let feed = db.compose_feed(u2, t0 + 30 * MINUTE_MS).unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].owner.user_id, u1);
        assert_eq!(ids(&feed[0]), vec![i1.id]);
        assert!(!feed[0].all_seen);

        db.record_view(i1.id, u2, t0 + 31 * MINUTE_MS).unwrap();
        let feed = db.compose_feed(u2, t0 + 31 * MINUTE_MS).unwrap();
        assert!(feed[0].all_seen);
        assert!(feed[0].stories[0].seen);

        assert!(db.compose_feed(u2, t0 + 61 * MINUTE_MS).unwrap().is_empty());
    }

    #[test]
    fn feed_includes_own_stories_and_orders_by_owner_id() {
        let (_dir, db) = open_temp();
        let viewer = public_user(&db, "viewer");
        let a = public_user(&db, "a");
        let b = public_user(&db, "b");
        let stranger = public_user(&db, "stranger");
        let t0 = 1_000_000;
        db.request_follow(viewer, &UserRef::Id(b)).unwrap();
        db.request_follow(viewer, &UserRef::Id(a)).unwrap();

        let b1 = db.create_story(b, "b1", "image", None, t0).unwrap();
        let a1 = db.create_story(a, "a1", "image", None, t0 + 1).unwrap();
        let own = db.create_story(viewer, "own", "video", None, t0 + 2).unwrap();
        let a2 = db.create_story(a, "a2", "image", None, t0 + 3).unwrap();
        db.create_story(stranger, "s1", "image", None, t0).unwrap();

        let feed = db.compose_feed(viewer, t0 + 10).unwrap();
        let owners: Vec<_> = feed.iter().map(|b| b.owner.user_id).collect();
        assert_eq!(owners, vec![viewer, a, b]);
        assert_eq!(ids(&feed[0]), vec![own.id]);
        assert_eq!(ids(&feed[1]), vec![a1.id, a2.id]);
        assert_eq!(ids(&feed[2]), vec![b1.id]);
    }

    #[test]
    fn reap_then_feed_never_returns_expired() {
        let (_dir, db) = open_temp();
        let owner = public_user(&db, "owner");
        let t0 = 1_000_000;
        db.create_story(owner, "short", "image", Some(5), t0).unwrap();
        let long = db.create_story(owner, "long", "image", Some(50), t0).unwrap();

        let now = t0 + 5 * MINUTE_MS;
        db.reap_expired(now).unwrap();
        let feed = db.compose_feed(owner, now).unwrap();
        assert_eq!(ids(&feed[0]), vec![long.id]);
        assert!(feed.iter().flat_map(|b| &b.stories).all(|s| s.expires_at_ms > now));
    }

    #[test]
    fn private_owner_becomes_visible_after_going_public() {
        let (_dir, db) = open_temp();
        let u1 = private_user(&db, "u1");
        let u2 = public_user(&db, "u2");
        let t0 = 1_000_000;
        let story = db.create_story(u1, "x", "image", None, t0).unwrap();

        db.request_follow(u2, &UserRef::Id(u1)).unwrap();
        assert!(!db.is_following(u2, u1).unwrap());
        assert!(db.compose_feed(u2, t0).unwrap().is_empty());

        db.toggle_privacy(u1).unwrap();
        assert!(db.is_following(u2, u1).unwrap());
        assert!(db.list_pending_requests(u1).unwrap().is_empty());
        let followers: Vec<_> = db.list_followers(u1).unwrap().into_iter().map(|f| f.user.user_id).collect();
        assert_eq!(followers, vec![u2]);
        assert_eq!(ids(&db.compose_feed(u2, t0).unwrap()[0]), vec![story.id]);
    }

    #[test]
    fn rejected_requester_still_cannot_see_stories() {
        let (_dir, db) = open_temp();
        let u1 = private_user(&db, "u1");
        let u2 = public_user(&db, "u2");
        let t0 = 1_000_000;
        let story = db.create_story(u1, "x", "image", None, t0).unwrap();
        db.request_follow(u2, &UserRef::Id(u1)).unwrap();
        db.reject_request(u1, u2).unwrap();

        assert!(db.compose_feed(u2, t0).unwrap().is_empty());
        assert!(db.user_stories(u2, u1, t0).unwrap().is_empty());
        assert!(matches!(db.record_view(story.id, u2, t0), Err(SocialError::NotFoundOrExpired)));
    }

    #[test]
    fn user_stories_annotates_seen_and_checks_target() {
        let (_dir, db) = open_temp();
        let owner = public_user(&db, "owner");
        let fan = public_user(&db, "fan");
        let t0 = 1_000_000;
        db.request_follow(fan, &UserRef::Id(owner)).unwrap();
        let s1 = db.create_story(owner, "1", "image", None, t0).unwrap();
        let s2 = db.create_story(owner, "2", "image", None, t0 + 1).unwrap();
        db.record_view(s2.id, fan, t0 + 2).unwrap();

        let stories = db.user_stories(fan, owner, t0 + 5).unwrap();
        let seen: Vec<_> = stories.iter().map(|s| (s.id, s.seen)).collect();
        assert_eq!(seen, vec![(s1.id, false), (s2.id, true)]);

        let lonely = public_user(&db, "lonely");
        assert!(db.user_stories(fan, lonely, t0).unwrap().is_empty());
        assert!(matches!(db.user_stories(fan, lonely + 50, t0), Err(SocialError::NotFound("user"))));
    }
}

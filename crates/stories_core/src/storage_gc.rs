/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::social_db::{now_ms, SocialDb};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const MIN_GC_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct StorageConfig {
    pub gc_interval_secs: Option<u64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            gc_interval_secs: Some(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReapStats {
    pub stories: u64,
    pub orphan_views: u64,
}

/// Spawns the expired-story reaper. The task exits once `shutdown` flips to true.
pub fn start_story_reaper(
    cfg: StorageConfig,
    social: Arc<SocialDb>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = cfg.gc_interval_secs.unwrap_or(60).max(MIN_GC_INTERVAL_SECS);
        let mut tick = tokio::time::interval(Duration::from_secs(interval));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() { break; }
                }
                _ = tick.tick() => {}
            }

            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = run_once(&social, now_ms()).await {
                warn!("story reaper error: {e:#}");
            }
        }
    })
}

pub async fn run_once(social: &SocialDb, now: i64) -> Result<ReapStats> {
    let stories = tokio::task::spawn_blocking({
        let s = social.clone();
        move || s.reap_expired(now)
    })
    .await
    .context("reaper task")??;
    if stories > 0 {
        info!(deleted = stories, "reaper deleted expired stories");
    }

    let orphan_views = tokio::task::spawn_blocking({
        let s = social.clone();
        move || s.prune_orphan_views()
    })
    .await
    .context("reaper task")??;
    if orphan_views > 0 {
        info!(deleted = orphan_views, "reaper pruned orphan story views");
    }

    Ok(ReapStats { stories, orphan_views })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social_db::testutil::*;

    #[tokio::test]
    async fn run_once_deletes_only_expired() {
        let (_dir, db) = open_temp();
        let owner = public_user(&db, "owner");
        let now = now_ms();
        db.create_story(owner, "old", "image", Some(1), now - 2 * MINUTE_MS).unwrap();
        let fresh = db.create_story(owner, "new", "image", Some(60), now).unwrap();

        let stats = run_once(&db, now).await.unwrap();
        assert_eq!(stats, ReapStats { stories: 1, orphan_views: 0 });
        assert!(db.get_story(fresh.id).unwrap().is_some());
        assert_eq!(run_once(&db, now).await.unwrap(), ReapStats::default());
    }

    #[tokio::test]
    async fn orphan_views_are_pruned() {
        let (dir, db) = open_temp();
        let owner = public_user(&db, "owner");
        let story = db.create_story(owner, "x", "image", None, 0).unwrap();
        db.record_view(story.id, owner, 1).unwrap();
        // Bundled SQLite enables foreign keys by default; turn them off so the
        // delete leaves the marker behind.
        let conn = rusqlite::Connection::open(db_path(&dir)).unwrap();
        conn.pragma_update(None, "foreign_keys", "OFF").unwrap();
        conn.execute("DELETE FROM stories WHERE id=?1", [story.id]).unwrap();

        let stats = run_once(&db, 2).await.unwrap();
        assert_eq!(stats.orphan_views, 1);
        assert_eq!(db.prune_orphan_views().unwrap(), 0);
    }

    #[tokio::test]
    async fn reaper_stops_on_shutdown() {
        let (_dir, db) = open_temp();
        let (tx, rx) = watch::channel(false);
        let handle = start_story_reaper(StorageConfig::default(), Arc::new(db), rx);
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("reaper did not stop")
            .unwrap();
    }
}

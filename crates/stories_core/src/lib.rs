/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod error;
pub mod feed;
pub mod follow_requests;
pub mod identity;
pub mod privacy;
pub mod relationships;
pub mod social_db;
pub mod storage_gc;
pub mod stories;

pub use error::{ErrorKind, Result, SocialError};
pub use social_db::{SocialDb, UserId, UserRef};

/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub private: bool,
}

/// The token is only ever returned here; the server keeps its digest.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegisterResponse {
    pub user_id: i64,
    pub username: String,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateStoryRequest {
    pub media_url: String,
    pub media_type: String,
    #[serde(default)]
    pub ttl_minutes: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToggleResponse {
    pub privacy: String,
    pub auto_accepted: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FollowResponse {
    pub follower_id: i64,
    pub followee_id: i64,
    /// `following` or `requested`.
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ViewResponse {
    pub story_id: i64,
    /// `recorded` on the first view, `already_viewed` afterwards.
    pub status: String,
}

/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub type Result<T, E = SocialError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum SocialError {
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("story not found or expired")]
    NotFoundOrExpired,
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("cannot follow yourself")]
    SelfFollow,
    #[error("already following")]
    AlreadyFollowing,
    #[error("follow request already pending")]
    AlreadyRequested,
    #[error("username already taken")]
    UsernameTaken,
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("retrieval failed: {0:#}")]
    Retrieval(#[from] anyhow::Error),
}

/// Caller-visible error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    NotFound,
    Forbidden,
    SelfFollow,
    AlreadyExists,
    Validation,
    Retrieval,
}

impl SocialError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::NotFound(_) | Self::NotFoundOrExpired => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::SelfFollow => ErrorKind::SelfFollow,
            Self::AlreadyFollowing | Self::AlreadyRequested | Self::UsernameTaken => {
                ErrorKind::AlreadyExists
            }
            Self::Validation(_) => ErrorKind::Validation,
            Self::Retrieval(_) => ErrorKind::Retrieval,
        }
    }

    /// Stable snake_case identifier used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::NotFound(_) => "not_found",
            Self::NotFoundOrExpired => "not_found_or_expired",
            Self::Forbidden(_) => "forbidden",
            Self::SelfFollow => "self_follow",
            Self::AlreadyFollowing => "already_following",
            Self::AlreadyRequested => "already_requested",
            Self::UsernameTaken => "username_taken",
            Self::Validation(_) => "validation",
            Self::Retrieval(_) => "retrieval",
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<rusqlite::Error> for SocialError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Retrieval(anyhow::Error::new(e).context("sqlite"))
    }
}

/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use stories_core::storage_gc::StorageConfig;
use stories_core::stories::StoryConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    pub max_body_bytes: usize,
    pub allow_register: bool,
    pub story: StoryConfig,
    pub storage: StorageConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            db_path: PathBuf::from("stories.db"),
            max_body_bytes: 1024 * 1024,
            allow_register: true,
            story: StoryConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

pub fn load_config() -> Result<ServerConfig> {
    from_lookup(|key| std::env::var(key).ok())
}

/// Builds the config from a variable lookup; unset or blank values keep their defaults.
pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<ServerConfig> {
    let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let mut cfg = ServerConfig::default();

    if let Some(v) = var("STORIES_BIND") {
        cfg.bind = v.parse().with_context(|| format!("STORIES_BIND invalid: {v}"))?;
    }
    if let Some(v) = var("STORIES_DB") {
        cfg.db_path = PathBuf::from(v);
    }
    if let Some(v) = var("STORIES_MAX_BODY_BYTES") {
        cfg.max_body_bytes = parse_num("STORIES_MAX_BODY_BYTES", &v)?;
    }
    if let Some(v) = var("STORIES_ALLOW_REGISTER") {
        cfg.allow_register = parse_bool("STORIES_ALLOW_REGISTER", &v)?;
    }
    if let Some(v) = var("STORIES_DEFAULT_TTL_MINUTES") {
        cfg.story.default_ttl_minutes = Some(parse_num("STORIES_DEFAULT_TTL_MINUTES", &v)?);
    }
    if let Some(v) = var("STORIES_MAX_TTL_MINUTES") {
        cfg.story.max_ttl_minutes = Some(parse_num("STORIES_MAX_TTL_MINUTES", &v)?);
    }
    if let Some(v) = var("STORIES_GC_INTERVAL_SECS") {
        cfg.storage.gc_interval_secs = Some(parse_num("STORIES_GC_INTERVAL_SECS", &v)?);
    }
    Ok(cfg)
}

fn parse_num<T>(key: &str, v: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    v.parse::<T>().with_context(|| format!("{key} invalid: {v}"))
}

fn parse_bool(key: &str, v: &str) -> Result<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{key} invalid: {v}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.bind.port(), 8080);
        assert_eq!(cfg.db_path, PathBuf::from("stories.db"));
        assert_eq!(cfg.max_body_bytes, 1024 * 1024);
        assert!(cfg.allow_register);
        assert_eq!(cfg.story.max_ttl_minutes, Some(1440));
        assert_eq!(cfg.storage.gc_interval_secs, Some(60));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = from_lookup(lookup(&[
            ("STORIES_BIND", "127.0.0.1:9000"),
            ("STORIES_DB", "/tmp/x.db"),
            ("STORIES_ALLOW_REGISTER", "false"),
            ("STORIES_DEFAULT_TTL_MINUTES", "30"),
            ("STORIES_MAX_TTL_MINUTES", "60"),
            ("STORIES_GC_INTERVAL_SECS", " 10 "),
        ]))
        .unwrap();
        assert_eq!(cfg.bind, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/x.db"));
        assert!(!cfg.allow_register);
        assert_eq!(cfg.story.default_ttl_minutes, Some(30));
        assert_eq!(cfg.story.max_ttl_minutes, Some(60));
        assert_eq!(cfg.storage.gc_interval_secs, Some(10));
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(from_lookup(lookup(&[("STORIES_BIND", "nope")])).is_err());
        assert!(from_lookup(lookup(&[("STORIES_MAX_BODY_BYTES", "-1")])).is_err());
        assert!(from_lookup(lookup(&[("STORIES_ALLOW_REGISTER", "maybe")])).is_err());
    }
}

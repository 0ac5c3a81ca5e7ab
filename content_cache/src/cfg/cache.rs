// Copyright 2025 ReductSoftware UG
// Licensed under the Business Source License 1.1

use crate::cfg::CfgParser;
use crate::core::env::{Env, GetEnv};
use bytesize::ByteSize;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CACHE_PATH: &str = "/tmp/content-cache";
const DEFAULT_EVICTION_INTERVAL_S: u64 = 60;

/// When the cache budget is enforced.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum EvictionMode {
    /// Right after every cached file
    OnWrite,
    /// By a background worker, caching never evicts
    Periodic(Duration),
}

/// Local cache settings
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CacheConfig {
    /// Directory holding the cached files
    pub path: PathBuf,
    /// Budget of the cache in bytes
    pub max_bytes: u64,
    pub eviction_mode: EvictionMode,
    /// Remove all cached files on startup instead of indexing them
    pub cleanup_on_start: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            path: PathBuf::from(DEFAULT_CACHE_PATH),
            max_bytes: ByteSize::gb(1).as_u64(),
            eviction_mode: EvictionMode::OnWrite,
            cleanup_on_start: false,
        }
    }
}

impl CacheConfig {
    pub fn new(path: PathBuf, max_bytes: u64) -> Self {
        CacheConfig {
            path,
            max_bytes,
            ..Default::default()
        }
    }
}

impl<EnvGetter: GetEnv> CfgParser<EnvGetter> {
    pub(super) fn parse_cache_config(env: &mut Env<EnvGetter>) -> CacheConfig {
        let interval = Duration::from_secs(
            env.get_optional::<u64>("CC_EVICTION_INTERVAL")
                .unwrap_or(DEFAULT_EVICTION_INTERVAL_S),
        );

        CacheConfig {
            path: PathBuf::from(env.get("CC_CACHE_PATH", DEFAULT_CACHE_PATH.to_string(), false)),
            max_bytes: env
                .get("CC_CACHE_SIZE", ByteSize::gb(1), false)
                .as_u64(),
            eviction_mode: match env
                .get_optional::<String>("CC_EVICTION_MODE")
                .unwrap_or("on-write".to_string())
                .to_lowercase()
                .as_str()
            {
                "on-write" => EvictionMode::OnWrite,
                "periodic" => EvictionMode::Periodic(interval),
                _ => panic!("Invalid value for CC_EVICTION_MODE: must be 'on-write' or 'periodic'"),
            },
            cleanup_on_start: env
                .get_optional::<bool>("CC_CLEANUP_ON_START")
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::tests::MockEnvGetter;
    use mockall::predicate::eq;
    use rstest::rstest;
    use std::env::VarError;

    fn env_with(key: &'static str, value: &str) -> Env<MockEnvGetter> {
        let mut env_getter = MockEnvGetter::new();
        env_getter
            .expect_get()
            .with(eq(key))
            .return_const(Ok(value.to_string()));
        env_getter
            .expect_get()
            .return_const(Err(VarError::NotPresent));
        Env::new(env_getter)
    }

    #[rstest]
    #[case("1GB", 1_000_000_000)]
    #[case("512KiB", 524_288)]
    #[case("100B", 100)]
    fn test_cache_size(#[case] raw: &str, #[case] expected: u64) {
        let cfg = CfgParser::<MockEnvGetter>::parse_cache_config(&mut env_with("CC_CACHE_SIZE", raw));
        assert_eq!(cfg.max_bytes, expected);
    }

    #[rstest]
    fn test_invalid_cache_size_falls_back() {
        let mut env = env_with("CC_CACHE_SIZE", "lots");
        let cfg = CfgParser::<MockEnvGetter>::parse_cache_config(&mut env);
        assert_eq!(cfg.max_bytes, ByteSize::gb(1).as_u64());
        assert!(env.message().contains("CC_CACHE_SIZE"));
        assert!(env.message().contains("(invalid)"));
    }

    #[rstest]
    fn test_periodic_default_interval() {
        let cfg = CfgParser::<MockEnvGetter>::parse_cache_config(&mut env_with(
            "CC_EVICTION_MODE",
            "Periodic",
        ));
        assert_eq!(
            cfg.eviction_mode,
            EvictionMode::Periodic(Duration::from_secs(DEFAULT_EVICTION_INTERVAL_S))
        );
    }

    #[rstest]
    #[should_panic(expected = "Invalid value for CC_EVICTION_MODE: must be 'on-write' or 'periodic'")]
    fn test_invalid_eviction_mode() {
        CfgParser::<MockEnvGetter>::parse_cache_config(&mut env_with("CC_EVICTION_MODE", "lazy"));
    }
}

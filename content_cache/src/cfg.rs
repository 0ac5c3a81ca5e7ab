// Copyright 2025 ReductSoftware UG
// Licensed under the Business Source License 1.1

pub mod cache;

use crate::cfg::cache::CacheConfig;
use crate::core::env::{Env, GetEnv};

/// Application configuration
#[derive(Clone, Debug, PartialEq)]
pub struct Cfg {
    pub log_level: String,
    pub cache: CacheConfig,
}

/// Builds [`Cfg`] from environment variables.
pub struct CfgParser<EnvGetter: GetEnv> {
    pub cfg: Cfg,
    pub env: Env<EnvGetter>,
}

impl<EnvGetter: GetEnv> CfgParser<EnvGetter> {
    pub fn from_env(env_getter: EnvGetter) -> Self {
        let mut env = Env::new(env_getter);
        let cfg = Cfg {
            log_level: env.get("CC_LOG_LEVEL", "INFO".to_string(), false),
            cache: Self::parse_cache_config(&mut env),
        };

        CfgParser { cfg, env }
    }
}

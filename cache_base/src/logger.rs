// Copyright 2025 ReductSoftware UG
// This Source Code Form is subject to the terms of the Mozilla Public
//    License, v. 2.0. If a copy of the MPL was not distributed with this
//    file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::prelude::{DateTime, Utc};
use log::{warn, Level, Log, Metadata, Record};
use std::collections::BTreeMap;
use std::sync::{LazyLock, RwLock};

static LOGGER: Logger = Logger;

/// Module path (with `/` separators) -> maximum enabled level.
/// The empty path is the root and always present after `init`.
static LEVELS: LazyLock<RwLock<BTreeMap<String, Level>>> =
    LazyLock::new(|| RwLock::new(BTreeMap::new()));

pub struct Logger;

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let levels = LEVELS.read().unwrap();
        let target = metadata.target().replace("::", "/");

        // longest matching path wins, BTreeMap order puts it last
        for (path, level) in levels.iter().rev() {
            if is_under(&target, path) {
                return metadata.level() <= *level;
            }
        }
        false
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let now: DateTime<Utc> = Utc::now();
        let file = match record.file() {
            Some(file) => match file.split_once("src/") {
                Some((_, file)) => file,
                None => file,
            },
            None => "(unknown)",
        };

        let crate_name = match record.target().split_once(':') {
            Some((name, _)) => name,
            None => record.target(),
        };

        eprintln!(
            "{} ({:>5}) [{}] -- {}/{}:{} {}",
            now.format("%Y-%m-%d %H:%M:%S.%3f"),
            thread_id::get() % 100000,
            record.level(),
            crate_name,
            file,
            record.line().unwrap_or(0),
            record.args(),
        );
    }

    fn flush(&self) {}
}

/// True if `target` is the module `path` or one of its submodules.
fn is_under(target: &str, path: &str) -> bool {
    match target.strip_prefix(path) {
        Some(rest) => path.is_empty() || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn parse_level(level: &str) -> Option<Level> {
    match level.trim().to_uppercase().as_str() {
        "TRACE" => Some(Level::Trace),
        "DEBUG" => Some(Level::Debug),
        "INFO" => Some(Level::Info),
        "WARN" => Some(Level::Warn),
        "ERROR" => Some(Level::Error),
        _ => None,
    }
}

impl Logger {
    /// Initialize the logger.
    ///
    /// # Arguments
    ///
    /// * `levels` - Comma separated list of levels, e.g. `INFO,content_cache/provider=DEBUG`.
    ///   An item without a path sets the root level. Levels are TRACE, DEBUG, INFO, WARN, ERROR.
    pub fn init(levels: &str) {
        let mut invalid = Vec::new();
        let mut max_level = Level::Info;
        {
            let mut paths = LEVELS.write().unwrap();
            paths.clear();
            paths.insert(String::new(), Level::Info);

            for item in levels.split(',').filter(|item| !item.trim().is_empty()) {
                let (path, level) = match item.split_once('=') {
                    Some((path, level)) => (path.trim(), level),
                    None => ("", item),
                };

                let level = parse_level(level).unwrap_or_else(|| {
                    invalid.push(level.trim().to_string());
                    Level::Info
                });

                max_level = std::cmp::max(max_level, level);
                paths.insert(path.to_string(), level);
            }
        }

        log::set_logger(&LOGGER).ok();
        log::set_max_level(max_level.to_level_filter());

        for level in invalid {
            warn!("Invalid log level: {}, defaulting to INFO", level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serial_test::serial;

    fn enabled(level: Level, target: &str) -> bool {
        LOGGER.enabled(&Metadata::builder().level(level).target(target).build())
    }

    #[rstest]
    #[serial]
    fn it_works() {
        Logger::init("INFO");
        log::info!("Hello, cache!");
    }

    #[rstest]
    #[serial]
    fn test_per_module_levels() {
        Logger::init("DEBUG,content_cache/provider=TRACE,content_cache/cache=ERROR");

        assert!(enabled(Level::Debug, "content_cache"));
        assert!(!enabled(Level::Trace, "content_cache"));

        assert!(enabled(Level::Trace, "content_cache::provider"));
        assert!(enabled(Level::Error, "content_cache::cache::store"));
        assert!(!enabled(Level::Warn, "content_cache::cache::store"));

        assert!(enabled(Level::Debug, "other"));
        assert!(!enabled(Level::Trace, "other"));
    }

    #[rstest]
    #[serial]
    fn test_levels_match_whole_modules() {
        Logger::init("WARN,content_cache=DEBUG");

        assert!(enabled(Level::Debug, "content_cache::provider"));
        assert!(enabled(Level::Debug, "content_cache"));
        assert!(!enabled(Level::Debug, "content_cache_other::provider"));
        assert!(!enabled(Level::Info, "content_cache_other"));
    }

    #[rstest]
    #[case("a/b", "a", true)]
    #[case("a", "a", true)]
    #[case("ab", "a", false)]
    #[case("anything", "", true)]
    #[case("a", "a/b", false)]
    fn test_is_under(#[case] target: &str, #[case] path: &str, #[case] expected: bool) {
        assert_eq!(is_under(target, path), expected);
    }

    #[rstest]
    #[serial]
    fn test_invalid_level_defaults_to_info() {
        Logger::init("WRONG");
        assert!(enabled(Level::Info, "content_cache"), "Default level is INFO");
        assert!(!enabled(Level::Debug, "content_cache"));
    }

    #[rstest]
    #[serial]
    fn test_reinit_resets_paths() {
        Logger::init("content_cache=TRACE");
        assert!(enabled(Level::Trace, "content_cache"));

        Logger::init("WARN");
        assert!(!enabled(Level::Trace, "content_cache"));
        assert!(!enabled(Level::Info, "content_cache"));
    }
}

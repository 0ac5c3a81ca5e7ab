// Copyright 2025 ReductSoftware UG
// Licensed under the Business Source License 1.1

use std::env::VarError;
use std::fmt::Display;
use std::str::FromStr;

/// Source of environment variables.
pub trait GetEnv {
    fn get(&self, key: &str) -> Result<String, VarError>;
}

/// Reads the process environment.
#[derive(Default, Clone)]
pub struct StdEnvGetter;

impl GetEnv for StdEnvGetter {
    fn get(&self, key: &str) -> Result<String, VarError> {
        std::env::var(key)
    }
}

/// A helper to read settings from environment variables.
///
/// Every read value is recorded in a human readable summary which can be
/// printed at startup.
pub struct Env<EnvGetter: GetEnv> {
    getter: EnvGetter,
    message: String,
}

impl<EnvGetter: GetEnv> Env<EnvGetter> {
    pub fn new(getter: EnvGetter) -> Env<EnvGetter> {
        Env {
            getter,
            message: String::new(),
        }
    }

    /// Get a value from the environment.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to get.
    /// * `default_value` - The value to return if the key is missing or can't be parsed.
    /// * `masked` - Whether or not to mask the value in the summary.
    pub fn get<T: FromStr + Display>(&mut self, key: &str, default_value: T, masked: bool) -> T {
        let (value, note) = match self.getter.get(key) {
            Ok(value) => match value.parse() {
                Ok(value) => (value, ""),
                Err(_) => (default_value, "(invalid)"),
            },
            Err(_) => (default_value, "(default)"),
        };

        self.record(key, &value, masked, note);
        value
    }

    /// Get a value from the environment if it is set and valid.
    pub fn get_optional<T: FromStr + Display>(&mut self, key: &str) -> Option<T> {
        let raw = self.getter.get(key).ok()?;
        match raw.parse::<T>() {
            Ok(value) => {
                self.record(key, &value, false, "");
                Some(value)
            }
            Err(_) => {
                self.message
                    .push_str(&format!("\t{} = {} (invalid)\n", key, raw));
                None
            }
        }
    }

    /// Pretty printed summary of the read values.
    pub fn message(&self) -> &String {
        &self.message
    }

    fn record<T: Display>(&mut self, key: &str, value: &T, masked: bool, note: &str) {
        let value = value.to_string();
        let value = if masked {
            "*".repeat(value.len())
        } else {
            value
        };
        self.message
            .push_str(&format!("\t{} = {} {}\n", key, value, note));
    }
}

// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for step instrumentation.
//!
//! Configuration is a handful of booleans. It is read from an optional TOML
//! file and from `STEPSCOPE_*` environment variables, with the environment
//! taking precedence:
//!
//! ```toml
//! log_steps = true
//! debug_trace = false
//! aggregate_observed_failures = false
//! ```
//!
//! The process-wide configuration is loaded once, by [`StepConfig::global`].
//! Test runner integrations that need different settings per test bind a
//! [`StepSession`](crate::session::StepSession) instead.

use crate::errors::ConfigParseError;
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// The prefix for environment variables read by [`StepConfig::load`].
pub const ENV_PREFIX: &str = "STEPSCOPE";

/// The environment variable naming an optional TOML configuration file for
/// [`StepConfig::global`].
pub const CONFIG_PATH_ENV: &str = "STEPSCOPE_CONFIG";

/// Step instrumentation settings.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    /// Emit a log line when each step starts and ends.
    pub log_steps: bool,

    /// Emit a log line each time the raise observer records a failure.
    pub debug_trace: bool,

    /// Count children that failed by observation, but swallowed their failure,
    /// toward an aggregate step's combined failure.
    ///
    /// By default only failures that escape a child are counted.
    pub aggregate_observed_failures: bool,
}

impl StepConfig {
    /// Loads configuration from an optional TOML file and the process
    /// environment.
    pub fn load(config_file: Option<&Utf8Path>) -> Result<Self, ConfigParseError> {
        Self::load_impl(config_file, None)
    }

    /// Loads configuration from an optional TOML file and an explicit set of
    /// environment variables, instead of the process environment.
    pub fn load_with_env(
        config_file: Option<&Utf8Path>,
        env: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ConfigParseError> {
        Self::load_impl(config_file, Some(env.into_iter().collect()))
    }

    fn load_impl(
        config_file: Option<&Utf8Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigParseError> {
        let mut builder = Config::builder();
        if let Some(path) = config_file {
            builder = builder.add_source(File::new(path.as_str(), FileFormat::Toml));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(env),
        );

        let to_error = |err| ConfigParseError::new(config_file.map(Utf8PathBuf::from), err);
        builder
            .build()
            .map_err(to_error)?
            .try_deserialize()
            .map_err(to_error)
    }

    /// Returns the process-wide configuration.
    ///
    /// The configuration is loaded on first use from the file named by
    /// [`CONFIG_PATH_ENV`] (if set) and the process environment. Loading is
    /// fault-tolerant: on error, defaults are used and a warning is logged.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<StepConfig> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let config_file = std::env::var(CONFIG_PATH_ENV).ok().map(Utf8PathBuf::from);
            match Self::load(config_file.as_deref()) {
                Ok(config) => {
                    debug!("loaded step config: {config:?}");
                    config
                }
                Err(error) => {
                    warn!("{error}, using defaults");
                    Self::default()
                }
            }
        })
    }
}

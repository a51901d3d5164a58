// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for reporting to oar.
//!
//! Configuration is layered, lowest precedence first:
//!
//! 1. the defaults embedded in this crate,
//! 2. a config file (`oar-config.toml` in the working directory, or the file named by
//!    `OAR_CONFIG_PATH`), in TOML or JSON format,
//! 3. environment variables prefixed with `OAR_`, e.g. `OAR_SEND_RESULTS=true`.

use crate::{
    errors::ConfigError,
    retry::{RetryPolicy, deserialize_retry_policy},
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{collections::BTreeSet, time::Duration};
use tracing::{debug, warn};

/// Environment variable naming the config file to load.
pub const CONFIG_PATH_ENV: &str = "OAR_CONFIG_PATH";

/// Config file loaded when [`CONFIG_PATH_ENV`] is not set.
pub const DEFAULT_CONFIG_FILE: &str = "oar-config.toml";

/// Special value for `--config` and `OAR_CONFIG_PATH` that skips loading a config file.
pub const CONFIG_NONE: &str = "none";

/// Prefix of environment variables that override config values.
pub const ENV_PREFIX: &str = "OAR";

/// `OAR_` variables that are not config values.
const NON_CONFIG_ENV: &[&str] = &[CONFIG_PATH_ENV, "OAR_LOG", "OAR_VERBOSE", "OAR_COLOR"];

/// Specifies where to load the config file from.
#[derive(Clone, Copy, Debug)]
pub enum ConfigLocation<'a> {
    /// The file named by `OAR_CONFIG_PATH`, or `oar-config.toml`, relative to the working
    /// directory.
    ///
    /// A missing file is not an error: the defaults are used instead.
    Default,

    /// Skip the config file, using only built-in defaults and environment variables.
    Isolated,

    /// Load the config file at this path.
    ///
    /// Returns an error if the file does not exist.
    Explicit(&'a Utf8Path),
}

impl<'a> ConfigLocation<'a> {
    /// Creates a config location from a CLI or environment variable value.
    ///
    /// Returns `Default` if `None`, `Isolated` if `"none"`, otherwise `Explicit` with the path.
    pub fn from_cli_or_env(s: Option<&'a str>) -> Self {
        match s {
            None => Self::Default,
            Some(s) if s == CONFIG_NONE => Self::Isolated,
            Some(s) => Self::Explicit(Utf8Path::new(s)),
        }
    }
}

/// Settings that control how a run reports its results.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct OarConfig {
    /// Base URL of the oar service.
    pub host: String,

    /// Send results to the oar service.
    pub send_results: bool,

    /// Keep results in memory for the end-of-run summary.
    pub store_results: bool,

    /// Write a JSON report file at the end of the run.
    pub output_file: bool,

    /// Directory report files are written to.
    pub output_dir: Utf8PathBuf,

    /// Retry policy for requests to the service.
    #[serde(default, deserialize_with = "deserialize_retry_policy")]
    pub retries: RetryPolicy,

    /// Timeout for a single request to the service.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for OarConfig {
    fn default() -> Self {
        Self {
            host: "http://oar-service:8080".to_owned(),
            send_results: false,
            store_results: true,
            output_file: true,
            output_dir: Utf8PathBuf::from("oar-results"),
            retries: RetryPolicy::default(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl OarConfig {
    /// The default configuration, embedded in this crate.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Loads configuration from `location` and the process environment.
    ///
    /// Unknown keys are logged as warnings.
    pub fn load(location: ConfigLocation<'_>) -> Result<Self, ConfigError> {
        let env = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
        Self::from_sources(location, env, &mut DefaultConfigWarnings)
    }

    /// Loads configuration from `location` and the given environment variables.
    pub fn from_sources(
        location: ConfigLocation<'_>,
        env: impl IntoIterator<Item = (String, String)>,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigError> {
        let env: config::Map<String, String> = env.into_iter().collect();

        let config_file = match location {
            ConfigLocation::Isolated => None,
            ConfigLocation::Explicit(path) => {
                if !path.is_file() {
                    return Err(ConfigError::NotFound {
                        path: path.to_owned(),
                    });
                }
                Some(path.to_owned())
            }
            ConfigLocation::Default => {
                let path = match env.get(CONFIG_PATH_ENV) {
                    Some(path) if path == CONFIG_NONE => None,
                    Some(path) => Some(Utf8PathBuf::from(path)),
                    None => Some(Utf8PathBuf::from(DEFAULT_CONFIG_FILE)),
                };
                path.filter(|path| {
                    let exists = path.is_file();
                    if !exists {
                        debug!("config: file does not exist at {path}, using defaults");
                    }
                    exists
                })
            }
        };

        let mut builder = Self::make_default_config();
        if let Some(path) = &config_file {
            debug!("config: loading from {path}");
            builder = builder.add_source(File::new(path.as_str(), file_format(path)?));
        }

        let env = env
            .into_iter()
            .filter(|(key, _)| !NON_CONFIG_ENV.contains(&key.as_str()))
            .collect();
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(Some(env)),
        );

        let (config, unknown) = Self::build_and_deserialize_config(&builder)?;
        if !unknown.is_empty() {
            warnings.unknown_config_keys(config_file.as_deref(), &unknown);
        }
        Ok(config)
    }

    /// Returns the base URL of the service, with a scheme and without a trailing slash.
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        if host.contains("://") {
            host.to_owned()
        } else {
            format!("http://{host}")
        }
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(Self, BTreeSet<String>), ConfigError> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigError::Build { error })?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: OarConfig = serde_path_to_error::deserialize(ignored_de).map_err(|error| {
            // The config crate may also report the key. Drop it from the inner error, since the
            // path is reported separately.
            let key = error.path().to_string();
            let error = match error.into_inner() {
                config::ConfigError::At { error, .. } => *error,
                other => other,
            };
            ConfigError::Deserialize { key, error }
        })?;

        Ok((config, ignored))
    }
}

fn file_format(path: &Utf8Path) -> Result<FileFormat, ConfigError> {
    match path.extension() {
        Some("toml") => Ok(FileFormat::Toml),
        Some("json") => Ok(FileFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat {
            path: path.to_owned(),
        }),
    }
}

/// Trait for handling configuration warnings.
///
/// This trait allows for different warning handling strategies, such as logging warnings (the
/// default behavior) or collecting them for testing purposes.
pub trait ConfigWarnings {
    /// Handle unknown configuration keys found in the config file or environment.
    fn unknown_config_keys(&mut self, config_file: Option<&Utf8Path>, unknown: &BTreeSet<String>);
}

/// Default implementation of [`ConfigWarnings`] that logs warnings using the tracing crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: Option<&Utf8Path>, unknown: &BTreeSet<String>) {
        let mut unknown_str = String::new();
        if let [key] = unknown.iter().collect::<Vec<_>>().as_slice() {
            // Print this on the same line.
            unknown_str.push_str("key: ");
            unknown_str.push_str(key);
        } else {
            unknown_str.push_str("keys:\n");
            for ignored_key in unknown {
                unknown_str.push('\n');
                unknown_str.push_str("  - ");
                unknown_str.push_str(ignored_key);
            }
        }

        match config_file {
            Some(config_file) => {
                warn!("in config file {config_file} or environment, ignoring unknown configuration {unknown_str}")
            }
            None => warn!("in environment, ignoring unknown configuration {unknown_str}"),
        }
    }
}

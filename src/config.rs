//! Configuration file loading for CLI defaults.
//!
//! Values come from `--config <path>` or, when present,
//! `$XDG_CONFIG_HOME/catalog-dl/config.toml` (falling back to
//! `$HOME/.config/catalog-dl/config.toml`). Command-line flags override
//! file values.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use catalog_dl::retry::Backoff;
use clap::ValueEnum;
use serde::Deserialize;

const APP_DIR: &str = "catalog-dl";

/// Which resolver the `run` command uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ResolverKind {
    /// Scrape a lookup page for the binary link.
    #[default]
    LinkPage,
    /// The reference already is the binary URL.
    Direct,
}

/// TOML-backed file configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// `SQLite` catalog path.
    pub database: Option<PathBuf>,
    /// Flat output directory for fetched files.
    pub output_dir: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub page_size: Option<usize>,
    /// Per-run item limit.
    pub max_items: Option<usize>,
    pub max_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
    pub retry_jitter_ms: Option<u64>,
    pub backoff: Option<Backoff>,
    pub resolver: Option<ResolverKind>,
    /// Anchor prefix marking the binary link on lookup pages.
    pub link_prefix: Option<String>,
    /// Lookup page used when an item has no reference; `{key}` is substituted.
    pub page_url_template: Option<String>,
    pub resolve_connect_timeout_secs: Option<u64>,
    pub resolve_timeout_secs: Option<u64>,
    pub fetch_connect_timeout_secs: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
    /// Return stale `in_progress` claims to pending at startup (default off).
    pub recover_stale_claims: Option<bool>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        validate_range("concurrency", self.concurrency, 1, 64)?;
        validate_range("page_size", self.page_size, 1, 10_000)?;
        validate_range("max_attempts", self.max_attempts, 1, 10)?;
        validate_range("retry_base_delay_ms", self.retry_base_delay_ms, 0, 600_000)?;
        validate_range("retry_max_delay_ms", self.retry_max_delay_ms, 0, 600_000)?;
        validate_range("retry_jitter_ms", self.retry_jitter_ms, 0, 60_000)?;
        validate_range(
            "resolve_connect_timeout_secs",
            self.resolve_connect_timeout_secs,
            1,
            3600,
        )?;
        validate_range("resolve_timeout_secs", self.resolve_timeout_secs, 1, 3600)?;
        validate_range(
            "fetch_connect_timeout_secs",
            self.fetch_connect_timeout_secs,
            1,
            3600,
        )?;
        validate_range("fetch_timeout_secs", self.fetch_timeout_secs, 1, 3600)?;

        if let Some(max_items) = self.max_items
            && max_items == 0
        {
            bail!("Invalid config value for `max_items`: 0. Expected at least 1");
        }
        if let Some(prefix) = &self.link_prefix
            && prefix.trim().trim_start_matches('/').is_empty()
        {
            bail!("Invalid config value for `link_prefix`: must not be empty");
        }
        if let Some(template) = &self.page_url_template
            && !template.contains("{key}")
        {
            bail!("Invalid config value for `page_url_template`: missing `{{key}}` placeholder");
        }
        Ok(())
    }
}

fn validate_range<T>(field: &str, value: Option<T>, min: T, max: T) -> Result<()>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    let Some(value) = value else {
        return Ok(());
    };
    if value < min || value > max {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Path the config was read from, if any.
    pub path: Option<PathBuf>,
    /// Parsed values; empty when no file was found.
    pub config: FileConfig,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/catalog-dl/config.toml`
/// 2. `$HOME/.config/catalog-dl/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads configuration.
///
/// An explicit path must exist; the default path is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: load_file_config(path)?,
        });
    }

    match resolve_default_config_path() {
        Some(path) if path.exists() => {
            let config = load_file_config(&path)?;
            Ok(LoadedConfig {
                path: Some(path),
                config,
            })
        }
        _ => Ok(LoadedConfig::default()),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

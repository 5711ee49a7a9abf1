//! Merges file configuration and command-line flags into run settings.
//!
//! Precedence: CLI flag, then config file, then built-in default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use catalog_dl::fetch::constants::{CONNECT_TIMEOUT_SECS, FETCH_TIMEOUT_SECS};
use catalog_dl::http_client::HttpTimeouts;
use catalog_dl::resolver::{
    DEFAULT_LINK_PREFIX, PAGE_CONNECT_TIMEOUT_SECS, PAGE_TIMEOUT_SECS,
};
use catalog_dl::retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY};
use catalog_dl::{EngineConfig, LinkPageConfig, RetryPolicy};

use crate::cli::RunArgs;
use crate::config::{FileConfig, ResolverKind};

pub(crate) const DEFAULT_DATABASE: &str = "catalog.db";
pub(crate) const DEFAULT_OUTPUT_DIR: &str = "downloads";

/// Catalog path from `--database`, the config file, or the default.
pub(crate) fn database_path(cli_value: Option<&Path>, file: &FileConfig) -> PathBuf {
    cli_value
        .map(Path::to_path_buf)
        .or_else(|| file.database.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
}

/// Everything the `run` command needs to build the pipeline.
#[derive(Debug, Clone)]
pub(crate) struct RunSettings {
    pub output_dir: PathBuf,
    pub engine: EngineConfig,
    pub resolver: ResolverKind,
    pub link_page: LinkPageConfig,
    pub fetch_timeouts: HttpTimeouts,
    pub user_agent: Option<String>,
}

/// Applies `run` flags on top of the file config, validates the result and
/// fills in defaults.
pub(crate) fn resolve_run_settings(file: &FileConfig, args: &RunArgs) -> Result<RunSettings> {
    let merged = apply_run_overrides(file, args)?;
    merged.validate()?;
    Ok(RunSettings::from_config(&merged))
}

fn apply_run_overrides(file: &FileConfig, args: &RunArgs) -> Result<FileConfig> {
    let mut merged = file.clone();
    if let Some(dir) = &args.output_dir {
        merged.output_dir = Some(dir.clone());
    }
    if let Some(concurrency) = args.concurrency {
        merged.concurrency = Some(usize::from(concurrency));
    }
    if let Some(max_items) = args.max_items {
        merged.max_items = Some(usize::try_from(max_items)?);
    }
    if let Some(max_attempts) = args.max_attempts {
        merged.max_attempts = Some(u32::from(max_attempts));
    }
    if let Some(resolver) = args.resolver {
        merged.resolver = Some(resolver);
    }
    if let Some(template) = &args.page_url_template {
        merged.page_url_template = Some(template.clone());
    }
    if let Some(prefix) = &args.link_prefix {
        merged.link_prefix = Some(prefix.clone());
    }
    if args.recover_stale {
        merged.recover_stale_claims = Some(true);
    }
    Ok(merged)
}

impl RunSettings {
    fn from_config(config: &FileConfig) -> Self {
        let defaults = EngineConfig::default();

        let retry_policy = RetryPolicy::new(
            config.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            config
                .retry_base_delay_ms
                .map_or(DEFAULT_BASE_DELAY, Duration::from_millis),
            config.backoff.unwrap_or_default(),
            config
                .retry_max_delay_ms
                .map_or(DEFAULT_MAX_DELAY, Duration::from_millis),
        )
        .with_jitter(Duration::from_millis(config.retry_jitter_ms.unwrap_or(0)));

        let engine = EngineConfig {
            concurrency: config.concurrency.unwrap_or(defaults.concurrency),
            page_size: config.page_size.unwrap_or(defaults.page_size),
            max_items: config.max_items,
            retry_policy,
            recover_stale_claims: config
                .recover_stale_claims
                .unwrap_or(defaults.recover_stale_claims),
        };

        let link_page = LinkPageConfig {
            link_prefix: config
                .link_prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_LINK_PREFIX.to_string()),
            page_url_template: config.page_url_template.clone(),
            timeouts: HttpTimeouts::from_secs(
                config
                    .resolve_connect_timeout_secs
                    .unwrap_or(PAGE_CONNECT_TIMEOUT_SECS),
                config.resolve_timeout_secs.unwrap_or(PAGE_TIMEOUT_SECS),
            ),
            user_agent: config.user_agent.clone(),
        };

        Self {
            output_dir: config
                .output_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            engine,
            resolver: config.resolver.unwrap_or_default(),
            link_page,
            fetch_timeouts: HttpTimeouts::from_secs(
                config
                    .fetch_connect_timeout_secs
                    .unwrap_or(CONNECT_TIMEOUT_SECS),
                config.fetch_timeout_secs.unwrap_or(FETCH_TIMEOUT_SECS),
            ),
            user_agent: config.user_agent.clone(),
        }
    }
}

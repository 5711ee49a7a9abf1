//! Shared HTTP client construction for the resolver and the fetcher.
//!
//! Both clients carry an explicit connect timeout and a total request
//! timeout, gzip support and the tool's User-Agent. Proxies come from the
//! standard `HTTP_PROXY`/`HTTPS_PROXY` variables.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Proxy};
use tracing::warn;

use crate::user_agent;

/// Connect and total timeouts for one HTTP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// Time allowed to establish a connection.
    pub connect: Duration,
    /// Time allowed for the whole request, body included.
    pub total: Duration,
}

impl HttpTimeouts {
    #[must_use]
    pub fn from_secs(connect_secs: u64, total_secs: u64) -> Self {
        Self {
            connect: Duration::from_secs(connect_secs),
            total: Duration::from_secs(total_secs),
        }
    }
}

/// Builds a client with the given timeouts and User-Agent.
///
/// Some sandboxed environments panic while reading system proxy settings;
/// in that case the client is rebuilt with only the environment proxies.
///
/// # Errors
///
/// Returns the reqwest builder error if the client cannot be constructed.
pub fn build_http_client(
    timeouts: HttpTimeouts,
    user_agent: Option<&str>,
) -> Result<Client, reqwest::Error> {
    let user_agent = user_agent.map_or_else(user_agent::default_user_agent, str::to_string);

    let primary = catch_unwind(AssertUnwindSafe(|| {
        base_builder(timeouts, &user_agent).build()
    }));
    match primary {
        Ok(result) => result,
        Err(_) => {
            warn!("HTTP client builder panicked loading system proxy settings; using env proxies");
            apply_env_proxies(base_builder(timeouts, &user_agent).no_proxy()).build()
        }
    }
}

fn base_builder(timeouts: HttpTimeouts, user_agent: &str) -> ClientBuilder {
    Client::builder()
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.total)
        .gzip(true)
        .user_agent(user_agent)
}

fn apply_env_proxies(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    let names: &[&str] = match scheme {
        "https" => &["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"],
        "http" => &["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"],
        _ => return None,
    };
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

//! Default User-Agent string for lookup-page and fetch traffic.

/// Default User-Agent (identifies the tool and its version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let name = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");
    format!("{name}/{version} (catalog-ingest)")
}

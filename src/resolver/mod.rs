//! Location resolution: catalog reference to absolute fetch URL.
//!
//! - [`Resolver`] - async trait the engine calls once per attempt
//! - [`LinkPageResolver`] - loads one lookup page and scrapes the binary link
//! - [`DirectResolver`] - the reference already is the binary URL
//!
//! Errors are classified through [`crate::retry::Classify`]: only
//! [`ResolveError::Transient`] is retried.

mod direct;
mod error;
mod link_page;

pub use direct::DirectResolver;
pub use error::ResolveError;
pub use link_page::{
    DEFAULT_LINK_PREFIX, LinkPageConfig, LinkPageResolver, PAGE_CONNECT_TIMEOUT_SECS,
    PAGE_TIMEOUT_SECS, find_fetch_link,
};

use async_trait::async_trait;

use crate::fetch::FetchTarget;
use crate::store::Item;

/// Turns an item into a concrete fetch target.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Resolves `item` to an absolute URL plus the derived filename.
    async fn resolve(&self, item: &Item) -> Result<FetchTarget, ResolveError>;
}

//! Constants for the fetch module (timeouts, filename limits).

/// Default HTTP connect timeout for binary fetches (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default total request timeout for binary fetches (2 minutes).
pub const FETCH_TIMEOUT_SECS: u64 = 120;

/// Maximum length of a derived filename stem, in bytes.
pub const MAX_STEM_LEN: usize = 200;

/// Extension used when the catalog has no file type.
pub const DEFAULT_EXTENSION: &str = "bin";

/// Suffix of in-flight temporary files.
pub const PART_SUFFIX: &str = "part";

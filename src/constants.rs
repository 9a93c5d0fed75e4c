// src/constants.rs
//
// Centralized constants for scistore to avoid hardcoded values throughout the codebase

/// Environment variables consulted by the credential resolver
pub const ENV_AUTH_URL: &str = "OS_AUTH_URL";
pub const ENV_USERNAME: &str = "OS_USERNAME";
pub const ENV_PASSWORD: &str = "OS_PASSWORD";
pub const ENV_TENANT_NAME: &str = "OS_TENANT_NAME";
pub const ENV_STORAGE_URL: &str = "OS_STORAGE_URL";
pub const ENV_AUTH_TOKEN: &str = "OS_AUTH_TOKEN";

/// Overrides the token cache directory (default: `~/.swift`)
pub const ENV_TOKEN_CACHE_DIR: &str = "SCISTORE_TOKEN_CACHE_DIR";

/// Overrides the default number of concurrent batch transfers
pub const ENV_JOBS: &str = "SCISTORE_JOBS";

/// HTTP timeouts for the Swift transport (seconds)
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "SCISTORE_CONNECT_TIMEOUT_SECS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "SCISTORE_REQUEST_TIMEOUT_SECS";

/// Default token cache location, relative to `$HOME`
pub const DEFAULT_TOKEN_CACHE_DIR: &str = "~/.swift";

/// Reserved provider prefix carried by every user metadata key on the wire
pub const METADATA_PREFIX: &str = "x-object-meta-";

/// Header naming the segment container/prefix of a segmented object
pub const MANIFEST_HEADER: &str = "x-object-manifest";

/// Header carrying the Swift auth token
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Content type Swift uses for pseudo-directory marker objects
pub const DIRECTORY_CONTENT_TYPE: &str = "application/directory";

/// Content types used by the payload codecs
pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const CSV_CONTENT_TYPE: &str = "text/csv";
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

/// Metadata key recording who uploaded an object
pub const UPLOADED_BY_KEY: &str = "uploaded-by";

/// Suffix of the container holding segments of large objects
pub const SEGMENT_CONTAINER_SUFFIX: &str = "_segments";

/// Objects above this size are uploaded in segments (100 MiB)
pub const DEFAULT_SEGMENT_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Size of each uploaded segment (100 MiB)
pub const DEFAULT_SEGMENT_SIZE: u64 = 100 * 1024 * 1024;

/// Lower bound for the default number of concurrent transfers
pub const MIN_DEFAULT_JOBS: usize = 4;

/// Upper bound for the default number of concurrent transfers
pub const MAX_DEFAULT_JOBS: usize = 32;

/// Concurrent metadata lookups while filtering a listing
pub const DEFAULT_FILTER_CONCURRENCY: usize = 16;

/// Page size requested from container listings
pub const LIST_PAGE_LIMIT: usize = 10_000;

/// Default HTTP connect timeout (seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP request timeout (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

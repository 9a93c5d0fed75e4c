// src/lib.rs
//
// Crate root: module declarations plus the public re-exports.

// ===== Core Public API =====

pub mod connection;
pub mod store;
pub mod transfer;

pub use connection::StoreHandle;
pub use transfer::{
    TransferConfig, TransferItem, TransferOutcome, TransferReport, download, expand_patterns, invoking_principal,
    upload,
};

// ===== Credentials & auth token cache =====

pub mod credentials;
pub mod token_cache;

pub use credentials::{CredentialSource, Credentials, resolve};
pub use token_cache::{CachedToken, FileTokenCache, MemoryTokenCache, TokenCache};

// ===== Backends =====

pub mod object_store;
pub mod swift_client;
pub mod memory_store;

pub use object_store::{AuthSession, BackendKind, ListEntry, ObjectStore, PendingStore, store_for_backend};
pub use swift_client::{EndpointType, SwiftConfig, SwiftStore};
pub use memory_store::MemoryStore;

// ===== Support =====

pub mod constants;
pub mod error;
pub mod naming;
pub mod codec;
pub mod progress;
pub mod rows;

pub use codec::{CsvOptions, Dialect, Quoting, Table, TableMode};
pub use error::{Result, StoreError};
pub use naming::{Metadata, decode_metadata, encode_metadata, metadata_matches, normalize_key, normalize_upload_name};

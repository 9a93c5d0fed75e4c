// src/store.rs
//
// Object store façade: single-object operations on a connected StoreHandle.
// Every call checks the connection state first, so a handle whose connect
// failed answers with NotConnected and never reaches the network.

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::codec::{self, CsvOptions, Table};
use crate::connection::StoreHandle;
use crate::constants::{BINARY_CONTENT_TYPE, CSV_CONTENT_TYPE, DEFAULT_FILTER_CONCURRENCY, JSON_CONTENT_TYPE};
use crate::error::{Result, StoreError};
use crate::naming::{Metadata, decode_metadata, encode_metadata, is_listable, metadata_matches, normalize_key};

impl StoreHandle {
    /// Canonical key for `name` under this handle's prefix.
    pub fn key_for(&self, name: &str) -> String {
        normalize_key(name, &self.prefix)
    }

    /// Names of all objects under the handle's prefix.
    ///
    /// Directory markers and keys with a hidden (dot-prefixed) segment are never
    /// returned. With a non-empty `filter`, each candidate costs one metadata
    /// round trip (run with bounded concurrency); results keep listing order.
    pub async fn bucket_list(&self, filter: Option<&Metadata>) -> Result<Vec<String>> {
        let session = self.session()?;
        let list_prefix = if self.prefix.is_empty() { String::new() } else { format!("{}/", self.prefix) };
        let entries = self.store.list(session, &self.bucket, &list_prefix).await?;
        let total = entries.len();

        let names: Vec<String> = entries
            .into_iter()
            .filter(|e| is_listable(&e.name, &e.content_type))
            .map(|e| e.name)
            .collect();

        let filter = match filter {
            Some(f) if !f.is_empty() => f,
            _ => {
                debug!("listed {} of {} entries in {}/{}", names.len(), total, self.bucket, self.prefix);
                return Ok(names);
            }
        };

        let candidates = names.len();
        let kept: Vec<Option<String>> = stream::iter(names)
            .map(|name| async move {
                match self.store.head(session, &self.bucket, &name).await {
                    Ok(meta) => Ok(metadata_matches(filter, &decode_metadata(&meta)).then_some(name)),
                    // deleted between list and head
                    Err(StoreError::NotFound(_)) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .buffered(DEFAULT_FILTER_CONCURRENCY)
            .try_collect()
            .await?;
        let kept: Vec<String> = kept.into_iter().flatten().collect();

        info!("metadata filter kept {} of {} objects in {}", kept.len(), candidates, self.bucket);
        Ok(kept)
    }

    pub async fn object_get(&self, key: &str) -> Result<Bytes> {
        let session = self.session()?;
        let key = self.key_for(key);
        let data = self.store.get(session, &self.bucket, &key).await?;
        debug!("GET {}/{} ({} bytes)", self.bucket, key, data.len());
        Ok(data)
    }

    pub async fn object_get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        codec::decode_json(&self.object_get(key).await?)
    }

    pub async fn object_get_csv(&self, key: &str, options: CsvOptions) -> Result<Table> {
        codec::decode_csv(&self.object_get(key).await?, options)
    }

    /// Decode a blob written by [`object_put_blob`](Self::object_put_blob).
    pub async fn object_get_blob<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        codec::decode_blob(&self.object_get(key).await?)
    }

    pub async fn object_put(&self, key: &str, body: impl Into<Bytes>, metadata: Option<&Metadata>) -> Result<()> {
        self.put_typed(key, body.into(), None, metadata).await
    }

    /// Pretty-printed UTF-8 JSON.
    pub async fn object_put_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        metadata: Option<&Metadata>,
    ) -> Result<()> {
        let body = codec::encode_json(value)?;
        self.put_typed(key, body.into(), Some(JSON_CONTENT_TYPE), metadata).await
    }

    pub async fn object_put_csv(
        &self,
        key: &str,
        table: &Table,
        options: CsvOptions,
        metadata: Option<&Metadata>,
    ) -> Result<()> {
        let body = codec::encode_csv(table, options.dialect)?;
        self.put_typed(key, body.into(), Some(CSV_CONTENT_TYPE), metadata).await
    }

    /// Store `value` as an opaque serde/bincode blob.
    ///
    /// The encoding is specific to this library's serde representation of `T`;
    /// other language runtimes cannot read it.
    pub async fn object_put_blob<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        metadata: Option<&Metadata>,
    ) -> Result<()> {
        let body = codec::encode_blob(value)?;
        self.put_typed(key, body.into(), Some(BINARY_CONTENT_TYPE), metadata).await
    }

    /// User metadata of an object (reserved prefix stripped).
    pub async fn object_meta_get(&self, key: &str) -> Result<Metadata> {
        let session = self.session()?;
        let key = self.key_for(key);
        let headers = self.store.head(session, &self.bucket, &key).await?;
        Ok(decode_metadata(&headers))
    }

    /// Replace the user metadata of an existing object.
    pub async fn object_meta_set(&self, key: &str, metadata: &Metadata) -> Result<()> {
        let session = self.session()?;
        let key = self.key_for(key);
        self.store.post_metadata(session, &self.bucket, &key, &encode_metadata(metadata)).await?;
        debug!("set {} metadata keys on {}/{}", metadata.len(), self.bucket, key);
        Ok(())
    }

    pub async fn object_exists(&self, key: &str) -> Result<bool> {
        let session = self.session()?;
        let key = self.key_for(key);
        match self.store.head(session, &self.bucket, &key).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn put_typed(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
        metadata: Option<&Metadata>,
    ) -> Result<()> {
        let session = self.session()?;
        let key = self.key_for(key);
        let encoded = metadata.map(encode_metadata).unwrap_or_default();
        let size = body.len();

        if self.store.supports_put_metadata() {
            self.store.put(session, &self.bucket, &key, body, content_type, &encoded).await?;
        } else {
            self.store.put(session, &self.bucket, &key, body, content_type, &Metadata::new()).await?;
            if !encoded.is_empty() {
                self.store.post_metadata(session, &self.bucket, &key, &encoded).await?;
            }
        }
        debug!("PUT {}/{} ({} bytes, {} metadata keys)", self.bucket, key, size, encoded.len());
        Ok(())
    }
}

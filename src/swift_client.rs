// src/swift_client.rs
//
// Swift-compatible transport over reqwest.
//
// Authentication:
//   - password mode: Keystone v2 `POST <auth_url>/tokens`, storage URL from the service catalog
//   - token mode:    `HEAD <storage_url>` to prove the supplied token is still accepted
// Objects are addressed as `<storage_url>/<container>/<key segments...>`.

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, ClientBuilder, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::constants::{
    AUTH_TOKEN_HEADER, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS, ENV_CONNECT_TIMEOUT_SECS,
    ENV_REQUEST_TIMEOUT_SECS, LIST_PAGE_LIMIT, MANIFEST_HEADER,
};
use crate::credentials::Credentials;
use crate::error::{Result, StoreError};
use crate::naming::Metadata;
use crate::object_store::{AuthSession, BackendKind, ListEntry, ObjectStore};

/// Which catalog URL to use for the object-store service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointType {
    #[default]
    Public,
    Internal,
    Admin,
}

/// HTTP settings for the Swift transport
#[derive(Debug, Clone)]
pub struct SwiftConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout (large objects need room)
    pub request_timeout: Duration,
    /// Catalog interface to pick the storage URL from
    pub endpoint_type: EndpointType,
    /// Restrict catalog lookup to one region
    pub region: Option<String>,
}

impl Default for SwiftConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            endpoint_type: EndpointType::Public,
            region: None,
        }
    }
}

impl SwiftConfig {
    /// Defaults with timeout overrides from `SCISTORE_*_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let secs = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(default))
        };
        Self {
            connect_timeout: secs(ENV_CONNECT_TIMEOUT_SECS, DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: secs(ENV_REQUEST_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS),
            ..Self::default()
        }
    }

    pub fn with_endpoint_type(mut self, endpoint_type: EndpointType) -> Self {
        self.endpoint_type = endpoint_type;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

// Keystone v2 response, only the fields we read.
#[derive(Debug, Deserialize)]
struct KeystoneResponse {
    access: KeystoneAccess,
}

#[derive(Debug, Deserialize)]
struct KeystoneAccess {
    token: KeystoneToken,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<CatalogService>,
}

#[derive(Debug, Deserialize)]
struct KeystoneToken {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CatalogService {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Deserialize)]
struct CatalogEndpoint {
    #[serde(default)]
    region: Option<String>,
    #[serde(rename = "publicURL", default)]
    public_url: Option<String>,
    #[serde(rename = "internalURL", default)]
    internal_url: Option<String>,
    #[serde(rename = "adminURL", default)]
    admin_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListingItem {
    name: String,
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    bytes: u64,
}

/// Pick the object-store URL for `endpoint_type` (and `region`, when set) from a v2 catalog.
fn storage_url_from_catalog(
    catalog: &[CatalogService],
    endpoint_type: EndpointType,
    region: Option<&str>,
) -> Option<String> {
    catalog
        .iter()
        .filter(|svc| svc.service_type == "object-store")
        .flat_map(|svc| svc.endpoints.iter())
        .filter(|ep| region.is_none() || ep.region.as_deref() == region)
        .find_map(|ep| match endpoint_type {
            EndpointType::Public => ep.public_url.clone(),
            EndpointType::Internal => ep.internal_url.clone(),
            EndpointType::Admin => ep.admin_url.clone(),
        })
}

/// `<storage_url>/<bucket>[/<key segments>]`, each segment percent-encoded.
pub fn object_url(storage_url: &str, bucket: &str, key: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(storage_url)
        .map_err(|e| StoreError::InvalidConfig(format!("bad storage url '{storage_url}': {e}")))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| StoreError::InvalidConfig(format!("storage url '{storage_url}' cannot hold a path")))?;
        segments.pop_if_empty().push(bucket);
        if let Some(key) = key {
            segments.extend(key.split('/'));
        }
    }
    Ok(url)
}

/// Header values are raw bytes on the wire; user metadata is UTF-8 text.
fn header_text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn transport_error(e: reqwest::Error, what: &str) -> StoreError {
    StoreError::Backend(anyhow!("{what}: {e}"))
}

/// Map a response status onto the error taxonomy.
async fn check_status(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        body.trim().to_string()
    };
    match status {
        StatusCode::NOT_FOUND => Err(StoreError::NotFound(what.to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(StoreError::connection(Some(status.as_u16()), format!("{what}: {message}")))
        }
        _ => Err(StoreError::Backend(anyhow!("{what}: HTTP {}: {message}", status.as_u16()))),
    }
}

/// Swift transport
#[derive(Debug, Clone)]
pub struct SwiftStore {
    client: Client,
    config: SwiftConfig,
}

impl SwiftStore {
    pub fn new(config: SwiftConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .tcp_nodelay(true)
            .use_rustls_tls()
            .build()
            .map_err(|e| transport_error(e, "building HTTP client"))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &SwiftConfig {
        &self.config
    }

    fn request(&self, method: Method, url: Url, session: &AuthSession) -> RequestBuilder {
        self.client.request(method, url).header(AUTH_TOKEN_HEADER, &session.auth_token)
    }

    async fn keystone_v2(&self, auth_url: &str, username: &str, password: &str, tenant: &str) -> Result<AuthSession> {
        let url = format!("{}/tokens", auth_url.trim_end_matches('/'));
        let body = json!({
            "auth": {
                "tenantName": tenant,
                "passwordCredentials": { "username": username, "password": password }
            }
        });
        debug!("authenticating {} against {}", username, url);

        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| StoreError::connection(e.status().map(|s| s.as_u16()), e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(StoreError::connection(Some(status.as_u16()), text.trim().to_string()));
        }
        let raw = resp
            .bytes()
            .await
            .map_err(|e| StoreError::connection(None, e.to_string()))?;
        let parsed: KeystoneResponse = serde_json::from_slice(&raw)
            .map_err(|e| StoreError::connection(None, format!("unexpected auth response: {e}")))?;

        let storage_url = storage_url_from_catalog(
            &parsed.access.service_catalog,
            self.config.endpoint_type,
            self.config.region.as_deref(),
        )
        .ok_or_else(|| StoreError::connection(None, "no object-store endpoint in service catalog"))?;

        info!("authenticated against {}, storage url {}", url, storage_url);
        Ok(AuthSession { storage_url, auth_token: parsed.access.token.id })
    }

    async fn validate_token(&self, storage_url: &str, auth_token: &str) -> Result<AuthSession> {
        let session = AuthSession { storage_url: storage_url.to_string(), auth_token: auth_token.to_string() };
        let url = Url::parse(storage_url)
            .map_err(|e| StoreError::InvalidConfig(format!("bad storage url '{storage_url}': {e}")))?;
        let resp = self
            .request(Method::HEAD, url, &session)
            .send()
            .await
            .map_err(|e| StoreError::connection(None, e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StoreError::connection(
                Some(status.as_u16()),
                status.canonical_reason().unwrap_or("token rejected").to_string(),
            ));
        }
        debug!("supplied token accepted by {}", storage_url);
        Ok(session)
    }
}

#[async_trait]
impl ObjectStore for SwiftStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Swift
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<AuthSession> {
        match credentials {
            Credentials::Password { auth_url, username, password, tenant } => {
                self.keystone_v2(auth_url, username, password, tenant).await
            }
            Credentials::Token { storage_url, auth_token, .. } => self.validate_token(storage_url, auth_token).await,
        }
    }

    async fn list(&self, session: &AuthSession, bucket: &str, prefix: &str) -> Result<Vec<ListEntry>> {
        let mut out = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut url = object_url(&session.storage_url, bucket, None)?;
            {
                let mut q = url.query_pairs_mut();
                q.append_pair("format", "json").append_pair("limit", &LIST_PAGE_LIMIT.to_string());
                if !prefix.is_empty() {
                    q.append_pair("prefix", prefix);
                }
                if let Some(m) = &marker {
                    q.append_pair("marker", m);
                }
            }
            let resp = self
                .request(Method::GET, url, session)
                .send()
                .await
                .map_err(|e| transport_error(e, "list"))?;
            let resp = check_status(resp, &format!("container {bucket}")).await?;
            if resp.status() == StatusCode::NO_CONTENT {
                break;
            }
            let raw = resp.bytes().await.map_err(|e| transport_error(e, "list"))?;
            if raw.is_empty() {
                break;
            }
            let page: Vec<ListingItem> = serde_json::from_slice(&raw)?;
            let Some(last) = page.last() else { break };
            marker = Some(last.name.clone());
            // a page shorter than `limit` is the last one; an empty body or 204 also ends it
            let full_page = page.len() >= LIST_PAGE_LIMIT;
            out.extend(page.into_iter().map(|item| ListEntry {
                name: item.name,
                content_type: item.content_type,
                bytes: item.bytes,
            }));
            if !full_page {
                break;
            }
        }
        debug!("listed {} entries in {}/{}", out.len(), bucket, prefix);
        Ok(out)
    }

    async fn get(&self, session: &AuthSession, bucket: &str, key: &str) -> Result<Bytes> {
        let url = object_url(&session.storage_url, bucket, Some(key))?;
        let resp = self
            .request(Method::GET, url, session)
            .send()
            .await
            .map_err(|e| transport_error(e, "get"))?;
        let resp = check_status(resp, &format!("{bucket}/{key}")).await?;
        resp.bytes().await.map_err(|e| transport_error(e, "get"))
    }

    async fn put(
        &self,
        session: &AuthSession,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
        metadata: &Metadata,
    ) -> Result<()> {
        let url = object_url(&session.storage_url, bucket, Some(key))?;
        let mut req = self.request(Method::PUT, url, session).body(body);
        if let Some(ct) = content_type {
            req = req.header("content-type", ct);
        }
        for (k, v) in metadata {
            req = req.header(k.as_str(), v.as_str());
        }
        let resp = req.send().await.map_err(|e| transport_error(e, "put"))?;
        check_status(resp, &format!("{bucket}/{key}")).await?;
        Ok(())
    }

    async fn head(&self, session: &AuthSession, bucket: &str, key: &str) -> Result<Metadata> {
        let url = object_url(&session.storage_url, bucket, Some(key))?;
        let resp = self
            .request(Method::HEAD, url, session)
            .send()
            .await
            .map_err(|e| transport_error(e, "head"))?;
        let resp = check_status(resp, &format!("{bucket}/{key}")).await?;
        Ok(resp
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), header_text(value.as_bytes())))
            .collect())
    }

    async fn post_metadata(&self, session: &AuthSession, bucket: &str, key: &str, metadata: &Metadata) -> Result<()> {
        let url = object_url(&session.storage_url, bucket, Some(key))?;
        let mut req = self.request(Method::POST, url, session);
        for (k, v) in metadata {
            req = req.header(k.as_str(), v.as_str());
        }
        let resp = req.send().await.map_err(|e| transport_error(e, "post"))?;
        check_status(resp, &format!("{bucket}/{key}")).await?;
        Ok(())
    }

    async fn put_manifest(
        &self,
        session: &AuthSession,
        bucket: &str,
        key: &str,
        segment_container: &str,
        segment_prefix: &str,
        metadata: &Metadata,
    ) -> Result<()> {
        let url = object_url(&session.storage_url, bucket, Some(key))?;
        let mut req = self
            .request(Method::PUT, url, session)
            .header(MANIFEST_HEADER, format!("{segment_container}/{segment_prefix}"))
            .body(Bytes::new());
        for (k, v) in metadata {
            req = req.header(k.as_str(), v.as_str());
        }
        let resp = req.send().await.map_err(|e| transport_error(e, "manifest"))?;
        check_status(resp, &format!("{bucket}/{key}")).await?;
        Ok(())
    }

    async fn ensure_container(&self, session: &AuthSession, bucket: &str) -> Result<()> {
        let url = object_url(&session.storage_url, bucket, None)?;
        let resp = self
            .request(Method::PUT, url, session)
            .send()
            .await
            .map_err(|e| transport_error(e, "create container"))?;
        check_status(resp, &format!("container {bucket}")).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<CatalogService> {
        let raw = r#"{
            "access": {
                "token": { "id": "tok-123" },
                "serviceCatalog": [
                    { "type": "compute", "endpoints": [ { "publicURL": "https://nova" } ] },
                    { "type": "object-store", "endpoints": [
                        { "region": "east", "publicURL": "https://east/v1/AUTH_t", "internalURL": "http://east-int/v1/AUTH_t" },
                        { "region": "west", "publicURL": "https://west/v1/AUTH_t" }
                    ] }
                ]
            }
        }"#;
        let parsed: KeystoneResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.access.token.id, "tok-123");
        parsed.access.service_catalog
    }

    #[test]
    fn catalog_lookup_by_interface_and_region() {
        let cat = catalog();
        assert_eq!(
            storage_url_from_catalog(&cat, EndpointType::Public, None).as_deref(),
            Some("https://east/v1/AUTH_t")
        );
        assert_eq!(
            storage_url_from_catalog(&cat, EndpointType::Public, Some("west")).as_deref(),
            Some("https://west/v1/AUTH_t")
        );
        assert_eq!(
            storage_url_from_catalog(&cat, EndpointType::Internal, None).as_deref(),
            Some("http://east-int/v1/AUTH_t")
        );
        assert_eq!(storage_url_from_catalog(&cat, EndpointType::Admin, None), None);
    }

    #[test]
    fn object_urls_encode_each_segment() {
        let url = object_url("https://swift.example.org/v1/AUTH_lab", "tester", Some("toolbox/pi all.csv")).unwrap();
        assert_eq!(url.as_str(), "https://swift.example.org/v1/AUTH_lab/tester/toolbox/pi%20all.csv");

        let url = object_url("https://swift.example.org/v1/AUTH_lab/", "tester", None).unwrap();
        assert_eq!(url.as_str(), "https://swift.example.org/v1/AUTH_lab/tester");
    }

    #[test]
    fn bad_storage_url_is_a_config_error() {
        assert!(matches!(object_url("not a url", "b", None), Err(StoreError::InvalidConfig(_))));
    }

    #[test]
    fn config_defaults() {
        let cfg = SwiftConfig::default().with_region("east");
        assert_eq!(cfg.endpoint_type, EndpointType::Public);
        assert_eq!(cfg.region.as_deref(), Some("east"));
        assert_eq!(cfg.request_timeout, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));
        assert!(SwiftStore::new(cfg).is_ok());
    }

    #[test]
    fn listing_items_tolerate_missing_fields() {
        let page: Vec<ListingItem> =
            serde_json::from_str(r#"[{"name":"a","content_type":"text/plain","bytes":3},{"name":"b"}]"#).unwrap();
        assert_eq!(page[1].content_type, "");
        assert_eq!(page[0].bytes, 3);
    }

    // ---- HTTP-level tests against a local stub server ----

    use crate::naming::{decode_metadata, encode_metadata};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Debug, Clone)]
    struct Recorded {
        method: String,
        target: String,
        headers: Vec<(String, Vec<u8>)>,
        body: Vec<u8>,
    }

    impl Recorded {
        fn header(&self, name: &str) -> Option<String> {
            self.headers
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| String::from_utf8_lossy(v).into_owned())
        }

        fn path(&self) -> &str {
            self.target.split('?').next().unwrap_or_default()
        }

        fn query(&self, key: &str) -> Option<String> {
            let url = Url::parse(&format!("http://stub{}", self.target)).unwrap();
            url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
        }
    }

    struct Reply {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    }

    fn reply(status: u16) -> Reply {
        Reply { status, headers: Vec::new(), body: Vec::new() }
    }

    impl Reply {
        fn header(mut self, name: &str, value: &str) -> Self {
            self.headers.push((name.to_string(), value.to_string()));
            self
        }

        fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
            self.body = body.into();
            self
        }

        fn encode(&self, head_only: bool) -> Vec<u8> {
            let mut out = format!("HTTP/1.1 {} Stub\r\n", self.status).into_bytes();
            for (k, v) in &self.headers {
                out.extend_from_slice(format!("{k}: {v}\r\n").as_bytes());
            }
            if self.status != 204 {
                out.extend_from_slice(format!("content-length: {}\r\n", self.body.len()).as_bytes());
            }
            out.extend_from_slice(b"connection: close\r\n\r\n");
            if !head_only {
                out.extend_from_slice(&self.body);
            }
            out
        }
    }

    async fn read_request(sock: &mut TcpStream) -> Option<Recorded> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        let head_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let n = sock.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
        };

        let mut lines = buf[..head_end - 4].split(|&b| b == b'\n').map(|l| match l.last() {
            Some(&b'\r') => &l[..l.len() - 1],
            _ => l,
        });
        let request_line = String::from_utf8_lossy(lines.next()?).into_owned();
        let mut parts = request_line.split(' ');
        let method = parts.next()?.to_string();
        let target = parts.next()?.to_string();

        let mut headers = Vec::new();
        for line in lines.filter(|l| !l.is_empty()) {
            let colon = line.iter().position(|&b| b == b':')?;
            let name = String::from_utf8_lossy(&line[..colon]).trim().to_ascii_lowercase();
            headers.push((name, line[colon + 1..].trim_ascii().to_vec()));
        }

        let len: usize = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .and_then(|(_, v)| std::str::from_utf8(v).ok()?.parse().ok())
            .unwrap_or(0);
        let mut body = buf[head_end..].to_vec();
        while body.len() < len {
            let n = sock.read(&mut chunk).await.ok()?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
        Some(Recorded { method, target, headers, body })
    }

    /// One request per connection; every request is recorded before the reply goes out.
    async fn serve<F>(respond: F) -> (String, Arc<Mutex<Vec<Recorded>>>)
    where
        F: Fn(&Recorded) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = log.clone();
        let respond = Arc::new(respond);
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let seen = seen.clone();
                let respond = respond.clone();
                tokio::spawn(async move {
                    if let Some(req) = read_request(&mut sock).await {
                        let out = respond(&req).encode(req.method == "HEAD");
                        seen.lock().unwrap().push(req);
                        let _ = sock.write_all(&out).await;
                        let _ = sock.shutdown().await;
                    }
                });
            }
        });
        (base, log)
    }

    fn swift() -> SwiftStore {
        SwiftStore::new(SwiftConfig::default()).unwrap()
    }

    fn session(base: &str) -> AuthSession {
        AuthSession { storage_url: format!("{base}/v1/AUTH_lab"), auth_token: "tok".into() }
    }

    fn requests(log: &Arc<Mutex<Vec<Recorded>>>) -> Vec<Recorded> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn password_auth_reads_token_and_catalog() {
        let (base, log) = serve(|_| {
            reply(200).header("content-type", "application/json").body(
                r#"{"access": {"token": {"id": "tok-9"}, "serviceCatalog": [
                    {"type": "object-store", "endpoints": [{"publicURL": "https://swift.example.org/v1/AUTH_lab"}]}
                ]}}"#,
            )
        })
        .await;
        let creds = Credentials::Password {
            auth_url: format!("{base}/v2.0/"),
            username: "me".into(),
            password: "secret".into(),
            tenant: "lab".into(),
        };

        let session = swift().authenticate(&creds).await.unwrap();
        assert_eq!(session.auth_token, "tok-9");
        assert_eq!(session.storage_url, "https://swift.example.org/v1/AUTH_lab");

        let reqs = requests(&log);
        assert_eq!(reqs.len(), 1);
        assert_eq!((reqs[0].method.as_str(), reqs[0].path()), ("POST", "/v2.0/tokens"));
        let sent: serde_json::Value = serde_json::from_slice(&reqs[0].body).unwrap();
        assert_eq!(sent["auth"]["tenantName"], "lab");
        assert_eq!(sent["auth"]["passwordCredentials"]["username"], "me");
    }

    #[tokio::test]
    async fn rejected_or_unusable_auth_is_a_connection_error() {
        let (base, _) = serve(|req| {
            if req.body.windows(5).any(|w| w == b"wrong") {
                reply(401).body("bad credentials\n")
            } else {
                reply(200).body(r#"{"access": {"token": {"id": "t"}, "serviceCatalog": []}}"#)
            }
        })
        .await;
        let creds = |password: &str| Credentials::Password {
            auth_url: format!("{base}/v2.0"),
            username: "me".into(),
            password: password.into(),
            tenant: "lab".into(),
        };

        match swift().authenticate(&creds("wrong")).await {
            Err(StoreError::Connection { status, message }) => {
                assert_eq!(status, Some(401));
                assert_eq!(message, "bad credentials");
            }
            other => panic!("expected connection error, got {other:?}"),
        }
        match swift().authenticate(&creds("right")).await {
            Err(StoreError::Connection { status: None, message }) => assert!(message.contains("catalog")),
            other => panic!("expected missing-catalog error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn token_mode_validates_with_head() {
        let (base, log) = serve(|req| match req.header(AUTH_TOKEN_HEADER).as_deref() {
            Some("good") => reply(204),
            _ => reply(403),
        })
        .await;
        let creds = |token: &str| Credentials::Token {
            auth_url: None,
            storage_url: format!("{base}/v1/AUTH_lab"),
            auth_token: token.into(),
            tenant: "lab".into(),
        };

        let session = swift().authenticate(&creds("good")).await.unwrap();
        assert_eq!(session.storage_url, format!("{base}/v1/AUTH_lab"));
        assert_eq!(session.auth_token, "good");

        match swift().authenticate(&creds("stale")).await {
            Err(StoreError::Connection { status, .. }) => assert_eq!(status, Some(403)),
            other => panic!("expected connection error, got {other:?}"),
        }
        let reqs = requests(&log);
        assert!(reqs.iter().all(|r| r.method == "HEAD" && r.path() == "/v1/AUTH_lab"));
    }

    #[tokio::test]
    async fn listing_follows_marker_across_full_pages() {
        let full_page = serde_json::to_string(
            &(0..LIST_PAGE_LIMIT)
                .map(|i| json!({"name": format!("p/obj-{i:05}"), "content_type": "text/plain", "bytes": 1}))
                .collect::<Vec<_>>(),
        )
        .unwrap();
        let last = format!("p/obj-{:05}", LIST_PAGE_LIMIT - 1);
        let (base, log) = serve(move |req| match req.query("marker") {
            None => reply(200).header("content-type", "application/json").body(full_page.clone()),
            Some(_) => reply(204),
        })
        .await;

        let entries = swift().list(&session(&base), "bucket", "p/").await.unwrap();
        assert_eq!(entries.len(), LIST_PAGE_LIMIT);
        assert_eq!(entries[0].name, "p/obj-00000");

        let reqs = requests(&log);
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].path(), "/v1/AUTH_lab/bucket");
        assert_eq!(reqs[0].query("format").as_deref(), Some("json"));
        assert_eq!(reqs[0].query("prefix").as_deref(), Some("p/"));
        assert_eq!(reqs[0].query("limit"), Some(LIST_PAGE_LIMIT.to_string()));
        assert_eq!(reqs[1].query("marker"), Some(last));
    }

    #[tokio::test]
    async fn short_or_empty_page_ends_listing() {
        let (base, log) = serve(|req| match req.path() {
            "/v1/AUTH_lab/empty" => reply(204),
            _ => reply(200).body(
                r#"[{"name": "d", "content_type": "application/directory", "bytes": 0}, {"name": "d/a", "bytes": 4}]"#,
            ),
        })
        .await;
        let store = swift();

        let entries = store.list(&session(&base), "bucket", "").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].content_type, "application/directory");
        assert_eq!(entries[1].bytes, 4);
        assert!(store.list(&session(&base), "empty", "").await.unwrap().is_empty());
        assert_eq!(requests(&log).len(), 2);
    }

    #[tokio::test]
    async fn status_codes_map_onto_errors() {
        let (base, _) = serve(|req| match req.path() {
            "/v1/AUTH_lab/bucket/missing" => reply(404),
            "/v1/AUTH_lab/bucket/locked" => reply(403).body("Forbidden"),
            _ => reply(500).body("boom"),
        })
        .await;
        let (store, s) = (swift(), session(&base));

        assert!(matches!(store.get(&s, "bucket", "missing").await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.head(&s, "bucket", "missing").await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.get(&s, "bucket", "locked").await,
            Err(StoreError::Connection { status: Some(403), .. })
        ));
        match store.put(&s, "bucket", "other", Bytes::from_static(b"x"), None, &Metadata::new()).await {
            Err(StoreError::Backend(e)) => assert!(e.to_string().contains("HTTP 500: boom")),
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_ascii_metadata_survives_put_and_head() {
        let (base, log) = serve(|req| match req.method.as_str() {
            "HEAD" => reply(200)
                .header("content-type", "text/plain")
                .header("x-object-meta-author", "Müller")
                .header("x-object-meta-proj", "ABC"),
            _ => reply(201),
        })
        .await;
        let (store, s) = (swift(), session(&base));
        let user: Metadata = [("author", "Müller"), ("proj", "ABC")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        store
            .put(&s, "bucket", "paper.txt", Bytes::from_static(b"text"), Some("text/plain"), &encode_metadata(&user))
            .await
            .unwrap();
        let reqs = requests(&log);
        let put = &reqs[0];
        assert_eq!(put.header("x-object-meta-author").as_deref(), Some("Müller"));
        assert_eq!(put.body, b"text");

        let headers = store.head(&s, "bucket", "paper.txt").await.unwrap();
        assert_eq!(headers.get("x-object-meta-author").map(String::as_str), Some("Müller"));
        assert_eq!(decode_metadata(&headers), user);
    }

    #[tokio::test]
    async fn manifest_and_container_requests() {
        let (base, log) = serve(|_| reply(201)).await;
        let (store, s) = (swift(), session(&base));
        let meta: Metadata = [("x-object-meta-owner".to_string(), "me".to_string())].into_iter().collect();

        store.ensure_container(&s, "bucket_segments").await.unwrap();
        store
            .put_manifest(&s, "bucket", "big.bin", "bucket_segments", "big.bin/1.000000/10/5/", &meta)
            .await
            .unwrap();

        let reqs = requests(&log);
        assert_eq!((reqs[0].method.as_str(), reqs[0].path()), ("PUT", "/v1/AUTH_lab/bucket_segments"));
        let manifest = &reqs[1];
        assert_eq!((manifest.method.as_str(), manifest.path()), ("PUT", "/v1/AUTH_lab/bucket/big.bin"));
        assert_eq!(manifest.header(MANIFEST_HEADER).as_deref(), Some("bucket_segments/big.bin/1.000000/10/5/"));
        assert_eq!(manifest.header("x-object-meta-owner").as_deref(), Some("me"));
        assert_eq!(manifest.header(AUTH_TOKEN_HEADER).as_deref(), Some("tok"));
        assert!(manifest.body.is_empty());
    }
}


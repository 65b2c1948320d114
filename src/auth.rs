//! Credential storage and the authenticated request wrapper.
//!
//! Every request the library issues goes through [`ForgeClient::send`]. It
//! attaches the stored credential as an `X-API-Key` header and turns a `401`
//! or `403` into [`ForgeError::AuthRequired`] after asking the configured
//! [`LoginPrompt`] to collect a new key. Callers therefore never see an
//! authentication failure as an ordinary "request failed" response.
//!
//! Plain downloads cannot carry a header when handed to something else as a
//! link, so [`ForgeClient::download_url`] puts the credential in the `api_key`
//! query parameter instead.

use crate::api::{self, API_KEY_HEADER, API_KEY_QUERY};
use crate::config::ClientConfig;
use crate::error::ForgeError;
use futures::StreamExt;
use reqwest::multipart::Form;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Fixed key under which the credential is persisted.
pub const STORAGE_KEY: &str = "fileForgeApiKey";

/// Shown after a credential has been saved through the login flow.
pub const LOGIN_SAVED_MESSAGE: &str = "API Key saved. Please retry your action.";

// ── Credential storage ───────────────────────────────────────────────────

/// Persistent home of the single process-wide credential.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<String>, ForgeError>;
    fn save(&self, key: &str) -> Result<(), ForgeError>;
    fn clear(&self) -> Result<(), ForgeError>;
}

/// Credential kept for the lifetime of the process only.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    key: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: Mutex::new(Some(key.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<String>, ForgeError> {
        Ok(self.key.lock().map_err(poisoned)?.clone())
    }

    fn save(&self, key: &str) -> Result<(), ForgeError> {
        *self.key.lock().map_err(poisoned)? = Some(key.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), ForgeError> {
        *self.key.lock().map_err(poisoned)? = None;
        Ok(())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> ForgeError {
    ForgeError::Internal("credential store lock poisoned".into())
}

/// Credential persisted as a small JSON object (`{"fileForgeApiKey": "..."}`).
///
/// Other keys in the file are preserved on save and clear.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, ForgeError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                ForgeError::InvalidConfig(format!(
                    "credential file '{}' is not valid JSON: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(ForgeError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), ForgeError> {
        let io = |source| ForgeError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let text = serde_json::to_string_pretty(map)
            .map_err(|e| ForgeError::Internal(format!("credential encode: {e}")))?;
        std::fs::write(&self.path, text).map_err(io)
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<String>, ForgeError> {
        Ok(self
            .read_map()?
            .remove(STORAGE_KEY)
            .filter(|k| !k.is_empty()))
    }

    fn save(&self, key: &str) -> Result<(), ForgeError> {
        let mut map = self.read_map()?;
        map.insert(STORAGE_KEY.to_string(), key.to_string());
        self.write_map(&map)
    }

    fn clear(&self) -> Result<(), ForgeError> {
        let mut map = self.read_map()?;
        if map.remove(STORAGE_KEY).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

// ── Login prompt ─────────────────────────────────────────────────────────

/// Asked to collect a credential when the server rejects the current one.
///
/// Implementations only *show* the prompt; the key itself comes back through
/// [`ForgeClient::login`].
pub trait LoginPrompt: Send + Sync {
    fn request_credential(&self);
}

/// Default prompt: a log line.
pub struct LogLoginPrompt;

impl LoginPrompt for LogLoginPrompt {
    fn request_credential(&self) {
        warn!("Server rejected the request: an API key is required");
    }
}

// ── Client ───────────────────────────────────────────────────────────────

/// HTTP client for the File Forge API with uniform credential handling.
#[derive(Clone)]
pub struct ForgeClient {
    http: reqwest::Client,
    config: ClientConfig,
    credentials: Arc<dyn CredentialStore>,
    login: Arc<dyn LoginPrompt>,
}

impl std::fmt::Debug for ForgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForgeClient")
            .field("base_url", &self.config.base_url.as_str())
            .field("credentials", &"<dyn CredentialStore>")
            .finish()
    }
}

impl ForgeClient {
    /// Client with a file-backed store (or an in-memory one when the config
    /// has no credentials path) and the logging login prompt.
    pub fn new(config: ClientConfig) -> Result<Self, ForgeError> {
        let store: Arc<dyn CredentialStore> = match config.credentials_path {
            Some(ref path) => Arc::new(FileCredentialStore::new(path)),
            None => Arc::new(MemoryCredentialStore::new()),
        };
        Self::with_parts(config, store, Arc::new(LogLoginPrompt))
    }

    pub fn with_parts(
        config: ClientConfig,
        credentials: Arc<dyn CredentialStore>,
        login: Arc<dyn LoginPrompt>,
    ) -> Result<Self, ForgeError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ForgeError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            config,
            credentials,
            login,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The credential to attach: the configured override, else the stored one.
    ///
    /// A store that cannot be read is treated as empty; the server decides
    /// whether an unauthenticated request is acceptable.
    pub fn api_key(&self) -> Option<String> {
        if let Some(ref key) = self.config.api_key {
            return Some(key.clone());
        }
        match self.credentials.load() {
            Ok(key) => key,
            Err(e) => {
                warn!("Could not read stored API key: {e}");
                None
            }
        }
    }

    /// Login flow: persist a non-empty key. Returns `false` (and stores
    /// nothing) for an empty key.
    pub fn login(&self, key: &str) -> Result<bool, ForgeError> {
        let key = key.trim();
        if key.is_empty() {
            return Ok(false);
        }
        self.credentials.save(key)?;
        info!("API key saved");
        Ok(true)
    }

    /// Forget the persisted credential.
    pub fn logout(&self) -> Result<(), ForgeError> {
        self.credentials.clear()
    }

    /// Absolute URL of an API path.
    pub fn endpoint(&self, path: &str) -> Result<Url, ForgeError> {
        self.config
            .base_url
            .join(path)
            .map_err(|e| ForgeError::InvalidConfig(format!("endpoint '{path}': {e}")))
    }

    /// Download link for a produced file, with the credential as a query
    /// parameter when one is stored.
    pub fn download_url(&self, filename: &str) -> Result<Url, ForgeError> {
        let mut url = self.endpoint(api::DOWNLOAD)?;
        url.path_segments_mut()
            .map_err(|_| ForgeError::InvalidConfig("base URL cannot carry paths".into()))?
            .push(filename);
        if let Some(key) = self.api_key() {
            url.query_pairs_mut().append_pair(API_KEY_QUERY, &key);
        }
        Ok(url)
    }

    /// Send a request with the credential header attached, intercepting
    /// authentication failures.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ForgeError> {
        let request = match self.api_key() {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        };
        let response = request.send().await?;
        self.intercept_auth(response)
    }

    /// POST a multipart form to an API path.
    pub async fn post_form(&self, path: &str, form: Form) -> Result<Response, ForgeError> {
        let url = self.endpoint(path)?;
        debug!("POST {}", url.path());
        self.send(self.http.post(url).multipart(form)).await
    }

    fn intercept_auth(&self, response: Response) -> Result<Response, ForgeError> {
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("Authentication failed with HTTP {}", response.status());
                self.login.request_credential();
                Err(ForgeError::AuthRequired)
            }
            _ => Ok(response),
        }
    }

    /// GET an absolute URL through [`send`](Self::send).
    pub async fn get(&self, url: Url) -> Result<Response, ForgeError> {
        debug!("GET {}", url.path());
        self.send(self.http.get(url)).await
    }

    /// Fetch a produced file and write it to `dest`.
    ///
    /// The body is streamed into a temp file next to `dest` and renamed
    /// into place, so a failed download never leaves a truncated file or a
    /// stray temp file behind. Returns the number of bytes written.
    pub async fn download(&self, filename: &str, dest: &Path) -> Result<u64, ForgeError> {
        let response = self.get(self.download_url(filename)?).await?;
        if !response.status().is_success() {
            return Err(api::error_from_response(response, "Download failed").await);
        }

        let io = |source| ForgeError::Io {
            path: dest.to_path_buf(),
            source,
        };
        let dir = match dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                tokio::fs::create_dir_all(parent).await.map_err(io)?;
                parent.to_path_buf()
            }
            None => PathBuf::from("."),
        };
        // Removed on drop unless persisted.
        let tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io)?;
        let mut file = tokio::fs::File::from_std(tmp.reopen().map_err(io)?);
        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ForgeError::Transport(e.to_string()))?;
            file.write_all(&chunk).await.map_err(io)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io)?;
        drop(file);
        tmp.persist(dest).map_err(|e| io(e.error))?;

        info!("Downloaded {} ({} bytes) to {}", filename, written, dest.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn client_with(store: Arc<dyn CredentialStore>, api_key: Option<&str>) -> ForgeClient {
        let mut builder = ClientConfig::builder()
            .base_url("http://forge.test")
            .no_credentials_file();
        if let Some(k) = api_key {
            builder = builder.api_key(k);
        }
        ForgeClient::with_parts(builder.build().unwrap(), store, Arc::new(LogLoginPrompt)).unwrap()
    }

    #[test]
    fn file_store_round_trips_and_preserves_other_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("credentials.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"theme":"dark"}"#).unwrap();

        let store = FileCredentialStore::new(&path);
        assert_eq!(store.load().unwrap(), None);
        store.save("secret").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("secret"));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("fileForgeApiKey"));
        assert!(raw.contains("theme"));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        assert!(std::fs::read_to_string(&path).unwrap().contains("theme"));
    }

    #[test]
    fn file_store_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(dir.path().join("absent.json"));
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn download_url_without_key() {
        let client = client_with(Arc::new(MemoryCredentialStore::new()), None);
        let url = client.download_url("out.docx").unwrap();
        assert_eq!(url.as_str(), "http://forge.test/api/download/out.docx");
    }

    #[test]
    fn download_url_carries_encoded_key() {
        let client = client_with(Arc::new(MemoryCredentialStore::with_key("a b&c")), None);
        let url = client.download_url("out.docx").unwrap();
        assert_eq!(url.path(), "/api/download/out.docx");
        let key: Vec<_> = url.query_pairs().collect();
        assert_eq!(key.len(), 1);
        assert_eq!(key[0].0, "api_key");
        assert_eq!(key[0].1, "a b&c");
    }

    #[test]
    fn download_url_escapes_filename() {
        let client = client_with(Arc::new(MemoryCredentialStore::new()), None);
        let url = client.download_url("my file#1.pdf").unwrap();
        assert_eq!(url.path(), "/api/download/my%20file%231.pdf");
    }

    #[test]
    fn configured_key_overrides_store() {
        let client = client_with(Arc::new(MemoryCredentialStore::with_key("stored")), Some("flag"));
        assert_eq!(client.api_key().as_deref(), Some("flag"));
    }

    #[test]
    fn login_ignores_empty_key() {
        let store = Arc::new(MemoryCredentialStore::new());
        let client = client_with(store.clone(), None);
        assert!(!client.login("   ").unwrap());
        assert_eq!(store.load().unwrap(), None);
        assert!(client.login("k1").unwrap());
        assert_eq!(client.api_key().as_deref(), Some("k1"));
        client.logout().unwrap();
        assert_eq!(client.api_key(), None);
    }
}

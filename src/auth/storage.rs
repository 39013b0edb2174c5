use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::auth::token::TokenPair;
use crate::error::{ClientError, ClientResult};

/// Storage key for the access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// A durable string key-value surface
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    async fn get(&self, key: &str) -> ClientResult<Option<String>>;

    /// Write several values in one step
    async fn set_many(&self, entries: &[(&str, &str)]) -> ClientResult<()>;

    /// Remove several keys in one step
    async fn remove_many(&self, keys: &[&str]) -> ClientResult<()>;

    /// Write a single value
    async fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        self.set_many(&[(key, value)]).await
    }

    /// Remove a single key
    async fn remove(&self, key: &str) -> ClientResult<()> {
        self.remove_many(&[key]).await
    }
}

/// Process-local store, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> ClientResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> ClientResult<()> {
        let mut map = self.entries.write().await;
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> ClientResult<()> {
        let mut map = self.entries.write().await;
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

/// JSON object persisted to a single file.
///
/// The file is read once and cached; every write rewrites the whole file
/// through a temporary sibling and a rename. Writes are serialized so each
/// one sees the result of the previous.
pub struct JsonFileStore {
    path: PathBuf,
    cache: RwLock<Option<HashMap<String, String>>>,
    writes: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
            writes: Mutex::new(()),
        }
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> ClientResult<HashMap<String, String>> {
        if let Some(map) = self.cache.read().await.as_ref() {
            return Ok(map.clone());
        }

        let map = match fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => HashMap::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                ClientError::Storage(format!(
                    "Corrupt store at {}: {}",
                    self.path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Store file does not exist yet");
                HashMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        *self.cache.write().await = Some(map.clone());
        Ok(map)
    }

    async fn persist(&self, map: HashMap<String, String>) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let contents = serde_json::to_string_pretty(&map)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents).await?;
        fs::rename(&tmp, &self.path).await?;

        *self.cache.write().await = Some(map);
        Ok(())
    }
}

#[async_trait::async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> ClientResult<Option<String>> {
        Ok(self.load().await?.get(key).cloned())
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> ClientResult<()> {
        let _write = self.writes.lock().await;
        let mut map = self.load().await?;
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        self.persist(map).await
    }

    async fn remove_many(&self, keys: &[&str]) -> ClientResult<()> {
        let _write = self.writes.lock().await;
        let mut map = self.load().await?;
        let before = map.len();
        for key in keys {
            map.remove(*key);
        }
        if map.len() == before {
            return Ok(());
        }
        self.persist(map).await
    }
}

/// Access and refresh token persistence.
///
/// Backend failures never reach the caller: they are logged and a failed
/// read is reported as an absent token.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    /// Create a token store over any backend
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Token store that only lives in memory
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Token store persisted to a JSON file
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(JsonFileStore::new(path)))
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                error!(key, error = %e, "Error getting item from token storage");
                None
            }
        }
    }

    async fn write(&self, entries: &[(&str, &str)]) {
        if let Err(e) = self.backend.set_many(entries).await {
            error!(error = %e, "Error setting item in token storage");
        }
    }

    pub async fn get_access_token(&self) -> Option<String> {
        self.read(ACCESS_TOKEN_KEY).await
    }

    pub async fn set_access_token(&self, token: &str) {
        self.write(&[(ACCESS_TOKEN_KEY, token)]).await
    }

    pub async fn get_refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY).await
    }

    pub async fn set_refresh_token(&self, token: &str) {
        self.write(&[(REFRESH_TOKEN_KEY, token)]).await
    }

    /// Store both tokens in one backend write
    pub async fn set_tokens(&self, access_token: &str, refresh_token: &str) {
        self.write(&[
            (ACCESS_TOKEN_KEY, access_token),
            (REFRESH_TOKEN_KEY, refresh_token),
        ])
        .await;
        debug!("Token pair stored");
    }

    /// Store a token pair
    pub async fn store_pair(&self, pair: &TokenPair) {
        self.set_tokens(&pair.access_token, &pair.refresh_token).await
    }

    /// Both tokens, when both are present
    pub async fn get_pair(&self) -> Option<TokenPair> {
        let access = self.get_access_token().await?;
        let refresh = self.get_refresh_token().await?;
        Some(TokenPair::new(access, refresh))
    }

    pub async fn clear_tokens(&self) {
        match self
            .backend
            .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])
            .await
        {
            Ok(()) => info!("Tokens cleared"),
            Err(e) => error!(error = %e, "Error removing tokens from storage"),
        }
    }

    /// True when both tokens are present and non-empty
    pub async fn has_valid_tokens(&self) -> bool {
        let access = self.get_access_token().await;
        let refresh = self.get_refresh_token().await;
        matches!((access, refresh), (Some(a), Some(r)) if !a.is_empty() && !r.is_empty())
    }
}

use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{anyhow, Context};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};

use crate::api::AuthToken;

pub const AUTH_TOKEN_KEY: &str = "authToken";

/// String key/value store, the values being JSON-encoded
pub trait Storage: Send + Sync {
    fn get_raw(&self, key: &str) -> Option<String>;

    /// Every value held for `key`, preferred one first
    fn get_raw_all(&self, key: &str) -> Vec<String> {
        self.get_raw(key).into_iter().collect()
    }

    fn set_raw(&self, key: &str, value: String) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

pub trait StorageExt: Storage {
    /// Values that fail to decode are logged and skipped, falling back to the
    /// next value held for the key if any
    fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_raw_all(key)
            .into_iter()
            .find_map(|raw| match serde_json::from_str(&raw) {
                Ok(v) => Some(v),
                Err(err) => {
                    tracing::error!(?err, key, "failed decoding stored value");
                    None
                }
            })
    }

    fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let raw = serde_json::to_string(value)
            .with_context(|| format!("encoding value for storage key {key:?}"))?;
        self.set_raw(key, raw)
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}

#[derive(Debug, Default)]
pub struct MemoryStorage(Mutex<HashMap<String, String>>);

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }
}

impl Storage for MemoryStorage {
    fn get_raw(&self, key: &str) -> Option<String> {
        self.0.lock().get(key).cloned()
    }

    fn set_raw(&self, key: &str, value: String) -> anyhow::Result<()> {
        self.0.lock().insert(String::from(key), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.0.lock().remove(key);
        Ok(())
    }
}

/// Storage persisted as a single JSON object in a file
///
/// A missing file is an empty storage. The file is re-read on every access,
/// so several processes can share it.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> FileStorage {
        FileStorage {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> anyhow::Result<BTreeMap<String, String>> {
        match std::fs::read(&self.path) {
            Ok(data) => serde_json::from_slice(&data)
                .with_context(|| format!("parsing storage file {:?}", self.path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).with_context(|| format!("reading storage file {:?}", self.path)),
        }
    }

    fn save(&self, data: &BTreeMap<String, String>) -> anyhow::Result<()> {
        let data = serde_json::to_vec_pretty(data).context("serializing storage file")?;
        std::fs::write(&self.path, data)
            .with_context(|| format!("writing storage file {:?}", self.path))
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> anyhow::Result<()> {
        let _lock = self.lock.lock();
        let mut data = self.load()?;
        f(&mut data);
        self.save(&data)
    }
}

impl Storage for FileStorage {
    fn get_raw(&self, key: &str) -> Option<String> {
        let _lock = self.lock.lock();
        match self.load() {
            Ok(mut data) => data.remove(key),
            Err(err) => {
                tracing::error!(?err, key, "failed reading storage file");
                None
            }
        }
    }

    fn set_raw(&self, key: &str, value: String) -> anyhow::Result<()> {
        self.update(|data| {
            data.insert(String::from(key), value);
        })
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.update(|data| {
            data.remove(key);
        })
    }
}

/// Falls back through several storages
///
/// Reads return the value of the first layer that has a decodable one. Writes
/// go to the first layer that accepts them. Removals hit every layer.
pub struct LayeredStorage(Vec<Arc<dyn Storage>>);

impl LayeredStorage {
    pub fn new(layers: Vec<Arc<dyn Storage>>) -> LayeredStorage {
        LayeredStorage(layers)
    }
}

impl Storage for LayeredStorage {
    fn get_raw(&self, key: &str) -> Option<String> {
        self.0.iter().find_map(|s| s.get_raw(key))
    }

    fn get_raw_all(&self, key: &str) -> Vec<String> {
        self.0.iter().flat_map(|s| s.get_raw_all(key)).collect()
    }

    fn set_raw(&self, key: &str, value: String) -> anyhow::Result<()> {
        let mut res = Err(anyhow!("layered storage has no layer"));
        for layer in &self.0 {
            match layer.set_raw(key, value.clone()) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(?err, key, "storage layer refused write, trying next one");
                    res = Err(err);
                }
            }
        }
        res
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut res = Ok(());
        for layer in &self.0 {
            if let Err(err) = layer.remove(key) {
                tracing::error!(?err, key, "failed removing key from storage layer");
                res = Err(err);
            }
        }
        res
    }
}

/// Where the current session's auth token lives
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn Storage>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn Storage>) -> SessionStore {
        SessionStore { storage }
    }

    pub fn in_memory() -> SessionStore {
        SessionStore::new(Arc::new(MemoryStorage::new()))
    }

    pub fn token(&self) -> Option<AuthToken> {
        self.storage.get(AUTH_TOKEN_KEY)
    }

    pub fn set_token(&self, token: &AuthToken) -> anyhow::Result<()> {
        self.storage.set(AUTH_TOKEN_KEY, token)
    }

    pub fn clear_token(&self) -> anyhow::Result<()> {
        self.storage.remove(AUTH_TOKEN_KEY)
    }
}
